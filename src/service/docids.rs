use std::borrow::Cow;
use std::collections::HashMap;
use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use tracing::info;

use crate::error::{Error, Result};

/// Internal document index -> external ID
/// Read-only after loading; indices without an entry resolve to their own
/// decimal form.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DocIdMap {
    ids: HashMap<u32, Box<str>>,
}

impl DocIdMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse `<internalIndex>\t<externalID>` lines; blank lines are skipped
    ///
    /// # Errors
    /// `Config` on a line without a tab, a non-integer index, a repeated index
    /// or bytes that are not UTF-8
    pub fn from_reader<R: BufRead>(reader: R) -> Result<Self> {
        let mut map = DocIdMap::new();
        for (line_no, line) in reader.lines().enumerate() {
            let line = line.map_err(|e| match e.kind() {
                io::ErrorKind::InvalidData => {
                    Error::Config(format!("doc id line {}: not valid UTF-8", line_no + 1))
                }
                _ => Error::Io(e),
            })?;
            let line = line.trim_end_matches('\r');
            if line.is_empty() {
                continue;
            }
            let (index, id) = line.split_once('\t').ok_or_else(|| {
                Error::Config(format!("doc id line {}: missing tab separator", line_no + 1))
            })?;
            let index: u32 = index.trim().parse().map_err(|_| {
                Error::Config(format!(
                    "doc id line {}: index {:?} is not an integer",
                    line_no + 1,
                    index
                ))
            })?;
            if map.ids.insert(index, id.into()).is_some() {
                return Err(Error::Config(format!(
                    "doc id line {}: index {index} listed twice",
                    line_no + 1
                )));
            }
        }
        Ok(map)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let map = Self::from_reader(BufReader::new(File::open(path)?))?;
        info!(path = %path.display(), entries = map.len(), "loaded document id map");
        Ok(map)
    }

    /// Write the map in ascending index order
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let mut writer = BufWriter::new(File::create(path)?);
        let mut entries: Vec<(&u32, &Box<str>)> = self.ids.iter().collect();
        entries.sort_by_key(|(index, _)| **index);
        for (index, id) in entries {
            writeln!(writer, "{index}\t{id}")?;
        }
        writer.flush()?;
        Ok(())
    }

    pub fn insert(&mut self, index: u32, id: &str) {
        self.ids.insert(index, id.into());
    }

    /// External ID of `index`, or the index itself as a string
    pub fn external_id(&self, index: u32) -> Cow<'_, str> {
        match self.ids.get(&index) {
            Some(id) => Cow::Borrowed(&**id),
            None => Cow::Owned(index.to_string()),
        }
    }

    pub fn max_index(&self) -> Option<u32> {
        self.ids.keys().copied().max()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_entries_fall_back_to_the_index() {
        let map = DocIdMap::from_reader("0\tAda_Lovelace\n2\tAlan_Turing\n".as_bytes()).unwrap();
        assert_eq!(map.external_id(0), "Ada_Lovelace");
        assert_eq!(map.external_id(2), "Alan_Turing");
        assert_eq!(map.external_id(7), "7");
        assert_eq!(map.max_index(), Some(2));
    }

    #[test]
    fn ids_may_contain_spaces_and_tabs() {
        let map = DocIdMap::from_reader("0\tNew York\tCity\r\n\n".as_bytes()).unwrap();
        assert_eq!(map.external_id(0), "New York\tCity");
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn malformed_lines_are_config_errors() {
        for text in ["0 no-tab\n", "x\tid\n", "1\ta\n1\tb\n"] {
            assert!(
                matches!(DocIdMap::from_reader(text.as_bytes()), Err(Error::Config(_))),
                "{text:?}"
            );
        }
    }

    #[test]
    fn non_utf8_ids_are_config_errors() {
        let bytes: &[u8] = b"0\tok\n1\t\xff\xfe\n";
        match DocIdMap::from_reader(bytes) {
            Err(Error::Config(msg)) => assert!(msg.contains("line 2"), "{msg}"),
            other => panic!("expected a config error, got {other:?}"),
        }
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("docid.txt");
        let mut map = DocIdMap::new();
        map.insert(1, "b");
        map.insert(0, "a");
        map.save(&path).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "0\ta\n1\tb\n");
        assert_eq!(DocIdMap::load(&path).unwrap(), map);
    }
}
