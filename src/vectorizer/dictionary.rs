use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use indexmap::IndexMap;
use tracing::info;

use crate::error::{Error, Result};
use crate::utils::math::vector::SparseVector;

/// Per-term record of the dictionary
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TermEntry {
    pub id: u32,
    /// number of corpus documents containing the term
    pub doc_freq: u64,
}

/// TermDictionary 構造体
/// term <-> TermID の双方向マップです
///
/// IDs are fixed once loaded. Gaps in the ID space are allowed;
/// `num_terms` is `max(ID) + 1` so every model fit against this
/// dictionary has a dimension covering all IDs.
#[derive(Debug, Clone, Default)]
pub struct TermDictionary {
    /// term -> entry, in file order
    terms: IndexMap<Box<str>, TermEntry>,
    /// TermID -> position in `terms`
    by_id: HashMap<u32, usize>,
    num_terms: usize,
}

impl TermDictionary {
    /// Parse the `<TermID>\t<Term>\t<documentFrequency>` text format line by line.
    /// The frequency column may be omitted (read as 0). Blank lines are skipped.
    ///
    /// # Errors
    /// `Validation` on a duplicate term, a duplicate or non-integer ID,
    /// or a non-integer frequency. `Io` when the reader fails.
    pub fn from_reader<R: BufRead>(reader: R) -> Result<Self> {
        let mut dict = TermDictionary::default();
        for (line_no, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let mut fields = line.splitn(3, '\t');
            let id_field = fields.next().unwrap_or_default();
            let term = fields.next().ok_or_else(|| {
                Error::Validation(format!("line {}: missing term column", line_no + 1))
            })?;
            let id: u32 = id_field.trim().parse().map_err(|_| {
                Error::Validation(format!(
                    "line {}: term id {:?} is not an integer",
                    line_no + 1,
                    id_field
                ))
            })?;
            let doc_freq: u64 = match fields.next() {
                Some(df) => df.trim().parse().map_err(|_| {
                    Error::Validation(format!(
                        "line {}: document frequency {:?} is not an integer",
                        line_no + 1,
                        df
                    ))
                })?,
                None => 0,
            };
            dict.insert(term, TermEntry { id, doc_freq })
                .map_err(|e| match e {
                    Error::Validation(msg) => Error::Validation(format!("line {}: {msg}", line_no + 1)),
                    other => other,
                })?;
        }
        Ok(dict)
    }

    /// Load a dictionary file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)?;
        let dict = Self::from_reader(BufReader::new(file))?;
        info!(
            path = %path.display(),
            terms = dict.len(),
            num_terms = dict.num_terms(),
            "loaded term dictionary"
        );
        Ok(dict)
    }

    fn insert(&mut self, term: &str, entry: TermEntry) -> Result<()> {
        if self.terms.contains_key(term) {
            return Err(Error::Validation(format!("duplicate term {term:?}")));
        }
        if self.by_id.contains_key(&entry.id) {
            return Err(Error::Validation(format!("duplicate term id {}", entry.id)));
        }
        let (pos, _) = self.terms.insert_full(term.into(), entry);
        self.by_id.insert(entry.id, pos);
        self.num_terms = self.num_terms.max(entry.id as usize + 1);
        Ok(())
    }

    /// Write the dictionary in ascending TermID order
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let mut writer = BufWriter::new(File::create(path)?);
        let mut entries: Vec<(&str, &TermEntry)> =
            self.terms.iter().map(|(t, e)| (&**t, e)).collect();
        entries.sort_by_key(|(_, e)| e.id);
        for (term, entry) in entries {
            writeln!(writer, "{}\t{}\t{}", entry.id, term, entry.doc_freq)?;
        }
        writer.flush()?;
        Ok(())
    }

    /// Dimension of the term space, `max(ID) + 1`
    #[inline]
    pub fn num_terms(&self) -> usize {
        self.num_terms
    }

    /// Number of terms actually present
    #[inline]
    pub fn len(&self) -> usize {
        self.terms.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    #[inline]
    pub fn get(&self, term: &str) -> Option<&TermEntry> {
        self.terms.get(term)
    }

    #[inline]
    pub fn id(&self, term: &str) -> Option<u32> {
        self.terms.get(term).map(|e| e.id)
    }

    /// Reverse lookup
    pub fn term(&self, id: u32) -> Option<&str> {
        self.by_id
            .get(&id)
            .and_then(|&pos| self.terms.get_index(pos))
            .map(|(t, _)| &**t)
    }

    /// (TermID, doc_freq) of every term
    pub fn doc_freqs(&self) -> impl Iterator<Item = (u32, u64)> + '_ {
        self.terms.values().map(|e| (e.id, e.doc_freq))
    }

    /// Tokens -> bag-of-words
    /// Unknown tokens are dropped silently
    ///
    /// # Arguments
    /// * `tokens` - トークンのスライス (順序は結果に影響しない)
    pub fn tokens_to_bag_of_words<T>(&self, tokens: &[T]) -> SparseVector<u32>
    where
        T: AsRef<str>,
    {
        SparseVector::from_pairs(
            tokens
                .iter()
                .filter_map(|tok| self.id(tok.as_ref()))
                .map(|id| (id, 1u32)),
        )
    }
}

/// Builds a dictionary while the corpus is being tokenized.
/// TermIDs are handed out densely in first-seen order.
#[derive(Debug, Default)]
pub struct DictionaryBuilder {
    terms: IndexMap<Box<str>, u64>,
    num_docs: u64,
}

impl DictionaryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register one document and return its bag-of-words
    pub fn add_document<T>(&mut self, tokens: &[T]) -> SparseVector<u32>
    where
        T: AsRef<str>,
    {
        self.num_docs += 1;
        let bow = SparseVector::from_pairs(tokens.iter().map(|tok| {
            let tok = tok.as_ref();
            let id = match self.terms.get_index_of(tok) {
                Some(id) => id,
                None => self.terms.insert_full(tok.into(), 0).0,
            };
            (id as u32, 1u32)
        }));
        // every term of the bag counts once toward its document frequency
        for id in bow.term_ids() {
            if let Some((_, df)) = self.terms.get_index_mut(*id as usize) {
                *df += 1;
            }
        }
        bow
    }

    pub fn num_docs(&self) -> u64 {
        self.num_docs
    }

    pub fn finish(self) -> TermDictionary {
        let mut dict = TermDictionary::default();
        for (id, (term, doc_freq)) in self.terms.into_iter().enumerate() {
            let entry = TermEntry {
                id: id as u32,
                doc_freq,
            };
            let (pos, _) = dict.terms.insert_full(term, entry);
            dict.by_id.insert(entry.id, pos);
        }
        dict.num_terms = dict.terms.len();
        dict
    }
}
