use std::ffi::OsString;
use std::fmt::Display;
use std::fs::{self, File};
use std::io::{self, BufRead, BufReader, BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use num::Num;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::utils::math::vector::SparseVector;

/// Banner line of the Matrix Market exchange format.
pub const MM_BANNER: &str = "%%MatrixMarket matrix coordinate real general";
/// Width reserved for the size line so it can be patched in after streaming.
const SIZE_LINE_WIDTH: usize = 64;
const PROGRESS_EVERY: usize = 10_000;

/// Dimensions declared by a corpus artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CorpusHeader {
    pub num_docs: usize,
    pub num_terms: usize,
    pub num_nnz: usize,
}

/// SparseCorpusStore
/// A file-backed, ordered sequence of sparse document vectors.
///
/// The artifact is a Matrix Market coordinate file: banner, optional `%`
/// comments, a `documents terms nonzeros` size line, then one
/// `doc term weight` line per nonzero. Indices are 1-based in the file and
/// 0-based in memory. Entries are grouped by document in ascending order;
/// documents without entries are empty vectors.
#[derive(Debug, Clone)]
pub struct SparseCorpusStore {
    path: PathBuf,
    header: CorpusHeader,
    data_offset: u64,
}

impl SparseCorpusStore {
    /// Open an artifact and validate its header.
    /// Nothing beyond the header is read here.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut reader = BufReader::new(File::open(&path)?);
        let mut line = String::new();
        let mut offset = 0u64;

        offset += read_full_line(&mut reader, &mut line, "corpus banner")? as u64;
        let banner = line.trim_end().to_ascii_lowercase();
        if !banner.starts_with("%%matrixmarket") || !banner.contains("coordinate") {
            return Err(Error::Format(format!(
                "{}: not a Matrix Market coordinate file",
                path.display()
            )));
        }

        // skip comments until the size line; a blank one was never patched
        let header = loop {
            offset += read_full_line(&mut reader, &mut line, "corpus size line")? as u64;
            let trimmed = line.trim();
            if trimmed.starts_with('%') {
                continue;
            }
            break parse_size_line(trimmed)?;
        };

        info!(
            path = %path.display(),
            docs = header.num_docs,
            terms = header.num_terms,
            nnz = header.num_nnz,
            "opened sparse corpus"
        );
        Ok(Self {
            path,
            header,
            data_offset: offset,
        })
    }

    #[inline]
    pub fn header(&self) -> CorpusHeader {
        self.header
    }

    #[inline]
    pub fn num_docs(&self) -> usize {
        self.header.num_docs
    }

    #[inline]
    pub fn num_terms(&self) -> usize {
        self.header.num_terms
    }

    #[inline]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Lazily stream every document in order.
    /// Each call re-opens the artifact, so iteration can be restarted.
    pub fn iter(&self) -> Result<CorpusIter> {
        let mut file = File::open(&self.path)?;
        file.seek(SeekFrom::Start(self.data_offset))?;
        Ok(CorpusIter {
            reader: BufReader::new(file),
            header: self.header,
            line: String::new(),
            next_doc: 0,
            pending: None,
            nnz_seen: 0,
            done: false,
        })
    }

    /// Materialize the whole corpus
    pub fn read_all(&self) -> Result<Vec<SparseVector<f32>>> {
        self.iter()?.collect()
    }

    /// Stream `vectors` into a new artifact at `path` without buffering them.
    ///
    /// The size line is reserved up front and patched once the real counts are
    /// known. The declared term dimension is `num_terms`, widened if a vector
    /// holds a larger TermID.
    ///
    /// Output goes to `<path>.tmp` and is renamed over `path` only once
    /// complete; if `vectors` yields an error, `path` is left as it was.
    ///
    /// # Arguments
    /// * `path` - 出力先
    /// * `vectors` - document vectors in document order
    /// * `num_terms` - term dimension of the vectors
    pub fn serialize<P, I, N>(path: P, vectors: I, num_terms: usize) -> Result<CorpusHeader>
    where
        P: AsRef<Path>,
        I: IntoIterator<Item = Result<SparseVector<N>>>,
        N: Num + Copy + Display,
    {
        let path = path.as_ref();
        let mut tmp: OsString = path.as_os_str().to_owned();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        let header = match write_corpus(&tmp, vectors, num_terms) {
            Ok(header) => header,
            Err(e) => {
                if let Err(cleanup) = fs::remove_file(&tmp) {
                    debug!(path = %tmp.display(), "could not remove partial corpus: {cleanup}");
                }
                return Err(e);
            }
        };
        fs::rename(&tmp, path)?;

        info!(
            path = %path.display(),
            docs = header.num_docs,
            terms = header.num_terms,
            nnz = header.num_nnz,
            "serialized sparse corpus"
        );
        Ok(header)
    }
}

fn write_corpus<I, N>(path: &Path, vectors: I, num_terms: usize) -> Result<CorpusHeader>
where
    I: IntoIterator<Item = Result<SparseVector<N>>>,
    N: Num + Copy + Display,
{
    let mut writer = BufWriter::new(File::create(path)?);
    writeln!(writer, "{MM_BANNER}")?;
    let size_offset = (MM_BANNER.len() + 1) as u64;
    writeln!(writer, "{}", " ".repeat(SIZE_LINE_WIDTH))?;

    let mut header = CorpusHeader {
        num_docs: 0,
        num_terms,
        num_nnz: 0,
    };
    for vec in vectors {
        let vec = vec?;
        let doc = header.num_docs + 1;
        for (term, weight) in vec.iter() {
            writeln!(writer, "{} {} {}", doc, term as u64 + 1, weight)?;
        }
        header.num_nnz += vec.nnz();
        if let Some(max) = vec.max_term() {
            header.num_terms = header.num_terms.max(max as usize + 1);
        }
        header.num_docs += 1;
        if header.num_docs % PROGRESS_EVERY == 0 {
            debug!(docs = header.num_docs, nnz = header.num_nnz, "serializing corpus");
        }
    }

    let mut file = writer.into_inner().map_err(|e| Error::Io(e.into_error()))?;
    let size_line = format!("{} {} {}", header.num_docs, header.num_terms, header.num_nnz);
    file.seek(SeekFrom::Start(size_offset))?;
    write!(file, "{size_line:<width$}", width = SIZE_LINE_WIDTH)?;
    file.flush()?;
    Ok(header)
}

/// Read one line into `buf`; EOF or a missing trailing newline means the
/// artifact was cut short.
fn read_full_line<R: BufRead>(reader: &mut R, buf: &mut String, what: &str) -> Result<usize> {
    buf.clear();
    let n = reader.read_line(buf)?;
    if n == 0 || !buf.ends_with('\n') {
        return Err(Error::Io(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            format!("truncated corpus artifact while reading {what}"),
        )));
    }
    Ok(n)
}

fn parse_size_line(line: &str) -> Result<CorpusHeader> {
    let fields: Vec<&str> = line.split_whitespace().collect();
    let parsed: Option<Vec<usize>> = fields.iter().map(|f| f.parse().ok()).collect();
    match parsed.as_deref() {
        Some(&[num_docs, num_terms, num_nnz]) => Ok(CorpusHeader {
            num_docs,
            num_terms,
            num_nnz,
        }),
        _ => Err(Error::Format(format!("invalid corpus size line {line:?}"))),
    }
}

/// Lazy document iterator over a corpus artifact
pub struct CorpusIter {
    reader: BufReader<File>,
    header: CorpusHeader,
    line: String,
    next_doc: usize,
    /// first entry of a later document, read ahead
    pending: Option<(usize, u32, f32)>,
    nnz_seen: usize,
    done: bool,
}

impl CorpusIter {
    /// Next `(doc, term, weight)` entry, 0-based, or None at EOF
    fn next_entry(&mut self) -> Result<Option<(usize, u32, f32)>> {
        if let Some(entry) = self.pending.take() {
            return Ok(Some(entry));
        }
        loop {
            self.line.clear();
            if self.reader.read_line(&mut self.line)? == 0 {
                return Ok(None);
            }
            if !self.line.ends_with('\n') {
                return Err(Error::Io(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "truncated corpus artifact: last entry has no line end",
                )));
            }
            let trimmed = self.line.trim();
            if trimmed.is_empty() || trimmed.starts_with('%') {
                continue;
            }
            self.nnz_seen += 1;
            return parse_entry(trimmed, &self.header).map(Some);
        }
    }

    fn next_doc(&mut self) -> Result<Option<SparseVector<f32>>> {
        if self.next_doc >= self.header.num_docs {
            // everything left must already be consumed
            if let Some((doc, _, _)) = self.next_entry()? {
                return Err(Error::Format(format!(
                    "entry for document {} beyond declared document count {}",
                    doc + 1,
                    self.header.num_docs
                )));
            }
            if self.nnz_seen != self.header.num_nnz {
                return Err(Error::Format(format!(
                    "header declares {} nonzeros but {} records are present",
                    self.header.num_nnz, self.nnz_seen
                )));
            }
            return Ok(None);
        }

        let mut entries = Vec::new();
        while let Some((doc, term, weight)) = self.next_entry()? {
            if doc == self.next_doc {
                entries.push((term, weight));
            } else if doc > self.next_doc {
                self.pending = Some((doc, term, weight));
                break;
            } else {
                return Err(Error::Format(format!(
                    "document {} appears after document {}",
                    doc + 1,
                    self.next_doc + 1
                )));
            }
        }
        self.next_doc += 1;
        Ok(Some(SparseVector::from_pairs(entries)))
    }
}

fn parse_entry(line: &str, header: &CorpusHeader) -> Result<(usize, u32, f32)> {
    let mut fields = line.split_whitespace();
    let (Some(doc), Some(term), Some(weight), None) =
        (fields.next(), fields.next(), fields.next(), fields.next())
    else {
        return Err(Error::Format(format!("invalid corpus entry {line:?}")));
    };
    let invalid = || Error::Format(format!("invalid corpus entry {line:?}"));
    let doc: usize = doc.parse().map_err(|_| invalid())?;
    let term: usize = term.parse().map_err(|_| invalid())?;
    let weight: f32 = weight.parse().map_err(|_| invalid())?;
    if doc == 0 || doc > header.num_docs {
        return Err(Error::Format(format!(
            "document index {doc} outside 1..={}",
            header.num_docs
        )));
    }
    if term == 0 || term > header.num_terms || term > u32::MAX as usize {
        return Err(Error::Format(format!(
            "term index {term} outside 1..={}",
            header.num_terms
        )));
    }
    Ok((doc - 1, (term - 1) as u32, weight))
}

impl Iterator for CorpusIter {
    type Item = Result<SparseVector<f32>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.next_doc() {
            Ok(Some(vec)) => Some(Ok(vec)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}
