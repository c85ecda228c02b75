pub mod shard;

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::utils::math::vector::DenseVector;
use crate::vectorizer::evaluate::scoring::Hits;
use crate::vectorizer::serde::{load_artifact, save_artifact, Artifact};

pub use shard::IndexShard;

/// 類似度インデックス
/// Unit-norm topic vectors of every corpus document, split into shards of
/// contiguous document ranges. Shard `i` starts where shard `i - 1` ends.
#[derive(Debug, Clone, PartialEq)]
pub struct SimilarityIndex {
    num_features: usize,
    shards: Vec<IndexShard>,
}

/// On-disk description of an index; the shards live next to it as
/// `<index>.0`, `<index>.1`, ...
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct IndexManifest {
    num_features: usize,
    num_docs: u64,
    /// (offset, len) of every shard
    shards: Vec<(u32, u32)>,
}

impl Artifact for IndexManifest {
    const KIND: &'static str = "index";
}

/// Path of shard `n` of the index stored at `path`
pub fn shard_path(path: &Path, n: usize) -> PathBuf {
    let mut name: OsString = path.as_os_str().to_owned();
    name.push(format!(".{n}"));
    PathBuf::from(name)
}

impl SimilarityIndex {
    /// Cosine similarity of `vec` against every document
    ///
    /// # Arguments
    /// * `vec` - topic-space query; normalized here, the zero vector scores 0 everywhere
    ///
    /// # Returns
    /// * `Hits` - one entry per document, ascending document index
    ///
    /// # Errors
    /// `Format` when any score is NaN; no document is ever dropped silently.
    pub fn query(&self, vec: &DenseVector) -> Result<Hits> {
        if vec.dim() != self.num_features {
            return Err(Error::DimensionMismatch {
                what: "query vector",
                expected: self.num_features,
                got: vec.dim(),
            });
        }
        let query = vec.normalized();
        let parts: Vec<Vec<(u32, f32)>> = self
            .shards
            .par_iter()
            .map(|shard| shard.scores(query.as_slice()))
            .collect();
        let mut list = Vec::with_capacity(self.num_docs());
        for part in parts {
            list.extend(part);
        }
        if let Some((doc, _)) = list.iter().find(|(_, s)| s.is_nan()) {
            return Err(Error::Format(format!("document {doc} scored NaN")));
        }
        Ok(Hits::new(list))
    }

    #[inline]
    pub fn num_features(&self) -> usize {
        self.num_features
    }

    pub fn num_docs(&self) -> usize {
        self.shards.iter().map(IndexShard::len).sum()
    }

    #[inline]
    pub fn shards(&self) -> &[IndexShard] {
        &self.shards
    }

    /// Stored unit vector of a document
    pub fn vector(&self, doc: u32) -> Option<&[f32]> {
        self.shards.iter().find_map(|shard| shard.vector(doc))
    }

    /// Write the manifest to `path` and every shard to `shard_path(path, n)`
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        for (n, shard) in self.shards.iter().enumerate() {
            shard.save(shard_path(path, n))?;
        }
        let manifest = IndexManifest {
            num_features: self.num_features,
            num_docs: self.num_docs() as u64,
            shards: self
                .shards
                .iter()
                .map(|s| (s.offset(), s.len() as u32))
                .collect(),
        };
        save_artifact(path, &manifest)?;
        info!(
            path = %path.display(),
            docs = manifest.num_docs,
            shards = self.shards.len(),
            "saved similarity index"
        );
        Ok(())
    }

    /// Load the manifest and all its shards
    ///
    /// # Errors
    /// `Format` when a shard disagrees with the manifest (offset, length,
    /// feature count) or the shards do not tile `0..num_docs`.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let manifest: IndexManifest = load_artifact(path)?;
        let mut shards = Vec::with_capacity(manifest.shards.len());
        let mut next = 0u64;
        for (n, &(offset, len)) in manifest.shards.iter().enumerate() {
            let shard = IndexShard::load(shard_path(path, n))?;
            if offset as u64 != next {
                return Err(Error::Format(format!(
                    "shard {n} starts at {offset}, expected {next}"
                )));
            }
            if shard.offset() != offset || shard.len() != len as usize {
                return Err(Error::Format(format!(
                    "shard {n} holds [{}, +{}), manifest says [{offset}, +{len})",
                    shard.offset(),
                    shard.len()
                )));
            }
            if shard.num_features() != manifest.num_features {
                return Err(Error::Format(format!(
                    "shard {n} has {} features, index has {}",
                    shard.num_features(),
                    manifest.num_features
                )));
            }
            debug!(shard = n, offset, len, "loaded index shard");
            next += len as u64;
            shards.push(shard);
        }
        if next != manifest.num_docs {
            return Err(Error::Format(format!(
                "shards hold {next} documents, manifest declares {}",
                manifest.num_docs
            )));
        }
        info!(
            path = %path.display(),
            docs = next,
            features = manifest.num_features,
            shards = shards.len(),
            "loaded similarity index"
        );
        Ok(Self {
            num_features: manifest.num_features,
            shards,
        })
    }
}

/// Builds a `SimilarityIndex` one document at a time.
/// A shard is sealed once it holds `shard_size` documents.
#[derive(Debug)]
pub struct SimilarityIndexBuilder {
    num_features: usize,
    shard_size: usize,
    sealed: Vec<IndexShard>,
    current: IndexShard,
}

impl SimilarityIndexBuilder {
    /// # Errors
    /// `Config` when `num_features` or `shard_size` is 0
    pub fn new(num_features: usize, shard_size: usize) -> Result<Self> {
        if num_features == 0 {
            return Err(Error::Config("index needs at least one feature".into()));
        }
        if shard_size == 0 {
            return Err(Error::Config("shard_size must be at least 1".into()));
        }
        Ok(Self {
            num_features,
            shard_size,
            sealed: Vec::new(),
            current: IndexShard::new(0, num_features),
        })
    }

    /// Continue an existing index. Its shards are kept; a last shard smaller
    /// than `shard_size` is reopened and filled first.
    pub fn from_index(index: SimilarityIndex, shard_size: usize) -> Result<Self> {
        let mut builder = Self::new(index.num_features, shard_size)?;
        let mut shards = index.shards;
        builder.current = match shards.pop() {
            Some(last) if last.len() < shard_size => last,
            Some(last) => {
                let next = last.offset() + last.len() as u32;
                shards.push(last);
                IndexShard::new(next, index.num_features)
            }
            None => IndexShard::new(0, index.num_features),
        };
        builder.sealed = shards;
        Ok(builder)
    }

    /// Append a document; returns its index
    ///
    /// # Errors
    /// `Config` when the vector holds NaN or an infinity
    pub fn add(&mut self, vec: &DenseVector) -> Result<u32> {
        if vec.dim() != self.num_features {
            return Err(Error::DimensionMismatch {
                what: "document vector",
                expected: self.num_features,
                got: vec.dim(),
            });
        }
        let doc = self.current.offset() + self.current.len() as u32;
        if vec.as_slice().iter().any(|v| !v.is_finite()) {
            return Err(Error::Config(format!("document {doc} has a non-finite topic vector")));
        }
        self.current.push(vec.as_slice());
        if self.current.len() >= self.shard_size {
            let next = IndexShard::new(doc + 1, self.num_features);
            self.sealed.push(std::mem::replace(&mut self.current, next));
        }
        Ok(doc)
    }

    /// Documents added so far, including kept ones
    pub fn num_docs(&self) -> usize {
        self.current.offset() as usize + self.current.len()
    }

    pub fn finish(self) -> SimilarityIndex {
        let mut shards = self.sealed;
        if !self.current.is_empty() {
            shards.push(self.current);
        }
        SimilarityIndex {
            num_features: self.num_features,
            shards,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vectors() -> Vec<DenseVector> {
        vec![
            DenseVector::new(vec![1.0, 0.0, 0.0]),
            DenseVector::new(vec![0.0, 2.0, 0.0]),
            DenseVector::new(vec![1.0, 1.0, 0.0]),
            DenseVector::new(vec![0.0, 0.0, -3.0]),
            DenseVector::new(vec![0.5, 0.0, 0.5]),
        ]
    }

    fn build(shard_size: usize) -> SimilarityIndex {
        let mut builder = SimilarityIndexBuilder::new(3, shard_size).unwrap();
        for v in vectors() {
            builder.add(&v).unwrap();
        }
        builder.finish()
    }

    #[test]
    fn every_document_is_its_own_best_match() {
        let index = build(2);
        for (doc, v) in vectors().iter().enumerate() {
            let mut hits = index.query(v).unwrap();
            let own = hits.score_of(doc as u32).unwrap();
            assert!((own - 1.0).abs() < 1e-6);
            hits.sort_by_score();
            assert_eq!(hits.list[0].0, doc as u32);
        }
    }

    #[test]
    fn sharding_does_not_change_results() {
        let query = DenseVector::new(vec![0.3, -0.2, 0.9]);
        let whole = build(100).query(&query).unwrap();
        for shard_size in [1, 2, 3] {
            let index = build(shard_size);
            assert_eq!(index.shards().len(), 5usize.div_ceil(shard_size));
            assert_eq!(index.query(&query).unwrap(), whole);
        }
        let ids: Vec<u32> = whole.iter().map(|(d, _)| *d).collect();
        assert_eq!(ids, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn zero_query_scores_zero() {
        let hits = build(2).query(&DenseVector::zeros(3)).unwrap();
        assert_eq!(hits.len(), 5);
        assert!(hits.iter().all(|(_, s)| *s == 0.0));
    }

    #[test]
    fn dimension_mismatch_is_an_error() {
        let index = build(2);
        assert!(matches!(
            index.query(&DenseVector::zeros(2)),
            Err(Error::DimensionMismatch { expected: 3, got: 2, .. })
        ));
        let mut builder = SimilarityIndexBuilder::new(3, 2).unwrap();
        assert!(builder.add(&DenseVector::zeros(4)).is_err());
        assert!(SimilarityIndexBuilder::new(3, 0).is_err());
    }

    #[test]
    fn non_finite_documents_are_rejected() {
        let mut builder = SimilarityIndexBuilder::new(2, 2).unwrap();
        builder.add(&DenseVector::new(vec![1.0, 0.0])).unwrap();
        let bad = DenseVector::new(vec![f32::NAN, 1.0]);
        assert!(matches!(builder.add(&bad), Err(Error::Config(_))));
        let inf = DenseVector::new(vec![f32::INFINITY, 0.0]);
        assert!(matches!(builder.add(&inf), Err(Error::Config(_))));
        assert_eq!(builder.num_docs(), 1);
    }

    #[test]
    fn nan_scores_fail_the_query() {
        let mut shard = IndexShard::new(0, 2);
        shard.push(&[1.0, 0.0]);
        shard.push(&[0.0, 1.0]);
        shard.push(&[1.0, 1.0]);
        let index = SimilarityIndex {
            num_features: 2,
            shards: vec![shard],
        };
        let nan = DenseVector::new(vec![f32::NAN, 1.0]);
        assert!(matches!(index.query(&nan), Err(Error::Format(_))));
        assert_eq!(index.query(&DenseVector::new(vec![1.0, 1.0])).unwrap().len(), 3);
    }

    #[test]
    fn save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("irlsi.index");
        let index = build(2);
        index.save(&path).unwrap();
        assert!(shard_path(&path, 2).exists());
        let loaded = SimilarityIndex::load(&path).unwrap();
        assert_eq!(loaded, index);
    }

    #[test]
    fn missing_shard_fails_to_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("irlsi.index");
        build(2).save(&path).unwrap();
        std::fs::remove_file(shard_path(&path, 1)).unwrap();
        assert!(matches!(SimilarityIndex::load(&path), Err(Error::Io(_))));
    }

    #[test]
    fn swapped_shards_are_a_format_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("irlsi.index");
        build(2).save(&path).unwrap();
        let tmp = dir.path().join("swap");
        std::fs::rename(shard_path(&path, 0), &tmp).unwrap();
        std::fs::rename(shard_path(&path, 1), shard_path(&path, 0)).unwrap();
        std::fs::rename(&tmp, shard_path(&path, 1)).unwrap();
        assert!(matches!(SimilarityIndex::load(&path), Err(Error::Format(_))));
    }

    #[test]
    fn growing_an_index_matches_building_it_at_once() {
        let all = vectors();
        let mut first = SimilarityIndexBuilder::new(3, 2).unwrap();
        for v in &all[..3] {
            first.add(v).unwrap();
        }
        let partial = first.finish();
        assert_eq!(partial.shards().len(), 2);

        let mut grow = SimilarityIndexBuilder::from_index(partial, 2).unwrap();
        assert_eq!(grow.num_docs(), 3);
        assert_eq!(grow.add(&all[3]).unwrap(), 3);
        assert_eq!(grow.add(&all[4]).unwrap(), 4);
        assert_eq!(grow.finish(), build(2));
    }
}
