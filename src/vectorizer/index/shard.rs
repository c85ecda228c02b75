use std::path::Path;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::utils::math::vector::math::{dot, normalize_in_place};
use crate::vectorizer::serde::{load_artifact, save_artifact, Artifact};

/// IndexShard 構造体
/// 連続したドキュメント範囲 `[offset, offset + len)` の正規化済みベクトル
///
/// `vectors` is row-major `len x num_features`; every row has unit norm,
/// or is all zero for a document that projected to the origin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexShard {
    offset: u32,
    num_features: usize,
    vectors: Vec<f32>,
}

impl Artifact for IndexShard {
    const KIND: &'static str = "index-shard";
}

impl IndexShard {
    pub fn new(offset: u32, num_features: usize) -> Self {
        Self {
            offset,
            num_features,
            vectors: Vec::new(),
        }
    }

    /// Append one vector, normalizing it
    pub(crate) fn push(&mut self, values: &[f32]) {
        debug_assert_eq!(values.len(), self.num_features);
        let start = self.vectors.len();
        self.vectors.extend_from_slice(values);
        normalize_in_place(&mut self.vectors[start..]);
    }

    /// First document index held
    #[inline]
    pub fn offset(&self) -> u32 {
        self.offset
    }

    #[inline]
    pub fn num_features(&self) -> usize {
        self.num_features
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.vectors.len() / self.num_features.max(1)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    /// Stored (normalized) vector of a global document index
    pub fn vector(&self, doc: u32) -> Option<&[f32]> {
        let local = doc.checked_sub(self.offset)? as usize;
        if local >= self.len() {
            return None;
        }
        let start = local * self.num_features;
        Some(&self.vectors[start..start + self.num_features])
    }

    /// Cosine of a unit-norm query against every row
    ///
    /// # Returns
    /// * `Vec<(u32, f32)>` - (global document index, score) in index order
    pub fn scores(&self, query: &[f32]) -> Vec<(u32, f32)> {
        let k = self.num_features;
        if k == 0 {
            return Vec::new();
        }
        self.vectors
            .par_chunks(k)
            .enumerate()
            .map(|(i, row)| (self.offset + i as u32, dot(row, query)))
            .collect()
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        save_artifact(path, self)
    }

    /// Load one shard on its own
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let shard: IndexShard = load_artifact(path.as_ref())?;
        if shard.num_features == 0 || shard.vectors.len() % shard.num_features != 0 {
            return Err(Error::Format(format!(
                "{}: {} values do not split into rows of {}",
                path.as_ref().display(),
                shard.vectors.len(),
                shard.num_features
            )));
        }
        if let Some(at) = shard.vectors.iter().position(|v| !v.is_finite()) {
            return Err(Error::Format(format!(
                "{}: document {} has a non-finite value",
                path.as_ref().display(),
                shard.offset as usize + at / shard.num_features
            )));
        }
        Ok(shard)
    }
}
