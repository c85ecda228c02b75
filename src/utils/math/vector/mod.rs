pub mod math;

use num::Num;

use crate::utils::sort::sort_merge_u32_soa;

/// SparseVector は TermID 空間の疎ベクトルです
/// (TermID, weight) の組を SoA (inds / vals) で保持します
///
/// Invariants kept by every constructor:
/// - `inds` strictly ascending (TermIDs unique)
/// - no stored zero weight
///
/// `N` is `u32` for a raw bag-of-words and `f32` once weighted.
#[derive(Debug, Clone, PartialEq)]
pub struct SparseVector<N = f32>
where
    N: Num + Copy,
{
    inds: Vec<u32>,
    vals: Vec<N>,
}

impl<N> Default for SparseVector<N>
where
    N: Num + Copy,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<N> SparseVector<N>
where
    N: Num + Copy,
{
    #[inline]
    pub fn new() -> Self {
        SparseVector {
            inds: Vec::new(),
            vals: Vec::new(),
        }
    }

    /// Build from pairs in any order
    /// Duplicate TermIDs are summed, zero weights dropped
    ///
    /// # Arguments
    /// * `pairs` - (TermID, weight)
    pub fn from_pairs<I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (u32, N)>,
    {
        let (mut inds, mut vals): (Vec<u32>, Vec<N>) = pairs.into_iter().unzip();
        let len = sort_merge_u32_soa(&mut inds, &mut vals);
        inds.truncate(len);
        vals.truncate(len);
        let mut vec = SparseVector { inds, vals };
        vec.retain_nonzero();
        vec
    }

    /// Build from parts already ascending and unique
    /// Only zero weights are filtered here
    pub(crate) fn from_sorted_parts(inds: Vec<u32>, vals: Vec<N>) -> Self {
        debug_assert_eq!(inds.len(), vals.len());
        debug_assert!(inds.windows(2).all(|w| w[0] < w[1]), "inds must be strictly ascending");
        let mut vec = SparseVector { inds, vals };
        vec.retain_nonzero();
        vec
    }

    fn retain_nonzero(&mut self) {
        if self.vals.iter().all(|v| !v.is_zero()) {
            return;
        }
        let mut write = 0;
        for read in 0..self.vals.len() {
            if !self.vals[read].is_zero() {
                self.inds[write] = self.inds[read];
                self.vals[write] = self.vals[read];
                write += 1;
            }
        }
        self.inds.truncate(write);
        self.vals.truncate(write);
    }

    /// number of stored (non-zero) entries
    #[inline]
    pub fn nnz(&self) -> usize {
        self.inds.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.inds.is_empty()
    }

    #[inline]
    pub fn term_ids(&self) -> &[u32] {
        &self.inds
    }

    #[inline]
    pub fn weights(&self) -> &[N] {
        &self.vals
    }

    /// Weight of `term`, zero when absent
    #[inline]
    pub fn get(&self, term: u32) -> N {
        match self.inds.binary_search(&term) {
            Ok(pos) => self.vals[pos],
            Err(_) => N::zero(),
        }
    }

    /// Highest TermID stored, None for the zero vector
    #[inline]
    pub fn max_term(&self) -> Option<u32> {
        self.inds.last().copied()
    }

    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = (u32, N)> + '_ {
        self.inds.iter().copied().zip(self.vals.iter().copied())
    }
}

/// DenseVector は LSI の topic 空間のベクトルです
/// 長さ K はモデル単位で固定
#[derive(Debug, Clone, PartialEq, Default, ::serde::Serialize, ::serde::Deserialize)]
pub struct DenseVector(Vec<f32>);

impl DenseVector {
    #[inline]
    pub fn new(values: Vec<f32>) -> Self {
        DenseVector(values)
    }

    #[inline]
    pub fn zeros(dim: usize) -> Self {
        DenseVector(vec![0.0; dim])
    }

    #[inline]
    pub fn dim(&self) -> usize {
        self.0.len()
    }

    #[inline]
    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    #[inline]
    pub fn into_vec(self) -> Vec<f32> {
        self.0
    }
}

impl From<Vec<f32>> for DenseVector {
    fn from(values: Vec<f32>) -> Self {
        DenseVector(values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_pairs_sorts_and_merges() {
        let v = SparseVector::from_pairs(vec![(5u32, 1u32), (2, 3), (5, 2), (0, 1)]);
        assert_eq!(v.term_ids(), &[0, 2, 5]);
        assert_eq!(v.weights(), &[1, 3, 3]);
        assert_eq!(v.get(5), 3);
        assert_eq!(v.get(4), 0);
        assert_eq!(v.max_term(), Some(5));
    }

    #[test]
    fn zero_weights_vanish() {
        let v = SparseVector::from_pairs(vec![(1u32, 0.0f32), (3, 0.5)]);
        assert_eq!(v.nnz(), 1);
        assert_eq!(v.term_ids(), &[3]);
    }

    #[test]
    fn order_of_input_does_not_matter() {
        let a = SparseVector::from_pairs(vec![(9u32, 1.5f32), (1, 2.0), (4, 0.25)]);
        let b = SparseVector::from_pairs(vec![(4u32, 0.25f32), (9, 1.5), (1, 2.0)]);
        assert_eq!(a, b);
    }

    #[test]
    fn empty_vector() {
        let v: SparseVector<f32> = SparseVector::from_pairs(Vec::new());
        assert!(v.is_empty());
        assert_eq!(v.max_term(), None);
    }
}
