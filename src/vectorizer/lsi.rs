use nalgebra::DMatrix;
use num::Num;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::utils::math::vector::{DenseVector, SparseVector};

/// Singular values closer than this (relative to the largest) share a subspace
const DEGENERATE_RTOL: f64 = 1e-9;
/// A pivot axis must keep at least this share of the largest residual
const PIVOT_RATIO: f64 = 0.5;

/// LsiModel 構造体
/// Rank-K truncated SVD of the weighted term-document matrix.
///
/// `projection` is V x K row-major: row `t` holds the loadings of TermID `t`
/// on every topic, so projecting a sparse vector touches only its non-zero rows.
/// A vector is projected as `U_k^T v` (no scaling by the singular values).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LsiModel {
    num_terms: usize,
    num_topics: usize,
    /// descending
    singular_values: Vec<f64>,
    projection: Vec<f32>,
}

impl LsiModel {
    /// Fit a K-topic model
    ///
    /// # Arguments
    /// * `docs` - weighted document vectors, one column each
    /// * `num_terms` - term dimension V
    /// * `num_topics` - K
    ///
    /// # Errors
    /// `Config` when K is 0, larger than `min(V, N)` or larger than the numeric
    /// rank of the matrix. `DimensionMismatch` when a document has a TermID >= V.
    ///
    /// The basis is made deterministic: inside every group of equal singular
    /// values the vectors are re-derived by pivoted Gram-Schmidt over the term
    /// axes, which fixes both the sign and the choice of basis of the subspace.
    ///
    /// # Memory
    /// The whole weighted corpus is decomposed as one dense `V x N` f64 matrix,
    /// so the fit needs at least `8 * V * N` bytes plus the `V x min(V, N)`
    /// left factor. 100k terms by 50k documents is already about 40 GB; use
    /// it on corpora whose dense matrix fits in memory. A size that cannot
    /// even be addressed is a `Config` error.
    pub fn fit(docs: &[SparseVector<f32>], num_terms: usize, num_topics: usize) -> Result<Self> {
        let num_docs = docs.len();
        if num_topics == 0 {
            return Err(Error::Config("num_topics must be at least 1".into()));
        }
        let max_rank = num_terms.min(num_docs);
        if num_topics > max_rank {
            return Err(Error::Config(format!(
                "num_topics {num_topics} exceeds min(terms, docs) = {max_rank}"
            )));
        }

        let dense_bytes = num_terms
            .checked_mul(num_docs)
            .and_then(|cells| cells.checked_mul(std::mem::size_of::<f64>()));
        if dense_bytes.is_none() {
            return Err(Error::Config(format!(
                "{num_terms} terms x {num_docs} documents do not fit in one dense matrix"
            )));
        }

        let mut matrix = DMatrix::<f64>::zeros(num_terms, num_docs);
        for (col, doc) in docs.iter().enumerate() {
            for (term, weight) in doc.iter() {
                if term as usize >= num_terms {
                    return Err(Error::DimensionMismatch {
                        what: "document term",
                        expected: num_terms,
                        got: term as usize + 1,
                    });
                }
                matrix[(term as usize, col)] = weight as f64;
            }
        }
        debug!(terms = num_terms, docs = num_docs, "running svd");

        let svd = matrix
            .try_svd(true, false, f64::EPSILON, 0)
            .ok_or_else(|| Error::Config("svd did not converge".into()))?;
        let u = svd
            .u
            .ok_or_else(|| Error::Config("svd produced no left singular vectors".into()))?;

        // column order by descending singular value
        let mut order: Vec<usize> = (0..svd.singular_values.len()).collect();
        order.sort_by(|&x, &y| svd.singular_values[y].total_cmp(&svd.singular_values[x]));
        let sigma: Vec<f64> = order.iter().map(|&i| svd.singular_values[i]).collect();

        let sigma_max = sigma.first().copied().unwrap_or(0.0);
        let tol = sigma_max * num_terms.max(num_docs) as f64 * f64::EPSILON;
        let rank = sigma.iter().take_while(|&&s| s > tol).count();
        if num_topics > rank {
            return Err(Error::Config(format!(
                "num_topics {num_topics} exceeds the matrix rank {rank}"
            )));
        }

        let basis = canonical_basis(&u, &order, &sigma, num_topics);
        let mut projection = vec![0f32; num_terms * num_topics];
        for (topic, vector) in basis.iter().enumerate() {
            for (term, &x) in vector.iter().enumerate() {
                projection[term * num_topics + topic] = x as f32;
            }
        }

        info!(
            terms = num_terms,
            docs = num_docs,
            topics = num_topics,
            rank,
            "fitted lsi model"
        );
        Ok(Self {
            num_terms,
            num_topics,
            singular_values: sigma[..num_topics].to_vec(),
            projection,
        })
    }

    /// Topic-space image of a term-space vector.
    /// TermIDs >= V contribute nothing; the zero vector maps to zeros.
    pub fn project<N>(&self, vec: &SparseVector<N>) -> DenseVector
    where
        N: Num + Copy + Into<f64>,
    {
        let mut acc = vec![0f64; self.num_topics];
        for (term, weight) in vec.iter() {
            let Some(row) = self.loadings(term) else {
                continue;
            };
            let weight: f64 = weight.into();
            for (a, &l) in acc.iter_mut().zip(row) {
                *a += weight * l as f64;
            }
        }
        DenseVector::new(acc.into_iter().map(|x| x as f32).collect())
    }

    /// `project` over many vectors in parallel, order preserved
    pub fn project_batch(&self, vecs: &[SparseVector<f32>]) -> Vec<DenseVector> {
        vecs.par_iter().map(|v| self.project(v)).collect()
    }

    /// Row of the projection for one term
    #[inline]
    pub fn loadings(&self, term: u32) -> Option<&[f32]> {
        let start = term as usize * self.num_topics;
        if (term as usize) < self.num_terms {
            Some(&self.projection[start..start + self.num_topics])
        } else {
            None
        }
    }

    #[inline]
    pub fn num_terms(&self) -> usize {
        self.num_terms
    }

    #[inline]
    pub fn num_topics(&self) -> usize {
        self.num_topics
    }

    #[inline]
    pub fn singular_values(&self) -> &[f64] {
        &self.singular_values
    }

    /// Shape check for a deserialized model
    pub(crate) fn check_shape(&self) -> Result<()> {
        if self.projection.len() != self.num_terms * self.num_topics {
            return Err(Error::Format(format!(
                "lsi projection holds {} values, expected {} x {}",
                self.projection.len(),
                self.num_terms,
                self.num_topics
            )));
        }
        if self.singular_values.len() != self.num_topics {
            return Err(Error::Format(format!(
                "lsi model has {} singular values for {} topics",
                self.singular_values.len(),
                self.num_topics
            )));
        }
        if self.projection.iter().any(|v| !v.is_finite())
            || self.singular_values.iter().any(|v| !v.is_finite())
        {
            return Err(Error::Format("lsi model holds non-finite values".into()));
        }
        Ok(())
    }
}

/// First `needed` basis vectors, groups of tied singular values replaced by
/// their canonical basis
fn canonical_basis(u: &DMatrix<f64>, order: &[usize], sigma: &[f64], needed: usize) -> Vec<Vec<f64>> {
    let group_tol = DEGENERATE_RTOL * sigma.first().copied().unwrap_or(0.0);
    let mut basis = Vec::with_capacity(needed);
    let mut start = 0;
    while basis.len() < needed && start < sigma.len() {
        let mut end = start + 1;
        while end < sigma.len() && sigma[end - 1] - sigma[end] <= group_tol {
            end += 1;
        }
        let take = (end - start).min(needed - basis.len());
        basis.extend(group_basis(u, &order[start..end], take));
        start = end;
    }
    basis
}

/// Pivoted Gram-Schmidt of the term axes projected onto span(u[:, cols]).
/// Each step takes the lowest axis whose residual is within `PIVOT_RATIO` of
/// the largest; the resulting vector is positive on that axis.
fn group_basis(u: &DMatrix<f64>, cols: &[usize], take: usize) -> Vec<Vec<f64>> {
    let dim = u.nrows();
    // |P e_i|^2 minus what the chosen vectors already cover
    let mut residual: Vec<f64> = (0..dim)
        .map(|i| cols.iter().map(|&j| u[(i, j)] * u[(i, j)]).sum())
        .collect();
    let mut out: Vec<Vec<f64>> = Vec::with_capacity(take);

    for _ in 0..take {
        let max = residual.iter().copied().fold(0.0, f64::max);
        if max <= 0.0 {
            break;
        }
        let Some(pivot) = residual.iter().position(|&r| r >= PIVOT_RATIO * max) else {
            break;
        };

        let mut vector = vec![0f64; dim];
        for &j in cols {
            let c = u[(pivot, j)];
            for (i, x) in vector.iter_mut().enumerate() {
                *x += c * u[(i, j)];
            }
        }
        for prev in &out {
            let c = prev[pivot];
            for (x, &p) in vector.iter_mut().zip(prev.iter()) {
                *x -= c * p;
            }
        }
        let norm = vector.iter().map(|x| x * x).sum::<f64>().sqrt();
        if norm == 0.0 {
            break;
        }
        vector.iter_mut().for_each(|x| *x /= norm);
        for (r, &x) in residual.iter_mut().zip(vector.iter()) {
            *r -= x * x;
        }
        out.push(vector);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    /// cat/dog/fish corpus after tf-idf with L2 normalization
    fn pets() -> Vec<SparseVector<f32>> {
        let s = 5f32.sqrt();
        vec![
            SparseVector::from_pairs(vec![(0, 2.0 / s), (1, 1.0 / s)]),
            SparseVector::from_pairs(vec![(1, 2.0 / s), (2, 1.0 / s)]),
            SparseVector::from_pairs(vec![(0, 1.0 / s), (2, 2.0 / s)]),
        ]
    }

    #[test]
    fn non_finite_loadings_fail_the_shape_check() {
        let mut model = LsiModel::fit(&pets(), 3, 2).unwrap();
        assert!(model.check_shape().is_ok());
        model.projection[3] = f32::NAN;
        assert!(matches!(model.check_shape(), Err(Error::Format(_))));
    }

    #[test]
    fn unaddressable_dense_matrix_is_a_config_error() {
        let result = LsiModel::fit(&pets(), usize::MAX / 2, 1);
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn singular_values_descend() {
        let model = LsiModel::fit(&pets(), 3, 3).unwrap();
        let sv = model.singular_values();
        assert!((sv[0] - 3.0 / 5f64.sqrt()).abs() < 1e-9);
        assert!((sv[1] - (3.0f64 / 5.0).sqrt()).abs() < 1e-9);
        assert!((sv[2] - (3.0f64 / 5.0).sqrt()).abs() < 1e-9);
    }

    #[test]
    fn tied_singular_vectors_get_canonical_basis() {
        let model = LsiModel::fit(&pets(), 3, 2).unwrap();
        let cat = model.loadings(0).unwrap();
        assert!((cat[0] - 1.0 / 3f32.sqrt()).abs() < 1e-5);
        assert!((cat[1] - 2.0 / 6f32.sqrt()).abs() < 1e-5);
        let dog = model.loadings(1).unwrap();
        assert!((dog[0] - 1.0 / 3f32.sqrt()).abs() < 1e-5);
        assert!((dog[1] + 1.0 / 6f32.sqrt()).abs() < 1e-5);
    }

    #[test]
    fn cosine_ranking_in_topic_space() {
        let docs = pets();
        let model = LsiModel::fit(&docs, 3, 2).unwrap();
        let query = model.project(&SparseVector::from_pairs(vec![(0u32, 1.0f32)])).normalized();
        let cos: Vec<f32> = model
            .project_batch(&docs)
            .iter()
            .map(|d| query.dot(&d.normalized()))
            .collect();
        assert!((cos[0] - 0.9428).abs() < 1e-3);
        assert!(cos[1].abs() < 1e-5);
        assert!((cos[2] - 0.5774).abs() < 1e-3);
    }

    #[test]
    fn refitting_gives_the_same_model() {
        let a = LsiModel::fit(&pets(), 3, 2).unwrap();
        let b = LsiModel::fit(&pets(), 3, 2).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn topic_count_is_bounded() {
        assert!(matches!(LsiModel::fit(&pets(), 3, 0), Err(Error::Config(_))));
        assert!(matches!(LsiModel::fit(&pets(), 3, 4), Err(Error::Config(_))));

        // two identical documents: rank 1
        let twins = vec![
            SparseVector::from_pairs(vec![(0u32, 1.0f32)]),
            SparseVector::from_pairs(vec![(0u32, 1.0f32)]),
        ];
        assert!(matches!(LsiModel::fit(&twins, 2, 2), Err(Error::Config(_))));
        assert!(LsiModel::fit(&twins, 2, 1).is_ok());
    }

    #[test]
    fn out_of_range_terms() {
        let docs = vec![SparseVector::from_pairs(vec![(5u32, 1.0f32)])];
        assert!(matches!(
            LsiModel::fit(&docs, 3, 1),
            Err(Error::DimensionMismatch { .. })
        ));

        let model = LsiModel::fit(&pets(), 3, 2).unwrap();
        let projected = model.project(&SparseVector::from_pairs(vec![(42u32, 1.0f32)]));
        assert_eq!(projected, DenseVector::zeros(2));
    }
}
