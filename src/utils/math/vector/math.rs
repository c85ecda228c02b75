use std::cmp::Ordering;

use num::Num;

use super::{DenseVector, SparseVector};

impl<N> SparseVector<N>
where
    N: Num + Copy + Into<f64>,
{
    /// ドット積を計算するメソッド
    /// 両方のインデックスが昇順であることを利用したマージ
    ///
    /// # Arguments
    /// * `other` - 他のベクトル
    ///
    /// # Returns
    /// * `f64` - ドット積の結果
    pub fn dot<M>(&self, other: &SparseVector<M>) -> f64
    where
        M: Num + Copy + Into<f64>,
    {
        let (a_inds, a_vals) = (self.term_ids(), self.weights());
        let (b_inds, b_vals) = (other.term_ids(), other.weights());
        let mut result = 0.0;
        let mut i = 0;
        let mut j = 0;
        while i < a_inds.len() && j < b_inds.len() {
            match a_inds[i].cmp(&b_inds[j]) {
                Ordering::Equal => {
                    result += a_vals[i].into() * b_vals[j].into();
                    i += 1;
                    j += 1;
                }
                Ordering::Less => i += 1,
                Ordering::Greater => j += 1,
            }
        }
        result
    }

    #[inline]
    pub fn norm_sq(&self) -> f64 {
        self.weights()
            .iter()
            .map(|&v| {
                let v: f64 = v.into();
                v * v
            })
            .sum()
    }

    #[inline]
    pub fn norm(&self) -> f64 {
        self.norm_sq().sqrt()
    }

    /// Unit L2 norm copy as f32 weights
    /// The zero vector stays the zero vector
    pub fn l2_normalized(&self) -> SparseVector<f32> {
        let norm = self.norm();
        let scale = if norm > 0.0 { 1.0 / norm } else { 0.0 };
        let vals = self
            .weights()
            .iter()
            .map(|&v| (v.into() * scale) as f32)
            .collect();
        SparseVector::from_sorted_parts(self.term_ids().to_vec(), vals)
    }
}

/// Dot product of two equal length slices, accumulated in f64
#[inline]
pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len(), "vectors must have same dimension");
    a.iter()
        .zip(b.iter())
        .map(|(&x, &y)| x as f64 * y as f64)
        .sum::<f64>() as f32
}

/// Scale `v` in place to unit length, leaving an all-zero slice untouched
#[inline]
pub fn normalize_in_place(v: &mut [f32]) {
    let norm = v.iter().map(|&x| x as f64 * x as f64).sum::<f64>().sqrt();
    if norm > 0.0 {
        let inv = 1.0 / norm;
        for x in v.iter_mut() {
            *x = (*x as f64 * inv) as f32;
        }
    }
}

impl DenseVector {
    #[inline]
    pub fn norm(&self) -> f64 {
        self.as_slice()
            .iter()
            .map(|&x| x as f64 * x as f64)
            .sum::<f64>()
            .sqrt()
    }

    /// Unit length copy; zero stays zero so every cosine against it is 0
    pub fn normalized(&self) -> DenseVector {
        let mut values = self.as_slice().to_vec();
        normalize_in_place(&mut values);
        DenseVector::new(values)
    }

    #[inline]
    pub fn dot(&self, other: &DenseVector) -> f32 {
        dot(self.as_slice(), other.as_slice())
    }
}
