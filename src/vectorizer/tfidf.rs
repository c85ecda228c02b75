use std::marker::PhantomData;

use num::Num;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{Error, Result};
use crate::utils::math::vector::SparseVector;
use crate::vectorizer::dictionary::TermDictionary;

/// Weighting strategy plugged into `TfidfModel`
pub trait TfidfEngine {
    /// Global weight of a term
    /// # Arguments
    /// * `doc_freq` - documents containing the term
    /// * `num_docs` - documents in the corpus
    fn idf(doc_freq: u64, num_docs: u64) -> f64;

    /// Local weight of a raw count
    fn tf(count: f64) -> f64;
}

/// デフォルトのTF-IDFエンジン
/// raw count times `ln(N / df)`; a term never seen has weight 0
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultTfidfEngine;

impl TfidfEngine for DefaultTfidfEngine {
    #[inline]
    fn idf(doc_freq: u64, num_docs: u64) -> f64 {
        if doc_freq == 0 || num_docs == 0 {
            return 0.0;
        }
        (num_docs as f64 / doc_freq as f64).ln()
    }

    #[inline]
    fn tf(count: f64) -> f64 {
        count
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Normalization {
    None,
    /// unit Euclidean norm
    L2,
}

impl Normalization {
    pub fn from_flag(normalize: bool) -> Self {
        if normalize {
            Normalization::L2
        } else {
            Normalization::None
        }
    }
}

/// TfidfModel
/// Fitted once from corpus statistics, then a pure function from raw counts
/// to weighted vectors over the same TermID space.
#[derive(Debug, Clone)]
pub struct TfidfModel<E = DefaultTfidfEngine>
where
    E: TfidfEngine,
{
    num_docs: u64,
    doc_freqs: Vec<u64>,
    normalization: Normalization,
    /// idf per TermID, derived from `doc_freqs`
    idf: Vec<f64>,
    _marker: PhantomData<E>,
}

/// Serializable parameters of a `TfidfModel`
/// idf is not stored; it is derived again by `into_model`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TfidfData {
    pub num_docs: u64,
    pub doc_freqs: Vec<u64>,
    pub normalization: Normalization,
}

impl TfidfData {
    pub fn into_model<E: TfidfEngine>(self) -> TfidfModel<E> {
        TfidfModel::from_doc_freqs(self.doc_freqs, self.num_docs, self.normalization)
    }
}

impl<E> TfidfModel<E>
where
    E: TfidfEngine,
{
    fn from_doc_freqs(doc_freqs: Vec<u64>, num_docs: u64, normalization: Normalization) -> Self {
        let idf = doc_freqs.iter().map(|&df| E::idf(df, num_docs)).collect();
        Self {
            num_docs,
            doc_freqs,
            normalization,
            idf,
            _marker: PhantomData,
        }
    }

    /// Fit from a corpus pass: df[t] = documents containing t
    ///
    /// # Arguments
    /// * `corpus` - bag-of-words vectors in document order
    /// * `num_terms` - term dimension V
    /// * `normalization` - normalization applied by `apply`
    pub fn fit<I, N>(corpus: I, num_terms: usize, normalization: Normalization) -> Result<Self>
    where
        I: IntoIterator<Item = Result<SparseVector<N>>>,
        N: Num + Copy,
    {
        let mut doc_freqs = vec![0u64; num_terms];
        let mut num_docs = 0u64;
        for vec in corpus {
            let vec = vec?;
            num_docs += 1;
            for &term in vec.term_ids() {
                let slot = doc_freqs.get_mut(term as usize).ok_or(Error::DimensionMismatch {
                    what: "corpus term",
                    expected: num_terms,
                    got: term as usize + 1,
                })?;
                *slot += 1;
            }
        }
        info!(docs = num_docs, terms = num_terms, "fitted tfidf model");
        Ok(Self::from_doc_freqs(doc_freqs, num_docs, normalization))
    }

    /// Fit from the document frequencies recorded in a dictionary
    pub fn from_dictionary(dict: &TermDictionary, num_docs: u64, normalization: Normalization) -> Self {
        let mut doc_freqs = vec![0u64; dict.num_terms()];
        for (id, df) in dict.doc_freqs() {
            doc_freqs[id as usize] = df;
        }
        Self::from_doc_freqs(doc_freqs, num_docs, normalization)
    }

    /// Weight a raw count vector
    /// TermIDs outside the fitted dimension and zero weights are dropped;
    /// a vector with no known term comes back as the zero vector.
    pub fn apply<N>(&self, vec: &SparseVector<N>) -> SparseVector<f32>
    where
        N: Num + Copy + Into<f64>,
    {
        let mut inds = Vec::with_capacity(vec.nnz());
        let mut vals = Vec::with_capacity(vec.nnz());
        for (term, count) in vec.iter() {
            let Some(&idf) = self.idf.get(term as usize) else {
                continue;
            };
            let weight = E::tf(count.into()) * idf;
            if weight != 0.0 {
                inds.push(term);
                vals.push(weight);
            }
        }
        if self.normalization == Normalization::L2 {
            let norm = vals.iter().map(|w| w * w).sum::<f64>().sqrt();
            if norm > 0.0 {
                vals.iter_mut().for_each(|w| *w /= norm);
            }
        }
        SparseVector::from_sorted_parts(inds, vals.into_iter().map(|w| w as f32).collect())
    }

    #[inline]
    pub fn num_terms(&self) -> usize {
        self.doc_freqs.len()
    }

    #[inline]
    pub fn num_docs(&self) -> u64 {
        self.num_docs
    }

    #[inline]
    pub fn normalization(&self) -> Normalization {
        self.normalization
    }

    #[inline]
    pub fn doc_freq(&self, term: u32) -> u64 {
        self.doc_freqs.get(term as usize).copied().unwrap_or(0)
    }

    #[inline]
    pub fn idf(&self, term: u32) -> f64 {
        self.idf.get(term as usize).copied().unwrap_or(0.0)
    }

    pub fn to_data(&self) -> TfidfData {
        TfidfData {
            num_docs: self.num_docs,
            doc_freqs: self.doc_freqs.clone(),
            normalization: self.normalization,
        }
    }
}
