//! This crate is a document similarity search engine over a TF-IDF weighted
//! latent semantic index (LSI).

pub mod config;
pub mod error;
pub mod pipeline;
pub mod service;
pub mod utils;
pub mod vectorizer;

pub use error::{Error, Result};

/// Sparse and dense vectors
/// `SparseVector<N>` holds (TermID, weight) pairs, sorted and free of zeros.
/// `N` is `u32` for a raw bag-of-words and `f32` after weighting.
/// `DenseVector` is a fixed-length topic-space vector.
pub use utils::math::vector::{DenseVector, SparseVector};

/// Term Dictionary
/// Bidirectional term <-> TermID map loaded from `<id>\t<term>\t<df>` lines.
/// Turns tokens into a bag-of-words; unknown tokens are dropped.
///
/// `DictionaryBuilder` assigns TermIDs in first-seen order while a corpus is
/// being tokenized.
pub use vectorizer::dictionary::{DictionaryBuilder, TermDictionary};

/// Sparse Corpus Store
/// File-backed, ordered sequence of document vectors in Matrix Market
/// coordinate format. Iteration is lazy and restartable; writing streams and
/// back-patches the size line.
pub use vectorizer::corpus::{CorpusHeader, SparseCorpusStore};

/// TF-IDF Model
/// Document frequencies fitted once, applied as a pure function to raw
/// count vectors. With L2 normalization every non-zero output has unit norm.
///
/// The weighting strategy is pluggable through `TfidfEngine`;
/// `DefaultTfidfEngine` is raw count times `ln(N / df)`.
pub use vectorizer::tfidf::{DefaultTfidfEngine, Normalization, TfidfEngine, TfidfModel};

/// LSI Model
/// Rank-K truncated SVD projection from term space to topic space.
/// The same operator projects queries and corpus documents.
pub use vectorizer::lsi::LsiModel;

/// Similarity Index
/// Unit-norm topic vectors of every document in contiguous shards.
/// A query returns the cosine against every document in index order.
pub use vectorizer::index::{IndexShard, SimilarityIndex, SimilarityIndexBuilder};

/// Search Hits
/// (document index, score) list with a stable descending sort.
pub use vectorizer::evaluate::scoring::Hits;

/// Query Service
/// `ServiceLoader` reads and cross-validates the artifacts; only then is a
/// `QueryService` available to answer queries.
pub use service::{docids::DocIdMap, QueryService, ServiceLoader};
