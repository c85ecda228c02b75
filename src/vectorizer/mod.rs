//! Offline models and the structures the query path reads.
//!
//! Data flows text -> `analyzer` -> `dictionary` (bag-of-words) -> `tfidf`
//! -> `lsi` (topic space) -> `index`. `corpus` stores sparse vectors between
//! fitting stages; `serde` stores the fitted models.

pub mod analyzer;
pub mod corpus;
pub mod dictionary;
pub mod evaluate;
pub mod index;
pub mod lsi;
pub mod serde;
pub mod tfidf;
