//! Online query side.
//!
//! `ServiceLoader` is the loading state: it reads the five artifacts and checks
//! them against each other. Only a successful `load` yields a `QueryService`,
//! which is immutable and answers any number of concurrent queries.

pub mod docids;
pub mod http;

use tracing::{debug, info, warn};

use crate::config::{ArtifactPaths, ServiceConfig};
use crate::error::{Error, Result};
use crate::vectorizer::analyzer::tokenize_query;
use crate::vectorizer::dictionary::TermDictionary;
use crate::vectorizer::evaluate::scoring::Hits;
use crate::vectorizer::index::SimilarityIndex;
use crate::vectorizer::lsi::LsiModel;
use crate::vectorizer::tfidf::TfidfModel;

use self::docids::DocIdMap;

/// Loading state of the service
#[derive(Debug, Clone)]
pub struct ServiceLoader {
    paths: ArtifactPaths,
    top_k: usize,
}

impl ServiceLoader {
    pub fn new(config: &ServiceConfig) -> Self {
        Self::from_paths(config.artifacts.clone(), config.query.top_k)
    }

    pub fn from_paths(paths: ArtifactPaths, top_k: usize) -> Self {
        Self { paths, top_k }
    }

    /// Read every artifact, validate, and move to the ready state
    pub fn load(self) -> Result<QueryService> {
        info!(dir = %self.paths.dir.display(), "loading artifacts");
        let dictionary = TermDictionary::load(self.paths.dictionary())?;
        let tfidf = TfidfModel::load(self.paths.tfidf_model())?;
        let lsi = LsiModel::load(self.paths.lsi_model())?;
        let index = SimilarityIndex::load(self.paths.index())?;
        let doc_ids = DocIdMap::load(self.paths.doc_ids())?;
        let service = QueryService::from_parts(dictionary, tfidf, lsi, index, doc_ids, self.top_k)?;
        info!(
            terms = service.dictionary.num_terms(),
            topics = service.lsi.num_topics(),
            docs = service.index.num_docs(),
            "query service ready"
        );
        Ok(service)
    }
}

/// QueryService
/// query text -> ranked (external ID, cosine) list
#[derive(Debug)]
pub struct QueryService {
    dictionary: TermDictionary,
    tfidf: TfidfModel,
    lsi: LsiModel,
    index: SimilarityIndex,
    doc_ids: DocIdMap,
    top_k: usize,
}

impl QueryService {
    /// Assemble from loaded parts
    ///
    /// # Errors
    /// `Config` unless the parts agree: one term dimension V across the
    /// dictionary, the tf-idf model and the LSI operator; K shared by the LSI
    /// operator and the index; one document count across the tf-idf model and
    /// the index; and no doc-id entry past the last indexed document.
    pub fn from_parts(
        dictionary: TermDictionary,
        tfidf: TfidfModel,
        lsi: LsiModel,
        index: SimilarityIndex,
        doc_ids: DocIdMap,
        top_k: usize,
    ) -> Result<Self> {
        let checks = [
            ("dictionary terms", dictionary.num_terms(), "tfidf terms", tfidf.num_terms()),
            ("tfidf terms", tfidf.num_terms(), "lsi terms", lsi.num_terms()),
            ("lsi topics", lsi.num_topics(), "index features", index.num_features()),
            ("tfidf documents", tfidf.num_docs() as usize, "index documents", index.num_docs()),
        ];
        for (left, a, right, b) in checks {
            if a != b {
                return Err(Error::Config(format!("{left} ({a}) != {right} ({b})")));
            }
        }
        if let Some(max) = doc_ids.max_index() {
            if max as usize >= index.num_docs() {
                return Err(Error::Config(format!(
                    "doc id map names document {max}, index holds {}",
                    index.num_docs()
                )));
            }
        }
        if doc_ids.len() < index.num_docs() {
            warn!(
                mapped = doc_ids.len(),
                docs = index.num_docs(),
                "some documents have no external id; their index is reported instead"
            );
        }
        Ok(Self {
            dictionary,
            tfidf,
            lsi,
            index,
            doc_ids,
            top_k,
        })
    }

    /// Every document ranked against `text`, best first.
    /// Equal scores keep ascending document order.
    pub fn rank(&self, text: &str) -> Result<Hits> {
        let tokens = tokenize_query(text);
        let bow = self.dictionary.tokens_to_bag_of_words(&tokens);
        let weighted = self.tfidf.apply(&bow);
        let topics = self.lsi.project(&weighted);
        let mut hits = self.index.query(&topics)?;
        hits.sort_by_score();
        debug!(query = text, tokens = tokens.len(), known = bow.nnz(), "ranked query");
        Ok(hits)
    }

    /// At most `top_k` results as (external ID, score)
    pub fn answer(&self, text: &str, top_k: usize) -> Result<Vec<(String, f32)>> {
        let mut hits = self.rank(text)?;
        hits.truncate(top_k);
        Ok(hits
            .into_iter()
            .map(|(doc, score)| (self.doc_ids.external_id(doc).into_owned(), score))
            .collect())
    }

    /// Configured result count
    #[inline]
    pub fn top_k(&self) -> usize {
        self.top_k
    }

    #[inline]
    pub fn num_docs(&self) -> usize {
        self.index.num_docs()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::math::vector::SparseVector;
    use crate::vectorizer::index::SimilarityIndexBuilder;
    use crate::vectorizer::tfidf::Normalization;

    fn pets() -> (TermDictionary, Vec<SparseVector<u32>>) {
        let dict = TermDictionary::from_reader("0\tcat\t2\n1\tdog\t2\n2\tfish\t2\n".as_bytes()).unwrap();
        let bows = vec![
            dict.tokens_to_bag_of_words(&["cat", "cat", "dog"]),
            dict.tokens_to_bag_of_words(&["dog", "dog", "fish"]),
            dict.tokens_to_bag_of_words(&["cat", "fish", "fish"]),
        ];
        (dict, bows)
    }

    fn service(doc_ids: DocIdMap) -> Result<QueryService> {
        let (dict, bows) = pets();
        let tfidf = TfidfModel::from_dictionary(&dict, 3, Normalization::L2);
        let weighted: Vec<SparseVector<f32>> = bows.iter().map(|b| tfidf.apply(b)).collect();
        let lsi = LsiModel::fit(&weighted, 3, 2)?;
        let mut builder = SimilarityIndexBuilder::new(2, 2)?;
        for v in lsi.project_batch(&weighted) {
            builder.add(&v)?;
        }
        QueryService::from_parts(dict, tfidf, lsi, builder.finish(), doc_ids, 20)
    }

    #[test]
    fn cat_query_prefers_documents_with_cat() {
        let svc = service(DocIdMap::new()).unwrap();
        let answer = svc.answer("Cat CAT", 20).unwrap();
        let ids: Vec<&str> = answer.iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(ids, vec!["0", "2", "1"]);
        assert!((answer[0].1 - 0.9428).abs() < 1e-3);
        assert!((answer[1].1 - 0.5774).abs() < 1e-3);
    }

    #[test]
    fn top_k_is_exact() {
        let svc = service(DocIdMap::new()).unwrap();
        assert_eq!(svc.answer("cat", 2).unwrap().len(), 2);
        assert!(svc.answer("cat", 0).unwrap().is_empty());
    }

    #[test]
    fn unknown_words_still_rank_every_document() {
        let svc = service(DocIdMap::new()).unwrap();
        let answer = svc.answer("zebra", 20).unwrap();
        assert_eq!(answer.len(), 3);
        assert!(answer.iter().all(|(_, s)| *s == 0.0));
        // ties keep ascending index order
        assert_eq!(answer[0].0, "0");
        assert!(svc.answer("", 20).is_ok());
    }

    #[test]
    fn external_ids_are_used_when_known() {
        let ids = DocIdMap::from_reader("0\tCat\n1\tDog\n".as_bytes()).unwrap();
        let svc = service(ids).unwrap();
        let answer = svc.answer("cat", 3).unwrap();
        let names: Vec<&str> = answer.iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(names, vec!["Cat", "2", "Dog"]);
    }

    #[test]
    fn doc_ids_past_the_index_are_rejected() {
        let ids = DocIdMap::from_reader("9\tGhost\n".as_bytes()).unwrap();
        assert!(matches!(service(ids), Err(Error::Config(_))));
    }

    #[test]
    fn mismatched_dimensions_are_rejected() {
        let (dict, bows) = pets();
        let tfidf = TfidfModel::from_dictionary(&dict, 3, Normalization::L2);
        let weighted: Vec<SparseVector<f32>> = bows.iter().map(|b| tfidf.apply(b)).collect();
        let lsi = LsiModel::fit(&weighted, 3, 2).unwrap();
        // index built for three features
        let mut builder = SimilarityIndexBuilder::new(3, 8).unwrap();
        for _ in 0..3 {
            builder.add(&crate::utils::math::vector::DenseVector::new(vec![1.0, 0.0, 0.0])).unwrap();
        }
        let result = QueryService::from_parts(dict, tfidf, lsi, builder.finish(), DocIdMap::new(), 20);
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
