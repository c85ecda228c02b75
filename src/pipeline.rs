//! Offline fitting stages, run in order:
//! build corpus -> fit tf-idf -> fit LSI (and build the index).
//!
//! Every stage reads the artifacts of the previous one from `ArtifactPaths`
//! and writes its own next to them.

use std::io::BufRead;

use tracing::{info, warn};

use crate::config::{ArtifactPaths, FitConfig};
use crate::error::{Error, Result};
use crate::service::docids::DocIdMap;
use crate::vectorizer::analyzer::{strip_markup, tokenize_corpus};
use crate::vectorizer::corpus::{CorpusHeader, SparseCorpusStore};
use crate::vectorizer::dictionary::{DictionaryBuilder, TermDictionary};
use crate::vectorizer::index::{SimilarityIndex, SimilarityIndexBuilder};
use crate::vectorizer::lsi::LsiModel;
use crate::vectorizer::tfidf::{Normalization, TfidfModel};

/// Tokenize `<externalID>\t<text>` lines into the bag-of-words corpus,
/// the term dictionary and the document id map. Wiki markup is stripped
/// from the text before tokenizing.
///
/// Lines without a tab or with blank text are skipped with a warning and
/// take no document index.
pub fn build_corpus<R: BufRead>(documents: R, paths: &ArtifactPaths) -> Result<CorpusHeader> {
    let mut builder = DictionaryBuilder::new();
    let mut doc_ids = DocIdMap::new();
    let mut skipped = 0usize;

    let bows = documents.lines().enumerate().filter_map(|(line_no, line)| {
        let line = match line {
            Ok(line) => line,
            Err(e) => return Some(Err(Error::from(e))),
        };
        let Some((id, text)) = line.split_once('\t') else {
            warn!(line = line_no + 1, "document line has no tab, skipped");
            skipped += 1;
            return None;
        };
        if text.trim().is_empty() {
            warn!(line = line_no + 1, id, "document has no text, skipped");
            skipped += 1;
            return None;
        }
        doc_ids.insert(builder.num_docs() as u32, id);
        Some(Ok(builder.add_document(&tokenize_corpus(&strip_markup(text)))))
    });
    let header = SparseCorpusStore::serialize(paths.bow_corpus(), bows, 0)?;

    let dict = builder.finish();
    dict.save(paths.dictionary())?;
    doc_ids.save(paths.doc_ids())?;
    info!(
        docs = header.num_docs,
        terms = dict.num_terms(),
        skipped,
        "built corpus"
    );
    Ok(header)
}

/// Fit the tf-idf model on the bag-of-words corpus and write the weighted corpus
pub fn fit_tfidf(paths: &ArtifactPaths, fit: &FitConfig) -> Result<TfidfModel> {
    let dict = TermDictionary::load(paths.dictionary())?;
    let bow = SparseCorpusStore::open(paths.bow_corpus())?;
    let num_terms = dict.num_terms();
    if bow.num_terms() > num_terms {
        return Err(Error::Config(format!(
            "corpus has {} terms, dictionary only {num_terms}",
            bow.num_terms()
        )));
    }

    let model: TfidfModel = TfidfModel::fit(bow.iter()?, num_terms, Normalization::from_flag(fit.normalize))?;
    model.save(paths.tfidf_model())?;

    let weighted = bow.iter()?.map(|doc| doc.map(|v| model.apply(&v)));
    SparseCorpusStore::serialize(paths.tfidf_corpus(), weighted, num_terms)?;
    Ok(model)
}

/// Fit the LSI operator on the weighted corpus, then project every document
/// into the similarity index
pub fn fit_lsi(paths: &ArtifactPaths, fit: &FitConfig) -> Result<(LsiModel, SimilarityIndex)> {
    let weighted = SparseCorpusStore::open(paths.tfidf_corpus())?;
    let docs = weighted.read_all()?;
    let lsi = LsiModel::fit(&docs, weighted.num_terms(), fit.num_topics)?;
    lsi.save(paths.lsi_model())?;

    let mut builder = SimilarityIndexBuilder::new(lsi.num_topics(), fit.shard_size)?;
    for topics in lsi.project_batch(&docs) {
        builder.add(&topics)?;
    }
    let index = builder.finish();
    index.save(paths.index())?;
    Ok((lsi, index))
}
