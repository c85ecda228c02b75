use std::path::Path;
use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use lsi_search::config::{ArtifactPaths, FitConfig};
use lsi_search::service::http::handle_api;
use lsi_search::{pipeline, Error, QueryService, ServiceLoader, SimilarityIndex};

const PETS: &str = "\
Cat_page\tcat cat dog
Dog_page\tdog dog fish
Fish_page\tcat fish fish
";

fn fit(dir: &Path, documents: &str, num_topics: usize, shard_size: usize) -> ArtifactPaths {
    let paths = ArtifactPaths::in_dir(dir);
    let fit = FitConfig {
        num_topics,
        normalize: true,
        shard_size,
    };
    pipeline::build_corpus(documents.as_bytes(), &paths).unwrap();
    pipeline::fit_tfidf(&paths, &fit).unwrap();
    pipeline::fit_lsi(&paths, &fit).unwrap();
    paths
}

fn load(paths: &ArtifactPaths) -> QueryService {
    ServiceLoader::from_paths(paths.clone(), 20).load().unwrap()
}

#[test]
fn cat_query_ranks_cat_documents_first() {
    let dir = tempfile::tempdir().unwrap();
    let paths = fit(dir.path(), PETS, 2, 2);
    let service = load(&paths);

    let answer = service.answer("cat cat", 20).unwrap();
    let ids: Vec<&str> = answer.iter().map(|(id, _)| id.as_str()).collect();
    assert_eq!(ids, vec!["Cat_page", "Fish_page", "Dog_page"]);
    assert!((answer[0].1 - 0.9428).abs() < 1e-3);
    assert!((answer[1].1 - 0.5774).abs() < 1e-3);
    assert!(answer[2].1.abs() < 1e-4);
}

#[test]
fn answers_are_reproducible_across_fits() {
    let first = tempfile::tempdir().unwrap();
    let second = tempfile::tempdir().unwrap();
    let a = load(&fit(first.path(), PETS, 2, 1)).answer("fish dog", 20).unwrap();
    let b = load(&fit(second.path(), PETS, 2, 64)).answer("fish dog", 20).unwrap();
    assert_eq!(a, b);
}

#[test]
fn index_shards_tile_the_corpus() {
    let dir = tempfile::tempdir().unwrap();
    let paths = fit(dir.path(), PETS, 2, 2);
    let index = SimilarityIndex::load(paths.index()).unwrap();
    let ranges: Vec<(u32, usize)> = index.shards().iter().map(|s| (s.offset(), s.len())).collect();
    assert_eq!(ranges, vec![(0, 2), (2, 1)]);
}

#[test]
fn unmapped_documents_report_their_index() {
    let dir = tempfile::tempdir().unwrap();
    let documents = "\
a\tred apple fruit
b\tgreen apple tree
c\tred cherry fruit
d\tgreen leaf tree
e\tblue sky water
f\tblue sea water
g\tdeep sea fish
h\tred fruit salad
";
    let paths = fit(dir.path(), documents, 3, 4);
    std::fs::write(paths.doc_ids(), "0\ta\n1\tb\n").unwrap();
    let service = load(&paths);

    let answer = service.answer("red fruit", 20).unwrap();
    assert_eq!(answer.len(), 8);
    assert!(answer.iter().any(|(id, _)| id == "7"));
    assert!(answer.iter().any(|(id, _)| id == "a"));
    assert!(!answer.iter().any(|(id, _)| id == "h"));
}

#[test]
fn loader_rejects_artifacts_from_different_fits() {
    let dir = tempfile::tempdir().unwrap();
    let paths = fit(dir.path(), PETS, 2, 2);
    // new corpus and tf-idf, stale LSI and index
    let more = format!("{PETS}Bird_page\tbird cat\n");
    pipeline::build_corpus(more.as_bytes(), &paths).unwrap();
    pipeline::fit_tfidf(&paths, &FitConfig::default()).unwrap();
    let result = ServiceLoader::from_paths(paths, 20).load();
    assert!(matches!(result, Err(Error::Config(_))));
}

#[test]
fn loader_fails_on_a_missing_artifact() {
    let dir = tempfile::tempdir().unwrap();
    let paths = fit(dir.path(), PETS, 2, 2);
    std::fs::remove_file(paths.lsi_model()).unwrap();
    let result = ServiceLoader::from_paths(paths, 20).load();
    assert!(matches!(result, Err(Error::Io(_))));
}

#[test]
fn too_many_topics_aborts_the_fit() {
    let dir = tempfile::tempdir().unwrap();
    let paths = ArtifactPaths::in_dir(dir.path());
    let fit = FitConfig {
        num_topics: 4,
        ..FitConfig::default()
    };
    pipeline::build_corpus(PETS.as_bytes(), &paths).unwrap();
    pipeline::fit_tfidf(&paths, &fit).unwrap();
    assert!(matches!(pipeline::fit_lsi(&paths, &fit), Err(Error::Config(_))));
    assert!(!paths.lsi_model().exists());
}

#[tokio::test]
async fn http_missing_query_is_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let service = Arc::new(load(&fit(dir.path(), PETS, 2, 2)));

    let missing = handle_api(State(service.clone()), Ok(Query(Vec::new()))).await;
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);
    let body = axum::body::to_bytes(missing.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&body[..], b"[]");

    let params = vec![("query".to_string(), "cat cat".to_string())];
    let found = handle_api(State(service), Ok(Query(params))).await;
    assert_eq!(found.status(), StatusCode::OK);
    let body = axum::body::to_bytes(found.into_body(), usize::MAX).await.unwrap();
    let pairs: Vec<(String, f64)> = serde_json::from_slice(&body).unwrap();
    assert_eq!(pairs[0].0, "Cat_page");
}
