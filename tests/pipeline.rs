//! End-to-end pipeline tests against a mock OpenAI-compatible backend.
//!
//! Each test drives the library through the same path the CLI takes:
//! ingest documents or web sources, then retrieve or chat. Embedding
//! requests are routed by substring so every text gets a fixed,
//! predictable vector (batch size 1 keeps one text per request).

use std::fs;
use std::path::Path;

use httpmock::prelude::*;
use tempfile::TempDir;

use quarry::config::Config;
use quarry::index::IndexStore;
use quarry::ingest::{load_web_sources, Ingestor};
use quarry::retrieve::Retriever;
use quarry::retry::CancelToken;

fn test_config(endpoint: &str, k: usize) -> Config {
    Config::from_lookup(|key| match key {
        "QUARRY_ENDPOINT" => Some(endpoint.to_string()),
        "QUARRY_EMBED_BATCH_SIZE" => Some("1".to_string()),
        "QUARRY_MAX_RETRIES" => Some("0".to_string()),
        "QUARRY_RETRIEVE_K" => Some(k.to_string()),
        _ => None,
    })
    .unwrap()
}

/// Mock the embeddings endpoint: any request whose body contains
/// `marker` gets `vector` back.
async fn mock_embedding(server: &MockServer, marker: &str, vector: Vec<f32>) {
    let marker = marker.to_string();
    server
        .mock_async(move |when, then| {
            when.method(POST).path("/embeddings").body_contains(&marker);
            then.status(200)
                .json_body(serde_json::json!({ "data": [{ "embedding": vector }] }));
        })
        .await;
}

fn write_doc(dir: &Path, name: &str, content: &str) {
    fs::write(dir.join(name), content).unwrap();
}

#[tokio::test]
async fn ingest_docs_then_retrieve_ranks_relevant_source_first() {
    let server = MockServer::start_async().await;
    mock_embedding(&server, "alpha", vec![1.0, 0.0]).await;
    mock_embedding(&server, "beta", vec![0.0, 1.0]).await;

    let docs = TempDir::new().unwrap();
    write_doc(docs.path(), "alpha.txt", "alpha notes about the first topic");
    write_doc(docs.path(), "beta.txt", "beta notes about the second topic");

    let index_dir = TempDir::new().unwrap();
    let config = test_config(&server.base_url(), 2);
    let ingestor = Ingestor::new(&config, index_dir.path()).unwrap();
    let report = ingestor
        .ingest_documents(docs.path(), 1024, 128, &CancelToken::new())
        .await
        .unwrap();
    assert_eq!(report.sources_processed, 2);
    assert_eq!(report.passages_added, 2);
    assert!(report.sources_failed.is_empty());

    let retriever = Retriever::new(&config, index_dir.path()).unwrap();
    let results = retriever
        .retrieve("alpha", &CancelToken::new())
        .await
        .unwrap();
    assert_eq!(results.len(), 2);
    assert!(results[0].passage.source.ends_with("alpha.txt"));
    assert!(results[0].score > results[1].score);
}

#[tokio::test]
async fn fox_document_end_to_end() {
    let server = MockServer::start_async().await;
    // Disjoint markers so each request matches exactly one mock:
    // chunk 0 ("The quick brown fox "), chunk 1 (" fox jumps."), query.
    mock_embedding(&server, "brown", vec![1.0, 0.0]).await;
    mock_embedding(&server, "jumps.", vec![0.0, 1.0]).await;
    mock_embedding(&server, "color", vec![0.9, 0.1]).await;

    let docs = TempDir::new().unwrap();
    write_doc(docs.path(), "fox.txt", "The quick brown fox jumps.");

    let index_dir = TempDir::new().unwrap();
    let config = test_config(&server.base_url(), 2);
    let ingestor = Ingestor::new(&config, index_dir.path()).unwrap();
    let report = ingestor
        .ingest_documents(docs.path(), 20, 5, &CancelToken::new())
        .await
        .unwrap();
    assert!(report.passages_added >= 2);

    let retriever = Retriever::new(&config, index_dir.path()).unwrap();
    let results = retriever
        .retrieve("What color is the fox?", &CancelToken::new())
        .await
        .unwrap();
    assert!(results[0].passage.text.contains("brown"));
}

#[tokio::test]
async fn reingesting_the_same_directory_appends() {
    let server = MockServer::start_async().await;
    mock_embedding(&server, "alpha", vec![1.0, 0.0]).await;

    let docs = TempDir::new().unwrap();
    write_doc(docs.path(), "alpha.txt", "alpha once more");

    let index_dir = TempDir::new().unwrap();
    let config = test_config(&server.base_url(), 4);
    let ingestor = Ingestor::new(&config, index_dir.path()).unwrap();
    let cancel = CancelToken::new();
    ingestor
        .ingest_documents(docs.path(), 1024, 128, &cancel)
        .await
        .unwrap();
    ingestor
        .ingest_documents(docs.path(), 1024, 128, &cancel)
        .await
        .unwrap();

    let index = IndexStore::open_or_create(index_dir.path(), None).unwrap();
    assert_eq!(index.len(), 2);
}

#[tokio::test]
async fn unreadable_file_is_reported_and_skipped() {
    let server = MockServer::start_async().await;
    mock_embedding(&server, "alpha", vec![1.0, 0.0]).await;

    let docs = TempDir::new().unwrap();
    write_doc(docs.path(), "alpha.txt", "alpha survives");
    write_doc(docs.path(), "broken.pdf", "this is not a pdf");

    let index_dir = TempDir::new().unwrap();
    let config = test_config(&server.base_url(), 4);
    let ingestor = Ingestor::new(&config, index_dir.path()).unwrap();
    let report = ingestor
        .ingest_documents(docs.path(), 1024, 128, &CancelToken::new())
        .await
        .unwrap();

    assert_eq!(report.sources_processed, 1);
    assert_eq!(report.passages_added, 1);
    assert_eq!(report.sources_failed.len(), 1);
    assert!(report.sources_failed[0].0.ends_with("broken.pdf"));
}

#[tokio::test]
async fn web_ingest_extracts_tag_blocks_and_writes_manifest() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/page.html");
            then.status(200).body(
                "<html><body>\
                 <p>first paragraph text</p>\
                 <div>ignored sidebar</div>\
                 <p>second paragraph text</p>\
                 </body></html>",
            );
        })
        .await;
    mock_embedding(&server, "first paragraph", vec![1.0, 0.0]).await;
    mock_embedding(&server, "second paragraph", vec![0.0, 1.0]).await;

    let sources_dir = TempDir::new().unwrap();
    let sources_path = sources_dir.path().join("sources.json");
    fs::write(
        &sources_path,
        serde_json::to_string(&serde_json::json!({
            "url": server.url("/page.html"),
            "tags": ["p"]
        }))
        .unwrap(),
    )
    .unwrap();

    let index_dir = TempDir::new().unwrap();
    let config = test_config(&server.base_url(), 4);
    let ingestor = Ingestor::new(&config, index_dir.path()).unwrap();
    let sources = load_web_sources(&sources_path).unwrap();
    let report = ingestor
        .ingest_web(&sources, 0, 1000, 150, &CancelToken::new())
        .await
        .unwrap();

    assert_eq!(report.sources_processed, 1);
    assert_eq!(report.passages_added, 2);

    let index = IndexStore::open_or_create(index_dir.path(), Some(2)).unwrap();
    assert_eq!(index.len(), 2);

    let manifest: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(index_dir.path().join("manifest.json")).unwrap())
            .unwrap();
    let entries = manifest.as_array().unwrap();
    assert_eq!(entries.len(), 2);
    for entry in entries {
        assert_eq!(entry["extract_method"], "tag");
        assert_eq!(entry["extract_pattern"], "p");
        assert_eq!(entry["source"], server.url("/page.html"));
    }
}

#[tokio::test]
async fn crawl_depth_one_ingests_each_linked_page_once() {
    let server = MockServer::start_async().await;
    let page_a = server
        .mock_async(|when, then| {
            when.method(GET).path("/a.html");
            then.status(200).body(
                r#"<body><p>alpha page</p><a href="/b.html">b</a><a href="/a.html">self</a></body>"#,
            );
        })
        .await;
    let page_b = server
        .mock_async(|when, then| {
            when.method(GET).path("/b.html");
            then.status(200)
                .body(r#"<body><p>beta page</p><a href="/a.html#top">back</a></body>"#);
        })
        .await;
    mock_embedding(&server, "alpha", vec![1.0, 0.0]).await;
    mock_embedding(&server, "beta", vec![0.0, 1.0]).await;

    let sources_dir = TempDir::new().unwrap();
    let sources_path = sources_dir.path().join("sources.json");
    fs::write(
        &sources_path,
        serde_json::to_string(&serde_json::json!({
            "url": server.url("/a.html"),
            "tags": ["p"]
        }))
        .unwrap(),
    )
    .unwrap();

    let index_dir = TempDir::new().unwrap();
    let config = test_config(&server.base_url(), 4);
    let ingestor = Ingestor::new(&config, index_dir.path()).unwrap();
    let sources = load_web_sources(&sources_path).unwrap();
    let report = ingestor
        .ingest_web(&sources, 1, 1000, 150, &CancelToken::new())
        .await
        .unwrap();

    assert_eq!(report.sources_processed, 2);
    assert_eq!(page_a.hits_async().await, 1);
    assert_eq!(page_b.hits_async().await, 1);

    let index = IndexStore::open_or_create(index_dir.path(), None).unwrap();
    assert_eq!(index.source_count(), 2);
}

#[tokio::test]
async fn retrieve_k_caps_result_count() {
    let server = MockServer::start_async().await;
    mock_embedding(&server, "alpha", vec![1.0, 0.0]).await;
    mock_embedding(&server, "beta", vec![0.0, 1.0]).await;
    mock_embedding(&server, "gamma", vec![0.5, 0.5]).await;

    let docs = TempDir::new().unwrap();
    write_doc(docs.path(), "a.txt", "alpha text");
    write_doc(docs.path(), "b.txt", "beta text");
    write_doc(docs.path(), "c.txt", "gamma text");

    let index_dir = TempDir::new().unwrap();
    let config = test_config(&server.base_url(), 2);
    let ingestor = Ingestor::new(&config, index_dir.path()).unwrap();
    ingestor
        .ingest_documents(docs.path(), 1024, 128, &CancelToken::new())
        .await
        .unwrap();

    let retriever = Retriever::new(&config, index_dir.path()).unwrap();
    let results = retriever
        .retrieve("alpha", &CancelToken::new())
        .await
        .unwrap();
    assert_eq!(results.len(), 2);
}

#[tokio::test]
async fn backend_outage_mid_run_is_reported_not_fatal() {
    let server = MockServer::start_async().await;
    mock_embedding(&server, "alpha", vec![1.0, 0.0]).await;
    let outage = server
        .mock_async(|when, then| {
            when.method(POST).path("/embeddings").body_contains("beta");
            then.status(503).body("backend restarting");
        })
        .await;

    let docs = TempDir::new().unwrap();
    write_doc(docs.path(), "alpha.txt", "alpha lands before the outage");
    write_doc(docs.path(), "beta.txt", "beta hits the outage");

    let index_dir = TempDir::new().unwrap();
    let config = test_config(&server.base_url(), 4);
    let ingestor = Ingestor::new(&config, index_dir.path()).unwrap();
    let report = ingestor
        .ingest_documents(docs.path(), 1024, 128, &CancelToken::new())
        .await
        .unwrap();

    // The first batch stays counted and persisted; the lost source is
    // reported as a failure instead of aborting the run.
    assert_eq!(report.passages_added, 1);
    assert_eq!(report.sources_failed.len(), 1);
    assert!(report.sources_failed[0].0.ends_with("beta.txt"));
    assert!(report.sources_failed[0].1.contains("503"));
    assert_eq!(outage.hits_async().await, 1);

    let index = IndexStore::open_or_create(index_dir.path(), None).unwrap();
    assert_eq!(index.len(), 1);
}

#[tokio::test]
async fn url_shared_by_two_sources_is_ingested_once() {
    let server = MockServer::start_async().await;
    let page = server
        .mock_async(|when, then| {
            when.method(GET).path("/shared.html");
            then.status(200)
                .body("<html><body><p>shared paragraph text</p></body></html>");
        })
        .await;
    mock_embedding(&server, "shared paragraph", vec![1.0, 0.0]).await;

    let sources_dir = TempDir::new().unwrap();
    let sources_path = sources_dir.path().join("sources.json");
    fs::write(
        &sources_path,
        serde_json::to_string(&serde_json::json!([
            { "url": server.url("/shared.html"), "tags": ["p"] },
            { "url": server.url("/shared.html"), "tags": ["div"] }
        ]))
        .unwrap(),
    )
    .unwrap();

    let index_dir = TempDir::new().unwrap();
    let config = test_config(&server.base_url(), 4);
    let ingestor = Ingestor::new(&config, index_dir.path()).unwrap();
    let sources = load_web_sources(&sources_path).unwrap();
    let report = ingestor
        .ingest_web(&sources, 0, 1000, 150, &CancelToken::new())
        .await
        .unwrap();

    assert_eq!(report.sources_processed, 1);
    assert_eq!(report.passages_added, 1);
    assert_eq!(page.hits_async().await, 1);
}
