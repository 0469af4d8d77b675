use chrono::NaiveDate;
use tempfile::TempDir;

use daybook::config::Config;
use daybook::engine::StorageEngine;
use daybook::error::Error;
use daybook::models::{NewBlock, SearchFilter};
use daybook::monitor::PerformanceMonitor;

fn block(date: &str, text: &str) -> NewBlock {
    let day = NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap();
    NewBlock::new(
        day.and_hms_opt(9, 0, 0).unwrap().and_utc(),
        day.and_hms_opt(9, 30, 0).unwrap().and_utc(),
        text,
    )
}

#[tokio::test]
async fn test_benchmark_adds_exactly_count_sessions() {
    let tmp = TempDir::new().unwrap();
    let engine = StorageEngine::open(Config::for_root(tmp.path())).await.unwrap();

    // Occupies the first synthetic date; the benchmark must skip it.
    engine
        .append_content_block("2000-01-01", "Editor", &block("2000-01-01", "real work"))
        .await
        .unwrap();
    engine
        .append_content_block("2025-01-01", "Editor", &block("2025-01-01", "more real work"))
        .await
        .unwrap();
    let before_first = engine.get_session("2000-01-01").await.unwrap();

    let monitor = PerformanceMonitor::new(engine.clone());
    let result = monitor.run_benchmark(100).await.unwrap();

    assert_eq!(result.test_data_count, 100);
    assert!(result.end_time >= result.start_time);
    assert_eq!(engine.list_sessions(1, 10).await.unwrap().total, 102);

    let names: Vec<&str> = result.operations.iter().map(|o| o.name.as_str()).collect();
    assert_eq!(
        names,
        vec!["session_lookup", "fulltext_search", "semantic_search", "file_save"]
    );
    for op in &result.operations {
        assert!(op.iterations > 0);
        assert_eq!(op.errors, 0, "{} reported errors", op.name);
    }

    // Pre-existing sessions are untouched.
    assert_eq!(engine.get_session("2000-01-01").await.unwrap(), before_first);
    assert_eq!(
        engine.get_session("2025-01-01").await.unwrap().blocks.len(),
        1
    );
    assert_eq!(
        engine.get_session("2000-01-02").await.unwrap().blocks.len(),
        4
    );

    // Only synthetic blocks were embedded.
    assert_eq!(engine.vector_count().await.unwrap(), 300);
    let mine = engine
        .semantic_search(
            "real work",
            300,
            &SearchFilter {
                app: Some("Editor".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert!(mine
        .iter()
        .all(|r| r.date != "2000-01-01" && r.date != "2025-01-01"));

    let metrics = monitor.get_storage_metrics().await.unwrap();
    assert_eq!(metrics.session_count, 102);
    assert_eq!(metrics.total_files, 20);
    assert_eq!(metrics.files_size, 20 * 1024);
    assert!(metrics.db_size > 0);
    assert!(metrics.vector_db_size > 0);
    assert_eq!(
        metrics.total_size,
        metrics.db_size + metrics.vector_db_size + metrics.files_size
    );

    monitor.close().await.unwrap();
    assert!(!engine.is_initialized().await);
}

#[tokio::test]
async fn test_benchmark_rejects_non_positive_count() {
    let tmp = TempDir::new().unwrap();
    let engine = StorageEngine::open(Config::for_root(tmp.path())).await.unwrap();
    let monitor = PerformanceMonitor::new(engine.clone());

    assert!(matches!(
        monitor.run_benchmark(0).await,
        Err(Error::Validation(_))
    ));
    assert!(matches!(
        monitor.run_benchmark(-3).await,
        Err(Error::Validation(_))
    ));
    assert_eq!(engine.list_sessions(1, 10).await.unwrap().total, 0);
    monitor.close().await.unwrap();
}

#[tokio::test]
async fn test_benchmark_without_embeddings_reports_semantic_errors() {
    let tmp = TempDir::new().unwrap();
    let mut cfg = Config::for_root(tmp.path());
    cfg.embedding.provider = "disabled".into();
    let engine = StorageEngine::open(cfg).await.unwrap();
    let monitor = PerformanceMonitor::new(engine.clone());

    let result = monitor.run_benchmark(5).await.unwrap();
    let semantic = result
        .operations
        .iter()
        .find(|o| o.name == "semantic_search")
        .unwrap();
    assert_eq!(semantic.errors, semantic.iterations);
    assert!(!semantic.passed);

    let lookup = result
        .operations
        .iter()
        .find(|o| o.name == "session_lookup")
        .unwrap();
    assert_eq!(lookup.errors, 0);
    assert!(matches!(
        engine
            .semantic_search("penguin", 3, &SearchFilter::default())
            .await,
        Err(Error::ServiceUnavailable(_))
    ));
    monitor.close().await.unwrap();
}

#[tokio::test]
async fn test_metrics_on_empty_store() {
    let tmp = TempDir::new().unwrap();
    let engine = StorageEngine::open(Config::for_root(tmp.path())).await.unwrap();
    let monitor = PerformanceMonitor::new(engine);

    let metrics = monitor.get_storage_metrics().await.unwrap();
    assert_eq!(metrics.session_count, 0);
    assert_eq!(metrics.total_files, 0);
    assert_eq!(metrics.files_size, 0);
    monitor.close().await.unwrap();

    assert!(matches!(
        monitor.get_storage_metrics().await,
        Err(Error::NotInitialized)
    ));
}
