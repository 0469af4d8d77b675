//! `daybook stats` and `daybook bench`.

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;

use crate::engine::StorageEngine;
use crate::monitor::{BenchmarkResult, PerformanceMonitor};

pub async fn run_stats(engine: &Arc<StorageEngine>) -> Result<()> {
    let metrics = engine.storage_metrics().await?;
    let vectors = engine.vector_count().await?;
    let storage = &engine.config().storage;

    println!("Daybook Storage Stats");
    println!("=====================");
    println!();
    println!("  Root:        {}", storage.root.display());
    println!("  Metadata:    {}", format_bytes(metrics.db_size));
    println!("  Vectors:     {}", format_bytes(metrics.vector_db_size));
    println!(
        "  Files:       {} ({} files)",
        format_bytes(metrics.files_size),
        metrics.total_files
    );
    println!("  Total:       {}", format_bytes(metrics.total_size));
    println!();
    println!("  Sessions:    {}", metrics.session_count);
    println!(
        "  Embedded:    {} blocks ({})",
        vectors,
        engine.embedder().model_name()
    );
    let pending = engine.pending_reindex();
    if !pending.is_empty() {
        println!("  Reindex queue: {}", pending.join(", "));
    }
    println!();
    Ok(())
}

pub async fn run_bench(engine: &Arc<StorageEngine>, count: i64) -> Result<()> {
    let monitor = PerformanceMonitor::new(Arc::clone(engine));
    let result = monitor.run_benchmark(count).await?;
    print_benchmark(&result);
    Ok(())
}

fn print_benchmark(result: &BenchmarkResult) {
    println!("Benchmark ({} synthetic sessions)", result.test_data_count);
    println!(
        "  {} .. {}",
        result.start_time.to_rfc3339(),
        result.end_time.to_rfc3339()
    );
    println!();
    println!(
        "  {:<18} {:>6} {:>6} {:>12} {:>12} {:>10}  {}",
        "OPERATION", "ITERS", "ERRORS", "AVG", "TARGET", "OPS/S", "RESULT"
    );
    println!("  {}", "-".repeat(80));
    for op in &result.operations {
        println!(
            "  {:<18} {:>6} {:>6} {:>12} {:>12} {:>10.1}  {}",
            op.name,
            op.iterations,
            op.errors,
            format_duration(op.average_duration),
            format_duration(op.target),
            op.ops_per_sec,
            if op.passed { "pass" } else { "FAIL" }
        );
    }
    println!();
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

fn format_duration(d: Duration) -> String {
    let micros = d.as_micros();
    if micros < 1000 {
        format!("{} µs", micros)
    } else {
        format!("{:.2} ms", micros as f64 / 1000.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KB");
        assert_eq!(format_bytes(5 * 1024 * 1024), "5.0 MB");
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_micros(250)), "250 µs");
        assert_eq!(format_duration(Duration::from_micros(12_500)), "12.50 ms");
    }
}
