//! Benchmark runner for the dataset operations template

use dataset_store_bench::{bench_filesystem, bench_in_memory, compare_formats, BenchConfig, BenchResult};
use dataset_store_core::Format;
use tracing::error;
use tracing_subscriber::EnvFilter;

fn print_result(result: &BenchResult) {
    println!("\nBenchmark: {}", result.name);
    println!("  Total time:   {:?}", result.total_time);
    println!("  Average time: {:?}", result.avg_time);
    println!("  Min time:     {:?}", result.min_time);
    println!("  Max time:     {:?}", result.max_time);
    println!("  Throughput:   {:.2} records/sec", result.throughput);
}

fn run() -> dataset_store_core::Result<()> {
    println!("=== Dataset Template Benchmarks ===");

    let config = BenchConfig {
        iterations: 5,
        warmup_iterations: 1,
        records_per_write: 1000,
        writes_per_iteration: 4,
        ..BenchConfig::default()
    };

    for format in [Format::Json, Format::Bincode] {
        print_result(&bench_in_memory(&BenchConfig { format, ..config.clone() })?);
    }

    println!("\n=== Filesystem formats ===");
    for result in compare_formats(&config)? {
        print_result(&result);
    }

    // Larger batches amortise channel setup
    println!("\n=== Records per write ===");
    for records_per_write in [10, 100, 1000, 10000] {
        let config = BenchConfig {
            iterations: 3,
            records_per_write,
            format: Format::Bincode,
            ..config.clone()
        };
        let result = bench_filesystem(&config)?;
        println!("\nRecords per write: {}", records_per_write);
        println!("  Average time: {:?}", result.avg_time);
        println!("  Throughput:   {:.2} records/sec", result.throughput);
    }

    Ok(())
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    if let Err(e) = run() {
        error!(error = %e, "benchmark failed");
        std::process::exit(1);
    }
}
