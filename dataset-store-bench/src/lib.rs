//! Benchmarks for the dataset operations template

use std::sync::Arc;
use std::time::{Duration, Instant};

use dataset_store_core::error::Result;
use dataset_store_core::{
    DataType, DatasetOperations, DatasetRepository, DatasetTemplate, Error, Format, InMemoryDatasetRepository, Record,
    Schema, TimeUnit,
};
use dataset_store_fs::{FileSystemDatasetRepository, RepositoryConfig, DEFAULT_BUFFER_SIZE};
use serde::{Deserialize, Serialize};

/// Benchmark configuration
#[derive(Debug, Clone)]
pub struct BenchConfig {
    /// Number of iterations
    pub iterations: usize,

    /// Warmup iterations
    pub warmup_iterations: usize,

    /// Records per write call
    pub records_per_write: usize,

    /// Write calls per iteration
    pub writes_per_iteration: usize,

    /// Record format
    pub format: Format,

    /// Channel buffer size for filesystem repositories
    pub buffer_size: usize,
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            iterations: 10,
            warmup_iterations: 2,
            records_per_write: 1000,
            writes_per_iteration: 4,
            format: Format::Json,
            buffer_size: DEFAULT_BUFFER_SIZE,
        }
    }
}

impl BenchConfig {
    /// Records written and read back per iteration
    pub fn records_per_iteration(&self) -> usize {
        self.records_per_write * self.writes_per_iteration
    }
}

/// Benchmark result
#[derive(Debug, Clone)]
pub struct BenchResult {
    /// Name of the benchmark
    pub name: String,

    /// Total time taken
    pub total_time: Duration,

    /// Average time per iteration
    pub avg_time: Duration,

    /// Min time per iteration
    pub min_time: Duration,

    /// Max time per iteration
    pub max_time: Duration,

    /// Throughput (records/second)
    pub throughput: f64,
}

/// Record type used by every benchmark
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchRecord {
    /// Identifier
    pub id: i64,
    /// Short label
    pub label: Option<String>,
    /// Measured value
    pub score: f64,
    /// Epoch milliseconds
    pub created_at: Option<i64>,
}

impl Record for BenchRecord {
    fn schema() -> Schema {
        Schema::builder()
            .required("id", DataType::Int64)
            .optional("label", DataType::String)
            .required("score", DataType::Float64)
            .optional("created_at", DataType::Timestamp(TimeUnit::Millisecond, None))
            .build()
    }
}

/// Generate `count` records starting at id `offset`
pub fn generate_records(count: usize, offset: usize) -> Vec<BenchRecord> {
    (offset..offset + count)
        .map(|i| BenchRecord {
            id: i as i64,
            label: if i % 7 == 0 { None } else { Some(format!("record_{}", i)) },
            score: i as f64 * 0.25,
            created_at: if i % 3 == 0 { None } else { Some(1_600_000_000_000 + i as i64) },
        })
        .collect()
}

/// Run a benchmark, stopping at the first failing iteration
pub fn run_benchmark<F>(name: &str, config: &BenchConfig, mut func: F) -> Result<BenchResult>
where
    F: FnMut() -> Result<()>,
{
    if config.iterations == 0 {
        return Err(Error::InvalidArgument("iterations must be greater than 0".into()));
    }

    // Warmup
    for _ in 0..config.warmup_iterations {
        func()?;
    }

    let mut times = Vec::with_capacity(config.iterations);
    let start_total = Instant::now();

    for _ in 0..config.iterations {
        let start = Instant::now();
        func()?;
        times.push(start.elapsed());
    }

    let total_time = start_total.elapsed();

    let avg_time = times.iter().sum::<Duration>() / times.len() as u32;
    let min_time = times.iter().min().copied().unwrap_or_default();
    let max_time = times.iter().max().copied().unwrap_or_default();

    let total_records = config.iterations * config.records_per_iteration();
    let throughput = total_records as f64 / total_time.as_secs_f64().max(f64::EPSILON);

    Ok(BenchResult {
        name: name.to_string(),
        total_time,
        avg_time,
        min_time,
        max_time,
        throughput,
    })
}

/// Write then read back one iteration's worth of records through `template`
pub fn round_trip(template: &DatasetTemplate, config: &BenchConfig) -> Result<()> {
    let name = template.dataset_name::<BenchRecord>();
    template.execute(|repo| repo.delete(&name))?;

    for batch in 0..config.writes_per_iteration {
        let records = generate_records(config.records_per_write, batch * config.records_per_write);
        template.write(&records)?;
    }

    let mut seen = 0;
    template.read_with(|_: BenchRecord| {
        seen += 1;
        Ok(())
    })?;

    if seen != config.records_per_iteration() {
        return Err(Error::InvalidArgument(format!(
            "read {} records, expected {}",
            seen,
            config.records_per_iteration()
        )));
    }
    Ok(())
}

fn template_over(repository: Arc<dyn DatasetRepository>, format: Format) -> Result<DatasetTemplate> {
    DatasetTemplate::builder().repository(repository).default_format(format).build()
}

/// Benchmark write and read round trips against the in-memory repository
pub fn bench_in_memory(config: &BenchConfig) -> Result<BenchResult> {
    let template = template_over(Arc::new(InMemoryDatasetRepository::new()), config.format)?;
    run_benchmark(&format!("in-memory {}", config.format), config, || round_trip(&template, config))
}

/// Benchmark write and read round trips against a temporary filesystem repository
pub fn bench_filesystem(config: &BenchConfig) -> Result<BenchResult> {
    let dir = tempfile::tempdir()?;
    let repository =
        FileSystemDatasetRepository::open(RepositoryConfig::new(dir.path()).buffer_size(config.buffer_size))?;
    let template = template_over(Arc::new(repository), config.format)?;
    run_benchmark(&format!("filesystem {}", config.format), config, || round_trip(&template, config))
}

/// Run the filesystem benchmark once per record format
pub fn compare_formats(config: &BenchConfig) -> Result<Vec<BenchResult>> {
    [Format::Json, Format::Bincode]
        .into_iter()
        .map(|format| bench_filesystem(&BenchConfig { format, ..config.clone() }))
        .collect()
}
