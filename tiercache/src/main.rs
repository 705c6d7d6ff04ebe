use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tiercache::{CacheConfig, FileStorage, SetOptions, TieredCache, encode_metrics};
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "tiercache")]
#[command(about = "Two-tier cache engine - configuration check and workload driver", long_about = None)]
struct Args {
    /// YAML configuration file; defaults are used when omitted
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Validate the configuration and print it with defaults filled in
    CheckConfig,

    /// Run a synthetic workload against a file-backed durable tier
    Workload {
        /// Directory for the file storage backend
        #[arg(short, long, default_value = "./data/tiercache")]
        dir: PathBuf,

        /// Number of distinct keys
        #[arg(short, long, default_value = "1000")]
        keys: usize,

        /// Number of read operations
        #[arg(short, long, default_value = "10000")]
        reads: usize,

        /// Number of tags keys are spread across
        #[arg(short, long, default_value = "8")]
        tags: usize,

        /// Print Prometheus metrics after the run
        #[arg(long)]
        metrics: bool,
    },
}

fn load_config(path: Option<&PathBuf>) -> Result<CacheConfig> {
    match path {
        Some(path) => CacheConfig::from_file(path)
            .with_context(|| format!("failed to load config from {}", path.display())),
        None => Ok(CacheConfig::default()),
    }
}

fn init_tracing(config: &CacheConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.logging.level));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    match config.logging.format.as_str() {
        "json" => builder.json().init(),
        "compact" => builder.compact().init(),
        _ => builder.pretty().init(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = load_config(args.config.as_ref())?;
    init_tracing(&config);

    match args.command {
        Command::CheckConfig => {
            print!("{}", serde_yaml::to_string(&config)?);
        }
        Command::Workload {
            dir,
            keys,
            reads,
            tags,
            metrics,
        } => {
            run_workload(config, dir, keys, reads, tags.max(1)).await?;
            if metrics {
                let text = encode_metrics().map_err(|e| anyhow::anyhow!("{}", e))?;
                println!("{}", text);
            }
        }
    }

    Ok(())
}

async fn run_workload(
    config: CacheConfig,
    dir: PathBuf,
    keys: usize,
    reads: usize,
    tags: usize,
) -> Result<()> {
    info!("Starting tiercache workload v{}", env!("CARGO_PKG_VERSION"));

    let backend = FileStorage::<String>::from_config(&dir, &config.durable)?;
    let cache = TieredCache::with_backend(config, Arc::new(backend))?;
    cache.start_sync_task();

    let start = Instant::now();
    for i in 0..keys {
        let options = SetOptions::new().with_tags([format!("group-{}", i % tags)]);
        cache
            .set(&format!("key:{}", i), format!("value-{}", i), options)
            .await?;
    }
    let write_time = start.elapsed();

    let start = Instant::now();
    let mut found = 0usize;
    for i in 0..reads {
        // Skewed access: a tenth of the keys take most reads
        let key = if i % 4 == 0 {
            i % keys.max(1)
        } else {
            i % (keys / 10).max(1)
        };
        if cache.get(&format!("key:{}", key)).await.is_some() {
            found += 1;
        }
    }
    let read_time = start.elapsed();

    let invalidated = cache.invalidate_by_tag("group-0").await;
    let maintenance = cache.maintenance().await;
    let stats = cache.get_statistics().await;

    let report = json!({
        "writes": keys,
        "write_ms": millis(write_time),
        "reads": reads,
        "read_ms": millis(read_time),
        "found": found,
        "invalidated": invalidated,
        "maintenance": maintenance,
        "statistics": stats,
    });
    println!("{}", serde_json::to_string_pretty(&report)?);

    cache.destroy().await;
    Ok(())
}

fn millis(elapsed: Duration) -> f64 {
    elapsed.as_secs_f64() * 1000.0
}
