//! lrustress - concurrent writer stress driver for lrucache

mod driver;

use anyhow::Result;
use clap::Parser;
use tracing::info;

use crate::driver::{StressConfig, StressReport};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Writer clients per cache
    #[arg(short, long, default_value_t = 20)]
    threads: usize,

    /// Rounds per client; each round writes one shared and one unique key
    #[arg(short, long, default_value_t = 62)]
    keys_per_client: usize,

    /// Capacity of every cache
    #[arg(short, long, default_value_t = 12)]
    capacity: usize,

    /// Number of caches written concurrently
    #[arg(long, default_value_t = 1)]
    caches: usize,

    /// Shrink every cache to this capacity after the writers finish
    #[arg(long)]
    shrink_to: Option<usize>,

    /// Max start delay between clients, in milliseconds
    #[arg(long, default_value_t = 2)]
    stagger_ms: u64,

    /// Print the report as JSON
    #[arg(long)]
    json: bool,
}

impl From<&Args> for StressConfig {
    fn from(args: &Args) -> Self {
        StressConfig {
            threads: args.threads,
            keys_per_client: args.keys_per_client,
            capacity: args.capacity,
            caches: args.caches,
            shrink_to: args.shrink_to,
            stagger_ms: args.stagger_ms,
        }
    }
}

fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let args = Args::parse();

    info!("Starting lrustress v{}", env!("CARGO_PKG_VERSION"));
    info!("Caches: {} x capacity {}", args.caches, args.capacity);
    info!(
        "Clients: {} x {} rounds",
        args.threads, args.keys_per_client
    );

    let report = driver::run(&StressConfig::from(&args))?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }

    Ok(())
}

fn print_report(report: &StressReport) {
    println!(
        "{} writes in {} ms",
        report.writes, report.elapsed_ms
    );
    for cache in &report.caches {
        println!(
            "cache {}: {}/{} entries, head={} tail={}, inserts={} updates={} evictions={}",
            cache.cache,
            cache.size,
            cache.capacity,
            cache.head.as_deref().unwrap_or("-"),
            cache.tail.as_deref().unwrap_or("-"),
            cache.inserts,
            cache.updates,
            cache.evictions
        );
    }
}
