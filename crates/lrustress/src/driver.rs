//! Concurrent writer driver for lrucache
//!
//! Every client thread writes its own data set into every cache; after all
//! writers join, each cache is checked for size and structural soundness.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{anyhow, bail, Context, Result};
use lrucache::LruCache;
use serde::Serialize;
use tracing::{debug, info};

/// Stress run configuration
#[derive(Debug, Clone)]
pub struct StressConfig {
    pub threads: usize,
    pub keys_per_client: usize,
    pub capacity: usize,
    pub caches: usize,
    pub shrink_to: Option<usize>,
    pub stagger_ms: u64,
}

/// Per-cache outcome of a run
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CacheReport {
    pub cache: usize,
    pub size: usize,
    pub capacity: usize,
    pub head: Option<String>,
    pub tail: Option<String>,
    pub inserts: u64,
    pub updates: u64,
    pub evictions: u64,
}

/// Outcome of a whole run
#[derive(Debug, Clone, Serialize)]
pub struct StressReport {
    pub writes: usize,
    pub elapsed_ms: u64,
    pub caches: Vec<CacheReport>,
}

/// Keys written by one client: a key overwritten on every round plus one
/// unique key per round.
fn client_data(client: usize, count: usize) -> Vec<(String, f64)> {
    let mut data = Vec::with_capacity(count.saturating_mul(2));
    for i in 0..count {
        data.push((format!("client_{}", client), i as f64));
        data.push((format!("client_{}_{}", client, i), i as f64));
    }
    data
}

/// Distinct keys across all clients
fn distinct_keys(config: &StressConfig) -> usize {
    if config.keys_per_client == 0 {
        0
    } else {
        config
            .threads
            .saturating_mul(config.keys_per_client.saturating_add(1))
    }
}

/// Start delay for a client; clients are spread over five delay slots
fn stagger_for(config: &StressConfig, client: usize) -> Duration {
    Duration::from_millis(config.stagger_ms.saturating_mul((client % 5) as u64))
}

fn verify(cache: &LruCache<String, f64>, id: usize, expected: usize) -> Result<()> {
    let size = cache
        .size()
        .with_context(|| format!("cache {} size check failed", id))?;
    if size != expected {
        bail!("cache {} holds {} entries, expected {}", id, size, expected);
    }

    cache
        .check_invariants()
        .with_context(|| format!("cache {} failed its invariant check", id))?;
    let rendered = cache.render()?;
    debug!(cache = id, "{}", rendered);
    Ok(())
}

/// Run writers against fresh caches and verify the result
pub fn run(config: &StressConfig) -> Result<StressReport> {
    let caches = (0..config.caches)
        .map(|_| LruCache::new(config.capacity).map(Arc::new))
        .collect::<lrucache::Result<Vec<_>>>()
        .context("failed to create caches")?;

    info!(
        threads = config.threads,
        caches = config.caches,
        capacity = config.capacity,
        "starting writers"
    );
    let started = Instant::now();

    let mut handles = Vec::new();
    for client in 0..config.threads {
        for cache in &caches {
            let cache = Arc::clone(cache);
            let data = client_data(client, config.keys_per_client);
            let stagger = stagger_for(config, client);

            handles.push(thread::spawn(move || -> lrucache::Result<usize> {
                thread::sleep(stagger);
                let writes = data.len();
                for (key, value) in data {
                    cache.write(key, value)?;
                }
                Ok(writes)
            }));
        }
    }

    let mut writes = 0;
    for handle in handles {
        writes += handle
            .join()
            .map_err(|_| anyhow!("writer thread panicked"))?
            .context("writer failed")?;
    }
    let elapsed_ms = started.elapsed().as_millis() as u64;
    info!(writes, elapsed_ms, "writers finished");

    let expected = distinct_keys(config).min(config.capacity);
    let mut reports = Vec::with_capacity(caches.len());
    for (id, cache) in caches.iter().enumerate() {
        verify(cache, id, expected)?;

        if let Some(shrink_to) = config.shrink_to {
            cache
                .resize(shrink_to)
                .with_context(|| format!("cache {} resize to {} failed", id, shrink_to))?;
            verify(cache, id, expected.min(shrink_to))?;
        }

        let stats = cache.stats().snapshot();
        reports.push(CacheReport {
            cache: id,
            size: cache.size()?,
            capacity: cache.capacity(),
            head: cache.head_key()?,
            tail: cache.tail_key()?,
            inserts: stats.inserts,
            updates: stats.updates,
            evictions: stats.evictions,
        });
    }

    Ok(StressReport {
        writes,
        elapsed_ms,
        caches: reports,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> StressConfig {
        StressConfig {
            threads: 8,
            keys_per_client: 20,
            capacity: 12,
            caches: 3,
            shrink_to: None,
            stagger_ms: 0,
        }
    }

    #[test]
    fn test_run_fills_every_cache() {
        let report = run(&config()).unwrap();

        assert_eq!(report.writes, 3 * 8 * 40);
        assert_eq!(report.caches.len(), 3);
        for cache in &report.caches {
            assert_eq!(cache.size, 12);
            assert_eq!(cache.capacity, 12);
            assert!(cache.head.is_some());
            assert_eq!(cache.inserts + cache.updates, 8 * 40);
            assert_eq!(cache.inserts - cache.evictions, 12);
        }
    }

    #[test]
    fn test_run_with_shrink() {
        let mut config = config();
        config.shrink_to = Some(1);

        let report = run(&config).unwrap();

        for cache in &report.caches {
            assert_eq!(cache.size, 1);
            assert_eq!(cache.head, cache.tail);
        }
    }

    #[test]
    fn test_run_below_capacity() {
        let mut config = config();
        config.threads = 2;
        config.keys_per_client = 3;
        config.capacity = 100;

        let report = run(&config).unwrap();

        assert_eq!(report.caches[0].size, 8);
        assert_eq!(report.caches[0].evictions, 0);
    }

    #[test]
    fn test_run_rejects_bad_capacity() {
        let mut config = config();
        config.capacity = 0;

        assert!(run(&config).is_err());
    }

    #[test]
    fn test_large_settings_saturate() {
        let mut config = config();
        config.threads = usize::MAX;
        config.keys_per_client = usize::MAX;
        config.stagger_ms = u64::MAX;

        assert_eq!(distinct_keys(&config), usize::MAX);
        assert_eq!(stagger_for(&config, 0), Duration::ZERO);
        assert_eq!(stagger_for(&config, 3), Duration::from_millis(u64::MAX));
    }

    #[test]
    fn test_client_data_shape() {
        let data = client_data(3, 2);

        assert_eq!(
            data,
            vec![
                ("client_3".to_string(), 0.0),
                ("client_3_0".to_string(), 0.0),
                ("client_3".to_string(), 1.0),
                ("client_3_1".to_string(), 1.0),
            ]
        );
    }
}
