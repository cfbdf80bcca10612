use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::Rng;

use prompt_cache::cache::{ManualClock, Sha256Hasher};
use prompt_cache::{CacheConfig, CacheError, CacheManager, LookupOutcome};

const MAX_ENTRIES: usize = 16;

fn enabled_config() -> CacheConfig {
    CacheConfig {
        enabled: true,
        max_entries: MAX_ENTRIES,
        ttl_secs: 2,
        cleanup_interval_secs: 1,
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn randomized_operations_keep_capacity_bound() {
    let clock = Arc::new(ManualClock::new());
    let cache =
        CacheManager::with_dependencies(enabled_config(), Arc::new(Sha256Hasher), clock.clone())
            .unwrap();
    let stop = AtomicBool::new(false);
    let deadline = Instant::now() + Duration::from_millis(300);

    let cache_ref = &cache;
    let stop_ref = &stop;
    let clock_ref = &clock;
    std::thread::scope(|scope| {
        let workers: Vec<_> = (0..8)
            .map(|_| {
                scope.spawn(move || {
                    let mut rng = rand::thread_rng();
                    let mut stores = 0u64;
                    while Instant::now() < deadline {
                        let prompt = format!("prompt-{}", rng.gen_range(0..64));
                        let payload = rng.gen_bool(0.3).then(|| vec![rng.gen::<u8>(); 8]);
                        match rng.gen_range(0..10) {
                            0..=3 => {
                                let outcome = cache_ref.lookup(&prompt, payload.as_deref());
                                assert_ne!(outcome, LookupOutcome::Disabled);
                            }
                            4..=8 => {
                                match cache_ref.store(&prompt, payload.as_deref(), "body") {
                                    Ok(()) | Err(CacheError::CapacityExhausted { .. }) => {}
                                    Err(other) => panic!("unexpected store error: {other}"),
                                }
                                stores += 1;
                                assert!(cache_ref.len() <= MAX_ENTRIES);
                            }
                            _ => {
                                let stats = cache_ref.stats();
                                assert!(stats.size <= MAX_ENTRIES);
                                if let Some(ratio) = stats.hit_ratio {
                                    assert!((0.0..=1.0).contains(&ratio));
                                }
                            }
                        }
                    }
                    stores
                })
            })
            .collect();

        // Move time so entries expire underneath the workers.
        scope.spawn(move || {
            while !stop_ref.load(Ordering::Relaxed) {
                clock_ref.advance(Duration::from_millis(250));
                std::thread::sleep(Duration::from_millis(5));
            }
        });

        let total_stores: u64 = workers.into_iter().map(|h| h.join().unwrap()).sum();
        stop_ref.store(true, Ordering::Relaxed);
        assert!(total_stores > 0);
    });

    let stats = cache.stats();
    assert!(stats.size <= MAX_ENTRIES);
    assert!(stats.hits + stats.misses > 0);
    assert_eq!(stats.errors, 0);

    cache.close();
    assert!(cache.is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn same_key_writers_leave_one_entry() {
    let cache = CacheManager::new(enabled_config()).unwrap();

    std::thread::scope(|scope| {
        for t in 0..8 {
            let cache = &cache;
            scope.spawn(move || {
                for i in 0..200 {
                    cache
                        .store("shared prompt", None, format!("writer {t} value {i}"))
                        .unwrap();
                    let _ = cache.lookup("shared prompt", None);
                }
            });
        }
    });

    assert_eq!(cache.len(), 1);
    let value = cache.lookup("shared prompt", None).into_value().unwrap();
    assert!(value.ends_with("value 199"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn close_races_with_callers_without_resurrecting_state() {
    let cache = CacheManager::new(enabled_config()).unwrap();

    std::thread::scope(|scope| {
        for t in 0..4 {
            let cache = &cache;
            scope.spawn(move || {
                for i in 0..500 {
                    let prompt = format!("p-{t}-{}", i % 8);
                    let _ = cache.store(&prompt, None, "v");
                    let _ = cache.lookup(&prompt, None);
                }
            });
        }
        let cache = &cache;
        scope.spawn(move || {
            std::thread::sleep(Duration::from_millis(1));
            cache.close();
            cache.close();
        });
    });

    assert!(!cache.is_enabled());
    assert!(cache.is_empty());
    let frozen = cache.stats();
    let _ = cache.store("after", None, "v");
    assert_eq!(cache.lookup("after", None), LookupOutcome::Disabled);
    assert_eq!(cache.stats(), frozen);
}
