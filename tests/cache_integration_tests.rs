//! Integration Tests for the Public Cache API
//!
//! Exercises full entry lifecycles through `WeakCache` only.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Once};
use std::time::Duration;

use tokio::time::{self, advance};
use tracing_subscriber::EnvFilter;
use weak_cache::{CacheError, CacheKey, Config, ObjectKey, Token, UnregisterToken, WeakCache};

// == Helper Functions ==

static TRACING: Once = Once::new();

fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| "weak_cache=debug".into()),
            )
            .with_test_writer()
            .try_init();
    });
}

#[derive(Debug, PartialEq)]
struct Profile {
    name: String,
}

fn profile(name: &str) -> Arc<Profile> {
    Arc::new(Profile {
        name: name.to_string(),
    })
}

fn create_test_cache(config: Config) -> WeakCache<Profile> {
    init_tracing();
    WeakCache::new(config.with_sweep_interval(Duration::ZERO)).unwrap()
}

// == Construction ==

#[test]
fn test_construction_requires_runtime() {
    init_tracing();
    let err = WeakCache::<Profile>::new(Config::default()).unwrap_err();
    assert!(matches!(err, CacheError::Construction(_)));
}

#[test]
fn test_construction_inside_entered_runtime() {
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .unwrap();
    let _guard = rt.enter();

    let cache: WeakCache<Profile> = WeakCache::with_defaults().unwrap();
    cache.set("k", profile("a"), None).unwrap();
    assert!(cache.has("k"));
}

// == Mixed Key Kinds ==

#[tokio::test(start_paused = true)]
async fn test_mixed_key_kinds_coexist() {
    let cache = create_test_cache(Config::default());
    let token = Token::with_description("session");
    let object = ObjectKey::new(Profile {
        name: "key".to_string(),
    });
    let value = profile("object-value");

    cache.set("plain", profile("plain-value"), None).unwrap();
    cache.set(&token, profile("token-value"), None).unwrap();
    cache.set(&object, value.clone(), None).unwrap();

    assert_eq!(cache.len(), 3);
    assert_eq!(cache.get("plain").unwrap().name, "plain-value");
    assert_eq!(cache.get(&token).unwrap().name, "token-value");
    assert_eq!(cache.get(&object).unwrap().name, "object-value");

    // Identity keys never match structurally equal look-alikes
    assert!(!cache.has(Token::with_description("session")));
    assert!(!cache.has(ObjectKey::new(Profile {
        name: "key".to_string()
    })));
}

// == Lifecycle Scenarios ==

#[tokio::test(start_paused = true)]
async fn test_object_entry_expires_after_ttl() {
    let cache = create_test_cache(Config::default());
    let key = ObjectKey::new(1u32);
    let value = profile("a");

    cache
        .set(&key, value.clone(), Some(Duration::from_millis(100)))
        .unwrap();
    assert_eq!(cache.get(&key).unwrap().name, "a");

    advance(Duration::from_millis(101)).await;

    assert!(cache.get(&key).is_none());
    assert!(!cache.has(&key));
}

#[tokio::test(start_paused = true)]
async fn test_capacity_two_keeps_newest() {
    let cache = create_test_cache(Config::default().with_max_size(2));

    cache.set("A", profile("a"), None).unwrap();
    cache.set("B", profile("b"), None).unwrap();
    cache.set("C", profile("c"), None).unwrap();

    assert_eq!(cache.len(), 2);
    assert!(!cache.has("A"));
    assert!(cache.has("B"));
    assert!(cache.has("C"));
}

#[tokio::test(start_paused = true)]
async fn test_overwrite_then_delete() {
    let cache = create_test_cache(Config::default());

    cache
        .set("k", profile("v"), Some(Duration::from_millis(100)))
        .unwrap();
    cache
        .set("k", profile("v2"), Some(Duration::from_millis(100)))
        .unwrap();

    assert!(cache.delete("k"));
    assert!(!cache.delete("k"));
    assert!(cache.keys().is_empty());

    time::sleep(Duration::from_millis(200)).await;
    assert_eq!(cache.stats().expirations, 0);
}

// == Collection ==

#[tokio::test(start_paused = true)]
async fn test_dropped_values_disappear() {
    let cache = create_test_cache(Config::default());
    let kept_key = ObjectKey::new("kept");
    let dropped_key = ObjectKey::new("dropped");
    let kept = profile("kept");

    cache.set(&kept_key, kept.clone(), None).unwrap();
    cache.set(&dropped_key, profile("dropped"), None).unwrap();

    // The temporary Arc above was the only owner
    assert!(!cache.has(&dropped_key));
    assert_eq!(cache.keys(), vec![CacheKey::from(&kept_key)]);
}

#[tokio::test(start_paused = true)]
async fn test_background_sweep_runs_notifications() {
    init_tracing();
    let cache: WeakCache<Profile> =
        WeakCache::new(Config::default().with_sweep_interval(Duration::from_millis(200))).unwrap();
    let calls = Arc::new(AtomicUsize::new(0));
    let hook = calls.clone();
    let external = Arc::new(vec![1u8, 2, 3]);

    cache
        .notify_on_collect(
            Token::new(),
            &external,
            move |_| {
                hook.fetch_add(1, Ordering::SeqCst);
            },
            None,
        )
        .unwrap();
    drop(external);

    time::sleep(Duration::from_millis(250)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    // Delivered exactly once
    time::sleep(Duration::from_millis(500)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_cleanup_callback_may_use_the_cache() {
    let cache = create_test_cache(Config::default());
    let reentrant = cache.clone();
    let watched = profile("watched");

    cache.set("derived", profile("derived"), None).unwrap();
    cache
        .notify_on_collect(
            "watched",
            &watched,
            move |_| {
                reentrant.delete("derived");
            },
            Some(UnregisterToken::new()),
        )
        .unwrap();

    drop(watched);
    assert_eq!(cache.process_collections(), 1);
    assert!(!cache.has("derived"));
}

// == TTL Accessors ==

#[tokio::test(start_paused = true)]
async fn test_ttl_accessors() {
    let cache = create_test_cache(Config::default().with_default_ttl(Duration::from_secs(60)));

    cache.set("k", profile("a"), None).unwrap();
    advance(Duration::from_secs(20)).await;

    let info = cache.get_ttl("k").unwrap();
    assert_eq!(info.remaining, Duration::from_secs(40));

    assert!(cache.update_ttl("k", Duration::from_secs(5)));
    assert_eq!(cache.get_ttl("k").unwrap().remaining, Duration::from_secs(5));

    advance(Duration::from_secs(5)).await;
    assert!(cache.get_ttl("k").is_none());
    assert!(!cache.update_ttl("k", Duration::from_secs(5)));
}

// == Concurrency ==

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_operations_keep_bounds() {
    init_tracing();
    let cache: WeakCache<String> =
        WeakCache::new(Config::default().with_max_size(32)).unwrap();

    let mut handles = Vec::new();
    for worker in 0..8 {
        let cache = cache.clone();
        handles.push(tokio::spawn(async move {
            for i in 0..200 {
                let key = format!("key_{}", (worker * 7 + i) % 64);
                match i % 4 {
                    0 | 1 => cache
                        .set(key.as_str(), Arc::new(format!("value_{i}")), None)
                        .unwrap(),
                    2 => {
                        cache.get(key.as_str());
                    }
                    _ => {
                        cache.delete(key.as_str());
                    }
                }
                tokio::task::yield_now().await;
            }
        }));
    }

    for handle in handles {
        handle.await.expect("Task should not panic");
    }

    assert!(cache.len() <= 32);
    assert_eq!(cache.len(), cache.keys().len());
    let stats = cache.stats();
    assert!(stats.hit_rate() >= 0.0 && stats.hit_rate() <= 1.0);
}
