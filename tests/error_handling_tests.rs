use memo_cache::{BoxError, CacheError, CacheOptions, MemoCache};
use std::sync::Arc;
use std::time::Duration;
use tokio_test::{assert_err, assert_ok};

#[derive(Debug)]
struct CustomError {
    message: String,
}

impl std::fmt::Display for CustomError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "CustomError: {}", self.message)
    }
}

impl std::error::Error for CustomError {}

fn load(key: i32) -> Result<Option<String>, CustomError> {
    if key == 404 {
        Err(CustomError {
            message: "Not found".to_string(),
        })
    } else {
        Ok(Some(format!("loaded_{}", key)))
    }
}

#[test]
fn test_load_error_handling() {
    let cache = MemoCache::new();

    let result = assert_ok!(cache.get_or_compute("200", CacheOptions::default(), || load(200)));
    assert_eq!(result.as_deref(), Some("loaded_200"));

    let error = assert_err!(cache.get_or_compute("404", CacheOptions::default(), || load(404)));
    assert!(error.to_string().contains("Not found"));
    assert!(matches!(error, CacheError::Producer(_)));
}

#[test]
fn test_errors_are_not_cached() {
    let cache = MemoCache::new();
    let counter = std::sync::atomic::AtomicUsize::new(0);
    let flaky = || {
        let attempt = counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        if attempt == 0 {
            Err(CustomError {
                message: "first attempt failed".to_string(),
            })
        } else {
            Ok(Some(attempt))
        }
    };

    assert!(cache.get_or_compute("k", CacheOptions::default(), flaky).is_err());
    assert!(cache.is_empty());
    assert_eq!(cache.get_or_compute("k", CacheOptions::default(), flaky).unwrap(), Some(1));
    assert_eq!(cache.get_or_compute("k", CacheOptions::default(), flaky).unwrap(), Some(1));
    assert_eq!(counter.load(std::sync::atomic::Ordering::SeqCst), 2);
}

#[test]
fn test_error_source_is_preserved() {
    let cache = MemoCache::new();
    let error = cache
        .get_or_compute::<String, _, _>("io", CacheOptions::default(), || {
            Err(std::io::Error::new(std::io::ErrorKind::NotFound, "File not found"))
        })
        .unwrap_err();

    let inner = error.into_inner();
    let io = inner.downcast_ref::<std::io::Error>().unwrap();
    assert_eq!(io.kind(), std::io::ErrorKind::NotFound);
}

#[tokio::test]
async fn test_async_error_handling() {
    let cache = MemoCache::new();

    let result = cache
        .get_or_compute_async::<String, _, _, _>("parse", CacheOptions::default(), || async {
            "123abc".parse::<i32>().map(|n| Some(n.to_string()))
        })
        .await;
    assert!(result.is_err());
    assert!(cache.is_empty());
}

#[tokio::test]
async fn test_concurrent_access() {
    let cache = Arc::new(MemoCache::new());

    let mut handles = Vec::new();
    for i in 0..5 {
        let cache_clone = cache.clone();
        let handle = tokio::spawn(async move {
            cache_clone
                .get_or_compute_async(&i.to_string(), CacheOptions::default(), || async move {
                    tokio::time::sleep(Duration::from_millis(100)).await;
                    Ok::<_, BoxError>(Some(format!("loaded_{}", i)))
                })
                .await
                .unwrap()
        });
        handles.push(handle);
    }

    let mut results = Vec::new();
    for handle in handles {
        let result = handle.await.unwrap();
        results.push(result);
    }

    assert_eq!(results.len(), 5);
    assert_eq!(cache.len(), 5);

    for result in &results {
        assert!(result.as_deref().unwrap().starts_with("loaded_"));
    }
}

#[tokio::test]
async fn test_concurrent_same_key() {
    let load_counter = Arc::new(std::sync::atomic::AtomicUsize::new(0));
    let cache = Arc::new(MemoCache::new());

    let mut handles = Vec::new();
    for _ in 0..3 {
        let cache_clone = cache.clone();
        let counter = load_counter.clone();
        let handle = tokio::spawn(async move {
            cache_clone
                .get_or_compute_async("42", CacheOptions::new().with_ttl_ms(10_000), || async move {
                    counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    Ok::<_, BoxError>(Some("loaded_42".to_string()))
                })
                .await
                .unwrap()
        });
        handles.push(handle);
    }

    for handle in handles {
        assert_eq!(handle.await.unwrap().as_deref(), Some("loaded_42"));
    }

    let load_count = load_counter.load(std::sync::atomic::Ordering::SeqCst);
    assert!(load_count >= 1, "Loader should be called at least once");
    assert_eq!(cache.len(), 1);
}
