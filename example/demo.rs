use memo_cache::{BoxError, CacheOptions, MemoCache};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

const CACHE_TTL_MS: u64 = 1_000;
const LOAD_DELAY_MS: u64 = 100;

async fn load_quote(symbol: &'static str) -> Result<Option<String>, BoxError> {
    tokio::time::sleep(Duration::from_millis(LOAD_DELAY_MS)).await;
    Ok(Some(format!("{} @ {:?}", symbol, std::time::Instant::now())))
}

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("memo_cache=debug")),
        )
        .init();

    let cache = MemoCache::new();
    let options = CacheOptions::new().with_ttl_ms(CACHE_TTL_MS);

    println!("Loading quote (miss)...");
    let quote = cache
        .get_or_compute_with_refresh_async("ACME", options, || load_quote("ACME"))
        .await?;
    println!("Got: {:?}", quote);

    println!("Loading quote again (hit)...");
    let quote = cache
        .get_or_compute_with_refresh_async("ACME", options, || load_quote("ACME"))
        .await?;
    println!("Got: {:?}", quote);

    tokio::time::sleep(Duration::from_millis(850)).await;
    println!("Past 80% of the TTL: served from cache, refreshed in the background...");
    let quote = cache
        .get_or_compute_with_refresh_async("ACME", options, || load_quote("ACME"))
        .await?;
    println!("Got: {:?}", quote);

    tokio::time::sleep(Duration::from_millis(LOAD_DELAY_MS * 2)).await;
    let quote = cache
        .get_or_compute_with_refresh_async("ACME", options, || load_quote("ACME"))
        .await?;
    println!("After refresh: {:?}", quote);

    println!("Caching a missing value:");
    let missing: Option<String> = cache
        .get_or_compute("NOPE", options.cache_absence(true), || Ok::<_, BoxError>(None))?;
    println!("Got: {:?} (cache size: {})", missing, cache.len());

    cache.remove("ACME");
    println!("Cache size after removal: {}", cache.len());

    cache.reset();
    println!("Cache size after reset: {}", cache.len());

    Ok(())
}
