use std::collections::HashMap;
use std::time::Duration;

use tokio::time::{sleep, timeout, Instant};
use tracing::{debug, warn};

use crate::error::FetchError;
use crate::source::PageSource;

/// Enforces a minimum gap between consecutive calls.
///
/// Holds the only mutable clock of the fetch path. `wait` takes `&mut self`, so
/// sharing a limiter between tasks needs an outer lock.
#[derive(Debug)]
pub struct RateLimiter {
    interval: Duration,
    last: Option<Instant>,
}

impl RateLimiter {
    /// `calls_per_second <= 0` disables limiting.
    pub fn new(calls_per_second: f64) -> Self {
        let interval = if calls_per_second > 0.0 {
            Duration::try_from_secs_f64(1.0 / calls_per_second).unwrap_or(Duration::MAX)
        } else {
            Duration::ZERO
        };
        Self { interval, last: None }
    }

    pub async fn wait(&mut self) {
        if let Some(last) = self.last {
            let remaining = self.interval.saturating_sub(last.elapsed());
            if !remaining.is_zero() {
                debug!(wait_ms = remaining.as_millis() as u64, "rate limit");
                sleep(remaining).await;
            }
        }
        self.last = Some(Instant::now());
    }
}

/// Exponential backoff: `multiplier * 2^attempt` seconds, clamped to `[min, max]`.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub multiplier: f64,
    pub min_wait: Duration,
    pub max_wait: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            multiplier: 1.0,
            min_wait: Duration::from_secs(4),
            max_wait: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    /// Wait after the `attempt`-th failure (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let secs = self.multiplier * 2f64.powi(attempt as i32);
        Duration::try_from_secs_f64(secs.max(0.0))
            .unwrap_or(self.max_wait)
            .clamp(self.min_wait, self.max_wait)
    }
}

/// URL keyed page store with a freshness window.
pub trait PageCache {
    /// Cached HTML for `url` if it was stored less than `ttl` ago.
    fn get(&self, url: &str, ttl: Duration) -> Option<String>;
    fn put(&mut self, url: &str, html: &str);
}

/// In-process cache for runs that must not touch the on-disk cache.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: HashMap<String, (String, Instant)>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PageCache for MemoryCache {
    fn get(&self, url: &str, ttl: Duration) -> Option<String> {
        self.entries
            .get(url)
            .filter(|(_, at)| at.elapsed() < ttl)
            .map(|(html, _)| html.clone())
    }

    fn put(&mut self, url: &str, html: &str) {
        self.entries
            .insert(url.to_string(), (html.to_string(), Instant::now()));
    }
}

#[derive(Debug, Clone)]
pub struct FetcherOptions {
    pub calls_per_second: f64,
    pub timeout: Duration,
    pub cache_ttl: Duration,
    pub retry: RetryPolicy,
}

impl Default for FetcherOptions {
    fn default() -> Self {
        Self {
            calls_per_second: 1.0,
            timeout: Duration::from_secs(40),
            cache_ttl: Duration::from_secs(3600),
            retry: RetryPolicy::default(),
        }
    }
}

/// Cache, then rate limit, then the page source with retries.
pub struct RateLimitedFetcher<S, C> {
    source: S,
    cache: C,
    limiter: RateLimiter,
    retry: RetryPolicy,
    timeout: Duration,
    ttl: Duration,
}

impl<S: PageSource, C: PageCache> RateLimitedFetcher<S, C> {
    pub fn new(source: S, cache: C, opts: FetcherOptions) -> Self {
        Self {
            source,
            cache,
            limiter: RateLimiter::new(opts.calls_per_second),
            retry: opts.retry,
            timeout: opts.timeout,
            ttl: opts.cache_ttl,
        }
    }

    /// A fresh cache hit skips both the limiter and the network.
    pub async fn fetch(&mut self, url: &str) -> Result<String, FetchError> {
        if let Some(html) = self.cache.get(url, self.ttl) {
            debug!(url, "cache hit");
            return Ok(html);
        }
        self.fetch_uncached(url).await
    }

    /// Always goes to the source; refreshes the cache on success.
    pub async fn fetch_uncached(&mut self, url: &str) -> Result<String, FetchError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            self.limiter.wait().await;

            let result = match timeout(self.timeout, self.source.fetch(url)).await {
                Ok(r) => r,
                Err(_) => Err(FetchError::Timeout(self.timeout)),
            };

            match result {
                Ok(html) => {
                    self.cache.put(url, &html);
                    return Ok(html);
                }
                Err(e) if !e.is_retryable() => return Err(e),
                Err(e) if attempt >= self.retry.attempts => {
                    return Err(FetchError::Exhausted {
                        url: url.to_string(),
                        attempts: attempt,
                        last: Box::new(e),
                    });
                }
                Err(e) => {
                    let wait = self.retry.backoff(attempt);
                    warn!(
                        url,
                        attempt,
                        max = self.retry.attempts,
                        "{e}, backing off {:.1}s",
                        wait.as_secs_f64()
                    );
                    sleep(wait).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::testing::ScriptedSource;

    fn fetcher(source: ScriptedSource, rate: f64) -> RateLimitedFetcher<ScriptedSource, MemoryCache> {
        RateLimitedFetcher::new(
            source,
            MemoryCache::new(),
            FetcherOptions {
                calls_per_second: rate,
                ..Default::default()
            },
        )
    }

    #[test]
    fn backoff_is_clamped() {
        let p = RetryPolicy::default();
        assert_eq!(p.backoff(1), Duration::from_secs(4));
        assert_eq!(p.backoff(2), Duration::from_secs(4));
        assert_eq!(p.backoff(3), Duration::from_secs(8));
        assert_eq!(p.backoff(5), Duration::from_secs(10));
    }

    #[test]
    fn huge_backoff_saturates_at_max_wait() {
        let p = RetryPolicy {
            attempts: 70,
            ..Default::default()
        };
        assert_eq!(p.backoff(64), Duration::from_secs(10));
        assert_eq!(p.backoff(2000), Duration::from_secs(10));

        let p = RetryPolicy {
            multiplier: 1e300,
            ..Default::default()
        };
        assert_eq!(p.backoff(1), Duration::from_secs(10));
    }

    #[test]
    fn tiny_rate_gives_a_long_interval() {
        assert_eq!(RateLimiter::new(1e-300).interval, Duration::MAX);
        assert_eq!(RateLimiter::new(0.0).interval, Duration::ZERO);
        assert_eq!(RateLimiter::new(4.0).interval, Duration::from_millis(250));
    }

    #[tokio::test(start_paused = true)]
    async fn second_call_waits_for_interval() {
        let source = ScriptedSource::new().page("a", "<p>a</p>").page("b", "<p>b</p>");
        let mut f = fetcher(source, 2.0);

        let start = Instant::now();
        f.fetch("a").await.unwrap();
        let first = start.elapsed();
        f.fetch("b").await.unwrap();
        assert!(first < Duration::from_millis(10));
        assert!(start.elapsed() >= Duration::from_millis(500));
    }

    #[tokio::test(start_paused = true)]
    async fn cache_hit_skips_source_and_limiter() {
        let source = ScriptedSource::new().page("a", "<p>a</p>");
        let mut f = fetcher(source, 0.5);

        f.fetch("a").await.unwrap();
        let start = Instant::now();
        assert_eq!(f.fetch("a").await.unwrap(), "<p>a</p>");
        assert_eq!(start.elapsed(), Duration::ZERO);
        assert_eq!(f.source.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn expired_entry_is_refetched() {
        let source = ScriptedSource::new().page("a", "<p>a</p>");
        let mut f = fetcher(source, 0.0);

        f.fetch("a").await.unwrap();
        tokio::time::advance(Duration::from_secs(3601)).await;
        f.fetch("a").await.unwrap();
        assert_eq!(f.source.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn uncached_fetch_bypasses_cache() {
        let source = ScriptedSource::new().page("a", "<p>old</p>").status("a", 503);
        let mut f = fetcher(source, 0.0);

        f.fetch("a").await.unwrap();
        let err = f.fetch_uncached("a").await.unwrap_err();
        assert!(matches!(err, FetchError::Exhausted { attempts: 3, .. }));
        // cached copy is still served to the regular path
        assert_eq!(f.fetch("a").await.unwrap(), "<p>old</p>");
    }

    #[tokio::test(start_paused = true)]
    async fn retries_then_succeeds() {
        let source = ScriptedSource::new()
            .status("a", 429)
            .status("a", 502)
            .page("a", "<p>ok</p>");
        let mut f = fetcher(source, 0.0);

        let start = Instant::now();
        assert_eq!(f.fetch("a").await.unwrap(), "<p>ok</p>");
        assert_eq!(f.source.calls(), 3);
        assert!(start.elapsed() >= Duration::from_secs(8));
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_after_three_attempts() {
        let source = ScriptedSource::new().status("a", 500);
        let mut f = fetcher(source, 0.0);

        match f.fetch("a").await {
            Err(FetchError::Exhausted { attempts, last, .. }) => {
                assert_eq!(attempts, 3);
                assert!(matches!(*last, FetchError::Status { status: 500, .. }));
            }
            other => panic!("expected exhaustion, got {other:?}"),
        }
        assert_eq!(f.source.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn client_errors_are_not_retried() {
        let source = ScriptedSource::new().status("a", 404);
        let mut f = fetcher(source, 0.0);

        let err = f.fetch("a").await.unwrap_err();
        assert!(matches!(err, FetchError::Status { status: 404, .. }));
        assert_eq!(f.source.calls(), 1);
    }
}
