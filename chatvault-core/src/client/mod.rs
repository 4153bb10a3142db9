//! Chat API client layer
//!
//! ```text
//! ┌────────────────┐     ┌───────────────────┐     ┌──────────────────┐
//! │ MessageFetcher │ ──► │ RateLimitedClient │ ──► │  HttpChatClient  │
//! │                │     │ bucket + semaphore│     │ (reqwest + JSON) │
//! └────────────────┘     └───────────────────┘     └──────────────────┘
//! ```
//!
//! The `ChatApi` trait is the seam: the fetcher only sees `history`,
//! `replies`, and `user`. `RateLimitedClient` wraps any implementation with
//! a token bucket (average rate) and a semaphore (peak in-flight), and
//! itself implements `ChatApi`, so tests substitute a scripted inner client.

mod http;
mod limiter;

pub use http::HttpChatClient;
pub(crate) use http::status_error;
pub use limiter::{TokenBucket, DEFAULT_BURST, DEFAULT_RATE};

use crate::error::{Error, Result};
use crate::types::ChatUser;
use serde::Deserialize;
use std::future::Future;
use tokio::sync::{Semaphore, SemaphorePermit};

/// Peak simultaneous in-flight requests, independent of the token bucket.
pub const DEFAULT_MAX_IN_FLIGHT: usize = 10;

/// One page of raw messages plus the cursor for the next page.
#[derive(Debug, Clone, Default)]
pub struct Page {
    pub messages: Vec<RawMessage>,
    /// None when the listing is exhausted
    pub next_cursor: Option<String>,
}

/// A message row as the platform returns it, before domain conversion.
#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
pub struct RawMessage {
    pub ts: String,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub thread_ts: Option<String>,
    #[serde(default)]
    pub reply_count: i64,
    #[serde(default)]
    pub reactions: Vec<RawReaction>,
    #[serde(default)]
    pub files: Vec<RawFile>,
}

/// Wire form of a reaction
#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
pub struct RawReaction {
    pub name: String,
    #[serde(default)]
    pub count: i64,
    #[serde(default)]
    pub users: Vec<String>,
}

/// Wire form of a file attachment
#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
pub struct RawFile {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub mimetype: Option<String>,
    #[serde(default)]
    pub url_private: Option<String>,
    #[serde(default)]
    pub size: Option<i64>,
}

/// Narrow capability set of the chat platform.
///
/// The client surfaces errors per the taxonomy (`Retryable` for 429/5xx
/// with any server-advised wait, `Auth` for 401/403, `NotFound` for 404)
/// and never retries on its own; higher layers decide.
pub trait ChatApi: Send + Sync {
    /// One page of channel history within `[oldest, latest]`.
    fn history(
        &self,
        channel_id: &str,
        oldest: &str,
        latest: &str,
        cursor: Option<&str>,
    ) -> impl Future<Output = Result<Page>> + Send;

    /// One page of a thread's replies (first row duplicates the parent).
    fn replies(
        &self,
        channel_id: &str,
        thread_ts: &str,
        cursor: Option<&str>,
    ) -> impl Future<Output = Result<Page>> + Send;

    /// A single user profile.
    fn user(&self, user_id: &str) -> impl Future<Output = Result<ChatUser>> + Send;
}

/// Wraps a `ChatApi` with a process-wide token bucket and a bounded
/// in-flight pool. Every outgoing call first takes a bucket token, then a
/// pool permit held for the duration of the call.
pub struct RateLimitedClient<C> {
    inner: C,
    bucket: TokenBucket,
    pool: Semaphore,
}

impl<C> RateLimitedClient<C> {
    /// Wrap with the default limits (20/s refill, burst 50, 10 in-flight).
    pub fn new(inner: C) -> Self {
        Self::with_limits(inner, DEFAULT_RATE, DEFAULT_BURST, DEFAULT_MAX_IN_FLIGHT)
    }

    pub fn with_limits(inner: C, rate: f64, burst: f64, max_in_flight: usize) -> Self {
        Self {
            inner,
            bucket: TokenBucket::new(rate, burst),
            pool: Semaphore::new(max_in_flight),
        }
    }

    async fn throttle(&self) -> Result<SemaphorePermit<'_>> {
        self.bucket.acquire().await;
        self.pool
            .acquire()
            .await
            .map_err(|_| Error::Cancelled("request pool closed".to_string()))
    }
}

impl<C: ChatApi> ChatApi for RateLimitedClient<C> {
    async fn history(
        &self,
        channel_id: &str,
        oldest: &str,
        latest: &str,
        cursor: Option<&str>,
    ) -> Result<Page> {
        let _permit = self.throttle().await?;
        self.inner.history(channel_id, oldest, latest, cursor).await
    }

    async fn replies(
        &self,
        channel_id: &str,
        thread_ts: &str,
        cursor: Option<&str>,
    ) -> Result<Page> {
        let _permit = self.throttle().await?;
        self.inner.replies(channel_id, thread_ts, cursor).await
    }

    async fn user(&self, user_id: &str) -> Result<ChatUser> {
        let _permit = self.throttle().await?;
        self.inner.user(user_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::time::Instant;

    /// Scripted client: records peak concurrency, returns empty pages.
    struct Probe {
        in_flight: AtomicUsize,
        peak: AtomicUsize,
        delay: Duration,
    }

    impl Probe {
        fn new(delay: Duration) -> Self {
            Self {
                in_flight: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
                delay,
            }
        }

        async fn track(&self) {
            let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(current, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
        }
    }

    impl ChatApi for Probe {
        async fn history(&self, _: &str, _: &str, _: &str, _: Option<&str>) -> Result<Page> {
            self.track().await;
            Ok(Page::default())
        }

        async fn replies(&self, _: &str, _: &str, _: Option<&str>) -> Result<Page> {
            self.track().await;
            Ok(Page::default())
        }

        async fn user(&self, user_id: &str) -> Result<ChatUser> {
            self.track().await;
            Ok(ChatUser {
                id: user_id.to_string(),
                name: None,
                real_name: None,
                display_name: None,
                email: None,
                is_bot: false,
            })
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_pool_caps_peak_concurrency() {
        let client = Arc::new(RateLimitedClient::with_limits(
            Probe::new(Duration::from_millis(100)),
            1000.0,
            1000.0,
            10,
        ));

        let calls: Vec<_> = (0..80)
            .map(|i| {
                let client = client.clone();
                async move { client.user(&format!("U{i}")).await }
            })
            .collect();
        futures::future::join_all(calls).await;

        assert!(client.inner.peak.load(Ordering::SeqCst) <= 10);
    }

    #[tokio::test(start_paused = true)]
    async fn test_bucket_paces_calls_beyond_burst() {
        let client = Arc::new(RateLimitedClient::with_limits(
            Probe::new(Duration::ZERO),
            20.0,
            50.0,
            200,
        ));

        let start = Instant::now();
        let calls: Vec<_> = (0..200)
            .map(|i| {
                let client = client.clone();
                async move { client.user(&format!("U{i}")).await }
            })
            .collect();
        futures::future::join_all(calls).await;

        // 50 burst + 150 paced at 20/s
        let elapsed = start.elapsed().as_secs_f64();
        assert!(
            (elapsed - 7.5).abs() < 0.75,
            "expected ~7.5s, got {elapsed}"
        );
    }
}
