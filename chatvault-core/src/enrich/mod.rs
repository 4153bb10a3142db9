//! Issue-ticket enrichment coordinator
//!
//! Second phase of a cache run: after message partitions are written, the
//! coordinator unions the issue keys mentioned across all messages and
//! batch-fetches ticket metadata with isolated per-key failures. Enrichment
//! is purely additive; nothing here can roll back message persistence.

mod http;

pub use http::HttpIssueClient;

use crate::error::Result;
use crate::types::{ChatMessage, IssueTicket};
use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Semaphore;

/// Peak concurrent ticket fetches.
pub const DEFAULT_TICKET_CONCURRENCY: usize = 10;

/// Narrow capability set of the issue tracker.
pub trait IssueApi: Send + Sync {
    /// Metadata for one ticket key.
    fn ticket(&self, key: &str) -> impl Future<Output = Result<IssueTicket>> + Send;
}

/// Result of one enrichment pass.
#[derive(Debug, Default)]
pub struct EnrichOutcome {
    /// Successfully fetched tickets, in key order
    pub tickets: Vec<IssueTicket>,
    /// Keys whose fetch failed (logged, not persisted)
    pub failed_keys: Vec<String>,
}

/// Batch-fetches ticket metadata through a bounded worker pool.
pub struct EnrichmentCoordinator<I> {
    client: Arc<I>,
    pool: Semaphore,
}

impl<I: IssueApi> EnrichmentCoordinator<I> {
    pub fn new(client: Arc<I>) -> Self {
        Self::with_concurrency(client, DEFAULT_TICKET_CONCURRENCY)
    }

    pub fn with_concurrency(client: Arc<I>, max_in_flight: usize) -> Self {
        Self {
            client,
            pool: Semaphore::new(max_in_flight),
        }
    }

    /// Union of `issue_keys` across messages, first-occurrence order.
    pub fn unique_keys(messages: &[ChatMessage]) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut keys = Vec::new();
        for message in messages {
            for key in &message.issue_keys {
                if seen.insert(key.clone()) {
                    keys.push(key.clone());
                }
            }
        }
        keys
    }

    /// Fetch every key mentioned in `messages`.
    pub async fn enrich(&self, messages: &[ChatMessage]) -> EnrichOutcome {
        let keys = Self::unique_keys(messages);
        self.fetch_tickets(&keys).await
    }

    /// Fetch a set of keys concurrently. Each key's failure is isolated:
    /// it is logged with the key name, dropped from the result, and the
    /// remaining fetches continue.
    pub async fn fetch_tickets(&self, keys: &[String]) -> EnrichOutcome {
        if keys.is_empty() {
            return EnrichOutcome::default();
        }

        tracing::info!(tickets = keys.len(), "Fetching issue ticket metadata");

        let fetches = keys.iter().map(|key| {
            let client = Arc::clone(&self.client);
            async move {
                let _permit = match self.pool.acquire().await {
                    Ok(permit) => permit,
                    Err(_) => return Err(()),
                };
                client.ticket(key).await.map_err(|e| {
                    tracing::warn!(ticket = %key, error = %e, "Ticket fetch failed");
                })
            }
        });

        let mut outcome = EnrichOutcome::default();
        for (key, result) in keys.iter().zip(futures::future::join_all(fetches).await) {
            match result {
                Ok(ticket) => outcome.tickets.push(ticket),
                Err(()) => outcome.failed_keys.push(key.clone()),
            }
        }

        tracing::info!(
            fetched = outcome.tickets.len(),
            failed = outcome.failed_keys.len(),
            "Issue enrichment complete"
        );
        outcome
    }
}
