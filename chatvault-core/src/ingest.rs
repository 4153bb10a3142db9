//! Cache-run coordinator
//!
//! Orchestrates one `cache` invocation end to end:
//!
//! ```text
//! ┌──────────┐    ┌────────────────┐    ┌───────────────┐
//! │ Channels │ ─► │ MessageFetcher │ ─► │ ParquetWriter │  (per dt partition)
//! └──────────┘    └────────────────┘    └───────────────┘
//!                        │ issue keys
//!                        ▼
//!          ┌────────────────────────┐    ┌───────────────┐
//!          │ EnrichmentCoordinator  │ ─► │ issue_tickets │  (optional phase)
//!          └────────────────────────┘    └───────────────┘
//! ```
//!
//! Messages are grouped by their own UTC date and written
//! partition-by-partition before enrichment starts; a failed or disabled
//! enrichment phase never affects message persistence. The user-cache
//! snapshot is flushed once at the end of the run.

use std::collections::HashSet;
use std::path::PathBuf;

use chrono::Utc;

use crate::client::ChatApi;
use crate::enrich::{EnrichmentCoordinator, HttpIssueClient, IssueApi};
use crate::error::Result;
use crate::fetcher::{FetchReport, MessageFetcher};
use crate::store::ParquetWriter;
use crate::types::{Channel, ChatMessage};
use crate::window::TimeWindow;

/// Options for one cache run.
#[derive(Debug, Clone)]
pub struct CacheOptions {
    /// Retrieval window passed to every channel fetch
    pub window: TimeWindow,
    /// Partition date for the issue-tickets write (normally today)
    pub ticket_date: String,
}

/// Counters and diagnostics from one cache run.
#[derive(Debug, Default)]
pub struct CacheRunResult {
    pub channels_processed: usize,
    pub channels_failed: usize,
    pub messages_cached: usize,
    pub partitions_written: usize,
    pub partition_paths: Vec<PathBuf>,
    pub users_cached: usize,
    pub tickets_cached: usize,
    pub tickets_failed: usize,
    /// Per-item degradations, each naming the affected entity
    pub warnings: Vec<String>,
    /// Fatal per-channel or per-partition failures (entity, error)
    pub errors: Vec<(String, String)>,
}

impl CacheRunResult {
    /// One-line per-phase summary for the end of a run.
    pub fn summary_line(&self) -> String {
        format!(
            "channels ok={} failed={} | messages={} partitions={} | users={} | tickets ok={} failed={} | warnings={}",
            self.channels_processed,
            self.channels_failed,
            self.messages_cached,
            self.partitions_written,
            self.users_cached,
            self.tickets_cached,
            self.tickets_failed,
            self.warnings.len(),
        )
    }
}

/// Coordinates fetch → partition-write → enrich → user-flush for a run.
pub struct CacheCoordinator<C, I> {
    fetcher: MessageFetcher<C>,
    writer: ParquetWriter,
    enricher: Option<EnrichmentCoordinator<I>>,
}

impl<C: ChatApi> CacheCoordinator<C, HttpIssueClient> {
    /// Coordinator without an enrichment phase.
    pub fn new(fetcher: MessageFetcher<C>, writer: ParquetWriter) -> Self {
        Self {
            fetcher,
            writer,
            enricher: None,
        }
    }
}

impl<C: ChatApi, I: IssueApi> CacheCoordinator<C, I> {
    /// Coordinator with ticket enrichment enabled.
    pub fn with_enrichment(
        fetcher: MessageFetcher<C>,
        writer: ParquetWriter,
        enricher: EnrichmentCoordinator<I>,
    ) -> Self {
        Self {
            fetcher,
            writer,
            enricher: Some(enricher),
        }
    }

    /// Run the full cache pipeline over `channels`.
    pub async fn run(&self, channels: &[Channel], options: &CacheOptions) -> Result<CacheRunResult> {
        self.run_with_progress(channels, options, |_, _, _| {}).await
    }

    /// Run with a progress callback receiving
    /// `(channel_index, channel_total, channel_name)` before each fetch.
    pub async fn run_with_progress<F>(
        &self,
        channels: &[Channel],
        options: &CacheOptions,
        mut on_channel: F,
    ) -> Result<CacheRunResult>
    where
        F: FnMut(usize, usize, &str),
    {
        let mut result = CacheRunResult::default();
        let mut issue_keys: Vec<String> = Vec::new();
        let mut seen_keys: HashSet<String> = HashSet::new();

        for (i, channel) in channels.iter().enumerate() {
            on_channel(i, channels.len(), &channel.name);

            let outcome = match self.fetcher.get_messages(channel, &options.window).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    result.channels_failed += 1;
                    result.errors.push((channel.name.clone(), e.to_string()));
                    tracing::error!(channel = %channel.name, error = %e, "Channel fetch failed");
                    continue;
                }
            };

            push_report_warnings(&mut result.warnings, &channel.name, &outcome.report);

            if self.enricher.is_some() {
                for message in &outcome.messages {
                    for key in &message.issue_keys {
                        if seen_keys.insert(key.clone()) {
                            issue_keys.push(key.clone());
                        }
                    }
                }
            }

            self.write_partitions(channel, outcome.messages, &mut result);
            result.channels_processed += 1;
        }

        if let Some(enricher) = &self.enricher {
            self.run_enrichment(enricher, &issue_keys, options, &mut result).await;
        }

        self.flush_users(&mut result);

        tracing::info!(summary = %result.summary_line(), "Cache run complete");
        Ok(result)
    }

    /// Group a channel's messages by their own UTC date and write each
    /// partition. A partition write failure is fatal to that partition
    /// only; the remaining partitions are still attempted.
    fn write_partitions(
        &self,
        channel: &Channel,
        messages: Vec<ChatMessage>,
        result: &mut CacheRunResult,
    ) {
        let mut by_date: std::collections::BTreeMap<String, Vec<ChatMessage>> =
            std::collections::BTreeMap::new();
        for message in messages {
            by_date.entry(message.partition_date()).or_default().push(message);
        }

        for (date, partition) in by_date {
            let count = partition.len();
            match self.writer.save_messages(channel, &date, &partition) {
                Ok(Some(path)) => {
                    result.partitions_written += 1;
                    result.messages_cached += count;
                    result.partition_paths.push(path);
                }
                Ok(None) => {}
                Err(e) => {
                    let entity = format!("{}/dt={}", channel.name, date);
                    tracing::error!(partition = %entity, error = %e, "Partition write failed");
                    result.errors.push((entity, e.to_string()));
                }
            }
        }
    }

    async fn run_enrichment(
        &self,
        enricher: &EnrichmentCoordinator<I>,
        keys: &[String],
        options: &CacheOptions,
        result: &mut CacheRunResult,
    ) {
        if keys.is_empty() {
            tracing::info!("No issue keys found in cached messages");
            return;
        }

        let outcome = enricher.fetch_tickets(keys).await;
        result.tickets_failed = outcome.failed_keys.len();
        for key in &outcome.failed_keys {
            result.warnings.push(format!("ticket={key}: fetch failed"));
        }

        match self
            .writer
            .save_issue_tickets(&options.ticket_date, &outcome.tickets, Utc::now())
        {
            Ok(Some(_)) => result.tickets_cached = outcome.tickets.len(),
            Ok(None) => {}
            Err(e) => {
                tracing::error!(error = %e, "Issue ticket write failed");
                result
                    .errors
                    .push((format!("issue_tickets/dt={}", options.ticket_date), e.to_string()));
            }
        }
    }

    fn flush_users(&self, result: &mut CacheRunResult) {
        let users: Vec<_> = self
            .fetcher
            .user_cache()
            .snapshot()
            .into_values()
            .collect();
        match self.writer.save_users(&users, Utc::now()) {
            Ok(Some(_)) => result.users_cached = users.len(),
            Ok(None) => {}
            Err(e) => {
                tracing::error!(error = %e, "User cache write failed");
                result.errors.push(("users.parquet".to_string(), e.to_string()));
            }
        }
    }
}

fn push_report_warnings(warnings: &mut Vec<String>, channel: &str, report: &FetchReport) {
    if report.user_warnings > 0 {
        warnings.push(format!(
            "channel={channel}: {} user profile fetches failed",
            report.user_warnings
        ));
    }
    if report.thread_warnings > 0 {
        warnings.push(format!(
            "channel={channel}: {} thread reply fetches failed",
            report.thread_warnings
        ));
    }
    if report.dropped_rows > 0 {
        warnings.push(format!(
            "channel={channel}: {} rows dropped (bad timestamp or duplicate id)",
            report.dropped_rows
        ));
    }
}
