//! Message fetcher: paginated history plus thread expansion
//!
//! One `get_messages` call produces everything a partition write needs for a
//! channel/window pair:
//!
//! 1. Page `conversations.history` until the cursor is exhausted
//! 2. Hydrate distinct authors through the single-flight user cache
//! 3. Fan-out `conversations.replies` for every thread parent in the page set
//! 4. Convert raw rows into [`ChatMessage`] values with issue keys extracted
//!
//! The result is unsorted; ordering is established by the reader. Replies
//! outside the window are kept intentionally (thread expansion is unbounded
//! by the window). History failures are fatal to the call; per-thread and
//! per-user failures degrade to warnings.

use std::collections::HashSet;
use std::sync::Arc;

use crate::cache::UserCache;
use crate::client::{ChatApi, RawMessage};
use crate::error::Result;
use crate::mentions::extract_issue_keys;
use crate::types::{Channel, ChatMessage, FileAttachment, Reaction};
use crate::window::{parse_platform_ts, TimeWindow};

/// Counters describing one fetch, for the run summary.
#[derive(Debug, Default, Clone)]
pub struct FetchReport {
    /// Rows from the channel timeline
    pub timeline_count: usize,
    /// Rows pulled in by thread expansion
    pub thread_reply_count: usize,
    /// Distinct users whose profile fetch failed (messages keep the bare id)
    pub user_warnings: usize,
    /// Threads whose reply fetch failed (the parent row remains)
    pub thread_warnings: usize,
    /// Rows dropped for an unparseable or duplicate message id
    pub dropped_rows: usize,
}

/// Messages plus the warning counters for one channel/window fetch.
#[derive(Debug)]
pub struct FetchOutcome {
    pub messages: Vec<ChatMessage>,
    pub report: FetchReport,
}

/// Fetches a channel's messages through a rate-limited [`ChatApi`].
pub struct MessageFetcher<C> {
    client: Arc<C>,
    users: Arc<UserCache>,
}

impl<C: ChatApi> MessageFetcher<C> {
    pub fn new(client: Arc<C>, users: Arc<UserCache>) -> Self {
        Self { client, users }
    }

    /// The user cache shared with other fetchers in this run.
    pub fn user_cache(&self) -> &Arc<UserCache> {
        &self.users
    }

    /// Fetch the channel's timeline for `window`, expanded with full thread
    /// replies for every parent found.
    pub async fn get_messages(
        &self,
        channel: &Channel,
        window: &TimeWindow,
    ) -> Result<FetchOutcome> {
        let mut report = FetchReport::default();

        let timeline = self.page_history(channel, window).await?;
        report.timeline_count = timeline.len();

        self.hydrate_users(&timeline, &mut report).await;

        let parents: Vec<String> = timeline
            .iter()
            .filter(|raw| is_raw_parent(raw))
            .map(|raw| raw.ts.clone())
            .collect();

        let replies = self.expand_threads(channel, &parents, &mut report).await;
        report.thread_reply_count = replies.len();

        self.hydrate_users(&replies, &mut report).await;

        tracing::debug!(
            channel = %channel.name,
            timeline = report.timeline_count,
            thread_replies = report.thread_reply_count,
            "Fetched channel window"
        );

        // Timeline rows convert first so a timeline/thread id collision
        // resolves to the timeline row.
        let mut seen = HashSet::new();
        let mut messages = Vec::with_capacity(timeline.len() + replies.len());
        for raw in timeline.into_iter().chain(replies) {
            match self.convert(raw, &mut seen) {
                Some(message) => messages.push(message),
                None => report.dropped_rows += 1,
            }
        }

        Ok(FetchOutcome { messages, report })
    }

    /// Page the channel history until the cursor is exhausted. Any page
    /// error is fatal to the whole call.
    async fn page_history(
        &self,
        channel: &Channel,
        window: &TimeWindow,
    ) -> Result<Vec<RawMessage>> {
        let oldest = window.oldest_ts();
        let latest = window.latest_ts();
        let mut rows = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let page = self
                .client
                .history(&channel.id, &oldest, &latest, cursor.as_deref())
                .await?;
            rows.extend(page.messages);
            match page.next_cursor {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }

        Ok(rows)
    }

    /// Resolve every distinct author in `rows` through the user cache.
    /// Failures are warnings; the affected messages keep their bare ids.
    async fn hydrate_users(&self, rows: &[RawMessage], report: &mut FetchReport) {
        let mut ids: Vec<&str> = Vec::new();
        let mut seen = HashSet::new();
        for raw in rows {
            if let Some(user) = raw.user.as_deref() {
                if seen.insert(user) {
                    ids.push(user);
                }
            }
        }

        let lookups = ids.iter().map(|id| {
            let client = Arc::clone(&self.client);
            let users = Arc::clone(&self.users);
            async move { users.get_or_fetch(client.as_ref(), id).await }
        });

        for result in futures::future::join_all(lookups).await {
            if result.is_err() {
                report.user_warnings += 1;
            }
        }
    }

    /// Fan-out reply fetches for every thread parent. Per-thread failures
    /// are warnings; that thread's replies are omitted.
    async fn expand_threads(
        &self,
        channel: &Channel,
        parents: &[String],
        report: &mut FetchReport,
    ) -> Vec<RawMessage> {
        if parents.is_empty() {
            return Vec::new();
        }

        tracing::info!(
            channel = %channel.name,
            threads = parents.len(),
            "Expanding thread replies"
        );

        let fetches = parents.iter().map(|thread_ts| {
            let client = Arc::clone(&self.client);
            let channel_id = channel.id.clone();
            async move { Self::page_replies(client.as_ref(), &channel_id, thread_ts).await }
        });

        let mut replies = Vec::new();
        for (thread_ts, result) in parents.iter().zip(futures::future::join_all(fetches).await) {
            match result {
                Ok(rows) => replies.extend(rows),
                Err(e) => {
                    report.thread_warnings += 1;
                    tracing::warn!(
                        channel = %channel.name,
                        thread = %thread_ts,
                        error = %e,
                        "Thread reply fetch failed"
                    );
                }
            }
        }
        replies
    }

    /// Page one thread's replies. The first row of the first page is the
    /// parent again and is dropped.
    async fn page_replies(client: &C, channel_id: &str, thread_ts: &str) -> Result<Vec<RawMessage>> {
        let mut rows = Vec::new();
        let mut cursor: Option<String> = None;
        let mut first_page = true;

        loop {
            let page = client.replies(channel_id, thread_ts, cursor.as_deref()).await?;
            let mut messages = page.messages;
            if first_page && !messages.is_empty() {
                messages.remove(0);
                first_page = false;
            }
            rows.extend(messages);
            match page.next_cursor {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }

        Ok(rows)
    }

    /// Convert one raw row, attaching cached user info and extracted issue
    /// keys. Returns None for unparseable timestamps and duplicate ids.
    fn convert(&self, raw: RawMessage, seen: &mut HashSet<String>) -> Option<ChatMessage> {
        let Some(timestamp) = parse_platform_ts(&raw.ts) else {
            tracing::warn!(ts = %raw.ts, "Dropping message with unparseable timestamp");
            return None;
        };
        if !seen.insert(raw.ts.clone()) {
            return None;
        }

        let user_info = raw.user.as_deref().and_then(|id| self.users.get(id));
        let issue_keys = extract_issue_keys(&raw.text);

        Some(ChatMessage {
            message_id: raw.ts,
            user_id: raw.user,
            text: raw.text,
            timestamp,
            thread_ts: raw.thread_ts,
            reply_count: raw.reply_count,
            reactions: raw
                .reactions
                .into_iter()
                .map(|r| Reaction {
                    emoji: r.name,
                    count: r.count,
                    users: r.users,
                })
                .collect(),
            files: raw
                .files
                .into_iter()
                .map(|f| FileAttachment {
                    id: f.id,
                    name: f.name,
                    mimetype: f.mimetype,
                    url: f.url_private,
                    size: f.size,
                })
                .collect(),
            issue_keys,
            user_info,
        })
    }
}

/// Thread parent detection on the raw row: `thread_ts == ts` and replies
/// exist.
fn is_raw_parent(raw: &RawMessage) -> bool {
    raw.thread_ts.as_deref() == Some(raw.ts.as_str()) && raw.reply_count > 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::Page;
    use crate::error::Error;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    fn raw(ts: &str, user: Option<&str>, text: &str) -> RawMessage {
        RawMessage {
            ts: ts.to_string(),
            user: user.map(ToString::to_string),
            text: text.to_string(),
            ..Default::default()
        }
    }

    fn raw_parent(ts: &str, user: Option<&str>, text: &str, reply_count: i64) -> RawMessage {
        RawMessage {
            thread_ts: Some(ts.to_string()),
            reply_count,
            ..raw(ts, user, text)
        }
    }

    fn raw_reply(ts: &str, thread_ts: &str, user: Option<&str>) -> RawMessage {
        RawMessage {
            thread_ts: Some(thread_ts.to_string()),
            ..raw(ts, user, "reply")
        }
    }

    /// Scripted platform: canned history pages and per-thread reply sets.
    #[derive(Default)]
    struct FakePlatform {
        history_pages: Mutex<Vec<Page>>,
        threads: HashMap<String, Vec<RawMessage>>,
        failing_threads: Vec<String>,
        failing_users: Vec<String>,
        history_calls: AtomicUsize,
    }

    impl ChatApi for FakePlatform {
        async fn history(&self, _: &str, _: &str, _: &str, _: Option<&str>) -> Result<Page> {
            self.history_calls.fetch_add(1, Ordering::SeqCst);
            let mut pages = self.history_pages.lock().unwrap();
            if pages.is_empty() {
                return Ok(Page::default());
            }
            Ok(pages.remove(0))
        }

        async fn replies(&self, _: &str, thread_ts: &str, _: Option<&str>) -> Result<Page> {
            if self.failing_threads.iter().any(|t| t == thread_ts) {
                return Err(Error::Retryable {
                    message: "HTTP 500".to_string(),
                    retry_after: None,
                });
            }
            // The platform returns the parent as the first reply row
            let mut messages = vec![raw_parent(thread_ts, Some("U1"), "parent", 1)];
            messages.extend(self.threads.get(thread_ts).cloned().unwrap_or_default());
            Ok(Page {
                messages,
                next_cursor: None,
            })
        }

        async fn user(&self, user_id: &str) -> Result<ChatUser> {
            if self.failing_users.iter().any(|u| u == user_id) {
                return Err(Error::NotFound(format!("user {}", user_id)));
            }
            Ok(ChatUser {
                id: user_id.to_string(),
                name: Some(user_id.to_lowercase()),
                real_name: Some(format!("Real {}", user_id)),
                display_name: None,
                email: None,
                is_bot: false,
            })
        }
    }

    use crate::types::ChatUser;

    fn fetcher(platform: FakePlatform) -> MessageFetcher<FakePlatform> {
        MessageFetcher::new(Arc::new(platform), Arc::new(UserCache::new()))
    }

    fn window() -> TimeWindow {
        TimeWindow::ending_at(
            1,
            0,
            chrono::DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
        )
    }

    #[tokio::test]
    async fn test_paginates_until_cursor_exhausted() {
        let platform = FakePlatform {
            history_pages: Mutex::new(vec![
                Page {
                    messages: vec![raw("100.000001", Some("U1"), "one")],
                    next_cursor: Some("c1".to_string()),
                },
                Page {
                    messages: vec![raw("101.000001", Some("U1"), "two")],
                    next_cursor: None,
                },
            ]),
            ..Default::default()
        };

        let fetcher = fetcher(platform);
        let outcome = fetcher
            .get_messages(&Channel::from_id("C1"), &window())
            .await
            .unwrap();

        assert_eq!(outcome.messages.len(), 2);
        assert_eq!(outcome.report.timeline_count, 2);
        assert_eq!(fetcher.client.history_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_thread_expansion_drops_parent_duplicate() {
        let mut threads = HashMap::new();
        threads.insert(
            "100.000001".to_string(),
            vec![
                raw_reply("101.000001", "100.000001", Some("U2")),
                raw_reply("102.000001", "100.000001", Some("U2")),
            ],
        );
        let platform = FakePlatform {
            history_pages: Mutex::new(vec![Page {
                messages: vec![raw_parent("100.000001", Some("U1"), "parent", 2)],
                next_cursor: None,
            }]),
            threads,
            ..Default::default()
        };

        let outcome = fetcher(platform)
            .get_messages(&Channel::from_id("C1"), &window())
            .await
            .unwrap();

        // Parent once (from the timeline) plus two replies
        assert_eq!(outcome.messages.len(), 3);
        assert_eq!(outcome.report.thread_reply_count, 2);
        let parents: Vec<_> = outcome
            .messages
            .iter()
            .filter(|m| m.is_thread_parent())
            .collect();
        assert_eq!(parents.len(), 1);
    }

    #[tokio::test]
    async fn test_thread_failure_is_isolated() {
        let mut threads = HashMap::new();
        threads.insert(
            "200.000001".to_string(),
            vec![raw_reply("201.000001", "200.000001", Some("U2"))],
        );
        let platform = FakePlatform {
            history_pages: Mutex::new(vec![Page {
                messages: vec![
                    raw_parent("100.000001", Some("U1"), "broken thread", 2),
                    raw_parent("200.000001", Some("U1"), "good thread", 1),
                ],
                next_cursor: None,
            }]),
            threads,
            failing_threads: vec!["100.000001".to_string()],
            ..Default::default()
        };

        let outcome = fetcher(platform)
            .get_messages(&Channel::from_id("C1"), &window())
            .await
            .unwrap();

        // Both parents remain; only the good thread's reply came through
        assert_eq!(outcome.messages.len(), 3);
        assert_eq!(outcome.report.thread_warnings, 1);
        assert_eq!(outcome.report.thread_reply_count, 1);
    }

    #[tokio::test]
    async fn test_user_failure_keeps_bare_id() {
        let platform = FakePlatform {
            history_pages: Mutex::new(vec![Page {
                messages: vec![
                    raw("100.000001", Some("UGONE"), "hello"),
                    raw("101.000001", Some("U1"), "world"),
                ],
                next_cursor: None,
            }]),
            failing_users: vec!["UGONE".to_string()],
            ..Default::default()
        };

        let outcome = fetcher(platform)
            .get_messages(&Channel::from_id("C1"), &window())
            .await
            .unwrap();

        assert_eq!(outcome.report.user_warnings, 1);
        let bare = outcome
            .messages
            .iter()
            .find(|m| m.user_id.as_deref() == Some("UGONE"))
            .unwrap();
        assert!(bare.user_info.is_none());
        let hydrated = outcome
            .messages
            .iter()
            .find(|m| m.user_id.as_deref() == Some("U1"))
            .unwrap();
        assert_eq!(hydrated.user_info.as_ref().unwrap().preferred_name(), "Real U1");
    }

    #[tokio::test]
    async fn test_history_error_is_fatal() {
        struct FailingHistory;
        impl ChatApi for FailingHistory {
            async fn history(&self, _: &str, _: &str, _: &str, _: Option<&str>) -> Result<Page> {
                Err(Error::Auth("conversations.history: HTTP 403".to_string()))
            }
            async fn replies(&self, _: &str, _: &str, _: Option<&str>) -> Result<Page> {
                Ok(Page::default())
            }
            async fn user(&self, _: &str) -> Result<ChatUser> {
                unreachable!()
            }
        }

        let fetcher = MessageFetcher::new(Arc::new(FailingHistory), Arc::new(UserCache::new()));
        let result = fetcher.get_messages(&Channel::from_id("C1"), &window()).await;
        assert!(matches!(result, Err(Error::Auth(_))));
    }

    #[tokio::test]
    async fn test_duplicate_ids_resolve_to_timeline_row() {
        // The reply set echoes a timeline row id; the timeline row wins
        let mut threads = HashMap::new();
        threads.insert(
            "100.000001".to_string(),
            vec![RawMessage {
                thread_ts: Some("100.000001".to_string()),
                ..raw("103.000001", Some("U2"), "thread copy")
            }],
        );
        let platform = FakePlatform {
            history_pages: Mutex::new(vec![Page {
                messages: vec![
                    raw_parent("100.000001", Some("U1"), "parent", 1),
                    raw("103.000001", Some("U1"), "timeline copy"),
                ],
                next_cursor: None,
            }]),
            threads,
            ..Default::default()
        };

        let outcome = fetcher(platform)
            .get_messages(&Channel::from_id("C1"), &window())
            .await
            .unwrap();

        let row = outcome
            .messages
            .iter()
            .find(|m| m.message_id == "103.000001")
            .unwrap();
        assert_eq!(row.text, "timeline copy");
        assert_eq!(outcome.report.dropped_rows, 1);
    }

    #[tokio::test]
    async fn test_issue_keys_extracted_on_conversion() {
        let platform = FakePlatform {
            history_pages: Mutex::new(vec![Page {
                messages: vec![raw(
                    "100.000001",
                    Some("U1"),
                    "Fixed PRD-16975 and PRD-16975 and FOO-1",
                )],
                next_cursor: None,
            }]),
            ..Default::default()
        };

        let outcome = fetcher(platform)
            .get_messages(&Channel::from_id("C1"), &window())
            .await
            .unwrap();

        assert_eq!(outcome.messages[0].issue_keys, vec!["PRD-16975", "FOO-1"]);
    }
}
