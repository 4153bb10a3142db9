//! Partitioned Parquet storage layer
//!
//! On-disk layout, rooted at the cache directory:
//!
//! ```text
//! <root>/
//!   messages/dt=YYYY-MM-DD/channel=<alias>/data.parquet
//!   users.parquet
//!   issue_tickets/dt=YYYY-MM-DD/data.parquet
//! ```
//!
//! A partition is a single file; writers overwrite atomically
//! (write-to-temp + rename). Partitioning by `dt` uses the message's own
//! UTC calendar date, never ingestion time.

pub mod reader;
pub mod schema;
pub mod writer;

pub use reader::{PartitionInfo, PartitionReader, PartitionStat, UserRecord};
pub use writer::ParquetWriter;

use crate::types::{ChatMessage, FileAttachment, Reaction};
use chrono::SecondsFormat;

/// A message in its flat persisted form: the scalar/list columns of the
/// Parquet schema plus the nested `reactions`/`files` columns.
///
/// The trailing fields (`channel_name`, `replies`, and the clipping flags)
/// exist only on the read path: the reader tags multi-channel rows, and the
/// thread reconstructor nests replies and marks orphaned or clipped
/// threads. They are never persisted.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MessageRow {
    pub message_id: String,
    pub user_id: Option<String>,
    pub text: String,
    /// RFC-3339 UTC with fixed microsecond precision, so the string order
    /// is the chronological order
    pub timestamp: String,
    pub thread_ts: Option<String>,
    pub is_thread_parent: bool,
    pub is_thread_reply: bool,
    pub reply_count: i64,
    pub user_name: Option<String>,
    pub user_real_name: Option<String>,
    pub user_email: Option<String>,
    pub user_is_bot: Option<bool>,
    pub issue_keys: Vec<String>,
    pub has_reactions: bool,
    pub has_files: bool,
    /// Reserved; always false in current writers
    pub has_thread: bool,
    pub reactions: Vec<Reaction>,
    pub files: Vec<FileAttachment>,

    // Read-path only, never persisted
    pub channel_name: Option<String>,
    pub replies: Vec<MessageRow>,
    pub is_orphaned_reply: bool,
    pub is_clipped_thread: bool,
    pub has_clipped_replies: bool,
}

impl MessageRow {
    /// Flatten a fetched message into its persisted form.
    pub fn from_message(message: &ChatMessage) -> Self {
        let user = message.user_info.as_ref();
        Self {
            message_id: message.message_id.clone(),
            user_id: message.user_id.clone(),
            text: message.text.clone(),
            timestamp: message
                .timestamp
                .to_rfc3339_opts(SecondsFormat::Micros, true),
            thread_ts: message.thread_ts.clone(),
            is_thread_parent: message.is_thread_parent(),
            is_thread_reply: message.is_thread_reply(),
            reply_count: message.reply_count,
            user_name: user.and_then(|u| u.name.clone()),
            user_real_name: user.and_then(|u| u.real_name.clone()),
            user_email: user.and_then(|u| u.email.clone()),
            user_is_bot: user.map(|u| u.is_bot),
            issue_keys: message.issue_keys.clone(),
            has_reactions: !message.reactions.is_empty(),
            has_files: !message.files.is_empty(),
            has_thread: false,
            reactions: message.reactions.clone(),
            files: message.files.clone(),
            channel_name: None,
            replies: vec![],
            is_orphaned_reply: false,
            is_clipped_thread: false,
            has_clipped_replies: false,
        }
    }

    /// Display name for this row's author: real name, else handle, else
    /// the bare id, else a fixed placeholder.
    pub fn author_label(&self) -> &str {
        self.user_real_name
            .as_deref()
            .or(self.user_name.as_deref())
            .or(self.user_id.as_deref())
            .unwrap_or("Unknown User")
    }
}
