//! Core domain types for chatvault
//!
//! These types represent the canonical data model shared by the ingestion
//! engine, the Parquet store, and the read path.
//!
//! ## Terminology
//!
//! | Term | Definition |
//! |------|------------|
//! | **Channel** | A chat workspace channel: user-supplied name plus platform ID |
//! | **ChatMessage** | One message; its ID is the platform's `<seconds>.<microseconds>` timestamp string |
//! | **Thread parent** | A message whose `thread_ts` equals its own ID and whose `reply_count > 0` |
//! | **Thread reply** | A message whose `thread_ts` is some other message's ID |
//! | **ChatUser** | A workspace member profile, cached for the process lifetime |
//! | **IssueTicket** | Issue-tracker metadata for a key like `ABC-123` mentioned in a message |
//! | **Partition** | One Parquet file addressed by `(entity, dt, channel?)` |
//!
//! Message IDs are opaque strings; within same-magnitude timestamps they
//! compare lexicographically in chronological order.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ============================================
// Channels
// ============================================

/// A chat channel targeted by ingestion.
///
/// `name` becomes the `channel=` partition segment; when a caller supplies
/// only an ID, the name is synthesized as `channel_<id>`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Channel {
    pub name: String,
    pub id: String,
}

impl Channel {
    /// Channel addressed by raw platform ID, with a synthesized alias.
    pub fn from_id(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: format!("channel_{}", id),
            id,
        }
    }
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name)
    }
}

// ============================================
// Users
// ============================================

/// A workspace member profile
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatUser {
    /// Platform user ID (primary key), e.g. `U02JRGK9TCG`
    pub id: String,
    pub name: Option<String>,
    pub real_name: Option<String>,
    pub display_name: Option<String>,
    pub email: Option<String>,
    #[serde(default)]
    pub is_bot: bool,
}

impl ChatUser {
    /// Name preferred for display: `real_name`, else `name`, else the ID.
    pub fn preferred_name(&self) -> &str {
        self.real_name
            .as_deref()
            .or(self.name.as_deref())
            .unwrap_or(&self.id)
    }
}

// ============================================
// Messages
// ============================================

/// An emoji reaction on a message
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Reaction {
    pub emoji: String,
    pub count: i64,
    #[serde(default)]
    pub users: Vec<String>,
}

/// A file attached to a message
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FileAttachment {
    pub id: String,
    pub name: Option<String>,
    pub mimetype: Option<String>,
    pub url: Option<String>,
    pub size: Option<i64>,
}

/// A chat message with all metadata, after ingestion-time conversion.
///
/// `issue_keys` is materialized from `text` at conversion time; `user_info`
/// is joined in from the user cache when the profile fetch succeeded.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    /// Platform timestamp string, unique within a channel
    pub message_id: String,
    /// Absent for some system messages
    pub user_id: Option<String>,
    pub text: String,
    /// Message instant, parsed from `message_id`
    pub timestamp: DateTime<Utc>,
    /// Present on thread parents (equal to `message_id`) and replies
    pub thread_ts: Option<String>,
    /// 0 unless this message is a thread parent
    #[serde(default)]
    pub reply_count: i64,
    #[serde(default)]
    pub reactions: Vec<Reaction>,
    #[serde(default)]
    pub files: Vec<FileAttachment>,
    /// Issue keys extracted from `text`, deduped, first-occurrence order
    #[serde(default)]
    pub issue_keys: Vec<String>,
    /// Joined user profile, when the fetch succeeded
    pub user_info: Option<ChatUser>,
}

impl ChatMessage {
    /// Whether this message is the start of a thread.
    pub fn is_thread_parent(&self) -> bool {
        self.thread_ts.as_deref() == Some(self.message_id.as_str()) && self.reply_count > 0
    }

    /// Whether this message is a reply inside some other message's thread.
    pub fn is_thread_reply(&self) -> bool {
        matches!(&self.thread_ts, Some(ts) if ts != &self.message_id)
    }

    /// UTC calendar date used as the `dt=` partition key.
    pub fn partition_date(&self) -> String {
        self.timestamp.format("%Y-%m-%d").to_string()
    }
}

// ============================================
// Issue tickets
// ============================================

/// A sprint an issue ticket is assigned to
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Sprint {
    pub name: String,
    pub state: String,
}

/// Issue-tracker metadata for one ticket key.
///
/// The dependency lists (`blocks`, `blocked_by`, ...) form a directed graph
/// that may contain cycles; they are stored as raw key arrays and never
/// resolved transitively here.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IssueTicket {
    /// Ticket key, e.g. `ABC-123`
    pub ticket_id: String,
    pub summary: String,
    pub status: String,
    pub priority: String,
    pub issue_type: String,
    pub assignee: String,

    // Delivery & timeline
    pub created: String,
    pub updated: String,
    pub due_date: Option<String>,
    pub story_points: Option<i64>,

    // Dependencies & links
    #[serde(default)]
    pub blocks: Vec<String>,
    #[serde(default)]
    pub blocked_by: Vec<String>,
    #[serde(default)]
    pub depends_on: Vec<String>,
    #[serde(default)]
    pub related: Vec<String>,

    // Components
    #[serde(default)]
    pub components: Vec<String>,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub fix_versions: Vec<String>,

    // Team & project
    pub project: Option<String>,
    pub team: Option<String>,
    pub epic_link: Option<String>,
    pub resolution: Option<String>,

    // Activity
    /// Comment count per author display name
    #[serde(default)]
    pub comments: BTreeMap<String, i64>,
    #[serde(default)]
    pub sprints: Vec<Sprint>,
}

impl IssueTicket {
    /// Total number of comments across all authors.
    pub fn total_comments(&self) -> i64 {
        self.comments.values().sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn message(id: &str, thread_ts: Option<&str>, reply_count: i64) -> ChatMessage {
        ChatMessage {
            message_id: id.to_string(),
            user_id: Some("U1".to_string()),
            text: String::new(),
            timestamp: Utc.with_ymd_and_hms(2025, 10, 15, 23, 59, 0).unwrap(),
            thread_ts: thread_ts.map(ToString::to_string),
            reply_count,
            reactions: vec![],
            files: vec![],
            issue_keys: vec![],
            user_info: None,
        }
    }

    #[test]
    fn test_channel_from_id() {
        let channel = Channel::from_id("C9876543210");
        assert_eq!(channel.name, "channel_C9876543210");
        assert_eq!(channel.id, "C9876543210");
    }

    #[test]
    fn test_thread_parent_requires_replies() {
        // Self-referencing thread_ts alone is not a parent
        assert!(!message("100.000100", Some("100.000100"), 0).is_thread_parent());
        assert!(message("100.000100", Some("100.000100"), 3).is_thread_parent());
        assert!(!message("100.000100", None, 3).is_thread_parent());
    }

    #[test]
    fn test_parent_and_reply_mutually_exclusive() {
        let parent = message("100.000100", Some("100.000100"), 2);
        let reply = message("101.000000", Some("100.000100"), 0);
        let standalone = message("102.000000", None, 0);

        assert!(parent.is_thread_parent() && !parent.is_thread_reply());
        assert!(!reply.is_thread_parent() && reply.is_thread_reply());
        assert!(!standalone.is_thread_parent() && !standalone.is_thread_reply());
    }

    #[test]
    fn test_partition_date_uses_message_timestamp() {
        let msg = message("100.000100", None, 0);
        assert_eq!(msg.partition_date(), "2025-10-15");
    }

    #[test]
    fn test_user_preferred_name_fallback() {
        let mut user = ChatUser {
            id: "U1".to_string(),
            name: Some("alice".to_string()),
            real_name: Some("Alice Chen".to_string()),
            display_name: None,
            email: None,
            is_bot: false,
        };
        assert_eq!(user.preferred_name(), "Alice Chen");

        user.real_name = None;
        assert_eq!(user.preferred_name(), "alice");

        user.name = None;
        assert_eq!(user.preferred_name(), "U1");
    }

    #[test]
    fn test_ticket_total_comments() {
        let mut comments = BTreeMap::new();
        comments.insert("Alice Chen".to_string(), 3);
        comments.insert("Bob Lee".to_string(), 2);

        let ticket = IssueTicket {
            ticket_id: "PRD-1".to_string(),
            summary: "Fix login".to_string(),
            status: "In Progress".to_string(),
            priority: "High".to_string(),
            issue_type: "Bug".to_string(),
            assignee: "Alice Chen".to_string(),
            created: "2025-10-01T00:00:00Z".to_string(),
            updated: "2025-10-02T00:00:00Z".to_string(),
            due_date: None,
            story_points: Some(5),
            blocks: vec![],
            blocked_by: vec![],
            depends_on: vec![],
            related: vec![],
            components: vec![],
            labels: vec![],
            fix_versions: vec![],
            project: Some("PRD".to_string()),
            team: None,
            epic_link: None,
            resolution: None,
            comments,
            sprints: vec![],
        };
        assert_eq!(ticket.total_comments(), 5);
    }
}
