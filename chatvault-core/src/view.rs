//! Text view formatter for reconstructed threads
//!
//! Renders the read path's nested rows into a text block consumed by humans
//! and by downstream LLM summarization. Markers are fixed glyphs and stay
//! stable across runs so successive views diff cleanly; the only variable
//! content is the dataset itself. Timestamps render as absolute UTC for the
//! same reason.

use crate::mentions::resolve_mentions;
use crate::store::{MessageRow, UserRecord};
use chrono::DateTime;
use std::collections::HashMap;

const HEADER_RULE: &str =
    "================================================================================";
const MESSAGE_RULE: &str = "------------------------------------------------------------";

/// Context describing what a view covers, for its header.
#[derive(Debug, Clone, Default)]
pub struct ViewContext {
    /// Channel alias, or a combined label for multi-channel views
    pub channel_name: String,
    /// `"2025-10-20"` or `"2025-10-18 to 2025-10-20"`
    pub date_range: Option<String>,
    /// Channel aliases for multi-channel views (overrides `channel_name`
    /// in the header when non-empty)
    pub channels: Vec<String>,
}

/// Formats reconstructed messages into the canonical text view.
pub struct MessageViewFormatter {
    resolve_mentions: bool,
}

impl Default for MessageViewFormatter {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageViewFormatter {
    pub fn new() -> Self {
        Self {
            resolve_mentions: true,
        }
    }

    /// Disable `<@U…>` rewriting (raw platform text passes through).
    pub fn without_mention_resolution(mut self) -> Self {
        self.resolve_mentions = false;
        self
    }

    /// Render `messages` (top-levels with nested replies) to text.
    ///
    /// `cached_users` seeds the mention map for authors outside the view;
    /// the view's own rows overlay it since they carry fresher profile data.
    pub fn format(
        &self,
        messages: &[MessageRow],
        context: &ViewContext,
        cached_users: Option<&HashMap<String, UserRecord>>,
    ) -> String {
        if messages.is_empty() {
            return self.format_empty(context);
        }

        let user_map = if self.resolve_mentions {
            build_user_map(messages, cached_users)
        } else {
            HashMap::new()
        };

        let mut lines: Vec<String> = Vec::new();
        lines.extend(self.header(context));
        lines.push(String::new());

        let mut message_count = 0usize;
        let mut thread_count = 0usize;
        let mut total_replies = 0usize;

        for message in messages {
            message_count += 1;
            self.push_message(&mut lines, message, message_count, &user_map);

            if !message.replies.is_empty() {
                thread_count += 1;
                total_replies += message.replies.len();

                let expected = message.reply_count as usize;
                let shown = message.replies.len();
                lines.push(String::new());
                if message.has_clipped_replies && expected > shown {
                    lines.push(format!(
                        "  🧵 THREAD REPLIES (showing {shown} of {expected}+ replies):"
                    ));
                } else {
                    lines.push("  🧵 THREAD REPLIES:".to_string());
                }

                for (i, reply) in message.replies.iter().enumerate() {
                    self.push_reply(&mut lines, reply, i + 1, &user_map);
                }

                if message.has_clipped_replies && expected > shown {
                    lines.push(String::new());
                    lines.push(
                        "  💡 Thread may have additional replies outside this time range"
                            .to_string(),
                    );
                }
            } else if message.is_orphaned_reply {
                lines.push("  🔗 Thread clipped (parent message outside time window)".to_string());
                lines.push("  💡 Widen date range to see full thread".to_string());
            }

            lines.push(String::new());
            lines.push(MESSAGE_RULE.to_string());
            lines.push(String::new());
        }

        lines.push("📊 CONVERSATION SUMMARY:".to_string());
        lines.push(format!("   • Total Messages: {message_count}"));
        lines.push(format!("   • Total Thread Replies: {total_replies}"));
        lines.push(format!("   • Active Threads: {thread_count}"));

        lines.join("\n")
    }

    fn header(&self, context: &ViewContext) -> Vec<String> {
        let mut lines = vec![HEADER_RULE.to_string()];
        if context.channels.is_empty() {
            lines.push(format!("📱 SLACK CHANNEL: {}", context.channel_name));
        } else {
            lines.push(format!("📱 SLACK CHANNELS: {}", context.channels.join(", ")));
        }
        if let Some(range) = &context.date_range {
            lines.push(format!("⏰ TIME WINDOW: {range}"));
        }
        lines.push(HEADER_RULE.to_string());
        lines
    }

    fn format_empty(&self, context: &ViewContext) -> String {
        let mut lines = self.header(context);
        lines.push(String::new());
        lines.push("No messages found in the specified time window.".to_string());
        lines.push(String::new());
        lines.push(HEADER_RULE.to_string());
        lines.join("\n")
    }

    fn push_message(
        &self,
        lines: &mut Vec<String>,
        message: &MessageRow,
        number: usize,
        user_map: &HashMap<String, String>,
    ) {
        let clipped_indicator = if message.is_clipped_thread || message.is_orphaned_reply {
            " (🔗 Thread clipped)"
        } else {
            ""
        };
        lines.push(format!("💬 MESSAGE #{number}{clipped_indicator}"));

        lines.push(format!(
            "👤 {} at {}:",
            message.author_label(),
            format_timestamp(&message.timestamp)
        ));
        lines.push(format!("   {}", self.render_text(&message.text, user_map)));

        if !message.reactions.is_empty() {
            lines.push(format!("   😊 Reactions: {}", reactions_line(message)));
        }
        if !message.files.is_empty() {
            let names: Vec<String> = message
                .files
                .iter()
                .map(|f| {
                    let name = f.name.as_deref().unwrap_or("unknown");
                    match f.mimetype.as_deref() {
                        Some(mimetype) => format!("{name} ({mimetype})"),
                        None => name.to_string(),
                    }
                })
                .collect();
            lines.push(format!("   📎 Files: {}", names.join(", ")));
        }
        if !message.issue_keys.is_empty() {
            lines.push(format!("   🎫 JIRA: {}", message.issue_keys.join(", ")));
        }
    }

    fn push_reply(
        &self,
        lines: &mut Vec<String>,
        reply: &MessageRow,
        number: usize,
        user_map: &HashMap<String, String>,
    ) {
        lines.push(format!(
            "    ↳ REPLY #{number}: {} at {}:",
            reply.author_label(),
            format_timestamp(&reply.timestamp)
        ));
        lines.push(format!("       {}", self.render_text(&reply.text, user_map)));

        if !reply.reactions.is_empty() {
            lines.push(format!("       😊 Reactions: {}", reactions_line(reply)));
        }
        if !reply.files.is_empty() {
            let names: Vec<&str> = reply
                .files
                .iter()
                .map(|f| f.name.as_deref().unwrap_or("unknown"))
                .collect();
            lines.push(format!("       📎 Files: {}", names.join(", ")));
        }
    }

    fn render_text(&self, text: &str, user_map: &HashMap<String, String>) -> String {
        if self.resolve_mentions {
            resolve_mentions(text, user_map)
        } else {
            text.to_string()
        }
    }
}

/// `user_id → display name` over cached users, overlaid by the view's own
/// rows (message authors carry fresher data).
fn build_user_map(
    messages: &[MessageRow],
    cached_users: Option<&HashMap<String, UserRecord>>,
) -> HashMap<String, String> {
    let mut map = HashMap::new();

    if let Some(cached) = cached_users {
        for (user_id, record) in cached {
            map.insert(user_id.clone(), record.preferred_name().to_string());
        }
    }

    fn visit(row: &MessageRow, map: &mut HashMap<String, String>) {
        if let Some(user_id) = &row.user_id {
            let label = row
                .user_real_name
                .as_deref()
                .or(row.user_name.as_deref())
                .unwrap_or(user_id);
            map.insert(user_id.clone(), label.to_string());
        }
        for reply in &row.replies {
            visit(reply, map);
        }
    }

    for message in messages {
        visit(message, &mut map);
    }
    map
}

fn reactions_line(row: &MessageRow) -> String {
    row.reactions
        .iter()
        .map(|r| format!("{}({})", r.emoji, r.count))
        .collect::<Vec<_>>()
        .join(", ")
}

/// `2025-10-20T10:00:00.000000Z` → `2025-10-20 10:00`; malformed values
/// are truncated rather than dropped.
fn format_timestamp(timestamp: &str) -> String {
    match DateTime::parse_from_rfc3339(timestamp) {
        Ok(dt) => dt.format("%Y-%m-%d %H:%M").to_string(),
        Err(_) if timestamp.len() >= 16 => timestamp[..16].to_string(),
        Err(_) => timestamp.to_string(),
    }
}
