//! Arrow-backed Parquet writer
//!
//! One call, one partition file. Writes go to a temp file in the partition
//! directory and are renamed into place, so readers never observe a torn
//! file and re-running a cache overwrites cleanly.

use std::collections::HashSet;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use arrow::array::{
    ArrayBuilder, ArrayRef, BooleanArray, Int64Array, Int64Builder, ListBuilder, MapBuilder,
    RecordBatch, StringArray, StringBuilder, StructBuilder,
};
use arrow::datatypes::Schema;
use chrono::{DateTime, SecondsFormat, Utc};
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;

use crate::error::{Error, Result};
use crate::types::{Channel, ChatMessage, ChatUser, IssueTicket};
use crate::window::is_valid_date;

use super::schema::{file_fields, messages_schema, reaction_fields, sprint_fields, tickets_schema, users_schema};
use super::MessageRow;

/// Writes dataset partitions under a root cache directory.
pub struct ParquetWriter {
    root: PathBuf,
}

impl ParquetWriter {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Write one `(dt, channel)` messages partition.
    ///
    /// Rows are deduped by `message_id` (first occurrence wins, so a
    /// timeline row beats a thread echo) and sorted by
    /// `(timestamp, message_id)` for deterministic files. Empty input
    /// writes nothing and returns `Ok(None)`.
    pub fn save_messages(
        &self,
        channel: &Channel,
        date: &str,
        messages: &[ChatMessage],
    ) -> Result<Option<PathBuf>> {
        if !is_valid_date(date) {
            return Err(Error::Config(format!(
                "invalid partition date: {date} (expected YYYY-MM-DD)"
            )));
        }
        if messages.is_empty() {
            return Ok(None);
        }

        let mut seen = HashSet::new();
        let mut rows: Vec<MessageRow> = Vec::with_capacity(messages.len());
        for message in messages {
            if message.message_id.is_empty() {
                return Err(Error::Schema("message with empty message_id".to_string()));
            }
            if seen.insert(message.message_id.as_str()) {
                rows.push(MessageRow::from_message(message));
            }
        }
        rows.sort_by(|a, b| {
            (a.timestamp.as_str(), a.message_id.as_str())
                .cmp(&(b.timestamp.as_str(), b.message_id.as_str()))
        });

        let schema = messages_schema();
        let batch = messages_batch(schema.clone(), &rows)?;

        let path = self
            .root
            .join("messages")
            .join(format!("dt={date}"))
            .join(format!("channel={}", channel.name))
            .join("data.parquet");
        self.write_atomic(&path, schema, &batch)?;

        tracing::debug!(
            path = %path.display(),
            rows = rows.len(),
            "Wrote messages partition"
        );
        Ok(Some(path))
    }

    /// Write the workspace-wide user cache to `<root>/users.parquet`.
    ///
    /// `cached_at` is stamped uniformly on every row of the batch.
    pub fn save_users(
        &self,
        users: &[ChatUser],
        cached_at: DateTime<Utc>,
    ) -> Result<Option<PathBuf>> {
        if users.is_empty() {
            return Ok(None);
        }

        let mut rows: Vec<&ChatUser> = users.iter().collect();
        rows.sort_by(|a, b| a.id.cmp(&b.id));
        for user in &rows {
            if user.id.is_empty() {
                return Err(Error::Schema("user with empty user_id".to_string()));
            }
        }

        let stamp = cached_at.to_rfc3339_opts(SecondsFormat::Secs, true);
        let schema = users_schema();
        let columns: Vec<ArrayRef> = vec![
            Arc::new(StringArray::from(
                rows.iter().map(|u| Some(u.id.as_str())).collect::<Vec<_>>(),
            )),
            Arc::new(StringArray::from(
                rows.iter().map(|u| u.name.as_deref()).collect::<Vec<_>>(),
            )),
            Arc::new(StringArray::from(
                rows.iter().map(|u| u.real_name.as_deref()).collect::<Vec<_>>(),
            )),
            Arc::new(StringArray::from(
                rows.iter().map(|u| u.email.as_deref()).collect::<Vec<_>>(),
            )),
            Arc::new(BooleanArray::from(
                rows.iter().map(|u| u.is_bot).collect::<Vec<_>>(),
            )),
            Arc::new(StringArray::from(
                rows.iter().map(|_| Some(stamp.as_str())).collect::<Vec<_>>(),
            )),
        ];
        let batch = RecordBatch::try_new(schema.clone(), columns)?;

        let path = self.root.join("users.parquet");
        self.write_atomic(&path, schema, &batch)?;

        tracing::debug!(path = %path.display(), rows = rows.len(), "Wrote user cache");
        Ok(Some(path))
    }

    /// Write one day's issue-ticket partition.
    pub fn save_issue_tickets(
        &self,
        date: &str,
        tickets: &[IssueTicket],
        cached_at: DateTime<Utc>,
    ) -> Result<Option<PathBuf>> {
        if !is_valid_date(date) {
            return Err(Error::Config(format!(
                "invalid partition date: {date} (expected YYYY-MM-DD)"
            )));
        }
        if tickets.is_empty() {
            return Ok(None);
        }

        let mut rows: Vec<&IssueTicket> = tickets.iter().collect();
        rows.sort_by(|a, b| a.ticket_id.cmp(&b.ticket_id));
        for ticket in &rows {
            if ticket.ticket_id.is_empty() {
                return Err(Error::Schema("ticket with empty ticket_id".to_string()));
            }
        }

        let schema = tickets_schema();
        let batch = tickets_batch(schema.clone(), &rows, cached_at)?;

        let path = self
            .root
            .join("issue_tickets")
            .join(format!("dt={date}"))
            .join("data.parquet");
        self.write_atomic(&path, schema, &batch)?;

        tracing::debug!(
            path = %path.display(),
            rows = rows.len(),
            "Wrote issue ticket partition"
        );
        Ok(Some(path))
    }

    /// Snappy-compressed write to `<path>.tmp`, then rename into place.
    fn write_atomic(&self, path: &Path, schema: Arc<Schema>, batch: &RecordBatch) -> Result<()> {
        let parent = path
            .parent()
            .ok_or_else(|| Error::Config(format!("partition path has no parent: {path:?}")))?;
        std::fs::create_dir_all(parent)?;

        let tmp = path.with_extension("parquet.tmp");
        let file = File::create(&tmp)?;
        let props = WriterProperties::builder()
            .set_compression(Compression::SNAPPY)
            .build();

        let mut writer = ArrowWriter::try_new(file, schema, Some(props))?;
        writer.write(batch)?;
        writer.close()?;

        std::fs::rename(&tmp, path)?;
        Ok(())
    }
}

/// Build the messages record batch in contract column order.
fn messages_batch(schema: Arc<Schema>, rows: &[MessageRow]) -> Result<RecordBatch> {
    let mut issue_keys = ListBuilder::new(StringBuilder::new());
    for row in rows {
        for key in &row.issue_keys {
            issue_keys.values().append_value(key);
        }
        issue_keys.append(true);
    }

    let mut reactions = ListBuilder::new(StructBuilder::new(
        reaction_fields(),
        vec![
            Box::new(StringBuilder::new()) as Box<dyn ArrayBuilder>,
            Box::new(Int64Builder::new()),
            Box::new(ListBuilder::new(StringBuilder::new())),
        ],
    ));
    for row in rows {
        let entry = reactions.values();
        for reaction in &row.reactions {
            entry
                .field_builder::<StringBuilder>(0)
                .expect("reaction emoji builder")
                .append_value(&reaction.emoji);
            entry
                .field_builder::<Int64Builder>(1)
                .expect("reaction count builder")
                .append_value(reaction.count);
            let users = entry
                .field_builder::<ListBuilder<StringBuilder>>(2)
                .expect("reaction users builder");
            for user in &reaction.users {
                users.values().append_value(user);
            }
            users.append(true);
            entry.append(true);
        }
        reactions.append(true);
    }

    let mut files = ListBuilder::new(StructBuilder::new(
        file_fields(),
        vec![
            Box::new(StringBuilder::new()) as Box<dyn ArrayBuilder>,
            Box::new(StringBuilder::new()),
            Box::new(StringBuilder::new()),
            Box::new(StringBuilder::new()),
            Box::new(Int64Builder::new()),
        ],
    ));
    for row in rows {
        let entry = files.values();
        for file in &row.files {
            entry
                .field_builder::<StringBuilder>(0)
                .expect("file id builder")
                .append_value(&file.id);
            append_opt_string(entry.field_builder::<StringBuilder>(1), file.name.as_deref());
            append_opt_string(
                entry.field_builder::<StringBuilder>(2),
                file.mimetype.as_deref(),
            );
            append_opt_string(entry.field_builder::<StringBuilder>(3), file.url.as_deref());
            entry
                .field_builder::<Int64Builder>(4)
                .expect("file size builder")
                .append_option(file.size);
            entry.append(true);
        }
        files.append(true);
    }

    let columns: Vec<ArrayRef> = vec![
        Arc::new(StringArray::from(
            rows.iter().map(|r| Some(r.message_id.as_str())).collect::<Vec<_>>(),
        )),
        Arc::new(StringArray::from(
            rows.iter().map(|r| r.user_id.as_deref()).collect::<Vec<_>>(),
        )),
        Arc::new(StringArray::from(
            rows.iter().map(|r| Some(r.text.as_str())).collect::<Vec<_>>(),
        )),
        Arc::new(StringArray::from(
            rows.iter().map(|r| Some(r.timestamp.as_str())).collect::<Vec<_>>(),
        )),
        Arc::new(StringArray::from(
            rows.iter().map(|r| r.thread_ts.as_deref()).collect::<Vec<_>>(),
        )),
        Arc::new(BooleanArray::from(
            rows.iter().map(|r| r.is_thread_parent).collect::<Vec<_>>(),
        )),
        Arc::new(BooleanArray::from(
            rows.iter().map(|r| r.is_thread_reply).collect::<Vec<_>>(),
        )),
        Arc::new(Int64Array::from(
            rows.iter().map(|r| r.reply_count).collect::<Vec<_>>(),
        )),
        Arc::new(StringArray::from(
            rows.iter().map(|r| r.user_name.as_deref()).collect::<Vec<_>>(),
        )),
        Arc::new(StringArray::from(
            rows.iter().map(|r| r.user_real_name.as_deref()).collect::<Vec<_>>(),
        )),
        Arc::new(StringArray::from(
            rows.iter().map(|r| r.user_email.as_deref()).collect::<Vec<_>>(),
        )),
        Arc::new(BooleanArray::from(
            rows.iter().map(|r| r.user_is_bot).collect::<Vec<Option<bool>>>(),
        )),
        Arc::new(issue_keys.finish()),
        Arc::new(BooleanArray::from(
            rows.iter().map(|r| r.has_reactions).collect::<Vec<_>>(),
        )),
        Arc::new(BooleanArray::from(
            rows.iter().map(|r| r.has_files).collect::<Vec<_>>(),
        )),
        Arc::new(BooleanArray::from(
            rows.iter().map(|r| r.has_thread).collect::<Vec<_>>(),
        )),
        Arc::new(reactions.finish()),
        Arc::new(files.finish()),
    ];

    RecordBatch::try_new(schema, columns).map_err(Error::from)
}

/// Build the issue-tickets record batch.
fn tickets_batch(
    schema: Arc<Schema>,
    rows: &[&IssueTicket],
    cached_at: DateTime<Utc>,
) -> Result<RecordBatch> {
    let stamp = cached_at.to_rfc3339_opts(SecondsFormat::Secs, true);

    let string_list = |select: &dyn Fn(&IssueTicket) -> &Vec<String>| {
        let mut builder = ListBuilder::new(StringBuilder::new());
        for ticket in rows {
            for value in select(ticket) {
                builder.values().append_value(value);
            }
            builder.append(true);
        }
        builder.finish()
    };

    let mut comments = MapBuilder::new(None, StringBuilder::new(), Int64Builder::new());
    for ticket in rows {
        for (author, count) in &ticket.comments {
            comments.keys().append_value(author);
            comments.values().append_value(*count);
        }
        comments.append(true)?;
    }

    let mut sprints = ListBuilder::new(StructBuilder::new(
        sprint_fields(),
        vec![
            Box::new(StringBuilder::new()) as Box<dyn ArrayBuilder>,
            Box::new(StringBuilder::new()),
        ],
    ));
    for ticket in rows {
        let entry = sprints.values();
        for sprint in &ticket.sprints {
            entry
                .field_builder::<StringBuilder>(0)
                .expect("sprint name builder")
                .append_value(&sprint.name);
            entry
                .field_builder::<StringBuilder>(1)
                .expect("sprint state builder")
                .append_value(&sprint.state);
            entry.append(true);
        }
        sprints.append(true);
    }

    let columns: Vec<ArrayRef> = vec![
        Arc::new(StringArray::from(
            rows.iter().map(|t| Some(t.ticket_id.as_str())).collect::<Vec<_>>(),
        )),
        Arc::new(StringArray::from(
            rows.iter().map(|t| Some(t.summary.as_str())).collect::<Vec<_>>(),
        )),
        Arc::new(StringArray::from(
            rows.iter().map(|t| Some(t.status.as_str())).collect::<Vec<_>>(),
        )),
        Arc::new(StringArray::from(
            rows.iter().map(|t| Some(t.priority.as_str())).collect::<Vec<_>>(),
        )),
        Arc::new(StringArray::from(
            rows.iter().map(|t| Some(t.issue_type.as_str())).collect::<Vec<_>>(),
        )),
        Arc::new(StringArray::from(
            rows.iter().map(|t| Some(t.assignee.as_str())).collect::<Vec<_>>(),
        )),
        Arc::new(StringArray::from(
            rows.iter().map(|t| Some(t.created.as_str())).collect::<Vec<_>>(),
        )),
        Arc::new(StringArray::from(
            rows.iter().map(|t| Some(t.updated.as_str())).collect::<Vec<_>>(),
        )),
        Arc::new(StringArray::from(
            rows.iter().map(|t| t.due_date.as_deref()).collect::<Vec<_>>(),
        )),
        Arc::new(Int64Array::from(
            rows.iter().map(|t| t.story_points).collect::<Vec<_>>(),
        )),
        Arc::new(string_list(&|t| &t.blocks)),
        Arc::new(string_list(&|t| &t.blocked_by)),
        Arc::new(string_list(&|t| &t.depends_on)),
        Arc::new(string_list(&|t| &t.related)),
        Arc::new(string_list(&|t| &t.components)),
        Arc::new(string_list(&|t| &t.labels)),
        Arc::new(string_list(&|t| &t.fix_versions)),
        Arc::new(StringArray::from(
            rows.iter().map(|t| t.project.as_deref()).collect::<Vec<_>>(),
        )),
        Arc::new(StringArray::from(
            rows.iter().map(|t| t.team.as_deref()).collect::<Vec<_>>(),
        )),
        Arc::new(StringArray::from(
            rows.iter().map(|t| t.epic_link.as_deref()).collect::<Vec<_>>(),
        )),
        Arc::new(StringArray::from(
            rows.iter().map(|t| t.resolution.as_deref()).collect::<Vec<_>>(),
        )),
        Arc::new(comments.finish()),
        Arc::new(Int64Array::from(
            rows.iter().map(|t| t.total_comments()).collect::<Vec<_>>(),
        )),
        Arc::new(sprints.finish()),
        Arc::new(StringArray::from(
            rows.iter().map(|_| Some(stamp.as_str())).collect::<Vec<_>>(),
        )),
    ];

    RecordBatch::try_new(schema, columns).map_err(Error::from)
}

fn append_opt_string(builder: Option<&mut StringBuilder>, value: Option<&str>) {
    builder.expect("string field builder").append_option(value);
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn channel() -> Channel {
        Channel {
            name: "eng".to_string(),
            id: "C1".to_string(),
        }
    }

    fn message(id: &str) -> ChatMessage {
        ChatMessage {
            message_id: id.to_string(),
            user_id: Some("U1".to_string()),
            text: "hello".to_string(),
            timestamp: Utc.with_ymd_and_hms(2025, 10, 15, 12, 0, 0).unwrap(),
            thread_ts: None,
            reply_count: 0,
            reactions: vec![],
            files: vec![],
            issue_keys: vec![],
            user_info: None,
        }
    }

    #[test]
    fn test_empty_inputs_write_nothing() {
        let dir = TempDir::new().unwrap();
        let writer = ParquetWriter::new(dir.path());

        assert!(writer
            .save_messages(&channel(), "2025-10-15", &[])
            .unwrap()
            .is_none());
        assert!(writer.save_users(&[], Utc::now()).unwrap().is_none());
        assert!(writer
            .save_issue_tickets("2025-10-15", &[], Utc::now())
            .unwrap()
            .is_none());
        assert!(!dir.path().join("messages").exists());
        assert!(!dir.path().join("users.parquet").exists());
    }

    #[test]
    fn test_invalid_date_is_config_error() {
        let dir = TempDir::new().unwrap();
        let writer = ParquetWriter::new(dir.path());

        let result = writer.save_messages(&channel(), "15-10-2025", &[message("1.000001")]);
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_empty_message_id_is_schema_error() {
        let dir = TempDir::new().unwrap();
        let writer = ParquetWriter::new(dir.path());

        let result = writer.save_messages(&channel(), "2025-10-15", &[message("")]);
        assert!(matches!(result, Err(Error::Schema(_))));
    }

    #[test]
    fn test_partition_path_layout() {
        let dir = TempDir::new().unwrap();
        let writer = ParquetWriter::new(dir.path());

        let path = writer
            .save_messages(&channel(), "2025-10-15", &[message("1.000001")])
            .unwrap()
            .unwrap();
        assert!(path.ends_with("messages/dt=2025-10-15/channel=eng/data.parquet"));
        assert!(path.exists());
        // No temp file left behind
        assert!(!path.with_extension("parquet.tmp").exists());
    }

    #[test]
    fn test_overwrite_replaces_partition() {
        let dir = TempDir::new().unwrap();
        let writer = ParquetWriter::new(dir.path());

        let first = writer
            .save_messages(&channel(), "2025-10-15", &[message("1.000001"), message("2.000001")])
            .unwrap()
            .unwrap();
        let first_len = std::fs::metadata(&first).unwrap().len();

        let second = writer
            .save_messages(&channel(), "2025-10-15", &[message("1.000001")])
            .unwrap()
            .unwrap();
        assert_eq!(first, second);
        let second_len = std::fs::metadata(&second).unwrap().len();
        assert!(second_len < first_len);
    }
}
