//! Partition reader with pruning, alias fallback, and column projection
//!
//! Reads decode by column name and ignore columns they do not know, so a
//! dataset written by a newer writer (extra columns) still loads. Output is
//! always sorted by `(timestamp, message_id)`; this is the only place in
//! the pipeline where order is established.

use std::collections::HashMap;
use std::fs::File;
use std::path::{Path, PathBuf};

use arrow::array::{Array, BooleanArray, Int64Array, ListArray, RecordBatch, StringArray, StructArray};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ProjectionMask;

use crate::error::Result;
use crate::types::{FileAttachment, Reaction};
use crate::window::enumerate_dates;

use super::MessageRow;

/// A cached user profile row from `users.parquet`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UserRecord {
    pub user_id: String,
    pub user_name: Option<String>,
    pub user_real_name: Option<String>,
    pub user_email: Option<String>,
    pub is_bot: bool,
    pub cached_at: String,
}

impl UserRecord {
    /// Display name for mention resolution: real name, else handle, else id.
    pub fn preferred_name(&self) -> &str {
        self.user_real_name
            .as_deref()
            .or(self.user_name.as_deref())
            .unwrap_or(&self.user_id)
    }
}

/// Stats for one partition file.
#[derive(Debug, Clone)]
pub struct PartitionStat {
    pub path: PathBuf,
    pub rows: i64,
    pub bytes: u64,
}

/// Dataset-wide partition summary.
#[derive(Debug, Clone, Default)]
pub struct PartitionInfo {
    pub partitions: Vec<PartitionStat>,
    pub total_rows: i64,
    pub total_bytes: u64,
}

/// Reads dataset partitions under a root cache directory.
pub struct PartitionReader {
    root: PathBuf,
}

impl PartitionReader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Read one `(channel, dt)` partition, resolving the channel alias.
    ///
    /// A missing partition is an empty result, not an error.
    pub fn read_channel(&self, channel: &str, date: &str) -> Result<Vec<MessageRow>> {
        let mut rows = match self.resolve_partition(channel, date) {
            Some(path) => read_message_file(&path, None)?,
            None => Vec::new(),
        };
        sort_rows(&mut rows);
        Ok(rows)
    }

    /// Read a channel across every day in `[start, end]` inclusive.
    /// Missing partitions are silently skipped.
    pub fn read_channel_range(
        &self,
        channel: &str,
        start_date: &str,
        end_date: &str,
    ) -> Result<Vec<MessageRow>> {
        let mut rows = Vec::new();
        for date in enumerate_dates(start_date, end_date) {
            if let Some(path) = self.resolve_partition(channel, &date) {
                rows.extend(read_message_file(&path, None)?);
            }
        }
        sort_rows(&mut rows);
        Ok(rows)
    }

    /// Read every channel partition for one date. Each row is tagged with
    /// its channel alias.
    pub fn read_all_channels(&self, date: &str) -> Result<Vec<MessageRow>> {
        let date_dir = self.messages_dir().join(format!("dt={date}"));
        if !date_dir.is_dir() {
            return Ok(Vec::new());
        }

        let mut rows = Vec::new();
        let mut channel_dirs: Vec<PathBuf> = std::fs::read_dir(&date_dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.is_dir())
            .collect();
        channel_dirs.sort();

        for dir in channel_dirs {
            let Some(alias) = dir
                .file_name()
                .and_then(|n| n.to_str())
                .and_then(|n| n.strip_prefix("channel="))
                .map(ToString::to_string)
            else {
                continue;
            };
            let file = dir.join("data.parquet");
            if !file.is_file() {
                continue;
            }
            let mut channel_rows = read_message_file(&file, None)?;
            for row in &mut channel_rows {
                row.channel_name = Some(alias.clone());
            }
            rows.extend(channel_rows);
        }

        sort_rows(&mut rows);
        Ok(rows)
    }

    /// Projected read of one partition: only `columns` are decoded, the
    /// remaining `MessageRow` fields are left at their defaults. For cheap
    /// scans like building a mention map over a wide date window.
    pub fn read_channel_columns(
        &self,
        channel: &str,
        date: &str,
        columns: &[&str],
    ) -> Result<Vec<MessageRow>> {
        let mut rows = match self.resolve_partition(channel, date) {
            Some(path) => read_message_file(&path, Some(columns))?,
            None => Vec::new(),
        };
        sort_rows(&mut rows);
        Ok(rows)
    }

    /// Load the workspace user cache, keyed by user id. Missing file is an
    /// empty map.
    pub fn read_users(&self) -> Result<HashMap<String, UserRecord>> {
        let path = self.root.join("users.parquet");
        if !path.is_file() {
            return Ok(HashMap::new());
        }

        let file = File::open(&path)?;
        let reader = ParquetRecordBatchReaderBuilder::try_new(file)?.build()?;

        let mut users = HashMap::new();
        for batch in reader {
            let batch = batch?;
            let ids = col_string(&batch, "user_id");
            for i in 0..batch.num_rows() {
                let Some(user_id) = ids.and_then(|c| string_at(c, i)) else {
                    continue;
                };
                users.insert(
                    user_id.clone(),
                    UserRecord {
                        user_id,
                        user_name: col_string(&batch, "user_name").and_then(|c| string_at(c, i)),
                        user_real_name: col_string(&batch, "user_real_name")
                            .and_then(|c| string_at(c, i)),
                        user_email: col_string(&batch, "user_email").and_then(|c| string_at(c, i)),
                        is_bot: col_bool(&batch, "is_bot")
                            .map(|c| c.value(i))
                            .unwrap_or(false),
                        cached_at: col_string(&batch, "cached_at")
                            .and_then(|c| string_at(c, i))
                            .unwrap_or_default(),
                    },
                );
            }
        }
        Ok(users)
    }

    /// Walk the dataset and summarize every partition file.
    pub fn partition_info(&self) -> Result<PartitionInfo> {
        let mut info = PartitionInfo::default();
        if !self.root.is_dir() {
            return Ok(info);
        }

        let mut files = Vec::new();
        collect_parquet_files(&self.root, &mut files)?;
        files.sort();

        for path in files {
            let bytes = std::fs::metadata(&path)?.len();
            let file = File::open(&path)?;
            // Footer metadata only; no row groups are decoded
            let rows = match ParquetRecordBatchReaderBuilder::try_new(file) {
                Ok(builder) => builder.metadata().file_metadata().num_rows(),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Skipping unreadable file");
                    continue;
                }
            };
            info.total_rows += rows;
            info.total_bytes += bytes;
            info.partitions.push(PartitionStat { path, rows, bytes });
        }
        Ok(info)
    }

    /// Resolve a channel alias to an existing partition file.
    ///
    /// Tries the literal `channel=<c>` partition, then `channel=channel_<c>`.
    /// Only these two attempts are made.
    pub fn resolve_channel(&self, channel: &str, date: &str) -> Option<String> {
        let literal = self.partition_file(channel, date);
        if literal.is_file() {
            return Some(channel.to_string());
        }
        let prefixed = format!("channel_{channel}");
        if self.partition_file(&prefixed, date).is_file() {
            return Some(prefixed);
        }
        None
    }

    fn resolve_partition(&self, channel: &str, date: &str) -> Option<PathBuf> {
        self.resolve_channel(channel, date)
            .map(|alias| self.partition_file(&alias, date))
    }

    fn partition_file(&self, alias: &str, date: &str) -> PathBuf {
        self.messages_dir()
            .join(format!("dt={date}"))
            .join(format!("channel={alias}"))
            .join("data.parquet")
    }

    fn messages_dir(&self) -> PathBuf {
        self.root.join("messages")
    }
}

fn collect_parquet_files(dir: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            collect_parquet_files(&path, out)?;
        } else if path.extension().and_then(|e| e.to_str()) == Some("parquet") {
            out.push(path);
        }
    }
    Ok(())
}

fn sort_rows(rows: &mut [MessageRow]) {
    rows.sort_by(|a, b| {
        (a.timestamp.as_str(), a.message_id.as_str())
            .cmp(&(b.timestamp.as_str(), b.message_id.as_str()))
    });
}

/// Decode one messages partition file, optionally projected to a column
/// subset.
fn read_message_file(path: &Path, columns: Option<&[&str]>) -> Result<Vec<MessageRow>> {
    let file = File::open(path)?;
    let builder = ParquetRecordBatchReaderBuilder::try_new(file)?;

    let reader = match columns {
        Some(names) => {
            let schema = builder.parquet_schema();
            let indices = (0..schema.columns().len())
                .filter(|i| names.contains(&schema.column(*i).name()));
            let mask = ProjectionMask::leaves(schema, indices);
            builder.with_projection(mask).build()?
        }
        None => builder.build()?,
    };

    let mut rows = Vec::new();
    for batch in reader {
        decode_message_batch(&batch?, &mut rows);
    }
    Ok(rows)
}

/// Decode by column name; absent columns leave row defaults in place.
fn decode_message_batch(batch: &RecordBatch, rows: &mut Vec<MessageRow>) {
    let message_id = col_string(batch, "message_id");
    let user_id = col_string(batch, "user_id");
    let text = col_string(batch, "text");
    let timestamp = col_string(batch, "timestamp");
    let thread_ts = col_string(batch, "thread_ts");
    let is_thread_parent = col_bool(batch, "is_thread_parent");
    let is_thread_reply = col_bool(batch, "is_thread_reply");
    let reply_count = col_i64(batch, "reply_count");
    let user_name = col_string(batch, "user_name");
    let user_real_name = col_string(batch, "user_real_name");
    let user_email = col_string(batch, "user_email");
    let user_is_bot = col_bool(batch, "user_is_bot");
    let issue_keys = col_list(batch, "issue_keys");
    let has_reactions = col_bool(batch, "has_reactions");
    let has_files = col_bool(batch, "has_files");
    let has_thread = col_bool(batch, "has_thread");
    let reactions = col_list(batch, "reactions");
    let files = col_list(batch, "files");

    for i in 0..batch.num_rows() {
        rows.push(MessageRow {
            message_id: message_id.and_then(|c| string_at(c, i)).unwrap_or_default(),
            user_id: user_id.and_then(|c| string_at(c, i)),
            text: text.and_then(|c| string_at(c, i)).unwrap_or_default(),
            timestamp: timestamp.and_then(|c| string_at(c, i)).unwrap_or_default(),
            thread_ts: thread_ts.and_then(|c| string_at(c, i)),
            is_thread_parent: bool_at(is_thread_parent, i).unwrap_or(false),
            is_thread_reply: bool_at(is_thread_reply, i).unwrap_or(false),
            reply_count: reply_count
                .map(|c| if c.is_null(i) { 0 } else { c.value(i) })
                .unwrap_or(0),
            user_name: user_name.and_then(|c| string_at(c, i)),
            user_real_name: user_real_name.and_then(|c| string_at(c, i)),
            user_email: user_email.and_then(|c| string_at(c, i)),
            user_is_bot: bool_at(user_is_bot, i),
            issue_keys: issue_keys.map(|c| string_list_at(c, i)).unwrap_or_default(),
            has_reactions: bool_at(has_reactions, i).unwrap_or(false),
            has_files: bool_at(has_files, i).unwrap_or(false),
            has_thread: bool_at(has_thread, i).unwrap_or(false),
            reactions: reactions.map(|c| reactions_at(c, i)).unwrap_or_default(),
            files: files.map(|c| files_at(c, i)).unwrap_or_default(),
            channel_name: None,
            replies: vec![],
            is_orphaned_reply: false,
            is_clipped_thread: false,
            has_clipped_replies: false,
        });
    }
}

// ============================================
// Column access helpers
// ============================================

fn col_string<'a>(batch: &'a RecordBatch, name: &str) -> Option<&'a StringArray> {
    batch
        .column_by_name(name)?
        .as_any()
        .downcast_ref::<StringArray>()
}

fn col_bool<'a>(batch: &'a RecordBatch, name: &str) -> Option<&'a BooleanArray> {
    batch
        .column_by_name(name)?
        .as_any()
        .downcast_ref::<BooleanArray>()
}

fn col_i64<'a>(batch: &'a RecordBatch, name: &str) -> Option<&'a Int64Array> {
    batch
        .column_by_name(name)?
        .as_any()
        .downcast_ref::<Int64Array>()
}

fn col_list<'a>(batch: &'a RecordBatch, name: &str) -> Option<&'a ListArray> {
    batch
        .column_by_name(name)?
        .as_any()
        .downcast_ref::<ListArray>()
}

fn string_at(col: &StringArray, i: usize) -> Option<String> {
    if col.is_null(i) {
        None
    } else {
        Some(col.value(i).to_string())
    }
}

fn bool_at(col: Option<&BooleanArray>, i: usize) -> Option<bool> {
    col.and_then(|c| if c.is_null(i) { None } else { Some(c.value(i)) })
}

fn string_list_at(col: &ListArray, i: usize) -> Vec<String> {
    if col.is_null(i) {
        return vec![];
    }
    let values = col.value(i);
    let Some(strings) = values.as_any().downcast_ref::<StringArray>() else {
        return vec![];
    };
    (0..strings.len())
        .filter_map(|j| string_at(strings, j))
        .collect()
}

fn reactions_at(col: &ListArray, i: usize) -> Vec<Reaction> {
    if col.is_null(i) {
        return vec![];
    }
    let entry = col.value(i);
    let Some(entries) = entry.as_any().downcast_ref::<StructArray>() else {
        return vec![];
    };

    let emoji = entries
        .column_by_name("emoji")
        .and_then(|c| c.as_any().downcast_ref::<StringArray>());
    let count = entries
        .column_by_name("count")
        .and_then(|c| c.as_any().downcast_ref::<Int64Array>());
    let users = entries
        .column_by_name("users")
        .and_then(|c| c.as_any().downcast_ref::<ListArray>());

    (0..entries.len())
        .map(|j| Reaction {
            emoji: emoji.and_then(|c| string_at(c, j)).unwrap_or_default(),
            count: count
                .map(|c| if c.is_null(j) { 0 } else { c.value(j) })
                .unwrap_or(0),
            users: users.map(|c| string_list_at(c, j)).unwrap_or_default(),
        })
        .collect()
}

fn files_at(col: &ListArray, i: usize) -> Vec<FileAttachment> {
    if col.is_null(i) {
        return vec![];
    }
    let entry = col.value(i);
    let Some(entries) = entry.as_any().downcast_ref::<StructArray>() else {
        return vec![];
    };

    let id = entries
        .column_by_name("id")
        .and_then(|c| c.as_any().downcast_ref::<StringArray>());
    let name = entries
        .column_by_name("name")
        .and_then(|c| c.as_any().downcast_ref::<StringArray>());
    let mimetype = entries
        .column_by_name("mimetype")
        .and_then(|c| c.as_any().downcast_ref::<StringArray>());
    let url = entries
        .column_by_name("url")
        .and_then(|c| c.as_any().downcast_ref::<StringArray>());
    let size = entries
        .column_by_name("size")
        .and_then(|c| c.as_any().downcast_ref::<Int64Array>());

    (0..entries.len())
        .map(|j| FileAttachment {
            id: id.and_then(|c| string_at(c, j)).unwrap_or_default(),
            name: name.and_then(|c| string_at(c, j)),
            mimetype: mimetype.and_then(|c| string_at(c, j)),
            url: url.and_then(|c| string_at(c, j)),
            size: size.and_then(|c| if c.is_null(j) { None } else { Some(c.value(j)) }),
        })
        .collect()
}
