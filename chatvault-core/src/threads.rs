//! Thread reconstruction from flat partition rows
//!
//! The store persists threads as flags on flat rows (`thread_ts`,
//! `is_thread_parent`, `is_thread_reply`). Reconstruction nests replies
//! under the parents present in the read set and marks what the read window
//! clipped:
//!
//! - a reply whose parent is absent becomes its own top-level, flagged
//!   `is_orphaned_reply` + `is_clipped_thread`
//! - a parent with fewer attached replies than its `reply_count` is flagged
//!   `has_clipped_replies` (zero attached also sets `is_clipped_thread`)
//!
//! Flattening the output yields a permutation of the input rows, and
//! reconstruction is idempotent over its own flattened output.

use crate::store::MessageRow;
use std::collections::{HashMap, HashSet};

/// Group flat rows into top-level messages bearing nested `replies`.
///
/// Top-levels and each reply list are sorted by `(timestamp, message_id)`.
pub fn reconstruct(flat: Vec<MessageRow>) -> Vec<MessageRow> {
    if flat.is_empty() {
        return vec![];
    }

    let ids: HashSet<String> = flat.iter().map(|r| r.message_id.clone()).collect();

    // Derived fields are recomputed from scratch so rows that already went
    // through a reconstruct round do not accumulate stale flags.
    let mut top: Vec<MessageRow> = Vec::new();
    let mut pending_replies: Vec<MessageRow> = Vec::new();

    for mut row in flat {
        row.replies.clear();
        row.is_orphaned_reply = false;
        row.is_clipped_thread = false;
        row.has_clipped_replies = false;

        // A self-parented row is never a reply, whatever its flag says
        let is_reply =
            row.is_thread_reply && row.thread_ts.as_deref() != Some(row.message_id.as_str());

        if is_reply {
            let parent_present = row
                .thread_ts
                .as_ref()
                .map(|ts| ids.contains(ts))
                .unwrap_or(false);
            if parent_present {
                pending_replies.push(row);
            } else {
                row.is_orphaned_reply = true;
                row.is_clipped_thread = true;
                top.push(row);
            }
        } else {
            top.push(row);
        }
    }

    let mut index: HashMap<String, usize> = top
        .iter()
        .enumerate()
        .map(|(i, row)| (row.message_id.clone(), i))
        .collect();

    for mut reply in pending_replies {
        let target = reply.thread_ts.clone().unwrap_or_default();
        match index.get(&target) {
            Some(&i) => top[i].replies.push(reply),
            None => {
                // The id exists in the read set but belongs to another
                // reply; treat as orphaned rather than nesting chains.
                reply.is_orphaned_reply = true;
                reply.is_clipped_thread = true;
                index.insert(reply.message_id.clone(), top.len());
                top.push(reply);
            }
        }
    }

    for row in &mut top {
        row.replies.sort_by(|a, b| {
            (a.timestamp.as_str(), a.message_id.as_str())
                .cmp(&(b.timestamp.as_str(), b.message_id.as_str()))
        });
        let attached = row.replies.len() as i64;
        if attached < row.reply_count {
            row.has_clipped_replies = true;
            if attached == 0 {
                row.is_clipped_thread = true;
            }
        }
    }

    top.sort_by(|a, b| {
        (a.timestamp.as_str(), a.message_id.as_str())
            .cmp(&(b.timestamp.as_str(), b.message_id.as_str()))
    });
    top
}

/// Undo [`reconstruct`]: emit every top-level followed by its replies as
/// flat rows again.
pub fn flatten(threaded: Vec<MessageRow>) -> Vec<MessageRow> {
    let mut flat = Vec::new();
    for mut row in threaded {
        let replies = std::mem::take(&mut row.replies);
        flat.push(row);
        flat.extend(replies);
    }
    flat
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(id: &str, ts: &str) -> MessageRow {
        MessageRow {
            message_id: id.to_string(),
            timestamp: ts.to_string(),
            text: format!("text {id}"),
            ..Default::default()
        }
    }

    fn parent(id: &str, ts: &str, reply_count: i64) -> MessageRow {
        MessageRow {
            thread_ts: Some(id.to_string()),
            is_thread_parent: true,
            reply_count,
            ..row(id, ts)
        }
    }

    fn reply(id: &str, ts: &str, thread_ts: &str) -> MessageRow {
        MessageRow {
            thread_ts: Some(thread_ts.to_string()),
            is_thread_reply: true,
            ..row(id, ts)
        }
    }

    #[test]
    fn test_replies_nest_under_parent_sorted() {
        let result = reconstruct(vec![
            reply("102", "2025-10-20T10:02:00.000000Z", "100"),
            parent("100", "2025-10-20T10:00:00.000000Z", 2),
            reply("101", "2025-10-20T10:01:00.000000Z", "100"),
        ]);

        assert_eq!(result.len(), 1);
        let thread = &result[0];
        assert_eq!(thread.message_id, "100");
        let reply_ids: Vec<_> = thread.replies.iter().map(|r| r.message_id.as_str()).collect();
        assert_eq!(reply_ids, vec!["101", "102"]);
        assert!(!thread.has_clipped_replies);
    }

    #[test]
    fn test_clipped_thread_marks_missing_replies() {
        let result = reconstruct(vec![
            parent("100", "2025-10-20T10:00:00.000000Z", 5),
            reply("101", "2025-10-20T10:01:00.000000Z", "100"),
            reply("102", "2025-10-20T10:02:00.000000Z", "100"),
        ]);

        assert_eq!(result.len(), 1);
        assert_eq!(result[0].replies.len(), 2);
        assert!(result[0].has_clipped_replies);
        assert!(!result[0].is_clipped_thread);
    }

    #[test]
    fn test_parent_with_zero_attached_replies_is_clipped() {
        let result = reconstruct(vec![parent("100", "2025-10-20T10:00:00.000000Z", 3)]);

        assert_eq!(result.len(), 1);
        assert!(result[0].replies.is_empty());
        assert!(result[0].has_clipped_replies);
        assert!(result[0].is_clipped_thread);
    }

    #[test]
    fn test_orphaned_reply_becomes_top_level() {
        let result = reconstruct(vec![reply("202", "2025-10-20T10:00:00.000000Z", "201")]);

        assert_eq!(result.len(), 1);
        assert!(result[0].is_orphaned_reply);
        assert!(result[0].is_clipped_thread);
        assert!(result[0].replies.is_empty());
    }

    #[test]
    fn test_self_parented_reply_is_standalone() {
        let mut self_parented = reply("300", "2025-10-20T10:00:00.000000Z", "300");
        self_parented.is_thread_reply = true;

        let result = reconstruct(vec![self_parented]);
        assert_eq!(result.len(), 1);
        assert!(!result[0].is_orphaned_reply);
    }

    #[test]
    fn test_top_levels_sorted_with_ties_on_id() {
        let result = reconstruct(vec![
            row("20", "2025-10-20T10:00:00.000000Z"),
            row("10", "2025-10-20T10:00:00.000000Z"),
            row("05", "2025-10-20T09:00:00.000000Z"),
        ]);

        let ids: Vec<_> = result.iter().map(|r| r.message_id.as_str()).collect();
        assert_eq!(ids, vec!["05", "10", "20"]);
    }

    #[test]
    fn test_flatten_is_permutation_of_input() {
        let input = vec![
            parent("100", "2025-10-20T10:00:00.000000Z", 2),
            reply("101", "2025-10-20T10:01:00.000000Z", "100"),
            reply("102", "2025-10-20T10:02:00.000000Z", "100"),
            row("103", "2025-10-20T10:03:00.000000Z"),
            reply("202", "2025-10-20T10:04:00.000000Z", "201"),
        ];
        let mut input_ids: Vec<_> = input.iter().map(|r| r.message_id.clone()).collect();

        let flat = flatten(reconstruct(input));
        let mut output_ids: Vec<_> = flat.iter().map(|r| r.message_id.clone()).collect();

        input_ids.sort();
        output_ids.sort();
        assert_eq!(input_ids, output_ids);
    }

    #[test]
    fn test_reconstruct_is_idempotent_over_flatten() {
        let input = vec![
            parent("100", "2025-10-20T10:00:00.000000Z", 5),
            reply("101", "2025-10-20T10:01:00.000000Z", "100"),
            reply("202", "2025-10-20T10:02:00.000000Z", "201"),
            row("103", "2025-10-20T10:03:00.000000Z"),
        ];

        let once = reconstruct(input);
        let twice = reconstruct(flatten(once.clone()));
        assert_eq!(once, twice);
    }
}
