//! Canonical Parquet schemas for the chatvault dataset
//!
//! These schemas are the contract for every reader of the on-disk files.
//! Field order and nullability are part of the contract; keep changes
//! backwards-compatible (readers decode by column name and tolerate extra
//! columns, so additions are safe, reorders and removals are not).

use arrow::datatypes::{DataType, Field, Fields, Schema};
use std::sync::Arc;

/// Struct fields of one reaction entry
pub(crate) fn reaction_fields() -> Fields {
    Fields::from(vec![
        Field::new("emoji", DataType::Utf8, true),
        Field::new("count", DataType::Int64, true),
        Field::new_list("users", Field::new_list_field(DataType::Utf8, true), true),
    ])
}

/// Struct fields of one file-attachment entry
pub(crate) fn file_fields() -> Fields {
    Fields::from(vec![
        Field::new("id", DataType::Utf8, true),
        Field::new("name", DataType::Utf8, true),
        Field::new("mimetype", DataType::Utf8, true),
        Field::new("url", DataType::Utf8, true),
        Field::new("size", DataType::Int64, true),
    ])
}

/// Struct fields of one sprint entry
pub(crate) fn sprint_fields() -> Fields {
    Fields::from(vec![
        Field::new("name", DataType::Utf8, true),
        Field::new("state", DataType::Utf8, true),
    ])
}

fn string_list(name: &str) -> Field {
    Field::new_list(name, Field::new_list_field(DataType::Utf8, true), false)
}

/// Messages table: 16 scalar/list columns in contract order, then the
/// nested `reactions` and `files` columns for fidelity.
pub fn messages_schema() -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new("message_id", DataType::Utf8, false),
        Field::new("user_id", DataType::Utf8, true),
        Field::new("text", DataType::Utf8, false),
        Field::new("timestamp", DataType::Utf8, false),
        Field::new("thread_ts", DataType::Utf8, true),
        Field::new("is_thread_parent", DataType::Boolean, false),
        Field::new("is_thread_reply", DataType::Boolean, false),
        Field::new("reply_count", DataType::Int64, false),
        Field::new("user_name", DataType::Utf8, true),
        Field::new("user_real_name", DataType::Utf8, true),
        Field::new("user_email", DataType::Utf8, true),
        Field::new("user_is_bot", DataType::Boolean, true),
        string_list("issue_keys"),
        Field::new("has_reactions", DataType::Boolean, false),
        Field::new("has_files", DataType::Boolean, false),
        Field::new("has_thread", DataType::Boolean, false),
        Field::new_list(
            "reactions",
            Field::new_list_field(DataType::Struct(reaction_fields()), true),
            false,
        ),
        Field::new_list(
            "files",
            Field::new_list_field(DataType::Struct(file_fields()), true),
            false,
        ),
    ]))
}

/// Users table (unpartitioned `users.parquet`)
pub fn users_schema() -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new("user_id", DataType::Utf8, false),
        Field::new("user_name", DataType::Utf8, true),
        Field::new("user_real_name", DataType::Utf8, true),
        Field::new("user_email", DataType::Utf8, true),
        Field::new("is_bot", DataType::Boolean, false),
        Field::new("cached_at", DataType::Utf8, false),
    ]))
}

/// Issue tickets table, `cached_at` last.
pub fn tickets_schema() -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new("ticket_id", DataType::Utf8, false),
        Field::new("summary", DataType::Utf8, false),
        Field::new("status", DataType::Utf8, false),
        Field::new("priority", DataType::Utf8, false),
        Field::new("issue_type", DataType::Utf8, false),
        Field::new("assignee", DataType::Utf8, false),
        Field::new("created", DataType::Utf8, false),
        Field::new("updated", DataType::Utf8, false),
        Field::new("due_date", DataType::Utf8, true),
        Field::new("story_points", DataType::Int64, true),
        string_list("blocks"),
        string_list("blocked_by"),
        string_list("depends_on"),
        string_list("related"),
        string_list("components"),
        string_list("labels"),
        string_list("fix_versions"),
        Field::new("project", DataType::Utf8, true),
        Field::new("team", DataType::Utf8, true),
        Field::new("epic_link", DataType::Utf8, true),
        Field::new("resolution", DataType::Utf8, true),
        Field::new_map(
            "comments",
            "entries",
            Field::new("keys", DataType::Utf8, false),
            Field::new("values", DataType::Int64, true),
            false,
            false,
        ),
        Field::new("total_comments", DataType::Int64, false),
        Field::new_list(
            "sprints",
            Field::new_list_field(DataType::Struct(sprint_fields()), true),
            false,
        ),
        Field::new("cached_at", DataType::Utf8, false),
    ]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_schema_contract_order() {
        let schema = messages_schema();
        let names: Vec<_> = schema.fields().iter().map(|f| f.name().as_str()).collect();
        assert_eq!(
            &names[..16],
            &[
                "message_id",
                "user_id",
                "text",
                "timestamp",
                "thread_ts",
                "is_thread_parent",
                "is_thread_reply",
                "reply_count",
                "user_name",
                "user_real_name",
                "user_email",
                "user_is_bot",
                "issue_keys",
                "has_reactions",
                "has_files",
                "has_thread",
            ]
        );
        assert_eq!(&names[16..], &["reactions", "files"]);
    }

    #[test]
    fn test_messages_schema_nullability() {
        let schema = messages_schema();
        assert!(!schema.field_with_name("message_id").unwrap().is_nullable());
        assert!(schema.field_with_name("user_id").unwrap().is_nullable());
        assert!(schema.field_with_name("user_is_bot").unwrap().is_nullable());
        // List columns are never null, only empty
        assert!(!schema.field_with_name("issue_keys").unwrap().is_nullable());
        assert!(!schema.field_with_name("reactions").unwrap().is_nullable());
    }

    #[test]
    fn test_tickets_schema_cached_at_last() {
        let schema = tickets_schema();
        let last = schema.fields().last().unwrap();
        assert_eq!(last.name(), "cached_at");
    }

    #[test]
    fn test_users_schema_shape() {
        let schema = users_schema();
        let names: Vec<_> = schema.fields().iter().map(|f| f.name().as_str()).collect();
        assert_eq!(
            names,
            vec![
                "user_id",
                "user_name",
                "user_real_name",
                "user_email",
                "is_bot",
                "cached_at"
            ]
        );
    }
}
