//! HTTP client for the JIRA-shaped issue tracker REST API
//!
//! Fetches one issue per call with basic auth and converts the loosely
//! structured payload (custom fields, polymorphic sprint encodings) into
//! [`IssueTicket`]. Field IDs for story points, team, epic link, and sprints
//! follow the tracker's common defaults.

use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Value;

use crate::client::status_error;
use crate::config::IssueCredentials;
use crate::error::{Error, Result};
use crate::types::{IssueTicket, Sprint};

use super::IssueApi;

const REQUEST_TIMEOUT_SECS: u64 = 30;

// Tracker custom field IDs (instance defaults)
const FIELD_STORY_POINTS: &str = "customfield_10016";
const FIELD_SPRINTS: &str = "customfield_10020";
const FIELD_EPIC_LINK: &str = "customfield_10014";
const FIELD_TEAM: &str = "customfield_10021";

/// HTTP implementation of [`IssueApi`].
pub struct HttpIssueClient {
    http: reqwest::Client,
    base_url: String,
    user: String,
    token: String,
}

impl HttpIssueClient {
    pub fn new(credentials: &IssueCredentials) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| Error::Config(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url: credentials.server.clone(),
            user: credentials.user.clone(),
            token: credentials.token.clone(),
        })
    }

    /// Point the client at a different API root (tests, proxies).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }
}

impl IssueApi for HttpIssueClient {
    async fn ticket(&self, key: &str) -> Result<IssueTicket> {
        let url = format!(
            "{}/rest/api/2/issue/{}",
            self.base_url,
            urlencoding::encode(key)
        );

        let response = self
            .http
            .get(&url)
            .basic_auth(&self.user, Some(&self.token))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(status_error("issue", status, None));
        }

        let payload: Value = serde_json::from_str(&response.text().await?)?;
        parse_issue(key, &payload)
    }
}

/// Convert the tracker's issue payload into the domain ticket.
fn parse_issue(key: &str, payload: &Value) -> Result<IssueTicket> {
    let fields = payload
        .get("fields")
        .ok_or_else(|| Error::Api(format!("issue {}: payload has no fields", key)))?;

    let ticket_id = payload
        .get("key")
        .and_then(Value::as_str)
        .unwrap_or(key)
        .to_string();

    let links = fields
        .get("issuelinks")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    let mut comments = std::collections::BTreeMap::new();
    if let Some(list) = fields
        .pointer("/comment/comments")
        .and_then(Value::as_array)
    {
        for comment in list {
            if let Some(author) = comment.pointer("/author/displayName").and_then(Value::as_str) {
                *comments.entry(author.to_string()).or_insert(0) += 1;
            }
        }
    }

    Ok(IssueTicket {
        ticket_id,
        summary: str_field(fields, "summary").unwrap_or_default(),
        status: named(fields, "status").unwrap_or_default(),
        priority: named(fields, "priority").unwrap_or_default(),
        issue_type: named(fields, "issuetype").unwrap_or_default(),
        assignee: fields
            .pointer("/assignee/displayName")
            .and_then(Value::as_str)
            .unwrap_or("Unassigned")
            .to_string(),
        created: str_field(fields, "created")
            .map(|s| normalize_issue_ts(&s))
            .unwrap_or_default(),
        updated: str_field(fields, "updated")
            .map(|s| normalize_issue_ts(&s))
            .unwrap_or_default(),
        due_date: str_field(fields, "duedate"),
        story_points: fields
            .get(FIELD_STORY_POINTS)
            .and_then(Value::as_f64)
            .map(|p| p as i64),
        blocks: link_keys(&links, "Blocks", "outwardIssue"),
        blocked_by: link_keys(&links, "Blocks", "inwardIssue"),
        depends_on: link_keys(&links, "Depends", "outwardIssue"),
        related: link_keys(&links, "Relates", "outwardIssue"),
        components: named_list(fields, "components"),
        labels: fields
            .get("labels")
            .and_then(Value::as_array)
            .map(|l| {
                l.iter()
                    .filter_map(Value::as_str)
                    .map(ToString::to_string)
                    .collect()
            })
            .unwrap_or_default(),
        fix_versions: named_list(fields, "fixVersions"),
        project: fields
            .pointer("/project/key")
            .and_then(Value::as_str)
            .map(ToString::to_string),
        team: fields
            .get(FIELD_TEAM)
            .and_then(Value::as_str)
            .map(ToString::to_string),
        epic_link: fields
            .get(FIELD_EPIC_LINK)
            .and_then(Value::as_str)
            .map(ToString::to_string),
        resolution: fields
            .pointer("/resolution/name")
            .and_then(Value::as_str)
            .map(ToString::to_string),
        comments,
        sprints: parse_sprints(fields.get(FIELD_SPRINTS)),
    })
}

fn str_field(fields: &Value, name: &str) -> Option<String> {
    fields
        .get(name)
        .and_then(Value::as_str)
        .map(ToString::to_string)
}

/// Extract `fields.<name>.name`, the tracker's enum-object encoding.
fn named(fields: &Value, name: &str) -> Option<String> {
    fields
        .pointer(&format!("/{}/name", name))
        .and_then(Value::as_str)
        .map(ToString::to_string)
}

/// Extract the `name` of every entry in an object array field.
fn named_list(fields: &Value, name: &str) -> Vec<String> {
    fields
        .get(name)
        .and_then(Value::as_array)
        .map(|entries| {
            entries
                .iter()
                .filter_map(|e| e.get("name").and_then(Value::as_str))
                .map(ToString::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Issue-link keys matching a link type and direction.
fn link_keys(links: &[Value], link_type: &str, direction: &str) -> Vec<String> {
    links
        .iter()
        .filter(|link| {
            link.pointer("/type/name").and_then(Value::as_str) == Some(link_type)
        })
        .filter_map(|link| {
            link.pointer(&format!("/{}/key", direction))
                .and_then(Value::as_str)
        })
        .map(ToString::to_string)
        .collect()
}

/// Sprints arrive either as objects or as the legacy
/// `...Sprint@1234[id=1,state=ACTIVE,name=Sprint 7,...]` toString blobs.
fn parse_sprints(value: Option<&Value>) -> Vec<Sprint> {
    let Some(entries) = value.and_then(Value::as_array) else {
        return vec![];
    };

    entries
        .iter()
        .filter_map(|entry| match entry {
            Value::String(blob) => parse_sprint_blob(blob),
            Value::Object(_) => Some(Sprint {
                name: entry
                    .get("name")
                    .and_then(Value::as_str)
                    .unwrap_or("Unknown")
                    .to_string(),
                state: entry
                    .get("state")
                    .and_then(Value::as_str)
                    .unwrap_or("Unknown")
                    .to_string(),
            }),
            _ => None,
        })
        .collect()
}

fn parse_sprint_blob(blob: &str) -> Option<Sprint> {
    let start = blob.find('[')?;
    let end = blob.rfind(']')?;
    let mut name = None;
    let mut state = None;
    for pair in blob[start + 1..end].split(',') {
        match pair.split_once('=') {
            Some(("name", v)) => name = Some(v.to_string()),
            Some(("state", v)) => state = Some(v.to_string()),
            _ => {}
        }
    }
    Some(Sprint {
        name: name.unwrap_or_else(|| "Unknown".to_string()),
        state: state.unwrap_or_else(|| "Unknown".to_string()),
    })
}

/// Normalize the tracker's `+0000`-offset timestamps to RFC-3339 UTC.
/// Malformed values pass through untouched.
fn normalize_issue_ts(raw: &str) -> String {
    DateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.3f%z")
        .map(|dt| {
            dt.with_timezone(&Utc)
                .to_rfc3339_opts(SecondsFormat::Secs, true)
        })
        .unwrap_or_else(|_| raw.to_string())
}
