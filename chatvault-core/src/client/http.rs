//! HTTP client for the Slack-shaped chat API
//!
//! Thin transport: builds authenticated requests, maps HTTP statuses and
//! envelope error codes onto the error taxonomy, and normalizes cursor
//! pagination. Retry policy belongs to callers; this layer never retries.

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, RETRY_AFTER};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::config::ChatCredentials;
use crate::error::{Error, Result};
use crate::types::ChatUser;

use super::{ChatApi, Page, RawMessage};

/// Default API root
pub const DEFAULT_BASE_URL: &str = "https://slack.com/api";

/// Per-request timeout
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Page size for history/replies listings
const PAGE_LIMIT: &str = "1000";

/// HTTP implementation of [`ChatApi`].
pub struct HttpChatClient {
    http: reqwest::Client,
    base_url: String,
}

impl HttpChatClient {
    /// Build a client from resolved credentials.
    ///
    /// The token kind (user vs bot) is recorded in the log only; request
    /// behavior does not differ.
    pub fn new(credentials: &ChatCredentials) -> Result<Self> {
        let mut headers = HeaderMap::new();
        let auth_value = format!("Bearer {}", credentials.token);
        let mut auth_header = HeaderValue::from_str(&auth_value)
            .map_err(|e| Error::Config(format!("invalid chat token: {}", e)))?;
        auth_header.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth_header);

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .default_headers(headers)
            .build()
            .map_err(|e| Error::Config(format!("failed to create HTTP client: {}", e)))?;

        tracing::info!(
            token_kind = credentials.kind.as_str(),
            "Chat API client initialized"
        );

        Ok(Self {
            http,
            base_url: DEFAULT_BASE_URL.to_string(),
        })
    }

    /// Point the client at a different API root (tests, proxies).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        params: &[(&str, &str)],
    ) -> Result<T> {
        let url = format!("{}/{}", self.base_url, method);
        let response = self.http.get(&url).query(params).send().await?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse().ok());
            return Err(status_error(method, status, retry_after));
        }

        let body = response.text().await?;
        serde_json::from_str(&body).map_err(Error::from)
    }

    fn envelope_error(&self, method: &str, code: Option<String>) -> Error {
        let code = code.unwrap_or_else(|| "unknown_error".to_string());
        match code.as_str() {
            c if c.ends_with("_not_found") => {
                Error::NotFound(format!("{}: {}", method, code))
            }
            "invalid_auth" | "not_authed" | "account_inactive" | "token_revoked"
            | "missing_scope" => Error::Auth(format!("{}: {}", method, code)),
            "ratelimited" | "rate_limited" => Error::Retryable {
                message: format!("{}: {}", method, code),
                retry_after: None,
            },
            _ => Error::Api(format!("{}: {}", method, code)),
        }
    }
}

/// Map a non-2xx HTTP status onto the error taxonomy.
pub(crate) fn status_error(method: &str, status: StatusCode, retry_after: Option<u64>) -> Error {
    match status {
        StatusCode::TOO_MANY_REQUESTS => Error::Retryable {
            message: format!("{}: HTTP 429", method),
            retry_after,
        },
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            Error::Auth(format!("{}: HTTP {}", method, status.as_u16()))
        }
        StatusCode::NOT_FOUND => Error::NotFound(format!("{}: HTTP 404", method)),
        s if s.is_server_error() => Error::Retryable {
            message: format!("{}: HTTP {}", method, s.as_u16()),
            retry_after,
        },
        s => Error::Api(format!("{}: HTTP {}", method, s.as_u16())),
    }
}

/// Envelope shared by `conversations.history` and `conversations.replies`
#[derive(Debug, Deserialize)]
struct HistoryEnvelope {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    messages: Vec<RawMessage>,
    #[serde(default)]
    response_metadata: Option<ResponseMetadata>,
}

#[derive(Debug, Deserialize, Default)]
struct ResponseMetadata {
    #[serde(default)]
    next_cursor: Option<String>,
}

impl HistoryEnvelope {
    /// The platform signals "no more pages" with an empty cursor string.
    fn next_cursor(&self) -> Option<String> {
        self.response_metadata
            .as_ref()
            .and_then(|m| m.next_cursor.as_deref())
            .filter(|c| !c.is_empty())
            .map(ToString::to_string)
    }
}

/// Envelope for `users.info`
#[derive(Debug, Deserialize)]
struct UserEnvelope {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
    user: Option<RawUser>,
}

#[derive(Debug, Deserialize)]
struct RawUser {
    id: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    real_name: Option<String>,
    #[serde(default)]
    is_bot: bool,
    #[serde(default)]
    profile: RawUserProfile,
}

#[derive(Debug, Deserialize, Default)]
struct RawUserProfile {
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    email: Option<String>,
}

impl From<RawUser> for ChatUser {
    fn from(raw: RawUser) -> Self {
        ChatUser {
            id: raw.id,
            name: raw.name,
            real_name: raw.real_name,
            display_name: raw.profile.display_name.filter(|s| !s.is_empty()),
            email: raw.profile.email,
            is_bot: raw.is_bot,
        }
    }
}

impl ChatApi for HttpChatClient {
    async fn history(
        &self,
        channel_id: &str,
        oldest: &str,
        latest: &str,
        cursor: Option<&str>,
    ) -> Result<Page> {
        let mut params = vec![
            ("channel", channel_id),
            ("oldest", oldest),
            ("latest", latest),
            ("limit", PAGE_LIMIT),
        ];
        if let Some(cursor) = cursor {
            params.push(("cursor", cursor));
        }

        let envelope: HistoryEnvelope = self.call("conversations.history", &params).await?;
        if !envelope.ok {
            return Err(self.envelope_error("conversations.history", envelope.error));
        }

        Ok(Page {
            next_cursor: envelope.next_cursor(),
            messages: envelope.messages,
        })
    }

    async fn replies(
        &self,
        channel_id: &str,
        thread_ts: &str,
        cursor: Option<&str>,
    ) -> Result<Page> {
        let mut params = vec![
            ("channel", channel_id),
            ("ts", thread_ts),
            ("limit", PAGE_LIMIT),
        ];
        if let Some(cursor) = cursor {
            params.push(("cursor", cursor));
        }

        let envelope: HistoryEnvelope = self.call("conversations.replies", &params).await?;
        if !envelope.ok {
            return Err(self.envelope_error("conversations.replies", envelope.error));
        }

        Ok(Page {
            next_cursor: envelope.next_cursor(),
            messages: envelope.messages,
        })
    }

    async fn user(&self, user_id: &str) -> Result<ChatUser> {
        let params = [("user", user_id)];
        let envelope: UserEnvelope = self.call("users.info", &params).await?;
        if !envelope.ok {
            return Err(self.envelope_error("users.info", envelope.error));
        }

        envelope
            .user
            .map(ChatUser::from)
            .ok_or_else(|| Error::Api("users.info: empty user payload".to_string()))
    }
}
