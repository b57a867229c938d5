//! "Suggest a company" webhook client.

use std::time::Duration;

use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};
use thiserror::Error;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Suggestion {
    pub company_name: String,
    pub job_post_url: String,
    #[serde(default)]
    pub note: Option<String>,
}

#[derive(Debug, Error)]
pub enum SuggestError {
    #[error("suggestion webhook is not configured")]
    NotConfigured,
    #[error("invalid suggestion: {0}")]
    Invalid(&'static str),
    #[error("webhook request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("webhook answered http status {0}")]
    HttpStatus(u16),
}

/// Message text plus one embed, in the shape chat webhooks accept.
pub fn suggestion_payload(suggestion: &Suggestion, now: DateTime<Utc>) -> JsonValue {
    let note = suggestion
        .note
        .as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .unwrap_or("-");
    json!({
        "content": "New internship company suggestion",
        "embeds": [{
            "title": suggestion.company_name.trim(),
            "url": suggestion.job_post_url.trim(),
            "color": 0xA855F7,
            "fields": [
                { "name": "Company", "value": suggestion.company_name.trim(), "inline": true },
                { "name": "Job Post", "value": suggestion.job_post_url.trim(), "inline": false },
                { "name": "Senior's Note", "value": note, "inline": false },
            ],
            "footer": { "text": "interndex suggestion form" },
            "timestamp": now.to_rfc3339(),
        }],
    })
}

#[derive(Debug, Clone)]
pub struct WebhookClient {
    client: reqwest::Client,
    url: Option<String>,
}

impl WebhookClient {
    pub fn new(url: Option<String>, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("building webhook client")?;
        let url = url.map(|u| u.trim().to_string()).filter(|u| !u.is_empty());
        Ok(Self { client, url })
    }

    pub fn is_configured(&self) -> bool {
        self.url.is_some()
    }

    /// One POST, no retry. Validation and configuration are checked before any I/O.
    pub async fn send_suggestion(
        &self,
        suggestion: &Suggestion,
        now: DateTime<Utc>,
    ) -> Result<(), SuggestError> {
        let url = self.url.as_deref().ok_or(SuggestError::NotConfigured)?;
        if suggestion.company_name.trim().is_empty() {
            return Err(SuggestError::Invalid("company name is required"));
        }
        if suggestion.job_post_url.trim().is_empty() {
            return Err(SuggestError::Invalid("job post url is required"));
        }

        let resp = self
            .client
            .post(url)
            .json(&suggestion_payload(suggestion, now))
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(SuggestError::HttpStatus(status.as_u16()));
        }
        info!(company = suggestion.company_name.trim(), "suggestion delivered");
        Ok(())
    }
}
