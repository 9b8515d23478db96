// src/widget/client.rs
use std::time::Duration;

use serde::Deserialize;

use crate::model::SubmissionPayload;

/// Outcome of a successful submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitReceipt {
    pub id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SubmitError {
    /// The endpoint could not be reached.
    #[error("network failure: {0}")]
    Network(String),
    /// The endpoint answered but did not accept the response.
    #[error("HTTP {status}: {message}")]
    Rejected { status: u16, message: String },
}

/// Transport used by the widget to reach the ingestion endpoint.
#[async_trait::async_trait]
pub trait SubmissionClient: Send + Sync {
    async fn submit(
        &self,
        api_key: &str,
        payload: &SubmissionPayload,
    ) -> Result<SubmitReceipt, SubmitError>;
}

#[derive(Debug, Deserialize)]
struct WireReply {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// `reqwest` client posting JSON with `Authorization: Bearer <apiKey>`.
#[derive(Debug, Clone)]
pub struct HttpSubmissionClient {
    http: reqwest::Client,
    endpoint: String,
}

impl HttpSubmissionClient {
    pub fn new(endpoint: impl Into<String>) -> Result<Self, SubmitError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| SubmitError::Network(e.to_string()))?;
        Ok(Self {
            http,
            endpoint: endpoint.into(),
        })
    }
}

#[async_trait::async_trait]
impl SubmissionClient for HttpSubmissionClient {
    async fn submit(
        &self,
        api_key: &str,
        payload: &SubmissionPayload,
    ) -> Result<SubmitReceipt, SubmitError> {
        let resp = self
            .http
            .post(&self.endpoint)
            .bearer_auth(api_key)
            .json(payload)
            .send()
            .await
            .map_err(|e| SubmitError::Network(e.to_string()))?;

        let status = resp.status();
        let body = resp
            .bytes()
            .await
            .map_err(|e| SubmitError::Network(e.to_string()))?;
        interpret_reply(status.as_u16(), &body)
    }
}

/// 2xx with `success: true` and an id is a receipt; anything else a rejection.
pub fn interpret_reply(status: u16, body: &[u8]) -> Result<SubmitReceipt, SubmitError> {
    let reply: Option<WireReply> = serde_json::from_slice(body).ok();
    match reply {
        Some(WireReply {
            success: true,
            id: Some(id),
            ..
        }) if (200..300).contains(&status) => Ok(SubmitReceipt { id }),
        Some(r) => Err(SubmitError::Rejected {
            status,
            message: r.error.unwrap_or_else(|| "response not accepted".to_string()),
        }),
        None => Err(SubmitError::Rejected {
            status,
            message: "unreadable response body".to_string(),
        }),
    }
}
