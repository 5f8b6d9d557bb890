//! HTTP clients for the record services.
//!
//! Every record service speaks the same shape of API, so a single client type
//! covers all four. The resource it talks to only changes which record type is
//! decoded and how a delete is addressed.

use crate::channels::{Operation, WriteIntent};
use crate::config::DownstreamConfig;
use crate::errors::{CompositeError, Result};
use crate::types::{DependencyClass, Post, PostId, ResourceKind};
use async_trait::async_trait;
use reqwest::{Response, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::time::Duration;
use url::Url;

/// Latency and fault injection parameters forwarded to the critical read.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FetchHints {
    pub timeout_hint_sec: u32,
    pub fault_inject_percent: u32,
}

/// Read access to the critical record.
#[async_trait]
pub trait CriticalClient: Send + Sync {
    async fn fetch_one(&self, post_id: PostId, hints: FetchHints) -> Result<Post>;
}

/// Read access to an optional sub-resource collection.
#[async_trait]
pub trait OptionalClient<T>: Send + Sync {
    async fn fetch_many(&self, post_id: PostId) -> Result<Vec<T>>;
}

/// Applies a write intent to the record service that owns it.
#[async_trait]
pub trait WriteTarget: Send + Sync {
    async fn apply(&self, intent: &WriteIntent) -> Result<()>;
}

/// Error body returned by the record services.
#[derive(Deserialize)]
struct HttpErrorInfo {
    message: String,
}

#[derive(Clone, Debug)]
pub struct HttpRecordClient {
    kind: ResourceKind,
    client: reqwest::Client,
    url: Url,
}

impl HttpRecordClient {
    pub fn new(kind: ResourceKind, config: &DownstreamConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.http_timeout_secs))
            .build()?;

        Ok(Self {
            kind,
            client,
            url: config.url.clone(),
        })
    }

    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    fn record_url(&self, post_id: PostId) -> String {
        format!("{}/{}", self.url.as_str().trim_end_matches('/'), post_id)
    }

    /// Maps a non-success response into the error taxonomy. 404 and 422 keep
    /// the downstream message, anything else means the service is unhealthy.
    async fn error_from_response(&self, response: Response) -> CompositeError {
        let status = response.status();
        match status {
            StatusCode::NOT_FOUND => CompositeError::NotFound(error_message(response).await),
            StatusCode::UNPROCESSABLE_ENTITY => {
                CompositeError::InvalidInput(error_message(response).await)
            }
            _ => {
                tracing::warn!(resource = %self.kind, %status, "Unexpected HTTP status from record service");
                CompositeError::DependencyUnavailable(format!(
                    "{} service responded with {status}",
                    self.kind
                ))
            }
        }
    }
}

async fn error_message(response: Response) -> String {
    let status = response.status();
    match response.text().await {
        Ok(body) => serde_json::from_str::<HttpErrorInfo>(&body)
            .map(|info| info.message)
            .unwrap_or(body),
        Err(_) => status.to_string(),
    }
}

#[async_trait]
impl CriticalClient for HttpRecordClient {
    async fn fetch_one(&self, post_id: PostId, hints: FetchHints) -> Result<Post> {
        let url = self.record_url(post_id);
        tracing::debug!(%url, ?hints, "Fetching critical record");

        let response = self
            .client
            .get(&url)
            .query(&[
                ("timeoutHintSec", hints.timeout_hint_sec),
                ("faultInjectPercent", hints.fault_inject_percent),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(self.error_from_response(response).await);
        }
        Ok(response.json::<Post>().await?)
    }
}

#[async_trait]
impl<T> OptionalClient<T> for HttpRecordClient
where
    T: DeserializeOwned + Send + 'static,
{
    async fn fetch_many(&self, post_id: PostId) -> Result<Vec<T>> {
        tracing::debug!(url = %self.url, post_id, "Fetching {} records", self.kind);

        let response = self
            .client
            .get(self.url.clone())
            .query(&[("postId", post_id)])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(self.error_from_response(response).await);
        }
        Ok(response.json::<Vec<T>>().await?)
    }
}

#[async_trait]
impl WriteTarget for HttpRecordClient {
    async fn apply(&self, intent: &WriteIntent) -> Result<()> {
        let request = match (intent.operation, &intent.payload) {
            (Operation::Create, Some(payload)) => self.client.post(self.url.clone()).json(payload),
            (Operation::Create, None) => {
                return Err(CompositeError::InvalidInput(format!(
                    "Create intent for {} without payload",
                    self.kind
                )));
            }
            // The critical service addresses its single record by path, the
            // collections delete everything attached to the post.
            (Operation::Delete, _) => match self.kind.class() {
                DependencyClass::Critical => self.client.delete(self.record_url(intent.key)),
                DependencyClass::Optional => self
                    .client
                    .delete(self.url.clone())
                    .query(&[("postId", intent.key)]),
            },
        };

        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(self.error_from_response(response).await);
        }
        Ok(())
    }
}
