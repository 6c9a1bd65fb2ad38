#![allow(dead_code)]

//! Track Client — the single point of entry for all work-tracking API
//! calls in Retrace.
//!
//! ARCHITECTURAL RULE: no other module may issue HTTP directly. The
//! pipeline sees only the source traits; this module implements them
//! against the tracking service's REST surface.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde_json::Value;
use tracing::{debug, warn};

use crate::models::revision::{field, person_text, Revision};
use crate::sources::{
    Comment, CommentSource, Relation, RelationSource, RevisionBatch, RevisionSource, SourceError,
};

const HTTP_TIMEOUT_SECS: u64 = 120;
const MAX_RETRIES: u32 = 3;

/// Explicit replacement for a hidden module-level cached client: connection
/// reuse is keyed by endpoint + credentials and invalidated by the owner,
/// never behind the caller's back.
#[derive(Default)]
pub struct ConnectionCache {
    clients: HashMap<(String, String), Client>,
}

impl ConnectionCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the pooled client for this endpoint + token pair, building
    /// one on first use. `reqwest::Client` is cheaply cloneable; clones
    /// share the same connection pool.
    pub fn client_for(&mut self, base_url: &str, token: &str) -> Client {
        self.clients
            .entry((base_url.to_string(), token.to_string()))
            .or_insert_with(|| {
                Client::builder()
                    .timeout(std::time::Duration::from_secs(HTTP_TIMEOUT_SECS))
                    .build()
                    .expect("Failed to build HTTP client")
            })
            .clone()
    }

    pub fn invalidate(&mut self, base_url: &str, token: &str) {
        self.clients
            .remove(&(base_url.to_string(), token.to_string()));
    }
}

/// HTTP client for the tracking service. Cheap to clone; all three source
/// traits are implemented on it.
#[derive(Clone)]
pub struct TrackClient {
    http: Client,
    base_url: String,
    token: String,
}

impl TrackClient {
    pub fn new(cache: &mut ConnectionCache, base_url: &str, token: &str) -> Self {
        Self {
            http: cache.client_for(base_url, token),
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
        }
    }

    /// GET with bearer auth and retry on 429/5xx with exponential backoff.
    async fn get_json(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<Value, SourceError> {
        let url = format!("{}/{}", self.base_url, path);
        let mut last_error: Option<SourceError> = None;

        for attempt in 0..MAX_RETRIES {
            if attempt > 0 {
                // Exponential backoff: 1s, 2s.
                let delay = std::time::Duration::from_millis(1000 * (1 << (attempt - 1)));
                warn!(
                    "request to {path} attempt {attempt} failed, retrying after {}ms...",
                    delay.as_millis()
                );
                tokio::time::sleep(delay).await;
            }

            let response = self
                .http
                .get(&url)
                .bearer_auth(&self.token)
                .query(query)
                .send()
                .await;

            let response = match response {
                Ok(r) => r,
                Err(e) => {
                    last_error = Some(SourceError::Http(e));
                    continue;
                }
            };

            let status = response.status();

            if status.as_u16() == 429 || status.is_server_error() {
                let body = response.text().await.unwrap_or_default();
                warn!("tracking API returned {status}: {body}");
                last_error = Some(SourceError::Api {
                    status: status.as_u16(),
                    message: body,
                });
                continue;
            }

            if !status.is_success() {
                let message = response.text().await.unwrap_or_default();
                return Err(SourceError::Api {
                    status: status.as_u16(),
                    message,
                });
            }

            return Ok(response.json::<Value>().await?);
        }

        Err(last_error.unwrap_or(SourceError::RateLimited {
            retries: MAX_RETRIES,
        }))
    }
}

#[async_trait]
impl RevisionSource for TrackClient {
    async fn revisions_page(
        &self,
        since: DateTime<Utc>,
        continuation_token: Option<&str>,
    ) -> Result<RevisionBatch, SourceError> {
        let mut query: Vec<(&str, String)> = vec![
            ("since", since.to_rfc3339()),
            ("fields", field::MINIMAL_PROJECTION.join(",")),
        ];
        if let Some(token) = continuation_token {
            query.push(("continuationToken", token.to_string()));
        }

        let body = self.get_json("revisions", &query).await?;

        let values = body
            .get("values")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        let mut revisions = Vec::with_capacity(values.len());
        let mut skipped = 0usize;
        for value in &values {
            match Revision::from_wire(value) {
                Some(rev) => revisions.push(rev),
                None => skipped += 1,
            }
        }
        if skipped > 0 {
            debug!("revision page: {skipped} malformed items dropped");
        }

        Ok(RevisionBatch {
            revisions,
            continuation_token: body
                .get("continuationToken")
                .and_then(Value::as_str)
                .map(str::to_string),
            is_last: body
                .get("isLastBatch")
                .and_then(Value::as_bool)
                .unwrap_or(false),
        })
    }
}

#[async_trait]
impl CommentSource for TrackClient {
    async fn comments(&self, entity_id: i64) -> Result<Vec<Comment>, SourceError> {
        let body = self
            .get_json(&format!("entities/{entity_id}/comments"), &[])
            .await?;

        Ok(body
            .get("values")
            .and_then(Value::as_array)
            .map(|values| {
                values
                    .iter()
                    .filter_map(|v| {
                        Some(Comment {
                            author: v.get("author").and_then(person_text)?,
                            text: v.get("text").and_then(Value::as_str)?.to_string(),
                            created_at: v
                                .get("createdAt")
                                .and_then(Value::as_str)
                                .unwrap_or_default()
                                .to_string(),
                        })
                    })
                    .collect()
            })
            .unwrap_or_default())
    }
}

#[async_trait]
impl RelationSource for TrackClient {
    async fn relations(&self, entity_id: i64) -> Result<Vec<Relation>, SourceError> {
        let body = self
            .get_json(&format!("entities/{entity_id}/relations"), &[])
            .await?;

        Ok(body
            .get("values")
            .and_then(Value::as_array)
            .map(|values| {
                values
                    .iter()
                    .filter_map(|v| {
                        Some(Relation {
                            kind: v.get("kind").and_then(Value::as_str)?.to_string(),
                            target_id: v.get("targetId").and_then(Value::as_i64)?,
                        })
                    })
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn titles(&self, entity_ids: &[i64]) -> Result<HashMap<i64, String>, SourceError> {
        let ids = entity_ids
            .iter()
            .map(i64::to_string)
            .collect::<Vec<_>>()
            .join(",");
        let body = self
            .get_json("entities/titles", &[("ids", ids)])
            .await?;

        Ok(body
            .get("values")
            .and_then(Value::as_array)
            .map(|values| {
                values
                    .iter()
                    .filter_map(|v| {
                        Some((
                            v.get("id").and_then(Value::as_i64)?,
                            v.get("title").and_then(Value::as_str)?.to_string(),
                        ))
                    })
                    .collect()
            })
            .unwrap_or_default())
    }
}
