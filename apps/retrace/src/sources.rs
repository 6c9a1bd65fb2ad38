//! Collaborator contracts — the three services the pipeline consumes.
//!
//! Each is a trait so the HTTP implementation in `track_client` can be
//! swapped for in-memory fakes in tests, the same way `AppState` would hold
//! a `dyn` scorer. The pipeline only ever sees these traits.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::models::revision::Revision;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("JSON decode error: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Rate limited after {retries} retries")]
    RateLimited { retries: u32 },
}

/// One page of the organization-wide revision feed.
#[derive(Debug, Clone, Default)]
pub struct RevisionBatch {
    pub revisions: Vec<Revision>,
    pub continuation_token: Option<String>,
    pub is_last: bool,
}

/// A free-text comment on an entity. `created_at` stays raw; unparseable
/// timestamps skip the comment, not the batch.
#[derive(Debug, Clone)]
pub struct Comment {
    pub author: String,
    pub text: String,
    pub created_at: String,
}

/// A typed link from one entity to another.
#[derive(Debug, Clone)]
pub struct Relation {
    pub kind: String,
    pub target_id: i64,
}

/// Paginated revision feed. Pages are requested one at a time; the
/// continuation token from each response feeds the next request.
#[async_trait]
pub trait RevisionSource: Send + Sync {
    async fn revisions_page(
        &self,
        since: DateTime<Utc>,
        continuation_token: Option<&str>,
    ) -> Result<RevisionBatch, SourceError>;
}

/// Per-entity comment feed, fetched only for relevant entities.
#[async_trait]
pub trait CommentSource: Send + Sync {
    async fn comments(&self, entity_id: i64) -> Result<Vec<Comment>, SourceError>;
}

/// Relation links plus a batch title lookup for resolved parents.
#[async_trait]
pub trait RelationSource: Send + Sync {
    async fn relations(&self, entity_id: i64) -> Result<Vec<Relation>, SourceError>;

    async fn titles(&self, entity_ids: &[i64]) -> Result<HashMap<i64, String>, SourceError>;
}
