//! Streaming revision ingestion — follows server-issued continuation
//! tokens one page at a time, appending every revision into the store as
//! it arrives so peak memory stays near one page beyond the accumulating
//! store.
//!
//! Degrade-gracefully policy: a timeout or a transport error mid-stream
//! ends pagination with whatever was already ingested. A stalled page
//! means the stream endpoint is unhealthy, so the whole pagination stops
//! rather than retrying that page. Only a failed *first* page (non-timeout)
//! aborts the run — at that point there is nothing to report on.

use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::reconstruct::store::RevisionStore;
use crate::sources::{RevisionSource, SourceError};

const PAGE_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Default)]
pub struct FetchOutcome {
    pub pages: u32,
    pub revisions: u64,
    pub stopped_early: bool,
}

pub async fn stream_revisions(
    source: &dyn RevisionSource,
    store: &mut RevisionStore,
    since: DateTime<Utc>,
) -> Result<FetchOutcome, SourceError> {
    let mut outcome = FetchOutcome::default();
    let mut token: Option<String> = None;

    loop {
        let page = timeout(PAGE_TIMEOUT, source.revisions_page(since, token.as_deref())).await;

        let batch = match page {
            Err(_) => {
                warn!(
                    "revision page {} timed out after {}s, stopping pagination with {} revisions",
                    outcome.pages + 1,
                    PAGE_TIMEOUT.as_secs(),
                    outcome.revisions
                );
                outcome.stopped_early = true;
                break;
            }
            Ok(Err(e)) if outcome.pages == 0 => return Err(e),
            Ok(Err(e)) => {
                warn!(
                    "revision page {} failed ({e}), stopping pagination with {} revisions",
                    outcome.pages + 1,
                    outcome.revisions
                );
                outcome.stopped_early = true;
                break;
            }
            Ok(Ok(batch)) => batch,
        };

        outcome.pages += 1;
        outcome.revisions += batch.revisions.len() as u64;
        debug!(
            "page {}: {} revisions, token={:?}",
            outcome.pages,
            batch.revisions.len(),
            batch.continuation_token.is_some()
        );

        let page_was_empty = batch.revisions.is_empty();
        for revision in batch.revisions {
            store.append(revision);
        }

        match batch.continuation_token {
            None => break,
            Some(_) if batch.is_last => break,
            Some(next) => {
                // An empty page that still carries a token is an anomalous
                // server signal — stop instead of looping on it.
                if page_was_empty {
                    warn!("empty page with continuation token, stopping pagination");
                    outcome.stopped_early = true;
                    break;
                }
                token = Some(next);
            }
        }
    }

    Ok(outcome)
}
