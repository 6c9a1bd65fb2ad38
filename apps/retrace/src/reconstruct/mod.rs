//! Activity reconstruction pipeline.
//!
//! Flow: stream revisions → freeze store → diff → comment enrichment +
//! parent resolution over the relevant set → peer aggregation → merge.
//!
//! One streamed pass over the organization's revision history replaces a
//! per-entity history call for every tracked item; everything after the
//! fetch is local recomputation. The run always yields a report from
//! whatever was gathered — only a failed first page aborts.

pub mod diff;
pub mod enrich;
pub mod fetch;
pub mod peers;
pub mod relations;
pub mod store;

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::models::activity::{ActivityEvent, PeerMetric};
use crate::models::roster::Roster;
use crate::reconstruct::relations::ParentRef;
use crate::reconstruct::store::RevisionStore;
use crate::sources::{CommentSource, RelationSource, RevisionSource, SourceError};

/// The three collaborator services a run needs, as trait objects so tests
/// and alternative backends can substitute their own.
pub struct PipelineSources<'a> {
    pub revisions: &'a dyn RevisionSource,
    pub comments: &'a dyn CommentSource,
    pub relations: &'a dyn RelationSource,
}

/// Skip/error counters surfaced in the final summary. Partial failures are
/// warnings plus counters here, never a hard process failure.
#[derive(Debug, Default, Clone)]
pub struct RunSummary {
    pub pages_fetched: u32,
    pub revisions_ingested: u64,
    pub pagination_stopped_early: bool,
    pub entities_scanned: usize,
    pub relevant_entities: usize,
    pub malformed_revisions_skipped: u64,
    pub comment_fetch_failures: u64,
    pub relation_batch_failures: u64,
}

#[derive(Debug, Default)]
pub struct ReconstructionReport {
    pub activities: Vec<ActivityEvent>,
    pub peer_metrics: Vec<PeerMetric>,
    pub parents: HashMap<i64, ParentRef>,
    pub summary: RunSummary,
}

pub async fn run(
    sources: PipelineSources<'_>,
    roster: &Roster,
    cutoff: DateTime<Utc>,
) -> Result<ReconstructionReport, SourceError> {
    // Step 1: stream the full revision history into the store.
    let mut store = RevisionStore::new();
    let fetch = fetch::stream_revisions(sources.revisions, &mut store, cutoff).await?;
    info!(
        "streamed {} revisions across {} pages{}",
        fetch.revisions,
        fetch.pages,
        if fetch.stopped_early {
            " (stopped early)"
        } else {
            ""
        }
    );

    // Step 2: freeze. No reader may start before this.
    store.finalize();
    info!(
        "store finalized: {} entities, {} revisions",
        store.entity_count(),
        store.revision_count()
    );

    // Step 3: local diff over the frozen store.
    let diffed = diff::reconstruct_activity(&store, &roster.tracked, cutoff);
    info!(
        "diff produced {} activities over {} relevant entities",
        diffed.activities.len(),
        diffed.relevant.len()
    );
    if diffed.malformed_skipped > 0 {
        warn!("skipped {} malformed revisions", diffed.malformed_skipped);
    }

    // Step 4: relevance-gated enrichment — comments, then parent links.
    let enriched = enrich::enrich_comments(
        sources.comments,
        &store,
        &diffed.relevant,
        &roster.tracked,
        cutoff,
    )
    .await;
    info!(
        "enrichment added {} comment/mention activities ({} fetch failures)",
        enriched.activities.len(),
        enriched.fetch_failures
    );

    let resolved = relations::resolve_parents(sources.relations, &diffed.relevant).await;
    info!(
        "resolved parents for {} of {} relevant entities",
        resolved.parents.len(),
        diffed.relevant.len()
    );

    // Step 5: peer aggregation — rides the same store, ungated by relevance.
    let peer_metrics = peers::aggregate_peers(&store, &roster.peers, cutoff);
    info!("{} peers with observed activity", peer_metrics.len());

    // Step 6: merge. Ordering is a presentation concern left to the sink.
    let mut activities = diffed.activities;
    activities.extend(enriched.activities);

    let summary = RunSummary {
        pages_fetched: fetch.pages,
        revisions_ingested: fetch.revisions,
        pagination_stopped_early: fetch.stopped_early,
        entities_scanned: store.entity_count(),
        relevant_entities: diffed.relevant.len(),
        malformed_revisions_skipped: diffed.malformed_skipped,
        comment_fetch_failures: enriched.fetch_failures,
        relation_batch_failures: resolved.batch_failures,
    };

    Ok(ReconstructionReport {
        activities,
        peer_metrics,
        parents: resolved.parents,
        summary,
    })
}
