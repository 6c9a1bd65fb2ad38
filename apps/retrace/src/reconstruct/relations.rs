//! Two-phase parent resolution for the relevant entity set.
//!
//! Phase 1 walks relation links in bounded-concurrency batches to discover
//! parent ids; phase 2 title-batches the deduplicated parent set (a parent
//! shared by many children is fetched once). Failed fetches are logged,
//! counted, and skipped — partial results stand.

use std::collections::{BTreeSet, HashMap};

use futures::future::join_all;
use tracing::{debug, warn};

use crate::sources::RelationSource;

/// Concurrent link fetches per phase-1 batch.
const LINK_BATCH: usize = 20;
/// Ids per phase-2 title lookup request.
const TITLE_BATCH: usize = 200;

const PARENT_KIND: &str = "parent";

#[derive(Debug, Clone)]
pub struct ParentRef {
    pub parent_id: i64,
    pub parent_title: String,
}

#[derive(Debug, Default)]
pub struct RelationOutcome {
    pub parents: HashMap<i64, ParentRef>,
    pub batch_failures: u64,
}

pub async fn resolve_parents(
    source: &dyn RelationSource,
    entity_ids: &BTreeSet<i64>,
) -> RelationOutcome {
    let ids: Vec<i64> = entity_ids.iter().copied().collect();
    let mut outcome = RelationOutcome::default();

    // Phase 1: entity → parent id.
    let mut parent_of: HashMap<i64, i64> = HashMap::new();
    for batch in ids.chunks(LINK_BATCH) {
        let fetches = batch.iter().map(|&entity_id| async move {
            (entity_id, source.relations(entity_id).await)
        });
        for (entity_id, result) in join_all(fetches).await {
            match result {
                Ok(relations) => {
                    if let Some(parent) = relations
                        .iter()
                        .find(|r| r.kind.eq_ignore_ascii_case(PARENT_KIND))
                    {
                        parent_of.insert(entity_id, parent.target_id);
                    }
                }
                Err(e) => {
                    warn!("relation fetch for entity {entity_id} failed, skipping: {e}");
                    outcome.batch_failures += 1;
                }
            }
        }
    }

    if parent_of.is_empty() {
        debug!("no parent links discovered, skipping title resolution");
        return outcome;
    }

    // Phase 2: dedupe parent ids, then batch-resolve titles.
    let distinct: Vec<i64> = parent_of
        .values()
        .copied()
        .collect::<BTreeSet<i64>>()
        .into_iter()
        .collect();
    let mut titles: HashMap<i64, String> = HashMap::new();
    for batch in distinct.chunks(TITLE_BATCH) {
        match source.titles(batch).await {
            Ok(resolved) => titles.extend(resolved),
            Err(e) => {
                warn!("title batch of {} parents failed, skipping: {e}", batch.len());
                outcome.batch_failures += 1;
            }
        }
    }

    outcome.parents = parent_of
        .into_iter()
        .map(|(entity_id, parent_id)| {
            let parent_title = titles
                .get(&parent_id)
                .cloned()
                .unwrap_or_else(|| "(unknown)".to_string());
            (
                entity_id,
                ParentRef {
                    parent_id,
                    parent_title,
                },
            )
        })
        .collect();

    outcome
}
