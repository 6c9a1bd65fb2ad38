//! Report sinks — presentation only. Sorting happens here, not in the
//! pipeline.

pub mod csv;
pub mod markdown;

use crate::models::activity::{ActivityEvent, ActivityKind};

pub fn kind_label(kind: ActivityKind) -> &'static str {
    match kind {
        ActivityKind::Edit => "edit",
        ActivityKind::StateTransition => "state",
        ActivityKind::Assignment => "assignment",
        ActivityKind::Comment => "comment",
        ActivityKind::Mention => "mention",
    }
}

/// Chronological copy of the merged activity list. Ties break on entity id
/// so output is stable across runs.
pub fn sorted_activities(activities: &[ActivityEvent]) -> Vec<&ActivityEvent> {
    let mut sorted: Vec<&ActivityEvent> = activities.iter().collect();
    sorted.sort_by(|a, b| {
        a.timestamp
            .cmp(&b.timestamp)
            .then(a.entity_id.cmp(&b.entity_id))
    });
    sorted
}
