use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What a tracked identity did to an entity at one point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    Edit,
    StateTransition,
    Assignment,
    Comment,
    Mention,
}

/// Heuristic tone of a third-party mention. Best-effort keyword
/// classification, lossy by design.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MentionTone {
    Actionable,
    Fyi,
    Discussion,
}

/// Entity descriptors captured alongside an event so the report never has
/// to re-fetch "current" title/type/state/area.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EntitySnapshot {
    pub title: String,
    pub item_type: String,
    pub state: String,
    pub area: String,
}

/// One reconstructed activity record. Produced by the diff engine or the
/// enrichment pass; read-only afterward.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityEvent {
    pub identity: String,
    pub timestamp: DateTime<Utc>,
    pub entity_id: i64,
    pub snapshot: EntitySnapshot,
    pub kind: ActivityKind,
    pub detail: String,
    pub actor: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mention_tone: Option<MentionTone>,
}

/// Aggregate counters for one person in the comparison roster, computed in
/// a single pass over the revision store. Peers with zero observed
/// activity are never materialized.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerMetric {
    pub identity: String,
    pub total_activities: u64,
    pub entities_touched: u64,
    pub days_active: u64,
    pub state_transitions: u64,
    pub entities_closed: u64,
    pub logged_effort_sum: f64,
}
