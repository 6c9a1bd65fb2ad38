use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Well-known field keys in the revision feed's field bag.
///
/// The streaming request projects exactly `MINIMAL_PROJECTION` — long text
/// fields (descriptions, repro steps) repeat verbatim on every revision of
/// an entity and would multiply response size by revision count, so they
/// are never part of the stream. They are fetched per-entity later, and
/// only for entities a tracked identity actually touched.
pub mod field {
    pub const TITLE: &str = "title";
    pub const ITEM_TYPE: &str = "itemType";
    pub const STATE: &str = "state";
    pub const AREA: &str = "areaPath";
    pub const ASSIGNED_TO: &str = "assignedTo";
    pub const CHANGED_DATE: &str = "changedDate";
    pub const CHANGED_BY: &str = "changedBy";
    pub const LOGGED_EFFORT: &str = "loggedEffort";
    pub const REV: &str = "rev";
    pub const WATERMARK: &str = "watermark";

    pub const MINIMAL_PROJECTION: &[&str] = &[
        TITLE,
        ITEM_TYPE,
        STATE,
        AREA,
        ASSIGNED_TO,
        CHANGED_DATE,
        CHANGED_BY,
        LOGGED_EFFORT,
    ];

    /// Keys that change on every revision regardless of what the author
    /// did. Excluded from edit diffs.
    pub const BOOKKEEPING: &[&str] = &[REV, WATERMARK, CHANGED_DATE, CHANGED_BY];
}

/// One immutable snapshot of an entity's field values at a point in time.
///
/// `changed_at` is kept as the raw wire string; consumers parse on demand
/// and skip revisions whose timestamp does not parse rather than failing
/// the whole scan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Revision {
    pub entity_id: i64,
    pub sequence: i64,
    pub changed_at: String,
    pub changed_by: String,
    pub fields: Map<String, Value>,
}

impl Revision {
    pub fn parsed_changed_at(&self) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(&self.changed_at)
            .ok()
            .map(|dt| dt.with_timezone(&Utc))
    }

    pub fn field_str(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(|v| v.as_str())
    }

    pub fn field_f64(&self, key: &str) -> Option<f64> {
        self.fields.get(key).and_then(|v| v.as_f64())
    }

    pub fn state(&self) -> Option<&str> {
        self.field_str(field::STATE)
    }

    /// Assignee as display text. The feed sends either a plain string or a
    /// person object; both shapes collapse to one matchable string.
    pub fn assignee(&self) -> Option<String> {
        self.fields.get(field::ASSIGNED_TO).and_then(person_text)
    }

    /// Parses one item from the revision feed's `values` array. Returns
    /// `None` for shapes missing the id or revision number — the caller
    /// skips and counts those.
    pub fn from_wire(value: &Value) -> Option<Revision> {
        let entity_id = value.get("id").and_then(Value::as_i64)?;
        let sequence = value.get("rev").and_then(Value::as_i64)?;
        let fields = value
            .get("fields")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();
        let changed_at = fields
            .get(field::CHANGED_DATE)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let changed_by = fields
            .get(field::CHANGED_BY)
            .and_then(person_text)
            .unwrap_or_default();
        Some(Revision {
            entity_id,
            sequence,
            changed_at,
            changed_by,
            fields,
        })
    }
}

/// Collapses a person-shaped value (plain string, or an object carrying
/// `displayName`/`uniqueName`) into a single free-text string.
pub fn person_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Object(map) => {
            let name = map.get("displayName").and_then(Value::as_str);
            let unique = map.get("uniqueName").and_then(Value::as_str);
            match (name, unique) {
                (Some(n), Some(u)) => Some(format!("{n} <{u}>")),
                (Some(n), None) => Some(n.to_string()),
                (None, Some(u)) => Some(u.to_string()),
                (None, None) => None,
            }
        }
        _ => None,
    }
}
