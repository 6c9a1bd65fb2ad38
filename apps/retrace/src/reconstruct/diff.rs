//! Local diff engine — turns each entity's ordered revision list into
//! attributed activity events by comparing consecutive field snapshots.
//!
//! Per revision pair, per tracked identity:
//! - actor match + predecessor → field diff: state changes become
//!   `StateTransition`, everything else collapses into one `Edit` listing
//!   the changed keys; first revision in the window becomes a generic
//!   touch `Edit`.
//! - independent of who authored the revision: an assignee change whose
//!   new value matches the identity becomes an `Assignment` credited to
//!   that identity, with the revision's author as the assigner.
//!
//! A malformed revision (unparseable or sentinel far-future date) is
//! skipped and counted; it never aborts the entity's scan.

use std::collections::BTreeSet;

use chrono::{DateTime, Duration, Utc};
use serde_json::Value;

use crate::models::activity::{ActivityEvent, ActivityKind, EntitySnapshot};
use crate::models::identity::Identity;
use crate::models::revision::{field, Revision};
use crate::reconstruct::store::RevisionStore;

/// Timestamps beyond now + this slack are placeholder/sentinel dates.
const FUTURE_SLACK_DAYS: i64 = 1;

#[derive(Debug, Default)]
pub struct DiffOutcome {
    pub activities: Vec<ActivityEvent>,
    pub relevant: BTreeSet<i64>,
    pub malformed_skipped: u64,
}

pub fn reconstruct_activity(
    store: &RevisionStore,
    identities: &[Identity],
    cutoff: DateTime<Utc>,
) -> DiffOutcome {
    debug_assert!(store.is_finalized(), "diff engine needs a frozen store");
    let horizon = Utc::now() + Duration::days(FUTURE_SLACK_DAYS);
    let mut outcome = DiffOutcome::default();

    for (entity_id, history) in store.iter() {
        let latest = store.latest(entity_id);

        for (i, revision) in history.iter().enumerate() {
            let timestamp = match revision.parsed_changed_at() {
                Some(ts) if ts <= horizon => ts,
                _ => {
                    outcome.malformed_skipped += 1;
                    continue;
                }
            };
            if timestamp < cutoff {
                continue;
            }
            let predecessor = if i > 0 { Some(&history[i - 1]) } else { None };
            let snapshot = snapshot_for(revision, latest);

            for identity in identities {
                let mut touched = false;

                if identity.matches(&revision.changed_by) {
                    match predecessor {
                        Some(prev) => {
                            if let Some((old, new)) = state_change(prev, revision) {
                                outcome.activities.push(ActivityEvent {
                                    identity: identity.display_name.clone(),
                                    timestamp,
                                    entity_id,
                                    snapshot: snapshot.clone(),
                                    kind: ActivityKind::StateTransition,
                                    detail: format!("{old} → {new}"),
                                    actor: revision.changed_by.clone(),
                                    mention_tone: None,
                                });
                                touched = true;
                            }
                            let changed = changed_keys(prev, revision);
                            if !changed.is_empty() {
                                outcome.activities.push(ActivityEvent {
                                    identity: identity.display_name.clone(),
                                    timestamp,
                                    entity_id,
                                    snapshot: snapshot.clone(),
                                    kind: ActivityKind::Edit,
                                    detail: format!("changed {}", changed.join(", ")),
                                    actor: revision.changed_by.clone(),
                                    mention_tone: None,
                                });
                                touched = true;
                            }
                        }
                        None => {
                            // No predecessor in the scanned window — record
                            // the touch without attempting a diff.
                            outcome.activities.push(ActivityEvent {
                                identity: identity.display_name.clone(),
                                timestamp,
                                entity_id,
                                snapshot: snapshot.clone(),
                                kind: ActivityKind::Edit,
                                detail: "first observed change".to_string(),
                                actor: revision.changed_by.clone(),
                                mention_tone: None,
                            });
                            touched = true;
                        }
                    }
                }

                // Assignment credit goes to the new assignee, whoever made
                // the change. Self-assignment is already covered by the
                // authored edit above, so it earns no second event.
                if let Some(prev) = predecessor {
                    if let Some(new_assignee) = assignee_change(prev, revision) {
                        if identity.matches(&new_assignee)
                            && !identity.matches(&revision.changed_by)
                        {
                            outcome.activities.push(ActivityEvent {
                                identity: identity.display_name.clone(),
                                timestamp,
                                entity_id,
                                snapshot: snapshot.clone(),
                                kind: ActivityKind::Assignment,
                                detail: format!("assigned by {}", revision.changed_by),
                                actor: revision.changed_by.clone(),
                                mention_tone: None,
                            });
                            touched = true;
                        }
                    }
                }

                if touched {
                    outcome.relevant.insert(entity_id);
                }
            }
        }
    }

    outcome
}

/// Builds the event snapshot from the revision's own fields, falling back
/// to the entity's terminal revision for anything the projection left out.
pub fn snapshot_for(revision: &Revision, latest: Option<&Revision>) -> EntitySnapshot {
    let pick = |key: &str| -> String {
        revision
            .field_str(key)
            .or_else(|| latest.and_then(|l| l.field_str(key)))
            .unwrap_or_default()
            .to_string()
    };
    EntitySnapshot {
        title: pick(field::TITLE),
        item_type: pick(field::ITEM_TYPE),
        state: pick(field::STATE),
        area: pick(field::AREA),
    }
}

/// `Some((old, new))` when the state field's value differs between the two
/// revisions. An absent state renders as "(none)".
fn state_change(prev: &Revision, current: &Revision) -> Option<(String, String)> {
    let old = prev.state();
    let new = current.state();
    if old == new {
        return None;
    }
    Some((
        old.unwrap_or("(none)").to_string(),
        new.unwrap_or("(none)").to_string(),
    ))
}

/// The new assignee string when the assignee field changed, `None`
/// otherwise (including when it changed to unassigned).
fn assignee_change(prev: &Revision, current: &Revision) -> Option<String> {
    let old = prev.assignee();
    let new = current.assignee();
    if old == new {
        return None;
    }
    new
}

/// Keys whose values differ between the two field snapshots, compared
/// structurally over the union of both key sets — a key present on one
/// side and absent on the other counts as changed, and map key order never
/// does. Bookkeeping keys plus the state and assignee fields (which get
/// their own event kinds) are excluded.
fn changed_keys(prev: &Revision, current: &Revision) -> Vec<String> {
    let mut keys: BTreeSet<&str> = prev.fields.keys().map(String::as_str).collect();
    keys.extend(current.fields.keys().map(String::as_str));

    keys.into_iter()
        .filter(|k| !is_excluded_key(k))
        .filter(|k| {
            let old: Option<&Value> = prev.fields.get(*k);
            let new: Option<&Value> = current.fields.get(*k);
            old != new
        })
        .map(str::to_string)
        .collect()
}

fn is_excluded_key(key: &str) -> bool {
    field::BOOKKEEPING.contains(&key) || key == field::STATE || key == field::ASSIGNED_TO
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Map, Value};

    fn identity(name: &str, email: &str) -> Identity {
        Identity {
            display_name: name.to_string(),
            email: email.to_string(),
        }
    }

    fn fields(pairs: &[(&str, Value)]) -> Map<String, Value> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    fn rev(
        entity_id: i64,
        sequence: i64,
        changed_at: &str,
        changed_by: &str,
        field_pairs: &[(&str, Value)],
    ) -> Revision {
        Revision {
            entity_id,
            sequence,
            changed_at: changed_at.to_string(),
            changed_by: changed_by.to_string(),
            fields: fields(field_pairs),
        }
    }

    fn store_of(revisions: Vec<Revision>) -> RevisionStore {
        let mut store = RevisionStore::new();
        for r in revisions {
            store.append(r);
        }
        store.finalize();
        store
    }

    fn cutoff(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s)
            .unwrap()
            .with_timezone(&Utc)
    }

    /// Reference scenario: three revisions on entity #100 produce exactly a
    /// first-touch Edit, one StateTransition and one Assignment.
    #[test]
    fn test_reference_scenario_three_events() {
        let alice = identity("Alice", "alice@corp.example");
        let bob = identity("Bob", "bob@corp.example");
        let store = store_of(vec![
            rev(
                100,
                1,
                "2026-07-01T09:00:00Z",
                "Alice",
                &[("state", json!("New"))],
            ),
            rev(
                100,
                2,
                "2026-07-01T10:00:00Z",
                "Alice",
                &[("state", json!("Active"))],
            ),
            rev(
                100,
                3,
                "2026-07-01T11:00:00Z",
                "Alice",
                &[("state", json!("Active")), ("assignedTo", json!("Bob"))],
            ),
        ]);

        let outcome = reconstruct_activity(
            &store,
            &[alice, bob],
            cutoff("2026-06-01T00:00:00Z"),
        );

        assert_eq!(outcome.activities.len(), 3, "{:?}", outcome.activities);
        assert_eq!(outcome.relevant, BTreeSet::from([100]));

        let kinds: Vec<ActivityKind> = {
            let mut sorted = outcome.activities.clone();
            sorted.sort_by_key(|a| a.timestamp);
            sorted.iter().map(|a| a.kind).collect()
        };
        assert_eq!(
            kinds,
            vec![
                ActivityKind::Edit,
                ActivityKind::StateTransition,
                ActivityKind::Assignment
            ]
        );

        let transition = outcome
            .activities
            .iter()
            .find(|a| a.kind == ActivityKind::StateTransition)
            .unwrap();
        assert_eq!(transition.detail, "New → Active");
        assert_eq!(transition.identity, "Alice");

        let assignment = outcome
            .activities
            .iter()
            .find(|a| a.kind == ActivityKind::Assignment)
            .unwrap();
        assert_eq!(assignment.identity, "Bob");
        assert_eq!(assignment.actor, "Alice");
    }

    #[test]
    fn test_cutoff_boundary_inclusive() {
        let alice = identity("Alice", "alice@corp.example");
        let store = store_of(vec![rev(
            1,
            1,
            "2026-07-01T10:00:00Z",
            "Alice",
            &[("title", json!("x"))],
        )]);

        // Exactly at the cutoff: included.
        let at = reconstruct_activity(&store, &[alice.clone()], cutoff("2026-07-01T10:00:00Z"));
        assert_eq!(at.activities.len(), 1);

        // One millisecond later cutoff: excluded.
        let after = reconstruct_activity(&store, &[alice], cutoff("2026-07-01T10:00:00.001Z"));
        assert!(after.activities.is_empty());
        assert!(after.relevant.is_empty());
    }

    #[test]
    fn test_diffing_is_idempotent() {
        let alice = identity("Alice", "alice@corp.example");
        let store = store_of(vec![
            rev(5, 1, "2026-07-01T09:00:00Z", "Alice", &[("title", json!("a"))]),
            rev(5, 2, "2026-07-01T10:00:00Z", "Alice", &[("title", json!("b"))]),
        ]);
        let c = cutoff("2026-06-01T00:00:00Z");

        let first = reconstruct_activity(&store, &[alice.clone()], c);
        let second = reconstruct_activity(&store, &[alice], c);

        let key = |a: &ActivityEvent| {
            (
                a.identity.clone(),
                a.timestamp,
                a.entity_id,
                a.kind,
                a.detail.clone(),
            )
        };
        let mut left: Vec<_> = first.activities.iter().map(key).collect();
        let mut right: Vec<_> = second.activities.iter().map(key).collect();
        left.sort();
        right.sort();
        assert_eq!(left, right);
        assert_eq!(first.relevant, second.relevant);
    }

    #[test]
    fn test_relevance_soundness() {
        let alice = identity("Alice", "alice@corp.example");
        let store = store_of(vec![
            rev(1, 1, "2026-07-01T09:00:00Z", "Alice", &[("title", json!("a"))]),
            // Entity 2 only touched by someone untracked.
            rev(2, 1, "2026-07-01T09:00:00Z", "Mallory", &[("title", json!("b"))]),
        ]);

        let outcome =
            reconstruct_activity(&store, &[alice], cutoff("2026-06-01T00:00:00Z"));

        // Every event's entity is in the relevant set...
        for event in &outcome.activities {
            assert!(outcome.relevant.contains(&event.entity_id));
        }
        // ...and no relevant entity lacks an event.
        for id in &outcome.relevant {
            assert!(outcome.activities.iter().any(|a| a.entity_id == *id));
        }
        assert!(!outcome.relevant.contains(&2));
    }

    #[test]
    fn test_self_assignment_yields_no_assignment_event() {
        let alice = identity("Alice", "alice@corp.example");
        let store = store_of(vec![
            rev(9, 1, "2026-07-01T09:00:00Z", "Bob", &[("state", json!("New"))]),
            rev(
                9,
                2,
                "2026-07-01T10:00:00Z",
                "Alice",
                &[("state", json!("New")), ("assignedTo", json!("Alice"))],
            ),
        ]);

        let outcome =
            reconstruct_activity(&store, &[alice], cutoff("2026-06-01T00:00:00Z"));

        assert!(outcome
            .activities
            .iter()
            .all(|a| a.kind != ActivityKind::Assignment));
    }

    #[test]
    fn test_assignment_credited_to_target_not_actor() {
        let bob = identity("Bob", "bob@corp.example");
        let store = store_of(vec![
            rev(9, 1, "2026-07-01T09:00:00Z", "Alice", &[]),
            rev(
                9,
                2,
                "2026-07-01T10:00:00Z",
                "Alice",
                &[("assignedTo", json!("Bob"))],
            ),
        ]);

        let outcome = reconstruct_activity(&store, &[bob], cutoff("2026-06-01T00:00:00Z"));

        assert_eq!(outcome.activities.len(), 1);
        let event = &outcome.activities[0];
        assert_eq!(event.kind, ActivityKind::Assignment);
        assert_eq!(event.identity, "Bob");
        assert_eq!(event.actor, "Alice");
        assert_eq!(outcome.relevant, BTreeSet::from([9]));
    }

    #[test]
    fn test_malformed_date_skipped_and_counted() {
        let alice = identity("Alice", "alice@corp.example");
        let store = store_of(vec![
            rev(1, 1, "garbage", "Alice", &[("title", json!("a"))]),
            rev(1, 2, "2026-07-01T10:00:00Z", "Alice", &[("title", json!("b"))]),
        ]);

        let outcome =
            reconstruct_activity(&store, &[alice], cutoff("2026-06-01T00:00:00Z"));

        assert_eq!(outcome.malformed_skipped, 1);
        // The surviving revision still produces its edit.
        assert_eq!(outcome.activities.len(), 1);
        assert_eq!(outcome.activities[0].kind, ActivityKind::Edit);
    }

    #[test]
    fn test_sentinel_future_date_skipped() {
        let alice = identity("Alice", "alice@corp.example");
        let store = store_of(vec![rev(
            1,
            1,
            "9999-01-01T00:00:00Z",
            "Alice",
            &[("title", json!("a"))],
        )]);

        let outcome =
            reconstruct_activity(&store, &[alice], cutoff("2026-06-01T00:00:00Z"));

        assert!(outcome.activities.is_empty());
        assert_eq!(outcome.malformed_skipped, 1);
    }

    #[test]
    fn test_absent_field_differs_from_empty_string() {
        let alice = identity("Alice", "alice@corp.example");
        let store = store_of(vec![
            rev(1, 1, "2026-07-01T09:00:00Z", "Alice", &[]),
            rev(
                1,
                2,
                "2026-07-01T10:00:00Z",
                "Alice",
                &[("priority", json!(""))],
            ),
        ]);

        let outcome =
            reconstruct_activity(&store, &[alice], cutoff("2026-06-01T00:00:00Z"));

        let edit = outcome
            .activities
            .iter()
            .find(|a| a.detail.starts_with("changed"))
            .expect("absent → empty-string must register as a change");
        assert_eq!(edit.detail, "changed priority");
    }

    #[test]
    fn test_bookkeeping_keys_never_produce_edits() {
        let alice = identity("Alice", "alice@corp.example");
        let store = store_of(vec![
            rev(
                1,
                1,
                "2026-07-01T09:00:00Z",
                "Alice",
                &[("rev", json!(1)), ("watermark", json!(100))],
            ),
            rev(
                1,
                2,
                "2026-07-01T10:00:00Z",
                "Alice",
                &[("rev", json!(2)), ("watermark", json!(101))],
            ),
        ]);

        let outcome =
            reconstruct_activity(&store, &[alice], cutoff("2026-06-01T00:00:00Z"));

        // Only the first-touch edit; the second revision changed nothing
        // beyond bookkeeping.
        assert_eq!(outcome.activities.len(), 1);
        assert_eq!(outcome.activities[0].detail, "first observed change");
    }

    #[test]
    fn test_structural_equality_ignores_key_order() {
        let alice = identity("Alice", "alice@corp.example");
        let nested_a = json!({"x": 1, "y": 2});
        let nested_b = json!({"y": 2, "x": 1});
        let store = store_of(vec![
            rev(1, 1, "2026-07-01T09:00:00Z", "Alice", &[("links", nested_a)]),
            rev(1, 2, "2026-07-01T10:00:00Z", "Alice", &[("links", nested_b)]),
        ]);

        let outcome =
            reconstruct_activity(&store, &[alice], cutoff("2026-06-01T00:00:00Z"));

        // Same structural value in a different key order is not a change.
        assert!(outcome
            .activities
            .iter()
            .all(|a| !a.detail.contains("links")));
    }

    #[test]
    fn test_untracked_actor_produces_nothing() {
        let alice = identity("Alice", "alice@corp.example");
        let store = store_of(vec![rev(
            1,
            1,
            "2026-07-01T09:00:00Z",
            "Mallory",
            &[("title", json!("a"))],
        )]);

        let outcome =
            reconstruct_activity(&store, &[alice], cutoff("2026-06-01T00:00:00Z"));
        assert!(outcome.activities.is_empty());
        assert!(outcome.relevant.is_empty());
    }

    #[test]
    fn test_snapshot_falls_back_to_latest_revision() {
        let alice = identity("Alice", "alice@corp.example");
        let store = store_of(vec![
            rev(1, 1, "2026-07-01T09:00:00Z", "Alice", &[("state", json!("New"))]),
            rev(
                1,
                2,
                "2026-07-01T10:00:00Z",
                "Mallory",
                &[("state", json!("New")), ("title", json!("Late title"))],
            ),
        ]);

        let outcome =
            reconstruct_activity(&store, &[alice], cutoff("2026-06-01T00:00:00Z"));

        // The first-touch event had no title field of its own; the terminal
        // revision supplies it.
        assert_eq!(outcome.activities[0].snapshot.title, "Late title");
    }
}
