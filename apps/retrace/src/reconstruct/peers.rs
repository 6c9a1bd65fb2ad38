//! Peer metrics — aggregate counters for the comparison roster, computed
//! in one pass over the same revision store the diff engine reads. Peers
//! are matched by normalized email extracted from the actor string, and
//! peers with zero observed activity never appear in the output.

use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, NaiveDate, Utc};

use crate::models::activity::PeerMetric;
use crate::models::identity::Identity;
use crate::models::revision::{field, Revision};
use crate::reconstruct::store::RevisionStore;

/// States that count an entity as finished.
const TERMINAL_STATES: &[&str] = &["closed", "done", "resolved", "completed"];

#[derive(Default)]
struct PeerAccumulator {
    activities: u64,
    touched: BTreeSet<i64>,
    days: BTreeSet<NaiveDate>,
    transitions: u64,
    closed: u64,
    /// Logged effort is a running total on the entity, so only the last
    /// matched revision per entity may contribute — summing every revision
    /// would count the same hours repeatedly.
    effort_by_entity: HashMap<i64, f64>,
}

pub fn aggregate_peers(
    store: &RevisionStore,
    peers: &[Identity],
    cutoff: DateTime<Utc>,
) -> Vec<PeerMetric> {
    debug_assert!(store.is_finalized(), "peer scan needs a frozen store");
    let mut accumulators: Vec<PeerAccumulator> =
        peers.iter().map(|_| PeerAccumulator::default()).collect();

    for (entity_id, history) in store.iter() {
        for (i, revision) in history.iter().enumerate() {
            let timestamp = match revision.parsed_changed_at() {
                Some(ts) if ts >= cutoff => ts,
                _ => continue,
            };
            let actor_email = extract_email(&revision.changed_by);

            for (peer, acc) in peers.iter().zip(accumulators.iter_mut()) {
                let matched = match &actor_email {
                    Some(email) => *email == peer.email.to_lowercase(),
                    None => peer.matches(&revision.changed_by),
                };
                if !matched {
                    continue;
                }

                acc.activities += 1;
                acc.touched.insert(entity_id);
                acc.days.insert(timestamp.date_naive());

                if i > 0 {
                    let prev = &history[i - 1];
                    if prev.state() != revision.state() {
                        acc.transitions += 1;
                        if revision.state().is_some_and(is_terminal_state) {
                            acc.closed += 1;
                        }
                    }
                }

                if let Some(effort) = revision.field_f64(field::LOGGED_EFFORT) {
                    // Last matched revision wins.
                    acc.effort_by_entity.insert(entity_id, effort);
                }
            }
        }
    }

    peers
        .iter()
        .zip(accumulators)
        .filter(|(_, acc)| acc.activities > 0)
        .map(|(peer, acc)| PeerMetric {
            identity: peer.display_name.clone(),
            total_activities: acc.activities,
            entities_touched: acc.touched.len() as u64,
            days_active: acc.days.len() as u64,
            state_transitions: acc.transitions,
            entities_closed: acc.closed,
            logged_effort_sum: acc.effort_by_entity.values().sum(),
        })
        .collect()
}

fn is_terminal_state(state: &str) -> bool {
    TERMINAL_STATES
        .iter()
        .any(|t| state.eq_ignore_ascii_case(t))
}

/// Pulls a normalized (lowercased) email out of a free-text actor string:
/// the angle-bracketed form first, then any bare token containing `@`.
pub fn extract_email(actor: &str) -> Option<String> {
    if let Some(start) = actor.find('<') {
        if let Some(end) = actor[start + 1..].find('>') {
            let inner = &actor[start + 1..start + 1 + end];
            if inner.contains('@') {
                return Some(inner.trim().to_lowercase());
            }
        }
    }
    actor
        .split_whitespace()
        .find(|token| token.contains('@'))
        .map(|token| token.trim_matches(|c: char| !c.is_alphanumeric() && c != '@' && c != '.'))
        .filter(|token| !token.is_empty())
        .map(str::to_lowercase)
}
