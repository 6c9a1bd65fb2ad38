//! Targeted enrichment — fetches free-text comments for relevant entities
//! only, in fixed-size concurrent batches, and classifies them into
//! self-authored comments vs third-party mentions of a tracked identity.
//!
//! Fetch failures are counted and skipped; a bad entity never sinks its
//! batch or the run.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use tracing::{debug, warn};

use crate::models::activity::{ActivityEvent, ActivityKind, MentionTone};
use crate::models::identity::Identity;
use crate::reconstruct::diff::snapshot_for;
use crate::reconstruct::store::RevisionStore;
use crate::sources::{Comment, CommentSource};

/// Concurrent fetches per batch. The pipeline waits for a whole batch
/// before starting the next — the upstream service rate-limits implicitly,
/// and the relevant set can run to thousands of entities.
const COMMENT_BATCH: usize = 20;

/// Stripped @-mention bodies shorter than this count as FYI-grade.
const SHORT_MENTION_LEN: usize = 40;

#[derive(Debug, Default)]
pub struct EnrichOutcome {
    pub activities: Vec<ActivityEvent>,
    pub fetch_failures: u64,
}

pub async fn enrich_comments(
    source: &dyn CommentSource,
    store: &RevisionStore,
    relevant: &BTreeSet<i64>,
    identities: &[Identity],
    cutoff: DateTime<Utc>,
) -> EnrichOutcome {
    let ids: Vec<i64> = relevant.iter().copied().collect();
    let mut outcome = EnrichOutcome::default();

    for batch in ids.chunks(COMMENT_BATCH) {
        let fetches = batch.iter().map(|&entity_id| async move {
            (entity_id, source.comments(entity_id).await)
        });

        for (entity_id, result) in join_all(fetches).await {
            match result {
                Ok(comments) => {
                    debug!("entity {entity_id}: {} comments", comments.len());
                    comment_events(
                        entity_id,
                        &comments,
                        store,
                        identities,
                        cutoff,
                        &mut outcome.activities,
                    );
                }
                Err(e) => {
                    warn!("comment fetch for entity {entity_id} failed, skipping: {e}");
                    outcome.fetch_failures += 1;
                }
            }
        }
    }

    outcome
}

fn comment_events(
    entity_id: i64,
    comments: &[Comment],
    store: &RevisionStore,
    identities: &[Identity],
    cutoff: DateTime<Utc>,
    out: &mut Vec<ActivityEvent>,
) {
    let latest = store.latest(entity_id);

    for comment in comments {
        let timestamp = match parse_created_at(&comment.created_at) {
            Some(ts) if ts >= cutoff => ts,
            _ => continue,
        };
        let cleaned = clean_comment_text(&comment.text);

        for identity in identities {
            if identity.matches(&comment.author) {
                out.push(ActivityEvent {
                    identity: identity.display_name.clone(),
                    timestamp,
                    entity_id,
                    snapshot: latest
                        .map(|l| snapshot_for(l, Some(l)))
                        .unwrap_or_default(),
                    kind: ActivityKind::Comment,
                    detail: excerpt(&cleaned),
                    actor: comment.author.clone(),
                    mention_tone: None,
                });
            } else if mentions(&cleaned, identity) {
                out.push(ActivityEvent {
                    identity: identity.display_name.clone(),
                    timestamp,
                    entity_id,
                    snapshot: latest
                        .map(|l| snapshot_for(l, Some(l)))
                        .unwrap_or_default(),
                    kind: ActivityKind::Mention,
                    detail: excerpt(&cleaned),
                    actor: comment.author.clone(),
                    mention_tone: Some(classify_mention(&cleaned)),
                });
            }
        }
    }
}

fn parse_created_at(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

fn mentions(cleaned: &str, identity: &Identity) -> bool {
    let text = cleaned.to_lowercase();
    let name = identity.display_name.to_lowercase();
    let email = identity.email.to_lowercase();
    (!name.is_empty() && text.contains(&name)) || (!email.is_empty() && text.contains(&email))
}

/// Strips markup tags and collapses whitespace. Tracking systems store
/// comments as HTML fragments; matching runs on the visible text.
pub fn clean_comment_text(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut in_tag = false;
    for c in raw.chars() {
        match c {
            '<' => in_tag = true,
            '>' if in_tag => {
                in_tag = false;
                out.push(' ');
            }
            _ if !in_tag => out.push(c),
            _ => {}
        }
    }
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Best-effort tone classification for a mention. Checked in order:
/// actionable (question or directive), FYI (broadcast markers or very
/// short once @-tokens are removed), then discussion as the default.
pub fn classify_mention(cleaned: &str) -> MentionTone {
    let text = cleaned.to_lowercase();

    const DIRECTIVES: &[&str] = &["please", "review", "approve", "can you", "could you"];
    if text.contains('?') || DIRECTIVES.iter().any(|d| text.contains(d)) {
        return MentionTone::Actionable;
    }

    const BROADCAST: &[&str] = &["fyi", "heads up", "cc:", "cc "];
    let without_mentions = strip_at_mentions(&text);
    if BROADCAST.iter().any(|m| text.contains(m))
        || without_mentions.trim().len() < SHORT_MENTION_LEN
    {
        return MentionTone::Fyi;
    }

    MentionTone::Discussion
}

/// Removes `@name` tokens so the length heuristic measures real prose.
fn strip_at_mentions(text: &str) -> String {
    text.split_whitespace()
        .filter(|w| !w.starts_with('@'))
        .collect::<Vec<_>>()
        .join(" ")
}

fn excerpt(text: &str) -> String {
    const MAX: usize = 120;
    if text.chars().count() <= MAX {
        text.to_string()
    } else {
        let cut: String = text.chars().take(MAX).collect();
        format!("{cut}…")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU64, Ordering};

    use crate::sources::SourceError;

    fn identity(name: &str, email: &str) -> Identity {
        Identity {
            display_name: name.to_string(),
            email: email.to_string(),
        }
    }

    fn comment(author: &str, text: &str, created_at: &str) -> Comment {
        Comment {
            author: author.to_string(),
            text: text.to_string(),
            created_at: created_at.to_string(),
        }
    }

    fn cutoff(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s)
            .unwrap()
            .with_timezone(&Utc)
    }

    struct FakeComments {
        by_entity: HashMap<i64, Vec<Comment>>,
        failing: Vec<i64>,
        calls: AtomicU64,
    }

    #[async_trait]
    impl CommentSource for FakeComments {
        async fn comments(&self, entity_id: i64) -> Result<Vec<Comment>, SourceError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.failing.contains(&entity_id) {
                return Err(SourceError::Api {
                    status: 500,
                    message: "boom".to_string(),
                });
            }
            Ok(self.by_entity.get(&entity_id).cloned().unwrap_or_default())
        }
    }

    fn empty_store() -> RevisionStore {
        let mut store = RevisionStore::new();
        store.finalize();
        store
    }

    #[tokio::test]
    async fn test_comment_vs_mention_split() {
        let alice = identity("Alice", "alice@corp.example");
        let source = FakeComments {
            by_entity: HashMap::from([(
                1,
                vec![
                    comment("Alice <alice@corp.example>", "working on it", "2026-07-02T09:00:00Z"),
                    comment(
                        "Bob <bob@corp.example>",
                        "Alice please review this change",
                        "2026-07-02T10:00:00Z",
                    ),
                ],
            )]),
            failing: vec![],
            calls: AtomicU64::new(0),
        };
        let relevant = BTreeSet::from([1]);

        let outcome = enrich_comments(
            &source,
            &empty_store(),
            &relevant,
            &[alice],
            cutoff("2026-07-01T00:00:00Z"),
        )
        .await;

        assert_eq!(outcome.activities.len(), 2);
        let kinds: Vec<ActivityKind> = outcome.activities.iter().map(|a| a.kind).collect();
        assert!(kinds.contains(&ActivityKind::Comment));
        assert!(kinds.contains(&ActivityKind::Mention));

        let mention = outcome
            .activities
            .iter()
            .find(|a| a.kind == ActivityKind::Mention)
            .unwrap();
        assert_eq!(mention.mention_tone, Some(MentionTone::Actionable));
        assert_eq!(mention.actor, "Bob <bob@corp.example>");
    }

    #[tokio::test]
    async fn test_fetch_failure_counted_not_fatal() {
        let alice = identity("Alice", "alice@corp.example");
        let source = FakeComments {
            by_entity: HashMap::from([(
                2,
                vec![comment(
                    "Alice <alice@corp.example>",
                    "done",
                    "2026-07-02T09:00:00Z",
                )],
            )]),
            failing: vec![1],
            calls: AtomicU64::new(0),
        };
        let relevant = BTreeSet::from([1, 2]);

        let outcome = enrich_comments(
            &source,
            &empty_store(),
            &relevant,
            &[alice],
            cutoff("2026-07-01T00:00:00Z"),
        )
        .await;

        assert_eq!(outcome.fetch_failures, 1);
        assert_eq!(outcome.activities.len(), 1);
        // Both entities were attempted despite the failure.
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_only_relevant_entities_fetched() {
        let alice = identity("Alice", "alice@corp.example");
        let source = FakeComments {
            by_entity: HashMap::new(),
            failing: vec![],
            calls: AtomicU64::new(0),
        };
        let relevant = BTreeSet::from([10, 20, 30]);

        let _ = enrich_comments(
            &source,
            &empty_store(),
            &relevant,
            &[alice],
            cutoff("2026-07-01T00:00:00Z"),
        )
        .await;

        assert_eq!(source.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_old_comments_ignored() {
        let alice = identity("Alice", "alice@corp.example");
        let source = FakeComments {
            by_entity: HashMap::from([(
                1,
                vec![comment(
                    "Alice <alice@corp.example>",
                    "ancient history",
                    "2020-01-01T00:00:00Z",
                )],
            )]),
            failing: vec![],
            calls: AtomicU64::new(0),
        };

        let outcome = enrich_comments(
            &source,
            &empty_store(),
            &BTreeSet::from([1]),
            &[alice],
            cutoff("2026-07-01T00:00:00Z"),
        )
        .await;

        assert!(outcome.activities.is_empty());
    }

    #[test]
    fn test_clean_comment_text_strips_tags() {
        let raw = "<div>Alice, can you <b>look</b>?</div>";
        assert_eq!(clean_comment_text(raw), "Alice, can you look ?");
    }

    #[test]
    fn test_classify_actionable_question() {
        assert_eq!(
            classify_mention("alice does this handle retries correctly and is it safe to ship?"),
            MentionTone::Actionable
        );
    }

    #[test]
    fn test_classify_actionable_directive() {
        assert_eq!(
            classify_mention(
                "alice please review the pagination change when you get a chance today"
            ),
            MentionTone::Actionable
        );
    }

    #[test]
    fn test_classify_fyi_marker() {
        assert_eq!(
            classify_mention(
                "fyi alice the deployment window moved to thursday, no action needed from anyone"
            ),
            MentionTone::Fyi
        );
    }

    #[test]
    fn test_classify_short_mention_is_fyi() {
        assert_eq!(classify_mention("@alice see above"), MentionTone::Fyi);
    }

    #[test]
    fn test_classify_default_discussion() {
        assert_eq!(
            classify_mention(
                "i talked with alice about the indexing approach and we agreed the current \
                 design holds up under the projected load"
            ),
            MentionTone::Discussion
        );
    }
}
