use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use crate::models::activity::{ActivityEvent, MentionTone};
use crate::reconstruct::ReconstructionReport;
use crate::report::{kind_label, sorted_activities};

/// Renders the full run as a markdown document: one section per tracked
/// identity with a chronological activity list, a peer-metrics table, and
/// a run-summary footer.
pub fn render_markdown(report: &ReconstructionReport, cutoff: DateTime<Utc>) -> String {
    let mut md = format!(
        "# Activity Report\n\nWindow start: {}\n\n",
        cutoff.format("%Y-%m-%d %H:%M UTC")
    );

    let mut by_identity: BTreeMap<&str, Vec<&ActivityEvent>> = BTreeMap::new();
    for event in sorted_activities(&report.activities) {
        by_identity
            .entry(event.identity.as_str())
            .or_default()
            .push(event);
    }

    if by_identity.is_empty() {
        md.push_str("_No activity found in the window._\n\n");
    }

    for (identity, events) in &by_identity {
        md.push_str(&format!("## {identity}\n\n"));
        for event in events {
            md.push_str(&render_event_line(event, report));
        }
        md.push('\n');
    }

    if !report.peer_metrics.is_empty() {
        md.push_str("## Peer comparison\n\n");
        md.push_str(
            "| Peer | Activities | Entities | Active days | Transitions | Closed | Effort |\n",
        );
        md.push_str("|---|---|---|---|---|---|---|\n");
        for m in &report.peer_metrics {
            md.push_str(&format!(
                "| {} | {} | {} | {} | {} | {} | {:.1} |\n",
                m.identity,
                m.total_activities,
                m.entities_touched,
                m.days_active,
                m.state_transitions,
                m.entities_closed,
                m.logged_effort_sum
            ));
        }
        md.push('\n');
    }

    let s = &report.summary;
    md.push_str("## Run summary\n\n");
    md.push_str(&format!(
        "- Pages fetched: {} ({} revisions across {} entities)\n",
        s.pages_fetched, s.revisions_ingested, s.entities_scanned
    ));
    md.push_str(&format!("- Relevant entities: {}\n", s.relevant_entities));
    if s.pagination_stopped_early {
        md.push_str("- Pagination stopped early; this report covers partial data\n");
    }
    if s.malformed_revisions_skipped > 0 {
        md.push_str(&format!(
            "- Malformed revisions skipped: {}\n",
            s.malformed_revisions_skipped
        ));
    }
    if s.comment_fetch_failures > 0 {
        md.push_str(&format!(
            "- Comment fetch failures: {}\n",
            s.comment_fetch_failures
        ));
    }
    if s.relation_batch_failures > 0 {
        md.push_str(&format!(
            "- Relation batch failures: {}\n",
            s.relation_batch_failures
        ));
    }

    md
}

fn render_event_line(event: &ActivityEvent, report: &ReconstructionReport) -> String {
    let mut line = format!(
        "- {} · {} · #{} {}",
        event.timestamp.format("%Y-%m-%d %H:%M"),
        kind_label(event.kind),
        event.entity_id,
        if event.snapshot.title.is_empty() {
            "(untitled)"
        } else {
            event.snapshot.title.as_str()
        },
    );
    if let Some(parent) = report.parents.get(&event.entity_id) {
        line.push_str(&format!(" (under #{} {})", parent.parent_id, parent.parent_title));
    }
    line.push_str(&format!(" — {}", event.detail));
    if let Some(tone) = event.mention_tone {
        line.push_str(match tone {
            MentionTone::Actionable => " [actionable]",
            MentionTone::Fyi => " [fyi]",
            MentionTone::Discussion => " [discussion]",
        });
    }
    if event.actor != event.identity {
        line.push_str(&format!(" (by {})", event.actor));
    }
    line.push('\n');
    line
}
