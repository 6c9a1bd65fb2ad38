use crate::models::activity::ActivityEvent;
use crate::report::{kind_label, sorted_activities};

/// One row per activity event, chronological.
pub fn render_csv(activities: &[ActivityEvent]) -> String {
    let mut out =
        String::from("timestamp,identity,kind,entity_id,title,state,area,actor,detail\n");
    for event in sorted_activities(activities) {
        let row = [
            event.timestamp.to_rfc3339(),
            event.identity.clone(),
            kind_label(event.kind).to_string(),
            event.entity_id.to_string(),
            event.snapshot.title.clone(),
            event.snapshot.state.clone(),
            event.snapshot.area.clone(),
            event.actor.clone(),
            event.detail.clone(),
        ];
        let escaped: Vec<String> = row.iter().map(|cell| escape_csv(cell)).collect();
        out.push_str(&escaped.join(","));
        out.push('\n');
    }
    out
}

/// Quotes a cell only when it needs it (comma, quote, newline).
fn escape_csv(cell: &str) -> String {
    if cell.contains(',') || cell.contains('"') || cell.contains('\n') {
        format!("\"{}\"", cell.replace('"', "\"\""))
    } else {
        cell.to_string()
    }
}
