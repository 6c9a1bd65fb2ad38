use serde::{Deserialize, Serialize};

/// A tracked person. Actor strings from the tracking system are free text
/// ("Alice Smith <alice@corp.example>"), so matching is substring-based.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Identity {
    pub display_name: String,
    pub email: String,
}

impl Identity {
    /// Case-insensitive substring match against a free-text actor string.
    /// A hit on either display name or email counts (OR semantics).
    ///
    /// Known limitation: two identities whose names are substrings of each
    /// other ("Ann" / "Annabel") can both match the same actor. Callers get
    /// one event per matching identity in that case.
    pub fn matches(&self, actor: &str) -> bool {
        if actor.is_empty() {
            return false;
        }
        let actor = actor.to_lowercase();
        let name = self.display_name.to_lowercase();
        let email = self.email.to_lowercase();
        (!name.is_empty() && actor.contains(&name)) || (!email.is_empty() && actor.contains(&email))
    }
}
