use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::errors::AppError;
use crate::models::identity::Identity;

/// The people this run reports on.
///
/// `tracked` drives the full reconstruction (diff + enrichment); `peers` is
/// the comparison roster scored by the aggregate pass only.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Roster {
    pub tracked: Vec<Identity>,
    #[serde(default)]
    pub peers: Vec<Identity>,
}

impl Roster {
    pub fn load(path: &Path) -> Result<Roster, AppError> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            AppError::Roster(format!("cannot read roster file {}: {e}", path.display()))
        })?;
        let roster: Roster = serde_json::from_str(&raw)
            .map_err(|e| AppError::Roster(format!("invalid roster JSON: {e}")))?;
        if roster.tracked.is_empty() {
            return Err(AppError::Roster(
                "roster must list at least one tracked identity".to_string(),
            ));
        }
        Ok(roster)
    }
}
