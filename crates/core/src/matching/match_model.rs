//! Match outcome models.

use serde::{Deserialize, Serialize};

/// Action decided for one source record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchAction {
    Create,
    Update,
    Skip,
    Conflict,
}

/// Outcome of comparing one source record against the target system.
///
/// Produced and consumed within a single executor pass; only aggregate counts
/// survive on the job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchResult {
    pub source_id: String,
    /// Matched target record, if any
    pub target_id: Option<String>,
    pub action: MatchAction,
    /// Always set for skip and conflict
    pub reason: Option<String>,
    /// Fields that differ, for updates
    pub changed_fields: Vec<String>,
}

impl MatchResult {
    pub fn create(source_id: impl Into<String>) -> Self {
        Self {
            source_id: source_id.into(),
            target_id: None,
            action: MatchAction::Create,
            reason: None,
            changed_fields: Vec::new(),
        }
    }

    pub fn update(
        source_id: impl Into<String>,
        target_id: impl Into<String>,
        changed_fields: Vec<String>,
    ) -> Self {
        Self {
            source_id: source_id.into(),
            target_id: Some(target_id.into()),
            action: MatchAction::Update,
            reason: None,
            changed_fields,
        }
    }

    pub fn skip(
        source_id: impl Into<String>,
        target_id: Option<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            source_id: source_id.into(),
            target_id,
            action: MatchAction::Skip,
            reason: Some(reason.into()),
            changed_fields: Vec::new(),
        }
    }

    pub fn conflict(source_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            source_id: source_id.into(),
            target_id: None,
            action: MatchAction::Conflict,
            reason: Some(reason.into()),
            changed_fields: Vec::new(),
        }
    }

    /// Skip and conflict are final for the item within a run.
    pub fn is_terminal(&self) -> bool {
        matches!(self.action, MatchAction::Skip | MatchAction::Conflict)
    }
}
