//! Snapshot (spec §4.7): a singleton working-state document, overwrite-only
//! with field inheritance from the prior save.
//!
//! Grounded on the teacher's `session_handoff` document, which carries the
//! same shape (focus, active tasks, blockers, recent decisions) for exactly
//! this purpose — resuming an agent after context truncation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::ids::iso_now;
use crate::store::StoreLayout;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Active,
    Blocked,
    Waiting,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActiveTask {
    pub description: String,
    pub status: TaskStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub blockers: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Snapshot {
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_by: Option<String>,
    pub current_focus: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub active_tasks: Vec<ActiveTask>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub blockers: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub recent_decisions: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_meta: Option<toml::Value>,
}

/// Mirrors `Snapshot` but every field is optional, matching the `save`
/// operation's "unsupplied fields inherit from the prior snapshot" rule.
#[derive(Debug, Clone, Default)]
pub struct SnapshotUpdate {
    pub updated_by: Option<String>,
    pub current_focus: String,
    pub active_tasks: Option<Vec<ActiveTask>>,
    pub blockers: Option<Vec<String>>,
    pub recent_decisions: Option<Vec<String>>,
    pub context_notes: Option<String>,
    pub session_meta: Option<toml::Value>,
}

pub struct SnapshotStore<'a> {
    layout: &'a StoreLayout,
}

impl<'a> SnapshotStore<'a> {
    pub fn new(layout: &'a StoreLayout) -> Self {
        Self { layout }
    }

    pub fn read(&self) -> Result<Option<Snapshot>> {
        let path = self.layout.snapshot_path();
        if !path.exists() {
            return Ok(None);
        }
        let text = std::fs::read_to_string(&path)?;
        if text.trim().is_empty() {
            return Ok(None);
        }
        Ok(Some(toml::from_str(&text)?))
    }

    /// `current_focus` is required; every other field inherits from the
    /// previous snapshot when not supplied in `update`.
    pub fn save(&self, update: SnapshotUpdate) -> Result<Snapshot> {
        let previous = self.read()?;

        let snapshot = Snapshot {
            updated_at: Some(iso_now()),
            updated_by: update.updated_by.or_else(|| previous.as_ref().and_then(|p| p.updated_by.clone())),
            current_focus: update.current_focus,
            active_tasks: update
                .active_tasks
                .unwrap_or_else(|| previous.as_ref().map(|p| p.active_tasks.clone()).unwrap_or_default()),
            blockers: update
                .blockers
                .unwrap_or_else(|| previous.as_ref().map(|p| p.blockers.clone()).unwrap_or_default()),
            recent_decisions: update
                .recent_decisions
                .unwrap_or_else(|| previous.as_ref().map(|p| p.recent_decisions.clone()).unwrap_or_default()),
            context_notes: update
                .context_notes
                .or_else(|| previous.as_ref().and_then(|p| p.context_notes.clone())),
            session_meta: update
                .session_meta
                .or_else(|| previous.as_ref().and_then(|p| p.session_meta.clone())),
        };

        let path = self.layout.snapshot_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, toml::to_string_pretty(&snapshot)?)?;
        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout() -> (tempfile::TempDir, StoreLayout) {
        let dir = tempfile::tempdir().unwrap();
        let layout = StoreLayout::new(dir.path());
        layout.ensure_initialized().unwrap();
        (dir, layout)
    }

    #[test]
    fn read_before_first_save_is_none() {
        let (_dir, layout) = layout();
        let store = SnapshotStore::new(&layout);
        assert!(store.read().unwrap().is_none());
    }

    #[test]
    fn second_save_inherits_unsupplied_fields() {
        let (_dir, layout) = layout();
        let store = SnapshotStore::new(&layout);
        store
            .save(SnapshotUpdate {
                current_focus: "initial focus".into(),
                blockers: Some(vec!["waiting on review".into()]),
                ..Default::default()
            })
            .unwrap();

        let second = store
            .save(SnapshotUpdate {
                current_focus: "new focus".into(),
                ..Default::default()
            })
            .unwrap();

        assert_eq!(second.current_focus, "new focus");
        assert_eq!(second.blockers, vec!["waiting on review".to_string()]);
    }
}
