//! Deterministic directory layout rooted at the configured store directory.
//!
//! DESIGN DECISION: every other module asks `StoreLayout` for a path instead
//! of building one itself. This keeps the on-disk layout (spec §6) specified
//! in exactly one place and makes the health check's filesystem walk and the
//! component store's directory creation agree by construction.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// The four knowledge-component families the L0 index tags as P/K/C/R.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentType {
    Projects,
    Knowledge,
    Skills,
    Relationships,
}

impl ComponentType {
    /// L0 tag glyph: P=projects, K=knowledge, C=skills, R=relationships.
    pub fn tag(self) -> &'static str {
        match self {
            ComponentType::Projects => "P",
            ComponentType::Knowledge => "K",
            ComponentType::Skills => "C",
            ComponentType::Relationships => "R",
        }
    }

    /// Directory name under `components/`.
    pub fn dir_name(self) -> &'static str {
        match self {
            ComponentType::Projects => "projects",
            ComponentType::Knowledge => "knowledge",
            ComponentType::Skills => "skills",
            ComponentType::Relationships => "relationships",
        }
    }

    pub fn from_dir_name(name: &str) -> Option<Self> {
        match name {
            "projects" => Some(ComponentType::Projects),
            "knowledge" => Some(ComponentType::Knowledge),
            "skills" => Some(ComponentType::Skills),
            "relationships" => Some(ComponentType::Relationships),
            _ => None,
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "P" => Some(ComponentType::Projects),
            "K" => Some(ComponentType::Knowledge),
            "C" => Some(ComponentType::Skills),
            "R" => Some(ComponentType::Relationships),
            _ => None,
        }
    }

    pub fn all() -> [ComponentType; 4] {
        [
            ComponentType::Projects,
            ComponentType::Knowledge,
            ComponentType::Skills,
            ComponentType::Relationships,
        ]
    }
}

/// Root-relative path accessors for the store tree described in spec §6.
#[derive(Debug, Clone)]
pub struct StoreLayout {
    root: PathBuf,
}

impl StoreLayout {
    /// Default store directory: `~/.open-palace`. Callers may point
    /// elsewhere via config/environment at boot.
    pub fn default_root() -> Result<PathBuf> {
        let home = dirs::home_dir()
            .ok_or_else(|| Error::InvalidArgument("could not resolve home directory".into()))?;
        Ok(home.join(".open-palace"))
    }

    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Creates every directory this layout names, idempotently.
    pub fn ensure_initialized(&self) -> Result<()> {
        for dir in [
            self.entities_dir(),
            self.components_root(),
            self.index_weekly_dir(),
            self.index_monthly_dir(),
            self.changelogs_dir(),
            self.scratch_dir(),
            self.sync_dir(),
            self.sync_backup_dir(),
            self.archive_components_root(),
            self.version_control_dir().parent().unwrap().to_path_buf(),
        ] {
            std::fs::create_dir_all(&dir)?;
        }
        Ok(())
    }

    pub fn config_path(&self) -> PathBuf {
        self.root.join("config")
    }

    pub fn version_control_dir(&self) -> PathBuf {
        self.root.join(".version-control")
    }

    pub fn index_master_path(&self) -> PathBuf {
        self.root.join("index").join("master")
    }

    pub fn index_weekly_dir(&self) -> PathBuf {
        self.root.join("index").join("weekly")
    }

    pub fn index_weekly_path(&self, iso_year: i32, iso_week: u32) -> PathBuf {
        self.index_weekly_dir()
            .join(format!("{iso_year}-W{iso_week:02}.md"))
    }

    pub fn index_monthly_dir(&self) -> PathBuf {
        self.root.join("index").join("monthly")
    }

    pub fn index_monthly_path(&self, year_month: &str) -> PathBuf {
        self.index_monthly_dir().join(format!("{year_month}.md"))
    }

    pub fn entities_dir(&self) -> PathBuf {
        self.root.join("entities")
    }

    pub fn entity_path(&self, entity_id: &str) -> PathBuf {
        self.entities_dir().join(entity_id)
    }

    pub fn components_root(&self) -> PathBuf {
        self.root.join("components")
    }

    pub fn component_dir(&self, ty: ComponentType, key: &str) -> PathBuf {
        self.components_root().join(ty.dir_name()).join(key)
    }

    pub fn component_summary_path(&self, ty: ComponentType, key: &str) -> PathBuf {
        self.component_dir(ty, key).join("summary")
    }

    pub fn component_changelog_path(&self, ty: ComponentType, key: &str) -> PathBuf {
        self.component_dir(ty, key).join("changelog")
    }

    pub fn component_raw_dir(&self, ty: ComponentType, key: &str) -> PathBuf {
        self.component_dir(ty, key).join("raw")
    }

    /// Structured relationship-profile data backing `relationships/<entity_id>`,
    /// stored alongside that component's summary/changelog/raw files.
    pub fn relationship_profile_path(&self, entity_id: &str) -> PathBuf {
        self.component_dir(ComponentType::Relationships, entity_id)
            .join("profile")
    }

    pub fn changelogs_dir(&self) -> PathBuf {
        self.root.join("changelogs")
    }

    pub fn global_changelog_path(&self, year_month: &str) -> PathBuf {
        self.changelogs_dir().join(year_month)
    }

    pub fn scratch_dir(&self) -> PathBuf {
        self.root.join("scratch")
    }

    pub fn scratch_path(&self, date: &str) -> PathBuf {
        self.scratch_dir().join(date)
    }

    pub fn snapshot_path(&self) -> PathBuf {
        self.root.join("snapshot")
    }

    pub fn sync_dir(&self) -> PathBuf {
        self.root.join("sync")
    }

    pub fn sync_state_path(&self) -> PathBuf {
        self.sync_dir().join("sync-state")
    }

    pub fn sync_backup_dir(&self) -> PathBuf {
        self.sync_dir().join("workspace-backup")
    }

    pub fn archive_components_root(&self) -> PathBuf {
        self.root.join("archive").join("components")
    }

    pub fn archive_changelog_path(&self, ty: ComponentType, key: &str, year_month: &str) -> PathBuf {
        self.archive_components_root()
            .join(ty.dir_name())
            .join(key)
            .join(format!("changelog-archived-{year_month}.yaml"))
    }

    pub fn ingest_state_path(&self) -> PathBuf {
        self.root.join("ingest-state")
    }

    pub fn decay_state_path(&self) -> PathBuf {
        self.root.join("decay-state")
    }

    pub fn access_log_path(&self) -> PathBuf {
        self.root.join("access-log")
    }

    pub fn summarizer_state_path(&self) -> PathBuf {
        self.root.join("summarizer-state")
    }

    pub fn system_state_path(&self) -> PathBuf {
        self.root.join("system-state")
    }

    pub fn onboarding_doc_path(&self) -> PathBuf {
        self.root.join("ONBOARDING.md")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn component_paths_round_trip_type_tags() {
        for ty in ComponentType::all() {
            assert_eq!(ComponentType::from_tag(ty.tag()), Some(ty));
            assert_eq!(ComponentType::from_dir_name(ty.dir_name()), Some(ty));
        }
    }

    #[test]
    fn layout_paths_are_rooted() {
        let layout = StoreLayout::new("/tmp/store-example");
        assert_eq!(
            layout.component_summary_path(ComponentType::Projects, "alpha"),
            PathBuf::from("/tmp/store-example/components/projects/alpha/summary")
        );
        assert_eq!(
            layout.global_changelog_path("2026-07"),
            PathBuf::from("/tmp/store-example/changelogs/2026-07")
        );
    }
}
