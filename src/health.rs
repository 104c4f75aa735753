//! Health Check (spec §4.14): structural invariant verification over the
//! store, reported as a flat list of severity-tagged issues across five
//! categories.
//!
//! Grounded on the introspection health-check pattern in the retrieved
//! corpus (a named list of checks, each producing a status and message)
//! generalized here to return a typed report instead of printing to a
//! terminal, since this engine has no interactive surface of its own.

use serde::Serialize;

use crate::components::ComponentStore;
use crate::config::ConfigStore;
use crate::entities::EntityRegistry;
use crate::error::Result;
use crate::index::MasterIndex;
use crate::store::{ComponentType, StoreLayout, VcsBacker};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueSeverity {
    Error,
    Warning,
    Info,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueCategory {
    OrphanIndex,
    Staleness,
    EntityPresence,
    VersionControl,
    Config,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthIssue {
    pub category: IssueCategory,
    pub severity: IssueSeverity,
    pub description: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub success: bool,
    pub issues: Vec<HealthIssue>,
}

pub struct HealthCheck<'a> {
    layout: &'a StoreLayout,
}

impl<'a> HealthCheck<'a> {
    pub fn new(layout: &'a StoreLayout) -> Self {
        Self { layout }
    }

    /// Directories under `components/<type>/` with no corresponding L0
    /// line, and L0 lines with no corresponding directory, in both
    /// directions (spec §4.14 category 1).
    fn check_l0_consistency(&self, issues: &mut Vec<HealthIssue>) -> Result<()> {
        let index = MasterIndex::new(self.layout);
        let l0 = index.get()?;
        let components = ComponentStore::readonly(self.layout);

        for scope in components.list(None)? {
            let Some((ty, key)) = crate::changelog::parse_scope(&scope) else {
                continue;
            };
            let marker = format!("[{}] {key} |", ty.tag());
            if !l0.lines().any(|line| line.trim_start().starts_with(&marker)) {
                issues.push(HealthIssue {
                    category: IssueCategory::OrphanIndex,
                    severity: IssueSeverity::Warning,
                    description: format!("component {scope} exists on disk with no L0 line"),
                });
            }
        }

        for line in l0.lines() {
            let trimmed = line.trim();
            let Some(rest) = trimmed.strip_prefix('[') else {
                continue;
            };
            let Some((tag, rest)) = rest.split_once(']') else {
                continue;
            };
            let Some(ty) = ComponentType::from_tag(tag) else {
                continue;
            };
            let Some(key) = rest.trim().split(" |").next().map(str::trim) else {
                continue;
            };
            if key.is_empty() {
                continue;
            }
            if !self.layout.component_dir(ty, key).is_dir() {
                issues.push(HealthIssue {
                    category: IssueCategory::OrphanIndex,
                    severity: IssueSeverity::Warning,
                    description: format!("L0 carries [{tag}] {key} with no backing directory"),
                });
            }
        }

        Ok(())
    }

    /// A component whose changelog was modified more recently than its
    /// summary suggests the summary has fallen behind (spec §4.14
    /// category 2).
    fn check_staleness(&self, issues: &mut Vec<HealthIssue>) -> Result<()> {
        let components = ComponentStore::readonly(self.layout);
        for scope in components.list(None)? {
            let Some((ty, key)) = crate::changelog::parse_scope(&scope) else {
                continue;
            };
            let changelog_path = self.layout.component_changelog_path(ty, key);
            let summary_path = self.layout.component_summary_path(ty, key);
            let (Ok(changelog_meta), Ok(summary_meta)) =
                (std::fs::metadata(&changelog_path), std::fs::metadata(&summary_path))
            else {
                continue;
            };
            let (Ok(changelog_mtime), Ok(summary_mtime)) =
                (changelog_meta.modified(), summary_meta.modified())
            else {
                continue;
            };
            if changelog_mtime > summary_mtime {
                issues.push(HealthIssue {
                    category: IssueCategory::Staleness,
                    severity: IssueSeverity::Warning,
                    description: format!("{scope}: changelog is newer than its summary"),
                });
            }
        }
        Ok(())
    }

    /// At least one entity must be registered for the store to be useful
    /// (spec §4.14 category 3).
    fn check_entity_presence(&self, issues: &mut Vec<HealthIssue>) -> Result<()> {
        let registry = EntityRegistry::new(self.layout);
        if registry.list()?.is_empty() {
            issues.push(HealthIssue {
                category: IssueCategory::EntityPresence,
                severity: IssueSeverity::Warning,
                description: "no entities are registered".to_string(),
            });
        }
        Ok(())
    }

    /// A dirty working tree at health-check time means a prior write's
    /// commit was swallowed or never attempted (spec §4.14 category 4).
    fn check_version_control(&self, issues: &mut Vec<HealthIssue>) {
        match VcsBacker::open_or_init(self.layout.root()) {
            Ok(backer) => match backer.is_clean() {
                Ok(true) => {}
                Ok(false) => issues.push(HealthIssue {
                    category: IssueCategory::VersionControl,
                    severity: IssueSeverity::Warning,
                    description: "version-control working tree has uncommitted changes".to_string(),
                }),
                Err(err) => issues.push(HealthIssue {
                    category: IssueCategory::VersionControl,
                    severity: IssueSeverity::Error,
                    description: format!("could not read working-tree status: {err}"),
                }),
            },
            Err(err) => issues.push(HealthIssue {
                category: IssueCategory::VersionControl,
                severity: IssueSeverity::Error,
                description: format!("could not open version-control repository: {err}"),
            }),
        }
    }

    /// Config must at least parse; a malformed document blocks every
    /// other system (spec §4.14 category 5).
    fn check_config(&self, issues: &mut Vec<HealthIssue>) {
        if let Err(err) = ConfigStore::load_or_init(self.layout.config_path()) {
            issues.push(HealthIssue {
                category: IssueCategory::Config,
                severity: IssueSeverity::Error,
                description: format!("config is unreadable: {err}"),
            });
        }
    }

    /// Runs every category and reports success iff no `error`-severity
    /// issue was found.
    pub fn run(&self) -> Result<HealthReport> {
        let mut issues = Vec::new();
        self.check_l0_consistency(&mut issues)?;
        self.check_staleness(&mut issues)?;
        self.check_entity_presence(&mut issues)?;
        self.check_version_control(&mut issues);
        self.check_config(&mut issues);

        let success = !issues.iter().any(|i| i.severity == IssueSeverity::Error);
        Ok(HealthReport { success, issues })
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
    fn clean_store_with_one_entity_reports_success() {
        let (_dir, layout) = layout();
        EntityRegistry::new(&layout)
            .create("claude", "Claude", "assistant", None)
            .unwrap();
        let report = HealthCheck::new(&layout).run().unwrap();
        assert!(report.success);
    }

    #[test]
    fn removed_component_directory_is_flagged_as_orphan_index() {
        let (_dir, layout) = layout();
        let components = ComponentStore::readonly(&layout);
        components.create(ComponentType::Projects, "alpha", "# alpha\n").unwrap();
        let index = MasterIndex::new(&layout);
        index.update_entry("P", "alpha", "★ active | ⟳0101").unwrap();

        std::fs::remove_dir_all(layout.component_dir(ComponentType::Projects, "alpha")).unwrap();

        let report = HealthCheck::new(&layout).run().unwrap();
        assert!(report
            .issues
            .iter()
            .any(|i| i.category == IssueCategory::OrphanIndex && i.severity == IssueSeverity::Warning));
    }

    #[test]
    fn no_entities_is_a_warning_not_an_error() {
        let (_dir, layout) = layout();
        let report = HealthCheck::new(&layout).run().unwrap();
        assert!(report.success);
        assert!(report
            .issues
            .iter()
            .any(|i| i.category == IssueCategory::EntityPresence));
    }
}
