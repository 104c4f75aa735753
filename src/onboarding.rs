//! Onboarding (spec §6 operation family `onboarding_status`/`onboarding_init`;
//! SPEC_FULL.md §4.18-adjacent, config section `onboarding`).
//!
//! Grounded on Design Note §9's "workspace file mirroring with SHA-256 diff
//! and sentinel-delimited markdown section upsert for onboarding: keep the
//! sentinel markers exactly so that re-running is a true upsert rather than
//! append." `upsert_section` below is that upsert, applied to a standalone
//! onboarding document rather than the workspace file itself, since the
//! workspace mirror target belongs to `workspace_sync.rs`.

use serde::Serialize;

use crate::config::ConfigStore;
use crate::entities::EntityRegistry;
use crate::error::Result;
use crate::store::StoreLayout;

const SECTION_BEGIN: &str = "<!-- ONBOARDING:BEGIN -->";
const SECTION_END: &str = "<!-- ONBOARDING:END -->";

/// Entities created on first boot unless named in `skip_agents`.
const DEFAULT_AGENTS: &[(&str, &str, &str)] = &[(
    "assistant",
    "Assistant",
    "the primary agent identity for this store",
)];

#[derive(Debug, Clone, Serialize)]
pub struct OnboardingStatusReport {
    pub completed: bool,
    pub skip_agents: Vec<String>,
    pub entities: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct OnboardingInitReport {
    pub completed: bool,
    pub created_entities: Vec<String>,
    pub skipped_entities: Vec<String>,
}

pub struct Onboarding<'a> {
    layout: &'a StoreLayout,
}

impl<'a> Onboarding<'a> {
    pub fn new(layout: &'a StoreLayout) -> Self {
        Self { layout }
    }

    pub fn status(&self, config: &ConfigStore) -> Result<OnboardingStatusReport> {
        let typed = config.typed()?;
        let entities = EntityRegistry::new(self.layout).list()?;
        Ok(OnboardingStatusReport {
            completed: typed.onboarding.completed,
            skip_agents: typed.onboarding.skip_agents,
            entities,
        })
    }

    /// Idempotent: re-running with the same `skip_agents` creates no
    /// duplicate entities and rewrites rather than appends the onboarding
    /// document's sentinel-delimited section.
    pub fn init(&self, config: &mut ConfigStore, skip_agents: Vec<String>) -> Result<OnboardingInitReport> {
        let registry = EntityRegistry::new(self.layout);
        let mut created = Vec::new();
        let mut skipped = Vec::new();

        for (id, display_name, description) in DEFAULT_AGENTS {
            if skip_agents.iter().any(|s| s == id) {
                skipped.push(id.to_string());
                continue;
            }
            if registry.get(id)?.is_some() {
                skipped.push(id.to_string());
                continue;
            }
            registry.create(id, display_name, description, None)?;
            created.push(id.to_string());
        }

        config.update(
            "onboarding.skip_agents",
            toml::Value::try_from(&skip_agents)?,
        )?;
        config.update("onboarding.completed", toml::Value::Boolean(true))?;

        let body = format!(
            "Onboarding completed: {} created, {} skipped (`{}`).\n",
            created.len(),
            skipped.len(),
            skip_agents.join(", ")
        );
        self.upsert_section(&body)?;

        Ok(OnboardingInitReport {
            completed: true,
            created_entities: created,
            skipped_entities: skipped,
        })
    }

    fn upsert_section(&self, body: &str) -> Result<()> {
        let path = self.layout.onboarding_doc_path();
        let existing = std::fs::read_to_string(&path).unwrap_or_default();
        let section = format!("{SECTION_BEGIN}\n{body}{SECTION_END}");

        let rewritten = match (existing.find(SECTION_BEGIN), existing.find(SECTION_END)) {
            (Some(start), Some(end)) if start < end => {
                let mut doc = existing[..start].to_string();
                doc.push_str(&section);
                doc.push_str(&existing[end + SECTION_END.len()..]);
                doc
            }
            _ => format!("# Onboarding\n\n{section}\n"),
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, rewritten)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn harness() -> (tempfile::TempDir, StoreLayout, ConfigStore) {
        let dir = tempfile::tempdir().unwrap();
        let layout = StoreLayout::new(dir.path());
        layout.ensure_initialized().unwrap();
        let config = ConfigStore::load_or_init(layout.config_path()).unwrap();
        (dir, layout, config)
    }

    #[test]
    fn init_creates_default_agent_and_marks_completed() {
        let (_dir, layout, mut config) = harness();
        let onboarding = Onboarding::new(&layout);
        let report = onboarding.init(&mut config, Vec::new()).unwrap();
        assert_eq!(report.created_entities, vec!["assistant".to_string()]);

        let status = onboarding.status(&config).unwrap();
        assert!(status.completed);
        assert!(status.entities.contains(&"assistant".to_string()));
    }

    #[test]
    fn skip_agents_prevents_entity_creation() {
        let (_dir, layout, mut config) = harness();
        let onboarding = Onboarding::new(&layout);
        let report = onboarding
            .init(&mut config, vec!["assistant".to_string()])
            .unwrap();
        assert!(report.created_entities.is_empty());
        assert_eq!(report.skipped_entities, vec!["assistant".to_string()]);
    }

    #[test]
    fn rerunning_init_upserts_section_without_duplicating_sentinels() {
        let (_dir, layout, mut config) = harness();
        let onboarding = Onboarding::new(&layout);
        onboarding.init(&mut config, Vec::new()).unwrap();
        onboarding.init(&mut config, Vec::new()).unwrap();

        let doc = std::fs::read_to_string(layout.onboarding_doc_path()).unwrap();
        assert_eq!(doc.matches(SECTION_BEGIN).count(), 1);
        assert_eq!(doc.matches(SECTION_END).count(), 1);
    }
}
