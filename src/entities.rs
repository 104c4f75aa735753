//! Entity Registry (spec §4.3): agent identities with an append-only
//! evolution log and a slot for bidirectional workspace write-back.
//!
//! Grounded on the teacher's `session_handoff::types` document shape — one
//! TOML file per key under a directory, read/written whole. Workspace
//! mirroring itself belongs to workspace sync (§4.13); this module only
//! guarantees storage-then-evolution-log ordering and leaves mirroring to
//! the caller that knows the primary-identity mapping (the engine).

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::ids::iso_now;
use crate::store::StoreLayout;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvolutionEntry {
    pub time: DateTime<Utc>,
    pub source: String,
    pub change_summary: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostMapping {
    pub agent_id: String,
    pub watched_file_paths: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Entity {
    pub entity_id: String,
    pub display_name: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub soul_content: Option<String>,
    #[serde(default)]
    pub evolution_log: Vec<EvolutionEntry>,
    #[serde(default)]
    pub host_mappings: HashMap<String, HostMapping>,
}

pub struct EntityRegistry<'a> {
    layout: &'a StoreLayout,
}

impl<'a> EntityRegistry<'a> {
    pub fn new(layout: &'a StoreLayout) -> Self {
        Self { layout }
    }

    pub fn list(&self) -> Result<Vec<String>> {
        let dir = self.layout.entities_dir();
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut ids = Vec::new();
        for entry in std::fs::read_dir(&dir)? {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                if let Some(name) = entry.file_name().to_str() {
                    ids.push(name.to_string());
                }
            }
        }
        ids.sort();
        Ok(ids)
    }

    pub fn get(&self, entity_id: &str) -> Result<Option<Entity>> {
        let path = self.layout.entity_path(entity_id);
        if !path.exists() {
            return Ok(None);
        }
        let text = std::fs::read_to_string(&path)?;
        let entity: Entity = toml::from_str(&text)?;
        Ok(Some(entity))
    }

    pub fn get_soul(&self, entity_id: &str) -> Result<Option<String>> {
        Ok(self.get(entity_id)?.and_then(|e| e.soul_content))
    }

    fn persist(&self, entity: &Entity) -> Result<()> {
        let path = self.layout.entity_path(&entity.entity_id);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let text = toml::to_string_pretty(entity)?;
        std::fs::write(path, text)?;
        Ok(())
    }

    /// Creates or overwrites an entity. Idempotent-overwriting: an existing
    /// key is replaced wholesale rather than rejected.
    pub fn create(
        &self,
        entity_id: &str,
        display_name: &str,
        description: &str,
        initial_soul: Option<String>,
    ) -> Result<Entity> {
        let mut entity = Entity {
            entity_id: entity_id.to_string(),
            display_name: display_name.to_string(),
            description: description.to_string(),
            soul_content: initial_soul.clone(),
            evolution_log: Vec::new(),
            host_mappings: HashMap::new(),
        };
        if initial_soul.is_some() {
            entity.evolution_log.push(EvolutionEntry {
                time: iso_now(),
                source: "mp.entity.create".to_string(),
                change_summary: "entity created with initial soul content".to_string(),
                reference: None,
            });
        }
        self.persist(&entity)?;
        Ok(entity)
    }

    /// Replaces `soul_content` and appends an evolution entry. Workspace
    /// mirroring (if this entity is the primary-identity mapping) is the
    /// caller's responsibility, performed after this returns and before the
    /// post-write event is emitted.
    pub fn update_soul(&self, entity_id: &str, content: &str, reason: &str) -> Result<Entity> {
        let mut entity = self
            .get(entity_id)?
            .ok_or_else(|| Error::NotFound(format!("entity: {entity_id}")))?;
        entity.soul_content = Some(content.to_string());
        entity.evolution_log.push(EvolutionEntry {
            time: iso_now(),
            source: "mp.entity.update_soul".to_string(),
            change_summary: reason.to_string(),
            reference: None,
        });
        self.persist(&entity)?;
        Ok(entity)
    }

    pub fn log_evolution(
        &self,
        entity_id: &str,
        change_summary: &str,
        source: &str,
    ) -> Result<Entity> {
        let mut entity = self
            .get(entity_id)?
            .ok_or_else(|| Error::NotFound(format!("entity: {entity_id}")))?;
        entity.evolution_log.push(EvolutionEntry {
            time: iso_now(),
            source: source.to_string(),
            change_summary: change_summary.to_string(),
            reference: None,
        });
        self.persist(&entity)?;
        Ok(entity)
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
    fn create_with_initial_soul_logs_one_evolution_entry() {
        let (_dir, layout) = layout();
        let registry = EntityRegistry::new(&layout);
        let entity = registry
            .create("claude", "Claude", "the assistant", Some("I help.".into()))
            .unwrap();
        assert_eq!(entity.evolution_log.len(), 1);
        assert_eq!(entity.evolution_log[0].source, "mp.entity.create");

        let reloaded = registry.get("claude").unwrap().unwrap();
        assert_eq!(reloaded.soul_content.as_deref(), Some("I help."));
    }

    #[test]
    fn update_soul_requires_existing_entity() {
        let (_dir, layout) = layout();
        let registry = EntityRegistry::new(&layout);
        let err = registry
            .update_soul("ghost", "x", "reason")
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[test]
    fn update_soul_appends_evolution_with_reason_as_summary() {
        let (_dir, layout) = layout();
        let registry = EntityRegistry::new(&layout);
        registry.create("claude", "Claude", "the assistant", None).unwrap();

        let updated = registry
            .update_soul("claude", "revised soul", "learned something new")
            .unwrap();

        assert_eq!(updated.soul_content.as_deref(), Some("revised soul"));
        assert_eq!(updated.evolution_log.len(), 1);
        assert_eq!(updated.evolution_log[0].change_summary, "learned something new");
        assert_eq!(updated.evolution_log[0].source, "mp.entity.update_soul");
    }

    #[test]
    fn list_enumerates_created_entities() {
        let (_dir, layout) = layout();
        let registry = EntityRegistry::new(&layout);
        registry.create("a", "A", "", None).unwrap();
        registry.create("b", "B", "", None).unwrap();
        let ids = registry.list().unwrap();
        assert_eq!(ids, vec!["a".to_string(), "b".to_string()]);
    }
}
