//! Relationships (spec §3 data model row "Relationship Profile" + the
//! `relationship_*` operation family of §6).
//!
//! A profile is structured data backing a `relationships/<entity_id>`
//! component; the component's own summary/changelog are created on first
//! touch via `ComponentStore`, matching how every other typed component is
//! created, while the profile itself (tags, trust) lives in its own file
//! next to that component's summary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::components::ComponentStore;
use crate::error::Result;
use crate::ids::iso_now;
use crate::store::{ComponentType, StoreLayout};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelationshipType {
    User,
    Agent,
    External,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Profile {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub style: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub expertise: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub language_pref: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InteractionTag {
    pub tag: String,
    pub count: u32,
    pub last: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrustEvent {
    pub date: DateTime<Utc>,
    pub delta: f64,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelationshipProfile {
    pub entity_id: String,
    #[serde(rename = "type")]
    pub kind: RelationshipType,
    #[serde(default)]
    pub profile: Profile,
    #[serde(default)]
    pub interaction_tags: Vec<InteractionTag>,
    pub trust_score: f64,
    #[serde(default)]
    pub trust_history: Vec<TrustEvent>,
}

impl RelationshipProfile {
    fn new(entity_id: &str) -> Self {
        Self {
            entity_id: entity_id.to_string(),
            kind: RelationshipType::Agent,
            profile: Profile::default(),
            interaction_tags: Vec::new(),
            trust_score: 0.5,
            trust_history: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ProfileUpdate {
    pub kind: Option<RelationshipType>,
    pub style: Option<String>,
    pub expertise: Option<Vec<String>>,
    pub language_pref: Option<Vec<String>>,
    pub notes: Option<String>,
}

pub struct RelationshipStore<'a> {
    layout: &'a StoreLayout,
}

impl<'a> RelationshipStore<'a> {
    pub fn new(layout: &'a StoreLayout) -> Self {
        Self { layout }
    }

    pub fn get(&self, entity_id: &str) -> Result<Option<RelationshipProfile>> {
        let path = self.layout.relationship_profile_path(entity_id);
        if !path.exists() {
            return Ok(None);
        }
        let text = std::fs::read_to_string(&path)?;
        Ok(Some(toml::from_str(&text)?))
    }

    fn persist(&self, profile: &RelationshipProfile) -> Result<()> {
        let path = self.layout.relationship_profile_path(&profile.entity_id);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, toml::to_string_pretty(profile)?)?;
        Ok(())
    }

    /// Loads the profile, creating the backing component and a default
    /// profile on first touch.
    fn ensure(&self, entity_id: &str) -> Result<RelationshipProfile> {
        if let Some(profile) = self.get(entity_id)? {
            return Ok(profile);
        }
        let components = ComponentStore::readonly(self.layout);
        if components
            .get_summary(&format!("relationships/{entity_id}"))?
            .is_none()
        {
            components.create(
                ComponentType::Relationships,
                entity_id,
                &format!("# Relationship: {entity_id}\n"),
            )?;
        }
        let profile = RelationshipProfile::new(entity_id);
        self.persist(&profile)?;
        Ok(profile)
    }

    pub fn update_profile(&self, entity_id: &str, update: ProfileUpdate) -> Result<RelationshipProfile> {
        let mut profile = self.ensure(entity_id)?;
        if let Some(kind) = update.kind {
            profile.kind = kind;
        }
        if let Some(style) = update.style {
            profile.profile.style = Some(style);
        }
        if let Some(expertise) = update.expertise {
            profile.profile.expertise = expertise;
        }
        if let Some(language_pref) = update.language_pref {
            profile.profile.language_pref = language_pref;
        }
        if let Some(notes) = update.notes {
            profile.profile.notes = Some(notes);
        }
        self.persist(&profile)?;
        Ok(profile)
    }

    /// Accumulates one interaction tag count each, incrementing on repeat.
    pub fn log_interaction(&self, entity_id: &str, tags: &[String]) -> Result<RelationshipProfile> {
        let mut profile = self.ensure(entity_id)?;
        let now = iso_now();
        for tag in tags {
            if let Some(existing) = profile.interaction_tags.iter_mut().find(|t| &t.tag == tag) {
                existing.count += 1;
                existing.last = now;
            } else {
                profile.interaction_tags.push(InteractionTag {
                    tag: tag.clone(),
                    count: 1,
                    last: now,
                    note: None,
                });
            }
        }
        self.persist(&profile)?;
        Ok(profile)
    }

    pub fn update_trust(&self, entity_id: &str, delta: f64, reason: &str) -> Result<RelationshipProfile> {
        let mut profile = self.ensure(entity_id)?;
        profile.trust_score = (profile.trust_score + delta).clamp(0.0, 1.0);
        profile.trust_history.push(TrustEvent {
            date: iso_now(),
            delta,
            reason: reason.to_string(),
        });
        self.persist(&profile)?;
        Ok(profile)
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
    fn trust_score_clamps_at_bounds() {
        let (_dir, layout) = layout();
        let store = RelationshipStore::new(&layout);
        store.update_trust("alice", 0.9, "great session").unwrap();
        let profile = store.update_trust("alice", 0.9, "another great session").unwrap();
        assert_eq!(profile.trust_score, 1.0);
        assert_eq!(profile.trust_history.len(), 2);
    }

    #[test]
    fn repeated_interaction_tag_increments_count() {
        let (_dir, layout) = layout();
        let store = RelationshipStore::new(&layout);
        store.log_interaction("bob", &["pairing".to_string()]).unwrap();
        let profile = store.log_interaction("bob", &["pairing".to_string()]).unwrap();
        assert_eq!(profile.interaction_tags.len(), 1);
        assert_eq!(profile.interaction_tags[0].count, 2);
    }

    #[test]
    fn first_touch_creates_backing_component() {
        let (_dir, layout) = layout();
        let store = RelationshipStore::new(&layout);
        store.update_trust("carol", 0.1, "first contact").unwrap();
        let components = ComponentStore::readonly(&layout);
        assert!(components.get_summary("relationships/carol").unwrap().is_some());
    }
}
