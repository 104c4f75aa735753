//! Workspace Sync (spec §4.13): SHA-256 diff of watched host files against
//! a persisted sync state, with bidirectional mirroring for the primary
//! identity file.

use std::collections::HashMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::config::WorkspaceSyncConfig;
use crate::entities::EntityRegistry;
use crate::error::Result;
use crate::ids::iso_now;
use crate::store::StoreLayout;

const CANDIDATE_WORKSPACE_PATHS: &[&str] = &[".", "..", "workspace"];

#[derive(Debug, Clone, Serialize, Deserialize)]
struct FileSyncState {
    sha256: String,
    last_synced: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct SyncStateDocument {
    #[serde(default)]
    files: HashMap<String, FileSyncState>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    pub workspace_path: Option<String>,
    pub changed_files: Vec<String>,
}

fn sha256_hex(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}

fn load_state(layout: &StoreLayout) -> Result<SyncStateDocument> {
    let path = layout.sync_state_path();
    if !path.exists() {
        return Ok(SyncStateDocument::default());
    }
    let text = std::fs::read_to_string(&path)?;
    if text.trim().is_empty() {
        return Ok(SyncStateDocument::default());
    }
    Ok(toml::from_str(&text)?)
}

fn store_state(layout: &StoreLayout, state: &SyncStateDocument) -> Result<()> {
    let path = layout.sync_state_path();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, toml::to_string_pretty(state)?)?;
    Ok(())
}

pub struct WorkspaceSync<'a> {
    layout: &'a StoreLayout,
}

impl<'a> WorkspaceSync<'a> {
    pub fn new(layout: &'a StoreLayout) -> Self {
        Self { layout }
    }

    fn resolve_workspace(&self, config: &WorkspaceSyncConfig) -> Option<PathBuf> {
        if let Some(explicit) = &config.workspace_path {
            return Some(PathBuf::from(explicit));
        }
        CANDIDATE_WORKSPACE_PATHS
            .iter()
            .map(PathBuf::from)
            .find(|p| p.is_dir())
    }

    /// Diffs every watched file against persisted state, backing up and
    /// mirroring changes. Never fails the caller — a missing workspace or
    /// an unreadable file is reported as zero changes, not an error.
    pub fn sync(&self, config: &WorkspaceSyncConfig, primary_entity_id: Option<&str>) -> Result<SyncReport> {
        let Some(workspace) = self.resolve_workspace(config) else {
            return Ok(SyncReport { workspace_path: None, changed_files: Vec::new() });
        };

        let mut state = load_state(self.layout)?;
        let mut changed = Vec::new();

        for name in &config.watched_files {
            let host_path = workspace.join(name);
            let Ok(content) = std::fs::read_to_string(&host_path) else {
                continue;
            };
            let hash = sha256_hex(&content);
            let differs = state.files.get(name).map(|s| s.sha256 != hash).unwrap_or(true);
            if !differs {
                continue;
            }

            let backup_path = self.layout.sync_backup_dir().join(name);
            if let Some(parent) = backup_path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(&backup_path, &content)?;

            if Some(name.as_str()) == config.primary_identity_file.as_deref() {
                if let Some(entity_id) = primary_entity_id {
                    let registry = EntityRegistry::new(self.layout);
                    if registry.get(entity_id)?.is_some() {
                        registry.update_soul(entity_id, &content, "workspace sync")?;
                    }
                }
            }

            state.files.insert(
                name.clone(),
                FileSyncState {
                    sha256: hash,
                    last_synced: iso_now(),
                },
            );
            changed.push(name.clone());
        }

        store_state(self.layout, &state)?;
        Ok(SyncReport {
            workspace_path: Some(workspace.to_string_lossy().to_string()),
            changed_files: changed,
        })
    }

    /// Reverse direction: writes `content` to the workspace copy of the
    /// primary identity file and updates its persisted hash.
    pub fn write_soul_to_workspace(&self, config: &WorkspaceSyncConfig, content: &str) -> Result<()> {
        let Some(primary) = &config.primary_identity_file else {
            return Ok(());
        };
        let Some(workspace) = self.resolve_workspace(config) else {
            return Ok(());
        };
        let host_path = workspace.join(primary);
        std::fs::write(&host_path, content)?;

        let mut state = load_state(self.layout)?;
        state.files.insert(
            primary.clone(),
            FileSyncState {
                sha256: sha256_hex(content),
                last_synced: iso_now(),
            },
        );
        store_state(self.layout, &state)
    }
}
