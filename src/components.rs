//! Component Store (spec §4.4): typed knowledge modules, each a directory
//! of `{summary, changelog, raw/}`.
//!
//! DESIGN DECISION: the L0 upsert that `create`/`update_summary` trigger is
//! not performed here — it lives in `index.rs` and is invoked by the engine
//! after this module's write succeeds, the same split used for post-write
//! events. This module only owns the component directory's own three files.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

use crate::changelog::{read_component_entries, ChangelogEntry};
use crate::error::{Error, Result};
use crate::ids::{format_mmdd, iso_now};
use crate::store::{ComponentType, StoreLayout};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadResult {
    pub summary: String,
    pub recent_changelog: Vec<ChangelogEntry>,
}

/// Everything the engine needs to upsert the L0 row after a successful
/// `create` or `update_summary`.
#[derive(Debug, Clone)]
pub struct L0Hint {
    pub tag: &'static str,
    pub key: String,
    pub status_line: String,
}

/// The loaded-scope set is handed in rather than owned, since `load`'s
/// "previously loaded" bookkeeping (spec §4.4) must outlive any single
/// `ComponentStore` instance — the engine constructs one of these per
/// dispatch call but keeps the set itself on the long-lived `Engine`.
pub struct ComponentStore<'a> {
    layout: &'a StoreLayout,
    loaded: Arc<Mutex<HashSet<String>>>,
}

impl<'a> ComponentStore<'a> {
    pub fn new(layout: &'a StoreLayout, loaded: Arc<Mutex<HashSet<String>>>) -> Self {
        Self { layout, loaded }
    }

    /// For callers that only ever read/write summaries and changelogs and
    /// never call `load`/`unload` — a private loaded-set is indistinguishable
    /// from a shared one since nothing observes it.
    pub fn readonly(layout: &'a StoreLayout) -> Self {
        Self::new(layout, Arc::new(Mutex::new(HashSet::new())))
    }

    fn scope_of(ty: ComponentType, key: &str) -> String {
        format!("{}/{key}", ty.dir_name())
    }

    pub fn list(&self, type_filter: Option<ComponentType>) -> Result<Vec<String>> {
        let types: Vec<ComponentType> = match type_filter {
            Some(ty) => vec![ty],
            None => ComponentType::all().to_vec(),
        };
        let mut scopes = Vec::new();
        for ty in types {
            let dir = self.layout.components_root().join(ty.dir_name());
            if !dir.exists() {
                continue;
            }
            for entry in std::fs::read_dir(&dir)? {
                let entry = entry?;
                if entry.file_type()?.is_dir() {
                    if let Some(key) = entry.file_name().to_str() {
                        scopes.push(Self::scope_of(ty, key));
                    }
                }
            }
        }
        scopes.sort();
        Ok(scopes)
    }

    pub fn create(&self, ty: ComponentType, key: &str, initial_summary: &str) -> Result<L0Hint> {
        std::fs::create_dir_all(self.layout.component_raw_dir(ty, key))?;
        std::fs::write(self.layout.component_summary_path(ty, key), initial_summary)?;
        if !self.layout.component_changelog_path(ty, key).exists() {
            std::fs::write(self.layout.component_changelog_path(ty, key), "entries = []\n")?;
        }

        let status_line = format!("★ active | ⟳{}", format_mmdd(iso_now()));
        Ok(L0Hint {
            tag: ty.tag(),
            key: key.to_string(),
            status_line,
        })
    }

    pub fn load(&self, scope: &str) -> Result<LoadResult> {
        let (ty, key) = crate::changelog::parse_scope(scope)
            .ok_or_else(|| Error::InvalidArgument(format!("malformed scope: {scope}")))?;
        let summary_path = self.layout.component_summary_path(ty, key);
        if !summary_path.exists() {
            return Err(Error::NotFound(format!("component summary: {scope}")));
        }
        let summary = std::fs::read_to_string(&summary_path)?;

        let mut entries = read_component_entries(self.layout, ty, key)?;
        entries.sort_by(|a, b| b.time.cmp(&a.time));
        entries.truncate(10);

        self.loaded.lock().unwrap().insert(scope.to_string());

        Ok(LoadResult {
            summary,
            recent_changelog: entries,
        })
    }

    /// Returns true iff the scope had been previously loaded in this process.
    pub fn unload(&self, scope: &str) -> bool {
        self.loaded.lock().unwrap().remove(scope)
    }

    pub fn get_summary(&self, scope: &str) -> Result<Option<String>> {
        let (ty, key) = crate::changelog::parse_scope(scope)
            .ok_or_else(|| Error::InvalidArgument(format!("malformed scope: {scope}")))?;
        let path = self.layout.component_summary_path(ty, key);
        if !path.exists() {
            return Ok(None);
        }
        Ok(Some(std::fs::read_to_string(path)?))
    }

    pub fn update_summary(&self, scope: &str, content: &str) -> Result<L0Hint> {
        let (ty, key) = crate::changelog::parse_scope(scope)
            .ok_or_else(|| Error::InvalidArgument(format!("malformed scope: {scope}")))?;
        let path = self.layout.component_summary_path(ty, key);
        if !path.exists() {
            return Err(Error::NotFound(format!("component summary: {scope}")));
        }
        std::fs::write(&path, content)?;
        let status_line = format!("★ active | ⟳{}", format_mmdd(iso_now()));
        Ok(L0Hint {
            tag: ty.tag(),
            key: key.to_string(),
            status_line,
        })
    }

    /// Sets `last_verified`/`confidence` front matter on the summary,
    /// replacing any front-matter block the summary already carries.
    pub fn verify_summary(&self, scope: &str) -> Result<()> {
        let (ty, key) = crate::changelog::parse_scope(scope)
            .ok_or_else(|| Error::InvalidArgument(format!("malformed scope: {scope}")))?;
        let path = self.layout.component_summary_path(ty, key);
        if !path.exists() {
            return Err(Error::NotFound(format!("component summary: {scope}")));
        }
        let existing = std::fs::read_to_string(&path)?;
        let body = strip_front_matter(&existing);
        let today = iso_now().format("%Y-%m-%d").to_string();
        let rewritten = format!(
            "---\nlast_verified: {today}\nconfidence: high\n---\n{body}"
        );
        std::fs::write(&path, rewritten)?;
        Ok(())
    }
}

fn strip_front_matter(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("---\n") else {
        return text;
    };
    match rest.find("\n---\n") {
        Some(idx) => &rest[idx + 5..],
        None => text,
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

    fn loaded_set() -> Arc<Mutex<HashSet<String>>> {
        Arc::new(Mutex::new(HashSet::new()))
    }

    #[test]
    fn create_then_load_reports_empty_changelog() {
        let (_dir, layout) = layout();
        let store = ComponentStore::new(&layout, loaded_set());
        let hint = store
            .create(ComponentType::Projects, "alpha", "# alpha\ninitial summary\n")
            .unwrap();
        assert_eq!(hint.tag, "P");

        let loaded = store.load("projects/alpha").unwrap();
        assert!(loaded.summary.contains("initial summary"));
        assert!(loaded.recent_changelog.is_empty());
    }

    #[test]
    fn unload_reports_whether_previously_loaded() {
        let (_dir, layout) = layout();
        let store = ComponentStore::new(&layout, loaded_set());
        store.create(ComponentType::Knowledge, "k", "body").unwrap();
        assert!(!store.unload("knowledge/k"));
        store.load("knowledge/k").unwrap();
        assert!(store.unload("knowledge/k"));
        assert!(!store.unload("knowledge/k"));
    }

    #[test]
    fn load_missing_component_is_not_found() {
        let (_dir, layout) = layout();
        let store = ComponentStore::new(&layout, loaded_set());
        let err = store.load("projects/missing").unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[test]
    fn verify_summary_replaces_existing_front_matter() {
        let (_dir, layout) = layout();
        let store = ComponentStore::new(&layout, loaded_set());
        store
            .create(ComponentType::Skills, "rust", "---\nlast_verified: 2020-01-01\nconfidence: low\n---\nbody text\n")
            .unwrap();
        store.verify_summary("skills/rust").unwrap();
        let summary = store.get_summary("skills/rust").unwrap().unwrap();
        assert!(summary.contains("confidence: high"));
        assert!(summary.contains("body text"));
        assert!(!summary.contains("confidence: low"));
    }
}
