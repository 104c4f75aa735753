//! Search Router (spec §4.9): tiered backends behind a uniform result
//! shape, with runtime availability detection and debounced reindex
//! scheduling.
//!
//! Grounded on the teacher's pattern of a trait-object registry chosen at
//! boot (`pattern_index`/`content_addressing` both register concrete
//! strategies behind a shared interface); this router generalizes that to
//! three backends with a cached, resettable choice instead of a fixed one.

pub mod bm25;
pub mod external;
pub mod simple;

use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::{Error, Result};
use crate::ids::iso_now;

#[derive(Debug, Clone, Serialize)]
pub struct SearchResult {
    pub id: String,
    pub content: String,
    pub source: String,
    pub score: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub component: Option<String>,
}

pub trait SearchBackend: Send + Sync {
    fn name(&self) -> &'static str;
    fn available(&self) -> bool;
    fn search(&self, query: &str, scope: Option<&str>, limit: usize) -> Result<Vec<SearchResult>>;
    fn reindex(&self) -> Result<usize>;
}

#[derive(Debug, Clone, Serialize)]
pub struct RouterStatus {
    pub active: Option<String>,
    pub available: Vec<String>,
    pub last_reindex: Option<DateTime<Utc>>,
    pub indexed_count: usize,
}

struct RouterState {
    active: Option<String>,
    last_reindex: Option<DateTime<Utc>>,
    indexed_count: usize,
}

/// Ordered list of registered backends plus the cached active choice.
pub struct SearchRouter {
    backends: Vec<Box<dyn SearchBackend>>,
    state: Mutex<RouterState>,
    debounce: Mutex<Option<tokio::task::AbortHandle>>,
}

impl SearchRouter {
    pub fn new(backends: Vec<Box<dyn SearchBackend>>) -> Self {
        Self {
            backends,
            state: Mutex::new(RouterState {
                active: None,
                last_reindex: None,
                indexed_count: 0,
            }),
            debounce: Mutex::new(None),
        }
    }

    /// Drops the cached backend choice so the next call re-evaluates
    /// availability (`config.search.backend` changed, or a backend flipped
    /// from unavailable to available).
    pub fn reset(&self) {
        self.state.lock().unwrap().active = None;
    }

    fn choose(&self, forced: Option<&str>) -> Result<&dyn SearchBackend> {
        {
            let state = self.state.lock().unwrap();
            if let Some(active) = &state.active {
                if let Some(backend) = self.backends.iter().find(|b| b.name() == active) {
                    return Ok(backend.as_ref());
                }
            }
        }

        let chosen = match forced {
            Some(name) if name != "auto" => self
                .backends
                .iter()
                .find(|b| b.name() == name && b.available())
                .or_else(|| self.backends.iter().find(|b| b.available())),
            _ => self.backends.iter().find(|b| b.available()),
        };
        let chosen = chosen.ok_or_else(|| {
            Error::BackingStoreError("no search backend is available".to_string())
        })?;

        self.state.lock().unwrap().active = Some(chosen.name().to_string());
        Ok(chosen)
    }

    pub fn search_data(
        &self,
        query: &str,
        scope: Option<&str>,
        limit: usize,
        forced: Option<&str>,
    ) -> Result<Vec<SearchResult>> {
        self.choose(forced)?.search(query, scope, limit)
    }

    pub fn reindex(&self, forced: Option<&str>) -> Result<usize> {
        let count = self.choose(forced)?.reindex()?;
        let mut state = self.state.lock().unwrap();
        state.last_reindex = Some(iso_now());
        state.indexed_count = count;
        Ok(count)
    }

    pub fn status(&self) -> RouterStatus {
        let state = self.state.lock().unwrap();
        RouterStatus {
            active: state.active.clone(),
            available: self
                .backends
                .iter()
                .filter(|b| b.available())
                .map(|b| b.name().to_string())
                .collect(),
            last_reindex: state.last_reindex,
            indexed_count: state.indexed_count,
        }
    }

    /// Starts or restarts a single-slot debounce timer; multiple calls
    /// inside `debounce_ms` coalesce into one reindex.
    pub fn schedule_debounced_reindex(
        self: &std::sync::Arc<Self>,
        debounce_ms: u64,
        forced: Option<String>,
    ) {
        let mut slot = self.debounce.lock().unwrap();
        if let Some(handle) = slot.take() {
            handle.abort();
        }
        let router = std::sync::Arc::clone(self);
        let task = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(debounce_ms)).await;
            if let Err(err) = router.reindex(forced.as_deref()) {
                tracing::warn!(error = %err, "debounced reindex failed");
            }
        });
        *slot = Some(task.abort_handle());
    }
}
