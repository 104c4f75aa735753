//! Post-Write Hook Bus (spec §4.1).
//!
//! DESIGN DECISION: each event kind is a tagged enum variant carrying only
//! the fields relevant to it, per Design Note §9, rather than the source's
//! untyped "record of unknowns." Handlers are plain closures registered in
//! order at boot; a handler that returns `Err` is logged and does not abort
//! the triggering operation or any handler after it.

use crate::error::Result;

#[derive(Debug, Clone)]
pub enum Event {
    IdentityCreate { scope: String, summary: String },
    IdentityChange { scope: String, summary: String },
    ChangelogRecord { scope: String, summary: String, entry_id: String },
    SummaryUpdate { scope: String, summary: String },
    ComponentCreate { scope: String, summary: String },
    ComponentLoad { scope: String, summary: String },
    ComponentUnload { scope: String, summary: String },
    IndexUpdate { scope: String, summary: String },
    SystemExecute { scope: String, summary: String },
    SystemConfigure { scope: String, summary: String },
    WorkspaceSync { scope: String, summary: String },
    OnboardingComplete { scope: String, summary: String },
    ScratchWrite { scope: String, summary: String },
    ScratchPromote { scope: String, summary: String },
    SnapshotSave { scope: String, summary: String },
    RelationshipUpdate { scope: String, summary: String },
}

impl Event {
    pub fn scope(&self) -> &str {
        match self {
            Event::IdentityCreate { scope, .. }
            | Event::IdentityChange { scope, .. }
            | Event::ChangelogRecord { scope, .. }
            | Event::SummaryUpdate { scope, .. }
            | Event::ComponentCreate { scope, .. }
            | Event::ComponentLoad { scope, .. }
            | Event::ComponentUnload { scope, .. }
            | Event::IndexUpdate { scope, .. }
            | Event::SystemExecute { scope, .. }
            | Event::SystemConfigure { scope, .. }
            | Event::WorkspaceSync { scope, .. }
            | Event::OnboardingComplete { scope, .. }
            | Event::ScratchWrite { scope, .. }
            | Event::ScratchPromote { scope, .. }
            | Event::SnapshotSave { scope, .. }
            | Event::RelationshipUpdate { scope, .. } => scope,
        }
    }

    pub fn summary(&self) -> &str {
        match self {
            Event::IdentityCreate { summary, .. }
            | Event::IdentityChange { summary, .. }
            | Event::ChangelogRecord { summary, .. }
            | Event::SummaryUpdate { summary, .. }
            | Event::ComponentCreate { summary, .. }
            | Event::ComponentLoad { summary, .. }
            | Event::ComponentUnload { summary, .. }
            | Event::IndexUpdate { summary, .. }
            | Event::SystemExecute { summary, .. }
            | Event::SystemConfigure { summary, .. }
            | Event::WorkspaceSync { summary, .. }
            | Event::OnboardingComplete { summary, .. }
            | Event::ScratchWrite { summary, .. }
            | Event::ScratchPromote { summary, .. }
            | Event::SnapshotSave { summary, .. }
            | Event::RelationshipUpdate { summary, .. } => summary,
        }
    }

    /// True for events that alter persistent state and therefore warrant a
    /// version-control commit (spec §4.1's built-in commit handler subset).
    /// Every variant here does, in fact, mutate the store — the distinction
    /// exists so a future read-only event (none exist yet) would not trip
    /// a commit.
    pub fn mutates_store(&self) -> bool {
        true
    }

    /// True for events that change searchable content and therefore should
    /// schedule a debounced reindex.
    pub fn changes_searchable_content(&self) -> bool {
        matches!(
            self,
            Event::ChangelogRecord { .. }
                | Event::SummaryUpdate { .. }
                | Event::ComponentCreate { .. }
                | Event::ScratchWrite { .. }
        )
    }
}

pub type Handler = Box<dyn Fn(&Event) -> Result<()> + Send + Sync>;

/// Registry of post-write handlers, invoked in registration order.
#[derive(Default)]
pub struct EventBus {
    handlers: Vec<Handler>,
}

impl EventBus {
    pub fn new() -> Self {
        Self { handlers: Vec::new() }
    }

    pub fn register(&mut self, handler: Handler) {
        self.handlers.push(handler);
    }

    /// Emits `event` to every registered handler. A handler failure is
    /// logged via `tracing::warn!` and does not stop later handlers or
    /// propagate to the caller — per spec §7, post-write hook failures log
    /// and continue.
    pub fn emit(&self, event: Event) {
        for handler in &self.handlers {
            if let Err(err) = handler(&event) {
                tracing::warn!(scope = event.scope(), error = %err, "post-write handler failed");
            }
        }
    }
}
