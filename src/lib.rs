//! memory-palace-core: a local, single-process cognitive memory store for
//! autonomous agents.
//!
//! The engine persists four kinds of knowledge — agent identities,
//! typed knowledge components (projects, skills, relationships),
//! dual-layer changelog/decision records, and ephemeral scratch notes —
//! into a user-owned, version-controlled directory tree, and exposes
//! them through a single [`engine::Engine::dispatch`] entry point keyed
//! on the [`protocol::Operation`] wire enum.
//!
//! # Module map
//!
//! Leaves first, matching the dependency order laid out in the design
//! document:
//!
//! - [`store`] — on-disk layout and the version-control backer.
//! - [`ids`] — monotone per-day IDs, ISO timestamps, month/week bucketing.
//! - [`config`] — the typed config tree and its dotted-path writes.
//! - [`events`] — the post-write hook bus and its built-in handlers.
//! - [`entities`] — agent identities and their evolution log.
//! - [`components`] — typed knowledge modules (`summary`/`changelog`/`raw/`).
//! - [`changelog`] — dual-write of operation/decision entries.
//! - [`scratch`] — per-day working notes and promotion.
//! - [`snapshot`] — the singleton working-state document.
//! - [`relationships`] — per-entity trust and interaction profiles.
//! - [`index`] — the L0 master index.
//! - [`search`] — the tiered search router and its backends.
//! - [`validator`] — advisory pre-write risk checks.
//! - [`summarizer`] — the digest/synthesis/review pipeline and safe watermark.
//! - [`decay`] — temperature-based archival, gated by that watermark.
//! - [`workspace_sync`] — host-file diffing and identity mirroring.
//! - [`health`] — structural invariant verification.
//! - [`retrieval`] — progressive L0 → L1 → L2 retrieval with synthesis.
//! - [`llm`] — the sampling/direct language-model caller.
//! - [`system`] — the named-system registry driving the background passes.
//! - [`protocol`] — the wire `Operation` enum and per-call params.
//! - [`engine`] — wires every module above behind `dispatch`.
//!
//! The stdio transport that frames calls in and replies out lives in the
//! `memory-palace` binary (`src/bin/memory_palace.rs`); it is the only
//! consumer of this crate that owns a `main`.

pub mod access_log;
pub mod changelog;
pub mod components;
pub mod config;
pub mod decay;
pub mod engine;
pub mod entities;
pub mod error;
pub mod events;
pub mod health;
pub mod ids;
pub mod index;
pub mod llm;
pub mod onboarding;
pub mod protocol;
pub mod relationships;
pub mod retrieval;
pub mod scratch;
pub mod search;
pub mod snapshot;
pub mod store;
pub mod summarizer;
pub mod system;
pub mod validator;
pub mod workspace_sync;

pub use engine::Engine;
pub use error::{Error, Result};

pub const VERSION_MAJOR: u32 = 0;
pub const VERSION_MINOR: u32 = 1;
pub const VERSION_PATCH: u32 = 0;

/// Returns the library version as a semantic version string.
pub fn version() -> String {
    format!("{}.{}.{}", VERSION_MAJOR, VERSION_MINOR, VERSION_PATCH)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_string_is_semver() {
        let ver = version();
        assert_eq!(ver, "0.1.0");
        assert_eq!(ver.split('.').count(), 3);
    }
}
