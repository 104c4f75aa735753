//! Paths & Store Layout, and the version-control backer over that layout.

pub mod layout;
pub mod vcs;

pub use layout::{ComponentType, StoreLayout};
pub use vcs::VcsBacker;
