//! Version-control backer: append-only commit log over the store directory.
//!
//! Grounded on `dashflow-git-tool`'s use of `git2` for repository discovery
//! and commit construction. Unlike that crate (which reads history for an
//! LLM's benefit), this backer only ever writes — one commit per post-write
//! event, staging everything under the store root.

use std::path::Path;

use git2::{Repository, Signature};

use crate::error::Result;

pub struct VcsBacker {
    repo: Repository,
}

impl VcsBacker {
    /// Opens the store's repository, initializing one if this is the first
    /// run against a fresh store directory.
    pub fn open_or_init(root: &Path) -> Result<Self> {
        let repo = match Repository::open(root) {
            Ok(repo) => repo,
            Err(_) => Repository::init(root)?,
        };
        Ok(Self { repo })
    }

    /// Stages every tracked and untracked file under the store root and
    /// records a commit with message `{scope}: {summary}`.
    ///
    /// Returns `None` (never an error) when there is nothing to commit, so
    /// repeated no-op writes don't produce empty commits. Per spec §7, a
    /// version-control failure is logged and swallowed by the caller (the
    /// post-write hook bus), not propagated as a hard failure — this method
    /// itself still returns `Result` so a fatal failure is observable to a
    /// caller that wants to surface it (e.g. `system_execute` on the commit
    /// system) and only the hook-bus wrapper is responsible for swallowing.
    pub fn commit(&self, scope: &str, summary: &str) -> Result<Option<String>> {
        let mut index = self.repo.index()?;
        index.add_all(["*"].iter(), git2::IndexAddOption::DEFAULT, None)?;
        index.write()?;

        let tree_id = index.write_tree()?;
        let tree = self.repo.find_tree(tree_id)?;

        if let Ok(head) = self.repo.head() {
            if let Some(parent_tree) = head.peel_to_tree().ok() {
                if parent_tree.id() == tree.id() {
                    return Ok(None);
                }
            }
        }

        let signature = Signature::now("Memory Palace Engine", "engine@memory-palace.local")?;
        let message = format!("{scope}: {summary}");

        let parents = match self.repo.head() {
            Ok(head) => vec![head.peel_to_commit()?],
            Err(_) => vec![],
        };
        let parent_refs: Vec<&git2::Commit> = parents.iter().collect();

        let commit_id = self.repo.commit(
            Some("HEAD"),
            &signature,
            &signature,
            &message,
            &tree,
            &parent_refs,
        )?;

        Ok(Some(commit_id.to_string()))
    }

    /// True iff the working tree has no staged or unstaged changes.
    /// Consulted by the health check's version-control-cleanliness category.
    pub fn is_clean(&self) -> Result<bool> {
        let statuses = self.repo.statuses(None)?;
        Ok(statuses.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn commit_creates_history_and_is_idempotent_on_no_changes() {
        let dir = tempfile::tempdir().unwrap();
        let backer = VcsBacker::open_or_init(dir.path()).unwrap();

        fs::write(dir.path().join("snapshot"), "focus = \"x\"\n").unwrap();
        let first = backer.commit("snapshot.save", "saved snapshot").unwrap();
        assert!(first.is_some());
        assert!(backer.is_clean().unwrap());

        let second = backer.commit("snapshot.save", "no changes").unwrap();
        assert!(second.is_none());
    }
}
