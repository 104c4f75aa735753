//! Changelog Engine (spec §4.5): dual-write of operation/decision entries to
//! per-component and global month-bucketed logs.
//!
//! DESIGN DECISION: validation (step 1 of `record`) is not invoked from
//! here. The validator calls a language model and is therefore async; this
//! module stays synchronous and file-only, like the teacher's storage-layer
//! modules. The engine runs the validator first (when `validate` is set, or
//! the config says so for decisions) and passes the verdict through to its
//! own response alongside the outcome of `record`.
//!
//! Append semantics are whole-file read-modify-write of an ordered
//! sequence, matching the teacher's TOML document stores rather than a
//! line-oriented log file.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::ids::{iso_now, year_month, IdGenerator};
use crate::store::{ComponentType, StoreLayout};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    Operation,
    Decision,
}

impl EntryKind {
    fn id_prefix(self) -> &'static str {
        match self {
            EntryKind::Operation => "op",
            EntryKind::Decision => "dec",
        }
    }
}

/// One rejected option behind a decision entry (spec §8 scenario 1:
/// `alternatives=[{option:"Store Y", rejected_because:"…"}]`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alternative {
    pub option: String,
    pub rejected_because: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangelogEntry {
    pub id: String,
    pub time: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent: Option<String>,
    #[serde(rename = "type")]
    pub kind: EntryKind,
    pub scope: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decision: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rationale: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alternatives: Option<Vec<Alternative>>,
    pub summary: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commit_ref: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct RecordInput {
    pub scope: String,
    pub kind: EntryKind,
    pub agent: Option<String>,
    pub action: Option<String>,
    pub target: Option<String>,
    pub decision: Option<String>,
    pub rationale: Option<String>,
    pub alternatives: Option<Vec<Alternative>>,
    pub summary: String,
    pub details: Option<String>,
}

impl Default for EntryKind {
    fn default() -> Self {
        EntryKind::Operation
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RecordOutcome {
    pub entry: ChangelogEntry,
    pub wrote_to_component: bool,
}

#[derive(Debug, Clone, Default)]
pub struct QueryInput {
    pub scope: Option<String>,
    pub kind: Option<EntryKind>,
    pub agent: Option<String>,
    pub time_from: Option<DateTime<Utc>>,
    pub time_to: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct ChangelogDocument {
    #[serde(default)]
    entries: Vec<ChangelogEntry>,
}

fn read_document(path: &std::path::Path) -> Result<ChangelogDocument> {
    if !path.exists() {
        return Ok(ChangelogDocument::default());
    }
    let text = std::fs::read_to_string(path)?;
    if text.trim().is_empty() {
        return Ok(ChangelogDocument::default());
    }
    Ok(toml::from_str(&text)?)
}

fn write_document(path: &std::path::Path, doc: &ChangelogDocument) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let text = toml::to_string_pretty(doc)?;
    std::fs::write(path, text)?;
    Ok(())
}

/// Splits `"<type>/<key>"` into a `(ComponentType, key)` pair.
pub fn parse_scope(scope: &str) -> Option<(ComponentType, &str)> {
    let (type_part, key) = scope.split_once('/')?;
    let ty = ComponentType::from_dir_name(type_part)?;
    Some((ty, key))
}

/// Reads a single component's changelog directly, for callers (the
/// component store's `load`) that need entries without going through
/// `query`'s scope-string parsing.
pub fn read_component_entries(
    layout: &StoreLayout,
    ty: ComponentType,
    key: &str,
) -> Result<Vec<ChangelogEntry>> {
    Ok(read_document(&layout.component_changelog_path(ty, key))?.entries)
}

pub struct ChangelogEngine<'a> {
    layout: &'a StoreLayout,
    ids: &'a IdGenerator,
}

impl<'a> ChangelogEngine<'a> {
    pub fn new(layout: &'a StoreLayout, ids: &'a IdGenerator) -> Self {
        Self { layout, ids }
    }

    pub fn record(&self, input: RecordInput) -> Result<RecordOutcome> {
        let now = iso_now();
        let id = self
            .ids
            .generate_changelog_id(input.kind.id_prefix(), now, self.layout)?;

        let entry = ChangelogEntry {
            id,
            time: now,
            agent: input.agent,
            kind: input.kind,
            scope: input.scope.clone(),
            action: input.action,
            target: input.target,
            decision: input.decision,
            rationale: input.rationale,
            alternatives: input.alternatives,
            summary: input.summary,
            details: input.details,
            commit_ref: None,
        };

        let mut wrote_to_component = false;
        if let Some((ty, key)) = parse_scope(&input.scope) {
            let summary_path = self.layout.component_summary_path(ty, key);
            if summary_path.exists() {
                let changelog_path = self.layout.component_changelog_path(ty, key);
                let mut doc = read_document(&changelog_path)?;
                doc.entries.push(entry.clone());
                write_document(&changelog_path, &doc)?;
                wrote_to_component = true;
            }
        }

        let global_path = self.layout.global_changelog_path(&year_month(Some(now)));
        let mut global_doc = read_document(&global_path)?;
        global_doc.entries.push(entry.clone());
        write_document(&global_path, &global_doc)?;

        Ok(RecordOutcome {
            entry,
            wrote_to_component,
        })
    }

    pub fn query(&self, input: QueryInput) -> Result<Vec<ChangelogEntry>> {
        let doc = match &input.scope {
            Some(scope) => {
                let (ty, key) = parse_scope(scope)
                    .ok_or_else(|| Error::InvalidArgument(format!("malformed scope: {scope}")))?;
                read_document(&self.layout.component_changelog_path(ty, key))?
            }
            None => read_document(&self.layout.global_changelog_path(&year_month(None)))?,
        };

        let mut entries: Vec<ChangelogEntry> = doc
            .entries
            .into_iter()
            .filter(|e| matches_or_absent(input.kind, |k| k == e.kind))
            .filter(|e| input.agent.is_none() || input.agent.as_deref() == e.agent.as_deref())
            .filter(|e| matches_or_absent(input.time_from, |from| e.time >= from))
            .filter(|e| matches_or_absent(input.time_to, |to| e.time <= to))
            .collect();

        entries.sort_by(|a, b| b.time.cmp(&a.time));
        let limit = input.limit.unwrap_or(20);
        entries.truncate(limit);
        Ok(entries)
    }
}

fn matches_or_absent<T: Copy>(value: Option<T>, f: impl FnOnce(T) -> bool) -> bool {
    match value {
        None => true,
        Some(v) => f(v),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn harness() -> (tempfile::TempDir, StoreLayout, IdGenerator) {
        let dir = tempfile::tempdir().unwrap();
        let layout = StoreLayout::new(dir.path());
        layout.ensure_initialized().unwrap();
        (dir, layout, IdGenerator::new())
    }

    #[test]
    fn record_writes_global_only_when_component_missing() {
        let (_dir, layout, ids) = harness();
        let engine = ChangelogEngine::new(&layout, &ids);

        let outcome = engine
            .record(RecordInput {
                scope: "projects/ghost".into(),
                kind: EntryKind::Operation,
                summary: "did a thing".into(),
                ..Default::default()
            })
            .unwrap();

        assert!(!outcome.wrote_to_component);
        assert!(outcome.entry.id.starts_with("op_"));

        let results = engine.query(QueryInput::default()).unwrap();
        assert_eq!(results.len(), 1);
    }

    #[test]
    fn record_dual_writes_when_component_exists() {
        let (_dir, layout, ids) = harness();
        std::fs::create_dir_all(layout.component_dir(ComponentType::Projects, "alpha")).unwrap();
        std::fs::write(
            layout.component_summary_path(ComponentType::Projects, "alpha"),
            "# alpha\n",
        )
        .unwrap();

        let engine = ChangelogEngine::new(&layout, &ids);
        let outcome = engine
            .record(RecordInput {
                scope: "projects/alpha".into(),
                kind: EntryKind::Decision,
                decision: Some("use toml".into()),
                rationale: Some("matches the rest of the store".into()),
                summary: "picked toml for component docs".into(),
                ..Default::default()
            })
            .unwrap();

        assert!(outcome.wrote_to_component);
        assert!(outcome.entry.id.starts_with("dec_"));

        let component_entries = engine
            .query(QueryInput {
                scope: Some("projects/alpha".into()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(component_entries.len(), 1);
    }

    #[test]
    fn query_respects_limit_and_sorts_newest_first() {
        let (_dir, layout, ids) = harness();
        let engine = ChangelogEngine::new(&layout, &ids);
        for i in 0..5 {
            engine
                .record(RecordInput {
                    scope: "knowledge/misc".into(),
                    kind: EntryKind::Operation,
                    summary: format!("entry {i}"),
                    ..Default::default()
                })
                .unwrap();
        }
        let results = engine
            .query(QueryInput {
                limit: Some(3),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].summary, "entry 4");
    }
}
