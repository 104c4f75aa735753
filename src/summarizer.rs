//! Summarizer Pipeline (spec §4.11): three scheduled tiers sharing one
//! state file, exposing the "safe watermark" that gates the decay engine.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::changelog::{read_component_entries, ChangelogEntry};
use crate::components::ComponentStore;
use crate::error::Result;
use crate::ids::iso_now;
use crate::index::MasterIndex;
use crate::llm::LlmCaller;
use crate::store::StoreLayout;

const REVIEW_SENTINEL: &str = "===MONTHLY_REVIEW_NARRATIVE===";

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SummarizerState {
    pub last_digest: Option<DateTime<Utc>>,
    pub last_synthesis: Option<DateTime<Utc>>,
    pub last_review: Option<DateTime<Utc>>,
    #[serde(default)]
    pub digest_coverage: HashMap<String, DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ComponentDigestOutcome {
    pub scope: String,
    pub updated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DigestReport {
    pub success: bool,
    pub components: Vec<ComponentDigestOutcome>,
}

fn load_state(layout: &StoreLayout) -> Result<SummarizerState> {
    let path = layout.summarizer_state_path();
    if !path.exists() {
        return Ok(SummarizerState::default());
    }
    let text = std::fs::read_to_string(&path)?;
    if text.trim().is_empty() {
        return Ok(SummarizerState::default());
    }
    Ok(toml::from_str(&text)?)
}

fn store_state(layout: &StoreLayout, state: &SummarizerState) -> Result<()> {
    let path = layout.summarizer_state_path();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, toml::to_string_pretty(state)?)?;
    Ok(())
}

pub struct Summarizer<'a> {
    layout: &'a StoreLayout,
}

impl<'a> Summarizer<'a> {
    pub fn new(layout: &'a StoreLayout) -> Self {
        Self { layout }
    }

    /// Minimum digest coverage time across every component with any
    /// changelog activity. `None` means at least one such component has
    /// never been digested — decay treats that as "nothing safe to
    /// archive."
    pub fn safe_watermark(&self) -> Result<Option<DateTime<Utc>>> {
        let state = load_state(self.layout)?;
        let components = ComponentStore::readonly(self.layout);
        let mut watermark: Option<DateTime<Utc>> = None;

        for scope in components.list(None)? {
            let Some((ty, key)) = crate::changelog::parse_scope(&scope) else {
                continue;
            };
            let entries = read_component_entries(self.layout, ty, key)?;
            if entries.is_empty() {
                continue;
            }
            let Some(coverage) = state.digest_coverage.get(&scope) else {
                return Ok(None);
            };
            watermark = Some(match watermark {
                Some(current) if current < *coverage => current,
                _ => *coverage,
            });
        }

        Ok(watermark)
    }

    pub async fn digest(&self, llm: &LlmCaller, scope_filter: Option<&str>) -> Result<DigestReport> {
        let mut state = load_state(self.layout)?;
        let components = ComponentStore::readonly(self.layout);
        let scopes: Vec<String> = match scope_filter {
            Some(scope) => vec![scope.to_string()],
            None => components.list(None)?,
        };

        let mut outcomes = Vec::new();
        let mut success = true;

        for scope in scopes {
            let Some((ty, key)) = crate::changelog::parse_scope(&scope) else {
                outcomes.push(ComponentDigestOutcome {
                    scope,
                    updated: false,
                    error: Some("malformed scope".to_string()),
                });
                success = false;
                continue;
            };

            let entries = match read_component_entries(self.layout, ty, key) {
                Ok(entries) => entries,
                Err(err) => {
                    outcomes.push(ComponentDigestOutcome { scope, updated: false, error: Some(err.to_string()) });
                    success = false;
                    continue;
                }
            };

            let watermark = state.digest_coverage.get(&scope).copied();
            let pending: Vec<&ChangelogEntry> = entries
                .iter()
                .filter(|e| watermark_allows(watermark, e.time))
                .collect();

            if pending.is_empty() {
                outcomes.push(ComponentDigestOutcome { scope, updated: false, error: None });
                continue;
            }

            let current_summary = components.get_summary(&scope).unwrap_or(None).unwrap_or_default();
            let prompt = format!(
                "CURRENT SUMMARY:\n{current_summary}\n\nNEW ENTRIES:\n{}",
                pending
                    .iter()
                    .map(|e| format!("- [{}] {}", e.id, e.summary))
                    .collect::<Vec<_>>()
                    .join("\n")
            );

            match llm
                .ask(
                    "Update this component's markdown summary to integrate the new changelog \
                     entries. Preserve the existing structure and headings. Reply with the full \
                     updated markdown only.",
                    &prompt,
                    Some(1200),
                )
                .await
            {
                Ok(updated_summary) => {
                    if let Err(err) = components.update_summary(&scope, &updated_summary) {
                        outcomes.push(ComponentDigestOutcome { scope, updated: false, error: Some(err.to_string()) });
                        success = false;
                        continue;
                    }
                    let latest = pending.iter().map(|e| e.time).max().expect("pending is non-empty");
                    state.digest_coverage.insert(scope.clone(), latest);
                    outcomes.push(ComponentDigestOutcome { scope, updated: true, error: None });
                }
                Err(err) => {
                    outcomes.push(ComponentDigestOutcome { scope, updated: false, error: Some(err.to_string()) });
                    success = false;
                }
            }
        }

        if success {
            state.last_digest = Some(iso_now());
        }
        store_state(self.layout, &state)?;

        Ok(DigestReport { success, components: outcomes })
    }

    pub async fn synthesis(&self, llm: &LlmCaller) -> Result<String> {
        let components = ComponentStore::readonly(self.layout);
        let mut combined = String::new();
        for scope in components.list(None)? {
            if let Some(summary) = components.get_summary(&scope)? {
                combined.push_str(&format!("## {scope}\n{summary}\n\n"));
            }
        }

        let ids = crate::ids::IdGenerator::new();
        let engine = crate::changelog::ChangelogEngine::new(self.layout, &ids);
        let recent = engine.query(crate::changelog::QueryInput { limit: Some(50), ..Default::default() })?;
        let recent_text: String = recent.iter().map(|e| format!("- [{}] {}", e.id, e.summary)).collect::<Vec<_>>().join("\n");

        let report = llm
            .ask(
                "Write a cross-component weekly synthesis report in markdown, highlighting \
                 themes and connections across the summaries and recent activity provided.",
                &format!("COMPONENT SUMMARIES:\n{combined}\nRECENT GLOBAL ACTIVITY:\n{recent_text}"),
                Some(1200),
            )
            .await?;

        let now = iso_now();
        let (year, week) = crate::ids::iso_week(Some(now));
        let path = self.layout.index_weekly_path(year, week);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, &report)?;

        let mut state = load_state(self.layout)?;
        state.last_synthesis = Some(now);
        store_state(self.layout, &state)?;

        Ok(report)
    }

    pub async fn review(&self, llm: &LlmCaller) -> Result<String> {
        let index = MasterIndex::new(self.layout);
        let current_l0 = index.get()?;

        let components = ComponentStore::readonly(self.layout);
        let mut summaries = String::new();
        for scope in components.list(None)? {
            if let Some(summary) = components.get_summary(&scope)? {
                summaries.push_str(&format!("## {scope}\n{summary}\n\n"));
            }
        }

        let weekly_dir = self.layout.index_weekly_dir();
        let mut weekly_reports = String::new();
        if weekly_dir.exists() {
            for entry in std::fs::read_dir(&weekly_dir)? {
                let entry = entry?;
                if entry.file_type()?.is_file() {
                    weekly_reports.push_str(&std::fs::read_to_string(entry.path())?);
                    weekly_reports.push('\n');
                }
            }
        }

        let prompt = format!(
            "CURRENT L0:\n{current_l0}\n\nALL SUMMARIES:\n{summaries}\n\nRECENT WEEKLY REPORTS:\n{weekly_reports}"
        );
        let reply = llm
            .ask(
                &format!(
                    "Rebuild the L0 master index code block from the material provided, then \
                     write a monthly review narrative. Reply with the rebuilt code block first, \
                     then the line `{REVIEW_SENTINEL}`, then the narrative."
                ),
                &prompt,
                Some(2000),
            )
            .await?;

        let (code_block, narrative) = reply
            .split_once(REVIEW_SENTINEL)
            .unwrap_or((reply.as_str(), ""));

        let lines: Vec<String> = code_block
            .lines()
            .map(|l| l.trim())
            .filter(|l| !l.is_empty() && !l.starts_with("```"))
            .map(|l| l.to_string())
            .collect();
        index.replace_code_block(lines)?;

        let now = iso_now();
        let monthly_path = self.layout.index_monthly_path(&crate::ids::year_month(Some(now)));
        if let Some(parent) = monthly_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&monthly_path, narrative.trim())?;

        let mut state = load_state(self.layout)?;
        state.last_review = Some(now);
        store_state(self.layout, &state)?;

        Ok(narrative.trim().to_string())
    }
}

fn watermark_allows(watermark: Option<DateTime<Utc>>, entry_time: DateTime<Utc>) -> bool {
    match watermark {
        None => true,
        Some(w) => entry_time > w,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::ComponentType;
    use std::sync::Arc;

    fn stub_llm(reply: &'static str) -> LlmCaller {
        let callback: crate::llm::SamplingCallback = Arc::new(move |_sys, _user, _max| {
            Box::pin(async move { Ok(reply.to_string()) })
        });
        LlmCaller::new(
            crate::config::LlmConfig {
                mode: "sampling".to_string(),
                ..Default::default()
            },
            Some(callback),
        )
    }

    #[tokio::test]
    async fn digest_advances_coverage_and_rewrites_summary() {
        let dir = tempfile::tempdir().unwrap();
        let layout = StoreLayout::new(dir.path());
        layout.ensure_initialized().unwrap();

        let components = ComponentStore::readonly(&layout);
        components.create(ComponentType::Projects, "alpha", "# alpha\noriginal\n").unwrap();

        let ids = crate::ids::IdGenerator::new();
        let engine = crate::changelog::ChangelogEngine::new(&layout, &ids);
        engine
            .record(crate::changelog::RecordInput {
                scope: "projects/alpha".into(),
                kind: crate::changelog::EntryKind::Operation,
                summary: "did something".into(),
                ..Default::default()
            })
            .unwrap();

        let llm = stub_llm("# alpha\nupdated summary\n");
        let summarizer = Summarizer::new(&layout);
        let report = summarizer.digest(&llm, None).await.unwrap();
        assert!(report.success);
        assert!(report.components.iter().any(|c| c.scope == "projects/alpha" && c.updated));

        let summary = components.get_summary("projects/alpha").unwrap().unwrap();
        assert!(summary.contains("updated summary"));
    }

    #[test]
    fn watermark_is_none_when_any_component_undigested() {
        let dir = tempfile::tempdir().unwrap();
        let layout = StoreLayout::new(dir.path());
        layout.ensure_initialized().unwrap();
        let components = ComponentStore::readonly(&layout);
        components.create(ComponentType::Knowledge, "k", "body").unwrap();

        let ids = crate::ids::IdGenerator::new();
        let engine = crate::changelog::ChangelogEngine::new(&layout, &ids);
        engine
            .record(crate::changelog::RecordInput {
                scope: "knowledge/k".into(),
                kind: crate::changelog::EntryKind::Operation,
                summary: "x".into(),
                ..Default::default()
            })
            .unwrap();

        let summarizer = Summarizer::new(&layout);
        assert!(summarizer.safe_watermark().unwrap().is_none());
    }
}
