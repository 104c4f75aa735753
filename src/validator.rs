//! Write Validator (spec §4.10): an advisory risk check run before a
//! changelog or summary write, primarily language-model-backed with a
//! heuristic fallback.

use serde::{Deserialize, Serialize};

use crate::changelog::{ChangelogEngine, EntryKind, QueryInput};
use crate::components::ComponentStore;
use crate::error::Result;
use crate::ids::IdGenerator;
use crate::llm::LlmCaller;
use crate::store::StoreLayout;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskKind {
    Duplicate,
    Contradiction,
    Hallucination,
    StaleOverride,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Error,
    Warning,
    Info,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Risk {
    #[serde(rename = "type")]
    pub kind: RiskKind,
    pub severity: Severity,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conflicting_entry_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ValidationVerdict {
    pub passed: bool,
    #[serde(default)]
    pub risks: Vec<Risk>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteKind {
    Changelog,
    Summary,
}

#[derive(Debug, Clone)]
pub struct ValidateInput {
    pub scope: String,
    pub content: String,
    pub kind: WriteKind,
    pub existing_entries: Option<Vec<String>>,
    pub existing_summary: Option<String>,
}

pub struct WriteValidator<'a> {
    layout: &'a StoreLayout,
}

impl<'a> WriteValidator<'a> {
    pub fn new(layout: &'a StoreLayout) -> Self {
        Self { layout }
    }

    fn gather_entries(&self, scope: &str) -> Result<Vec<String>> {
        let ids = IdGenerator::new();
        let engine = ChangelogEngine::new(self.layout, &ids);
        let entries = engine.query(QueryInput {
            scope: Some(scope.to_string()),
            limit: Some(20),
            ..Default::default()
        })?;
        Ok(entries
            .into_iter()
            .map(|e| {
                let mut text = format!("[{}] {}", e.id, e.summary);
                if e.kind == EntryKind::Decision {
                    if let Some(decision) = &e.decision {
                        text.push_str(&format!(" — decision: {decision}"));
                    }
                    if let Some(rationale) = &e.rationale {
                        text.push_str(&format!(" — rationale: {rationale}"));
                    }
                }
                text
            })
            .collect())
    }

    fn gather_summary(&self, scope: &str) -> Result<Option<String>> {
        ComponentStore::readonly(self.layout).get_summary(scope)
    }

    pub async fn validate(&self, llm: &LlmCaller, input: ValidateInput) -> Result<ValidationVerdict> {
        let entries = match input.existing_entries {
            Some(entries) => entries,
            None => self.gather_entries(&input.scope).unwrap_or_default(),
        };
        let summary = match input.existing_summary {
            Some(summary) => Some(summary),
            None => self.gather_summary(&input.scope).unwrap_or(None),
        };

        if entries.is_empty() && summary.is_none() {
            return Ok(ValidationVerdict {
                passed: true,
                risks: Vec::new(),
                suggestion: None,
            });
        }

        let prompt = build_prompt(&input.content, &entries, summary.as_deref());
        match llm
            .ask(
                "You check new memory-store content for duplicates, contradictions, hallucinations, \
                 and stale overrides against existing entries. Reply with strict JSON only: \
                 {\"passed\": bool, \"risks\": [{\"type\": \"duplicate|contradiction|hallucination|stale_override\", \
                 \"severity\": \"error|warning|info\", \"description\": string, \"conflicting_entry_id\": string|null}], \
                 \"suggestion\": string|null}",
                &prompt,
                Some(500),
            )
            .await
        {
            Ok(reply) => Ok(parse_verdict(&reply)),
            Err(_) => Ok(heuristic_fallback(&input.content, &entries, summary.as_deref())),
        }
    }
}

fn build_prompt(content: &str, entries: &[String], summary: Option<&str>) -> String {
    let mut prompt = format!("NEW CONTENT:\n{content}\n\n");
    if !entries.is_empty() {
        prompt.push_str("RECENT ENTRIES:\n");
        for entry in entries {
            prompt.push_str(&format!("- {entry}\n"));
        }
        prompt.push('\n');
    }
    if let Some(summary) = summary {
        prompt.push_str(&format!("CURRENT SUMMARY:\n{summary}\n"));
    }
    prompt
}

fn strip_markdown_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    let rest = rest.trim_start_matches('\n');
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

fn parse_verdict(reply: &str) -> ValidationVerdict {
    let candidate = strip_markdown_fence(reply);
    match serde_json::from_str::<ValidationVerdict>(candidate) {
        Ok(verdict) => verdict,
        Err(_) => ValidationVerdict {
            passed: true,
            risks: vec![Risk {
                kind: RiskKind::Hallucination,
                severity: Severity::Info,
                description: "language model returned an unparseable validation response".to_string(),
                conflicting_entry_id: None,
            }],
            suggestion: None,
        },
    }
}

fn heuristic_fallback(content: &str, entries: &[String], summary: Option<&str>) -> ValidationVerdict {
    let normalized = content.trim().to_lowercase();
    let is_duplicate = |other: &str| {
        let other = other.trim().to_lowercase();
        if other == normalized {
            return true;
        }
        normalized.len() > 20 && (other.contains(&normalized) || normalized.contains(&other))
    };

    if summary.is_some_and(|s| is_duplicate(s)) || entries.iter().any(|e| is_duplicate(e)) {
        return ValidationVerdict {
            passed: false,
            risks: vec![Risk {
                kind: RiskKind::Duplicate,
                severity: Severity::Warning,
                description: "content closely matches existing summary or entry text".to_string(),
                conflicting_entry_id: None,
            }],
            suggestion: None,
        };
    }

    ValidationVerdict {
        passed: true,
        risks: Vec::new(),
        suggestion: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_json_fence() {
        let reply = "```json\n{\"passed\": true, \"risks\": []}\n```";
        let verdict = parse_verdict(reply);
        assert!(verdict.passed);
        assert!(verdict.risks.is_empty());
    }

    #[test]
    fn unparseable_reply_passes_with_info_risk() {
        let verdict = parse_verdict("not json at all");
        assert!(verdict.passed);
        assert_eq!(verdict.risks.len(), 1);
        assert_eq!(verdict.risks[0].severity, Severity::Info);
    }

    #[test]
    fn heuristic_flags_duplicate_content() {
        let verdict = heuristic_fallback(
            "we decided to use toml for config storage",
            &["we decided to use toml for config storage".to_string()],
            None,
        );
        assert!(!verdict.passed);
        assert_eq!(verdict.risks[0].kind, RiskKind::Duplicate);
    }

    #[test]
    fn heuristic_passes_distinct_content() {
        let verdict = heuristic_fallback("a completely unrelated note", &["something else entirely".to_string()], None);
        assert!(verdict.passed);
    }
}
