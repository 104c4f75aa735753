//! Retrieval + Digest (spec §4.15): turns a natural-language query into a
//! synthesized answer by combining the L0 index, component summaries, and
//! a full-text search pass, then asking the language model to write it up.
//!
//! Grounded on the summarizer's own "gather context, ask the model, fall
//! back to the raw material on failure" shape (`summarizer.rs`'s `digest`);
//! this module runs the read-only counterpart of that pipeline.

use serde::Serialize;

use crate::components::ComponentStore;
use crate::error::Result;
use crate::index::MasterIndex;
use crate::llm::LlmCaller;
use crate::search::{SearchResult, SearchRouter};
use crate::store::StoreLayout;

const MAX_SCOPES: usize = 5;
const FALLBACK_SCOPES: usize = 3;

#[derive(Debug, Clone, Serialize)]
pub struct RetrievalReport {
    pub scopes: Vec<String>,
    pub hits: Vec<SearchResult>,
    pub summaries: Vec<(String, String)>,
    pub synthesized: bool,
    pub answer: String,
}

pub struct Retrieval<'a> {
    layout: &'a StoreLayout,
}

impl<'a> Retrieval<'a> {
    pub fn new(layout: &'a StoreLayout) -> Self {
        Self { layout }
    }

    /// Matching L0 lines mapped back to `<type>/<key>` scopes, capped at
    /// `MAX_SCOPES`. Falls back to the first `FALLBACK_SCOPES` known
    /// components when nothing in L0 matches the query.
    fn relevant_scopes(&self, query: &str) -> Result<Vec<String>> {
        let index = MasterIndex::new(self.layout);
        let lines = index.search(query, None)?;

        let mut scopes: Vec<String> = Vec::new();
        for line in &lines {
            if let Some(scope) = scope_from_index_line(line) {
                if !scopes.contains(&scope) {
                    scopes.push(scope);
                }
            }
            if scopes.len() >= MAX_SCOPES {
                break;
            }
        }

        if scopes.is_empty() {
            let components = ComponentStore::readonly(self.layout);
            scopes = components.list(None)?.into_iter().take(FALLBACK_SCOPES).collect();
        }

        Ok(scopes)
    }

    pub async fn retrieve(
        &self,
        router: &SearchRouter,
        llm: &LlmCaller,
        query: &str,
        scope: Option<&str>,
    ) -> Result<RetrievalReport> {
        let scopes = match scope {
            Some(scope) => vec![scope.to_string()],
            None => self.relevant_scopes(query)?,
        };

        let components = ComponentStore::readonly(self.layout);
        let mut summaries = Vec::new();
        for scope in &scopes {
            if let Some(summary) = components.get_summary(scope)? {
                summaries.push((scope.clone(), summary));
            }
        }

        let hits = router.search_data(query, scope, 15, None).unwrap_or_default();

        let context = format!(
            "QUERY: {query}\n\nCOMPONENT SUMMARIES:\n{}\n\nSEARCH HITS:\n{}",
            summaries
                .iter()
                .map(|(scope, body)| format!("## {scope}\n{body}"))
                .collect::<Vec<_>>()
                .join("\n\n"),
            hits.iter()
                .map(|h| format!("- [{}] ({}) {}", h.id, h.source, h.content))
                .collect::<Vec<_>>()
                .join("\n")
        );

        match llm
            .ask(
                "Answer the query using only the material provided. Cite which component or \
                 search hit each claim comes from. If the material doesn't answer the query, say so.",
                &context,
                Some(800),
            )
            .await
        {
            Ok(answer) => Ok(RetrievalReport {
                scopes,
                hits,
                summaries,
                synthesized: true,
                answer,
            }),
            Err(_) => {
                let fallback = format!(
                    "No synthesis available. Raw material follows.\n\n{}",
                    summaries
                        .iter()
                        .map(|(scope, body)| format!("## {scope}\n{body}"))
                        .collect::<Vec<_>>()
                        .join("\n\n")
                );
                Ok(RetrievalReport {
                    scopes,
                    hits,
                    summaries,
                    synthesized: false,
                    answer: fallback,
                })
            }
        }
    }
}

fn scope_from_index_line(line: &str) -> Option<String> {
    let rest = line.trim_start().strip_prefix('[')?;
    let (tag, rest) = rest.split_once(']')?;
    let ty = crate::store::ComponentType::from_tag(tag)?;
    let key = rest.trim().split(" |").next()?.trim();
    if key.is_empty() {
        return None;
    }
    Some(format!("{}/{key}", ty.dir_name()))
}
