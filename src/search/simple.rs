//! Always-available keyword backend (spec §4.9 "Simple").

use crate::changelog::read_component_entries;
use crate::components::ComponentStore;
use crate::error::Result;
use crate::ids::iso_now;
use crate::scratch::{ReadInput, Scratch};
use crate::store::StoreLayout;

use super::{SearchBackend, SearchResult};

struct Document {
    id: String,
    content: String,
    source: &'static str,
    component: Option<String>,
}

pub struct SimpleBackend {
    layout: StoreLayout,
}

impl SimpleBackend {
    pub fn new(layout: StoreLayout) -> Self {
        Self { layout }
    }

    fn gather(&self) -> Result<Vec<Document>> {
        let mut docs = Vec::new();
        let components = ComponentStore::readonly(&self.layout);
        for scope in components.list(None)? {
            if let Some((ty, key)) = crate::changelog::parse_scope(&scope) {
                if let Some(summary) = components.get_summary(&scope)? {
                    docs.push(Document {
                        id: scope.clone(),
                        content: summary,
                        source: "summary",
                        component: Some(scope.clone()),
                    });
                }
                for entry in read_component_entries(&self.layout, ty, key)? {
                    let content = [
                        entry.action.clone(),
                        entry.target.clone(),
                        entry.decision.clone(),
                        entry.rationale.clone(),
                        Some(entry.summary.clone()),
                        entry.details.clone(),
                    ]
                    .into_iter()
                    .flatten()
                    .collect::<Vec<_>>()
                    .join(" ");
                    docs.push(Document {
                        id: entry.id,
                        content,
                        source: "changelog",
                        component: Some(scope.clone()),
                    });
                }
            }
        }

        let ids = crate::ids::IdGenerator::new();
        let scratch = Scratch::new(&self.layout, &ids);
        for entry in scratch.read(ReadInput {
            include_yesterday: true,
            exclude_promoted: false,
            ..Default::default()
        })? {
            docs.push(Document {
                id: entry.id,
                content: entry.content,
                source: "scratch",
                component: None,
            });
        }

        Ok(docs)
    }
}

impl SearchBackend for SimpleBackend {
    fn name(&self) -> &'static str {
        "simple"
    }

    fn available(&self) -> bool {
        true
    }

    fn search(&self, query: &str, scope: Option<&str>, limit: usize) -> Result<Vec<SearchResult>> {
        let terms: Vec<String> = query.split_whitespace().map(|t| t.to_lowercase()).collect();
        if terms.is_empty() {
            return Ok(Vec::new());
        }

        let mut hits: Vec<SearchResult> = self
            .gather()?
            .into_iter()
            .filter(|d| scope.is_none() || d.component.as_deref() == scope)
            .filter_map(|d| {
                let lower = d.content.to_lowercase();
                let matched = terms.iter().filter(|t| lower.contains(t.as_str())).count();
                if matched == 0 {
                    return None;
                }
                Some(SearchResult {
                    id: d.id,
                    content: d.content,
                    source: d.source.to_string(),
                    score: matched as f64 / terms.len() as f64,
                    component: d.component,
                })
            })
            .collect();

        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(limit);
        Ok(hits)
    }

    fn reindex(&self) -> Result<usize> {
        let _ = iso_now();
        Ok(self.gather()?.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::ComponentType;

    #[test]
    fn finds_matching_component_summary() {
        let dir = tempfile::tempdir().unwrap();
        let layout = StoreLayout::new(dir.path());
        layout.ensure_initialized().unwrap();
        let components = ComponentStore::readonly(&layout);
        components
            .create(ComponentType::Projects, "alpha", "alpha uses a custom retry policy")
            .unwrap();

        let backend = SimpleBackend::new(layout);
        let hits = backend.search("retry policy", None, 10).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].source, "summary");
    }

    #[test]
    fn scope_filter_excludes_other_components() {
        let dir = tempfile::tempdir().unwrap();
        let layout = StoreLayout::new(dir.path());
        layout.ensure_initialized().unwrap();
        let components = ComponentStore::readonly(&layout);
        components.create(ComponentType::Projects, "alpha", "shared vocabulary term").unwrap();
        components.create(ComponentType::Projects, "beta", "shared vocabulary term").unwrap();

        let backend = SimpleBackend::new(layout);
        let hits = backend.search("shared vocabulary", Some("projects/alpha"), 10).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].component.as_deref(), Some("projects/alpha"));
    }
}
