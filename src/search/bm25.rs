//! Embedded BM25 backend (spec §4.9 "Embedded-BM25"), available only when
//! the crate is built with the `advanced-search` feature — the closest
//! Rust equivalent to the source's "available iff the library loads at
//! runtime" check, since there is no safe dynamic-load analogue.

#![cfg(feature = "advanced-search")]

use std::sync::RwLock;

use tantivy::collector::TopDocs;
use tantivy::query::QueryParser;
use tantivy::schema::{Schema, STORED, TEXT};
use tantivy::{doc, Index, IndexWriter, TantivyDocument};

use crate::changelog::read_component_entries;
use crate::components::ComponentStore;
use crate::error::{Error, Result};
use crate::scratch::{ReadInput, Scratch};
use crate::store::StoreLayout;

use super::{SearchBackend, SearchResult};

struct Built {
    index: Index,
    count: usize,
}

pub struct Bm25Backend {
    layout: StoreLayout,
    id_field: tantivy::schema::Field,
    content_field: tantivy::schema::Field,
    source_field: tantivy::schema::Field,
    component_field: tantivy::schema::Field,
    schema: Schema,
    built: RwLock<Option<Built>>,
}

impl Bm25Backend {
    pub fn new(layout: StoreLayout) -> Self {
        let mut builder = Schema::builder();
        let id_field = builder.add_text_field("id", STORED);
        let content_field = builder.add_text_field("content", TEXT | STORED);
        let source_field = builder.add_text_field("source", STORED);
        let component_field = builder.add_text_field("component", STORED | TEXT);
        let schema = builder.build();

        Self {
            layout,
            id_field,
            content_field,
            source_field,
            component_field,
            schema,
            built: RwLock::new(None),
        }
    }

    fn build_index(&self) -> Result<Built> {
        let index = Index::create_in_ram(self.schema.clone());
        let mut writer: IndexWriter = index
            .writer(15_000_000)
            .map_err(|e| Error::BackingStoreError(format!("tantivy writer: {e}")))?;

        let mut count = 0usize;
        let components = ComponentStore::readonly(&self.layout);
        for scope in components.list(None)? {
            if let Some((ty, key)) = crate::changelog::parse_scope(&scope) {
                if let Some(summary) = components.get_summary(&scope)? {
                    let truncated: String = summary.chars().take(2000).collect();
                    writer
                        .add_document(doc!(
                            self.id_field => scope.clone(),
                            self.content_field => truncated,
                            self.source_field => "summary",
                            self.component_field => scope.clone(),
                        ))
                        .map_err(|e| Error::BackingStoreError(format!("tantivy add: {e}")))?;
                    count += 1;
                }
                for entry in read_component_entries(&self.layout, ty, key)? {
                    let content = [entry.summary.clone(), entry.decision.clone(), entry.rationale.clone()]
                        .into_iter()
                        .flatten()
                        .collect::<Vec<_>>()
                        .join(" ");
                    writer
                        .add_document(doc!(
                            self.id_field => entry.id,
                            self.content_field => content,
                            self.source_field => "changelog",
                            self.component_field => scope.clone(),
                        ))
                        .map_err(|e| Error::BackingStoreError(format!("tantivy add: {e}")))?;
                    count += 1;
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
            writer
                .add_document(doc!(
                    self.id_field => entry.id,
                    self.content_field => entry.content,
                    self.source_field => "scratch",
                    self.component_field => "",
                ))
                .map_err(|e| Error::BackingStoreError(format!("tantivy add: {e}")))?;
            count += 1;
        }

        writer
            .commit()
            .map_err(|e| Error::BackingStoreError(format!("tantivy commit: {e}")))?;

        Ok(Built { index, count })
    }

    fn ensure_built(&self) -> Result<()> {
        if self.built.read().unwrap().is_some() {
            return Ok(());
        }
        let built = self.build_index()?;
        *self.built.write().unwrap() = Some(built);
        Ok(())
    }
}

impl SearchBackend for Bm25Backend {
    fn name(&self) -> &'static str {
        "bm25"
    }

    fn available(&self) -> bool {
        true
    }

    fn search(&self, query: &str, scope: Option<&str>, limit: usize) -> Result<Vec<SearchResult>> {
        self.ensure_built()?;
        let guard = self.built.read().unwrap();
        let built = guard.as_ref().expect("ensure_built just populated this");

        let reader = built
            .index
            .reader()
            .map_err(|e| Error::BackingStoreError(format!("tantivy reader: {e}")))?;
        let searcher = reader.searcher();
        let parser = QueryParser::for_index(&built.index, vec![self.content_field]);
        let parsed = parser
            .parse_query(query)
            .map_err(|e| Error::InvalidArgument(format!("bad query: {e}")))?;

        let top = searcher
            .search(&parsed, &TopDocs::with_limit(limit * 4))
            .map_err(|e| Error::BackingStoreError(format!("tantivy search: {e}")))?;

        let mut results = Vec::new();
        for (score, addr) in top {
            let retrieved: TantivyDocument = searcher
                .doc(addr)
                .map_err(|e| Error::BackingStoreError(format!("tantivy doc fetch: {e}")))?;
            let component = field_text(&retrieved, self.component_field, &self.schema);
            if let Some(scope) = scope {
                if component.as_deref() != Some(scope) {
                    continue;
                }
            }
            results.push(SearchResult {
                id: field_text(&retrieved, self.id_field, &self.schema).unwrap_or_default(),
                content: field_text(&retrieved, self.content_field, &self.schema).unwrap_or_default(),
                source: field_text(&retrieved, self.source_field, &self.schema).unwrap_or_default(),
                score: score as f64,
                component,
            });
            if results.len() >= limit {
                break;
            }
        }
        Ok(results)
    }

    fn reindex(&self) -> Result<usize> {
        let built = self.build_index()?;
        let count = built.count;
        *self.built.write().unwrap() = Some(built);
        Ok(count)
    }
}

fn field_text(doc: &TantivyDocument, field: tantivy::schema::Field, _schema: &Schema) -> Option<String> {
    doc.get_first(field).and_then(|v| v.as_str()).map(|s| s.to_string())
}
