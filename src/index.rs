//! Three-Level Index, L0 (spec §4.8). L1 is the per-component summary
//! already owned by `components.rs`; L2 is the raw changelog/scratch body
//! consulted by the search router (`search/mod.rs`).
//!
//! The on-disk document is one fenced code block of `[TAG] key | status`
//! lines plus a trailing legend line, parsed back into the same three parts
//! (header, lines, footer) on every read so `update_entry` can upsert
//! without disturbing surrounding markdown prose.

use crate::error::Result;
use crate::ids::{format_mmdd, iso_now};
use crate::store::StoreLayout;

const DEFAULT_HEADER: &str = "# Master Index\n\n";
const DEFAULT_LEGEND: &str =
    "Legend: ★ active · ○ paused · ● done · ✕ blocked · ⟳MMDD last-updated · →focus · ⚑blocker";
const DEFAULT_FOOTER: &str = "\n";

struct IndexDocument {
    header: String,
    lines: Vec<String>,
    footer: String,
}

impl IndexDocument {
    fn default_doc() -> Self {
        Self {
            header: DEFAULT_HEADER.to_string(),
            lines: vec![DEFAULT_LEGEND.to_string()],
            footer: DEFAULT_FOOTER.to_string(),
        }
    }

    fn parse(text: &str) -> Self {
        let Some(start) = text.find("```") else {
            return Self::default_doc();
        };
        let after_open = start + 3;
        // skip an optional language tag on the same line as the opening fence
        let body_start = text[after_open..].find('\n').map(|i| after_open + i + 1).unwrap_or(after_open);
        let Some(close_rel) = text[body_start..].find("```") else {
            return Self::default_doc();
        };
        let body = &text[body_start..body_start + close_rel];
        let footer_start = body_start + close_rel + 3;

        let header = text[..start].to_string();
        let lines: Vec<String> = body.lines().map(|l| l.to_string()).collect();
        let footer = text.get(footer_start..).unwrap_or("").to_string();

        Self {
            header,
            lines: if lines.is_empty() { vec![DEFAULT_LEGEND.to_string()] } else { lines },
            footer,
        }
    }

    fn render(&self) -> String {
        format!(
            "{}```\n{}\n```\n{}",
            self.header,
            self.lines.join("\n"),
            self.footer
        )
    }

    fn legend_index(&self) -> Option<usize> {
        self.lines.iter().position(|l| l.starts_with("Legend:"))
    }

    fn upsert(&mut self, tag: &str, key: &str, status_line: &str) {
        let new_line = format!("[{tag}] {key} | {status_line}");
        let prefix = format!("[{tag}] {key} |");
        if let Some(existing) = self.lines.iter_mut().find(|l| l.starts_with(&prefix)) {
            *existing = new_line;
            return;
        }
        match self.legend_index() {
            Some(idx) => self.lines.insert(idx, new_line),
            None => self.lines.push(new_line),
        }
    }
}

pub struct MasterIndex<'a> {
    layout: &'a StoreLayout,
}

impl<'a> MasterIndex<'a> {
    pub fn new(layout: &'a StoreLayout) -> Self {
        Self { layout }
    }

    fn load(&self) -> Result<IndexDocument> {
        let path = self.layout.index_master_path();
        if !path.exists() {
            return Ok(IndexDocument::default_doc());
        }
        let text = std::fs::read_to_string(&path)?;
        Ok(IndexDocument::parse(&text))
    }

    fn store(&self, doc: &IndexDocument) -> Result<()> {
        let path = self.layout.index_master_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, doc.render())?;
        Ok(())
    }

    /// The full document, treated by callers as cheap and always-in-context.
    pub fn get(&self) -> Result<String> {
        Ok(self.load()?.render())
    }

    /// Matching non-empty lines, case-insensitive substring, optionally
    /// restricted to a single tag (`"P"`, `"K"`, `"C"`, `"R"`, `"S"`).
    pub fn search(&self, query: &str, scope: Option<&str>) -> Result<Vec<String>> {
        let doc = self.load()?;
        let needle = query.to_lowercase();
        Ok(doc
            .lines
            .into_iter()
            .filter(|l| !l.trim().is_empty() && !l.starts_with("Legend:"))
            .filter(|l| matches_scope(scope, l))
            .filter(|l| l.to_lowercase().contains(&needle))
            .collect())
    }

    /// Upserts a `[tag] key | status_line` row by `(tag, key)`.
    pub fn update_entry(&self, tag: &str, key: &str, status_line: &str) -> Result<()> {
        let mut doc = self.load()?;
        doc.upsert(tag, key, status_line);
        self.store(&doc)
    }

    pub fn format_date(&self) -> String {
        format_mmdd(iso_now())
    }

    /// Replaces the entire operational code block, used by the
    /// summarizer's monthly review rebuild (spec §4.11).
    pub fn replace_code_block(&self, lines: Vec<String>) -> Result<()> {
        let mut doc = self.load()?;
        doc.lines = if lines.iter().any(|l| l.starts_with("Legend:")) {
            lines
        } else {
            let mut lines = lines;
            lines.push(DEFAULT_LEGEND.to_string());
            lines
        };
        self.store(&doc)
    }
}

fn matches_scope(scope: Option<&str>, line: &str) -> bool {
    match scope {
        None => true,
        Some(tag) => line.starts_with(&format!("[{tag}]")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout() -> (tempfile::TempDir, StoreLayout) {
        let dir = tempfile::tempdir().unwrap();
        let layout = StoreLayout::new(dir.path());
        layout.ensure_initialized().unwrap();
        (dir, layout)
    }

    #[test]
    fn update_entry_inserts_before_legend_then_replaces_in_place() {
        let (_dir, layout) = layout();
        let index = MasterIndex::new(&layout);

        index.update_entry("P", "alpha", "★ active | ⟳0726").unwrap();
        let doc = index.get().unwrap();
        assert!(doc.contains("[P] alpha | ★ active | ⟳0726"));
        assert!(doc.contains("Legend:"));

        index.update_entry("P", "alpha", "● done | ⟳0727").unwrap();
        let doc = index.get().unwrap();
        assert_eq!(doc.matches("alpha").count(), 1);
        assert!(doc.contains("● done | ⟳0727"));
    }

    #[test]
    fn search_is_case_insensitive_and_scope_filtered() {
        let (_dir, layout) = layout();
        let index = MasterIndex::new(&layout);
        index.update_entry("P", "alpha", "★ active").unwrap();
        index.update_entry("K", "rust-notes", "★ active").unwrap();

        let hits = index.search("ALPHA", None).unwrap();
        assert_eq!(hits.len(), 1);

        let scoped = index.search("active", Some("K")).unwrap();
        assert_eq!(scoped.len(), 1);
        assert!(scoped[0].starts_with("[K]"));
    }
}
