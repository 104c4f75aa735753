//! Scratch (spec §4.6): append-only per-day working notes with tags and
//! promotion state.
//!
//! Grounded on the same per-day bucketing `ids.rs` already recovers counters
//! from; storage format mirrors the changelog's whole-file TOML document.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::ids::{iso_now, IdGenerator};
use crate::store::StoreLayout;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScratchEntry {
    pub id: String,
    pub time: DateTime<Utc>,
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    pub source: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub promoted_to: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct WriteInput {
    pub content: String,
    pub tags: Vec<String>,
    pub source: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ReadInput {
    pub date: Option<String>,
    pub tags: Vec<String>,
    pub include_yesterday: bool,
    pub limit: Option<usize>,
    pub exclude_promoted: bool,
}

impl Default for ReadInput {
    fn default() -> Self {
        Self {
            date: None,
            tags: Vec::new(),
            include_yesterday: false,
            limit: None,
            exclude_promoted: true,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ScratchStats {
    pub today: usize,
    pub yesterday: usize,
    pub unpromoted: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct ScratchDocument {
    #[serde(default)]
    entries: Vec<ScratchEntry>,
}

fn read_doc(path: &std::path::Path) -> Result<ScratchDocument> {
    if !path.exists() {
        return Ok(ScratchDocument::default());
    }
    let text = std::fs::read_to_string(path)?;
    if text.trim().is_empty() {
        return Ok(ScratchDocument::default());
    }
    Ok(toml::from_str(&text)?)
}

fn write_doc(path: &std::path::Path, doc: &ScratchDocument) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, toml::to_string_pretty(doc)?)?;
    Ok(())
}

fn day_bucket(date: DateTime<Utc>) -> String {
    date.format("%Y-%m-%d").to_string()
}

pub struct Scratch<'a> {
    layout: &'a StoreLayout,
    ids: &'a IdGenerator,
}

impl<'a> Scratch<'a> {
    pub fn new(layout: &'a StoreLayout, ids: &'a IdGenerator) -> Self {
        Self { layout, ids }
    }

    pub fn write(&self, input: WriteInput) -> Result<ScratchEntry> {
        let now = iso_now();
        let id = self.ids.generate_scratch_id(now, self.layout)?;
        let entry = ScratchEntry {
            id,
            time: now,
            content: input.content,
            tags: input.tags,
            source: input.source.unwrap_or_else(|| "agent".to_string()),
            promoted_to: None,
        };

        let path = self.layout.scratch_path(&day_bucket(now));
        let mut doc = read_doc(&path)?;
        doc.entries.push(entry.clone());
        write_doc(&path, &doc)?;
        Ok(entry)
    }

    pub fn read(&self, input: ReadInput) -> Result<Vec<ScratchEntry>> {
        let now = iso_now();
        let today = input.date.clone().unwrap_or_else(|| day_bucket(now));
        let mut entries = read_doc(&self.layout.scratch_path(&today))?.entries;

        if input.include_yesterday {
            let yesterday = chrono::NaiveDate::parse_from_str(&today, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.pred_opt())
                .map(|d| d.format("%Y-%m-%d").to_string())
                .unwrap_or_else(|| day_bucket(now - Duration::days(1)));
            entries.extend(read_doc(&self.layout.scratch_path(&yesterday))?.entries);
        }

        if !input.tags.is_empty() {
            entries.retain(|e| e.tags.iter().any(|t| input.tags.contains(t)));
        }
        if input.exclude_promoted {
            entries.retain(|e| e.promoted_to.is_none());
        }

        entries.sort_by(|a, b| b.time.cmp(&a.time));
        if let Some(limit) = input.limit {
            entries.truncate(limit);
        }
        Ok(entries)
    }

    /// Searches today's and yesterday's files for `scratch_id`, marking it
    /// promoted in whichever file it is found.
    pub fn promote(&self, scratch_id: &str, scope: &str) -> Result<ScratchEntry> {
        let now = iso_now();
        let today = day_bucket(now);
        let yesterday = day_bucket(now - Duration::days(1));

        for date in [today, yesterday] {
            let path = self.layout.scratch_path(&date);
            let mut doc = read_doc(&path)?;
            if let Some(entry) = doc.entries.iter_mut().find(|e| e.id == scratch_id) {
                if entry.promoted_to.is_some() {
                    return Err(Error::AlreadyPromoted(scratch_id.to_string()));
                }
                entry.promoted_to = Some(scope.to_string());
                let updated = entry.clone();
                write_doc(&path, &doc)?;
                return Ok(updated);
            }
        }
        Err(Error::NotFound(format!("scratch entry: {scratch_id}")))
    }

    pub fn stats(&self) -> Result<ScratchStats> {
        let now = iso_now();
        let today_entries = read_doc(&self.layout.scratch_path(&day_bucket(now)))?.entries;
        let yesterday_entries =
            read_doc(&self.layout.scratch_path(&day_bucket(now - Duration::days(1))))?.entries;

        let unpromoted = today_entries
            .iter()
            .chain(yesterday_entries.iter())
            .filter(|e| e.promoted_to.is_none())
            .count();

        Ok(ScratchStats {
            today: today_entries.len(),
            yesterday: yesterday_entries.len(),
            unpromoted,
        })
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
    fn write_then_read_excludes_promoted_by_default() {
        let (_dir, layout, ids) = harness();
        let scratch = Scratch::new(&layout, &ids);
        let entry = scratch
            .write(WriteInput {
                content: "remember this".into(),
                tags: vec!["idea".into()],
                source: None,
            })
            .unwrap();
        assert_eq!(entry.source, "agent");

        scratch.promote(&entry.id, "projects/alpha").unwrap();
        let visible = scratch.read(ReadInput::default()).unwrap();
        assert!(visible.is_empty());

        let all = scratch.read(ReadInput {
            exclude_promoted: false,
            ..Default::default()
        }).unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].promoted_to.as_deref(), Some("projects/alpha"));
    }

    #[test]
    fn promoting_twice_fails() {
        let (_dir, layout, ids) = harness();
        let scratch = Scratch::new(&layout, &ids);
        let entry = scratch
            .write(WriteInput {
                content: "x".into(),
                tags: vec![],
                source: None,
            })
            .unwrap();
        scratch.promote(&entry.id, "projects/a").unwrap();
        let err = scratch.promote(&entry.id, "projects/b").unwrap_err();
        assert!(matches!(err, Error::AlreadyPromoted(_)));
    }

    #[test]
    fn stats_count_unpromoted_across_both_days() {
        let (_dir, layout, ids) = harness();
        let scratch = Scratch::new(&layout, &ids);
        scratch.write(WriteInput { content: "a".into(), tags: vec![], source: None }).unwrap();
        scratch.write(WriteInput { content: "b".into(), tags: vec![], source: None }).unwrap();
        let stats = scratch.stats().unwrap();
        assert_eq!(stats.today, 2);
        assert_eq!(stats.unpromoted, 2);
    }
}
