//! Access Log (spec §3 data model row "Access Log"; SPEC_FULL.md §4.17).
//!
//! A single whole-file TOML map from key (`"entry:<id>"` or
//! `"component:<scope>"`) to a monotonically accumulating access count,
//! consulted by the decay engine's temperature formula.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::ids::iso_now;
use crate::store::StoreLayout;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessRecord {
    pub last_accessed: DateTime<Utc>,
    pub count: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct AccessLogDocument {
    #[serde(default)]
    entries: HashMap<String, AccessRecord>,
}

pub struct AccessLog<'a> {
    layout: &'a StoreLayout,
}

impl<'a> AccessLog<'a> {
    pub fn new(layout: &'a StoreLayout) -> Self {
        Self { layout }
    }

    fn read(&self) -> Result<AccessLogDocument> {
        let path = self.layout.access_log_path();
        if !path.exists() {
            return Ok(AccessLogDocument::default());
        }
        let text = std::fs::read_to_string(&path)?;
        if text.trim().is_empty() {
            return Ok(AccessLogDocument::default());
        }
        Ok(toml::from_str(&text)?)
    }

    fn write(&self, doc: &AccessLogDocument) -> Result<()> {
        let path = self.layout.access_log_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, toml::to_string_pretty(doc)?)?;
        Ok(())
    }

    pub fn update(&self, key: &str) -> Result<AccessRecord> {
        let mut doc = self.read()?;
        let record = doc
            .entries
            .entry(key.to_string())
            .or_insert(AccessRecord {
                last_accessed: iso_now(),
                count: 0,
            });
        record.count += 1;
        record.last_accessed = iso_now();
        let updated = record.clone();
        self.write(&doc)?;
        Ok(updated)
    }

    pub fn count(&self, key: &str) -> Result<u64> {
        Ok(self.read()?.entries.get(key).map(|r| r.count).unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn count_accumulates_monotonically() {
        let dir = tempfile::tempdir().unwrap();
        let layout = StoreLayout::new(dir.path());
        layout.ensure_initialized().unwrap();
        let log = AccessLog::new(&layout);

        assert_eq!(log.count("entry:op_0101_001").unwrap(), 0);
        log.update("entry:op_0101_001").unwrap();
        log.update("entry:op_0101_001").unwrap();
        assert_eq!(log.count("entry:op_0101_001").unwrap(), 2);
    }
}
