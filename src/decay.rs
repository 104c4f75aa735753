//! Decay Engine (spec §4.12): temperature-based archival, gated by the
//! summarizer's safe watermark so nothing undigested is ever archived.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::access_log::AccessLog;
use crate::changelog::{read_component_entries, ChangelogEntry};
use crate::components::ComponentStore;
use crate::config::ConfigStore;
use crate::error::{Error, Result};
use crate::ids::iso_now;
use crate::store::{ComponentType, StoreLayout};
use crate::summarizer::Summarizer;

#[derive(Debug, Clone, Serialize)]
pub struct TemperatureBreakdown {
    pub age_base: f64,
    pub access_bonus: f64,
    pub reference_bonus: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pin_bonus: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DecayCandidate {
    pub scope: String,
    pub entry_id: String,
    pub temperature: f64,
    pub breakdown: TemperatureBreakdown,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveRecord {
    pub time: DateTime<Utc>,
    pub entries_moved: usize,
    pub components_affected: usize,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DecayTotals {
    pub entries_archived: u64,
    pub runs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DecayState {
    pub last_run: Option<DateTime<Utc>>,
    pub last_result: Option<String>,
    #[serde(default)]
    pub totals: DecayTotals,
    #[serde(default)]
    pub archive_history: Vec<ArchiveRecord>,
}

const MAX_ARCHIVE_HISTORY: usize = 50;

fn age_base(age_days: f64) -> f64 {
    if age_days < 7.0 {
        100.0
    } else if age_days < 30.0 {
        80.0
    } else if age_days < 60.0 {
        50.0
    } else if age_days < 90.0 {
        20.0
    } else {
        5.0
    }
}

fn temperature_of(
    entry: &ChangelogEntry,
    scope: &str,
    now: DateTime<Utc>,
    access_log: &AccessLog,
    pinned: &[String],
) -> Result<(f64, TemperatureBreakdown)> {
    if pinned.iter().any(|p| p == &entry.id) {
        return Ok((
            999.0,
            TemperatureBreakdown {
                age_base: 0.0,
                access_bonus: 0.0,
                reference_bonus: 0.0,
                pin_bonus: Some(999.0),
            },
        ));
    }

    let age_days = (now - entry.time).num_seconds() as f64 / 86_400.0;
    let base = age_base(age_days);
    let entry_access = access_log.count(&format!("entry:{}", entry.id))?;
    let access_bonus = (10.0 * entry_access as f64).min(50.0);
    let component_access = access_log.count(&format!("component:{scope}"))?;
    let reference_bonus = if component_access > 0 { 20.0 } else { 0.0 };

    Ok((
        base + access_bonus + reference_bonus,
        TemperatureBreakdown {
            age_base: base,
            access_bonus,
            reference_bonus,
            pin_bonus: None,
        },
    ))
}

fn load_state(layout: &StoreLayout) -> Result<DecayState> {
    let path = layout.decay_state_path();
    if !path.exists() {
        return Ok(DecayState::default());
    }
    let text = std::fs::read_to_string(&path)?;
    if text.trim().is_empty() {
        return Ok(DecayState::default());
    }
    Ok(toml::from_str(&text)?)
}

fn store_state(layout: &StoreLayout, state: &DecayState) -> Result<()> {
    let path = layout.decay_state_path();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, toml::to_string_pretty(state)?)?;
    Ok(())
}

pub struct DecayEngine<'a> {
    layout: &'a StoreLayout,
}

impl<'a> DecayEngine<'a> {
    pub fn new(layout: &'a StoreLayout) -> Self {
        Self { layout }
    }

    fn candidates(
        &self,
        max_age_days: u32,
        pinned: &[String],
        threshold: f64,
    ) -> Result<Vec<DecayCandidate>> {
        let now = iso_now();
        let access_log = AccessLog::new(self.layout);
        let summarizer = Summarizer::new(self.layout);
        let watermark = summarizer.safe_watermark()?;

        let Some(watermark) = watermark else {
            return Ok(Vec::new());
        };

        let components = ComponentStore::readonly(self.layout);
        let mut candidates = Vec::new();
        for scope in components.list(None)? {
            let Some((ty, key)) = crate::changelog::parse_scope(&scope) else {
                continue;
            };
            for entry in read_component_entries(self.layout, ty, key)? {
                let age_days = (now - entry.time).num_seconds() as f64 / 86_400.0;
                if age_days < max_age_days as f64 || entry.time > watermark {
                    continue;
                }
                let (temperature, breakdown) = temperature_of(&entry, &scope, now, &access_log, pinned)?;
                if temperature < threshold {
                    candidates.push(DecayCandidate {
                        scope: scope.clone(),
                        entry_id: entry.id,
                        temperature,
                        breakdown,
                    });
                }
            }
        }
        Ok(candidates)
    }

    pub fn preview(&self, config: &ConfigStore, threshold: Option<f64>) -> Result<Vec<DecayCandidate>> {
        let typed = config.typed()?;
        let threshold = threshold.unwrap_or(typed.decay.default_threshold);
        self.candidates(typed.decay.max_age_days, &typed.decay.pinned_entries, threshold)
    }

    pub fn run(&self, config: &ConfigStore, threshold: Option<f64>) -> Result<ArchiveRecord> {
        let typed = config.typed()?;
        let threshold = threshold.unwrap_or(typed.decay.default_threshold);
        let candidates = self.candidates(typed.decay.max_age_days, &typed.decay.pinned_entries, threshold)?;

        let mut by_scope: std::collections::HashMap<String, Vec<String>> = std::collections::HashMap::new();
        for candidate in &candidates {
            by_scope.entry(candidate.scope.clone()).or_default().push(candidate.entry_id.clone());
        }

        let mut moved = 0usize;
        for (scope, ids) in &by_scope {
            let Some((ty, key)) = crate::changelog::parse_scope(scope) else {
                continue;
            };
            let path = self.layout.component_changelog_path(ty, key);
            let text = std::fs::read_to_string(&path).unwrap_or_default();
            let mut doc: ChangelogDoc = if text.trim().is_empty() {
                ChangelogDoc::default()
            } else {
                toml::from_str(&text)?
            };

            let (to_archive, to_keep): (Vec<ChangelogEntry>, Vec<ChangelogEntry>) =
                doc.entries.into_iter().partition(|e| ids.contains(&e.id));
            doc.entries = to_keep;
            std::fs::write(&path, toml::to_string_pretty(&doc)?)?;

            for entry in to_archive {
                let year_month = crate::ids::year_month(Some(entry.time));
                let archive_path = self.layout.archive_changelog_path(ty, key, &year_month);
                if let Some(parent) = archive_path.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                let mut archived: Vec<ChangelogEntry> = if archive_path.exists() {
                    serde_yaml::from_str(&std::fs::read_to_string(&archive_path)?)?
                } else {
                    Vec::new()
                };
                archived.push(entry);
                std::fs::write(&archive_path, serde_yaml::to_string(&archived)?)?;
                moved += 1;
            }
        }

        let record = ArchiveRecord {
            time: iso_now(),
            entries_moved: moved,
            components_affected: by_scope.len(),
            reason: format!("temperature below {threshold}"),
        };

        let mut state = load_state(self.layout)?;
        state.last_run = Some(record.time);
        state.last_result = Some(format!("{moved} entries archived across {} components", by_scope.len()));
        state.totals.entries_archived += moved as u64;
        state.totals.runs += 1;
        state.archive_history.push(record.clone());
        if state.archive_history.len() > MAX_ARCHIVE_HISTORY {
            let excess = state.archive_history.len() - MAX_ARCHIVE_HISTORY;
            state.archive_history.drain(0..excess);
        }
        store_state(self.layout, &state)?;

        Ok(record)
    }

    pub fn pin(&self, config: &mut ConfigStore, entry_id: &str) -> Result<()> {
        let mut typed = config.typed()?;
        if typed.decay.pinned_entries.iter().any(|e| e == entry_id) {
            return Err(Error::InvalidArgument(format!("already pinned: {entry_id}")));
        }
        typed.decay.pinned_entries.push(entry_id.to_string());
        config.update("decay.pinned_entries", toml::Value::try_from(&typed.decay.pinned_entries)?)
    }

    pub fn unpin(&self, config: &mut ConfigStore, entry_id: &str) -> Result<()> {
        let mut typed = config.typed()?;
        typed.decay.pinned_entries.retain(|e| e != entry_id);
        config.update("decay.pinned_entries", toml::Value::try_from(&typed.decay.pinned_entries)?)
    }

    pub fn update_access_log(&self, key: &str) -> Result<()> {
        AccessLog::new(self.layout).update(key).map(|_| ())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct ChangelogDoc {
    #[serde(default)]
    entries: Vec<ChangelogEntry>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn age_base_buckets_match_spec_table() {
        assert_eq!(age_base(1.0), 100.0);
        assert_eq!(age_base(10.0), 80.0);
        assert_eq!(age_base(45.0), 50.0);
        assert_eq!(age_base(80.0), 20.0);
        assert_eq!(age_base(200.0), 5.0);
    }

    #[test]
    fn preview_returns_nothing_without_a_watermark() {
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
                summary: "old entry".into(),
                ..Default::default()
            })
            .unwrap();

        let config = ConfigStore::load_or_init(layout.config_path()).unwrap();
        let decay = DecayEngine::new(&layout);
        let candidates = decay.preview(&config, None).unwrap();
        assert!(candidates.is_empty());
    }

    #[test]
    fn pin_then_unpin_round_trips_through_config() {
        let dir = tempfile::tempdir().unwrap();
        let layout = StoreLayout::new(dir.path());
        layout.ensure_initialized().unwrap();
        let mut config = ConfigStore::load_or_init(layout.config_path()).unwrap();
        let decay = DecayEngine::new(&layout);

        decay.pin(&mut config, "op_0101_001").unwrap();
        assert!(config.typed().unwrap().decay.pinned_entries.contains(&"op_0101_001".to_string()));

        decay.unpin(&mut config, "op_0101_001").unwrap();
        assert!(!config.typed().unwrap().decay.pinned_entries.contains(&"op_0101_001".to_string()));
    }

    #[test]
    fn pinning_an_already_pinned_entry_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let layout = StoreLayout::new(dir.path());
        layout.ensure_initialized().unwrap();
        let mut config = ConfigStore::load_or_init(layout.config_path()).unwrap();
        let decay = DecayEngine::new(&layout);

        decay.pin(&mut config, "op_0101_001").unwrap();
        let err = decay.pin(&mut config, "op_0101_001").unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));

        // unpinning then re-pinning is fine — the same id just can't be pinned twice in a row.
        decay.unpin(&mut config, "op_0101_001").unwrap();
        decay.pin(&mut config, "op_0101_001").unwrap();
    }
}
