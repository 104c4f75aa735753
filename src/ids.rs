//! Identifier & Time Services (spec §4.2).
//!
//! DESIGN DECISION: the per-day counter is recovered from disk, not just
//! carried in memory. Two copies of the original existed and disagreed on
//! this; the recovered variant is the one spec'd here — the alternative
//! risks duplicate IDs after a same-day process restart.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use regex::Regex;

use crate::error::{Error, Result};
use crate::store::StoreLayout;

pub fn iso_now() -> DateTime<Utc> {
    Utc::now()
}

pub fn format_mmdd(date: DateTime<Utc>) -> String {
    date.format("%m%d").to_string()
}

/// `YYYY-MM` bucket for a timestamp, defaulting to now.
pub fn year_month(date: Option<DateTime<Utc>>) -> String {
    let date = date.unwrap_or_else(iso_now);
    date.format("%Y-%m").to_string()
}

/// ISO-8601 (year, week) for a timestamp, defaulting to now.
pub fn iso_week(date: Option<DateTime<Utc>>) -> (i32, u32) {
    let date = date.unwrap_or_else(iso_now);
    let iso = date.iso_week();
    (iso.year(), iso.week())
}

/// Recovers and mints `{prefix}_{MMDD}_{NNN}` / `s_{MMDD}_{NNN}` identifiers.
pub struct IdGenerator {
    counters: Mutex<HashMap<(String, String), u32>>,
    last_date: Mutex<Option<NaiveDate>>,
}

impl Default for IdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl IdGenerator {
    pub fn new() -> Self {
        Self {
            counters: Mutex::new(HashMap::new()),
            last_date: Mutex::new(None),
        }
    }

    fn check_monotone(&self, now: DateTime<Utc>) -> Result<()> {
        let today = now.date_naive();
        let mut last = self.last_date.lock().unwrap();
        if let Some(prev) = *last {
            if today < prev {
                return Err(Error::InvalidTime(format!(
                    "clock went backwards: {today} is before previously observed {prev}"
                )));
            }
        }
        *last = Some(today);
        Ok(())
    }

    /// Generates the next `{prefix}_{MMDD}_{NNN}` changelog ID, recovering
    /// the counter from the current month's global changelog on first use
    /// today.
    pub fn generate_changelog_id(
        &self,
        prefix: &str,
        now: DateTime<Utc>,
        layout: &StoreLayout,
    ) -> Result<String> {
        self.check_monotone(now)?;
        let mmdd = format_mmdd(now);
        let key = (prefix.to_string(), mmdd.clone());

        let mut counters = self.counters.lock().unwrap();
        if !counters.contains_key(&key) {
            let month_path = layout.global_changelog_path(&year_month(Some(now)));
            let text = std::fs::read_to_string(&month_path).unwrap_or_default();
            let pattern = Regex::new(&format!(r"{}_{}_(\d{{3}})", regex::escape(prefix), mmdd))
                .expect("static pattern");
            let recovered = pattern
                .captures_iter(&text)
                .filter_map(|c| c[1].parse::<u32>().ok())
                .max()
                .unwrap_or(0);
            counters.insert(key.clone(), recovered);
        }

        let counter = counters.get_mut(&key).unwrap();
        *counter += 1;
        Ok(format!("{prefix}_{mmdd}_{:03}", *counter))
    }

    /// Generates the next `s_{MMDD}_{NNN}` scratch ID, recovering the
    /// counter from today's scratch file on first use today.
    pub fn generate_scratch_id(&self, now: DateTime<Utc>, layout: &StoreLayout) -> Result<String> {
        self.check_monotone(now)?;
        let mmdd = format_mmdd(now);
        let key = ("s".to_string(), mmdd.clone());

        let mut counters = self.counters.lock().unwrap();
        if !counters.contains_key(&key) {
            let today_path = layout.scratch_path(&now.format("%Y-%m-%d").to_string());
            let text = std::fs::read_to_string(&today_path).unwrap_or_default();
            let pattern = Regex::new(&format!(r"s_{mmdd}_(\d{{3}})")).expect("static pattern");
            let recovered = pattern
                .captures_iter(&text)
                .filter_map(|c| c[1].parse::<u32>().ok())
                .max()
                .unwrap_or(0);
            counters.insert(key.clone(), recovered);
        }

        let counter = counters.get_mut(&key).unwrap();
        *counter += 1;
        Ok(format!("s_{mmdd}_{:03}", *counter))
    }
}
