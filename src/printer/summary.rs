// src/printer/summary.rs

//! Implements the [`LogSummary`], frequency counters over a pass with a
//! "most common" report of logging locations, facilities and levels.

use crate::common::Count;
use crate::data::record::{Severity, TraceRecord};

use std::collections::{BTreeMap, HashMap};
use std::fmt::Write as _;

/// Entries with fewer hits than this are left out of the report; a
/// location logged a handful of times is noise, not a hot spot.
const COMMON_MIN_COUNT: Count = 10;

/// Report at most this many entries per category.
const COMMON_TOP: usize = 10;

/// Frequency counters over the structured records of a pass.
#[derive(Debug, Default)]
pub struct LogSummary {
    lines: Count,
    locations: HashMap<String, Count>,
    facilities: HashMap<String, Count>,
    severities: BTreeMap<Severity, Count>,
}

/// The top entries of one counter, most frequent first, low-count
/// entries elided. Ties broken by key for deterministic output.
fn most_common(counter: &HashMap<String, Count>) -> Vec<(&str, Count)> {
    let mut entries: Vec<(&str, Count)> = counter
        .iter()
        .filter(|(_, count)| **count >= COMMON_MIN_COUNT)
        .map(|(key, count)| (key.as_str(), *count))
        .collect();
    entries.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(b.0)));
    entries.truncate(COMMON_TOP);

    entries
}

impl LogSummary {
    pub fn new() -> LogSummary {
        LogSummary::default()
    }

    /// Count one structured record.
    pub fn observe(&mut self, record: &TraceRecord) {
        self.lines += 1;
        *self
            .locations
            .entry(record.location())
            .or_insert(0) += 1;
        *self
            .facilities
            .entry(record.facility.clone())
            .or_insert(0) += 1;
        *self.severities.entry(record.severity).or_insert(0) += 1;
    }

    pub fn lines(&self) -> Count {
        self.lines
    }

    /// Render the frequency report. Empty when nothing was counted.
    pub fn render(&self) -> String {
        if self.lines == 0 {
            return String::new();
        }
        let mut out = String::new();
        let _ = writeln!(out, "Parsed {} lines of logs", self.lines);
        let _ = writeln!(out, "Most common logging locations");
        for (loc, count) in most_common(&self.locations) {
            let percent: f64 = 100.0 * count as f64 / self.lines as f64;
            let _ = writeln!(
                out,
                "Logging used {} times at {} ({:.1}%)",
                count, loc, percent
            );
        }
        let _ = writeln!(out, "Most common facilities");
        for (fac, count) in most_common(&self.facilities) {
            let _ = writeln!(
                out,
                "{}: {} ({:.1}%)",
                fac,
                count,
                100.0 * count as f64 / self.lines as f64
            );
        }
        let _ = writeln!(out, "Most common levels");
        let mut levels: Vec<(Severity, Count)> = self
            .severities
            .iter()
            .filter(|(_, count)| **count >= COMMON_MIN_COUNT)
            .map(|(sev, count)| (*sev, *count))
            .collect();
        levels.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        levels.truncate(COMMON_TOP);
        for (sev, count) in levels {
            let _ = writeln!(
                out,
                "{}: {} ({:.1}%)",
                sev,
                count,
                100.0 * count as f64 / self.lines as f64
            );
        }

        out
    }
}
