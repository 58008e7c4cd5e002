// src/printer/report.rs

//! Implements the [`HierarchyReporter`] dump, the opcode tally table,
//! and the [`ReportSession`] that renders violations with
//! once-per-line dedup.

use crate::common::{LineIndex, Pid, TriageResult};
use crate::data::record::{LogRecord, Severity};
use crate::data::resolved::ROOT_PARENT;
use crate::readers::logstream::{IterFilter, LogStream};
use crate::readers::resolver::IdentityResolver;
use crate::trackers::rpc::RpcLifecycleTracker;
use crate::trackers::Violation;

use std::collections::{HashMap, HashSet};

#[allow(unused_imports)]
use ::si_trace_print::{defn, defo, defx, defñ};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// ReportSession
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Renders violations for one report, deduplicating repeated lines.
///
/// The dedup set and the running counts are owned here; a fresh session
/// starts clean (no globals).
#[derive(Debug, Default)]
pub struct ReportSession {
    shown: HashSet<String>,
    pub err_count: usize,
    pub warn_count: usize,
}

impl ReportSession {
    pub fn new() -> ReportSession {
        ReportSession::default()
    }

    /// Render one violation; `None` if an identical rendering was
    /// already shown this session. Counts every violation either way.
    pub fn show(&mut self, violation: &Violation) -> Option<String> {
        if violation.is_error() {
            self.err_count += 1;
        } else {
            self.warn_count += 1;
        }
        let rendered: String = violation.render();
        if !self.shown.insert(rendered.clone()) {
            return None;
        }

        Some(rendered)
    }

    /// Render a batch, dedup applied, in order.
    pub fn show_all<'a, I>(&mut self, violations: I) -> Vec<String>
    where
        I: IntoIterator<Item = &'a Violation>,
    {
        violations
            .into_iter()
            .filter_map(|violation| self.show(violation))
            .collect()
    }

    /// Did this session see any ERROR-severity violation?
    pub fn has_errors(&self) -> bool {
        self.err_count != 0
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// opcode tally table
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Render the per-opcode state tally as a right-aligned table, the
/// result-code columns (leading dash, `-DER_SUCCESS` first) after the
/// five state columns. Empty when no RPC activity was seen.
pub fn render_rpc_table(tracker: &RpcLifecycleTracker) -> String {
    if tracker.tallies().is_empty() {
        return String::new();
    }
    let names: Vec<String> = tracker.result_names();
    let mut headers: Vec<String> = [
        "OPCODE",
        "ALLOCATED",
        "SUBMITTED",
        "SENT",
        "COMPLETED",
        "DEALLOCATED",
    ]
    .iter()
    .map(|hdr| hdr.to_string())
    .collect();
    for name in &names {
        headers.push(format!("-{}", name));
    }

    let mut rows: Vec<Vec<String>> = Vec::new();
    for (opcode, tally) in tracker.tallies() {
        let mut row: Vec<String> = vec![
            opcode.clone(),
            tally.allocated.to_string(),
            tally.submitted.to_string(),
            tally.sent.to_string(),
            tally.completed.to_string(),
            tally.deallocated.to_string(),
        ];
        for name in &names {
            row.push(
                tally
                    .results
                    .get(name)
                    .map(|count| count.to_string())
                    .unwrap_or_default(),
            );
        }
        rows.push(row);
    }

    let mut widths: Vec<usize> = headers.iter().map(String::len).collect();
    for row in &rows {
        for (col, cell) in row.iter().enumerate() {
            if cell.len() > widths[col] {
                widths[col] = cell.len();
            }
        }
    }

    let mut out = String::from("Opcode State Transition Tally\n");
    let header_line: Vec<String> = headers
        .iter()
        .enumerate()
        .map(|(col, hdr)| format!("{:>width$}", hdr, width = widths[col]))
        .collect();
    out.push_str(&header_line.join("  "));
    out.push('\n');
    let rule: Vec<String> = widths.iter().map(|width| "-".repeat(*width)).collect();
    out.push_str(&rule.join("  "));
    out.push('\n');
    for row in &rows {
        let cells: Vec<String> = row
            .iter()
            .enumerate()
            .map(|(col, cell)| format!("{:>width$}", cell, width = widths[col]))
            .collect();
        out.push_str(&cells.join("  "));
        out.push('\n');
    }

    out
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// HierarchyReporter
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Walks the descriptor hierarchy from a seed up to the root and emits
/// a bounded dump of one pid's stream, member lines annotated `*`.
///
/// Seed selection: the first identified record at severity WARN or
/// worse; failing that, the first registration whose source filename
/// starts with the path filter.
#[derive(Clone, Debug)]
pub struct HierarchyReporter {
    /// emit non-member lines at this severity or worse; `Dbug` emits
    /// everything (raw lines count as `Dbug`)
    dump_level: Severity,
    path_filter: Option<String>,
}

impl Default for HierarchyReporter {
    fn default() -> HierarchyReporter {
        HierarchyReporter {
            dump_level: Severity::Dbug,
            path_filter: None,
        }
    }
}

impl HierarchyReporter {
    pub fn new() -> HierarchyReporter {
        HierarchyReporter::default()
    }

    pub fn with_dump_level(mut self, dump_level: Severity) -> HierarchyReporter {
        self.dump_level = dump_level;
        self
    }

    pub fn with_path_filter<S: Into<String>>(mut self, path_filter: S) -> HierarchyReporter {
        self.path_filter = Some(path_filter.into());
        self
    }

    /// Render the dump for one pid. Two passes: a resolving pass to
    /// build the hierarchy and pick the seed, then a raw-inclusive
    /// replay emitting member and in-level lines. Empty when no seed
    /// qualifies.
    pub fn dump(&self, stream: &mut LogStream, pid: Pid) -> TriageResult<String> {
        defn!("(pid {})", pid);
        let mut line_identity: HashMap<LineIndex, String> = HashMap::new();
        let mut parent_of: HashMap<String, String> = HashMap::new();
        let mut children_of: HashMap<String, Vec<String>> = HashMap::new();
        let mut seed: Option<String> = None;
        let mut fallback: Option<String> = None;

        let resolver = IdentityResolver::new(stream, pid)?;
        for resolved in resolver {
            if !resolved.has_identity() {
                continue;
            }
            let record = resolved.rec();
            line_identity.insert(record.index, resolved.public_descriptor.clone());
            if record.is_new() || record.is_new_rpc() || record.is_link() {
                parent_of.insert(
                    resolved.public_descriptor.clone(),
                    resolved.public_parent.clone(),
                );
                children_of
                    .entry(resolved.public_parent.clone())
                    .or_default()
                    .push(resolved.public_descriptor.clone());
            }
            if seed.is_none() && record.severity <= Severity::Warn {
                seed = Some(resolved.public_descriptor.clone());
            }
            if fallback.is_none() && record.is_new() {
                if let Some(filter) = &self.path_filter {
                    if record
                        .filename
                        .as_deref()
                        .map_or(false, |fname| fname.starts_with(filter.as_str()))
                    {
                        fallback = Some(resolved.public_descriptor.clone());
                    }
                }
            }
        }

        let seed: String = match seed.or(fallback) {
            Some(val) => val,
            None => {
                defx!("no seed");
                return Ok(String::new());
            }
        };
        defo!("seed {:?}", seed);

        // walk to the root, gathering each visited descriptor and
        // everything directly linked under it
        let mut members: HashSet<String> = HashSet::new();
        let mut cursor: String = seed;
        loop {
            if !members.insert(cursor.clone()) {
                // cycle in parent links; stop the walk
                break;
            }
            if let Some(kids) = children_of.get(&cursor) {
                members.extend(kids.iter().cloned());
            }
            match parent_of.get(&cursor) {
                Some(parent) if parent != ROOT_PARENT && !parent.is_empty() => {
                    cursor = parent.clone();
                }
                _ => break,
            }
        }
        defo!("{} member identities", members.len());

        let mut out = String::new();
        let replay = stream.iterate(IterFilter {
            pid: Some(pid),
            trace_only: false,
            raw: true,
        })?;
        for record in replay {
            let member: bool = line_identity
                .get(&record.index())
                .map_or(false, |identity| members.contains(identity));
            let severity: Severity = match &record {
                LogRecord::Trace(tr) => tr.severity,
                LogRecord::Raw(_) => Severity::Dbug,
            };
            if member {
                out.push_str("* ");
            } else if severity <= self.dump_level {
                out.push_str("  ");
            } else {
                continue;
            }
            out.push_str(&record.text());
            out.push('\n');
        }
        defx!();

        Ok(out)
    }
}
