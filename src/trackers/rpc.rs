// src/trackers/rpc.rs

//! Implements the [`RpcLifecycleTracker`], the RPC state-machine
//! verifier and per-opcode statistics collector.

use crate::common::Count;
use crate::data::record::TraceRecordP;
use crate::data::resolved::ResolvedRecord;
use crate::trackers::Violation;

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;

#[allow(unused_imports)]
use ::si_trace_print::{defn, defo, defx, defñ};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// RpcState
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// One state of the RPC lifecycle.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RpcState {
    Allocated,
    Submitted,
    Sent,
    Completed,
    Deallocated,
}

impl RpcState {
    /// May `prev` legally precede `self`?
    ///
    /// `Allocated` never has a legal predecessor because deallocation
    /// always clears the tracked entry. `Completed` accepts `Allocated`
    /// directly: a server-side RPC is allocated on receipt and completes
    /// without ever being submitted or sent.
    pub const fn allows_previous(self, prev: RpcState) -> bool {
        match self {
            RpcState::Allocated => false,
            RpcState::Submitted => matches!(prev, RpcState::Allocated),
            RpcState::Sent => matches!(prev, RpcState::Submitted),
            RpcState::Completed => matches!(
                prev,
                RpcState::Allocated | RpcState::Submitted | RpcState::Sent
            ),
            RpcState::Deallocated => matches!(
                prev,
                RpcState::Allocated
                    | RpcState::Submitted
                    | RpcState::Sent
                    | RpcState::Completed
            ),
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            RpcState::Allocated => "ALLOCATED",
            RpcState::Submitted => "SUBMITTED",
            RpcState::Sent => "SENT",
            RpcState::Completed => "COMPLETED",
            RpcState::Deallocated => "DEALLOCATED",
        }
    }
}

impl fmt::Display for RpcState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// result-code names
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Translate a completion result code to its `DER_*` symbolic name
/// (GURT/DAOS numbering). Codes outside the known set render as their
/// numeric text.
pub fn der_name(rc: i64) -> String {
    let name: &str = match rc {
        0 => "DER_SUCCESS",
        -1001 => "DER_NO_PERM",
        -1002 => "DER_NO_HDL",
        -1003 => "DER_INVAL",
        -1004 => "DER_EXIST",
        -1005 => "DER_NONEXIST",
        -1006 => "DER_UNREACH",
        -1007 => "DER_NOSPACE",
        -1008 => "DER_ALREADY",
        -1009 => "DER_NOMEM",
        -1010 => "DER_NOSYS",
        -1011 => "DER_TIMEDOUT",
        -1020 => "DER_HG",
        -2008 => "DER_NOTLEADER",
        -2017 => "DER_SHUTDOWN",
        _ => return rc.to_string(),
    };

    name.to_string()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// RpcLifecycleTracker
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Opcode for RPCs whose allocation happened before the trace window.
const OPCODE_UNKNOWN: &str = "unknown";

/// Per-opcode tally of every observed state plus completion results.
#[derive(Clone, Debug, Default)]
pub struct OpcodeTally {
    pub allocated: Count,
    pub submitted: Count,
    pub sent: Count,
    pub completed: Count,
    pub deallocated: Count,
    /// completion result name (without the leading dash) to count
    pub results: BTreeMap<String, Count>,
}

impl OpcodeTally {
    fn tally(&mut self, state: RpcState) {
        match state {
            RpcState::Allocated => self.allocated += 1,
            RpcState::Submitted => self.submitted += 1,
            RpcState::Sent => self.sent += 1,
            RpcState::Completed => self.completed += 1,
            RpcState::Deallocated => self.deallocated += 1,
        }
    }
}

/// The live tracking entry of one RPC identity.
#[derive(Clone, Debug)]
struct TrackedRpc {
    state: RpcState,
    opcode: String,
    /// the line that most recently changed the state
    record: TraceRecordP,
}

/// Verifies RPC state transitions over one resolved pass and tallies
/// per-opcode statistics. Keys on reuse-disambiguated identities, so a
/// reallocated address never inherits a stale state.
///
/// Tables are owned by the instance; construct one per pass.
#[derive(Debug, Default)]
pub struct RpcLifecycleTracker {
    /// live RPC identity to its tracking entry
    states: HashMap<String, TrackedRpc>,
    /// opcode to state tally; `BTreeMap` for deterministic report order
    tallies: BTreeMap<String, OpcodeTally>,
    /// every distinct completion result name observed
    result_names: BTreeSet<String>,
    violations: Vec<Violation>,
}

impl RpcLifecycleTracker {
    pub fn new() -> RpcLifecycleTracker {
        RpcLifecycleTracker::default()
    }

    /// Classify a resolved record as an RPC state event, if it is one.
    fn classify(resolved: &ResolvedRecord) -> Option<RpcState> {
        let record = resolved.rec();
        if record.is_new_rpc() {
            Some(RpcState::Allocated)
        } else if record.is_dereg_rpc() {
            Some(RpcState::Deallocated)
        } else if record.is_submitted() {
            Some(RpcState::Submitted)
        } else if record.is_sent() {
            Some(RpcState::Sent)
        } else if record.is_callback() {
            Some(RpcState::Completed)
        } else {
            None
        }
    }

    /// Feed one resolved record. Non-RPC-event records are ignored.
    pub fn observe(&mut self, resolved: &ResolvedRecord) {
        if !resolved.has_identity() {
            return;
        }
        let state: RpcState = match RpcLifecycleTracker::classify(resolved) {
            Some(val) => val,
            None => return,
        };
        let record = resolved.rec();
        let key: &str = resolved.public_descriptor.as_str();
        defo!("{:?} -> {}", key, state);

        let opcode: String = match self.states.get(key) {
            None => {
                if state == RpcState::Allocated {
                    record
                        .rpc_opcode()
                        .unwrap_or(OPCODE_UNKNOWN)
                        .to_string()
                } else {
                    // a state change for an RPC allocated before the
                    // trace window began
                    self.violations.push(Violation::warning(
                        format!(
                            "no prior alloc'd state registered (state {})",
                            state
                        ),
                        Some(resolved.record.clone()),
                    ));
                    OPCODE_UNKNOWN.to_string()
                }
            }
            Some(tracked) => {
                if state == RpcState::Allocated || !state.allows_previous(tracked.state) {
                    self.violations.push(Violation::error(
                        format!(
                            "invalid transition to {} from {}",
                            state, tracked.state
                        ),
                        Some(resolved.record.clone()),
                    ));
                }
                match state {
                    // a stale entry; the new allocation names its own opcode
                    RpcState::Allocated => record
                        .rpc_opcode()
                        .unwrap_or(OPCODE_UNKNOWN)
                        .to_string(),
                    _ => tracked.opcode.clone(),
                }
            }
        };

        self.tallies
            .entry(opcode.clone())
            .or_default()
            .tally(state);

        if state == RpcState::Completed {
            if let Some(rc) = record.callback_result() {
                let name: String = der_name(rc);
                self.result_names.insert(name.clone());
                *self
                    .tallies
                    .entry(opcode.clone())
                    .or_default()
                    .results
                    .entry(name)
                    .or_insert(0) += 1;
            }
        }

        // deallocation always clears, so reused identities start fresh
        if state == RpcState::Deallocated {
            self.states.remove(key);
        } else {
            self.states.insert(
                key.to_string(),
                TrackedRpc {
                    state,
                    opcode,
                    record: resolved.record.clone(),
                },
            );
        }
    }

    /// End-of-pass invariants. Call exactly once, after the pass.
    pub fn finish(&mut self) {
        for (opcode, tally) in &self.tallies {
            if tally.allocated != tally.deallocated {
                self.violations.push(Violation::error(
                    format!(
                        "Opcode {}: Alloc'd Total = {}, Dealloc'd Total = {}",
                        opcode, tally.allocated, tally.deallocated
                    ),
                    None,
                ));
            }
            if tally.sent > tally.completed {
                self.violations.push(Violation::error(
                    format!(
                        "Opcode {}: Sent Total = {}, Completed Total = {}",
                        opcode, tally.sent, tally.completed
                    ),
                    None,
                ));
            }
        }
        let mut leftovers: Vec<&TrackedRpc> = self.states.values().collect();
        leftovers.sort_by_key(|tracked| tracked.record.index);
        let leftover_violations: Vec<Violation> = leftovers
            .into_iter()
            .map(|tracked| {
                Violation::warning("rpc not deallocated", Some(tracked.record.clone()))
            })
            .collect();
        self.violations.extend(leftover_violations);
    }

    pub fn tallies(&self) -> &BTreeMap<String, OpcodeTally> {
        &self.tallies
    }

    /// Distinct completion result names, `DER_SUCCESS` first then sorted.
    pub fn result_names(&self) -> Vec<String> {
        if self.result_names.is_empty() {
            return Vec::new();
        }
        let mut names: Vec<String> = self
            .result_names
            .iter()
            .filter(|name| name.as_str() != "DER_SUCCESS")
            .cloned()
            .collect();
        names.insert(0, String::from("DER_SUCCESS"));

        names
    }

    /// Were any completion results observed at all?
    pub fn has_results(&self) -> bool {
        !self.result_names.is_empty()
    }

    pub fn violations(&self) -> &[Violation] {
        &self.violations
    }

    pub fn take_violations(&mut self) -> Vec<Violation> {
        std::mem::take(&mut self.violations)
    }
}
