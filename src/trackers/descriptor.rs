// src/trackers/descriptor.rs

//! Implements the [`DescriptorLifecycleTracker`], the register / link /
//! deregister verifier and parent→children hierarchy builder.

use crate::data::record::{Severity, TraceRecordP};
use crate::data::resolved::{ResolvedRecord, ROOT_PARENT};
use crate::trackers::memory::MemoryTracker;
use crate::trackers::Violation;

use std::collections::{HashMap, HashSet};

#[allow(unused_imports)]
use ::si_trace_print::{defn, defo, defx, defñ};

/// One state of the descriptor lifecycle. Deregistered descriptors are
/// not tracked, so there is no third variant.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DescState {
    Registered,
    Linked,
}

impl DescState {
    pub const fn as_str(self) -> &'static str {
        match self {
            DescState::Registered => "Registered",
            DescState::Linked => "Linked",
        }
    }
}

/// The live tracking entry of one descriptor identity.
#[derive(Clone, Debug)]
struct TrackedDesc {
    state: DescState,
    /// identities of descriptors created under this one
    children: HashSet<String>,
    /// the registering or linking line
    record: TraceRecordP,
}

/// Verifies descriptor register/link/deregister transitions over one
/// resolved pass. Deregistration cascades: removing a descriptor also
/// removes everything in its (transitive) children set.
///
/// Tables are owned by the instance; construct one per pass.
#[derive(Debug, Default)]
pub struct DescriptorLifecycleTracker {
    active: HashMap<String, TrackedDesc>,
    /// latched once any debug-level trace line was seen; the
    /// inactive-reference check is meaningless in sparser logs, where
    /// creation events are routinely missing
    have_debug: bool,
    violations: Vec<Violation>,
}

impl DescriptorLifecycleTracker {
    pub fn new() -> DescriptorLifecycleTracker {
        DescriptorLifecycleTracker::default()
    }

    /// Feed one resolved record. References to live RPCs are ignored;
    /// the RPC tracker owns those. `memory` is only queried, never
    /// mutated, for the unregistered-address cross-checks.
    pub fn observe(&mut self, resolved: &ResolvedRecord, memory: &MemoryTracker) {
        let record = resolved.rec();
        if record.is_trace && record.severity > Severity::Info {
            self.have_debug = true;
        }
        // freeing the backing memory tears a descriptor down without a
        // deregistration line
        if record.is_free() {
            if let Some(pointer) = record.free_pointer() {
                self.active.remove(pointer);
            }
            return;
        }
        if !resolved.has_identity() || resolved.is_rpc {
            return;
        }
        if record.is_new() {
            self.register(resolved, memory);
        } else if record.is_link() {
            self.link(resolved);
        } else if record.is_dereg() {
            self.deregister(resolved);
        } else if !record.is_dereg_rpc() {
            // teardowns of unknown RPCs are the RPC tracker's report
            self.reference(resolved, memory);
        }
    }

    /// A plain reference to an address that is in neither lifecycle
    /// table. Checked only once debug-level logging was seen.
    fn reference(&mut self, resolved: &ResolvedRecord, memory: &MemoryTracker) {
        if !self.have_debug {
            return;
        }
        if self.active.contains_key(resolved.public_descriptor.as_str()) {
            return;
        }
        defo!("inactive {:?}", resolved.public_descriptor);
        self.violations.push(Violation::error(
            "inactive desc",
            Some(resolved.record.clone()),
        ));
        if let Some(site) = memory.allocation(resolved.rec().descriptor.as_str()) {
            self.violations.push(Violation::error(
                "Used as descriptor without registering",
                Some(site.clone()),
            ));
        }
    }

    /// A parent must be the root sentinel or already tracked.
    fn check_parent(&mut self, resolved: &ResolvedRecord, message: &str) -> bool {
        let parent: &str = resolved.public_parent.as_str();
        if parent != ROOT_PARENT && !self.active.contains_key(parent) {
            self.violations.push(Violation::error(
                message.to_string(),
                Some(resolved.record.clone()),
            ));
            return false;
        }

        true
    }

    fn register(&mut self, resolved: &ResolvedRecord, memory: &MemoryTracker) {
        let key: &str = resolved.public_descriptor.as_str();
        defo!("register {:?} under {:?}", key, resolved.public_parent);
        if let Some(stale) = self.active.get(key) {
            // same identity registered twice without a deregistration
            self.violations.push(Violation::error(
                "not deregistered",
                Some(stale.record.clone()),
            ));
            self.violations.push(Violation::error(
                "already exists",
                Some(resolved.record.clone()),
            ));
        }
        if !self.check_parent(resolved, "add with bad parent") {
            // the bad parent may be plain allocated memory
            if let Some(site) = resolved
                .rec()
                .parent()
                .and_then(|parent| memory.allocation(parent))
            {
                self.violations.push(Violation::error(
                    "used as parent without registering",
                    Some(site.clone()),
                ));
            }
        }
        self.adopt(resolved);
        self.active.insert(
            key.to_string(),
            TrackedDesc {
                state: DescState::Registered,
                children: HashSet::new(),
                record: resolved.record.clone(),
            },
        );
    }

    fn link(&mut self, resolved: &ResolvedRecord) {
        let key: &str = resolved.public_descriptor.as_str();
        defo!("link {:?} under {:?}", key, resolved.public_parent);
        if self.active.contains_key(key) {
            self.violations.push(Violation::error(
                "link of tracked descriptor",
                Some(resolved.record.clone()),
            ));
            return;
        }
        self.check_parent(resolved, "link with bad parent");
        self.adopt(resolved);
        self.active.insert(
            key.to_string(),
            TrackedDesc {
                state: DescState::Linked,
                children: HashSet::new(),
                record: resolved.record.clone(),
            },
        );
    }

    /// Add the descriptor to its resolved parent's children set.
    fn adopt(&mut self, resolved: &ResolvedRecord) {
        if let Some(parent) = self.active.get_mut(resolved.public_parent.as_str()) {
            parent
                .children
                .insert(resolved.public_descriptor.clone());
        }
    }

    fn deregister(&mut self, resolved: &ResolvedRecord) {
        let key: &str = resolved.public_descriptor.as_str();
        defo!("deregister {:?}", key);
        match self.active.get(key) {
            None => {
                self.violations.push(Violation::error(
                    "invalid desc remove",
                    Some(resolved.record.clone()),
                ));
                return;
            }
            Some(tracked) => {
                if tracked.state != DescState::Registered {
                    self.violations.push(Violation::error(
                        format!("deregister of {} descriptor", tracked.state.as_str()),
                        Some(resolved.record.clone()),
                    ));
                }
            }
        }
        // cascade: children go with their parent, whatever their state
        let mut worklist: Vec<String> = vec![key.to_string()];
        while let Some(identity) = worklist.pop() {
            if let Some(tracked) = self.active.remove(&identity) {
                worklist.extend(tracked.children);
            }
        }
    }

    /// Drop the entry keyed by this raw address, if any. Used by the
    /// memory leak report to classify leaked regions that still back a
    /// live descriptor.
    pub fn release_address(&mut self, pointer: &str) -> bool {
        self.active.remove(pointer).is_some()
    }

    /// End-of-pass leak report. Call exactly once, after the pass.
    pub fn finish(&mut self) {
        let mut leftovers: Vec<&TrackedDesc> = self.active.values().collect();
        leftovers.sort_by_key(|tracked| tracked.record.index);
        let leaks: Vec<Violation> = leftovers
            .into_iter()
            .map(|tracked| {
                Violation::error(
                    format!("desc not deregistered (state {})", tracked.state.as_str()),
                    Some(tracked.record.clone()),
                )
            })
            .collect();
        self.violations.extend(leaks);
    }

    /// Number of descriptors still tracked.
    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    pub fn violations(&self) -> &[Violation] {
        &self.violations
    }

    pub fn take_violations(&mut self) -> Vec<Violation> {
        std::mem::take(&mut self.violations)
    }
}
