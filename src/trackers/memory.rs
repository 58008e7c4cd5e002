// src/trackers/memory.rs

//! Implements the [`MemoryTracker`], the alloc/free/realloc verifier
//! with a high-water-mark byte counter.

use crate::common::{ByteSz, Count};
use crate::data::record::TraceRecordP;
use crate::data::resolved::ResolvedRecord;
use crate::trackers::descriptor::DescriptorLifecycleTracker;
use crate::trackers::Violation;

use std::collections::HashMap;
use std::fmt;

#[allow(unused_imports)]
use ::si_trace_print::{defn, defo, defx, defñ};

/// a literal null pointer in a memory-call message
const NIL: &str = "(nil)";

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// HwmCounter
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Running byte total with a high-water mark, plus allocation and free
/// call counts.
#[derive(Clone, Copy, Debug, Default)]
pub struct HwmCounter {
    total: ByteSz,
    hwm: ByteSz,
    allocs: Count,
    frees: Count,
}

impl HwmCounter {
    pub fn new() -> HwmCounter {
        HwmCounter::default()
    }

    /// Any allocations registered at all?
    pub fn has_data(&self) -> bool {
        self.hwm != 0
    }

    pub fn add(&mut self, sz: ByteSz) {
        self.allocs += 1;
        self.total += sz;
        if self.total > self.hwm {
            self.hwm = self.total;
        }
    }

    pub fn subtract(&mut self, sz: ByteSz) {
        self.frees += 1;
        self.total = self.total.saturating_sub(sz);
    }

    pub fn hwm(&self) -> ByteSz {
        self.hwm
    }

    pub fn total(&self) -> ByteSz {
        self.total
    }
}

impl fmt::Display for HwmCounter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Total:{} HWM:{} {} allocations, {} frees {} possible leaks",
            self.total,
            self.hwm,
            self.allocs,
            self.frees,
            self.allocs.saturating_sub(self.frees),
        )
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// MemoryTracker
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// One live allocated region.
#[derive(Clone, Debug)]
struct Region {
    record: TraceRecordP,
    size: ByteSz,
}

/// Verifies allocation/free pairing over one resolved pass.
///
/// `regions` holds live pointers; a freed pointer is retired to
/// `old_regions` (keeping both the allocation and free sites) so a
/// second free can be reported with all three locations.
///
/// Memory-call lines carry no descriptor, so pointer text is used
/// directly; address reuse across a free is handled by retirement, not
/// by reuse generations.
#[derive(Debug, Default)]
pub struct MemoryTracker {
    regions: HashMap<String, Region>,
    /// freed pointer to (allocation site, free site)
    old_regions: HashMap<String, (TraceRecordP, TraceRecordP)>,
    pub memsize: HwmCounter,
    violations: Vec<Violation>,
}

impl MemoryTracker {
    pub fn new() -> MemoryTracker {
        MemoryTracker::default()
    }

    /// Feed one resolved record. Non-memory-call records are ignored.
    pub fn observe(&mut self, resolved: &ResolvedRecord) {
        let record = resolved.rec();
        if record.is_alloc() {
            self.alloc(&resolved.record);
        } else if record.is_free() {
            self.free(&resolved.record);
        } else if record.is_realloc() {
            self.realloc(&resolved.record);
        }
    }

    fn alloc(&mut self, record: &TraceRecordP) {
        let pointer: String = match record.alloc_pointer() {
            Some(val) => val.to_string(),
            None => return,
        };
        let size: ByteSz = record.alloc_size().unwrap_or(0);
        defo!("alloc {:?} size {}", pointer, size);
        if let Some(live) = self.regions.get(&pointer) {
            self.violations.push(Violation::error(
                "new allocation seen for same pointer",
                Some(live.record.clone()),
            ));
        }
        self.regions.insert(
            pointer,
            Region {
                record: record.clone(),
                size,
            },
        );
        self.memsize.add(size);
    }

    fn free(&mut self, record: &TraceRecordP) {
        let pointer: String = match record.free_pointer() {
            Some(val) => val.to_string(),
            None => return,
        };
        if pointer == NIL {
            return;
        }
        defo!("free {:?}", pointer);
        match self.regions.remove(&pointer) {
            Some(region) => {
                self.memsize.subtract(region.size);
                self.old_regions
                    .insert(pointer, (region.record, record.clone()));
            }
            None => match self.old_regions.get(&pointer) {
                Some((alloc_site, free_site)) => {
                    self.violations.push(Violation::error(
                        "double-free allocation point",
                        Some(alloc_site.clone()),
                    ));
                    self.violations.push(Violation::error(
                        "1st double-free location",
                        Some(free_site.clone()),
                    ));
                    self.violations.push(Violation::error(
                        "2nd double-free location",
                        Some(record.clone()),
                    ));
                }
                None => {
                    self.violations.push(Violation::error(
                        "free of unknown memory",
                        Some(record.clone()),
                    ));
                }
            },
        }
    }

    fn realloc(&mut self, record: &TraceRecordP) {
        let (new_pointer, old_pointer) = match record.realloc_pointers() {
            Some((new, old)) => (new.to_string(), old.to_string()),
            None => return,
        };
        let (new_size, old_size) = match record.realloc_sizes() {
            Some(val) => val,
            None => return,
        };
        defo!(
            "realloc {:?} -> {:?} size {} (was {})",
            old_pointer,
            new_pointer,
            new_size,
            old_size
        );
        if new_pointer != NIL && old_pointer != NIL {
            match self.regions.get(&old_pointer) {
                None => {
                    self.violations.push(Violation::error(
                        "realloc of unknown memory",
                        Some(record.clone()),
                    ));
                }
                Some(region) => {
                    // the caller may print 0, the recorded size, or the
                    // new size; anything else is a stale size argument
                    if ![0, region.size, new_size].contains(&old_size) {
                        self.violations.push(Violation::error(
                            "realloc used invalid old size",
                            Some(record.clone()),
                        ));
                    }
                    self.memsize.subtract(region.size);
                }
            }
        }
        self.regions.insert(
            new_pointer.clone(),
            Region {
                record: record.clone(),
                size: new_size,
            },
        );
        self.memsize.add(new_size);
        if old_pointer != new_pointer && old_pointer != NIL {
            if let Some(region) = self.regions.remove(&old_pointer) {
                self.old_regions
                    .insert(old_pointer, (region.record, record.clone()));
            }
        }
    }

    /// Allocation site of a live region, by raw pointer text.
    pub fn allocation(&self, pointer: &str) -> Option<&TraceRecordP> {
        self.regions.get(pointer).map(|region| &region.record)
    }

    /// End-of-pass leak report. Call exactly once, after the pass and
    /// before `descriptors.finish()`: a leaked region that still backs
    /// a live descriptor reports here as "descriptor not freed" and is
    /// released, so the descriptor report never repeats it.
    pub fn finish(&mut self, descriptors: &mut DescriptorLifecycleTracker) {
        let mut leftovers: Vec<(&String, &Region)> = self.regions.iter().collect();
        leftovers.sort_by_key(|(_, region)| region.record.index);
        let leaks: Vec<Violation> = leftovers
            .into_iter()
            .map(|(pointer, region)| {
                let message: &str = if descriptors.release_address(pointer) {
                    "descriptor not freed"
                } else {
                    "memory not freed"
                };

                Violation::error(message, Some(region.record.clone()))
            })
            .collect();
        self.violations.extend(leaks);
    }

    /// Number of regions still live.
    pub fn live_count(&self) -> usize {
        self.regions.len()
    }

    pub fn violations(&self) -> &[Violation] {
        &self.violations
    }

    pub fn take_violations(&mut self) -> Vec<Violation> {
        std::mem::take(&mut self.violations)
    }
}
