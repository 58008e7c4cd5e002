// src/readers/resolver.rs

//! Implements the [`IdentityResolver`], a stateful forward pass over one
//! pid's trace records that disambiguates reused pointer addresses.
//!
//! A logged address names an object only until that object is torn down;
//! the allocator then hands the same address to an unrelated object. The
//! resolver tags every creation event with a reuse-generation counter so
//! that downstream trackers key on stable identities
//! (`0x55a3f8132e60`, `0x55a3f8132e60_1`, …).
//!
//! All resolution state is owned by the resolver instance. A fresh
//! resolver over the same stream replays the pass identically.

use crate::common::{Count, Pid, TriageResult};
use crate::data::record::{LogRecord, TraceRecordP};
use crate::data::resolved::ResolvedRecord;
use crate::readers::logstream::{IterFilter, LogStream, RecordIter};

use std::collections::HashMap;

#[allow(unused_imports)]
use ::si_trace_print::{defn, defo, defx, defñ};

/// The live identity of one active descriptor address.
#[derive(Clone, Debug)]
struct ActiveIdentity {
    /// reuse-disambiguated descriptor text
    public: String,
    /// the creating parent's resolved identity
    parent: String,
    /// created by a new-RPC event?
    is_rpc: bool,
}

/// A forward pass over one pid's trace records, yielding
/// [`ResolvedRecord`]s with reuse-disambiguated identities.
///
/// Resolution is position-dependent, so the pass always starts from the
/// beginning of the file and requires a concrete pid (interleaving two
/// address spaces would corrupt the tables).
pub struct IdentityResolver<'a> {
    records: RecordIter<'a>,
    /// creations seen per raw address; the next generation number
    reuse_count: HashMap<String, Count>,
    /// raw address of each live object to its current identity
    active: HashMap<String, ActiveIdentity>,
}

impl<'a> IdentityResolver<'a> {
    /// Begin a resolving pass over `pid`'s trace records.
    pub fn new(
        stream: &'a mut LogStream,
        pid: Pid,
    ) -> TriageResult<IdentityResolver<'a>> {
        defñ!("(pid {})", pid);
        let records = stream.iterate(IterFilter {
            pid: Some(pid),
            trace_only: true,
            raw: false,
        })?;

        Ok(IdentityResolver {
            records,
            reuse_count: HashMap::new(),
            active: HashMap::new(),
        })
    }

    /// The disambiguated name for generation `gen` of a raw address.
    fn public_name(descriptor: &str, gen: Count) -> String {
        match gen {
            0 => descriptor.to_string(),
            _ => format!("{}_{}", descriptor, gen),
        }
    }

    /// Resolve an address through the active table, falling back to the
    /// raw text for objects created before this trace window began.
    fn resolve(&self, descriptor: &str) -> String {
        match self.active.get(descriptor) {
            Some(identity) => identity.public.clone(),
            None => descriptor.to_string(),
        }
    }

    /// A creation event: assign the next generation of this address and
    /// record it active.
    fn create(&mut self, record: &TraceRecordP, is_rpc: bool) -> ResolvedRecord {
        let descriptor: &str = record.descriptor.as_str();
        let parent: String = match record.parent() {
            Some(val) => self.resolve(val),
            None => String::new(),
        };
        let gen: Count = *self.reuse_count.get(descriptor).unwrap_or(&0);
        let public: String = IdentityResolver::public_name(descriptor, gen);
        self.reuse_count.insert(descriptor.to_string(), gen + 1);
        defo!("create {:?} gen {} parent {:?}", public, gen, parent);
        self.active.insert(
            descriptor.to_string(),
            ActiveIdentity {
                public: public.clone(),
                parent: parent.clone(),
                is_rpc,
            },
        );

        ResolvedRecord {
            record: record.clone(),
            public_descriptor: public,
            public_parent: parent,
            is_rpc,
        }
    }

    /// A link event: the function argument is a _new_ child joining the
    /// hierarchy under the printed target. The child keeps the address's
    /// current generation; links are aliases, not fresh creations.
    fn link(&mut self, record: &TraceRecordP) -> ResolvedRecord {
        let descriptor: &str = record.descriptor.as_str();
        let target: String = match record.parent() {
            Some(val) => self.resolve(val),
            None => String::new(),
        };
        let gen: Count = self
            .reuse_count
            .get(descriptor)
            .map_or(0, |count| count.saturating_sub(1));
        let public: String = IdentityResolver::public_name(descriptor, gen);
        defo!("link {:?} under {:?}", public, target);
        self.active.insert(
            descriptor.to_string(),
            ActiveIdentity {
                public: public.clone(),
                parent: target.clone(),
                is_rpc: false,
            },
        );

        ResolvedRecord {
            record: record.clone(),
            public_descriptor: public,
            public_parent: target,
            is_rpc: false,
        }
    }

    /// A teardown event: resolve, then retire the address so a future
    /// creation at the same address gets a fresh generation.
    fn teardown(&mut self, record: &TraceRecordP) -> ResolvedRecord {
        let descriptor: &str = record.descriptor.as_str();
        match self.active.remove(descriptor) {
            Some(identity) => {
                defo!("teardown {:?}", identity.public);
                ResolvedRecord {
                    record: record.clone(),
                    public_descriptor: identity.public,
                    public_parent: identity.parent,
                    is_rpc: identity.is_rpc,
                }
            }
            None => {
                // teardown of an object created before the trace window
                defo!("teardown of unknown {:?}", descriptor);
                ResolvedRecord {
                    record: record.clone(),
                    public_descriptor: descriptor.to_string(),
                    public_parent: String::new(),
                    is_rpc: false,
                }
            }
        }
    }

    /// Any other reference to a descriptor: copy the active identity if
    /// the address is live, otherwise pass the raw text through.
    fn reference(&self, record: &TraceRecordP) -> ResolvedRecord {
        let descriptor: &str = record.descriptor.as_str();
        match self.active.get(descriptor) {
            Some(identity) => ResolvedRecord {
                record: record.clone(),
                public_descriptor: identity.public.clone(),
                public_parent: identity.parent.clone(),
                is_rpc: identity.is_rpc,
            },
            None => ResolvedRecord {
                record: record.clone(),
                public_descriptor: descriptor.to_string(),
                public_parent: String::new(),
                is_rpc: false,
            },
        }
    }
}

impl Iterator for IdentityResolver<'_> {
    type Item = ResolvedRecord;

    fn next(&mut self) -> Option<ResolvedRecord> {
        let record: TraceRecordP = match self.records.next()? {
            LogRecord::Trace(tr) => tr,
            // the filter excludes RawRecords
            LogRecord::Raw(_) => return self.next(),
        };
        if record.descriptor.is_empty() {
            return Some(ResolvedRecord::unresolved(record));
        }
        let resolved = if record.is_new() || record.is_new_rpc() {
            self.create(&record, record.is_new_rpc())
        } else if record.is_link() {
            self.link(&record)
        } else if record.is_dereg() || record.is_dereg_rpc() {
            self.teardown(&record)
        } else {
            self.reference(&record)
        };

        Some(resolved)
    }
}
