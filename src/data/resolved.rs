// src/data/resolved.rs

//! Implements [`ResolvedRecord`], a [`TraceRecord`] with its pointer
//! identity disambiguated by the [`IdentityResolver`].
//!
//! [`TraceRecord`]: crate::data::record::TraceRecord
//! [`IdentityResolver`]: crate::readers::resolver::IdentityResolver

use crate::data::record::{TraceRecord, TraceRecordP};

/// The sentinel parent naming the top of the descriptor hierarchy.
pub const ROOT_PARENT: &str = "root";

/// A [`TraceRecord`] plus forward-propagated identity.
///
/// `public_descriptor` is the raw descriptor text suffixed with a
/// reuse-generation counter when the address was reused
/// (`0x55a3f8132e60`, `0x55a3f8132e60_1`, …). `public_parent` is the
/// creating parent's `public_descriptor`, or the raw parent text when
/// the parent was created before this trace window began.
///
/// Derived fresh for every `TraceRecord` during one forward pass; only
/// the trackers' tables hold them longer, and those are scoped to one
/// iteration session.
#[derive(Clone, Debug)]
pub struct ResolvedRecord {
    pub record: TraceRecordP,
    /// reuse-disambiguated descriptor identity; empty when the line
    /// carries no descriptor
    pub public_descriptor: String,
    /// resolved parent identity; empty when unknown
    pub public_parent: String,
    /// was this descriptor created by a new-RPC event?
    pub is_rpc: bool,
}

impl ResolvedRecord {
    /// A record with no descriptor identity to resolve.
    pub fn unresolved(record: TraceRecordP) -> ResolvedRecord {
        ResolvedRecord {
            record,
            public_descriptor: String::new(),
            public_parent: String::new(),
            is_rpc: false,
        }
    }

    /// shorthand for the wrapped [`TraceRecord`]
    pub fn rec(&self) -> &TraceRecord {
        &self.record
    }

    /// does this record carry a descriptor identity?
    pub fn has_identity(&self) -> bool {
        !self.public_descriptor.is_empty()
    }
}
