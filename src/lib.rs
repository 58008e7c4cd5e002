// src/lib.rs

//! _cltlib_, the library implementation of the _CaRT Log Triage_
//! project, binary `clt`.
//!
//! Reconstructs the lifecycle of transient in-memory objects (RPCs and
//! tracing descriptors) from a captured CaRT log file, where objects
//! are referenced only by their reused memory addresses, and flags
//! violations of the lifecycle state machines.
//!
//! The pipeline, leaves first:
//!
//! * [`parse_line`] turns one text line into a classified [`LogRecord`].
//! * [`LogStream`] loads or streams one log file and produces
//!   restartable, filterable record sequences.
//! * [`IdentityResolver`] disambiguates reused addresses across one
//!   pid's forward pass, yielding [`ResolvedRecord`]s.
//! * [`RpcLifecycleTracker`], [`DescriptorLifecycleTracker`] and
//!   [`MemoryTracker`] verify the state machines and collect
//!   [`Violation`]s.
//! * [`HierarchyReporter`] and [`LogSummary`] render dumps and tables.
//!
//! The engine analyzes an already-captured artifact: it starts no
//! process, speaks no wire protocol, and persists nothing.
//!
//! [`parse_line`]: crate::data::record::parse_line
//! [`LogRecord`]: crate::data::record::LogRecord
//! [`LogStream`]: crate::readers::logstream::LogStream
//! [`IdentityResolver`]: crate::readers::resolver::IdentityResolver
//! [`ResolvedRecord`]: crate::data::resolved::ResolvedRecord
//! [`RpcLifecycleTracker`]: crate::trackers::rpc::RpcLifecycleTracker
//! [`DescriptorLifecycleTracker`]: crate::trackers::descriptor::DescriptorLifecycleTracker
//! [`MemoryTracker`]: crate::trackers::memory::MemoryTracker
//! [`Violation`]: crate::trackers::Violation
//! [`HierarchyReporter`]: crate::printer::report::HierarchyReporter
//! [`LogSummary`]: crate::printer::summary::LogSummary

pub mod common;
pub mod data;
pub mod printer;
pub mod readers;
pub mod trackers;

#[cfg(test)]
pub mod tests;
