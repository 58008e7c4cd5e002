// src/trackers/mod.rs

//! The `trackers` module has the lifecycle verifiers that consume one
//! resolved pass: [`RpcLifecycleTracker`], [`DescriptorLifecycleTracker`]
//! and [`MemoryTracker`], plus the [`Violation`] type they all report.
//!
//! Violations never abort a pass. The engine surfaces everything found
//! in one linear scan; the caller decides pass/fail.
//!
//! [`RpcLifecycleTracker`]: crate::trackers::rpc::RpcLifecycleTracker
//! [`DescriptorLifecycleTracker`]: crate::trackers::descriptor::DescriptorLifecycleTracker
//! [`MemoryTracker`]: crate::trackers::memory::MemoryTracker

pub mod descriptor;
pub mod memory;
pub mod rpc;

use crate::data::record::TraceRecordP;

use std::fmt;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Violation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Severity class of a reported lifecycle violation.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ViolationSev {
    Warning,
    Error,
}

impl fmt::Display for ViolationSev {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ViolationSev::Warning => write!(f, "WARN"),
            ViolationSev::Error => write!(f, "ERROR"),
        }
    }
}

/// One lifecycle state-machine violation found during a pass.
///
/// `record` points at the log line the violation is about; post-pass
/// count mismatches have no single line and carry `None`.
#[derive(Clone, Debug)]
pub struct Violation {
    pub sev: ViolationSev,
    pub message: String,
    pub record: Option<TraceRecordP>,
}

impl Violation {
    pub fn warning<S: Into<String>>(message: S, record: Option<TraceRecordP>) -> Violation {
        Violation {
            sev: ViolationSev::Warning,
            message: message.into(),
            record,
        }
    }

    pub fn error<S: Into<String>>(message: S, record: Option<TraceRecordP>) -> Violation {
        Violation {
            sev: ViolationSev::Error,
            message: message.into(),
            record,
        }
    }

    pub fn is_error(&self) -> bool {
        self.sev == ViolationSev::Error
    }

    /// Render in gcc error format so editors and CI log scrapers can
    /// jump to the logging call site:
    ///
    /// ```text
    /// src/cart/crt_rpc.c:244:1: ERROR: invalid rpc remove '(0x...) destroying.'
    /// ```
    ///
    /// The anonymized message keeps the rendering stable across runs,
    /// which is what makes once-per-line dedup possible.
    pub fn render(&self) -> String {
        match &self.record {
            Some(record) => format!(
                "{}:1: {}: {} '{}'",
                record.location(),
                self.sev,
                self.message,
                record.anon_msg(),
            ),
            None => format!("{}: {}", self.sev, self.message),
        }
    }
}
