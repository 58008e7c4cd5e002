// src/common.rs

//! Common type aliases, the error taxonomy, and stderr print macros
//! shared across _cltlib_ (avoids circular imports).

use ::thiserror::Error;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// file-handling
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// `F`ake `Path` or `F`ile `Path`
pub type FPath = String;
pub type FPaths = Vec<FPath>;
/// File size in bytes
pub type FileSz = u64;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// records and streams
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A general-purpose counter type
pub type Count = u64;
/// Line number within a log file. 1-based, strictly increasing per scan.
pub type LineIndex = usize;
/// A process id as printed in a log line preamble
pub type Pid = u32;
/// A thread id as printed in a log line preamble
pub type Tid = u32;
/// Byte size of a memory allocation
pub type ByteSz = u64;

/// Files larger than this are processed in streaming mode:
/// re-read from offset zero on every iteration restart, never
/// materialized in memory.
pub const STREAM_SZ_THRESHOLD: FileSz = 20 * 1024 * 1024;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// errors
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Hard-stop errors of the engine.
///
/// Lifecycle state-machine violations are _not_ errors in this sense;
/// those are collected as [`Violation`]s and never abort a pass.
///
/// [`Violation`]: crate::trackers::Violation
#[derive(Debug, Error)]
pub enum TriageError {
    /// A structurally well-formed preamble carried a severity keyword
    /// outside the closed 8-value set.
    #[error("invalid log file: unrecognized severity keyword {keyword:?} at line {index}")]
    InvalidLogFile { keyword: String, index: LineIndex },
    /// A pid was requested that was never observed in the file, or a
    /// stateful iteration was requested without a concrete pid.
    #[error("invalid pid: {0}")]
    InvalidPid(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl TriageError {
    /// Helper for the common [`TriageError::InvalidPid`] case.
    pub fn unknown_pid(pid: Pid) -> TriageError {
        TriageError::InvalidPid(format!("pid {} not present in log file", pid))
    }
}

pub type TriageResult<T> = std::result::Result<T, TriageError>;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// stderr print macros
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// `e`println! an `err`or
#[macro_export]
macro_rules! e_err {
    (
        $($args:tt)*
    ) => {
        {
            eprint!("ERROR: ");
            eprintln!($($args)*)
        }
    }
}
pub use e_err;

/// `e`println! a `wrn`ing
#[macro_export]
macro_rules! e_wrn {
    (
        $($args:tt)*
    ) => {
        {
            eprint!("WARNING: ");
            eprintln!($($args)*)
        }
    }
}
pub use e_wrn;

/// `d`ebug `e`println! an `err`or; no-op in release builds
#[macro_export]
macro_rules! de_err {
    (
        $($args:tt)*
    ) => {
        {
            #[cfg(any(debug_assertions,test))]
            eprint!("ERROR: ");
            #[cfg(any(debug_assertions,test))]
            eprintln!($($args)*)
        }
    }
}
pub use de_err;

/// `d`ebug `e`println! a `wrn`ing; no-op in release builds
#[macro_export]
macro_rules! de_wrn {
    (
        $($args:tt)*
    ) => {
        {
            #[cfg(any(debug_assertions,test))]
            eprint!("WARNING: ");
            #[cfg(any(debug_assertions,test))]
            eprintln!($($args)*)
        }
    }
}
pub use de_wrn;
