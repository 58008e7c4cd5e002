// src/data/mod.rs

//! The `data` module is specific to _log record_ data and the
//! classification of one line of a CaRT log file.

pub mod record;
pub mod resolved;
