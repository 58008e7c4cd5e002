// src/printer/mod.rs

//! The `printer` module renders pass results: the hierarchy dump and
//! aggregate tables ([`report`]), and the logging-frequency summary
//! ([`summary`]).

pub mod report;
pub mod summary;
