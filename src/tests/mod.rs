// src/tests/mod.rs

//! Tests for _cltlib_, kept out of the implementation files.

pub mod common;

pub mod descriptor_tests;
pub mod report_tests;
