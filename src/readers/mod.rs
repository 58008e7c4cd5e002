// src/readers/mod.rs

//! The `readers` module has the file-access and forward-pass machinery:
//! [`LogStream`] for reading and classifying lines, and
//! [`IdentityResolver`] for disambiguating reused pointer addresses.
//!
//! [`LogStream`]: crate::readers::logstream::LogStream
//! [`IdentityResolver`]: crate::readers::resolver::IdentityResolver

pub mod logstream;
pub mod resolver;
