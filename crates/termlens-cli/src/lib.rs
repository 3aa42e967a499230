//! `termlens` command-line crate (library surface).
//!
//! The primary entrypoint for end users is the `termlens` binary. The library exposes the
//! output envelopes so other front ends can render results the same way.

pub use termlens as api;

pub mod envelope;
