//! Integration tests across all layers
//!
//! End-to-end load, diff, and cache scenarios, plus ambient lookups through
//! the active dataset.

mod scenarios;
