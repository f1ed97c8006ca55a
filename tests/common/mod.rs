//! Shared test utilities for heapsift
//!
//! Synthetic heap dumps written to temporary files.

pub mod dump_fixtures;
