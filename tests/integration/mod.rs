//! Integration tests for heapsift
//!
//! These tests read dump files from disk through the public API and the CLI.

#[path = "../common/mod.rs"]
pub mod common;

pub mod cli;
pub mod queries;
