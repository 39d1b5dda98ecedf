//! Command-line interface for trace-runner
//!
//! This module contains CLI argument parsing and configuration

pub mod args;

pub use args::Args;
