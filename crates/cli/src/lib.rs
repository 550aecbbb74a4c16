//! `fk`: a command-line client over fetchkit.
//!
//! Each invocation prints one JSON envelope (or text) to stdout. Session
//! tokens and the offline queue persist in a JSON file between runs.

pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod logging;
pub mod output;
pub mod storage;
