//! Core engine for a multi-host backup orchestrator: collect local
//! sources into archives, stage them in from every configured peer,
//! store the result to optical media (or rebuild a whole week's worth
//! onto one disc), and purge old working directories. See each module
//! for the action it implements.
//!
//! This crate deliberately never installs a `log` implementation or
//! reads a configuration file itself; both are the embedding binary's
//! job (see [`config`] and `bin/cback.rs`).

pub mod action;
pub mod command;
pub mod config;
pub mod error;
pub mod indicator;
pub mod iso;
pub mod peer;
pub mod platform;
pub mod writer;

pub use error::{CedarError, Result};
