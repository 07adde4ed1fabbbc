//! ghinbox: a local mirror of GitHub notifications with rule-based triage.

pub mod cleanup;
pub mod cli;
pub mod clock;
pub mod config;
pub mod database;
pub mod error;
pub mod jobs;
pub mod logging;
pub mod processor;
pub mod query;
pub mod rules;
pub mod services;
pub mod sync;

#[cfg(test)]
pub(crate) mod test_support;

pub use error::{Error, Result};
