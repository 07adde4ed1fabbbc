//! Service layer module.
//!
//! Wires repositories, the GitHub client and the services into one container.

pub mod container;

pub use container::{ServiceConfig, ServiceContainer};
