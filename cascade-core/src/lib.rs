//! Core shared library for the Cascade automation engine.
//!
//! This crate exposes the primitives the engine services depend on:
//! a common error type, configuration loading and logging setup.

pub mod config;
pub mod errors;
pub mod logging;

pub use config::{CoreConfig, Environment};
pub use errors::{CascadeError, Result as CoreResult};
