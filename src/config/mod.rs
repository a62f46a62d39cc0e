//! Monitor Configuration Module
//!
//! Detector windows, thresholds, cycle policy, and sink settings loaded from
//! TOML, with the plant's environment variables layered on top.
//!
//! ## Loading Order
//!
//! 1. `--config` path given on the command line
//! 2. `LINEWATCH_CONFIG` environment variable (path to TOML file)
//! 3. `linewatch.toml` in the current working directory
//! 4. Built-in defaults
//!
//! The loaded `MonitorConfig` is passed explicitly to whatever needs it.
//! There is no global config.

mod monitor_config;
pub mod defaults;
pub mod validation;

pub use monitor_config::*;
