//! Rig Configuration Module
//!
//! Device addresses, timeouts and stream tuning loaded from TOML.
//!
//! ## Loading Order
//!
//! 1. `LABRIG_CONFIG` environment variable (path to TOML file)
//! 2. `rig_config.toml` in the current working directory
//! 3. Built-in defaults ([`defaults`])
//!
//! The loaded config is passed by value into the controllers and the HTTP
//! state at startup; nothing reads it through a global.

mod rig_config;
pub mod defaults;
pub mod validation;

pub use rig_config::*;
