//! Rigging operator: wiring for the SecretsComponent controller

#![deny(missing_docs)]

/// Flag parsing and validation
pub mod config;
/// Controller construction
pub mod controller_runner;
