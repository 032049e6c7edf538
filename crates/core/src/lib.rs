//! Core functionality for the FieldMesh sensor network.
//!
//! This crate provides the fundamental types, configuration model and
//! logging setup shared by the radio, mesh and node crates.

pub mod config;
pub mod error;
pub mod logging;
pub mod types;

pub use config::{Config, MeshSettings, NodeSettings};
pub use error::{CoreError, CoreResult};
pub use logging::{LogFormat, LoggingSettings};
pub use types::NodeType;
