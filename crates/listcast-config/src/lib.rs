//! KDL configuration parsing for the listcast render orchestrator.
//!
//! This crate handles parsing of the service configuration (listcast.kdl):
//! - HTTP listener settings
//! - How the render pipeline is launched
//! - Job deadlines and log retention

pub mod error;
pub mod service;

pub use error::{ConfigError, ConfigResult};
pub use service::{JobConfig, PipelineConfig, ServerConfig, ServiceConfig, parse_service_config};
