//! VIP load balancer core functionality.
//!
//! This crate contains the domain models, configuration definitions, the
//! backend selection policies, flow-rule synthesis and the shared statistics
//! store that power the VIP load-balancing controller.

pub mod config;
pub mod domain;
pub mod error;
pub mod load_balancer;
pub mod stats;

pub use config::Config;
pub use error::{ConfigError, ConfigResult};
