//! # Agent Service Config
//!
//! Configuration management for the agent service: schema, TOML loading
//! with `${VAR}` expansion, and validation.

mod error;
mod loader;
mod schema;
mod validator;

pub use error::ConfigError;
pub use loader::ConfigLoader;
pub use schema::*;
pub use validator::{ConfigValidator, ValidationError, ValidationResult, ValidationWarning};
