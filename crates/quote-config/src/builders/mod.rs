//! Builders for constructing `Config` instances with sensible defaults.
pub mod config;

pub use config::ConfigBuilder;
