//! Shared data types for the runtime support crates.

pub mod config;
pub mod endpoint;
pub mod error;
pub mod mtls;
pub mod secret;
pub mod service;
pub mod token;

pub use error::ApiError;
