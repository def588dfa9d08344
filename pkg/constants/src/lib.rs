//! Centralized constants for the runtime support library.
//!
//! All project-wide constant values live here.
//! Change a value in one place and it applies everywhere.

pub mod auth;
pub mod endpoints;
pub mod env;
pub mod network;
pub mod paths;
pub mod timing;
