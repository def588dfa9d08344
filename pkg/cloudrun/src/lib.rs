//! Resolution of bare Cloud Run service names to their URLs.

pub mod cache;
pub mod client;

pub use cache::{ServiceNameResolver, ServiceUrlCache};
pub use client::{CloudRunClient, ServiceResolver};
