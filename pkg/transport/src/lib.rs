//! Authenticated, name-resolving HTTP transport.
//!
//! Every outbound request goes through [`AuthTransport`], which attaches an
//! identity token, rewrites logical service names to live endpoints and then
//! hands the request to the next [`RoundTrip`] in the chain.

pub mod auth;
pub mod client;
pub mod error;
pub mod hostname;
pub mod round_trip;

pub use auth::{AuthTransport, NameResolution};
pub use client::{Client, ClientOptions, ResolutionMode};
pub use error::{TransportError, TransportErrorKind};
pub use hostname::{Hostname, HostnameError, HostnameParser};
pub use round_trip::{HttpTransport, RoundTrip};
