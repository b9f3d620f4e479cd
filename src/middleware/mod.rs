//! HTTP middleware and extractors.
//!
//! - [`auth`]: API-key / admin-secret dispatcher for programmatic routes
//! - [`session`]: cookie-based browser sessions

pub mod auth;
pub mod session;
