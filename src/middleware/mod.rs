//! HTTP middleware components.
//!
//! Middleware are functions that run before route handlers.
//! They can:
//! - Authenticate requests
//! - Inject context into the request
//! - Short-circuit requests (reject unauthorized)

/// SDK API key authentication middleware
pub mod auth;
/// Operator token gate for internal routes
pub mod admin;
