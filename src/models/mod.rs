//! Data models representing database entities.
//!
//! This module contains all data structures that map to database tables,
//! plus the request/response types exchanged with SDKs and operators.

/// API key credential model
pub mod api_key;
/// Config snapshot model
pub mod snapshot;
/// Ingested event model and batch normalization
pub mod event;
