//! Business logic services.
//!
//! Services contain core business logic separated from HTTP handlers.
//! They handle database transactions, atomic counters, and the pure
//! functions (window math, canonical hashing, scope derivation) that the
//! handlers compose.

pub mod audit_service;
pub mod event_service;
pub mod key_service;
pub mod rate_limit;
pub mod snapshot_service;
pub mod usage_service;
