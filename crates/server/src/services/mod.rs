//! Business logic services.
//!
//! # Services
//!
//! - `policy` - Static role/path/method access rules
//! - `auth` - Identity tokens, logins, and registration
//! - `intake` - Pickup point / reception / product lifecycle
//! - `audit` - Gate decision and workflow error records
//! - `metrics` - Entity and request counters

pub mod audit;
pub mod auth;
pub mod intake;
pub mod metrics;
pub mod policy;
