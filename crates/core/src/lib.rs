//! PVZ Core - Shared domain vocabulary.
//!
//! This crate provides the types every other PVZ component agrees on:
//! - `server` - The intake HTTP service
//! - `cli` - Command-line tools for migrations and user management
//!
//! # Architecture
//!
//! The core crate contains only types - no I/O, no database access,
//! no HTTP. Database encoding is opt-in through the `postgres` feature.
//!
//! # Modules
//!
//! - [`types`] - Typed IDs, email, and the fixed city/product/status/role vocabularies

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
