//! Core types for the PVZ intake service.
//!
//! This module provides type-safe wrappers for the domain vocabulary.

pub mod email;
pub mod id;
pub mod status;

pub use email::{Email, EmailError};
pub use id::*;
pub use status::*;
