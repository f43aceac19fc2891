//! PVZ intake service library.
//!
//! Pickup points, receptions and the products logged into them, behind a
//! role-gated HTTP API. The binary in `main.rs` wires this library to
//! `PostgreSQL`; tests drive it over the in-memory store.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod config;
pub mod context;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod state;
