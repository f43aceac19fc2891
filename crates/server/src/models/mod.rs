//! Domain models for the intake service.
//!
//! These are the shapes that flow between the store, the workflow, and the
//! HTTP layer. Field names serialise to the public API's camelCase keys.

pub mod intake;
pub mod user;

pub use intake::{
    ListFilter, PickupPoint, PickupPointWithReceptions, Product, Reception,
    ReceptionWithProducts,
};
pub use user::{User, UserCredentials};
