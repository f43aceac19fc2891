//! HTTP middleware stack.
//!
//! # Middleware Order (outermost first)
//!
//! 1. Sentry layers (added in `main`)
//! 2. `TraceLayer` (added in `main`)
//! 3. Request ID (creates the [`crate::context::RequestContext`])
//! 4. Request metrics (route template + status)
//! 5. Access gate (API routes only; health and metrics stay outside)

pub mod access_gate;
pub mod metrics;
pub mod request_id;

pub use access_gate::{AccessGate, GateOutcome, GateRejection, access_gate_middleware};
pub use metrics::track_requests;
pub use request_id::{REQUEST_ID_HEADER, request_id_middleware};
