//! API layer
//!
//! HTTP handlers for:
//! - Admin API (timeline maintenance)
//! - Metrics (Prometheus)

mod admin;
pub mod metrics;

pub use admin::{admin_router, require_admin_token};
pub use metrics::metrics_router;
