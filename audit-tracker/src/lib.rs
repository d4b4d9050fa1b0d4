//! # audit-tracker
//!
//! Client library for emitting structured "action" and "change" audit
//! events to a remote audit service, scoped per tenant, with synchronous
//! or queued delivery.
//!
//! ## Features
//!
//! - **Dispatch pipeline**: request validation, tenant authorization,
//!   HTTP transmission, response-code-to-error mapping
//! - **Two delivery paths**: blocking HTTP POST, or hand-off to a Redis
//!   queue consumed by [`TrackWorker`](worker::TrackWorker)
//! - **Fail-silent mode**: every failure degrades to `Ok(false)` instead
//!   of a typed error (on by default)
//! - **Live configuration**: the tracker reads the shared configuration
//!   on every call; hosts may mutate it at any time
//! - **Closed error taxonomy**: callers branch on
//!   [`AuditErrorKind`](error::AuditErrorKind), which is stable across
//!   releases
//!
//! ## Example
//!
//! ```rust,no_run
//! use audit_tracker::prelude::*;
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let mut config = AuditConfig::load()?;
//!     config.endpoint = Some("http://localhost:8090".into());
//!     config.api_key = Some("key".into());
//!     config.api_secret = Some("secret".into());
//!
//!     let tracker = Tracker::builder()
//!         .config(config)
//!         .tenants(StaticTenants::new(["acme"]))
//!         .build();
//!
//!     tracker.track_action("acme", &json!({"user": "1"})).await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod job;
pub mod queue;
pub mod tenants;
pub mod tracker;
pub mod worker;

/// Commonly used types
pub mod prelude {
    pub use crate::config::{AuditConfig, RedisConfig};
    pub use crate::error::{AuditError, AuditErrorKind, Result};
    pub use crate::job::TrackJob;
    pub use crate::queue::JobQueue;
    #[cfg(feature = "queue")]
    pub use crate::queue::RedisJobQueue;
    pub use crate::tenants::{StaticTenants, TenantResolver};
    pub use crate::tracker::{AuditType, Tracker, TrackerBuilder};
    pub use crate::worker::TrackWorker;
}
