//! Queued track job
//!
//! A [`TrackJob`] is the serialized snapshot handed to the queue engine.
//! URL, headers and body are fully resolved at enqueue time so the relay
//! never rebuilds the request; only the re-validation step reads live
//! configuration when the job executes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Snapshot of one audit request captured at enqueue time
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackJob {
    /// Unique job identifier, used for worker log correlation
    pub id: Uuid,
    /// When the job was handed to the queue
    pub enqueued_at: DateTime<Utc>,
    /// Audit type string as submitted ("action" or "change")
    pub audit_type: String,
    /// Tenant the event targets
    pub tenant: String,
    /// Fully-resolved request URL
    pub url: String,
    /// Request header set, including authentication headers
    pub headers: HashMap<String, String>,
    /// JSON-encoded request body
    pub body: String,
}

impl TrackJob {
    /// Create a new job snapshot stamped with a fresh id and timestamp
    pub fn new(
        audit_type: impl Into<String>,
        tenant: impl Into<String>,
        url: impl Into<String>,
        headers: HashMap<String, String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            enqueued_at: Utc::now(),
            audit_type: audit_type.into(),
            tenant: tenant.into(),
            url: url.into(),
            headers,
            body: body.into(),
        }
    }
}
