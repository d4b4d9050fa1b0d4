//! Audit dispatch pipeline
//!
//! [`Tracker`] validates a track request against the live configuration,
//! builds the outbound HTTP call, maps response codes onto the error
//! taxonomy, and chooses between synchronous and queued delivery.
//!
//! Every failure funnels through one settle point keyed off the
//! configuration's `fail_silently` flag: silent mode degrades the failure
//! to `Ok(false)`, otherwise the typed [`AuditError`] surfaces. In silent
//! mode a caller cannot distinguish "never sent because disallowed" from
//! "sent and rejected by the service" — both are `Ok(false)`.

use http::StatusCode;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use crate::config::AuditConfig;
use crate::error::{AuditError, Result};
use crate::job::TrackJob;
use crate::queue::JobQueue;
use crate::tenants::{StaticTenants, TenantResolver};

const CONTENT_TYPE: &str = "application/json";

/// Header carrying the configured API key
pub const AUTH_KEY_HEADER: &str = "audit-auth-key";
/// Header carrying the configured API secret
pub const AUTH_SECRET_HEADER: &str = "audit-auth-secret";

/// Classification of a tracked event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditType {
    /// Something a user did
    Action,
    /// Something that changed state
    Change,
}

impl AuditType {
    /// The wire representation of this audit type
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Action => "action",
            Self::Change => "change",
        }
    }

    /// Parse a wire string, returning `None` for anything but "action"
    /// or "change"
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "action" => Some(Self::Action),
            "change" => Some(Self::Change),
            _ => None,
        }
    }
}

impl fmt::Display for AuditType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Builder for [`Tracker`]
pub struct TrackerBuilder {
    config: AuditConfig,
    tenants: Arc<dyn TenantResolver>,
    queue: Option<Arc<dyn JobQueue>>,
}

impl TrackerBuilder {
    /// Set the initial configuration
    pub fn config(mut self, config: AuditConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the tenant resolver consulted on every authorization check
    pub fn tenants(mut self, resolver: impl TenantResolver) -> Self {
        self.tenants = Arc::new(resolver);
        self
    }

    /// Wire a queue backend for asynchronous delivery
    pub fn queue(mut self, queue: impl JobQueue) -> Self {
        self.queue = Some(Arc::new(queue));
        self
    }

    /// Build the tracker, constructing the HTTP client with the
    /// configured request timeout
    pub fn build(self) -> Tracker {
        let client = reqwest::Client::builder()
            .timeout(self.config.request_timeout())
            .build()
            .unwrap_or_default();

        Tracker {
            config: Arc::new(RwLock::new(self.config)),
            tenants: self.tenants,
            queue: self.queue,
            client,
        }
    }
}

impl Default for TrackerBuilder {
    fn default() -> Self {
        Self {
            config: AuditConfig::default(),
            tenants: Arc::new(StaticTenants::default()),
            queue: None,
        }
    }
}

/// Dispatches audit events to the remote audit service
///
/// Cheap to clone; clones share the live configuration, resolver and
/// queue handle. Construct one per host application and pass it around
/// explicitly — there is no process-wide instance.
#[derive(Clone)]
pub struct Tracker {
    config: Arc<RwLock<AuditConfig>>,
    tenants: Arc<dyn TenantResolver>,
    queue: Option<Arc<dyn JobQueue>>,
    client: reqwest::Client,
}

impl Tracker {
    /// Start building a tracker
    pub fn builder() -> TrackerBuilder {
        TrackerBuilder::default()
    }

    /// Create a tracker over a configuration with the default (empty)
    /// tenant resolver and no queue backend
    pub fn new(config: AuditConfig) -> Self {
        Self::builder().config(config).build()
    }

    /// Shared handle to the live configuration
    ///
    /// Host applications mutate settings through this handle at any time;
    /// every dispatch reads a fresh snapshot, last value wins.
    pub fn config_handle(&self) -> Arc<RwLock<AuditConfig>> {
        self.config.clone()
    }

    /// Mutate the live configuration in place
    pub fn update_config(&self, apply: impl FnOnce(&mut AuditConfig)) {
        let mut config = self.config.write().unwrap_or_else(PoisonError::into_inner);
        apply(&mut config);
    }

    /// Track an "action" audit event for a tenant
    pub async fn track_action<T: Serialize + ?Sized>(
        &self,
        tenant: &str,
        payload: &T,
    ) -> Result<bool> {
        self.track(AuditType::Action.as_str(), tenant, payload).await
    }

    /// Track a "change" audit event for a tenant
    pub async fn track_change<T: Serialize + ?Sized>(
        &self,
        tenant: &str,
        payload: &T,
    ) -> Result<bool> {
        self.track(AuditType::Change.as_str(), tenant, payload).await
    }

    /// Send an audit event, synchronously or through the queue backend
    /// depending on the live configuration
    ///
    /// Returns `Ok(true)` when the event was accepted (or the job was
    /// accepted by the queue), `Ok(false)` for any failure in silent
    /// mode, and the typed error otherwise.
    pub async fn track<T: Serialize + ?Sized>(
        &self,
        audit_type: &str,
        tenant: &str,
        payload: &T,
    ) -> Result<bool> {
        let config = self.config_snapshot();
        if config.use_queue {
            self.track_later(&config, audit_type, tenant, payload).await
        } else {
            self.track_now(&config, audit_type, tenant, payload).await
        }
    }

    /// Whether a track request would currently be fired
    ///
    /// Checks, in order: configuration validity, audit type, tenant
    /// membership in the resolver's current set. The first violated check
    /// wins; in silent mode it yields `Ok(false)`.
    pub async fn request_allowed(&self, audit_type: &str, tenant: &str) -> Result<bool> {
        let config = self.config_snapshot();
        let outcome = self.check_request(&config, audit_type, tenant).await;
        Self::settle(&config, outcome.map(|()| true))
    }

    /// Map an audit service response status onto the taxonomy
    ///
    /// Pure with respect to the status: any status outside the mapped set
    /// (including all 2xx) is a success.
    pub fn validate_response_code(&self, status: StatusCode) -> Result<bool> {
        let config = self.config_snapshot();
        Self::settle(&config, Self::check_response_code(status).map(|()| true))
    }

    pub(crate) fn config_snapshot(&self) -> AuditConfig {
        self.config
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub(crate) fn http_client(&self) -> &reqwest::Client {
        &self.client
    }

    /// Degrade a failed outcome to `Ok(false)` when fail_silently is set
    fn settle(config: &AuditConfig, outcome: std::result::Result<bool, AuditError>) -> Result<bool> {
        match outcome {
            Ok(sent) => Ok(sent),
            Err(_) if config.fail_silently => Ok(false),
            Err(err) => Err(err),
        }
    }

    async fn check_request(
        &self,
        config: &AuditConfig,
        audit_type: &str,
        tenant: &str,
    ) -> std::result::Result<(), AuditError> {
        if !config.is_valid() {
            return Err(AuditError::missing_configuration(format!(
                "Audit configuration is not valid: {}",
                config.error_messages()
            )));
        }
        if AuditType::parse(audit_type).is_none() {
            return Err(AuditError::invalid_track_type(format!(
                "Unknown track type {}",
                audit_type
            )));
        }
        let allowed = self.tenants.current().await;
        if !allowed.iter().any(|t| t == tenant) {
            return Err(AuditError::invalid_tenant(format!(
                "Invalid tenant: {}",
                tenant
            )));
        }
        Ok(())
    }

    fn check_response_code(status: StatusCode) -> std::result::Result<(), AuditError> {
        match status.as_u16() {
            400 => Err(AuditError::unable_audit_creation(
                "An error occurred in the audit service that prevents the audit from being created",
            )),
            401 => Err(AuditError::unauthorized(
                "api_key and/or api_secret provided are not valid",
            )),
            403 => Err(AuditError::missing_configuration(
                "No authorization headers provided",
            )),
            422 => Err(AuditError::missing_tenant("No tenant provided")),
            503 => Err(AuditError::unable_database_connection(
                "Unable to connect to the audit database",
            )),
            _ => Ok(()),
        }
    }

    async fn track_now<T: Serialize + ?Sized>(
        &self,
        config: &AuditConfig,
        audit_type: &str,
        tenant: &str,
        payload: &T,
    ) -> Result<bool> {
        let outcome = self.deliver_now(config, audit_type, tenant, payload).await;
        Self::settle(config, outcome.map(|()| true))
    }

    async fn deliver_now<T: Serialize + ?Sized>(
        &self,
        config: &AuditConfig,
        audit_type: &str,
        tenant: &str,
        payload: &T,
    ) -> std::result::Result<(), AuditError> {
        self.check_request(config, audit_type, tenant).await?;

        let url = Self::endpoint_url(config, audit_type, tenant);
        let mut request = self.client.post(&url).json(payload);
        for (key, value) in Self::request_headers(config) {
            request = request.header(key.as_str(), value.as_str());
        }

        let response = request.send().await.map_err(|e| {
            AuditError::connection_refused(format!(
                "Failed to reach audit service at {}: {}",
                url, e
            ))
        })?;

        Self::check_response_code(response.status())
    }

    async fn track_later<T: Serialize + ?Sized>(
        &self,
        config: &AuditConfig,
        audit_type: &str,
        tenant: &str,
        payload: &T,
    ) -> Result<bool> {
        let outcome = self.enqueue_job(config, audit_type, tenant, payload).await;
        Self::settle(config, outcome.map(|()| true))
    }

    /// Serialize the request snapshot and hand it to the queue engine
    ///
    /// Validation is deferred to the worker, which re-checks against the
    /// configuration live at execution time.
    async fn enqueue_job<T: Serialize + ?Sized>(
        &self,
        config: &AuditConfig,
        audit_type: &str,
        tenant: &str,
        payload: &T,
    ) -> std::result::Result<(), AuditError> {
        let Some(queue) = &self.queue else {
            return Err(AuditError::redis_connection_refused(
                "No queue backend configured. Wire one through the builder or set use_queue to false.",
            ));
        };

        if !queue.is_reachable().await {
            return Err(AuditError::redis_connection_refused(
                "Unable to connect to the queue backend. Check its configuration or set use_queue to false.",
            ));
        }

        let body = serde_json::to_string(payload).map_err(|e| {
            AuditError::unable_audit_creation(format!("Failed to encode audit payload: {}", e))
        })?;

        let job = TrackJob::new(
            audit_type,
            tenant,
            Self::endpoint_url(config, audit_type, tenant),
            Self::request_headers(config),
            body,
        );

        queue.enqueue(&config.queue_name, &job).await
    }

    fn endpoint_url(config: &AuditConfig, audit_type: &str, tenant: &str) -> String {
        format!(
            "{}/v1/{}/{}",
            config.endpoint.as_deref().unwrap_or_default(),
            tenant,
            audit_type
        )
    }

    fn request_headers(config: &AuditConfig) -> HashMap<String, String> {
        HashMap::from([
            ("Content-Type".to_string(), CONTENT_TYPE.to_string()),
            (
                AUTH_KEY_HEADER.to_string(),
                config.api_key.clone().unwrap_or_default(),
            ),
            (
                AUTH_SECRET_HEADER.to_string(),
                config.api_secret.clone().unwrap_or_default(),
            ),
        ])
    }
}
