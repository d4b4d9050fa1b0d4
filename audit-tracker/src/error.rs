//! Error taxonomy for audit dispatch
//!
//! The set of kinds is closed and stable: callers branch on
//! [`AuditErrorKind`] to decide how to react, and the async relay uses
//! [`AuditErrorKind::is_retriable`] to decide whether a failed job may be
//! handed back to the queue engine.

use std::fmt;
use thiserror::Error;

/// Result type alias using the audit error
pub type Result<T> = std::result::Result<T, AuditError>;

/// Category of audit dispatch failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuditErrorKind {
    /// The audit service could not be reached
    ConnectionRefused,
    /// Tenant is not in the currently allowed set
    InvalidTenant,
    /// Audit type is not one of the supported track types
    InvalidTrackType,
    /// Configuration is incomplete, or the service rejected the request
    /// for missing authorization headers
    MissingConfiguration,
    /// The service rejected the request because no tenant was provided
    MissingTenant,
    /// The queue backend is unreachable
    RedisConnectionRefused,
    /// The service failed to persist the audit record
    UnableAuditCreation,
    /// The service could not reach its own database
    UnableDatabaseConnection,
    /// Credentials were rejected by the service
    Unauthorized,
}

impl AuditErrorKind {
    /// Whether a job failing with this kind may be retried by the queue
    /// engine.
    ///
    /// MissingTenant, UnableAuditCreation and InvalidTrackType indicate a
    /// permanently malformed or policy-rejected request; retrying cannot
    /// change the outcome, so the relay completes the job instead.
    pub fn is_retriable(&self) -> bool {
        !matches!(
            self,
            Self::MissingTenant | Self::UnableAuditCreation | Self::InvalidTrackType
        )
    }
}

impl fmt::Display for AuditErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConnectionRefused => write!(f, "connection_refused"),
            Self::InvalidTenant => write!(f, "invalid_tenant"),
            Self::InvalidTrackType => write!(f, "invalid_track_type"),
            Self::MissingConfiguration => write!(f, "missing_configuration"),
            Self::MissingTenant => write!(f, "missing_tenant"),
            Self::RedisConnectionRefused => write!(f, "redis_connection_refused"),
            Self::UnableAuditCreation => write!(f, "unable_audit_creation"),
            Self::UnableDatabaseConnection => write!(f, "unable_database_connection"),
            Self::Unauthorized => write!(f, "unauthorized"),
        }
    }
}

/// An audit dispatch failure with a human-readable message
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct AuditError {
    /// The category of failure
    pub kind: AuditErrorKind,
    /// Human-readable error message
    pub message: String,
}

impl AuditError {
    /// Create a new audit error
    pub fn new(kind: AuditErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Create a connection refused error
    pub fn connection_refused(message: impl Into<String>) -> Self {
        Self::new(AuditErrorKind::ConnectionRefused, message)
    }

    /// Create an invalid tenant error
    pub fn invalid_tenant(message: impl Into<String>) -> Self {
        Self::new(AuditErrorKind::InvalidTenant, message)
    }

    /// Create an invalid track type error
    pub fn invalid_track_type(message: impl Into<String>) -> Self {
        Self::new(AuditErrorKind::InvalidTrackType, message)
    }

    /// Create a missing configuration error
    pub fn missing_configuration(message: impl Into<String>) -> Self {
        Self::new(AuditErrorKind::MissingConfiguration, message)
    }

    /// Create a missing tenant error
    pub fn missing_tenant(message: impl Into<String>) -> Self {
        Self::new(AuditErrorKind::MissingTenant, message)
    }

    /// Create a queue backend unreachable error
    pub fn redis_connection_refused(message: impl Into<String>) -> Self {
        Self::new(AuditErrorKind::RedisConnectionRefused, message)
    }

    /// Create an audit creation failure error
    pub fn unable_audit_creation(message: impl Into<String>) -> Self {
        Self::new(AuditErrorKind::UnableAuditCreation, message)
    }

    /// Create an audit database unreachable error
    pub fn unable_database_connection(message: impl Into<String>) -> Self {
        Self::new(AuditErrorKind::UnableDatabaseConnection, message)
    }

    /// Create an unauthorized error
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(AuditErrorKind::Unauthorized, message)
    }

    /// Whether the relay may hand a job failing with this error back to
    /// the queue engine. See [`AuditErrorKind::is_retriable`].
    pub fn is_retriable(&self) -> bool {
        self.kind.is_retriable()
    }
}
