//! Asynchronous track relay
//!
//! [`TrackWorker`] is the queued-execution counterpart of the
//! dispatcher's HTTP step. It re-validates each job against the live
//! configuration, re-issues the precomputed request, and decides whether
//! a failed job goes back to the queue engine.
//!
//! The retry decision is made exactly once, at the top of
//! [`TrackWorker::perform`]: kinds classified non-retriable by
//! [`AuditErrorKind::is_retriable`](crate::error::AuditErrorKind::is_retriable)
//! mark the job complete, everything else propagates so the queue engine
//! retries.

use crate::error::{AuditError, Result};
use crate::job::TrackJob;
use crate::tracker::Tracker;

#[cfg(feature = "queue")]
use crate::queue::{JobQueue, RedisJobQueue};
#[cfg(feature = "queue")]
use std::time::Duration;

/// Executes queued track jobs on a worker context
///
/// Many workers may run concurrently; they share no mutable state beyond
/// the tracker's live configuration handle.
#[derive(Clone)]
pub struct TrackWorker {
    tracker: Tracker,
}

impl TrackWorker {
    /// Create a worker over the given tracker
    pub fn new(tracker: Tracker) -> Self {
        Self { tracker }
    }

    /// Execute one deserialized track job
    ///
    /// `Ok(())` marks the job complete. An error asks the queue engine to
    /// retry; jobs that failed for a reason retrying cannot fix are
    /// completed instead, with a warning.
    pub async fn perform(&self, job: &TrackJob) -> Result<()> {
        match self.execute(job).await {
            Ok(()) => Ok(()),
            Err(err) if !err.is_retriable() => {
                tracing::warn!(
                    job_id = %job.id,
                    kind = %err.kind,
                    error = %err,
                    "Completing track job without retry"
                );
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    async fn execute(&self, job: &TrackJob) -> Result<()> {
        if !self
            .tracker
            .request_allowed(&job.audit_type, &job.tenant)
            .await?
        {
            // Silent mode rejected the job; there is nothing to send
            return Ok(());
        }

        let mut request = self.tracker.http_client().post(&job.url);
        for (key, value) in &job.headers {
            request = request.header(key.as_str(), value.as_str());
        }

        let response = request.body(job.body.clone()).send().await.map_err(|e| {
            AuditError::connection_refused(format!(
                "Failed to reach audit service at {}: {}",
                job.url, e
            ))
        })?;

        self.tracker
            .validate_response_code(response.status())
            .map(|_| ())
    }

    /// Consume jobs from the queue backend until an unrecoverable error
    ///
    /// Jobs whose `perform` surfaced a retriable error are handed back to
    /// the queue. The routing name is re-read from the live configuration
    /// on every iteration.
    #[cfg(feature = "queue")]
    pub async fn run(&self, queue: &RedisJobQueue) -> Result<()> {
        tracing::info!("Track worker started");
        loop {
            let queue_name = self.tracker.config_snapshot().queue_name;
            if let Some(job) = queue.dequeue(&queue_name, Duration::from_secs(5)).await? {
                if let Err(err) = self.perform(&job).await {
                    tracing::warn!(
                        job_id = %job.id,
                        error = %err,
                        "Track job failed, handing back to queue"
                    );
                    queue.enqueue(&queue_name, &job).await?;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AuditConfig;
    use crate::error::AuditErrorKind;
    use crate::tenants::StaticTenants;
    use crate::tracker::{AUTH_KEY_HEADER, AUTH_SECRET_HEADER};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    async fn read_request(socket: &mut tokio::net::TcpStream) {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 1024];
        loop {
            match socket.read(&mut chunk).await {
                Ok(0) | Err(_) => break,
                Ok(n) => buf.extend_from_slice(&chunk[..n]),
            }
            if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                let head = String::from_utf8_lossy(&buf[..pos]);
                let body_len = head
                    .lines()
                    .filter_map(|line| line.split_once(':'))
                    .find(|(name, _)| name.eq_ignore_ascii_case("content-length"))
                    .and_then(|(_, value)| value.trim().parse::<usize>().ok())
                    .unwrap_or(0);
                if buf.len() >= pos + 4 + body_len {
                    break;
                }
            }
        }
    }

    async fn serve_once(status_line: &'static str) -> (String, Arc<AtomicBool>) {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let hit = Arc::new(AtomicBool::new(false));
        let hit_flag = hit.clone();

        tokio::spawn(async move {
            if let Ok((mut socket, _)) = listener.accept().await {
                hit_flag.store(true, Ordering::SeqCst);
                read_request(&mut socket).await;
                let response = format!(
                    "HTTP/1.1 {}\r\ncontent-length: 0\r\nconnection: close\r\n\r\n",
                    status_line
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            }
        });

        (format!("http://{}", addr), hit)
    }

    fn worker_for(fail_silently: bool, tenants: &[&str]) -> TrackWorker {
        let config = AuditConfig {
            endpoint: Some("http://localhost:8090".to_string()),
            api_key: Some("k".to_string()),
            api_secret: Some("s".to_string()),
            fail_silently,
            ..AuditConfig::default()
        };
        let tracker = Tracker::builder()
            .config(config)
            .tenants(StaticTenants::new(tenants.iter().copied()))
            .build();
        TrackWorker::new(tracker)
    }

    fn job_for(audit_type: &str, tenant: &str, url: &str) -> TrackJob {
        let mut headers = HashMap::new();
        headers.insert("Content-Type".to_string(), "application/json".to_string());
        headers.insert(AUTH_KEY_HEADER.to_string(), "k".to_string());
        headers.insert(AUTH_SECRET_HEADER.to_string(), "s".to_string());
        TrackJob::new(audit_type, tenant, url, headers, r#"{"user":"1"}"#)
    }

    #[tokio::test]
    async fn test_perform_completes_on_success() {
        let (endpoint, hit) = serve_once("201 Created").await;
        let worker = worker_for(false, &["acme"]);
        let job = job_for("action", "acme", &format!("{}/v1/acme/action", endpoint));

        assert_eq!(worker.perform(&job).await, Ok(()));
        assert!(hit.load(Ordering::SeqCst));
    }

    // =========================================================================
    // Non-retriable kinds are swallowed at the relay boundary
    // =========================================================================

    #[tokio::test]
    async fn test_perform_swallows_missing_tenant() {
        let (endpoint, _) = serve_once("422 Unprocessable Entity").await;
        let worker = worker_for(false, &["acme"]);
        let job = job_for("action", "acme", &format!("{}/v1/acme/action", endpoint));

        // 422 maps to MissingTenant, which must not trigger a retry
        assert_eq!(worker.perform(&job).await, Ok(()));
    }

    #[tokio::test]
    async fn test_perform_swallows_unable_audit_creation() {
        let (endpoint, _) = serve_once("400 Bad Request").await;
        let worker = worker_for(false, &["acme"]);
        let job = job_for("action", "acme", &format!("{}/v1/acme/action", endpoint));

        assert_eq!(worker.perform(&job).await, Ok(()));
    }

    #[tokio::test]
    async fn test_perform_swallows_invalid_track_type() {
        let worker = worker_for(false, &["acme"]);
        let job = job_for("login", "acme", "http://localhost:8090/v1/acme/login");

        assert_eq!(worker.perform(&job).await, Ok(()));
    }

    // =========================================================================
    // Retriable kinds propagate to the queue engine
    // =========================================================================

    #[tokio::test]
    async fn test_perform_propagates_invalid_tenant() {
        // The tenant left the allowed set between enqueue and execution.
        // InvalidTenant is retriable (the set may change back), so it is
        // not swallowed like MissingTenant is.
        let worker = worker_for(false, &["acme"]);
        let job = job_for("action", "globex", "http://localhost:8090/v1/globex/action");

        let err = worker.perform(&job).await.unwrap_err();
        assert_eq!(err.kind, AuditErrorKind::InvalidTenant);
    }

    #[tokio::test]
    async fn test_perform_propagates_database_unavailability() {
        let (endpoint, _) = serve_once("503 Service Unavailable").await;
        let worker = worker_for(false, &["acme"]);
        let job = job_for("action", "acme", &format!("{}/v1/acme/action", endpoint));

        let err = worker.perform(&job).await.unwrap_err();
        assert_eq!(err.kind, AuditErrorKind::UnableDatabaseConnection);
    }

    #[tokio::test]
    async fn test_perform_propagates_connection_failure() {
        let worker = worker_for(false, &["acme"]);
        let job = job_for("action", "acme", "http://127.0.0.1:1/v1/acme/action");

        let err = worker.perform(&job).await.unwrap_err();
        assert_eq!(err.kind, AuditErrorKind::ConnectionRefused);
    }

    #[tokio::test]
    async fn test_perform_propagates_unauthorized() {
        let (endpoint, _) = serve_once("401 Unauthorized").await;
        let worker = worker_for(false, &["acme"]);
        let job = job_for("action", "acme", &format!("{}/v1/acme/action", endpoint));

        let err = worker.perform(&job).await.unwrap_err();
        assert_eq!(err.kind, AuditErrorKind::Unauthorized);
    }

    // =========================================================================
    // Silent mode
    // =========================================================================

    #[tokio::test]
    async fn test_perform_silent_mode_skips_rejected_job() {
        let (endpoint, hit) = serve_once("201 Created").await;
        let worker = worker_for(true, &["acme"]);
        let job = job_for("action", "globex", &format!("{}/v1/globex/action", endpoint));

        // request_allowed degrades to false, so the job completes with no
        // HTTP call
        assert_eq!(worker.perform(&job).await, Ok(()));
        assert!(!hit.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_perform_silent_mode_absorbs_rejection() {
        let (endpoint, _) = serve_once("503 Service Unavailable").await;
        let worker = worker_for(true, &["acme"]);
        let job = job_for("action", "acme", &format!("{}/v1/acme/action", endpoint));

        assert_eq!(worker.perform(&job).await, Ok(()));
    }
}
