//! The Scanner capability and the bounded scan driver.
//!
//! A scanner works in three steps: [`submit`](Scanner::submit) a body, poll until it
//! reports completion, then [`fetch_verdict`](Scanner::fetch_verdict). The pipeline only
//! talks to `dyn Scanner`; [`run_scan`] adds the deadlines around the three calls.

mod echo;
mod signature;

pub use echo::EchoScanner;
pub use signature::SignatureScanner;

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use micro_icap::protocol::ClientError;
use thiserror::Error;
use tokio::time::MissedTickBehavior;
use tracing::warn;

use crate::config::ServiceConfig;

/// What is known about the file carried by an HTTP message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileMetadata {
    pub file_name: String,
    /// Lowercase, without the leading dot
    pub extension: String,
    pub content_type: Option<String>,
    pub size: u64,
}

/// Identifies a submitted body within the scanner that accepted it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubmissionHandle(String);

impl SubmissionHandle {
    pub fn new<S: Into<String>>(id: S) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ScanErrorKind {
    Timeout,
    Backend,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanVerdict {
    NoModification,
    /// The body to deliver instead of the original.
    Modified(Bytes),
    Blocked(String),
    Error(ScanErrorKind),
}

impl fmt::Display for ScanVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScanVerdict::NoModification => f.write_str("no_modification"),
            ScanVerdict::Modified(body) => write!(f, "modified({} bytes)", body.len()),
            ScanVerdict::Blocked(reason) => write!(f, "blocked({reason})"),
            ScanVerdict::Error(ScanErrorKind::Timeout) => f.write_str("error(timeout)"),
            ScanVerdict::Error(ScanErrorKind::Backend) => f.write_str("error(backend)"),
        }
    }
}

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("scan timed out")]
    Timeout,

    #[error("scan backend error: {reason}")]
    Backend { reason: String },
}

impl ScanError {
    pub fn backend<S: ToString>(str: S) -> Self {
        Self::Backend { reason: str.to_string() }
    }

    pub fn kind(&self) -> ScanErrorKind {
        match self {
            ScanError::Timeout => ScanErrorKind::Timeout,
            ScanError::Backend { .. } => ScanErrorKind::Backend,
        }
    }
}

impl From<ClientError> for ScanError {
    fn from(e: ClientError) -> Self {
        if e.is_timeout() { ScanError::Timeout } else { ScanError::backend(e) }
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Scanner: Send + Sync {
    async fn submit(&self, body: Bytes, metadata: &FileMetadata) -> Result<SubmissionHandle, ScanError>;

    /// True once the submission has finished.
    async fn poll_status(&self, handle: &SubmissionHandle) -> Result<bool, ScanError>;

    async fn fetch_verdict(&self, handle: &SubmissionHandle, metadata: &FileMetadata) -> Result<ScanVerdict, ScanError>;
}

/// Deadlines of one scan.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ScanLimits {
    /// Bounds the whole submit, poll and fetch sequence
    pub scan_timeout: Duration,
    /// Bounds the polling alone
    pub status_check_timeout: Duration,
    pub status_check_interval: Duration,
}

impl From<&ServiceConfig> for ScanLimits {
    fn from(config: &ServiceConfig) -> Self {
        Self {
            scan_timeout: config.scan_timeout(),
            status_check_timeout: config.status_check_timeout(),
            status_check_interval: config.status_check_interval(),
        }
    }
}

/// Runs a scan to its verdict. Failures and expired deadlines become [`ScanVerdict::Error`].
pub async fn run_scan(scanner: &dyn Scanner, body: Bytes, metadata: &FileMetadata, limits: &ScanLimits) -> ScanVerdict {
    let result = tokio::time::timeout(limits.scan_timeout, drive(scanner, body, metadata, limits))
        .await
        .unwrap_or(Err(ScanError::Timeout));

    match result {
        Ok(verdict) => verdict,
        Err(e) => {
            warn!(file = %metadata.file_name, cause = %e, "scan failed");
            ScanVerdict::Error(e.kind())
        }
    }
}

async fn drive(scanner: &dyn Scanner, body: Bytes, metadata: &FileMetadata, limits: &ScanLimits) -> Result<ScanVerdict, ScanError> {
    let handle = scanner.submit(body, metadata).await?;
    wait_until_finished(scanner, &handle, limits).await?;
    scanner.fetch_verdict(&handle, metadata).await
}

async fn wait_until_finished(scanner: &dyn Scanner, handle: &SubmissionHandle, limits: &ScanLimits) -> Result<(), ScanError> {
    let mut interval = tokio::time::interval(limits.status_check_interval);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let polling = async {
        loop {
            // the first tick completes immediately
            interval.tick().await;
            if scanner.poll_status(handle).await? {
                return Ok::<(), ScanError>(());
            }
        }
    };

    tokio::time::timeout(limits.status_check_timeout, polling).await.unwrap_or(Err(ScanError::Timeout))
}
