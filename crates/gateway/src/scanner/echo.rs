use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use tracing::debug;

use crate::scanner::{FileMetadata, ScanError, ScanVerdict, Scanner, SubmissionHandle};

/// Accepts everything. Useful to exercise the protocol path without a real engine.
#[derive(Debug, Default)]
pub struct EchoScanner {
    submissions: AtomicU64,
}

impl EchoScanner {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Scanner for EchoScanner {
    async fn submit(&self, body: Bytes, metadata: &FileMetadata) -> Result<SubmissionHandle, ScanError> {
        let id = self.submissions.fetch_add(1, Ordering::Relaxed);
        debug!(id, file = %metadata.file_name, size = body.len(), "echo submission");
        Ok(SubmissionHandle::new(id.to_string()))
    }

    async fn poll_status(&self, _handle: &SubmissionHandle) -> Result<bool, ScanError> {
        Ok(true)
    }

    async fn fetch_verdict(&self, _handle: &SubmissionHandle, _metadata: &FileMetadata) -> Result<ScanVerdict, ScanError> {
        Ok(ScanVerdict::NoModification)
    }
}
