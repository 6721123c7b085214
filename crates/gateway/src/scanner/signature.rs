use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use tracing::info;

use crate::config::SignatureConfig;
use crate::scanner::{FileMetadata, ScanError, ScanVerdict, Scanner, SubmissionHandle};

/// Blocks bodies that contain any of a fixed set of byte patterns.
///
/// The verdict is decided on submit and carried by the handle itself, as
/// `<id>` for a clean body or `<id>/<signature index>` for a match, so an abandoned scan
/// leaves nothing behind.
#[derive(Debug)]
pub struct SignatureScanner {
    signatures: Vec<SignatureConfig>,
    next_id: AtomicU64,
}

impl SignatureScanner {
    pub fn new(signatures: Vec<SignatureConfig>) -> Self {
        Self { signatures, next_id: AtomicU64::new(0) }
    }

    fn matching(&self, body: &[u8]) -> Option<usize> {
        self.signatures.iter().position(|signature| {
            let pattern = signature.pattern.as_bytes();
            !pattern.is_empty() && body.windows(pattern.len()).any(|window| window == pattern)
        })
    }

    fn verdict_of(&self, handle: &SubmissionHandle) -> Result<ScanVerdict, ScanError> {
        let unknown = || ScanError::backend(format!("unknown submission {}", handle.as_str()));

        let Some((id, index)) = handle.as_str().split_once('/') else {
            return handle.as_str().parse::<u64>().map(|_| ScanVerdict::NoModification).map_err(|_| unknown());
        };
        id.parse::<u64>().map_err(|_| unknown())?;

        let signature = index.parse::<usize>().ok().and_then(|index| self.signatures.get(index)).ok_or_else(unknown)?;
        Ok(ScanVerdict::Blocked(signature.name.clone()))
    }
}

#[async_trait]
impl Scanner for SignatureScanner {
    async fn submit(&self, body: Bytes, metadata: &FileMetadata) -> Result<SubmissionHandle, ScanError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let handle = match self.matching(&body) {
            Some(index) => {
                info!(file = %metadata.file_name, signature = %self.signatures[index].name, "signature matched");
                SubmissionHandle::new(format!("{id}/{index}"))
            }
            None => SubmissionHandle::new(id.to_string()),
        };
        Ok(handle)
    }

    async fn poll_status(&self, handle: &SubmissionHandle) -> Result<bool, ScanError> {
        self.verdict_of(handle).map(|_| true)
    }

    async fn fetch_verdict(&self, handle: &SubmissionHandle, _metadata: &FileMetadata) -> Result<ScanVerdict, ScanError> {
        self.verdict_of(handle)
    }
}
