//! Forwarding to remote ICAP services, and shadow scans.
//!
//! A shadow scan sees the same body as the primary backend but runs on its own task.
//! Its verdict is only logged and never changes the response.

use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use http::HeaderMap;
use http::header::{ALLOW, CONNECTION, HOST};
use micro_icap::connection::{ClientError, IcapClient};
use micro_icap::protocol::headers::{ENCAPSULATED, PREVIEW};
use micro_icap::protocol::{HttpEnvelope, IcapRequest, IcapResponse, Method};
use tracing::{info, warn};

use crate::registry::Backend;
use crate::scanner::{FileMetadata, ScanLimits, run_scan};

/// ICAP headers that describe one hop and are not passed on.
const HOP_HEADERS: [http::HeaderName; 5] = [HOST, ENCAPSULATED, PREVIEW, ALLOW, CONNECTION];

fn forwarded_headers(headers: &HeaderMap) -> HeaderMap {
    let mut forwarded = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers.iter().filter(|(name, _)| !HOP_HEADERS.contains(name)) {
        forwarded.append(name.clone(), value.clone());
    }
    forwarded
}

/// Sends `req`, with the body given, to the remote service and returns its final answer.
pub async fn forward(client: &IcapClient, req: &IcapRequest, body: Option<Bytes>) -> Result<IcapResponse, ClientError> {
    client.send(req.method(), forwarded_headers(req.header().headers()), req.envelope().clone(), body).await
}

/// A copy of everything a shadow scan needs, detached from the connection.
#[derive(Debug)]
pub struct ShadowJob {
    pub method: Method,
    pub headers: HeaderMap,
    pub envelope: HttpEnvelope,
    pub body: Bytes,
    pub metadata: FileMetadata,
}

impl ShadowJob {
    pub fn new(req: &IcapRequest, body: Bytes, metadata: FileMetadata) -> Self {
        Self {
            method: req.method(),
            headers: forwarded_headers(req.header().headers()),
            envelope: req.envelope().clone(),
            body,
            metadata,
        }
    }
}

/// Runs `job` against `backend` in the background.
pub fn spawn_shadow(backend: Backend, job: ShadowJob, limits: ScanLimits, service: Arc<str>, request_id: u64) {
    tokio::spawn(async move {
        let start = Instant::now();
        let outcome = match backend {
            Backend::Local(scanner) => run_scan(scanner.as_ref(), job.body, &job.metadata, &limits).await.to_string(),
            Backend::Remote(client) => match client.send(job.method, job.headers, job.envelope, Some(job.body)).await {
                Ok(response) => response.status().to_string(),
                Err(e) => {
                    warn!(target: "shadow", %service, request_id, cause = %e, "shadow forward failed");
                    return;
                }
            },
        };

        info!(
            target: "shadow",
            %service,
            request_id,
            file = %job.metadata.file_name,
            outcome = %outcome,
            elapsed_ms = start.elapsed().as_millis(),
            "shadow scan finished"
        );
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;
    use micro_icap::protocol::headers::X_ICAP_METADATA;

    #[test]
    fn test_hop_headers_are_dropped() {
        let mut headers = HeaderMap::new();
        headers.insert(HOST, HeaderValue::from_static("icap.example.net"));
        headers.insert(ENCAPSULATED, HeaderValue::from_static("req-hdr=0, null-body=10"));
        headers.insert(PREVIEW, HeaderValue::from_static("1024"));
        headers.insert(ALLOW, HeaderValue::from_static("204"));
        headers.insert(X_ICAP_METADATA, HeaderValue::from_static("client=1"));
        headers.append("x-client-ip", HeaderValue::from_static("10.0.0.1"));

        let forwarded = forwarded_headers(&headers);
        assert_eq!(forwarded.len(), 2);
        assert_eq!(forwarded[X_ICAP_METADATA], "client=1");
        assert_eq!(forwarded["x-client-ip"], "10.0.0.1");
    }
}
