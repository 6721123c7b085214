//! The request processing pipeline.
//!
//! [`Gateway`] is the [`Handler`] behind every connection. For each request it resolves
//! the service, checks the method, and then either answers OPTIONS, decides on a preview,
//! or classifies, scans and renders the complete message.

use std::convert::Infallible;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use async_trait::async_trait;
use bytes::Bytes;
use http::header::{CONNECTION, CONTENT_LENGTH};
use http::{HeaderMap, HeaderName, HeaderValue, Method as HttpMethod, Request, Response, StatusCode};
use micro_icap::connection::IcapClient;
use micro_icap::handler::{Handler, Outcome};
use micro_icap::preview::advertise;
use micro_icap::protocol::headers::{ENCAPSULATED, ISTAG, METHODS, SERVICE, X_ICAP_METADATA};
use micro_icap::protocol::{
    HttpEnvelope, IcapRequest, IcapResponse, IcapStatus, Method, ResponseBuilder, clone_request, clone_response,
};
use tracing::{debug, info, warn};

use crate::block_page;
use crate::config::ServiceConfig;
use crate::dispatch::{self, ShadowJob, spawn_shadow};
use crate::encoding;
use crate::policy::{FileAction, classify, resolve_metadata};
use crate::registry::{Backend, Service, ServiceRegistry};
use crate::scanner::{FileMetadata, ScanError, ScanErrorKind, ScanLimits, ScanVerdict, run_scan};

const FILE_SIZE_EXCEEDED: &str = "file size exceeded";

/// Headers of a remote response that are replaced by the local ones when relaying.
const LOCAL_HEADERS: [HeaderName; 5] = [ENCAPSULATED, ISTAG, SERVICE, X_ICAP_METADATA, CONNECTION];

#[derive(Debug)]
pub struct Gateway {
    registry: Arc<ServiceRegistry>,
    request_ids: AtomicU64,
}

impl Gateway {
    pub fn new(registry: Arc<ServiceRegistry>) -> Self {
        Self { registry, request_ids: AtomicU64::new(0) }
    }

    #[inline]
    pub fn registry(&self) -> &ServiceRegistry {
        &self.registry
    }

    fn next_request_id(&self) -> u64 {
        self.request_ids.fetch_add(1, Ordering::Relaxed) + 1
    }
}

#[async_trait]
impl Handler for Gateway {
    type Error = Infallible;

    async fn call(&self, req: &IcapRequest) -> Result<Outcome, Self::Error> {
        let start = Instant::now();
        let request_id = self.next_request_id();
        let method = req.method();
        let path = req.header().service_path();

        let Some(service) = self.registry.resolve(path) else {
            warn!(service = path, %method, request_id, "icap service not found");
            return Ok(Outcome::Respond(IcapResponse::status_only(IcapStatus::NOT_FOUND)));
        };

        let exchange = Exchange { service: service.as_ref(), req, request_id };
        let outcome = if !service.allows(method) {
            warn!(service = service.name(), %method, request_id, "method not allowed for service");
            Outcome::Respond(exchange.respond(exchange.builder(IcapStatus::METHOD_NOT_ALLOWED)))
        } else if method == Method::Options {
            Outcome::Respond(exchange.options().await)
        } else if !req.is_complete() {
            exchange.preview()
        } else {
            Outcome::Respond(exchange.modify().await)
        };

        let elapsed_ms = start.elapsed().as_millis();
        match &outcome {
            Outcome::Respond(response) => {
                info!(service = service.name(), %method, status = response.status().as_u16(), elapsed_ms, request_id, "icap request handled");
            }
            Outcome::Continue => {
                debug!(service = service.name(), %method, elapsed_ms, request_id, "preview accepted, waiting for the rest");
            }
        }
        Ok(outcome)
    }
}

/// CONNECT requests and partial responses are never rewritten.
fn is_passthrough(envelope: &HttpEnvelope) -> bool {
    envelope.http_method() == Some(&HttpMethod::CONNECT) || envelope.http_status() == Some(StatusCode::PARTIAL_CONTENT)
}

fn exceeds_limit(config: &ServiceConfig, size: u64) -> bool {
    config.max_file_size > 0 && size > config.max_file_size
}

fn copy_headers(from: &HeaderMap, to: &mut HeaderMap) {
    for (name, value) in from.iter().filter(|(name, _)| !LOCAL_HEADERS.contains(name)) {
        to.append(name.clone(), value.clone());
    }
}

/// One request against one resolved service.
struct Exchange<'a> {
    service: &'a Service,
    req: &'a IcapRequest,
    request_id: u64,
}

impl Exchange<'_> {
    /// A response builder carrying the service headers.
    fn builder(&self, status: IcapStatus) -> ResponseBuilder {
        IcapResponse::builder(status)
            .header(ISTAG, self.service.istag().clone())
            .header(SERVICE, self.service.caption().clone())
            .header(X_ICAP_METADATA, HeaderValue::from(self.request_id))
    }

    fn respond(&self, builder: ResponseBuilder) -> IcapResponse {
        builder.build(self.req.method())
    }

    async fn options(&self) -> IcapResponse {
        if let Backend::Remote(client) = self.service.backend() {
            match client.fetch_options().await {
                Ok(remote) => {
                    let mut builder = self.builder(IcapStatus::OK);
                    copy_headers(remote.headers(), builder.headers_mut());
                    return self.respond(builder);
                }
                Err(e) => {
                    warn!(service = self.service.name(), endpoint = %client.endpoint(), cause = %e, "fetch remote options error, answer locally");
                }
            }
        }

        let config = self.service.config();
        let methods = self.service.methods().iter().map(Method::as_str).collect::<Vec<_>>().join(", ");

        let mut builder = self.builder(IcapStatus::OK);
        if let Ok(methods) = HeaderValue::from_str(&methods) {
            builder = builder.header(METHODS, methods);
        }
        advertise(builder.headers_mut(), config.preview_enabled.then_some(config.preview_bytes), &config.transfer_preview);
        self.respond(builder)
    }

    /// Decides on a preview: answer now, or ask for the rest of the body.
    fn preview(&self) -> Outcome {
        let config = self.service.config();
        let envelope = self.req.envelope();

        if is_passthrough(envelope) {
            return self.original_or_continue();
        }

        let declared = envelope.content_length().unwrap_or(self.req.body().len() as u64);
        let metadata = resolve_metadata(envelope, declared);

        match classify(config, &metadata.extension) {
            FileAction::Bypass => return self.original_or_continue(),
            FileAction::Reject => return Outcome::Respond(self.rejected(&metadata)),
            FileAction::Process => {}
        }

        if exceeds_limit(config, metadata.size) {
            return if config.return_original_if_max_file_size_exceeded {
                self.original_or_continue()
            } else {
                Outcome::Respond(self.blocked(FILE_SIZE_EXCEEDED))
            };
        }

        Outcome::Continue
    }

    /// 204 when the client allows it, otherwise the whole body is needed to echo it back.
    fn original_or_continue(&self) -> Outcome {
        if self.req.allow_204() { Outcome::Respond(self.respond(self.builder(IcapStatus::NO_CONTENT))) } else { Outcome::Continue }
    }

    async fn modify(&self) -> IcapResponse {
        let config = self.service.config();
        let envelope = self.req.envelope();

        if !self.req.header().has_body() || is_passthrough(envelope) {
            return self.no_modification();
        }

        let metadata = resolve_metadata(envelope, self.req.body().len() as u64);
        match classify(config, &metadata.extension) {
            FileAction::Bypass => return self.no_modification(),
            FileAction::Reject => return self.rejected(&metadata),
            FileAction::Process => {}
        }

        if exceeds_limit(config, metadata.size) {
            return if config.return_original_if_max_file_size_exceeded {
                self.no_modification()
            } else {
                self.blocked(FILE_SIZE_EXCEEDED)
            };
        }

        let gzip = envelope.is_gzip();
        let decoded = if gzip {
            encoding::gunzip(self.req.body())
                .inspect_err(|e| warn!(service = self.service.name(), request_id = self.request_id, cause = %e, "decode gzip body error"))
                .ok()
        } else {
            Some(self.req.body().clone())
        };

        let limits = ScanLimits::from(config);
        self.shadow(decoded.as_ref(), &metadata, limits);

        match (self.service.backend(), decoded) {
            (Backend::Remote(client), _) => self.relay(client).await,
            (Backend::Local(scanner), Some(body)) => {
                let verdict = run_scan(scanner.as_ref(), body, &metadata, &limits).await;
                debug!(service = self.service.name(), request_id = self.request_id, file = %metadata.file_name, %verdict, "scan finished");
                self.render(verdict, gzip)
            }
            (Backend::Local(_), None) => self.fallback(ScanErrorKind::Backend),
        }
    }

    /// Local shadows scan the decoded body, remote shadows get the message as received.
    fn shadow(&self, decoded: Option<&Bytes>, metadata: &FileMetadata, limits: ScanLimits) {
        let Some(backend) = self.service.shadow() else {
            return;
        };

        let body = match backend {
            Backend::Local(_) => match decoded {
                Some(body) => body.clone(),
                None => return,
            },
            Backend::Remote(_) => self.req.body().clone(),
        };

        let job = ShadowJob::new(self.req, body, metadata.clone());
        spawn_shadow(backend.clone(), job, limits, Arc::from(self.service.name()), self.request_id);
    }

    async fn relay(&self, client: &IcapClient) -> IcapResponse {
        match dispatch::forward(client, self.req, Some(self.req.body().clone())).await {
            Ok(remote) => match remote.status() {
                IcapStatus::NO_CONTENT => self.no_modification(),
                IcapStatus::OK => {
                    let (head, body) = remote.into_parts();
                    let mut builder = self.builder(IcapStatus::OK).envelope(head.envelope().clone());
                    copy_headers(head.headers(), builder.headers_mut());
                    if let Some(body) = body {
                        builder = builder.body(body);
                    }
                    self.respond(builder)
                }
                status => {
                    warn!(service = self.service.name(), request_id = self.request_id, %status, "remote icap service failed");
                    self.fallback(ScanErrorKind::Backend)
                }
            },
            Err(e) => {
                warn!(service = self.service.name(), request_id = self.request_id, cause = %e, "forward to remote icap service error");
                self.fallback(ScanError::from(e).kind())
            }
        }
    }

    fn render(&self, verdict: ScanVerdict, gzip: bool) -> IcapResponse {
        match verdict {
            ScanVerdict::NoModification => self.no_modification(),
            ScanVerdict::Modified(body) => self.modified(body, gzip),
            ScanVerdict::Blocked(reason) => self.blocked(&reason),
            ScanVerdict::Error(kind) => self.fallback(kind),
        }
    }

    /// The adapted HTTP message only: the request for REQMOD, the response for RESPMOD.
    fn original_envelope(&self) -> HttpEnvelope {
        let envelope = self.req.envelope();
        match self.req.method() {
            Method::Reqmod => HttpEnvelope::new(envelope.request.as_ref().map(clone_request), None),
            _ => HttpEnvelope::new(None, envelope.response.as_ref().map(clone_response)),
        }
    }

    fn no_modification(&self) -> IcapResponse {
        if self.req.allow_204() {
            return self.respond(self.builder(IcapStatus::NO_CONTENT));
        }

        let mut builder = self.builder(IcapStatus::OK).envelope(self.original_envelope());
        if self.req.header().has_body() {
            builder = builder.body(self.req.body().clone());
        }
        self.respond(builder)
    }

    fn modified(&self, body: Bytes, gzip: bool) -> IcapResponse {
        let body = if gzip {
            match encoding::gzip(&body) {
                Ok(body) => body,
                Err(e) => {
                    warn!(service = self.service.name(), request_id = self.request_id, cause = %e, "encode gzip body error");
                    return self.fallback(ScanErrorKind::Backend);
                }
            }
        } else {
            body
        };

        let mut envelope = self.original_envelope();
        let headers = match self.req.method() {
            Method::Reqmod => envelope.request.as_mut().map(Request::headers_mut),
            _ => envelope.response.as_mut().map(Response::headers_mut),
        };
        if let Some(headers) = headers {
            headers.insert(CONTENT_LENGTH, HeaderValue::from(body.len()));
        }

        self.respond(self.builder(IcapStatus::OK).envelope(envelope).body(body))
    }

    fn blocked(&self, reason: &str) -> IcapResponse {
        let config = self.service.config();
        info!(service = self.service.name(), request_id = self.request_id, reason, "content blocked");

        let page = config.block_http_body.then(|| block_page::render(reason, config.caption(), &self.request_id.to_string()));
        let mut builder = self.builder(IcapStatus::OK).http_response(block_page::response_head(config, page.as_ref().map(Bytes::len)));
        if let Some(page) = page {
            builder = builder.body(page);
        }
        self.respond(builder)
    }

    fn rejected(&self, metadata: &FileMetadata) -> IcapResponse {
        info!(service = self.service.name(), request_id = self.request_id, extension = %metadata.extension, "file extension rejected");
        if self.service.config().return_400_if_file_ext_rejected {
            self.respond(self.builder(IcapStatus::BAD_REQUEST))
        } else {
            self.blocked(&format!("file extension '{}' is not allowed", metadata.extension))
        }
    }

    /// Fail open passes the original through; fail closed answers 408 or 500.
    fn fallback(&self, kind: ScanErrorKind) -> IcapResponse {
        if self.service.config().fail_open {
            return self.no_modification();
        }

        let status = match kind {
            ScanErrorKind::Timeout => IcapStatus::REQUEST_TIMEOUT,
            ScanErrorKind::Backend => IcapStatus::INTERNAL_SERVER_ERROR,
        };
        self.respond(self.builder(status))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scanner::{MockScanner, SubmissionHandle};
    use http::header::{ALLOW, CONTENT_DISPOSITION, CONTENT_ENCODING, CONTENT_TYPE};
    use http::Uri;
    use micro_icap::protocol::headers::{PREVIEW, TRANSFER_PREVIEW};
    use micro_icap::protocol::{ALLOW_204_VALUE, RequestHeader};
    use serde_json::json;
    use std::time::Duration;
    use tokio::sync::mpsc;

    const BODY: &[u8] = b"This is data that was returned by an origin server.";

    fn gateway(config: serde_json::Value, scanner: MockScanner) -> Gateway {
        let config: ServiceConfig = serde_json::from_value(config).unwrap();
        let mut registry = ServiceRegistry::new();
        registry.insert(Service::new(config, Backend::Local(Arc::new(scanner)), None).unwrap()).unwrap();
        Gateway::new(Arc::new(registry))
    }

    fn shadowed(primary: MockScanner, shadow: MockScanner) -> Gateway {
        let config: ServiceConfig = serde_json::from_value(av()).unwrap();
        let service = Service::new(config, Backend::Local(Arc::new(primary)), Some(Backend::Local(Arc::new(shadow)))).unwrap();
        let mut registry = ServiceRegistry::new();
        registry.insert(service).unwrap();
        Gateway::new(Arc::new(registry))
    }

    fn av() -> serde_json::Value {
        json!({ "name": "av", "caption": "AV Scanner", "req_mode": true, "resp_mode": true })
    }

    fn with(mut config: serde_json::Value, extra: serde_json::Value) -> serde_json::Value {
        for (key, value) in extra.as_object().unwrap() {
            config[key] = value.clone();
        }
        config
    }

    fn scanner_with(verdict: ScanVerdict) -> MockScanner {
        let mut scanner = MockScanner::new();
        scanner.expect_submit().times(1).returning(|_, _| Ok(SubmissionHandle::new("1")));
        scanner.expect_poll_status().returning(|_| Ok(true));
        scanner.expect_fetch_verdict().times(1).returning(move |_, _| Ok(verdict.clone()));
        scanner
    }

    fn untouched() -> MockScanner {
        let mut scanner = MockScanner::new();
        scanner.expect_submit().never();
        scanner
    }

    fn http_response() -> Response<()> {
        Response::builder().header(CONTENT_TYPE, "text/plain").header(CONTENT_LENGTH, BODY.len()).body(()).unwrap()
    }

    fn icap_request(method: Method, path: &str, envelope: HttpEnvelope, body: Option<Bytes>, allow_204: bool, complete: bool) -> IcapRequest {
        let mut headers = HeaderMap::new();
        if allow_204 {
            headers.insert(ALLOW, ALLOW_204_VALUE);
        }
        let uri: Uri = format!("icap://icap.example.net{path}").parse().unwrap();
        let header = RequestHeader::new(method, uri, headers, envelope, body.is_some());
        IcapRequest::new(header, body.unwrap_or_default(), complete)
    }

    fn respmod_with(response: Response<()>, body: Bytes, allow_204: bool, complete: bool) -> IcapRequest {
        let request = Request::builder().uri("http://www.origin-server.com/files/report.pdf").body(()).unwrap();
        icap_request(Method::Respmod, "/av", HttpEnvelope::response(Some(request), response), Some(body), allow_204, complete)
    }

    fn respmod(allow_204: bool) -> IcapRequest {
        respmod_with(http_response(), Bytes::from_static(BODY), allow_204, true)
    }

    async fn respond(gateway: &Gateway, req: &IcapRequest) -> IcapResponse {
        match gateway.call(req).await.unwrap() {
            Outcome::Respond(response) => response,
            Outcome::Continue => panic!("expected a response"),
        }
    }

    fn embedded_status(response: &IcapResponse) -> StatusCode {
        response.envelope().http_status().unwrap()
    }

    #[tokio::test]
    async fn test_unknown_service() {
        let gateway = gateway(av(), untouched());
        let req = icap_request(Method::Options, "/missing", HttpEnvelope::default(), None, false, true);

        let response = respond(&gateway, &req).await;
        assert_eq!(response.status(), IcapStatus::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_method_not_allowed() {
        let gateway = gateway(json!({ "name": "av", "resp_mode": true }), untouched());
        let request = Request::builder().method("POST").uri("/upload").body(()).unwrap();
        let req = icap_request(Method::Reqmod, "/av", HttpEnvelope::request(request), Some(Bytes::from_static(BODY)), true, true);

        let response = respond(&gateway, &req).await;
        assert_eq!(response.status(), IcapStatus::METHOD_NOT_ALLOWED);
        assert!(response.headers().contains_key(ISTAG));
        assert_eq!(response.headers()[SERVICE], "av");
    }

    #[tokio::test]
    async fn test_options() {
        let gateway = gateway(with(av(), json!({ "preview_bytes": 4096 })), untouched());
        let req = icap_request(Method::Options, "/av", HttpEnvelope::default(), None, false, true);

        let response = respond(&gateway, &req).await;
        let headers = response.headers();
        assert_eq!(response.status(), IcapStatus::OK);
        assert_eq!(headers[METHODS], "REQMOD, RESPMOD");
        assert_eq!(headers[PREVIEW], "4096");
        assert_eq!(headers[ALLOW], "204");
        assert_eq!(headers[TRANSFER_PREVIEW], "*");
        assert_eq!(headers[SERVICE], "AV Scanner");
        assert_eq!(&headers[ISTAG], gateway.registry().resolve("/av").unwrap().istag());
        assert!(headers.contains_key(X_ICAP_METADATA));
        assert_eq!(response.head().encapsulated().to_string(), "null-body=0");
    }

    #[tokio::test]
    async fn test_options_without_preview() {
        let gateway = gateway(with(av(), json!({ "preview_enabled": false })), untouched());
        let req = icap_request(Method::Options, "/av", HttpEnvelope::default(), None, false, true);

        let response = respond(&gateway, &req).await;
        assert!(!response.headers().contains_key(PREVIEW));
        assert_eq!(response.headers()[ALLOW], "204");
    }

    #[tokio::test]
    async fn test_request_ids_differ() {
        let gateway = gateway(av(), untouched());
        let req = icap_request(Method::Options, "/av", HttpEnvelope::default(), None, false, true);

        let first = respond(&gateway, &req).await;
        let second = respond(&gateway, &req).await;
        assert_ne!(first.headers()[X_ICAP_METADATA], second.headers()[X_ICAP_METADATA]);
    }

    #[tokio::test]
    async fn test_clean_with_204() {
        let gateway = gateway(av(), scanner_with(ScanVerdict::NoModification));
        let response = respond(&gateway, &respmod(true)).await;

        assert_eq!(response.status(), IcapStatus::NO_CONTENT);
        assert!(response.body().is_none());
        assert!(response.envelope().is_empty());
    }

    #[tokio::test]
    async fn test_clean_without_204_echoes_original() {
        let gateway = gateway(av(), scanner_with(ScanVerdict::NoModification));
        let response = respond(&gateway, &respmod(false)).await;

        assert_eq!(response.status(), IcapStatus::OK);
        assert_eq!(&response.body().unwrap()[..], BODY);
        assert!(response.envelope().request.is_none());
        assert_eq!(embedded_status(&response), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_blocking_shadow_does_not_change_response() {
        let (done, mut finished) = mpsc::unbounded_channel();
        let mut shadow = MockScanner::new();
        shadow.expect_submit().times(1).returning(|body, _| {
            assert_eq!(&body[..], BODY);
            Ok(SubmissionHandle::new("shadow-1"))
        });
        shadow.expect_poll_status().returning(|_| Ok(true));
        shadow.expect_fetch_verdict().times(1).returning(move |_, _| {
            let _ = done.send(());
            Ok(ScanVerdict::Blocked("eicar".to_string()))
        });

        let gateway = shadowed(scanner_with(ScanVerdict::NoModification), shadow);
        let response = respond(&gateway, &respmod(true)).await;
        assert_eq!(response.status(), IcapStatus::NO_CONTENT);

        tokio::time::timeout(Duration::from_secs(5), finished.recv()).await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_failing_shadow_is_swallowed() {
        let (done, mut finished) = mpsc::unbounded_channel();
        let mut shadow = MockScanner::new();
        shadow.expect_submit().times(1).returning(move |_, _| {
            let _ = done.send(());
            Err(ScanError::backend("shadow engine down"))
        });
        shadow.expect_poll_status().never();
        shadow.expect_fetch_verdict().never();

        let gateway = shadowed(scanner_with(ScanVerdict::NoModification), shadow);
        let response = respond(&gateway, &respmod(false)).await;
        assert_eq!(response.status(), IcapStatus::OK);
        assert_eq!(&response.body().unwrap()[..], BODY);

        tokio::time::timeout(Duration::from_secs(5), finished.recv()).await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_bypass_never_scans() {
        let config = with(av(), json!({ "process_extensions": ["exe"], "bypass_extensions": ["*"] }));

        let response = respond(&gateway(config.clone(), untouched()), &respmod(true)).await;
        assert_eq!(response.status(), IcapStatus::NO_CONTENT);

        let response = respond(&gateway(config, untouched()), &respmod(false)).await;
        assert_eq!(response.status(), IcapStatus::OK);
        assert_eq!(&response.body().unwrap()[..], BODY);
    }

    #[tokio::test]
    async fn test_fail_open_timeout_equals_no_modification() {
        let mut scanner = MockScanner::new();
        scanner.expect_submit().returning(|_, _| Ok(SubmissionHandle::new("1")));
        scanner.expect_poll_status().returning(|_| Ok(false));
        scanner.expect_fetch_verdict().never();
        let config = with(av(), json!({ "fail_open": true, "scan_timeout_ms": 30, "status_check_interval_ms": 5 }));
        let timed_out = respond(&gateway(config, scanner), &respmod(false)).await;

        let clean = respond(&gateway(av(), scanner_with(ScanVerdict::NoModification)), &respmod(false)).await;

        assert_eq!(timed_out.status(), clean.status());
        assert_eq!(timed_out.body(), clean.body());
        assert_eq!(timed_out.head().encapsulated(), clean.head().encapsulated());
    }

    #[tokio::test]
    async fn test_fail_closed() {
        let mut scanner = MockScanner::new();
        scanner.expect_submit().returning(|_, _| Ok(SubmissionHandle::new("1")));
        scanner.expect_poll_status().returning(|_| Ok(false));
        let config = with(av(), json!({ "scan_timeout_ms": 30, "status_check_interval_ms": 5 }));
        let response = respond(&gateway(config, scanner), &respmod(true)).await;
        assert_eq!(response.status(), IcapStatus::REQUEST_TIMEOUT);

        let response = respond(&gateway(av(), scanner_with(ScanVerdict::Error(ScanErrorKind::Backend))), &respmod(true)).await;
        assert_eq!(response.status(), IcapStatus::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_modified_updates_content_length() {
        let gateway = gateway(av(), scanner_with(ScanVerdict::Modified(Bytes::from_static(b"cleaned"))));
        let response = respond(&gateway, &respmod(true)).await;

        assert_eq!(response.status(), IcapStatus::OK);
        assert_eq!(&response.body().unwrap()[..], b"cleaned");
        let http_response = response.envelope().response.as_ref().unwrap();
        assert_eq!(http_response.headers()[CONTENT_LENGTH], "7");
        assert_eq!(http_response.headers()[CONTENT_TYPE], "text/plain");
    }

    #[tokio::test]
    async fn test_blocked_page() {
        let gateway = gateway(av(), scanner_with(ScanVerdict::Blocked("Eicar-Test-Signature".to_string())));
        let response = respond(&gateway, &respmod(true)).await;

        assert_eq!(response.status(), IcapStatus::OK);
        assert_eq!(embedded_status(&response), StatusCode::FORBIDDEN);
        let page = std::str::from_utf8(response.body().unwrap()).unwrap();
        assert!(page.contains("Eicar-Test-Signature"));
        assert!(page.contains("AV Scanner"));
    }

    #[tokio::test]
    async fn test_blocked_without_body() {
        let config = with(av(), json!({ "block_http_body": false, "block_http_response_code": 451 }));
        let gateway = gateway(config, scanner_with(ScanVerdict::Blocked("policy".to_string())));
        let response = respond(&gateway, &respmod(true)).await;

        assert_eq!(embedded_status(&response), StatusCode::UNAVAILABLE_FOR_LEGAL_REASONS);
        assert!(response.body().is_none());
        assert_eq!(response.head().encapsulated().to_string(), "res-hdr=0, null-body=90");
    }

    #[tokio::test]
    async fn test_rejected_extension() {
        let config = with(av(), json!({ "reject_extensions": ["pdf"] }));
        let response = respond(&gateway(config.clone(), untouched()), &respmod(true)).await;
        assert_eq!(response.status(), IcapStatus::OK);
        assert_eq!(embedded_status(&response), StatusCode::FORBIDDEN);

        let config = with(config, json!({ "return_400_if_file_ext_rejected": true }));
        let response = respond(&gateway(config, untouched()), &respmod(true)).await;
        assert_eq!(response.status(), IcapStatus::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_file_size_exceeded() {
        let config = with(av(), json!({ "max_file_size": 10 }));
        let response = respond(&gateway(config.clone(), untouched()), &respmod(true)).await;
        assert_eq!(embedded_status(&response), StatusCode::FORBIDDEN);
        assert!(std::str::from_utf8(response.body().unwrap()).unwrap().contains(FILE_SIZE_EXCEEDED));

        let config = with(config, json!({ "return_original_if_max_file_size_exceeded": true }));
        let response = respond(&gateway(config, untouched()), &respmod(true)).await;
        assert_eq!(response.status(), IcapStatus::NO_CONTENT);
    }

    #[tokio::test]
    async fn test_gzip_symmetry() {
        let mut scanner = MockScanner::new();
        scanner.expect_submit().times(1).returning(|body, metadata| {
            assert_eq!(&body[..], BODY);
            assert_eq!(metadata.file_name, "report.pdf");
            Ok(SubmissionHandle::new("1"))
        });
        scanner.expect_poll_status().returning(|_| Ok(true));
        scanner.expect_fetch_verdict().returning(|_, _| Ok(ScanVerdict::Modified(Bytes::from_static(b"replacement text"))));

        let response = Response::builder().header(CONTENT_ENCODING, "gzip").body(()).unwrap();
        let req = respmod_with(response, encoding::gzip(BODY).unwrap(), true, true);
        let response = respond(&gateway(av(), scanner), &req).await;

        let body = response.body().unwrap();
        assert_eq!(&encoding::gunzip(body).unwrap()[..], b"replacement text");
        let http_response = response.envelope().response.as_ref().unwrap();
        assert_eq!(http_response.headers()[CONTENT_ENCODING], "gzip");
        assert_eq!(http_response.headers()[CONTENT_LENGTH], body.len().to_string().as_str());
    }

    #[tokio::test]
    async fn test_broken_gzip_follows_failure_policy() {
        let response = Response::builder().header(CONTENT_ENCODING, "gzip").body(()).unwrap();
        let req = respmod_with(response, Bytes::from_static(b"not gzip at all"), true, true);

        let response = respond(&gateway(av(), untouched()), &req).await;
        assert_eq!(response.status(), IcapStatus::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_connect_passthrough() {
        let request = Request::builder().method("CONNECT").uri("www.origin-server.com:443").body(()).unwrap();
        let req = icap_request(Method::Reqmod, "/av", HttpEnvelope::request(request), None, false, true);

        let response = respond(&gateway(av(), untouched()), &req).await;
        assert_eq!(response.status(), IcapStatus::OK);
        assert_eq!(response.envelope().http_method(), Some(&HttpMethod::CONNECT));
        assert!(response.body().is_none());
    }

    #[tokio::test]
    async fn test_partial_content_passthrough() {
        let response = Response::builder().status(206).header(CONTENT_TYPE, "application/pdf").body(()).unwrap();
        let req = respmod_with(response, Bytes::from_static(BODY), true, true);

        let response = respond(&gateway(av(), untouched()), &req).await;
        assert_eq!(response.status(), IcapStatus::NO_CONTENT);
    }

    #[tokio::test]
    async fn test_null_body_is_not_scanned() {
        let request = Request::builder().uri("http://www.origin-server.com/").body(()).unwrap();
        let req = icap_request(Method::Reqmod, "/av", HttpEnvelope::request(request), None, false, true);

        let response = respond(&gateway(av(), untouched()), &req).await;
        assert_eq!(response.status(), IcapStatus::OK);
        assert_eq!(response.head().encapsulated().to_string(), "req-hdr=0, null-body=46");
    }

    #[tokio::test]
    async fn test_reqmod_name_from_disposition() {
        let mut scanner = MockScanner::new();
        scanner.expect_submit().returning(|_, metadata| {
            assert_eq!(metadata.file_name, "setup.exe");
            assert_eq!(metadata.extension, "exe");
            Ok(SubmissionHandle::new("1"))
        });
        scanner.expect_poll_status().returning(|_| Ok(true));
        scanner.expect_fetch_verdict().returning(|_, _| Ok(ScanVerdict::NoModification));

        let request = Request::builder()
            .method("POST")
            .uri("/upload")
            .header(CONTENT_DISPOSITION, "form-data; name=\"file\"; filename=\"setup.exe\"")
            .body(())
            .unwrap();
        let req = icap_request(Method::Reqmod, "/av", HttpEnvelope::request(request), Some(Bytes::from_static(BODY)), true, true);

        let response = respond(&gateway(av(), scanner), &req).await;
        assert_eq!(response.status(), IcapStatus::NO_CONTENT);
    }

    #[tokio::test]
    async fn test_preview_decisions() {
        let preview = |allow_204| respmod_with(http_response(), Bytes::from_static(&BODY[..10]), allow_204, false);

        let outcome = gateway(av(), untouched()).call(&preview(true)).await.unwrap();
        assert!(matches!(outcome, Outcome::Continue));

        let config = with(av(), json!({ "process_extensions": ["exe"], "bypass_extensions": ["*"] }));
        let outcome = gateway(config.clone(), untouched()).call(&preview(true)).await.unwrap();
        assert!(matches!(outcome, Outcome::Respond(ref response) if response.status() == IcapStatus::NO_CONTENT));

        let outcome = gateway(config, untouched()).call(&preview(false)).await.unwrap();
        assert!(matches!(outcome, Outcome::Continue));

        let config = with(av(), json!({ "reject_extensions": ["pdf"] }));
        let outcome = gateway(config, untouched()).call(&preview(false)).await.unwrap();
        assert!(matches!(outcome, Outcome::Respond(ref response) if embedded_status(response) == StatusCode::FORBIDDEN));
    }

    #[tokio::test]
    async fn test_preview_uses_declared_length() {
        let config = with(av(), json!({ "max_file_size": 20 }));
        let req = respmod_with(http_response(), Bytes::from_static(&BODY[..10]), true, false);

        let outcome = gateway(config, untouched()).call(&req).await.unwrap();
        assert!(matches!(outcome, Outcome::Respond(ref response) if embedded_status(response) == StatusCode::FORBIDDEN));
    }
}
