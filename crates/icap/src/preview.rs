//! Preview negotiation (RFC 3507 §4.5).
//!
//! Both ends of the exchange live here:
//!
//! - [`PreviewState`] drives an outgoing preview: it truncates the body, then reacts to
//!   the server's answer by releasing the withheld remainder after `100 Continue`.
//! - [`PreviewBudget`] accounts for an incoming preview and detects clients that send
//!   more or fewer bytes than they announced.
//! - [`advertise`] and [`ServiceOptions`] carry the negotiated parameters over OPTIONS.

use bytes::Bytes;
use http::header::ALLOW;
use http::{HeaderMap, HeaderValue};

use crate::ensure;
use crate::protocol::headers::{ISTAG, METHODS, PREVIEW, TRANSFER_PREVIEW};
use crate::protocol::{ALLOW_204_VALUE, IcapError, IcapResponse, IcapStatus, Method};

/// Where an outgoing preview exchange stands.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PreviewStage {
    Unstarted,
    PreviewSent,
    /// The server answered with a final status, or the continuation has been sent.
    Completed,
    /// The server asked for the rest of the body with `100 Continue`.
    AwaitingContinuation,
}

/// Client side preview state for one request.
#[derive(Debug, Clone)]
pub struct PreviewState {
    negotiated_size: usize,
    bytes_sent: usize,
    body_fitted_in_preview: bool,
    remaining_bytes: Bytes,
    stage: PreviewStage,
}

impl PreviewState {
    /// A preview of at most `negotiated_size` bytes, as announced by the server's OPTIONS.
    pub fn new(negotiated_size: usize) -> Self {
        Self {
            negotiated_size,
            bytes_sent: 0,
            body_fitted_in_preview: false,
            remaining_bytes: Bytes::new(),
            stage: PreviewStage::Unstarted,
        }
    }

    /// Splits `body` into the preview to send now and the remainder to withhold.
    ///
    /// A body no longer than the negotiated size is sent whole; the request then ends
    /// its body with `ieof` and no continuation can follow.
    pub fn take_preview(&mut self, mut body: Bytes) -> Bytes {
        let preview = if body.len() <= self.negotiated_size {
            self.body_fitted_in_preview = true;
            body
        } else {
            self.remaining_bytes = body.split_off(self.negotiated_size);
            body
        };

        self.bytes_sent = preview.len();
        self.stage = PreviewStage::PreviewSent;
        preview
    }

    /// Reacts to the server's answer to the preview.
    ///
    /// Returns the bytes to send as continuation after `100 Continue`. Any other
    /// status ends the exchange and drops the remainder.
    pub fn on_response(&mut self, status: IcapStatus) -> Result<Option<Bytes>, IcapError> {
        ensure!(self.stage == PreviewStage::PreviewSent, IcapError::preview_violation("no preview is outstanding"));

        if status != IcapStatus::CONTINUE {
            self.stage = PreviewStage::Completed;
            self.remaining_bytes = Bytes::new();
            return Ok(None);
        }

        ensure!(!self.body_fitted_in_preview, IcapError::preview_violation("100 Continue after a complete preview"));
        self.stage = PreviewStage::AwaitingContinuation;
        Ok(Some(std::mem::take(&mut self.remaining_bytes)))
    }

    pub fn continuation_sent(&mut self) {
        self.stage = PreviewStage::Completed;
    }

    #[inline]
    pub fn negotiated_size(&self) -> usize {
        self.negotiated_size
    }

    /// The preview size to announce in the request's `Preview` header.
    #[inline]
    pub fn bytes_sent(&self) -> usize {
        self.bytes_sent
    }

    #[inline]
    pub fn body_fitted_in_preview(&self) -> bool {
        self.body_fitted_in_preview
    }

    #[inline]
    pub fn remaining_bytes(&self) -> &Bytes {
        &self.remaining_bytes
    }

    #[inline]
    pub fn stage(&self) -> PreviewStage {
        self.stage
    }
}

/// Server side accounting of the preview bytes a client promised in its `Preview` header.
#[derive(Debug, Copy, Clone)]
pub struct PreviewBudget {
    promised: usize,
    received: usize,
}

impl PreviewBudget {
    pub fn new(promised: usize) -> Self {
        Self { promised, received: 0 }
    }

    pub fn record(&mut self, len: usize) -> Result<(), IcapError> {
        self.received += len;
        ensure!(
            self.received <= self.promised,
            IcapError::preview_violation(format!("received {} preview bytes, {} announced", self.received, self.promised))
        );
        Ok(())
    }

    /// Checks the end of the preview. Without `ieof` the full announced size must have arrived.
    pub fn finish(&self, ieof: bool) -> Result<(), IcapError> {
        ensure!(
            ieof || self.received == self.promised,
            IcapError::preview_violation(format!("preview ended after {} bytes, {} announced", self.received, self.promised))
        );
        Ok(())
    }

    #[inline]
    pub fn received(&self) -> usize {
        self.received
    }
}

/// Adds the preview parameters to an OPTIONS response: `Allow: 204`, `Preview` when
/// previews are enabled, and `Transfer-Preview`.
pub fn advertise(headers: &mut HeaderMap, preview: Option<usize>, transfer_preview: &str) {
    headers.insert(ALLOW, ALLOW_204_VALUE);
    if let Some(size) = preview {
        headers.insert(PREVIEW, HeaderValue::from(size));
    }
    if let Ok(value) = HeaderValue::from_str(transfer_preview) {
        headers.insert(TRANSFER_PREVIEW, value);
    }
}

/// What a remote service announced in its OPTIONS response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServiceOptions {
    pub methods: Vec<Method>,
    pub preview: Option<usize>,
    pub allow_204: bool,
    pub istag: Option<String>,
    pub transfer_preview: Option<String>,
}

impl ServiceOptions {
    pub fn from_response(response: &IcapResponse) -> Self {
        let headers = response.headers();
        let text = |value: &HeaderValue| value.to_str().ok().map(str::trim).map(str::to_string);

        let methods = headers
            .get_all(METHODS)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .flat_map(|value| value.split(','))
            .filter_map(|method| method.trim().parse().ok())
            .collect();

        Self {
            methods,
            preview: headers.get(PREVIEW).and_then(text).and_then(|size| size.parse().ok()),
            allow_204: headers
                .get_all(ALLOW)
                .iter()
                .filter_map(|value| value.to_str().ok())
                .flat_map(|value| value.split(','))
                .any(|code| code.trim() == "204"),
            istag: headers.get(ISTAG).and_then(text),
            transfer_preview: headers.get(TRANSFER_PREVIEW).and_then(text),
        }
    }

    pub fn supports(&self, method: Method) -> bool {
        self.methods.contains(&method)
    }
}
