use bytes::{Bytes, BytesMut};
use http::{HeaderMap, HeaderValue, Uri};

use crate::codec::encoded_layout;
use crate::protocol::headers::PREVIEW;
use crate::protocol::{Encapsulated, HttpEnvelope, Method};

/// The head of an ICAP request: request line, ICAP headers and the encapsulated HTTP heads.
#[derive(Debug)]
pub struct RequestHeader {
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    encapsulated: Encapsulated,
    envelope: HttpEnvelope,
}

impl RequestHeader {
    /// Builds a request head to be sent, computing its `Encapsulated` layout.
    pub fn new(method: Method, uri: Uri, headers: HeaderMap, envelope: HttpEnvelope, has_body: bool) -> Self {
        let encapsulated = Encapsulated::compute(method, &encoded_layout(&envelope, has_body));
        Self { method, uri, headers, encapsulated, envelope }
    }

    pub(crate) fn from_parts(
        method: Method,
        uri: Uri,
        headers: HeaderMap,
        encapsulated: Encapsulated,
        envelope: HttpEnvelope,
    ) -> Self {
        Self { method, uri, headers, encapsulated, envelope }
    }

    #[inline]
    pub fn method(&self) -> Method {
        self.method
    }

    #[inline]
    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    #[inline]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    #[inline]
    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    #[inline]
    pub fn encapsulated(&self) -> &Encapsulated {
        &self.encapsulated
    }

    #[inline]
    pub fn envelope(&self) -> &HttpEnvelope {
        &self.envelope
    }

    /// The service name, i.e. the path of the ICAP URI.
    pub fn service_path(&self) -> &str {
        self.uri.path()
    }

    /// True when a chunked body follows the head.
    #[inline]
    pub fn has_body(&self) -> bool {
        self.encapsulated.has_body()
    }

    /// The number of preview bytes the client announced, if it sent a preview.
    pub fn preview(&self) -> Option<usize> {
        self.headers.get(PREVIEW)?.to_str().ok()?.trim().parse().ok()
    }

    /// True when the client listed `204` in its `Allow` header.
    ///
    /// The header is treated as a comma-separated set of status codes, and may be repeated.
    pub fn allow_204(&self) -> bool {
        allows(&self.headers, "204")
    }
}

fn allows(headers: &HeaderMap, code: &str) -> bool {
    headers
        .get_all(http::header::ALLOW)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .any(|item| item.trim() == code)
}

/// A fully read ICAP request as handed to a [`Handler`](crate::handler::Handler).
///
/// When the client sent a preview, the request starts out holding only the preview bytes;
/// it becomes complete once the preview carried `ieof`, or the rest of the body arrived
/// after a `100 Continue`.
#[derive(Debug)]
pub struct IcapRequest {
    header: RequestHeader,
    body: Bytes,
    complete: bool,
}

impl IcapRequest {
    pub fn new(header: RequestHeader, body: Bytes, complete: bool) -> Self {
        Self { header, body, complete }
    }

    #[inline]
    pub fn header(&self) -> &RequestHeader {
        &self.header
    }

    #[inline]
    pub fn method(&self) -> Method {
        self.header.method
    }

    #[inline]
    pub fn envelope(&self) -> &HttpEnvelope {
        &self.header.envelope
    }

    /// The body bytes received so far.
    #[inline]
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// True once the whole encapsulated body is available.
    #[inline]
    pub fn is_complete(&self) -> bool {
        self.complete
    }

    #[inline]
    pub fn allow_204(&self) -> bool {
        self.header.allow_204()
    }

    #[inline]
    pub fn preview(&self) -> Option<usize> {
        self.header.preview()
    }

    /// Appends the bytes sent after a `100 Continue` and marks the body complete.
    pub(crate) fn complete_with(&mut self, rest: Bytes) {
        if !rest.is_empty() {
            let mut body = BytesMut::with_capacity(self.body.len() + rest.len());
            body.extend_from_slice(&self.body);
            body.extend_from_slice(&rest);
            self.body = body.freeze();
        }
        self.complete = true;
    }

    pub fn into_parts(self) -> (RequestHeader, Bytes) {
        (self.header, self.body)
    }
}

/// The `Allow: 204` header value clients send to permit `204 No Content` outside a preview.
pub const ALLOW_204_VALUE: HeaderValue = HeaderValue::from_static("204");

#[cfg(test)]
mod tests {
    use super::*;
    use http::header::ALLOW;

    fn header_with(headers: HeaderMap) -> RequestHeader {
        RequestHeader::new(Method::Reqmod, Uri::from_static("icap://localhost/echo"), headers, HttpEnvelope::default(), false)
    }

    #[test]
    fn test_allow_204_set_membership() {
        let mut headers = HeaderMap::new();
        headers.insert(ALLOW, HeaderValue::from_static("206, 204"));
        assert!(header_with(headers).allow_204());

        let mut headers = HeaderMap::new();
        headers.append(ALLOW, HeaderValue::from_static("trailers"));
        headers.append(ALLOW, HeaderValue::from_static("204"));
        assert!(header_with(headers).allow_204());

        let mut headers = HeaderMap::new();
        headers.insert(ALLOW, HeaderValue::from_static("2040"));
        assert!(!header_with(headers).allow_204());

        assert!(!header_with(HeaderMap::new()).allow_204());
    }

    #[test]
    fn test_preview_header() {
        let mut headers = HeaderMap::new();
        headers.insert(PREVIEW, HeaderValue::from_static("1024"));
        let header = header_with(headers);
        assert_eq!(header.preview(), Some(1024));
        assert_eq!(header.service_path(), "/echo");
    }

    #[test]
    fn test_complete_with_continuation() {
        let mut request = IcapRequest::new(header_with(HeaderMap::new()), Bytes::from_static(b"This is da"), false);
        request.complete_with(Bytes::from_static(b"ta that was being POSTed"));
        assert!(request.is_complete());
        assert_eq!(&request.body()[..], b"This is data that was being POSTed");
    }
}
