use bytes::Bytes;
use http::header::IntoHeaderName;
use http::{HeaderMap, HeaderValue, Request, Response};

use crate::codec::encoded_layout;
use crate::protocol::{Encapsulated, HttpEnvelope, IcapStatus, Method};

/// The head of an ICAP response: status line, ICAP headers and the encapsulated HTTP heads.
#[derive(Debug)]
pub struct ResponseHead {
    status: IcapStatus,
    headers: HeaderMap,
    encapsulated: Encapsulated,
    envelope: HttpEnvelope,
}

impl ResponseHead {
    pub(crate) fn from_parts(status: IcapStatus, headers: HeaderMap, encapsulated: Encapsulated, envelope: HttpEnvelope) -> Self {
        Self { status, headers, encapsulated, envelope }
    }

    #[inline]
    pub fn status(&self) -> IcapStatus {
        self.status
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

    #[inline]
    pub fn has_body(&self) -> bool {
        self.encapsulated.has_body()
    }
}

/// A complete ICAP response, produced by a handler or read back by the client.
#[derive(Debug)]
pub struct IcapResponse {
    head: ResponseHead,
    body: Option<Bytes>,
}

impl IcapResponse {
    pub fn builder(status: IcapStatus) -> ResponseBuilder {
        ResponseBuilder::new(status)
    }

    /// A response without encapsulated content.
    pub fn status_only(status: IcapStatus) -> Self {
        Self::builder(status).build(Method::Options)
    }

    pub fn from_parts(head: ResponseHead, body: Option<Bytes>) -> Self {
        Self { head, body }
    }

    pub fn into_parts(self) -> (ResponseHead, Option<Bytes>) {
        (self.head, self.body)
    }

    #[inline]
    pub fn head(&self) -> &ResponseHead {
        &self.head
    }

    #[inline]
    pub fn status(&self) -> IcapStatus {
        self.head.status
    }

    #[inline]
    pub fn headers(&self) -> &HeaderMap {
        &self.head.headers
    }

    #[inline]
    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.head.headers
    }

    #[inline]
    pub fn envelope(&self) -> &HttpEnvelope {
        &self.head.envelope
    }

    #[inline]
    pub fn body(&self) -> Option<&Bytes> {
        self.body.as_ref()
    }
}

/// Builder for [`IcapResponse`], computing the `Encapsulated` layout on [`build`](Self::build).
#[derive(Debug)]
pub struct ResponseBuilder {
    status: IcapStatus,
    headers: HeaderMap,
    envelope: HttpEnvelope,
    body: Option<Bytes>,
}

impl ResponseBuilder {
    fn new(status: IcapStatus) -> Self {
        Self { status, headers: HeaderMap::new(), envelope: HttpEnvelope::default(), body: None }
    }

    pub fn header<K: IntoHeaderName>(mut self, name: K, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    pub fn http_request(mut self, request: Request<()>) -> Self {
        self.envelope.request = Some(request);
        self
    }

    pub fn http_response(mut self, response: Response<()>) -> Self {
        self.envelope.response = Some(response);
        self
    }

    pub fn envelope(mut self, envelope: HttpEnvelope) -> Self {
        self.envelope = envelope;
        self
    }

    pub fn body(mut self, body: Bytes) -> Self {
        self.body = Some(body);
        self
    }

    /// Finishes the response to a request of `method`.
    pub fn build(self, method: Method) -> IcapResponse {
        let encapsulated = Encapsulated::compute(method, &encoded_layout(&self.envelope, self.body.is_some()));
        IcapResponse {
            head: ResponseHead { status: self.status, headers: self.headers, encapsulated, envelope: self.envelope },
            body: self.body,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::headers::ISTAG;

    #[test]
    fn test_status_only() {
        let response = IcapResponse::status_only(IcapStatus::NO_CONTENT);
        assert_eq!(response.head().encapsulated().to_string(), "null-body=0");
        assert!(response.body().is_none());
    }

    #[test]
    fn test_respmod_layout() {
        let http_response = Response::builder().status(200).header("content-type", "text/plain").body(()).unwrap();
        let response = IcapResponse::builder(IcapStatus::OK)
            .header(ISTAG, HeaderValue::from_static("\"x\""))
            .http_response(http_response)
            .body(Bytes::from_static(b"hello"))
            .build(Method::Respmod);

        // "HTTP/1.1 200 OK\r\n" + "Content-Type: text/plain\r\n" + "\r\n"
        assert_eq!(response.head().encapsulated().to_string(), "res-hdr=0, res-body=45");
        assert_eq!(response.headers()[ISTAG], "\"x\"");
    }
}
