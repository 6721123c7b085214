use http::header::{CONTENT_ENCODING, CONTENT_LENGTH};
use http::{HeaderMap, Method as HttpMethod, Request, Response, StatusCode};

/// The HTTP message heads carried inside an ICAP message.
///
/// Bodies are not part of the envelope; they travel as the chunked ICAP payload.
#[derive(Debug, Default)]
pub struct HttpEnvelope {
    pub request: Option<Request<()>>,
    pub response: Option<Response<()>>,
}

impl HttpEnvelope {
    pub fn new(request: Option<Request<()>>, response: Option<Response<()>>) -> Self {
        Self { request, response }
    }

    pub fn request(request: Request<()>) -> Self {
        Self { request: Some(request), response: None }
    }

    pub fn response(request: Option<Request<()>>, response: Response<()>) -> Self {
        Self { request, response: Some(response) }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.request.is_none() && self.response.is_none()
    }

    /// Headers of the message the body belongs to: the response when present, else the request.
    pub fn body_headers(&self) -> Option<&HeaderMap> {
        match (&self.response, &self.request) {
            (Some(response), _) => Some(response.headers()),
            (None, Some(request)) => Some(request.headers()),
            (None, None) => None,
        }
    }

    /// The `Content-Length` of the encapsulated body, if declared.
    pub fn content_length(&self) -> Option<u64> {
        self.body_headers()?.get(CONTENT_LENGTH)?.to_str().ok()?.trim().parse().ok()
    }

    /// True when the encapsulated body is gzip encoded.
    pub fn is_gzip(&self) -> bool {
        self.body_headers()
            .and_then(|headers| headers.get(CONTENT_ENCODING))
            .and_then(|value| value.to_str().ok())
            .is_some_and(|value| value.split(',').any(|coding| coding.trim().eq_ignore_ascii_case("gzip")))
    }

    pub fn http_method(&self) -> Option<&HttpMethod> {
        self.request.as_ref().map(Request::method)
    }

    pub fn http_status(&self) -> Option<StatusCode> {
        self.response.as_ref().map(Response::status)
    }
}

/// `Request<()>` and `Response<()>` are not `Clone`, so copies are rebuilt from their parts.
impl Clone for HttpEnvelope {
    fn clone(&self) -> Self {
        Self { request: self.request.as_ref().map(clone_request), response: self.response.as_ref().map(clone_response) }
    }
}

pub fn clone_request(request: &Request<()>) -> Request<()> {
    let mut copy = Request::new(());
    *copy.method_mut() = request.method().clone();
    *copy.uri_mut() = request.uri().clone();
    *copy.version_mut() = request.version();
    *copy.headers_mut() = request.headers().clone();
    copy
}

pub fn clone_response(response: &Response<()>) -> Response<()> {
    let mut copy = Response::new(());
    *copy.status_mut() = response.status();
    *copy.version_mut() = response.version();
    *copy.headers_mut() = response.headers().clone();
    copy
}
