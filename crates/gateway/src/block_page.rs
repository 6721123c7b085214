//! The HTTP response shown instead of blocked content.

use bytes::Bytes;
use http::header::{CACHE_CONTROL, CONTENT_LENGTH, CONTENT_TYPE};
use http::{HeaderValue, Response, StatusCode};

use crate::config::ServiceConfig;

/// The HTTP head of a block page, with `Content-Length` set when `body_len` is given.
pub fn response_head(config: &ServiceConfig, body_len: Option<usize>) -> Response<()> {
    let mut response = Response::new(());
    *response.status_mut() = StatusCode::from_u16(config.block_http_response_code).unwrap_or(StatusCode::FORBIDDEN);

    let headers = response.headers_mut();
    headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-store"));
    match body_len {
        Some(len) => {
            if let Ok(content_type) = HeaderValue::from_str(mime::TEXT_HTML_UTF_8.as_ref()) {
                headers.insert(CONTENT_TYPE, content_type);
            }
            headers.insert(CONTENT_LENGTH, HeaderValue::from(len));
        }
        None => {
            headers.insert(CONTENT_LENGTH, HeaderValue::from_static("0"));
        }
    }
    response
}

pub fn render(reason: &str, service: &str, request_id: &str) -> Bytes {
    let page = format!(
        "<!DOCTYPE html>\n<html>\n<head><title>Access Blocked</title></head>\n<body>\n\
         <h1>Access Blocked</h1>\n\
         <p>The requested content was blocked by the <b>{service}</b> service.</p>\n\
         <p>Reason: {reason}</p>\n\
         <p>Request ID: {request_id}</p>\n\
         </body>\n</html>\n",
        service = escape(service),
        reason = escape(reason),
        request_id = escape(request_id),
    );
    Bytes::from(page)
}

fn escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '&' => escaped.push_str("&amp;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            c => escaped.push(c),
        }
    }
    escaped
}
