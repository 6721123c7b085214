//! Encapsulated HTTP heads.
//!
//! The sections named by `req-hdr` and `res-hdr` are ordinary HTTP/1.x header blocks.
//! They are parsed with `httparse` into `http::Request<()>` / `http::Response<()>` and
//! serialized back with canonical header names.

use bytes::{BufMut, BytesMut};
use http::{HeaderMap, HeaderName, HeaderValue, Method as HttpMethod, Request, Response, StatusCode, Uri, Version};
use httparse::Status;
use std::io::Write;

use crate::codec::header::FastWrite;
use crate::codec::header::icap_head::{MAX_HEADER_NUM, to_header_map};
use crate::protocol::headers::canonical_name;
use crate::protocol::{Encapsulated, HttpEnvelope, Layout, ParseError, SectionKind};

/// Slices the header sections out of `sections` (the bytes between the ICAP head and the
/// body) and parses each one.
///
/// A request body placed ahead of a response header is skipped.
pub(crate) fn decode_envelope(sections: &[u8], encapsulated: &Encapsulated) -> Result<HttpEnvelope, ParseError> {
    let slice = |(start, end): (usize, usize)| {
        sections.get(start..end).ok_or_else(|| ParseError::invalid_encapsulated(format!("section {start}..{end} out of bounds")))
    };

    let request = match encapsulated.range_of(SectionKind::ReqHdr) {
        Some(range) => Some(parse_request(slice(range)?)?),
        None => None,
    };

    let response = match encapsulated.range_of(SectionKind::ResHdr) {
        Some(range) => Some(parse_response(slice(range)?)?),
        None => None,
    };

    Ok(HttpEnvelope { request, response })
}

fn parse_version(version: Option<u8>) -> Result<Version, ParseError> {
    match version {
        Some(0) => Ok(Version::HTTP_10),
        Some(1) => Ok(Version::HTTP_11),
        v => Err(ParseError::invalid_http_message(format!("unsupported http version {v:?}"))),
    }
}

pub(crate) fn parse_request(bytes: &[u8]) -> Result<Request<()>, ParseError> {
    let mut headers = [httparse::EMPTY_HEADER; MAX_HEADER_NUM];
    let mut req = httparse::Request::new(&mut headers);

    match req.parse(bytes).map_err(ParseError::invalid_http_message)? {
        Status::Complete(_) => {}
        Status::Partial => return Err(ParseError::invalid_http_message("request header is truncated")),
    }

    let method = req.method.ok_or_else(|| ParseError::invalid_http_message("missing method"))?;
    let path = req.path.ok_or_else(|| ParseError::invalid_http_message("missing request target"))?;

    let mut request = Request::new(());
    *request.method_mut() = HttpMethod::from_bytes(method.as_bytes()).map_err(ParseError::invalid_http_message)?;
    *request.uri_mut() = path.parse::<Uri>().map_err(ParseError::invalid_http_message)?;
    *request.version_mut() = parse_version(req.version)?;
    *request.headers_mut() = to_header_map(req.headers)?;
    Ok(request)
}

pub(crate) fn parse_response(bytes: &[u8]) -> Result<Response<()>, ParseError> {
    let mut headers = [httparse::EMPTY_HEADER; MAX_HEADER_NUM];
    let mut res = httparse::Response::new(&mut headers);

    match res.parse(bytes).map_err(ParseError::invalid_http_message)? {
        Status::Complete(_) => {}
        Status::Partial => return Err(ParseError::invalid_http_message("response header is truncated")),
    }

    let code = res.code.ok_or_else(|| ParseError::invalid_http_message("missing status code"))?;

    let mut response = Response::new(());
    *response.status_mut() = StatusCode::from_u16(code).map_err(ParseError::invalid_http_message)?;
    *response.version_mut() = parse_version(res.version)?;
    *response.headers_mut() = to_header_map(res.headers)?;
    Ok(response)
}

fn version_str(version: Version) -> &'static str {
    if version == Version::HTTP_10 { "HTTP/1.0" } else { "HTTP/1.1" }
}

pub(crate) fn write_request(request: &Request<()>, dst: &mut BytesMut) {
    // writing into memory cannot fail
    let _ = write!(FastWrite(dst), "{} {} {}\r\n", request.method(), request.uri(), version_str(request.version()));
    write_headers(request.headers(), dst);
    dst.put_slice(b"\r\n");
}

pub(crate) fn write_response(response: &Response<()>, dst: &mut BytesMut) {
    let status = response.status();
    let _ = write!(
        FastWrite(dst),
        "{} {} {}\r\n",
        version_str(response.version()),
        status.as_str(),
        status.canonical_reason().unwrap_or("Unknown")
    );
    write_headers(response.headers(), dst);
    dst.put_slice(b"\r\n");
}

/// Writes every header as `Name: value\r\n`, with names in canonical case.
pub(crate) fn write_headers(headers: &HeaderMap, dst: &mut BytesMut) {
    for (name, value) in headers {
        write_header(name, value, dst);
    }
}

/// Like [`write_headers`], leaving out every `skip` header.
pub(crate) fn write_headers_except(headers: &HeaderMap, skip: &HeaderName, dst: &mut BytesMut) {
    for (name, value) in headers.iter().filter(|(name, _)| *name != skip) {
        write_header(name, value, dst);
    }
}

fn write_header(name: &HeaderName, value: &HeaderValue, dst: &mut BytesMut) {
    canonical_name(name, dst);
    dst.put_slice(b": ");
    dst.put_slice(value.as_bytes());
    dst.put_slice(b"\r\n");
}

/// Writes the HTTP heads of `envelope` in section order: request first, then response.
pub(crate) fn write_envelope(envelope: &HttpEnvelope, dst: &mut BytesMut) {
    if let Some(request) = &envelope.request {
        write_request(request, dst);
    }
    if let Some(response) = &envelope.response {
        write_response(response, dst);
    }
}

/// The [`Layout`] of `envelope` as it will be serialized.
pub fn encoded_layout(envelope: &HttpEnvelope, has_body: bool) -> Layout {
    let mut scratch = BytesMut::new();

    let req_hdr = envelope.request.as_ref().map(|request| {
        write_request(request, &mut scratch);
        scratch.split().len()
    });
    let res_hdr = envelope.response.as_ref().map(|response| {
        write_response(response, &mut scratch);
        scratch.split().len()
    });

    Layout { req_hdr, req_body: None, res_hdr, body: has_body }
}
