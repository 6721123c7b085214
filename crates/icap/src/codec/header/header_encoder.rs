//! Serialization of ICAP heads.
//!
//! The start line and ICAP headers come first, then the `Encapsulated` header computed
//! for the message, a blank line, and the encapsulated HTTP heads in section order.

use bytes::{BufMut, BytesMut};
use http::HeaderMap;
use std::io::Write;
use tokio_util::codec::Encoder;

use crate::codec::header::FastWrite;
use crate::codec::header::http_head::{write_envelope, write_headers_except};
use crate::protocol::headers::ENCAPSULATED;
use crate::protocol::{Encapsulated, RequestHeader, ResponseHead, SendError};

/// Initial buffer size reserved for a head
const INIT_HEADER_SIZE: usize = 1024;

/// Writes [`ResponseHead`]s and [`RequestHeader`]s.
#[derive(Debug, Default)]
pub struct HeaderEncoder;

impl Encoder<&ResponseHead> for HeaderEncoder {
    type Error = SendError;

    fn encode(&mut self, head: &ResponseHead, dst: &mut BytesMut) -> Result<(), Self::Error> {
        dst.reserve(INIT_HEADER_SIZE);
        write!(FastWrite(dst), "ICAP/1.0 {} {}\r\n", head.status().as_u16(), head.status().reason())?;
        write_icap_headers(head.headers(), head.encapsulated(), dst)?;
        write_envelope(head.envelope(), dst);
        Ok(())
    }
}

impl Encoder<&RequestHeader> for HeaderEncoder {
    type Error = SendError;

    fn encode(&mut self, header: &RequestHeader, dst: &mut BytesMut) -> Result<(), Self::Error> {
        dst.reserve(INIT_HEADER_SIZE);
        write!(FastWrite(dst), "{} {} ICAP/1.0\r\n", header.method(), header.uri())?;
        write_icap_headers(header.headers(), header.encapsulated(), dst)?;
        write_envelope(header.envelope(), dst);
        Ok(())
    }
}

fn write_icap_headers(headers: &HeaderMap, encapsulated: &Encapsulated, dst: &mut BytesMut) -> Result<(), SendError> {
    write_headers_except(headers, &ENCAPSULATED, dst);
    write!(FastWrite(dst), "Encapsulated:  {encapsulated}\r\n")?;
    dst.put_slice(b"\r\n");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::header::http_head::parse_request;
    use crate::protocol::{HttpEnvelope, IcapResponse, IcapStatus, Method};
    use http::{HeaderValue, Uri};
    use indoc::indoc;

    fn rfc_get_request() -> String {
        indoc! {r##"
        GET / HTTP/1.1
        Host: www.origin-server.com
        Accept: text/html, text/plain
        Accept-Encoding: compress
        Cookie: ff39fk3jur@4ii0e02i
        If-None-Match: "xyzzy", "r2d2xxxx"

        "##}
        .replace('\n', "\r\n")
    }

    #[test]
    fn test_encode_reqmod_null_body() {
        let raw = rfc_get_request();
        let request = parse_request(raw.as_bytes()).unwrap();

        let mut headers = HeaderMap::new();
        headers.insert(http::header::HOST, HeaderValue::from_static("icap-server.net"));
        let header = RequestHeader::new(
            Method::Reqmod,
            Uri::from_static("icap://icap-server.net/server?arg=87"),
            headers,
            HttpEnvelope::request(request),
            false,
        );

        let mut dst = BytesMut::new();
        HeaderEncoder.encode(&header, &mut dst).unwrap();

        let expected = format!(
            "REQMOD icap://icap-server.net/server?arg=87 ICAP/1.0\r\nHost: icap-server.net\r\nEncapsulated:  req-hdr=0, null-body=170\r\n\r\n{raw}"
        );
        assert_eq!(std::str::from_utf8(&dst).unwrap(), expected);
    }

    #[test]
    fn test_encode_options_response() {
        let response = IcapResponse::builder(IcapStatus::OK)
            .header(crate::protocol::headers::METHODS, HeaderValue::from_static("RESPMOD"))
            .build(Method::Options);

        let mut dst = BytesMut::new();
        HeaderEncoder.encode(response.head(), &mut dst).unwrap();
        assert_eq!(&dst[..], b"ICAP/1.0 200 OK\r\nMethods: RESPMOD\r\nEncapsulated:  null-body=0\r\n\r\n");
    }

    #[test]
    fn test_stored_encapsulated_is_replaced() {
        let mut response = IcapResponse::status_only(IcapStatus::NO_CONTENT);
        response.headers_mut().insert(ENCAPSULATED, HeaderValue::from_static("res-body=99"));

        let mut dst = BytesMut::new();
        HeaderEncoder.encode(response.head(), &mut dst).unwrap();
        assert_eq!(&dst[..], b"ICAP/1.0 204 No Content\r\nEncapsulated:  null-body=0\r\n\r\n");
    }
}
