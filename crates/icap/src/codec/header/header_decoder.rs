//! Decoders for complete ICAP heads.
//!
//! A head is only yielded once every header section it declares has arrived: the
//! decoder waits for the ICAP header block, reads its `Encapsulated` layout, then waits
//! for the bytes up to the body offset and parses the HTTP heads found there.
//!
//! # Limits
//!
//! - Maximum number of headers per block: 64
//! - Maximum ICAP head size: 8KB
//! - Maximum ICAP head plus encapsulated HTTP heads: 64KB

use bytes::BytesMut;
use http::Uri;
use tokio_util::codec::Decoder;
use tracing::trace;

use crate::codec::header::http_head::decode_envelope;
use crate::codec::header::icap_head::{MAX_ENCAPSULATED_BYTES, parse_icap_head};
use crate::ensure;
use crate::protocol::headers::ENCAPSULATED;
use crate::protocol::{Encapsulated, HttpEnvelope, IcapStatus, Method, ParseError, RequestHeader, ResponseHead};

const ICAP_VERSION: &str = "ICAP/1.0";

fn parse_encapsulated(headers: &http::HeaderMap) -> Result<Option<Encapsulated>, ParseError> {
    match headers.get(ENCAPSULATED) {
        Some(value) => {
            let value = value.to_str().map_err(ParseError::invalid_encapsulated)?;
            Encapsulated::parse(value).map(Some)
        }
        None => Ok(None),
    }
}

/// Splits the encapsulated header sections off `src` once they have all arrived.
fn take_envelope(src: &mut BytesMut, head_len: usize, encapsulated: &Encapsulated) -> Result<Option<HttpEnvelope>, ParseError> {
    let total = head_len + encapsulated.body().offset;
    ensure!(total <= MAX_ENCAPSULATED_BYTES, ParseError::too_large_header(total, MAX_ENCAPSULATED_BYTES));

    if src.len() < total {
        return Ok(None);
    }

    let bytes = src.split_to(total);
    trace!(head_len, sections_len = total - head_len, "parsed icap head");
    decode_envelope(&bytes[head_len..], encapsulated).map(Some)
}

/// Decodes the head of an ICAP request.
///
/// OPTIONS requests may omit `Encapsulated`, which then defaults to `null-body=0`;
/// REQMOD and RESPMOD requests must carry it.
#[derive(Debug, Default)]
pub struct RequestHeadDecoder;

impl Decoder for RequestHeadDecoder {
    type Item = RequestHeader;
    type Error = ParseError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let (method, uri, headers, head_len) = {
            let Some(head) = parse_icap_head(src)? else {
                return Ok(None);
            };

            let method = head.first.parse::<Method>()?;
            let uri = head.second.parse::<Uri>().map_err(|_| ParseError::InvalidUri)?;
            match head.third {
                Some(ICAP_VERSION) => {}
                v => return Err(ParseError::InvalidVersion(v.unwrap_or_default().to_string())),
            }

            (method, uri, head.headers, head.len)
        };

        let encapsulated = match (parse_encapsulated(&headers)?, method) {
            (Some(encapsulated), _) => encapsulated,
            (None, Method::Options) => Encapsulated::null_body(),
            (None, _) => return Err(ParseError::invalid_encapsulated("missing Encapsulated header")),
        };

        let Some(envelope) = take_envelope(src, head_len, &encapsulated)? else {
            return Ok(None);
        };

        Ok(Some(RequestHeader::from_parts(method, uri, headers, encapsulated, envelope)))
    }
}

/// Decodes the head of an ICAP response. A missing `Encapsulated` header means no content.
#[derive(Debug, Default)]
pub struct ResponseHeadDecoder;

impl Decoder for ResponseHeadDecoder {
    type Item = ResponseHead;
    type Error = ParseError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let (status, headers, head_len) = {
            let Some(head) = parse_icap_head(src)? else {
                return Ok(None);
            };

            ensure!(head.first == ICAP_VERSION, ParseError::InvalidVersion(head.first.to_string()));
            let code = head.second.parse::<u16>().map_err(|_| ParseError::invalid_start_line(head.second))?;

            (IcapStatus::from_u16(code)?, head.headers, head.len)
        };

        let encapsulated = parse_encapsulated(&headers)?.unwrap_or_else(Encapsulated::null_body);

        let Some(envelope) = take_envelope(src, head_len, &encapsulated)? else {
            return Ok(None);
        };

        Ok(Some(ResponseHead::from_parts(status, headers, encapsulated, envelope)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::StatusCode;
    use indoc::indoc;

    fn crlf(s: &str) -> BytesMut {
        BytesMut::from(s.replace('\n', "\r\n").as_str())
    }

    #[test]
    fn test_decode_reqmod() {
        let mut src = crlf(indoc! {r##"
        REQMOD icap://icap-server.net/server?arg=87 ICAP/1.0
        Host: icap-server.net
        Encapsulated: req-hdr=0, null-body=170

        GET / HTTP/1.1
        Host: www.origin-server.com
        Accept: text/html, text/plain
        Accept-Encoding: compress
        Cookie: ff39fk3jur@4ii0e02i
        If-None-Match: "xyzzy", "r2d2xxxx"

        "##});

        let header = RequestHeadDecoder.decode(&mut src).unwrap().unwrap();
        assert_eq!(header.method(), Method::Reqmod);
        assert_eq!(header.service_path(), "/server");
        assert_eq!(header.headers()["host"], "icap-server.net");
        assert!(!header.has_body());

        let request = header.envelope().request.as_ref().unwrap();
        assert_eq!(request.headers()["cookie"], "ff39fk3jur@4ii0e02i");
        assert!(src.is_empty());
    }

    #[test]
    fn test_decode_respmod_leaves_body() {
        let mut src = crlf(indoc! {r##"
        RESPMOD icap://icap.example.org/satisf ICAP/1.0
        Host: icap.example.org
        Encapsulated: req-hdr=0, res-hdr=23, res-body=88
        Preview: 4

        GET /a.txt HTTP/1.1

        HTTP/1.1 200 OK
        Content-Type: text/plain
        Content-Length: 11

        4
        This
        0

        "##});

        let header = RequestHeadDecoder.decode(&mut src).unwrap().unwrap();
        assert_eq!(header.method(), Method::Respmod);
        assert_eq!(header.preview(), Some(4));
        assert!(header.has_body());
        assert_eq!(header.envelope().http_status(), Some(StatusCode::OK));
        assert_eq!(header.envelope().content_length(), Some(11));
        assert_eq!(&src[..], b"4\r\nThis\r\n0\r\n\r\n");
    }

    #[test]
    fn test_decode_waits_for_sections() {
        let full = crlf("REQMOD icap://a/echo ICAP/1.0\nEncapsulated: req-hdr=0, null-body=18\n\nGET / HTTP/1.1\n\n");
        let mut src = BytesMut::from(&full[..full.len() - 4]);
        assert!(RequestHeadDecoder.decode(&mut src).unwrap().is_none());

        src.extend_from_slice(&full[full.len() - 4..]);
        assert!(RequestHeadDecoder.decode(&mut src).unwrap().is_some());
    }

    #[test]
    fn test_options_without_encapsulated() {
        let mut src = crlf("OPTIONS icap://icap.server.net/sample-service ICAP/1.0\nHost: icap.server.net\n\n");
        let header = RequestHeadDecoder.decode(&mut src).unwrap().unwrap();
        assert_eq!(header.method(), Method::Options);
        assert_eq!(header.encapsulated(), &Encapsulated::null_body());
    }

    #[test]
    fn test_reqmod_requires_encapsulated() {
        let mut src = crlf("REQMOD icap://a/echo ICAP/1.0\nHost: a\n\n");
        assert!(matches!(RequestHeadDecoder.decode(&mut src), Err(ParseError::InvalidEncapsulated { .. })));
    }

    #[test]
    fn test_unknown_method() {
        let mut src = crlf("GET icap://a/echo ICAP/1.0\nHost: a\n\n");
        assert!(matches!(RequestHeadDecoder.decode(&mut src), Err(ParseError::InvalidMethod)));
    }

    #[test]
    fn test_wrong_version() {
        let mut src = crlf("OPTIONS icap://a/echo HTTP/1.1\nHost: a\n\n");
        assert!(matches!(RequestHeadDecoder.decode(&mut src), Err(ParseError::InvalidVersion(_))));
    }

    #[test]
    fn test_decode_response() {
        let mut src = crlf(indoc! {r##"
        ICAP/1.0 200 OK
        ISTag: "W3E4R7U9-L2E4-2"
        Encapsulated: res-hdr=0, res-body=37

        HTTP/1.1 403 Forbidden
        Server: x

        0

        "##});

        let head = ResponseHeadDecoder.decode(&mut src).unwrap().unwrap();
        assert_eq!(head.status(), IcapStatus::OK);
        assert_eq!(head.headers()["istag"], "\"W3E4R7U9-L2E4-2\"");
        assert_eq!(head.envelope().http_status(), Some(StatusCode::FORBIDDEN));
        assert_eq!(&src[..], b"0\r\n\r\n");
    }

    #[test]
    fn test_decode_continue() {
        let mut src = BytesMut::from("ICAP/1.0 100 Continue\r\n\r\n");
        let head = ResponseHeadDecoder.decode(&mut src).unwrap().unwrap();
        assert_eq!(head.status(), IcapStatus::CONTINUE);
        assert!(!head.has_body());
        assert!(src.is_empty());
    }
}
