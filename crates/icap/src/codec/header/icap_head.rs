//! Parsing of the ICAP start line and header block shared by requests and responses.

use bytes::BytesMut;
use http::{HeaderMap, HeaderName, HeaderValue};
use httparse::Status;

use crate::ensure;
use crate::protocol::ParseError;

/// Maximum number of headers allowed in one header block
pub(crate) const MAX_HEADER_NUM: usize = 64;

/// Maximum size of the ICAP start line and headers
pub(crate) const MAX_HEADER_BYTES: usize = 8 * 1024;

/// Maximum size of the ICAP head plus the encapsulated HTTP heads
pub(crate) const MAX_ENCAPSULATED_BYTES: usize = 64 * 1024;

/// The ICAP start line split at its first two spaces, and the parsed header block.
pub(crate) struct IcapHead<'a> {
    pub(crate) first: &'a str,
    pub(crate) second: &'a str,
    pub(crate) third: Option<&'a str>,
    pub(crate) headers: HeaderMap,
    /// Length of the start line, headers and the blank line ending them
    pub(crate) len: usize,
}

/// Parses the ICAP head at the start of `src` without consuming it.
///
/// Returns `Ok(None)` until the blank line ending the header block has arrived.
pub(crate) fn parse_icap_head(src: &BytesMut) -> Result<Option<IcapHead<'_>>, ParseError> {
    let Some(line_end) = src.windows(2).position(|w| w == b"\r\n") else {
        ensure!(src.len() <= MAX_HEADER_BYTES, ParseError::too_large_header(src.len(), MAX_HEADER_BYTES));
        return Ok(None);
    };

    let mut headers = [httparse::EMPTY_HEADER; MAX_HEADER_NUM];
    let (consumed, parsed) = match httparse::parse_headers(&src[line_end + 2..], &mut headers) {
        Ok(Status::Complete(complete)) => complete,
        Ok(Status::Partial) => {
            ensure!(src.len() <= MAX_HEADER_BYTES, ParseError::too_large_header(src.len(), MAX_HEADER_BYTES));
            return Ok(None);
        }
        Err(httparse::Error::TooManyHeaders) => return Err(ParseError::too_many_headers(MAX_HEADER_NUM)),
        Err(e) => return Err(ParseError::invalid_header(e)),
    };

    let len = line_end + 2 + consumed;
    ensure!(len <= MAX_HEADER_BYTES, ParseError::too_large_header(len, MAX_HEADER_BYTES));

    let line = std::str::from_utf8(&src[..line_end]).map_err(|_| ParseError::invalid_start_line("start line is not utf-8"))?;
    let mut parts = line.splitn(3, ' ');
    let (Some(first), Some(second)) = (parts.next(), parts.next()) else {
        return Err(ParseError::invalid_start_line(line));
    };
    let third = parts.next();

    Ok(Some(IcapHead { first, second, third, headers: to_header_map(parsed)?, len }))
}

/// Copies parsed headers into a [`HeaderMap`], keeping order and repeated names.
pub(crate) fn to_header_map(parsed: &[httparse::Header<'_>]) -> Result<HeaderMap, ParseError> {
    let mut headers = HeaderMap::with_capacity(parsed.len());
    for header in parsed {
        let name = HeaderName::from_bytes(header.name.as_bytes()).map_err(ParseError::invalid_header)?;
        let value = HeaderValue::from_bytes(header.value).map_err(ParseError::invalid_header)?;
        headers.append(name, value);
    }
    Ok(headers)
}
