//! Decoder for the body that follows an ICAP head.
//!
//! Whether a body follows is decided by the terminal tag of the `Encapsulated` header:
//! `null-body` means none, every other body tag means a chunked body.

use crate::codec::body::chunked_decoder::ChunkedDecoder;
use crate::protocol::{Encapsulated, ParseError, PayloadItem};
use bytes::BytesMut;
use tokio_util::codec::Decoder;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayloadDecoder {
    kind: Kind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Kind {
    Chunked(ChunkedDecoder),
    NoBody,
}

impl PayloadDecoder {
    pub fn empty() -> Self {
        Self { kind: Kind::NoBody }
    }

    pub fn chunked() -> Self {
        Self { kind: Kind::Chunked(ChunkedDecoder::new()) }
    }

    pub fn is_chunked(&self) -> bool {
        matches!(self.kind, Kind::Chunked(_))
    }
}

impl From<&Encapsulated> for PayloadDecoder {
    fn from(encapsulated: &Encapsulated) -> Self {
        if encapsulated.has_body() { Self::chunked() } else { Self::empty() }
    }
}

impl Decoder for PayloadDecoder {
    type Item = PayloadItem;
    type Error = ParseError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match &mut self.kind {
            Kind::Chunked(chunked_decoder) => chunked_decoder.decode(src),
            Kind::NoBody => Ok(Some(PayloadItem::Eof)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_body() {
        let encapsulated = Encapsulated::parse("req-hdr=0, null-body=170").unwrap();
        let mut decoder = PayloadDecoder::from(&encapsulated);
        assert!(!decoder.is_chunked());

        let mut buffer = BytesMut::from(&b"ICAP/1.0"[..]);
        assert_eq!(decoder.decode(&mut buffer).unwrap(), Some(PayloadItem::Eof));
        // the bytes of the next message are untouched
        assert_eq!(buffer.len(), 8);
    }

    #[test]
    fn test_chunked_body() {
        let encapsulated = Encapsulated::parse("res-hdr=0, res-body=30").unwrap();
        let mut decoder = PayloadDecoder::from(&encapsulated);
        assert!(decoder.is_chunked());

        let mut buffer = BytesMut::from(&b"3\r\nabc\r\n0\r\n\r\n"[..]);
        assert_eq!(decoder.decode(&mut buffer).unwrap().unwrap().into_bytes().unwrap(), "abc");
        assert_eq!(decoder.decode(&mut buffer).unwrap(), Some(PayloadItem::Eof));
    }
}
