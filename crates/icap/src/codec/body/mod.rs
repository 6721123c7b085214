//! Chunked body framing for ICAP messages.
//!
//! - [`ChunkedDecoder`]: streaming decoder, understands the `ieof` extension
//! - [`ChunkedEncoder`]: streaming encoder
//! - [`PayloadDecoder`]: picks chunked or no-body decoding from the `Encapsulated` layout
//! - [`chunk`] / [`dechunk`]: whole-buffer helpers

mod chunked_decoder;
mod chunked_encoder;
mod payload_decoder;

pub use chunked_decoder::ChunkedDecoder;
pub use chunked_encoder::ChunkedEncoder;
pub use payload_decoder::PayloadDecoder;

use crate::protocol::{ParseError, PayloadItem};
use bytes::{Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

/// Frames `body` as a single chunk followed by the zero-length chunk: `<hex>\r\n<body>\r\n0\r\n`.
///
/// The blank line that closes the last encapsulated section is not included. An empty
/// body yields just `0\r\n`.
pub fn chunk(body: &[u8]) -> Bytes {
    let mut dst = BytesMut::with_capacity(body.len() + 16);
    if !body.is_empty() {
        let mut encoder = ChunkedEncoder::new();
        // encoding into memory cannot fail
        let _ = encoder.encode(PayloadItem::Chunk(body), &mut dst);
    }
    dst.extend_from_slice(b"0\r\n");
    dst.freeze()
}

/// Reverses [`chunk`], accepting any number of chunks.
///
/// The input may stop right after the zero-length chunk or include the final CRLF and
/// trailers. Fails when a declared chunk size does not match the data before the next
/// CRLF, or when the input ends before the zero-length chunk.
pub fn dechunk(src: &[u8]) -> Result<Bytes, ParseError> {
    let mut src = BytesMut::from(src);
    let mut decoder = ChunkedDecoder::new();
    let mut body = BytesMut::new();

    loop {
        match decoder.decode(&mut src)? {
            Some(PayloadItem::Chunk(bytes)) => body.extend_from_slice(&bytes),
            Some(PayloadItem::Eof | PayloadItem::Ieof) => return Ok(body.freeze()),
            None if decoder.is_at_last_chunk() && src.is_empty() => return Ok(body.freeze()),
            None => return Err(ParseError::invalid_body("chunked body ends before the zero-length chunk")),
        }
    }
}
