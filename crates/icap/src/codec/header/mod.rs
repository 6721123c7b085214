//! Head codecs: the ICAP start line and headers, and the HTTP heads encapsulated after them.
//!
//! - [`RequestHeadDecoder`] / [`ResponseHeadDecoder`]: parse a complete head, including
//!   every header section declared by `Encapsulated`
//! - [`HeaderEncoder`]: writes request and response heads

mod header_decoder;
mod header_encoder;
mod http_head;
mod icap_head;

pub use header_decoder::RequestHeadDecoder;
pub use header_decoder::ResponseHeadDecoder;
pub use header_encoder::HeaderEncoder;
pub use http_head::encoded_layout;

use bytes::{BufMut, BytesMut};
use std::io;
use std::io::Write;

/// `io::Write` over a `BytesMut`, for `write!` formatting straight into the buffer.
pub(crate) struct FastWrite<'a>(pub(crate) &'a mut BytesMut);

impl Write for FastWrite<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.put_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
