//! gzip handling of encapsulated bodies.
//!
//! Scanners always see the decoded bytes; a modified body is encoded again before it is
//! sent back, so the `Content-Encoding` of the HTTP message stays truthful.

use std::io;
use std::io::{Read, Write};

use bytes::{Bytes, BytesMut};
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;

struct Writer {
    buf: BytesMut,
}

impl Writer {
    fn with_capacity(capacity: usize) -> Self {
        Self { buf: BytesMut::with_capacity(capacity) }
    }

    fn take(&mut self) -> Bytes {
        self.buf.split().freeze()
    }
}

impl io::Write for Writer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buf.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

pub fn gunzip(data: &[u8]) -> io::Result<Bytes> {
    let mut decoded = Vec::with_capacity(data.len() * 2);
    GzDecoder::new(data).read_to_end(&mut decoded)?;
    Ok(Bytes::from(decoded))
}

pub fn gzip(data: &[u8]) -> io::Result<Bytes> {
    let mut encoder = GzEncoder::new(Writer::with_capacity(data.len() / 2 + 64), Compression::default());
    encoder.write_all(data)?;
    let mut writer = encoder.finish()?;
    Ok(writer.take())
}
