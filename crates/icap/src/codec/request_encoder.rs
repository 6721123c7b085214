use crate::codec::body::ChunkedEncoder;
use crate::codec::header::HeaderEncoder;
use crate::protocol::{Message, RequestHeader, SendError};
use bytes::{Buf, BytesMut};
use std::io;
use std::io::ErrorKind;
use tokio_util::codec::Encoder;
use tracing::error;

/// Client side encoding of ICAP requests.
///
/// A previewed body ends twice: once after the preview and once after the continuation.
/// Call [`continue_payload`](Self::continue_payload) before sending the continuation.
#[derive(Debug)]
pub struct RequestEncoder {
    header_encoder: HeaderEncoder,
    payload_encoder: Option<ChunkedEncoder>,
}

impl RequestEncoder {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn continue_payload(&mut self) {
        self.payload_encoder = Some(ChunkedEncoder::new());
    }
}

impl Default for RequestEncoder {
    fn default() -> Self {
        Self { header_encoder: HeaderEncoder, payload_encoder: None }
    }
}

impl<D: Buf> Encoder<Message<RequestHeader, D>> for RequestEncoder {
    type Error = SendError;

    fn encode(&mut self, item: Message<RequestHeader, D>, dst: &mut BytesMut) -> Result<(), Self::Error> {
        match item {
            Message::Header(header) => {
                if self.payload_encoder.is_some() {
                    error!("expect payload item but receive request header");
                    return Err(io::Error::from(ErrorKind::InvalidInput).into());
                }

                if header.has_body() {
                    self.payload_encoder = Some(ChunkedEncoder::new());
                }
                self.header_encoder.encode(&header, dst)
            }

            Message::Payload(payload_item) => {
                let Some(payload_encoder) = &mut self.payload_encoder else {
                    error!("expect request header but receive payload item");
                    return Err(io::Error::from(ErrorKind::InvalidInput).into());
                };

                let result = payload_encoder.encode(payload_item, dst);

                if payload_encoder.is_finish() {
                    self.payload_encoder.take();
                }

                result
            }
        }
    }
}
