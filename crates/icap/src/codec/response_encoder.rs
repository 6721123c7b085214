use crate::codec::body::ChunkedEncoder;
use crate::codec::header::HeaderEncoder;
use crate::protocol::{Message, ResponseHead, SendError};
use bytes::{Buf, BytesMut};
use std::io;
use std::io::ErrorKind;
use tokio_util::codec::Encoder;
use tracing::error;

/// Server side encoding of ICAP responses: a head, then body chunks when the head
/// announces a body.
#[derive(Debug)]
pub struct ResponseEncoder {
    header_encoder: HeaderEncoder,
    payload_encoder: Option<ChunkedEncoder>,
}

impl ResponseEncoder {
    pub fn new() -> Self {
        Default::default()
    }
}

impl Default for ResponseEncoder {
    fn default() -> Self {
        Self { header_encoder: HeaderEncoder, payload_encoder: None }
    }
}

impl<D: Buf> Encoder<Message<ResponseHead, D>> for ResponseEncoder {
    type Error = SendError;

    fn encode(&mut self, item: Message<ResponseHead, D>, dst: &mut BytesMut) -> Result<(), Self::Error> {
        match item {
            Message::Header(head) => {
                if self.payload_encoder.is_some() {
                    error!("expect payload item but receive response head");
                    return Err(io::Error::from(ErrorKind::InvalidInput).into());
                }

                if head.has_body() {
                    self.payload_encoder = Some(ChunkedEncoder::new());
                }
                self.header_encoder.encode(&head, dst)
            }

            Message::Payload(payload_item) => {
                let Some(payload_encoder) = &mut self.payload_encoder else {
                    error!("expect response head but receive payload item");
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
