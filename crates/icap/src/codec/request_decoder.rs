//! Server side decoding of ICAP requests.
//!
//! The decoder alternates between two phases: the head, decoded by
//! [`RequestHeadDecoder`], then the chunked body when the `Encapsulated` header
//! announces one. After a preview the body decoder is gone; the connection reinstalls
//! it with [`RequestDecoder::continue_payload`] once it has sent `100 Continue`.

use crate::codec::body::PayloadDecoder;
use crate::codec::header::RequestHeadDecoder;
use crate::protocol::{Message, ParseError, PayloadItem, RequestHeader};
use bytes::BytesMut;
use tokio_util::codec::Decoder;

/// Decodes [`Message::Header`] followed by body chunks ending in `Eof` or `Ieof`.
///
/// - `payload_decoder == None`: parsing a head
/// - `payload_decoder == Some(_)`: parsing a body
#[derive(Debug)]
pub struct RequestDecoder {
    header_decoder: RequestHeadDecoder,
    payload_decoder: Option<PayloadDecoder>,
}

impl RequestDecoder {
    pub fn new() -> Self {
        Default::default()
    }

    /// Expects the continuation of a previewed body.
    pub fn continue_payload(&mut self) {
        self.payload_decoder = Some(PayloadDecoder::chunked());
    }
}

impl Default for RequestDecoder {
    fn default() -> Self {
        Self { header_decoder: RequestHeadDecoder, payload_decoder: None }
    }
}

impl Decoder for RequestDecoder {
    type Item = Message<RequestHeader>;
    type Error = ParseError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(payload_decoder) = &mut self.payload_decoder {
            let message = match payload_decoder.decode(src)? {
                Some(item @ PayloadItem::Chunk(_)) => Some(Message::Payload(item)),
                Some(item) => {
                    // body finished, the next bytes belong to a new head
                    self.payload_decoder.take();
                    Some(Message::Payload(item))
                }
                None => None,
            };

            return Ok(message);
        }

        let message = match self.header_decoder.decode(src)? {
            Some(header) => {
                self.payload_decoder = Some(header.encapsulated().into());
                Some(Message::Header(header))
            }
            None => None,
        };

        Ok(message)
    }
}
