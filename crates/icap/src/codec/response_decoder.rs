use crate::codec::body::PayloadDecoder;
use crate::codec::header::ResponseHeadDecoder;
use crate::protocol::{Message, ParseError, PayloadItem, ResponseHead};
use bytes::BytesMut;
use tokio_util::codec::Decoder;

/// Client side decoding of ICAP responses.
///
/// Every head is followed by payload items ending in `Eof`; a head without a body
/// yields `Eof` right away, including an interim `100 Continue`.
#[derive(Debug)]
pub struct ResponseDecoder {
    header_decoder: ResponseHeadDecoder,
    payload_decoder: Option<PayloadDecoder>,
}

impl ResponseDecoder {
    pub fn new() -> Self {
        Default::default()
    }
}

impl Default for ResponseDecoder {
    fn default() -> Self {
        Self { header_decoder: ResponseHeadDecoder, payload_decoder: None }
    }
}

impl Decoder for ResponseDecoder {
    type Item = Message<ResponseHead>;
    type Error = ParseError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(payload_decoder) = &mut self.payload_decoder {
            let message = match payload_decoder.decode(src)? {
                Some(item @ PayloadItem::Chunk(_)) => Some(Message::Payload(item)),
                Some(item) => {
                    self.payload_decoder.take();
                    Some(Message::Payload(item))
                }
                None => None,
            };

            return Ok(message);
        }

        let message = match self.header_decoder.decode(src)? {
            Some(head) => {
                self.payload_decoder = Some(head.encapsulated().into());
                Some(Message::Header(head))
            }
            None => None,
        };

        Ok(message)
    }
}
