//! Streaming codecs for ICAP messages.
//!
//! Each direction is a [`Decoder`](tokio_util::codec::Decoder) or
//! [`Encoder`](tokio_util::codec::Encoder) over [`Message`](crate::protocol::Message):
//! a head first, then the chunked body when the `Encapsulated` header announces one.
//!
//! - Server side: [`RequestDecoder`] and [`ResponseEncoder`]
//! - Client side: [`RequestEncoder`] and [`ResponseDecoder`]
//!
//! ```no_run
//! use micro_icap::codec::RequestDecoder;
//! use tokio_util::codec::Decoder;
//! use bytes::BytesMut;
//!
//! let mut decoder = RequestDecoder::new();
//! let mut buffer = BytesMut::from("OPTIONS icap://localhost/echo ICAP/1.0\r\nHost: localhost\r\n\r\n");
//! let header = decoder.decode(&mut buffer);
//! ```

mod body;
mod header;
mod request_decoder;
mod request_encoder;
mod response_decoder;
mod response_encoder;

pub use body::ChunkedDecoder;
pub use body::ChunkedEncoder;
pub use body::PayloadDecoder;
pub use body::chunk;
pub use body::dechunk;
pub use header::HeaderEncoder;
pub use header::RequestHeadDecoder;
pub use header::ResponseHeadDecoder;
pub use header::encoded_layout;
pub use request_decoder::RequestDecoder;
pub use request_encoder::RequestEncoder;
pub use response_decoder::ResponseDecoder;
pub use response_encoder::ResponseEncoder;
