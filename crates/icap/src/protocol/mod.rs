//! Core ICAP protocol types.
//!
//! - **Messages** ([`message`]): [`Message`] and [`PayloadItem`], the unit exchanged
//!   between the codecs and the connection layer
//! - **Request line and status** ([`Method`], [`IcapStatus`])
//! - **Layout** ([`Encapsulated`]): section offsets of the encapsulated HTTP message
//! - **Heads** ([`RequestHeader`], [`ResponseHead`]) and the HTTP heads they carry
//!   ([`HttpEnvelope`])
//! - **Errors** ([`IcapError`], [`ParseError`], [`SendError`], [`ClientError`])

mod message;
pub use message::Message;
pub use message::PayloadItem;

mod method;
pub use method::Method;

mod status;
pub use status::IcapStatus;

mod encapsulated;
pub use encapsulated::Encapsulated;
pub use encapsulated::Layout;
pub use encapsulated::Section;
pub use encapsulated::SectionKind;

mod envelope;
pub use envelope::HttpEnvelope;
pub use envelope::clone_request;
pub use envelope::clone_response;

mod request;
pub use request::ALLOW_204_VALUE;
pub use request::IcapRequest;
pub use request::RequestHeader;

mod response;
pub use response::IcapResponse;
pub use response::ResponseBuilder;
pub use response::ResponseHead;

mod error;
pub use error::ClientError;
pub use error::IcapError;
pub use error::ParseError;
pub use error::SendError;

pub mod headers;
