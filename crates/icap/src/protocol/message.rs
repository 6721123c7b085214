use bytes::{Buf, Bytes};

/// Represents an ICAP message that can either be a head or a piece of the chunked body.
///
/// Decoders yield one `Header` followed by `Payload` items until an end marker; encoders
/// accept the same sequence.
pub enum Message<T, Data: Buf = Bytes> {
    /// Contains the head of type `T`
    Header(T),
    /// Contains a chunk of body data or an end marker
    Payload(PayloadItem<Data>),
}

/// Represents an item in the chunked body stream of an ICAP message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PayloadItem<Data: Buf = Bytes> {
    /// A chunk of body data
    Chunk(Data),
    /// The zero-length chunk terminating the body, or the current preview
    Eof,
    /// The zero-length chunk carrying the `ieof` extension: the preview held the whole body
    Ieof,
}

impl<T> Message<T> {
    #[inline]
    pub fn is_payload(&self) -> bool {
        matches!(self, Message::Payload(_))
    }

    #[inline]
    pub fn is_header(&self) -> bool {
        matches!(self, Message::Header(_))
    }

    /// Converts the message into a PayloadItem if it contains payload data
    ///
    /// Returns None if the message contains header information
    pub fn into_payload_item(self) -> Option<PayloadItem> {
        match self {
            Message::Header(_) => None,
            Message::Payload(payload_item) => Some(payload_item),
        }
    }
}

impl<T> From<Bytes> for Message<T> {
    fn from(bytes: Bytes) -> Self {
        Self::Payload(PayloadItem::Chunk(bytes))
    }
}

impl<D: Buf> PayloadItem<D> {
    /// Returns true for both end markers
    #[inline]
    pub fn is_eof(&self) -> bool {
        matches!(self, PayloadItem::Eof | PayloadItem::Ieof)
    }

    #[inline]
    pub fn is_ieof(&self) -> bool {
        matches!(self, PayloadItem::Ieof)
    }

    #[inline]
    pub fn is_chunk(&self) -> bool {
        matches!(self, PayloadItem::Chunk(_))
    }
}

impl PayloadItem {
    /// Returns a reference to the contained bytes if this is a Chunk
    pub fn as_bytes(&self) -> Option<&Bytes> {
        match self {
            PayloadItem::Chunk(bytes) => Some(bytes),
            PayloadItem::Eof | PayloadItem::Ieof => None,
        }
    }

    /// Consumes the PayloadItem and returns the contained bytes if this is a Chunk
    pub fn into_bytes(self) -> Option<Bytes> {
        match self {
            PayloadItem::Chunk(bytes) => Some(bytes),
            PayloadItem::Eof | PayloadItem::Ieof => None,
        }
    }
}
