use std::io;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IcapError {
    #[error("request error: {source}")]
    RequestError {
        #[from]
        source: ParseError,
    },

    #[error("response error: {source}")]
    ResponseError {
        #[from]
        source: SendError,
    },

    #[error("preview violation: {reason}")]
    PreviewViolation { reason: String },
}

impl IcapError {
    pub fn preview_violation<S: ToString>(str: S) -> Self {
        Self::PreviewViolation { reason: str.to_string() }
    }

    /// True for the errors the peer caused, which are answered with `400 Bad Request`.
    pub fn is_client_fault(&self) -> bool {
        match self {
            IcapError::RequestError { source } => !matches!(source, ParseError::Io { .. }),
            IcapError::PreviewViolation { .. } => true,
            IcapError::ResponseError { .. } => false,
        }
    }
}

#[derive(Error, Debug)]
pub enum ParseError {
    #[error("header size too large, current: {current_size} exceed the limit {max_size}")]
    TooLargeHeader { current_size: usize, max_size: usize },

    #[error("header number exceed the limit {max_num}")]
    TooManyHeaders { max_num: usize },

    #[error("invalid header: {reason}")]
    InvalidHeader { reason: String },

    #[error("invalid request line: {reason}")]
    InvalidStartLine { reason: String },

    #[error("invalid icap version: {0}")]
    InvalidVersion(String),

    #[error("invalid icap method")]
    InvalidMethod,

    #[error("invalid icap uri")]
    InvalidUri,

    #[error("invalid icap status: {0}")]
    InvalidStatus(u16),

    #[error("invalid encapsulated header: {reason}")]
    InvalidEncapsulated { reason: String },

    #[error("invalid encapsulated http message: {reason}")]
    InvalidHttpMessage { reason: String },

    #[error("invalid chunked body: {reason}")]
    InvalidBody { reason: String },

    #[error("io error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },
}

impl ParseError {
    pub fn too_large_header(current_size: usize, max_size: usize) -> Self {
        Self::TooLargeHeader { current_size, max_size }
    }

    pub fn too_many_headers(max_num: usize) -> Self {
        Self::TooManyHeaders { max_num }
    }

    pub fn invalid_header<S: ToString>(str: S) -> Self {
        Self::InvalidHeader { reason: str.to_string() }
    }

    pub fn invalid_start_line<S: ToString>(str: S) -> Self {
        Self::InvalidStartLine { reason: str.to_string() }
    }

    pub fn invalid_encapsulated<S: ToString>(str: S) -> Self {
        Self::InvalidEncapsulated { reason: str.to_string() }
    }

    pub fn invalid_http_message<S: ToString>(str: S) -> Self {
        Self::InvalidHttpMessage { reason: str.to_string() }
    }

    pub fn invalid_body<S: ToString>(str: S) -> Self {
        Self::InvalidBody { reason: str.to_string() }
    }

    pub fn io<E: Into<io::Error>>(e: E) -> Self {
        Self::Io { source: e.into() }
    }
}

#[derive(Error, Debug)]
pub enum SendError {
    #[error("invalid message: {reason}")]
    InvalidMessage { reason: String },

    #[error("io error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },
}

impl SendError {
    pub fn invalid_message<S: ToString>(str: S) -> Self {
        Self::InvalidMessage { reason: str.to_string() }
    }

    pub fn io<E: Into<io::Error>>(e: E) -> Self {
        Self::Io { source: e.into() }
    }
}

/// Failures of an outbound exchange with a remote ICAP server.
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("invalid endpoint: {reason}")]
    InvalidEndpoint { reason: String },

    #[error("connect to {address} failed: {source}")]
    Connect { address: String, source: io::Error },

    #[error("no response within {0:?}")]
    Timeout(Duration),

    #[error("send request error: {source}")]
    Send {
        #[from]
        source: SendError,
    },

    #[error("read response error: {source}")]
    Receive {
        #[from]
        source: ParseError,
    },

    #[error("connection closed before the response completed")]
    ConnectionClosed,

    #[error("unexpected response: {reason}")]
    UnexpectedResponse { reason: String },
}

impl ClientError {
    pub fn invalid_endpoint<S: ToString>(str: S) -> Self {
        Self::InvalidEndpoint { reason: str.to_string() }
    }

    pub fn unexpected_response<S: ToString>(str: S) -> Self {
        Self::UnexpectedResponse { reason: str.to_string() }
    }

    #[inline]
    pub fn is_timeout(&self) -> bool {
        matches!(self, ClientError::Timeout(_))
    }
}
