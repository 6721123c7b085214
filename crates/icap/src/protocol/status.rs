use std::fmt;

use crate::protocol::ParseError;

/// An ICAP status code.
///
/// ICAP borrows most of its codes from HTTP but gives some of them different reason
/// phrases, so [`http::StatusCode`] is not reused here.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct IcapStatus(u16);

impl IcapStatus {
    pub const CONTINUE: IcapStatus = IcapStatus(100);
    pub const OK: IcapStatus = IcapStatus(200);
    pub const NO_CONTENT: IcapStatus = IcapStatus(204);
    pub const BAD_REQUEST: IcapStatus = IcapStatus(400);
    pub const NOT_FOUND: IcapStatus = IcapStatus(404);
    pub const METHOD_NOT_ALLOWED: IcapStatus = IcapStatus(405);
    pub const REQUEST_TIMEOUT: IcapStatus = IcapStatus(408);
    pub const INTERNAL_SERVER_ERROR: IcapStatus = IcapStatus(500);

    pub fn from_u16(code: u16) -> Result<Self, ParseError> {
        if (100..600).contains(&code) { Ok(IcapStatus(code)) } else { Err(ParseError::InvalidStatus(code)) }
    }

    #[inline]
    pub fn as_u16(&self) -> u16 {
        self.0
    }

    /// Reason phrase used on the status line.
    pub fn reason(&self) -> &'static str {
        match self.0 {
            100 => "Continue",
            200 => "OK",
            204 => "No Content",
            400 => "Bad Request",
            404 => "ICAP Service Not Found",
            405 => "Method Not Allowed For Service",
            408 => "Request Timeout",
            500 => "Server Error",
            501 => "Method Not Implemented",
            502 => "Bad Gateway",
            503 => "Service Overloaded",
            505 => "ICAP Version Not Supported",
            _ => "Unknown",
        }
    }
}

impl fmt::Display for IcapStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.0, self.reason())
    }
}
