use std::fmt;
use std::str::FromStr;

use crate::protocol::ParseError;

/// The three request methods defined by RFC 3507.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Method {
    Options,
    Reqmod,
    Respmod,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Options => "OPTIONS",
            Method::Reqmod => "REQMOD",
            Method::Respmod => "RESPMOD",
        }
    }

    /// Returns true for the two adaptation methods, which carry an encapsulated HTTP message.
    #[inline]
    pub fn is_modification(&self) -> bool {
        matches!(self, Method::Reqmod | Method::Respmod)
    }
}

impl FromStr for Method {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "OPTIONS" => Ok(Method::Options),
            "REQMOD" => Ok(Method::Reqmod),
            "RESPMOD" => Ok(Method::Respmod),
            _ => Err(ParseError::InvalidMethod),
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
