//! The `Encapsulated` header.
//!
//! Every REQMOD/RESPMOD message, and every response carrying HTTP content, describes the
//! layout of its encapsulated region with a list of `tag=offset` pairs:
//!
//! ```text
//! Encapsulated: req-hdr=0, res-hdr=137, res-body=296
//! ```
//!
//! Offsets are byte positions relative to the first byte after the ICAP header block.
//! Header sections occupy the bytes up to the next declared offset; the final tag always
//! names the body (or `null-body` when there is none), and the body itself is chunked.

use std::fmt;
use std::str::FromStr;

use crate::ensure;
use crate::protocol::{Method, ParseError};

/// The section tags allowed in an `Encapsulated` header.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum SectionKind {
    ReqHdr,
    ReqBody,
    ResHdr,
    ResBody,
    OptBody,
    NullBody,
}

impl SectionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SectionKind::ReqHdr => "req-hdr",
            SectionKind::ReqBody => "req-body",
            SectionKind::ResHdr => "res-hdr",
            SectionKind::ResBody => "res-body",
            SectionKind::OptBody => "opt-body",
            SectionKind::NullBody => "null-body",
        }
    }

    /// True for the tags that may terminate the list.
    #[inline]
    pub fn is_body(&self) -> bool {
        !matches!(self, SectionKind::ReqHdr | SectionKind::ResHdr)
    }

    /// Position of the tag in the mandatory request-then-response ordering.
    fn rank(self) -> u8 {
        match self {
            SectionKind::ReqHdr => 0,
            SectionKind::ReqBody => 1,
            SectionKind::ResHdr => 2,
            SectionKind::ResBody | SectionKind::OptBody | SectionKind::NullBody => 3,
        }
    }
}

impl FromStr for SectionKind {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "req-hdr" => Ok(SectionKind::ReqHdr),
            "req-body" => Ok(SectionKind::ReqBody),
            "res-hdr" => Ok(SectionKind::ResHdr),
            "res-body" => Ok(SectionKind::ResBody),
            "opt-body" => Ok(SectionKind::OptBody),
            "null-body" => Ok(SectionKind::NullBody),
            tag => Err(ParseError::invalid_encapsulated(format!("unknown tag '{tag}'"))),
        }
    }
}

/// One `tag=offset` entry.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Section {
    pub kind: SectionKind,
    pub offset: usize,
}

impl Section {
    pub const fn new(kind: SectionKind, offset: usize) -> Self {
        Self { kind, offset }
    }
}

/// Which parts of an encapsulated message are present, with the serialized length of
/// each header block (including its terminating blank line).
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct Layout {
    pub req_hdr: Option<usize>,
    /// Length of a request body placed ahead of the response header. Only laid out when
    /// `res_hdr` is present; otherwise the terminal tag carries the body.
    pub req_body: Option<usize>,
    pub res_hdr: Option<usize>,
    pub body: bool,
}

/// A validated section list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Encapsulated {
    sections: Vec<Section>,
}

impl Encapsulated {
    /// `null-body=0`, the layout of a message without encapsulated content.
    pub fn null_body() -> Self {
        Self { sections: vec![Section::new(SectionKind::NullBody, 0)] }
    }

    /// Computes the section list for a message about to be written.
    ///
    /// OPTIONS messages only ever carry `opt-body=0` or `null-body=0`. For the adaptation
    /// methods the request header precedes the response header, and the body tag belongs
    /// to the last header present (REQMOD defaults to `req-body`, RESPMOD to `res-body`).
    /// A RESPMOD message may also carry the request body between the two headers.
    pub fn compute(method: Method, layout: &Layout) -> Self {
        if method == Method::Options {
            let kind = if layout.body { SectionKind::OptBody } else { SectionKind::NullBody };
            return Self { sections: vec![Section::new(kind, 0)] };
        }

        let mut sections = Vec::with_capacity(4);
        let mut offset = 0;

        if let Some(len) = layout.req_hdr {
            sections.push(Section::new(SectionKind::ReqHdr, offset));
            offset += len;
        }

        if let (Some(len), Some(_)) = (layout.req_body, layout.res_hdr) {
            sections.push(Section::new(SectionKind::ReqBody, offset));
            offset += len;
        }

        if let Some(len) = layout.res_hdr {
            sections.push(Section::new(SectionKind::ResHdr, offset));
            offset += len;
        }

        let body_kind = match (layout.body, layout.res_hdr, layout.req_hdr, method) {
            (false, ..) => SectionKind::NullBody,
            (true, Some(_), _, _) => SectionKind::ResBody,
            (true, None, Some(_), _) => SectionKind::ReqBody,
            (true, None, None, Method::Respmod) => SectionKind::ResBody,
            (true, None, None, _) => SectionKind::ReqBody,
        };
        sections.push(Section::new(body_kind, offset));

        Self { sections }
    }

    /// Parses and validates an `Encapsulated` header value.
    ///
    /// Rejects unknown tags, malformed or negative offsets, offsets that do not strictly
    /// increase, tags out of request-then-response order, and lists that do not end with a
    /// body tag. A `req-body` may only appear before the end of the list when a `res-hdr`
    /// follows it.
    pub fn parse(value: &str) -> Result<Self, ParseError> {
        let mut sections: Vec<Section> = Vec::with_capacity(4);

        for token in value.split(',') {
            let token = token.trim();
            ensure!(!token.is_empty(), ParseError::invalid_encapsulated("empty entry"));

            let (tag, offset) =
                token.split_once('=').ok_or_else(|| ParseError::invalid_encapsulated(format!("missing '=' in '{token}'")))?;
            let kind = tag.trim().parse::<SectionKind>()?;
            let offset = offset
                .trim()
                .parse::<usize>()
                .map_err(|_| ParseError::invalid_encapsulated(format!("invalid offset in '{token}'")))?;

            if let Some(prev) = sections.last() {
                ensure!(
                    offset > prev.offset,
                    ParseError::invalid_encapsulated(format!("offset of {} does not follow {}", kind.as_str(), prev.kind.as_str()))
                );
                ensure!(
                    kind.rank() > prev.kind.rank(),
                    ParseError::invalid_encapsulated(format!("{} may not follow {}", kind.as_str(), prev.kind.as_str()))
                );
                ensure!(
                    !prev.kind.is_body() || (prev.kind == SectionKind::ReqBody && kind == SectionKind::ResHdr),
                    ParseError::invalid_encapsulated(format!("{} after body section {}", kind.as_str(), prev.kind.as_str()))
                );
            }

            sections.push(Section::new(kind, offset));
        }

        match sections.last() {
            Some(last) if last.kind.is_body() => Ok(Self { sections }),
            _ => Err(ParseError::invalid_encapsulated("missing terminal body tag")),
        }
    }

    #[inline]
    pub fn sections(&self) -> &[Section] {
        &self.sections
    }

    /// The terminal section. A validated list always has one.
    pub fn body(&self) -> Section {
        // both constructors guarantee a non-empty list
        self.sections.last().copied().unwrap_or(Section::new(SectionKind::NullBody, 0))
    }

    /// True when a chunked body follows the header sections.
    #[inline]
    pub fn has_body(&self) -> bool {
        self.body().kind != SectionKind::NullBody
    }

    /// Byte range of the section of `kind`, ending at the next declared offset.
    pub fn range_of(&self, kind: SectionKind) -> Option<(usize, usize)> {
        let position = self.sections.iter().position(|s| s.kind == kind)?;
        let start = self.sections[position].offset;
        let end = self.sections.get(position + 1).map_or(start, |next| next.offset);
        Some((start, end))
    }
}

impl fmt::Display for Encapsulated {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, section) in self.sections.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}={}", section.kind.as_str(), section.offset)?;
        }
        Ok(())
    }
}
