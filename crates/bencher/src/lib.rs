//! Sample ICAP requests for the codec benchmarks.

/// One raw ICAP request, exactly as a client would put it on the wire.
#[derive(Debug, Copy, Clone)]
pub struct Sample {
    name: &'static str,
    content: &'static str,
    kind: SampleKind,
}

/// What the sample mostly consists of.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SampleKind {
    HeadOnly,
    SmallBody,
    LargeBody,
}

impl Sample {
    pub const fn new(name: &'static str, kind: SampleKind, content: &'static str) -> Self {
        Self { name, content, kind }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn content(&self) -> &'static str {
        self.content
    }

    pub fn kind(&self) -> SampleKind {
        self.kind
    }

    pub fn len(&self) -> usize {
        self.content.len()
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }
}

pub static OPTIONS: Sample = Sample::new("options", SampleKind::HeadOnly, include_str!("../resources/request/options.txt"));
pub static REQMOD_POST: Sample =
    Sample::new("reqmod_post", SampleKind::SmallBody, include_str!("../resources/request/reqmod_post.txt"));
pub static RESPMOD_SMALL: Sample =
    Sample::new("respmod_small", SampleKind::SmallBody, include_str!("../resources/request/respmod_small.txt"));
pub static RESPMOD_LARGE: Sample =
    Sample::new("respmod_large", SampleKind::LargeBody, include_str!("../resources/request/respmod_large.txt"));

pub fn samples() -> [Sample; 4] {
    [OPTIONS, REQMOD_POST, RESPMOD_SMALL, RESPMOD_LARGE]
}
