//! Header names used by ICAP on top of the standard HTTP ones.
//!
//! [`http::HeaderMap`] keeps names in lowercase; [`canonical_name`] restores the
//! conventional wire spelling when a header block is written.

use bytes::BufMut;
use http::HeaderName;

pub const ENCAPSULATED: HeaderName = HeaderName::from_static("encapsulated");
pub const ISTAG: HeaderName = HeaderName::from_static("istag");
pub const SERVICE: HeaderName = HeaderName::from_static("service");
pub const METHODS: HeaderName = HeaderName::from_static("methods");
pub const PREVIEW: HeaderName = HeaderName::from_static("preview");
pub const TRANSFER_PREVIEW: HeaderName = HeaderName::from_static("transfer-preview");
pub const X_ICAP_METADATA: HeaderName = HeaderName::from_static("x-icap-metadata");

/// Writes `name` in `Title-Case`, keeping the irregular spellings ICAP peers expect.
pub fn canonical_name<B: BufMut>(name: &HeaderName, out: &mut B) {
    let lower = name.as_str();
    match lower {
        "istag" => return out.put_slice(b"ISTag"),
        "x-icap-metadata" => return out.put_slice(b"X-ICAP-Metadata"),
        _ => {}
    }

    let mut upper_next = true;
    for b in lower.bytes() {
        out.put_u8(if upper_next { b.to_ascii_uppercase() } else { b });
        upper_next = b == b'-';
    }
}
