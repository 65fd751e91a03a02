//! Zero-copy HTTP request representation.
//!
//! All fields are views into buffers owned by the connection (read buffer,
//! chunked/decompressed body storage, decoded-path scratch); a request value
//! therefore cannot outlive the processing window of the request it
//! describes.

use crate::errors::ProtocolError;
use crate::http::headers::HeadersView;
use crate::http::method::Method;
use crate::http::query::QueryPairs;
use crate::http::version::Version;
use memchr::memchr;

/// A captured path parameter (`{name}` or `{}` route segments).
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct PathParam<'a> {
    pub key: &'a str,
    pub value: &'a str,
}

/// A fully decoded HTTP request, passed by reference to handlers and
/// middleware.
#[derive(Debug, Clone)]
pub struct HttpRequest<'a> {
    pub(crate) method: Method,
    pub(crate) target: &'a [u8],
    pub(crate) path: &'a str,
    pub(crate) query: Option<&'a [u8]>,
    pub(crate) version: Version,
    pub(crate) headers: HeadersView<'a>,
    pub(crate) body: &'a [u8],
    pub(crate) trailers: HeadersView<'a>,
    pub(crate) path_params: &'a [PathParam<'a>],
}

impl<'a> HttpRequest<'a> {
    #[inline(always)]
    pub const fn method(&self) -> Method {
        self.method
    }

    /// Raw request target as received (path + query, percent-encoded).
    #[inline(always)]
    pub const fn target(&self) -> &'a [u8] {
        self.target
    }

    /// Percent-decoded path component, without the query string.
    #[inline(always)]
    pub const fn path(&self) -> &'a str {
        self.path
    }

    /// Raw query string without the leading `?`, if present.
    #[inline(always)]
    pub const fn query(&self) -> Option<&'a [u8]> {
        self.query
    }

    /// Iterates raw `key=value` query pairs.
    #[inline]
    pub fn query_pairs(&self) -> QueryPairs<'a> {
        QueryPairs::new(self.query.unwrap_or(b""))
    }

    #[inline(always)]
    pub const fn version(&self) -> Version {
        self.version
    }

    /// Returns a header value with case-insensitive name matching.
    #[inline]
    pub fn header(&self, name: &[u8]) -> Option<&'a [u8]> {
        self.headers.get(name)
    }

    #[inline(always)]
    pub const fn headers(&self) -> &HeadersView<'a> {
        &self.headers
    }

    /// Request body. For chunked requests this is the de-chunked payload;
    /// when request decompression applies it is the decompressed payload.
    #[inline(always)]
    pub const fn body(&self) -> &'a [u8] {
        self.body
    }

    /// Returns a trailer value with case-insensitive name matching.
    #[inline]
    pub fn trailer(&self, name: &[u8]) -> Option<&'a [u8]> {
        self.trailers.get(name)
    }

    #[inline(always)]
    pub const fn trailers(&self) -> &HeadersView<'a> {
        &self.trailers
    }

    /// Captured path parameters in route order.
    #[inline(always)]
    pub const fn path_params(&self) -> &'a [PathParam<'a>] {
        self.path_params
    }

    /// Looks up a captured path parameter by key. Anonymous captures use
    /// their zero-based index rendered in decimal (`"0"`, `"1"`, ...).
    #[inline]
    pub fn path_param(&self, key: &str) -> Option<&'a str> {
        self.path_params
            .iter()
            .find(|p| p.key == key)
            .map(|p| p.value)
    }
}

/// Splits a request target into path and query at the first `?`.
#[inline]
pub(crate) fn split_target(target: &[u8]) -> (&[u8], Option<&[u8]>) {
    match memchr(b'?', target) {
        Some(pos) => (&target[..pos], Some(&target[pos + 1..])),
        None => (target, None),
    }
}

/// Percent-decodes a path component into `out`.
///
/// Rejects truncated or non-hex escapes. `+` is left as-is (it only means
/// space in form encoding, not in paths).
pub(crate) fn percent_decode_path(raw: &[u8], out: &mut Vec<u8>) -> Result<(), ProtocolError> {
    out.clear();
    out.reserve(raw.len());
    let mut idx = 0;
    while idx < raw.len() {
        let byte = raw[idx];
        if byte == b'%' {
            let hi = hex_val(*raw.get(idx + 1).ok_or(ProtocolError::BadPath)?)?;
            let lo = hex_val(*raw.get(idx + 2).ok_or(ProtocolError::BadPath)?)?;
            out.push((hi << 4) | lo);
            idx += 3;
        } else {
            out.push(byte);
            idx += 1;
        }
    }
    Ok(())
}

#[inline]
fn hex_val(byte: u8) -> Result<u8, ProtocolError> {
    match byte {
        b'0'..=b'9' => Ok(byte - b'0'),
        b'a'..=b'f' => Ok(10 + byte - b'a'),
        b'A'..=b'F' => Ok(10 + byte - b'A'),
        _ => Err(ProtocolError::BadPath),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_split() {
        #[rustfmt::skip]
        let cases: [(&[u8], (&[u8], Option<&[u8]>)); 4] = [
            (b"/a/b",       (b"/a/b", None)),
            (b"/a?x=1",     (b"/a", Some(b"x=1"))),
            (b"/a?",        (b"/a", Some(b""))),
            (b"/a?x=1?y=2", (b"/a", Some(b"x=1?y=2"))),
        ];

        for (target, expected) in cases {
            assert_eq!(split_target(target), expected);
        }
    }

    #[test]
    fn percent_decoding() {
        #[rustfmt::skip]
        let cases: [(&[u8], Result<&[u8], ProtocolError>); 7] = [
            (b"/plain",        Ok(b"/plain")),
            (b"/a%20b",        Ok(b"/a b")),
            (b"/%2Fesc",       Ok(b"//esc")),
            (b"/caf%C3%A9",    Ok("/caf\u{e9}".as_bytes())),
            (b"/bad%2",        Err(ProtocolError::BadPath)),
            (b"/bad%zz",       Err(ProtocolError::BadPath)),
            (b"/plus+stays",   Ok(b"/plus+stays")),
        ];

        for (raw, expected) in cases {
            let mut out = Vec::new();
            let result = percent_decode_path(raw, &mut out).map(|_| out.as_slice());
            assert_eq!(result, expected, "{:?}", raw);
        }
    }
}
