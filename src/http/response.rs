//! HTTP response builder with a flat pre-formatted header buffer.

use crate::http::date::DateCache;
use crate::http::status::StatusCode;
use crate::http::version::Version;
use memchr::memchr;
use std::fs::File;
use std::io;
use std::ops::Range;

/// Headers the engine owns end to end; setting them from handler code is a
/// usage error caught in debug builds.
#[rustfmt::skip]
const RESERVED_HEADERS: &[&str] = &[
    "connection", "content-length", "date", "transfer-encoding",
];

#[inline]
fn is_reserved(name: &str) -> bool {
    RESERVED_HEADERS.iter().any(|r| name.eq_ignore_ascii_case(r))
}

#[derive(Debug)]
pub(crate) enum Body {
    Empty,
    Bytes(Vec<u8>),
    /// Open file streamed after the header block; length fixed at capture.
    File(File, u64),
}

/// A buffered HTTP response produced by handlers and middleware.
///
/// Headers are stored as pre-formatted `Name: Value\r\n` lines in one flat
/// buffer: insertion appends, replacement edits the line in place and keeps
/// the casing of the first insertion.
///
/// ```
/// use arbor_web::{HttpResponse, StatusCode};
///
/// let resp = HttpResponse::new(StatusCode::OK)
///     .with_content_type("text/plain")
///     .with_body("hello");
/// ```
#[derive(Debug)]
pub struct HttpResponse {
    status: StatusCode,
    reason: Option<String>,
    head: Vec<u8>,
    pub(crate) body: Body,
    pub(crate) trailers: Vec<(String, String)>,
}

impl Default for HttpResponse {
    fn default() -> Self {
        Self::new(StatusCode::OK)
    }
}

impl HttpResponse {
    #[inline]
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            reason: None,
            head: Vec::new(),
            body: Body::Empty,
            trailers: Vec::new(),
        }
    }

    #[inline]
    pub const fn status(&self) -> StatusCode {
        self.status
    }

    #[inline]
    pub fn set_status(&mut self, status: StatusCode) {
        self.status = status;
    }

    /// Overrides the canonical reason phrase.
    #[inline]
    pub fn set_reason(&mut self, reason: impl Into<String>) {
        self.reason = Some(reason.into());
    }

    /// Appends a header line without scanning for duplicates.
    ///
    /// # Panics
    /// Panics in debug mode when `name` is a reserved header
    /// (`Date`, `Content-Length`, `Connection`, `Transfer-Encoding`).
    #[track_caller]
    pub fn add_header(&mut self, name: &str, value: &str) {
        debug_assert!(!is_reserved(name), "reserved header: {name}");
        self.head.extend_from_slice(name.as_bytes());
        self.head.extend_from_slice(b": ");
        self.head.extend_from_slice(value.as_bytes());
        self.head.extend_from_slice(b"\r\n");
    }

    /// Sets or replaces a header, keeping at most one instance.
    ///
    /// The scan is case-insensitive; on replacement the value is edited in
    /// place and the original casing of the first insertion is preserved.
    ///
    /// # Panics
    /// Panics in debug mode when `name` is a reserved header.
    #[track_caller]
    pub fn set_header(&mut self, name: &str, value: &str) {
        debug_assert!(!is_reserved(name), "reserved header: {name}");
        match self.find_value_range(name.as_bytes()) {
            Some(range) => {
                self.head.splice(range, value.bytes());
            }
            None => self.add_header(name, value),
        }
    }

    /// Returns the value of the first header with this name.
    pub fn header(&self, name: &str) -> Option<&[u8]> {
        self.find_value_range(name.as_bytes())
            .map(|range| &self.head[range])
    }

    /// Removes every header line with this name. Returns true if any was
    /// removed.
    pub fn remove_header(&mut self, name: &str) -> bool {
        let mut removed = false;
        while let Some(range) = self.find_line_range(name.as_bytes()) {
            self.head.drain(range);
            removed = true;
        }
        removed
    }

    /// Sets the response body.
    ///
    /// # Panics
    /// Panics in debug mode when trailers were already added (the body is
    /// frozen at that point).
    #[track_caller]
    pub fn set_body(&mut self, body: impl Into<Vec<u8>>) {
        debug_assert!(self.trailers.is_empty(), "body is frozen once trailers are added");
        self.body = Body::Bytes(body.into());
    }

    /// Installs an open file as the response payload. Its current length is
    /// captured and used as `Content-Length`.
    #[track_caller]
    pub fn set_file(&mut self, file: File) -> io::Result<()> {
        debug_assert!(self.trailers.is_empty(), "body is frozen once trailers are added");
        let len = file.metadata()?.len();
        self.body = Body::File(file, len);
        Ok(())
    }

    /// Appends a trailer, switching the response to chunked framing on
    /// serialization (HTTP/1.1 only; trailers are dropped for 1.0 peers).
    pub fn add_trailer(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.trailers.push((name.into(), value.into()));
    }

    // Consuming builder conveniences.

    #[inline]
    #[track_caller]
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.add_header(name, value);
        self
    }

    #[inline]
    pub fn with_content_type(mut self, content_type: &str) -> Self {
        self.set_header("Content-Type", content_type);
        self
    }

    #[inline]
    #[track_caller]
    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.set_body(body);
        self
    }

    #[inline]
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.set_reason(reason);
        self
    }

    #[inline]
    pub fn with_trailer(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.add_trailer(name, value);
        self
    }

    #[inline]
    pub(crate) fn body_len(&self) -> u64 {
        match &self.body {
            Body::Empty => 0,
            Body::Bytes(bytes) => bytes.len() as u64,
            Body::File(_, len) => *len,
        }
    }

    #[inline]
    pub(crate) fn body_bytes(&self) -> Option<&[u8]> {
        match &self.body {
            Body::Empty => Some(b""),
            Body::Bytes(bytes) => Some(bytes),
            Body::File(..) => None,
        }
    }

    #[inline]
    pub(crate) fn head_bytes(&self) -> &[u8] {
        &self.head
    }

    #[inline]
    pub(crate) fn reason_str(&self) -> Option<&str> {
        self.reason.as_deref()
    }

    /// Raw header append without the reserved-name check; used for
    /// engine-owned merges (global headers).
    pub(crate) fn push_raw_header(&mut self, name: &str, value: &str) {
        self.head.extend_from_slice(name.as_bytes());
        self.head.extend_from_slice(b": ");
        self.head.extend_from_slice(value.as_bytes());
        self.head.extend_from_slice(b"\r\n");
    }

    /// Appends a token to the `Vary` header, deduplicating against tokens
    /// already present.
    pub(crate) fn append_vary(&mut self, token: &str) {
        match self.header("Vary") {
            None => self.set_header("Vary", token),
            Some(existing) => {
                fn trim(mut bytes: &[u8]) -> &[u8] {
                    while let [b' ' | b'\t', rest @ ..] = bytes {
                        bytes = rest;
                    }
                    while let [rest @ .., b' ' | b'\t'] = bytes {
                        bytes = rest;
                    }
                    bytes
                }
                let already = existing
                    .split(|&b| b == b',')
                    .map(trim)
                    .any(|t| t.eq_ignore_ascii_case(token.as_bytes()));
                if !already {
                    let mut value = existing.to_vec();
                    value.extend_from_slice(b", ");
                    value.extend_from_slice(token.as_bytes());
                    let value = String::from_utf8_lossy(&value).into_owned();
                    self.set_header("Vary", &value);
                }
            }
        }
    }

    fn find_line_range(&self, name: &[u8]) -> Option<Range<usize>> {
        let mut pos = 0;
        while pos < self.head.len() {
            let nl = memchr(b'\n', &self.head[pos..])?;
            let line_end = pos + nl + 1;
            let line = &self.head[pos..line_end];
            if let Some(colon) = memchr(b':', line) {
                if line[..colon].eq_ignore_ascii_case(name) {
                    return Some(pos..line_end);
                }
            }
            pos = line_end;
        }
        None
    }

    fn find_value_range(&self, name: &[u8]) -> Option<Range<usize>> {
        let line = self.find_line_range(name)?;
        let colon = line.start + memchr(b':', &self.head[line.clone()])?;
        let mut value_start = colon + 1;
        while value_start < line.end && self.head[value_start] == b' ' {
            value_start += 1;
        }
        // strip the trailing CRLF
        Some(value_start..line.end - 2)
    }
}

/// Environment for response serialization, owned by the connection.
pub(crate) struct EncodeEnv<'a> {
    pub(crate) version: Version,
    pub(crate) date: &'a mut DateCache,
    /// `Some("close")` / `Some("keep-alive")`; `None` omits the header.
    pub(crate) connection: Option<&'static str>,
    pub(crate) head_request: bool,
    pub(crate) global_headers: &'a [(String, String)],
}

/// What is left to send after the serialized prefix: nothing, or a file
/// payload the connection streams itself.
pub(crate) enum BodyPlan {
    Done,
    FilePayload(File, u64),
}

impl HttpResponse {
    /// Serializes the response into `out`.
    ///
    /// Order: status line, `Date`, user headers (insertion order, original
    /// casing), global headers not shadowed by the handler, framing headers,
    /// CRLF, body. Chunked framing is used only when trailers are present
    /// (HTTP/1.1 peers); otherwise `Content-Length` framing applies.
    pub(crate) fn encode_into(mut self, out: &mut Vec<u8>, env: EncodeEnv<'_>) -> BodyPlan {
        let chunked = !self.trailers.is_empty() && env.version == Version::Http11 && !env.head_request;

        out.extend_from_slice(env.version.as_str().as_bytes());
        out.push(b' ');
        let mut code = itoa::Buffer::new();
        out.extend_from_slice(code.format(self.status.as_u16()).as_bytes());
        out.push(b' ');
        match &self.reason {
            Some(reason) => out.extend_from_slice(reason.as_bytes()),
            None => out.extend_from_slice(self.status.canonical_reason().as_bytes()),
        }
        out.extend_from_slice(b"\r\n");

        out.extend_from_slice(b"Date: ");
        out.extend_from_slice(env.date.value().as_bytes());
        out.extend_from_slice(b"\r\n");

        for (name, value) in env.global_headers {
            if self.header(name).is_none() {
                self.push_raw_header(name, value);
            }
        }
        out.extend_from_slice(&self.head);

        if chunked {
            out.extend_from_slice(b"Transfer-Encoding: chunked\r\n");
        } else {
            out.extend_from_slice(b"Content-Length: ");
            let mut len = itoa::Buffer::new();
            out.extend_from_slice(len.format(self.body_len()).as_bytes());
            out.extend_from_slice(b"\r\n");
        }
        if let Some(connection) = env.connection {
            out.extend_from_slice(b"Connection: ");
            out.extend_from_slice(connection.as_bytes());
            out.extend_from_slice(b"\r\n");
        }
        out.extend_from_slice(b"\r\n");

        if env.head_request {
            return BodyPlan::Done;
        }

        match self.body {
            Body::Empty => {
                if chunked {
                    encode_trailer_block(out, &self.trailers);
                }
                BodyPlan::Done
            }
            Body::Bytes(bytes) => {
                if chunked {
                    if !bytes.is_empty() {
                        push_chunk_size(out, bytes.len());
                        out.extend_from_slice(&bytes);
                        out.extend_from_slice(b"\r\n");
                    }
                    encode_trailer_block(out, &self.trailers);
                } else {
                    out.extend_from_slice(&bytes);
                }
                BodyPlan::Done
            }
            Body::File(file, len) => BodyPlan::FilePayload(file, len),
        }
    }
}

/// Appends a hex chunk-size line (`<size>\r\n`).
pub(crate) fn push_chunk_size(out: &mut Vec<u8>, size: usize) {
    let mut digits = [0u8; 16];
    let mut idx = digits.len();
    let mut rest = size;
    loop {
        idx -= 1;
        digits[idx] = b"0123456789abcdef"[rest & 0xf];
        rest >>= 4;
        if rest == 0 {
            break;
        }
    }
    out.extend_from_slice(&digits[idx..]);
    out.extend_from_slice(b"\r\n");
}

pub(crate) fn encode_trailer_block(out: &mut Vec<u8>, trailers: &[(String, String)]) {
    out.extend_from_slice(b"0\r\n");
    for (name, value) in trailers {
        out.extend_from_slice(name.as_bytes());
        out.extend_from_slice(b": ");
        out.extend_from_slice(value.as_bytes());
        out.extend_from_slice(b"\r\n");
    }
    out.extend_from_slice(b"\r\n");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(resp: HttpResponse, version: Version, head_request: bool) -> Vec<u8> {
        let mut out = Vec::new();
        let mut date = DateCache::default();
        let env = EncodeEnv {
            version,
            date: &mut date,
            connection: Some("close"),
            head_request,
            global_headers: &[],
        };
        match resp.encode_into(&mut out, env) {
            BodyPlan::Done => out,
            BodyPlan::FilePayload(..) => panic!("unexpected file payload"),
        }
    }

    fn strip_date(wire: &[u8]) -> String {
        String::from_utf8(wire.to_vec())
            .unwrap()
            .lines()
            .filter(|line| !line.starts_with("Date: "))
            .collect::<Vec<_>>()
            .join("\n")
    }

    #[test]
    fn basic_serialization() {
        let resp = HttpResponse::new(StatusCode::OK)
            .with_content_type("text/plain")
            .with_body("world");

        let wire = encode(resp, Version::Http11, false);
        assert_eq!(
            strip_date(&wire),
            "HTTP/1.1 200 OK\nContent-Type: text/plain\nContent-Length: 5\nConnection: close\n\nworld"
        );
    }

    #[test]
    fn head_suppresses_body_keeps_length() {
        let resp = HttpResponse::new(StatusCode::OK).with_body("abcdef");
        let wire = encode(resp, Version::Http11, true);
        let text = String::from_utf8(wire).unwrap();
        assert!(text.contains("Content-Length: 6\r\n"));
        assert!(text.ends_with("\r\n\r\n"));
    }

    #[test]
    fn replacement_preserves_first_casing() {
        let mut resp = HttpResponse::new(StatusCode::OK);
        resp.add_header("X-CuStOm", "one");
        resp.set_header("x-custom", "two");
        assert_eq!(resp.header("X-CUSTOM"), Some(&b"two"[..]));

        let wire = encode(resp, Version::Http11, false);
        let text = String::from_utf8(wire).unwrap();
        assert!(text.contains("X-CuStOm: two\r\n"), "{text}");
        assert!(!text.contains("x-custom"), "{text}");
    }

    #[test]
    fn replacement_resizes_in_place() {
        let mut resp = HttpResponse::new(StatusCode::OK);
        resp.add_header("A", "short");
        resp.add_header("B", "tail");
        resp.set_header("A", "much-longer-value");
        assert_eq!(resp.header("A"), Some(&b"much-longer-value"[..]));
        assert_eq!(resp.header("B"), Some(&b"tail"[..]));

        resp.set_header("A", "s");
        assert_eq!(resp.header("A"), Some(&b"s"[..]));
        assert_eq!(resp.header("B"), Some(&b"tail"[..]));
    }

    #[test]
    fn custom_reason_and_code() {
        let resp = HttpResponse::new(StatusCode::new(299)).with_reason("Custom Fine");
        let wire = encode(resp, Version::Http10, false);
        assert!(wire.starts_with(b"HTTP/1.0 299 Custom Fine\r\n"));
    }

    #[test]
    fn trailers_switch_to_chunked() {
        let resp = HttpResponse::new(StatusCode::OK)
            .with_body("Wiki")
            .with_trailer("X-Checksum", "abc");

        let wire = encode(resp, Version::Http11, false);
        let text = String::from_utf8(wire).unwrap();
        assert!(text.contains("Transfer-Encoding: chunked\r\n"));
        assert!(!text.contains("Content-Length"));
        assert!(text.ends_with("4\r\nWiki\r\n0\r\nX-Checksum: abc\r\n\r\n"), "{text}");
    }

    #[test]
    fn trailers_dropped_for_http10() {
        let resp = HttpResponse::new(StatusCode::OK)
            .with_body("Wiki")
            .with_trailer("X-Checksum", "abc");

        let wire = encode(resp, Version::Http10, false);
        let text = String::from_utf8(wire).unwrap();
        assert!(text.contains("Content-Length: 4\r\n"));
        assert!(text.ends_with("\r\n\r\nWiki"));
    }

    #[test]
    fn global_headers_shadowed_by_handler() {
        let resp = HttpResponse::new(StatusCode::OK).with_header("Server", "custom");
        let mut out = Vec::new();
        let mut date = DateCache::default();
        let env = EncodeEnv {
            version: Version::Http11,
            date: &mut date,
            connection: None,
            head_request: false,
            global_headers: &[
                ("Server".to_owned(), "arbor".to_owned()),
                ("X-Fleet".to_owned(), "a1".to_owned()),
            ],
        };
        let _ = resp.encode_into(&mut out, env);
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("Server: custom\r\n"));
        assert!(!text.contains("Server: arbor"));
        assert!(text.contains("X-Fleet: a1\r\n"));
    }

    #[test]
    fn chunk_size_lines() {
        let mut out = Vec::new();
        push_chunk_size(&mut out, 0x4);
        push_chunk_size(&mut out, 0x1a0f);
        assert_eq!(out, b"4\r\n1a0f\r\n");
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "reserved header")]
    fn reserved_header_is_a_usage_error() {
        let mut resp = HttpResponse::new(StatusCode::OK);
        resp.add_header("Content-Length", "10");
    }
}
