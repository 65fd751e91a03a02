//! Incremental HTTP/1.x request decoding.
//!
//! One `RequestParser` instance lives per connection and is driven with the
//! connection read buffer. `advance` consumes as much as the current buffer
//! allows and reports `NeedMore` until a full request is decoded; decoded
//! spans index into the buffer, which must not be compacted until the
//! request has been fully processed (`consumed` bytes are then drained and
//! the parser reset).

use crate::errors::ProtocolError;
use crate::http::headers::{self, HeaderSlot, HeadersView};
use crate::http::method::Method;
use crate::http::version::Version;
use memchr::memchr;
use std::ops::Range;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) enum Phase {
    RequestLine,
    Headers,
    FixedBody,
    ChunkSize,
    ChunkData,
    ChunkDataEnd,
    Trailers,
    Ready,
}

/// Outcome of one `advance` call.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Step {
    /// The buffer holds no complete unit of progress; read more bytes.
    NeedMore,
    /// The header block is fully decoded; body decoding has not started.
    /// Reported exactly once per request, before any `Ready`.
    HeadersDone,
    /// A complete request is decoded; `consumed` bytes cover it.
    Ready,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum BodySpan {
    None,
    /// Fixed-length body: a range of the read buffer.
    Buf(Range<usize>),
    /// Chunked body: decoded into `body_storage`.
    Storage,
}

#[derive(Debug, Copy, Clone)]
pub(crate) struct ParserLimits {
    pub(crate) max_header_bytes: usize,
    pub(crate) max_body_bytes: usize,
    pub(crate) merge_unknown_headers: bool,
}

#[derive(Debug)]
pub(crate) struct RequestParser {
    phase: Phase,
    cursor: usize,
    chunk_remaining: usize,
    trailers_start: usize,

    pub(crate) method: Method,
    pub(crate) target: Range<usize>,
    pub(crate) version: Version,
    pub(crate) headers: Vec<HeaderSlot>,
    pub(crate) trailers: Vec<HeaderSlot>,
    /// Merged duplicate header values (see `http::headers`).
    pub(crate) scratch: Vec<u8>,
    pub(crate) body: BodySpan,
    /// Decoded chunked body bytes.
    pub(crate) body_storage: Vec<u8>,
    pub(crate) content_length: Option<usize>,
    pub(crate) chunked: bool,
    /// Total bytes of the request once `Ready`.
    pub(crate) consumed: usize,
}

impl RequestParser {
    pub(crate) fn new() -> Self {
        Self {
            phase: Phase::RequestLine,
            cursor: 0,
            chunk_remaining: 0,
            trailers_start: 0,
            method: Method::Get,
            target: 0..0,
            version: Version::Http11,
            headers: Vec::new(),
            trailers: Vec::new(),
            scratch: Vec::new(),
            body: BodySpan::None,
            body_storage: Vec::new(),
            content_length: None,
            chunked: false,
            consumed: 0,
        }
    }

    /// Resets for the next request on the same connection, keeping
    /// allocations. The caller must have drained `consumed` bytes from the
    /// read buffer first.
    pub(crate) fn reset(&mut self) {
        self.phase = Phase::RequestLine;
        self.cursor = 0;
        self.chunk_remaining = 0;
        self.trailers_start = 0;
        self.target = 0..0;
        self.headers.clear();
        self.trailers.clear();
        self.scratch.clear();
        self.body = BodySpan::None;
        self.body_storage.clear();
        self.content_length = None;
        self.chunked = false;
        self.consumed = 0;
    }

    /// True while a body (fixed or chunked, incl. trailers) is being read.
    #[inline]
    pub(crate) fn reading_body(&self) -> bool {
        matches!(
            self.phase,
            Phase::FixedBody | Phase::ChunkSize | Phase::ChunkData | Phase::ChunkDataEnd | Phase::Trailers
        )
    }

    /// Case-insensitive header lookup on the decoded header block.
    #[inline]
    pub(crate) fn header<'a>(&'a self, buf: &'a [u8], name: &[u8]) -> Option<&'a [u8]> {
        HeadersView::new(buf, &self.scratch, &self.headers).get(name)
    }

    #[inline]
    pub(crate) fn body_slice<'a>(&'a self, buf: &'a [u8]) -> &'a [u8] {
        match &self.body {
            BodySpan::None => b"",
            BodySpan::Buf(range) => &buf[range.clone()],
            BodySpan::Storage => &self.body_storage,
        }
    }

    pub(crate) fn advance(&mut self, buf: &[u8], limits: &ParserLimits) -> Result<Step, ProtocolError> {
        loop {
            match self.phase {
                Phase::RequestLine => match self.take_line(buf, limits.max_header_bytes)? {
                    Some(line) => self.parse_request_line(buf, line)?,
                    None => return Ok(Step::NeedMore),
                },
                Phase::Headers => {
                    let Some(line) = self.take_line(buf, limits.max_header_bytes)? else {
                        return Ok(Step::NeedMore);
                    };
                    if line.is_empty() {
                        self.finish_headers(buf, limits)?;
                        return Ok(Step::HeadersDone);
                    }
                    let (name, value) = parse_header_line(buf, line)?;
                    headers::insert_header(
                        &mut self.headers,
                        &mut self.scratch,
                        buf,
                        name,
                        value,
                        limits.merge_unknown_headers,
                    )?;
                }
                Phase::FixedBody => {
                    let len = self.content_length.unwrap_or(0);
                    if buf.len() - self.cursor < len {
                        return Ok(Step::NeedMore);
                    }
                    self.body = BodySpan::Buf(self.cursor..self.cursor + len);
                    self.cursor += len;
                    self.finish(buf);
                }
                Phase::ChunkSize => {
                    let Some(line) = self.take_raw_line(buf)? else {
                        return Ok(Step::NeedMore);
                    };
                    let size = parse_chunk_size(&buf[line], limits.max_body_bytes)?;
                    if size == 0 {
                        self.trailers_start = self.cursor;
                        self.phase = Phase::Trailers;
                    } else {
                        if self.body_storage.len() + size > limits.max_body_bytes {
                            return Err(ProtocolError::BodyTooLarge);
                        }
                        self.chunk_remaining = size;
                        self.phase = Phase::ChunkData;
                    }
                }
                Phase::ChunkData => {
                    let avail = buf.len() - self.cursor;
                    let take = avail.min(self.chunk_remaining);
                    self.body_storage
                        .extend_from_slice(&buf[self.cursor..self.cursor + take]);
                    self.cursor += take;
                    self.chunk_remaining -= take;
                    if self.chunk_remaining > 0 {
                        return Ok(Step::NeedMore);
                    }
                    self.phase = Phase::ChunkDataEnd;
                }
                Phase::ChunkDataEnd => {
                    if buf.len() - self.cursor < 2 {
                        return Ok(Step::NeedMore);
                    }
                    if &buf[self.cursor..self.cursor + 2] != b"\r\n" {
                        return Err(ProtocolError::BadChunk);
                    }
                    self.cursor += 2;
                    self.phase = Phase::ChunkSize;
                }
                Phase::Trailers => {
                    let Some(line) = self.take_trailer_line(buf, limits.max_header_bytes)? else {
                        return Ok(Step::NeedMore);
                    };
                    if line.is_empty() {
                        self.body = BodySpan::Storage;
                        self.finish(buf);
                        continue;
                    }
                    let (name, value) = parse_header_line(buf, line)?;
                    if headers::forbidden_in_trailers(&buf[name.clone()]) {
                        return Err(ProtocolError::ForbiddenTrailer);
                    }
                    headers::insert_header(
                        &mut self.trailers,
                        &mut self.scratch,
                        buf,
                        name,
                        value,
                        limits.merge_unknown_headers,
                    )?;
                }
                Phase::Ready => return Ok(Step::Ready),
            }
        }
    }

    #[inline]
    fn finish(&mut self, _buf: &[u8]) {
        self.consumed = self.cursor;
        self.phase = Phase::Ready;
    }

    /// Takes one `\n`-terminated line in the header section, trimming an
    /// optional trailing `\r`. Enforces `max_header_bytes` while waiting
    /// for the terminator.
    fn take_line(
        &mut self,
        buf: &[u8],
        max_header_bytes: usize,
    ) -> Result<Option<Range<usize>>, ProtocolError> {
        match memchr(b'\n', &buf[self.cursor..]) {
            Some(nl) => {
                let end_abs = self.cursor + nl;
                if end_abs > max_header_bytes {
                    return Err(ProtocolError::HeadersTooLarge);
                }
                let mut line_end = end_abs;
                if line_end > self.cursor && buf[line_end - 1] == b'\r' {
                    line_end -= 1;
                }
                let line = self.cursor..line_end;
                self.cursor = end_abs + 1;
                Ok(Some(line))
            }
            None => {
                if buf.len() > max_header_bytes {
                    return Err(ProtocolError::HeadersTooLarge);
                }
                Ok(None)
            }
        }
    }

    /// Chunk-size line: strict CRLF framing.
    fn take_raw_line(&mut self, buf: &[u8]) -> Result<Option<Range<usize>>, ProtocolError> {
        match memchr(b'\n', &buf[self.cursor..]) {
            Some(nl) => {
                let end_abs = self.cursor + nl;
                if end_abs == self.cursor || buf[end_abs - 1] != b'\r' {
                    return Err(ProtocolError::BadChunk);
                }
                let line = self.cursor..end_abs - 1;
                self.cursor = end_abs + 1;
                Ok(Some(line))
            }
            None => {
                // a chunk-size line cannot meaningfully exceed 16 hex digits
                if buf.len() - self.cursor > 64 {
                    return Err(ProtocolError::BadChunk);
                }
                Ok(None)
            }
        }
    }

    fn take_trailer_line(
        &mut self,
        buf: &[u8],
        max_header_bytes: usize,
    ) -> Result<Option<Range<usize>>, ProtocolError> {
        match memchr(b'\n', &buf[self.cursor..]) {
            Some(nl) => {
                let end_abs = self.cursor + nl;
                if end_abs - self.trailers_start > max_header_bytes {
                    return Err(ProtocolError::TrailersTooLarge);
                }
                let mut line_end = end_abs;
                if line_end > self.cursor && buf[line_end - 1] == b'\r' {
                    line_end -= 1;
                }
                let line = self.cursor..line_end;
                self.cursor = end_abs + 1;
                Ok(Some(line))
            }
            None => {
                if buf.len() - self.trailers_start > max_header_bytes {
                    return Err(ProtocolError::TrailersTooLarge);
                }
                Ok(None)
            }
        }
    }

    fn parse_request_line(&mut self, buf: &[u8], line: Range<usize>) -> Result<(), ProtocolError> {
        let bytes = &buf[line.clone()];
        let sp1 = memchr(b' ', bytes).ok_or(ProtocolError::BadRequestLine)?;
        let sp2 = memchr(b' ', &bytes[sp1 + 1..])
            .map(|pos| sp1 + 1 + pos)
            .ok_or(ProtocolError::BadRequestLine)?;

        self.method = Method::from_token(&bytes[..sp1]).ok_or(ProtocolError::BadRequestLine)?;
        if sp2 == sp1 + 1 {
            return Err(ProtocolError::BadRequestLine);
        }
        self.target = line.start + sp1 + 1..line.start + sp2;
        self.version = Version::from_bytes(&bytes[sp2 + 1..])?;
        self.phase = Phase::Headers;
        Ok(())
    }

    fn finish_headers(&mut self, buf: &[u8], limits: &ParserLimits) -> Result<(), ProtocolError> {
        if self.version == Version::Http11 && self.header(buf, b"host").is_none() {
            return Err(ProtocolError::MissingHost);
        }

        if let Some(value) = self.header(buf, b"content-length") {
            self.content_length = Some(parse_content_length(value, limits.max_body_bytes)?);
        }

        if let Some(value) = self.header(buf, b"transfer-encoding") {
            if self.version == Version::Http10 || self.content_length.is_some() {
                return Err(ProtocolError::ConflictingFraming);
            }
            let last = value
                .split(|&b| b == b',')
                .map(trim_ows)
                .filter(|t| !t.is_empty())
                .last()
                .ok_or(ProtocolError::BadHeader)?;
            if !last.eq_ignore_ascii_case(b"chunked") {
                return Err(ProtocolError::BadHeader);
            }
            self.chunked = true;
        }

        self.phase = if self.chunked {
            Phase::ChunkSize
        } else if self.content_length.unwrap_or(0) > 0 {
            Phase::FixedBody
        } else {
            self.body = match self.content_length {
                Some(_) => BodySpan::Buf(self.cursor..self.cursor),
                None => BodySpan::None,
            };
            self.consumed = self.cursor;
            Phase::Ready
        };
        Ok(())
    }
}

#[inline]
fn trim_ows(mut bytes: &[u8]) -> &[u8] {
    while let [b' ' | b'\t', rest @ ..] = bytes {
        bytes = rest;
    }
    while let [rest @ .., b' ' | b'\t'] = bytes {
        bytes = rest;
    }
    bytes
}

#[inline]
const fn is_token_byte(byte: u8) -> bool {
    matches!(byte,
        b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9'
        | b'!' | b'#' | b'$' | b'%' | b'&' | b'\'' | b'*' | b'+'
        | b'-' | b'.' | b'^' | b'_' | b'`' | b'|' | b'~')
}

fn parse_header_line(
    buf: &[u8],
    line: Range<usize>,
) -> Result<(Range<usize>, Range<usize>), ProtocolError> {
    let bytes = &buf[line.clone()];
    let colon = memchr(b':', bytes).ok_or(ProtocolError::BadHeader)?;
    let name = &bytes[..colon];
    if name.is_empty() || !name.iter().all(|&b| is_token_byte(b)) {
        return Err(ProtocolError::BadHeader);
    }

    let raw_value = &bytes[colon + 1..];
    let trimmed = trim_ows(raw_value);
    let lead = raw_value.len() - trim_start_len(raw_value);
    let value_start = line.start + colon + 1 + lead;

    Ok((
        line.start..line.start + colon,
        value_start..value_start + trimmed.len(),
    ))
}

#[inline]
fn trim_start_len(bytes: &[u8]) -> usize {
    let mut rest = bytes;
    while let [b' ' | b'\t', tail @ ..] = rest {
        rest = tail;
    }
    rest.len()
}

fn parse_content_length(value: &[u8], max_body_bytes: usize) -> Result<usize, ProtocolError> {
    if value.is_empty() {
        return Err(ProtocolError::BadContentLength);
    }
    let mut parsed: usize = 0;
    for &byte in value {
        if !byte.is_ascii_digit() {
            return Err(ProtocolError::BadContentLength);
        }
        parsed = parsed
            .checked_mul(10)
            .and_then(|v| v.checked_add((byte - b'0') as usize))
            .ok_or(ProtocolError::BadContentLength)?;
    }
    if parsed > max_body_bytes {
        return Err(ProtocolError::BodyTooLarge);
    }
    Ok(parsed)
}

fn parse_chunk_size(line: &[u8], max_body_bytes: usize) -> Result<usize, ProtocolError> {
    // chunk extensions after ';' are tolerated and ignored
    let digits = match memchr(b';', line) {
        Some(pos) => &line[..pos],
        None => line,
    };
    let digits = trim_ows(digits);
    if digits.is_empty() {
        return Err(ProtocolError::BadChunk);
    }
    let mut size: usize = 0;
    for &byte in digits {
        let nibble = match byte {
            b'0'..=b'9' => byte - b'0',
            b'a'..=b'f' => 10 + byte - b'a',
            b'A'..=b'F' => 10 + byte - b'A',
            _ => return Err(ProtocolError::BadChunk),
        };
        size = size
            .checked_mul(16)
            .and_then(|v| v.checked_add(nibble as usize))
            .ok_or(ProtocolError::BadChunk)?;
        if size > max_body_bytes {
            return Err(ProtocolError::BodyTooLarge);
        }
    }
    Ok(size)
}

#[cfg(test)]
mod tests {
    use super::*;

    const LIMITS: ParserLimits = ParserLimits {
        max_header_bytes: 8 * 1024,
        max_body_bytes: 64 * 1024,
        merge_unknown_headers: true,
    };

    fn drive(input: &[u8], limits: &ParserLimits) -> Result<RequestParser, ProtocolError> {
        let mut parser = RequestParser::new();
        loop {
            match parser.advance(input, limits)? {
                Step::Ready => return Ok(parser),
                Step::HeadersDone => continue,
                Step::NeedMore => panic!("incomplete input: {:?}", parser),
            }
        }
    }

    fn drive_err(input: &[u8], limits: &ParserLimits) -> ProtocolError {
        let mut parser = RequestParser::new();
        loop {
            match parser.advance(input, limits) {
                Ok(Step::Ready) => panic!("unexpectedly parsed"),
                Ok(Step::HeadersDone) => continue,
                Ok(Step::NeedMore) => panic!("incomplete input"),
                Err(err) => return err,
            }
        }
    }

    #[test]
    fn simple_get() {
        let input = b"GET /hello?x=1 HTTP/1.1\r\nHost: localhost\r\n\r\n";
        let parser = drive(input, &LIMITS).unwrap();

        assert_eq!(parser.method, Method::Get);
        assert_eq!(&input[parser.target.clone()], b"/hello?x=1");
        assert_eq!(parser.version, Version::Http11);
        assert_eq!(parser.header(input, b"HOST"), Some(&b"localhost"[..]));
        assert_eq!(parser.body_slice(input), b"");
        assert_eq!(parser.consumed, input.len());
    }

    #[test]
    fn lone_lf_lines_accepted() {
        let input = b"GET / HTTP/1.1\nHost: x\n\n";
        let parser = drive(input, &LIMITS).unwrap();
        assert_eq!(parser.consumed, input.len());
    }

    #[test]
    fn fixed_length_body() {
        let input = b"POST /u HTTP/1.1\r\nHost: x\r\nContent-Length: 5\r\n\r\nhelloGET";
        let parser = drive(input, &LIMITS).unwrap();

        assert_eq!(parser.body_slice(input), b"hello");
        // pipelined residue is not consumed
        assert_eq!(parser.consumed, input.len() - 3);
    }

    #[test]
    fn chunked_body_with_trailers() {
        let input = b"POST /c HTTP/1.1\r\nHost: x\r\nTransfer-Encoding: chunked\r\n\r\n\
                      4\r\nWiki\r\n5\r\npedia\r\n0\r\nX-Checksum: abc\r\n\r\n";
        let parser = drive(input, &LIMITS).unwrap();

        assert_eq!(parser.body_slice(input), b"Wikipedia");
        let trailers = HeadersView::new(input, &parser.scratch, &parser.trailers);
        assert_eq!(trailers.get(b"x-checksum"), Some(&b"abc"[..]));
        assert_eq!(parser.consumed, input.len());
    }

    #[test]
    fn chunk_extensions_ignored() {
        let input = b"POST /c HTTP/1.1\r\nHost: x\r\nTransfer-Encoding: chunked\r\n\r\n\
                      4;ext=1\r\nWiki\r\n0\r\n\r\n";
        let parser = drive(input, &LIMITS).unwrap();
        assert_eq!(parser.body_slice(input), b"Wiki");
    }

    #[test]
    fn byte_at_a_time_feeding() {
        let input: &[u8] = b"POST /c HTTP/1.1\r\nHost: x\r\nTransfer-Encoding: chunked\r\n\r\n\
                             3\r\nabc\r\n0\r\nX-T: v\r\n\r\n";
        let mut parser = RequestParser::new();
        let mut seen_headers_done = 0;
        let mut ready = false;

        for end in 1..=input.len() {
            match parser.advance(&input[..end], &LIMITS).unwrap() {
                Step::NeedMore => {}
                Step::HeadersDone => seen_headers_done += 1,
                Step::Ready => {
                    ready = true;
                    assert_eq!(end, input.len());
                }
            }
        }
        assert!(ready);
        assert_eq!(seen_headers_done, 1);
        assert_eq!(parser.body_slice(input), b"abc");
    }

    #[test]
    fn reset_reuses_allocations() {
        let first = b"POST /a HTTP/1.1\r\nHost: x\r\nContent-Length: 2\r\n\r\nab";
        let mut parser = drive(first, &LIMITS).unwrap();
        parser.reset();

        let second = b"GET /b HTTP/1.1\r\nHost: x\r\n\r\n";
        loop {
            match parser.advance(second, &LIMITS).unwrap() {
                Step::Ready => break,
                _ => continue,
            }
        }
        assert_eq!(&second[parser.target.clone()], b"/b");
    }

    #[test]
    fn request_line_errors() {
        #[rustfmt::skip]
        let cases: [(&[u8], ProtocolError); 7] = [
            (b"GET/ HTTP/1.1\r\n\r\n",        ProtocolError::BadRequestLine),
            (b"FETCH / HTTP/1.1\r\n\r\n",     ProtocolError::BadRequestLine),
            (b"GET  HTTP/1.1\r\n\r\n",        ProtocolError::BadRequestLine),
            (b"GET /\r\n\r\n",                ProtocolError::BadRequestLine),
            (b"GET / HTTP/2.0\r\n\r\n",       ProtocolError::UnsupportedVersion),
            (b"GET / HTTP/0.9\r\n\r\n",       ProtocolError::UnsupportedVersion),
            (b"GET / ICY/1.1\r\n\r\n",        ProtocolError::BadRequestLine),
        ];

        for (input, expected) in cases {
            assert_eq!(drive_err(input, &LIMITS), expected, "{:?}", input);
        }
    }

    #[test]
    fn header_errors() {
        #[rustfmt::skip]
        let cases: [(&[u8], ProtocolError); 6] = [
            (b"GET / HTTP/1.1\r\n\r\n",                                  ProtocolError::MissingHost),
            (b"GET / HTTP/1.1\r\nHost: x\r\nNo-Colon-Here\r\n\r\n",      ProtocolError::BadHeader),
            (b"GET / HTTP/1.1\r\nHost: x\r\n: v\r\n\r\n",                ProtocolError::BadHeader),
            (b"GET / HTTP/1.1\r\nHost: x\r\nBad Name: v\r\n\r\n",        ProtocolError::BadHeader),
            (b"GET / HTTP/1.1\r\nHost: x\r\nContent-Length: 1\r\nContent-Length: 1\r\n\r\n",
                                                                         ProtocolError::DuplicateHeader),
            (b"GET / HTTP/1.0\r\nTransfer-Encoding: chunked\r\n\r\n",    ProtocolError::ConflictingFraming),
        ];

        for (input, expected) in cases {
            assert_eq!(drive_err(input, &LIMITS), expected, "{:?}", input);
        }
    }

    #[test]
    fn framing_errors() {
        #[rustfmt::skip]
        let cases: [(&[u8], ProtocolError); 6] = [
            (b"POST / HTTP/1.1\r\nHost: x\r\nContent-Length: -1\r\n\r\n",   ProtocolError::BadContentLength),
            (b"POST / HTTP/1.1\r\nHost: x\r\nContent-Length: 1a\r\n\r\n",   ProtocolError::BadContentLength),
            (b"POST / HTTP/1.1\r\nHost: x\r\nContent-Length: \r\n\r\n",     ProtocolError::BadContentLength),
            (b"POST / HTTP/1.1\r\nHost: x\r\nContent-Length: 99999999999999999999\r\n\r\n",
                                                                            ProtocolError::BadContentLength),
            (b"POST / HTTP/1.1\r\nHost: x\r\nContent-Length: 3\r\nTransfer-Encoding: chunked\r\n\r\n",
                                                                            ProtocolError::ConflictingFraming),
            (b"POST / HTTP/1.1\r\nHost: x\r\nTransfer-Encoding: gzip\r\n\r\n",
                                                                            ProtocolError::BadHeader),
        ];

        for (input, expected) in cases {
            assert_eq!(drive_err(input, &LIMITS), expected, "{:?}", input);
        }
    }

    #[test]
    fn body_limit() {
        let limits = ParserLimits {
            max_body_bytes: 4,
            ..LIMITS
        };

        let input = b"POST / HTTP/1.1\r\nHost: x\r\nContent-Length: 5\r\n\r\nhello";
        assert_eq!(drive_err(input, &limits), ProtocolError::BodyTooLarge);

        let input = b"POST / HTTP/1.1\r\nHost: x\r\nTransfer-Encoding: chunked\r\n\r\n\
                      3\r\nabc\r\n3\r\ndef\r\n0\r\n\r\n";
        assert_eq!(drive_err(input, &limits), ProtocolError::BodyTooLarge);
    }

    #[test]
    fn header_limit() {
        let limits = ParserLimits {
            max_header_bytes: 48,
            ..LIMITS
        };

        let input = b"GET / HTTP/1.1\r\nHost: x\r\nX-Filler: aaaaaaaaaaaaaaaaaaaaaaaaaaaa\r\n\r\n";
        assert_eq!(drive_err(input, &limits), ProtocolError::HeadersTooLarge);
    }

    #[test]
    fn trailer_rules() {
        let forbidden = b"POST / HTTP/1.1\r\nHost: x\r\nTransfer-Encoding: chunked\r\n\r\n\
                          1\r\na\r\n0\r\nContent-Length: 3\r\n\r\n";
        assert_eq!(drive_err(forbidden, &LIMITS), ProtocolError::ForbiddenTrailer);

        let bad_chunk = b"POST / HTTP/1.1\r\nHost: x\r\nTransfer-Encoding: chunked\r\n\r\n\
                          zz\r\na\r\n0\r\n\r\n";
        assert_eq!(drive_err(bad_chunk, &LIMITS), ProtocolError::BadChunk);
    }

    #[test]
    fn zero_content_length_ready_without_body_phase() {
        let input = b"POST / HTTP/1.1\r\nHost: x\r\nContent-Length: 0\r\n\r\n";
        let parser = drive(input, &LIMITS).unwrap();
        assert_eq!(parser.content_length, Some(0));
        assert_eq!(parser.body, BodySpan::Buf(input.len()..input.len()));
    }
}
