//! Streaming response writer: lazy headers, chunked framing, trailers and
//! mid-flight compression activation.

use crate::codec::compress::{CompressionConfig, StreamEncoder};
use crate::codec::encoding::Encoding;
use crate::http::date::DateCache;
use crate::http::response::{encode_trailer_block, push_chunk_size, HttpResponse};
use crate::http::status::StatusCode;
use crate::http::version::Version;
use std::fs::File;
use std::io::{self, Read};

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum WriterState {
    Open,
    HeadersSent,
    Ended,
}

/// Everything the connection lends the writer for one streaming response.
pub(crate) struct WriterEnv<'a> {
    pub(crate) out: &'a mut Vec<u8>,
    pub(crate) date: &'a mut DateCache,
    pub(crate) global_headers: &'a [(String, String)],
    pub(crate) compression: &'a CompressionConfig,
    pub(crate) version: Version,
    pub(crate) head_request: bool,
    pub(crate) connection: Option<&'static str>,
    pub(crate) max_outbound: usize,
    /// Codec negotiated from `Accept-Encoding`, if any.
    pub(crate) negotiated: Option<Encoding>,
    /// Response-middleware hook, run right before headers flush.
    pub(crate) on_headers: Option<Box<dyn FnOnce(&mut HttpResponse) + Send + 'a>>,
}

/// Incremental response writer handed to streaming handlers.
///
/// Headers accumulate lazily and are flushed on the first body write (or
/// `end`). Without a declared [`content_length`](Self::content_length) the
/// response uses chunked framing on HTTP/1.1; on HTTP/1.0 it streams raw
/// and forces `Connection: close`.
pub struct ResponseWriter<'a> {
    env: WriterEnv<'a>,
    state: WriterState,
    response: HttpResponse,
    declared_len: Option<u64>,
    chunked: bool,
    must_close: bool,
    failed: bool,
    /// Identity bytes buffered until the compression threshold decision.
    prebuffer: Vec<u8>,
    encoder: Option<StreamEncoder>,
    compression_decided: bool,
    trailers: Vec<(String, String)>,
    file: Option<(File, u64)>,
}

impl<'a> ResponseWriter<'a> {
    pub(crate) fn new(env: WriterEnv<'a>) -> Self {
        Self {
            env,
            state: WriterState::Open,
            response: HttpResponse::new(StatusCode::OK),
            declared_len: None,
            chunked: false,
            must_close: false,
            failed: false,
            prebuffer: Vec::new(),
            encoder: None,
            compression_decided: false,
            trailers: Vec::new(),
            file: None,
        }
    }

    /// Replaces the status code. Only before headers are sent.
    #[track_caller]
    pub fn status(&mut self, status: StatusCode) -> &mut Self {
        debug_assert!(self.state == WriterState::Open, "headers already sent");
        if self.state == WriterState::Open {
            self.response.set_status(status);
        }
        self
    }

    /// Replaces the reason phrase. Only before headers are sent.
    #[track_caller]
    pub fn reason(&mut self, reason: impl Into<String>) -> &mut Self {
        debug_assert!(self.state == WriterState::Open, "headers already sent");
        if self.state == WriterState::Open {
            self.response.set_reason(reason);
        }
        self
    }

    /// Appends a header line without a duplicate scan (fast path).
    #[track_caller]
    pub fn add_custom_header(&mut self, name: &str, value: &str) -> &mut Self {
        debug_assert!(self.state == WriterState::Open, "headers already sent");
        if self.state == WriterState::Open {
            self.response.add_header(name, value);
        }
        self
    }

    /// Sets or replaces a header, keeping at most one instance.
    #[track_caller]
    pub fn header(&mut self, name: &str, value: &str) -> &mut Self {
        debug_assert!(self.state == WriterState::Open, "headers already sent");
        if self.state == WriterState::Open {
            self.response.set_header(name, value);
        }
        self
    }

    #[inline]
    #[track_caller]
    pub fn content_type(&mut self, content_type: &str) -> &mut Self {
        self.header("Content-Type", content_type)
    }

    /// Sets an explicit `Content-Encoding`, suppressing automatic
    /// compression.
    #[inline]
    #[track_caller]
    pub fn content_encoding(&mut self, coding: &str) -> &mut Self {
        self.header("Content-Encoding", coding)
    }

    /// Declares a fixed body length, disabling chunked framing.
    ///
    /// Call before the first `write_body` and only when the exact
    /// on-the-wire size is known; with automatic compression enabled the
    /// final size is not knowable, so leave the writer in chunked mode.
    /// Ignored once body bytes have been written.
    pub fn content_length(&mut self, len: u64) -> &mut Self {
        if self.state == WriterState::Open && self.prebuffer.is_empty() {
            self.declared_len = Some(len);
        } else {
            log::debug!("content_length({len}) ignored: body already started");
        }
        self
    }

    /// Installs an open file as the response payload; its length becomes
    /// the declared `Content-Length`. Subsequent `write_body` calls are
    /// rejected.
    #[track_caller]
    pub fn file(&mut self, file: File) -> io::Result<()> {
        debug_assert!(self.state == WriterState::Open, "headers already sent");
        debug_assert!(self.prebuffer.is_empty(), "file after write_body");
        let len = file.metadata()?.len();
        self.declared_len = Some(len);
        self.file = Some((file, len));
        Ok(())
    }

    /// Adds a trailer, emitted after the terminating chunk. Valid only
    /// while the response is chunked (no declared `Content-Length`).
    #[track_caller]
    pub fn add_trailer(&mut self, name: impl Into<String>, value: impl Into<String>) -> &mut Self {
        debug_assert!(self.state != WriterState::Ended, "response already ended");
        debug_assert!(self.declared_len.is_none(), "trailers need chunked framing");
        if self.state != WriterState::Ended && self.declared_len.is_none() {
            self.trailers.push((name.into(), value.into()));
        }
        self
    }

    /// Backpressure-aware body write.
    ///
    /// Returns `false` when the outbound buffer crossed the configured
    /// threshold or a prior failure occurred; the caller should stop
    /// writing (the connection closes after the buffered bytes drain).
    pub fn write_body(&mut self, data: &[u8]) -> bool {
        if self.failed || self.state == WriterState::Ended || self.file.is_some() {
            return false;
        }
        if self.env.out.len() > self.env.max_outbound {
            self.failed = true;
            return false;
        }
        if self.env.head_request {
            // body suppressed; headers flush at end()
            return true;
        }

        match self.state {
            WriterState::Open => {
                if self.may_compress() {
                    self.prebuffer.extend_from_slice(data);
                    if self.prebuffer.len() >= self.env.compression.min_bytes {
                        self.decide_compression();
                    }
                } else {
                    self.flush_headers();
                    self.emit(data);
                }
            }
            WriterState::HeadersSent => match &mut self.encoder {
                Some(encoder) => {
                    if encoder.write(data).is_err() {
                        self.failed = true;
                        return false;
                    }
                    let produced = encoder.take_output();
                    self.emit_owned(produced);
                }
                None => self.emit(data),
            },
            WriterState::Ended => unreachable!(),
        }
        !self.failed
    }

    /// Finalizes the response: flushes lazy headers, the encoder tail, the
    /// terminating chunk and trailers. Idempotent.
    pub fn end(&mut self) {
        if self.state == WriterState::Ended {
            return;
        }
        if self.state == WriterState::Open {
            if self.may_compress() && !self.prebuffer.is_empty() {
                // end-of-response below the threshold: identity
                self.compression_decided = true;
            }
            self.flush_headers();
            let pending = std::mem::take(&mut self.prebuffer);
            self.emit_owned(pending);
            if let Some((file, len)) = self.file.take() {
                self.stream_file(file, len);
            }
        }
        if let Some(encoder) = self.encoder.take() {
            match encoder.finish() {
                Ok(tail) => self.emit_owned(tail),
                Err(err) => {
                    log::warn!("stream encoder finalization failed: {err}");
                    self.failed = true;
                }
            }
        }
        if self.chunked && !self.env.head_request {
            encode_trailer_block(self.env.out, &self.trailers);
        }
        self.state = WriterState::Ended;
    }

    #[inline]
    pub fn finished(&self) -> bool {
        self.state == WriterState::Ended
    }

    /// True when the user supplied an explicit `Content-Encoding`.
    #[inline]
    pub fn user_provided_content_encoding(&self) -> bool {
        self.response.header("Content-Encoding").is_some()
    }

    /// The connection must close after this response (raw HTTP/1.0 stream
    /// or backpressure overflow).
    #[inline]
    pub(crate) fn close_required(&self) -> bool {
        self.must_close || self.failed
    }

    #[inline]
    fn may_compress(&self) -> bool {
        !self.compression_decided
            && self.encoder.is_none()
            && self.env.negotiated.is_some()
            && self.declared_len.is_none()
            && !self.user_provided_content_encoding()
    }

    /// Threshold reached with headers unsent: activate the streaming
    /// encoder when the content type is eligible, else commit to identity.
    fn decide_compression(&mut self) {
        self.compression_decided = true;
        let Some(encoding) = self.env.negotiated else {
            return;
        };
        let eligible = self
            .env
            .compression
            .content_type_eligible(self.response.header("Content-Type"));

        if eligible {
            match StreamEncoder::new(encoding) {
                Ok(encoder) => {
                    self.response.set_header("Content-Encoding", encoding.token());
                    if self.env.compression.add_vary_accept_encoding_header {
                        self.response.append_vary("Accept-Encoding");
                    }
                    self.encoder = Some(encoder);
                }
                Err(err) => log::warn!("encoder init failed, streaming identity: {err}"),
            }
        }

        self.flush_headers();
        let pending = std::mem::take(&mut self.prebuffer);
        match &mut self.encoder {
            Some(encoder) => {
                if encoder.write(&pending).is_err() {
                    self.failed = true;
                    return;
                }
                let produced = encoder.take_output();
                self.emit_owned(produced);
            }
            None => self.emit_owned(pending),
        }
    }

    fn flush_headers(&mut self) {
        debug_assert!(self.state == WriterState::Open);
        if let Some(hook) = self.env.on_headers.take() {
            hook(&mut self.response);
        }

        let out = &mut self.env.out;
        out.extend_from_slice(self.env.version.as_str().as_bytes());
        out.push(b' ');
        let mut code = itoa::Buffer::new();
        out.extend_from_slice(code.format(self.response.status().as_u16()).as_bytes());
        out.push(b' ');
        match self.response.reason_str() {
            Some(reason) => out.extend_from_slice(reason.as_bytes()),
            None => out.extend_from_slice(self.response.status().canonical_reason().as_bytes()),
        }
        out.extend_from_slice(b"\r\n");
        out.extend_from_slice(b"Date: ");
        out.extend_from_slice(self.env.date.value().as_bytes());
        out.extend_from_slice(b"\r\n");

        for (name, value) in self.env.global_headers {
            if self.response.header(name).is_none() {
                self.response.push_raw_header(name, value);
            }
        }
        self.env.out.extend_from_slice(self.response.head_bytes());

        let mut len_buf = itoa::Buffer::new();
        if let Some(len) = self.declared_len {
            self.env.out.extend_from_slice(b"Content-Length: ");
            self.env.out.extend_from_slice(len_buf.format(len).as_bytes());
            self.env.out.extend_from_slice(b"\r\n");
        } else if self.env.head_request {
            // chunked mode would have applied; synthesize a zero length
            self.env.out.extend_from_slice(b"Content-Length: 0\r\n");
        } else if self.env.version == Version::Http11 {
            self.chunked = true;
            self.env.out.extend_from_slice(b"Transfer-Encoding: chunked\r\n");
        } else {
            // HTTP/1.0 without a length: delimit by connection close
            self.must_close = true;
        }

        let connection = if self.must_close {
            Some("close")
        } else {
            self.env.connection
        };
        if let Some(connection) = connection {
            self.env.out.extend_from_slice(b"Connection: ");
            self.env.out.extend_from_slice(connection.as_bytes());
            self.env.out.extend_from_slice(b"\r\n");
        }
        self.env.out.extend_from_slice(b"\r\n");

        self.state = WriterState::HeadersSent;
    }

    #[inline]
    fn emit(&mut self, data: &[u8]) {
        if data.is_empty() || self.env.head_request {
            return;
        }
        if self.chunked {
            push_chunk_size(self.env.out, data.len());
            self.env.out.extend_from_slice(data);
            self.env.out.extend_from_slice(b"\r\n");
        } else {
            self.env.out.extend_from_slice(data);
        }
    }

    #[inline]
    fn emit_owned(&mut self, data: Vec<u8>) {
        self.emit(&data);
    }

    fn stream_file(&mut self, mut file: File, len: u64) {
        if self.env.head_request {
            return;
        }
        let mut remaining = len;
        let mut chunk = [0u8; 64 * 1024];
        while remaining > 0 {
            match file.read(&mut chunk) {
                Ok(0) => break,
                Ok(n) => {
                    let take = (n as u64).min(remaining) as usize;
                    self.env.out.extend_from_slice(&chunk[..take]);
                    remaining -= take as u64;
                }
                Err(err) => {
                    log::warn!("file payload read failed: {err}");
                    self.failed = true;
                    return;
                }
            }
        }
    }
}

impl Drop for ResponseWriter<'_> {
    fn drop(&mut self) {
        // handlers that forget end() still produce a complete response
        self.end();
    }
}
