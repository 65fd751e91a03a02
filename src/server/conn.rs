//! Per-connection request loop and dispatch envelope.
//!
//! One reusable `ConnContext` serves one socket at a time: it owns the read
//! buffer, the incremental parser, the outbound buffer and the scratch
//! areas every request view borrows from. The loop reads with
//! phase-appropriate deadlines, decodes pipelined requests in arrival
//! order, runs the dispatch envelope (probes, CORS, middleware, handler,
//! codecs) and flushes each serialized response before the next request is
//! parsed.

use crate::codec::compress;
use crate::codec::decompress;
use crate::codec::negotiate::{self, Negotiated};
use crate::errors::ProtocolError;
use crate::http::date::DateCache;
use crate::http::headers::HeadersView;
use crate::http::method::{Method, MethodSet};
use crate::http::parser::{ParserLimits, RequestParser, Step};
use crate::http::request::{self, HttpRequest, PathParam};
use crate::http::response::{BodyPlan, EncodeEnv, HttpResponse};
use crate::http::status::StatusCode;
use crate::http::version::Version;
use crate::router::cors::{self, CorsOutcome};
use crate::router::middleware;
use crate::router::trie::{Lookup, Router, Slot};
use crate::server::config::{KeepAliveMode, ServerConfig, TracePolicy};
use crate::server::server_impl::ServerShared;
use crate::server::writer::{ResponseWriter, WriterEnv};
use std::io::Read;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Expectation-handler outcome for `Expect` tokens other than
/// `100-continue` (see the server-level registration).
pub enum ExpectationResult {
    /// Treat the token as satisfied; proceed normally.
    Continue,
    /// Emit an interim 1xx status line and keep reading the body.
    Interim(StatusCode),
    /// Reply immediately with this response and skip the handler.
    FinalResponse(HttpResponse),
    /// Reject with `417 Expectation Failed`.
    Reject,
}

/// Inspects `Expect` tokens the engine does not implement itself.
pub type ExpectationHandler =
    std::sync::Arc<dyn Fn(&HttpRequest<'_>, &str) -> ExpectationResult + Send + Sync>;

/// Invoked with the status code of every protocol-level rejection.
pub type ParserErrorCallback = std::sync::Arc<dyn Fn(StatusCode) + Send + Sync>;

const NOT_FOUND_HTML: &str = "<!DOCTYPE html><html><head><title>404 Not Found</title></head>\
<body><h1>404 Not Found</h1></body></html>\n";

/// Canned fast-path response for admission-queue overflow.
pub(crate) const OVERLOAD_RESPONSE: &[u8] =
    b"HTTP/1.1 503 Service Unavailable\r\nConnection: close\r\nContent-Length: 0\r\n\r\n";

/// Reusable per-connection state, pooled by the worker that owns it.
pub(crate) struct ConnContext {
    buf: Vec<u8>,
    parser: RequestParser,
    outbound: Vec<u8>,
    path_buf: Vec<u8>,
    date: DateCache,
}

impl ConnContext {
    pub(crate) fn new() -> Self {
        Self {
            buf: Vec::new(),
            parser: RequestParser::new(),
            outbound: Vec::new(),
            path_buf: Vec::new(),
            date: DateCache::default(),
        }
    }

    fn reset(&mut self) {
        self.buf.clear();
        self.parser.reset();
        self.outbound.clear();
        self.path_buf.clear();
    }
}

enum ReadOutcome {
    Data,
    Eof,
    TimedOut,
}

async fn read_more<S>(
    stream: &mut S,
    buf: &mut Vec<u8>,
    chunk_bytes: usize,
    deadline: Duration,
) -> std::io::Result<ReadOutcome>
where
    S: AsyncRead + Unpin,
{
    let start = buf.len();
    buf.resize(start + chunk_bytes, 0);
    let read = tokio::time::timeout(deadline, stream.read(&mut buf[start..])).await;
    match read {
        Err(_) => {
            buf.truncate(start);
            Ok(ReadOutcome::TimedOut)
        }
        Ok(Err(err)) => {
            buf.truncate(start);
            Err(err)
        }
        Ok(Ok(0)) => {
            buf.truncate(start);
            Ok(ReadOutcome::Eof)
        }
        Ok(Ok(n)) => {
            buf.truncate(start + n);
            Ok(ReadOutcome::Data)
        }
    }
}

async fn write_with_timeout<S>(
    stream: &mut S,
    data: &[u8],
    deadline: Duration,
) -> std::io::Result<()>
where
    S: AsyncWrite + Unpin,
{
    match tokio::time::timeout(deadline, stream.write_all(data)).await {
        Ok(result) => result,
        Err(_) => Err(std::io::Error::new(
            std::io::ErrorKind::TimedOut,
            "write timeout",
        )),
    }
}

/// Serves one accepted connection to completion.
pub(crate) async fn serve_connection<S>(
    stream: &mut S,
    ctx: &mut ConnContext,
    shared: &ServerShared,
) -> std::io::Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    ctx.reset();
    let mut served: usize = 0;

    'requests: loop {
        let config = shared.current_config();
        let limits = ParserLimits {
            max_header_bytes: config.max_header_bytes,
            max_body_bytes: config.max_body_bytes,
            merge_unknown_headers: config.merge_unknown_request_headers,
        };
        let chunk_bytes = config
            .initial_read_chunk_bytes
            .min(config.max_per_event_read_bytes)
            .max(512);

        let mut pending_final: Option<HttpResponse> = None;

        // decode one request, reading as needed
        loop {
            match ctx.parser.advance(&ctx.buf, &limits) {
                Ok(Step::Ready) => break,
                Ok(Step::HeadersDone) => {
                    let action = evaluate_expect(&ctx.parser, &ctx.buf, shared);
                    match action {
                        Ok(ExpectAction::Proceed) => {}
                        Ok(ExpectAction::SendInterim(bytes)) => {
                            write_with_timeout(stream, &bytes, config.write_timeout).await?;
                        }
                        Ok(ExpectAction::Final(resp)) => pending_final = Some(resp),
                        Err(err) => {
                            emit_protocol_error(ctx, shared, &err);
                            write_with_timeout(stream, &ctx.outbound, config.write_timeout).await?;
                            return Ok(());
                        }
                    }
                }
                Ok(Step::NeedMore) => {
                    let deadline = if ctx.parser.reading_body() {
                        config.body_read_timeout
                    } else if ctx.buf.is_empty() && served > 0 {
                        config.keep_alive_timeout
                    } else {
                        config.header_read_timeout
                    };
                    match read_more(stream, &mut ctx.buf, chunk_bytes, deadline).await? {
                        ReadOutcome::Data => {}
                        ReadOutcome::Eof => return Ok(()),
                        ReadOutcome::TimedOut => {
                            if !ctx.buf.is_empty() && !ctx.parser.reading_body() {
                                // partial request head: best-effort 408
                                encode_bare_status(
                                    &mut ctx.outbound,
                                    StatusCode::REQUEST_TIMEOUT,
                                    &mut ctx.date,
                                );
                                let _ = write_with_timeout(
                                    stream,
                                    &ctx.outbound,
                                    config.write_timeout,
                                )
                                .await;
                            }
                            return Ok(());
                        }
                    }
                }
                Err(err) => {
                    emit_protocol_error(ctx, shared, &err);
                    write_with_timeout(stream, &ctx.outbound, config.write_timeout).await?;
                    return Ok(());
                }
            }
        }

        // dispatch and serialize
        let close = {
            let ConnContext {
                buf,
                parser,
                outbound,
                path_buf,
                date,
            } = ctx;
            match process_request(
                buf,
                parser,
                outbound,
                path_buf,
                date,
                &config,
                shared,
                served,
                pending_final,
            ) {
                Ok(close) => close,
                Err(err) => {
                    emit_protocol_error(ctx, shared, &err);
                    write_with_timeout(stream, &ctx.outbound, config.write_timeout).await?;
                    return Ok(());
                }
            }
        };

        // backpressure: a response that overran the outbound cap still
        // drains fully, then the connection closes
        let close = close || ctx.outbound.len() > config.max_outbound_buffer_bytes;

        write_with_timeout(stream, &ctx.outbound, config.write_timeout).await?;
        shared.stats.on_response(ctx.outbound.len() as u64);
        ctx.outbound.clear();
        served += 1;

        if close {
            return Ok(());
        }

        // pipelining: discard the consumed request, keep the residue
        ctx.buf.drain(..ctx.parser.consumed);
        ctx.parser.reset();
        continue 'requests;
    }
}

enum ExpectAction {
    Proceed,
    SendInterim(Vec<u8>),
    Final(HttpResponse),
}

/// `Expect` handling, run once per request when the header block completes
/// and before any body byte is read.
fn evaluate_expect(
    parser: &RequestParser,
    buf: &[u8],
    shared: &ServerShared,
) -> Result<ExpectAction, ProtocolError> {
    let Some(raw) = parser.header(buf, b"expect") else {
        return Ok(ExpectAction::Proceed);
    };

    let mut found_100_continue = false;
    let mut other_tokens = false;
    for token in raw.split(|&b| b == b',') {
        let token = trim(token);
        if token.is_empty() {
            continue;
        }
        if token.eq_ignore_ascii_case(b"100-continue") {
            found_100_continue = true;
        } else {
            other_tokens = true;
        }
    }

    if other_tokens {
        let Some(handler) = shared.expectation_handler() else {
            return Err(ProtocolError::ExpectationFailed);
        };
        let headers = HeadersView::new(buf, &parser.scratch, &parser.headers);
        let empty = HeadersView::new(b"", b"", &[]);
        let req = HttpRequest {
            method: parser.method,
            target: &buf[parser.target.clone()],
            path: "",
            query: None,
            version: parser.version,
            headers,
            body: b"",
            trailers: empty,
            path_params: &[],
        };
        let expect_str = String::from_utf8_lossy(raw);
        match handler(&req, &expect_str) {
            ExpectationResult::Continue => {}
            ExpectationResult::Interim(status) => {
                if !status.is_informational() {
                    // malformed handler output
                    let resp = HttpResponse::new(StatusCode::INTERNAL_SERVER_ERROR);
                    return Ok(ExpectAction::Final(resp));
                }
                let mut line = Vec::with_capacity(32);
                line.extend_from_slice(parser.version.as_str().as_bytes());
                line.push(b' ');
                let mut code = itoa::Buffer::new();
                line.extend_from_slice(code.format(status.as_u16()).as_bytes());
                line.push(b' ');
                line.extend_from_slice(status.canonical_reason().as_bytes());
                line.extend_from_slice(b"\r\n\r\n");
                return Ok(ExpectAction::SendInterim(line));
            }
            ExpectationResult::FinalResponse(resp) => return Ok(ExpectAction::Final(resp)),
            ExpectationResult::Reject => return Err(ProtocolError::ExpectationFailed),
        }
    }

    // 100-continue fires only for a declared non-empty body
    if found_100_continue && (parser.content_length.unwrap_or(0) > 0 || parser.chunked) {
        let mut line = Vec::with_capacity(32);
        line.extend_from_slice(parser.version.as_str().as_bytes());
        line.extend_from_slice(b" 100 Continue\r\n\r\n");
        return Ok(ExpectAction::SendInterim(line));
    }
    Ok(ExpectAction::Proceed)
}

#[inline]
fn trim(mut bytes: &[u8]) -> &[u8] {
    while let [b' ' | b'\t', rest @ ..] = bytes {
        bytes = rest;
    }
    while let [rest @ .., b' ' | b'\t'] = bytes {
        bytes = rest;
    }
    bytes
}

/// Emits an empty-bodied error response into the outbound buffer and
/// notifies the parser-error callback.
fn emit_protocol_error(ctx: &mut ConnContext, shared: &ServerShared, err: &ProtocolError) {
    log::debug!("protocol error: {err}");
    shared.notify_parser_error(err.status());
    ctx.outbound.clear();
    encode_bare_status(&mut ctx.outbound, err.status(), &mut ctx.date);
}

fn encode_bare_status(out: &mut Vec<u8>, status: StatusCode, date: &mut DateCache) {
    out.extend_from_slice(b"HTTP/1.1 ");
    let mut code = itoa::Buffer::new();
    out.extend_from_slice(code.format(status.as_u16()).as_bytes());
    out.push(b' ');
    out.extend_from_slice(status.canonical_reason().as_bytes());
    out.extend_from_slice(b"\r\nDate: ");
    out.extend_from_slice(date.value().as_bytes());
    out.extend_from_slice(b"\r\nContent-Length: 0\r\nConnection: close\r\n\r\n");
}

/// Keep-alive decision per RFC 7230 §6.3 plus engine policy.
fn keep_alive_permitted(
    version: Version,
    connection_header: Option<&[u8]>,
    config: &ServerConfig,
    shared: &ServerShared,
    served: usize,
) -> bool {
    let client_wants = match version {
        Version::Http11 => !connection_token_present(connection_header, b"close"),
        Version::Http10 => connection_token_present(connection_header, b"keep-alive"),
    };
    let below_limit = config.max_requests_per_connection == 0
        || served + 1 < config.max_requests_per_connection;
    client_wants
        && config.keep_alive_mode == KeepAliveMode::Enabled
        && below_limit
        && !shared.lifecycle.is_draining()
}

fn connection_token_present(header: Option<&[u8]>, token: &[u8]) -> bool {
    let Some(value) = header else {
        return false;
    };
    value
        .split(|&b| b == b',')
        .map(trim)
        .any(|t| t.eq_ignore_ascii_case(token))
}

/// Runs the dispatch envelope for one decoded request and serializes the
/// response into `outbound`. Returns whether the connection must close.
#[allow(clippy::too_many_arguments)]
fn process_request(
    buf: &[u8],
    parser: &RequestParser,
    outbound: &mut Vec<u8>,
    path_buf: &mut Vec<u8>,
    date: &mut DateCache,
    config: &ServerConfig,
    shared: &ServerShared,
    served: usize,
    pending_final: Option<HttpResponse>,
) -> Result<bool, ProtocolError> {
    let method = parser.method;
    let version = parser.version;
    let target = &buf[parser.target.clone()];
    let head_request = method == Method::Head;

    let keep = keep_alive_permitted(version, parser.header(buf, b"connection"), config, shared, served);
    let connection_value: Option<&'static str> = if !keep {
        Some("close")
    } else if version == Version::Http10 {
        Some("keep-alive")
    } else {
        None
    };

    // `OPTIONS *` is the only target that bypasses path normalization
    if method == Method::Options && target == b"*" {
        let mut resp = HttpResponse::new(StatusCode::NO_CONTENT);
        resp.push_raw_header("Allow", &MethodSet::all().allow_header(false));
        finalize(resp, outbound, date, config, shared, version, connection_value, head_request, None);
        return Ok(!keep);
    }

    let (raw_path, query) = request::split_target(target);
    request::percent_decode_path(raw_path, path_buf)?;
    let path: &str = simdutf8::basic::from_utf8(path_buf).map_err(|_| ProtocolError::BadPath)?;
    if !path.starts_with('/') || path.contains("//") {
        return Err(ProtocolError::BadPath);
    }

    // request decompression replaces the body view before dispatch
    let decompressed: Option<Vec<u8>>;
    let mut body = parser.body_slice(buf);
    if config.decompression.enable {
        if let Some(content_encoding) = parser.header(buf, b"content-encoding") {
            decompressed = decompress::decompress_body(content_encoding, body, &config.decompression)?;
            if let Some(bytes) = decompressed.as_deref() {
                body = bytes;
            }
        }
    }

    let headers = HeadersView::new(buf, &parser.scratch, &parser.headers);
    let trailers = HeadersView::new(buf, &parser.scratch, &parser.trailers);
    let bare = HttpRequest {
        method,
        target,
        path,
        query,
        version,
        headers,
        body,
        trailers,
        path_params: &[],
    };

    // expectation handler already produced the response
    if let Some(resp) = pending_final {
        finalize(resp, outbound, date, config, shared, version, connection_value, head_request, None);
        return Ok(!keep);
    }

    // built-in health probes
    if let Some(resp) = probe_response(&bare, config, shared) {
        finalize(resp, outbound, date, config, shared, version, connection_value, head_request, None);
        return Ok(!keep);
    }

    // TRACE echo
    if method == Method::Trace && config.trace_policy != TracePolicy::Disabled {
        let resp = trace_echo(&bare);
        finalize(resp, outbound, date, config, shared, version, connection_value, head_request, None);
        return Ok(!keep);
    }

    let router = shared.current_router();
    let negotiated = negotiate::select_encoding(
        bare.header(b"accept-encoding"),
        &config.compression.preferred_formats,
    );

    match router.lookup(path) {
        Lookup::Redirect(location) => {
            let mut resp = HttpResponse::new(StatusCode::MOVED_PERMANENTLY);
            resp.set_header("Location", &location);
            finalize(resp, outbound, date, config, shared, version, connection_value, head_request, None);
            Ok(!keep)
        }
        Lookup::NotFound => dispatch_default(
            &router, bare, outbound, date, config, shared, version, connection_value,
            head_request, negotiated, keep,
        ),
        Lookup::Found(matched) => {
            let params: Vec<PathParam<'_>> = matched
                .captures
                .iter()
                .map(|(key, value)| PathParam { key, value })
                .collect();
            let mut req = bare;
            req.path_params = &params;

            // CORS runs before any user code
            let mut cors_origin: Option<String> = None;
            if let Some(policy) = matched.cors {
                if cors::is_preflight(&req) {
                    match cors::evaluate_preflight(&req, policy, matched.methods) {
                        CorsOutcome::Forbidden => {
                            let resp = HttpResponse::new(StatusCode::FORBIDDEN);
                            finalize(resp, outbound, date, config, shared, version, connection_value, head_request, None);
                            return Ok(!keep);
                        }
                        CorsOutcome::MethodNotAllowed(methods) => {
                            let mut resp = HttpResponse::new(StatusCode::METHOD_NOT_ALLOWED);
                            resp.push_raw_header("Allow", &methods.allow_header(false));
                            finalize(resp, outbound, date, config, shared, version, connection_value, head_request, None);
                            return Ok(!keep);
                        }
                        CorsOutcome::Preflight(resp) => {
                            finalize(resp, outbound, date, config, shared, version, connection_value, head_request, None);
                            return Ok(!keep);
                        }
                        CorsOutcome::NotCors | CorsOutcome::AllowedOrigin(_) => {}
                    }
                } else {
                    match cors::evaluate_actual(&req, policy) {
                        CorsOutcome::Forbidden => {
                            let resp = HttpResponse::new(StatusCode::FORBIDDEN);
                            finalize(resp, outbound, date, config, shared, version, connection_value, head_request, None);
                            return Ok(!keep);
                        }
                        CorsOutcome::AllowedOrigin(origin) => cors_origin = Some(origin),
                        _ => {}
                    }
                }
            }

            let Some(slot) = matched.handler(method) else {
                // bare OPTIONS on a routed path advertises the allow set
                let resp = if method == Method::Options {
                    let mut resp = HttpResponse::new(StatusCode::NO_CONTENT);
                    resp.push_raw_header("Allow", &matched.methods.allow_header(true));
                    resp
                } else if router.default_buffered().is_some() || router.default_streaming().is_some() {
                    return dispatch_default(
                        &router, req.clone(), outbound, date, config, shared, version,
                        connection_value, head_request, negotiated, keep,
                    );
                } else {
                    let mut resp = HttpResponse::new(StatusCode::METHOD_NOT_ALLOWED);
                    resp.push_raw_header("Allow", &matched.methods.allow_header(true));
                    resp
                };
                finalize(resp, outbound, date, config, shared, version, connection_value, head_request, None);
                return Ok(!keep);
            };

            // request middleware: global then per-route
            if let Some(mut short) = middleware::run_request_chain(&req, &router.before, matched.before)
            {
                if let (Some(origin), Some(policy)) = (cors_origin.as_deref(), matched.cors) {
                    cors::apply_actual_headers(&mut short, policy, origin);
                }
                finalize(short, outbound, date, config, shared, version, connection_value, head_request, None);
                return Ok(!keep);
            }

            match slot {
                Slot::Buffered(handler) => {
                    let mut resp = invoke_buffered(handler.as_ref(), &req);
                    middleware::run_response_chain(&req, &mut resp, matched.after, &router.after);
                    if let (Some(origin), Some(policy)) = (cors_origin.as_deref(), matched.cors) {
                        cors::apply_actual_headers(&mut resp, policy, origin);
                    }
                    finalize(
                        resp, outbound, date, config, shared, version, connection_value,
                        head_request, Some(&negotiated),
                    );
                    Ok(!keep)
                }
                Slot::Streaming(handler) => {
                    let stream_close = invoke_streaming(
                        handler.as_ref(),
                        &req,
                        outbound,
                        date,
                        config,
                        version,
                        connection_value,
                        head_request,
                        &negotiated,
                        matched.after,
                        &router.after,
                        matched.cors,
                        cors_origin,
                    );
                    Ok(!keep || stream_close)
                }
            }
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn dispatch_default(
    router: &Router,
    req: HttpRequest<'_>,
    outbound: &mut Vec<u8>,
    date: &mut DateCache,
    config: &ServerConfig,
    shared: &ServerShared,
    version: Version,
    connection_value: Option<&'static str>,
    head_request: bool,
    negotiated: Negotiated,
    keep: bool,
) -> Result<bool, ProtocolError> {
    if let Some(handler) = router.default_buffered() {
        let mut resp = invoke_buffered(handler.as_ref(), &req);
        middleware::run_response_chain(&req, &mut resp, &[], &router.after);
        finalize(
            resp, outbound, date, config, shared, version, connection_value, head_request,
            Some(&negotiated),
        );
        return Ok(!keep);
    }
    if let Some(handler) = router.default_streaming() {
        let stream_close = invoke_streaming(
            handler.as_ref(),
            &req,
            outbound,
            date,
            config,
            version,
            connection_value,
            head_request,
            &negotiated,
            &[],
            &router.after,
            None,
            None,
        );
        return Ok(!keep || stream_close);
    }

    let resp = HttpResponse::new(StatusCode::NOT_FOUND)
        .with_content_type("text/html")
        .with_body(NOT_FOUND_HTML);
    finalize(resp, outbound, date, config, shared, version, connection_value, head_request, None);
    Ok(!keep)
}

fn invoke_buffered(
    handler: &(dyn Fn(&HttpRequest<'_>) -> HttpResponse + Send + Sync),
    req: &HttpRequest<'_>,
) -> HttpResponse {
    match catch_unwind(AssertUnwindSafe(|| handler(req))) {
        Ok(resp) => resp,
        Err(panic) => {
            log::error!("handler panicked: {}", panic_message(&panic));
            internal_error_response(&panic)
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn invoke_streaming(
    handler: &(dyn Fn(&HttpRequest<'_>, &mut ResponseWriter<'_>) + Send + Sync),
    req: &HttpRequest<'_>,
    outbound: &mut Vec<u8>,
    date: &mut DateCache,
    config: &ServerConfig,
    version: Version,
    connection_value: Option<&'static str>,
    head_request: bool,
    negotiated: &Negotiated,
    route_after: &[crate::router::middleware::ResponseMiddleware],
    global_after: &[crate::router::middleware::ResponseMiddleware],
    cors_policy: Option<&crate::router::cors::CorsPolicy>,
    cors_origin: Option<String>,
) -> bool {
    let encoding = match negotiated {
        Negotiated::Encoded(encoding) => Some(*encoding),
        _ => None,
    };

    let req_for_hook = req.clone();
    let on_headers: Box<dyn FnOnce(&mut HttpResponse) + Send + '_> = Box::new(move |resp| {
        middleware::run_response_chain(&req_for_hook, resp, route_after, global_after);
        if let (Some(policy), Some(origin)) = (cors_policy, cors_origin.as_deref()) {
            cors::apply_actual_headers(resp, policy, origin);
        }
    });

    let mut writer = ResponseWriter::new(WriterEnv {
        out: outbound,
        date,
        global_headers: &config.global_headers,
        compression: &config.compression,
        version,
        head_request,
        connection: connection_value,
        max_outbound: config.max_outbound_buffer_bytes,
        negotiated: encoding,
        on_headers: Some(on_headers),
    });

    if let Err(panic) = catch_unwind(AssertUnwindSafe(|| handler(req, &mut writer))) {
        log::error!("streaming handler panicked: {}", panic_message(&panic));
    }
    writer.end();
    writer.close_required()
}

fn panic_message(panic: &Box<dyn std::any::Any + Send>) -> &str {
    if let Some(text) = panic.downcast_ref::<&str>() {
        text
    } else if let Some(text) = panic.downcast_ref::<String>() {
        text
    } else {
        "unknown panic"
    }
}

fn internal_error_response(panic: &Box<dyn std::any::Any + Send>) -> HttpResponse {
    let resp = HttpResponse::new(StatusCode::INTERNAL_SERVER_ERROR);
    if cfg!(debug_assertions) {
        resp.with_content_type("text/plain")
            .with_body(panic_message(panic).to_owned())
    } else {
        resp.with_content_type("text/plain")
            .with_body("internal server error")
    }
}

/// Built-in health probes, matched ahead of routing.
fn probe_response(
    req: &HttpRequest<'_>,
    config: &ServerConfig,
    shared: &ServerShared,
) -> Option<HttpResponse> {
    let probes = config.builtin_probes.as_ref()?;
    if !matches!(req.method(), Method::Get | Method::Head) {
        return None;
    }

    let path = req.path();
    let resp = if path == probes.liveness_path {
        HttpResponse::new(StatusCode::OK)
            .with_content_type("text/plain")
            .with_body("OK\n")
    } else if path == probes.readiness_path {
        if shared.lifecycle.is_running() {
            HttpResponse::new(StatusCode::OK)
                .with_content_type("text/plain")
                .with_body("OK\n")
        } else {
            HttpResponse::new(StatusCode::SERVICE_UNAVAILABLE)
                .with_content_type("text/plain")
                .with_body("Not Ready\n")
        }
    } else if path == probes.startup_path {
        if shared.lifecycle.is_running() || shared.lifecycle.is_draining() {
            HttpResponse::new(StatusCode::OK)
                .with_content_type("text/plain")
                .with_body("OK\n")
        } else {
            HttpResponse::new(StatusCode::SERVICE_UNAVAILABLE)
                .with_content_type("text/plain")
                .with_body("Starting\n")
        }
    } else {
        return None;
    };
    Some(resp)
}

/// `TRACE` echo: the request head reflected as `message/http`.
fn trace_echo(req: &HttpRequest<'_>) -> HttpResponse {
    let mut body = Vec::new();
    body.extend_from_slice(req.method().as_str().as_bytes());
    body.push(b' ');
    body.extend_from_slice(req.target());
    body.push(b' ');
    body.extend_from_slice(req.version().as_str().as_bytes());
    body.extend_from_slice(b"\r\n");
    for (name, value) in req.headers().iter() {
        body.extend_from_slice(name);
        body.extend_from_slice(b": ");
        body.extend_from_slice(value);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(b"\r\n");

    HttpResponse::new(StatusCode::OK)
        .with_content_type("message/http")
        .with_body(body)
}

/// Serializes a buffered response: compression negotiation, framing, and
/// an inline file payload when one is installed.
#[allow(clippy::too_many_arguments)]
fn finalize(
    mut resp: HttpResponse,
    outbound: &mut Vec<u8>,
    date: &mut DateCache,
    config: &ServerConfig,
    shared: &ServerShared,
    version: Version,
    connection_value: Option<&'static str>,
    head_request: bool,
    negotiated: Option<&Negotiated>,
) {
    if let Some(negotiated) = negotiated {
        if !head_request {
            match negotiated {
                Negotiated::Encoded(encoding) => {
                    if compress::try_compress_response(&mut resp, *encoding, &config.compression) {
                        shared.stats.on_compression_fallback();
                    }
                }
                Negotiated::NotAcceptable => {
                    let eligible = resp.body_len() as usize >= config.compression.min_bytes
                        && config
                            .compression
                            .content_type_eligible(resp.header("Content-Type"))
                        && resp.header("Content-Encoding").is_none();
                    if eligible {
                        resp = HttpResponse::new(StatusCode::NOT_ACCEPTABLE);
                    }
                }
                Negotiated::Identity => {}
            }
        }
    }

    let env = EncodeEnv {
        version,
        date,
        connection: connection_value,
        head_request,
        global_headers: &config.global_headers,
    };
    match resp.encode_into(outbound, env) {
        BodyPlan::Done => {}
        BodyPlan::FilePayload(mut file, len) => {
            let mut remaining = len;
            let mut chunk = [0u8; 64 * 1024];
            while remaining > 0 {
                match file.read(&mut chunk) {
                    Ok(0) => break,
                    Ok(n) => {
                        let take = (n as u64).min(remaining) as usize;
                        outbound.extend_from_slice(&chunk[..take]);
                        remaining -= take as u64;
                    }
                    Err(err) => {
                        log::warn!("file payload read failed: {err}");
                        break;
                    }
                }
            }
        }
    }
}
