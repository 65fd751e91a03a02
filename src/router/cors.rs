//! Cross-origin resource sharing: per-route or router-default policies,
//! preflight and actual-request handling.

use crate::http::method::{Method, MethodSet};
use crate::http::request::HttpRequest;
use crate::http::response::HttpResponse;
use crate::http::status::StatusCode;

/// A CORS policy. Attach one per route (wins) or as the router default.
///
/// The default-constructed policy denies every cross-origin request; opt in
/// with [`CorsPolicy::any_origin`] or [`CorsPolicy::with_origin`].
#[derive(Debug, Clone, Default)]
pub struct CorsPolicy {
    pub allow_any_origin: bool,
    pub allowed_origins: Vec<String>,
    /// Methods advertised in preflight responses. Empty falls back to the
    /// route's registered method set.
    pub allowed_methods: MethodSet,
    pub allow_any_headers: bool,
    pub allowed_headers: Vec<String>,
    pub expose_headers: Vec<String>,
    pub allow_credentials: bool,
    pub max_age_secs: Option<u64>,
    pub allow_private_network: bool,
}

impl CorsPolicy {
    /// Policy allowing every origin (`Access-Control-Allow-Origin: *`
    /// unless credentials mode forces mirroring).
    pub fn any_origin() -> Self {
        Self {
            allow_any_origin: true,
            allow_any_headers: true,
            ..Self::default()
        }
    }

    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.allowed_origins.push(origin.into());
        self
    }

    pub fn with_methods(mut self, methods: impl Into<MethodSet>) -> Self {
        self.allowed_methods = methods.into();
        self
    }

    pub fn with_header(mut self, name: impl Into<String>) -> Self {
        self.allowed_headers.push(name.into());
        self
    }

    pub fn with_credentials(mut self) -> Self {
        self.allow_credentials = true;
        self
    }

    pub fn with_max_age_secs(mut self, secs: u64) -> Self {
        self.max_age_secs = Some(secs);
        self
    }

    #[inline]
    fn origin_allowed(&self, origin: &str) -> bool {
        self.allow_any_origin || self.allowed_origins.iter().any(|o| o == origin)
    }

    #[inline]
    fn header_allowed(&self, name: &[u8]) -> bool {
        self.allow_any_headers
            || self
                .allowed_headers
                .iter()
                .any(|h| h.as_bytes().eq_ignore_ascii_case(name))
    }

    /// The origin value to emit, mirroring the request origin whenever
    /// credentials are allowed (a credentialed `*` is rejected by browsers).
    #[inline]
    fn emitted_origin<'a>(&'a self, origin: &'a str) -> &'a str {
        if self.allow_any_origin && !self.allow_credentials {
            "*"
        } else {
            origin
        }
    }
}

/// Is this request a CORS preflight?
#[inline]
pub(crate) fn is_preflight(request: &HttpRequest<'_>) -> bool {
    request.method() == Method::Options
        && request.header(b"origin").is_some()
        && request.header(b"access-control-request-method").is_some()
}

/// Outcome of the CORS stage of the dispatch envelope.
pub(crate) enum CorsOutcome {
    /// Not a cross-origin request; continue untouched.
    NotCors,
    /// Deny with 403 before any user code runs.
    Forbidden,
    /// Preflight for a method the route does not serve: 405 + `Allow`.
    MethodNotAllowed(MethodSet),
    /// Complete preflight response, ready to send.
    Preflight(HttpResponse),
    /// Actual request allowed; decorate the handler response with
    /// [`apply_actual_headers`] using this origin.
    AllowedOrigin(String),
}

/// Evaluates a preflight request against the policy and the route's
/// registered method set (`Allow` reports registrations verbatim, without
/// the HEAD fallback).
pub(crate) fn evaluate_preflight(
    request: &HttpRequest<'_>,
    policy: &CorsPolicy,
    route_methods: MethodSet,
) -> CorsOutcome {
    let Some(origin) = request.header(b"origin").and_then(|o| std::str::from_utf8(o).ok()) else {
        return CorsOutcome::NotCors;
    };
    if !policy.origin_allowed(origin) {
        return CorsOutcome::Forbidden;
    }

    let requested_method = request
        .header(b"access-control-request-method")
        .and_then(Method::from_token);
    let Some(requested_method) = requested_method else {
        return CorsOutcome::Forbidden;
    };
    if !route_methods.contains(requested_method) {
        return CorsOutcome::MethodNotAllowed(route_methods);
    }
    if !policy.allowed_methods.is_empty() && !policy.allowed_methods.contains(requested_method) {
        return CorsOutcome::Forbidden;
    }

    if let Some(requested_headers) = request.header(b"access-control-request-headers") {
        for name in requested_headers.split(|&b| b == b',') {
            let name = trim(name);
            if !name.is_empty() && !policy.header_allowed(name) {
                return CorsOutcome::Forbidden;
            }
        }
    }

    let mut resp = HttpResponse::new(StatusCode::NO_CONTENT);
    let emitted = policy.emitted_origin(origin);
    resp.set_header("Access-Control-Allow-Origin", emitted);
    if emitted != "*" {
        resp.append_vary("Origin");
    }

    let methods = if policy.allowed_methods.is_empty() {
        route_methods
    } else {
        policy.allowed_methods
    };
    resp.set_header("Access-Control-Allow-Methods", &methods.allow_header(false));

    if policy.allow_any_headers {
        if let Some(requested) = request.header(b"access-control-request-headers") {
            resp.set_header(
                "Access-Control-Allow-Headers",
                &String::from_utf8_lossy(requested),
            );
        }
    } else if !policy.allowed_headers.is_empty() {
        resp.set_header("Access-Control-Allow-Headers", &policy.allowed_headers.join(", "));
    }

    if policy.allow_credentials {
        resp.set_header("Access-Control-Allow-Credentials", "true");
    }
    if let Some(max_age) = policy.max_age_secs {
        let mut buf = itoa::Buffer::new();
        resp.set_header("Access-Control-Max-Age", buf.format(max_age));
    }
    if policy.allow_private_network
        && request
            .header(b"access-control-request-private-network")
            .map(|v| v.eq_ignore_ascii_case(b"true"))
            .unwrap_or(false)
    {
        resp.set_header("Access-Control-Allow-Private-Network", "true");
    }

    CorsOutcome::Preflight(resp)
}

/// Evaluates an actual (non-preflight) request.
pub(crate) fn evaluate_actual(request: &HttpRequest<'_>, policy: &CorsPolicy) -> CorsOutcome {
    let Some(origin) = request.header(b"origin").and_then(|o| std::str::from_utf8(o).ok()) else {
        return CorsOutcome::NotCors;
    };
    if !policy.origin_allowed(origin) {
        return CorsOutcome::Forbidden;
    }
    CorsOutcome::AllowedOrigin(origin.to_owned())
}

/// Decorates an allowed actual-request response.
pub(crate) fn apply_actual_headers(resp: &mut HttpResponse, policy: &CorsPolicy, origin: &str) {
    let emitted = policy.emitted_origin(origin);
    resp.set_header("Access-Control-Allow-Origin", emitted);
    if emitted != "*" {
        resp.append_vary("Origin");
    }
    if policy.allow_credentials {
        resp.set_header("Access-Control-Allow-Credentials", "true");
    }
    if !policy.expose_headers.is_empty() {
        resp.set_header(
            "Access-Control-Expose-Headers",
            &policy.expose_headers.join(", "),
        );
    }
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
