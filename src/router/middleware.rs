//! Request / response middleware chains.

use crate::http::request::HttpRequest;
use crate::http::response::HttpResponse;
use crate::http::status::StatusCode;
use std::sync::Arc;

/// Outcome of a request middleware.
pub enum MiddlewareVerdict {
    /// Proceed to the next middleware / the handler.
    Continue,
    /// Short-circuit with this response; the handler never runs.
    Respond(HttpResponse),
    /// Short-circuit with a bare status and reason phrase.
    Fail(StatusCode, String),
}

/// Runs before the handler; may short-circuit the request.
pub type RequestMiddleware = Arc<dyn Fn(&HttpRequest<'_>) -> MiddlewareVerdict + Send + Sync>;

/// Runs after the handler; may mutate the response but cannot block it.
pub type ResponseMiddleware = Arc<dyn Fn(&HttpRequest<'_>, &mut HttpResponse) + Send + Sync>;

/// Runs the `before` chains in order; `None` means all middlewares passed.
///
/// Order is global-before then per-route-before, mirroring the dispatch
/// envelope (the response side unwinds per-route-after then global-after).
pub(crate) fn run_request_chain(
    request: &HttpRequest<'_>,
    global: &[RequestMiddleware],
    per_route: &[RequestMiddleware],
) -> Option<HttpResponse> {
    for middleware in global.iter().chain(per_route) {
        match middleware(request) {
            MiddlewareVerdict::Continue => {}
            MiddlewareVerdict::Respond(resp) => return Some(resp),
            MiddlewareVerdict::Fail(status, reason) => {
                return Some(HttpResponse::new(status).with_reason(reason));
            }
        }
    }
    None
}

pub(crate) fn run_response_chain(
    request: &HttpRequest<'_>,
    response: &mut HttpResponse,
    per_route: &[ResponseMiddleware],
    global: &[ResponseMiddleware],
) {
    for middleware in per_route.iter().chain(global) {
        middleware(request, response);
    }
}
