//! Compiled path trie and route matching.
//!
//! Nodes live in an arena indexed by `usize`, so the structure is plainly
//! cloneable for hot router swaps and free of self-referential pointers.
//! Lookup is a DFS trying literal children first (hash lookup), then
//! dynamic children in registration order, then the wildcard child;
//! parameter captures are truncated on backtrack.

use crate::http::method::{Method, MethodSet, NB_METHODS};
use crate::http::request::HttpRequest;
use crate::http::response::HttpResponse;
use crate::router::cors::CorsPolicy;
use crate::router::middleware::{RequestMiddleware, ResponseMiddleware};
use crate::router::pattern::{self, CompiledSegment, SegmentPart};
use crate::server::writer::ResponseWriter;
use std::collections::HashMap;
use std::sync::Arc;

/// Buffered handler: consumes the request, returns a complete response.
pub type RequestHandler = dyn Fn(&HttpRequest<'_>) -> HttpResponse + Send + Sync;

/// Streaming handler: emits the response incrementally through the writer.
pub type StreamingHandler = dyn Fn(&HttpRequest<'_>, &mut ResponseWriter<'_>) + Send + Sync;

/// The two handler shapes a route slot can hold.
#[derive(Clone)]
pub(crate) enum Slot {
    Buffered(Arc<RequestHandler>),
    Streaming(Arc<StreamingHandler>),
}

/// Resolution of paths differing only by a trailing slash.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum TrailingSlashPolicy {
    /// Exact-only matching.
    Strict,
    /// The missing variant maps silently onto the registered one.
    #[default]
    Normalize,
    /// 301 to the canonical (unslashed) form when only it is registered;
    /// the inverse redirect is never synthesized.
    Redirect,
}

/// Router-level configuration.
#[derive(Debug, Clone, Default)]
pub struct RouterConfig {
    pub trailing_slash_policy: TrailingSlashPolicy,
    /// Applied when a route carries no per-route policy.
    pub default_cors_policy: Option<CorsPolicy>,
}

#[derive(Clone, Default)]
struct HandlerTable {
    slots: [Option<Slot>; NB_METHODS],
}

impl HandlerTable {
    fn methods(&self) -> MethodSet {
        let mut set = MethodSet::EMPTY;
        for method in crate::http::method::ALL_METHODS {
            if self.slots[method.idx()].is_some() {
                set.insert(method);
            }
        }
        set
    }

    #[inline]
    fn is_empty(&self) -> bool {
        self.slots.iter().all(Option::is_none)
    }

    /// Handler for `method`, applying the HEAD -> GET fallback.
    fn resolve(&self, method: Method) -> Option<&Slot> {
        match &self.slots[method.idx()] {
            Some(slot) => Some(slot),
            None if method == Method::Head => self.slots[Method::Get.idx()].as_ref(),
            None => None,
        }
    }
}

#[derive(Clone, Default)]
struct RouteNode {
    literal: HashMap<String, usize>,
    dynamic: Vec<(Vec<SegmentPart>, usize)>,
    wildcard: Option<usize>,

    no_slash: HandlerTable,
    with_slash: HandlerTable,
    param_names: Vec<String>,

    cors: Option<CorsPolicy>,
    before: Vec<RequestMiddleware>,
    after: Vec<ResponseMiddleware>,
}

/// A matched route, borrowed from the router for the processing window of
/// one request.
pub(crate) struct RouteMatch<'r, 'p> {
    entry: &'r HandlerTable,
    /// Methods registered on the resolved slash-variant.
    pub(crate) methods: MethodSet,
    pub(crate) captures: Vec<(&'r str, &'p str)>,
    pub(crate) cors: Option<&'r CorsPolicy>,
    pub(crate) before: &'r [RequestMiddleware],
    pub(crate) after: &'r [ResponseMiddleware],
}

impl<'r, 'p> RouteMatch<'r, 'p> {
    #[inline]
    pub(crate) fn handler(&self, method: Method) -> Option<&'r Slot> {
        self.entry.resolve(method)
    }
}

pub(crate) enum Lookup<'r, 'p> {
    Found(RouteMatch<'r, 'p>),
    /// 301 with this `Location`.
    Redirect(String),
    NotFound,
}

/// HTTP request router with literal, parameterized and wildcard segments.
///
/// ```
/// use arbor_web::{HttpResponse, Method, Router, StatusCode};
///
/// let mut router = Router::default();
/// router.route(Method::Get, "/users/{id}", |req| {
///     let id = req.path_param("id").unwrap_or("?").to_owned();
///     HttpResponse::new(StatusCode::OK).with_body(id)
/// });
/// ```
#[derive(Clone)]
pub struct Router {
    config: RouterConfig,
    nodes: Vec<RouteNode>,
    default_buffered: Option<Arc<RequestHandler>>,
    default_streaming: Option<Arc<StreamingHandler>>,
    pub(crate) before: Vec<RequestMiddleware>,
    pub(crate) after: Vec<ResponseMiddleware>,
}

impl Default for Router {
    fn default() -> Self {
        Self::new(RouterConfig::default())
    }
}

impl Router {
    pub fn new(config: RouterConfig) -> Self {
        Self {
            config,
            nodes: vec![RouteNode::default()],
            default_buffered: None,
            default_streaming: None,
            before: Vec::new(),
            after: Vec::new(),
        }
    }

    #[inline]
    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    /// Registers a buffered handler for `path` and every method in
    /// `methods`.
    ///
    /// # Panics
    /// Panics when the pattern is invalid (see [`crate::RouteError`]).
    #[track_caller]
    pub fn route<H>(&mut self, methods: impl Into<MethodSet>, path: &str, handler: H) -> &mut Self
    where
        H: Fn(&HttpRequest<'_>) -> HttpResponse + Send + Sync + 'static,
    {
        self.register(methods.into(), path, Slot::Buffered(Arc::new(handler)));
        self
    }

    /// Registers a streaming handler for `path` and every method in
    /// `methods`.
    ///
    /// # Panics
    /// Panics when the pattern is invalid.
    #[track_caller]
    pub fn route_streaming<H>(
        &mut self,
        methods: impl Into<MethodSet>,
        path: &str,
        handler: H,
    ) -> &mut Self
    where
        H: Fn(&HttpRequest<'_>, &mut ResponseWriter<'_>) + Send + Sync + 'static,
    {
        self.register(methods.into(), path, Slot::Streaming(Arc::new(handler)));
        self
    }

    /// Installs the global fallback handler invoked when no route matches.
    pub fn set_default<H>(&mut self, handler: H) -> &mut Self
    where
        H: Fn(&HttpRequest<'_>) -> HttpResponse + Send + Sync + 'static,
    {
        self.default_buffered = Some(Arc::new(handler));
        self
    }

    pub fn set_default_streaming<H>(&mut self, handler: H) -> &mut Self
    where
        H: Fn(&HttpRequest<'_>, &mut ResponseWriter<'_>) + Send + Sync + 'static,
    {
        self.default_streaming = Some(Arc::new(handler));
        self
    }

    /// Attaches a CORS policy to the node for `path` (both slash variants).
    #[track_caller]
    pub fn set_route_cors(&mut self, path: &str, policy: CorsPolicy) -> &mut Self {
        let node = self.ensure_node(path);
        self.nodes[node].cors = Some(policy);
        self
    }

    /// Appends a request middleware running before the handler for `path`.
    #[track_caller]
    pub fn add_route_before(&mut self, path: &str, middleware: RequestMiddleware) -> &mut Self {
        let node = self.ensure_node(path);
        self.nodes[node].before.push(middleware);
        self
    }

    /// Appends a response middleware running after the handler for `path`.
    #[track_caller]
    pub fn add_route_after(&mut self, path: &str, middleware: ResponseMiddleware) -> &mut Self {
        let node = self.ensure_node(path);
        self.nodes[node].after.push(middleware);
        self
    }

    /// Appends a global request middleware (runs before per-route ones).
    pub fn add_before(&mut self, middleware: RequestMiddleware) -> &mut Self {
        self.before.push(middleware);
        self
    }

    /// Appends a global response middleware (runs after per-route ones).
    pub fn add_after(&mut self, middleware: ResponseMiddleware) -> &mut Self {
        self.after.push(middleware);
        self
    }

    #[inline]
    pub(crate) fn default_buffered(&self) -> Option<&Arc<RequestHandler>> {
        self.default_buffered.as_ref()
    }

    #[inline]
    pub(crate) fn default_streaming(&self) -> Option<&Arc<StreamingHandler>> {
        self.default_streaming.as_ref()
    }

    #[track_caller]
    fn register(&mut self, methods: MethodSet, path: &str, slot: Slot) {
        assert!(!methods.is_empty(), "route needs at least one method");
        let route = match pattern::compile(path) {
            Ok(route) => route,
            Err(err) => panic!("invalid route pattern {path:?}: {err}"),
        };

        let mut node = 0usize;
        for segment in &route.segments {
            node = match segment {
                CompiledSegment::Literal(lit) => self.ensure_literal_child(node, lit),
                CompiledSegment::Pattern(parts) => self.ensure_dynamic_child(node, parts),
            };
        }
        if route.wildcard {
            node = self.ensure_wildcard_child(node);
        }

        self.nodes[node].param_names = route.param_names;
        let table = if route.trailing_slash {
            &mut self.nodes[node].with_slash
        } else {
            &mut self.nodes[node].no_slash
        };
        for method in methods.iter() {
            table.slots[method.idx()] = Some(slot.clone());
        }
    }

    #[track_caller]
    fn ensure_node(&mut self, path: &str) -> usize {
        let route = match pattern::compile(path) {
            Ok(route) => route,
            Err(err) => panic!("invalid route pattern {path:?}: {err}"),
        };
        let mut node = 0usize;
        for segment in &route.segments {
            node = match segment {
                CompiledSegment::Literal(lit) => self.ensure_literal_child(node, lit),
                CompiledSegment::Pattern(parts) => self.ensure_dynamic_child(node, parts),
            };
        }
        if route.wildcard {
            node = self.ensure_wildcard_child(node);
        }
        node
    }

    fn ensure_literal_child(&mut self, node: usize, literal: &str) -> usize {
        if let Some(&child) = self.nodes[node].literal.get(literal) {
            return child;
        }
        let child = self.push_node();
        self.nodes[node].literal.insert(literal.to_owned(), child);
        child
    }

    fn ensure_dynamic_child(&mut self, node: usize, parts: &[SegmentPart]) -> usize {
        if let Some(&(_, child)) = self.nodes[node].dynamic.iter().find(|(p, _)| p == parts) {
            return child;
        }
        let child = self.push_node();
        self.nodes[node].dynamic.push((parts.to_vec(), child));
        child
    }

    fn ensure_wildcard_child(&mut self, node: usize) -> usize {
        if let Some(child) = self.nodes[node].wildcard {
            return child;
        }
        let child = self.push_node();
        self.nodes[node].wildcard = Some(child);
        child
    }

    fn push_node(&mut self) -> usize {
        self.nodes.push(RouteNode::default());
        self.nodes.len() - 1
    }

    /// Matches a normalized (percent-decoded, no empty segments) path.
    pub(crate) fn lookup<'r, 'p>(&'r self, path: &'p str) -> Lookup<'r, 'p> {
        let trailing = path.len() > 1 && path.ends_with('/');
        let trimmed = &path[1..path.len() - usize::from(trailing)];
        let segments: Vec<&str> = if trimmed.is_empty() {
            Vec::new()
        } else {
            trimmed.split('/').collect()
        };

        let mut raw_captures: Vec<(usize, &'p str)> = Vec::new();
        let Some(node) = self.descend(0, &segments, &mut raw_captures) else {
            return Lookup::NotFound;
        };
        let node = &self.nodes[node];

        let (exact, other) = if trailing {
            (&node.with_slash, &node.no_slash)
        } else {
            (&node.no_slash, &node.with_slash)
        };

        let entry = if !exact.is_empty() {
            exact
        } else {
            match self.config.trailing_slash_policy {
                TrailingSlashPolicy::Strict => return Lookup::NotFound,
                TrailingSlashPolicy::Normalize => {
                    if other.is_empty() {
                        return Lookup::NotFound;
                    }
                    other
                }
                TrailingSlashPolicy::Redirect => {
                    // only slashed-request -> canonical unslashed form
                    if trailing && !other.is_empty() {
                        return Lookup::Redirect(path[..path.len() - 1].to_owned());
                    }
                    return Lookup::NotFound;
                }
            }
        };

        let captures = raw_captures
            .into_iter()
            .filter_map(|(idx, value)| {
                node.param_names.get(idx).map(|name| (name.as_str(), value))
            })
            .collect();

        Lookup::Found(RouteMatch {
            entry,
            methods: entry.methods(),
            captures,
            cors: node.cors.as_ref().or(self.config.default_cors_policy.as_ref()),
            before: &node.before,
            after: &node.after,
        })
    }

    fn descend<'p>(
        &self,
        node: usize,
        segments: &[&'p str],
        captures: &mut Vec<(usize, &'p str)>,
    ) -> Option<usize> {
        if segments.is_empty() {
            return Some(node);
        }
        let current = &self.nodes[node];
        let (seg, rest) = (segments[0], &segments[1..]);

        if let Some(&child) = current.literal.get(seg) {
            if let Some(found) = self.descend(child, rest, captures) {
                return Some(found);
            }
        }

        for (parts, child) in &current.dynamic {
            let checkpoint = captures.len();
            if pattern::match_segment(parts, seg, captures) {
                if let Some(found) = self.descend(*child, rest, captures) {
                    return Some(found);
                }
            }
            captures.truncate(checkpoint);
        }

        // terminal wildcard: consumes the entire remainder, no captures
        current.wildcard
    }
}
