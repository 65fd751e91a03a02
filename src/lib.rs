//! arbor_web - embeddable single-reactor HTTP/1.x server engine
//!
//! An event-driven HTTP/1.0 & HTTP/1.1 request/response engine for
//! embedding into services: trie routing with parameter captures,
//! pipelining, keep-alive, chunked transfer with trailers, streaming
//! responses with backpressure, request decompression and response
//! compression negotiation, graceful draining and hot configuration
//! updates.
//!
//! # Architecture
//!
//! One server instance is one reactor: an accept loop plus a fixed pool of
//! reusable connection workers, all driven inside an internal
//! [`tokio::task::LocalSet`] by the future [`Server::run`] returns. That
//! future is `!Send`, which pins every handler, middleware and posted
//! router/config update to the one thread awaiting it — on any runtime
//! flavor, no two handlers ever run concurrently. No worker threads are
//! spawned per request; for CPU scaling, run several instances (with
//! `reuse_port = true`) on separate threads.
//!
//! # Quick start
//!
//! ```no_run
//! use arbor_web::{HttpResponse, Method, Router, Server, ServerConfig, StatusCode};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> std::io::Result<()> {
//!     let mut router = Router::default();
//!     router.route(Method::Get, "/hello", |_req| {
//!         HttpResponse::new(StatusCode::OK)
//!             .with_content_type("text/plain")
//!             .with_body("world")
//!     });
//!
//!     let mut server = Server::builder()
//!         .config(ServerConfig { port: 8080, ..ServerConfig::default() })
//!         .router(router)
//!         .build()?;
//!     server.run().await
//! }
//! ```

pub(crate) mod codec {
    pub(crate) mod compress;
    pub(crate) mod decompress;
    pub(crate) mod encoding;
    pub(crate) mod negotiate;
}
pub(crate) mod http {
    pub(crate) mod date;
    pub(crate) mod headers;
    pub(crate) mod method;
    pub(crate) mod parser;
    pub(crate) mod query;
    pub(crate) mod request;
    pub(crate) mod response;
    pub(crate) mod status;
    pub(crate) mod version;
}
pub(crate) mod router {
    pub(crate) mod cors;
    pub(crate) mod middleware;
    pub(crate) mod pattern;
    pub(crate) mod trie;
}
pub(crate) mod server {
    pub(crate) mod config;
    pub(crate) mod conn;
    pub(crate) mod lifecycle;
    pub(crate) mod server_impl;
    pub(crate) mod writer;
}
pub(crate) mod errors;

pub use crate::{
    codec::compress::CompressionConfig,
    codec::decompress::DecompressionConfig,
    codec::encoding::Encoding,
    errors::RouteError,
    http::headers::HeadersView,
    http::method::{Method, MethodSet},
    http::query::QueryPairs,
    http::request::{HttpRequest, PathParam},
    http::response::HttpResponse,
    http::status::StatusCode,
    http::version::Version,
    router::cors::CorsPolicy,
    router::middleware::{MiddlewareVerdict, RequestMiddleware, ResponseMiddleware},
    router::trie::{Router, RouterConfig, TrailingSlashPolicy},
    server::config::{KeepAliveMode, ProbeConfig, ServerConfig, TracePolicy},
    server::conn::{ExpectationHandler, ExpectationResult, ParserErrorCallback},
    server::lifecycle::LifecycleState,
    server::server_impl::{Server, ServerBuilder, ServerHandle, ServerStats},
    server::writer::ResponseWriter,
};
