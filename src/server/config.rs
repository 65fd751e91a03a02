//! Server configuration: limits, timeouts, keep-alive policy and codec
//! tuning.
//!
//! # Security-first defaults
//!
//! Defaults are conservative to blunt resource-exhaustion attacks: bounded
//! header and body sizes, per-phase read deadlines, a cap on pipelined
//! requests per connection, and outbound backpressure with
//! close-after-drain.
//!
//! # Examples
//!
//! ```no_run
//! use arbor_web::{Server, ServerConfig};
//! use std::time::Duration;
//!
//! let config = ServerConfig {
//!     port: 8080,
//!     max_body_bytes: 16 * 1024,
//!     keep_alive_timeout: Duration::from_secs(30),
//!     ..ServerConfig::default()
//! };
//! let server = Server::builder().config(config).build().unwrap();
//! ```

use crate::codec::compress::CompressionConfig;
use crate::codec::decompress::DecompressionConfig;
use std::time::Duration;

/// Keep-alive policy for HTTP/1.x connections.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum KeepAliveMode {
    /// Honor the client's connection preference (default).
    #[default]
    Enabled,
    /// Force `Connection: close` on every response.
    Disabled,
}

/// Whether `TRACE` requests are echoed back.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum TracePolicy {
    /// TRACE falls through to routing (normally 404/405).
    #[default]
    Disabled,
    /// Echo on plaintext connections only.
    EnabledPlainOnly,
    /// Echo on plaintext and TLS-terminated connections.
    EnabledPlainAndTls,
}

/// Built-in health probe routes.
#[derive(Debug, Clone)]
pub struct ProbeConfig {
    pub liveness_path: String,
    pub readiness_path: String,
    pub startup_path: String,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            liveness_path: "/livez".to_owned(),
            readiness_path: "/readyz".to_owned(),
            startup_path: "/startupz".to_owned(),
        }
    }
}

/// Full server configuration.
///
/// `port`, `reuse_port` and `nb_threads` are immutable once the server is
/// built; every other field may be changed at runtime through
/// [`crate::Server::post_config_update`] (the immutable fields are restored
/// after each posted updater runs).
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// TCP port to bind; `0` picks an ephemeral port. Immutable at runtime.
    pub port: u16,

    /// Enable `SO_REUSEPORT` on the listener, allowing several server
    /// instances to share one port. Immutable at runtime.
    pub reuse_port: bool,

    /// Reserved for a multi-reactor harness; a single reactor is `1`.
    /// Immutable at runtime.
    pub nb_threads: usize,

    /// Cap on request headers and trailers, request line included
    /// (default: `8 KiB`). Exceeding yields 431.
    pub max_header_bytes: usize,

    /// Cap on the request body after transfer decoding and decompression
    /// (default: `1 MiB`). Exceeding yields 413.
    pub max_body_bytes: usize,

    /// Outbound buffer backpressure threshold (default: `1 MiB`). A
    /// connection whose buffered output exceeds it is closed after the
    /// buffer drains; streaming writers observe `write_body() == false`.
    pub max_outbound_buffer_bytes: usize,

    /// Fairness cap on bytes consumed per readable event
    /// (default: `64 KiB`).
    pub max_per_event_read_bytes: usize,

    /// Initial read buffer growth step (default: `4 KiB`).
    pub initial_read_chunk_bytes: usize,

    /// Size of the pooled connection-worker set: the number of reusable
    /// connection contexts, and thus of concurrently served connections
    /// (default: `128`).
    pub max_cached_connections: usize,

    /// Connections queued for admission beyond the worker pool before new
    /// arrivals are answered with an immediate 503 (default: `256`).
    pub max_pending_connections: usize,

    /// Fairness bound on connections accepted per loop cycle: once the
    /// listener fires, at most this many ready sockets are drained before
    /// the loop services existing connections again (default: `16`).
    pub accept_batch_size: usize,

    pub keep_alive_mode: KeepAliveMode,

    /// Idle deadline between requests on a kept-alive connection
    /// (default: `15s`).
    pub keep_alive_timeout: Duration,

    /// Cap on requests served per connection; `0` = unlimited
    /// (default: `100`).
    pub max_requests_per_connection: usize,

    /// Deadline for reading the request head (default: `10s`). A timeout
    /// after partial progress earns a best-effort 408.
    pub header_read_timeout: Duration,

    /// Deadline for reading the request body (default: `30s`).
    pub body_read_timeout: Duration,

    /// Upper bound on one blocking poll wait; governs responsiveness of
    /// `stop` / `run_until` predicates (default: `500ms`).
    pub poll_interval: Duration,

    /// Socket write deadline per flush (default: `10s`).
    pub write_timeout: Duration,

    /// Disable Nagle on accepted sockets (default: `true`).
    pub tcp_nodelay: bool,

    /// Response compression tuning.
    pub compression: CompressionConfig,

    /// Request decompression tuning.
    pub decompression: DecompressionConfig,

    /// Merge duplicate unknown request headers with a comma instead of
    /// rejecting them (default: `true`).
    pub merge_unknown_request_headers: bool,

    /// `TRACE` echo policy (default: disabled).
    pub trace_policy: TracePolicy,

    /// Headers merged into every response unless shadowed by the handler.
    pub global_headers: Vec<(String, String)>,

    /// Enable `/livez`, `/readyz`, `/startupz` built-in probes.
    pub builtin_probes: Option<ProbeConfig>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 0,
            reuse_port: false,
            nb_threads: 1,
            max_header_bytes: 8 * 1024,
            max_body_bytes: 1024 * 1024,
            max_outbound_buffer_bytes: 1024 * 1024,
            max_per_event_read_bytes: 64 * 1024,
            initial_read_chunk_bytes: 4 * 1024,
            max_cached_connections: 128,
            max_pending_connections: 256,
            accept_batch_size: 16,
            keep_alive_mode: KeepAliveMode::Enabled,
            keep_alive_timeout: Duration::from_secs(15),
            max_requests_per_connection: 100,
            header_read_timeout: Duration::from_secs(10),
            body_read_timeout: Duration::from_secs(30),
            poll_interval: Duration::from_millis(500),
            write_timeout: Duration::from_secs(10),
            tcp_nodelay: true,
            compression: CompressionConfig::default(),
            decompression: DecompressionConfig::default(),
            merge_unknown_request_headers: true,
            trace_policy: TracePolicy::default(),
            global_headers: Vec::new(),
            builtin_probes: None,
        }
    }
}

impl ServerConfig {
    /// Restores the fields that are immutable at runtime from `original`.
    pub(crate) fn restore_immutable(&mut self, original: &ServerConfig) {
        self.port = original.port;
        self.reuse_port = original.reuse_port;
        self.nb_threads = original.nb_threads;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn immutable_fields_restored() {
        let original = ServerConfig {
            port: 8080,
            reuse_port: true,
            ..ServerConfig::default()
        };
        let mut updated = original.clone();
        updated.port = 9999;
        updated.reuse_port = false;
        updated.nb_threads = 8;
        updated.max_body_bytes = 42;

        updated.restore_immutable(&original);
        assert_eq!(updated.port, 8080);
        assert!(updated.reuse_port);
        assert_eq!(updated.nb_threads, 1);
        // mutable fields keep the update
        assert_eq!(updated.max_body_bytes, 42);
    }
}
