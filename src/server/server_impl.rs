//! Server assembly: listener setup, accept loop, pooled connection
//! workers, lifecycle control and hot config/router updates.

use crate::http::status::StatusCode;
use crate::router::trie::Router;
use crate::server::config::ServerConfig;
use crate::server::conn::{
    serve_connection, ConnContext, ExpectationHandler, ParserErrorCallback, OVERLOAD_RESPONSE,
};
use crate::server::lifecycle::{Lifecycle, LifecycleState};
use crossbeam::queue::SegQueue;
use socket2::{Domain, Protocol, Socket, Type};
use std::io;
use std::net::SocketAddr;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

/// Point-in-time server counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ServerStats {
    pub connections_accepted: u64,
    pub requests_served: u64,
    pub bytes_written: u64,
    /// Responses whose compressed form was discarded by the ratio guard.
    pub compression_ratio_fallbacks: u64,
}

#[derive(Debug, Default)]
pub(crate) struct StatsInternal {
    connections_accepted: AtomicU64,
    requests_served: AtomicU64,
    bytes_written: AtomicU64,
    compression_ratio_fallbacks: AtomicU64,
}

impl StatsInternal {
    #[inline]
    pub(crate) fn on_accept(&self) {
        self.connections_accepted.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn on_response(&self, bytes: u64) {
        self.requests_served.fetch_add(1, Ordering::Relaxed);
        self.bytes_written.fetch_add(bytes, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn on_compression_fallback(&self) {
        self.compression_ratio_fallbacks.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> ServerStats {
        ServerStats {
            connections_accepted: self.connections_accepted.load(Ordering::Relaxed),
            requests_served: self.requests_served.load(Ordering::Relaxed),
            bytes_written: self.bytes_written.load(Ordering::Relaxed),
            compression_ratio_fallbacks: self.compression_ratio_fallbacks.load(Ordering::Relaxed),
        }
    }
}

type ConfigUpdater = Box<dyn FnOnce(&mut ServerConfig) + Send>;
type RouterUpdater = Box<dyn FnOnce(&mut Router) + Send>;

#[derive(Default)]
struct PendingUpdates {
    config: Vec<ConfigUpdater>,
    router: Vec<RouterUpdater>,
}

/// State shared between the accept loop, the connection workers and
/// control calls from other threads.
pub(crate) struct ServerShared {
    config: Mutex<Arc<ServerConfig>>,
    router: Mutex<Arc<Router>>,
    pending: Mutex<PendingUpdates>,
    pub(crate) lifecycle: Lifecycle,
    pub(crate) stats: StatsInternal,
    active_connections: AtomicUsize,
    expectation: Mutex<Option<ExpectationHandler>>,
    parser_error: Mutex<Option<ParserErrorCallback>>,
}

impl ServerShared {
    pub(crate) fn new(config: ServerConfig, router: Router) -> Self {
        Self {
            config: Mutex::new(Arc::new(config)),
            router: Mutex::new(Arc::new(router)),
            pending: Mutex::new(PendingUpdates::default()),
            lifecycle: Lifecycle::new(),
            stats: StatsInternal::default(),
            active_connections: AtomicUsize::new(0),
            expectation: Mutex::new(None),
            parser_error: Mutex::new(None),
        }
    }

    #[inline]
    pub(crate) fn current_config(&self) -> Arc<ServerConfig> {
        self.config.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    #[inline]
    pub(crate) fn current_router(&self) -> Arc<Router> {
        self.router.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    #[inline]
    pub(crate) fn expectation_handler(&self) -> Option<ExpectationHandler> {
        self.expectation.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub(crate) fn set_expectation(&self, handler: Option<ExpectationHandler>) {
        *self.expectation.lock().unwrap_or_else(|e| e.into_inner()) = handler;
    }

    pub(crate) fn notify_parser_error(&self, status: StatusCode) {
        let callback = self.parser_error.lock().unwrap_or_else(|e| e.into_inner()).clone();
        if let Some(callback) = callback {
            callback(status);
        }
    }

    /// Drains the posted updater queues; runs at the top of each loop
    /// iteration on the loop task. Updater panics are caught and logged;
    /// immutable config fields are restored after each updater.
    fn apply_pending_updates(&self) {
        let pending = {
            let mut guard = self.pending.lock().unwrap_or_else(|e| e.into_inner());
            std::mem::take(&mut *guard)
        };

        for updater in pending.config {
            let current = self.current_config();
            let mut next = (*current).clone();
            let outcome = catch_unwind(AssertUnwindSafe(|| updater(&mut next)));
            match outcome {
                Ok(()) => {
                    next.restore_immutable(&current);
                    *self.config.lock().unwrap_or_else(|e| e.into_inner()) = Arc::new(next);
                }
                Err(_) => log::error!("config updater panicked; update discarded"),
            }
        }

        for updater in pending.router {
            let current = self.current_router();
            let mut next = (*current).clone();
            let outcome = catch_unwind(AssertUnwindSafe(|| updater(&mut next)));
            match outcome {
                Ok(()) => {
                    *self.router.lock().unwrap_or_else(|e| e.into_inner()) = Arc::new(next);
                }
                Err(_) => log::error!("router updater panicked; update discarded"),
            }
        }
    }
}

/// Builder for [`Server`].
pub struct ServerBuilder {
    config: ServerConfig,
    router: Router,
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self {
            config: ServerConfig::default(),
            router: Router::default(),
        }
    }
}

impl ServerBuilder {
    #[inline]
    pub fn config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    #[inline]
    pub fn router(mut self, router: Router) -> Self {
        self.router = router;
        self
    }

    /// Binds the listener and assembles the server.
    ///
    /// With `port = 0` an ephemeral port is chosen and visible through
    /// [`Server::port`] immediately after this call.
    pub fn build(self) -> io::Result<Server> {
        let listener = bind_listener(&self.config)?;
        let port = listener.local_addr()?.port();

        let mut config = self.config;
        config.port = port;
        Ok(Server {
            shared: Arc::new(ServerShared::new(config, self.router)),
            listener: Some(listener),
            port,
        })
    }
}

fn bind_listener(config: &ServerConfig) -> io::Result<std::net::TcpListener> {
    let socket = Socket::new(Domain::IPV4, Type::STREAM, Some(Protocol::TCP))?;
    socket.set_reuse_address(true)?;
    if config.reuse_port {
        socket.set_reuse_port(true)?;
    }
    let addr: SocketAddr = ([0, 0, 0, 0], config.port).into();
    socket.bind(&addr.into())?;
    socket.listen(1024)?;
    socket.set_nonblocking(true)?;
    Ok(socket.into())
}

/// An embeddable HTTP/1.x server instance: one accept loop plus a pool of
/// reusable connection workers, all driven by the runtime that awaits
/// [`run`](Server::run).
///
/// ```no_run
/// use arbor_web::{HttpResponse, Method, Router, Server, ServerConfig, StatusCode};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> std::io::Result<()> {
/// let mut router = Router::default();
/// router.route(Method::Get, "/hello", |_req| {
///     HttpResponse::new(StatusCode::OK)
///         .with_content_type("text/plain")
///         .with_body("world")
/// });
///
/// let mut server = Server::builder()
///     .config(ServerConfig { port: 8080, ..ServerConfig::default() })
///     .router(router)
///     .build()?;
/// server.run().await
/// # }
/// ```
pub struct Server {
    shared: Arc<ServerShared>,
    listener: Option<std::net::TcpListener>,
    port: u16,
}

/// Cloneable control handle for stopping or draining a running server from
/// another task or thread.
#[derive(Clone)]
pub struct ServerHandle {
    shared: Arc<ServerShared>,
}

impl ServerHandle {
    /// Requests cooperative termination; see [`Server::stop`].
    pub fn stop(&self) {
        self.shared.lifecycle.set_state(LifecycleState::Stopping);
    }

    /// Initiates graceful draining; see [`Server::begin_drain`].
    pub fn begin_drain(&self, max_wait: Option<Duration>) {
        self.shared.lifecycle.begin_drain(max_wait.map(|d| Instant::now() + d));
    }

    pub fn is_running(&self) -> bool {
        self.shared.lifecycle.is_running()
    }

    pub fn is_draining(&self) -> bool {
        self.shared.lifecycle.is_draining()
    }
}

impl Server {
    #[inline]
    pub fn builder() -> ServerBuilder {
        ServerBuilder::default()
    }

    /// The actual bound port (resolved when `port = 0` was configured).
    #[inline]
    pub fn port(&self) -> u16 {
        self.port
    }

    /// A cloneable control handle usable from other threads.
    pub fn handle(&self) -> ServerHandle {
        ServerHandle {
            shared: self.shared.clone(),
        }
    }

    pub fn is_running(&self) -> bool {
        self.shared.lifecycle.is_running()
    }

    pub fn is_draining(&self) -> bool {
        self.shared.lifecycle.is_draining()
    }

    /// Current statistics snapshot.
    pub fn stats(&self) -> ServerStats {
        self.shared.stats.snapshot()
    }

    /// Requests cooperative termination of the event loop. The listener
    /// closes immediately once the loop observes the request; in-flight
    /// connections are allowed to finish. Safe to call from another
    /// thread; latency is bounded by `poll_interval`. Idempotent.
    pub fn stop(&self) {
        self.handle().stop();
    }

    /// Initiates graceful draining: subsequently finalized responses carry
    /// `Connection: close`, while the listener stays open so health probes
    /// observe the drain. With `max_wait` a hard deadline closes the
    /// remaining connections; calling again only shrinks an existing
    /// deadline.
    pub fn begin_drain(&self, max_wait: Option<Duration>) {
        self.handle().begin_drain(max_wait);
    }

    /// Posts a configuration updater applied on the loop task at the top
    /// of the next iteration. The immutable fields (`port`, `reuse_port`,
    /// `nb_threads`) are restored after the updater runs.
    pub fn post_config_update(&self, updater: impl FnOnce(&mut ServerConfig) + Send + 'static) {
        let mut pending = self.shared.pending.lock().unwrap_or_else(|e| e.into_inner());
        pending.config.push(Box::new(updater));
        drop(pending);
        self.shared.lifecycle.wakeup.notify_one();
    }

    /// Posts a router updater applied on the loop task with exclusive
    /// access to the router.
    pub fn post_router_update(&self, updater: impl FnOnce(&mut Router) + Send + 'static) {
        let mut pending = self.shared.pending.lock().unwrap_or_else(|e| e.into_inner());
        pending.router.push(Box::new(updater));
        drop(pending);
        self.shared.lifecycle.wakeup.notify_one();
    }

    /// Registers the handler consulted for `Expect` tokens other than
    /// `100-continue`. Pass `None` to clear.
    pub fn set_expectation_handler(&self, handler: Option<ExpectationHandler>) {
        self.shared.set_expectation(handler);
    }

    /// Registers a callback invoked with the status code of each
    /// protocol-level rejection. Pass `None` to clear.
    pub fn set_parser_error_callback(&self, callback: Option<ParserErrorCallback>) {
        *self.shared.parser_error.lock().unwrap_or_else(|e| e.into_inner()) = callback;
    }

    /// Runs the server until [`stop`](Server::stop) is called.
    ///
    /// The returned future is `!Send`: the accept loop and every pooled
    /// connection worker run on an internal [`tokio::task::LocalSet`], so
    /// handlers, middleware and posted updaters all execute on the one
    /// thread awaiting this future, whatever runtime flavor the caller
    /// uses. Await it directly (`block_on`, `join!`) instead of
    /// `tokio::spawn`; for a background server, dedicate a thread running
    /// its own current-thread runtime.
    pub async fn run(&mut self) -> io::Result<()> {
        self.run_until(|| false).await
    }

    /// Runs the server until the predicate returns true (checked once per
    /// loop iteration) or [`stop`](Server::stop) is called. The predicate
    /// is polled at least every `poll_interval`. See [`run`](Server::run)
    /// for the threading model.
    pub async fn run_until(&mut self, predicate: impl FnMut() -> bool) -> io::Result<()> {
        // every worker is a LocalSet task: no two handler invocations can
        // ever be scheduled on two threads, on any runtime flavor
        let local = tokio::task::LocalSet::new();
        let event_loop = self.event_loop(predicate);
        local.run_until(event_loop).await
    }

    async fn event_loop(&mut self, predicate: impl FnMut() -> bool) -> io::Result<()> {
        let mut predicate = predicate;

        let std_listener = match self.listener.take() {
            Some(listener) => listener,
            None => {
                // stopped earlier: rebind on the same resolved port
                let config = self.shared.current_config();
                bind_listener(&config)?
            }
        };
        let listener = TcpListener::from_std(std_listener)?;

        let queue: Arc<SegQueue<TcpStream>> = Arc::new(SegQueue::new());
        let config = self.shared.current_config();
        let mut workers = Vec::with_capacity(config.max_cached_connections);
        for _ in 0..config.max_cached_connections.max(1) {
            workers.push(spawn_worker(queue.clone(), self.shared.clone()));
        }

        self.shared.lifecycle.set_state(LifecycleState::Running);
        log::info!("listening on port {}", self.port);

        loop {
            self.shared.apply_pending_updates();
            let config = self.shared.current_config();

            if predicate() {
                self.shared.lifecycle.set_state(LifecycleState::Stopping);
            }
            match self.shared.lifecycle.state() {
                LifecycleState::Stopping | LifecycleState::Idle => break,
                LifecycleState::Draining => {
                    if deadline_passed(self.shared.lifecycle.drain_deadline()) {
                        break;
                    }
                }
                LifecycleState::Running => {}
            }

            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((stream, addr)) => {
                        self.admit_connection(stream, addr, &queue, &config);
                        self.accept_ready_batch(&listener, &queue, &config).await;
                    }
                    Err(err) => log::debug!("accept failed: {err}"),
                },
                _ = self.shared.lifecycle.wakeup.notified() => {}
                _ = tokio::time::sleep(config.poll_interval) => {}
            }
        }

        // shutdown: refuse new connections, let in-flight ones finish
        drop(listener);
        self.shared.lifecycle.set_state(LifecycleState::Stopping);
        let drain_deadline = self.shared.lifecycle.drain_deadline();
        while self.shared.active_connections.load(Ordering::Acquire) > 0 || !queue.is_empty() {
            if deadline_passed(drain_deadline) {
                log::warn!("drain deadline reached; closing remaining connections");
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        for worker in workers {
            worker.abort();
        }
        while queue.pop().is_some() {}
        self.shared.lifecycle.reset();
        Ok(())
    }

    /// Drains further already-ready connections after a listener event,
    /// bounded by `accept_batch_size` so one cycle cannot starve the
    /// connections being served.
    async fn accept_ready_batch(
        &self,
        listener: &TcpListener,
        queue: &Arc<SegQueue<TcpStream>>,
        config: &ServerConfig,
    ) {
        use std::task::Poll;

        let batch = config.accept_batch_size.max(1);
        let mut accepted = 1;
        while accepted < batch {
            let polled = std::future::poll_fn(|cx| Poll::Ready(listener.poll_accept(cx))).await;
            match polled {
                Poll::Ready(Ok((stream, addr))) => {
                    self.admit_connection(stream, addr, queue, config);
                    accepted += 1;
                }
                Poll::Ready(Err(err)) => {
                    log::debug!("accept failed: {err}");
                    break;
                }
                Poll::Pending => break,
            }
        }
    }

    fn admit_connection(
        &self,
        stream: TcpStream,
        addr: SocketAddr,
        queue: &Arc<SegQueue<TcpStream>>,
        config: &ServerConfig,
    ) {
        if queue.len() >= config.max_pending_connections {
            log::warn!("admission queue full, rejecting {addr}");
            let mut stream = stream;
            tokio::task::spawn_local(async move {
                let _ = stream.write_all(OVERLOAD_RESPONSE).await;
                let _ = stream.shutdown().await;
            });
            return;
        }
        if config.tcp_nodelay {
            let _ = stream.set_nodelay(true);
        }
        self.shared.stats.on_accept();
        queue.push(stream);
    }
}

fn deadline_passed(deadline: Option<Instant>) -> bool {
    deadline.map(|d| Instant::now() >= d).unwrap_or(false)
}

fn spawn_worker(queue: Arc<SegQueue<TcpStream>>, shared: Arc<ServerShared>) -> JoinHandle<()> {
    // spawned onto the LocalSet driving `run`, pinning every connection
    // (and thus every handler call) to that thread
    tokio::task::spawn_local(async move {
        let mut ctx = ConnContext::new();
        loop {
            match queue.pop() {
                Some(mut stream) => {
                    shared.active_connections.fetch_add(1, Ordering::AcqRel);
                    if let Err(err) = serve_connection(&mut stream, &mut ctx, &shared).await {
                        log::debug!("connection error: {err}");
                    }
                    let _ = stream.shutdown().await;
                    shared.active_connections.fetch_sub(1, Ordering::AcqRel);
                }
                None => {
                    if shared.lifecycle.state() == LifecycleState::Stopping {
                        break;
                    }
                    tokio::time::sleep(Duration::from_micros(50)).await;
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::method::Method;
    use crate::http::response::HttpResponse;
    use crate::http::status::StatusCode;
    use tokio::io::AsyncReadExt;

    fn ping_router() -> Router {
        let mut router = Router::default();
        router.route(Method::Get, "/ping", |_req| {
            HttpResponse::new(StatusCode::OK)
                .with_content_type("text/plain")
                .with_body("pong")
        });
        router
    }

    async fn wait_running(handle: &ServerHandle) {
        for _ in 0..500 {
            if handle.is_running() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        panic!("server never reached Running");
    }

    async fn get(port: u16, request: &[u8]) -> String {
        let mut stream = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
        stream.write_all(request).await.unwrap();
        let mut out = Vec::new();
        stream.read_to_end(&mut out).await.unwrap();
        String::from_utf8_lossy(&out).into_owned()
    }

    #[tokio::test]
    async fn end_to_end_over_tcp() {
        let config = ServerConfig {
            max_cached_connections: 4,
            poll_interval: Duration::from_millis(20),
            ..ServerConfig::default()
        };
        let mut server = Server::builder().config(config).router(ping_router()).build().unwrap();
        let port = server.port();
        assert_ne!(port, 0);
        let handle = server.handle();

        let client = async {
            wait_running(&handle).await;
            let resp = get(port, b"GET /ping HTTP/1.1\r\nHost: x\r\nConnection: close\r\n\r\n").await;
            handle.stop();
            resp
        };
        let (run_result, resp) = tokio::join!(server.run(), client);
        run_result.unwrap();

        assert!(resp.starts_with("HTTP/1.1 200 OK\r\n"), "{resp}");
        assert!(resp.ends_with("\r\n\r\npong"));
        assert!(!server.is_running());
        let stats = server.stats();
        assert_eq!(stats.requests_served, 1);
        assert_eq!(stats.connections_accepted, 1);
    }

    #[tokio::test]
    async fn hot_router_and_config_updates() {
        let config = ServerConfig {
            poll_interval: Duration::from_millis(10),
            ..ServerConfig::default()
        };
        let mut server = Server::builder().config(config).router(ping_router()).build().unwrap();
        let port = server.port();
        let handle = server.handle();
        let shared = server.shared.clone();

        server.post_router_update(|router| {
            router.route(Method::Get, "/added", |_req| {
                HttpResponse::new(StatusCode::OK).with_body("hot")
            });
        });
        server.post_config_update(move |config| {
            config.max_body_bytes = 123;
            // immutable fields are restored after the updater runs
            config.port = 1;
        });

        let client = async {
            wait_running(&handle).await;
            let resp = get(port, b"GET /added HTTP/1.1\r\nHost: x\r\nConnection: close\r\n\r\n").await;
            handle.stop();
            resp
        };
        let (run_result, resp) = tokio::join!(server.run(), client);
        run_result.unwrap();
        assert!(resp.ends_with("\r\n\r\nhot"), "{resp}");

        let config = shared.current_config();
        assert_eq!(config.max_body_bytes, 123);
        assert_eq!(config.port, port);
    }

    #[tokio::test]
    async fn drain_deadline_ends_run() {
        let config = ServerConfig {
            poll_interval: Duration::from_millis(10),
            ..ServerConfig::default()
        };
        let mut server = Server::builder().config(config).router(ping_router()).build().unwrap();
        let handle = server.handle();

        let outcome = tokio::time::timeout(Duration::from_secs(5), async {
            let driver = async {
                wait_running(&handle).await;
                handle.begin_drain(Some(Duration::from_millis(50)));
                assert!(handle.is_draining());
            };
            let (run_result, ()) = tokio::join!(server.run(), driver);
            run_result
        })
        .await;
        outcome.expect("drain deadline should end the loop").unwrap();
    }

    #[tokio::test]
    async fn run_until_predicate_exits() {
        let config = ServerConfig {
            poll_interval: Duration::from_millis(5),
            ..ServerConfig::default()
        };
        let mut server = Server::builder().config(config).router(ping_router()).build().unwrap();

        let mut polls = 0u32;
        let outcome = tokio::time::timeout(
            Duration::from_secs(5),
            server.run_until(move || {
                polls += 1;
                polls > 3
            }),
        )
        .await;
        outcome.expect("predicate should end the loop").unwrap();
        assert!(!server.is_running());
    }

    /// Regression: handlers must never run concurrently, even when the
    /// caller drives the server from a multi-thread runtime. The LocalSet
    /// pins every connection worker to the thread awaiting `run`.
    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn handlers_are_serialized_on_one_thread() {
        use std::sync::atomic::AtomicBool;

        let in_flight = Arc::new(AtomicUsize::new(0));
        let overlapped = Arc::new(AtomicBool::new(false));

        let mut router = Router::default();
        {
            let in_flight = in_flight.clone();
            let overlapped = overlapped.clone();
            router.route(Method::Get, "/slow", move |_req| {
                if in_flight.fetch_add(1, Ordering::SeqCst) > 0 {
                    overlapped.store(true, Ordering::SeqCst);
                }
                std::thread::sleep(Duration::from_millis(20));
                in_flight.fetch_sub(1, Ordering::SeqCst);
                HttpResponse::new(StatusCode::OK).with_body("done")
            });
        }

        let config = ServerConfig {
            poll_interval: Duration::from_millis(5),
            ..ServerConfig::default()
        };
        let mut server = Server::builder().config(config).router(router).build().unwrap();
        let port = server.port();
        let handle = server.handle();

        let clients = async {
            wait_running(&handle).await;
            let mut joins = Vec::new();
            for _ in 0..4 {
                joins.push(tokio::spawn(get(
                    port,
                    b"GET /slow HTTP/1.1\r\nHost: x\r\nConnection: close\r\n\r\n",
                )));
            }
            for join in joins {
                let resp = join.await.unwrap();
                assert!(resp.ends_with("\r\n\r\ndone"), "{resp}");
            }
            handle.stop();
        };

        let (run_result, ()) = tokio::join!(server.run(), clients);
        run_result.unwrap();
        assert!(
            !overlapped.load(Ordering::SeqCst),
            "two handlers observed in flight at once"
        );
    }
}
