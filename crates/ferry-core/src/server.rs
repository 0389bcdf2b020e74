//! Native HTTP server
//!
//! - Multi-threaded tokio runtime owned by the server
//! - Synchronous bind, so an occupied port is reported before start returns
//! - TCP_NODELAY for low latency
//! - Graceful shutdown with connection draining

use crate::dispatch::Dispatcher;
use crate::router::Router;
use crate::service::{handle_request, shutdown_signal, ServiceState};
use crate::{Error, Result};
use ferry_router::{HandlerId, Method};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use parking_lot::Mutex;
use socket2::{Domain, Protocol, Socket, Type};
use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::runtime::Runtime;
use tokio::sync::{watch, Notify};

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub hostname: String,
    pub workers: usize,
    /// Time allowed for receiving the request body
    pub request_timeout: Duration,
    /// Time allowed for the handler to complete; `None` waits forever
    pub dispatch_timeout: Option<Duration>,
    pub max_body_size: usize,
    /// Time `stop` waits for in-flight connections to drain
    pub shutdown_grace: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 3000,
            hostname: "127.0.0.1".to_string(),
            workers: num_cpus::get(),
            request_timeout: Duration::from_secs(30),
            dispatch_timeout: Some(Duration::from_secs(30)),
            max_body_size: 1024 * 1024,
            shutdown_grace: Duration::from_secs(5),
        }
    }
}

impl ServerConfig {
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn hostname(mut self, hostname: impl Into<String>) -> Self {
        self.hostname = hostname.into();
        self
    }

    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn dispatch_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.dispatch_timeout = timeout;
        self
    }

    pub fn max_body_size(mut self, bytes: usize) -> Self {
        self.max_body_size = bytes;
        self
    }

    pub fn shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }

    /// Address to bind; the hostname must be an IP literal
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        let ip: IpAddr = self.hostname.parse().map_err(|_| {
            Error::InvalidArgument(format!("hostname {:?} is not an IP address", self.hostname))
        })?;
        Ok(SocketAddr::new(ip, self.port))
    }
}

/// Create a TCP socket with optimizations
pub(crate) fn create_optimized_socket(addr: &SocketAddr) -> std::io::Result<Socket> {
    let domain = if addr.is_ipv4() {
        Domain::IPV4
    } else {
        Domain::IPV6
    };

    let socket = Socket::new(domain, Type::STREAM, Some(Protocol::TCP))?;

    // SO_REUSEADDR - allow binding to address in TIME_WAIT
    socket.set_reuse_address(true)?;

    // TCP_NODELAY - disable Nagle's algorithm for lower latency
    socket.set_nodelay(true)?;

    socket.set_nonblocking(true)?;
    socket.bind(&(*addr).into())?;
    socket.listen(1024)?;

    Ok(socket)
}

/// Tracks active connections for graceful shutdown
#[derive(Debug, Default)]
pub struct ConnectionTracker {
    /// Active connection count
    active: AtomicU64,
    /// Shutdown signal received
    shutting_down: AtomicBool,
    /// Woken when the last connection closes
    idle: Notify,
}

impl ConnectionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn increment(&self) {
        self.active.fetch_add(1, Ordering::SeqCst);
    }

    #[inline]
    pub fn decrement(&self) {
        if self.active.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.idle.notify_waiters();
        }
    }

    #[inline]
    pub fn count(&self) -> u64 {
        self.active.load(Ordering::SeqCst)
    }

    /// Signal that shutdown is in progress
    pub fn start_shutdown(&self) {
        self.shutting_down.store(true, Ordering::SeqCst);
    }

    #[inline]
    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::SeqCst)
    }

    /// Resolves once no connections are active
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.idle.notified();
            tokio::pin!(notified);
            // Register before checking so a decrement in between is not missed
            notified.as_mut().enable();
            if self.count() == 0 {
                return;
            }
            notified.await;
        }
    }
}

/// A running server
///
/// Owns its runtime; dropping the server stops it.
pub struct Server {
    local_addr: SocketAddr,
    router: Arc<Router>,
    tracker: Arc<ConnectionTracker>,
    shutdown_tx: watch::Sender<bool>,
    shutdown_grace: Duration,
    runtime: Mutex<Option<Runtime>>,
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("local_addr", &self.local_addr)
            .field("active_connections", &self.tracker.count())
            .field("shutting_down", &self.tracker.is_shutting_down())
            .finish()
    }
}

impl Server {
    /// Bind and start serving
    ///
    /// The router is shared: routes registered on it after start are served
    /// immediately.
    pub fn start(
        config: ServerConfig,
        router: Arc<Router>,
        dispatcher: Arc<dyn Dispatcher>,
    ) -> Result<Self> {
        let addr = config.socket_addr()?;
        let socket =
            create_optimized_socket(&addr).map_err(|source| Error::BindFailure { addr, source })?;
        let listener: std::net::TcpListener = socket.into();
        let local_addr = listener.local_addr()?;

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(config.workers.max(1))
            .thread_name("ferry-worker")
            .enable_all()
            .build()?;
        let listener = {
            let _enter = runtime.enter();
            TcpListener::from_std(listener)?
        };

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let tracker = Arc::new(ConnectionTracker::new());
        let state = Arc::new(ServiceState {
            router: router.clone(),
            dispatcher,
            shutdown: shutdown_rx.clone(),
            request_timeout: config.request_timeout,
            dispatch_timeout: config.dispatch_timeout,
            max_body_size: config.max_body_size,
        });
        runtime.spawn(accept_loop(listener, state, tracker.clone(), shutdown_rx));

        tracing::info!(%local_addr, workers = config.workers.max(1), "server listening");

        Ok(Self {
            local_addr,
            router,
            tracker,
            shutdown_tx,
            shutdown_grace: config.shutdown_grace,
            runtime: Mutex::new(Some(runtime)),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn router(&self) -> &Arc<Router> {
        &self.router
    }

    /// Register a route on the live router
    pub fn register_route(&self, method: Method, pattern: &str, handler_id: HandlerId) -> Result<()> {
        self.router.register(method, pattern, handler_id)
    }

    pub fn active_connections(&self) -> u64 {
        self.tracker.count()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.tracker.is_shutting_down()
    }

    /// Stop accepting, cancel pending requests and drain connections
    ///
    /// Waits up to the configured grace period for connections to close
    /// before tearing the runtime down. Called from inside a runtime, for
    /// example by a handler running on a worker thread, it skips the drain
    /// and returns without blocking that thread.
    pub fn stop(&self) -> Result<()> {
        let runtime = self.runtime.lock().take().ok_or(Error::AlreadyStopped)?;

        self.tracker.start_shutdown();
        self.shutdown_tx.send_replace(true);

        // Blocking on or dropping a runtime from inside async context panics
        let remaining = if tokio::runtime::Handle::try_current().is_ok() {
            let remaining = self.tracker.count();
            runtime.shutdown_background();
            remaining
        } else {
            let drain = tokio::time::timeout(self.shutdown_grace, self.tracker.wait_idle());
            let _ = runtime.block_on(drain);
            let remaining = self.tracker.count();
            runtime.shutdown_timeout(Duration::from_millis(100));
            remaining
        };

        if remaining > 0 {
            tracing::warn!(local_addr = %self.local_addr, remaining, "server stopped before connections drained");
        } else {
            tracing::info!(local_addr = %self.local_addr, "server stopped");
        }
        Ok(())
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

async fn accept_loop(
    listener: TcpListener,
    state: Arc<ServiceState>,
    tracker: Arc<ConnectionTracker>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        let stream = tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, _)) => stream,
                Err(e) => {
                    tracing::debug!(error = %e, "accept failed");
                    continue;
                }
            },
            () = shutdown_signal(&mut shutdown) => break,
        };

        // Reject new connections during shutdown
        if tracker.is_shutting_down() {
            drop(stream);
            continue;
        }

        let state = state.clone();
        let conn_tracker = tracker.clone();
        conn_tracker.increment();

        tokio::spawn(async move {
            serve_connection(stream, state).await;
            conn_tracker.decrement();
        });
    }
    tracker.start_shutdown();
}

async fn serve_connection(stream: TcpStream, state: Arc<ServiceState>) {
    let _ = stream.set_nodelay(true);
    let mut shutdown = state.shutdown.clone();
    let io = TokioIo::new(stream);

    let service = service_fn(move |req| handle_request(state.clone(), req));
    let conn = http1::Builder::new().serve_connection(io, service);
    tokio::pin!(conn);

    let result = tokio::select! {
        result = conn.as_mut() => result,
        () = shutdown_signal(&mut shutdown) => {
            conn.as_mut().graceful_shutdown();
            conn.await
        }
    };

    // Resets and aborted requests are routine here
    if let Err(e) = result {
        tracing::debug!(error = %e, "connection closed with error");
    }
}
