//! HTTP server and graceful shutdown.
//!
//! # Graceful shutdown and Kubernetes
//!
//! When Kubernetes terminates a pod it sends **SIGTERM** and waits
//! `terminationGracePeriodSeconds` (default 30 s) before sending SIGKILL.
//!
//! The server reacts by:
//! 1. Immediately stopping `listener.accept()` — no new connections are made.
//! 2. Letting in-flight connection tasks run to completion, bounded by the
//!    configured grace period (default 10 s).
//! 3. Aborting whatever is still running once the grace period elapses,
//!    then returning from [`Server::serve`] so `main` exits cleanly.
//!
//! Set `terminationGracePeriodSeconds` in your pod spec to a value longer
//! than the grace period here, or requests may be cut mid-flight by SIGKILL.

use std::convert::Infallible;
use std::fs::File;
use std::io::BufReader;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo, TokioTimer};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio_rustls::TlsAcceptor;
use tokio_rustls::rustls::ServerConfig;
use tracing::{error, info, warn};

use crate::dispatcher::Dispatcher;
use crate::error::Error;

const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(10);

/// The HTTP server.
pub struct Server {
    addr: SocketAddr,
    read_timeout: Option<Duration>,
    write_timeout: Option<Duration>,
    grace_period: Duration,
}

impl Server {
    /// Configures the server to bind to `addr` when [`serve`](Server::serve)
    /// is called.
    ///
    /// # Panics
    ///
    /// Panics if `addr` is not a valid `host:port` string.
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// use basalt::Server;
    /// let server = Server::bind("0.0.0.0:3000");
    /// ```
    pub fn bind(addr: &str) -> Self {
        let addr: SocketAddr = addr.parse().expect("invalid socket address");
        Self {
            addr,
            read_timeout: None,
            write_timeout: None,
            grace_period: DEFAULT_GRACE_PERIOD,
        }
    }

    /// Bounds how long a client may take to send its request head.
    /// Enforced by hyper's header read timer.
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = Some(timeout);
        self
    }

    /// Bounds dispatch + response production per request; elapse yields a
    /// bare 504. A cooperative deadline, not preemption — handlers keep
    /// their invariants.
    pub fn write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = Some(timeout);
        self
    }

    /// How long shutdown waits for in-flight connections before aborting
    /// them. Default 10 seconds.
    pub fn grace_period(mut self, period: Duration) -> Self {
        self.grace_period = period;
        self
    }

    /// Starts accepting connections and dispatching them through
    /// `dispatcher`.
    ///
    /// Returns only after a full graceful shutdown (SIGTERM or Ctrl-C,
    /// followed by the bounded drain). The error case is a listener that
    /// failed to bind or accept — fatal to the caller.
    pub async fn serve(self, dispatcher: Dispatcher) -> Result<(), Error> {
        self.accept_loop(Arc::new(dispatcher), None).await
    }

    /// Like [`serve`](Server::serve), with TLS termination. The PEM key
    /// pair is loaded before the listener starts; failure to load it is
    /// fatal at startup.
    pub async fn serve_tls(
        self,
        dispatcher: Dispatcher,
        cert_path: &str,
        key_path: &str,
    ) -> Result<(), Error> {
        let config = load_tls_config(cert_path, key_path)?;
        let acceptor = TlsAcceptor::from(Arc::new(config));
        self.accept_loop(Arc::new(dispatcher), Some(acceptor)).await
    }

    async fn accept_loop(
        self,
        dispatcher: Arc<Dispatcher>,
        acceptor: Option<TlsAcceptor>,
    ) -> Result<(), Error> {
        let listener = TcpListener::bind(self.addr).await?;

        info!(addr = %self.addr, tls = acceptor.is_some(), "basalt listening");

        // JoinSet tracks every spawned connection task so we can wait for
        // them all to finish during graceful shutdown.
        let mut tasks = tokio::task::JoinSet::new();

        // Pin the shutdown future so we can poll it in a loop.
        let shutdown = shutdown_signal();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                // `biased` makes select! check arms top-to-bottom instead of
                // randomly. We check shutdown first so a SIGTERM immediately
                // stops accepting new connections, even if more are queued.
                biased;

                () = &mut shutdown => {
                    info!(in_flight = tasks.len(), "shutdown signal received, draining connections");
                    break;
                }

                res = listener.accept() => {
                    let (stream, remote_addr) = match res {
                        Ok(v) => v,
                        Err(e) => {
                            error!("accept error: {e}");
                            continue;
                        }
                    };

                    let dispatcher = Arc::clone(&dispatcher);
                    let acceptor = acceptor.clone();
                    let read_timeout = self.read_timeout;
                    let write_timeout = self.write_timeout;

                    tasks.spawn(async move {
                        match acceptor {
                            Some(acceptor) => match acceptor.accept(stream).await {
                                Ok(tls_stream) => {
                                    serve_connection(tls_stream, remote_addr, dispatcher, read_timeout, write_timeout).await;
                                }
                                Err(e) => error!(peer = %remote_addr, "tls handshake error: {e}"),
                            },
                            None => {
                                serve_connection(stream, remote_addr, dispatcher, read_timeout, write_timeout).await;
                            }
                        }
                    });
                }

                // Reap finished connection tasks so the JoinSet does not grow
                // without bound on long-running servers.
                Some(_) = tasks.join_next(), if !tasks.is_empty() => {}
            }
        }

        // Bounded drain: wait for in-flight connections up to the grace
        // period, then force the stragglers closed.
        let drain = async {
            while tasks.join_next().await.is_some() {}
        };
        if tokio::time::timeout(self.grace_period, drain).await.is_err() {
            warn!(remaining = tasks.len(), "grace period elapsed, forcing connections closed");
            tasks.abort_all();
            while tasks.join_next().await.is_some() {}
        }

        info!("basalt stopped");
        Ok(())
    }
}

// ── Per-connection serving ────────────────────────────────────────────────────

/// Serves one accepted (and possibly TLS-wrapped) stream.
///
/// The per-request error type is [`Infallible`] — the dispatcher handles
/// all failures internally (404, 500, panics) so hyper never sees an error.
async fn serve_connection<S>(
    stream: S,
    remote_addr: SocketAddr,
    dispatcher: Arc<Dispatcher>,
    read_timeout: Option<Duration>,
    write_timeout: Option<Duration>,
) where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    // TokioIo adapts tokio's AsyncRead/AsyncWrite to the hyper IO traits.
    let io = TokioIo::new(stream);

    // `service_fn` turns a plain async function into a hyper `Service`.
    // The closure is called once per request on the connection, not once
    // per connection.
    let svc = service_fn(move |req| {
        let dispatcher = Arc::clone(&dispatcher);
        async move {
            let response = match write_timeout {
                Some(limit) => match tokio::time::timeout(limit, dispatcher.handle(req, remote_addr)).await {
                    Ok(response) => response,
                    Err(_) => {
                        warn!(peer = %remote_addr, "request exceeded write timeout");
                        let mut resp = http::Response::new(http_body_util::Full::new(bytes::Bytes::new()));
                        *resp.status_mut() = http::StatusCode::GATEWAY_TIMEOUT;
                        resp
                    }
                },
                None => dispatcher.handle(req, remote_addr).await,
            };
            Ok::<_, Infallible>(response)
        }
    });

    // `auto::Builder` transparently handles both HTTP/1.1 and HTTP/2 —
    // whatever the client negotiates.
    let mut builder = ConnBuilder::new(TokioExecutor::new());
    if let Some(timeout) = read_timeout {
        builder.http1().timer(TokioTimer::new()).header_read_timeout(timeout);
    }

    if let Err(e) = builder.serve_connection(io, svc).await {
        error!(peer = %remote_addr, "connection error: {e}");
    }
}

// ── TLS key pair loading ──────────────────────────────────────────────────────

fn load_tls_config(cert_path: &str, key_path: &str) -> Result<ServerConfig, Error> {
    let certs = rustls_pemfile::certs(&mut BufReader::new(File::open(cert_path)?))
        .collect::<Result<Vec<_>, _>>()?;
    if certs.is_empty() {
        return Err(Error::Tls(format!("no certificates found in {cert_path}")));
    }

    let key = rustls_pemfile::private_key(&mut BufReader::new(File::open(key_path)?))?
        .ok_or_else(|| Error::Tls(format!("no private key found in {key_path}")))?;

    ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .map_err(|e| Error::Tls(e.to_string()))
}

// ── Shutdown signal ───────────────────────────────────────────────────────────

/// Resolves on the first shutdown signal the process receives.
///
/// On Unix this listens for both **SIGTERM** (sent by `kubectl` and the
/// Kubernetes control plane) and **SIGINT** (Ctrl-C, for local dev).
/// On Windows only Ctrl-C is available.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let sigterm = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    // `pending()` is a future that never resolves — on non-Unix platforms
    // the SIGTERM arm is effectively disabled.
    #[cfg(not(unix))]
    let sigterm = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c   => {}
        () = sigterm  => {}
    }
}
