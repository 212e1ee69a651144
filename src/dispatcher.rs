//! Request dispatcher: routing glue, middleware composition, and the
//! per-request pipeline.
//!
//! The dispatcher wraps a radix-tree router (one tree per HTTP method,
//! O(path-length) lookup via [`matchit`]) and owns everything that happens
//! between an incoming request and the response hyper writes: building the
//! per-request [`Context`], folding middleware around the matched handler,
//! recovering panics, and substituting the configured not-found /
//! server-error handlers.
//!
//! Registration happens at setup, before the listener starts; the route
//! table and middleware sequences are read-only while serving. Registering
//! concurrently with traffic is not supported.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use futures_util::FutureExt as _;
use http::header::HeaderValue;
use http::{Method, StatusCode};
use http_body_util::{BodyExt as _, Full};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::context::{Context, REQUEST_ID_HEADER, RequestMeta};
use crate::encoder::Encoding;
use crate::handler::{BoxedHandler, Handler};
use crate::middleware::{self, Middleware};
use crate::response::Response;
use crate::server::Server;
use crate::static_files::StaticDir;
use crate::templates::Templates;

/// The application dispatcher.
///
/// Construct once, register routes and middleware, then hand it to
/// [`Server::serve`] (or call [`run`](Dispatcher::run)). Route-local
/// middleware is folded around the handler at registration; global
/// middleware wraps outside it on each dispatch, so a request passes
/// through globals in registration order, then route-locals in
/// registration order, then the handler.
///
/// ```rust,no_run
/// use basalt::{Context, Dispatcher, Encoding, Response};
///
/// # async fn get_user(mut ctx: Context) -> Result<Response, basalt::Error> {
/// #     Ok(ctx.serve(&"u"))
/// # }
/// let mut app = Dispatcher::new(Encoding::Json);
/// app.get("/users/{id}", get_user);
/// ```
pub struct Dispatcher {
    routes: HashMap<Method, matchit::Router<BoxedHandler>>,
    middleware: Vec<Arc<dyn Middleware>>,
    not_found: Option<BoxedHandler>,
    server_error: Option<BoxedHandler>,
    cors: Option<BoxedHandler>,
    encoding: Encoding,
    templates: Arc<Templates>,
}

impl Dispatcher {
    /// A dispatcher with an empty route set, no middleware, no error
    /// handlers, and default [`Templates`].
    pub fn new(encoding: Encoding) -> Self {
        Self::with_templates(encoding, Templates::default())
    }

    pub fn with_templates(encoding: Encoding, templates: Templates) -> Self {
        Self {
            routes: HashMap::new(),
            middleware: Vec::new(),
            not_found: None,
            server_error: None,
            cors: None,
            encoding,
            templates: Arc::new(templates),
        }
    }

    // ── Registration ──────────────────────────────────────────────────────────

    /// Appends a global middleware. No de-duplication: registering the
    /// same middleware twice runs it twice.
    pub fn middleware(&mut self, mw: impl Middleware) -> &mut Self {
        self.middleware.push(Arc::new(mw));
        self
    }

    /// Registers a handler for a method + pattern pair, with route-local
    /// middleware folded innermost around it.
    ///
    /// Path parameters use `{name}` syntax — `ctx.param_value("name")`
    /// retrieves them. Catch-alls use `{*name}`.
    ///
    /// # Panics
    ///
    /// Panics when the pattern is invalid or conflicts with an existing
    /// registration for the same method. Registration is setup-time; a bad
    /// route table should never reach traffic.
    pub fn route(
        &mut self,
        method: Method,
        pattern: &str,
        handler: impl Handler,
        route_middleware: Vec<Arc<dyn Middleware>>,
    ) -> &mut Self {
        let wrapped = middleware::compose(&route_middleware, BoxedHandler::new(handler));
        self.routes
            .entry(method)
            .or_default()
            .insert(pattern, wrapped)
            .unwrap_or_else(|e| panic!("invalid route `{pattern}`: {e}"));
        self
    }

    pub fn get(&mut self, pattern: &str, handler: impl Handler) -> &mut Self {
        self.route(Method::GET, pattern, handler, Vec::new())
    }

    pub fn post(&mut self, pattern: &str, handler: impl Handler) -> &mut Self {
        self.route(Method::POST, pattern, handler, Vec::new())
    }

    pub fn put(&mut self, pattern: &str, handler: impl Handler) -> &mut Self {
        self.route(Method::PUT, pattern, handler, Vec::new())
    }

    pub fn delete(&mut self, pattern: &str, handler: impl Handler) -> &mut Self {
        self.route(Method::DELETE, pattern, handler, Vec::new())
    }

    pub fn options(&mut self, pattern: &str, handler: impl Handler) -> &mut Self {
        self.route(Method::OPTIONS, pattern, handler, Vec::new())
    }

    pub fn head(&mut self, pattern: &str, handler: impl Handler) -> &mut Self {
        self.route(Method::HEAD, pattern, handler, Vec::new())
    }

    /// Sets the handler invoked when no route matches. Last registration
    /// wins; unset means a bare 404.
    pub fn not_found(&mut self, handler: impl Handler) -> &mut Self {
        self.not_found = Some(BoxedHandler::new(handler));
        self
    }

    /// Sets the handler invoked when a handler errors or panics. It
    /// receives a context rebuilt from the request metadata (same id,
    /// fresh data bag). Last registration wins; unset means a bare 500.
    pub fn server_error(&mut self, handler: impl Handler) -> &mut Self {
        self.server_error = Some(BoxedHandler::new(handler));
        self
    }

    /// Sets a CORS handler. When configured, OPTIONS requests short-circuit
    /// to it directly, bypassing routing and middleware.
    pub fn cors(&mut self, handler: impl Handler) -> &mut Self {
        self.cors = Some(BoxedHandler::new(handler));
        self
    }

    /// Serves files beneath `root` for `GET {prefix}/…` requests, with
    /// path-traversal guarding. Missing files yield a bare 404.
    pub fn static_dir(&mut self, prefix: &str, root: impl Into<PathBuf>) -> &mut Self {
        let dir = Arc::new(StaticDir::new(root.into()));
        let pattern = format!("{}/{{*filepath}}", prefix.trim_end_matches('/'));
        self.get(&pattern, move |mut ctx: Context| {
            let dir = Arc::clone(&dir);
            async move {
                let rel = ctx.param_value("filepath").to_owned();
                match dir.load(&rel).await {
                    Ok((bytes, content_type)) => {
                        Ok::<_, crate::Error>(ctx.serve_response(bytes, 200, content_type))
                    }
                    Err(_) => Ok(Response::status(StatusCode::NOT_FOUND)),
                }
            }
        })
    }

    // ── Serving ───────────────────────────────────────────────────────────────

    /// Dispatches one request and produces one buffered response.
    ///
    /// This is the pipeline entry point: the server calls it with hyper's
    /// streaming body, tests call it directly with `Full<Bytes>`. All
    /// failures are handled internally — a panicking handler, a failed
    /// body read, an erroring server-error handler — so the caller always
    /// receives a response, never a fault.
    pub async fn handle<B>(
        &self,
        req: http::Request<B>,
        remote_addr: SocketAddr,
    ) -> http::Response<Full<Bytes>>
    where
        B: hyper::body::Body,
        B::Error: std::fmt::Display,
    {
        let start = Instant::now();
        let (parts, body) = req.into_parts();

        // Propagate an inbound X-Request-Id so proxies can correlate,
        // otherwise mint one. Correlation only; never trust it for auth.
        let id = parts
            .headers
            .get(REQUEST_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned)
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let meta = Arc::new(RequestMeta {
            id,
            method: parts.method,
            uri: parts.uri,
            headers: parts.headers,
            remote_addr,
        });

        info!(
            id = %meta.id,
            method = %meta.method,
            uri = %meta.uri,
            remote = %remote_addr,
            "request started"
        );

        let mut response = self.route_request(body, &meta).await;

        if !response.headers().contains_key(REQUEST_ID_HEADER) {
            if let Ok(v) = HeaderValue::try_from(meta.id.as_str()) {
                response.headers_mut().insert(REQUEST_ID_HEADER, v);
            }
        }

        info!(
            id = %meta.id,
            status = response.status().as_u16(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "request completed"
        );

        response
    }

    async fn route_request<B>(
        &self,
        body: B,
        meta: &Arc<RequestMeta>,
    ) -> http::Response<Full<Bytes>>
    where
        B: hyper::body::Body,
        B::Error: std::fmt::Display,
    {
        // Preflight short-circuit: the CORS handler alone sees the request.
        if meta.method == Method::OPTIONS {
            if let Some(cors) = &self.cors {
                let ctx = self.bare_context(meta);
                return self.execute(cors.clone(), ctx, meta).await;
            }
        }

        let matched = self.routes.get(&meta.method).and_then(|tree| {
            tree.at(meta.uri.path()).ok().map(|m| {
                let params: HashMap<String, String> = m
                    .params
                    .iter()
                    .map(|(k, v)| (k.to_owned(), v.to_owned()))
                    .collect();
                (m.value.clone(), params)
            })
        });

        let Some((handler, params)) = matched else {
            return match &self.not_found {
                Some(nf) => {
                    let ctx = self.bare_context(meta);
                    self.execute(nf.clone(), ctx, meta).await
                }
                None => bare_status(StatusCode::NOT_FOUND),
            };
        };

        let body = match body.collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(err) => {
                warn!(id = %meta.id, error = %err, "failed to read request body");
                return bare_status(StatusCode::BAD_REQUEST);
            }
        };

        let ctx = Context::new(
            Arc::clone(meta),
            body,
            params,
            self.encoding,
            Arc::clone(&self.templates),
        );

        let wrapped = middleware::compose(&self.middleware, handler);
        self.execute(wrapped, ctx, meta).await
    }

    /// Runs a handler chain inside the recovery scope. Panics and handler
    /// errors are both converted to the server-error path here; nothing
    /// ever propagates past this boundary.
    async fn execute(
        &self,
        handler: BoxedHandler,
        ctx: Context,
        meta: &Arc<RequestMeta>,
    ) -> http::Response<Full<Bytes>> {
        match AssertUnwindSafe(handler.call(ctx)).catch_unwind().await {
            Ok(Ok(response)) => response.into_http(),
            Ok(Err(err)) => {
                error!(id = %meta.id, error = %err, "handler failed");
                self.server_error_response(meta).await
            }
            Err(panic) => {
                error!(id = %meta.id, panic = panic_message(&*panic), "handler panicked");
                self.server_error_response(meta).await
            }
        }
    }

    /// The server-error substitution: the configured handler gets a context
    /// rebuilt from the request metadata; absent (or itself faulting), the
    /// client gets a bare 500.
    async fn server_error_response(&self, meta: &Arc<RequestMeta>) -> http::Response<Full<Bytes>> {
        let Some(handler) = &self.server_error else {
            return bare_status(StatusCode::INTERNAL_SERVER_ERROR);
        };

        let ctx = self.bare_context(meta);
        match AssertUnwindSafe(handler.call(ctx)).catch_unwind().await {
            Ok(Ok(response)) => response.into_http(),
            Ok(Err(err)) => {
                error!(id = %meta.id, error = %err, "server-error handler failed");
                bare_status(StatusCode::INTERNAL_SERVER_ERROR)
            }
            Err(panic) => {
                error!(id = %meta.id, panic = panic_message(&*panic), "server-error handler panicked");
                bare_status(StatusCode::INTERNAL_SERVER_ERROR)
            }
        }
    }

    /// A context with no params, no body, and a fresh data bag — used for
    /// the not-found, server-error, and CORS paths.
    fn bare_context(&self, meta: &Arc<RequestMeta>) -> Context {
        Context::new(
            Arc::clone(meta),
            Bytes::new(),
            HashMap::new(),
            self.encoding,
            Arc::clone(&self.templates),
        )
    }

    // ── Lifecycle convenience ─────────────────────────────────────────────────

    /// Binds `addr` and serves until shutdown. Returns only on completed
    /// graceful shutdown; bind failure is the error case and is fatal to
    /// the caller.
    ///
    /// # Panics
    ///
    /// Panics if `addr` is not a valid `host:port` string.
    pub async fn run(
        self,
        addr: &str,
        read_timeout: Duration,
        write_timeout: Duration,
    ) -> Result<(), crate::Error> {
        Server::bind(addr)
            .read_timeout(read_timeout)
            .write_timeout(write_timeout)
            .serve(self)
            .await
    }

    /// Like [`run`](Dispatcher::run) over TLS. Failure to load the key
    /// pair is fatal at startup.
    ///
    /// # Panics
    ///
    /// Panics if `addr` is not a valid `host:port` string.
    pub async fn run_tls(
        self,
        addr: &str,
        cert_path: &str,
        key_path: &str,
        read_timeout: Duration,
        write_timeout: Duration,
    ) -> Result<(), crate::Error> {
        Server::bind(addr)
            .read_timeout(read_timeout)
            .write_timeout(write_timeout)
            .serve_tls(self, cert_path, key_path)
            .await
    }
}

fn bare_status(status: StatusCode) -> http::Response<Full<Bytes>> {
    let mut resp = http::Response::new(Full::new(Bytes::new()));
    *resp.status_mut() = status;
    resp
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s
    } else {
        "non-string panic payload"
    }
}
