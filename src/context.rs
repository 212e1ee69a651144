//! Per-request context.
//!
//! A [`Context`] is created fresh for each incoming request, moved through
//! the middleware chain into the handler, and dropped when the response is
//! built. It is exclusively owned by the task serving that request — never
//! shared across requests.
//!
//! It carries the request identity, the matched path parameters, a typed
//! request-scoped data bag for passing values from middleware to handlers,
//! and the serve helpers that build responses through the dispatcher's
//! configured [`Encoding`] and [`Templates`].

use std::any::Any;
use std::collections::HashMap;
use std::io::Read;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use http::header::{CACHE_CONTROL, HeaderMap, HeaderValue};
use http::{Method, StatusCode, Uri};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::error;

use crate::encoder::Encoding;
use crate::error::Error;
use crate::response::Response;
use crate::templates::Templates;

/// Inbound header consulted for the request id; echoed on every response.
pub(crate) const REQUEST_ID_HEADER: &str = "x-request-id";

/// Request metadata shared between the context and the dispatch pipeline.
///
/// The pipeline keeps its own handle so it can log the exit line and
/// rebuild a context for the server-error handler after the original moved
/// into a faulting handler.
pub(crate) struct RequestMeta {
    pub(crate) id: String,
    pub(crate) method: Method,
    pub(crate) uri: Uri,
    pub(crate) headers: HeaderMap,
    pub(crate) remote_addr: SocketAddr,
}

/// Per-request state handed to middleware and handlers.
pub struct Context {
    meta: Arc<RequestMeta>,
    body: Bytes,
    params: HashMap<String, String>,
    data: HashMap<String, Box<dyn Any + Send + Sync>>,
    status: u16,
    encoding: Encoding,
    templates: Arc<Templates>,
}

/// Options for [`Context::serve_html_with`].
#[derive(Default)]
pub struct HtmlOptions {
    /// Render the page alone, bypassing the layout entirely.
    pub no_layout: bool,
    /// Overrides the response content type (default `text/html`).
    pub content_type: Option<String>,
    /// Overrides the response status (default 200).
    pub status: Option<u16>,
}

impl Context {
    pub(crate) fn new(
        meta: Arc<RequestMeta>,
        body: Bytes,
        params: HashMap<String, String>,
        encoding: Encoding,
        templates: Arc<Templates>,
    ) -> Self {
        Self {
            meta,
            body,
            params,
            data: HashMap::new(),
            status: 0,
            encoding,
            templates,
        }
    }

    // ── Request surface ───────────────────────────────────────────────────────

    /// The request id: propagated from the inbound `X-Request-Id` header
    /// when present, otherwise generated. Correlation data only — never a
    /// basis for trust decisions.
    pub fn id(&self) -> &str {
        &self.meta.id
    }

    pub fn method(&self) -> &Method {
        &self.meta.method
    }

    pub fn uri(&self) -> &Uri {
        &self.meta.uri
    }

    pub fn path(&self) -> &str {
        self.meta.uri.path()
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.meta.headers
    }

    /// A request header value, if present and valid UTF-8.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.meta.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// The collected request body.
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    pub fn remote_addr(&self) -> SocketAddr {
        self.meta.remote_addr
    }

    /// The status recorded by the last serve helper, 0 until one runs.
    pub fn status(&self) -> u16 {
        self.status
    }

    /// The dispatcher's configured encoding.
    pub fn encoding(&self) -> Encoding {
        self.encoding
    }

    /// The matched path-parameter value for `key`, or `""` when absent.
    /// Never errors.
    pub fn param_value(&self, key: &str) -> &str {
        self.params.get(key).map_or("", String::as_str)
    }

    // ── Request-scoped data ───────────────────────────────────────────────────

    /// Stores a value in the request-scoped data bag. Typically called by
    /// middleware to pass data to the handler.
    pub fn set_data<T: Any + Send + Sync>(&mut self, key: impl Into<String>, value: T) {
        self.data.insert(key.into(), Box::new(value));
    }

    /// Reads a value from the data bag. Absent keys and type mismatches
    /// both yield `None`, never an error.
    pub fn get_data<T: Any>(&self, key: &str) -> Option<&T> {
        self.data.get(key).and_then(|v| v.downcast_ref())
    }

    // ── Decoding ──────────────────────────────────────────────────────────────

    /// Decodes a value from `reader` using the configured encoding.
    pub fn decode<T: DeserializeOwned>(&self, reader: impl Read) -> Result<T, Error> {
        self.encoding.decode(reader)
    }

    /// Decodes the request body using the configured encoding.
    ///
    /// Fails with [`Error::Decode`] when the body is malformed; the handler
    /// decides the response.
    pub fn decode_body<T: DeserializeOwned>(&self) -> Result<T, Error> {
        self.encoding.decode(self.body.as_ref())
    }

    // ── Serving ───────────────────────────────────────────────────────────────

    /// Encodes `value` into a `200 OK` response with the encoder's content
    /// type.
    pub fn serve<T: Serialize>(&mut self, value: &T) -> Response {
        self.serve_encoded(value, 0, 0)
    }

    /// Like [`serve`](Self::serve) with an explicit status; 0 means 200.
    pub fn serve_with_status<T: Serialize>(&mut self, value: &T, status: u16) -> Response {
        self.serve_encoded(value, status, 0)
    }

    /// Like [`serve_with_status`](Self::serve_with_status), additionally
    /// setting `Cache-control: private, must-revalidate, max-age=<ttl>`
    /// when `ttl_seconds > 0`. A zero ttl sets no cache header.
    pub fn serve_cached_with_status<T: Serialize>(
        &mut self,
        value: &T,
        status: u16,
        ttl_seconds: u32,
    ) -> Response {
        self.serve_encoded(value, status, ttl_seconds)
    }

    /// Serves an encoded error body with the given status.
    pub fn error<T: Serialize>(&mut self, body: &T, status: u16) -> Response {
        self.serve_encoded(body, status, 0)
    }

    /// Serves raw bytes. An empty `content_type` falls back to the
    /// encoder's.
    pub fn serve_response(&mut self, body: impl Into<Bytes>, status: u16, content_type: &str) -> Response {
        let status = normalize_status(status);
        let content_type = if content_type.is_empty() {
            self.encoding.content_type()
        } else {
            content_type
        };
        self.status = status.as_u16();
        Response::with_content_type(content_type, body.into(), status)
    }

    /// Serves a bare status line; 0 means 200.
    pub fn serve_status(&mut self, status: u16) -> Response {
        let status = normalize_status(status);
        self.status = status.as_u16();
        Response::status(status)
    }

    /// Issues an HTTP redirect to `url`, recording the status.
    pub fn redirect(&mut self, url: &str, status: u16) -> Response {
        let status = normalize_status(status);
        self.status = status.as_u16();
        Response::builder().status(status).header("location", url).no_body()
    }

    /// Renders the named page composed with the layout and serves it as
    /// HTML.
    pub fn serve_html<T: Serialize>(&mut self, page: &str, data: &T) -> Response {
        self.serve_html_with(page, data, HtmlOptions::default())
    }

    /// Renders the named page alone, bypassing the layout.
    pub fn serve_html_no_layout<T: Serialize>(&mut self, page: &str, data: &T) -> Response {
        self.serve_html_with(page, data, HtmlOptions { no_layout: true, ..HtmlOptions::default() })
    }

    /// Renders the named page with explicit [`HtmlOptions`].
    ///
    /// Template failure logs the error tagged with the request id and
    /// serves a plain-text 500 body `Error in template`; it never reaches
    /// the caller.
    pub fn serve_html_with<T: Serialize>(&mut self, page: &str, data: &T, opts: HtmlOptions) -> Response {
        let rendered = if opts.no_layout {
            self.templates.render_only(page, data)
        } else {
            self.templates.render(page, data)
        };

        match rendered {
            Ok(html) => {
                let content_type = opts.content_type.as_deref().unwrap_or("text/html");
                let status = opts.status.unwrap_or(0);
                self.serve_response(html.into_bytes(), status, content_type)
            }
            Err(err) => {
                error!(id = %self.id(), error = %err, page, "error in template");
                self.serve_response(&b"Error in template"[..], 500, "text/plain")
            }
        }
    }

    fn serve_encoded<T: Serialize>(&mut self, value: &T, status: u16, ttl_seconds: u32) -> Response {
        let status = normalize_status(status);
        match self.encoding.encode(value) {
            Ok(bytes) => {
                let mut resp =
                    Response::with_content_type(self.encoding.content_type(), bytes.into(), status);
                if ttl_seconds > 0 {
                    let cache = format!("private, must-revalidate, max-age={ttl_seconds}");
                    if let Ok(v) = HeaderValue::try_from(cache) {
                        resp.headers.insert(CACHE_CONTROL, v);
                    }
                }
                self.status = status.as_u16();
                resp
            }
            Err(err) => {
                error!(id = %self.id(), error = %err, "response encoding failed");
                self.status = StatusCode::INTERNAL_SERVER_ERROR.as_u16();
                Response::status(StatusCode::INTERNAL_SERVER_ERROR)
            }
        }
    }
}

/// Maps the loose status integers of the serve helpers onto a real status
/// code: 0 means 200, anything unrepresentable collapses to 500.
fn normalize_status(status: u16) -> StatusCode {
    if status == 0 {
        return StatusCode::OK;
    }
    StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
}

#[cfg(test)]
impl Context {
    pub(crate) fn for_testing() -> Self {
        let meta = Arc::new(RequestMeta {
            id: "test-id".to_owned(),
            method: Method::GET,
            uri: Uri::from_static("/"),
            headers: HeaderMap::new(),
            remote_addr: ([127, 0, 0, 1], 0).into(),
        });
        Self::new(meta, Bytes::new(), HashMap::new(), Encoding::Json, Arc::new(Templates::default()))
    }

    pub(crate) fn insert_param(&mut self, key: &str, value: &str) {
        self.params.insert(key.to_owned(), value.to_owned());
    }
}
