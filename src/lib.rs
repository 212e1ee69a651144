//! # basalt
//!
//! A small HTTP dispatch toolkit. Nothing more. Nothing less.
//!
//! ## The contract
//!
//! basalt wraps a radix-tree router and owns everything between an incoming
//! request and the response: middleware composition, panic recovery, and a
//! per-request [`Context`] with response-encoding helpers (JSON, msgpack,
//! HTML templates). It does **not** try to be a full web framework — no
//! ORM, no session store, no built-in auth. URL pattern matching is
//! [`matchit`]'s job; basalt only consumes its results.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use basalt::{Context, Dispatcher, Encoding, Error, Response, Server};
//! use serde::Serialize;
//!
//! #[derive(Serialize)]
//! struct User { id: String, name: String }
//!
//! #[tokio::main]
//! async fn main() {
//!     let mut app = Dispatcher::new(Encoding::Json);
//!     app.get("/users/{id}", get_user);
//!
//!     Server::bind("0.0.0.0:3000").serve(app).await.unwrap();
//! }
//!
//! async fn get_user(mut ctx: Context) -> Result<Response, Error> {
//!     let user = User {
//!         id: ctx.param_value("id").to_owned(),
//!         name: "alice".to_owned(),
//!     };
//!     Ok(ctx.serve(&user))
//! }
//! ```
//!
//! ## Request lifecycle
//!
//! ```text
//! request → Context built (id, params, body)
//!         → global middleware, registration order
//!         → route middleware, registration order
//!         → handler
//!         → responses unwind back out through the middleware
//! ```
//!
//! Panics and handler errors never cross the dispatch boundary: they are
//! logged with the request id and converted to the configured
//! server-error handler (or a bare 500). The serving process stays up.

mod context;
mod dispatcher;
mod encoder;
mod error;
mod handler;
mod middleware;
mod response;
mod server;
mod static_files;
mod templates;

pub use context::{Context, HtmlOptions};
pub use dispatcher::Dispatcher;
pub use encoder::Encoding;
pub use error::Error;
pub use handler::{BoxedHandler, Handler};
pub use middleware::Middleware;
pub use response::{IntoResponse, Response, ResponseBuilder};
pub use server::Server;
pub use static_files::StaticDir;
pub use templates::Templates;
