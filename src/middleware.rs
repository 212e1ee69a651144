//! Middleware layer.
//!
//! Middleware intercepts requests and responses and is the right place for
//! cross-cutting concerns: auth checks, header stamping, per-route metrics.
//!
//! A middleware is a transform from handler to handler: it receives the
//! inner [`BoxedHandler`] and returns a new one wrapped around it. Code
//! before the inner `call` runs on the way in; code after it runs on the
//! way out. A middleware that replies without calling the inner handler
//! stops the chain — nothing downstream runs.
//!
//! ```rust
//! use basalt::{BoxedHandler, Context, Dispatcher, Encoding};
//!
//! let mut d = Dispatcher::new(Encoding::Json);
//! d.middleware(|next: BoxedHandler| {
//!     BoxedHandler::new(move |mut ctx: Context| {
//!         let next = next.clone();
//!         async move {
//!             ctx.set_data("authenticated", true);
//!             next.call(ctx).await
//!         }
//!     })
//! });
//! ```
//!
//! # Ordering
//!
//! Registration order is execution order on the way in. Global middleware
//! wraps outside route-local middleware, so with globals `g1..gn` and
//! route-locals `r1..rm` a request passes through
//! `g1, …, gn, r1, …, rm, handler` and unwinds in exact reverse. Reversing
//! this nesting would change observable behavior — a request-id stamp must
//! run before any route-specific logic — so the fold below is the one
//! place it is encoded.

use std::sync::Arc;

use crate::handler::BoxedHandler;

/// A handler-to-handler transform.
///
/// Automatically implemented for closures and functions of type
/// `Fn(BoxedHandler) -> BoxedHandler`. Route-local middleware is wrapped
/// around the handler at registration; global middleware around the
/// matched handler when a request is dispatched.
pub trait Middleware: Send + Sync + 'static {
    fn wrap(&self, next: BoxedHandler) -> BoxedHandler;
}

impl<F> Middleware for F
where
    F: Fn(BoxedHandler) -> BoxedHandler + Send + Sync + 'static,
{
    fn wrap(&self, next: BoxedHandler) -> BoxedHandler {
        self(next)
    }
}

/// Folds `middleware` around `handler`, first registration outermost.
pub(crate) fn compose(middleware: &[Arc<dyn Middleware>], handler: BoxedHandler) -> BoxedHandler {
    middleware.iter().rev().fold(handler, |inner, mw| mw.wrap(inner))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use crate::context::Context;
    use crate::response::Response;

    fn tagging(tag: &'static str, log: Arc<Mutex<Vec<String>>>) -> Arc<dyn Middleware> {
        Arc::new(move |next: BoxedHandler| {
            let log = Arc::clone(&log);
            BoxedHandler::new(move |ctx: Context| {
                let next = next.clone();
                let log = Arc::clone(&log);
                async move {
                    log.lock().unwrap().push(format!("{tag}:in"));
                    let resp = next.call(ctx).await;
                    log.lock().unwrap().push(format!("{tag}:out"));
                    resp
                }
            })
        })
    }

    #[tokio::test]
    async fn first_registered_runs_outermost() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let chain = vec![tagging("a", Arc::clone(&log)), tagging("b", Arc::clone(&log))];

        let terminal_log = Arc::clone(&log);
        let handler = BoxedHandler::new(move |_ctx: Context| {
            let log = Arc::clone(&terminal_log);
            async move {
                log.lock().unwrap().push("handler".to_owned());
                Ok::<_, crate::Error>(Response::text("ok"))
            }
        });

        let wrapped = compose(&chain, handler);
        wrapped.call(Context::for_testing()).await.unwrap();

        assert_eq!(
            *log.lock().unwrap(),
            vec!["a:in", "b:in", "handler", "b:out", "a:out"]
        );
    }

    #[tokio::test]
    async fn middleware_can_stop_the_chain() {
        let reached = Arc::new(Mutex::new(false));
        let gate: Arc<dyn Middleware> = Arc::new(|_next: BoxedHandler| {
            BoxedHandler::new(|_ctx: Context| async {
                Ok::<_, crate::Error>(Response::status(http::StatusCode::UNAUTHORIZED))
            })
        });

        let reached_inner = Arc::clone(&reached);
        let handler = BoxedHandler::new(move |_ctx: Context| {
            let reached = Arc::clone(&reached_inner);
            async move {
                *reached.lock().unwrap() = true;
                Ok::<_, crate::Error>(Response::text("ok"))
            }
        });

        let wrapped = compose(std::slice::from_ref(&gate), handler);
        let resp = wrapped.call(Context::for_testing()).await.unwrap();

        assert_eq!(resp.status_code(), http::StatusCode::UNAUTHORIZED);
        assert!(!*reached.lock().unwrap());
    }
}
