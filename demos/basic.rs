//! Minimal basalt example — CRUD-style JSON endpoints with middleware.
//!
//! Run with:
//!   RUST_LOG=info cargo run --example basic
//!
//! Try:
//!   curl http://localhost:3000/users/42
//!   curl -X POST http://localhost:3000/users \
//!        -H 'content-type: application/json' \
//!        -d '{"name":"alice"}'
//!   curl http://localhost:3000/missing        # JSON 404 from the handler below

use std::time::Duration;

use basalt::{BoxedHandler, Context, Dispatcher, Encoding, Error, Response};
use serde::{Deserialize, Serialize};

#[derive(Serialize)]
struct User {
    id: String,
    name: String,
}

#[derive(Deserialize)]
struct CreateUser {
    name: String,
}

#[derive(Serialize)]
struct Message {
    message: &'static str,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let mut app = Dispatcher::new(Encoding::Json);

    // Global middleware runs first on every request, in registration order.
    app.middleware(|next: BoxedHandler| {
        BoxedHandler::new(move |mut ctx: Context| {
            let next = next.clone();
            async move {
                ctx.set_data("visitor", ctx.remote_addr().ip().to_string());
                next.call(ctx).await
            }
        })
    });

    app.get("/users/{id}", get_user);
    app.post("/users", create_user);
    app.delete("/users/{id}", delete_user);

    app.not_found(|mut ctx: Context| async move {
        Ok::<_, Error>(ctx.serve_with_status(&Message { message: "Not Found" }, 404))
    });
    app.server_error(|mut ctx: Context| async move {
        Ok::<_, Error>(ctx.serve_with_status(&Message { message: "Internal Error" }, 500))
    });

    app.run("0.0.0.0:3000", Duration::from_secs(10), Duration::from_secs(10))
        .await
        .expect("server error");
}

// GET /users/{id}
async fn get_user(mut ctx: Context) -> Result<Response, Error> {
    let user = User {
        id: ctx.param_value("id").to_owned(),
        name: "alice".to_owned(),
    };
    Ok(ctx.serve(&user))
}

// POST /users — decode the body with the dispatcher's encoding, answer 201.
async fn create_user(mut ctx: Context) -> Result<Response, Error> {
    let input: CreateUser = match ctx.decode_body() {
        Ok(input) => input,
        Err(_) => return Ok(ctx.serve_status(400)),
    };

    let user = User { id: "99".to_owned(), name: input.name };
    Ok(ctx.serve_with_status(&user, 201))
}

// DELETE /users/{id} → 204 No Content
async fn delete_user(mut ctx: Context) -> Result<Response, Error> {
    Ok(ctx.serve_status(204))
}
