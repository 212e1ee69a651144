//! HTML rendering through the dispatch pipeline: layout composition,
//! layout bypass, render options, and the template failure path.

use std::net::SocketAddr;

use basalt::{Context, Dispatcher, Encoding, Error, HtmlOptions, Templates};
use bytes::Bytes;
use http::{Method, Request, StatusCode};
use http_body_util::{BodyExt as _, Full};
use serde::Serialize;

#[derive(Serialize)]
struct Page {
    title: &'static str,
}

fn remote() -> SocketAddr {
    ([127, 0, 0, 1], 4321).into()
}

fn request(path: &str) -> Request<Full<Bytes>> {
    Request::builder()
        .method(Method::GET)
        .uri(path)
        .body(Full::new(Bytes::new()))
        .unwrap()
}

async fn body_string(resp: http::Response<Full<Bytes>>) -> String {
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

fn fixtures() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("_layout.html"),
        "<html><body>{% include \"content\" %}</body></html>",
    )
    .unwrap();
    std::fs::write(dir.path().join("page.html"), "<h1>{{ title }}</h1>").unwrap();
    dir
}

fn app(dir: &tempfile::TempDir) -> Dispatcher {
    let templates = Templates::new(dir.path());
    let mut d = Dispatcher::with_templates(Encoding::Json, templates);

    d.get("/page", |mut ctx: Context| async move {
        Ok::<_, Error>(ctx.serve_html("page", &Page { title: "Welcome" }))
    });
    d.get("/bare", |mut ctx: Context| async move {
        Ok::<_, Error>(ctx.serve_html_no_layout("page", &Page { title: "Welcome" }))
    });
    d.get("/teapot", |mut ctx: Context| async move {
        let opts = HtmlOptions {
            no_layout: true,
            content_type: Some("application/xhtml+xml".to_owned()),
            status: Some(418),
        };
        Ok::<_, Error>(ctx.serve_html_with("page", &Page { title: "Welcome" }, opts))
    });
    d.get("/missing", |mut ctx: Context| async move {
        Ok::<_, Error>(ctx.serve_html("ghost", &Page { title: "Welcome" }))
    });

    d
}

#[tokio::test]
async fn renders_page_inside_the_layout() {
    let dir = fixtures();
    let d = app(&dir);

    let resp = d.handle(request("/page"), remote()).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers().get("content-type").unwrap(), "text/html");
    assert_eq!(
        body_string(resp).await.trim(),
        "<html><body><h1>Welcome</h1></body></html>"
    );
}

#[tokio::test]
async fn no_layout_renders_the_page_alone() {
    let dir = fixtures();
    let d = app(&dir);

    let resp = d.handle(request("/bare"), remote()).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_string(resp).await.trim(), "<h1>Welcome</h1>");
}

#[tokio::test]
async fn html_options_override_status_and_content_type() {
    let dir = fixtures();
    let d = app(&dir);

    let resp = d.handle(request("/teapot"), remote()).await;
    assert_eq!(resp.status(), StatusCode::IM_A_TEAPOT);
    assert_eq!(
        resp.headers().get("content-type").unwrap(),
        "application/xhtml+xml"
    );
}

#[tokio::test]
async fn template_failure_serves_a_plain_text_500() {
    let dir = fixtures();
    let d = app(&dir);

    let resp = d.handle(request("/missing"), remote()).await;
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(resp.headers().get("content-type").unwrap(), "text/plain");
    assert_eq!(body_string(resp).await, "Error in template");
}
