use bytes::Bytes;
use cookie::Cookie;
use futures_util::stream;
use http::StatusCode;
use http::header::{CONTENT_DISPOSITION, CONTENT_TYPE, LOCATION, SET_COOKIE};
use http_body_util::BodyExt;
use serde::Serialize;
use tsu_bind::render::Body;
use tsu_bind::{ContentType, Render, sse};

async fn body_of(res: http::Response<Body>) -> String {
    let bytes = res.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

#[derive(Serialize)]
#[serde(rename = "user")]
struct User {
    id: u32,
    name: String,
}

fn alice() -> User {
    User { id: 1, name: "alice".into() }
}

#[tokio::test]
async fn json_with_trailing_newline() {
    let res = Render::new().status(StatusCode::CREATED).json(&alice());
    assert_eq!(res.status(), StatusCode::CREATED);
    assert_eq!(res.headers()[CONTENT_TYPE], "application/json; charset=utf-8");
    assert_eq!(body_of(res).await, "{\"id\":1,\"name\":\"alice\"}\n");
}

#[tokio::test]
async fn jsonp_wraps_in_callback() {
    let res = Render::new().jsonp("cb", &alice());
    assert_eq!(res.headers()[CONTENT_TYPE], "application/javascript; charset=utf-8");
    assert_eq!(body_of(res).await, "cb({\"id\":1,\"name\":\"alice\"}\n);");
}

#[tokio::test]
async fn json_failure_is_a_500() {
    use std::collections::HashMap;
    // Non-string map keys cannot be JSON object keys.
    let bad: HashMap<(u8, u8), u8> = HashMap::from([((1, 2), 3)]);
    let res = Render::new().json(&bad);
    assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(res.headers()[CONTENT_TYPE], "text/plain; charset=utf-8");
}

#[tokio::test]
async fn xml_gets_a_declaration() {
    let res = Render::new().xml(&alice());
    assert_eq!(res.headers()[CONTENT_TYPE], "application/xml; charset=utf-8");
    let body = body_of(res).await;
    assert!(body.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<user>"), "{body}");
    assert!(body.contains("<name>alice</name>"), "{body}");
}

#[tokio::test]
async fn text_html_and_data() {
    let res = Render::new().text("hi");
    assert_eq!(res.headers()[CONTENT_TYPE], ContentType::Text.as_str());
    assert_eq!(body_of(res).await, "hi");

    let res = Render::new().html("<p>hi</p>");
    assert_eq!(res.headers()[CONTENT_TYPE], "text/html; charset=utf-8");

    let res = Render::new().content_type("image/png").data(Bytes::from_static(b"\x89PNG"));
    assert_eq!(res.headers()[CONTENT_TYPE], "image/png");
}

#[test]
fn redirects() {
    let res = Render::new().redirect("/login");
    assert_eq!(res.status(), StatusCode::FOUND);
    assert_eq!(res.headers()[LOCATION], "/login");

    let res = Render::new().redirect_permanent("https://example.com/");
    assert_eq!(res.status(), StatusCode::MOVED_PERMANENTLY);
}

#[test]
fn cookies_are_appended() {
    let res = Render::new()
        .cookie(&Cookie::build(("sid", "abc")).path("/").http_only(true).build())
        .without_cookie("old")
        .no_content();
    let cookies: Vec<_> = res.headers().get_all(SET_COOKIE).iter().map(|v| v.to_str().unwrap()).collect();
    assert_eq!(cookies, ["sid=abc; HttpOnly; Path=/", "old=; Max-Age=0"]);
}

#[tokio::test]
async fn download_sets_disposition() {
    let res = Render::new().download("report.csv", "a,b\n");
    assert_eq!(res.headers()[CONTENT_DISPOSITION], "attachment; filename=\"report.csv\"");
    assert_eq!(res.headers()[CONTENT_TYPE], "application/octet-stream");
    assert_eq!(body_of(res).await, "a,b\n");
}

#[tokio::test]
async fn single_sse_event() {
    let res = Render::new().sse_event(&sse::Event::data("hello").event("greeting"));
    assert_eq!(res.headers()[CONTENT_TYPE], "text/event-stream; charset=utf-8");
    assert_eq!(body_of(res).await, "event: greeting\ndata: hello\n\n");
}

#[tokio::test]
async fn event_stream_frames_items_and_ends_with_eof() {
    #[derive(Serialize)]
    struct Tick {
        n: u32,
    }
    let res = Render::new().event_stream(stream::iter([Tick { n: 1 }, Tick { n: 2 }]));
    assert_eq!(res.headers()["cache-control"], "no-cache");

    let body = body_of(res).await;
    assert_eq!(body, "event: data\ndata: {\"n\":1}\n\nevent: data\ndata: {\"n\":2}\n\nevent: EOF\n\n");

    let events = sse::decode(body.as_bytes());
    let names: Vec<_> = events.iter().map(|e| e.event.as_str()).collect();
    assert_eq!(names, ["data", "data", "EOF"]);
}

#[tokio::test]
async fn raw_stream() {
    let chunks = stream::iter([Bytes::from_static(b"ab"), Bytes::from_static(b"cd")]);
    let res = Render::new().stream(chunks);
    assert_eq!(body_of(res).await, "abcd");
}
