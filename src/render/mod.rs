//! Response rendering.
//!
//! [`Render`] is a small builder over [`http::Response`]: set a status and
//! headers, then finish with one typed body method. Body methods set a
//! default `Content-Type` unless one was chosen with
//! [`Render::content_type`].

pub mod sse;

use std::convert::Infallible;
use std::io;

use bytes::Bytes;
use cookie::Cookie;
use futures_util::{Stream, StreamExt, stream};
use http::header::{
    CACHE_CONTROL, CONNECTION, CONTENT_DISPOSITION, CONTENT_TYPE, HeaderName, HeaderValue, LOCATION, SET_COOKIE,
};
use http::{HeaderMap, Request, Response, StatusCode, Version};
use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::{BodyExt, Full, StreamBody};
use hyper::body::Frame;
use serde::Serialize;
use tracing::{debug, warn};

use self::sse::Event;

/// Body type of every rendered response.
pub type Body = UnsyncBoxBody<Bytes, Infallible>;

const XML_HEADER: &str = "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n";

// ── ContentType ───────────────────────────────────────────────────────────────

/// Content types the renderer sets by default.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ContentType {
    EventStream,  // text/event-stream; charset=utf-8  (SSE)
    Html,         // text/html; charset=utf-8
    JavaScript,   // application/javascript; charset=utf-8  (JSONP)
    Json,         // application/json; charset=utf-8
    OctetStream,  // application/octet-stream  (binary / file download)
    Text,         // text/plain; charset=utf-8
    Xml,          // application/xml; charset=utf-8
}

impl ContentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::EventStream => "text/event-stream; charset=utf-8",
            Self::Html        => "text/html; charset=utf-8",
            Self::JavaScript  => "application/javascript; charset=utf-8",
            Self::Json        => "application/json; charset=utf-8",
            Self::OctetStream => "application/octet-stream",
            Self::Text        => "text/plain; charset=utf-8",
            Self::Xml         => "application/xml; charset=utf-8",
        }
    }
}

impl AsRef<str> for ContentType {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

// ── Render ────────────────────────────────────────────────────────────────────

/// Fluent response builder.
///
/// Defaults to `200 OK`. Terminated by a typed body method.
///
/// ```rust
/// use http::StatusCode;
/// use tsu_bind::Render;
///
/// let res = Render::new()
///     .status(StatusCode::CREATED)
///     .header("location", "/users/42")
///     .json(&serde_json::json!({ "id": 42 }));
///
/// assert_eq!(res.status(), StatusCode::CREATED);
/// assert_eq!(res.headers()["content-type"], "application/json; charset=utf-8");
/// ```
pub struct Render {
    status: StatusCode,
    headers: HeaderMap,
    content_type: Option<HeaderValue>,
    version: Version,
}

impl Render {
    /// A renderer for an HTTP/1.1 exchange.
    pub fn new() -> Self {
        Self { status: StatusCode::OK, headers: HeaderMap::new(), content_type: None, version: Version::HTTP_11 }
    }

    /// A renderer answering `req`; event streams only send
    /// `Connection: keep-alive` to HTTP/1.x clients.
    pub fn for_request<B>(req: &Request<B>) -> Self {
        Self { version: req.version(), ..Self::new() }
    }

    pub fn status(mut self, status: StatusCode) -> Self {
        self.status = status;
        self
    }

    /// Sets (replaces) a header. Invalid names or values are skipped.
    pub fn header(mut self, name: &str, value: &str) -> Self {
        match (HeaderName::try_from(name), HeaderValue::try_from(value)) {
            (Ok(name), Ok(value)) => {
                self.headers.insert(name, value);
            }
            _ => warn!(header = name, "invalid response header skipped"),
        }
        self
    }

    /// Overrides the default `Content-Type` of the body method.
    pub fn content_type(mut self, value: impl AsRef<str>) -> Self {
        match HeaderValue::try_from(value.as_ref()) {
            Ok(value) => self.content_type = Some(value),
            Err(_) => warn!(content_type = value.as_ref(), "invalid content type skipped"),
        }
        self
    }

    /// Adds a `Set-Cookie` header.
    pub fn cookie(mut self, cookie: &Cookie<'_>) -> Self {
        match HeaderValue::try_from(cookie.to_string()) {
            Ok(value) => {
                self.headers.append(SET_COOKIE, value);
            }
            Err(_) => warn!(cookie = cookie.name(), "invalid cookie skipped"),
        }
        self
    }

    /// Tells the client to drop cookie `name` (`name=; Max-Age=0`).
    pub fn without_cookie(self, name: &str) -> Self {
        let expired = Cookie::build((name.to_owned(), "")).max_age(cookie::time::Duration::ZERO).build();
        self.cookie(&expired)
    }

    /// `302 Found` to `url`, sent as given.
    pub fn redirect(self, url: &str) -> Response<Body> {
        self.status(StatusCode::FOUND).header(LOCATION.as_str(), url).empty()
    }

    /// `301 Moved Permanently` to `url`, sent as given.
    pub fn redirect_permanent(self, url: &str) -> Response<Body> {
        self.status(StatusCode::MOVED_PERMANENTLY).header(LOCATION.as_str(), url).empty()
    }

    pub fn text(self, body: impl Into<String>) -> Response<Body> {
        self.finish(ContentType::Text, full(body.into()))
    }

    pub fn html(self, body: impl Into<String>) -> Response<Body> {
        self.finish(ContentType::Html, full(body.into()))
    }

    /// Raw bytes, `application/octet-stream` by default.
    pub fn data(self, body: impl Into<Bytes>) -> Response<Body> {
        self.finish(ContentType::OctetStream, full(body.into()))
    }

    /// `value` as JSON followed by a newline, with `<`, `>` and `&` escaped
    /// so the output is safe to embed in HTML. A value that fails to
    /// serialise renders as `500 Internal Server Error`.
    pub fn json<T: Serialize + ?Sized>(self, value: &T) -> Response<Body> {
        match to_json(value) {
            Ok(body) => self.finish(ContentType::Json, full(body)),
            Err(e) => internal_error(&e),
        }
    }

    /// `callback(<json>);` as `application/javascript`.
    pub fn jsonp<T: Serialize + ?Sized>(self, callback: &str, value: &T) -> Response<Body> {
        match to_json(value) {
            Ok(json) => {
                let mut body = Vec::with_capacity(callback.len() + json.len() + 3);
                body.extend_from_slice(callback.as_bytes());
                body.push(b'(');
                body.extend_from_slice(&json);
                body.extend_from_slice(b");");
                self.finish(ContentType::JavaScript, full(body))
            }
            Err(e) => internal_error(&e),
        }
    }

    /// `value` as XML. The standard XML declaration is prepended unless one
    /// already appears in the first 100 bytes.
    pub fn xml<T: Serialize>(self, value: &T) -> Response<Body> {
        match quick_xml::se::to_string(value) {
            Ok(xml) => self.finish(ContentType::Xml, full(with_xml_header(xml))),
            Err(e) => internal_error(&e),
        }
    }

    /// `204 No Content`.
    pub fn no_content(self) -> Response<Body> {
        self.status(StatusCode::NO_CONTENT).empty()
    }

    /// `content` as an attachment the client should save as `filename`.
    pub fn download(mut self, filename: &str, content: impl Into<Bytes>) -> Response<Body> {
        match HeaderValue::try_from(content_disposition(filename)) {
            Ok(value) => {
                self.headers.insert(CONTENT_DISPOSITION, value);
            }
            Err(_) => warn!(filename, "invalid download filename skipped"),
        }
        self.data(content)
    }

    /// A single server-sent event.
    pub fn sse_event(self, event: &Event) -> Response<Body> {
        self.event_headers().finish(ContentType::EventStream, full(event.encode()))
    }

    /// Every item of `items` as an `event: data` server-sent event carrying
    /// its JSON form, then `event: EOF` once the stream ends. Items that fail
    /// to serialise become `event: error` events.
    pub fn event_stream<S, T>(self, items: S) -> Response<Body>
    where
        S: Stream<Item = T> + Send + 'static,
        T: Serialize + 'static,
    {
        let frames = items
            .map(|item| match to_json(&item) {
                Ok(json) => {
                    let json = String::from_utf8_lossy(&json);
                    Bytes::from(format!("event: data\ndata: {}\n\n", json.trim_end()))
                }
                Err(e) => Bytes::from(format!("event: error\ndata: {{\"error\":{:?}}}\n\n", e.to_string())),
            })
            .chain(stream::once(async { Bytes::from_static(b"event: EOF\n\n") }));
        self.event_headers().stream_as(ContentType::EventStream, frames)
    }

    /// Arbitrary body chunks, sent as they are produced.
    pub fn stream<S>(self, chunks: S) -> Response<Body>
    where
        S: Stream<Item = Bytes> + Send + 'static,
    {
        self.stream_as(ContentType::OctetStream, chunks)
    }

    fn stream_as<S>(self, default: ContentType, chunks: S) -> Response<Body>
    where
        S: Stream<Item = Bytes> + Send + 'static,
    {
        let body = StreamBody::new(chunks.map(|chunk| Ok::<_, Infallible>(Frame::data(chunk))));
        self.finish(default, body.boxed_unsync())
    }

    fn event_headers(mut self) -> Self {
        self.headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
        // HTTP/2 forbids connection-specific header fields.
        if self.version < Version::HTTP_2 {
            self.headers.insert(CONNECTION, HeaderValue::from_static("keep-alive"));
        }
        self
    }

    fn empty(self) -> Response<Body> {
        let (status, headers) = (self.status, self.headers);
        build(status, headers, full(Bytes::new()))
    }

    fn finish(mut self, default: ContentType, body: Body) -> Response<Body> {
        let content_type = self.content_type.take().unwrap_or(HeaderValue::from_static(default.as_str()));
        self.headers.insert(CONTENT_TYPE, content_type);
        debug!(status = %self.status, "rendering response");
        build(self.status, self.headers, body)
    }
}

impl Default for Render {
    fn default() -> Self {
        Self::new()
    }
}

fn build(status: StatusCode, headers: HeaderMap, body: Body) -> Response<Body> {
    let mut res = Response::new(body);
    *res.status_mut() = status;
    *res.headers_mut() = headers;
    res
}

fn full(body: impl Into<Bytes>) -> Body {
    Full::new(body.into()).boxed_unsync()
}

fn internal_error(e: &dyn std::fmt::Display) -> Response<Body> {
    warn!(error = %e, "response serialisation failed");
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static(ContentType::Text.as_str()));
    headers.insert("x-content-type-options", HeaderValue::from_static("nosniff"));
    build(StatusCode::INTERNAL_SERVER_ERROR, headers, full(format!("{e}\n")))
}

// ── JSON ──────────────────────────────────────────────────────────────────────

/// Escapes characters that are unsafe inside HTML `<script>` blocks.
struct HtmlSafe;

impl serde_json::ser::Formatter for HtmlSafe {
    fn write_string_fragment<W: ?Sized + io::Write>(&mut self, writer: &mut W, fragment: &str) -> io::Result<()> {
        let mut start = 0;
        for (i, c) in fragment.char_indices() {
            let escaped = match c {
                '<' => "\\u003c",
                '>' => "\\u003e",
                '&' => "\\u0026",
                '\u{2028}' => "\\u2028",
                '\u{2029}' => "\\u2029",
                _ => continue,
            };
            writer.write_all(&fragment.as_bytes()[start..i])?;
            writer.write_all(escaped.as_bytes())?;
            start = i + c.len_utf8();
        }
        writer.write_all(&fragment.as_bytes()[start..])
    }
}

fn to_json<T: Serialize + ?Sized>(value: &T) -> serde_json::Result<Vec<u8>> {
    let mut out = Vec::with_capacity(128);
    value.serialize(&mut serde_json::Serializer::with_formatter(&mut out, HtmlSafe))?;
    out.push(b'\n');
    Ok(out)
}

// ── XML ───────────────────────────────────────────────────────────────────────

fn with_xml_header(xml: String) -> String {
    let head = &xml.as_bytes()[..xml.len().min(100)];
    if head.windows(5).any(|w| w == b"<?xml") {
        xml
    } else {
        format!("{XML_HEADER}{xml}")
    }
}

// ── Content-Disposition ───────────────────────────────────────────────────────

fn content_disposition(filename: &str) -> String {
    if filename.is_ascii() {
        let quoted = filename.replace('\\', "\\\\").replace('"', "\\\"");
        format!("attachment; filename=\"{quoted}\"")
    } else {
        let encoded: String = form_urlencoded::byte_serialize(filename.as_bytes()).collect();
        format!("attachment; filename*=UTF-8''{encoded}")
    }
}
