//! Request binding.
//!
//! A [`Binder`] owns the decoder configuration, one buffer pool per bind kind
//! and the cache of scanned destination types. Build it once at startup and
//! share it; each request then gets a cheap [`Bind`] view:
//!
//! ```text
//! request part ──adapter──▶ RawFields ──decoder──▶ T
//!                  │  normalise `a[0][b]` → `a.0.b`
//!                  └─ split `x,y` when T's field is a sequence
//! ```

mod decode;
mod key;
mod multipart;
mod pool;
mod schema;
mod source;

use std::collections::HashMap;

use bytes::Bytes;
use http::Request;
use http::header::CONTENT_TYPE;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::config::ParserConfig;
use crate::error::{Error, Result};
use crate::kind::BindKind;
use crate::mime;

use self::decode::Ctx;
use self::pool::Pool;
use self::schema::Registry;
use self::source::Sink;

pub use self::key::normalize_key;
pub use self::multipart::{DEFAULT_MAX_MEMORY, FileHeader};

/// Raw `key → values` map produced by a source adapter.
pub type RawFields = HashMap<String, Vec<String>>;

/// Uploaded files by field key, produced by the multipart adapter.
pub type FileFields = HashMap<String, Vec<FileHeader>>;

/// Shared binding state: configuration, buffer pools and the type registry.
///
/// `Binder` is `Send + Sync`; keep one behind an `Arc` or in a `static`.
pub struct Binder {
    config: ParserConfig,
    pools: [Pool; BindKind::KEYED.len()],
    registry: Registry,
}

impl Binder {
    pub fn new(config: ParserConfig) -> Self {
        let pools = std::array::from_fn(|_| Pool::new(config.pool_size));
        Self { config, pools, registry: Registry::default() }
    }

    pub fn config(&self) -> &ParserConfig {
        &self.config
    }

    /// Starts a bind against `req`. Splitting is off and errors are returned
    /// as-is until changed on the returned [`Bind`].
    pub fn bind<'r>(&'r self, req: &'r Request<Bytes>) -> Bind<'r> {
        Bind { binder: self, req, splitting: false, must: false }
    }

    fn tag(&self, kind: BindKind) -> &str {
        self.config.alias_tag.as_deref().unwrap_or(kind.tag())
    }

    /// Fills a pooled buffer through `fill` and decodes it into `T`.
    fn keyed<T, F>(&self, kind: BindKind, splitting: bool, files: &FileFields, fill: F) -> Result<T>
    where
        T: DeserializeOwned + 'static,
        F: FnOnce(&mut Sink<'_>) -> Result<()>,
    {
        let schema = self.registry.schema::<T>();
        let tag = self.tag(kind);
        // Multipart values share the form pool.
        let pool = match kind {
            BindKind::Multipart => BindKind::Form.pool_index(),
            other => other.pool_index(),
        };
        let mut raw = match pool {
            Some(index) => self.pools[index].get(),
            None => return Err(Error::decode(kind, "not a key/value bind kind")),
        };

        fill(&mut Sink::new(&mut raw, &schema, tag, splitting))?;
        debug!(kind = %kind, fields = raw.len(), files = files.len(), "binding");

        let ctx = Ctx { kind, tag, config: &self.config };
        decode::decode(&ctx, &schema, &raw, files)
    }
}

impl Default for Binder {
    fn default() -> Self {
        Self::new(ParserConfig::default())
    }
}

/// One request, ready to be bound.
///
/// ```rust
/// use bytes::Bytes;
/// use serde::Deserialize;
/// use tsu_bind::Binder;
///
/// #[derive(Deserialize)]
/// struct Search {
///     q: String,
///     #[serde(default)]
///     tags: Vec<String>,
/// }
///
/// let binder = Binder::default();
/// let req = http::Request::get("/search?q=rust&tags=web,http").body(Bytes::new()).unwrap();
///
/// let search: Search = binder.bind(&req).splitting(true).query().unwrap();
/// assert_eq!(search.q, "rust");
/// assert_eq!(search.tags, ["web", "http"]);
/// ```
pub struct Bind<'r> {
    binder: &'r Binder,
    req: &'r Request<Bytes>,
    splitting: bool,
    must: bool,
}

impl<'r> Bind<'r> {
    /// Split comma-joined values for sequence destinations.
    pub fn splitting(mut self, enable: bool) -> Self {
        self.splitting = enable;
        self
    }

    /// Wrap every error as [`Error::BadRequest`].
    pub fn must(mut self) -> Self {
        self.must = true;
        self
    }

    /// Return errors untouched (the default).
    pub fn should(mut self) -> Self {
        self.must = false;
        self
    }

    /// Request headers, names in canonical form (`X-Request-Id`).
    pub fn header<T: DeserializeOwned + 'static>(&self) -> Result<T> {
        let headers = self.req.headers();
        self.finish(self.binder.keyed(BindKind::Header, self.splitting, &FileFields::new(), |sink| {
            source::headers(headers, sink)
        }))
    }

    /// Cookies. A cookie like `ids=1,2` binds as a sequence when splitting is on.
    pub fn cookie<T: DeserializeOwned + 'static>(&self) -> Result<T> {
        let headers = self.req.headers();
        self.finish(self.binder.keyed(BindKind::Cookie, self.splitting, &FileFields::new(), |sink| {
            source::cookies(headers, sink)
        }))
    }

    /// The URI query string.
    pub fn query<T: DeserializeOwned + 'static>(&self) -> Result<T> {
        let query = self.req.uri().query();
        self.finish(self.binder.keyed(BindKind::Query, self.splitting, &FileFields::new(), |sink| {
            source::query(query, sink)
        }))
    }

    /// An `application/x-www-form-urlencoded` body.
    pub fn form<T: DeserializeOwned + 'static>(&self) -> Result<T> {
        let (headers, body) = (self.req.headers(), self.req.body());
        self.finish(self.binder.keyed(BindKind::Form, self.splitting, &FileFields::new(), |sink| {
            source::form(headers, body, sink)
        }))
    }

    /// A `multipart/form-data` body of at most [`DEFAULT_MAX_MEMORY`] bytes.
    pub fn multipart<T: DeserializeOwned + 'static>(&self) -> Result<T> {
        self.multipart_with_limit(DEFAULT_MAX_MEMORY)
    }

    /// A `multipart/form-data` body of at most `max_memory` bytes.
    ///
    /// File parts bind to [`FileHeader`] fields; every other part binds like a
    /// form value.
    pub fn multipart_with_limit<T: DeserializeOwned + 'static>(&self, max_memory: usize) -> Result<T> {
        let result = self.multipart_parts(max_memory).and_then(|(fields, files)| {
            self.binder.keyed(BindKind::Multipart, self.splitting, &files, |sink| {
                fields.iter().try_for_each(|(name, value)| sink.push(name, value))
            })
        });
        self.finish(result)
    }

    fn multipart_parts(&self, max_memory: usize) -> Result<(Vec<(String, String)>, FileFields)> {
        let content_type = self.content_type();
        let mut fields = Vec::new();
        let mut files = FileFields::new();
        for part in multipart::parse(content_type, self.req.body(), max_memory)? {
            match part {
                multipart::Part::Field { name, value } => fields.push((name, value)),
                multipart::Part::File { name, file } => {
                    let name = key::normalize_if_bracketed(&name)?;
                    files.entry(name).or_default().push(file);
                }
            }
        }
        Ok((fields, files))
    }

    /// Route parameters: `names` in the router's order and an accessor for
    /// their values. Decoupled from any particular router.
    pub fn uri<'p, T, I, F>(&self, names: I, param: F) -> Result<T>
    where
        T: DeserializeOwned + 'static,
        I: IntoIterator<Item = &'p str>,
        F: Fn(&str) -> Option<&'p str>,
    {
        self.finish(self.binder.keyed(BindKind::Uri, self.splitting, &FileFields::new(), |sink| {
            source::uri(names, param, sink)
        }))
    }

    /// Route parameters captured by a [`matchit`] router.
    pub fn uri_params<T: DeserializeOwned + 'static>(&self, params: &matchit::Params<'_, '_>) -> Result<T> {
        let pairs: Vec<(&str, &str)> = params.iter().collect();
        self.uri(pairs.iter().map(|(k, _)| *k), |name| {
            pairs.iter().find(|(k, _)| *k == name).map(|(_, v)| *v)
        })
    }

    /// A JSON body.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        debug!(kind = %BindKind::Json, bytes = self.req.body().len(), "binding");
        self.finish(serde_json::from_slice(self.req.body()).map_err(Error::from))
    }

    /// An XML body.
    pub fn xml<T: DeserializeOwned>(&self) -> Result<T> {
        debug!(kind = %BindKind::Xml, bytes = self.req.body().len(), "binding");
        self.finish(quick_xml::de::from_reader(self.req.body().as_ref()).map_err(Error::from))
    }

    /// The body, decoded according to its `Content-Type`.
    ///
    /// Vendor types such as `application/vnd.api+json` dispatch on their
    /// suffix. Unknown types fail with [`Error::UnsupportedMediaType`].
    pub fn body<T: DeserializeOwned + 'static>(&self) -> Result<T> {
        match mime::essence(self.content_type()).as_str() {
            mime::APPLICATION_JSON => self.json(),
            mime::TEXT_XML | mime::APPLICATION_XML => self.xml(),
            mime::APPLICATION_FORM => self.form(),
            mime::MULTIPART_FORM => self.multipart(),
            other => self.finish(Err(Error::UnsupportedMediaType(other.to_owned()))),
        }
    }

    fn content_type(&self) -> &'r str {
        self.req
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
    }

    fn finish<T>(&self, result: Result<T>) -> Result<T> {
        match result {
            Err(e) if self.must && !matches!(e, Error::BadRequest(_)) => Err(Error::BadRequest(Box::new(e))),
            other => other,
        }
    }
}
