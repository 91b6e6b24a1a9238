//! Source adapters: request parts → raw fields.
//!
//! Every adapter feeds a [`Sink`], which normalises bracketed keys and applies
//! the splitting policy before values land in the raw-field map.

use std::collections::HashMap;

use cookie::Cookie;
use http::HeaderMap;
use http::header::{CONTENT_TYPE, COOKIE};

use crate::binder::key::normalize_if_bracketed;
use crate::binder::schema::Schema;
use crate::binder::RawFields;
use crate::error::{Error, Result};
use crate::mime;

/// Collects key/value pairs for one bind.
pub(crate) struct Sink<'a> {
    raw: &'a mut RawFields,
    schema: &'a Schema,
    tag: &'a str,
    splitting: bool,
}

impl<'a> Sink<'a> {
    pub(crate) fn new(raw: &'a mut RawFields, schema: &'a Schema, tag: &'a str, splitting: bool) -> Self {
        Self { raw, schema, tag, splitting }
    }

    /// Adds one value under `key`.
    ///
    /// A comma-separated value is split only when splitting is on and the
    /// destination of `key` is a sequence.
    pub(crate) fn push(&mut self, key: &str, value: &str) -> Result<()> {
        let key = normalize_if_bracketed(key)?;
        if key.is_empty() {
            return Ok(());
        }
        let split = self.splitting && value.contains(',') && self.schema.is_sequence(&key, self.tag);
        let values = self.raw.entry(key).or_default();
        if split {
            values.extend(value.split(',').map(str::to_owned));
        } else {
            values.push(value.to_owned());
        }
        Ok(())
    }
}

/// Header names in MIME canonical form: `x-test-header` → `X-Test-Header`.
pub(crate) fn canonical_header_key(name: &str) -> String {
    let mut upper = true;
    name.chars()
        .map(|c| {
            let out = if upper { c.to_ascii_uppercase() } else { c.to_ascii_lowercase() };
            upper = c == '-';
            out
        })
        .collect()
}

/// Repeated headers are joined with `,` into one value per name.
pub(crate) fn headers(headers: &HeaderMap, sink: &mut Sink<'_>) -> Result<()> {
    let pairs = headers
        .iter()
        .map(|(name, value)| (canonical_header_key(name.as_str()), String::from_utf8_lossy(value.as_bytes())));
    push_joined(pairs, sink)
}

/// Every `name=value` pair of every `Cookie` header; names keep their case.
pub(crate) fn cookies(headers: &HeaderMap, sink: &mut Sink<'_>) -> Result<()> {
    let pairs = headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|header| header.to_str().ok())
        .flat_map(|header| Cookie::split_parse(header).flatten())
        .map(|cookie| (cookie.name().to_owned(), cookie.value().to_owned()));
    push_joined(pairs, sink)
}

/// Repeated keys are joined with `,` into one value per key.
pub(crate) fn query(query: Option<&str>, sink: &mut Sink<'_>) -> Result<()> {
    let Some(query) = query else { return Ok(()) };
    push_joined(form_urlencoded::parse(query.as_bytes()), sink)
}

/// Groups values by key in first-seen order, joins each group with `,` and
/// pushes it once, so the splitter sees the whole list.
fn push_joined<K, V>(pairs: impl IntoIterator<Item = (K, V)>, sink: &mut Sink<'_>) -> Result<()>
where
    K: AsRef<str>,
    V: AsRef<str>,
{
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut joined: Vec<(String, String)> = Vec::new();
    for (key, value) in pairs {
        let (key, value) = (key.as_ref(), value.as_ref());
        match index.get(key) {
            Some(&i) => {
                let all = &mut joined[i].1;
                all.push(',');
                all.push_str(value);
            }
            None => {
                index.insert(key.to_owned(), joined.len());
                joined.push((key.to_owned(), value.to_owned()));
            }
        }
    }
    joined.iter().try_for_each(|(key, value)| sink.push(key, value))
}

/// The url-encoded body. Other content types contribute nothing.
pub(crate) fn form(headers: &HeaderMap, body: &[u8], sink: &mut Sink<'_>) -> Result<()> {
    let content_type = headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok()).unwrap_or_default();
    if mime::essence(content_type) != mime::APPLICATION_FORM {
        return Ok(());
    }
    check_escapes(body)?;
    for (key, value) in form_urlencoded::parse(body) {
        sink.push(&key, &value)?;
    }
    Ok(())
}

/// Route parameters, one value per name, in the router's order.
pub(crate) fn uri<'p, I, F>(names: I, param: F, sink: &mut Sink<'_>) -> Result<()>
where
    I: IntoIterator<Item = &'p str>,
    F: Fn(&str) -> Option<&'p str>,
{
    for name in names {
        if let Some(value) = param(name) {
            sink.push(name, value)?;
        }
    }
    Ok(())
}

/// Rejects `%` escapes that are not followed by two hex digits.
fn check_escapes(body: &[u8]) -> Result<()> {
    let mut i = 0;
    while let Some(offset) = body[i..].iter().position(|&b| b == b'%') {
        let at = i + offset;
        let escape = body.get(at + 1..at + 3);
        if !escape.is_some_and(|e| e.iter().all(u8::is_ascii_hexdigit)) {
            let shown = String::from_utf8_lossy(&body[at..body.len().min(at + 3)]);
            return Err(Error::Parse(format!("invalid URL escape \"{shown}\"")));
        }
        i = at + 3;
    }
    Ok(())
}
