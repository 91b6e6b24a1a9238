//! Bind kind as a typed enum.
//!
//! A kind names the request part a binder reads from and the field-name tag it
//! honours. Kinds backed by key/value data (header, cookie, query, form, uri)
//! each own a buffer pool inside [`Binder`](crate::Binder).

use std::fmt;
use std::str::FromStr;

/// A request part that can be bound into a typed value.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum BindKind {
    // Key/value sources ───────────────────────────────────────────────────────
    Cookie,
    Form,
    Header,
    Query,
    Uri,
    // Body decoders ───────────────────────────────────────────────────────────
    Json,
    Multipart,
    Xml,
}

impl BindKind {
    /// Kinds that decode key/value data and therefore own a pool.
    pub const KEYED: [BindKind; 5] = [Self::Header, Self::Cookie, Self::Query, Self::Form, Self::Uri];

    /// Lowercase name used in logs (e.g. `"query"`).
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Cookie    => "cookie",
            Self::Form      => "form",
            Self::Header    => "header",
            Self::Json      => "json",
            Self::Multipart => "multipart",
            Self::Query     => "query",
            Self::Uri       => "uri",
            Self::Xml       => "xml",
        }
    }

    /// Tag honoured by kind-qualified field names (`"query:page"`).
    ///
    /// Route parameters reuse the query tag; multipart reuses the form tag.
    pub fn tag(self) -> &'static str {
        match self {
            Self::Uri       => "query",
            Self::Multipart => "form",
            other           => other.as_str(),
        }
    }

    pub(crate) fn pool_index(self) -> Option<usize> {
        Self::KEYED.iter().position(|k| *k == self)
    }
}

impl FromStr for BindKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cookie"    => Ok(Self::Cookie),
            "form"      => Ok(Self::Form),
            "header"    => Ok(Self::Header),
            "json"      => Ok(Self::Json),
            "multipart" => Ok(Self::Multipart),
            "query"     => Ok(Self::Query),
            "uri"       => Ok(Self::Uri),
            "xml"       => Ok(Self::Xml),
            _           => Err(()),
        }
    }
}

impl fmt::Display for BindKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
