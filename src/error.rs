//! Unified error type.

use http::StatusCode;
use thiserror::Error;

use crate::kind::BindKind;

/// The error type returned by every bind operation.
///
/// Nothing here is logged or retried by the binder. Translating an error into
/// a transport-level response is the caller's job; [`Error::status`] gives the
/// conventional status code.
#[derive(Debug, Error)]
pub enum Error {
    /// The transport layer could not parse the body encoding (form, multipart).
    #[error("parse: {0}")]
    Parse(String),

    /// A field key has unbalanced square brackets.
    #[error("malformed key `{key}`: unmatched brackets")]
    MalformedKey { key: String },

    /// The destination type could not be built from the source values.
    #[error("bind: {message}")]
    Decode { kind: BindKind, message: String },

    /// The body content type has no matching binder.
    #[error("Unprocessable Entity: unsupported content type `{0}`")]
    UnsupportedMediaType(String),

    /// The destination map's element type is neither a string nor a string sequence.
    #[error("binder: map is not convertible to map[string]string or map[string][]string")]
    MapNotConvertible,

    #[error("bind: {0}")]
    Json(#[from] serde_json::Error),

    #[error("bind: {0}")]
    Xml(#[from] quick_xml::DeError),

    /// Reading the request body stream failed.
    #[error("body: {0}")]
    Body(Box<dyn std::error::Error + Send + Sync>),

    /// Any of the above, surfaced through a bind in "must" mode.
    #[error("bad request: {0}")]
    BadRequest(Box<Error>),
}

impl Error {
    /// The HTTP status a handler would normally answer with.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::UnsupportedMediaType(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::MapNotConvertible => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_REQUEST,
        }
    }

    pub(crate) fn decode(kind: BindKind, message: impl ToString) -> Self {
        Self::Decode { kind, message: message.to_string() }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_errors_carry_bind_prefix() {
        let err = Error::decode(BindKind::Query, "invalid digit found in string");
        assert_eq!(err.to_string(), "bind: invalid digit found in string");
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn unsupported_media_type_maps_to_422() {
        let err = Error::UnsupportedMediaType("text/plain".into());
        assert_eq!(err.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert!(err.to_string().starts_with("Unprocessable Entity"));
    }

    #[test]
    fn must_mode_wraps_inner_error() {
        let err = Error::BadRequest(Box::new(Error::MalformedKey { key: "a[".into() }));
        assert_eq!(err.to_string(), "bad request: malformed key `a[`: unmatched brackets");
    }
}
