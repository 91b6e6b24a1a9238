//! Decoder configuration.
//!
//! One [`ParserConfig`] is handed to [`Binder::new`](crate::Binder::new) at
//! startup and shared read-only by every bind afterwards. Changing it means
//! building a new `Binder`.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::Deserialize;

/// A typed scalar produced by a custom [`Converter`].
#[derive(Clone, Debug, PartialEq)]
pub enum Converted {
    Bool(bool),
    I64(i64),
    U64(u64),
    F64(f64),
    Str(String),
    /// Decodes as `None` / unit.
    Empty,
}

/// Turns one raw string into a [`Converted`] scalar, or explains why it can't.
pub type Converter = Arc<dyn Fn(&str) -> Result<Converted, String> + Send + Sync>;

/// Options of the key/value decoder.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct ParserConfig {
    /// Overrides the tag honoured by kind-qualified field names
    /// (`"<tag>:<name>"`) for every kind.
    pub alias_tag: Option<String>,
    /// Skip keys that match no field instead of failing.
    pub ignore_unknown_keys: bool,
    /// Decode an empty value as the zero value of a scalar field.
    pub zero_empty: bool,
    /// Free-list bound per bind kind.
    pub pool_size: usize,
    /// Converters keyed by the serde name of the destination type.
    #[serde(skip)]
    pub converters: HashMap<&'static str, Converter>,
}

impl ParserConfig {
    pub fn alias_tag(mut self, tag: impl Into<String>) -> Self {
        self.alias_tag = Some(tag.into());
        self
    }

    pub fn ignore_unknown_keys(mut self, ignore: bool) -> Self {
        self.ignore_unknown_keys = ignore;
        self
    }

    pub fn zero_empty(mut self, zero: bool) -> Self {
        self.zero_empty = zero;
        self
    }

    pub fn pool_size(mut self, size: usize) -> Self {
        self.pool_size = size;
        self
    }

    /// Registers a converter for the type serde knows as `type_name`.
    ///
    /// The name is the one the type passes to its deserializer: the struct
    /// name for `#[derive(Deserialize)] struct Stamp(i64);`.
    ///
    /// ```rust
    /// use tsu_bind::{Converted, ParserConfig};
    ///
    /// let config = ParserConfig::default().converter("Flag", |raw: &str| {
    ///     Ok(Converted::Bool(matches!(raw, "on" | "yes")))
    /// });
    /// ```
    pub fn converter<F>(mut self, type_name: &'static str, convert: F) -> Self
    where
        F: Fn(&str) -> Result<Converted, String> + Send + Sync + 'static,
    {
        self.converters.insert(type_name, Arc::new(convert));
        self
    }
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            alias_tag: None,
            ignore_unknown_keys: true,
            zero_empty: true,
            pool_size: 64,
            converters: HashMap::new(),
        }
    }
}

impl fmt::Debug for ParserConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParserConfig")
            .field("alias_tag", &self.alias_tag)
            .field("ignore_unknown_keys", &self.ignore_unknown_keys)
            .field("zero_empty", &self.zero_empty)
            .field("pool_size", &self.pool_size)
            .field("converters", &self.converters.keys().collect::<Vec<_>>())
            .finish()
    }
}
