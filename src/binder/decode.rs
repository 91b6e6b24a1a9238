//! Struct/map decoder over normalised raw fields.
//!
//! String-keyed map destinations are filled straight from the flat fields.
//! Everything else is decoded from a tree built by splitting keys on `.`:
//! `posts.0.title` lands under `posts` → `0` → `title`, and a node destined
//! for a sequence lists its numeric children in index order.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;

use serde::de::value::{BytesDeserializer, StrDeserializer, StringDeserializer};
use serde::de::{
    self, DeserializeOwned, DeserializeSeed, Deserializer, IntoDeserializer, MapAccess, SeqAccess, Unexpected, Visitor,
};
use serde::forward_to_deserialize_any;

use crate::binder::multipart::FileHeader;
use crate::binder::schema::{self, Schema, Shape};
use crate::binder::{FileFields, RawFields};
use crate::config::{Converted, ParserConfig};
use crate::error::Error;
use crate::kind::BindKind;

/// Per-decode settings shared by every deserializer in the tree.
pub(crate) struct Ctx<'a> {
    pub(crate) kind: BindKind,
    pub(crate) tag: &'a str,
    pub(crate) config: &'a ParserConfig,
}

/// Decodes `fields` and `files` into `T` according to its scanned shape.
pub(crate) fn decode<T: DeserializeOwned>(
    ctx: &Ctx<'_>,
    schema: &Schema,
    fields: &RawFields,
    files: &FileFields,
) -> Result<T, Error> {
    let result = match schema.shape {
        Shape::Map => T::deserialize(FlatMap { fields }),
        Shape::Open => {
            let mut root = Node::build(fields, files);
            root.qualify(ctx.tag, schema);
            T::deserialize(NodeDeserializer { node: &root, ctx })
        }
        _ => {
            let root = Node::build(fields, files);
            T::deserialize(NodeDeserializer { node: &root, ctx })
        }
    };

    result.map_err(|e| match e {
        DeError::MapNotConvertible => Error::MapNotConvertible,
        DeError::Custom(message) => Error::decode(ctx.kind, message),
    })
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug)]
pub(crate) enum DeError {
    Custom(String),
    MapNotConvertible,
}

impl fmt::Display for DeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Custom(message) => f.write_str(message),
            Self::MapNotConvertible => f.write_str("map is not convertible"),
        }
    }
}

impl std::error::Error for DeError {}

impl de::Error for DeError {
    fn custom<T: fmt::Display>(msg: T) -> Self {
        Self::Custom(msg.to_string())
    }
}

// ── Key tree ──────────────────────────────────────────────────────────────────

#[derive(Clone, Debug, Default)]
pub(crate) struct Node {
    values: Vec<String>,
    files: Vec<FileHeader>,
    children: BTreeMap<String, Node>,
}

impl Node {
    fn build(fields: &RawFields, files: &FileFields) -> Self {
        let mut root = Node::default();
        for (key, values) in fields {
            root.at(key).values.extend(values.iter().cloned());
        }
        for (key, list) in files {
            root.at(key).files.extend(list.iter().cloned());
        }
        root
    }

    fn at(&mut self, key: &str) -> &mut Node {
        key.split('.').fold(self, |node, segment| node.children.entry(segment.to_owned()).or_default())
    }

    fn is_empty(&self) -> bool {
        self.values.is_empty() && self.files.is_empty() && self.children.is_empty()
    }

    fn merge(&mut self, other: &Node) {
        self.values.extend(other.values.iter().cloned());
        self.files.extend(other.files.iter().cloned());
        for (key, child) in &other.children {
            self.children.entry(key.clone()).or_default().merge(child);
        }
    }

    /// Renames top-level keys to `"<tag>:<key>"` where an open record
    /// declares a field under that name.
    fn qualify(&mut self, tag: &str, schema: &Schema) {
        for (key, child) in std::mem::take(&mut self.children) {
            let qualified = format!("{tag}:{key}");
            let key = match schema.entry(&qualified) {
                Some(Shape::Unknown) | None => key,
                Some(_) => qualified,
            };
            self.children.entry(key).or_default().merge(&child);
        }
    }

    /// Children keyed `0`, `1`, ... in index order, when every key is numeric.
    fn indexed(&self) -> Option<Vec<&Node>> {
        let mut indexed = self
            .children
            .iter()
            .map(|(k, v)| k.parse::<usize>().ok().map(|i| (i, v)))
            .collect::<Option<Vec<_>>>()?;
        indexed.sort_by_key(|(i, _)| *i);
        Some(indexed.into_iter().map(|(_, v)| v).collect())
    }
}

// ── Flat map destinations ─────────────────────────────────────────────────────

/// `HashMap<String, Vec<String>>` / `HashMap<String, String>` destinations.
struct FlatMap<'a> {
    fields: &'a RawFields,
}

impl<'de> de::Deserializer<'de> for FlatMap<'_> {
    type Error = DeError;

    fn deserialize_any<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, DeError> {
        visitor.visit_map(FlatMapAccess { entries: self.fields.iter(), pending: None })
    }

    forward_to_deserialize_any! {
        bool i8 i16 i32 i64 i128 u8 u16 u32 u64 u128 f32 f64 char str string
        bytes byte_buf option unit unit_struct newtype_struct seq tuple
        tuple_struct map struct enum identifier ignored_any
    }
}

struct FlatMapAccess<'a, I> {
    entries: I,
    pending: Option<&'a [String]>,
}

impl<'a, 'de, I> MapAccess<'de> for FlatMapAccess<'a, I>
where
    I: Iterator<Item = (&'a String, &'a Vec<String>)>,
{
    type Error = DeError;

    fn next_key_seed<K: DeserializeSeed<'de>>(&mut self, seed: K) -> Result<Option<K::Value>, DeError> {
        let Some((key, values)) = self.entries.next() else {
            return Ok(None);
        };
        self.pending = Some(values.as_slice());
        let key: StrDeserializer<'_, DeError> = key.as_str().into_deserializer();
        seed.deserialize(key).map(Some)
    }

    fn next_value_seed<V: DeserializeSeed<'de>>(&mut self, seed: V) -> Result<V::Value, DeError> {
        let values = self.pending.take().unwrap_or_default();
        seed.deserialize(MapValue { values })
    }
}

/// A map value: only a string (last value) or a string sequence is accepted.
struct MapValue<'a> {
    values: &'a [String],
}

impl<'de> de::Deserializer<'de> for MapValue<'_> {
    type Error = DeError;

    fn deserialize_any<V: Visitor<'de>>(self, _visitor: V) -> Result<V::Value, DeError> {
        Err(DeError::MapNotConvertible)
    }

    fn deserialize_str<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, DeError> {
        match self.values.last() {
            Some(value) => visitor.visit_str(value),
            None => visitor.visit_str(""),
        }
    }

    fn deserialize_string<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, DeError> {
        self.deserialize_str(visitor)
    }

    fn deserialize_seq<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, DeError> {
        visitor.visit_seq(Elements { items: self.values.iter().map(|v| StrOnly(v)) })
    }

    forward_to_deserialize_any! {
        bool i8 i16 i32 i64 i128 u8 u16 u32 u64 u128 f32 f64 char
        bytes byte_buf option unit unit_struct newtype_struct tuple
        tuple_struct map struct enum identifier ignored_any
    }
}

struct StrOnly<'a>(&'a str);

impl<'de> de::Deserializer<'de> for StrOnly<'_> {
    type Error = DeError;

    fn deserialize_any<V: Visitor<'de>>(self, _visitor: V) -> Result<V::Value, DeError> {
        Err(DeError::MapNotConvertible)
    }

    fn deserialize_str<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, DeError> {
        visitor.visit_str(self.0)
    }

    fn deserialize_string<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, DeError> {
        visitor.visit_str(self.0)
    }

    forward_to_deserialize_any! {
        bool i8 i16 i32 i64 i128 u8 u16 u32 u64 u128 f32 f64 char
        bytes byte_buf option unit unit_struct newtype_struct seq tuple
        tuple_struct map struct enum identifier ignored_any
    }
}

struct Elements<I> {
    items: I,
}

impl<'de, I, D> SeqAccess<'de> for Elements<I>
where
    I: Iterator<Item = D>,
    D: de::Deserializer<'de, Error = DeError>,
{
    type Error = DeError;

    fn next_element_seed<T: DeserializeSeed<'de>>(&mut self, seed: T) -> Result<Option<T::Value>, DeError> {
        self.items.next().map(|item| seed.deserialize(item)).transpose()
    }
}

// ── Tree destinations ─────────────────────────────────────────────────────────

struct NodeDeserializer<'a> {
    node: &'a Node,
    ctx: &'a Ctx<'a>,
}

impl<'a> NodeDeserializer<'a> {
    fn last(&self) -> Option<ValueDeserializer<'a>> {
        self.node.values.last().map(|value| ValueDeserializer { value, ctx: self.ctx })
    }

    fn unexpected(&self) -> Unexpected<'a> {
        match self.node.values.last() {
            Some(value) => Unexpected::Str(value),
            None => Unexpected::Map,
        }
    }

    fn children(&self) -> ChildAccess<'a> {
        ChildAccess {
            entries: self
                .node
                .children
                .iter()
                .map(|(k, v)| (Cow::Borrowed(k.as_str()), Cow::Borrowed(v)))
                .collect::<Vec<_>>()
                .into_iter(),
            pending: None,
            ctx: self.ctx,
        }
    }

    /// Matches children against `fields`, renaming them to the declared names.
    fn record(&self, fields: &'static [&'static str]) -> Result<ChildAccess<'a>, DeError> {
        let mut entries: Vec<(Cow<'a, str>, Cow<'a, Node>)> = Vec::with_capacity(self.node.children.len());

        for (key, child) in &self.node.children {
            let name = match canonical(fields, key, self.ctx.tag) {
                Some(name) => Cow::Borrowed(name),
                None if self.ctx.config.ignore_unknown_keys => Cow::Borrowed(key.as_str()),
                None => return Err(de::Error::unknown_field(key, fields)),
            };

            match entries.iter_mut().find(|(k, _)| *k == name) {
                Some((_, existing)) => existing.to_mut().merge(child),
                None => entries.push((name, Cow::Borrowed(child))),
            }
        }

        Ok(ChildAccess { entries: entries.into_iter(), pending: None, ctx: self.ctx })
    }
}

fn canonical(fields: &'static [&'static str], key: &str, tag: &str) -> Option<&'static str> {
    fields
        .iter()
        .copied()
        .find(|f| *f == key)
        .or_else(|| fields.iter().copied().find(|f| schema::matches(f, key, tag)))
}

macro_rules! last_value {
    ($($method:ident)*) => {
        $(fn $method<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, DeError> {
            match self.last() {
                Some(value) => value.$method(visitor),
                None => Err(de::Error::invalid_type(self.unexpected(), &visitor)),
            }
        })*
    };
}

impl<'de> de::Deserializer<'de> for NodeDeserializer<'_> {
    type Error = DeError;

    last_value! {
        deserialize_bool deserialize_i8 deserialize_i16 deserialize_i32 deserialize_i64
        deserialize_i128 deserialize_u8 deserialize_u16 deserialize_u32 deserialize_u64
        deserialize_u128 deserialize_f32 deserialize_f64 deserialize_char deserialize_str
        deserialize_string deserialize_bytes deserialize_byte_buf deserialize_unit
        deserialize_identifier
    }

    fn deserialize_any<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, DeError> {
        let node = self.node;
        if !node.children.is_empty() || node.is_empty() {
            visitor.visit_map(self.children())
        } else if let Some(file) = node.files.last() {
            FileDeserializer { file }.deserialize_any(visitor)
        } else if node.values.len() > 1 {
            self.deserialize_seq(visitor)
        } else {
            ValueDeserializer { value: &node.values[0], ctx: self.ctx }.deserialize_any(visitor)
        }
    }

    fn deserialize_option<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, DeError> {
        let node = self.node;
        let blank = node.children.is_empty()
            && node.files.is_empty()
            && node.values.last().is_none_or(|v| v.is_empty() && self.ctx.config.zero_empty);
        if blank { visitor.visit_none() } else { visitor.visit_some(self) }
    }

    fn deserialize_seq<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, DeError> {
        let ctx = self.ctx;
        if let Some(indexed) = self.node.indexed().filter(|items| !items.is_empty()) {
            return visitor.visit_seq(Elements { items: indexed.into_iter().map(|node| NodeDeserializer { node, ctx }) });
        }
        if !self.node.files.is_empty() {
            return visitor.visit_seq(Elements { items: self.node.files.iter().map(|file| FileDeserializer { file }) });
        }
        visitor.visit_seq(Elements { items: self.node.values.iter().map(|value| ValueDeserializer { value, ctx }) })
    }

    fn deserialize_tuple<V: Visitor<'de>>(self, _len: usize, visitor: V) -> Result<V::Value, DeError> {
        self.deserialize_seq(visitor)
    }

    fn deserialize_tuple_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        _len: usize,
        visitor: V,
    ) -> Result<V::Value, DeError> {
        self.deserialize_seq(visitor)
    }

    fn deserialize_map<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, DeError> {
        if self.node.children.is_empty() && !self.node.values.is_empty() {
            return Err(de::Error::invalid_type(self.unexpected(), &visitor));
        }
        visitor.visit_map(self.children())
    }

    fn deserialize_struct<V: Visitor<'de>>(
        self,
        name: &'static str,
        fields: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value, DeError> {
        if self.node.children.is_empty() {
            if let Some(file) = self.node.files.last() {
                return FileDeserializer { file }.deserialize_struct(name, fields, visitor);
            }
            if !self.node.values.is_empty() {
                return Err(de::Error::invalid_type(self.unexpected(), &visitor));
            }
        }
        visitor.visit_map(self.record(fields)?)
    }

    fn deserialize_unit_struct<V: Visitor<'de>>(self, _name: &'static str, visitor: V) -> Result<V::Value, DeError> {
        visitor.visit_unit()
    }

    fn deserialize_newtype_struct<V: Visitor<'de>>(self, name: &'static str, visitor: V) -> Result<V::Value, DeError> {
        match (self.ctx.config.converters.contains_key(name), self.last()) {
            (true, Some(value)) => value.deserialize_newtype_struct(name, visitor),
            _ => visitor.visit_newtype_struct(self),
        }
    }

    fn deserialize_enum<V: Visitor<'de>>(
        self,
        name: &'static str,
        variants: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value, DeError> {
        match self.last() {
            Some(value) => value.deserialize_enum(name, variants, visitor),
            None => Err(de::Error::invalid_type(self.unexpected(), &visitor)),
        }
    }

    fn deserialize_ignored_any<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, DeError> {
        visitor.visit_unit()
    }
}

struct ChildAccess<'a> {
    entries: std::vec::IntoIter<(Cow<'a, str>, Cow<'a, Node>)>,
    pending: Option<Cow<'a, Node>>,
    ctx: &'a Ctx<'a>,
}

impl<'de> MapAccess<'de> for ChildAccess<'_> {
    type Error = DeError;

    fn next_key_seed<K: DeserializeSeed<'de>>(&mut self, seed: K) -> Result<Option<K::Value>, DeError> {
        let Some((key, node)) = self.entries.next() else {
            return Ok(None);
        };
        self.pending = Some(node);
        let key: StringDeserializer<DeError> = key.into_owned().into_deserializer();
        seed.deserialize(key).map(Some)
    }

    fn next_value_seed<V: DeserializeSeed<'de>>(&mut self, seed: V) -> Result<V::Value, DeError> {
        let node = self.pending.take().unwrap_or_default();
        seed.deserialize(NodeDeserializer { node: &node, ctx: self.ctx })
    }

    fn size_hint(&self) -> Option<usize> {
        Some(self.entries.len())
    }
}

// ── Single values ─────────────────────────────────────────────────────────────

/// One raw string, parsed on demand into whatever the destination asks for.
struct ValueDeserializer<'a> {
    value: &'a str,
    ctx: &'a Ctx<'a>,
}

impl ValueDeserializer<'_> {
    /// `None` means "empty and zeroed": the caller visits the zero value.
    fn parse<T: std::str::FromStr>(&self, visitor: &dyn de::Expected) -> Result<Option<T>, DeError> {
        if self.value.is_empty() && self.ctx.config.zero_empty {
            return Ok(None);
        }
        self.value
            .parse()
            .map(Some)
            .map_err(|_| de::Error::invalid_value(Unexpected::Str(self.value), visitor))
    }
}

macro_rules! parse_number {
    ($($method:ident => $ty:ty, $visit:ident;)*) => {
        $(fn $method<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, DeError> {
            let parsed: Option<$ty> = self.parse(&visitor)?;
            visitor.$visit(parsed.unwrap_or_default())
        })*
    };
}

impl<'de> de::Deserializer<'de> for ValueDeserializer<'_> {
    type Error = DeError;

    parse_number! {
        deserialize_i8 => i8, visit_i8;
        deserialize_i16 => i16, visit_i16;
        deserialize_i32 => i32, visit_i32;
        deserialize_i64 => i64, visit_i64;
        deserialize_i128 => i128, visit_i128;
        deserialize_u8 => u8, visit_u8;
        deserialize_u16 => u16, visit_u16;
        deserialize_u32 => u32, visit_u32;
        deserialize_u64 => u64, visit_u64;
        deserialize_u128 => u128, visit_u128;
        deserialize_f32 => f32, visit_f32;
        deserialize_f64 => f64, visit_f64;
    }

    /// Untyped reads (flattened fields, untagged enums) get integers, floats
    /// and `true`/`false` in their canonical spelling as such; anything else
    /// stays a string.
    fn deserialize_any<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, DeError> {
        let value = self.value;
        if let Some(n) = value.parse::<u64>().ok().filter(|n| n.to_string() == value) {
            return visitor.visit_u64(n);
        }
        if let Some(n) = value.parse::<i64>().ok().filter(|n| n.to_string() == value) {
            return visitor.visit_i64(n);
        }
        let numeric = value.contains('.') && value.bytes().all(|b| b.is_ascii_digit() || b == b'.' || b == b'-');
        if let Some(n) = numeric.then(|| value.parse::<f64>().ok()).flatten() {
            return visitor.visit_f64(n);
        }
        match value {
            "true" => visitor.visit_bool(true),
            "false" => visitor.visit_bool(false),
            _ => visitor.visit_str(value),
        }
    }

    fn deserialize_bool<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, DeError> {
        if self.value.is_empty() && self.ctx.config.zero_empty {
            return visitor.visit_bool(false);
        }
        match parse_bool(self.value) {
            Some(b) => visitor.visit_bool(b),
            None => Err(de::Error::invalid_value(Unexpected::Str(self.value), &visitor)),
        }
    }

    fn deserialize_char<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, DeError> {
        let mut chars = self.value.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) => visitor.visit_char(c),
            (None, _) if self.ctx.config.zero_empty => visitor.visit_char('\0'),
            _ => Err(de::Error::invalid_value(Unexpected::Str(self.value), &visitor)),
        }
    }

    fn deserialize_str<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, DeError> {
        visitor.visit_str(self.value)
    }

    fn deserialize_string<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, DeError> {
        visitor.visit_str(self.value)
    }

    fn deserialize_bytes<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, DeError> {
        visitor.visit_bytes(self.value.as_bytes())
    }

    fn deserialize_byte_buf<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, DeError> {
        visitor.visit_bytes(self.value.as_bytes())
    }

    fn deserialize_option<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, DeError> {
        if self.value.is_empty() && self.ctx.config.zero_empty {
            visitor.visit_none()
        } else {
            visitor.visit_some(self)
        }
    }

    fn deserialize_unit<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, DeError> {
        visitor.visit_unit()
    }

    fn deserialize_unit_struct<V: Visitor<'de>>(self, _name: &'static str, visitor: V) -> Result<V::Value, DeError> {
        visitor.visit_unit()
    }

    fn deserialize_newtype_struct<V: Visitor<'de>>(self, name: &'static str, visitor: V) -> Result<V::Value, DeError> {
        match self.ctx.config.converters.get(name) {
            Some(convert) => {
                let converted = convert(self.value).map_err(DeError::Custom)?;
                visitor.visit_newtype_struct(ConvertedDeserializer(converted))
            }
            None => visitor.visit_newtype_struct(self),
        }
    }

    fn deserialize_seq<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, DeError> {
        visitor.visit_seq(Elements { items: std::iter::once(self) })
    }

    fn deserialize_tuple<V: Visitor<'de>>(self, _len: usize, visitor: V) -> Result<V::Value, DeError> {
        self.deserialize_seq(visitor)
    }

    fn deserialize_tuple_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        _len: usize,
        visitor: V,
    ) -> Result<V::Value, DeError> {
        self.deserialize_seq(visitor)
    }

    fn deserialize_map<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, DeError> {
        Err(de::Error::invalid_type(Unexpected::Str(self.value), &visitor))
    }

    fn deserialize_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        _fields: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value, DeError> {
        Err(de::Error::invalid_type(Unexpected::Str(self.value), &visitor))
    }

    fn deserialize_enum<V: Visitor<'de>>(
        self,
        name: &'static str,
        variants: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value, DeError> {
        let value: StrDeserializer<'_, DeError> = self.value.into_deserializer();
        value.deserialize_enum(name, variants, visitor)
    }

    fn deserialize_identifier<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, DeError> {
        visitor.visit_str(self.value)
    }

    fn deserialize_ignored_any<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, DeError> {
        visitor.visit_unit()
    }
}

/// `strconv.ParseBool` spellings plus the HTML checkbox `on`.
fn parse_bool(value: &str) -> Option<bool> {
    match value {
        "1" | "t" | "T" | "true" | "TRUE" | "True" | "on" => Some(true),
        "0" | "f" | "F" | "false" | "FALSE" | "False" => Some(false),
        _ => None,
    }
}

struct ConvertedDeserializer(Converted);

impl<'de> de::Deserializer<'de> for ConvertedDeserializer {
    type Error = DeError;

    fn deserialize_any<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, DeError> {
        match self.0 {
            Converted::Bool(b) => visitor.visit_bool(b),
            Converted::I64(n) => visitor.visit_i64(n),
            Converted::U64(n) => visitor.visit_u64(n),
            Converted::F64(n) => visitor.visit_f64(n),
            Converted::Str(s) => visitor.visit_string(s),
            Converted::Empty => visitor.visit_unit(),
        }
    }

    fn deserialize_option<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, DeError> {
        match self.0 {
            Converted::Empty => visitor.visit_none(),
            _ => visitor.visit_some(self),
        }
    }

    forward_to_deserialize_any! {
        bool i8 i16 i32 i64 i128 u8 u16 u32 u64 u128 f32 f64 char str string
        bytes byte_buf unit unit_struct newtype_struct seq tuple
        tuple_struct map struct enum identifier ignored_any
    }
}

// ── Uploaded files ────────────────────────────────────────────────────────────

/// Presents a [`FileHeader`] as a record with its own field names.
struct FileDeserializer<'a> {
    file: &'a FileHeader,
}

impl<'de> de::Deserializer<'de> for FileDeserializer<'_> {
    type Error = DeError;

    fn deserialize_any<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, DeError> {
        visitor.visit_map(FileAccess { file: self.file, next: 0 })
    }

    fn deserialize_option<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, DeError> {
        visitor.visit_some(self)
    }

    forward_to_deserialize_any! {
        bool i8 i16 i32 i64 i128 u8 u16 u32 u64 u128 f32 f64 char str string
        bytes byte_buf unit unit_struct newtype_struct seq tuple
        tuple_struct map struct enum identifier ignored_any
    }
}

struct FileAccess<'a> {
    file: &'a FileHeader,
    next: usize,
}

impl<'de> MapAccess<'de> for FileAccess<'_> {
    type Error = DeError;

    fn next_key_seed<K: DeserializeSeed<'de>>(&mut self, seed: K) -> Result<Option<K::Value>, DeError> {
        let Some(&key) = FileHeader::FIELDS.get(self.next) else {
            return Ok(None);
        };
        let key: StrDeserializer<'_, DeError> = key.into_deserializer();
        seed.deserialize(key).map(Some)
    }

    fn next_value_seed<V: DeserializeSeed<'de>>(&mut self, seed: V) -> Result<V::Value, DeError> {
        let field = self.next;
        self.next += 1;
        match field {
            0 => seed.deserialize(self.file.filename.as_str().into_deserializer()),
            1 => seed.deserialize(self.file.content_type.as_str().into_deserializer()),
            _ => seed.deserialize(BytesDeserializer::new(&self.file.content)),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::{BTreeMap, HashMap};

    use serde::Deserialize;

    use super::*;

    fn raw(pairs: &[(&str, &[&str])]) -> RawFields {
        pairs
            .iter()
            .map(|(k, vs)| (k.to_string(), vs.iter().map(|v| v.to_string()).collect()))
            .collect()
    }

    fn run<T: DeserializeOwned>(config: &ParserConfig, fields: &RawFields) -> Result<T, Error> {
        let ctx = Ctx { kind: BindKind::Query, tag: "query", config };
        decode(&ctx, &Schema::scan::<T>(), fields, &FileFields::new())
    }

    #[derive(Debug, Deserialize, PartialEq)]
    struct Post {
        title: String,
    }

    #[derive(Debug, Deserialize, PartialEq)]
    struct User {
        name: String,
        #[serde(default)]
        names: Vec<String>,
        age: i32,
        #[serde(default)]
        posts: Vec<Post>,
        nickname: Option<String>,
    }

    #[test]
    fn map_of_sequences_copies_everything() {
        let fields = raw(&[("a", &["1", "2"]), ("b", &["3"])]);
        let out: HashMap<String, Vec<String>> = run(&ParserConfig::default(), &fields).unwrap();
        assert_eq!(out["a"], ["1", "2"]);
        assert_eq!(out["b"], ["3"]);
    }

    #[test]
    fn map_of_strings_takes_last_value() {
        let fields = raw(&[("a", &["first", "last"]), ("b.c", &["x"])]);
        let out: BTreeMap<String, String> = run(&ParserConfig::default(), &fields).unwrap();
        assert_eq!(out["a"], "last");
        assert_eq!(out["b.c"], "x");
    }

    #[test]
    fn map_of_other_values_is_not_convertible() {
        let fields = raw(&[("a", &["1"])]);
        let err = run::<HashMap<String, i32>>(&ParserConfig::default(), &fields).unwrap_err();
        assert!(matches!(err, Error::MapNotConvertible));
    }

    #[test]
    fn record_fields_match_case_insensitively() {
        let fields = raw(&[("NAME", &["john"]), ("Age", &["42"]), ("names", &["john", "doe"])]);
        let user: User = run(&ParserConfig::default(), &fields).unwrap();
        assert_eq!(user.name, "john");
        assert_eq!(user.age, 42);
        assert_eq!(user.names, ["john", "doe"]);
        assert_eq!(user.nickname, None);
    }

    #[test]
    fn indexed_children_become_ordered_sequence() {
        let fields = raw(&[
            ("name", &["n"]),
            ("age", &["1"]),
            ("posts.10.title", &["ten"]),
            ("posts.2.title", &["two"]),
            ("posts.0.title", &["zero"]),
        ]);
        let user: User = run(&ParserConfig::default(), &fields).unwrap();
        let titles: Vec<_> = user.posts.iter().map(|p| p.title.as_str()).collect();
        assert_eq!(titles, ["zero", "two", "ten"]);
    }

    #[test]
    fn scalars_take_the_last_value() {
        let fields = raw(&[("name", &["a", "b"]), ("age", &["1", "2"])]);
        let user: User = run(&ParserConfig::default(), &fields).unwrap();
        assert_eq!(user.name, "b");
        assert_eq!(user.age, 2);
    }

    #[test]
    fn empty_values_zero_out_when_enabled() {
        let fields = raw(&[("name", &[""]), ("age", &[""]), ("nickname", &[""])]);
        let user: User = run(&ParserConfig::default(), &fields).unwrap();
        assert_eq!(user.age, 0);
        assert_eq!(user.nickname, None);

        let strict = ParserConfig::default().zero_empty(false);
        let err = run::<User>(&strict, &fields).unwrap_err();
        assert!(matches!(err, Error::Decode { .. }));
    }

    #[test]
    fn type_mismatch_is_a_decode_error() {
        let fields = raw(&[("name", &["n"]), ("age", &["forty-two"])]);
        let err = run::<User>(&ParserConfig::default(), &fields).unwrap_err();
        assert!(err.to_string().starts_with("bind: "), "{err}");
    }

    #[test]
    fn unknown_keys_fail_unless_ignored() {
        let fields = raw(&[("name", &["n"]), ("age", &["1"]), ("extra", &["x"])]);
        assert!(run::<User>(&ParserConfig::default(), &fields).is_ok());

        let strict = ParserConfig::default().ignore_unknown_keys(false);
        let err = run::<User>(&strict, &fields).unwrap_err();
        assert!(err.to_string().contains("extra"), "{err}");
    }

    #[test]
    fn duplicate_spellings_merge() {
        let fields = raw(&[("Name", &["a"]), ("name", &["b"]), ("age", &["1"])]);
        let user: User = run(&ParserConfig::default(), &fields).unwrap();
        assert!(user.name == "a" || user.name == "b");
    }

    #[test]
    fn checkbox_and_go_bool_spellings() {
        #[derive(Deserialize)]
        struct Flags {
            a: bool,
            b: bool,
            c: bool,
        }
        let fields = raw(&[("a", &["on"]), ("b", &["T"]), ("c", &["0"])]);
        let flags: Flags = run(&ParserConfig::default(), &fields).unwrap();
        assert!(flags.a && flags.b && !flags.c);

        let fields = raw(&[("a", &["off"]), ("b", &["1"]), ("c", &["1"])]);
        assert!(matches!(run::<Flags>(&ParserConfig::default(), &fields), Err(Error::Decode { .. })));
    }

    #[test]
    fn unit_enums_decode_from_names() {
        #[derive(Debug, Deserialize, PartialEq)]
        #[serde(rename_all = "lowercase")]
        enum Order {
            Asc,
            Desc,
        }
        #[derive(Deserialize)]
        struct Sort {
            order: Order,
        }
        let sort: Sort = run(&ParserConfig::default(), &raw(&[("order", &["desc"])])).unwrap();
        assert_eq!(sort.order, Order::Desc);
    }

    #[test]
    fn converters_feed_newtypes() {
        #[derive(Debug, Deserialize, PartialEq)]
        struct Cents(u64);
        #[derive(Deserialize)]
        struct Price {
            amount: Cents,
        }
        let config = ParserConfig::default().converter("Cents", |raw| {
            let (whole, frac) = raw.split_once('.').unwrap_or((raw, "0"));
            let whole: u64 = whole.parse().map_err(|_| format!("bad amount {raw}"))?;
            let frac: u64 = frac.parse().map_err(|_| format!("bad amount {raw}"))?;
            Ok(Converted::U64(whole * 100 + frac))
        });
        let price: Price = run(&config, &raw(&[("amount", &["12.34"])])).unwrap();
        assert_eq!(price.amount, Cents(1234));
    }

    #[test]
    fn flattened_records_decode_through_the_tree() {
        #[derive(Debug, Deserialize, PartialEq)]
        struct Paging {
            page: u32,
            #[serde(default)]
            size: Option<f64>,
        }
        #[derive(Debug, Deserialize)]
        struct Search {
            q: String,
            #[serde(rename = "query:ids", default)]
            ids: Vec<u64>,
            #[serde(flatten)]
            paging: Paging,
        }
        let fields = raw(&[("q", &["007"]), ("ids", &["1", "2"]), ("page", &["2"]), ("size", &["1.5"])]);
        let search: Search = run(&ParserConfig::default(), &fields).unwrap();
        assert_eq!(search.q, "007");
        assert_eq!(search.ids, [1, 2]);
        assert_eq!(search.paging, Paging { page: 2, size: Some(1.5) });
    }

    #[test]
    fn tagged_field_names_follow_the_active_tag() {
        #[derive(Deserialize)]
        struct Page {
            #[serde(rename = "query:p", default)]
            page: u32,
        }
        let page: Page = run(&ParserConfig::default(), &raw(&[("P", &["3"])])).unwrap();
        assert_eq!(page.page, 3);
    }
}
