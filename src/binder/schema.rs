//! Field registry: the shape of a destination type, scanned once and cached.
//!
//! A destination only exposes its layout through its `Deserialize` impl, so
//! the scan drives that impl with a probing deserializer. Each probe run walks
//! down a path of field indexes, records what the type asks for at the end of
//! the path and then aborts. One run per field, one extra run per field of a
//! nested record; nothing deeper is scanned.
//!
//! A record with `#[serde(flatten)]` fields reads itself as a map. It is told
//! apart from a real map by how it reads keys (as field identifiers), and its
//! fields are resolved by offering it one key at a time.

use std::any::TypeId;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use serde::de::{self, DeserializeOwned, IntoDeserializer, MapAccess, Visitor};
use serde::forward_to_deserialize_any;
use tracing::trace;

/// What a destination asks its deserializer for.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum Shape {
    Scalar,
    Seq,
    Record(&'static [&'static str]),
    Map,
    /// A record read as a map, i.e. one with flattened fields.
    Open,
    Unknown,
}

#[derive(Debug)]
pub(crate) struct Field {
    pub(crate) name: &'static str,
    pub(crate) shape: Shape,
    pub(crate) nested: Vec<Field>,
}

/// Scanned layout of one destination type.
#[derive(Debug)]
pub(crate) struct Schema {
    pub(crate) shape: Shape,
    pub(crate) fields: Vec<Field>,
    /// Shape of the value an [`Shape::Open`] record reads under a key.
    entry_probe: Option<fn(&str) -> Shape>,
}

impl Schema {
    pub(crate) fn scan<T: DeserializeOwned>() -> Self {
        let shape = match probe::<T>(&[]) {
            Shape::Map if probe_entry::<T>("").0 => Shape::Open,
            shape => shape,
        };
        let fields = match shape {
            Shape::Record(names) => scan_fields::<T>(names, &[], 1),
            _ => Vec::new(),
        };
        let entry_probe = (shape == Shape::Open).then_some(entry_shape::<T> as fn(&str) -> Shape);
        Self { shape, fields, entry_probe }
    }

    /// Shape an open record reads under `key`; `None` for other shapes.
    pub(crate) fn entry(&self, key: &str) -> Option<Shape> {
        self.entry_probe.map(|shape_of| shape_of(key))
    }

    /// Whether values bound under `key` may be split into several.
    ///
    /// String-keyed maps always qualify. For records the key is matched
    /// against the top-level fields, then as a dotted path, then against the
    /// fields of nested records. Records with flattened fields only resolve
    /// their own fields, by exact or tag-qualified name; values reaching the
    /// flattened part are never split.
    pub(crate) fn is_sequence(&self, key: &str, tag: &str) -> bool {
        match self.shape {
            Shape::Map => true,
            Shape::Record(_) => self.resolve(key, tag).is_some_and(|f| f.shape == Shape::Seq),
            Shape::Open => {
                self.entry(key) == Some(Shape::Seq) || self.entry(&format!("{tag}:{key}")) == Some(Shape::Seq)
            }
            _ => false,
        }
    }

    fn resolve(&self, key: &str, tag: &str) -> Option<&Field> {
        if let Some(field) = find(&self.fields, key, tag) {
            return Some(field);
        }
        if let Some((head, rest)) = key.split_once('.') {
            if let Some(field) = find(&self.fields, head, tag) {
                return find(&field.nested, rest, tag);
            }
        }
        self.fields.iter().find_map(|f| find(&f.nested, key, tag))
    }
}

fn find<'f>(fields: &'f [Field], key: &str, tag: &str) -> Option<&'f Field> {
    fields.iter().find(|f| matches(f.name, key, tag))
}

/// Case-insensitive field name match, honouring `"<tag>:<name>"` names.
pub(crate) fn matches(field: &str, key: &str, tag: &str) -> bool {
    match field.split_once(':') {
        Some((field_tag, name)) => field_tag == tag && name.eq_ignore_ascii_case(key),
        None => field.eq_ignore_ascii_case(key),
    }
}

fn scan_fields<T: DeserializeOwned>(
    names: &'static [&'static str],
    prefix: &[usize],
    depth: usize,
) -> Vec<Field> {
    names
        .iter()
        .enumerate()
        .map(|(i, &name)| {
            let mut path = prefix.to_vec();
            path.push(i);
            let shape = probe::<T>(&path);
            let nested = match shape {
                Shape::Record(inner) if depth > 0 => scan_fields::<T>(inner, &path, depth - 1),
                _ => Vec::new(),
            };
            Field { name, shape, nested }
        })
        .collect()
}

fn probe<T: DeserializeOwned>(path: &[usize]) -> Shape {
    let mut seen = None;
    // The run always ends in an error: either `Stop` or the visitor's own.
    let _ = T::deserialize(Probe { path, seen: &mut seen });
    seen.unwrap_or(Shape::Unknown)
}

/// Opens a map-shaped `T` with the single key `key`. Returns whether the key
/// was read as a field identifier and the shape of the value under it.
fn probe_entry<T: DeserializeOwned>(key: &str) -> (bool, Shape) {
    let mut identifier = false;
    let mut seen = None;
    let _ = T::deserialize(EntryProbe { key, identifier: &mut identifier, seen: &mut seen });
    (identifier, seen.unwrap_or(Shape::Unknown))
}

fn entry_shape<T: DeserializeOwned>(key: &str) -> Shape {
    probe_entry::<T>(key).1
}

// ── Type-id cache ─────────────────────────────────────────────────────────────

/// Schemas keyed by destination type, each scanned on first use.
#[derive(Default)]
pub(crate) struct Registry {
    types: RwLock<HashMap<TypeId, Arc<Schema>>>,
}

impl Registry {
    pub(crate) fn schema<T: DeserializeOwned + 'static>(&self) -> Arc<Schema> {
        let id = TypeId::of::<T>();
        if let Some(schema) = self.types.read().unwrap_or_else(PoisonError::into_inner).get(&id) {
            return Arc::clone(schema);
        }

        let schema = Arc::new(Schema::scan::<T>());
        trace!(ty = std::any::type_name::<T>(), fields = schema.fields.len(), "scanned bind target");
        let mut types = self.types.write().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(types.entry(id).or_insert(schema))
    }
}

// ── Probe ─────────────────────────────────────────────────────────────────────

#[derive(Debug)]
struct Stop;

impl fmt::Display for Stop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("probe stopped")
    }
}

impl std::error::Error for Stop {}

impl de::Error for Stop {
    fn custom<T: fmt::Display>(_msg: T) -> Self {
        Stop
    }
}

struct Probe<'p> {
    path: &'p [usize],
    seen: &'p mut Option<Shape>,
}

impl Probe<'_> {
    fn record<V>(self, shape: Shape) -> Result<V, Stop> {
        if self.path.is_empty() {
            *self.seen = Some(shape);
        }
        Err(Stop)
    }
}

macro_rules! probe_as {
    ($shape:expr => $($method:ident)*) => {
        $(fn $method<V: Visitor<'de>>(self, _visitor: V) -> Result<V::Value, Stop> {
            self.record($shape)
        })*
    };
}

impl<'de> de::Deserializer<'de> for Probe<'_> {
    type Error = Stop;

    probe_as!(Shape::Scalar =>
        deserialize_bool deserialize_i8 deserialize_i16 deserialize_i32 deserialize_i64
        deserialize_i128 deserialize_u8 deserialize_u16 deserialize_u32 deserialize_u64
        deserialize_u128 deserialize_f32 deserialize_f64 deserialize_char deserialize_str
        deserialize_string deserialize_bytes deserialize_byte_buf deserialize_unit
        deserialize_identifier);
    probe_as!(Shape::Seq => deserialize_seq);
    probe_as!(Shape::Map => deserialize_map);
    probe_as!(Shape::Unknown => deserialize_any deserialize_ignored_any);

    fn deserialize_option<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Stop> {
        visitor.visit_some(self)
    }

    fn deserialize_unit_struct<V: Visitor<'de>>(self, _name: &'static str, _visitor: V) -> Result<V::Value, Stop> {
        self.record(Shape::Scalar)
    }

    fn deserialize_newtype_struct<V: Visitor<'de>>(self, _name: &'static str, visitor: V) -> Result<V::Value, Stop> {
        visitor.visit_newtype_struct(self)
    }

    fn deserialize_tuple<V: Visitor<'de>>(self, _len: usize, _visitor: V) -> Result<V::Value, Stop> {
        self.record(Shape::Seq)
    }

    fn deserialize_tuple_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        _len: usize,
        _visitor: V,
    ) -> Result<V::Value, Stop> {
        self.record(Shape::Seq)
    }

    fn deserialize_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        fields: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value, Stop> {
        let path = self.path;
        match path.split_first() {
            None => self.record(Shape::Record(fields)),
            Some((&index, rest)) => {
                let key = fields.get(index).copied().ok_or(Stop)?;
                visitor.visit_map(OneField { key: Some(key), value: Probe { path: rest, seen: self.seen } })
            }
        }
    }

    fn deserialize_enum<V: Visitor<'de>>(
        self,
        _name: &'static str,
        _variants: &'static [&'static str],
        _visitor: V,
    ) -> Result<V::Value, Stop> {
        self.record(Shape::Scalar)
    }
}

/// Presents a record with exactly one key whose value is the next probe.
struct OneField<'p> {
    key: Option<&'static str>,
    value: Probe<'p>,
}

impl<'de> MapAccess<'de> for OneField<'_> {
    type Error = Stop;

    fn next_key_seed<K: de::DeserializeSeed<'de>>(&mut self, seed: K) -> Result<Option<K::Value>, Stop> {
        match self.key.take() {
            Some(key) => {
                let key: de::value::StrDeserializer<'_, Stop> = key.into_deserializer();
                seed.deserialize(key).map(Some)
            }
            None => Ok(None),
        }
    }

    fn next_value_seed<V: de::DeserializeSeed<'de>>(&mut self, seed: V) -> Result<V::Value, Stop> {
        let value = Probe { path: self.value.path, seen: &mut *self.value.seen };
        seed.deserialize(value)
    }
}

// ── Entry probe ───────────────────────────────────────────────────────────────

/// Presents a map holding one key, whose value is a probe.
struct EntryProbe<'p> {
    key: &'p str,
    identifier: &'p mut bool,
    seen: &'p mut Option<Shape>,
}

impl<'de> de::Deserializer<'de> for EntryProbe<'_> {
    type Error = Stop;

    fn deserialize_any<V: Visitor<'de>>(self, _visitor: V) -> Result<V::Value, Stop> {
        Err(Stop)
    }

    fn deserialize_map<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Stop> {
        visitor.visit_map(OneEntry { key: Some(self.key), identifier: self.identifier, seen: self.seen })
    }

    forward_to_deserialize_any! {
        bool i8 i16 i32 i64 i128 u8 u16 u32 u64 u128 f32 f64 char str string
        bytes byte_buf option unit unit_struct newtype_struct seq tuple
        tuple_struct struct enum identifier ignored_any
    }
}

struct OneEntry<'p> {
    key: Option<&'p str>,
    identifier: &'p mut bool,
    seen: &'p mut Option<Shape>,
}

impl<'de> MapAccess<'de> for OneEntry<'_> {
    type Error = Stop;

    fn next_key_seed<K: de::DeserializeSeed<'de>>(&mut self, seed: K) -> Result<Option<K::Value>, Stop> {
        match self.key.take() {
            Some(key) => seed.deserialize(KeyProbe { key, identifier: &mut *self.identifier }).map(Some),
            None => Ok(None),
        }
    }

    fn next_value_seed<V: de::DeserializeSeed<'de>>(&mut self, seed: V) -> Result<V::Value, Stop> {
        seed.deserialize(Probe { path: &[], seen: &mut *self.seen })
    }
}

/// A key that notes whether it was asked for as a field identifier.
struct KeyProbe<'p> {
    key: &'p str,
    identifier: &'p mut bool,
}

impl<'de> de::Deserializer<'de> for KeyProbe<'_> {
    type Error = Stop;

    fn deserialize_any<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Stop> {
        visitor.visit_str(self.key)
    }

    fn deserialize_identifier<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Stop> {
        *self.identifier = true;
        visitor.visit_str(self.key)
    }

    forward_to_deserialize_any! {
        bool i8 i16 i32 i64 i128 u8 u16 u32 u64 u128 f32 f64 char str string
        bytes byte_buf option unit unit_struct newtype_struct seq tuple
        tuple_struct map struct enum ignored_any
    }
}
