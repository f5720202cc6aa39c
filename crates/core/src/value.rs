//! Field values: the external representation of an entity's content.
//!
//! An entity describes itself as an ordered [`FieldMap`]. Rendering that map
//! to JSON goes through a [`ValueSerializer`], which knows the built-in value
//! types (date/time, decimal, UUID, ...) and can be extended per entity type
//! for domain values the defaults don't cover ([`FieldValue::Custom`]).

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde_json::{Map as JsonMap, Number as JsonNumber, Value as JsonValue};
use uuid::Uuid;

use crate::error::SerializationError;
use crate::event::short_type_name;

/// A single field value.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    DateTime(DateTime<Utc>),
    Date(NaiveDate),
    Decimal(Decimal),
    Uuid(Uuid),
    List(Vec<FieldValue>),
    Map(FieldMap),
    /// A domain value only a custom [`ValueSerializer`] knows how to render.
    Custom(CustomValue),
}

impl FieldValue {
    pub fn custom<T: Any + Send + Sync>(value: T) -> Self {
        Self::Custom(CustomValue::new(value))
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }
}

/// Opaque domain value carried through a [`FieldMap`].
///
/// Equality is identity: two custom values are equal only if they share the
/// same allocation.
#[derive(Clone)]
pub struct CustomValue {
    type_name: &'static str,
    value: Arc<dyn Any + Send + Sync>,
}

impl CustomValue {
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self {
            type_name: short_type_name(std::any::type_name::<T>()),
            value: Arc::new(value),
        }
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.value.downcast_ref::<T>()
    }
}

impl fmt::Debug for CustomValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CustomValue<{}>", self.type_name)
    }
}

impl PartialEq for CustomValue {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.value, &other.value)
    }
}

/// Ordered field name → value map (insertion order is preserved).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldMap {
    entries: Vec<(String, FieldValue)>,
}

impl FieldMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.insert(name, value);
        self
    }

    /// Insert a field, replacing (in place) any previous value with the same name.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<FieldValue>) {
        let name = name.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some((_, slot)) => *slot = value,
            None => self.entries.push((name, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v))
    }
}

macro_rules! impl_from_for_field_value {
    ($($t:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$t> for FieldValue {
                fn from(value: $t) -> Self {
                    FieldValue::$variant(value.into())
                }
            }
        )*
    };
}

impl_from_for_field_value!(
    bool => Bool,
    i32 => Int,
    i64 => Int,
    u32 => Int,
    f64 => Float,
    String => Text,
    &str => Text,
    DateTime<Utc> => DateTime,
    NaiveDate => Date,
    Decimal => Decimal,
    Uuid => Uuid,
    FieldMap => Map,
);

impl<T: Into<FieldValue>> From<Vec<T>> for FieldValue {
    fn from(values: Vec<T>) -> Self {
        FieldValue::List(values.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<FieldValue>> From<Option<T>> for FieldValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(FieldValue::Null)
    }
}

/// Renders field values to JSON.
///
/// Built-in values are rendered by [`to_json_value`]; a serializer only decides
/// what to do with [`FieldValue::Custom`], by lowering it to a value the
/// built-in rules understand. The default rejects every custom value.
pub trait ValueSerializer: Send + Sync {
    fn lower_custom(&self, value: &CustomValue) -> Result<FieldValue, SerializationError> {
        Err(SerializationError::UnsupportedValue {
            type_name: value.type_name(),
        })
    }
}

/// Serializer for date/time, decimal and UUID values (and nothing custom).
#[derive(Debug, Default, Copy, Clone)]
pub struct DefaultValueSerializer;

impl ValueSerializer for DefaultValueSerializer {}

/// Render a single value.
///
/// - date/time: RFC 3339 string
/// - date: `YYYY-MM-DD`
/// - decimal: exact string form (no float rounding)
/// - UUID: hyphenated string
pub fn to_json_value(
    value: &FieldValue,
    serializer: &dyn ValueSerializer,
) -> Result<JsonValue, SerializationError> {
    Ok(match value {
        FieldValue::Null => JsonValue::Null,
        FieldValue::Bool(b) => JsonValue::Bool(*b),
        FieldValue::Int(i) => JsonValue::Number((*i).into()),
        FieldValue::Float(f) => JsonNumber::from_f64(*f)
            .map(JsonValue::Number)
            .ok_or(SerializationError::NonFiniteFloat(*f))?,
        FieldValue::Text(s) => JsonValue::String(s.clone()),
        FieldValue::DateTime(dt) => JsonValue::String(dt.to_rfc3339()),
        FieldValue::Date(d) => JsonValue::String(d.format("%Y-%m-%d").to_string()),
        FieldValue::Decimal(d) => JsonValue::String(d.to_string()),
        FieldValue::Uuid(u) => JsonValue::String(u.to_string()),
        FieldValue::List(items) => JsonValue::Array(
            items
                .iter()
                .map(|item| to_json_value(item, serializer))
                .collect::<Result<_, _>>()?,
        ),
        FieldValue::Map(map) => map_to_json(map, serializer)?,
        FieldValue::Custom(custom) => {
            let lowered = serializer.lower_custom(custom)?;
            // A serializer handing back another custom value would loop forever.
            if matches!(lowered, FieldValue::Custom(_)) {
                return Err(SerializationError::UnsupportedValue {
                    type_name: custom.type_name(),
                });
            }
            to_json_value(&lowered, serializer)?
        }
    })
}

/// Render a field map as a JSON object, keeping field order.
pub fn map_to_json(
    fields: &FieldMap,
    serializer: &dyn ValueSerializer,
) -> Result<JsonValue, SerializationError> {
    let mut object = JsonMap::new();
    for (name, value) in fields.iter() {
        object.insert(name.to_string(), to_json_value(value, serializer)?);
    }
    Ok(JsonValue::Object(object))
}
