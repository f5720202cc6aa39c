//! Entity trait: domain objects compared by content.

use core::hash::{Hash, Hasher};
use std::collections::hash_map::DefaultHasher;

use crate::error::SerializationError;
use crate::event::short_type_name;
use crate::value::{DefaultValueSerializer, FieldMap, ValueSerializer, map_to_json};

/// Entity marker + minimal interface.
///
/// Equality and hashing are **structural**: derive `PartialEq`, `Eq` and `Hash`
/// over the entity's fields, so two entities holding the same values are equal
/// and hash identically. Aggregates keep their pending events in an
/// [`EventBuffer`](crate::EventBuffer), which takes no part in either.
///
/// The key an entity is looked up by belongs to the repository that stores it,
/// not to the entity: not every entity has one.
pub trait Entity: Clone + Eq + Hash + core::fmt::Debug + Send + Sync + 'static {
    /// External representation: field name → value, in a stable order.
    fn fields(&self) -> FieldMap;

    /// Serializer used by [`Entity::to_json`].
    ///
    /// Override when the entity carries [`FieldValue::Custom`](crate::FieldValue::Custom)
    /// values the default serializer cannot render.
    fn value_serializer(&self) -> &dyn ValueSerializer {
        &DefaultValueSerializer
    }

    /// Render [`Entity::fields`] as a JSON object string.
    fn to_json(&self) -> Result<String, SerializationError> {
        let value = map_to_json(&self.fields(), self.value_serializer())?;
        Ok(value.to_string())
    }

    /// Deterministic hash of the entity's structural content.
    fn content_hash(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.hash(&mut hasher);
        hasher.finish()
    }

    /// Short type name used in error messages, e.g. `Telemetry`.
    fn type_name() -> &'static str
    where
        Self: Sized,
    {
        short_type_name(std::any::type_name::<Self>())
    }
}
