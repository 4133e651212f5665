//! Entity contract, schemas and values.

mod row;
mod value;

pub use row::Row;
pub use value::{FromValue, Value};

use crate::error::{CoreError, CoreResult};
use std::fmt;

/// Tag identifying an entity type.
///
/// Mappers are registered and resolved by this tag rather than by any
/// runtime type introspection.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EntityKind(&'static str);

impl EntityKind {
    /// Creates an entity kind.
    #[must_use]
    pub const fn new(name: &'static str) -> Self {
        Self(name)
    }

    /// Returns the kind's name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        self.0
    }
}

impl fmt::Debug for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EntityKind({})", self.0)
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

/// Static description of an entity type.
///
/// Declared once per type, usually as a `const`:
///
/// ```rust
/// use relmap_core::EntitySchema;
///
/// const SAMPLE: EntitySchema = EntitySchema::new(
///     "Sample",
///     &["id", "investigation", "name", "extra"],
///     "id",
///     &["investigation", "name"],
/// );
/// assert_eq!(SAMPLE.id_field(), "id");
/// ```
#[derive(Debug)]
pub struct EntitySchema {
    kind: EntityKind,
    fields: &'static [&'static str],
    id_field: &'static str,
    label_fields: &'static [&'static str],
}

impl EntitySchema {
    /// Creates a schema. `id_field` and every label field should appear in `fields`.
    #[must_use]
    pub const fn new(
        kind: &'static str,
        fields: &'static [&'static str],
        id_field: &'static str,
        label_fields: &'static [&'static str],
    ) -> Self {
        Self {
            kind: EntityKind::new(kind),
            fields,
            id_field,
            label_fields,
        }
    }

    /// The entity kind tag.
    #[must_use]
    pub const fn kind(&self) -> EntityKind {
        self.kind
    }

    /// Ordered field names.
    #[must_use]
    pub const fn fields(&self) -> &'static [&'static str] {
        self.fields
    }

    /// Name of the identity (surrogate primary key) field.
    #[must_use]
    pub const fn id_field(&self) -> &'static str {
        self.id_field
    }

    /// Names of the label (secondary key) fields.
    #[must_use]
    pub const fn label_fields(&self) -> &'static [&'static str] {
        self.label_fields
    }

    /// Checks whether a field belongs to this schema.
    #[must_use]
    pub fn has_field(&self, field: &str) -> bool {
        self.fields.contains(&field)
    }

    /// Fails with `InvalidField` unless the field belongs to this schema.
    pub fn check_field(&self, field: &str) -> CoreResult<()> {
        if self.has_field(field) {
            Ok(())
        } else {
            Err(CoreError::InvalidField {
                kind: self.kind,
                field: field.to_string(),
            })
        }
    }
}

/// A typed, field-addressable record mapped to one backend row.
///
/// Every instance of a type shares the same field set, described by
/// [`Entity::schema`]. The identity field, once assigned, must not change.
///
/// # Example
///
/// ```rust
/// use relmap_core::{CoreResult, Entity, EntitySchema, Value};
///
/// #[derive(Debug, Clone, Default, PartialEq)]
/// struct Person {
///     id: Option<i64>,
///     name: Option<String>,
/// }
///
/// const PERSON: EntitySchema = EntitySchema::new("Person", &["id", "name"], "id", &["name"]);
///
/// impl Entity for Person {
///     fn schema() -> &'static EntitySchema {
///         &PERSON
///     }
///
///     fn get(&self, field: &str) -> Value {
///         match field {
///             "id" => self.id.into(),
///             "name" => self.name.clone().into(),
///             _ => Value::Null,
///         }
///     }
///
///     fn set(&mut self, field: &str, value: Value) -> CoreResult<()> {
///         match field {
///             "id" => self.id = value.into_typed()?,
///             "name" => self.name = value.into_typed()?,
///             _ => return Err(Self::unknown_field(field)),
///         }
///         Ok(())
///     }
/// }
///
/// let mut p = Person::default();
/// p.set("name", "ada".into()).unwrap();
/// assert_eq!(p.to_row().get("name"), &Value::from("ada"));
/// ```
pub trait Entity: Clone + Default + fmt::Debug + Send + Sync + 'static {
    /// Returns the schema shared by all instances of this type.
    fn schema() -> &'static EntitySchema;

    /// Reads a field. Unknown fields read as `Null`.
    fn get(&self, field: &str) -> Value;

    /// Writes a field.
    fn set(&mut self, field: &str, value: Value) -> CoreResult<()>;

    /// The kind tag of this type.
    fn kind() -> EntityKind {
        Self::schema().kind()
    }

    /// The kind tag carried by this instance.
    fn entity_kind(&self) -> EntityKind {
        Self::kind()
    }

    /// Ordered field names.
    fn fields(&self) -> &'static [&'static str] {
        Self::schema().fields()
    }

    /// Name of the identity field.
    fn id_field(&self) -> &'static str {
        Self::schema().id_field()
    }

    /// Names of the label fields.
    fn label_fields(&self) -> &'static [&'static str] {
        Self::schema().label_fields()
    }

    /// Value of the identity field.
    fn id(&self) -> Value {
        self.get(self.id_field())
    }

    /// Copies every schema field into a row.
    fn to_row(&self) -> Row {
        Self::schema()
            .fields()
            .iter()
            .map(|f| ((*f).to_string(), self.get(f)))
            .collect()
    }

    /// Builds an entity from a row. Fields absent from the row keep their default.
    fn from_row(row: &Row) -> CoreResult<Self> {
        let mut entity = Self::default();
        for field in Self::schema().fields() {
            if row.contains(field) {
                entity.set(field, row.get(field).clone())?;
            }
        }
        Ok(entity)
    }

    /// Error for a field outside the schema, for use in `set` implementations.
    fn unknown_field(field: &str) -> CoreError {
        CoreError::InvalidField {
            kind: Self::kind(),
            field: field.to_string(),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    #[derive(Debug, Clone, Default, PartialEq)]
    pub(crate) struct Sample {
        pub id: Option<i64>,
        pub investigation: Option<String>,
        pub name: Option<String>,
        pub extra: Option<i64>,
    }

    pub(crate) const SAMPLE: EntitySchema = EntitySchema::new(
        "Sample",
        &["id", "investigation", "name", "extra"],
        "id",
        &["investigation", "name"],
    );

    impl Sample {
        pub(crate) fn new(investigation: &str, name: &str) -> Self {
            Self {
                investigation: Some(investigation.into()),
                name: Some(name.into()),
                ..Self::default()
            }
        }
    }

    impl Entity for Sample {
        fn schema() -> &'static EntitySchema {
            &SAMPLE
        }

        fn get(&self, field: &str) -> Value {
            match field {
                "id" => self.id.into(),
                "investigation" => self.investigation.clone().into(),
                "name" => self.name.clone().into(),
                "extra" => self.extra.into(),
                _ => Value::Null,
            }
        }

        fn set(&mut self, field: &str, value: Value) -> CoreResult<()> {
            match field {
                "id" => self.id = value.into_typed()?,
                "investigation" => self.investigation = value.into_typed()?,
                "name" => self.name = value.into_typed()?,
                "extra" => self.extra = value.into_typed()?,
                _ => return Err(Self::unknown_field(field)),
            }
            Ok(())
        }
    }

    #[test]
    fn schema_accessors() {
        assert_eq!(Sample::kind(), EntityKind::new("Sample"));
        assert_eq!(SAMPLE.id_field(), "id");
        assert!(SAMPLE.has_field("extra"));
        assert!(SAMPLE.check_field("bogus").is_err());
    }

    #[test]
    fn row_conversion_preserves_fields() {
        let mut s = Sample::new("A", "x");
        s.id = Some(7);
        let row = s.to_row();
        assert_eq!(row.len(), 4);
        assert!(row.get("extra").is_null());
        assert_eq!(Sample::from_row(&row).unwrap(), s);
    }

    #[test]
    fn set_unknown_field_fails() {
        let mut s = Sample::default();
        let err = s.set("bogus", Value::Int(1)).unwrap_err();
        assert!(matches!(err, CoreError::InvalidField { .. }));
    }
}
