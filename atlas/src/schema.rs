//! JSON Schema builders for structured output and tool parameters.
//!
//! # Example
//!
//! ```rust,ignore
//! use atlas::schema::{Property, Schema};
//!
//! let spec = Schema::object("person", "A person record")
//!     .string("name", "Full name")
//!     .integer("age", "Age in years")
//!     .string("nickname", "Preferred name").optional()
//!     .enumeration("role", "Role", ["admin", "member"])
//!     .array("tags", "Free-form tags", Property::string("tag", "A tag"))
//!     .build();
//! ```

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

/// A named JSON Schema document, ready to attach to a request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaSpec {
    /// Schema name, sent to providers that require one.
    pub name: String,
    /// Human-readable description.
    #[serde(default)]
    pub description: String,
    /// The JSON Schema itself.
    pub schema: Value,
}

impl SchemaSpec {
    /// Wrap a raw JSON Schema value.
    #[must_use]
    pub fn new(name: impl Into<String>, description: impl Into<String>, schema: Value) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            schema,
        }
    }
}

/// The type of a [`Property`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PropertyKind {
    /// A string.
    String,
    /// An integer.
    Integer,
    /// A floating point number.
    Number,
    /// A boolean.
    Boolean,
    /// A string restricted to the listed values.
    Enum {
        /// Allowed values.
        values: Vec<String>,
    },
    /// An array whose elements match `items`.
    Array {
        /// Element schema.
        items: Box<Property>,
    },
    /// A nested object.
    Object {
        /// Nested properties.
        properties: Vec<Property>,
    },
}

/// A single named field in an object schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Property {
    /// Field name.
    pub name: String,
    /// Field description.
    pub description: String,
    /// Field type.
    pub kind: PropertyKind,
    /// Whether the field must be present.
    pub required: bool,
    /// Whether `null` is an allowed value.
    pub nullable: bool,
}

impl Property {
    fn new(name: impl Into<String>, description: impl Into<String>, kind: PropertyKind) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            kind,
            required: true,
            nullable: false,
        }
    }

    /// A string field.
    #[must_use]
    pub fn string(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self::new(name, description, PropertyKind::String)
    }

    /// An integer field.
    #[must_use]
    pub fn integer(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self::new(name, description, PropertyKind::Integer)
    }

    /// A number field.
    #[must_use]
    pub fn number(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self::new(name, description, PropertyKind::Number)
    }

    /// A boolean field.
    #[must_use]
    pub fn boolean(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self::new(name, description, PropertyKind::Boolean)
    }

    /// A string field limited to `values`.
    #[must_use]
    pub fn enumeration<I, S>(name: impl Into<String>, description: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let values = values.into_iter().map(Into::into).collect();
        Self::new(name, description, PropertyKind::Enum { values })
    }

    /// An array field with elements shaped like `items`.
    #[must_use]
    pub fn array(name: impl Into<String>, description: impl Into<String>, items: Self) -> Self {
        Self::new(
            name,
            description,
            PropertyKind::Array {
                items: Box::new(items),
            },
        )
    }

    /// A nested object field.
    #[must_use]
    pub fn object(
        name: impl Into<String>,
        description: impl Into<String>,
        properties: Vec<Self>,
    ) -> Self {
        Self::new(name, description, PropertyKind::Object { properties })
    }

    /// Mark the field as optional.
    #[must_use]
    pub const fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    /// Allow `null` as a value.
    #[must_use]
    pub const fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    /// Render the field as a JSON Schema fragment.
    #[must_use]
    pub fn to_json(&self) -> Value {
        let mut out = match &self.kind {
            PropertyKind::String => json!({ "type": "string" }),
            PropertyKind::Integer => json!({ "type": "integer" }),
            PropertyKind::Number => json!({ "type": "number" }),
            PropertyKind::Boolean => json!({ "type": "boolean" }),
            PropertyKind::Enum { values } => json!({ "type": "string", "enum": values }),
            PropertyKind::Array { items } => json!({ "type": "array", "items": items.to_json() }),
            PropertyKind::Object { properties } => object_schema(properties),
        };
        if let Value::Object(map) = &mut out {
            if !self.description.is_empty() {
                map.insert("description".into(), Value::String(self.description.clone()));
            }
            if self.nullable {
                if let Some(ty) = map.get("type").cloned() {
                    map.insert("type".into(), json!([ty, "null"]));
                }
            }
        }
        out
    }
}

/// Render `properties` as a closed JSON Schema object.
#[must_use]
pub fn object_schema(properties: &[Property]) -> Value {
    let mut props = Map::new();
    let mut required = Vec::new();
    for property in properties {
        props.insert(property.name.clone(), property.to_json());
        if property.required {
            required.push(Value::String(property.name.clone()));
        }
    }
    json!({
        "type": "object",
        "properties": props,
        "required": required,
        "additionalProperties": false,
    })
}

/// Fluent builder for an object [`SchemaSpec`].
///
/// Modifiers such as [`optional`](Self::optional) apply to the most
/// recently added field.
#[derive(Debug, Clone, PartialEq)]
pub struct Schema {
    name: String,
    description: String,
    properties: Vec<Property>,
}

impl Schema {
    /// Start an object schema.
    #[must_use]
    pub fn object(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            properties: Vec::new(),
        }
    }

    /// Add a prepared property.
    #[must_use]
    pub fn property(mut self, property: Property) -> Self {
        self.properties.push(property);
        self
    }

    /// Add a string field.
    #[must_use]
    pub fn string(self, name: impl Into<String>, description: impl Into<String>) -> Self {
        self.property(Property::string(name, description))
    }

    /// Add an integer field.
    #[must_use]
    pub fn integer(self, name: impl Into<String>, description: impl Into<String>) -> Self {
        self.property(Property::integer(name, description))
    }

    /// Add a number field.
    #[must_use]
    pub fn number(self, name: impl Into<String>, description: impl Into<String>) -> Self {
        self.property(Property::number(name, description))
    }

    /// Add a boolean field.
    #[must_use]
    pub fn boolean(self, name: impl Into<String>, description: impl Into<String>) -> Self {
        self.property(Property::boolean(name, description))
    }

    /// Add an enum field.
    #[must_use]
    pub fn enumeration<I, S>(
        self,
        name: impl Into<String>,
        description: impl Into<String>,
        values: I,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.property(Property::enumeration(name, description, values))
    }

    /// Add an array field.
    #[must_use]
    pub fn array(
        self,
        name: impl Into<String>,
        description: impl Into<String>,
        items: Property,
    ) -> Self {
        self.property(Property::array(name, description, items))
    }

    /// Add a nested object field built from another schema.
    #[must_use]
    pub fn nested(self, name: impl Into<String>, nested: Self) -> Self {
        let property = Property::object(name, nested.description, nested.properties);
        self.property(property)
    }

    /// Mark the last field optional.
    #[must_use]
    pub fn optional(mut self) -> Self {
        if let Some(last) = self.properties.pop() {
            self.properties.push(last.optional());
        }
        self
    }

    /// Make the last field nullable.
    #[must_use]
    pub fn nullable(mut self) -> Self {
        if let Some(last) = self.properties.pop() {
            self.properties.push(last.nullable());
        }
        self
    }

    /// The fields added so far.
    #[must_use]
    pub fn properties(&self) -> &[Property] {
        &self.properties
    }

    /// Finish the schema.
    #[must_use]
    pub fn build(self) -> SchemaSpec {
        let mut schema = object_schema(&self.properties);
        if let (Value::Object(map), false) = (&mut schema, self.description.is_empty()) {
            map.insert("description".into(), Value::String(self.description.clone()));
        }
        SchemaSpec {
            name: self.name,
            description: self.description,
            schema,
        }
    }

    /// Derive a schema from a type implementing [`schemars::JsonSchema`].
    #[cfg(feature = "schema")]
    #[must_use]
    pub fn from_type<T: schemars::JsonSchema>() -> SchemaSpec {
        let schema = schemars::schema_for!(T);
        SchemaSpec {
            name: T::schema_name().into_owned(),
            description: String::new(),
            schema: serde_json::to_value(schema).unwrap_or(Value::Null),
        }
    }
}

impl From<Schema> for SchemaSpec {
    fn from(schema: Schema) -> Self {
        schema.build()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn object_schema_lists_required_fields() {
        let spec = Schema::object("person", "A person")
            .string("name", "Full name")
            .integer("age", "Age")
            .string("nickname", "")
            .optional()
            .build();

        assert_eq!(spec.name, "person");
        assert_eq!(spec.schema["type"], "object");
        assert_eq!(spec.schema["description"], "A person");
        assert_eq!(spec.schema["required"], json!(["name", "age"]));
        assert_eq!(spec.schema["properties"]["age"]["type"], "integer");
        assert!(spec.schema["properties"]["nickname"].get("description").is_none());
        assert_eq!(spec.schema["additionalProperties"], false);
    }

    #[test]
    fn nullable_widens_type() {
        let spec = Schema::object("s", "").number("score", "").nullable().build();
        assert_eq!(spec.schema["properties"]["score"]["type"], json!(["number", "null"]));
    }

    #[test]
    fn enum_array_and_nested() {
        let spec = Schema::object("s", "")
            .enumeration("role", "Role", ["admin", "member"])
            .array("tags", "Tags", Property::string("tag", ""))
            .nested("address", Schema::object("address", "Postal").string("city", "City"))
            .build();

        let props = &spec.schema["properties"];
        assert_eq!(props["role"]["enum"], json!(["admin", "member"]));
        assert_eq!(props["tags"]["items"]["type"], "string");
        assert_eq!(props["address"]["properties"]["city"]["type"], "string");
        assert_eq!(props["address"]["description"], "Postal");
    }

    #[test]
    fn modifiers_on_empty_schema_are_no_ops() {
        let schema = Schema::object("s", "").optional().nullable();
        assert!(schema.properties().is_empty());
    }
}
