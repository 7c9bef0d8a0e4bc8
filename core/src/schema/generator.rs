use core::any::TypeId;
use std::collections::HashMap;

use serde_json::{Map, Value, json};

use super::{Describe, Field, ObjectShape, Shape};

const DEFINITIONS: &str = "$defs";

/// Renders [`Shape`]s into JSON Schema.
///
/// Composite types are written once into a shared definitions table and referenced with
/// `$ref` everywhere they appear. A type gets an empty placeholder entry *before* its fields
/// are rendered, so a type that refers back to itself resolves to a reference instead of
/// recursing forever. Definitions keep first-encounter order.
#[derive(Debug, Default)]
pub struct SchemaGenerator {
    definitions: Map<String, Value>,
    keys: HashMap<TypeId, String>,
}

impl SchemaGenerator {
    /// Creates a generator with an empty definitions table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Renders a shape, registering any composite types it reaches.
    pub fn subschema(&mut self, shape: &Shape) -> Value {
        match shape {
            Shape::String => json!({ "type": "string" }),
            Shape::Number => json!({ "type": "number" }),
            Shape::Integer => json!({ "type": "integer" }),
            Shape::Boolean => json!({ "type": "boolean" }),
            Shape::Enum(members) => json!({ "type": "string", "enum": members.variants() }),
            Shape::Array(item) => json!({ "type": "array", "items": self.subschema(&item()) }),
            Shape::Optional(inner) => self.subschema(&inner()),
            Shape::Object(object) => self.reference(object),
        }
    }

    /// Renders the schema of `T`.
    pub fn subschema_for<T: Describe>(&mut self) -> Value {
        self.subschema(&T::describe())
    }

    /// Renders the body of an object: its properties and required list.
    pub fn object(&mut self, object: &ObjectShape) -> Value {
        let mut properties = Map::new();
        let mut required = Vec::new();

        for field in object.fields() {
            let shape = field.shape();
            if object.requires_all() || !shape.is_optional() {
                required.push(field.name().to_owned());
            }
            properties.insert(field.name().to_owned(), self.property(field, &shape));
        }

        json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }

    /// Returns the definitions collected so far.
    #[must_use]
    pub const fn definitions(&self) -> &Map<String, Value> {
        &self.definitions
    }

    /// Attaches the collected definitions to a root schema.
    ///
    /// The `$defs` key is left out entirely when nothing was registered.
    #[must_use]
    pub fn finish(self, mut root: Value) -> Value {
        if !self.definitions.is_empty() {
            if let Value::Object(map) = &mut root {
                map.insert(DEFINITIONS.to_owned(), Value::Object(self.definitions));
            }
        }
        root
    }

    fn property(&mut self, field: &Field, shape: &Shape) -> Value {
        let mut schema = self.subschema(shape);
        if let (Some(description), Value::Object(map)) = (field.description(), &mut schema) {
            map.insert("description".to_owned(), Value::from(description));
        }
        schema
    }

    fn reference(&mut self, object: &ObjectShape) -> Value {
        if let Some(key) = self.keys.get(&object.id()) {
            return pointer(key);
        }

        let key = self.reserve(object);
        let body = self.object(object);
        self.definitions.insert(key.clone(), body);
        pointer(&key)
    }

    // Claims a definitions key for the type and inserts a placeholder under it.
    fn reserve(&mut self, object: &ObjectShape) -> String {
        let mut key = object.name().to_owned();
        let mut suffix = 1;
        while self.definitions.contains_key(&key) {
            suffix += 1;
            key = format!("{}{suffix}", object.name());
        }

        self.keys.insert(object.id(), key.clone());
        self.definitions.insert(key.clone(), Value::Object(Map::new()));
        key
    }

    // The root object is rendered inline; references back to it point at the document root.
    fn claim_root(&mut self, object: &ObjectShape) {
        self.keys.insert(object.id(), ROOT.to_owned());
    }
}

const ROOT: &str = "";

fn pointer(key: &str) -> Value {
    if key == ROOT {
        json!({ "$ref": "#" })
    } else {
        json!({ "$ref": format!("#/{DEFINITIONS}/{key}") })
    }
}

/// Generates the JSON Schema of a type.
///
/// Composite types are rendered inline at the root, with nested composites in `$defs`.
/// Other shapes render as their plain schema.
#[must_use]
pub fn schema_for<T: Describe>() -> Value {
    let mut generator = SchemaGenerator::new();
    let root = match T::describe() {
        Shape::Object(object) => {
            generator.claim_root(&object);
            generator.object(&object)
        }
        shape => generator.subschema(&shape),
    };
    generator.finish(root)
}

/// Generates the argument schema of a function from its parameter list.
///
/// Every parameter is required and no other properties are accepted.
#[must_use]
pub fn schema_for_signature(parameters: &[Field]) -> Value {
    let mut generator = SchemaGenerator::new();
    let object = ObjectShape::new::<SignatureRoot>("Arguments", parameters.to_vec()).require_all();
    let root = signature(&mut generator, &object);
    generator.finish(root)
}

/// Generates the argument schema of a function taking `T`.
///
/// An object type is treated as the parameter list: its fields become the top-level
/// properties, with `additionalProperties: false`. Fields that are optional stay optional
/// unless the shape asks for every field to be required.
#[must_use]
pub fn schema_for_arguments<T: Describe>() -> Value {
    match T::describe() {
        Shape::Object(object) => {
            let mut generator = SchemaGenerator::new();
            generator.claim_root(&object);
            let root = signature(&mut generator, &object);
            generator.finish(root)
        }
        _ => schema_for::<T>(),
    }
}

struct SignatureRoot;

fn signature(generator: &mut SchemaGenerator, object: &ObjectShape) -> Value {
    let mut root = generator.object(object);
    if let Value::Object(map) = &mut root {
        map.insert("additionalProperties".to_owned(), Value::Bool(false));
    }
    root
}
