//! Builder for the object schemas that describe action configuration and
//! run-time parameters.

use serde::Serialize;
use serde_json::{json, Map, Value};

use crate::CoreSchemaType;

/// One named property of an object schema.
#[derive(Debug, Clone, Serialize)]
pub struct FieldSpec {
    pub name: String,
    pub ty: CoreSchemaType,
    pub required: bool,
    pub description: Option<String>,
    pub default: Option<Value>,
    /// Closed set of accepted values, if any.
    pub allowed: Option<Vec<Value>>,
    pub minimum: Option<f64>,
    pub maximum: Option<f64>,
    /// Narrows a `Number` field to whole numbers.
    pub integer: bool,
}

impl FieldSpec {
    fn to_property(&self) -> Value {
        let mut prop = self.ty.json_schema();
        if let Some(obj) = prop.as_object_mut() {
            if let Some(description) = &self.description {
                obj.insert("description".into(), json!(description));
            }
            if let Some(default) = &self.default {
                obj.insert("default".into(), default.clone());
            }
            if let Some(allowed) = &self.allowed {
                obj.insert("enum".into(), Value::Array(allowed.clone()));
            }
            if self.integer {
                obj.insert("type".into(), json!("integer"));
            }
            if let Some(minimum) = self.minimum {
                obj.insert("minimum".into(), json!(minimum));
            }
            if let Some(maximum) = self.maximum {
                obj.insert("maximum".into(), json!(maximum));
            }
        }
        prop
    }
}

/// Declarative object schema. Modifier methods (`with_default`, `one_of`,
/// `minimum`, `maximum`, `integer`) apply to the most recently added field.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ObjectSchema {
    fields: Vec<FieldSpec>,
}

impl ObjectSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn required(self, name: &str, ty: CoreSchemaType, description: &str) -> Self {
        self.push(name, ty, true, description)
    }

    pub fn optional(self, name: &str, ty: CoreSchemaType, description: &str) -> Self {
        self.push(name, ty, false, description)
    }

    pub fn with_default(mut self, default: Value) -> Self {
        if let Some(field) = self.fields.last_mut() {
            field.default = Some(default);
        }
        self
    }

    pub fn one_of<I, V>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        if let Some(field) = self.fields.last_mut() {
            field.allowed = Some(values.into_iter().map(Into::into).collect());
        }
        self
    }

    pub fn minimum(mut self, minimum: f64) -> Self {
        if let Some(field) = self.fields.last_mut() {
            field.minimum = Some(minimum);
        }
        self
    }

    pub fn maximum(mut self, maximum: f64) -> Self {
        if let Some(field) = self.fields.last_mut() {
            field.maximum = Some(maximum);
        }
        self
    }

    pub fn integer(mut self) -> Self {
        if let Some(field) = self.fields.last_mut() {
            field.integer = true;
        }
        self
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    /// Render the JSON Schema document. Unknown properties are rejected.
    pub fn build(&self) -> Value {
        let mut properties = Map::new();
        let mut required = Vec::new();
        for field in &self.fields {
            properties.insert(field.name.clone(), field.to_property());
            if field.required {
                required.push(json!(field.name));
            }
        }
        json!({
            "type": "object",
            "properties": properties,
            "required": required,
            "additionalProperties": false
        })
    }

    fn push(mut self, name: &str, ty: CoreSchemaType, required: bool, description: &str) -> Self {
        self.fields.push(FieldSpec {
            name: name.to_owned(),
            ty,
            required,
            description: (!description.is_empty()).then(|| description.to_owned()),
            default: None,
            allowed: None,
            minimum: None,
            maximum: None,
            integer: false,
        });
        self
    }
}
