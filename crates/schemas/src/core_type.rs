//! Logical value types and their JSON Schemas.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::SchemaError;

/// A logical value type a pub field or action setting can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CoreSchemaType {
    Boolean,
    DateTime,
    Email,
    FileUpload,
    MemberId,
    Null,
    Number,
    NumericArray,
    String,
    StringArray,
    #[serde(rename = "URL")]
    Url,
    Vector3,
}

impl CoreSchemaType {
    /// Every core type, in declaration order.
    pub const ALL: [CoreSchemaType; 12] = [
        Self::Boolean,
        Self::DateTime,
        Self::Email,
        Self::FileUpload,
        Self::MemberId,
        Self::Null,
        Self::Number,
        Self::NumericArray,
        Self::String,
        Self::StringArray,
        Self::Url,
        Self::Vector3,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Boolean => "Boolean",
            Self::DateTime => "DateTime",
            Self::Email => "Email",
            Self::FileUpload => "FileUpload",
            Self::MemberId => "MemberId",
            Self::Null => "Null",
            Self::Number => "Number",
            Self::NumericArray => "NumericArray",
            Self::String => "String",
            Self::StringArray => "StringArray",
            Self::Url => "URL",
            Self::Vector3 => "Vector3",
        }
    }

    /// The JSON Schema a value of this type must satisfy.
    pub fn json_schema(&self) -> Value {
        match self {
            Self::Boolean => json!({ "type": "boolean" }),
            Self::DateTime => json!({ "type": "string", "format": "date-time" }),
            Self::Email => json!({
                "type": "string",
                "format": "email",
                "pattern": "^[^@\\s]+@[^@\\s]+$"
            }),
            Self::FileUpload => json!({
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "fileName": { "type": "string" },
                        "fileSource": { "type": "string" },
                        "fileType": { "type": "string" },
                        "fileSize": { "type": "number", "minimum": 0 },
                        "fileUploadUrl": { "type": "string", "format": "uri" }
                    },
                    "required": ["fileName", "fileUploadUrl"]
                }
            }),
            Self::MemberId => json!({ "type": "string", "format": "uuid" }),
            Self::Null => json!({ "type": "null" }),
            Self::Number => json!({ "type": "number" }),
            Self::NumericArray => json!({ "type": "array", "items": { "type": "number" } }),
            Self::String => json!({ "type": "string" }),
            Self::StringArray => json!({ "type": "array", "items": { "type": "string" } }),
            Self::Url => json!({ "type": "string", "format": "uri" }),
            Self::Vector3 => json!({
                "type": "array",
                "items": { "type": "number" },
                "minItems": 3,
                "maxItems": 3
            }),
        }
    }
}

impl std::fmt::Display for CoreSchemaType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for CoreSchemaType {
    type Err = SchemaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| SchemaError::UnknownCoreType(s.to_owned()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validate;

    #[test]
    fn names_round_trip_through_from_str() {
        for ty in CoreSchemaType::ALL {
            assert_eq!(ty.as_str().parse::<CoreSchemaType>().unwrap(), ty);
        }
        assert!("Uuid".parse::<CoreSchemaType>().is_err());
    }

    #[test]
    fn url_uses_uppercase_wire_name() {
        let v = serde_json::to_value(CoreSchemaType::Url).unwrap();
        assert_eq!(v, json!("URL"));
    }

    #[test]
    fn vector3_requires_exactly_three_numbers() {
        let schema = CoreSchemaType::Vector3.json_schema();
        assert!(validate(&schema, &json!([1, 2, 3])).unwrap().is_valid());
        assert!(!validate(&schema, &json!([1, 2])).unwrap().is_valid());
        assert!(!validate(&schema, &json!([1, 2, "3"])).unwrap().is_valid());
    }

    #[test]
    fn email_rejects_strings_without_at_sign() {
        let schema = CoreSchemaType::Email.json_schema();
        assert!(validate(&schema, &json!("editor@example.org")).unwrap().is_valid());
        assert!(!validate(&schema, &json!("not an email")).unwrap().is_valid());
    }

    #[test]
    fn file_upload_requires_name_and_url() {
        let schema = CoreSchemaType::FileUpload.json_schema();
        let ok = json!([{ "fileName": "paper.pdf", "fileUploadUrl": "https://cdn.example.org/paper.pdf" }]);
        let missing = json!([{ "fileName": "paper.pdf" }]);
        assert!(validate(&schema, &ok).unwrap().is_valid());
        assert!(!validate(&schema, &missing).unwrap().is_valid());
    }
}
