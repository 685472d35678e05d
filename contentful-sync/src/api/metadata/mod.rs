//! Content type metadata and the registry used for schema-aware parsing

pub mod models;

pub use models::{ContentType, ContentTypeSys, FieldMetadata, FieldType, ItemsMetadata};

use anyhow::{Context, Result};
use serde_json::Value;
use std::collections::HashMap;

/// Content types keyed by id
#[derive(Debug, Clone, Default)]
pub struct ContentTypes {
    types: HashMap<String, ContentType>,
}

impl ContentTypes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, content_type: ContentType) {
        self.types
            .insert(content_type.id().to_string(), content_type);
    }

    pub fn with(mut self, content_type: ContentType) -> Self {
        self.insert(content_type);
        self
    }

    pub fn get(&self, id: &str) -> Option<&ContentType> {
        self.types.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.types.contains_key(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ContentType> {
        self.types.values()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    /// Field metadata for `field` on content type `content_type`, if both are known
    pub fn field(&self, content_type: Option<&str>, field: &str) -> Option<&FieldMetadata> {
        content_type
            .and_then(|ct| self.get(ct))
            .and_then(|ct| ct.field(field))
    }

    /// Parse a single content type, an array of them, or a collection
    /// response (`{"items": [...]}`)
    pub fn from_value(value: &Value) -> Result<Self> {
        let items = match value {
            Value::Array(items) => items.clone(),
            Value::Object(obj) if obj.contains_key("items") => match obj.get("items") {
                Some(Value::Array(items)) => items.clone(),
                _ => anyhow::bail!("Content type collection has no items array"),
            },
            Value::Object(_) => vec![value.clone()],
            _ => anyhow::bail!("Expected a content type object or array"),
        };

        let mut registry = Self::new();
        for (idx, item) in items.into_iter().enumerate() {
            let content_type: ContentType = serde_json::from_value(item)
                .with_context(|| format!("Failed to parse content type at index {}", idx))?;
            registry.insert(content_type);
        }
        Ok(registry)
    }
}

impl FromIterator<ContentType> for ContentTypes {
    fn from_iter<T: IntoIterator<Item = ContentType>>(iter: T) -> Self {
        let mut registry = Self::new();
        for content_type in iter {
            registry.insert(content_type);
        }
        registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_collection_response() {
        let value = json!({
            "items": [{
                "sys": { "id": "post" },
                "name": "Post",
                "displayField": "title",
                "fields": [
                    { "id": "title", "type": "Symbol", "localized": true },
                    { "id": "author", "type": "Link", "linkType": "Entry" },
                    { "id": "related", "type": "Array", "items": { "type": "Link", "linkType": "Entry" } },
                    { "id": "tags", "type": "Array", "items": { "type": "Symbol" } },
                    { "id": "geo", "type": "Location" }
                ]
            }]
        });

        let registry = ContentTypes::from_value(&value).unwrap();
        let post = registry.get("post").unwrap();

        assert_eq!(post.display_field.as_deref(), Some("title"));
        assert!(post.field("title").unwrap().localized);
        assert!(post.field("author").unwrap().is_reference());
        assert!(post.field("related").unwrap().is_reference());
        assert!(!post.field("tags").unwrap().is_reference());
        assert_eq!(post.field("geo").unwrap().field_type, FieldType::Location);
    }

    #[test]
    fn test_unknown_field_type_is_preserved() {
        let value = json!({ "sys": { "id": "x" }, "fields": [{ "id": "f", "type": "Future" }] });
        let registry = ContentTypes::from_value(&value).unwrap();

        assert_eq!(
            registry.field(Some("x"), "f").unwrap().field_type,
            FieldType::Other("Future".to_string())
        );
    }

    #[test]
    fn test_field_lookup_without_content_type() {
        let registry = ContentTypes::new().with(
            ContentType::new("post").with_field(FieldMetadata::new("title", FieldType::Symbol)),
        );
        assert!(registry.field(None, "title").is_none());
        assert!(registry.field(Some("post"), "title").is_some());
    }
}
