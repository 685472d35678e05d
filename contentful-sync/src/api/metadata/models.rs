//! Contentful content type models

use serde::{Deserialize, Serialize};

/// Content type schema as returned by the Management API
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentType {
    pub sys: ContentTypeSys,
    #[serde(default)]
    pub name: Option<String>,
    /// Field used as the entry title in editors
    #[serde(default)]
    pub display_field: Option<String>,
    #[serde(default)]
    pub fields: Vec<FieldMetadata>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentTypeSys {
    pub id: String,
}

/// Field definition on a content type
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldMetadata {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    #[serde(default)]
    pub localized: bool,
    #[serde(default)]
    pub required: bool,
    /// "Entry" or "Asset" for Link fields
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link_type: Option<String>,
    /// Item definition for Array fields
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<ItemsMetadata>,
}

/// Item definition of an Array field
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemsMetadata {
    #[serde(rename = "type")]
    pub item_type: FieldType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link_type: Option<String>,
}

/// Field data types in Contentful
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(from = "String", into = "String")]
pub enum FieldType {
    Symbol,
    Text,
    RichText,
    Integer,
    Number,
    Date,
    Boolean,
    Object,
    Location,
    Link,
    Array,
    Other(String),
}

impl From<String> for FieldType {
    fn from(value: String) -> Self {
        match value.as_str() {
            "Symbol" => Self::Symbol,
            "Text" => Self::Text,
            "RichText" => Self::RichText,
            "Integer" => Self::Integer,
            "Number" => Self::Number,
            "Date" => Self::Date,
            "Boolean" => Self::Boolean,
            "Object" => Self::Object,
            "Location" => Self::Location,
            "Link" => Self::Link,
            "Array" => Self::Array,
            _ => Self::Other(value),
        }
    }
}

impl From<FieldType> for String {
    fn from(field_type: FieldType) -> Self {
        match field_type {
            FieldType::Symbol => "Symbol".to_string(),
            FieldType::Text => "Text".to_string(),
            FieldType::RichText => "RichText".to_string(),
            FieldType::Integer => "Integer".to_string(),
            FieldType::Number => "Number".to_string(),
            FieldType::Date => "Date".to_string(),
            FieldType::Boolean => "Boolean".to_string(),
            FieldType::Object => "Object".to_string(),
            FieldType::Location => "Location".to_string(),
            FieldType::Link => "Link".to_string(),
            FieldType::Array => "Array".to_string(),
            FieldType::Other(other) => other,
        }
    }
}

impl ContentType {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            sys: ContentTypeSys { id: id.into() },
            name: None,
            display_field: None,
            fields: Vec::new(),
        }
    }

    pub fn with_field(mut self, field: FieldMetadata) -> Self {
        self.fields.push(field);
        self
    }

    pub fn id(&self) -> &str {
        &self.sys.id
    }

    pub fn field(&self, id: &str) -> Option<&FieldMetadata> {
        self.fields.iter().find(|f| f.id == id)
    }
}

impl FieldMetadata {
    pub fn new(id: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            id: id.into(),
            name: None,
            field_type,
            localized: false,
            required: false,
            link_type: None,
            items: None,
        }
    }

    /// Single entry link field
    pub fn link(id: impl Into<String>, link_type: &str) -> Self {
        Self {
            link_type: Some(link_type.to_string()),
            ..Self::new(id, FieldType::Link)
        }
    }

    /// Array of links field
    pub fn links(id: impl Into<String>, link_type: &str) -> Self {
        Self {
            items: Some(ItemsMetadata {
                item_type: FieldType::Link,
                link_type: Some(link_type.to_string()),
            }),
            ..Self::new(id, FieldType::Array)
        }
    }

    pub fn localized(mut self) -> Self {
        self.localized = true;
        self
    }

    /// Link field, or Array whose items are links
    pub fn is_reference(&self) -> bool {
        match self.field_type {
            FieldType::Link => true,
            FieldType::Array => self
                .items
                .as_ref()
                .is_some_and(|items| items.item_type == FieldType::Link),
            _ => false,
        }
    }
}
