//! Turning Contentful-shaped JSON into typed entries
//!
//! Reference detection happens here, once. With a content type registry the
//! declared field types are trusted; without one a value is a reference when
//! its `sys.type` says so.

use serde_json::{Map, Value};
use std::collections::BTreeMap;

use crate::api::locale;
use crate::api::metadata::{ContentType, ContentTypes, FieldMetadata};
use crate::api::models::{Entry, FieldValue, Link, LinkType};
use crate::error::GraphError;

/// Parser for entry JSON
#[derive(Debug, Clone, Copy, Default)]
pub struct EntryParser<'a> {
    content_types: Option<&'a ContentTypes>,
    /// `(locale, default_locale)` when field values are keyed by locale
    localized: Option<(&'a str, &'a str)>,
}

impl<'a> EntryParser<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_content_types(mut self, content_types: &'a ContentTypes) -> Self {
        if !content_types.is_empty() {
            self.content_types = Some(content_types);
        }
        self
    }

    /// Expect `{"field": {"<locale>": value}}` and pick `locale`
    pub fn localized(mut self, locale: &'a str, default_locale: &'a str) -> Self {
        self.localized = Some((locale, default_locale));
        self
    }

    /// Parse one entry
    pub fn parse(&self, value: &Value) -> Result<Entry, GraphError> {
        self.parse_entry(value)
    }

    /// Parse `null` (no entries), one entry, or an array of entries
    pub fn parse_many(&self, value: &Value) -> Result<Vec<Entry>, GraphError> {
        match value {
            Value::Null => Ok(Vec::new()),
            Value::Array(items) => items.iter().map(|item| self.parse_entry(item)).collect(),
            other => Ok(vec![self.parse_entry(other)?]),
        }
    }

    /// Apply the registry's field types to an entry built elsewhere
    ///
    /// Values declared as references but still held as plain JSON become
    /// links or nested entries. Nested entries are retyped as well.
    pub fn retype(&self, entry: &Entry) -> Result<Entry, GraphError> {
        let schema = self.schema(entry.content_type.as_deref());

        let mut fields = BTreeMap::new();
        for (name, value) in &entry.fields {
            let declared = schema
                .and_then(|ct| ct.field(name))
                .is_some_and(FieldMetadata::is_reference);
            let value = match value {
                FieldValue::Scalar(Value::Null) if declared => continue,
                FieldValue::Scalar(raw) if declared => self.parse_declared_reference(raw)?,
                FieldValue::List(items) if declared => FieldValue::List(
                    items
                        .iter()
                        .filter(|item| !matches!(item, FieldValue::Scalar(Value::Null)))
                        .map(|item| match item {
                            FieldValue::Scalar(raw) => self.parse_reference(raw),
                            other => other.map_entries(&mut |nested| self.retype(nested)),
                        })
                        .collect::<Result<_, _>>()?,
                ),
                other => other.map_entries(&mut |nested| self.retype(nested))?,
            };
            fields.insert(name.clone(), value);
        }

        Ok(Entry {
            id: entry.id.clone(),
            content_type: entry.content_type.clone(),
            version: entry.version,
            fields,
        })
    }

    fn schema(&self, content_type: Option<&str>) -> Option<&'a ContentType> {
        let types = self.content_types?;
        types.get(content_type?)
    }

    fn parse_entry(&self, value: &Value) -> Result<Entry, GraphError> {
        let sys = sys_of(value).ok_or_else(|| GraphError::malformed("entry has no `sys` object"))?;

        let id = sys.get("id").and_then(Value::as_str).map(str::to_string);
        let version = sys.get("version").and_then(Value::as_u64);
        let content_type = sys
            .get("contentType")
            .and_then(sys_of)
            .and_then(|ct| ct.get("id"))
            .and_then(Value::as_str)
            .map(str::to_string);

        let schema = self.schema(content_type.as_deref());

        let raw_fields = match value.get("fields") {
            None | Some(Value::Null) => Map::new(),
            Some(Value::Object(fields)) => fields.clone(),
            Some(_) => {
                return Err(GraphError::malformed(format!(
                    "entry {} has a non-object `fields`",
                    id.as_deref().unwrap_or("<new>")
                )));
            }
        };
        let raw_fields = self.unlocalize(raw_fields, schema)?;

        let mut entry = Entry {
            id,
            content_type,
            version,
            ..Default::default()
        };
        for (name, raw) in &raw_fields {
            if raw.is_null() {
                continue;
            }
            let meta = schema.and_then(|ct| ct.field(name));
            entry.fields.insert(name.clone(), self.parse_field(meta, raw)?);
        }
        Ok(entry)
    }

    fn unlocalize(
        &self,
        fields: Map<String, Value>,
        schema: Option<&ContentType>,
    ) -> Result<Map<String, Value>, GraphError> {
        match self.localized {
            Some((locale, default_locale)) => {
                locale::unlocalize(&fields, schema, locale, default_locale)
            }
            None => Ok(fields),
        }
    }

    fn parse_field(&self, meta: Option<&FieldMetadata>, raw: &Value) -> Result<FieldValue, GraphError> {
        match meta {
            Some(meta) if meta.is_reference() => self.parse_declared_reference(raw),
            Some(_) => Ok(FieldValue::Scalar(raw.clone())),
            None => self.detect(raw),
        }
    }

    /// Schema says this is a link (or list of links)
    fn parse_declared_reference(&self, raw: &Value) -> Result<FieldValue, GraphError> {
        match raw {
            Value::Array(items) => items
                .iter()
                .filter(|item| !item.is_null())
                .map(|item| self.parse_reference(item))
                .collect::<Result<Vec<_>, _>>()
                .map(FieldValue::List),
            other => self.parse_reference(other),
        }
    }

    fn parse_reference(&self, raw: &Value) -> Result<FieldValue, GraphError> {
        let sys = sys_of(raw).ok_or_else(|| GraphError::malformed("reference has no `sys` object"))?;
        let id = sys
            .get("id")
            .and_then(Value::as_str)
            .ok_or_else(|| GraphError::malformed("reference has no `sys.id`"))?;

        match sys.get("type").and_then(Value::as_str) {
            Some("Asset") => Ok(FieldValue::Link(Link::asset(id))),
            Some("Link") => {
                let link_type = sys
                    .get("linkType")
                    .and_then(Value::as_str)
                    .and_then(LinkType::parse)
                    .unwrap_or(LinkType::Entry);
                Ok(FieldValue::Link(Link {
                    id: id.to_string(),
                    link_type,
                }))
            }
            _ if raw.get("fields").is_some_and(Value::is_object) => {
                Ok(FieldValue::Entry(Box::new(self.parse_entry(raw)?)))
            }
            _ => Ok(FieldValue::Link(Link {
                id: id.to_string(),
                link_type: sys
                    .get("linkType")
                    .and_then(Value::as_str)
                    .and_then(LinkType::parse)
                    .unwrap_or(LinkType::Entry),
            })),
        }
    }

    /// No schema: look at the runtime shape
    fn detect(&self, raw: &Value) -> Result<FieldValue, GraphError> {
        match raw {
            Value::Array(items) if items.iter().any(|item| self.looks_like_reference(item)) => items
                .iter()
                .filter(|item| !item.is_null())
                .map(|item| self.detect(item))
                .collect::<Result<Vec<_>, _>>()
                .map(FieldValue::List),
            other if self.looks_like_reference(other) => self.parse_reference(other),
            other => Ok(FieldValue::Scalar(other.clone())),
        }
    }

    fn looks_like_reference(&self, raw: &Value) -> bool {
        let Some(sys) = sys_of(raw) else {
            return false;
        };
        match sys.get("type").and_then(Value::as_str) {
            Some("Entry") | Some("Asset") => true,
            Some("Link") => sys
                .get("linkType")
                .and_then(Value::as_str)
                .and_then(LinkType::parse)
                .is_some(),
            _ => false,
        }
    }
}

fn sys_of(value: &Value) -> Option<&Map<String, Value>> {
    value.get("sys").and_then(Value::as_object)
}
