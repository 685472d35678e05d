//! Contentful entry models
//!
//! The in-memory entry is unlocalized: every field holds the value for the
//! locale being edited. Localization only happens when an operation payload
//! is serialized (see [`crate::api::locale`]).

use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value, json};
use std::collections::BTreeMap;

/// What a link points at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LinkType {
    Entry,
    Asset,
}

impl LinkType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Entry => "Entry",
            Self::Asset => "Asset",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "Entry" => Some(Self::Entry),
            "Asset" => Some(Self::Asset),
            _ => None,
        }
    }
}

/// Unresolved reference to another entry or asset
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Link {
    pub id: String,
    pub link_type: LinkType,
}

impl Link {
    pub fn entry(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            link_type: LinkType::Entry,
        }
    }

    pub fn asset(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            link_type: LinkType::Asset,
        }
    }

    /// Wire stub: `{"sys": {"type": "Link", "linkType": .., "id": ..}}`
    pub fn to_value(&self) -> Value {
        link_stub(&self.id, self.link_type)
    }
}

pub(crate) fn link_stub(id: &str, link_type: LinkType) -> Value {
    json!({
        "sys": {
            "type": "Link",
            "linkType": link_type.as_str(),
            "id": id,
        }
    })
}

/// A single field value, tagged when the entry enters the crate
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// String, number, bool, date or opaque JSON (location, rich text, ...)
    Scalar(Value),
    /// Reference that was not resolved
    Link(Link),
    /// Fully resolved nested entry
    Entry(Box<Entry>),
    /// Ordered list of scalars or references
    List(Vec<FieldValue>),
}

/// Borrowed view of a reference found inside a field
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Reference<'a> {
    Entry(&'a Entry),
    Link(&'a Link),
}

impl<'a> Reference<'a> {
    pub fn id(&self) -> Option<&'a str> {
        match self {
            Self::Entry(entry) => entry.id(),
            Self::Link(link) => Some(link.id.as_str()),
        }
    }
}

impl FieldValue {
    pub fn list(values: impl IntoIterator<Item = impl Into<FieldValue>>) -> Self {
        Self::List(values.into_iter().map(Into::into).collect())
    }

    /// True if this value is, or contains, a reference
    pub fn is_reference(&self) -> bool {
        match self {
            Self::Scalar(_) => false,
            Self::Link(_) | Self::Entry(_) => true,
            Self::List(items) => items.iter().any(FieldValue::is_reference),
        }
    }

    /// Append every reference in this value, in order
    pub fn collect_references<'a>(&'a self, out: &mut Vec<Reference<'a>>) {
        match self {
            Self::Scalar(_) => {}
            Self::Link(link) => out.push(Reference::Link(link)),
            Self::Entry(entry) => out.push(Reference::Entry(entry)),
            Self::List(items) => {
                for item in items {
                    item.collect_references(out);
                }
            }
        }
    }

    /// Full representation, nested entries included
    pub fn to_value(&self) -> Value {
        match self {
            Self::Scalar(value) => value.clone(),
            Self::Link(link) => link.to_value(),
            Self::Entry(entry) => entry.to_value(),
            Self::List(items) => Value::Array(items.iter().map(FieldValue::to_value).collect()),
        }
    }

    /// Payload representation: nested entries are reduced to link stubs
    pub fn to_payload(&self) -> Value {
        match self {
            Self::Scalar(value) => value.clone(),
            Self::Link(link) => link.to_value(),
            Self::Entry(entry) => link_stub(entry.id().unwrap_or_default(), LinkType::Entry),
            Self::List(items) => Value::Array(items.iter().map(FieldValue::to_payload).collect()),
        }
    }

    /// Rebuild the value with every nested entry passed through `f`
    pub(crate) fn map_entries<E>(
        &self,
        f: &mut impl FnMut(&Entry) -> Result<Entry, E>,
    ) -> Result<FieldValue, E> {
        Ok(match self {
            Self::Scalar(_) | Self::Link(_) => self.clone(),
            Self::Entry(entry) => Self::Entry(Box::new(f(entry)?)),
            Self::List(items) => Self::List(
                items
                    .iter()
                    .map(|item| item.map_entries(f))
                    .collect::<Result<_, _>>()?,
            ),
        })
    }
}

impl From<Value> for FieldValue {
    fn from(value: Value) -> Self {
        Self::Scalar(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        Self::Scalar(Value::String(value.to_string()))
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        Self::Scalar(Value::String(value))
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        Self::Scalar(Value::from(value))
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        Self::Scalar(Value::Bool(value))
    }
}

impl From<Link> for FieldValue {
    fn from(link: Link) -> Self {
        Self::Link(link)
    }
}

impl From<Entry> for FieldValue {
    fn from(entry: Entry) -> Self {
        Self::Entry(Box::new(entry))
    }
}

impl From<Vec<FieldValue>> for FieldValue {
    fn from(values: Vec<FieldValue>) -> Self {
        Self::List(values)
    }
}

/// A Contentful entry, possibly holding resolved nested entries
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Entry {
    /// Absent for entries that were never created
    pub id: Option<String>,
    pub content_type: Option<String>,
    /// Remote version this representation was read at
    pub version: Option<u64>,
    pub fields: BTreeMap<String, FieldValue>,
}

impl Entry {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            ..Default::default()
        }
    }

    /// Entry that has no identity yet
    pub fn draft() -> Self {
        Self::default()
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn with_version(mut self, version: u64) -> Self {
        self.version = Some(version);
        self
    }

    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn field(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    /// Names of the fields currently holding references
    pub fn reference_fields(&self) -> impl Iterator<Item = &str> {
        self.fields
            .iter()
            .filter(|(_, value)| value.is_reference())
            .map(|(name, _)| name.as_str())
    }

    /// References held by the named fields, flattened in field order
    pub fn references_in<'a, I>(&'a self, field_names: I) -> Vec<Reference<'a>>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut out = Vec::new();
        for name in field_names {
            if let Some(value) = self.fields.get(name) {
                value.collect_references(&mut out);
            }
        }
        out
    }

    /// Every reference held by this entry
    pub fn references(&self) -> Vec<Reference<'_>> {
        let mut out = Vec::new();
        for value in self.fields.values() {
            value.collect_references(&mut out);
        }
        out
    }

    /// Content type ids used by this entry and every nested entry
    pub fn content_type_ids(&self) -> Vec<String> {
        let mut ids = Vec::new();
        self.walk(&mut |entry| {
            if let Some(ct) = &entry.content_type {
                if !ids.contains(ct) {
                    ids.push(ct.clone());
                }
            }
        });
        ids
    }

    /// Visit this entry and every nested entry, depth first
    pub fn walk<'a>(&'a self, f: &mut impl FnMut(&'a Entry)) {
        f(self);
        for reference in self.references() {
            if let Reference::Entry(entry) = reference {
                entry.walk(f);
            }
        }
    }

    /// Unlocalized fields with nested entries reduced to link stubs
    pub fn payload_fields(&self) -> Map<String, Value> {
        self.fields
            .iter()
            .map(|(name, value)| (name.clone(), value.to_payload()))
            .collect()
    }

    /// Contentful-shaped JSON with unlocalized fields
    pub fn to_value(&self) -> Value {
        let mut sys = Map::new();
        if let Some(id) = &self.id {
            sys.insert("id".to_string(), Value::String(id.clone()));
        }
        sys.insert("type".to_string(), Value::String("Entry".to_string()));
        if let Some(version) = self.version {
            sys.insert("version".to_string(), Value::from(version));
        }
        if let Some(ct) = &self.content_type {
            sys.insert(
                "contentType".to_string(),
                json!({ "sys": { "type": "Link", "linkType": "ContentType", "id": ct } }),
            );
        }

        let fields: Map<String, Value> = self
            .fields
            .iter()
            .map(|(name, value)| (name.clone(), value.to_value()))
            .collect();

        json!({ "sys": sys, "fields": fields })
    }
}

impl Serialize for Entry {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_value().serialize(serializer)
    }
}
