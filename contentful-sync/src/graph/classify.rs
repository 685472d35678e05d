//! Per-entry decision: create, update, dereference or nothing

use serde_json::{Map, Value};

use crate::api::locale::{self, DEFAULT_LOCALE};
use crate::api::metadata::ContentTypes;
use crate::api::models::Entry;
use crate::api::operations::Operation;
use crate::error::GraphError;
use crate::graph::identity::IdAllocator;

/// Options shared by the classifier and the graph builder
#[derive(Debug, Clone)]
pub struct BuildOptions {
    /// Locale the in-memory entries are expressed in
    pub locale: String,
    /// Locale non-localized fields are stored under
    pub default_locale: String,
    /// Schemas, looked up by the entry's content type
    pub content_types: ContentTypes,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            locale: DEFAULT_LOCALE.to_string(),
            default_locale: DEFAULT_LOCALE.to_string(),
            content_types: ContentTypes::new(),
        }
    }
}

impl BuildOptions {
    pub fn new(locale: impl Into<String>) -> Self {
        let locale = locale.into();
        Self {
            default_locale: locale.clone(),
            locale,
            content_types: ContentTypes::new(),
        }
    }

    pub fn with_default_locale(mut self, default_locale: impl Into<String>) -> Self {
        self.default_locale = default_locale.into();
        self
    }

    pub fn with_content_types(mut self, content_types: ContentTypes) -> Self {
        self.content_types = content_types;
        self
    }
}

/// Compact JSON with object keys sorted at every level
pub fn stable_stringify(value: &Value) -> String {
    let mut out = String::new();
    write_stable(value, &mut out);
    out
}

fn write_stable(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (idx, key) in keys.into_iter().enumerate() {
                if idx > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                if let Some(item) = map.get(key) {
                    write_stable(item, out);
                }
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (idx, item) in items.iter().enumerate() {
                if idx > 0 {
                    out.push(',');
                }
                write_stable(item, out);
            }
            out.push(']');
        }
        Value::Number(number) => match number.as_f64() {
            // 1.0 and 1 are the same JSON number
            Some(float)
                if number.is_f64() && float.fract() == 0.0 && float.abs() < MAX_SAFE_INTEGER =>
            {
                out.push_str(&(float as i64).to_string())
            }
            _ => out.push_str(&number.to_string()),
        },
        scalar => out.push_str(&scalar.to_string()),
    }
}

/// Largest float with every smaller integer exactly representable
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_992.0;

/// Whole-document comparison of the two entries' payloads
pub fn has_changed(initial: &Entry, updated: &Entry) -> bool {
    let before = stable_stringify(&Value::Object(initial.payload_fields()));
    let after = stable_stringify(&Value::Object(updated.payload_fields()));
    before != after
}

/// Localized payload of an entry, nested references reduced to stubs
pub fn localized_payload(entry: &Entry, options: &BuildOptions) -> Map<String, Value> {
    let content_type = entry
        .content_type
        .as_deref()
        .and_then(|ct| options.content_types.get(ct));
    locale::localize(
        entry.payload_fields(),
        content_type,
        &options.locale,
        &options.default_locale,
    )
}

fn require_id(entry: &Entry) -> Result<&str, GraphError> {
    entry.id().ok_or_else(|| {
        GraphError::malformed(format!(
            "initial entry of content type {} has no id",
            entry.content_type.as_deref().unwrap_or("<unknown>")
        ))
    })
}

/// Decide the operation for one `(initial, updated)` pair
///
/// Creates take their id from `ids`, so an id carried by the updated entry is
/// only kept when `ids` issued it earlier in the same build.
pub fn classify(
    initial: Option<&Entry>,
    updated: Option<&Entry>,
    options: &BuildOptions,
    ids: &mut IdAllocator,
) -> Result<Option<Operation>, GraphError> {
    match (initial, updated) {
        (None, None) => Ok(None),
        (None, Some(updated)) => Ok(Some(Operation::Create {
            id: ids.id_for_create(updated.id()),
            content_type: updated.content_type.clone(),
            fields: localized_payload(updated, options),
        })),
        (Some(initial), None) => Ok(Some(Operation::Dereference {
            id: require_id(initial)?.to_string(),
        })),
        (Some(initial), Some(updated)) => {
            let id = require_id(initial)?;
            if !has_changed(initial, updated) {
                return Ok(None);
            }
            Ok(Some(Operation::Update {
                id: id.to_string(),
                content_type: updated
                    .content_type
                    .clone()
                    .or_else(|| initial.content_type.clone()),
                version: initial.version,
                fields: localized_payload(updated, options),
            }))
        }
    }
}
