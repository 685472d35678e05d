//! Conversion between unlocalized field maps and the localized wire shape
//!
//! Localized: `{"title": {"en-US": "Hello"}}`. Fields that the content type
//! marks as not localized always live under the space's default locale.

use serde_json::{Map, Value};

use crate::api::metadata::ContentType;
use crate::error::GraphError;

pub const DEFAULT_LOCALE: &str = "en-US";

/// Locale a field is stored under
pub fn locale_for<'a>(
    content_type: Option<&ContentType>,
    field: &str,
    locale: &'a str,
    default_locale: &'a str,
) -> &'a str {
    match content_type.and_then(|ct| ct.field(field)) {
        Some(meta) if !meta.localized => default_locale,
        _ => locale,
    }
}

/// Wrap each field value under its locale
pub fn localize(
    fields: Map<String, Value>,
    content_type: Option<&ContentType>,
    locale: &str,
    default_locale: &str,
) -> Map<String, Value> {
    fields
        .into_iter()
        .map(|(name, value)| {
            let key = locale_for(content_type, &name, locale, default_locale);
            let mut localized = Map::new();
            localized.insert(key.to_string(), value);
            (name, Value::Object(localized))
        })
        .collect()
}

/// Pick each field's value for `locale`, falling back to the default locale.
/// Fields without a value for either are dropped.
pub fn unlocalize(
    fields: &Map<String, Value>,
    content_type: Option<&ContentType>,
    locale: &str,
    default_locale: &str,
) -> Result<Map<String, Value>, GraphError> {
    let mut out = Map::new();
    for (name, value) in fields {
        let Value::Object(by_locale) = value else {
            return Err(GraphError::malformed(format!(
                "field `{}` is not keyed by locale",
                name
            )));
        };

        let preferred = locale_for(content_type, name, locale, default_locale);
        let picked = by_locale
            .get(preferred)
            .or_else(|| by_locale.get(default_locale));

        if let Some(value) = picked {
            out.insert(name.clone(), value.clone());
        }
    }
    Ok(out)
}
