//! Core Operation types for Contentful entry mutations

use serde::{Serialize, Serializer};
use serde_json::{Map, Value, json};

use crate::api::models::Entry;
use crate::error::OperationError;

/// A single mutation that can be replayed against the Management API
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    /// Create a new entry
    Create {
        /// Freshly generated identity, never taken from the edited tree
        id: String,
        /// Content type id; required by the API, may be unknown for drafts
        content_type: Option<String>,
        /// Localized field payload
        fields: Map<String, Value>,
    },
    /// Replace the fields of an existing entry
    Update {
        id: String,
        content_type: Option<String>,
        /// Version the diff was computed against
        version: Option<u64>,
        /// Full localized field payload, not a delta
        fields: Map<String, Value>,
    },
    /// The entry is no longer referenced; only deleted when policy allows
    Dereference { id: String },
}

/// Operation discriminant, also the execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum OperationKind {
    Create,
    Update,
    Dereference,
}

impl OperationKind {
    pub const ALL: [OperationKind; 3] = [Self::Create, Self::Update, Self::Dereference];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Dereference => "dereference",
        }
    }
}

impl Serialize for OperationKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Operation {
    pub fn id(&self) -> &str {
        match self {
            Self::Create { id, .. } | Self::Update { id, .. } | Self::Dereference { id } => id,
        }
    }

    pub fn kind(&self) -> OperationKind {
        match self {
            Self::Create { .. } => OperationKind::Create,
            Self::Update { .. } => OperationKind::Update,
            Self::Dereference { .. } => OperationKind::Dereference,
        }
    }

    /// Localized payload; `None` for dereferences
    pub fn fields(&self) -> Option<&Map<String, Value>> {
        match self {
            Self::Create { fields, .. } | Self::Update { fields, .. } => Some(fields),
            Self::Dereference { .. } => None,
        }
    }

    pub fn content_type(&self) -> Option<&str> {
        match self {
            Self::Create { content_type, .. } | Self::Update { content_type, .. } => {
                content_type.as_deref()
            }
            Self::Dereference { .. } => None,
        }
    }

    /// `{"type": "update", "sys": {"id": ..}, "fields": {..}}`
    pub fn to_value(&self) -> Value {
        let mut sys = Map::new();
        sys.insert("id".to_string(), Value::String(self.id().to_string()));
        if let Some(ct) = self.content_type() {
            sys.insert(
                "contentType".to_string(),
                json!({ "sys": { "type": "Link", "linkType": "ContentType", "id": ct } }),
            );
        }
        if let Self::Update {
            version: Some(version),
            ..
        } = self
        {
            sys.insert("version".to_string(), Value::from(*version));
        }

        let mut out = Map::new();
        out.insert("type".to_string(), Value::String(self.kind().as_str().to_string()));
        out.insert("sys".to_string(), Value::Object(sys));
        if let Some(fields) = self.fields() {
            out.insert("fields".to_string(), Value::Object(fields.clone()));
        }
        Value::Object(out)
    }
}

impl Serialize for Operation {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_value().serialize(serializer)
    }
}

/// Result of executing an Operation
#[derive(Debug, Clone)]
pub struct OperationResult {
    /// The operation that was executed
    pub operation: Operation,
    /// Entry returned by the API (none for deletes), or why it failed
    pub outcome: Result<Option<Entry>, OperationError>,
}

impl OperationResult {
    pub fn new(operation: Operation, outcome: Result<Option<Entry>, OperationError>) -> Self {
        Self { operation, outcome }
    }

    /// Check if this result represents a successful operation
    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }

    /// Check if this result represents a failed operation
    pub fn is_error(&self) -> bool {
        self.outcome.is_err()
    }

    pub fn is_conflict(&self) -> bool {
        matches!(&self.outcome, Err(err) if err.is_conflict())
    }

    pub fn error(&self) -> Option<&OperationError> {
        self.outcome.as_ref().err()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update_to_value() {
        let mut fields = Map::new();
        fields.insert("test".to_string(), json!({ "en-US": "b" }));
        let op = Operation::Update {
            id: "0".to_string(),
            content_type: None,
            version: Some(7),
            fields,
        };

        assert_eq!(
            op.to_value(),
            json!({
                "type": "update",
                "sys": { "id": "0", "version": 7 },
                "fields": { "test": { "en-US": "b" } }
            })
        );
    }

    #[test]
    fn test_dereference_has_no_fields() {
        let op = Operation::Dereference { id: "9".to_string() };
        assert_eq!(op.fields(), None);
        assert_eq!(op.to_value(), json!({ "type": "dereference", "sys": { "id": "9" } }));
    }

    #[test]
    fn test_kind_order_matches_execution_order() {
        assert!(OperationKind::Create < OperationKind::Update);
        assert!(OperationKind::Update < OperationKind::Dereference);
    }

    #[test]
    fn test_result_conflict_detection() {
        let op = Operation::Dereference { id: "1".to_string() };
        let result = OperationResult::new(
            op,
            Err(OperationError::Conflict(crate::error::VersionConflict {
                id: "1".to_string(),
                expected: Some(1),
                actual: Some(2),
            })),
        );
        assert!(result.is_error());
        assert!(result.is_conflict());
    }
}
