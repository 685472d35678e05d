//! Error types shared by the graph builder and the execution layer

use std::fmt;

/// Error raised while ingesting entries or building an operations graph
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    /// The entry is missing data the diff cannot do without (identity, `sys`, ...)
    MalformedEntry { reason: String },
}

impl GraphError {
    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedEntry {
            reason: reason.into(),
        }
    }
}

impl fmt::Display for GraphError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MalformedEntry { reason } => write!(f, "Malformed entry: {}", reason),
        }
    }
}

impl std::error::Error for GraphError {}

/// The remote entry moved on since the diff was computed
///
/// Management clients return this inside an `anyhow::Error`; the executor
/// downcasts it so conflicts are reported apart from ordinary failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionConflict {
    pub id: String,
    pub expected: Option<u64>,
    pub actual: Option<u64>,
}

impl fmt::Display for VersionConflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let fmt_version = |v: Option<u64>| v.map_or_else(|| "none".to_string(), |v| v.to_string());
        write!(
            f,
            "Version conflict on entry {}: expected version {}, remote is at {}",
            self.id,
            fmt_version(self.expected),
            fmt_version(self.actual)
        )
    }
}

impl std::error::Error for VersionConflict {}

/// Why a single operation did not apply
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationError {
    /// Stale version, needs user intervention rather than a retry
    Conflict(VersionConflict),
    /// Create without a content type id cannot be sent
    MissingContentType,
    /// Any other client error, rendered with its context chain
    Failed(String),
}

impl OperationError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }
}

impl From<anyhow::Error> for OperationError {
    fn from(err: anyhow::Error) -> Self {
        match err.downcast_ref::<VersionConflict>() {
            Some(conflict) => Self::Conflict(conflict.clone()),
            None => Self::Failed(format!("{:#}", err)),
        }
    }
}

impl fmt::Display for OperationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Conflict(conflict) => conflict.fmt(f),
            Self::MissingContentType => write!(f, "Entry has no content type, cannot create it"),
            Self::Failed(message) => write!(f, "{}", message),
        }
    }
}

impl std::error::Error for OperationError {}

/// Error returned by the save orchestration
#[derive(Debug)]
pub enum SyncError {
    Graph(GraphError),
    Conflict(VersionConflict),
    Api(anyhow::Error),
}

impl fmt::Display for SyncError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Graph(err) => err.fmt(f),
            Self::Conflict(conflict) => conflict.fmt(f),
            Self::Api(err) => write!(f, "{:#}", err),
        }
    }
}

impl std::error::Error for SyncError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Graph(err) => Some(err),
            Self::Conflict(conflict) => Some(conflict),
            Self::Api(err) => Some(err.as_ref()),
        }
    }
}

impl From<GraphError> for SyncError {
    fn from(err: GraphError) -> Self {
        Self::Graph(err)
    }
}

impl From<VersionConflict> for SyncError {
    fn from(conflict: VersionConflict) -> Self {
        Self::Conflict(conflict)
    }
}
