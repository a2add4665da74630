//! Error types for kindred operations.
//!
//! Errors carry a structured [`ErrorCode`] and, where it helps, a suggestion
//! for resolving them. Consistency findings from a link store are not errors;
//! see [`crate::links::Inconsistency`].

use thiserror::Error;

/// Result type alias for kindred operations.
pub type KindredResult<T> = Result<T, KindredError>;

/// Main error type for all kindred operations.
#[derive(Error, Debug)]
pub enum KindredError {
    /// Invalid or contradictory setup, detected before any processing.
    #[error("Configuration error: {message}")]
    Configuration {
        message: String,
        code: ErrorCode,
        suggestion: Option<String>,
    },

    /// A comparator failed on a specific pair of values.
    #[error("Comparison error on property '{property}' comparing '{value1}' and '{value2}': {message}")]
    Comparison {
        property: String,
        value1: String,
        value2: String,
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Storage or connection failure in an index or link store.
    #[error("Storage error: {message}")]
    Storage {
        message: String,
        code: ErrorCode,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A match listener failed; the current batch is aborted.
    #[error("Listener error: {message}")]
    Listener {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Malformed link or gold-standard input.
    #[error("Parse error: {message}")]
    Parse { message: String, code: ErrorCode },

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Error codes for programmatic handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    // Configuration (CFG_xxx)
    CfgNoProperties,
    CfgMissingIdentity,
    CfgDuplicateIdentity,
    CfgDuplicateProperty,
    CfgInvalidProbability,
    CfgUnreachableThreshold,
    CfgInvalidValue,
    CfgUnsupportedFormat,

    // Comparison (CMP_xxx)
    CmpFailed,

    // Storage (STO_xxx)
    StoConnectionFailed,
    StoOperationFailed,
    StoLockPoisoned,

    // Listener (LSN_xxx)
    LsnCallbackFailed,

    // Parse (PARSE_xxx)
    ParseInvalidLine,
    ParseInvalidValue,

    // Internal
    Internal,
}

impl ErrorCode {
    /// Get the string representation of the error code.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::CfgNoProperties => "CFG_001",
            ErrorCode::CfgMissingIdentity => "CFG_002",
            ErrorCode::CfgDuplicateIdentity => "CFG_003",
            ErrorCode::CfgDuplicateProperty => "CFG_004",
            ErrorCode::CfgInvalidProbability => "CFG_005",
            ErrorCode::CfgUnreachableThreshold => "CFG_006",
            ErrorCode::CfgInvalidValue => "CFG_007",
            ErrorCode::CfgUnsupportedFormat => "CFG_008",
            ErrorCode::CmpFailed => "CMP_001",
            ErrorCode::StoConnectionFailed => "STO_001",
            ErrorCode::StoOperationFailed => "STO_002",
            ErrorCode::StoLockPoisoned => "STO_003",
            ErrorCode::LsnCallbackFailed => "LSN_001",
            ErrorCode::ParseInvalidLine => "PARSE_001",
            ErrorCode::ParseInvalidValue => "PARSE_002",
            ErrorCode::Internal => "INT_001",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl KindredError {
    /// Create a configuration error with a specific code.
    pub fn configuration(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
            code,
            suggestion: None,
        }
    }

    /// Create a configuration error with suggestion.
    pub fn configuration_with_suggestion(
        code: ErrorCode,
        message: impl Into<String>,
        suggestion: impl Into<String>,
    ) -> Self {
        Self::Configuration {
            message: message.into(),
            code,
            suggestion: Some(suggestion.into()),
        }
    }

    /// Create a comparison error for a value pair.
    pub fn comparison(
        property: impl Into<String>,
        value1: impl Into<String>,
        value2: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Comparison {
            property: property.into(),
            value1: value1.into(),
            value2: value2.into(),
            message: message.into(),
            source: None,
        }
    }

    /// Create a storage error.
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
            code: ErrorCode::StoOperationFailed,
            source: None,
        }
    }

    /// Create a storage error wrapping an underlying cause.
    pub fn storage_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Storage {
            message: message.into(),
            code: ErrorCode::StoOperationFailed,
            source: Some(Box::new(source)),
        }
    }

    /// Create a connection error.
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
            code: ErrorCode::StoConnectionFailed,
            source: None,
        }
    }

    /// Create an error for a poisoned lock.
    pub fn lock_poisoned(what: &str) -> Self {
        Self::Storage {
            message: format!("{} lock poisoned", what),
            code: ErrorCode::StoLockPoisoned,
            source: None,
        }
    }

    /// Create a listener error.
    pub fn listener(message: impl Into<String>) -> Self {
        Self::Listener {
            message: message.into(),
            source: None,
        }
    }

    /// Create a parse error.
    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse {
            message: message.into(),
            code: ErrorCode::ParseInvalidLine,
        }
    }

    /// Get the error code.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Configuration { code, .. } => *code,
            Self::Comparison { .. } => ErrorCode::CmpFailed,
            Self::Storage { code, .. } => *code,
            Self::Listener { .. } => ErrorCode::LsnCallbackFailed,
            Self::Parse { code, .. } => *code,
            _ => ErrorCode::Internal,
        }
    }

    /// Get a user-friendly suggestion for resolving this error.
    pub fn suggestion(&self) -> Option<&str> {
        match self {
            Self::Configuration { suggestion, .. } => suggestion.as_deref(),
            Self::Comparison { .. } => {
                Some("Check the input data and the comparator configured for this property")
            }
            Self::Storage {
                code: ErrorCode::StoConnectionFailed,
                ..
            } => Some("Please check the link store connection settings"),
            Self::Parse { .. } => Some("Lines must look like '+id1,id2' or '-id1,id2'"),
            _ => None,
        }
    }

    /// Whether this error must stop the run before any processing starts.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Configuration { .. })
    }
}
