use std::time::Duration;
use thiserror::Error;

/// Structured error context for configuration failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorContext {
    /// Config key or field that caused the error (e.g., "total_timeout_ms")
    pub field_path: Option<String>,
    /// Additional context about the error (e.g., expected range, actual value)
    pub details: Option<String>,
    /// Source of the error (e.g., "waiter_config", "readiness_waiter")
    pub source: Option<String>,
}

impl ErrorContext {
    pub fn new() -> Self {
        Self {
            field_path: None,
            details: None,
            source: None,
        }
    }

    pub fn with_field_path(mut self, path: impl Into<String>) -> Self {
        self.field_path = Some(path.into());
        self
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }
}

impl Default for ErrorContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Why a readiness signal failed.
///
/// Every caller sharing a signal receives its own copy, so this type is `Clone`
/// and carries only owned data.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReadinessError {
    #[error("host model not available within {}ms (waited {}ms)", .timeout.as_millis(), .elapsed.as_millis())]
    Timeout { timeout: Duration, elapsed: Duration },

    #[error("host model probe failed: {message}")]
    Probe { message: String },

    #[error("readiness runtime error: {message}")]
    Runtime { message: String },
}

impl ReadinessError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, ReadinessError::Timeout { .. })
    }
}

/// Unified error type for the readiness waiter
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Readiness(#[from] ReadinessError),

    #[error("ready callback failed: {0}")]
    Callback(anyhow::Error),

    #[error("Configuration error: {message}{}", format_context(.context))]
    Configuration {
        message: String,
        context: ErrorContext,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

// Helper function to format error context for display
fn format_context(ctx: &ErrorContext) -> String {
    let mut parts = Vec::new();
    if let Some(ref field) = ctx.field_path {
        parts.push(format!("field: {}", field));
    }
    if let Some(ref details) = ctx.details {
        parts.push(format!("details: {}", details));
    }
    if let Some(ref source) = ctx.source {
        parts.push(format!("source: {}", source));
    }
    if parts.is_empty() {
        String::new()
    } else {
        format!(" ({})", parts.join(", "))
    }
}

impl Error {
    /// Create a new configuration error with structured context
    pub fn configuration_with_context(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::Configuration {
            message: msg.into(),
            context,
        }
    }

    /// Extract error context if available
    pub fn context(&self) -> Option<&ErrorContext> {
        match self {
            Error::Configuration { context, .. } => Some(context),
            _ => None,
        }
    }

    /// The readiness failure behind this error, if any.
    pub fn readiness(&self) -> Option<&ReadinessError> {
        match self {
            Error::Readiness(e) => Some(e),
            _ => None,
        }
    }

    pub fn is_timeout(&self) -> bool {
        self.readiness().is_some_and(ReadinessError::is_timeout)
    }
}
