use std::fmt;
use thiserror::Error;

/// 圖譜條目種類（節點或邊）
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    Node,
    Edge,
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntryKind::Node => write!(f, "node"),
            EntryKind::Edge => write!(f, "edge"),
        }
    }
}

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("Text generation service unavailable: {0}")]
    ServiceUnavailable(#[from] reqwest::Error),

    #[error("Text generation service rate limited the request: {message}")]
    RateLimited { message: String },

    #[error("Text generation service error (status {status:?}): {message}")]
    ServiceError { status: Option<u16>, message: String },

    #[error("Malformed service output at line {line}, column {column}: {message}")]
    MalformedOutput {
        raw: String,
        line: usize,
        column: usize,
        message: String,
    },

    #[error("Invalid graph {kind} at index {index}: {reason}")]
    InvalidGraphEntry {
        kind: EntryKind,
        index: usize,
        reason: String,
    },

    #[error("Invalid graph document: {reason}")]
    InvalidDocument { reason: String },

    #[error("Unknown model '{model_id}': no pricing entry configured")]
    UnknownModel { model_id: String },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Configuration error in '{field}': {message}")]
    ConfigValidationError { field: String, message: String },

    #[error("Invalid value '{value}' for '{field}': {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Missing required configuration: {field}")]
    MissingConfigError { field: String },

    #[error("Validation error: {message}")]
    ValidationError { message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Configuration,
    Service,
    Output,
    Input,
    System,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl ExtractError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            ExtractError::ServiceUnavailable(_)
            | ExtractError::RateLimited { .. }
            | ExtractError::ServiceError { .. } => ErrorCategory::Service,
            ExtractError::MalformedOutput { .. }
            | ExtractError::InvalidGraphEntry { .. }
            | ExtractError::InvalidDocument { .. } => ErrorCategory::Output,
            ExtractError::UnknownModel { .. }
            | ExtractError::ConfigError { .. }
            | ExtractError::ConfigValidationError { .. }
            | ExtractError::InvalidConfigValueError { .. }
            | ExtractError::MissingConfigError { .. } => ErrorCategory::Configuration,
            ExtractError::ValidationError { .. } => ErrorCategory::Input,
            ExtractError::IoError(_) | ExtractError::SerializationError(_) => {
                ErrorCategory::System
            }
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self {
            ExtractError::InvalidGraphEntry { .. } => ErrorSeverity::Low,
            // 可由呼叫端稍後重試
            ExtractError::ServiceUnavailable(_)
            | ExtractError::RateLimited { .. }
            | ExtractError::ServiceError { .. }
            | ExtractError::MalformedOutput { .. }
            | ExtractError::InvalidDocument { .. } => ErrorSeverity::Medium,
            ExtractError::ValidationError { .. }
            | ExtractError::ConfigError { .. }
            | ExtractError::ConfigValidationError { .. }
            | ExtractError::InvalidConfigValueError { .. }
            | ExtractError::MissingConfigError { .. } => ErrorSeverity::High,
            ExtractError::UnknownModel { .. }
            | ExtractError::IoError(_)
            | ExtractError::SerializationError(_) => ErrorSeverity::Critical,
        }
    }

    /// 單一條目錯誤可略過，不影響整批結果
    pub fn is_recoverable(&self) -> bool {
        matches!(self, ExtractError::InvalidGraphEntry { .. })
    }

    pub fn recovery_suggestion(&self) -> String {
        match self {
            ExtractError::ServiceUnavailable(_) => {
                "Check network connectivity and the service endpoint, then try again".to_string()
            }
            ExtractError::RateLimited { .. } => {
                "Wait a moment before retrying or lower the request rate".to_string()
            }
            ExtractError::ServiceError { status, .. } => match status {
                Some(401) | Some(403) => "Verify the API key in the configuration".to_string(),
                _ => "Inspect the service response and retry the request".to_string(),
            },
            ExtractError::MalformedOutput { .. } => {
                "Retry the query; the service returned output that could not be repaired".to_string()
            }
            ExtractError::InvalidGraphEntry { .. } => {
                "The entry was skipped; no action required".to_string()
            }
            ExtractError::InvalidDocument { .. } => {
                "Retry the query; the service output did not contain a graph".to_string()
            }
            ExtractError::UnknownModel { model_id } => format!(
                "Add a [pricing.models.\"{}\"] entry or pick a configured model",
                model_id
            ),
            ExtractError::ConfigError { .. } => {
                "Check the configuration file syntax (TOML)".to_string()
            }
            ExtractError::ConfigValidationError { .. }
            | ExtractError::InvalidConfigValueError { .. } => {
                "Fix the configuration file and run again".to_string()
            }
            ExtractError::MissingConfigError { field } => {
                format!("Provide a value for '{}'", field)
            }
            ExtractError::ValidationError { .. } => "Check the query input".to_string(),
            ExtractError::IoError(_) => "Check file paths and permissions".to_string(),
            ExtractError::SerializationError(_) => {
                "The data could not be (de)serialized; check the file contents".to_string()
            }
        }
    }

    pub fn user_friendly_message(&self) -> String {
        match self {
            ExtractError::ServiceUnavailable(_) => {
                "Could not reach the text generation service".to_string()
            }
            ExtractError::RateLimited { .. } => "The service is rate limiting requests".to_string(),
            ExtractError::ServiceError { status, .. } => match status {
                Some(code) => format!("The service rejected the request (HTTP {})", code),
                None => "The service returned an unusable response".to_string(),
            },
            ExtractError::MalformedOutput { line, column, .. } => format!(
                "The service output is not valid structured data (line {}, column {})",
                line, column
            ),
            ExtractError::UnknownModel { model_id } => {
                format!("Model '{}' has no pricing configured", model_id)
            }
            other => other.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ExtractError>;
