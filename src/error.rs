//! Error handling for nn-bridge
//!
//! Control-plane errors carry recovery suggestions. Audio-path faults are
//! swallowed by the adapter and never reach the host as errors.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for nn-bridge operations
pub type Result<T> = std::result::Result<T, BridgeError>;

/// Main error type for nn-bridge operations
#[derive(Error, Debug)]
pub enum BridgeError {
    // Model lifecycle
    #[error("Failed to load model {path}: {reason}")]
    LoadError {
        path: PathBuf,
        reason: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Method not found: {method}")]
    MethodNotFound { method: String },

    // Attribute reflection
    #[error("Attribute not found: {attribute}")]
    AttributeNotFound { attribute: String },

    #[error("Type mismatch for attribute {attribute} at index {index}: {reason}")]
    TypeMismatch {
        attribute: String,
        index: usize,
        reason: String,
    },

    #[error("Setter for {attribute} failed: {reason}")]
    SetAttributeError { attribute: String, reason: String },

    // Inference
    #[error("Inference fault in {method}: {reason}")]
    InferenceFault { method: String, reason: String },

    // Bridge
    #[error("Invalid input: {reason}")]
    InvalidInput { reason: String },

    #[error("Invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    // I/O Errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Serialization Errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl BridgeError {
    pub(crate) fn load(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        BridgeError::LoadError {
            path: path.into(),
            reason: reason.into(),
            source: None,
        }
    }

    pub(crate) fn fault(method: &str, reason: impl Into<String>) -> Self {
        BridgeError::InferenceFault {
            method: method.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn set_failed(attribute: &str, reason: impl Into<String>) -> Self {
        BridgeError::SetAttributeError {
            attribute: attribute.to_string(),
            reason: reason.into(),
        }
    }

    /// Get the error code for this error type
    pub fn error_code(&self) -> &'static str {
        match self {
            BridgeError::LoadError { .. } => "LOAD_ERROR",
            BridgeError::MethodNotFound { .. } => "METHOD_NOT_FOUND",
            BridgeError::AttributeNotFound { .. } => "ATTRIBUTE_NOT_FOUND",
            BridgeError::TypeMismatch { .. } => "TYPE_MISMATCH",
            BridgeError::SetAttributeError { .. } => "SET_ATTRIBUTE_ERROR",
            BridgeError::InferenceFault { .. } => "INFERENCE_FAULT",
            BridgeError::InvalidInput { .. } => "INVALID_INPUT",
            BridgeError::InvalidConfig { .. } => "INVALID_CONFIG",
            BridgeError::Io(_) => "IO_ERROR",
            BridgeError::Serialization(_) => "SERIALIZATION_ERROR",
        }
    }

    /// Check if this error is recoverable without reloading the model
    pub fn is_recoverable(&self) -> bool {
        match self {
            BridgeError::LoadError { .. } => true,
            BridgeError::SetAttributeError { .. } => true,
            BridgeError::InferenceFault { .. } => true,
            BridgeError::InvalidInput { .. } => true,
            _ => false,
        }
    }

    /// Get recovery suggestions for this error
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            BridgeError::LoadError { .. } => vec![
                "Check the model path is correct",
                "Re-export the model with the nn-script toolchain",
                "The previously loaded model is still active",
            ],
            BridgeError::MethodNotFound { .. } => vec![
                "Run 'nn-bridge-cli inspect <model>' to list usable methods",
                "A method is only usable when '<method>_params' is embedded",
            ],
            BridgeError::AttributeNotFound { .. } => vec![
                "Run 'nn-bridge-cli inspect <model>' to list settable attributes",
                "The model must define get_<name> and '<name>_params'",
            ],
            BridgeError::TypeMismatch { .. } => vec![
                "The model's '<name>_params' tags disagree with its getter output",
                "Supported tags: 0=bool, 1=int, 2=float, 3=string",
            ],
            BridgeError::SetAttributeError { .. } => vec![
                "Check the number of arguments matches the attribute",
                "Check each argument parses as its declared type",
                "The model may reject out-of-range values",
            ],
            BridgeError::InferenceFault { .. } => vec![
                "Check the input dimension matches the method's in_dim",
                "Try switching back to CPU inference",
            ],
            BridgeError::InvalidInput { .. } => {
                vec!["Input vectors must have exactly in_dim finite values"]
            }
            _ => vec![],
        }
    }
}
