//! Bridge configuration
//!
//! Defaults, then a JSON config file, then `NN_BRIDGE_*` environment
//! overrides, then command-line flags (applied by the CLI).

use crate::error::{BridgeError, Result};
use crate::neural::MODEL_EXTENSION;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default method called on every block
pub const DEFAULT_METHOD: &str = "forward";

/// Default requested ring buffer size in samples
pub const DEFAULT_BUFFER_SIZE: usize = 4096;

/// Runtime configuration of one streaming bridge
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Model artifact; `.nnm` is appended when the extension is missing
    pub model_path: Option<PathBuf>,
    /// Method invoked on every host callback
    pub method: String,
    /// Requested ring size; 0 means "the model's highest ratio"
    pub buffer_size: usize,
    /// Move the model to an accelerator when one is available
    pub use_gpu: bool,
    /// Start with computation enabled
    pub enabled: bool,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            model_path: None,
            method: DEFAULT_METHOD.to_string(),
            buffer_size: DEFAULT_BUFFER_SIZE,
            use_gpu: false,
            enabled: true,
        }
    }
}

impl BridgeConfig {
    pub fn new(model_path: impl Into<PathBuf>) -> Self {
        Self {
            model_path: Some(model_path.into()),
            ..Self::default()
        }
    }

    pub fn with_method(mut self, method: &str) -> Self {
        self.method = method.to_string();
        self
    }

    pub fn with_buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = buffer_size;
        self
    }

    pub fn with_gpu(mut self, use_gpu: bool) -> Self {
        self.use_gpu = use_gpu;
        self
    }

    /// Read a JSON config file; missing keys keep their defaults
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Apply `NN_BRIDGE_MODEL`, `NN_BRIDGE_METHOD`, `NN_BRIDGE_BUFFER_SIZE`
    /// and `NN_BRIDGE_USE_GPU`
    pub fn with_env_overrides(self) -> Result<Self> {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        if let Some(model) = lookup("NN_BRIDGE_MODEL") {
            self.model_path = Some(PathBuf::from(model));
        }
        if let Some(method) = lookup("NN_BRIDGE_METHOD") {
            self.method = method;
        }
        if let Some(size) = lookup("NN_BRIDGE_BUFFER_SIZE") {
            self.buffer_size = size.trim().parse().map_err(|_| BridgeError::InvalidConfig {
                reason: format!("NN_BRIDGE_BUFFER_SIZE must be an integer, got '{}'", size),
            })?;
        }
        if let Some(gpu) = lookup("NN_BRIDGE_USE_GPU") {
            self.use_gpu = crate::adapter::parsing::parse_bool(&gpu).ok_or_else(|| {
                BridgeError::InvalidConfig {
                    reason: format!("NN_BRIDGE_USE_GPU must be a boolean, got '{}'", gpu),
                }
            })?;
        }
        Ok(self)
    }

    /// Model path with the default extension applied
    pub fn resolved_model_path(&self) -> Result<PathBuf> {
        let path = self
            .model_path
            .as_ref()
            .ok_or_else(|| BridgeError::InvalidConfig {
                reason: "no model path configured".to_string(),
            })?;
        Ok(with_model_extension(path))
    }

    /// Check invariants that don't need a model
    pub fn validate(&self) -> Result<()> {
        if self.method.trim().is_empty() {
            return Err(BridgeError::InvalidConfig {
                reason: "method name is empty".to_string(),
            });
        }
        Ok(())
    }
}

/// Append `.nnm` unless the path already ends with it
pub fn with_model_extension(path: &Path) -> PathBuf {
    match path.extension() {
        Some(ext) if ext == MODEL_EXTENSION => path.to_path_buf(),
        _ => {
            let mut os = path.as_os_str().to_os_string();
            os.push(".");
            os.push(MODEL_EXTENSION);
            PathBuf::from(os)
        }
    }
}
