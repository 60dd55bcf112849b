//! Message Bridge
//!
//! Request/response mode: one feature vector in, one model call, the raw
//! output vector back. No rings and no host cadence; every message runs the
//! configured method exactly once.

use super::bridge::{check_input, load_configured};
use super::config::BridgeConfig;
use crate::adapter::{MethodDescriptor, ModelAdapter};
use crate::error::{BridgeError, Result};
use log::info;
use std::sync::Arc;

/// Runs one model method per incoming message
pub struct MessageBridge {
    adapter: Arc<ModelAdapter>,
    method: String,
    descriptor: MethodDescriptor,
    output: Vec<f32>,
}

impl MessageBridge {
    /// Load the configured model and resolve the method
    ///
    /// # Errors
    /// Same as `StreamingBridge::new`.
    pub fn new(adapter: Arc<ModelAdapter>, config: &BridgeConfig) -> Result<Self> {
        load_configured(&adapter, config)?;
        Self::from_loaded(adapter, config)
    }

    /// Build a message bridge around an adapter that already holds a model
    pub fn from_loaded(adapter: Arc<ModelAdapter>, config: &BridgeConfig) -> Result<Self> {
        config.validate()?;
        let method = config.method.clone();
        let descriptor =
            adapter
                .get_method_params(&method)
                .ok_or_else(|| BridgeError::MethodNotFound {
                    method: method.clone(),
                })?;

        info!(
            "Message bridge ready: method {} [{} -> {}]",
            method, descriptor.in_dim, descriptor.out_dim
        );

        Ok(Self {
            adapter,
            method,
            descriptor,
            output: Vec::new(),
        })
    }

    /// Run the method on `values` and return its output vector
    ///
    /// A faulting call returns the previous output, like the streaming path.
    ///
    /// # Errors
    /// `InvalidInput` when `values` doesn't have `in_dim` finite entries.
    /// The model is not called in that case.
    pub fn send(&mut self, values: &[f32]) -> Result<&[f32]> {
        check_input(values, self.descriptor.in_dim)?;
        self.adapter.perform(values, &mut self.output, &self.method);
        Ok(&self.output)
    }

    /// Output of the most recent message
    pub fn last_output(&self) -> &[f32] {
        &self.output
    }

    pub fn adapter(&self) -> &Arc<ModelAdapter> {
        &self.adapter
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn descriptor(&self) -> &MethodDescriptor {
        &self.descriptor
    }
}
