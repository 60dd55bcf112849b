//! Model runtime interfaces and implementations
//!
//! This module provides:
//! - `ScriptModule` / `ModelRuntime` traits for loaded models
//! - Tagged `Value`s and dense `Tensor`s exchanged with models
//! - Compute device selection
//! - The nn-script artifact format and its interpreter
//! - Demo artifacts for testing

pub mod device;
pub mod mock;
mod module;
pub mod script;
mod tensor;
mod value;

pub use device::{detect_accelerator, AcceleratorDetector, ComputeDevice};
pub use mock::DemoModel;
pub use module::{ModelRuntime, ScriptModule};
pub use script::{ScriptArtifact, ScriptModel, ScriptRuntime, MODEL_EXTENSION};
pub use tensor::Tensor;
pub use value::Value;
