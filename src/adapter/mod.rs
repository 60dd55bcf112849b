//! Model Adapter
//!
//! Owns the live model and its compute device, and exposes the control
//! surface a host integration needs:
//! - load / reload with construct-then-swap publication
//! - per-block inference that never fails outward
//! - attribute reflection through type-tagged value lists
//! - device migration
//!
//! One exclusive lock guards the model. It is held only around the sections
//! that touch the model.

pub mod descriptor;
pub mod parsing;

pub use descriptor::{
    AttributeDescriptor, DescriptorTable, MethodDescriptor, MethodLabels, TypeTag,
};

use crate::error::{BridgeError, Result};
use crate::neural::{
    detect_accelerator, AcceleratorDetector, ComputeDevice, ModelRuntime, ScriptModule,
    ScriptRuntime, Tensor, Value,
};
use log::{debug, info, warn};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// A published model with the metadata read from it
struct LoadedModel {
    module: Box<dyn ScriptModule>,
    table: Arc<DescriptorTable>,
    path: PathBuf,
    fingerprint: String,
}

struct AdapterState {
    model: Option<LoadedModel>,
    device: ComputeDevice,
    last_path: Option<PathBuf>,
}

/// Inference counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdapterStats {
    /// Method invocations attempted by `perform`
    pub performs: u64,
    /// Invocations that faulted and were swallowed
    pub faults: u64,
}

/// Loads, reflects on and runs a self-describing model
pub struct ModelAdapter {
    runtime: Box<dyn ModelRuntime>,
    detector: AcceleratorDetector,
    state: Mutex<AdapterState>,
    performs: AtomicU64,
    faults: AtomicU64,
}

impl Default for ModelAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl ModelAdapter {
    /// Create an adapter for nn-script artifacts with system accelerator detection
    pub fn new() -> Self {
        Self::with_runtime(Box::new(ScriptRuntime))
    }

    pub fn with_runtime(runtime: Box<dyn ModelRuntime>) -> Self {
        Self {
            runtime,
            detector: Box::new(detect_accelerator),
            state: Mutex::new(AdapterState {
                model: None,
                device: ComputeDevice::Cpu,
                last_path: None,
            }),
            performs: AtomicU64::new(0),
            faults: AtomicU64::new(0),
        }
    }

    /// Replace accelerator detection
    pub fn with_accelerator_detector<F>(mut self, detector: F) -> Self
    where
        F: Fn() -> Option<ComputeDevice> + Send + Sync + 'static,
    {
        self.detector = Box::new(detector);
        self
    }

    // ------------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------------

    /// Load a model and publish it
    ///
    /// The new model is deserialized, put in eval mode, moved to the current
    /// device and reflected on before the lock is taken, so readers never see
    /// a half-initialized model. On failure the previous model stays live.
    pub fn load(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|e| BridgeError::LoadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
            source: Some(Box::new(e)),
        })?;
        let fingerprint = format!("{:x}", Sha256::digest(&bytes));

        let mut module = self
            .runtime
            .load(&bytes)
            .map_err(|e| BridgeError::LoadError {
                path: path.to_path_buf(),
                reason: e.to_string(),
                source: Some(Box::new(e)),
            })?;
        module.eval();

        let device = self.state.lock().device;
        place(module.as_mut(), device).map_err(|e| BridgeError::LoadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
            source: Some(Box::new(e)),
        })?;

        let table = Arc::new(DescriptorTable::build(module.as_mut()));

        let mut state = self.state.lock();
        if state.device != device {
            // use_gpu ran while we were loading
            if let Err(e) = place(module.as_mut(), state.device) {
                warn!("Could not move reloaded model to {}: {}", state.device, e);
            }
        }

        info!(
            "Loaded model {} ({} usable methods, {} on {}, sha256 {})",
            path.display(),
            table.available_methods().len(),
            self.runtime.name(),
            module.device(),
            &fingerprint[..12]
        );

        state.model = Some(LoadedModel {
            module,
            table,
            path: path.to_path_buf(),
            fingerprint,
        });
        state.last_path = Some(path.to_path_buf());
        Ok(())
    }

    /// Load again from the last successful path
    pub fn reload(&self) -> Result<()> {
        let path = self
            .state
            .lock()
            .last_path
            .clone()
            .ok_or_else(|| BridgeError::load(PathBuf::new(), "no model path recorded"))?;
        self.load(path)
    }

    pub fn is_loaded(&self) -> bool {
        self.state.lock().model.is_some()
    }

    /// Path of the live model
    pub fn model_path(&self) -> Option<PathBuf> {
        self.state.lock().model.as_ref().map(|m| m.path.clone())
    }

    /// SHA-256 of the live model's artifact
    pub fn fingerprint(&self) -> Option<String> {
        self.state
            .lock()
            .model
            .as_ref()
            .map(|m| m.fingerprint.clone())
    }

    /// Device of the live model, or the selected device when none is loaded
    pub fn device(&self) -> ComputeDevice {
        let state = self.state.lock();
        state
            .model
            .as_ref()
            .map(|m| m.module.device())
            .unwrap_or(state.device)
    }

    pub fn stats(&self) -> AdapterStats {
        AdapterStats {
            performs: self.performs.load(Ordering::Relaxed),
            faults: self.faults.load(Ordering::Relaxed),
        }
    }

    fn table(&self) -> Option<Arc<DescriptorTable>> {
        self.state.lock().model.as_ref().map(|m| Arc::clone(&m.table))
    }

    // ------------------------------------------------------------------------
    // Inference
    // ------------------------------------------------------------------------

    /// Run `method` on one feature vector
    ///
    /// No-op when nothing is loaded or the method is not usable. A fault
    /// leaves `output` untouched. `output` is resized only when the result
    /// length differs from its current length.
    pub fn perform(&self, input: &[f32], output: &mut Vec<f32>, method: &str) {
        let result = {
            let mut state = self.state.lock();
            let Some(loaded) = state.model.as_mut() else {
                return;
            };
            if loaded.table.method(method).is_none() {
                return;
            }
            let tensor = Tensor::from_feature_vector(input).to(loaded.module.device());
            loaded.module.invoke(method, vec![Value::Tensor(tensor)])
        };
        self.performs.fetch_add(1, Ordering::Relaxed);

        let tensor = match result {
            Ok(Value::Tensor(tensor)) => tensor,
            _ => {
                self.faults.fetch_add(1, Ordering::Relaxed);
                return;
            }
        };

        let result = tensor.to(ComputeDevice::Cpu).flatten();
        if output.len() != result.numel() {
            output.resize(result.numel(), 0.0);
        }
        output.copy_from_slice(result.data());
    }

    // ------------------------------------------------------------------------
    // Reflection
    // ------------------------------------------------------------------------

    /// Descriptor of a usable method
    pub fn get_method_params(&self, method: &str) -> Option<MethodDescriptor> {
        self.table().and_then(|t| t.method(method).copied())
    }

    /// Input and output labels of a usable method
    pub fn get_method_labels(&self, method: &str) -> Option<MethodLabels> {
        self.table().and_then(|t| t.labels(method).cloned())
    }

    /// Largest ratio declared by any usable method, at least 1
    pub fn get_higher_ratio(&self) -> usize {
        self.table().map(|t| t.higher_ratio()).unwrap_or(1)
    }

    pub fn get_available_methods(&self) -> Vec<String> {
        self.table()
            .map(|t| t.available_methods().to_vec())
            .unwrap_or_default()
    }

    /// Every named attribute of the model
    pub fn get_available_attributes(&self) -> Vec<String> {
        self.table()
            .map(|t| t.named_attributes().to_vec())
            .unwrap_or_default()
    }

    pub fn get_settable_attributes(&self) -> Vec<String> {
        self.table()
            .map(|t| t.settable_attributes().to_vec())
            .unwrap_or_default()
    }

    pub fn has_method(&self, name: &str) -> bool {
        self.table().map(|t| t.has_callable(name)).unwrap_or(false)
    }

    pub fn has_settable_attribute(&self, name: &str) -> bool {
        self.table()
            .map(|t| t.has_settable_attribute(name))
            .unwrap_or(false)
    }

    /// Call `get_<name>()` and normalize its result into an ordered list
    pub fn get_attribute(&self, name: &str) -> Result<Vec<Value>> {
        let getter = format!("get_{name}");
        let not_found = || BridgeError::AttributeNotFound {
            attribute: name.to_string(),
        };

        let mut state = self.state.lock();
        let loaded = state.model.as_mut().ok_or_else(not_found)?;
        if !loaded.table.has_callable(&getter) {
            return Err(not_found());
        }
        let value = loaded.module.invoke(&getter, Vec::new())?;
        Ok(value.into_items())
    }

    /// Render an attribute as space-separated text per its `_params` tags
    pub fn get_attribute_as_string(&self, name: &str) -> Result<String> {
        let descriptor = self
            .table()
            .and_then(|t| t.attribute(name).cloned())
            .ok_or_else(|| BridgeError::AttributeNotFound {
                attribute: name.to_string(),
            })?;
        let values = self.get_attribute(name)?;
        descriptor.format_values(&values)
    }

    /// Parse `args` per the attribute's tags and call `set_<name>(...)`
    ///
    /// The setter is not invoked unless every argument parses. Any failure,
    /// including a non-zero status from the setter, is a `SetAttributeError`.
    pub fn set_attribute<S: AsRef<str>>(&self, name: &str, args: &[S]) -> Result<()> {
        let setter = format!("set_{name}");
        let table = self
            .table()
            .ok_or_else(|| BridgeError::set_failed(name, "no model loaded"))?;
        if !table.has_callable(&setter) {
            return Err(BridgeError::set_failed(
                name,
                format!("setter for attribute {} not found in model", name),
            ));
        }
        let descriptor = table.attribute(name).ok_or_else(|| {
            BridgeError::set_failed(
                name,
                format!("parameters to set attribute {} not found in model", name),
            )
        })?;
        let inputs = descriptor.parse_args(args)?;

        let status = {
            let mut state = self.state.lock();
            match state.model.as_mut() {
                Some(loaded) if Arc::ptr_eq(&loaded.table, &table) => {
                    loaded.module.invoke(&setter, inputs)
                }
                _ => return Err(BridgeError::set_failed(name, "model was reloaded")),
            }
        };

        match status {
            Ok(Value::Int(0)) => {
                debug!("Set attribute {}", name);
                Ok(())
            }
            Ok(Value::Int(code)) => Err(BridgeError::set_failed(
                name,
                format!("setter returned {}", code),
            )),
            Ok(other) => Err(BridgeError::set_failed(
                name,
                format!("setter returned {} instead of a status", other.kind()),
            )),
            Err(e) => Err(BridgeError::set_failed(name, e.to_string())),
        }
    }

    // ------------------------------------------------------------------------
    // Device
    // ------------------------------------------------------------------------

    /// Move the model to an accelerator (when `enabled` and available) or to CPU
    ///
    /// Never fails: anything unsupported falls back to CPU.
    pub fn use_gpu(&self, enabled: bool) {
        let accelerator = if enabled { (self.detector)() } else { None };
        let target = accelerator.unwrap_or(ComputeDevice::Cpu);
        if enabled && !target.is_accelerator() {
            debug!("No accelerator available, staying on cpu");
        }

        let mut state = self.state.lock();
        state.device = target;
        if let Some(loaded) = state.model.as_mut() {
            if let Err(e) = place(loaded.module.as_mut(), target) {
                warn!("Could not move model to {}: {}", target, e);
            }
            info!("Sending model to {}", loaded.module.device());
        }
    }
}

/// Move a module to `device`, falling back to CPU when unsupported
fn place(module: &mut dyn ScriptModule, device: ComputeDevice) -> Result<()> {
    if module.supports_device(device) {
        if module.to_device(device).is_ok() {
            return Ok(());
        }
    } else {
        debug!("Model does not support {}, using cpu", device);
    }
    module.to_device(ComputeDevice::Cpu)
}
