//! Loaded model interface
//!
//! Defines what the adapter needs from a loaded model and from the runtime
//! that produces it. The adapter never looks inside a module; it reflects on
//! method and attribute names and invokes methods by name.

use super::device::ComputeDevice;
use super::value::Value;
use crate::error::Result;

/// A loaded, self-describing model
pub trait ScriptModule: Send {
    /// Names of all callable methods
    fn method_names(&self) -> Vec<String>;

    fn has_method(&self, name: &str) -> bool {
        self.method_names().iter().any(|m| m == name)
    }

    /// Look up a named attribute (metadata arrays, weights, state)
    fn attribute(&self, name: &str) -> Option<&Value>;

    /// Names of all attributes
    fn attribute_names(&self) -> Vec<String>;

    /// Invoke a method by name
    ///
    /// # Errors
    /// `MethodNotFound` for an unknown name, `InferenceFault` when the
    /// method itself fails.
    fn invoke(&mut self, method: &str, inputs: Vec<Value>) -> Result<Value>;

    /// Switch to inference-only mode
    fn eval(&mut self);

    fn device(&self) -> ComputeDevice;

    /// Whether this module can be placed on `device`
    fn supports_device(&self, _device: ComputeDevice) -> bool {
        true
    }

    /// Migrate all parameters to `device`
    fn to_device(&mut self, device: ComputeDevice) -> Result<()>;
}

/// Deserializes artifacts into modules
pub trait ModelRuntime: Send + Sync {
    /// Runtime name (e.g. "nn-script")
    fn name(&self) -> &str;

    /// Default artifact extension, without the dot
    fn extension(&self) -> &str;

    /// Build a module from raw artifact bytes
    fn load(&self, bytes: &[u8]) -> Result<Box<dyn ScriptModule>>;
}
