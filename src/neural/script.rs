//! nn-script artifacts and their CPU interpreter
//!
//! An artifact is a JSON document holding named attributes (reflection
//! metadata, weights, attribute state) and named methods. Methods are either
//! small op graphs over a `[batch, feature, time]` tensor, attribute getters and
//! setters, or constants (used for `get_methods` / `get_attributes`).

use super::device::ComputeDevice;
use super::module::{ModelRuntime, ScriptModule};
use super::tensor::{element_count, Tensor};
use super::value::Value;
use crate::error::{BridgeError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Format identifier embedded in every artifact
pub const SCRIPT_FORMAT: &str = "nn-script";

/// Current artifact version
pub const SCRIPT_VERSION: u32 = 1;

/// File extension for artifacts
pub const MODEL_EXTENSION: &str = "nnm";

/// Largest `upsample` factor an artifact may declare
pub const MAX_UPSAMPLE_FACTOR: usize = 1 << 16;

/// Largest tensor a graph may produce, in elements
pub const MAX_BLOCK_ELEMENTS: usize = 1 << 24;

/// Nonlinearities available to graphs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Activation {
    Tanh,
    Sigmoid,
    Relu,
}

impl Activation {
    #[inline]
    fn apply(&self, x: f32) -> f32 {
        match self {
            Activation::Tanh => x.tanh(),
            Activation::Sigmoid => 1.0 / (1.0 + (-x).exp()),
            Activation::Relu => x.max(0.0),
        }
    }
}

/// A scalar operand: a literal, or the first numeric value of an attribute
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Operand {
    Constant(f32),
    Attribute(String),
}

/// One step of a graph method
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Op {
    /// `y[o, t] = sum_f weight[o, f] * x[f, t] + bias[o]`
    Linear {
        weight: String,
        #[serde(default)]
        bias: Option<String>,
    },
    Scale { by: Operand },
    Offset { by: Operand },
    Activation { function: Activation },
    /// Repeat every time step `factor` times (sample-and-hold)
    Upsample { factor: usize },
    Clamp { min: f32, max: f32 },
}

impl Op {
    fn validate(&self, method: &str) -> Result<()> {
        let invalid = |reason: String| BridgeError::InvalidConfig {
            reason: format!("method '{}': {}", method, reason),
        };
        match self {
            Op::Clamp { min, max } if min.is_nan() || max.is_nan() || min > max => Err(invalid(
                format!("clamp bounds [{}, {}] are not an ordered range", min, max),
            )),
            Op::Upsample { factor } if *factor == 0 || *factor > MAX_UPSAMPLE_FACTOR => {
                Err(invalid(format!(
                    "upsample factor {} is outside 1..={}",
                    factor, MAX_UPSAMPLE_FACTOR
                )))
            }
            _ => Ok(()),
        }
    }
}

/// How a getter shapes its result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReturnShape {
    Scalar,
    List,
    #[default]
    Tuple,
}

/// Body of a named method
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MethodBody {
    Graph(Vec<Op>),
    Getter {
        attribute: String,
        #[serde(default)]
        shape: ReturnShape,
    },
    /// Stores its arguments; returns 0, or -1 when a value is out of range
    Setter {
        attribute: String,
        #[serde(default)]
        ranges: Vec<Option<[f64; 2]>>,
    },
    Constant(Value),
}

/// On-disk model description
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScriptArtifact {
    pub format: String,
    pub version: u32,
    #[serde(default)]
    pub attributes: BTreeMap<String, Value>,
    #[serde(default)]
    pub methods: BTreeMap<String, MethodBody>,
}

impl Default for ScriptArtifact {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptArtifact {
    pub fn new() -> Self {
        Self {
            format: SCRIPT_FORMAT.to_string(),
            version: SCRIPT_VERSION,
            attributes: BTreeMap::new(),
            methods: BTreeMap::new(),
        }
    }

    pub fn with_attribute(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.attributes.insert(name.to_string(), value.into());
        self
    }

    pub fn with_method(mut self, name: &str, body: MethodBody) -> Self {
        self.methods.insert(name.to_string(), body);
        self
    }

    /// Add a graph method together with its `<name>_params` descriptor
    pub fn with_graph_method(self, name: &str, params: [i64; 4], ops: Vec<Op>) -> Self {
        self.with_attribute(&format!("{name}_params"), int_list(&params))
            .with_method(name, MethodBody::Graph(ops))
    }

    /// Add a settable attribute: state, `<name>_params`, getter and setter
    pub fn with_settable(
        self,
        name: &str,
        tags: &[i64],
        initial: Value,
        shape: ReturnShape,
        ranges: Vec<Option<[f64; 2]>>,
    ) -> Self {
        self.with_attribute(name, initial)
            .with_attribute(&format!("{name}_params"), int_list(tags))
            .with_method(
                &format!("get_{name}"),
                MethodBody::Getter {
                    attribute: name.to_string(),
                    shape,
                },
            )
            .with_method(
                &format!("set_{name}"),
                MethodBody::Setter {
                    attribute: name.to_string(),
                    ranges,
                },
            )
    }

    /// Check format and version before building a model
    pub fn validate(&self) -> Result<()> {
        if self.format != SCRIPT_FORMAT {
            return Err(BridgeError::InvalidConfig {
                reason: format!("unknown artifact format '{}'", self.format),
            });
        }
        if self.version > SCRIPT_VERSION {
            return Err(BridgeError::InvalidConfig {
                reason: format!(
                    "artifact version {} is newer than supported version {}",
                    self.version, SCRIPT_VERSION
                ),
            });
        }
        for (name, body) in &self.methods {
            if let MethodBody::Graph(ops) = body {
                ops.iter().try_for_each(|op| op.validate(name))?;
            }
        }
        Ok(())
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Write the artifact as JSON
    pub fn write_to(&self, path: &Path) -> Result<()> {
        std::fs::write(path, self.to_json_pretty()?)?;
        Ok(())
    }
}

/// Build an int list value from a slice
pub fn int_list(values: &[i64]) -> Value {
    Value::List(values.iter().map(|&v| Value::Int(v)).collect())
}

/// Build a string list value from a slice
pub fn str_list(values: &[&str]) -> Value {
    Value::List(values.iter().map(|&v| Value::from(v)).collect())
}

/// A loaded nn-script model
#[derive(Debug)]
pub struct ScriptModel {
    attributes: BTreeMap<String, Value>,
    methods: BTreeMap<String, MethodBody>,
    device: ComputeDevice,
    training: bool,
}

impl ScriptModel {
    pub fn from_artifact(artifact: ScriptArtifact) -> Result<Self> {
        artifact.validate()?;
        Ok(Self {
            attributes: artifact.attributes,
            methods: artifact.methods,
            device: ComputeDevice::Cpu,
            training: true,
        })
    }

    pub fn is_training(&self) -> bool {
        self.training
    }

    fn operand(&self, method: &str, operand: &Operand) -> Result<f32> {
        match operand {
            Operand::Constant(v) => Ok(*v),
            Operand::Attribute(name) => self
                .attributes
                .get(name)
                .and_then(Value::first_float)
                .map(|v| v as f32)
                .ok_or_else(|| {
                    BridgeError::fault(method, format!("attribute '{}' is not numeric", name))
                }),
        }
    }

    fn weight(&self, method: &str, name: &str) -> Result<&Tensor> {
        self.attributes
            .get(name)
            .and_then(Value::as_tensor)
            .ok_or_else(|| BridgeError::fault(method, format!("missing weight tensor '{}'", name)))
    }

    fn run_graph(&self, method: &str, ops: &[Op], inputs: Vec<Value>) -> Result<Value> {
        let mut x = match <[Value; 1]>::try_from(inputs) {
            Ok([Value::Tensor(t)]) => t,
            Ok([other]) => {
                return Err(BridgeError::fault(
                    method,
                    format!("expected a tensor input, got {}", other.kind()),
                ))
            }
            Err(inputs) => {
                return Err(BridgeError::fault(
                    method,
                    format!("expected 1 input, got {}", inputs.len()),
                ))
            }
        };

        if x.device() != self.device {
            return Err(BridgeError::fault(
                method,
                format!(
                    "expected input on {}, found it on {}",
                    self.device,
                    x.device()
                ),
            ));
        }
        if x.shape().len() != 3 {
            return Err(BridgeError::fault(
                method,
                format!("expected a [batch, feature, time] input, got shape {:?}", x.shape()),
            ));
        }

        for op in ops {
            x = match op {
                Op::Linear { weight, bias } => {
                    let w = self.weight(method, weight)?;
                    let b = bias.as_deref().map(|b| self.weight(method, b)).transpose()?;
                    linear(method, &x, w, b)?
                }
                Op::Scale { by } => {
                    let k = self.operand(method, by)?;
                    map(x, |v| v * k)
                }
                Op::Offset { by } => {
                    let k = self.operand(method, by)?;
                    map(x, |v| v + k)
                }
                Op::Activation { function } => map(x, |v| function.apply(v)),
                Op::Upsample { factor } => upsample(method, &x, *factor)?,
                Op::Clamp { min, max } => map(x, |v| v.max(*min).min(*max)),
            };
        }

        Ok(Value::Tensor(x.to(self.device)))
    }

    fn run_setter(
        &mut self,
        method: &str,
        attribute: &str,
        ranges: &[Option<[f64; 2]>],
        inputs: Vec<Value>,
    ) -> Result<Value> {
        if !self.attributes.contains_key(attribute) {
            return Err(BridgeError::fault(
                method,
                format!("setter targets missing attribute '{}'", attribute),
            ));
        }

        for (index, value) in inputs.iter().enumerate() {
            if let Some(Some([min, max])) = ranges.get(index) {
                match value.as_float() {
                    Some(v) if v >= *min && v <= *max => {}
                    _ => return Ok(Value::Int(-1)),
                }
            }
        }

        self.attributes
            .insert(attribute.to_string(), Value::Tuple(inputs));
        Ok(Value::Int(0))
    }
}

fn map(mut x: Tensor, f: impl Fn(f32) -> f32) -> Tensor {
    x.data_mut().iter_mut().for_each(|v| *v = f(*v));
    x
}

fn linear(method: &str, x: &Tensor, w: &Tensor, b: Option<&Tensor>) -> Result<Tensor> {
    let (batch, features, time) = (x.shape()[0], x.shape()[1], x.shape()[2]);
    let (outputs, w_features) = match w.shape() {
        [o, f] => (*o, *f),
        other => {
            return Err(BridgeError::fault(
                method,
                format!("linear weight must be 2-D, got shape {:?}", other),
            ))
        }
    };
    if w_features != features {
        return Err(BridgeError::fault(
            method,
            format!(
                "linear expects {} input features, got {}",
                w_features, features
            ),
        ));
    }
    if let Some(b) = b {
        if b.numel() != outputs {
            return Err(BridgeError::fault(
                method,
                format!("bias has {} values for {} outputs", b.numel(), outputs),
            ));
        }
    }

    let (xd, wd) = (x.data(), w.data());
    let mut y = Tensor::zeros(vec![batch, outputs, time])
        .map_err(|e| BridgeError::fault(method, e.to_string()))?;
    let yd = y.data_mut();
    for n in 0..batch {
        for o in 0..outputs {
            let bias = b.map(|b| b.data()[o]).unwrap_or(0.0);
            for t in 0..time {
                let acc: f32 = (0..features)
                    .map(|f| wd[o * features + f] * xd[(n * features + f) * time + t])
                    .sum();
                yd[(n * outputs + o) * time + t] = acc + bias;
            }
        }
    }
    Ok(y)
}

fn upsample(method: &str, x: &Tensor, factor: usize) -> Result<Tensor> {
    if factor == 0 {
        return Err(BridgeError::fault(method, "upsample factor must be at least 1"));
    }
    let (batch, features, time) = (x.shape()[0], x.shape()[1], x.shape()[2]);
    let shape = time
        .checked_mul(factor)
        .map(|t| vec![batch, features, t])
        .filter(|shape| matches!(element_count(shape), Ok(n) if n <= MAX_BLOCK_ELEMENTS))
        .ok_or_else(|| {
            BridgeError::fault(
                method,
                format!("upsampling {} steps by {} exceeds the block limit", time, factor),
            )
        })?;
    let mut y = Tensor::zeros(shape).map_err(|e| BridgeError::fault(method, e.to_string()))?;
    let yd = y.data_mut();
    for (row, chunk) in x.data().chunks(time.max(1)).enumerate().take(batch * features) {
        for (t, &v) in chunk.iter().enumerate() {
            let start = row * time * factor + t * factor;
            yd[start..start + factor].fill(v);
        }
    }
    Ok(y)
}

impl ScriptModule for ScriptModel {
    fn method_names(&self) -> Vec<String> {
        self.methods.keys().cloned().collect()
    }

    fn has_method(&self, name: &str) -> bool {
        self.methods.contains_key(name)
    }

    fn attribute(&self, name: &str) -> Option<&Value> {
        self.attributes.get(name)
    }

    fn attribute_names(&self) -> Vec<String> {
        self.attributes.keys().cloned().collect()
    }

    fn invoke(&mut self, method: &str, inputs: Vec<Value>) -> Result<Value> {
        let body = self
            .methods
            .get(method)
            .cloned()
            .ok_or_else(|| BridgeError::MethodNotFound {
                method: method.to_string(),
            })?;

        match body {
            MethodBody::Graph(ops) => self.run_graph(method, &ops, inputs),
            MethodBody::Getter { attribute, shape } => {
                let items = self
                    .attributes
                    .get(&attribute)
                    .cloned()
                    .ok_or_else(|| {
                        BridgeError::fault(
                            method,
                            format!("getter targets missing attribute '{}'", attribute),
                        )
                    })?
                    .into_items();
                Ok(match shape {
                    ReturnShape::Scalar => items.into_iter().next().unwrap_or(Value::None),
                    ReturnShape::List => Value::List(items),
                    ReturnShape::Tuple => Value::Tuple(items),
                })
            }
            MethodBody::Setter { attribute, ranges } => {
                self.run_setter(method, &attribute, &ranges, inputs)
            }
            MethodBody::Constant(value) => Ok(value),
        }
    }

    fn eval(&mut self) {
        self.training = false;
    }

    fn device(&self) -> ComputeDevice {
        self.device
    }

    fn to_device(&mut self, device: ComputeDevice) -> Result<()> {
        self.attributes
            .values_mut()
            .for_each(|value| value.retag(device));
        self.device = device;
        Ok(())
    }
}

/// Loads `.nnm` artifacts
#[derive(Debug, Default, Clone, Copy)]
pub struct ScriptRuntime;

impl ModelRuntime for ScriptRuntime {
    fn name(&self) -> &str {
        SCRIPT_FORMAT
    }

    fn extension(&self) -> &str {
        MODEL_EXTENSION
    }

    fn load(&self, bytes: &[u8]) -> Result<Box<dyn ScriptModule>> {
        let artifact: ScriptArtifact = serde_json::from_slice(bytes)?;
        Ok(Box::new(ScriptModel::from_artifact(artifact)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model(artifact: ScriptArtifact) -> ScriptModel {
        ScriptModel::from_artifact(artifact).unwrap()
    }

    fn input(values: &[f32]) -> Vec<Value> {
        vec![Value::Tensor(Tensor::from_feature_vector(values))]
    }

    fn output(value: Value) -> Vec<f32> {
        match value {
            Value::Tensor(t) => t.into_vec(),
            other => panic!("expected tensor, got {:?}", other),
        }
    }

    #[test]
    fn test_eval_leaves_training_mode() {
        let mut m = model(ScriptArtifact::new());
        assert!(m.is_training());
        m.eval();
        assert!(!m.is_training());
    }

    #[test]
    fn test_linear_then_upsample() {
        let artifact = ScriptArtifact::new()
            .with_attribute("w", Tensor::new(vec![1.0, 2.0], vec![1, 2]).unwrap())
            .with_attribute("b", Tensor::new(vec![0.5], vec![1]).unwrap())
            .with_graph_method(
                "forward",
                [2, 1, 1, 4],
                vec![
                    Op::Linear {
                        weight: "w".to_string(),
                        bias: Some("b".to_string()),
                    },
                    Op::Upsample { factor: 4 },
                ],
            );
        let mut m = model(artifact);

        let y = output(m.invoke("forward", input(&[1.0, 1.0])).unwrap());
        assert_eq!(y, vec![3.5; 4]);
    }

    #[test]
    fn test_linear_shape_mismatch_faults() {
        let artifact = ScriptArtifact::new()
            .with_attribute("w", Tensor::new(vec![1.0, 2.0], vec![1, 2]).unwrap())
            .with_graph_method(
                "forward",
                [2, 1, 1, 1],
                vec![Op::Linear {
                    weight: "w".to_string(),
                    bias: None,
                }],
            );
        let mut m = model(artifact);

        let err = m.invoke("forward", input(&[1.0, 2.0, 3.0])).unwrap_err();
        assert_eq!(err.error_code(), "INFERENCE_FAULT");
    }

    #[test]
    fn test_scale_reads_attribute_state() {
        let artifact = ScriptArtifact::new()
            .with_settable(
                "gain",
                &[2],
                Value::Float(2.0),
                ReturnShape::Scalar,
                vec![Some([0.0, 4.0])],
            )
            .with_graph_method(
                "forward",
                [1, 1, 1, 1],
                vec![Op::Scale {
                    by: Operand::Attribute("gain".to_string()),
                }],
            );
        let mut m = model(artifact);

        assert_eq!(output(m.invoke("forward", input(&[1.5])).unwrap()), vec![3.0]);

        let status = m.invoke("set_gain", vec![Value::Float(0.5)]).unwrap();
        assert_eq!(status, Value::Int(0));
        assert_eq!(output(m.invoke("forward", input(&[1.5])).unwrap()), vec![0.75]);
        assert_eq!(m.invoke("get_gain", vec![]).unwrap(), Value::Float(0.5));

        let rejected = m.invoke("set_gain", vec![Value::Float(9.0)]).unwrap();
        assert_eq!(rejected, Value::Int(-1));
        assert_eq!(m.invoke("get_gain", vec![]).unwrap(), Value::Float(0.5));
    }

    #[test]
    fn test_device_mismatch_faults() {
        let artifact = ScriptArtifact::new().with_graph_method(
            "forward",
            [1, 1, 1, 1],
            vec![Op::Activation {
                function: Activation::Relu,
            }],
        );
        let mut m = model(artifact);
        m.to_device(ComputeDevice::Cuda).unwrap();

        let cpu_input = input(&[-1.0]);
        assert!(m.invoke("forward", cpu_input).is_err());

        let gpu_input = vec![Value::Tensor(
            Tensor::from_feature_vector(&[-1.0]).to(ComputeDevice::Cuda),
        )];
        let y = m.invoke("forward", gpu_input).unwrap();
        assert_eq!(y.as_tensor().unwrap().device(), ComputeDevice::Cuda);
    }

    #[test]
    fn test_unordered_clamp_is_rejected() {
        for (min, max) in [(1.0, -1.0), (f32::NAN, 1.0), (-1.0, f32::NAN)] {
            let artifact = ScriptArtifact::new().with_graph_method(
                "forward",
                [1, 1, 1, 1],
                vec![Op::Clamp { min, max }],
            );
            assert!(artifact.validate().is_err(), "[{}, {}] accepted", min, max);
        }
    }

    #[test]
    fn test_clamp_limits_output() {
        let artifact = ScriptArtifact::new().with_graph_method(
            "forward",
            [1, 1, 1, 1],
            vec![Op::Clamp {
                min: -0.5,
                max: 0.5,
            }],
        );
        let mut m = model(artifact);
        assert_eq!(output(m.invoke("forward", input(&[2.0])).unwrap()), vec![0.5]);
        assert_eq!(output(m.invoke("forward", input(&[-2.0])).unwrap()), vec![-0.5]);
    }

    #[test]
    fn test_upsample_factor_limits() {
        for factor in [0, MAX_UPSAMPLE_FACTOR + 1, 1 << 40] {
            let artifact = ScriptArtifact::new().with_graph_method(
                "forward",
                [1, 1, 1, 1],
                vec![Op::Upsample { factor }],
            );
            assert!(artifact.validate().is_err(), "factor {} accepted", factor);
        }
    }

    #[test]
    fn test_oversized_upsample_faults() {
        let x = Tensor::from_feature_vector(&[1.0; 4]);
        assert!(upsample("forward", &x, 1 << 62).is_err());
        assert!(upsample("forward", &x, usize::MAX).is_err());

        let y = upsample("forward", &x, MAX_UPSAMPLE_FACTOR).unwrap();
        assert_eq!(y.numel(), 4 * MAX_UPSAMPLE_FACTOR);
    }

    #[test]
    fn test_runtime_rejects_unknown_format() {
        let mut artifact = ScriptArtifact::new();
        artifact.format = "torchscript".to_string();
        let bytes = serde_json::to_vec(&artifact).unwrap();
        assert!(ScriptRuntime.load(&bytes).is_err());
    }

    #[test]
    fn test_artifact_json_roundtrip_and_eval() {
        let artifact = ScriptArtifact::new()
            .with_method("get_methods", MethodBody::Constant(str_list(&["forward"])))
            .with_graph_method("forward", [1, 1, 1, 2], vec![Op::Upsample { factor: 2 }]);
        let json = artifact.to_json_pretty().unwrap();

        let mut module = ScriptRuntime.load(json.as_bytes()).unwrap();
        assert!(module.has_method("forward"));
        assert_eq!(
            module.invoke("get_methods", vec![]).unwrap(),
            str_list(&["forward"])
        );
        module.eval();
    }
}
