//! Minimal dense tensor exchanged with loaded models
//!
//! Row-major `f32` storage plus a shape and a device tag. Moving a tensor
//! between devices is a placement change the runtime honors when it executes.

use super::device::ComputeDevice;
use crate::error::{BridgeError, Result};
use serde::{Deserialize, Serialize};

/// Serialized form of a tensor (device is never persisted)
#[derive(Debug, Clone, Serialize, Deserialize)]
struct TensorRepr {
    shape: Vec<usize>,
    data: Vec<f32>,
}

/// Dense row-major tensor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "TensorRepr", into = "TensorRepr")]
pub struct Tensor {
    shape: Vec<usize>,
    data: Vec<f32>,
    device: ComputeDevice,
}

impl TryFrom<TensorRepr> for Tensor {
    type Error = String;

    fn try_from(repr: TensorRepr) -> std::result::Result<Self, Self::Error> {
        Tensor::new(repr.data, repr.shape).map_err(|e| e.to_string())
    }
}

impl From<Tensor> for TensorRepr {
    fn from(tensor: Tensor) -> Self {
        TensorRepr {
            shape: tensor.shape,
            data: tensor.data,
        }
    }
}

/// Number of elements in `shape`, or `InvalidInput` when it overflows
pub fn element_count(shape: &[usize]) -> Result<usize> {
    shape
        .iter()
        .try_fold(1usize, |acc, &dim| acc.checked_mul(dim))
        .ok_or_else(|| BridgeError::InvalidInput {
            reason: format!("tensor shape {:?} is too large", shape),
        })
}

impl Tensor {
    /// Create a CPU tensor, checking that `data` fills `shape` exactly
    pub fn new(data: Vec<f32>, shape: Vec<usize>) -> Result<Self> {
        let expected = element_count(&shape)?;
        if expected != data.len() {
            return Err(BridgeError::InvalidInput {
                reason: format!(
                    "tensor shape {:?} needs {} values, got {}",
                    shape,
                    expected,
                    data.len()
                ),
            });
        }
        Ok(Self {
            shape,
            data,
            device: ComputeDevice::Cpu,
        })
    }

    /// Pack a feature vector as a (batch=1, feature=n, time=1) block
    pub fn from_feature_vector(values: &[f32]) -> Self {
        Self {
            shape: vec![1, values.len(), 1],
            data: values.to_vec(),
            device: ComputeDevice::Cpu,
        }
    }

    /// Single-row (1, n) matrix
    pub fn row(values: &[f32]) -> Self {
        Self {
            shape: vec![1, values.len()],
            data: values.to_vec(),
            device: ComputeDevice::Cpu,
        }
    }

    pub fn zeros(shape: Vec<usize>) -> Result<Self> {
        let len = element_count(&shape)?;
        Ok(Self {
            shape,
            data: vec![0.0; len],
            device: ComputeDevice::Cpu,
        })
    }

    #[inline]
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    #[inline]
    pub fn data(&self) -> &[f32] {
        &self.data
    }

    #[inline]
    pub fn data_mut(&mut self) -> &mut [f32] {
        &mut self.data
    }

    #[inline]
    pub fn numel(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn device(&self) -> ComputeDevice {
        self.device
    }

    /// Move the tensor to `device`
    pub fn to(mut self, device: ComputeDevice) -> Self {
        self.device = device;
        self
    }

    pub(crate) fn set_device(&mut self, device: ComputeDevice) {
        self.device = device;
    }

    /// Collapse all dimensions into one
    pub fn flatten(mut self) -> Self {
        self.shape = vec![self.data.len()];
        self
    }

    pub fn into_vec(self) -> Vec<f32> {
        self.data
    }
}
