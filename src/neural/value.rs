//! Tagged values passed to and returned from model methods

use super::device::ComputeDevice;
use super::tensor::Tensor;
use serde::{Deserialize, Serialize};

/// A value a model method accepts or returns
///
/// In artifacts these serialize externally tagged, e.g. `{"int": 3}`,
/// `{"tuple": [{"float": 0.5}, {"str": "hann"}]}` or `"none"`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Value {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<Value>),
    Tuple(Vec<Value>),
    Tensor(Tensor),
}

impl Value {
    /// Short name of the variant, for error messages
    pub fn kind(&self) -> &'static str {
        match self {
            Value::None => "none",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "str",
            Value::List(_) => "list",
            Value::Tuple(_) => "tuple",
            Value::Tensor(_) => "tensor",
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Float view; ints widen the way a numeric getter would
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_tensor(&self) -> Option<&Tensor> {
        match self {
            Value::Tensor(t) => Some(t),
            _ => None,
        }
    }

    /// First numeric scalar, looking through lists and tuples
    pub fn first_float(&self) -> Option<f64> {
        match self {
            Value::List(items) | Value::Tuple(items) => items.first().and_then(Value::first_float),
            Value::Tensor(t) => t.data().first().map(|&v| v as f64),
            other => other.as_float(),
        }
    }

    /// Normalize list, tuple or bare-scalar shapes into one ordered list
    pub fn into_items(self) -> Vec<Value> {
        match self {
            Value::List(items) | Value::Tuple(items) => items,
            other => vec![other],
        }
    }

    /// Integer array view of metadata stored as an int list or an integral tensor
    pub fn as_int_vec(&self) -> Option<Vec<i64>> {
        match self {
            Value::List(items) | Value::Tuple(items) => items.iter().map(Value::as_int).collect(),
            Value::Tensor(t) => t
                .data()
                .iter()
                .map(|&v| (v.fract() == 0.0).then_some(v as i64))
                .collect(),
            _ => None,
        }
    }

    pub fn as_string_list(&self) -> Option<Vec<String>> {
        match self {
            Value::List(items) | Value::Tuple(items) => items
                .iter()
                .map(|v| v.as_str().map(str::to_string))
                .collect(),
            _ => None,
        }
    }

    /// Re-tag every tensor reachable from this value
    pub(crate) fn retag(&mut self, device: ComputeDevice) {
        match self {
            Value::Tensor(t) => t.set_device(device),
            Value::List(items) | Value::Tuple(items) => {
                items.iter_mut().for_each(|v| v.retag(device))
            }
            _ => {}
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

impl From<Tensor> for Value {
    fn from(v: Tensor) -> Self {
        Value::Tensor(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_into_items_normalizes_shapes() {
        assert_eq!(Value::Int(3).into_items(), vec![Value::Int(3)]);
        assert_eq!(
            Value::Tuple(vec![Value::Int(1), Value::Bool(true)]).into_items(),
            vec![Value::Int(1), Value::Bool(true)]
        );
        assert_eq!(Value::List(vec![]).into_items(), vec![]);
    }

    #[test]
    fn test_int_vec_from_list_and_tensor() {
        let list = Value::List(vec![Value::Int(8), Value::Int(1), Value::Int(1), Value::Int(512)]);
        assert_eq!(list.as_int_vec(), Some(vec![8, 1, 1, 512]));

        let tensor = Value::Tensor(Tensor::new(vec![2.0, 0.0], vec![2]).unwrap());
        assert_eq!(tensor.as_int_vec(), Some(vec![2, 0]));

        let fractional = Value::Tensor(Tensor::new(vec![0.5], vec![1]).unwrap());
        assert_eq!(fractional.as_int_vec(), None);
    }

    #[test]
    fn test_serde_shape() {
        let v: Value = serde_json::from_str(r#"{"tuple":[{"float":0.5},{"str":"hann"},"none"]}"#).unwrap();
        assert_eq!(
            v,
            Value::Tuple(vec![Value::Float(0.5), Value::from("hann"), Value::None])
        );
    }
}
