//! Method and attribute descriptor tables
//!
//! Everything the adapter needs to know about a model's reflection metadata
//! is read once, right after the model is deserialized, and kept in a
//! `DescriptorTable`. Later dispatch is a table lookup plus a tag match.

use super::parsing::{parse_bool, parse_float, parse_int};
use crate::error::{BridgeError, Result};
use crate::neural::{ScriptModule, Value};
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

/// Method that self-reports usable method names
pub const ENUMERATE_METHODS: &str = "get_methods";

/// Method that self-reports settable attribute names
pub const ENUMERATE_ATTRIBUTES: &str = "get_attributes";

/// Suffix of reflection metadata entries
pub const PARAMS_SUFFIX: &str = "_params";

/// Block shape of a method: feature dimensions and host-sample ratios
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodDescriptor {
    pub in_dim: usize,
    pub in_ratio: usize,
    pub out_dim: usize,
    pub out_ratio: usize,
}

impl MethodDescriptor {
    /// Read `[in_dim, in_ratio, out_dim, out_ratio]`; rejects other lengths and negatives
    pub fn from_params(params: &[i64]) -> Option<Self> {
        let values: Vec<usize> = params
            .iter()
            .map(|&v| usize::try_from(v).ok())
            .collect::<Option<_>>()?;
        match values.as_slice() {
            &[in_dim, in_ratio, out_dim, out_ratio] => Some(Self {
                in_dim,
                in_ratio,
                out_dim,
                out_ratio,
            }),
            _ => None,
        }
    }

    #[inline]
    pub fn max_ratio(&self) -> usize {
        self.in_ratio.max(self.out_ratio)
    }
}

/// Human-readable names for a method's inputs and outputs
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MethodLabels {
    pub inputs: Vec<String>,
    pub outputs: Vec<String>,
}

/// Type of one positional attribute value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TypeTag {
    Bool,
    Int,
    Float,
    String,
    /// A tag id outside the convention; fails when used
    Unrecognized(i64),
}

impl TypeTag {
    pub fn from_id(id: i64) -> Self {
        match id {
            0 => TypeTag::Bool,
            1 => TypeTag::Int,
            2 => TypeTag::Float,
            3 => TypeTag::String,
            other => TypeTag::Unrecognized(other),
        }
    }

    pub fn id(&self) -> i64 {
        match self {
            TypeTag::Bool => 0,
            TypeTag::Int => 1,
            TypeTag::Float => 2,
            TypeTag::String => 3,
            TypeTag::Unrecognized(id) => *id,
        }
    }
}

/// Name and ordered type tags of a reflected attribute
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeDescriptor {
    pub name: String,
    pub tags: Vec<TypeTag>,
}

impl AttributeDescriptor {
    pub fn new(name: &str, tag_ids: &[i64]) -> Self {
        Self {
            name: name.to_string(),
            tags: tag_ids.iter().map(|&id| TypeTag::from_id(id)).collect(),
        }
    }

    fn mismatch(&self, index: usize, reason: String) -> BridgeError {
        BridgeError::TypeMismatch {
            attribute: self.name.clone(),
            index,
            reason,
        }
    }

    /// Render getter output as space-separated text, one token per tag
    pub fn format_values(&self, values: &[Value]) -> Result<String> {
        let mut parts = Vec::with_capacity(self.tags.len());
        for (index, tag) in self.tags.iter().enumerate() {
            let value = values.get(index).ok_or_else(|| {
                self.mismatch(index, format!("getter returned only {} values", values.len()))
            })?;
            let text = match (tag, value) {
                (TypeTag::Bool, Value::Bool(b)) => b.to_string(),
                (TypeTag::Int, Value::Int(i)) => i.to_string(),
                (TypeTag::Float, v) if v.as_float().is_some() => {
                    let f = v.as_float().unwrap_or_default() as f32;
                    f.to_string()
                }
                (TypeTag::String, Value::Str(s)) => s.clone(),
                (TypeTag::Unrecognized(id), _) => {
                    return Err(self.mismatch(index, format!("bad type id {}", id)))
                }
                (tag, value) => {
                    return Err(self.mismatch(
                        index,
                        format!("expected {:?}, getter returned {}", tag, value.kind()),
                    ))
                }
            };
            parts.push(text);
        }
        Ok(parts.join(" "))
    }

    /// Parse positional text arguments into setter inputs
    ///
    /// # Errors
    /// `SetAttributeError` on an arity mismatch, an unparsable value or an
    /// unrecognized tag.
    pub fn parse_args<S: AsRef<str>>(&self, args: &[S]) -> Result<Vec<Value>> {
        if args.len() != self.tags.len() {
            return Err(BridgeError::set_failed(
                &self.name,
                format!("expected {} arguments, got {}", self.tags.len(), args.len()),
            ));
        }

        self.tags
            .iter()
            .zip(args)
            .enumerate()
            .map(|(index, (tag, arg))| {
                let arg = arg.as_ref();
                let parsed = match tag {
                    TypeTag::Bool => parse_bool(arg).map(Value::Bool),
                    TypeTag::Int => parse_int(arg).map(Value::Int),
                    TypeTag::Float => parse_float(arg).map(Value::Float),
                    TypeTag::String => Some(Value::Str(arg.to_string())),
                    TypeTag::Unrecognized(id) => {
                        return Err(BridgeError::set_failed(
                            &self.name,
                            format!("bad type id {} at index {}", id, index),
                        ))
                    }
                };
                parsed.ok_or_else(|| {
                    BridgeError::set_failed(
                        &self.name,
                        format!("cannot parse '{}' as {:?} at index {}", arg, tag, index),
                    )
                })
            })
            .collect()
    }
}

/// Reflection metadata of one loaded model
#[derive(Debug, Clone, Default)]
pub struct DescriptorTable {
    callables: BTreeSet<String>,
    available_methods: Vec<String>,
    methods: HashMap<String, MethodDescriptor>,
    labels: HashMap<String, MethodLabels>,
    named_attributes: Vec<String>,
    settable_attributes: Vec<String>,
    attributes: HashMap<String, AttributeDescriptor>,
}

impl DescriptorTable {
    /// Read all reflection metadata from a freshly loaded module
    ///
    /// Enumeration methods are preferred; when they are missing or return
    /// something other than a string list, names are found by scanning for a
    /// co-located `_params` entry.
    pub fn build(module: &mut dyn ScriptModule) -> Self {
        let callables: BTreeSet<String> = module.method_names().into_iter().collect();
        let named_attributes = module.attribute_names();

        let available_methods = enumerate(module, ENUMERATE_METHODS).unwrap_or_else(|| {
            callables
                .iter()
                .filter(|m| has_params(&*module, m))
                .cloned()
                .collect()
        });

        let settable_attributes = enumerate(module, ENUMERATE_ATTRIBUTES).unwrap_or_else(|| {
            named_attributes
                .iter()
                .filter(|a| has_params(&*module, a))
                .cloned()
                .collect()
        });

        let mut methods = HashMap::new();
        let mut labels = HashMap::new();
        for name in &available_methods {
            if !callables.contains(name) {
                debug!("Method {} is reported but not callable, skipping", name);
                continue;
            }
            let Some(descriptor) = read_params(&*module, name)
                .and_then(|p| MethodDescriptor::from_params(&p))
            else {
                debug!("Method {} has no usable {}{}, skipping", name, name, PARAMS_SUFFIX);
                continue;
            };
            labels.insert(name.clone(), read_labels(&*module, name, &descriptor));
            methods.insert(name.clone(), descriptor);
        }

        let attributes = named_attributes
            .iter()
            .filter_map(|n| n.strip_suffix(PARAMS_SUFFIX))
            .chain(settable_attributes.iter().map(String::as_str))
            .filter_map(|name| {
                read_params(&*module, name).map(|tags| {
                    (name.to_string(), AttributeDescriptor::new(name, &tags))
                })
            })
            .collect();

        Self {
            callables,
            available_methods,
            methods,
            labels,
            named_attributes,
            settable_attributes,
            attributes,
        }
    }

    /// Build a table directly from method descriptors
    pub fn from_methods<I>(methods: I) -> Self
    where
        I: IntoIterator<Item = (String, MethodDescriptor)>,
    {
        let methods: HashMap<String, MethodDescriptor> = methods.into_iter().collect();
        let mut available_methods: Vec<String> = methods.keys().cloned().collect();
        available_methods.sort();
        Self {
            callables: available_methods.iter().cloned().collect(),
            available_methods,
            methods,
            ..Self::default()
        }
    }

    /// Descriptor of a usable method
    pub fn method(&self, name: &str) -> Option<&MethodDescriptor> {
        self.methods.get(name)
    }

    pub fn labels(&self, name: &str) -> Option<&MethodLabels> {
        self.labels.get(name)
    }

    /// Descriptor of an attribute with `_params` metadata
    pub fn attribute(&self, name: &str) -> Option<&AttributeDescriptor> {
        self.attributes.get(name)
    }

    /// Whether the model declares a callable with this name
    pub fn has_callable(&self, name: &str) -> bool {
        self.callables.contains(name)
    }

    pub fn has_settable_attribute(&self, name: &str) -> bool {
        self.settable_attributes.iter().any(|a| a == name)
    }

    pub fn available_methods(&self) -> &[String] {
        &self.available_methods
    }

    pub fn named_attributes(&self) -> &[String] {
        &self.named_attributes
    }

    pub fn settable_attributes(&self) -> &[String] {
        &self.settable_attributes
    }

    /// Largest ratio over usable methods, at least 1
    pub fn higher_ratio(&self) -> usize {
        self.methods
            .values()
            .map(MethodDescriptor::max_ratio)
            .fold(1, usize::max)
    }
}

fn enumerate(module: &mut dyn ScriptModule, method: &str) -> Option<Vec<String>> {
    if !module.has_method(method) {
        return None;
    }
    match module.invoke(method, Vec::new()) {
        Ok(value) => value.as_string_list(),
        Err(e) => {
            debug!("{} failed ({}), falling back to scan", method, e);
            None
        }
    }
}

fn has_params(module: &dyn ScriptModule, name: &str) -> bool {
    module.attribute(&format!("{name}{PARAMS_SUFFIX}")).is_some()
}

fn read_params(module: &dyn ScriptModule, name: &str) -> Option<Vec<i64>> {
    module
        .attribute(&format!("{name}{PARAMS_SUFFIX}"))
        .and_then(Value::as_int_vec)
}

fn read_labels(module: &dyn ScriptModule, method: &str, descriptor: &MethodDescriptor) -> MethodLabels {
    let read = |suffix: &str, count: usize, fallback: &str| -> Vec<String> {
        let declared = module
            .attribute(&format!("{method}_{suffix}"))
            .and_then(Value::as_string_list)
            .unwrap_or_default();
        (0..count)
            .map(|i| {
                declared
                    .get(i)
                    .cloned()
                    .unwrap_or_else(|| format!("{} {}", fallback, i))
            })
            .collect()
    };

    MethodLabels {
        inputs: read("input_labels", descriptor.in_dim, "model input"),
        outputs: read("output_labels", descriptor.out_dim, "model output"),
    }
}
