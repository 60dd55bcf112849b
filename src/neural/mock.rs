//! Demo model artifacts
//!
//! These models don't carry trained weights but exercise the whole reflection
//! convention, so hosts and tests can drive the bridge without an external
//! toolchain. The CLI `demo` command writes them to disk.

use super::script::{
    int_list, str_list, Activation, MethodBody, Op, Operand, ReturnShape, ScriptArtifact,
};
use super::tensor::Tensor;
use super::value::Value;
use std::fmt;
use std::str::FromStr;

/// Latent size of the demo decoder
pub const DECODER_LATENT_DIM: usize = 8;

/// Samples produced per decoder invocation
pub const DECODER_OUT_RATIO: usize = 512;

/// Which demo artifact to build
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DemoModel {
    /// 8-dim latent to a 512-sample block, with self-reported enumeration
    Decoder,
    /// 1-in/1-out gain stage with several settable attributes, discovered by scan
    Gain,
}

impl DemoModel {
    pub fn artifact(&self) -> ScriptArtifact {
        match self {
            DemoModel::Decoder => decoder_artifact(),
            DemoModel::Gain => gain_artifact(),
        }
    }
}

impl fmt::Display for DemoModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DemoModel::Decoder => write!(f, "decoder"),
            DemoModel::Gain => write!(f, "gain"),
        }
    }
}

impl FromStr for DemoModel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "decoder" => Ok(DemoModel::Decoder),
            "gain" => Ok(DemoModel::Gain),
            other => Err(format!("unknown demo model '{}' (expected decoder or gain)", other)),
        }
    }
}

/// Latent decoder: `forward` = [8, 1, 1, 512]
///
/// Averages the latent vector, squashes it with tanh, scales by `amplitude`
/// and holds the result for 512 samples.
pub fn decoder_artifact() -> ScriptArtifact {
    let weight = Tensor::row(&[1.0 / DECODER_LATENT_DIM as f32; DECODER_LATENT_DIM]);

    let labels: Vec<String> = (0..DECODER_LATENT_DIM)
        .map(|i| format!("latent {}", i))
        .collect();
    let labels: Vec<&str> = labels.iter().map(String::as_str).collect();

    ScriptArtifact::new()
        .with_attribute("decoder_weight", weight)
        .with_attribute("decoder_bias", Tensor::row(&[0.0]))
        .with_graph_method(
            "forward",
            [
                DECODER_LATENT_DIM as i64,
                1,
                1,
                DECODER_OUT_RATIO as i64,
            ],
            vec![
                Op::Linear {
                    weight: "decoder_weight".to_string(),
                    bias: Some("decoder_bias".to_string()),
                },
                Op::Activation {
                    function: Activation::Tanh,
                },
                Op::Scale {
                    by: Operand::Attribute("amplitude".to_string()),
                },
                Op::Upsample {
                    factor: DECODER_OUT_RATIO,
                },
            ],
        )
        .with_attribute("forward_input_labels", str_list(&labels))
        .with_attribute("forward_output_labels", str_list(&["audio"]))
        .with_settable(
            "amplitude",
            &[2],
            Value::Float(1.0),
            ReturnShape::Scalar,
            vec![Some([0.0, 1.0])],
        )
        .with_method("get_methods", MethodBody::Constant(str_list(&["forward"])))
        .with_method(
            "get_attributes",
            MethodBody::Constant(str_list(&["amplitude"])),
        )
}

/// Gain stage: `forward` = [1, 1, 1, 1], `double` = [1, 1, 1, 2]
///
/// Settable attributes cover every type tag and return shape:
/// `gain` (float, scalar), `bypass` (bool, list), `steps` (int, tuple),
/// `mode` (string, scalar) and `window` (int + float + string, tuple).
pub fn gain_artifact() -> ScriptArtifact {
    ScriptArtifact::new()
        .with_graph_method(
            "forward",
            [1, 1, 1, 1],
            vec![
                Op::Scale {
                    by: Operand::Attribute("gain".to_string()),
                },
                Op::Clamp {
                    min: -1.0,
                    max: 1.0,
                },
            ],
        )
        .with_graph_method(
            "double",
            [1, 1, 1, 2],
            vec![
                Op::Scale {
                    by: Operand::Attribute("gain".to_string()),
                },
                Op::Upsample { factor: 2 },
            ],
        )
        .with_settable(
            "gain",
            &[2],
            Value::Float(1.0),
            ReturnShape::Scalar,
            vec![Some([0.0, 4.0])],
        )
        .with_settable(
            "bypass",
            &[0],
            Value::List(vec![Value::Bool(false)]),
            ReturnShape::List,
            Vec::new(),
        )
        .with_settable(
            "steps",
            &[1],
            Value::Tuple(vec![Value::Int(16)]),
            ReturnShape::Tuple,
            vec![Some([1.0, 1024.0])],
        )
        .with_settable(
            "mode",
            &[3],
            Value::from("linear"),
            ReturnShape::Scalar,
            Vec::new(),
        )
        .with_settable(
            "window",
            &[1, 2, 3],
            Value::Tuple(vec![Value::Int(512), Value::Float(0.25), Value::from("hann")]),
            ReturnShape::Tuple,
            Vec::new(),
        )
        .with_attribute("version", int_list(&[1, 0]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::neural::module::ScriptModule;
    use crate::neural::script::ScriptModel;

    #[test]
    fn test_demo_models_validate() {
        for demo in [DemoModel::Decoder, DemoModel::Gain] {
            assert!(demo.artifact().validate().is_ok(), "{} invalid", demo);
        }
    }

    #[test]
    fn test_decoder_holds_one_value_per_block() {
        let mut model = ScriptModel::from_artifact(decoder_artifact()).unwrap();
        let out = model
            .invoke(
                "forward",
                vec![Value::Tensor(Tensor::from_feature_vector(&[0.5; 8]))],
            )
            .unwrap();
        let data = out.as_tensor().unwrap().data().to_vec();

        assert_eq!(data.len(), DECODER_OUT_RATIO);
        assert!(data.iter().all(|&v| (v - 0.5_f32.tanh()).abs() < 1e-6));
    }

    #[test]
    fn test_demo_model_from_str() {
        assert_eq!("Gain".parse::<DemoModel>(), Ok(DemoModel::Gain));
        assert!("vocoder".parse::<DemoModel>().is_err());
    }
}
