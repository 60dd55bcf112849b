//! Streaming Buffer Bridge
//!
//! Turns a model that produces a block per invocation into a continuous
//! per-sample stream at host cadence. Each host callback runs the model once,
//! pushes its block into the channel-0 ring and drains exactly one callback's
//! worth of samples from every output ring.
//!
//! The bridge is owned by the audio thread. Control-plane requests (reload,
//! attribute changes, device switches) go through the shared `ModelAdapter`.

use super::config::BridgeConfig;
use super::ring::{power_ceil, CircularBuffer};
use crate::adapter::{MethodDescriptor, MethodLabels, ModelAdapter};
use crate::error::{BridgeError, Result};
use log::{info, warn};
use num_traits::{AsPrimitive, Zero};
use std::sync::Arc;

/// Ring capacity for a requested size: next power of two covering both the
/// request and the model's highest ratio. A request of 0 uses the ratio alone.
pub fn buffer_capacity(requested: usize, higher_ratio: usize) -> usize {
    power_ceil(requested.max(higher_ratio))
}

/// Load the configured model into `adapter` and apply the device choice
pub(crate) fn load_configured(adapter: &ModelAdapter, config: &BridgeConfig) -> Result<()> {
    config.validate()?;
    let path = config.resolved_model_path()?;
    adapter.load(&path)?;
    adapter.use_gpu(config.use_gpu);
    Ok(())
}

/// Reject feature vectors of the wrong length or with non-finite values
pub(crate) fn check_input(values: &[f32], in_dim: usize) -> Result<()> {
    if values.len() != in_dim {
        return Err(BridgeError::InvalidInput {
            reason: format!(
                "input message dims don't match model input dims ({} != {})",
                values.len(),
                in_dim
            ),
        });
    }
    if let Some(index) = values.iter().position(|v| !v.is_finite()) {
        return Err(BridgeError::InvalidInput {
            reason: format!("value at index {} is not finite", index),
        });
    }
    Ok(())
}

/// Host-facing streaming wrapper around one model method
///
/// `S` is the host sample type (`f32` or `f64`).
pub struct StreamingBridge<S = f32> {
    adapter: Arc<ModelAdapter>,
    method: String,
    descriptor: MethodDescriptor,
    labels: MethodLabels,
    settable_attributes: Vec<String>,
    higher_ratio: usize,
    buffer_size: usize,
    enabled: bool,
    input: Vec<f32>,
    output: Vec<f32>,
    out_buffers: Vec<CircularBuffer<f32, S>>,
}

impl<S> StreamingBridge<S>
where
    S: Copy + Zero + 'static,
    f32: AsPrimitive<S>,
{
    /// Load the configured model and size the output rings
    ///
    /// # Errors
    /// `InvalidConfig` without a model path, `LoadError` when the model
    /// can't be loaded, `MethodNotFound` when the configured method isn't
    /// usable.
    pub fn new(adapter: Arc<ModelAdapter>, config: &BridgeConfig) -> Result<Self> {
        load_configured(&adapter, config)?;
        Self::from_loaded(adapter, config)
    }

    /// Build a bridge around an adapter that already holds a model
    pub fn from_loaded(adapter: Arc<ModelAdapter>, config: &BridgeConfig) -> Result<Self> {
        config.validate()?;
        let method = config.method.clone();
        let higher_ratio = adapter.get_higher_ratio();
        let descriptor =
            adapter
                .get_method_params(&method)
                .ok_or_else(|| BridgeError::MethodNotFound {
                    method: method.clone(),
                })?;
        let labels = adapter.get_method_labels(&method).unwrap_or_default();
        let settable_attributes = adapter.get_settable_attributes();

        let buffer_size = buffer_capacity(config.buffer_size, higher_ratio);
        if config.buffer_size != 0 && config.buffer_size < higher_ratio {
            warn!(
                "Buffer size {} is smaller than the model ratio {}, switching to {}",
                config.buffer_size, higher_ratio, buffer_size
            );
        }

        let out_buffers = (0..descriptor.out_dim)
            .map(|_| CircularBuffer::with_capacity(buffer_size))
            .collect();

        info!(
            "Bridge ready: method {} [{} x{} -> {} x{}], buffer {}",
            method,
            descriptor.in_dim,
            descriptor.in_ratio,
            descriptor.out_dim,
            descriptor.out_ratio,
            buffer_size
        );

        Ok(Self {
            adapter,
            method,
            descriptor,
            labels,
            settable_attributes,
            higher_ratio,
            buffer_size,
            enabled: config.enabled,
            input: vec![0.0; descriptor.in_dim],
            output: Vec::new(),
            out_buffers,
        })
    }

    /// Replace the input feature vector used on every callback
    pub fn set_input(&mut self, values: &[f32]) -> Result<()> {
        check_input(values, self.descriptor.in_dim)?;
        self.input.copy_from_slice(values);
        Ok(())
    }

    /// Run one host callback: every slice in `outputs` is one channel of L frames
    pub fn process(&mut self, outputs: &mut [&mut [S]]) {
        let frames = outputs.iter().map(|ch| ch.len()).min().unwrap_or(0);

        if !self.enabled || !self.adapter.is_loaded() {
            fill_with_zero(outputs);
            return;
        }

        if frames > self.buffer_size {
            warn!(
                "Vector size ({}) larger than buffer size ({}), disabling model",
                frames, self.buffer_size
            );
            self.enabled = false;
            fill_with_zero(outputs);
            return;
        }

        self.adapter
            .perform(&self.input, &mut self.output, &self.method);

        if let Some(first) = self.out_buffers.first_mut() {
            first.put(&self.output);
        }

        for (channel, out) in outputs.iter_mut().enumerate() {
            let out = &mut out[..frames];
            match self.out_buffers.get_mut(channel) {
                Some(ring) => ring.get(out),
                None => out.fill(S::zero()),
            }
        }
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

    pub fn input(&self) -> &[f32] {
        &self.input
    }

    pub fn input_labels(&self) -> &[String] {
        &self.labels.inputs
    }

    pub fn output_labels(&self) -> &[String] {
        &self.labels.outputs
    }

    pub fn settable_attributes(&self) -> &[String] {
        &self.settable_attributes
    }

    pub fn has_settable_attribute(&self, name: &str) -> bool {
        self.settable_attributes.iter().any(|a| a == name)
    }

    /// Ring capacity in samples
    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    pub fn higher_ratio(&self) -> usize {
        self.higher_ratio
    }

    pub fn num_output_channels(&self) -> usize {
        self.out_buffers.len()
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }
}

fn fill_with_zero<S: Copy + Zero>(outputs: &mut [&mut [S]]) {
    for channel in outputs.iter_mut() {
        channel.fill(S::zero());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::neural::mock::{decoder_artifact, gain_artifact};
    use crate::neural::ScriptArtifact;
    use approx::assert_relative_eq;

    fn bridge_for<S>(
        artifact: &ScriptArtifact,
        config: BridgeConfig,
    ) -> (tempfile::TempDir, StreamingBridge<S>)
    where
        S: Copy + Zero + 'static,
        f32: AsPrimitive<S>,
    {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.nnm");
        artifact.write_to(&path).unwrap();

        let adapter = Arc::new(ModelAdapter::new().with_accelerator_detector(|| None));
        let config = BridgeConfig {
            model_path: Some(path),
            ..config
        };
        let bridge = StreamingBridge::new(adapter, &config).unwrap();
        (dir, bridge)
    }

    #[test]
    fn test_decoder_block_per_callback() {
        let (_dir, mut bridge) =
            bridge_for::<f32>(&decoder_artifact(), BridgeConfig::default().with_buffer_size(400));
        assert_eq!(bridge.higher_ratio(), 512);
        assert_eq!(bridge.buffer_size(), 512);
        assert_eq!(bridge.input(), &[0.0; 8]);

        bridge.set_input(&[0.5; 8]).unwrap();
        let mut left = vec![0.0_f32; 512];
        bridge.process(&mut [left.as_mut_slice()]);

        for sample in left {
            assert_relative_eq!(sample, 0.5_f32.tanh(), epsilon = 1e-6);
        }
        assert_eq!(bridge.adapter().stats().performs, 1);
    }

    #[test]
    fn test_short_blocks_warm_up_with_zeros() {
        let (_dir, mut bridge) =
            bridge_for::<f64>(&gain_artifact(), BridgeConfig::default().with_buffer_size(8));
        assert_eq!(bridge.buffer_size(), 8);

        bridge.set_input(&[0.5]).unwrap();
        let mut out = vec![9.0_f64; 4];
        bridge.process(&mut [out.as_mut_slice()]);

        assert_relative_eq!(out[0], 0.5);
        assert_eq!(&out[1..], &[0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_extra_host_channels_are_silent() {
        let (_dir, mut bridge) = bridge_for::<f32>(&decoder_artifact(), BridgeConfig::default());
        assert_eq!(bridge.num_output_channels(), 1);
        bridge.set_input(&[1.0; 8]).unwrap();

        let mut left = vec![0.0_f32; 256];
        let mut right = vec![1.0_f32; 256];
        bridge.process(&mut [left.as_mut_slice(), right.as_mut_slice()]);

        assert!(left.iter().all(|&s| s > 0.0));
        assert!(right.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_disabled_bridge_zero_fills() {
        let (_dir, mut bridge) = bridge_for::<f32>(&gain_artifact(), BridgeConfig::default());
        bridge.set_input(&[0.5]).unwrap();
        bridge.set_enabled(false);

        let mut out = vec![1.0_f32; 16];
        bridge.process(&mut [out.as_mut_slice()]);

        assert!(out.iter().all(|&s| s == 0.0));
        assert_eq!(bridge.adapter().stats().performs, 0);
    }

    #[test]
    fn test_oversized_callback_disables() {
        let (_dir, mut bridge) =
            bridge_for::<f32>(&decoder_artifact(), BridgeConfig::default().with_buffer_size(0));
        assert_eq!(bridge.buffer_size(), 512);

        let mut out = vec![1.0_f32; 1024];
        bridge.process(&mut [out.as_mut_slice()]);

        assert!(!bridge.is_enabled());
        assert!(out.iter().all(|&s| s == 0.0));

        let mut out = vec![1.0_f32; 64];
        bridge.process(&mut [out.as_mut_slice()]);
        assert!(out.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_set_input_validation() {
        let (_dir, mut bridge) = bridge_for::<f32>(&decoder_artifact(), BridgeConfig::default());

        assert!(matches!(
            bridge.set_input(&[0.0; 3]),
            Err(BridgeError::InvalidInput { .. })
        ));
        let mut input = [0.0; 8];
        input[5] = f32::NAN;
        assert!(bridge.set_input(&input).is_err());
        assert_eq!(bridge.input(), &[0.0; 8]);
    }

    #[test]
    fn test_unknown_method_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.nnm");
        gain_artifact().write_to(&path).unwrap();

        let adapter = Arc::new(ModelAdapter::new().with_accelerator_detector(|| None));
        let config = BridgeConfig::new(&path).with_method("encode");
        let result = StreamingBridge::<f32>::new(adapter, &config);
        assert!(matches!(result, Err(BridgeError::MethodNotFound { .. })));
    }

    #[test]
    fn test_cached_metadata() {
        let (_dir, bridge) = bridge_for::<f32>(&decoder_artifact(), BridgeConfig::default());
        assert_eq!(bridge.input_labels().len(), 8);
        assert_eq!(bridge.output_labels(), &["audio".to_string()]);
        assert!(bridge.has_settable_attribute("amplitude"));
        assert!(!bridge.has_settable_attribute("decoder_weight"));
    }

    #[test]
    fn test_buffer_capacity() {
        assert_eq!(buffer_capacity(400, 512), 512);
        assert_eq!(buffer_capacity(4096, 512), 4096);
        assert_eq!(buffer_capacity(3000, 1), 4096);
        assert_eq!(buffer_capacity(0, 512), 512);
        assert_eq!(buffer_capacity(0, 1), 1);
        assert_eq!(buffer_capacity(100, 300), 512);
    }
}
