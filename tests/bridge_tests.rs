//! Streaming Bridge Tests
//!
//! End-to-end host callback behavior: block sizing, continuity across
//! callbacks and control-plane activity alongside the audio thread.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use approx::assert_relative_eq;
use pretty_assertions::assert_eq;

use nn_bridge::neural::mock::{decoder_artifact, gain_artifact};
use nn_bridge::neural::ScriptArtifact;
use nn_bridge::{BridgeConfig, BridgeError, MessageBridge, ModelAdapter, StreamingBridge};

fn write_model(dir: &tempfile::TempDir, artifact: &ScriptArtifact) -> PathBuf {
    let path = dir.path().join("model.nnm");
    artifact.write_to(&path).unwrap();
    path
}

fn cpu_adapter() -> Arc<ModelAdapter> {
    Arc::new(ModelAdapter::new().with_accelerator_detector(|| None))
}

#[test]
fn test_decoder_scenario_rounds_buffer_to_ratio() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_model(&dir, &decoder_artifact());
    let config = BridgeConfig::new(&path).with_buffer_size(400);
    let mut bridge: StreamingBridge = StreamingBridge::new(cpu_adapter(), &config).unwrap();

    assert_eq!(bridge.buffer_size(), 512);
    assert_eq!(bridge.descriptor().in_dim, 8);

    // every callback runs the model; short callbacks still read a steady stream
    bridge.set_input(&[0.5; 8]).unwrap();
    let mut stream = Vec::new();
    let mut block = vec![0.0_f32; 128];
    for _ in 0..4 {
        bridge.process(&mut [block.as_mut_slice()]);
        stream.extend_from_slice(&block);
    }

    assert_eq!(stream.len(), 512);
    for sample in &stream {
        assert_relative_eq!(*sample, 0.5_f32.tanh(), epsilon = 1e-6);
    }
}

#[test]
fn test_extension_is_appended() {
    let dir = tempfile::tempdir().unwrap();
    write_model(&dir, &gain_artifact());
    let config = BridgeConfig::new(dir.path().join("model"));

    let bridge = StreamingBridge::<f32>::new(cpu_adapter(), &config).unwrap();
    assert_eq!(
        bridge.adapter().model_path(),
        Some(dir.path().join("model.nnm"))
    );
}

#[test]
fn test_missing_model_is_a_load_error() {
    let dir = tempfile::tempdir().unwrap();
    let config = BridgeConfig::new(dir.path().join("nothing"));
    let result = StreamingBridge::<f32>::new(cpu_adapter(), &config);
    assert!(matches!(result, Err(BridgeError::LoadError { .. })));

    let result = StreamingBridge::<f32>::new(cpu_adapter(), &BridgeConfig::default());
    assert!(matches!(result, Err(BridgeError::InvalidConfig { .. })));
}

#[test]
fn test_bridge_over_preloaded_adapter() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_model(&dir, &gain_artifact());
    let adapter = cpu_adapter();
    adapter.load(&path).unwrap();

    let config = BridgeConfig::default().with_method("double").with_buffer_size(16);
    let mut bridge = StreamingBridge::<f64>::from_loaded(Arc::clone(&adapter), &config).unwrap();
    assert_eq!(bridge.method(), "double");

    bridge.set_enabled(false);
    let mut out = vec![0.5_f64; 4];
    bridge.process(&mut [out.as_mut_slice()]);
    assert_eq!(out, vec![0.0; 4]);

    bridge.set_enabled(true);
    bridge.set_input(&[0.5]).unwrap();
    bridge.process(&mut [out.as_mut_slice()]);
    assert_eq!(out, vec![0.5, 0.5, 0.0, 0.0]);
}

#[test]
fn test_attribute_change_reaches_stream() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_model(&dir, &decoder_artifact());
    let adapter = cpu_adapter();
    let mut bridge: StreamingBridge =
        StreamingBridge::new(Arc::clone(&adapter), &BridgeConfig::new(&path)).unwrap();
    bridge.set_input(&[1.0; 8]).unwrap();

    let mut block = vec![0.0_f32; 512];
    bridge.process(&mut [block.as_mut_slice()]);
    assert_relative_eq!(block[0], 1.0_f32.tanh(), epsilon = 1e-6);

    adapter.set_attribute("amplitude", &["0.5"]).unwrap();
    bridge.process(&mut [block.as_mut_slice()]);
    assert_relative_eq!(block[511], 0.5 * 1.0_f32.tanh(), epsilon = 1e-6);
}

#[test]
fn test_message_mode_shares_adapter_with_stream() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_model(&dir, &decoder_artifact());
    let adapter = cpu_adapter();
    let mut messages =
        MessageBridge::new(Arc::clone(&adapter), &BridgeConfig::new(&path)).unwrap();

    let output = messages.send(&[1.0; 8]).unwrap();
    assert_eq!(output.len(), 512);
    assert_relative_eq!(output[0], 1.0_f32.tanh(), epsilon = 1e-6);

    adapter.set_attribute("amplitude", &["0.5"]).unwrap();
    let output = messages.send(&[1.0; 8]).unwrap();
    assert_relative_eq!(output[511], 0.5 * 1.0_f32.tanh(), epsilon = 1e-6);

    let result = messages.send(&[1.0; 3]);
    assert!(matches!(result, Err(BridgeError::InvalidInput { .. })));
    assert_eq!(adapter.stats().performs, 2);
}

#[test]
fn test_control_thread_alongside_audio_thread() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_model(&dir, &decoder_artifact());
    let adapter = cpu_adapter();
    let mut bridge: StreamingBridge =
        StreamingBridge::new(Arc::clone(&adapter), &BridgeConfig::new(&path)).unwrap();
    bridge.set_input(&[0.25; 8]).unwrap();

    let running = Arc::new(AtomicBool::new(true));
    let control = {
        let adapter = Arc::clone(&adapter);
        let running = Arc::clone(&running);
        thread::spawn(move || {
            let mut round = 0_u32;
            while running.load(Ordering::Relaxed) {
                let amplitude = format!("{}", (round % 10) as f32 / 10.0);
                // a reload may win the race; that only rejects the set
                let _ = adapter.set_attribute("amplitude", &[amplitude]);
                if round % 7 == 0 {
                    adapter.reload().unwrap();
                }
                if round % 11 == 0 {
                    adapter.use_gpu(round % 2 == 0);
                }
                round += 1;
            }
        })
    };

    let mut left = vec![0.0_f32; 256];
    let mut right = vec![0.0_f32; 256];
    for _ in 0..200 {
        bridge.process(&mut [left.as_mut_slice(), right.as_mut_slice()]);
        assert!(left.iter().all(|s| s.is_finite() && s.abs() <= 1.0));
        assert!(right.iter().all(|&s| s == 0.0));
    }

    running.store(false, Ordering::Relaxed);
    control.join().unwrap();
    assert!(bridge.is_enabled());
    assert_eq!(adapter.stats().faults, 0);
}
