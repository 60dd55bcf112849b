//! CLI Command Implementations
//!
//! Implements the actual logic for each CLI command.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use hound::{SampleFormat, WavSpec, WavWriter};
use log::{info, warn};
use walkdir::WalkDir;

use crate::adapter::ModelAdapter;
use crate::engine::config::with_model_extension;
use crate::engine::{BridgeConfig, MessageBridge, StreamingBridge};
use crate::neural::{DemoModel, MODEL_EXTENSION};

/// Options of the `render` command
#[derive(Debug, Clone)]
pub struct RenderOptions {
    pub model: Option<PathBuf>,
    pub method: Option<String>,
    pub input: Vec<f32>,
    pub block_size: usize,
    pub blocks: usize,
    pub buffer_size: Option<usize>,
    pub sample_rate: u32,
    pub gpu: bool,
    pub assignments: Vec<String>,
    pub output: PathBuf,
}

/// Options of the `perform` command
#[derive(Debug, Clone)]
pub struct PerformOptions {
    pub model: Option<PathBuf>,
    pub method: Option<String>,
    pub input: Vec<f32>,
    pub gpu: bool,
    pub assignments: Vec<String>,
}

/// Build the bridge configuration from defaults, a config file and the environment
pub fn load_config(path: Option<&Path>) -> Result<BridgeConfig> {
    let config = match path {
        Some(path) => BridgeConfig::from_file(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?,
        None => BridgeConfig::default(),
    };
    Ok(config.with_env_overrides()?)
}

fn open_model(model: &Path) -> Result<ModelAdapter> {
    let path = with_model_extension(model);
    let adapter = ModelAdapter::new();
    adapter
        .load(&path)
        .with_context(|| format!("Failed to open model {}", path.display()))?;
    Ok(adapter)
}

/// Split `attr=v1,v2` into the attribute name and its values
pub fn parse_assignment(text: &str) -> Result<(String, Vec<String>)> {
    let Some((name, values)) = text.split_once('=') else {
        bail!("expected ATTR=VALUES, got '{}'", text);
    };
    let name = name.trim();
    if name.is_empty() {
        bail!("missing attribute name in '{}'", text);
    }
    let values = values.split(',').map(|v| v.trim().to_string()).collect();
    Ok((name.to_string(), values))
}

/// Print everything the model declares about itself.
pub fn inspect(model: &Path) -> Result<()> {
    info!("Inspecting model: {}", model.display());
    let adapter = open_model(model)?;

    if let Some(path) = adapter.model_path() {
        println!("Model: {}", path.display());
    }
    if let Some(fingerprint) = adapter.fingerprint() {
        println!("SHA-256: {}", fingerprint);
    }
    println!("Device: {}", adapter.device());
    println!("Higher ratio: {}", adapter.get_higher_ratio());

    println!("\n--- Methods ---");
    for method in adapter.get_available_methods() {
        let Some(params) = adapter.get_method_params(&method) else {
            continue;
        };
        println!(
            "{}: in {} (x{}) -> out {} (x{})",
            method, params.in_dim, params.in_ratio, params.out_dim, params.out_ratio
        );
        if let Some(labels) = adapter.get_method_labels(&method) {
            if !labels.inputs.is_empty() {
                println!("    inputs:  {}", labels.inputs.join(", "));
            }
            if !labels.outputs.is_empty() {
                println!("    outputs: {}", labels.outputs.join(", "));
            }
        }
    }

    println!("\n--- Attributes ---");
    let settable = adapter.get_settable_attributes();
    for attribute in adapter.get_available_attributes() {
        if settable.contains(&attribute) {
            match adapter.get_attribute_as_string(&attribute) {
                Ok(value) => println!("{} = {} (settable)", attribute, value),
                Err(e) => println!("{} (settable, unreadable: {})", attribute, e),
            }
        } else {
            println!("{}", attribute);
        }
    }

    Ok(())
}

/// Print one attribute as text.
pub fn get(model: &Path, attribute: &str) -> Result<()> {
    let adapter = open_model(model)?;
    let value = adapter
        .get_attribute_as_string(attribute)
        .with_context(|| format!("Failed to read attribute {}", attribute))?;
    println!("{}", value);
    Ok(())
}

/// Set one attribute on a fresh session and print the value read back.
pub fn set(model: &Path, attribute: &str, values: &[String]) -> Result<()> {
    info!("Setting {} to {:?}", attribute, values);
    let adapter = open_model(model)?;
    adapter
        .set_attribute(attribute, values)
        .with_context(|| format!("Failed to set attribute {}", attribute))?;
    println!("{} = {}", attribute, adapter.get_attribute_as_string(attribute)?);
    Ok(())
}

fn apply_assignments(adapter: &ModelAdapter, assignments: &[String]) -> Result<()> {
    for assignment in assignments {
        let (name, values) = parse_assignment(assignment)?;
        adapter
            .set_attribute(&name, &values)
            .with_context(|| format!("Failed to set attribute {}", name))?;
    }
    Ok(())
}

/// Run one message through the model and return the output vector.
pub fn perform_message(config: BridgeConfig, options: &PerformOptions) -> Result<Vec<f32>> {
    let mut config = config;
    if let Some(model) = &options.model {
        config.model_path = Some(model.clone());
    }
    if let Some(method) = &options.method {
        config.method = method.clone();
    }
    config.use_gpu |= options.gpu;

    let adapter = Arc::new(ModelAdapter::new());
    let mut bridge =
        MessageBridge::new(Arc::clone(&adapter), &config).context("Failed to open model")?;
    apply_assignments(&adapter, &options.assignments)?;

    let output = bridge.send(&options.input)?.to_vec();
    if adapter.stats().faults > 0 {
        bail!("method {} failed on this input", bridge.method());
    }
    Ok(output)
}

/// Print the output vector of one call, space separated.
pub fn perform(config: BridgeConfig, options: &PerformOptions) -> Result<()> {
    let output = perform_message(config, options)?;
    let text: Vec<String> = output.iter().map(|v| v.to_string()).collect();
    println!("{}", text.join(" "));
    Ok(())
}

/// Drive the streaming bridge block by block and write the result to a WAV file.
pub fn render(config: BridgeConfig, options: &RenderOptions) -> Result<()> {
    let mut config = config;
    if let Some(model) = &options.model {
        config.model_path = Some(model.clone());
    }
    if let Some(method) = &options.method {
        config.method = method.clone();
    }
    if let Some(buffer_size) = options.buffer_size {
        config.buffer_size = buffer_size;
    }
    config.use_gpu |= options.gpu;

    if options.block_size == 0 {
        bail!("block size must be at least 1");
    }

    let adapter = Arc::new(ModelAdapter::new());
    let mut bridge: StreamingBridge<f32> =
        StreamingBridge::new(Arc::clone(&adapter), &config).context("Failed to start bridge")?;

    apply_assignments(&adapter, &options.assignments)?;
    if !options.input.is_empty() {
        bridge.set_input(&options.input)?;
    }

    let channels = bridge.num_output_channels().max(1);
    let spec = WavSpec {
        channels: u16::try_from(channels).context("too many output channels")?,
        sample_rate: options.sample_rate,
        bits_per_sample: 32,
        sample_format: SampleFormat::Float,
    };
    let mut writer = WavWriter::create(&options.output, spec)
        .with_context(|| format!("Failed to create {}", options.output.display()))?;

    info!(
        "Rendering {} blocks of {} samples on {} channel(s) to {}",
        options.blocks,
        options.block_size,
        channels,
        options.output.display()
    );

    let mut channel_buffers = vec![vec![0.0_f32; options.block_size]; channels];
    let mut peak = 0.0_f32;
    for _ in 0..options.blocks {
        {
            let mut outputs: Vec<&mut [f32]> = channel_buffers
                .iter_mut()
                .map(|b| b.as_mut_slice())
                .collect();
            bridge.process(&mut outputs);
        }
        for frame in 0..options.block_size {
            for channel in &channel_buffers {
                let sample = channel[frame];
                peak = peak.max(sample.abs());
                writer.write_sample(sample)?;
            }
        }
    }
    writer.finalize().context("Failed to finalize WAV file")?;

    if !bridge.is_enabled() {
        warn!("Bridge disabled itself during rendering; output is silent");
    }

    let stats = adapter.stats();
    println!("Rendered: {}", options.output.display());
    println!(
        "Frames: {} | Channels: {} | Peak: {:.4}",
        options.blocks * options.block_size,
        channels,
        peak
    );
    println!(
        "Buffer: {} | Performs: {} | Faults: {}",
        bridge.buffer_size(),
        stats.performs,
        stats.faults
    );

    Ok(())
}

/// List model artifacts below `dir` with their usable methods.
pub fn scan(dir: &Path) -> Result<()> {
    info!("Scanning for models in: {}", dir.display());
    if !dir.is_dir() {
        bail!("{} is not a directory", dir.display());
    }

    let mut models: Vec<PathBuf> = WalkDir::new(dir)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| {
            entry
                .path()
                .extension()
                .map(|ext| ext == MODEL_EXTENSION)
                .unwrap_or(false)
        })
        .map(|entry| entry.path().to_path_buf())
        .collect();
    models.sort();

    if models.is_empty() {
        println!("No models found.");
        return Ok(());
    }

    for path in &models {
        let adapter = ModelAdapter::new().with_accelerator_detector(|| None);
        match adapter.load(path) {
            Ok(()) => println!(
                "{}: {}",
                path.display(),
                adapter.get_available_methods().join(", ")
            ),
            Err(e) => {
                warn!("Skipping {}: {}", path.display(), e);
                println!("{}: unreadable ({})", path.display(), e.error_code());
            }
        }
    }
    println!("{} model(s) found", models.len());

    Ok(())
}

/// Write one of the built-in demo artifacts.
pub fn demo(path: &Path, kind: &str) -> Result<()> {
    let demo: DemoModel = kind.parse().map_err(anyhow::Error::msg)?;
    let path = with_model_extension(path);
    demo.artifact()
        .write_to(&path)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    println!("Wrote {} model: {}", demo, path.display());
    Ok(())
}
