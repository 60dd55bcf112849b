//! Compute device selection and accelerator detection
//!
//! Detects available accelerator hardware so the adapter can migrate a model
//! off the CPU when asked to. Detection never fails; no accelerator simply
//! means CPU.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::process::Command;
use std::str::FromStr;

/// Environment variable that overrides accelerator detection (`cuda`, `mps`, `none`)
pub const ACCELERATOR_ENV: &str = "NN_BRIDGE_ACCELERATOR";

/// Backend a model's parameters reside on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComputeDevice {
    #[default]
    Cpu,
    /// NVIDIA accelerator
    Cuda,
    /// Apple Metal Performance Shaders
    Mps,
}

impl ComputeDevice {
    pub fn is_accelerator(&self) -> bool {
        !matches!(self, ComputeDevice::Cpu)
    }
}

impl fmt::Display for ComputeDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cpu => write!(f, "cpu"),
            Self::Cuda => write!(f, "cuda"),
            Self::Mps => write!(f, "mps"),
        }
    }
}

impl FromStr for ComputeDevice {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "cpu" => Ok(Self::Cpu),
            "cuda" | "gpu" => Ok(Self::Cuda),
            "mps" | "metal" => Ok(Self::Mps),
            other => Err(format!("unknown compute device '{}'", other)),
        }
    }
}

/// Selects an accelerator, or `None` when only the CPU is usable
pub type AcceleratorDetector = Box<dyn Fn() -> Option<ComputeDevice> + Send + Sync>;

/// Information about a detected NVIDIA GPU
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GpuInfo {
    /// GPU name/model
    pub name: String,
    /// Total VRAM in GB
    pub vram_total_gb: f32,
    /// Available/free VRAM in GB
    pub vram_available_gb: f32,
    /// Driver version
    pub driver_version: String,
}

impl GpuInfo {
    /// Detect an NVIDIA GPU using nvidia-smi
    pub fn detect() -> Option<Self> {
        let output = Command::new("nvidia-smi")
            .args([
                "--query-gpu=name,memory.total,memory.free,driver_version",
                "--format=csv,noheader,nounits",
            ])
            .output()
            .ok()?;

        if !output.status.success() {
            return None;
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        Self::parse_query_line(stdout.lines().next()?)
    }

    fn parse_query_line(line: &str) -> Option<Self> {
        let parts: Vec<&str> = line.split(',').map(|s| s.trim()).collect();
        if parts.len() < 4 {
            return None;
        }

        let vram_total_mb: f32 = parts[1].parse().ok()?;
        let vram_free_mb: f32 = parts[2].parse().ok()?;

        Some(Self {
            name: parts[0].to_string(),
            vram_total_gb: vram_total_mb / 1024.0,
            vram_available_gb: vram_free_mb / 1024.0,
            driver_version: parts[3].to_string(),
        })
    }
}

fn mps_available() -> bool {
    cfg!(all(target_os = "macos", target_arch = "aarch64"))
}

/// Pick the preferred accelerator: CUDA first, then MPS
///
/// `NN_BRIDGE_ACCELERATOR` short-circuits detection.
pub fn detect_accelerator() -> Option<ComputeDevice> {
    if let Ok(forced) = std::env::var(ACCELERATOR_ENV) {
        return match forced.parse::<ComputeDevice>() {
            Ok(ComputeDevice::Cpu) => None,
            Ok(device) => Some(device),
            Err(_) => None,
        };
    }

    if GpuInfo::detect().is_some() {
        Some(ComputeDevice::Cuda)
    } else if mps_available() {
        Some(ComputeDevice::Mps)
    } else {
        None
    }
}

/// Get a human-readable summary of accelerator status
pub fn device_status_summary() -> String {
    match GpuInfo::detect() {
        Some(gpu) => format!(
            "GPU: {}\nVRAM: {:.1}GB total, {:.1}GB available\nDriver: {}",
            gpu.name, gpu.vram_total_gb, gpu.vram_available_gb, gpu.driver_version
        ),
        None if mps_available() => "Apple MPS available".to_string(),
        None => "No compatible accelerator detected. Models will run on CPU.".to_string(),
    }
}
