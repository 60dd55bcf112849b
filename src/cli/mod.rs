//! CLI Module
//!
//! Command-line interface for inspecting and driving nn-script models.

pub mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// nn-bridge - run self-describing neural models as streaming audio sources
#[derive(Parser, Debug)]
#[command(name = "nn-bridge")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// JSON bridge configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Show methods, ratios, labels and attributes of a model
    #[command(name = "inspect")]
    Inspect {
        /// Model artifact (`.nnm` is appended when missing)
        model: PathBuf,
    },

    /// Print the current value of an attribute
    #[command(name = "get")]
    Get {
        /// Model artifact
        model: PathBuf,

        /// Attribute name
        attribute: String,
    },

    /// Set an attribute for this session and print the result
    #[command(name = "set")]
    Set {
        /// Model artifact
        model: PathBuf,

        /// Attribute name
        attribute: String,

        /// One value per declared type tag
        #[arg(required = true, allow_hyphen_values = true)]
        values: Vec<String>,
    },

    /// Run a method once on one feature vector and print the output vector
    #[command(name = "perform")]
    Perform {
        /// Model artifact (falls back to the configured model)
        model: Option<PathBuf>,

        /// Method to run
        #[arg(short, long)]
        method: Option<String>,

        /// Input feature vector, comma separated
        #[arg(
            short,
            long,
            required = true,
            value_delimiter = ',',
            allow_hyphen_values = true
        )]
        input: Vec<f32>,

        /// Run on an accelerator when available
        #[arg(long)]
        gpu: bool,

        /// Attribute assignment applied before the call (attr=v1,v2)
        #[arg(long = "set", value_name = "ATTR=VALUES")]
        assignments: Vec<String>,
    },

    /// Stream a model through the bridge offline into a WAV file
    #[command(name = "render")]
    Render {
        /// Model artifact (falls back to the configured model)
        model: Option<PathBuf>,

        /// Method to run on every block
        #[arg(short, long)]
        method: Option<String>,

        /// Input feature vector, comma separated
        #[arg(short, long, value_delimiter = ',', allow_hyphen_values = true)]
        input: Vec<f32>,

        /// Host callback length in samples
        #[arg(long, default_value_t = 512)]
        block_size: usize,

        /// Number of host callbacks to render
        #[arg(long, default_value_t = 64)]
        blocks: usize,

        /// Requested ring buffer size (0 = model ratio)
        #[arg(long)]
        buffer_size: Option<usize>,

        /// Output sample rate written to the WAV header
        #[arg(long, default_value_t = 48000)]
        sample_rate: u32,

        /// Run on an accelerator when available
        #[arg(long)]
        gpu: bool,

        /// Attribute assignment applied before rendering (attr=v1,v2)
        #[arg(long = "set", value_name = "ATTR=VALUES")]
        assignments: Vec<String>,

        /// Output WAV path
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Find model artifacts under a directory
    #[command(name = "scan")]
    Scan {
        /// Directory to walk
        dir: PathBuf,
    },

    /// Write a demo model artifact
    #[command(name = "demo")]
    Demo {
        /// Output path (`.nnm` is appended when missing)
        path: PathBuf,

        /// Which demo model (decoder or gain)
        #[arg(short, long, default_value = "decoder")]
        kind: String,
    },
}
