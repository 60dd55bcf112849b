//! nn-bridge - Streaming Bridge for Self-Describing Neural Models
//!
//! Hosts a neural model that runs at a coarse, block-based cadence inside a
//! sample-accurate audio stream. Two parts cooperate:
//! 1. Model Adapter - loads a model artifact, reflects on the methods and
//!    attributes it declares, runs inference and moves it between devices
//! 2. Streaming Buffer Bridge - power-of-two ring buffers that turn one model
//!    block per host callback into a continuous per-sample output
//!
//! # Architecture
//!
//! Models describe themselves through metadata attributes:
//! - `<method>_params` = [in_dim, in_ratio, out_dim, out_ratio]
//! - `<attribute>_params` = ordered type tags for `get_<attribute>` /
//!   `set_<attribute>`
//!
//! The audio thread owns a `StreamingBridge`; control threads share the
//! `ModelAdapter` through an `Arc`.

pub mod adapter;
pub mod cli;
pub mod engine;
pub mod error;
pub mod neural;

pub use adapter::{AdapterStats, ModelAdapter};
pub use engine::{BridgeConfig, MessageBridge, StreamingBridge};
pub use error::{BridgeError, Result};
