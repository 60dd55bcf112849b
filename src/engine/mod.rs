//! Streaming Engine Module
//!
//! Host-rate streaming around a loaded model:
//! - Circular buffers per output channel
//! - The per-callback bridge protocol
//! - One-shot message mode
//! - Bridge configuration

pub mod bridge;
pub mod config;
pub mod message;
pub mod ring;

pub use bridge::{buffer_capacity, StreamingBridge};
pub use message::MessageBridge;
pub use config::{BridgeConfig, DEFAULT_BUFFER_SIZE, DEFAULT_METHOD};
pub use ring::{power_ceil, CircularBuffer};
