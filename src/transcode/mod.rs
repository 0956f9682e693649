//! Audio transcoding module
//!
//! This module handles on-the-fly audio transcoding for streaming:
//! - Audio decoder initialization from source streams
//! - Sample format / rate negotiation against encoder capabilities
//! - Format conversion and re-chunking through a filter graph
//! - Encoder initialization for the target container's default codec
//! - The pull-driven pipeline and its async byte-stream wrapper

pub mod channel;
pub mod decoder;
pub mod encoder;
pub mod filter;
pub mod negotiate;
pub mod pipeline;

pub use channel::{spawn_audio_stream, spawn_audio_stream_to};
pub use pipeline::{AudioStream, AudioStreamOptions, DecodeStatus};
