//! Media probing and streaming audio transcoding for a music server
//!
//! Probes arbitrary containers for playable tracks and cover art, and
//! re-encodes a selected audio stream (optionally trimmed to a time window)
//! into a target container, delivering the bytes to a caller-supplied sink
//! as they are produced.

pub mod config;
pub mod error;
pub(crate) mod ffmpeg_utils;
pub mod media;
pub mod transcode;

#[cfg(test)]
pub(crate) mod tests;

pub use config::{Config, LoggingConfig, TranscodeConfig};
pub use error::{ErrorKind, FfmpegError, MediaError, Result};
pub use ffmpeg_utils::version_info as ffmpeg_version_info;
pub use ffmpeg_utils::{init, install_log_bridge, map_log_level};
pub use media::{probe, try_probe, ImageInfo, MediaInfo, TrackInfo};
pub use transcode::negotiate::{choose_sample_format, choose_sample_rate};
pub use transcode::{
    spawn_audio_stream, spawn_audio_stream_to, AudioStream, AudioStreamOptions, DecodeStatus,
};
