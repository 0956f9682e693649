//! FFmpeg module - provides wrappers and utilities for FFmpeg library access
//!
//! This module handles:
//! - FFmpeg initialization
//! - Bridging FFmpeg's log output into `tracing`
//! - Custom AVIOContext for callback-based writing
//! - Timebase conversion and other utilities

pub mod helpers;
pub mod io;
pub mod utils;

pub use ffmpeg_next as ffmpeg;
#[allow(unused_imports)]
pub use utils::*;

use tracing::Level;

/// Initialize the FFmpeg library.
///
/// Safe to call more than once; the first call does the work.
pub fn init() -> Result<(), crate::error::FfmpegError> {
    ffmpeg::init().map_err(|e| {
        crate::error::FfmpegError::InitFailed(format!("ffmpeg::init() failed: {}", e))
    })?;

    tracing::debug!("FFmpeg initialized");

    Ok(())
}

const AV_LOG_ERROR: i32 = ffmpeg::ffi::AV_LOG_ERROR as i32;
const AV_LOG_WARNING: i32 = ffmpeg::ffi::AV_LOG_WARNING as i32;
const AV_LOG_INFO: i32 = ffmpeg::ffi::AV_LOG_INFO as i32;
const AV_LOG_VERBOSE: i32 = ffmpeg::ffi::AV_LOG_VERBOSE as i32;
const AV_LOG_DEBUG: i32 = ffmpeg::ffi::AV_LOG_DEBUG as i32;

/// Map an FFmpeg log severity onto a `tracing` level.
///
/// FFmpeg's DEBUG and TRACE output is dropped entirely.
pub fn map_log_level(av_level: i32) -> Option<Level> {
    if av_level >= AV_LOG_DEBUG {
        None
    } else if av_level >= AV_LOG_VERBOSE {
        Some(Level::TRACE)
    } else if av_level >= AV_LOG_INFO {
        Some(Level::DEBUG)
    } else if av_level >= AV_LOG_WARNING {
        Some(Level::WARN)
    } else {
        Some(Level::ERROR)
    }
}

/// Install the FFmpeg log callback that forwards engine messages to `tracing`
/// under the `ffmpeg` target.
///
/// **Safety & Ordering:** Must be called after `init()` and before any threading begins,
/// because altering the global log callback is not thread-safe.
pub fn install_log_bridge() {
    // SAFETY: both functions modify global FFmpeg state and are safe to call
    // after `ffmpeg::init()`.  They are called exactly once at startup before
    // any pipeline threads exist.
    unsafe {
        ffmpeg::ffi::av_log_set_level(AV_LOG_VERBOSE);
        ffmpeg::ffi::av_log_set_callback(Some(ffmpeg_log_callback));
    }
}

/// Benign notices caused by writing to a non-seekable callback sink.
const SUPPRESSED_MESSAGES: &[&str] = &[
    "unable to rewrite FLAC header",
    "Could not update timestamps for skipped samples",
    "Could not update timestamps for discarded samples",
];

fn level_enabled(level: Level) -> bool {
    match level {
        Level::ERROR => tracing::enabled!(target: "ffmpeg", Level::ERROR),
        Level::WARN => tracing::enabled!(target: "ffmpeg", Level::WARN),
        Level::INFO => tracing::enabled!(target: "ffmpeg", Level::INFO),
        Level::DEBUG => tracing::enabled!(target: "ffmpeg", Level::DEBUG),
        Level::TRACE => tracing::enabled!(target: "ffmpeg", Level::TRACE),
    }
}

fn emit(level: Level, msg: &str) {
    match level {
        Level::ERROR => tracing::error!(target: "ffmpeg", "{}", msg),
        Level::WARN => tracing::warn!(target: "ffmpeg", "{}", msg),
        Level::INFO => tracing::info!(target: "ffmpeg", "{}", msg),
        Level::DEBUG => tracing::debug!(target: "ffmpeg", "{}", msg),
        Level::TRACE => tracing::trace!(target: "ffmpeg", "{}", msg),
    }
}

unsafe extern "C" fn ffmpeg_log_callback(
    avcl: *mut std::ffi::c_void,
    level: std::ffi::c_int,
    fmt: *const std::ffi::c_char,
    vl: ffmpeg::ffi::va_list,
) {
    use std::ffi::CStr;

    let Some(mapped) = map_log_level(level) else {
        return;
    };
    if !level_enabled(mapped) {
        return;
    }

    // Format the message using FFmpeg's own vsnprintf helper
    let mut buf = [0 as std::ffi::c_char; 1024];
    let mut print_prefix: std::ffi::c_int = 1;
    ffmpeg::ffi::av_log_format_line(
        avcl,
        level,
        fmt,
        vl,
        buf.as_mut_ptr(),
        buf.len() as std::ffi::c_int,
        &mut print_prefix,
    );

    let msg = CStr::from_ptr(buf.as_ptr()).to_string_lossy();
    let msg = msg.trim_end();
    if msg.is_empty() {
        return;
    }

    if SUPPRESSED_MESSAGES.iter().any(|s| msg.contains(s)) {
        return;
    }

    emit(mapped, msg);
}

/// Get the version information of the linked FFmpeg libraries.
pub fn version_info() -> String {
    let v = ffmpeg::format::version();
    format!(
        "libavformat {}.{}.{}",
        v >> 16,
        (v >> 8) & 0xff,
        v & 0xff
    )
}
