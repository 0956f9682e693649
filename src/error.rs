use std::path::PathBuf;

use thiserror::Error;

/// Main error type for probing and transcoding
#[derive(Error, Debug)]
pub enum MediaError {
    /// An error originating from the underlying FFmpeg library
    #[error("FFmpeg error: {0}")]
    Ffmpeg(#[from] FfmpegError),

    /// A standard I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The path is not a recognized or parseable media container
    #[error("Not a media file: {0}")]
    NotMedia(PathBuf),

    /// The requested stream index does not exist in the container
    #[error("Stream index {index} out of range (container has {count} streams)")]
    StreamIndexOutOfRange { index: usize, count: usize },

    /// The requested stream exists but cannot be decoded as audio
    #[error("Stream {0} is not an audio stream")]
    NotAudio(usize),

    /// The target container/format name is unknown or cannot carry audio
    #[error("Unsupported target format: {0}")]
    UnsupportedFormat(String),

    /// Invalid configuration or request parameters
    #[error("Configuration error: {0}")]
    Config(String),

    /// A pipeline step was invoked after the pipeline failed or finished
    #[error("Pipeline terminated")]
    Terminated,
}

/// FFmpeg-specific errors
#[derive(Error, Debug)]
pub enum FfmpegError {
    /// Failure during global FFmpeg initialization
    #[error("FFmpeg initialization failed: {0}")]
    InitFailed(String),

    /// An engine call reported failure
    #[error("{op} failed (code {code}): {source}")]
    Engine {
        /// Name of the failing operation
        op: &'static str,
        /// FFmpeg's numeric error code
        code: i32,
        #[source]
        source: ffmpeg_next::Error,
    },

    /// The requested decoder for a specific codec ID was not found
    #[error("Failed to find decoder: codec_id={0}")]
    DecoderNotFound(String),

    /// The requested encoder for a specific codec ID was not found
    #[error("Failed to find encoder: codec_id={0}")]
    EncoderNotFound(String),

    /// A named filter is missing from this FFmpeg build
    #[error("Filter not found: {0}")]
    FilterNotFound(&'static str),

    /// Failure allocating an engine structure
    #[error("Allocation failed: {0}")]
    Alloc(&'static str),
}

impl FfmpegError {
    /// Wrap an `ffmpeg::Error` with the name of the operation that produced it.
    pub fn engine(op: &'static str, source: ffmpeg_next::Error) -> Self {
        FfmpegError::Engine {
            op,
            code: i32::from(source),
            source,
        }
    }

    /// Wrap a raw negative FFmpeg return code.
    pub fn from_code(op: &'static str, code: i32) -> Self {
        Self::engine(op, ffmpeg_next::Error::from(code))
    }
}

/// Coarse classification of a [`MediaError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad request: stream index, target format, parameters
    Configuration,
    /// The media engine failed an operation
    Engine,
    /// The input is not a usable media container
    NotMedia,
    /// Output sink or filesystem failure
    Io,
    /// The pipeline can no longer be driven
    Terminated,
}

impl MediaError {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            MediaError::Ffmpeg(_) => ErrorKind::Engine,
            MediaError::Io(_) => ErrorKind::Io,
            MediaError::NotMedia(_) => ErrorKind::NotMedia,
            MediaError::StreamIndexOutOfRange { .. }
            | MediaError::NotAudio(_)
            | MediaError::UnsupportedFormat(_)
            | MediaError::Config(_) => ErrorKind::Configuration,
            MediaError::Terminated => ErrorKind::Terminated,
        }
    }

    /// Shorthand for an engine failure.
    pub(crate) fn engine(op: &'static str, source: ffmpeg_next::Error) -> Self {
        MediaError::Ffmpeg(FfmpegError::engine(op, source))
    }
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, MediaError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_error_keeps_code() {
        let err = FfmpegError::engine("avcodec_open2", ffmpeg_next::Error::InvalidData);
        match &err {
            FfmpegError::Engine { op, code, .. } => {
                assert_eq!(*op, "avcodec_open2");
                assert!(*code < 0);
            }
            other => panic!("unexpected variant: {:?}", other),
        }
        assert!(err.to_string().starts_with("avcodec_open2 failed"));
    }

    #[test]
    fn test_error_kinds() {
        assert_eq!(
            MediaError::StreamIndexOutOfRange { index: 4, count: 2 }.kind(),
            ErrorKind::Configuration
        );
        assert_eq!(
            MediaError::UnsupportedFormat("nope".into()).kind(),
            ErrorKind::Configuration
        );
        assert_eq!(
            MediaError::NotMedia(PathBuf::from("/tmp/x.txt")).kind(),
            ErrorKind::NotMedia
        );
        assert_eq!(
            MediaError::engine("av_read_frame", ffmpeg_next::Error::Bug).kind(),
            ErrorKind::Engine
        );
        assert_eq!(MediaError::Terminated.kind(), ErrorKind::Terminated);
    }
}
