//! Custom AVIOContext for callback-based writing
//!
//! The muxer writes into a fixed-size AVIO buffer; whenever it fills (or is
//! flushed) FFmpeg hands the bytes to `write_packet`, which forwards them to
//! a caller-supplied [`std::io::Write`] sink.  No intermediate file and no
//! growing in-memory copy of the output.
//!
//! # Thread safety
//! `SinkAdapter` is NOT thread-safe.  It belongs to one pipeline and is only
//! invoked synchronously from muxer calls on the pipeline's thread.

use std::ffi::{c_int, c_void};
use std::io::{self, Write};
use std::ptr;

use ffmpeg_next as ffmpeg;

use crate::error::{FfmpegError, MediaError, Result};

/// The caller's byte sink as seen from the write callback.
type BoxedSink = Box<dyn Write>;

/// Callback state: the sink and the first error it returned
struct SinkState {
    sink: BoxedSink,
    error: Option<io::Error>,
}

/// Owns an `AVIOContext` whose write callback forwards to a [`Write`] sink.
pub struct SinkAdapter {
    avio: *mut ffmpeg::ffi::AVIOContext,
    opaque: *mut SinkState,
}

impl SinkAdapter {
    /// Allocate an AVIO context with an internal buffer of `buffer_size`
    /// bytes, wired to `sink`.
    pub fn new(sink: BoxedSink, buffer_size: usize) -> Result<Self> {
        let c_size = c_int::try_from(buffer_size)
            .ok()
            .filter(|&n| n > 0)
            .ok_or_else(|| {
                MediaError::Config(format!("invalid AVIO buffer size {}", buffer_size))
            })?;
        let opaque = Box::into_raw(Box::new(SinkState { sink, error: None }));

        // SAFETY: `av_malloc` returns a valid buffer or null (checked).
        // `avio_alloc_context` takes ownership of the buffer on success; on
        // failure we free both the buffer and the boxed sink ourselves.
        unsafe {
            let buffer = ffmpeg::ffi::av_malloc(buffer_size) as *mut u8;
            if buffer.is_null() {
                drop(Box::from_raw(opaque));
                return Err(FfmpegError::Alloc("AVIO buffer").into());
            }

            let avio = ffmpeg::ffi::avio_alloc_context(
                buffer,
                c_size,
                1,
                opaque as *mut c_void,
                None,
                Some(write_packet),
                None,
            );
            if avio.is_null() {
                ffmpeg::ffi::av_free(buffer as *mut c_void);
                drop(Box::from_raw(opaque));
                return Err(FfmpegError::Alloc("AVIO context").into());
            }

            Ok(Self { avio, opaque })
        }
    }

    /// Attach this sink as the I/O backend of `output`.
    ///
    /// The output must be detached (see
    /// [`crate::ffmpeg_utils::helpers::detach_avio`]) before this adapter is
    /// dropped.
    pub fn attach(&mut self, output: &mut ffmpeg::format::context::Output) {
        crate::ffmpeg_utils::helpers::attach_avio(output, self.avio);
    }

    /// Push any bytes still sitting in the AVIO buffer to the sink, then
    /// flush the sink itself.
    pub fn flush(&mut self) -> Result<()> {
        // SAFETY: `self.avio` is valid until Drop.
        let error = unsafe {
            ffmpeg::ffi::avio_flush(self.avio);
            (*self.avio).error
        };
        if error < 0 {
            return Err(self.sink_error_or(FfmpegError::from_code("avio_flush", error).into()));
        }
        // SAFETY: `self.opaque` is a live Box owned by this adapter.
        unsafe { (*self.opaque).sink.flush()? };
        Ok(())
    }

    /// Take the first error the sink returned, if any.
    pub fn take_error(&mut self) -> Option<io::Error> {
        // SAFETY: `self.opaque` is a live Box owned by this adapter.
        unsafe { (*self.opaque).error.take() }
    }

    /// The sink's own error if it failed, otherwise `fallback`.
    ///
    /// A failing sink surfaces from the muxer as a bare `EIO`.
    pub fn sink_error_or(&mut self, fallback: MediaError) -> MediaError {
        match self.take_error() {
            Some(e) => MediaError::Io(e),
            None => fallback,
        }
    }

    /// Raw pointer for direct AVIO calls.
    #[cfg(test)]
    pub fn as_mut_ptr(&mut self) -> *mut ffmpeg::ffi::AVIOContext {
        self.avio
    }
}

impl Drop for SinkAdapter {
    fn drop(&mut self) {
        // SAFETY: the AVIO context and its (possibly reallocated) buffer were
        // allocated by libavformat/av_malloc and are freed exactly once here.
        // The boxed sink was created with `Box::into_raw` in `new`.
        unsafe {
            if !self.avio.is_null() {
                ffmpeg::ffi::av_freep(ptr::addr_of_mut!((*self.avio).buffer) as *mut c_void);
                ffmpeg::ffi::avio_context_free(&mut self.avio);
            }
            if !self.opaque.is_null() {
                drop(Box::from_raw(self.opaque));
                self.opaque = ptr::null_mut();
            }
        }
    }
}

// C-compatible callback for FFmpeg

unsafe extern "C" fn write_packet(opaque: *mut c_void, buf: *const u8, buf_size: c_int) -> c_int {
    if buf_size <= 0 {
        return 0;
    }
    let state = &mut *(opaque as *mut SinkState);
    let slice = std::slice::from_raw_parts(buf, buf_size as usize);
    match state.sink.write_all(slice) {
        Ok(()) => buf_size,
        Err(e) => {
            tracing::debug!(error = %e, "output sink rejected {} bytes", buf_size);
            state.error.get_or_insert(e);
            -ffmpeg::error::EIO
        }
    }
}
