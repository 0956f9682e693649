//! Safe wrappers around FFmpeg FFI calls.
//!
//! Every function in this module is `pub` and **safe** to call.  All `unsafe`
//! blocks are contained here with explicit safety arguments.  Callers outside
//! this module should never need to write `unsafe` for routine FFmpeg access.

use std::ffi::{CStr, CString};
use std::path::Path;
use std::ptr;

use ffmpeg_next as ffmpeg;

use crate::error::{FfmpegError, MediaError, Result};

// ── Codec-parameter field accessors ─────────────────────────────────────────

/// Read `width` from an `AVCodecParameters` struct.
///
/// `ffmpeg-next` does not expose this field through a safe accessor.
pub fn codec_params_width(params: &ffmpeg::codec::parameters::Parameters) -> u32 {
    // SAFETY: `params.as_ptr()` returns a valid non-null pointer for the
    // lifetime of `params`.  `width` is a plain i32 field.
    unsafe { (*params.as_ptr()).width.max(0) as u32 }
}

/// Read `height` from an `AVCodecParameters` struct.
pub fn codec_params_height(params: &ffmpeg::codec::parameters::Parameters) -> u32 {
    // SAFETY: same as `codec_params_width`.
    unsafe { (*params.as_ptr()).height.max(0) as u32 }
}

/// Read `sample_rate` from an `AVCodecParameters` struct.
pub fn codec_params_sample_rate(params: &ffmpeg::codec::parameters::Parameters) -> u32 {
    // SAFETY: same as `codec_params_width`.
    unsafe { (*params.as_ptr()).sample_rate.max(0) as u32 }
}

/// Allocate a fresh `AVCodecParameters`, copy the encoder context into it,
/// and return it as a safe `ffmpeg::codec::Parameters`.
///
/// Used to extract codec parameters from an encoder for muxer stream setup.
pub fn encoder_codec_parameters(
    encoder: &ffmpeg::codec::encoder::Audio,
) -> Result<ffmpeg::codec::Parameters> {
    use std::ops::Deref;
    use std::rc::Rc;
    let ctx: &ffmpeg::codec::Context = encoder.deref();
    // SAFETY: `avcodec_parameters_alloc` returns a valid pointer or null, and
    // null is checked before use.  `avcodec_parameters_from_context` copies
    // fields from a live, open encoder context.
    unsafe {
        let params = ffmpeg::ffi::avcodec_parameters_alloc();
        if params.is_null() {
            return Err(FfmpegError::Alloc("AVCodecParameters").into());
        }
        let ret = ffmpeg::ffi::avcodec_parameters_from_context(params, ctx.as_ptr());
        let params = ffmpeg::codec::Parameters::wrap(params, None::<Rc<dyn std::any::Any>>);
        if ret < 0 {
            return Err(FfmpegError::from_code("avcodec_parameters_from_context", ret).into());
        }
        Ok(params)
    }
}

/// Set `pkt_timebase` on a codec context before it is opened, so the decoder
/// knows the time base of the packets it will receive.
pub fn codec_ctx_set_packet_time_base(ctx: &mut ffmpeg::codec::Context, tb: ffmpeg::Rational) {
    // SAFETY: `ctx.as_mut_ptr()` is valid for the lifetime of `ctx`;
    // `pkt_timebase` is a plain AVRational field.
    unsafe {
        (*ctx.as_mut_ptr()).pkt_timebase = tb.into();
    }
}

// ── Output format lookup ─────────────────────────────────────────────────────

/// The subset of an `AVOutputFormat` the pipeline and prober need.
#[derive(Debug, Clone)]
pub struct OutputFormat {
    /// Short muxer name, e.g. `"flac"`
    pub name: String,
    /// Default audio codec of the muxer
    pub audio_codec: ffmpeg::codec::Id,
    /// Default video codec of the muxer
    pub video_codec: ffmpeg::codec::Id,
    /// Whether streams need out-of-band (global) codec headers
    pub global_header: bool,
}

impl OutputFormat {
    /// Whether this muxer can carry audio or video at all.
    pub fn carries_media(&self) -> bool {
        self.audio_codec != ffmpeg::codec::Id::None || self.video_codec != ffmpeg::codec::Id::None
    }
}

/// Guess an output format from a short name and/or a file name.
///
/// Wraps `av_guess_format`.  Returns `None` if neither hint matches a muxer.
pub fn guess_output_format(short_name: Option<&str>, filename: Option<&str>) -> Option<OutputFormat> {
    let short_name = match short_name {
        Some(s) => Some(CString::new(s).ok()?),
        None => None,
    };
    let filename = match filename {
        Some(s) => Some(CString::new(s).ok()?),
        None => None,
    };

    // SAFETY: all pointers are either null or valid NUL-terminated strings
    // that outlive the call.  The returned pointer refers to a static,
    // read-only muxer description owned by libavformat.
    unsafe {
        let fmt = ffmpeg::ffi::av_guess_format(
            short_name.as_ref().map_or(ptr::null(), |s| s.as_ptr()),
            filename.as_ref().map_or(ptr::null(), |s| s.as_ptr()),
            ptr::null(),
        );
        if fmt.is_null() {
            return None;
        }
        let name = if (*fmt).name.is_null() {
            String::new()
        } else {
            CStr::from_ptr((*fmt).name).to_string_lossy().into_owned()
        };
        Some(OutputFormat {
            name,
            audio_codec: (*fmt).audio_codec.into(),
            video_codec: (*fmt).video_codec.into(),
            global_header: ((*fmt).flags & ffmpeg::ffi::AVFMT_GLOBALHEADER as i32) != 0,
        })
    }
}

/// Allocate an output context for the named muxer without opening any file.
///
/// The returned context has no `pb`; attach one with
/// [`crate::ffmpeg_utils::io::SinkAdapter::attach`].
pub fn alloc_output_context(format_name: &str) -> Result<ffmpeg::format::context::Output> {
    let c_name = CString::new(format_name)
        .map_err(|_| MediaError::UnsupportedFormat(format_name.to_string()))?;
    let mut output_ptr: *mut ffmpeg::ffi::AVFormatContext = ptr::null_mut();

    // SAFETY: `output_ptr` is a valid out-pointer; the format name is a valid
    // C string.  On success libavformat hands us ownership of the context,
    // which `Output::wrap` takes over (freed in its Drop).
    unsafe {
        let ret = ffmpeg::ffi::avformat_alloc_output_context2(
            &mut output_ptr,
            ptr::null(),
            c_name.as_ptr(),
            ptr::null(),
        );
        if ret < 0 || output_ptr.is_null() {
            return Err(MediaError::UnsupportedFormat(format_name.to_string()));
        }
        Ok(ffmpeg::format::context::Output::wrap(output_ptr))
    }
}

// ── Input ────────────────────────────────────────────────────────────────────

/// Convert a path to a C string from its raw bytes.
///
/// Library paths are not guaranteed to be UTF-8; `ffmpeg::format::input`
/// panics on those, so every input is opened through [`open_input`].
pub fn path_to_cstring(path: &Path) -> Result<CString> {
    #[cfg(unix)]
    let bytes = {
        use std::os::unix::ffi::OsStrExt;
        path.as_os_str().as_bytes().to_vec()
    };
    #[cfg(not(unix))]
    let bytes = path
        .to_str()
        .ok_or_else(|| MediaError::Config(format!("path is not valid unicode: {}", path.display())))?
        .as_bytes()
        .to_vec();

    CString::new(bytes)
        .map_err(|_| MediaError::Config(format!("path contains a NUL byte: {}", path.display())))
}

/// Open a container for reading and run the stream-info scan.
///
/// Same as `ffmpeg::format::input`, but takes the path as raw bytes.
pub fn open_input(path: &Path) -> Result<ffmpeg::format::context::Input> {
    let c_path = path_to_cstring(path)?;
    let mut input_ptr: *mut ffmpeg::ffi::AVFormatContext = ptr::null_mut();

    // SAFETY: `input_ptr` is a valid out-pointer and `c_path` a valid C
    // string for the duration of the call.  On success the context is owned
    // by `Input::wrap` (closed in its Drop); if the stream-info scan fails it
    // is closed here before returning.
    unsafe {
        let ret = ffmpeg::ffi::avformat_open_input(
            &mut input_ptr,
            c_path.as_ptr(),
            ptr::null_mut(),
            ptr::null_mut(),
        );
        if ret < 0 {
            return Err(FfmpegError::from_code("avformat_open_input", ret).into());
        }

        let ret = ffmpeg::ffi::avformat_find_stream_info(input_ptr, ptr::null_mut());
        if ret < 0 {
            ffmpeg::ffi::avformat_close_input(&mut input_ptr);
            return Err(FfmpegError::from_code("avformat_find_stream_info", ret).into());
        }

        Ok(ffmpeg::format::context::Input::wrap(input_ptr))
    }
}

// ── AVIO context management ──────────────────────────────────────────────────

/// Attach a caller-owned `AVIOContext` to an output context and mark the
/// context as using custom IO.
pub fn attach_avio(
    output: &mut ffmpeg::format::context::Output,
    avio: *mut ffmpeg::ffi::AVIOContext,
) {
    // SAFETY: `output.as_mut_ptr()` is valid for the lifetime of `output`;
    // the caller guarantees `avio` outlives its attachment (it is detached
    // with `detach_avio` before either side is freed).
    unsafe {
        let ctx = output.as_mut_ptr();
        (*ctx).pb = avio;
        (*ctx).flags |= ffmpeg::ffi::AVFMT_FLAG_CUSTOM_IO as i32;
    }
}

/// Detach the `AVIOContext` (`pb`) from an `AVFormatContext` by setting it to
/// null, preventing the `Output` drop from closing it.
///
/// Call this before dropping an `Output` whose `pb` was allocated manually.
pub fn detach_avio(output: &mut ffmpeg::format::context::Output) {
    // SAFETY: `output.as_mut_ptr()` is valid for the lifetime of `output`.
    // Setting `pb` to null is the documented way to prevent double-free when
    // the caller owns the AVIO context separately.
    unsafe {
        let ctx = output.as_mut_ptr();
        if !ctx.is_null() && !(*ctx).pb.is_null() {
            (*ctx).pb = ptr::null_mut();
        }
    }
}

// ── Seeking ──────────────────────────────────────────────────────────────────

/// Seek the input to the nearest seekable point at or before `timestamp`,
/// expressed in the time base of `stream_index`.
pub fn seek_stream(
    input: &mut ffmpeg::format::context::Input,
    stream_index: usize,
    timestamp: i64,
) -> Result<()> {
    // SAFETY: `input.as_mut_ptr()` is a valid, open AVFormatContext.
    let ret = unsafe {
        ffmpeg::ffi::avformat_seek_file(
            input.as_mut_ptr(),
            stream_index as i32,
            i64::MIN,
            timestamp,
            timestamp,
            0,
        )
    };
    if ret < 0 {
        Err(FfmpegError::from_code("avformat_seek_file", ret).into())
    } else {
        Ok(())
    }
}

// ── Test helpers ─────────────────────────────────────────────────────────────

/// Mark an output stream as an attached picture (cover art).
#[cfg(test)]
pub fn stream_set_attached_pic(stream: &mut ffmpeg::format::stream::StreamMut) {
    // SAFETY: `stream.as_mut_ptr()` is valid for the lifetime of the stream;
    // `disposition` is a plain int field.
    unsafe {
        (*stream.as_mut_ptr()).disposition |= ffmpeg::ffi::AV_DISPOSITION_ATTACHED_PIC as i32;
    }
}
