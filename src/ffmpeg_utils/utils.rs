//! FFmpeg utility functions

use ffmpeg_next as ffmpeg;

/// FFmpeg's "no timestamp" marker (`AV_NOPTS_VALUE`)
pub const NOPTS_VALUE: i64 = i64::MIN;

/// Convert a tick count to seconds using a timebase
pub fn ts_to_seconds(ts: i64, timebase: ffmpeg::Rational) -> f64 {
    if timebase.denominator() == 0 {
        return 0.0;
    }
    let num = timebase.numerator() as f64;
    let den = timebase.denominator() as f64;
    (ts as f64 * num) / den
}

/// Convert seconds to a tick count in the given timebase, rounding down
pub fn seconds_to_ts(secs: f64, timebase: ffmpeg::Rational) -> i64 {
    if timebase.numerator() == 0 {
        return 0;
    }
    let num = timebase.numerator() as f64;
    let den = timebase.denominator() as f64;
    ((secs * den) / num).floor() as i64
}

/// Container-level duration (`AV_TIME_BASE` units) in seconds, if known
pub fn container_duration_secs(duration: i64) -> Option<f64> {
    if duration == NOPTS_VALUE || duration <= 0 {
        return None;
    }
    Some(duration as f64 / ffmpeg::ffi::AV_TIME_BASE as f64)
}

/// Get the media type name
pub fn media_type_name(media_type: ffmpeg::media::Type) -> &'static str {
    match media_type {
        ffmpeg::media::Type::Video => "video",
        ffmpeg::media::Type::Audio => "audio",
        ffmpeg::media::Type::Subtitle => "subtitle",
        ffmpeg::media::Type::Data => "data",
        ffmpeg::media::Type::Attachment => "attachment",
        _ => "unknown",
    }
}

/// Check if a codec encodes still images (cover art)
pub fn is_image_codec(codec_id: ffmpeg::codec::Id) -> bool {
    matches!(
        codec_id,
        ffmpeg::codec::Id::MJPEG
            | ffmpeg::codec::Id::PNG
            | ffmpeg::codec::Id::BMP
            | ffmpeg::codec::Id::GIF
            | ffmpeg::codec::Id::TIFF
            | ffmpeg::codec::Id::WEBP
    )
}
