//! Stream classification
//!
//! Decides from a handful of extracted facts whether a container stream is a
//! playable track, a cover image, or neither.

use std::sync::OnceLock;

use ffmpeg_next as ffmpeg;
use regex::Regex;

use crate::ffmpeg_utils::utils::is_image_codec;

/// The properties of one container stream that classification looks at
#[derive(Debug, Clone, PartialEq)]
pub struct StreamFacts {
    pub medium: ffmpeg::media::Type,
    pub codec_id: ffmpeg::codec::Id,
    /// Stream is flagged as an attached picture
    pub attached_pic: bool,
    pub width: u32,
    pub height: u32,
    /// Container-level duration in seconds, if known
    pub container_duration: Option<f64>,
    /// Stream's own duration in seconds, if known
    pub stream_duration: Option<f64>,
}

/// What a stream turned out to be
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StreamKind {
    /// Playable audio of the given length in seconds
    Track { length: f64 },
    /// Embedded still image
    Image,
    /// Anything else
    Skip,
}

/// Classify one stream.
///
/// Audio is a track when a positive length can be derived; the container
/// duration wins over the stream's own.  Streams that are not tracks are
/// tried as images.
pub fn classify(facts: &StreamFacts) -> StreamKind {
    if facts.medium == ffmpeg::media::Type::Audio {
        if let Some(length) = track_length(facts) {
            return StreamKind::Track { length };
        }
    }

    if is_image(facts) {
        return StreamKind::Image;
    }

    StreamKind::Skip
}

fn track_length(facts: &StreamFacts) -> Option<f64> {
    facts
        .container_duration
        .or(facts.stream_duration)
        .filter(|&length| length > 0.0)
}

fn is_image(facts: &StreamFacts) -> bool {
    facts.medium == ffmpeg::media::Type::Video
        && (facts.attached_pic || is_image_codec(facts.codec_id))
        && facts.width > 0
        && facts.height > 0
}

/// Parse a "track" tag the way `atoi` would: an optional sign and leading
/// digits after whitespace.  Anything unparsable is 0.
pub fn parse_track_number(tag: Option<&str>) -> i32 {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    let Some(re) = RE.get_or_init(|| Regex::new(r"^\s*([+-]?\d+)").ok()) else {
        return 0;
    };

    tag.and_then(|s| re.captures(s))
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
        .unwrap_or(0)
}
