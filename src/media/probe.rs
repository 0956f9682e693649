//! Media prober - opens a container and lists its tracks and images

use std::path::Path;

use ffmpeg_next as ffmpeg;

use crate::error::{MediaError, Result};
use crate::ffmpeg_utils::helpers;
use crate::ffmpeg_utils::utils::{container_duration_secs, ts_to_seconds, NOPTS_VALUE};

use super::classify::{classify, parse_track_number, StreamFacts, StreamKind};
use super::{ImageInfo, MediaInfo, TrackInfo};

/// Probe a file, logging and swallowing any failure.
///
/// Libraries are expected to contain files that are not media or are
/// damaged; those yield `None`.
pub fn probe<P: AsRef<Path>>(path: P) -> Option<MediaInfo> {
    let path = path.as_ref();
    match try_probe(path) {
        Ok(info) => Some(info),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "probe failed");
            None
        }
    }
}

/// Probe a file, reporting why it failed.
pub fn try_probe<P: AsRef<Path>>(path: P) -> Result<MediaInfo> {
    let path = path.as_ref();

    // Reject by extension before touching the file
    let name = path.to_string_lossy();
    match helpers::guess_output_format(None, Some(name.as_ref())) {
        Some(format) if format.carries_media() => {}
        _ => return Err(MediaError::NotMedia(path.to_path_buf())),
    }

    // Opening also runs the stream-info scan
    let context = helpers::open_input(path)?;

    let container_duration = container_duration_secs(context.duration());
    let container_meta = context.metadata();

    let mut info = MediaInfo::default();

    for stream in context.streams() {
        let params = stream.parameters();
        let duration = stream.duration();
        let facts = StreamFacts {
            medium: params.medium(),
            codec_id: params.id(),
            attached_pic: stream
                .disposition()
                .contains(ffmpeg::format::stream::Disposition::ATTACHED_PIC),
            width: helpers::codec_params_width(&params),
            height: helpers::codec_params_height(&params),
            container_duration,
            stream_duration: (duration != NOPTS_VALUE && duration > 0)
                .then(|| ts_to_seconds(duration, stream.time_base())),
        };

        let stream_meta = stream.metadata();
        let tag = |key: &str| lookup_tag(&stream_meta, &container_meta, key);

        match classify(&facts) {
            StreamKind::Track { length } => {
                let track = TrackInfo {
                    stream_index: stream.index(),
                    track_index: 0,
                    number: parse_track_number(tag("track").as_deref()),
                    title: tag("title"),
                    artist: tag("artist"),
                    album: tag("album"),
                    album_artist: tag("album_artist"),
                    start: 0.0,
                    length,
                };
                tracing::debug!(
                    stream_index = track.stream_index,
                    codec = ?facts.codec_id,
                    length,
                    "found track"
                );
                info.tracks.push(track);
            }
            StreamKind::Image => {
                let image = ImageInfo {
                    stream_index: stream.index(),
                    description: stream_meta
                        .get("title")
                        .or_else(|| stream_meta.get("comment"))
                        .map(str::to_string),
                    width: facts.width,
                    height: facts.height,
                };
                tracing::debug!(
                    stream_index = image.stream_index,
                    codec = ?facts.codec_id,
                    width = image.width,
                    height = image.height,
                    "found image"
                );
                info.images.push(image);
            }
            StreamKind::Skip => {
                tracing::trace!(
                    stream_index = stream.index(),
                    medium = crate::ffmpeg_utils::utils::media_type_name(facts.medium),
                    "skipping stream"
                );
            }
        }
    }

    Ok(info)
}

/// Read a tag from the stream's dictionary, falling back to the container's.
fn lookup_tag(
    stream: &ffmpeg::DictionaryRef,
    container: &ffmpeg::DictionaryRef,
    key: &str,
) -> Option<String> {
    stream
        .get(key)
        .or_else(|| container.get(key))
        .map(str::to_string)
}
