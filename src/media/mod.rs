//! Media probing module
//!
//! Extracts what a music server needs from an arbitrary container:
//! - Playable audio tracks (length and tags)
//! - Embedded cover images (dimensions and description)

pub mod classify;
pub mod probe;

use serde::Serialize;

pub use classify::{classify, parse_track_number, StreamFacts, StreamKind};
pub use probe::{probe, try_probe};

/// Everything found in one container, in stream order
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MediaInfo {
    pub tracks: Vec<TrackInfo>,
    pub images: Vec<ImageInfo>,
}

/// One playable audio stream
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackInfo {
    /// Position of the stream within the container
    pub stream_index: usize,
    /// Logical track within a multi-track file
    pub track_index: usize,
    /// Track number from the "track" tag, 0 if absent
    pub number: i32,
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub album_artist: Option<String>,
    /// Start offset in seconds
    pub start: f64,
    /// Length in seconds, always positive
    pub length: f64,
}

/// One embedded still image
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImageInfo {
    pub stream_index: usize,
    pub description: Option<String>,
    pub width: u32,
    pub height: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_media_info_json() {
        let info = MediaInfo {
            tracks: vec![TrackInfo {
                stream_index: 0,
                track_index: 0,
                number: 1,
                title: Some("Intro".into()),
                artist: None,
                album: None,
                album_artist: None,
                start: 0.0,
                length: 61.5,
            }],
            images: vec![ImageInfo {
                stream_index: 1,
                description: None,
                width: 300,
                height: 300,
            }],
        };

        let json = serde_json::to_value(&info).unwrap();
        assert_eq!(json["tracks"][0]["title"], "Intro");
        assert_eq!(json["tracks"][0]["artist"], serde_json::Value::Null);
        assert_eq!(json["tracks"][0]["length"], 61.5);
        assert_eq!(json["images"][0]["width"], 300);
    }
}
