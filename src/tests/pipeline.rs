//! Transcoding pipeline tests

use std::cell::Cell;
use std::rc::Rc;

use ffmpeg_next::util::channel_layout::ChannelLayout;
use ffmpeg_next::util::format::sample::{Sample, Type};

use crate::config::TranscodeConfig;
use crate::error::{ErrorKind, MediaError};
use crate::media::parse_track_number;
use crate::tests::fixtures::{
    decoded_samples, save, DropCounted, FailingSink, Fixture, SharedBuffer, TONE_RATE,
};
use crate::transcode::{AudioStream, AudioStreamOptions, DecodeStatus};

fn open(options: &AudioStreamOptions) -> (AudioStream, SharedBuffer) {
    let buffer = SharedBuffer::default();
    let stream = AudioStream::open(options, buffer.clone()).unwrap();
    (stream, buffer)
}

#[test]
fn test_stream_index_out_of_range() {
    let fixture = Fixture::flac_tone(2, false);
    let buffer = SharedBuffer::default();
    let options = AudioStreamOptions::new(&fixture.path, 5, "flac");

    let err = AudioStream::open(&options, buffer.clone()).err().unwrap();
    assert!(matches!(
        err,
        MediaError::StreamIndexOutOfRange { index: 5, count: 1 }
    ));
    assert_eq!(err.kind(), ErrorKind::Configuration);
    assert_eq!(buffer.len(), 0);
}

#[test]
fn test_image_stream_is_not_audio() {
    let fixture = Fixture::flac_tone(2, true);
    let options = AudioStreamOptions::new(&fixture.path, 1, "flac");
    let err = AudioStream::open(&options, SharedBuffer::default()).err().unwrap();
    assert!(matches!(err, MediaError::NotAudio(1)));
    assert_eq!(err.kind(), ErrorKind::Configuration);
}

#[test]
fn test_unsupported_target_format() {
    let fixture = Fixture::flac_tone(2, false);
    for target in ["no-such-muxer", "webvtt"] {
        let options = AudioStreamOptions::new(&fixture.path, 0, target);
        let err = AudioStream::open(&options, SharedBuffer::default()).err().unwrap();
        assert!(
            matches!(err, MediaError::UnsupportedFormat(_)),
            "{}: {:?}",
            target,
            err
        );
    }
}

#[test]
fn test_missing_input_is_engine_error() {
    let options = AudioStreamOptions::new("/nonexistent/tone.flac", 0, "flac");
    let err = AudioStream::open(&options, SharedBuffer::default()).err().unwrap();
    assert_eq!(err.kind(), ErrorKind::Engine);
}

#[test]
fn test_decode_state_machine() {
    let fixture = Fixture::flac_tone(3, true);
    let options = AudioStreamOptions::new(&fixture.path, 0, "flac");
    let (mut stream, buffer) = open(&options);

    assert!(!stream.is_started());
    assert!(!stream.is_finished());

    let mut again = 0;
    let mut ok = 0;
    loop {
        let before = stream.packets_decoded();
        match stream.decode_next().unwrap() {
            DecodeStatus::Again => {
                again += 1;
                assert_eq!(stream.packets_decoded(), before);
            }
            DecodeStatus::Ok => {
                ok += 1;
                assert_eq!(stream.packets_decoded(), before + 1);
                stream.encode_pending().unwrap();
            }
            DecodeStatus::Eof => break,
        }
    }
    // the cover picture packet belongs to stream 1
    assert!(again >= 1);
    assert!(ok > 0);
    assert_eq!(stream.packets_decoded(), ok);
    assert!(stream.is_started());
    assert!(!stream.is_finished());

    // flushing again is a no-op
    assert_eq!(stream.decode_next().unwrap(), DecodeStatus::Eof);
    assert_eq!(stream.decode_next().unwrap(), DecodeStatus::Eof);

    stream.encode_pending().unwrap();
    assert!(stream.is_finished());
    stream.encode_pending().unwrap();
    assert!(buffer.len() > 0);
    stream.close();
}

#[test]
fn test_consecutive_decode_steps() {
    let fixture = Fixture::flac_tone(10, true);
    let options = AudioStreamOptions::new(&fixture.path, 0, "flac");
    let (mut stream, buffer) = open(&options);

    // decode well past the decoder's own buffering before encoding anything
    let mut ok = 0;
    while ok < 30 {
        match stream.decode_next().unwrap() {
            DecodeStatus::Ok => ok += 1,
            DecodeStatus::Again => {}
            DecodeStatus::Eof => break,
        }
    }
    assert_eq!(ok, 30);
    assert_eq!(stream.packets_decoded(), 30);

    stream.run().unwrap();
    drop(stream);

    let out = save(fixture.out_path("bursty.flac"), &buffer.bytes());
    let (samples, _) = decoded_samples(&out);
    let expected = 10 * TONE_RATE as u64;
    assert!(samples.abs_diff(expected) < 1024, "{} samples", samples);
}

#[test]
fn test_full_transcode_roundtrip() {
    let fixture = Fixture::flac_tone(10, true);
    let options = AudioStreamOptions::new(&fixture.path, 0, "flac");
    let (mut stream, buffer) = open(&options);
    stream.run().unwrap();
    assert!(stream.is_finished());
    drop(stream);

    let bytes = buffer.bytes();
    assert_eq!(&bytes[..4], b"fLaC");

    let out = save(fixture.out_path("out.flac"), &bytes);
    let (samples, rate) = decoded_samples(&out);
    assert_eq!(rate, TONE_RATE);
    let expected = 10 * TONE_RATE as u64;
    assert!(samples.abs_diff(expected) < 1024, "{} samples", samples);

    // tags survive, cover art does not.  The sink cannot seek, so the
    // header carries no sample count; read tags straight from the container.
    let input = ffmpeg_next::format::input(&out).unwrap();
    let tags = input.metadata();
    assert_eq!(tags.get("title"), Some("Test Tone"));
    assert_eq!(tags.get("artist"), Some("The Oscillators"));
    assert_eq!(tags.get("album_artist"), Some("Various"));
    assert_eq!(parse_track_number(tags.get("track")), 3);
    assert_eq!(input.nb_streams(), 1);
}

#[test]
fn test_trim_window() {
    let fixture = Fixture::flac_tone(30, false);
    let options = AudioStreamOptions::new(&fixture.path, 0, "flac").with_window(10.0, 5.0);
    let (mut stream, buffer) = open(&options);
    assert_eq!(stream.end_pts(), Some(15 * TONE_RATE as i64));
    stream.run().unwrap();
    drop(stream);

    let out = save(fixture.out_path("trim.flac"), &buffer.bytes());
    let (samples, _) = decoded_samples(&out);
    let seconds = samples as f64 / TONE_RATE as f64;
    // within one source block on either side
    assert!(seconds > 4.8 && seconds < 5.3, "trimmed to {} s", seconds);
}

#[test]
fn test_length_only_window() {
    let fixture = Fixture::flac_tone(10, false);
    let options = AudioStreamOptions::new(&fixture.path, 0, "flac").with_window(0.0, 2.0);
    let (mut stream, buffer) = open(&options);
    stream.run().unwrap();
    drop(stream);

    let out = save(fixture.out_path("head.flac"), &buffer.bytes());
    let (samples, _) = decoded_samples(&out);
    let seconds = samples as f64 / TONE_RATE as f64;
    assert!(seconds >= 2.0 && seconds < 2.2, "trimmed to {} s", seconds);
}

#[test]
fn test_wav_target() {
    let fixture = Fixture::flac_tone(2, false);
    let options = AudioStreamOptions::new(&fixture.path, 0, "wav");
    let (mut stream, buffer) = open(&options);
    assert_eq!(stream.output_codec(), ffmpeg_next::codec::Id::PCM_S16LE);
    assert_eq!(stream.options(), &options);
    let format = stream.output_format();
    assert_eq!(format.sample_rate, TONE_RATE as i32);
    assert_eq!(format.channel_layout, ChannelLayout::STEREO);
    assert_eq!(format.sample_format, Sample::I16(Type::Packed));
    stream.run().unwrap();
    drop(stream);

    let bytes = buffer.bytes();
    assert_eq!(&bytes[..4], b"RIFF");
    // 2 s of 16-bit stereo plus a header
    assert!(bytes.len() >= 2 * TONE_RATE as usize * 4);
}

#[test]
fn test_default_target_from_config() {
    let fixture = Fixture::flac_tone(1, false);
    let options = AudioStreamOptions::new(&fixture.path, 0, "");
    let config = TranscodeConfig {
        default_target_codec: "wav".into(),
        ..TranscodeConfig::default()
    };
    let buffer = SharedBuffer::default();
    let stream = AudioStream::open_with_config(&options, buffer, &config).unwrap();
    assert_eq!(stream.output_codec(), ffmpeg_next::codec::Id::PCM_S16LE);
}

#[test]
fn test_sink_failure_poisons_pipeline() {
    let fixture = Fixture::flac_tone(30, false);
    let options = AudioStreamOptions::new(&fixture.path, 0, "flac");
    let sink = FailingSink {
        limit: 16 * 1024,
        written: 0,
    };
    let mut stream = AudioStream::open(&options, sink).unwrap();

    match stream.run() {
        Err(MediaError::Io(e)) => assert_eq!(e.kind(), std::io::ErrorKind::BrokenPipe),
        other => panic!("expected the sink's error, got {:?}", other),
    }
    assert!(!stream.is_finished());
    assert!(matches!(stream.decode_next(), Err(MediaError::Terminated)));
    assert!(matches!(stream.encode_pending(), Err(MediaError::Terminated)));
}

#[test]
fn test_zero_io_buffer_rejected() {
    let fixture = Fixture::flac_tone(1, false);
    let options = AudioStreamOptions::new(&fixture.path, 0, "flac");
    let config = TranscodeConfig {
        io_buffer_size: 0,
        ..TranscodeConfig::default()
    };
    let buffer = SharedBuffer::default();
    let err = AudioStream::open_with_config(&options, buffer.clone(), &config)
        .err()
        .unwrap();
    assert_eq!(err.kind(), ErrorKind::Configuration);
    assert_eq!(buffer.len(), 0);
}

#[cfg(unix)]
#[test]
fn test_latin1_file_name() {
    let fixture = Fixture::flac_tone(2, false);
    let options = AudioStreamOptions::new(fixture.latin1_copy(), 0, "flac");
    let (mut stream, buffer) = open(&options);
    stream.run().unwrap();
    drop(stream);
    assert_eq!(&buffer.bytes()[..4], b"fLaC");
}

#[test]
fn test_header_write_failure_releases_sink() {
    let fixture = Fixture::flac_tone(1, false);
    let options = AudioStreamOptions::new(&fixture.path, 0, "flac");
    // a tiny buffer makes the header reach the sink during open
    let config = TranscodeConfig {
        io_buffer_size: 16,
        ..TranscodeConfig::default()
    };
    let drops = Rc::new(Cell::new(0));
    let sink = DropCounted::new(FailingSink { limit: 0, written: 0 }, &drops);

    assert!(AudioStream::open_with_config(&options, sink, &config).is_err());
    assert_eq!(drops.get(), 1);
}

#[test]
fn test_many_pipelines_open_and_close() {
    let fixture = Fixture::flac_tone(1, true);
    let drops = Rc::new(Cell::new(0));
    for i in 0..50 {
        let options = AudioStreamOptions::new(&fixture.path, 0, "flac");
        let sink = DropCounted::new(SharedBuffer::default(), &drops);
        let stream = AudioStream::open(&options, sink).unwrap();
        assert_eq!(drops.get(), 2 * i);
        stream.close();
        assert_eq!(drops.get(), 2 * i + 1);

        let bad = AudioStreamOptions::new(&fixture.path, 9, "flac");
        let sink = DropCounted::new(SharedBuffer::default(), &drops);
        assert!(AudioStream::open(&bad, sink).is_err());
        assert_eq!(drops.get(), 2 * i + 2);
    }
}
