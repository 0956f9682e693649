//! Async byte stream tests

use std::time::Duration;

use tokio::sync::mpsc;

use crate::config::TranscodeConfig;
use crate::error::ErrorKind;
use crate::tests::fixtures::{decoded_samples, save, Fixture, TONE_RATE};
use crate::transcode::{spawn_audio_stream, spawn_audio_stream_to, AudioStreamOptions};

#[tokio::test]
async fn test_spawn_audio_stream_delivers_output() {
    let fixture = Fixture::flac_tone(5, true);
    let options = AudioStreamOptions::new(&fixture.path, 0, "flac");
    let config = TranscodeConfig::default();
    let mut rx = spawn_audio_stream(options, &config);

    let mut bytes = Vec::new();
    let mut chunks = 0;
    while let Some(chunk) = rx.recv().await {
        let chunk = chunk.unwrap();
        assert!(chunk.len() <= config.io_buffer_size);
        bytes.extend_from_slice(&chunk);
        chunks += 1;
    }
    assert!(chunks > 1);

    let out = save(fixture.out_path("streamed.flac"), &bytes);
    let (samples, _) = decoded_samples(&out);
    let expected = 5 * TONE_RATE as u64;
    assert!(samples.abs_diff(expected) < 1024, "{} samples", samples);
}

#[tokio::test]
async fn test_spawn_audio_stream_reports_open_failure() {
    let fixture = Fixture::flac_tone(1, false);
    let options = AudioStreamOptions::new(&fixture.path, 3, "flac");
    let mut rx = spawn_audio_stream(options, &TranscodeConfig::default());

    let err = rx.recv().await.unwrap().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Configuration);
    assert!(rx.recv().await.is_none());
}

#[tokio::test]
async fn test_spawn_audio_stream_cancel_on_drop() {
    let fixture = Fixture::flac_tone(30, false);
    let options = AudioStreamOptions::new(&fixture.path, 0, "flac");
    let (tx, mut rx) = mpsc::channel(1);
    let worker = spawn_audio_stream_to(options, &TranscodeConfig::default(), tx);

    let first = rx.recv().await.unwrap().unwrap();
    assert!(!first.is_empty());
    drop(rx);

    // the next write fails, the pipeline is torn down and the worker exits
    let joined = tokio::time::timeout(Duration::from_secs(30), worker).await;
    assert!(matches!(joined, Ok(Ok(()))), "worker did not shut down");
}
