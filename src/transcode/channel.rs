//! Async byte stream over a blocking pipeline
//!
//! Runs an [`AudioStream`] on tokio's blocking pool and hands the encoded
//! output to async code as `Bytes` chunks over a bounded channel.  Dropping
//! the receiver stops the pipeline at its next write.

use std::io::{self, Write};

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config::TranscodeConfig;
use crate::error::Result;

use super::pipeline::{AudioStream, AudioStreamOptions};

/// A [`Write`] sink that forwards every chunk into an mpsc channel.
///
/// Must only be used from a blocking context (it calls `blocking_send`).
pub struct ChannelSink {
    tx: mpsc::Sender<Result<Bytes>>,
}

impl ChannelSink {
    pub fn new(tx: mpsc::Sender<Result<Bytes>>) -> Self {
        Self { tx }
    }
}

impl Write for ChannelSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.tx
            .blocking_send(Ok(Bytes::copy_from_slice(buf)))
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "stream receiver dropped"))?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Transcode on a blocking worker and stream the output.
///
/// The receiver yields the encoded container in order; a failure is sent as
/// a final `Err` item.  The channel closes when the pipeline is done.
/// Must be called from within a tokio runtime.
pub fn spawn_audio_stream(
    options: AudioStreamOptions,
    config: &TranscodeConfig,
) -> mpsc::Receiver<Result<Bytes>> {
    let (tx, rx) = mpsc::channel(config.channel_capacity.max(1));
    spawn_audio_stream_to(options, config, tx);
    rx
}

/// Like [`spawn_audio_stream`], writing into an existing channel.
///
/// The returned handle completes once the pipeline has been torn down,
/// whether it finished, failed or was cancelled.
pub fn spawn_audio_stream_to(
    options: AudioStreamOptions,
    config: &TranscodeConfig,
    tx: mpsc::Sender<Result<Bytes>>,
) -> JoinHandle<()> {
    let config = config.clone();

    tokio::task::spawn_blocking(move || {
        let sink = ChannelSink::new(tx.clone());
        let result = AudioStream::open_with_config(&options, sink, &config)
            .and_then(|mut stream| stream.run());

        if let Err(e) = result {
            if tx.is_closed() {
                tracing::debug!(path = %options.path.display(), "audio stream cancelled");
            } else {
                tracing::warn!(path = %options.path.display(), error = %e, "audio stream failed");
                let _ = tx.blocking_send(Err(e));
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_sink_forwards_chunks() {
        let (tx, mut rx) = mpsc::channel(4);
        let mut sink = ChannelSink::new(tx);
        sink.write_all(b"abc").unwrap();
        sink.write_all(b"de").unwrap();
        drop(sink);

        let first = rx.blocking_recv().unwrap().unwrap();
        let second = rx.blocking_recv().unwrap().unwrap();
        assert_eq!(&first[..], b"abc");
        assert_eq!(&second[..], b"de");
        assert!(rx.blocking_recv().is_none());
    }

    #[test]
    fn test_channel_sink_broken_pipe() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let mut sink = ChannelSink::new(tx);
        let err = sink.write(b"x").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
    }
}
