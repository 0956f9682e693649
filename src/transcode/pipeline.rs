//! Audio transcoding pipeline
//!
//! Combines `AudioDecoder` → `FormatGraph` → `AudioEncoder` → muxer to turn
//! one audio stream of a source file into a freshly encoded container,
//! optionally trimmed to a time window.  The muxed bytes go to a
//! caller-supplied [`Write`] sink as they are produced.
//!
//! The pipeline is pull-driven by the caller through two steps:
//! [`AudioStream::decode_next`] (demux one packet, feed the decoder) and
//! [`AudioStream::encode_pending`] (move everything downstream as far as it
//! will go).  [`AudioStream::run`] alternates them until the output is
//! complete.

use std::io::Write;
use std::path::PathBuf;

use ffmpeg_next as ffmpeg;

use crate::config::TranscodeConfig;
use crate::error::{MediaError, Result};
use crate::ffmpeg_utils::helpers;
use crate::ffmpeg_utils::io::SinkAdapter;
use crate::ffmpeg_utils::utils::seconds_to_ts;
use crate::media::TrackInfo;

use super::decoder::AudioDecoder;
use super::encoder::{AudioEncoder, EncoderOptions};
use super::filter::{AudioFormat, FormatGraph};

/// What to transcode, and into what
#[derive(Debug, Clone, PartialEq)]
pub struct AudioStreamOptions {
    /// Source file
    pub path: PathBuf,
    /// Index of the audio stream to decode
    pub stream_index: usize,
    /// Logical track number within a multi-track file (informational)
    pub track_index: usize,
    /// Start offset in seconds
    pub start: f64,
    /// Excerpt length in seconds; `<= 0` means "to end of stream"
    pub length: f64,
    /// Short name of the output muxer, e.g. `"flac"`.  Empty selects the
    /// configured default.
    pub target_codec: String,
}

impl AudioStreamOptions {
    /// Transcode a whole stream.
    pub fn new(path: impl Into<PathBuf>, stream_index: usize, target_codec: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            stream_index,
            track_index: 0,
            start: 0.0,
            length: 0.0,
            target_codec: target_codec.into(),
        }
    }

    /// Transcode the window a probed track describes.
    pub fn for_track(path: impl Into<PathBuf>, track: &TrackInfo, target_codec: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            stream_index: track.stream_index,
            track_index: track.track_index,
            start: track.start,
            length: track.length,
            target_codec: target_codec.into(),
        }
    }

    /// Restrict the output to `length` seconds starting at `start`.
    pub fn with_window(mut self, start: f64, length: f64) -> Self {
        self.start = start;
        self.length = length;
        self
    }
}

/// Outcome of one [`AudioStream::decode_next`] step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeStatus {
    /// The packet read belonged to another stream; call again
    Again,
    /// A packet was fed to the decoder
    Ok,
    /// End of input (or of the trim window); the decoder has been flushed
    Eof,
}

/// Output container plus the AVIO sink it writes through.
///
/// `output` is declared first so it is freed before `sink`; `pb` is detached
/// in `Drop` so the output never closes the sink's AVIO context.
struct Muxer {
    output: ffmpeg::format::context::Output,
    sink: SinkAdapter,
    /// Output stream time base, fixed once the header is written
    time_base: ffmpeg::Rational,
    trailer_written: bool,
}

impl Muxer {
    fn write_header(&mut self) -> Result<()> {
        let result = self.output.write_header();
        self.check("avformat_write_header", result)?;
        if let Some(stream) = self.output.stream(0) {
            self.time_base = stream.time_base();
        }
        Ok(())
    }

    fn write(&mut self, packet: &ffmpeg::codec::packet::Packet) -> Result<()> {
        let result = packet.write_interleaved(&mut self.output);
        self.check("av_interleaved_write_frame", result)
    }

    fn finish(&mut self) -> Result<()> {
        if !self.trailer_written {
            self.trailer_written = true;
            let result = self.output.write_trailer();
            self.check("av_write_trailer", result)?;
        }
        self.sink.flush()
    }

    /// Report a failed muxer call, preferring the sink's own error.
    fn check(
        &mut self,
        op: &'static str,
        result: std::result::Result<(), ffmpeg::Error>,
    ) -> Result<()> {
        result.map_err(|e| self.sink.sink_error_or(MediaError::engine(op, e)))
    }
}

impl Drop for Muxer {
    fn drop(&mut self) {
        helpers::detach_avio(&mut self.output);
    }
}

/// One running transcode.
///
/// Fields are dropped in declaration order, which releases the engine
/// handles in reverse order of acquisition.
pub struct AudioStream {
    graph: FormatGraph,
    encoder: AudioEncoder,
    muxer: Muxer,
    decoder: AudioDecoder,
    input: ffmpeg::format::context::Input,

    options: AudioStreamOptions,
    stream_time_base: ffmpeg::Rational,
    /// Requested start in decoder ticks; frames ending before it are dropped
    start_pts: i64,
    /// Trim boundary in decoder ticks
    end_pts: Option<i64>,
    started: bool,
    finished: bool,
    poisoned: bool,
}

impl AudioStream {
    /// Open a pipeline with the default transcode configuration.
    pub fn open<W: Write + 'static>(options: &AudioStreamOptions, sink: W) -> Result<Self> {
        Self::open_with_config(options, sink, &TranscodeConfig::default())
    }

    /// Open a pipeline.
    ///
    /// On failure every engine handle acquired so far is released before
    /// the error is returned.
    pub fn open_with_config<W: Write + 'static>(
        options: &AudioStreamOptions,
        sink: W,
        config: &TranscodeConfig,
    ) -> Result<Self> {
        config.validate()?;

        let target = if options.target_codec.is_empty() {
            config.default_target_codec.as_str()
        } else {
            options.target_codec.as_str()
        };
        let format = helpers::guess_output_format(Some(target), None)
            .filter(|f| f.audio_codec != ffmpeg::codec::Id::None)
            .ok_or_else(|| MediaError::UnsupportedFormat(target.to_string()))?;

        // ── 1. Open source file ────────────────────────────────────────────
        let mut input = helpers::open_input(&options.path)?;

        let count = input.nb_streams() as usize;
        if options.stream_index >= count {
            return Err(MediaError::StreamIndexOutOfRange {
                index: options.stream_index,
                count,
            });
        }

        // ── 2. Open decoder for the audio stream ───────────────────────────
        let (decoder, stream_time_base, metadata) = {
            let stream = input
                .stream(options.stream_index)
                .ok_or(MediaError::StreamIndexOutOfRange {
                    index: options.stream_index,
                    count,
                })?;
            let decoder = AudioDecoder::open(&stream)?;

            // Container tags overlaid with the stream's own
            let mut metadata = ffmpeg::Dictionary::new();
            for (key, value) in input.metadata().iter() {
                metadata.set(key, value);
            }
            for (key, value) in stream.metadata().iter() {
                metadata.set(key, value);
            }
            (decoder, stream.time_base(), metadata)
        };

        // ── 3. Seek to the window start ────────────────────────────────────
        let start = options.start.max(0.0);
        let start_pts = seconds_to_ts(start, decoder.time_base());
        if start > 0.0 {
            let seek_ts = seconds_to_ts(start, stream_time_base);
            helpers::seek_stream(&mut input, options.stream_index, seek_ts)?;
            tracing::debug!(start, seek_ts, "seeked to window start");
        }

        // ── 4. Trim boundary ───────────────────────────────────────────────
        let end_pts = if options.length > 0.0 {
            Some(seconds_to_ts(start + options.length, decoder.time_base()))
        } else {
            None
        };

        // ── 5. Output container with one stream ────────────────────────────
        let mut output = helpers::alloc_output_context(&format.name)?;
        output
            .add_stream(ffmpeg::encoder::find(format.audio_codec))
            .map_err(|e| MediaError::engine("avformat_new_stream", e))?;

        // ── 6. Encoder ─────────────────────────────────────────────────────
        let decoded = AudioFormat {
            sample_format: decoder.format(),
            sample_rate: decoder.sample_rate() as i32,
            channel_layout: decoder.channel_layout(),
        };
        let encoder_options = EncoderOptions {
            bit_rate: config.bit_rate,
            global_header: format.global_header,
        };
        let encoder = AudioEncoder::open(format.audio_codec, &decoded, &encoder_options)?;
        {
            let mut out_stream = output
                .stream_mut(0)
                .ok_or(MediaError::engine("avformat_new_stream", ffmpeg::Error::StreamNotFound))?;
            out_stream.set_parameters(encoder.codec_parameters()?);
            out_stream.set_time_base(encoder.time_base());
        }
        output.set_metadata(metadata);

        // ── 7. Byte sink ───────────────────────────────────────────────────
        let mut muxer = Muxer {
            output,
            sink: SinkAdapter::new(Box::new(sink), config.io_buffer_size)?,
            time_base: encoder.time_base(),
            trailer_written: false,
        };
        muxer.sink.attach(&mut muxer.output);

        // ── 8. Conversion graph ────────────────────────────────────────────
        let graph = FormatGraph::new(
            &decoded,
            decoder.time_base(),
            encoder.format(),
            encoder.frame_size(),
        )?;

        muxer.write_header()?;

        tracing::info!(
            path = %options.path.display(),
            stream_index = options.stream_index,
            target = %format.name,
            codec = ?encoder.codec_id(),
            start,
            length = options.length,
            "audio stream opened"
        );

        Ok(Self {
            graph,
            encoder,
            muxer,
            decoder,
            input,
            options: options.clone(),
            stream_time_base,
            start_pts,
            end_pts,
            started: false,
            finished: false,
            poisoned: false,
        })
    }

    /// Demux one packet and feed it to the decoder.
    ///
    /// May be called several times in a row; when the decoder is full its
    /// frames are moved into the conversion graph first.  Once `Eof` has
    /// been returned, later calls return `Eof` again without touching the
    /// input.
    pub fn decode_next(&mut self) -> Result<DecodeStatus> {
        self.ensure_running()?;
        let result = self.read_packet();
        self.poison_on_error(result)
    }

    fn read_packet(&mut self) -> Result<DecodeStatus> {
        if self.decoder.is_flushed() {
            return Ok(DecodeStatus::Eof);
        }

        let mut packet = ffmpeg::codec::packet::Packet::empty();
        match packet.read(&mut self.input) {
            Ok(()) => {}
            Err(ffmpeg::Error::Eof) => {
                tracing::debug!("end of input");
                self.flush_decoder()?;
                return Ok(DecodeStatus::Eof);
            }
            Err(ffmpeg::Error::Other { errno }) if errno == ffmpeg::error::EAGAIN => {
                return Ok(DecodeStatus::Again);
            }
            Err(e) => return Err(MediaError::engine("av_read_frame", e)),
        }

        if packet.stream() != self.options.stream_index {
            return Ok(DecodeStatus::Again);
        }

        packet.rescale_ts(self.stream_time_base, self.decoder.time_base());

        if let (Some(end_pts), Some(ts)) = (self.end_pts, packet.pts().or(packet.dts())) {
            if ts > end_pts {
                tracing::debug!(ts, end_pts, "reached end of window");
                self.flush_decoder()?;
                return Ok(DecodeStatus::Eof);
            }
        }

        if !self.decoder.send_packet(&packet)? {
            self.push_decoded()?;
            if !self.decoder.send_packet(&packet)? {
                return Err(MediaError::engine(
                    "avcodec_send_packet",
                    ffmpeg::Error::Other {
                        errno: ffmpeg::error::EAGAIN,
                    },
                ));
            }
        }
        self.started = true;
        Ok(DecodeStatus::Ok)
    }

    /// Move decoded audio through the conversion graph and encoder into the
    /// output container.
    ///
    /// Once the decoder has been flushed this drains every stage and writes
    /// the trailer; the pipeline is then finished and further calls are
    /// no-ops.
    pub fn encode_pending(&mut self) -> Result<()> {
        self.ensure_running()?;
        if self.finished {
            return Ok(());
        }
        let result = self.drain();
        self.poison_on_error(result)
    }

    fn drain(&mut self) -> Result<()> {
        self.push_decoded()?;

        let end_of_stream = self.decoder.is_flushed();
        if end_of_stream {
            self.graph.flush()?;
        }

        while let Some(mut frame) = self.graph.pull()? {
            self.encoder.send_frame(&mut frame)?;
            self.write_packets()?;
        }

        if end_of_stream {
            self.encoder.send_eof()?;
            self.write_packets()?;
            self.muxer.finish()?;
            self.finished = true;
            tracing::info!(
                path = %self.options.path.display(),
                stream_index = self.options.stream_index,
                samples = self.encoder.samples_sent(),
                "audio stream finished"
            );
        }
        Ok(())
    }

    /// Signal end of input, after emptying the decoder so it accepts it.
    fn flush_decoder(&mut self) -> Result<()> {
        self.push_decoded()?;
        self.decoder.send_eof()?;
        Ok(())
    }

    /// Move every decoded frame into the conversion graph.
    fn push_decoded(&mut self) -> Result<()> {
        while let Some(frame) = self.decoder.receive_frame()? {
            if self.is_preroll(&frame) {
                continue;
            }
            self.graph.push(&frame)?;
        }
        Ok(())
    }

    fn write_packets(&mut self) -> Result<()> {
        while let Some(mut packet) = self.encoder.receive_packet()? {
            packet.set_stream(0);
            packet.rescale_ts(self.encoder.time_base(), self.muxer.time_base);
            self.muxer.write(&packet)?;
            self.started = true;
        }
        Ok(())
    }

    /// Whether a decoded frame lies entirely before the requested start.
    fn is_preroll(&self, frame: &ffmpeg::util::frame::Audio) -> bool {
        match frame.pts() {
            Some(pts) if self.start_pts > 0 => pts + frame.samples() as i64 <= self.start_pts,
            _ => false,
        }
    }

    /// Drive both steps until the output is complete.
    pub fn run(&mut self) -> Result<()> {
        while !self.finished {
            match self.decode_next()? {
                DecodeStatus::Again => continue,
                DecodeStatus::Ok | DecodeStatus::Eof => self.encode_pending()?,
            }
        }
        Ok(())
    }

    /// Release every engine handle.  Equivalent to dropping the stream.
    pub fn close(self) {}

    fn ensure_running(&self) -> Result<()> {
        if self.poisoned {
            Err(MediaError::Terminated)
        } else {
            Ok(())
        }
    }

    fn poison_on_error<T>(&mut self, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            tracing::debug!(error = %e, "audio stream failed");
            self.poisoned = true;
        }
        result
    }

    /// True once any packet has been decoded or written.
    pub fn is_started(&self) -> bool {
        self.started
    }

    /// True once the trailer has been written and the sink flushed.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Number of packets fed to the decoder so far.
    pub fn packets_decoded(&self) -> u64 {
        self.decoder.packets_sent()
    }

    /// The request this stream was opened with.
    pub fn options(&self) -> &AudioStreamOptions {
        &self.options
    }

    /// Codec of the encoded output.
    pub fn output_codec(&self) -> ffmpeg::codec::Id {
        self.encoder.codec_id()
    }

    /// Format of the encoded output's PCM input (after negotiation).
    pub fn output_format(&self) -> &AudioFormat {
        self.encoder.format()
    }

    /// Trim boundary in decoder ticks, if a length was requested.
    pub fn end_pts(&self) -> Option<i64> {
        self.end_pts
    }
}

impl Drop for AudioStream {
    fn drop(&mut self) {
        tracing::debug!(
            path = %self.options.path.display(),
            finished = self.finished,
            "audio stream closed"
        );
    }
}
