//! Audio decoder for the transcoding pipeline
//!
//! Wraps an FFmpeg `AVCodecContext` to decode compressed audio packets
//! (FLAC, MP3, Opus, AAC, …) into raw PCM `AVFrame`s.

use ffmpeg_next as ffmpeg;
use ffmpeg_next::util::channel_layout::ChannelLayout;

use crate::error::{FfmpegError, MediaError, Result};
use crate::ffmpeg_utils::helpers;

/// Audio decoder backed by a FFmpeg codec context
pub struct AudioDecoder {
    /// The FFmpeg decoder context
    decoder: ffmpeg::decoder::Audio,
    /// Stream index in the source file
    stream_index: usize,
    /// Time base packets are rebased to before decoding (1 / sample rate)
    time_base: ffmpeg::Rational,
    /// Channel layout of decoded frames, defaulted from the channel count
    /// when the stream leaves it unspecified
    channel_layout: ChannelLayout,
    /// Packets accepted by the decoder
    packets_sent: u64,
    /// Set once end-of-input has been signalled
    flushed: bool,
}

impl AudioDecoder {
    /// Open a decoder for the given stream.
    ///
    /// Uses the stream's own codec parameters to initialise the context so no
    /// external configuration is needed.
    pub fn open(stream: &ffmpeg::format::stream::Stream) -> Result<Self> {
        let stream_index = stream.index();
        let params = stream.parameters();

        if params.medium() != ffmpeg::media::Type::Audio {
            return Err(MediaError::NotAudio(stream_index));
        }

        let codec = ffmpeg::codec::decoder::find(params.id()).ok_or_else(|| {
            FfmpegError::DecoderNotFound(format!("{:?} (stream {})", params.id(), stream_index))
        })?;

        // Packets are rebased to 1 / sample_rate before they reach the decoder
        let sample_rate = helpers::codec_params_sample_rate(&params);
        let time_base = if sample_rate > 0 {
            ffmpeg::Rational::new(1, sample_rate as i32)
        } else {
            stream.time_base()
        };

        let mut context = ffmpeg::codec::Context::from_parameters(params)
            .map_err(|e| MediaError::engine("avcodec_parameters_to_context", e))?;
        helpers::codec_ctx_set_packet_time_base(&mut context, time_base);

        let decoder = context
            .decoder()
            .open_as(codec)
            .and_then(|opened| opened.audio())
            .map_err(|e| MediaError::engine("avcodec_open2", e))?;

        let channel_layout = if decoder.channel_layout().bits() == 0 {
            ChannelLayout::default(decoder.channels() as i32)
        } else {
            decoder.channel_layout()
        };

        tracing::debug!(
            stream_index,
            codec = ?codec.id(),
            sample_rate = decoder.rate(),
            channels = decoder.channels(),
            format = ?decoder.format(),
            "audio decoder opened"
        );

        Ok(Self {
            decoder,
            stream_index,
            time_base,
            channel_layout,
            packets_sent: 0,
            flushed: false,
        })
    }

    /// Send a compressed packet to the decoder.
    ///
    /// Returns `Ok(false)` if the decoder is full (`EAGAIN`): receive its
    /// pending frames, then send the same packet again.
    ///
    /// `AVERROR_INVALIDDATA` is treated as non-fatal and returns `Ok(true)`
    /// with a debug log; decoders emit it for damaged frames and for pre-roll
    /// packets right after a seek.
    pub fn send_packet(&mut self, packet: &ffmpeg::codec::packet::Packet) -> Result<bool> {
        match self.decoder.send_packet(packet) {
            Ok(()) => {
                self.packets_sent += 1;
                Ok(true)
            }
            Err(ffmpeg::Error::Other { errno }) if errno == ffmpeg::error::EAGAIN => Ok(false),
            Err(ffmpeg::Error::InvalidData) => {
                tracing::debug!(
                    stream_index = self.stream_index,
                    "send_packet: skipping invalid packet"
                );
                self.packets_sent += 1;
                Ok(true)
            }
            Err(e) => Err(MediaError::engine("avcodec_send_packet", e)),
        }
    }

    /// Signal end of input so the decoder releases its buffered frames.
    ///
    /// Only the first call reaches FFmpeg; later calls are no-ops and return
    /// `false`.
    pub fn send_eof(&mut self) -> Result<bool> {
        if self.flushed {
            return Ok(false);
        }
        self.flushed = true;
        match self.decoder.send_eof() {
            Ok(()) => Ok(true),
            // Not really errors: the decoder is already drained
            Err(ffmpeg::Error::Other { errno }) if errno == ffmpeg::error::EAGAIN => Ok(true),
            Err(ffmpeg::Error::Eof) => Ok(true),
            Err(e) => Err(MediaError::engine("avcodec_send_packet(NULL)", e)),
        }
    }

    /// Receive one decoded PCM frame, or `None` if the decoder needs more
    /// input (or is fully drained).
    ///
    /// The frame's pts is set to its best-effort timestamp in
    /// [`time_base`](Self::time_base).
    pub fn receive_frame(&mut self) -> Result<Option<ffmpeg::util::frame::Audio>> {
        let mut frame = ffmpeg::util::frame::Audio::empty();
        match self.decoder.receive_frame(&mut frame) {
            Ok(()) => {
                let timestamp = frame.timestamp();
                frame.set_pts(timestamp);
                Ok(Some(frame))
            }
            Err(ffmpeg::Error::Other { errno }) if errno == ffmpeg::error::EAGAIN => Ok(None),
            Err(ffmpeg::Error::Eof) => Ok(None),
            Err(e) => Err(MediaError::engine("avcodec_receive_frame", e)),
        }
    }

    /// Whether end of input has been signalled.
    pub fn is_flushed(&self) -> bool {
        self.flushed
    }

    /// Number of packets the decoder has accepted.
    pub fn packets_sent(&self) -> u64 {
        self.packets_sent
    }

    /// Time base of packets fed to, and frames produced by, this decoder.
    pub fn time_base(&self) -> ffmpeg::Rational {
        self.time_base
    }

    /// Sample rate of decoded frames.
    pub fn sample_rate(&self) -> u32 {
        self.decoder.rate()
    }

    /// Sample format of decoded frames.
    pub fn format(&self) -> ffmpeg::util::format::sample::Sample {
        self.decoder.format()
    }

    /// Channel layout of decoded frames.
    pub fn channel_layout(&self) -> ChannelLayout {
        self.channel_layout
    }
}
