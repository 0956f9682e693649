//! Audio encoder for the transcoding pipeline
//!
//! Wraps an FFmpeg `AVCodecContext` to encode PCM frames into whatever codec
//! the target muxer defaults to (FLAC for `flac`, PCM for `wav`, …).  The
//! sample format and rate are negotiated against the encoder's advertised
//! capabilities.

use crate::error::{FfmpegError, MediaError, Result};
use crate::ffmpeg_utils::helpers;
use crate::transcode::filter::AudioFormat;
use crate::transcode::negotiate::{choose_sample_format, choose_sample_rate};
use ffmpeg_next as ffmpeg;
use ffmpeg_next::codec;
use ffmpeg_next::util::format::sample::Sample;

/// Options applied to the encoder before it is opened
#[derive(Debug, Clone, Default)]
pub struct EncoderOptions {
    /// Target bit rate in bits per second (lossy codecs only)
    pub bit_rate: Option<usize>,
    /// Emit codec headers out of band, as required by some muxers
    pub global_header: bool,
}

/// Audio encoder backed by a real FFmpeg codec context
pub struct AudioEncoder {
    encoder: ffmpeg::encoder::Audio,
    codec_id: codec::Id,
    /// Fixed number of samples per frame, or `None` when the codec accepts
    /// any frame size
    frame_size: Option<usize>,
    format: AudioFormat,
    time_base: ffmpeg::Rational,
    /// pts (in `time_base`) assigned to the next frame sent
    next_pts: i64,
    flushed: bool,
}

impl AudioEncoder {
    /// Open an encoder for `codec_id` that accepts audio as close as
    /// possible to `input`.
    ///
    /// The channel layout is kept; sample format and rate are chosen from
    /// the encoder's supported lists.
    pub fn open(codec_id: codec::Id, input: &AudioFormat, options: &EncoderOptions) -> Result<Self> {
        let codec = codec::encoder::find(codec_id)
            .ok_or_else(|| FfmpegError::EncoderNotFound(format!("{:?}", codec_id)))?;
        let capabilities = codec
            .audio()
            .map_err(|e| MediaError::engine("avcodec_find_encoder", e))?;

        let formats: Option<Vec<Sample>> = capabilities
            .formats()
            .map(|it| it.collect::<Vec<_>>())
            .filter(|list| !list.is_empty());
        let rates: Option<Vec<i32>> = capabilities
            .rates()
            .map(|it| it.collect::<Vec<_>>())
            .filter(|list| !list.is_empty());

        let sample_format = choose_sample_format(input.sample_format, formats.as_deref());
        let sample_rate = choose_sample_rate(input.sample_rate, rates.as_deref());
        let time_base = ffmpeg::Rational::new(1, sample_rate);

        // Build context and configure the audio encoder BEFORE opening
        let mut context = codec::Context::new_with_codec(codec);
        context.set_time_base(time_base);

        let mut audio_enc = context
            .encoder()
            .audio()
            .map_err(|e| MediaError::engine("avcodec_alloc_context3", e))?;

        audio_enc.set_rate(sample_rate);
        audio_enc.set_format(sample_format);
        audio_enc.set_channel_layout(input.channel_layout);
        audio_enc.set_time_base(time_base);
        if let Some(bit_rate) = options.bit_rate {
            audio_enc.set_bit_rate(bit_rate);
        }
        if options.global_header {
            audio_enc.set_flags(codec::Flags::GLOBAL_HEADER);
        }

        let encoder = audio_enc
            .open_as(codec)
            .map_err(|e| MediaError::engine("avcodec_open2", e))?;

        let variable = codec
            .capabilities()
            .contains(codec::Capabilities::VARIABLE_FRAME_SIZE);
        let frame_size = match encoder.frame_size() {
            0 => None,
            _ if variable => None,
            n => Some(n as usize),
        };

        tracing::debug!(
            codec = ?codec_id,
            sample_rate,
            format = ?sample_format,
            frame_size = ?frame_size,
            "audio encoder opened"
        );

        Ok(Self {
            encoder,
            codec_id,
            frame_size,
            format: AudioFormat {
                sample_format,
                sample_rate,
                channel_layout: input.channel_layout,
            },
            time_base,
            next_pts: 0,
            flushed: false,
        })
    }

    /// Send one PCM frame to the encoder.
    ///
    /// The frame's pts is overwritten with a running sample count so the
    /// encoded stream starts at zero and has no gaps.
    pub fn send_frame(&mut self, frame: &mut ffmpeg::util::frame::Audio) -> Result<()> {
        frame.set_pts(Some(self.next_pts));
        self.next_pts += frame.samples() as i64;
        self.encoder
            .send_frame(frame)
            .map_err(|e| MediaError::engine("avcodec_send_frame", e))
    }

    /// Send EOF to flush the encoder's buffered output.  Later calls are
    /// no-ops.
    pub fn send_eof(&mut self) -> Result<()> {
        if self.flushed {
            return Ok(());
        }
        self.flushed = true;
        match self.encoder.send_eof() {
            Ok(()) | Err(ffmpeg::Error::Eof) => Ok(()),
            Err(e) => Err(MediaError::engine("avcodec_send_frame(NULL)", e)),
        }
    }

    /// Receive one encoded packet, or `None` if the encoder needs more input.
    pub fn receive_packet(&mut self) -> Result<Option<ffmpeg::codec::packet::Packet>> {
        let mut packet = ffmpeg::codec::packet::Packet::empty();
        match self.encoder.receive_packet(&mut packet) {
            Ok(()) => Ok(Some(packet)),
            Err(ffmpeg::Error::Other { errno }) if errno == ffmpeg::error::EAGAIN => Ok(None),
            Err(ffmpeg::Error::Eof) => Ok(None),
            Err(e) => Err(MediaError::engine("avcodec_receive_packet", e)),
        }
    }

    /// The codec being produced.
    pub fn codec_id(&self) -> codec::Id {
        self.codec_id
    }

    /// Samples per frame the encoder requires, if fixed.
    pub fn frame_size(&self) -> Option<usize> {
        self.frame_size
    }

    /// The negotiated input format (what the filter graph must produce).
    pub fn format(&self) -> &AudioFormat {
        &self.format
    }

    /// The encoder timebase (1 / sample_rate).
    pub fn time_base(&self) -> ffmpeg::Rational {
        self.time_base
    }

    /// Total samples sent so far.
    pub fn samples_sent(&self) -> i64 {
        self.next_pts
    }

    /// Codec parameters for the encoded stream (for muxer stream setup).
    pub fn codec_parameters(&self) -> Result<ffmpeg::codec::Parameters> {
        helpers::encoder_codec_parameters(&self.encoder)
    }
}
