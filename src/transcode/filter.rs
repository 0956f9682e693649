//! Sample conversion filter graph
//!
//! Bridges decoder output to encoder input with a three-node libavfilter
//! graph: `abuffer` → `aformat` → `abuffersink`.  The graph handles sample
//! format, sample rate and channel layout conversion, and (when the encoder
//! needs it) re-chunks audio into fixed-size frames.

use ffmpeg_next as ffmpeg;
use ffmpeg_next::util::channel_layout::ChannelLayout;
use ffmpeg_next::util::format::sample::Sample;

use crate::error::{FfmpegError, MediaError, Result};

const SOURCE: &str = "in";
const SINK: &str = "out";

/// PCM layout of one side of the graph
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AudioFormat {
    pub sample_format: Sample,
    pub sample_rate: i32,
    pub channel_layout: ChannelLayout,
}

/// Argument string for the `abuffer` source node.
pub fn source_args(input: &AudioFormat, time_base: ffmpeg::Rational) -> String {
    format!(
        "time_base={}/{}:sample_rate={}:sample_fmt={}:channel_layout=0x{:x}",
        time_base.numerator(),
        time_base.denominator(),
        input.sample_rate,
        input.sample_format.name(),
        input.channel_layout.bits()
    )
}

/// Filter description for the `aformat` node constraining the sink side.
pub fn format_spec(output: &AudioFormat) -> String {
    format!(
        "aformat=sample_fmts={}:sample_rates={}:channel_layouts=0x{:x}",
        output.sample_format.name(),
        output.sample_rate,
        output.channel_layout.bits()
    )
}

/// An `abuffer` → `aformat` → `abuffersink` graph
pub struct FormatGraph {
    graph: ffmpeg::filter::Graph,
    flushed: bool,
}

impl FormatGraph {
    /// Build and validate the graph.
    ///
    /// `frame_size` fixes the number of samples per output frame, for
    /// encoders that cannot take arbitrary frame sizes.
    pub fn new(
        input: &AudioFormat,
        time_base: ffmpeg::Rational,
        output: &AudioFormat,
        frame_size: Option<usize>,
    ) -> Result<Self> {
        let mut graph = ffmpeg::filter::Graph::new();

        let abuffer = ffmpeg::filter::find("abuffer").ok_or(FfmpegError::FilterNotFound("abuffer"))?;
        let abuffersink =
            ffmpeg::filter::find("abuffersink").ok_or(FfmpegError::FilterNotFound("abuffersink"))?;

        graph
            .add(&abuffer, SOURCE, &source_args(input, time_base))
            .map_err(|e| MediaError::engine("avfilter_graph_create_filter(abuffer)", e))?;
        graph
            .add(&abuffersink, SINK, "")
            .map_err(|e| MediaError::engine("avfilter_graph_create_filter(abuffersink)", e))?;

        graph
            .output(SOURCE, 0)
            .and_then(|parser| parser.input(SINK, 0))
            .and_then(|parser| parser.parse(&format_spec(output)))
            .map_err(|e| MediaError::engine("avfilter_graph_parse_ptr", e))?;

        graph
            .validate()
            .map_err(|e| MediaError::engine("avfilter_graph_config", e))?;

        if let Some(n) = frame_size {
            if let Some(mut sink) = graph.get(SINK) {
                sink.sink().set_frame_size(n as u32);
            }
        }

        tracing::debug!(
            source = %source_args(input, time_base),
            format = %format_spec(output),
            frame_size = ?frame_size,
            "filter graph configured"
        );

        Ok(Self {
            graph,
            flushed: false,
        })
    }

    /// Feed one decoded frame into the graph.
    pub fn push(&mut self, frame: &ffmpeg::util::frame::Audio) -> Result<()> {
        let mut source = self
            .graph
            .get(SOURCE)
            .ok_or(FfmpegError::FilterNotFound("abuffer"))?;
        source
            .source()
            .add(frame)
            .map_err(|e| MediaError::engine("av_buffersrc_add_frame", e))
    }

    /// Signal end of input; buffered samples become available from
    /// [`pull`](Self::pull).  Later calls are no-ops.
    pub fn flush(&mut self) -> Result<()> {
        if self.flushed {
            return Ok(());
        }
        self.flushed = true;
        let mut source = self
            .graph
            .get(SOURCE)
            .ok_or(FfmpegError::FilterNotFound("abuffer"))?;
        source
            .source()
            .flush()
            .map_err(|e| MediaError::engine("av_buffersrc_add_frame(NULL)", e))
    }

    /// Pull one converted frame, or `None` if the graph needs more input
    /// (or has been fully drained).
    pub fn pull(&mut self) -> Result<Option<ffmpeg::util::frame::Audio>> {
        let mut sink = self
            .graph
            .get(SINK)
            .ok_or(FfmpegError::FilterNotFound("abuffersink"))?;
        let mut frame = ffmpeg::util::frame::Audio::empty();
        match sink.sink().frame(&mut frame) {
            Ok(()) => Ok(Some(frame)),
            Err(ffmpeg::Error::Other { errno }) if errno == ffmpeg::error::EAGAIN => Ok(None),
            Err(ffmpeg::Error::Eof) => Ok(None),
            Err(e) => Err(MediaError::engine("av_buffersink_get_frame", e)),
        }
    }

    /// Whether end of input has been signalled.
    pub fn is_flushed(&self) -> bool {
        self.flushed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ffmpeg_next::util::format::sample::Type;

    fn format(sample_format: Sample, sample_rate: i32, channel_layout: ChannelLayout) -> AudioFormat {
        AudioFormat {
            sample_format,
            sample_rate,
            channel_layout,
        }
    }

    #[test]
    fn test_source_args() {
        let input = format(Sample::I16(Type::Packed), 44100, ChannelLayout::STEREO);
        assert_eq!(
            source_args(&input, ffmpeg::Rational::new(1, 44100)),
            "time_base=1/44100:sample_rate=44100:sample_fmt=s16:channel_layout=0x3"
        );
    }

    #[test]
    fn test_format_spec() {
        let output = format(Sample::F32(Type::Planar), 48000, ChannelLayout::MONO);
        assert_eq!(
            format_spec(&output),
            "aformat=sample_fmts=fltp:sample_rates=48000:channel_layouts=0x4"
        );
    }

    fn tone(samples: usize) -> ffmpeg::util::frame::Audio {
        let mut frame =
            ffmpeg::util::frame::Audio::new(Sample::I16(Type::Packed), samples, ChannelLayout::STEREO);
        frame.set_rate(8000);
        frame.set_pts(Some(0));
        frame.data_mut(0).iter_mut().for_each(|b| *b = 0);
        frame
    }

    #[test]
    fn test_graph_converts_and_rechunks() {
        crate::ffmpeg_utils::init().unwrap();
        let input = format(Sample::I16(Type::Packed), 8000, ChannelLayout::STEREO);
        let output = format(Sample::F32(Type::Planar), 8000, ChannelLayout::STEREO);
        let mut graph =
            FormatGraph::new(&input, ffmpeg::Rational::new(1, 8000), &output, Some(256)).unwrap();

        graph.push(&tone(1000)).unwrap();
        graph.flush().unwrap();
        graph.flush().unwrap();

        let mut total = 0;
        let mut frames = Vec::new();
        while let Some(frame) = graph.pull().unwrap() {
            assert_eq!(frame.format(), Sample::F32(Type::Planar));
            total += frame.samples();
            frames.push(frame.samples());
        }
        assert_eq!(total, 1000);
        // every frame but the last holds exactly the fixed size
        let (last, full) = frames.split_last().unwrap();
        assert!(full.iter().all(|&n| n == 256));
        assert!(*last <= 256);
    }

    #[test]
    fn test_graph_needs_input() {
        crate::ffmpeg_utils::init().unwrap();
        let input = format(Sample::I16(Type::Packed), 8000, ChannelLayout::STEREO);
        let mut graph =
            FormatGraph::new(&input, ffmpeg::Rational::new(1, 8000), &input, None).unwrap();
        assert!(graph.pull().unwrap().is_none());
        assert!(!graph.is_flushed());
    }
}
