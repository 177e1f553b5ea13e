use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};
use crate::profile::{BlockType, Timeline};

use super::timing;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Role {
    Reference,
    Comparison,
}

/// Which part of a stereo recording is analysed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum Channel {
    #[value(alias = "l")]
    #[serde(alias = "l")]
    Left,
    #[value(alias = "r")]
    #[serde(alias = "r")]
    Right,
    /// Average of both channels
    #[default]
    #[value(alias = "s")]
    #[serde(alias = "s")]
    Stereo,
}

impl Channel {
    /// Mono recordings only have a left channel to offer.
    pub fn effective(self, channels: u16) -> Channel {
        if channels == 1 {
            Channel::Left
        } else {
            self
        }
    }
}

/// Processing stage a block has reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum BlockState {
    #[default]
    Pending,
    Windowed,
    Transformed,
    Blanked,
    Reconstructed,
}

/// One entry of a block's spectral table.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Frequency {
    /// Bin centre in Hz
    pub hertz: f64,
    /// Bin magnitude divided by the transform size
    pub magnitude: f64,
    /// dBFS against the signal's normalisation reference
    pub amplitude: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct BlockResult {
    /// Repetition index within the block's descriptor
    pub index: u32,
    pub name: String,
    pub block_type: BlockType,
    pub state: BlockState,
    /// Strongest bins in the analysed range, loudest first
    pub frequencies: Vec<Frequency>,
    /// Transform size in samples (0 until transformed)
    pub fft_size: usize,
    /// Duration covered by the transform
    pub seconds: f64,
    /// Largest absolute sample of the selected channel before windowing
    pub peak_sample: f64,
    /// Byte position in the untouched recording, including internal sync advance
    pub source_offset: usize,
    /// Bins zeroed by the reconstruction stage
    pub blanked: usize,
}

impl BlockResult {
    pub fn new(index: u32, name: impl Into<String>, block_type: BlockType) -> Self {
        Self {
            index,
            name: name.into(),
            block_type,
            state: BlockState::Pending,
            frequencies: Vec::new(),
            fft_size: 0,
            seconds: 0.0,
            peak_sample: 0.0,
            source_offset: 0,
            blanked: 0,
        }
    }

    /// The loudest bin, if any energy was found.
    pub fn fundamental(&self) -> Option<&Frequency> {
        self.frequencies.first()
    }

    /// Quietest amplitude kept in the table, floored at 0 dBFS.
    pub fn min_amplitude(&self) -> f64 {
        self.frequencies
            .iter()
            .filter(|f| f.hertz > 0.0)
            .map(|f| f.amplitude)
            .fold(0.0, f64::min)
    }
}

/// Where a timeline entry was read from during the forward pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BlockWindow {
    pub position: usize,
    pub bytes: usize,
    /// Leading bytes that go through the transform
    pub analyzed_bytes: usize,
    /// Extra bytes skipped after the block by frame rounding
    pub discard: usize,
}

impl BlockWindow {
    pub fn end(&self) -> usize {
        self.position + self.bytes + self.discard
    }
}

/// Magnitude every amplitude of a signal is measured against.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct MaxMagnitude {
    pub magnitude: f64,
    pub hertz: f64,
    pub block: Option<usize>,
}

/// A decoded recording and everything the engine derives from it.
#[derive(Debug, Clone)]
pub struct Signal {
    /// Interleaved 16-bit samples, exclusively owned
    pub samples: Vec<i16>,
    pub sample_rate: u32,
    pub channels: u16,
    pub role: Role,
    pub source: String,
    /// Byte offset of the leading sync train (or detected start)
    pub start_offset: usize,
    /// Byte offset of the trailing sync train (or expected end)
    pub end_offset: usize,
    /// Measured milliseconds per video frame
    pub framerate: f64,
    pub has_floor: bool,
    pub floor_amplitude: Option<f64>,
    pub max_magnitude: MaxMagnitude,
    /// Upper analysis bound once clamped to this file's Nyquist limit
    pub end_hz: Option<f64>,
    pub nyquist_limited: bool,
    /// Bytes removed by internal sync realignment so far
    pub sync_advance: usize,
    pub blocks: Vec<BlockResult>,
    /// One window per entry reached by the forward pass
    pub layout: Vec<BlockWindow>,
}

impl Signal {
    pub fn new(samples: Vec<i16>, sample_rate: u32, channels: u16, role: Role) -> Result<Self> {
        if channels != 1 && channels != 2 {
            return Err(EngineError::FormatUnsupported(format!(
                "{} channels, only mono and stereo are supported",
                channels
            )));
        }
        if sample_rate == 0 {
            return Err(EngineError::FormatUnsupported("sample rate of 0Hz".into()));
        }
        if samples.len() % channels as usize != 0 {
            return Err(EngineError::FormatUnsupported(
                "sample data ends in the middle of a frame".into(),
            ));
        }

        Ok(Self {
            samples,
            sample_rate,
            channels,
            role,
            source: String::new(),
            start_offset: 0,
            end_offset: 0,
            framerate: 0.0,
            has_floor: false,
            floor_amplitude: None,
            max_magnitude: MaxMagnitude::default(),
            end_hz: None,
            nyquist_limited: false,
            sync_advance: 0,
            blocks: Vec::new(),
            layout: Vec::new(),
        })
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    pub fn byte_len(&self) -> usize {
        self.samples.len() * timing::BYTES_PER_SAMPLE
    }

    pub fn frame_bytes(&self) -> usize {
        timing::frame_bytes(self.channels)
    }

    pub fn seconds(&self) -> f64 {
        timing::bytes_to_seconds(self.sample_rate, self.byte_len(), self.channels)
    }

    /// Samples of the byte range `[start, end)`.
    pub fn bytes(&self, start: usize, end: usize) -> &[i16] {
        &self.samples[start / timing::BYTES_PER_SAMPLE..end / timing::BYTES_PER_SAMPLE]
    }

    /// One result slot per flattened timeline entry.
    pub fn allocate_blocks(&mut self, timeline: &Timeline) {
        self.layout.clear();
        self.blocks = timeline
            .entries()
            .iter()
            .enumerate()
            .map(|(i, e)| BlockResult::new(e.sub_index, timeline.block_name(i), e.block_type))
            .collect();
    }

    /// Mono mixdown (channel average) of the sample frames in `[from, to)`.
    pub fn mono(&self, from: usize, to: usize) -> Vec<f64> {
        let channels = self.channels as usize;
        let to = to.min(self.samples.len() / channels);
        if from >= to {
            return Vec::new();
        }
        self.samples[from * channels..to * channels]
            .chunks_exact(channels)
            .map(|frame| frame.iter().map(|&s| s as f64).sum::<f64>() / channels as f64)
            .collect()
    }
}
