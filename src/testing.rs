//! Synthetic recordings for unit tests.

use std::f64::consts::PI;

use crate::audio::signal::{Role, Signal};
use crate::profile::{BlockDescriptor, BlockType, PulseProfile, SyncTone, Timeline};

pub const SAMPLE_RATE: u32 = 48000;
pub const MS_PER_FRAME: f64 = 20.0;
/// Sample frames in one 20ms video frame at 48kHz.
pub const FRAME: usize = 960;

pub fn dbfs_to_peak(dbfs: f64) -> f64 {
    32768.0 * 10f64.powf(dbfs / 20.0)
}

/// Builds an interleaved recording one section at a time.
pub struct Recording {
    pub channels: u16,
    pub samples: Vec<i16>,
}

impl Recording {
    pub fn new(channels: u16) -> Self {
        Self {
            channels,
            samples: Vec::new(),
        }
    }

    /// Position of the next pushed sample frame.
    pub fn position(&self) -> usize {
        self.samples.len() / self.channels as usize
    }

    pub fn byte_position(&self) -> usize {
        self.samples.len() * 2
    }

    pub fn silence(mut self, frames: usize) -> Self {
        self.samples
            .extend(std::iter::repeat(0).take(frames * self.channels as usize));
        self
    }

    /// Sine starting at phase zero, same value on every channel.
    pub fn tone(mut self, hertz: f64, dbfs: f64, frames: usize) -> Self {
        let peak = dbfs_to_peak(dbfs);
        for i in 0..frames {
            let value = (peak * (2.0 * PI * hertz * i as f64 / SAMPLE_RATE as f64).sin())
                .round()
                .clamp(i16::MIN as f64, i16::MAX as f64) as i16;
            for _ in 0..self.channels {
                self.samples.push(value);
            }
        }
        self
    }

    /// `count` pulses of `on` sample frames, each followed by `off` of silence.
    pub fn pulses(mut self, hertz: f64, dbfs: f64, on: usize, off: usize, count: usize) -> Self {
        for _ in 0..count {
            self = self.tone(hertz, dbfs, on).silence(off);
        }
        self
    }

    pub fn into_signal(self, role: Role) -> Signal {
        Signal::new(self.samples, SAMPLE_RATE, self.channels, role).unwrap()
    }
}

pub fn descriptor(name: &str, block_type: BlockType, frames: u64, elements: u32) -> BlockDescriptor {
    BlockDescriptor {
        name: name.to_string(),
        block_type,
        frames,
        elements,
        color: "white".to_string(),
        sync_tone: None,
    }
}

pub fn internal_sync(name: &str, block_type: BlockType, frames: u64, tone: SyncTone) -> BlockDescriptor {
    BlockDescriptor {
        sync_tone: Some(tone),
        ..descriptor(name, block_type, frames, 1)
    }
}

pub fn pulse_profile(count: u32) -> PulseProfile {
    PulseProfile {
        count,
        ..PulseProfile::default()
    }
}

pub fn timeline(pulse: PulseProfile, descriptors: Vec<BlockDescriptor>) -> Timeline {
    Timeline::new("synthetic", MS_PER_FRAME, pulse, descriptors)
}
