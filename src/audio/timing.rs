//! Conversions between seconds, video frames, sample frames and byte offsets.
//!
//! All byte offsets refer to interleaved signed 16-bit PCM and are always a
//! whole number of sample frames (`2 * channels` bytes).

/// Bytes per single-channel sample. Only 16-bit PCM is supported.
pub const BYTES_PER_SAMPLE: usize = 2;

// Float products such as 0.05 * 48000 land a hair under the integer.
const ROUNDING_EPSILON: f64 = 1e-6;

pub fn frame_bytes(channels: u16) -> usize {
    BYTES_PER_SAMPLE * channels as usize
}

pub fn frames_to_seconds(frames: f64, ms_per_frame: f64) -> f64 {
    frames * ms_per_frame / 1000.0
}

pub fn seconds_to_frames(seconds: f64, ms_per_frame: f64) -> f64 {
    if ms_per_frame <= 0.0 {
        return 0.0;
    }
    seconds * 1000.0 / ms_per_frame
}

pub fn bytes_to_seconds(sample_rate: u32, bytes: usize, channels: u16) -> f64 {
    bytes as f64 / (sample_rate as f64 * frame_bytes(channels) as f64)
}

pub fn bytes_to_frames(sample_rate: u32, bytes: usize, ms_per_frame: f64, channels: u16) -> f64 {
    seconds_to_frames(bytes_to_seconds(sample_rate, bytes, channels), ms_per_frame)
}

/// Whole sample frames covered by `seconds`, as bytes.
pub fn seconds_to_bytes(sample_rate: u32, seconds: f64, channels: u16) -> usize {
    let exact = sample_rate as f64 * seconds;
    if exact <= 0.0 {
        return 0;
    }
    (exact + ROUNDING_EPSILON).floor() as usize * frame_bytes(channels)
}

pub fn bytes_to_samples(bytes: usize, channels: u16) -> usize {
    bytes / frame_bytes(channels)
}

/// Video scan rate in Hz for a frame duration in milliseconds.
pub fn scan_rate_hz(ms_per_frame: f64) -> f64 {
    if ms_per_frame <= 0.0 {
        return 0.0;
    }
    1000.0 / ms_per_frame
}

/// Byte size of one block plus any extra bytes the running position must skip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BlockSpan {
    pub bytes: usize,
    pub discard: usize,
}

impl BlockSpan {
    pub fn advance(&self) -> usize {
        self.bytes + self.discard
    }
}

/// Bresenham-style accumulator for block lengths that are not a whole number
/// of sample frames.
///
/// Each block is cut at the whole frames it covers; the dropped fraction is
/// carried, and once a full sample frame has accumulated the running position
/// skips it through [`BlockSpan::discard`]. Across many blocks the position
/// never drifts by more than one sample frame from the ideal timeline.
#[derive(Debug, Clone, Default)]
pub struct ByteRounding {
    carry: f64,
}

impl ByteRounding {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn carry(&self) -> f64 {
        self.carry
    }

    pub fn span(&mut self, sample_rate: u32, seconds: f64, channels: u16) -> BlockSpan {
        let exact = (sample_rate as f64 * seconds).max(0.0);
        let whole = (exact + ROUNDING_EPSILON).floor();
        self.carry += (exact - whole).max(0.0);

        let mut discard = 0;
        if self.carry >= 1.0 - ROUNDING_EPSILON {
            self.carry -= 1.0;
            if self.carry < 0.0 {
                self.carry = 0.0;
            }
            discard = frame_bytes(channels);
        }

        BlockSpan {
            bytes: whole as usize * frame_bytes(channels),
            discard,
        }
    }
}
