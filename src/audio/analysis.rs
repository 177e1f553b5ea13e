//! Block segmentation and the two spectral passes.
//!
//! Pass 1 walks the timeline from the start offset, cuts every entry out of
//! the recording and transforms the analysed ones. Internal sync entries
//! realign the buffer as they are met. Pass 2 revisits the same byte windows,
//! blanks insignificant bins and writes the inverse transform back into the
//! recording.

use indicatif::ProgressBar;
use rustfft::num_complex::Complex;
use std::time::Instant;

use crate::context::Context;
use crate::error::{EngineError, Result};
use crate::profile::Timeline;

use super::fft::{self, FULL_SCALE_MAGNITUDE};
use super::realign::{self, RealignState};
use super::signal::{BlockResult, BlockState, BlockWindow, Channel, Frequency, Signal};
use super::timing::{self, ByteRounding};

/// How far a pass got through the timeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PassOutcome {
    /// Entries handled before the pass stopped
    pub processed: usize,
    /// The recording ended before the timeline did
    pub truncated: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkStage {
    /// Extracted samples after the channel downmix
    Source,
    /// Samples after reconstruction
    Processed,
}

/// One block's bytes, handed out for export.
#[derive(Debug)]
pub struct Chunk<'a> {
    pub entry: usize,
    pub name: &'a str,
    pub sub_index: u32,
    pub stage: ChunkStage,
    pub source_offset: usize,
    pub sample_rate: u32,
    pub channels: u16,
    pub samples: &'a [i16],
}

pub trait ChunkSink {
    fn write_chunk(&mut self, chunk: &Chunk<'_>) -> Result<()>;
}

/// Sink for runs that export nothing.
pub struct NoChunks;

impl ChunkSink for NoChunks {
    fn write_chunk(&mut self, _chunk: &Chunk<'_>) -> Result<()> {
        Ok(())
    }
}

fn scratch<T: Clone + Default>(len: usize) -> Result<Vec<T>> {
    let mut buffer = Vec::new();
    buffer
        .try_reserve_exact(len)
        .map_err(|_| EngineError::OutOfMemory {
            bytes: len * std::mem::size_of::<T>(),
        })?;
    buffer.resize(len, T::default());
    Ok(buffer)
}

/// Bytes to leave out of the transform so blocks recorded at a slower frame
/// rate line up bin for bin with the faster recording.
pub fn size_difference(frames: u64, framerate: f64, smaller: f64, sample_rate: u32, channels: u16) -> usize {
    if smaller <= 0.0 || framerate <= smaller {
        return 0;
    }
    let bigger = timing::seconds_to_bytes(
        sample_rate,
        timing::frames_to_seconds(frames as f64, framerate),
        channels,
    );
    let shorter = timing::seconds_to_bytes(
        sample_rate,
        timing::frames_to_seconds(frames as f64, smaller),
        channels,
    );
    bigger.saturating_sub(shorter)
}

/// Transform length after padding `samples` to a whole number of seconds.
pub fn zero_pad_size(samples: usize, sample_rate: u32) -> usize {
    let rate = sample_rate as usize;
    if rate == 0 || samples % rate == 0 {
        return samples;
    }
    (samples / rate + 1) * rate
}

fn mix(samples: &mut [i16], i: usize, channels: usize, channel: Channel) -> f64 {
    if channels == 1 {
        return samples[i] as f64;
    }
    let (l, r) = (2 * i, 2 * i + 1);
    match channel {
        Channel::Left => {
            samples[r] = 0;
            samples[l] as f64
        }
        Channel::Right => {
            samples[l] = 0;
            samples[r] as f64
        }
        Channel::Stereo => {
            let value = (samples[l] as f64 + samples[r] as f64) / 2.0;
            samples[l] = value as i16;
            samples[r] = value as i16;
            value
        }
    }
}

fn write_back(samples: &mut [i16], i: usize, channels: usize, channel: Channel, value: f64) {
    let value = value.round().clamp(i16::MIN as f64, i16::MAX as f64) as i16;
    if channels == 1 {
        samples[i] = value;
        return;
    }
    let (l, r) = (2 * i, 2 * i + 1);
    match channel {
        Channel::Left => {
            samples[l] = value;
            samples[r] = 0;
        }
        Channel::Right => {
            samples[l] = 0;
            samples[r] = value;
        }
        Channel::Stereo => {
            samples[l] = value;
            samples[r] = value;
        }
    }
}

/// Parameters shared by every block of one signal.
#[derive(Debug, Clone, Copy)]
struct BlockFormat {
    sample_rate: u32,
    channels: u16,
    channel: Channel,
    start_hz: f64,
    end_hz: f64,
}

impl BlockFormat {
    fn new(signal: &Signal, ctx: &Context) -> Self {
        Self {
            sample_rate: signal.sample_rate,
            channels: signal.channels,
            channel: ctx.config.channel.effective(signal.channels),
            start_hz: ctx.config.start_hz,
            end_hz: ctx.end_hz(signal),
        }
    }

    fn bin_range(&self, seconds: f64, size: usize) -> (usize, usize) {
        let start = ((self.start_hz * seconds).floor() as usize).max(1);
        let end = ((self.end_hz * seconds).floor() as usize).min(size / 2);
        (start, end)
    }
}

/// Downmixed, windowed and transformed block, ready for either pass.
struct Transformed {
    spectrum: Vec<Complex<f64>>,
    size: usize,
    mono_len: usize,
    seconds: f64,
    peak: f64,
}

fn transform(samples: &mut [i16], analyzed: usize, format: &BlockFormat, ctx: &mut Context) -> Result<Transformed> {
    let channels = format.channels as usize;
    let mono_len = analyzed / channels;
    let size = if ctx.config.zero_pad {
        zero_pad_size(mono_len, format.sample_rate)
    } else {
        mono_len
    };

    let mut input: Vec<f64> = scratch(size)?;
    for (i, x) in input.iter_mut().take(mono_len).enumerate() {
        *x = mix(samples, i, channels, format.channel);
    }
    let peak = input.iter().map(|x| x.abs()).fold(0.0, f64::max);

    if let Some(window) = ctx.windows.get(mono_len) {
        for (x, w) in input.iter_mut().zip(window.iter()) {
            *x *= w;
        }
    }

    let plan = ctx.plans.forward(size);
    let mut spectrum = plan.make_output_vec();
    plan.process(&mut input, &mut spectrum)?;

    Ok(Transformed {
        spectrum,
        size,
        mono_len,
        seconds: size as f64 / format.sample_rate as f64,
        peak,
    })
}

/// Strongest bins in the analysed range, loudest first, at most `max` of them.
///
/// Amplitudes are against full scale until the signal is normalised.
pub fn frequency_table(
    spectrum: &[Complex<f64>],
    size: usize,
    sample_rate: u32,
    bins: (usize, usize),
    max: usize,
) -> Vec<Frequency> {
    let (start, end) = bins;
    if start > end {
        return Vec::new();
    }
    let mut table: Vec<Frequency> = spectrum
        .iter()
        .enumerate()
        .take(end + 1)
        .skip(start)
        .map(|(k, &bin)| {
            let magnitude = fft::magnitude(bin, size);
            Frequency {
                hertz: fft::bin_hertz(k, size, sample_rate),
                magnitude,
                amplitude: fft::amplitude_dbfs(magnitude, FULL_SCALE_MAGNITUDE),
            }
        })
        .filter(|f| f.magnitude > 0.0)
        .collect();

    table.sort_by(|a, b| b.magnitude.total_cmp(&a.magnitude));
    table.truncate(max);
    table
}

fn process_block(
    block: &mut BlockResult,
    samples: &mut [i16],
    analyzed: usize,
    format: &BlockFormat,
    ctx: &mut Context,
) -> Result<()> {
    let t = transform(samples, analyzed, format, ctx)?;
    block.state = BlockState::Windowed;
    block.peak_sample = t.peak;
    block.fft_size = t.size;
    block.seconds = t.seconds;

    let bins = format.bin_range(t.seconds, t.size);
    block.frequencies = frequency_table(
        &t.spectrum,
        t.size,
        format.sample_rate,
        bins,
        ctx.config.max_frequencies,
    );
    block.state = BlockState::Transformed;
    Ok(())
}

/// Pass 1: cut the timeline out of `signal` and transform every analysed
/// block.
pub fn forward_pass(
    signal: &mut Signal,
    timeline: &Timeline,
    ctx: &mut Context,
    sink: &mut dyn ChunkSink,
    progress: &ProgressBar,
) -> Result<PassOutcome> {
    let started = Instant::now();
    let longest = timeline.longest_entry_frames();
    if longest == 0 {
        return Err(EngineError::InvalidProfile(
            "block definitions are invalid, total length is 0".into(),
        ));
    }

    let sample_rate = signal.sample_rate;
    let channels = signal.channels;
    let slowest = signal.framerate.max(ctx.reference_framerate);
    let longest_bytes = timing::seconds_to_bytes(
        sample_rate,
        timing::frames_to_seconds(longest as f64, slowest),
        channels,
    );
    let mut buffer: Vec<i16> = scratch(longest_bytes / timing::BYTES_PER_SAMPLE)?;
    buffer.clear();

    let format = BlockFormat::new(signal, ctx);
    signal.allocate_blocks(timeline);

    let len = signal.byte_len();
    let mut pos = signal.start_offset;
    let mut rounding = ByteRounding::new();
    let mut realign = RealignState::default();
    let mut outcome = PassOutcome::default();

    for (i, entry) in timeline.entries().iter().enumerate() {
        let framerate = if realign.pending {
            ctx.reference_framerate
        } else {
            signal.framerate
        };
        let seconds = timing::frames_to_seconds(entry.frames as f64, framerate);
        let span = rounding.span(sample_rate, seconds, channels);
        let difference = size_difference(entry.frames, framerate, ctx.smaller_framerate, sample_rate, channels);

        if pos + span.bytes > len {
            log::warn!(
                "Unexpected end of file at '{}' #{} ({} of {} blocks processed), please record the full sequence",
                timeline.block_name(i),
                entry.sub_index,
                i,
                timeline.len()
            );
            outcome.truncated = true;
            break;
        }

        buffer.clear();
        buffer.extend_from_slice(signal.bytes(pos, pos + span.bytes));

        let window = BlockWindow {
            position: pos,
            bytes: span.bytes,
            analyzed_bytes: span.bytes.saturating_sub(difference),
            discard: span.discard,
        };
        let block = &mut signal.blocks[i];
        block.source_offset = pos + realign.advance;

        if entry.block_type.is_analyzed() {
            let analyzed = window.analyzed_bytes / timing::BYTES_PER_SAMPLE;
            process_block(block, &mut buffer, analyzed, &format, ctx)?;
            log::debug!(
                "Block {} '{}' #{}: {} bytes at {}, {} bins",
                i,
                block.name,
                entry.sub_index,
                span.bytes,
                pos,
                block.frequencies.len()
            );
        }

        if ctx.config.chunks && !ctx.config.invert {
            sink.write_chunk(&Chunk {
                entry: i,
                name: timeline.block_name(i),
                sub_index: entry.sub_index,
                stage: ChunkStage::Source,
                source_offset: block.source_offset,
                sample_rate,
                channels,
                samples: &buffer,
            })?;
        }

        signal.layout.push(window);
        pos = window.end();

        if entry.block_type.is_internal_sync() {
            realign::process_internal(signal, timeline, i, pos, ctx, &mut realign)?;
        }

        outcome.processed += 1;
        progress.inc(1);
    }

    log::debug!(
        "Forward pass over {} blocks took {:.2}s",
        outcome.processed,
        started.elapsed().as_secs_f64()
    );
    Ok(outcome)
}

/// Blank the bins of `spectrum` at or below `cutoff` or outside `bins`,
/// or the opposite set when `invert` is set. Returns how many were blanked.
pub fn blank_spectrum(
    spectrum: &mut [Complex<f64>],
    size: usize,
    reference: f64,
    cutoff: f64,
    bins: (usize, usize),
    limit: usize,
    invert: bool,
) -> usize {
    let (start, end) = bins;
    let mut blanked = 0;
    for k in 1..limit.min(spectrum.len()) {
        let amplitude = fft::amplitude_dbfs(fft::magnitude(spectrum[k], size), reference);
        let mut blank = amplitude <= cutoff || k < start || k > end;
        if invert {
            blank = !blank;
        }
        if blank {
            spectrum[k] = Complex::new(0.0, 0.0);
            blanked += 1;
        }
    }
    blanked
}

/// Amplitude at or below which a block's bins are dropped.
pub fn cutoff(block: &BlockResult, signal: &Signal, ctx: &Context) -> f64 {
    let mut cutoff = block.min_amplitude().max(ctx.significant_amplitude);
    if !ctx.config.ignore_floor && signal.has_floor {
        if let Some(floor) = signal.floor_amplitude {
            if floor != 0.0 && cutoff < floor {
                cutoff = floor;
            }
        }
    }
    cutoff
}

fn reconstruct_block(
    block: &mut BlockResult,
    samples: &mut [i16],
    analyzed: usize,
    format: &BlockFormat,
    cutoff: f64,
    reference: f64,
    ctx: &mut Context,
) -> Result<()> {
    let mut t = transform(samples, analyzed, format, ctx)?;

    let bins = format.bin_range(t.seconds, t.size);
    let limit = (t.seconds * format.sample_rate as f64 / 2.0).floor() as usize;
    block.blanked = blank_spectrum(
        &mut t.spectrum,
        t.size,
        reference,
        cutoff,
        bins,
        limit,
        ctx.config.invert,
    );
    block.state = BlockState::Blanked;
    ctx.max_blanked = ctx.max_blanked.max(block.blanked);

    fft::clear_edge_phases(&mut t.spectrum, t.size);
    let plan = ctx.plans.inverse(t.size);
    let mut output: Vec<f64> = scratch(t.size)?;
    plan.process(&mut t.spectrum, &mut output)?;

    let channels = format.channels as usize;
    for (i, value) in output.iter().take(t.mono_len).enumerate() {
        write_back(samples, i, channels, format.channel, value / t.size as f64);
    }
    block.state = BlockState::Reconstructed;
    Ok(())
}

/// Pass 2: revisit every block window of pass 1, blank what is not
/// significant and write the filtered waveform back into `signal`.
///
/// Everything after the last block is zeroed.
pub fn reconstruct_pass(
    signal: &mut Signal,
    timeline: &Timeline,
    ctx: &mut Context,
    sink: &mut dyn ChunkSink,
    progress: &ProgressBar,
) -> Result<PassOutcome> {
    let started = Instant::now();
    let format = BlockFormat::new(signal, ctx);
    let reference = signal.max_magnitude.magnitude;
    let layout = signal.layout.clone();
    let mut outcome = PassOutcome {
        processed: 0,
        truncated: layout.len() < timeline.len(),
    };

    let mut buffer: Vec<i16> = Vec::new();
    for (i, window) in layout.iter().enumerate() {
        buffer.clear();
        buffer.extend_from_slice(signal.bytes(window.position, window.position + window.bytes));

        let entry = timeline.entries()[i];
        if entry.block_type.is_analyzed() {
            let cutoff = cutoff(&signal.blocks[i], signal, ctx);
            let analyzed = window.analyzed_bytes / timing::BYTES_PER_SAMPLE;
            reconstruct_block(&mut signal.blocks[i], &mut buffer, analyzed, &format, cutoff, reference, ctx)?;
            log::debug!(
                "Block {} '{}' #{}: cutoff {:.2}dBFS, {} bins blanked",
                i,
                timeline.block_name(i),
                entry.sub_index,
                cutoff,
                signal.blocks[i].blanked
            );

            let start = window.position / timing::BYTES_PER_SAMPLE;
            signal.samples[start..start + buffer.len()].copy_from_slice(&buffer);
        }

        if ctx.config.chunks {
            sink.write_chunk(&Chunk {
                entry: i,
                name: timeline.block_name(i),
                sub_index: entry.sub_index,
                stage: ChunkStage::Processed,
                source_offset: signal.blocks[i].source_offset,
                sample_rate: format.sample_rate,
                channels: format.channels,
                samples: &buffer,
            })?;
        }

        outcome.processed += 1;
        progress.inc(1);
    }

    let end = layout.last().map(|w| w.end()).unwrap_or(signal.start_offset);
    let len = signal.byte_len();
    if end < len {
        realign::zero_range(&mut signal.samples, end..len);
    }

    log::debug!(
        "Reconstruction of {} blocks took {:.2}s, at most {} bins blanked per block",
        outcome.processed,
        started.elapsed().as_secs_f64(),
        ctx.max_blanked
    );
    Ok(outcome)
}
