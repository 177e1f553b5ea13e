//! Pulse-train sync detection and frame-rate inference.
//!
//! A recording is scanned in short analysis windows (a quarter of a video
//! frame each). For every window the energy at the pulse tone is measured,
//! consecutive windows above the volume threshold are grouped into runs, and
//! a train is a sequence of `count` pulses whose on and off runs both last
//! between the profile's minimum and maximum frame lengths.

use rayon::prelude::*;
use realfft::RealToComplex;
use std::ops::Range;
use std::sync::Arc;

use crate::context::Context;
use crate::error::{EngineError, Result};
use crate::profile::{PulseProfile, SyncTone, Timeline};

use super::fft::{self, PlanCache, FULL_SCALE_MAGNITUDE};
use super::signal::Signal;
use super::timing;

/// Analysis windows per video frame.
pub const PULSE_FACTOR: f64 = 4.0;

/// Largest accepted difference between measured and declared frame duration.
pub const FRAME_RATE_TOLERANCE_PERCENT: f64 = 2.0;

// Runs may gain or lose a partially covered window at either edge.
const RUN_TOLERANCE: usize = 2;

const MIN_WINDOW: usize = 16;

// The trailing train is searched for from this fraction of the expected
// distance between trains.
const END_SEARCH_FRACTION: f64 = 0.9;

/// A detected tone: where it starts and how long it lasts, in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pulse {
    pub offset: usize,
    pub length: usize,
}

#[derive(Debug, Clone, Copy)]
struct Run {
    on: bool,
    start: usize,
    len: usize,
    peak: f64,
}

pub fn analysis_window(sample_rate: u32, ms_per_frame: f64) -> usize {
    let samples_per_frame = sample_rate as f64 * ms_per_frame / 1000.0;
    ((samples_per_frame / PULSE_FACTOR).floor() as usize).max(MIN_WINDOW)
}

/// Linear sample amplitude of a `dbfs` peak.
pub fn linear_threshold(dbfs: f64) -> f64 {
    fft::magnitude_from_dbfs(dbfs, FULL_SCALE_MAGNITUDE) * 2.0
}

/// dBFS at `frequency` (strongest of the three nearest bins) for each whole
/// window of `mono`.
fn tone_levels(
    mono: &[f64],
    window_len: usize,
    frequency: f64,
    sample_rate: u32,
    plan: &Arc<dyn RealToComplex<f64>>,
) -> Result<Vec<f64>> {
    let target = (frequency * window_len as f64 / sample_rate as f64).round() as usize;
    let lo = target.saturating_sub(1).max(1);
    let hi = (target + 1).min(window_len / 2);

    mono.par_chunks_exact(window_len)
        .map(|chunk| -> Result<f64> {
            let mut input = chunk.to_vec();
            let mut spectrum = plan.make_output_vec();
            plan.process(&mut input, &mut spectrum)?;
            let peak = spectrum
                .get(lo..=hi)
                .unwrap_or(&[])
                .iter()
                .map(|&bin| fft::magnitude(bin, window_len))
                .fold(0.0, f64::max);
            Ok(fft::amplitude_dbfs(peak, FULL_SCALE_MAGNITUDE))
        })
        .collect()
}

/// Broadband peak-equivalent level of each whole window of `mono`.
fn broadband_levels(mono: &[f64], window_len: usize) -> Vec<f64> {
    mono.par_chunks_exact(window_len)
        .map(|chunk| {
            let power = chunk.iter().map(|s| s * s).sum::<f64>() / window_len as f64;
            let peak = power.sqrt() * std::f64::consts::SQRT_2;
            fft::amplitude_dbfs(peak / 2.0, FULL_SCALE_MAGNITUDE)
        })
        .collect()
}

fn runs(levels: &[f64], threshold: f64) -> Vec<Run> {
    let mut runs: Vec<Run> = Vec::new();
    for (i, &level) in levels.iter().enumerate() {
        let on = level >= threshold;
        match runs.last_mut() {
            Some(run) if run.on == on => {
                run.len += 1;
                run.peak = run.peak.max(level);
            }
            _ => runs.push(Run {
                on,
                start: i,
                len: 1,
                peak: level,
            }),
        }
    }
    runs
}

/// First window of a qualifying train.
fn find_train(runs: &[Run], pulse: &PulseProfile) -> Option<usize> {
    let min = (pulse.frame_min_len * PULSE_FACTOR).round() as usize;
    let max = (pulse.frame_max_len * PULSE_FACTOR).round() as usize;
    let fits = |len: usize| len + RUN_TOLERANCE >= min && len <= max + RUN_TOLERANCE;

    let mut pulses = 0;
    let mut train_start = 0;
    let mut reference = 0.0;

    for run in runs {
        if run.on {
            if !fits(run.len) {
                pulses = 0;
                continue;
            }
            // Too quiet against the current train: this pulse opens a new one
            if pulses == 0 || run.peak < reference - pulse.volume_delta {
                pulses = 0;
                train_start = run.start;
                reference = run.peak;
            }
            pulses += 1;
            if pulses >= pulse.count {
                return Some(train_start);
            }
        } else if pulses > 0 && !fits(run.len) {
            pulses = 0;
        }
    }
    None
}

/// Sample-accurate start of the tone found in `window`.
///
/// Takes the first sample at or above `threshold` around the window, then
/// walks back to the zero crossing that opens its half cycle.
fn refine_start(mono: &[f64], window: usize, window_len: usize, threshold: f64) -> usize {
    let from = window.saturating_sub(1) * window_len;
    let to = ((window + 1) * window_len).min(mono.len());

    let Some(mut i) = (from..to).find(|&i| mono[i].abs() >= threshold) else {
        return window * window_len;
    };
    while i > 0 && mono[i - 1] != 0.0 && mono[i - 1].signum() == mono[i].signum() {
        i -= 1;
    }
    if i > 0 && mono[i - 1] == 0.0 {
        i -= 1;
    }
    i
}

/// Frame-aligned byte range clamped to the recording.
fn sample_range(signal: &Signal, range: &Range<usize>) -> (usize, usize) {
    let frame_bytes = signal.frame_bytes();
    let end = range.end.min(signal.byte_len());
    (range.start / frame_bytes, end / frame_bytes)
}

/// Byte offset where a qualifying pulse train starts within `range`.
pub fn detect_pulse(
    signal: &Signal,
    pulse: &PulseProfile,
    ms_per_frame: f64,
    range: Range<usize>,
    plans: &mut PlanCache,
) -> Result<Option<usize>> {
    let (first, last) = sample_range(signal, &range);
    let mono = signal.mono(first, last);
    let window_len = analysis_window(signal.sample_rate, ms_per_frame);
    if mono.len() < window_len {
        return Ok(None);
    }

    let plan = plans.forward(window_len);
    let levels = tone_levels(&mono, window_len, pulse.frequency, signal.sample_rate, &plan)?;
    let Some(window) = find_train(&runs(&levels, pulse.min_volume), pulse) else {
        return Ok(None);
    };

    let sample = refine_start(&mono, window, window_len, linear_threshold(pulse.min_volume));
    log::debug!(
        "Pulse train at window {} refined to sample {}",
        window,
        first + sample
    );
    Ok(Some((first + sample) * signal.frame_bytes()))
}

/// Byte offset of the trailing train, searched for after `start_offset`.
pub fn detect_end_pulse(
    signal: &Signal,
    timeline: &Timeline,
    start_offset: usize,
    ms_per_frame: f64,
    plans: &mut PlanCache,
) -> Result<usize> {
    let frames = timeline
        .frames_between_syncs()
        .ok_or_else(|| EngineError::InvalidProfile("trailing sync-end block is not defined".into()))?;
    let seconds = timing::frames_to_seconds(frames as f64, ms_per_frame);
    let skip = timing::seconds_to_bytes(signal.sample_rate, seconds * END_SEARCH_FRACTION, signal.channels);
    let len = signal.byte_len();

    if let Some(offset) =
        detect_pulse(signal, &timeline.pulse, ms_per_frame, start_offset + skip..len, plans)?
    {
        return Ok(offset);
    }

    let sync_seconds = timing::frames_to_seconds(timeline.sync_start_frames() as f64, ms_per_frame);
    let sync_bytes = timing::seconds_to_bytes(signal.sample_rate, sync_seconds, signal.channels);
    log::debug!("Trailing train not found near its expected position, widening search");
    detect_pulse(signal, &timeline.pulse, ms_per_frame, start_offset + sync_bytes..len, plans)?
        .ok_or_else(|| EngineError::SyncNotFound {
            marker: "trailing".into(),
        })
}

/// Byte offset of the first window whose broadband level reaches
/// `threshold_dbfs`, searching from `from`.
pub fn detect_signal_start(
    signal: &Signal,
    from: usize,
    ms_per_frame: f64,
    threshold_dbfs: f64,
) -> Option<usize> {
    let (first, last) = sample_range(signal, &(from..signal.byte_len()));
    let mono = signal.mono(first, last);
    let window_len = analysis_window(signal.sample_rate, ms_per_frame);

    let levels = broadband_levels(&mono, window_len);
    let window = levels.iter().position(|&level| level >= threshold_dbfs)?;
    let sample = refine_start(&mono, window, window_len, linear_threshold(threshold_dbfs));
    Some((first + sample) * signal.frame_bytes())
}

/// First stretch of `tone` within `range`, with its measured length.
pub fn detect_tone(
    signal: &Signal,
    tone: &SyncTone,
    min_volume: f64,
    ms_per_frame: f64,
    range: Range<usize>,
    plans: &mut PlanCache,
) -> Result<Option<Pulse>> {
    let (first, last) = sample_range(signal, &range);
    let mono = signal.mono(first, last);
    let window_len = analysis_window(signal.sample_rate, ms_per_frame);
    if mono.len() < window_len {
        return Ok(None);
    }

    let plan = plans.forward(window_len);
    let levels = tone_levels(&mono, window_len, tone.frequency, signal.sample_rate, &plan)?;
    let Some(run) = runs(&levels, min_volume).into_iter().find(|r| r.on) else {
        return Ok(None);
    };

    let start = refine_start(&mono, run.start, window_len, linear_threshold(min_volume));
    let end = ((run.start + run.len) * window_len).max(start);
    let frame_bytes = signal.frame_bytes();
    Ok(Some(Pulse {
        offset: (first + start) * frame_bytes,
        length: (end - start) * frame_bytes,
    }))
}

/// Milliseconds per video frame implied by the distance between the trains.
pub fn calculate_frame_rate(signal: &Signal, start: usize, end: usize, frames: u64) -> f64 {
    if frames == 0 || end <= start {
        return 0.0;
    }
    let seconds = timing::bytes_to_seconds(signal.sample_rate, end - start, signal.channels);
    seconds * 1000.0 / frames as f64
}

pub fn check_frame_rate(measured: f64, expected: f64, ignore: bool) -> Result<()> {
    let percent = (100.0 - measured * 100.0 / expected).abs();
    if percent <= FRAME_RATE_TOLERANCE_PERCENT {
        return Ok(());
    }
    if ignore {
        log::warn!(
            "Frame rate is {:.3}% different from the expected {:.4}ms, continuing with the measured {:.4}ms",
            percent,
            expected,
            measured
        );
        return Ok(());
    }
    Err(EngineError::FrameRateMismatch {
        measured,
        expected,
        percent,
    })
}

/// Locate the sequence inside `signal` and measure its frame rate.
///
/// Sets `start_offset`, `end_offset` and `framerate`. Profiles without a
/// leading sync train fall back to broadband signal detection and the
/// declared frame rate.
pub fn synchronize(signal: &mut Signal, timeline: &Timeline, ctx: &mut Context) -> Result<()> {
    let expected = ctx.expected_ms_per_frame(timeline, signal.role);
    let len = signal.byte_len();

    if timeline.sync_start_index().is_none() {
        let start = detect_signal_start(signal, 0, expected, ctx.significant_amplitude).ok_or_else(
            || EngineError::SyncNotFound {
                marker: "signal start".into(),
            },
        )?;
        let total = timing::seconds_to_bytes(
            signal.sample_rate,
            timeline.total_seconds(expected),
            signal.channels,
        );
        signal.start_offset = start;
        signal.end_offset = (start + total).min(len);
        signal.framerate = expected;
        log::info!(
            "Signal starts at {:.4}s",
            timing::bytes_to_seconds(signal.sample_rate, start, signal.channels)
        );
        return Ok(());
    }

    let start = detect_pulse(signal, &timeline.pulse, expected, 0..len, &mut ctx.plans)?
        .ok_or_else(|| EngineError::SyncNotFound {
            marker: "starting".into(),
        })?;
    let end = detect_end_pulse(signal, timeline, start, expected, &mut ctx.plans)?;
    let frames = timeline.frames_between_syncs().unwrap_or(0);
    let framerate = calculate_frame_rate(signal, start, end, frames);

    log::info!(
        "Sync trains at {:.4}s and {:.4}s, detected {:.4}Hz video signal ({:.4}ms per frame)",
        timing::bytes_to_seconds(signal.sample_rate, start, signal.channels),
        timing::bytes_to_seconds(signal.sample_rate, end, signal.channels),
        timing::scan_rate_hz(framerate),
        framerate
    );
    check_frame_rate(framerate, expected, ctx.config.ignore_frame_rate_diff)?;

    signal.start_offset = start;
    signal.end_offset = end;
    signal.framerate = framerate;
    Ok(())
}
