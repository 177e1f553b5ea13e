//! Runs recordings through sync, the spectral passes and normalisation.

use indicatif::ProgressBar;
use std::time::Instant;

use crate::audio::analysis::{self, ChunkSink, PassOutcome};
use crate::audio::normalize;
use crate::audio::signal::Signal;
use crate::audio::sync;
use crate::context::Context;
use crate::error::Result;
use crate::profile::Timeline;

/// The two filtered recordings produced from one source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Output {
    /// Significant content only
    Used,
    /// Everything the used output dropped
    Discarded,
}

impl Output {
    pub const ALL: [Output; 2] = [Output::Used, Output::Discarded];

    pub fn label(&self) -> &'static str {
        match self {
            Output::Used => "used",
            Output::Discarded => "discarded",
        }
    }

    pub fn invert(&self) -> bool {
        matches!(self, Output::Discarded)
    }
}

/// A recording after both passes.
#[derive(Debug)]
pub struct Analysis {
    pub signal: Signal,
    pub forward: PassOutcome,
    pub reconstruction: Option<PassOutcome>,
}

/// Clamp the analysed range to what `signal` can represent.
pub fn clamp_nyquist(signal: &mut Signal, ctx: &Context) {
    let nyquist = signal.sample_rate as f64 / 2.0;
    if nyquist < ctx.config.end_hz {
        log::warn!(
            "{} is sampled at {}Hz, limiting the analysed range to {:.0}Hz instead of {:.0}Hz",
            signal.source,
            signal.sample_rate,
            nyquist,
            ctx.config.end_hz
        );
        signal.end_hz = Some(nyquist);
        signal.nyquist_limited = true;
    }
}

/// Format checks and sync detection. Every recording of a run must be
/// prepared before any of them is analysed, so the shared frame rates are
/// known.
pub fn prepare(signal: &mut Signal, timeline: &Timeline, ctx: &mut Context) -> Result<()> {
    clamp_nyquist(signal, ctx);

    let expected = timeline.total_seconds(ctx.expected_ms_per_frame(timeline, signal.role));
    if signal.seconds() < expected {
        log::warn!(
            "{} lasts {:.2}s but the profile needs {:.2}s, results will be incomplete",
            signal.source,
            signal.seconds(),
            expected
        );
    }

    sync::synchronize(signal, timeline, ctx)?;
    ctx.register_framerate(signal);
    signal.has_floor = timeline.first_silence_index().is_some();
    Ok(())
}

/// Forward pass, normalisation, noise floor, and reconstruction when
/// enabled.
pub fn analyze(
    mut signal: Signal,
    timeline: &Timeline,
    ctx: &mut Context,
    sink: &mut dyn ChunkSink,
    progress: &ProgressBar,
) -> Result<Analysis> {
    let started = Instant::now();
    let forward = analysis::forward_pass(&mut signal, timeline, ctx, sink, progress)?;

    normalize::normalize(&mut signal, &ctx.config);
    normalize::apply_floor(&mut signal, timeline, ctx);

    let reconstruction = if ctx.config.reconstruct {
        Some(analysis::reconstruct_pass(&mut signal, timeline, ctx, sink, progress)?)
    } else {
        None
    };

    log::debug!(
        "Analysis of {} took {:.2}s",
        signal.source,
        started.elapsed().as_secs_f64()
    );
    Ok(Analysis {
        signal,
        forward,
        reconstruction,
    })
}

/// Analyse a copy of the prepared recording for one output.
///
/// The threshold raised by a noise floor carries over to later outputs.
pub fn analyze_output(
    prepared: &Signal,
    output: Output,
    timeline: &Timeline,
    ctx: &mut Context,
    sink: &mut dyn ChunkSink,
    progress: &ProgressBar,
) -> Result<Analysis> {
    let configured = ctx.config.invert;
    ctx.config.invert = configured != output.invert();
    let result = analyze(prepared.clone(), timeline, ctx, sink, progress);
    ctx.config.invert = configured;
    result
}
