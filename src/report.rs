//! JSON export of per-block spectral tables.

use serde::Serialize;
use std::path::Path;

use crate::audio::normalize::NormalizationMode;
use crate::audio::signal::{BlockResult, MaxMagnitude, Role, Signal};
use crate::audio::timing;
use crate::context::Context;
use crate::error::Result;

#[derive(Debug, Serialize)]
pub struct SignalReport<'a> {
    pub source: &'a str,
    pub role: Role,
    pub sample_rate: u32,
    pub channels: u16,
    pub start_seconds: f64,
    pub end_seconds: f64,
    /// Measured milliseconds per video frame
    pub framerate: f64,
    pub floor_amplitude: Option<f64>,
    pub max_magnitude: MaxMagnitude,
    pub nyquist_limited: bool,
    pub blocks: &'a [BlockResult],
}

impl<'a> SignalReport<'a> {
    pub fn new(signal: &'a Signal) -> Self {
        let seconds = |bytes| timing::bytes_to_seconds(signal.sample_rate, bytes, signal.channels);
        Self {
            source: &signal.source,
            role: signal.role,
            sample_rate: signal.sample_rate,
            channels: signal.channels,
            start_seconds: seconds(signal.start_offset),
            end_seconds: seconds(signal.end_offset),
            framerate: signal.framerate,
            floor_amplitude: signal.floor_amplitude,
            max_magnitude: signal.max_magnitude,
            nyquist_limited: signal.nyquist_limited,
            blocks: &signal.blocks,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct Report<'a> {
    pub profile: &'a str,
    pub window: &'static str,
    pub normalization: NormalizationMode,
    pub significant_amplitude: f64,
    pub reference_framerate: f64,
    pub signals: Vec<SignalReport<'a>>,
}

impl<'a> Report<'a> {
    pub fn new(profile: &'a str, ctx: &Context, signals: impl IntoIterator<Item = &'a Signal>) -> Self {
        Self {
            profile,
            window: ctx.config.window.label(),
            normalization: ctx.config.normalization,
            significant_amplitude: ctx.significant_amplitude,
            reference_framerate: ctx.reference_framerate,
            signals: signals.into_iter().map(SignalReport::new).collect(),
        }
    }
}

pub fn write_report(path: &Path, report: &Report<'_>) -> Result<()> {
    let json = serde_json::to_string_pretty(report).map_err(std::io::Error::from)?;
    std::fs::write(path, json)?;
    log::info!("Wrote report to {}", path.display());
    Ok(())
}
