//! Signal-wide amplitude reference and noise floor.

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::config::AnalysisConfig;
use crate::context::Context;
use crate::profile::{BlockType, Timeline};

use super::fft::{self, FULL_SCALE_MAGNITUDE};
use super::signal::{MaxMagnitude, Signal};

/// Which magnitude every dBFS value of a signal is measured against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum NormalizationMode {
    /// Loudest sample in the time domain
    #[value(alias = "t")]
    #[serde(alias = "t")]
    PeakTime,
    /// Loudest bin of any block
    #[default]
    #[value(alias = "f")]
    #[serde(alias = "f")]
    PeakFrequency,
    /// Mean level of the content blocks' fundamentals
    #[value(alias = "a")]
    #[serde(alias = "a")]
    AverageFundamentals,
}

fn peak_frequency(signal: &Signal) -> MaxMagnitude {
    let mut max = MaxMagnitude::default();
    for (i, block) in signal.blocks.iter().enumerate() {
        if let Some(f) = block.fundamental() {
            if f.magnitude > max.magnitude {
                max = MaxMagnitude {
                    magnitude: f.magnitude,
                    hertz: f.hertz,
                    block: Some(i),
                };
            }
        }
    }
    max
}

fn peak_time(signal: &Signal) -> MaxMagnitude {
    let mut max = MaxMagnitude::default();
    for (i, block) in signal.blocks.iter().enumerate() {
        // A sine of peak A has bin magnitude A/2
        let magnitude = block.peak_sample / 2.0;
        if block.block_type.is_analyzed() && magnitude > max.magnitude {
            max = MaxMagnitude {
                magnitude,
                hertz: 0.0,
                block: Some(i),
            };
        }
    }
    max
}

fn average_fundamentals(signal: &Signal) -> Option<MaxMagnitude> {
    let levels: Vec<f64> = signal
        .blocks
        .iter()
        .filter(|b| b.block_type == BlockType::Content)
        .filter_map(|b| b.fundamental())
        .map(|f| fft::amplitude_dbfs(f.magnitude, FULL_SCALE_MAGNITUDE))
        .collect();
    if levels.is_empty() {
        return None;
    }
    let mean = levels.iter().sum::<f64>() / levels.len() as f64;
    Some(MaxMagnitude {
        magnitude: fft::magnitude_from_dbfs(mean, FULL_SCALE_MAGNITUDE),
        hertz: 0.0,
        block: None,
    })
}

pub fn reference_magnitude(signal: &Signal, mode: NormalizationMode) -> MaxMagnitude {
    match mode {
        NormalizationMode::PeakTime => peak_time(signal),
        NormalizationMode::PeakFrequency => peak_frequency(signal),
        NormalizationMode::AverageFundamentals => average_fundamentals(signal).unwrap_or_else(|| {
            log::warn!("No content fundamentals to average, normalising to the peak frequency");
            peak_frequency(signal)
        }),
    }
}

/// Pick the signal's reference and express every table entry against it.
pub fn normalize(signal: &mut Signal, config: &AnalysisConfig) {
    let max = reference_magnitude(signal, config.normalization);
    if max.magnitude <= 0.0 {
        log::warn!("{} has no energy in any analysed block", signal.source);
    }
    for block in &mut signal.blocks {
        for f in &mut block.frequencies {
            f.amplitude = fft::amplitude_dbfs(f.magnitude, max.magnitude);
        }
    }
    log::debug!(
        "Normalised to magnitude {:.4} ({:?}, {:.2}Hz)",
        max.magnitude,
        config.normalization,
        max.hertz
    );
    signal.max_magnitude = max;
}

/// Loudest amplitude of the first silence block, once normalised.
pub fn find_floor(signal: &Signal, timeline: &Timeline) -> Option<f64> {
    let index = timeline.first_silence_index()?;
    signal
        .blocks
        .get(index)?
        .fundamental()
        .map(|f| f.amplitude)
}

/// Measure the noise floor and raise the significance threshold to it.
/// The threshold is never lowered.
pub fn apply_floor(signal: &mut Signal, timeline: &Timeline, ctx: &mut Context) {
    if signal.has_floor && !ctx.config.ignore_floor {
        signal.floor_amplitude = find_floor(signal, timeline);
        if let Some(floor) = signal.floor_amplitude {
            log::info!("Noise floor at {:.2}dBFS", floor);
            if floor != 0.0 && floor > ctx.significant_amplitude {
                ctx.significant_amplitude = floor;
            }
        }
    }
    log::info!(
        "Using {:.2}dBFS as minimum significant amplitude for analysis",
        ctx.significant_amplitude
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::signal::{BlockResult, Frequency, Role};
    use crate::testing;

    fn block(block_type: BlockType, levels: &[(f64, f64)]) -> BlockResult {
        let mut block = BlockResult::new(0, "b", block_type);
        block.frequencies = levels
            .iter()
            .map(|&(hertz, dbfs)| {
                let magnitude = fft::magnitude_from_dbfs(dbfs, FULL_SCALE_MAGNITUDE);
                Frequency {
                    hertz,
                    magnitude,
                    amplitude: dbfs,
                }
            })
            .collect();
        block
    }

    fn signal(blocks: Vec<BlockResult>) -> Signal {
        let mut signal = Signal::new(vec![0; 4], 48000, 2, Role::Reference).unwrap();
        signal.blocks = blocks;
        signal
    }

    #[test]
    fn average_of_fundamentals_is_the_mean_level() {
        let s = signal(vec![
            block(BlockType::Content, &[(1000.0, -3.0), (2000.0, -30.0)]),
            block(BlockType::Content, &[(500.0, -6.0)]),
            block(BlockType::Silence, &[(60.0, -1.0)]),
            block(BlockType::Content, &[(250.0, -9.0)]),
        ]);
        let max = reference_magnitude(&s, NormalizationMode::AverageFundamentals);
        let expected = fft::magnitude_from_dbfs(-6.0, FULL_SCALE_MAGNITUDE);
        assert!((max.magnitude - expected).abs() < 1e-6 * expected);

        let peak = reference_magnitude(&s, NormalizationMode::PeakFrequency);
        assert_eq!(peak.block, Some(2));
        assert_eq!(peak.hertz, 60.0);
    }

    #[test]
    fn averaging_without_content_falls_back_to_peak() {
        let s = signal(vec![block(BlockType::Silence, &[(60.0, -40.0)])]);
        let max = reference_magnitude(&s, NormalizationMode::AverageFundamentals);
        assert_eq!(max.block, Some(0));
    }

    #[test]
    fn peak_time_uses_half_the_sample_peak() {
        let mut a = block(BlockType::Content, &[]);
        a.peak_sample = 16000.0;
        let mut b = block(BlockType::SyncStart, &[]);
        b.peak_sample = 32000.0;
        let max = reference_magnitude(&signal(vec![a, b]), NormalizationMode::PeakTime);
        assert_eq!(max.magnitude, 8000.0);
        assert_eq!(max.block, Some(0));
    }

    #[test]
    fn normalize_rescales_amplitudes() {
        let mut s = signal(vec![
            block(BlockType::Content, &[(1000.0, -6.0)]),
            block(BlockType::Content, &[(1000.0, -12.0)]),
        ]);
        normalize(&mut s, &AnalysisConfig::default());
        assert!(s.blocks[0].frequencies[0].amplitude.abs() < 1e-9);
        assert!((s.blocks[1].frequencies[0].amplitude + 6.0).abs() < 1e-9);
    }

    fn floor_timeline() -> Timeline {
        testing::timeline(
            testing::pulse_profile(4),
            vec![
                testing::descriptor("Tone", BlockType::Content, 10, 1),
                testing::descriptor("Silence", BlockType::Silence, 10, 1),
            ],
        )
    }

    #[test]
    fn loud_floor_raises_the_threshold() {
        let mut s = signal(vec![
            block(BlockType::Content, &[(1000.0, 0.0)]),
            block(BlockType::Silence, &[(60.0, -50.0)]),
        ]);
        s.has_floor = true;
        let mut ctx = Context::new(AnalysisConfig::default());

        apply_floor(&mut s, &floor_timeline(), &mut ctx);
        assert_eq!(s.floor_amplitude, Some(-50.0));
        assert_eq!(ctx.significant_amplitude, -50.0);
    }

    #[test]
    fn quiet_floor_never_lowers_the_threshold() {
        let mut s = signal(vec![
            block(BlockType::Content, &[(1000.0, 0.0)]),
            block(BlockType::Silence, &[(60.0, -90.0)]),
        ]);
        s.has_floor = true;
        let mut ctx = Context::new(AnalysisConfig::default());

        apply_floor(&mut s, &floor_timeline(), &mut ctx);
        assert_eq!(s.floor_amplitude, Some(-90.0));
        assert_eq!(ctx.significant_amplitude, -66.0);
    }

    #[test]
    fn ignored_floor_is_not_measured() {
        let mut s = signal(vec![
            block(BlockType::Content, &[(1000.0, 0.0)]),
            block(BlockType::Silence, &[(60.0, -50.0)]),
        ]);
        s.has_floor = true;
        let mut ctx = Context::new(AnalysisConfig {
            ignore_floor: true,
            ..Default::default()
        });

        apply_floor(&mut s, &floor_timeline(), &mut ctx);
        assert_eq!(s.floor_amplitude, None);
        assert_eq!(ctx.significant_amplitude, -66.0);
    }
}
