use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::audio::normalize::NormalizationMode;
use crate::audio::signal::Channel;
use crate::audio::window::WindowKind;
use crate::error::{EngineError, Result};

pub const START_HZ: f64 = 20.0;
pub const END_HZ: f64 = 20000.0;
pub const MAX_FREQ_COUNT: usize = 22050;
pub const FREQ_COUNT: usize = 2000;
pub const SIGNIFICANT_AMPLITUDE: f64 = -66.0;
pub const LOWEST_DBFS: f64 = -120.0;

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub analysis: AnalysisConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AnalysisConfig {
    #[serde(default)]
    pub window: WindowKind,
    #[serde(default)]
    pub channel: Channel,
    #[serde(default)]
    pub normalization: NormalizationMode,
    #[serde(default = "default_start_hz")]
    pub start_hz: f64,
    #[serde(default = "default_end_hz")]
    pub end_hz: f64,
    #[serde(default = "default_max_frequencies")]
    pub max_frequencies: usize,
    #[serde(default = "default_significant_amplitude")]
    pub significant_amplitude: f64,
    #[serde(default)]
    pub ignore_floor: bool,
    #[serde(default)]
    pub ignore_frame_rate_diff: bool,
    #[serde(default)]
    pub zero_pad: bool,
    #[serde(default)]
    pub invert: bool,
    #[serde(default = "default_true")]
    pub reconstruct: bool,
    #[serde(default)]
    pub compress_to_blocks: bool,
    #[serde(default)]
    pub chunks: bool,
    #[serde(default)]
    pub use_comparison_profile: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_output_dir")]
    pub dir: PathBuf,
    #[serde(default)]
    pub json: bool,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            window: WindowKind::default(),
            channel: Channel::default(),
            normalization: NormalizationMode::default(),
            start_hz: default_start_hz(),
            end_hz: default_end_hz(),
            max_frequencies: default_max_frequencies(),
            significant_amplitude: default_significant_amplitude(),
            ignore_floor: false,
            ignore_frame_rate_diff: false,
            zero_pad: false,
            invert: false,
            reconstruct: default_true(),
            compress_to_blocks: false,
            chunks: false,
            use_comparison_profile: false,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: default_output_dir(),
            json: false,
        }
    }
}

fn default_start_hz() -> f64 { START_HZ }
fn default_end_hz() -> f64 { END_HZ }
fn default_max_frequencies() -> usize { FREQ_COUNT }
fn default_significant_amplitude() -> f64 { SIGNIFICANT_AMPLITUDE }
fn default_true() -> bool { true }
fn default_output_dir() -> PathBuf { PathBuf::from("mdspectra-out") }

impl AnalysisConfig {
    /// Replace out-of-range values with their defaults and reject an empty
    /// frequency range.
    pub fn sanitize(&mut self) -> Result<()> {
        if self.start_hz < 1.0 || self.start_hz > END_HZ - 100.0 {
            log::warn!("Start frequency {}Hz out of range, using {}Hz", self.start_hz, START_HZ);
            self.start_hz = START_HZ;
        }
        if self.end_hz < START_HZ * 2.0 || self.end_hz > END_HZ {
            log::warn!("End frequency {}Hz out of range, using {}Hz", self.end_hz, END_HZ);
            self.end_hz = END_HZ;
        }
        if self.max_frequencies < 1 || self.max_frequencies > MAX_FREQ_COUNT {
            log::warn!(
                "Frequency count {} out of range, using {}",
                self.max_frequencies,
                MAX_FREQ_COUNT
            );
            self.max_frequencies = MAX_FREQ_COUNT;
        }
        if self.significant_amplitude <= LOWEST_DBFS || self.significant_amplitude >= -1.0 {
            log::warn!(
                "Significant amplitude {}dBFS out of range, using {}dBFS",
                self.significant_amplitude,
                SIGNIFICANT_AMPLITUDE
            );
            self.significant_amplitude = SIGNIFICANT_AMPLITUDE;
        }
        if self.end_hz <= self.start_hz {
            return Err(EngineError::InvalidConfig(format!(
                "invalid frequency range {}Hz-{}Hz",
                self.start_hz, self.end_hz
            )));
        }
        Ok(())
    }
}

pub fn load_config(path: &Path) -> Option<Config> {
    let content = std::fs::read_to_string(path).ok()?;
    match toml::from_str(&content) {
        Ok(config) => Some(config),
        Err(err) => {
            log::warn!("Invalid config {}: {}", path.display(), err);
            None
        }
    }
}

/// `./mdspectra.toml`, then the per-user config directory.
pub fn find_config() -> Option<PathBuf> {
    let local = PathBuf::from("mdspectra.toml");
    if local.exists() {
        return Some(local);
    }
    if let Some(config_dir) = dirs::config_dir() {
        let platform = config_dir.join("mdspectra").join("config.toml");
        if platform.exists() {
            return Some(platform);
        }
    }
    None
}
