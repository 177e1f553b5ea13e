use clap::Parser;
use std::path::PathBuf;

use mdspectra::audio::normalize::NormalizationMode;
use mdspectra::audio::signal::Channel;
use mdspectra::audio::window::WindowKind;
use mdspectra::config::{self, AnalysisConfig, Config};

#[derive(Parser, Debug)]
#[command(
    name = "mdspectra",
    about = "Synchronise a recorded test sequence, analyse its blocks and filter out what is not significant"
)]
pub struct Cli {
    /// Reference recording (16-bit WAV or FLAC)
    pub reference: PathBuf,

    /// Block timeline profile (TOML)
    #[arg(short, long)]
    pub profile: PathBuf,

    /// Second recording of the same sequence
    #[arg(short = 'c', long)]
    pub compare: Option<PathBuf>,

    /// Config file (default: ./mdspectra.toml or the user config directory)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Output directory
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Window applied to every block
    #[arg(short, long, value_enum, default_value_t = WindowKind::Tukey)]
    pub window: WindowKind,

    /// Channel to analyse
    #[arg(short = 'a', long, value_enum, default_value_t = Channel::Stereo)]
    pub channel: Channel,

    /// Amplitude reference
    #[arg(short, long, value_enum, default_value_t = NormalizationMode::PeakFrequency)]
    pub normalization: NormalizationMode,

    /// Start of the analysed range in Hz
    #[arg(short, long, default_value_t = config::START_HZ)]
    pub start_hz: f64,

    /// End of the analysed range in Hz
    #[arg(short, long, default_value_t = config::END_HZ)]
    pub end_hz: f64,

    /// Frequencies kept per block
    #[arg(short, long, default_value_t = config::FREQ_COUNT)]
    pub max_frequencies: usize,

    /// Amplitude in dBFS below which content is noise
    #[arg(short = 'i', long, default_value_t = config::SIGNIFICANT_AMPLITUDE, allow_hyphen_values = true)]
    pub significant: f64,

    /// Do not raise the threshold to the measured noise floor
    #[arg(short = 'f', long)]
    pub ignore_floor: bool,

    /// Continue when the measured frame rate is off
    #[arg(short = 'I', long)]
    pub ignore_frame_rate: bool,

    /// Pad each block to whole seconds for 1Hz bins
    #[arg(short = 'z', long)]
    pub zero_pad: bool,

    /// Only compute the spectral tables
    #[arg(long)]
    pub no_reconstruct: bool,

    /// Fold repeated blocks into one
    #[arg(short = 'B', long)]
    pub compress_blocks: bool,

    /// Write every block as its own WAV file
    #[arg(long)]
    pub chunks: bool,

    /// Use the profile's comparison frame rate for the second recording
    #[arg(short = 'C', long)]
    pub comparison_profile: bool,

    /// Write the spectral tables as JSON
    #[arg(long)]
    pub json: bool,

    /// Debug logging
    #[arg(short, long)]
    pub verbose: bool,
}

impl Cli {
    /// Merge: config values apply only when the CLI is at its default.
    pub fn merge(&mut self, cfg: Config) {
        let a = cfg.analysis;
        if self.window == WindowKind::default() { self.window = a.window; }
        if self.channel == Channel::default() { self.channel = a.channel; }
        if self.normalization == NormalizationMode::default() { self.normalization = a.normalization; }
        if self.start_hz == config::START_HZ { self.start_hz = a.start_hz; }
        if self.end_hz == config::END_HZ { self.end_hz = a.end_hz; }
        if self.max_frequencies == config::FREQ_COUNT { self.max_frequencies = a.max_frequencies; }
        if self.significant == config::SIGNIFICANT_AMPLITUDE { self.significant = a.significant_amplitude; }
        self.ignore_floor |= a.ignore_floor;
        self.ignore_frame_rate |= a.ignore_frame_rate_diff;
        self.zero_pad |= a.zero_pad;
        self.no_reconstruct |= !a.reconstruct;
        self.compress_blocks |= a.compress_to_blocks;
        self.chunks |= a.chunks;
        self.comparison_profile |= a.use_comparison_profile;
        self.json |= cfg.output.json;
        if self.output.is_none() {
            self.output = Some(cfg.output.dir);
        }
    }

    pub fn analysis_config(&self) -> AnalysisConfig {
        AnalysisConfig {
            window: self.window,
            channel: self.channel,
            normalization: self.normalization,
            start_hz: self.start_hz,
            end_hz: self.end_hz,
            max_frequencies: self.max_frequencies,
            significant_amplitude: self.significant,
            ignore_floor: self.ignore_floor,
            ignore_frame_rate_diff: self.ignore_frame_rate,
            zero_pad: self.zero_pad,
            invert: false,
            reconstruct: !self.no_reconstruct,
            compress_to_blocks: self.compress_blocks,
            chunks: self.chunks,
            use_comparison_profile: self.comparison_profile,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_letter_codes_are_accepted() {
        let cli = Cli::try_parse_from([
            "mdspectra", "ref.wav", "-p", "genesis.toml", "-w", "n", "-a", "l", "-n", "a", "-i", "-50",
        ])
        .unwrap();
        assert_eq!(cli.window, WindowKind::Rectangular);
        assert_eq!(cli.channel, Channel::Left);
        assert_eq!(cli.normalization, NormalizationMode::AverageFundamentals);
        assert_eq!(cli.significant, -50.0);
    }

    #[test]
    fn config_fills_only_defaults() {
        let mut cli = Cli::try_parse_from(["mdspectra", "ref.wav", "-p", "p.toml", "-s", "40"]).unwrap();
        let cfg: Config = toml::from_str(
            r#"
            [analysis]
            window = "hann"
            start_hz = 100.0
            end_hz = 15000.0
            reconstruct = false

            [output]
            dir = "spectra"
            "#,
        )
        .unwrap();

        cli.merge(cfg);
        let analysis = cli.analysis_config();
        assert_eq!(analysis.window, WindowKind::Hann);
        assert_eq!(analysis.start_hz, 40.0);
        assert_eq!(analysis.end_hz, 15000.0);
        assert!(!analysis.reconstruct);
        assert_eq!(cli.output, Some(PathBuf::from("spectra")));
    }
}
