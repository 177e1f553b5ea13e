//! State shared by every stage of one run.

use crate::audio::fft::PlanCache;
use crate::audio::signal::{Role, Signal};
use crate::audio::window::WindowTable;
use crate::config::AnalysisConfig;
use crate::profile::Timeline;

pub struct Context {
    pub config: AnalysisConfig,
    pub plans: PlanCache,
    pub windows: WindowTable,
    /// Frame duration measured on the reference recording
    pub reference_framerate: f64,
    /// Shortest frame duration measured across the run's recordings
    pub smaller_framerate: f64,
    /// dBFS threshold in use; only ever raised by a detected noise floor
    pub significant_amplitude: f64,
    /// Most bins blanked in a single block during reconstruction
    pub max_blanked: usize,
}

impl Context {
    pub fn new(config: AnalysisConfig) -> Self {
        Self {
            windows: WindowTable::new(config.window),
            significant_amplitude: config.significant_amplitude,
            config,
            plans: PlanCache::new(),
            reference_framerate: 0.0,
            smaller_framerate: 0.0,
            max_blanked: 0,
        }
    }

    /// Declared frame duration a recording of `role` is expected to have.
    pub fn expected_ms_per_frame(&self, timeline: &Timeline, role: Role) -> f64 {
        if self.config.use_comparison_profile {
            timeline.ms_per_frame_for(role)
        } else {
            timeline.ms_per_frame
        }
    }

    /// Record a synchronised signal's measured rate.
    pub fn register_framerate(&mut self, signal: &Signal) {
        if signal.role == Role::Reference {
            self.reference_framerate = signal.framerate;
        }
        if self.smaller_framerate <= 0.0 || signal.framerate < self.smaller_framerate {
            self.smaller_framerate = signal.framerate;
        }
    }

    /// Upper analysis bound for `signal`, after any Nyquist clamp.
    pub fn end_hz(&self, signal: &Signal) -> f64 {
        signal.end_hz.unwrap_or(self.config.end_hz)
    }
}
