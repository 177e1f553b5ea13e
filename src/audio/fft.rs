//! Real-input FFT plans and spectrum scaling helpers.

use realfft::{ComplexToReal, RealFftPlanner, RealToComplex};
use rustfft::num_complex::Complex;
use std::collections::HashMap;
use std::sync::Arc;

/// Magnitude of a full-scale 16-bit sine once divided by the transform size.
pub const FULL_SCALE_MAGNITUDE: f64 = 32768.0 / 2.0;

/// dBFS reported for a bin with no energy at all.
pub const NO_AMPLITUDE: f64 = -1000.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Forward,
    Inverse,
}

/// Plans keyed by transform size and direction.
///
/// Creating a plan is the expensive part of a transform, so each
/// `(size, direction)` pair is planned once per run and the resulting `Arc`
/// handed to every block that needs it. Execution through the returned plans
/// is safe from several threads at once.
pub struct PlanCache {
    planner: RealFftPlanner<f64>,
    forward: HashMap<usize, Arc<dyn RealToComplex<f64>>>,
    inverse: HashMap<usize, Arc<dyn ComplexToReal<f64>>>,
}

impl PlanCache {
    pub fn new() -> Self {
        Self {
            planner: RealFftPlanner::new(),
            forward: HashMap::new(),
            inverse: HashMap::new(),
        }
    }

    pub fn forward(&mut self, size: usize) -> Arc<dyn RealToComplex<f64>> {
        let planner = &mut self.planner;
        let plan = self.forward.entry(size).or_insert_with(|| {
            log::debug!("Planning forward FFT of {} samples", size);
            planner.plan_fft_forward(size)
        });
        Arc::clone(plan)
    }

    pub fn inverse(&mut self, size: usize) -> Arc<dyn ComplexToReal<f64>> {
        let planner = &mut self.planner;
        let plan = self.inverse.entry(size).or_insert_with(|| {
            log::debug!("Planning inverse FFT of {} samples", size);
            planner.plan_fft_inverse(size)
        });
        Arc::clone(plan)
    }

    pub fn contains(&self, size: usize, direction: Direction) -> bool {
        match direction {
            Direction::Forward => self.forward.contains_key(&size),
            Direction::Inverse => self.inverse.contains_key(&size),
        }
    }

    /// Number of distinct plans created so far.
    pub fn plan_count(&self) -> usize {
        self.forward.len() + self.inverse.len()
    }
}

impl Default for PlanCache {
    fn default() -> Self {
        Self::new()
    }
}

/// Bin magnitude normalised by the transform size.
pub fn magnitude(bin: Complex<f64>, size: usize) -> f64 {
    if size == 0 {
        return 0.0;
    }
    bin.norm() / size as f64
}

/// Amplitude in dBFS of `magnitude` against `reference`.
///
/// Silent bins map to [`NO_AMPLITUDE`] rather than negative infinity.
pub fn amplitude_dbfs(magnitude: f64, reference: f64) -> f64 {
    if magnitude <= 0.0 || reference <= 0.0 {
        return NO_AMPLITUDE;
    }
    20.0 * (magnitude / reference).log10()
}

/// Inverse of [`amplitude_dbfs`].
pub fn magnitude_from_dbfs(amplitude: f64, reference: f64) -> f64 {
    reference * 10f64.powf(amplitude / 20.0)
}

/// Frequency in Hz of bin `index` for a transform of `size` samples.
pub fn bin_hertz(index: usize, size: usize, sample_rate: u32) -> f64 {
    if size == 0 {
        return 0.0;
    }
    index as f64 * sample_rate as f64 / size as f64
}

/// The C2R transform rejects non-zero imaginary parts at DC and Nyquist.
pub(crate) fn clear_edge_phases(spectrum: &mut [Complex<f64>], size: usize) {
    if let Some(dc) = spectrum.first_mut() {
        dc.im = 0.0;
    }
    if size % 2 == 0 {
        if let Some(nyquist) = spectrum.last_mut() {
            nyquist.im = 0.0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    #[test]
    fn plans_are_created_once_per_size_and_direction() {
        let mut plans = PlanCache::new();
        let a = plans.forward(480);
        let b = plans.forward(480);
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(plans.plan_count(), 1);
        assert!(!plans.contains(480, Direction::Inverse));

        plans.inverse(480);
        plans.forward(960);
        assert_eq!(plans.plan_count(), 3);
        assert!(plans.contains(480, Direction::Inverse));
    }

    #[test]
    fn forward_then_inverse_restores_samples() {
        let size = 1000;
        let mut plans = PlanCache::new();
        let window = crate::audio::window::WindowKind::Hann.coefficients(size);
        let original: Vec<f64> = (0..size)
            .map(|i| 9000.0 * (2.0 * PI * 440.0 * i as f64 / 48000.0).sin() * window[i])
            .collect();

        let forward = plans.forward(size);
        let mut input = original.clone();
        let mut spectrum = forward.make_output_vec();
        forward.process(&mut input, &mut spectrum).unwrap();

        let inverse = plans.inverse(size);
        let mut output = inverse.make_output_vec();
        clear_edge_phases(&mut spectrum, size);
        inverse.process(&mut spectrum, &mut output).unwrap();

        for (a, b) in original.iter().zip(output.iter()) {
            assert!((a - b / size as f64).abs() < 1e-6, "{} vs {}", a, b);
        }
    }

    #[test]
    fn dbfs_scale() {
        assert!(amplitude_dbfs(FULL_SCALE_MAGNITUDE, FULL_SCALE_MAGNITUDE).abs() < 1e-12);
        let half = FULL_SCALE_MAGNITUDE / 2.0;
        assert!((amplitude_dbfs(half, FULL_SCALE_MAGNITUDE) + 6.0206).abs() < 1e-3);
        assert_eq!(amplitude_dbfs(0.0, FULL_SCALE_MAGNITUDE), NO_AMPLITUDE);
        let m = magnitude_from_dbfs(-6.0, FULL_SCALE_MAGNITUDE);
        assert!((amplitude_dbfs(m, FULL_SCALE_MAGNITUDE) + 6.0).abs() < 1e-9);
    }

    #[test]
    fn bins_map_to_hertz() {
        assert_eq!(bin_hertz(1000, 48000, 48000), 1000.0);
        assert_eq!(bin_hertz(5, 960, 48000), 250.0);
    }
}
