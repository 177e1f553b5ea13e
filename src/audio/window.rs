//! Window functions applied to each block before the forward transform.

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::f64::consts::PI;
use std::sync::Arc;

/// Fraction of a Tukey window spent in the cosine tapers.
pub const TUKEY_ALPHA: f64 = 0.5;

// Flat top coefficients (peak normalised to 1.0 at the centre).
const FLATTOP: [f64; 5] = [
    0.215_578_95,
    0.416_631_58,
    0.277_263_158,
    0.083_578_947,
    0.006_947_368,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum WindowKind {
    /// No window (rectangular)
    #[value(name = "none", alias = "n")]
    #[serde(alias = "n", alias = "none")]
    Rectangular,
    #[value(alias = "t")]
    #[serde(alias = "t")]
    Tukey,
    #[value(alias = "h")]
    #[serde(alias = "h")]
    Hann,
    #[value(alias = "f")]
    #[serde(alias = "f")]
    Flattop,
    #[value(alias = "m")]
    #[serde(alias = "m")]
    Hamming,
}

impl Default for WindowKind {
    fn default() -> Self {
        WindowKind::Tukey
    }
}

impl WindowKind {
    pub fn label(&self) -> &'static str {
        match self {
            WindowKind::Rectangular => "Rectangular",
            WindowKind::Tukey => "Tukey",
            WindowKind::Hann => "Hann",
            WindowKind::Flattop => "Flattop",
            WindowKind::Hamming => "Hamming",
        }
    }

    /// Window coefficients for `len` samples, each in `[0, 1]`.
    pub fn coefficients(&self, len: usize) -> Vec<f64> {
        if len <= 1 {
            return vec![1.0; len];
        }
        let last = (len - 1) as f64;

        match self {
            WindowKind::Rectangular => vec![1.0; len],
            WindowKind::Hann => apodize::hanning_iter(len).map(clamp_unit).collect(),
            WindowKind::Hamming => apodize::hamming_iter(len).map(clamp_unit).collect(),
            WindowKind::Tukey => (0..len)
                .map(|i| tukey(i as f64 / last, TUKEY_ALPHA))
                .collect(),
            WindowKind::Flattop => (0..len)
                .map(|i| {
                    let x = 2.0 * PI * i as f64 / last;
                    let w = FLATTOP[0] - FLATTOP[1] * x.cos() + FLATTOP[2] * (2.0 * x).cos()
                        - FLATTOP[3] * (3.0 * x).cos()
                        + FLATTOP[4] * (4.0 * x).cos();
                    clamp_unit(w)
                })
                .collect(),
        }
    }
}

fn tukey(x: f64, alpha: f64) -> f64 {
    if alpha <= 0.0 {
        return 1.0;
    }
    let half = alpha / 2.0;
    let w = if x < half {
        0.5 * (1.0 - (PI * x / half).cos())
    } else if x > 1.0 - half {
        0.5 * (1.0 - (PI * (1.0 - x) / half).cos())
    } else {
        1.0
    };
    clamp_unit(w)
}

fn clamp_unit(w: f64) -> f64 {
    w.clamp(0.0, 1.0)
}

/// Coefficient arrays keyed by block length in samples.
///
/// Arrays are built the first time a length is requested and shared
/// read-only afterwards. A rectangular table hands out nothing, since
/// multiplying by ones is skipped.
pub struct WindowTable {
    kind: WindowKind,
    windows: HashMap<usize, Arc<[f64]>>,
}

impl WindowTable {
    pub fn new(kind: WindowKind) -> Self {
        Self {
            kind,
            windows: HashMap::new(),
        }
    }

    pub fn kind(&self) -> WindowKind {
        self.kind
    }

    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }

    pub fn get(&mut self, len: usize) -> Option<Arc<[f64]>> {
        if self.kind == WindowKind::Rectangular || len == 0 {
            return None;
        }
        let kind = self.kind;
        let window = self
            .windows
            .entry(len)
            .or_insert_with(|| Arc::from(kind.coefficients(len)));
        Some(Arc::clone(window))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KINDS: [WindowKind; 5] = [
        WindowKind::Rectangular,
        WindowKind::Tukey,
        WindowKind::Hann,
        WindowKind::Flattop,
        WindowKind::Hamming,
    ];

    #[test]
    fn coefficients_have_requested_length_and_unit_range() {
        for kind in KINDS {
            for len in [0usize, 1, 2, 7, 256, 801, 4800] {
                let w = kind.coefficients(len);
                assert_eq!(w.len(), len, "{:?} len {}", kind, len);
                assert!(w.iter().all(|&c| (0.0..=1.0).contains(&c)), "{:?}", kind);
            }
        }
    }

    #[test]
    fn endpoints() {
        let len = 1024;
        let rect = WindowKind::Rectangular.coefficients(len);
        assert!(rect.iter().all(|&c| c == 1.0));

        for kind in [WindowKind::Tukey, WindowKind::Hann, WindowKind::Flattop] {
            let w = kind.coefficients(len);
            assert!(w[0] < 1e-6, "{:?} starts at {}", kind, w[0]);
            assert!(w[len - 1] < 1e-6, "{:?} ends at {}", kind, w[len - 1]);
        }

        let hamming = WindowKind::Hamming.coefficients(len);
        assert!((hamming[0] - 0.08).abs() < 1e-6);
        assert!((hamming[len - 1] - 0.08).abs() < 1e-6);
    }

    #[test]
    fn tukey_is_flat_in_the_middle() {
        let w = WindowKind::Tukey.coefficients(1000);
        assert!(w[500] == 1.0);
        assert!(w[300] == 1.0);
        assert!(w[100] < 1.0);
    }

    #[test]
    fn table_shares_arrays_per_length() {
        let mut table = WindowTable::new(WindowKind::Hann);
        let a = table.get(480).unwrap();
        let b = table.get(480).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        table.get(960);
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn rectangular_table_skips_windowing() {
        let mut table = WindowTable::new(WindowKind::Rectangular);
        assert!(table.get(480).is_none());
        assert!(table.get(960).is_none());
        assert!(table.is_empty());
    }
}
