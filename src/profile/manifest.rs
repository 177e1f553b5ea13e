use serde::Deserialize;

use super::timeline::{BlockType, PulseProfile, SyncTone};

/// On-disk TOML form of a block timeline profile.
#[derive(Debug, Deserialize)]
pub struct ProfileManifest {
    pub name: String,
    pub ms_per_frame: f64,
    #[serde(default)]
    pub comparison_ms_per_frame: Option<f64>,
    #[serde(default)]
    pub pulse: PulseDef,
    pub blocks: Vec<BlockDef>,
}

#[derive(Debug, Deserialize)]
pub struct PulseDef {
    #[serde(default = "default_pulse_frequency")]
    pub frequency: f64,
    #[serde(default = "default_pulse_min_volume")]
    pub min_volume: f64,
    #[serde(default = "default_pulse_volume_delta")]
    pub volume_delta: f64,
    #[serde(default = "default_pulse_frame_min_len")]
    pub frame_min_len: f64,
    #[serde(default = "default_pulse_frame_max_len")]
    pub frame_max_len: f64,
    #[serde(default = "default_pulse_count")]
    pub count: u32,
}

#[derive(Debug, Deserialize)]
pub struct BlockDef {
    pub name: String,
    #[serde(rename = "type")]
    pub block_type: BlockType,
    pub frames: u64,
    #[serde(default = "default_elements")]
    pub elements: u32,
    #[serde(default = "default_color")]
    pub color: String,
    #[serde(default)]
    pub sync_tone: Option<SyncTone>,
}

impl Default for PulseDef {
    fn default() -> Self {
        Self {
            frequency: default_pulse_frequency(),
            min_volume: default_pulse_min_volume(),
            volume_delta: default_pulse_volume_delta(),
            frame_min_len: default_pulse_frame_min_len(),
            frame_max_len: default_pulse_frame_max_len(),
            count: default_pulse_count(),
        }
    }
}

impl From<&PulseDef> for PulseProfile {
    fn from(def: &PulseDef) -> Self {
        PulseProfile {
            frequency: def.frequency,
            min_volume: def.min_volume,
            volume_delta: def.volume_delta,
            frame_min_len: def.frame_min_len,
            frame_max_len: def.frame_max_len,
            count: def.count,
        }
    }
}

fn default_pulse_frequency() -> f64 { PulseProfile::default().frequency }
fn default_pulse_min_volume() -> f64 { PulseProfile::default().min_volume }
fn default_pulse_volume_delta() -> f64 { PulseProfile::default().volume_delta }
fn default_pulse_frame_min_len() -> f64 { PulseProfile::default().frame_min_len }
fn default_pulse_frame_max_len() -> f64 { PulseProfile::default().frame_max_len }
fn default_pulse_count() -> u32 { PulseProfile::default().count }
fn default_elements() -> u32 { 1 }
fn default_color() -> String { "white".into() }
