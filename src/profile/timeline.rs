//! The ordered block timeline a recording is cut into.

use serde::{Deserialize, Serialize};

use crate::audio::signal::Role;
use crate::audio::timing;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BlockType {
    Silence,
    SyncStart,
    SyncEnd,
    InternalSyncKnown,
    InternalSyncUnknown,
    Content,
}

impl BlockType {
    /// Blocks whose spectrum is computed.
    pub fn is_analyzed(&self) -> bool {
        matches!(self, BlockType::Silence | BlockType::Content)
    }

    pub fn is_internal_sync(&self) -> bool {
        matches!(
            self,
            BlockType::InternalSyncKnown | BlockType::InternalSyncUnknown
        )
    }
}

/// Frequency and duration of the tone that marks an internal sync point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SyncTone {
    pub frequency: f64,
    pub seconds: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BlockDescriptor {
    pub name: String,
    pub block_type: BlockType,
    pub frames: u64,
    pub elements: u32,
    pub color: String,
    pub sync_tone: Option<SyncTone>,
}

/// Pulse-train detection policy shared by the whole timeline.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PulseProfile {
    /// Tone frequency of each pulse in Hz
    pub frequency: f64,
    /// Quietest pulse accepted, in dBFS
    pub min_volume: f64,
    /// How far below the train's first pulse a later pulse may fall, in dB
    pub volume_delta: f64,
    /// Shortest accepted pulse or gap, in video frames
    pub frame_min_len: f64,
    /// Longest accepted pulse or gap, in video frames
    pub frame_max_len: f64,
    /// Consecutive qualifying pulses that make a train
    pub count: u32,
}

impl Default for PulseProfile {
    fn default() -> Self {
        Self {
            frequency: 8820.0,
            min_volume: -25.0,
            volume_delta: 25.0,
            frame_min_len: 14.0,
            frame_max_len: 18.0,
            count: 10,
        }
    }
}

/// One flattened timeline position: a descriptor repetition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimelineEntry {
    pub descriptor: usize,
    pub sub_index: u32,
    pub block_type: BlockType,
    pub frames: u64,
}

#[derive(Debug, Clone)]
pub struct Timeline {
    pub name: String,
    pub ms_per_frame: f64,
    pub comparison_ms_per_frame: Option<f64>,
    pub pulse: PulseProfile,
    descriptors: Vec<BlockDescriptor>,
    entries: Vec<TimelineEntry>,
}

impl Timeline {
    /// Expands each descriptor into `elements` entries. No validation is done
    /// here; see `profile::loader::validate`.
    pub fn new(
        name: impl Into<String>,
        ms_per_frame: f64,
        pulse: PulseProfile,
        descriptors: Vec<BlockDescriptor>,
    ) -> Self {
        let mut timeline = Self {
            name: name.into(),
            ms_per_frame,
            comparison_ms_per_frame: None,
            pulse,
            descriptors,
            entries: Vec::new(),
        };
        timeline.flatten();
        timeline
    }

    pub fn with_comparison_ms_per_frame(mut self, ms_per_frame: Option<f64>) -> Self {
        self.comparison_ms_per_frame = ms_per_frame;
        self
    }

    fn flatten(&mut self) {
        self.entries = self
            .descriptors
            .iter()
            .enumerate()
            .flat_map(|(index, d)| {
                (0..d.elements).map(move |sub_index| TimelineEntry {
                    descriptor: index,
                    sub_index,
                    block_type: d.block_type,
                    frames: d.frames,
                })
            })
            .collect();
    }

    /// Fold every descriptor's repetitions into a single long entry.
    pub fn compress_to_blocks(&mut self) {
        for d in &mut self.descriptors {
            d.frames *= d.elements as u64;
            d.elements = 1;
        }
        self.flatten();
    }

    pub fn descriptors(&self) -> &[BlockDescriptor] {
        &self.descriptors
    }

    pub fn entries(&self) -> &[TimelineEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn descriptor(&self, entry: usize) -> &BlockDescriptor {
        &self.descriptors[self.entries[entry].descriptor]
    }

    pub fn block_name(&self, entry: usize) -> &str {
        &self.descriptor(entry).name
    }

    /// Declared frame duration for signals of `role`.
    pub fn ms_per_frame_for(&self, role: Role) -> f64 {
        match role {
            Role::Reference => self.ms_per_frame,
            Role::Comparison => self.comparison_ms_per_frame.unwrap_or(self.ms_per_frame),
        }
    }

    pub fn total_frames(&self) -> u64 {
        self.entries.iter().map(|e| e.frames).sum()
    }

    pub fn total_seconds(&self, ms_per_frame: f64) -> f64 {
        timing::frames_to_seconds(self.total_frames() as f64, ms_per_frame)
    }

    pub fn longest_entry_frames(&self) -> u64 {
        self.entries.iter().map(|e| e.frames).max().unwrap_or(0)
    }

    fn first_of(&self, block_type: BlockType) -> Option<usize> {
        self.entries.iter().position(|e| e.block_type == block_type)
    }

    pub fn sync_start_index(&self) -> Option<usize> {
        self.first_of(BlockType::SyncStart)
    }

    pub fn sync_end_index(&self) -> Option<usize> {
        self.first_of(BlockType::SyncEnd)
    }

    pub fn first_silence_index(&self) -> Option<usize> {
        self.first_of(BlockType::Silence)
    }

    /// Frames from the start of the leading sync block to the start of the
    /// trailing one.
    pub fn frames_between_syncs(&self) -> Option<u64> {
        let start = self.sync_start_index()?;
        let end = self.sync_end_index()?;
        if end <= start {
            return None;
        }
        Some(self.entries[start..end].iter().map(|e| e.frames).sum())
    }

    /// Frames from the start of the leading sync block to the end of it.
    pub fn sync_start_frames(&self) -> u64 {
        self.sync_start_index()
            .map(|i| self.entries[i].frames)
            .unwrap_or(0)
    }

    /// Frames covered by the internal sync segment opened at `entry`: every
    /// following entry up to and including the next internal sync entry, or
    /// to the end of the timeline when the segment is never closed.
    pub fn internal_sync_total_frames(&self, entry: usize) -> u64 {
        let mut total = 0;
        for e in self.entries.iter().skip(entry + 1) {
            total += e.frames;
            if e.block_type.is_internal_sync() {
                break;
            }
        }
        total
    }
}
