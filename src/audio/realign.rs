//! Internal sync realignment.
//!
//! Some blocks are preceded by a short sync tone whose real position drifts
//! with the console's command latency. The tone is located inside the
//! segment that follows the internal sync entry and the segment is spliced
//! in place so its content starts where the timeline expects it. Splicing
//! never changes the buffer length; vacated bytes are zeroed.
//!
//! All positions here are byte offsets into the interleaved 16-bit arena.

use std::ops::Range;

use crate::context::Context;
use crate::error::{EngineError, Result};
use crate::profile::{BlockType, Timeline};

use super::signal::Signal;
use super::{sync, timing};

/// Segment bookkeeping carried across the timeline walk.
///
/// Internal sync entries come in pairs: the first opens a segment and
/// realigns it, the second closes it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RealignState {
    pub pending: bool,
    /// Bytes cut out of the timeline so far
    pub advance: usize,
}

fn samples(range: Range<usize>) -> Range<usize> {
    range.start / timing::BYTES_PER_SAMPLE..range.end / timing::BYTES_PER_SAMPLE
}

/// Copy the bytes in `src` to `dst`. Overlapping ranges are fine.
pub fn move_range(arena: &mut [i16], src: Range<usize>, dst: usize) {
    arena.copy_within(samples(src), dst / timing::BYTES_PER_SAMPLE);
}

pub fn zero_range(arena: &mut [i16], range: Range<usize>) {
    arena[samples(range)].fill(0);
}

fn out_of_bounds(block: &str, skip: usize, available: usize) -> EngineError {
    EngineError::InternalSyncOutOfBounds {
        block: block.to_string(),
        skip,
        available,
    }
}

/// Drop `[pos, pos + skip)` from the segment `[pos, pos + bytes)`.
pub fn splice_known(arena: &mut [i16], block: &str, pos: usize, skip: usize, bytes: usize) -> Result<()> {
    if bytes <= skip {
        return Err(out_of_bounds(block, skip, bytes));
    }
    move_range(arena, pos + skip..pos + bytes, pos);
    zero_range(arena, pos + bytes - skip..pos + bytes);
    Ok(())
}

/// Move the `bytes - padding` bytes found after `pos + skip` to `pos`,
/// zeroing what they leave behind.
pub fn splice_unknown(
    arena: &mut [i16],
    block: &str,
    pos: usize,
    skip: usize,
    bytes: usize,
    padding: usize,
) -> Result<()> {
    if bytes <= skip {
        return Err(out_of_bounds(block, skip, bytes));
    }
    let len = arena.len() * timing::BYTES_PER_SAMPLE;
    let mut bytes = bytes;
    if pos + skip + bytes - padding > len {
        bytes = len - (pos + skip) + padding;
    }
    let size = bytes - padding;

    move_range(arena, pos + skip..pos + skip + size, pos);
    zero_range(arena, (pos + size).max(pos + skip)..pos + skip + size);
    Ok(())
}

/// Handle the internal sync entry at `entry`, whose declared end is `pos`.
///
/// Opens a segment on the first call and realigns it; the matching closing
/// entry only clears the pending flag. The segment's length is taken at the
/// reference frame rate.
pub fn process_internal(
    signal: &mut Signal,
    timeline: &Timeline,
    entry: usize,
    pos: usize,
    ctx: &mut Context,
    state: &mut RealignState,
) -> Result<()> {
    if state.pending {
        state.pending = false;
        return Ok(());
    }
    state.pending = true;

    let descriptor = timeline.descriptor(entry);
    let name = descriptor.name.clone();
    let block_type = descriptor.block_type;
    let tone = descriptor
        .sync_tone
        .ok_or_else(|| EngineError::InvalidProfile(format!("internal sync block '{}' has no sync_tone", name)))?;

    let frames = timeline.internal_sync_total_frames(entry);
    if frames == 0 {
        return Err(EngineError::InvalidProfile(format!(
            "internal sync block '{}' has no frame duration",
            name
        )));
    }

    let framerate = ctx.reference_framerate;
    let seconds = timing::frames_to_seconds(frames as f64, framerate);
    let mut bytes = timing::seconds_to_bytes(signal.sample_rate, seconds, signal.channels);
    let len = signal.byte_len();
    if pos + bytes > len {
        bytes = len.saturating_sub(pos);
        log::debug!("Internal sync segment for '{}' is cut short by the end of the recording", name);
    }
    log::debug!(
        "Internal segment '{}' at byte {}: {} frames, {:.4}s, {} bytes",
        name,
        pos,
        frames,
        seconds,
        bytes
    );

    let pulse = sync::detect_tone(
        signal,
        &tone,
        timeline.pulse.min_volume,
        signal.framerate,
        pos..pos + bytes,
        &mut ctx.plans,
    )?
    .ok_or_else(|| EngineError::SyncNotFound {
        marker: format!("internal sync '{}'", name),
    })?;

    let offset = pulse.offset - pos;
    let sync_length = timing::seconds_to_bytes(signal.sample_rate, tone.seconds, signal.channels);

    log::info!(
        "{} command delay: {:.4}ms [{:.4} frames]",
        name,
        timing::bytes_to_seconds(signal.sample_rate, offset, signal.channels) * 1000.0,
        timing::bytes_to_frames(signal.sample_rate, offset, framerate, signal.channels)
    );

    let skip = match block_type {
        BlockType::InternalSyncUnknown => {
            let frame_bytes = signal.frame_bytes();
            let half = sync_length / 2 / frame_bytes * frame_bytes;
            let pulse_length = pulse.length.min(half);
            let skip = offset + pulse_length + half;
            splice_unknown(&mut signal.samples, &name, pos, skip, bytes, half + pulse_length)?;
            skip
        }
        _ => {
            let skip = offset + sync_length;
            splice_known(&mut signal.samples, &name, pos, skip, bytes)?;
            skip
        }
    };

    state.advance += skip;
    signal.sync_advance = state.advance;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::signal::Role;
    use crate::config::AnalysisConfig;
    use crate::profile::SyncTone;
    use crate::testing::{self, Recording, FRAME};

    const MS: usize = 48;

    fn tone() -> SyncTone {
        SyncTone {
            frequency: 8820.0,
            seconds: 0.1,
        }
    }

    fn timeline(block_type: BlockType) -> Timeline {
        testing::timeline(
            testing::pulse_profile(4),
            vec![
                testing::descriptor("Before", BlockType::Content, 10, 1),
                testing::internal_sync("Marker", block_type, 5, tone()),
                testing::descriptor("After", BlockType::Content, 20, 1),
                testing::internal_sync("Close", block_type, 1, tone()),
            ],
        )
    }

    /// 50ms late: silence, 20ms tone, 80ms silence, then 1kHz content.
    fn late_recording() -> (Signal, usize) {
        let rec = Recording::new(2).silence(15 * FRAME);
        let pos = rec.byte_position();
        let signal = rec
            .silence(50 * MS)
            .tone(8820.0, -6.0, 20 * MS)
            .silence(80 * MS)
            .tone(1000.0, -6.0, 40 * FRAME)
            .into_signal(Role::Reference);
        (signal, pos)
    }

    fn context() -> Context {
        let mut ctx = Context::new(AnalysisConfig::default());
        ctx.reference_framerate = testing::MS_PER_FRAME;
        ctx
    }

    fn bytes_for_ms(ms: usize) -> usize {
        ms * MS * 4
    }

    #[test]
    fn known_length_cuts_delay_and_sync_tone() {
        let (mut signal, pos) = late_recording();
        signal.framerate = testing::MS_PER_FRAME;
        let original = signal.samples.clone();
        let timeline = timeline(BlockType::InternalSyncKnown);
        let mut ctx = context();
        let mut state = RealignState::default();

        process_internal(&mut signal, &timeline, 1, pos, &mut ctx, &mut state).unwrap();

        let shift = bytes_for_ms(150);
        let segment = bytes_for_ms(420);
        assert_eq!(state.advance, shift);
        assert_eq!(signal.sync_advance, shift);
        assert_eq!(signal.samples.len(), original.len());
        assert_eq!(
            signal.bytes(pos, pos + segment - shift),
            &original[(pos + shift) / 2..(pos + segment) / 2]
        );
        assert!(signal.bytes(pos + segment - shift, pos + segment).iter().all(|&s| s == 0));
        assert_eq!(
            signal.bytes(pos + segment, signal.byte_len()),
            &original[(pos + segment) / 2..]
        );
        assert!(state.pending);
    }

    #[test]
    fn closing_entry_only_clears_pending() {
        let (mut signal, pos) = late_recording();
        signal.framerate = testing::MS_PER_FRAME;
        let original = signal.samples.clone();
        let timeline = timeline(BlockType::InternalSyncKnown);
        let mut state = RealignState {
            pending: true,
            advance: 0,
        };

        process_internal(&mut signal, &timeline, 3, pos, &mut context(), &mut state).unwrap();
        assert!(!state.pending);
        assert_eq!(signal.samples, original);
    }

    #[test]
    fn unknown_length_keeps_half_the_sync_gap() {
        let (mut signal, pos) = late_recording();
        signal.framerate = testing::MS_PER_FRAME;
        let original = signal.samples.clone();
        let timeline = timeline(BlockType::InternalSyncUnknown);
        let mut ctx = context();
        let mut state = RealignState::default();

        process_internal(&mut signal, &timeline, 1, pos, &mut ctx, &mut state).unwrap();

        // 50ms delay + 20ms pulse + half of the 100ms sync tone
        let skip = bytes_for_ms(120);
        let padding = bytes_for_ms(70);
        let size = bytes_for_ms(420) - padding;
        assert_eq!(state.advance, skip);
        assert_eq!(signal.samples.len(), original.len());
        assert_eq!(
            signal.bytes(pos, pos + size),
            &original[(pos + skip) / 2..(pos + skip + size) / 2]
        );
        assert!(signal.bytes(pos + size, pos + skip + size).iter().all(|&s| s == 0));
    }

    #[test]
    fn missing_tone_is_reported() {
        let rec = Recording::new(2).silence(15 * FRAME);
        let pos = rec.byte_position();
        let mut signal = rec.silence(40 * FRAME).into_signal(Role::Reference);
        signal.framerate = testing::MS_PER_FRAME;
        let timeline = timeline(BlockType::InternalSyncKnown);

        let err = process_internal(
            &mut signal,
            &timeline,
            1,
            pos,
            &mut context(),
            &mut RealignState::default(),
        )
        .unwrap_err();
        assert!(matches!(err, EngineError::SyncNotFound { .. }));
    }

    #[test]
    fn skip_past_segment_is_out_of_bounds() {
        let mut arena = vec![1i16; 100];
        let err = splice_known(&mut arena, "Marker", 0, 120, 120).unwrap_err();
        assert!(matches!(err, EngineError::InternalSyncOutOfBounds { skip: 120, available: 120, .. }));
        assert!(splice_unknown(&mut arena, "Marker", 0, 200, 80, 40).is_err());
        assert!(arena.iter().all(|&s| s == 1));
    }

    #[test]
    fn splice_known_arithmetic() {
        let mut arena: Vec<i16> = (0..10).collect();
        splice_known(&mut arena, "x", 4, 4, 12).unwrap();
        assert_eq!(arena, vec![0, 1, 4, 5, 6, 7, 0, 0, 8, 9]);
    }

    #[test]
    fn splice_unknown_clamps_to_the_arena() {
        let mut arena: Vec<i16> = (1..=10).collect();
        // skip 3 samples, move 4 samples less 1 of padding
        splice_unknown(&mut arena, "x", 2, 6, 8, 2).unwrap();
        assert_eq!(arena, vec![1, 5, 6, 7, 0, 0, 0, 8, 9, 10]);

        let mut arena: Vec<i16> = (1..=10).collect();
        splice_unknown(&mut arena, "x", 8, 6, 16, 2).unwrap();
        assert_eq!(arena, vec![1, 2, 3, 4, 8, 9, 10, 0, 0, 0]);
    }

    #[test]
    fn move_and_zero_are_range_exact() {
        let mut arena: Vec<i16> = (0..6).collect();
        move_range(&mut arena, 6..12, 0);
        assert_eq!(arena, vec![3, 4, 5, 3, 4, 5]);
        zero_range(&mut arena, 2..6);
        assert_eq!(arena, vec![3, 0, 0, 3, 4, 5]);
    }
}
