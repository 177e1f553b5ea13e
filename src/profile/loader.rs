use std::path::Path;

use crate::error::{EngineError, Result};

use super::manifest::ProfileManifest;
use super::timeline::{BlockDescriptor, BlockType, Timeline};

pub fn load_profile(path: &Path) -> Result<Timeline> {
    let content = std::fs::read_to_string(path)?;
    let timeline = parse_profile(&content).map_err(|e| match e {
        EngineError::InvalidProfile(msg) => {
            EngineError::InvalidProfile(format!("{}: {}", path.display(), msg))
        }
        other => other,
    })?;
    log::info!(
        "Loaded profile '{}' from {} ({} blocks, {:.4}ms per frame)",
        timeline.name,
        path.display(),
        timeline.len(),
        timeline.ms_per_frame
    );
    Ok(timeline)
}

pub fn parse_profile(content: &str) -> Result<Timeline> {
    let manifest: ProfileManifest =
        toml::from_str(content).map_err(|e| EngineError::InvalidProfile(e.to_string()))?;

    let descriptors = manifest
        .blocks
        .iter()
        .map(|b| BlockDescriptor {
            name: b.name.clone(),
            block_type: b.block_type,
            frames: b.frames,
            elements: b.elements,
            color: b.color.clone(),
            sync_tone: b.sync_tone,
        })
        .collect();

    let timeline = Timeline::new(
        manifest.name,
        manifest.ms_per_frame,
        (&manifest.pulse).into(),
        descriptors,
    )
    .with_comparison_ms_per_frame(manifest.comparison_ms_per_frame);

    validate(&timeline)?;
    Ok(timeline)
}

/// Structural checks every timeline must pass before any audio is touched.
pub fn validate(timeline: &Timeline) -> Result<()> {
    let invalid = |msg: String| Err(EngineError::InvalidProfile(msg));

    if timeline.ms_per_frame <= 0.0 {
        return invalid(format!("ms_per_frame must be positive, got {}", timeline.ms_per_frame));
    }
    if let Some(ms) = timeline.comparison_ms_per_frame {
        if ms <= 0.0 {
            return invalid(format!("comparison_ms_per_frame must be positive, got {}", ms));
        }
    }

    let pulse = &timeline.pulse;
    if pulse.frame_min_len <= 0.0 || pulse.frame_max_len < pulse.frame_min_len {
        return invalid(format!(
            "pulse frame length range {}-{} is invalid",
            pulse.frame_min_len, pulse.frame_max_len
        ));
    }
    if pulse.count == 0 {
        return invalid("pulse count must be at least 1".into());
    }

    let descriptors = timeline.descriptors();
    for d in descriptors {
        if d.elements == 0 {
            return invalid(format!("block '{}' has no elements", d.name));
        }
        if d.block_type.is_internal_sync() && d.sync_tone.is_none() {
            return invalid(format!("internal sync block '{}' has no sync_tone", d.name));
        }
    }

    let count = |t: BlockType| descriptors.iter().filter(|d| d.block_type == t).count();
    let starts = count(BlockType::SyncStart);
    let ends = count(BlockType::SyncEnd);
    if starts > 1 {
        return invalid("more than one sync-start block".into());
    }
    if ends > 1 {
        return invalid("more than one sync-end block".into());
    }
    if ends == 1 && starts == 0 {
        return invalid("sync-end block without a sync-start block".into());
    }
    if starts == 1 && timeline.sync_start_index() != Some(0) {
        return invalid("sync-start must be the first block".into());
    }
    if starts == 1 && ends == 0 {
        return invalid("trailing sync-end block is not defined".into());
    }

    if timeline.total_frames() == 0 {
        return invalid("total declared duration is zero".into());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const PROFILE: &str = r#"
name = "Test Sequence"
ms_per_frame = 16.6905

[pulse]
count = 4

[[blocks]]
name = "Sync"
type = "sync-start"
frames = 60

[[blocks]]
name = "Silence"
type = "silence"
frames = 20

[[blocks]]
name = "FM"
type = "content"
frames = 10
elements = 8
color = "red"

[[blocks]]
name = "Marker"
type = "internal-sync-known"
frames = 5
sync_tone = { frequency = 8820, seconds = 0.1 }

[[blocks]]
name = "Sync"
type = "sync-end"
frames = 60
"#;

    #[test]
    fn parses_full_profile() {
        let t = parse_profile(PROFILE).unwrap();
        assert_eq!(t.name, "Test Sequence");
        assert_eq!(t.len(), 1 + 1 + 8 + 1 + 1);
        assert_eq!(t.pulse.count, 4);
        assert_eq!(t.pulse.frequency, 8820.0);
        assert_eq!(t.pulse.frame_min_len, 14.0);
        assert_eq!(t.descriptors()[2].color, "red");
        assert_eq!(t.descriptors()[1].color, "white");
        let tone = t.descriptors()[3].sync_tone.unwrap();
        assert_eq!(tone.seconds, 0.1);
        assert!(t.comparison_ms_per_frame.is_none());
    }

    #[test]
    fn rejects_duplicate_sync_start() {
        let profile = PROFILE.replace("type = \"silence\"", "type = \"sync-start\"");
        let err = parse_profile(&profile).unwrap_err();
        assert!(matches!(err, EngineError::InvalidProfile(_)));
    }

    #[test]
    fn rejects_internal_sync_without_tone() {
        let profile = PROFILE.replace("sync_tone = { frequency = 8820, seconds = 0.1 }", "");
        assert!(parse_profile(&profile).is_err());
    }

    #[test]
    fn rejects_zero_duration() {
        let profile = r#"
name = "Empty"
ms_per_frame = 20.0

[[blocks]]
name = "Nothing"
type = "content"
frames = 0
"#;
        let err = parse_profile(profile).unwrap_err();
        assert!(err.to_string().contains("zero"));
    }

    #[test]
    fn rejects_unknown_block_type() {
        let profile = PROFILE.replace("type = \"content\"", "type = \"music\"");
        assert!(parse_profile(&profile).is_err());
    }

    #[test]
    fn profile_without_sync_is_valid() {
        let profile = r#"
name = "No Sync"
ms_per_frame = 20.0

[[blocks]]
name = "Tone"
type = "content"
frames = 50
"#;
        let t = parse_profile(profile).unwrap();
        assert!(t.sync_start_index().is_none());
    }
}
