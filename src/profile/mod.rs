pub mod loader;
pub mod manifest;
pub mod timeline;

pub use timeline::{BlockDescriptor, BlockType, PulseProfile, SyncTone, Timeline, TimelineEntry};
