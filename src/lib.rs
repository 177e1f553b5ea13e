//! Sync detection, block segmentation and spectral filtering for recordings
//! of a known test sequence.

pub mod audio;
pub mod config;
pub mod context;
pub mod encode;
pub mod engine;
pub mod error;
pub mod profile;
pub mod report;

#[cfg(test)]
mod testing;

pub use error::{EngineError, Result};
