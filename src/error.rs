use thiserror::Error;

/// Every failure the engine can surface to its caller.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("unsupported audio format: {0}")]
    FormatUnsupported(String),

    #[error("{marker} sync pulse train was not detected")]
    SyncNotFound { marker: String },

    #[error(
        "internal sync for '{block}' could not be aligned: skipping {skip} bytes leaves nothing of the {available} available"
    )]
    InternalSyncOutOfBounds {
        block: String,
        skip: usize,
        available: usize,
    },

    #[error(
        "frame rate is {percent:.3}% different from the expected {expected:.4}ms (measured {measured:.4}ms)"
    )]
    FrameRateMismatch {
        measured: f64,
        expected: f64,
        percent: f64,
    },

    #[error("out of memory allocating {bytes} bytes")]
    OutOfMemory { bytes: usize },

    #[error("invalid profile: {0}")]
    InvalidProfile(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("FFT failed: {0}")]
    Fft(#[from] realfft::FftError),

    #[error("failed to decode audio: {0}")]
    Decode(#[from] symphonia::core::errors::Error),

    #[error("failed to write WAV: {0}")]
    Wav(#[from] hound::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T, E = EngineError> = std::result::Result<T, E>;
