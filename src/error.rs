//! Fatal error types. Recoverable receive conditions (sync misses, header
//! checksum failures, CRC mismatches) are handled inside the pipeline and
//! never surface here.

use thiserror::Error;

/// Startup configuration error. Any of these prevents the pipeline from
/// being constructed.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("spreading factor {0} out of range (must be 7..=12)")]
    SpreadingFactor(u32),

    #[error("coding rate {0} out of range (must be 1..=4)")]
    CodingRate(u8),

    #[error("sample rate {sample_rate} is not an integer multiple of bandwidth {bandwidth}")]
    NonIntegerOversampling { sample_rate: u32, bandwidth: u32 },

    #[error("bandwidth must be non-zero")]
    ZeroBandwidth,

    #[error("implicit header mode requires a payload length of 1..=255, got {0}")]
    ImplicitPayloadLen(usize),

    #[error("minimum preamble length {0} too short (must be >= 4)")]
    PreambleLen(usize),

    #[error("sync word {0:#04x} has a zero nibble; its sync symbol would collide with the preamble")]
    SyncWord(u8),
}

/// Sample source I/O error.
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("failed to read samples: {0}")]
    Io(#[from] std::io::Error),
}
