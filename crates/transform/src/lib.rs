//! CAMO: Command Transform Pipeline
//!
//! Two independent stages: symmetric data encoders for payload bytes
//! crossing the transport boundary, and per-operation obfuscators that
//! wrap commands in platform-specific envelopes. Obfuscation failures
//! never propagate; the pipeline falls back to the plain command.

use thiserror::Error;

pub mod encoder;
pub mod obfuscator;

pub use encoder::{Base64Encoder, Encoder, EncoderRegistry, PlainTextEncoder};
pub use obfuscator::{
    apply, command_digest, Base64Envelope, Obfuscator, ObfuscatorRegistry, PlainTextObfuscator,
};

/// Transform pipeline errors
#[derive(Error, Debug)]
pub enum TransformError {
    #[error("DECODE FAILED: {0}")]
    Decode(#[from] base64::DecodeError),

    #[error("UNSUPPORTED: {platform}/{executor}")]
    Unsupported { platform: String, executor: String },
}

pub type Result<T> = std::result::Result<T, TransformError>;
