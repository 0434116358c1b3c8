//! Symmetric, stateless byte transforms

use std::collections::HashMap;
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use tracing::warn;

use crate::Result;

/// A symmetric byte transform identified by name
pub trait Encoder: Send + Sync {
    fn name(&self) -> &str;
    fn encode(&self, data: &[u8]) -> Vec<u8>;
    fn decode(&self, data: &[u8]) -> Result<Vec<u8>>;
}

/// Identity transform
pub struct PlainTextEncoder;

impl Encoder for PlainTextEncoder {
    fn name(&self) -> &str {
        "plain-text"
    }

    fn encode(&self, data: &[u8]) -> Vec<u8> {
        data.to_vec()
    }

    fn decode(&self, data: &[u8]) -> Result<Vec<u8>> {
        Ok(data.to_vec())
    }
}

/// Standard base64 transform
pub struct Base64Encoder;

impl Encoder for Base64Encoder {
    fn name(&self) -> &str {
        "base64"
    }

    fn encode(&self, data: &[u8]) -> Vec<u8> {
        STANDARD.encode(data).into_bytes()
    }

    fn decode(&self, data: &[u8]) -> Result<Vec<u8>> {
        Ok(STANDARD.decode(data)?)
    }
}

/// Name-keyed encoder registry, populated at startup
pub struct EncoderRegistry {
    encoders: HashMap<String, Arc<dyn Encoder>>,
}

impl EncoderRegistry {
    /// Registry with the built-in encoders
    pub fn new() -> Self {
        let mut registry = Self {
            encoders: HashMap::new(),
        };
        registry.register(Arc::new(PlainTextEncoder));
        registry.register(Arc::new(Base64Encoder));
        registry
    }

    /// Register an encoder under its own name
    pub fn register(&mut self, encoder: Arc<dyn Encoder>) {
        self.encoders.insert(encoder.name().to_string(), encoder);
    }

    /// Look up by name; unknown names fall back to plain-text
    pub fn get(&self, name: &str) -> Arc<dyn Encoder> {
        match self.encoders.get(name) {
            Some(encoder) => encoder.clone(),
            None => {
                warn!("◆ CAMO: unknown encoder '{}', using plain-text", name);
                Arc::new(PlainTextEncoder)
            }
        }
    }

    /// Registered encoder names
    pub fn names(&self) -> Vec<String> {
        self.encoders.keys().cloned().collect()
    }
}

impl Default for EncoderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_all_registered() {
        let registry = EncoderRegistry::new();
        let payloads: [&[u8]; 4] = [b"", b"whoami", b"\x00\xff\x7f", "日本語".as_bytes()];

        for name in registry.names() {
            let encoder = registry.get(&name);
            for payload in payloads {
                let decoded = encoder
                    .decode(&encoder.encode(payload))
                    .expect("Should decode");
                assert_eq!(decoded, payload, "round-trip failed for {}", name);
            }
        }
    }

    #[test]
    fn test_base64_known_value() {
        let encoder = Base64Encoder;
        assert_eq!(encoder.encode(b"whoami"), b"d2hvYW1p");
    }

    #[test]
    fn test_base64_decode_garbage_is_error() {
        let encoder = Base64Encoder;
        assert!(encoder.decode(b"!!!not base64!!!").is_err());
    }

    #[test]
    fn test_unknown_name_falls_back_to_plain() {
        let registry = EncoderRegistry::new();
        let encoder = registry.get("rot13");
        assert_eq!(encoder.name(), "plain-text");
        assert_eq!(encoder.encode(b"abc"), b"abc");
    }
}
