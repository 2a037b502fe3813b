//! Canonical JSON encoder.

use crate::error::{ChecksumError, ChecksumResult};
use serde_json::Value;

/// Encode a value to canonical JSON bytes.
///
/// The output is deterministic regardless of how the value was built:
/// - Object keys are sorted bytewise
/// - No insignificant whitespace
/// - Strings use serde_json's escaping
///
/// Key order does not depend on serde_json's `preserve_order` feature, so
/// two processes with different feature sets still agree on a checksum.
pub fn to_canonical_json(value: &Value) -> ChecksumResult<Vec<u8>> {
    let mut encoder = CanonicalEncoder::new();
    encoder.encode(value)?;
    Ok(encoder.into_bytes())
}

/// A canonical JSON encoder.
pub struct CanonicalEncoder {
    buffer: Vec<u8>,
}

impl CanonicalEncoder {
    /// Create a new encoder.
    pub fn new() -> Self {
        Self { buffer: Vec::new() }
    }

    /// Encode a value.
    pub fn encode(&mut self, value: &Value) -> ChecksumResult<()> {
        match value {
            Value::Null => self.buffer.extend_from_slice(b"null"),
            Value::Bool(b) => self
                .buffer
                .extend_from_slice(if *b { b"true" } else { b"false" }),
            Value::Number(n) => self.buffer.extend_from_slice(n.to_string().as_bytes()),
            Value::String(s) => self.encode_text(s)?,
            Value::Array(items) => {
                self.buffer.push(b'[');
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        self.buffer.push(b',');
                    }
                    self.encode(item)?;
                }
                self.buffer.push(b']');
            }
            Value::Object(map) => {
                let mut keys: Vec<&String> = map.keys().collect();
                keys.sort_by(|a, b| a.as_bytes().cmp(b.as_bytes()));

                self.buffer.push(b'{');
                for (i, key) in keys.into_iter().enumerate() {
                    if i > 0 {
                        self.buffer.push(b',');
                    }
                    self.encode_text(key)?;
                    self.buffer.push(b':');
                    self.encode(&map[key])?;
                }
                self.buffer.push(b'}');
            }
        }
        Ok(())
    }

    /// Consume this encoder and return the encoded bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.buffer
    }

    fn encode_text(&mut self, text: &str) -> ChecksumResult<()> {
        let quoted = serde_json::to_string(text)
            .map_err(|e| ChecksumError::serialization_failed(e.to_string()))?;
        self.buffer.extend_from_slice(quoted.as_bytes());
        Ok(())
    }
}

impl Default for CanonicalEncoder {
    fn default() -> Self {
        Self::new()
    }
}
