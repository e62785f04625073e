//! Opaque admission tokens.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bytes::{Buf, BufMut};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::fmt;

pub const TOKEN_SIZE: usize = 32;

/// Random secret minted once per grant (access token on sign-in, connect
/// token on room join) and compared by exact byte equality.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Token([u8; TOKEN_SIZE]);

impl Token {
    /// Generates a token from the operating system CSPRNG.
    pub fn generate() -> Self {
        let mut bytes = [0u8; TOKEN_SIZE];
        OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    pub fn from_bytes(bytes: [u8; TOKEN_SIZE]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; TOKEN_SIZE] {
        &self.0
    }

    pub fn to_base64(&self) -> String {
        STANDARD.encode(self.0)
    }

    /// Parses the base64 text form. Returns `None` unless it decodes to
    /// exactly [`TOKEN_SIZE`] bytes.
    pub fn from_base64(text: &str) -> Option<Self> {
        let decoded = STANDARD.decode(text.trim()).ok()?;
        let bytes: [u8; TOKEN_SIZE] = decoded.try_into().ok()?;
        Some(Self(bytes))
    }

    pub(crate) fn put(&self, buf: &mut Vec<u8>) {
        buf.put_slice(&self.0);
    }

    /// Caller guarantees `TOKEN_SIZE` bytes remain.
    pub(crate) fn get(buf: &mut &[u8]) -> Self {
        let mut bytes = [0u8; TOKEN_SIZE];
        buf.copy_to_slice(&mut bytes);
        Self(bytes)
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Token(..)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_tokens_differ() {
        let a = Token::generate();
        let b = Token::generate();
        assert_ne!(a, b);
    }

    #[test]
    fn test_base64_roundtrip() {
        let token = Token::generate();
        let text = token.to_base64();
        assert_eq!(Token::from_base64(&text), Some(token));
    }

    #[test]
    fn test_base64_rejects_wrong_length() {
        let short = STANDARD.encode([1u8; 16]);
        assert_eq!(Token::from_base64(&short), None);
        assert_eq!(Token::from_base64("not base64 at all!"), None);
    }

    #[test]
    fn test_debug_hides_bytes() {
        let token = Token::from_bytes([0xAB; TOKEN_SIZE]);
        assert_eq!(format!("{:?}", token), "Token(..)");
    }
}
