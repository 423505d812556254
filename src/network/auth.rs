//! Handshake Authentication
//!
//! Bots and controllers prove themselves with a shared secret; observers
//! need none. An empty secret set means the role is open.

use sha2::{Digest, Sha256};
use thiserror::Error;

/// A set of accepted secrets, kept as SHA-256 digests.
#[derive(Clone, Debug, Default)]
pub struct SecretSet {
    digests: Vec<[u8; 32]>,
}

impl SecretSet {
    /// Build from a comma-separated list. Blank entries are ignored.
    pub fn parse(list: &str) -> Self {
        Self::from_secrets(list.split(','))
    }

    /// Build from individual secrets. Blank entries are ignored.
    pub fn from_secrets<I, S>(secrets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut digests: Vec<[u8; 32]> = secrets
            .into_iter()
            .map(|s| s.as_ref().trim().to_string())
            .filter(|s| !s.is_empty())
            .map(|s| digest(&s))
            .collect();
        digests.sort_unstable();
        digests.dedup();
        Self { digests }
    }

    /// Whether any secret is required.
    pub fn is_configured(&self) -> bool {
        !self.digests.is_empty()
    }

    pub fn len(&self) -> usize {
        self.digests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.digests.is_empty()
    }

    /// Check a presented secret.
    pub fn verify(&self, presented: Option<&str>) -> Result<(), HandshakeError> {
        if !self.is_configured() {
            return Ok(());
        }
        let presented = match presented.map(str::trim) {
            Some(s) if !s.is_empty() => s,
            _ => return Err(HandshakeError::MissingSecret),
        };
        let candidate = digest(presented);
        if self.digests.iter().any(|d| *d == candidate) {
            Ok(())
        } else {
            Err(HandshakeError::WrongSecret)
        }
    }
}

fn digest(secret: &str) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(b"tank-battle-secret:");
    hasher.update(secret.as_bytes());
    hasher.finalize().into()
}

/// Handshake failures. The display text is sent as the close reason.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HandshakeError {
    /// Role requires a secret and none was sent.
    #[error("missing secret")]
    MissingSecret,
    /// Secret not in the accepted set.
    #[error("wrong secret")]
    WrongSecret,
    /// Bot supports none of the server's game types.
    #[error("unsupported game types: {0}")]
    UnsupportedGameType(String),
    /// First message did not parse.
    #[error("malformed handshake: {0}")]
    Malformed(String),
    /// First message was not a handshake.
    #[error("expected handshake, got {0}")]
    UnexpectedMessage(String),
    /// No handshake within the deadline.
    #[error("handshake timed out")]
    Timeout,
    /// Socket closed before a handshake arrived.
    #[error("connection closed during handshake")]
    Closed,
}

/// Check that a bot can play at least one of the server's game types.
///
/// A bot listing no game types accepts any.
pub fn check_game_types(bot_types: &[String], server_types: &[String]) -> Result<(), HandshakeError> {
    if bot_types.is_empty() || bot_types.iter().any(|t| server_types.iter().any(|s| s.eq_ignore_ascii_case(t))) {
        Ok(())
    } else {
        Err(HandshakeError::UnsupportedGameType(bot_types.join(",")))
    }
}
