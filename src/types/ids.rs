//! Newtype wrappers for domain identifiers.
//!
//! These types prevent accidental mixing of different identifier kinds
//! (e.g., using a ParticipantId where an EngagementId is expected) and make
//! the code more self-documenting.

use serde::{Deserialize, Serialize};
use std::fmt;

/// An opaque engagement identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EngagementId(pub String);

impl EngagementId {
    pub fn new(s: impl Into<String>) -> Self {
        EngagementId(s.into())
    }

    /// Mints a fresh random identifier (32 hex characters).
    pub fn mint() -> Self {
        EngagementId(format!("{:032x}", rand::random::<u128>()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EngagementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for EngagementId {
    fn from(s: String) -> Self {
        EngagementId(s)
    }
}

impl From<&str> for EngagementId {
    fn from(s: &str) -> Self {
        EngagementId(s.to_string())
    }
}

/// A participant identifier, owned by the external identity collaborator.
///
/// The core never infers "the current user"; every operation takes the acting
/// participant explicitly.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParticipantId(pub String);

impl ParticipantId {
    pub fn new(s: impl Into<String>) -> Self {
        ParticipantId(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for ParticipantId {
    fn from(s: String) -> Self {
        ParticipantId(s)
    }
}

impl From<&str> for ParticipantId {
    fn from(s: &str) -> Self {
        ParticipantId(s.to_string())
    }
}

/// A reference to an externally-provisioned chat channel.
///
/// The channel itself is owned by the chat collaborator; this core only
/// stores the reference, attaches it once, and never reattaches.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChatRef(pub String);

impl ChatRef {
    pub fn new(s: impl Into<String>) -> Self {
        ChatRef(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChatRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for ChatRef {
    fn from(s: String) -> Self {
        ChatRef(s)
    }
}

/// A 4-digit verification code ("1000" through "9999").
///
/// Codes are social-proof tokens read aloud between two people standing next
/// to each other, not authentication secrets. Comparison is exact string
/// equality on the submitted text.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VerificationCode(String);

impl VerificationCode {
    /// Creates a code from a raw string.
    ///
    /// Note: This does not validate the format; use `from_number` for codes
    /// minted by a generator.
    pub fn new(s: impl Into<String>) -> Self {
        VerificationCode(s.into())
    }

    /// Creates a code from a number in the 1000-9999 range.
    pub fn from_number(n: u16) -> Self {
        debug_assert!((1000..=9999).contains(&n));
        VerificationCode(n.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Checks a submitted code against this one.
    pub fn matches(&self, submitted: &str) -> bool {
        self.0 == submitted
    }
}

impl fmt::Display for VerificationCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
