//! Domain types for the engagement lifecycle.

pub mod engagement;
pub mod ids;

pub use engagement::{
    Engagement, EngagementStatus, EngagementTimestamps, EngagementView, Handshake, Schedule,
};
pub use ids::{ChatRef, EngagementId, ParticipantId, VerificationCode};
