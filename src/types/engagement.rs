//! The central engagement record and its lifecycle status.
//!
//! An `Engagement` is the pairwise date-proposal record shared by two
//! participants. It is created on the initiator's request, mutated only
//! through guarded transitions (see `state::transitions`), and never
//! deleted - terminal records are retained for history and classification.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::ids::{ChatRef, EngagementId, ParticipantId, VerificationCode};

/// Lifecycle position of an engagement. Single source of truth.
///
/// Whether a schedule is attached is a separate, orthogonal fact; the two are
/// never conflated into ad hoc status strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngagementStatus {
    /// Initiator has asked; recipient has not yet responded.
    Requested,

    /// Recipient accepted; no schedule attached yet.
    Accepted,

    /// A schedule is attached and the confirmation code is minted.
    Scheduled,

    /// A handshake code is live; waiting for the other participant to echo it.
    VerificationPending,

    /// Handshake succeeded; the date is underway.
    InProgress,

    /// Terminal: confirmed complete.
    Completed,

    /// Terminal: recipient declined the request.
    Declined,

    /// Terminal: initiator took the request back before any response.
    Withdrawn,

    /// Terminal: either participant cancelled after acceptance.
    Cancelled,
}

impl EngagementStatus {
    /// Returns true for states that admit no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            EngagementStatus::Completed
                | EngagementStatus::Declined
                | EngagementStatus::Withdrawn
                | EngagementStatus::Cancelled
        )
    }

    /// Stable lowercase name, matching the serde representation.
    pub fn name(&self) -> &'static str {
        match self {
            EngagementStatus::Requested => "requested",
            EngagementStatus::Accepted => "accepted",
            EngagementStatus::Scheduled => "scheduled",
            EngagementStatus::VerificationPending => "verification_pending",
            EngagementStatus::InProgress => "in_progress",
            EngagementStatus::Completed => "completed",
            EngagementStatus::Declined => "declined",
            EngagementStatus::Withdrawn => "withdrawn",
            EngagementStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for EngagementStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Schedule details attached at the `Schedule` transition.
///
/// `day` and `time` are display strings as entered by the participants.
/// `starts_at` is the optional machine-readable instant; the classifier
/// compares it against the current time to split upcoming from past.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schedule {
    pub day: String,
    pub time: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub activity: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub venue: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location_ref: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub starts_at: Option<DateTime<Utc>>,
}

impl Schedule {
    /// One-line human summary used in the schedule notification.
    pub fn summary(&self) -> String {
        match &self.venue {
            Some(venue) => format!("{} {} at {}", self.day, self.time, venue),
            None => format!("{} {}", self.day, self.time),
        }
    }
}

/// Ephemeral handshake state, present only while verification is pending.
///
/// The code is disclosed to `initiated_by` alone; the other participant
/// proves co-presence by echoing it back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Handshake {
    pub code: VerificationCode,
    pub initiated_by: ParticipantId,
}

/// Lifecycle timestamps. Each is set at most once, from a single clock, so
/// the populated subset is monotonically non-decreasing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngagementTimestamps {
    pub requested_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub responded_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduled_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verification_started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verified_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub declined_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub withdrawn_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cancelled_at: Option<DateTime<Utc>>,
}

impl EngagementTimestamps {
    pub fn new(requested_at: DateTime<Utc>) -> Self {
        EngagementTimestamps {
            requested_at,
            responded_at: None,
            scheduled_at: None,
            verification_started_at: None,
            verified_at: None,
            completed_at: None,
            declined_at: None,
            withdrawn_at: None,
            cancelled_at: None,
        }
    }

    /// Number of terminal timestamps set. Invariant: 0 until a terminal
    /// status is reached, exactly 1 afterwards.
    pub fn terminal_count(&self) -> usize {
        [
            self.completed_at,
            self.declined_at,
            self.withdrawn_at,
            self.cancelled_at,
        ]
        .iter()
        .filter(|t| t.is_some())
        .count()
    }
}

/// The pairwise date-proposal record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Engagement {
    pub id: EngagementId,
    pub initiator: ParticipantId,
    pub recipient: ParticipantId,
    pub status: EngagementStatus,

    /// Present from `Scheduled` onward.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schedule: Option<Schedule>,

    /// Minted exactly once when the schedule is first attached; immutable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confirmation_code: Option<VerificationCode>,

    /// Present iff `status == VerificationPending`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handshake: Option<Handshake>,

    /// Attached once after acceptance, never reattached.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chat_ref: Option<ChatRef>,

    /// Which participant cancelled, when status is `Cancelled`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cancelled_by: Option<ParticipantId>,

    pub timestamps: EngagementTimestamps,

    /// Optimistic-concurrency counter; bumped by the store on every commit.
    pub version: u64,
}

impl Engagement {
    /// Creates a fresh engagement in `Requested`.
    ///
    /// Participant distinctness is enforced by the store's `create`; this
    /// constructor assumes validated inputs.
    pub fn new(
        id: EngagementId,
        initiator: ParticipantId,
        recipient: ParticipantId,
        now: DateTime<Utc>,
    ) -> Self {
        Engagement {
            id,
            initiator,
            recipient,
            status: EngagementStatus::Requested,
            schedule: None,
            confirmation_code: None,
            handshake: None,
            chat_ref: None,
            cancelled_by: None,
            timestamps: EngagementTimestamps::new(now),
            version: 1,
        }
    }

    pub fn is_participant(&self, participant: &ParticipantId) -> bool {
        &self.initiator == participant || &self.recipient == participant
    }

    /// The counterpart of `participant`.
    ///
    /// Callers must have verified `is_participant` first; for a stranger this
    /// returns the initiator, which is why the transition layer checks
    /// membership before anything else.
    pub fn other_participant(&self, participant: &ParticipantId) -> &ParticipantId {
        if &self.initiator == participant {
            &self.recipient
        } else {
            &self.initiator
        }
    }

    /// Builds the per-viewer read model with codes redacted.
    ///
    /// The handshake code is shown only to the participant who started
    /// verification (they read it out to the other person). The confirmation
    /// code is never shown in a read path - it is disclosed exactly once, in
    /// the response to the `Schedule` action.
    pub fn view_for(&self, viewer: Option<&ParticipantId>) -> EngagementView {
        let handshake = self.handshake.as_ref().map(|h| HandshakeView {
            initiated_by: h.initiated_by.clone(),
            code: match viewer {
                Some(v) if v == &h.initiated_by => Some(h.code.clone()),
                _ => None,
            },
        });

        EngagementView {
            id: self.id.clone(),
            initiator: self.initiator.clone(),
            recipient: self.recipient.clone(),
            status: self.status,
            schedule: self.schedule.clone(),
            confirmation_code_set: self.confirmation_code.is_some(),
            handshake,
            chat_ref: self.chat_ref.clone(),
            cancelled_by: self.cancelled_by.clone(),
            timestamps: self.timestamps.clone(),
            version: self.version,
        }
    }
}

/// Redacted handshake record for read views.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandshakeView {
    pub initiated_by: ParticipantId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<VerificationCode>,
}

/// The per-viewer serialization of an engagement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngagementView {
    pub id: EngagementId,
    pub initiator: ParticipantId,
    pub recipient: ParticipantId,
    pub status: EngagementStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schedule: Option<Schedule>,
    pub confirmation_code_set: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handshake: Option<HandshakeView>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chat_ref: Option<ChatRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cancelled_by: Option<ParticipantId>,
    pub timestamps: EngagementTimestamps,
    pub version: u64,
}
