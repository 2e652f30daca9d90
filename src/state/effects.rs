//! Side effects produced by successful transitions.
//!
//! Effects describe what to do; they carry no transport detail. The
//! dispatcher turns them into notifier calls after the store commit.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::types::ParticipantId;

/// The notification vocabulary consumed by the external notifier.
///
/// `Declined`, `Withdrawn`, and `Cancelled` are distinct so the UI can phrase
/// the message for the right situation rather than string-matching statuses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    ScheduleSet,
    Declined,
    Withdrawn,
    Cancelled,
    Completed,
}

impl NotificationKind {
    pub fn name(&self) -> &'static str {
        match self {
            NotificationKind::ScheduleSet => "schedule_set",
            NotificationKind::Declined => "declined",
            NotificationKind::Withdrawn => "withdrawn",
            NotificationKind::Cancelled => "cancelled",
            NotificationKind::Completed => "completed",
        }
    }
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// An externally-visible effect of a committed transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SideEffect {
    /// Notify one participant.
    Notify {
        recipient: ParticipantId,
        kind: NotificationKind,
        /// Human-readable context, e.g. the schedule summary.
        summary: Option<String>,
    },
}

impl SideEffect {
    pub fn notify(recipient: &ParticipantId, kind: NotificationKind) -> Self {
        SideEffect::Notify {
            recipient: recipient.clone(),
            kind,
            summary: None,
        }
    }

    pub fn notify_with_summary(
        recipient: &ParticipantId,
        kind: NotificationKind,
        summary: String,
    ) -> Self {
        SideEffect::Notify {
            recipient: recipient.clone(),
            kind,
            summary: Some(summary),
        }
    }
}
