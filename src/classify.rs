//! Display-bucket classification.
//!
//! Pure read-side grouping of engagements into the three presentation
//! buckets. The clock is an argument, never read ambiently, so the function
//! is a deterministic map from `(engagement, now)` to a bucket.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{Engagement, EngagementStatus};

/// Presentation grouping for an engagement list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisplayBucket {
    /// Awaiting the recipient's response.
    Pending,

    /// Live and not yet past its scheduled start (or unscheduled).
    Upcoming,

    /// Completed, or overdue without ever completing.
    Past,
}

/// Classifies an engagement for display. `None` means the engagement is
/// excluded from all three buckets (declined / withdrawn / cancelled).
///
/// Rules, evaluated in order:
/// 1. `Requested` is `Pending`.
/// 2. `Declined`, `Withdrawn`, `Cancelled` are excluded.
/// 3. `Completed` is `Past`.
/// 4. Anything else is `Upcoming` until its scheduled start passes, then
///    `Past`. An overdue, never-completed engagement deliberately falls back
///    to `Past` rather than being hidden.
pub fn classify(engagement: &Engagement, now: DateTime<Utc>) -> Option<DisplayBucket> {
    match engagement.status {
        EngagementStatus::Requested => Some(DisplayBucket::Pending),
        EngagementStatus::Declined | EngagementStatus::Withdrawn | EngagementStatus::Cancelled => {
            None
        }
        EngagementStatus::Completed => Some(DisplayBucket::Past),
        EngagementStatus::Accepted
        | EngagementStatus::Scheduled
        | EngagementStatus::VerificationPending
        | EngagementStatus::InProgress => {
            let starts_at = engagement.schedule.as_ref().and_then(|s| s.starts_at);
            match starts_at {
                Some(start) if start < now => Some(DisplayBucket::Past),
                _ => Some(DisplayBucket::Upcoming),
            }
        }
    }
}
