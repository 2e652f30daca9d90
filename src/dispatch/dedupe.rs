//! Deduplication keys for outbound notifications.
//!
//! Delivery is at-least-once: the dispatcher may resend after a crash or a
//! retried request, and the consumer is expected to drop duplicates. The
//! consumer-facing key identifies the logical event - one `(engagement,
//! status)` pair - while the dispatcher's own seen-set additionally keys on
//! the recipient so that notifying both participants of the same transition
//! is not mistaken for a duplicate.
//!
//! Seen keys are timestamped and pruned after a retention period to prevent
//! unbounded growth.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};

use crate::types::{EngagementId, EngagementStatus, ParticipantId};

/// Default retention for seen notification keys (24 hours).
pub const DEFAULT_SEEN_TTL_HOURS: i64 = 24;

/// Key identifying one notification delivery attempt:
/// `(engagement, status, recipient)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NotificationKey(String);

impl NotificationKey {
    pub fn new(
        engagement: &EngagementId,
        status: EngagementStatus,
        recipient: &ParticipantId,
    ) -> Self {
        NotificationKey(format!(
            "notify:{}:{}:{}",
            engagement.as_str(),
            status.name(),
            recipient.as_str()
        ))
    }

    /// The consumer-facing dedupe key: engagement + status. Duplicates of
    /// this pair must be safely ignorable downstream.
    pub fn consumer_key(engagement: &EngagementId, status: EngagementStatus) -> String {
        format!("{}:{}", engagement.as_str(), status.name())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NotificationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Checks whether a key was already delivered.
pub fn is_duplicate(seen: &HashMap<String, DateTime<Utc>>, key: &NotificationKey) -> bool {
    seen.contains_key(key.as_str())
}

/// Records a key as delivered. Call only after the notifier accepted it.
pub fn mark_seen(seen: &mut HashMap<String, DateTime<Utc>>, key: &NotificationKey, now: DateTime<Utc>) {
    seen.insert(key.as_str().to_string(), now);
}

/// Drops keys older than `ttl_hours`. Returns how many were pruned.
pub fn prune_expired(
    seen: &mut HashMap<String, DateTime<Utc>>,
    now: DateTime<Utc>,
    ttl_hours: i64,
) -> usize {
    let cutoff = now - chrono::Duration::hours(ttl_hours);
    let before = seen.len();
    seen.retain(|_, stamp| *stamp > cutoff);
    before - seen.len()
}
