//! Side-effect dispatch to external collaborators.
//!
//! The dispatcher turns the effects of a committed transition into notifier
//! calls. Ordering is strict: effects fire after the store commit, never
//! before, so an effect can never outrun a transition that later turns out to
//! have conflicted. Delivery is fire-and-forget from the state machine's
//! perspective - a failed notification is logged and retried here, and never
//! rolls back the transition.

pub mod chat;
pub mod dedupe;

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use crate::state::effects::{NotificationKind, SideEffect};
use crate::types::{Engagement, EngagementId, ParticipantId};
use dedupe::{DEFAULT_SEEN_TTL_HOURS, NotificationKey};

pub use chat::{ChatError, ChatProvisioner, LoggingChatProvisioner};

/// A notification handed to the external delivery collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub recipient: ParticipantId,
    pub kind: NotificationKind,
    pub engagement_id: EngagementId,

    /// Consumer-side dedupe key (`engagementId:status`); a duplicate of this
    /// pair must be safely ignorable downstream.
    pub dedupe_key: String,

    /// Human-readable context, e.g. the schedule summary.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

/// Error from the notification collaborator.
#[derive(Debug, Error)]
#[error("notification delivery failed: {0}")]
pub struct NotifyError(pub String);

/// Delivers notifications. The real implementation lives with the push
/// collaborator; this seam exists for tests and for the logging stand-in.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notification: Notification) -> Result<(), NotifyError>;
}

/// A notifier that logs deliveries without sending them.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingNotifier;

#[async_trait]
impl Notifier for LoggingNotifier {
    async fn notify(&self, notification: Notification) -> Result<(), NotifyError> {
        debug!(
            recipient = %notification.recipient,
            kind = %notification.kind,
            engagement = %notification.engagement_id,
            "notification logged (not delivered)"
        );
        Ok(())
    }
}

/// Fires transition effects against the notifier, post-commit.
///
/// Retries each delivery a bounded number of times with a short backoff,
/// checking the shutdown token between attempts. Successfully delivered keys
/// are remembered (with TTL pruning) so a replayed dispatch for the same
/// `(engagement, status, recipient)` is suppressed locally; the consumer
/// still owns final deduplication.
pub struct Dispatcher {
    notifier: Box<dyn Notifier>,
    cancel: CancellationToken,
    seen: Mutex<HashMap<String, DateTime<Utc>>>,
    max_attempts: u32,
    retry_delay: Duration,
}

impl Dispatcher {
    pub fn new(notifier: Box<dyn Notifier>, cancel: CancellationToken) -> Self {
        Dispatcher {
            notifier,
            cancel,
            seen: Mutex::new(HashMap::new()),
            max_attempts: 3,
            retry_delay: Duration::from_millis(200),
        }
    }

    /// Test knob: no sleeping between attempts.
    #[cfg(test)]
    fn without_backoff(mut self) -> Self {
        self.retry_delay = Duration::ZERO;
        self
    }

    /// Delivers all effects of one committed transition.
    ///
    /// Never returns an error: delivery failures are logged and dropped after
    /// the retry budget, per the fire-and-forget contract.
    #[instrument(skip(self, engagement, effects), fields(engagement = %engagement.id, status = %engagement.status))]
    pub async fn dispatch(&self, engagement: &Engagement, effects: Vec<SideEffect>) {
        for effect in effects {
            match effect {
                SideEffect::Notify {
                    recipient,
                    kind,
                    summary,
                } => {
                    self.deliver(engagement, recipient, kind, summary).await;
                }
            }
        }
    }

    async fn deliver(
        &self,
        engagement: &Engagement,
        recipient: ParticipantId,
        kind: NotificationKind,
        summary: Option<String>,
    ) {
        let key = NotificationKey::new(&engagement.id, engagement.status, &recipient);

        {
            let mut seen = self.seen.lock().await;
            dedupe::prune_expired(&mut seen, Utc::now(), DEFAULT_SEEN_TTL_HOURS);
            if dedupe::is_duplicate(&seen, &key) {
                debug!(%key, "suppressing duplicate notification");
                return;
            }
        }

        let notification = Notification {
            recipient,
            kind,
            engagement_id: engagement.id.clone(),
            dedupe_key: NotificationKey::consumer_key(&engagement.id, engagement.status),
            summary,
        };

        for attempt in 1..=self.max_attempts {
            if self.cancel.is_cancelled() {
                warn!(%key, "shutdown requested, dropping notification");
                return;
            }

            match self.notifier.notify(notification.clone()).await {
                Ok(()) => {
                    let mut seen = self.seen.lock().await;
                    dedupe::mark_seen(&mut seen, &key, Utc::now());
                    debug!(%key, attempt, "notification delivered");
                    return;
                }
                Err(e) if attempt < self.max_attempts => {
                    warn!(%key, attempt, error = %e, "notification failed, retrying");
                    tokio::time::sleep(self.retry_delay).await;
                }
                Err(e) => {
                    warn!(%key, attempt, error = %e, "notification failed, giving up");
                }
            }
        }
    }
}
