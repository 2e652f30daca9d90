//! The engagement store: guarded transitions over shared mutable state.
//!
//! The engagement table is raced by two independent client sessions, one per
//! participant. Every mutation is therefore an optimistic, precondition-based
//! transaction: the caller states the status it last saw, and the store
//! performs the read-check-write atomically while holding the table's write
//! lock. A stale precondition yields `StoreError::Conflict` - the caller
//! refetches and retries, never silently overwrites.
//!
//! Records are never deleted; terminal engagements are retained for history
//! and classification.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::debug;

use crate::codes::{CodeGenerator, RandomCodeGenerator};
use crate::state::effects::SideEffect;
use crate::state::transitions::{self, Action, TransitionError, TransitionOutcome};
use crate::types::{ChatRef, Engagement, EngagementId, EngagementStatus, ParticipantId, VerificationCode};

/// Injected clock so timestamp behavior is testable.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Errors from store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Unknown engagement. Fatal to the calling operation, not retryable.
    #[error("engagement not found: {0}")]
    NotFound(EngagementId),

    /// The persisted status no longer matches the caller's precondition:
    /// somebody else won the race. Refetch and retry.
    #[error("conflict: expected status {expected}, found {actual}")]
    Conflict {
        expected: EngagementStatus,
        actual: EngagementStatus,
    },

    /// The transition itself was rejected. For
    /// `TransitionError::HandshakeMismatch` the revert to `Scheduled` has
    /// already been committed by the time this error is returned.
    #[error(transparent)]
    Transition(#[from] TransitionError),

    /// An engagement needs two distinct participants.
    #[error("initiator and recipient must be distinct")]
    SameParticipant,

    /// Participant identifiers must be non-empty.
    #[error("participant identifiers must be non-empty")]
    EmptyParticipant,

    /// A chat channel reference was already attached; it is never replaced.
    #[error("chat channel already attached to engagement {0}")]
    ChatAlreadyAttached(EngagementId),

    /// Chat channels only make sense once the request has been accepted.
    #[error("cannot attach a chat channel while status is {0}")]
    ChatBeforeAcceptance(EngagementStatus),
}

/// Result of a committed transition.
#[derive(Debug, Clone)]
pub struct Applied {
    /// The committed record, version already bumped.
    pub engagement: Engagement,

    /// Code owed to the acting participant (confirmation code for `Schedule`,
    /// handshake code for `StartVerification`).
    pub disclosed_code: Option<VerificationCode>,

    /// Effects for the dispatcher. Must be fired after this value is
    /// returned, i.e. strictly after the commit.
    pub effects: Vec<SideEffect>,
}

/// In-memory engagement table with guarded, atomically-applied transitions.
pub struct EngagementStore {
    table: RwLock<HashMap<EngagementId, Engagement>>,
    codes: Box<dyn CodeGenerator>,
    clock: Box<dyn Clock>,
}

impl EngagementStore {
    pub fn new(codes: Box<dyn CodeGenerator>, clock: Box<dyn Clock>) -> Self {
        EngagementStore {
            table: RwLock::new(HashMap::new()),
            codes,
            clock,
        }
    }

    /// Production wiring: random codes, wall clock.
    pub fn with_defaults() -> Self {
        EngagementStore::new(Box::new(RandomCodeGenerator), Box::new(SystemClock))
    }

    /// Creates a new engagement in `Requested` on the initiator's behalf.
    pub async fn create(
        &self,
        initiator: ParticipantId,
        recipient: ParticipantId,
    ) -> Result<Engagement, StoreError> {
        if initiator.as_str().is_empty() || recipient.as_str().is_empty() {
            return Err(StoreError::EmptyParticipant);
        }
        if initiator == recipient {
            return Err(StoreError::SameParticipant);
        }

        let engagement = Engagement::new(EngagementId::mint(), initiator, recipient, self.clock.now());

        let mut table = self.table.write().await;
        debug!(id = %engagement.id, "engagement created");
        table.insert(engagement.id.clone(), engagement.clone());
        Ok(engagement)
    }

    /// Fetches a single engagement.
    pub async fn get(&self, id: &EngagementId) -> Result<Engagement, StoreError> {
        let table = self.table.read().await;
        table
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.clone()))
    }

    /// Applies a guarded transition.
    ///
    /// The read-check-write runs under the table's write lock, so the whole
    /// transition (status change + side fields + version bump) commits
    /// atomically or not at all. Of two racing calls carrying the same
    /// `expected_status`, exactly one commits; the other sees `Conflict`.
    pub async fn apply_transition(
        &self,
        id: &EngagementId,
        expected_status: EngagementStatus,
        actor: &ParticipantId,
        action: Action,
    ) -> Result<Applied, StoreError> {
        let mut table = self.table.write().await;
        let current = table
            .get(id)
            .ok_or_else(|| StoreError::NotFound(id.clone()))?;

        if current.status != expected_status {
            return Err(StoreError::Conflict {
                expected: expected_status,
                actual: current.status,
            });
        }

        let now = self.clock.now();
        let transitioned =
            transitions::apply(current, actor, action, now, self.codes.as_ref())?;

        let mut engagement = transitioned.engagement;
        engagement.version = current.version + 1;
        table.insert(id.clone(), engagement.clone());
        debug!(
            id = %id,
            from = %expected_status,
            to = %engagement.status,
            version = engagement.version,
            "transition committed"
        );
        drop(table);

        match transitioned.outcome {
            TransitionOutcome::Advanced => Ok(Applied {
                engagement,
                disclosed_code: transitioned.disclosed_code,
                effects: transitioned.effects,
            }),
            // The revert is already committed; surface the mismatch as the
            // typed error the caller expects.
            TransitionOutcome::HandshakeRejected => {
                Err(StoreError::Transition(TransitionError::HandshakeMismatch))
            }
        }
    }

    /// Attaches the externally-provisioned chat channel reference.
    ///
    /// Legal any time after acceptance, set once, never reattached. The
    /// channel itself is owned by the chat collaborator.
    pub async fn attach_chat_ref(
        &self,
        id: &EngagementId,
        chat_ref: ChatRef,
    ) -> Result<Engagement, StoreError> {
        let mut table = self.table.write().await;
        let current = table
            .get(id)
            .ok_or_else(|| StoreError::NotFound(id.clone()))?;

        if matches!(
            current.status,
            EngagementStatus::Requested | EngagementStatus::Declined | EngagementStatus::Withdrawn
        ) {
            return Err(StoreError::ChatBeforeAcceptance(current.status));
        }
        if current.chat_ref.is_some() {
            return Err(StoreError::ChatAlreadyAttached(id.clone()));
        }

        let mut next = current.clone();
        next.chat_ref = Some(chat_ref);
        next.version = current.version + 1;
        table.insert(id.clone(), next.clone());
        Ok(next)
    }

    /// All engagements a participant is party to, in unspecified order.
    pub async fn list_for_participant(&self, participant: &ParticipantId) -> Vec<Engagement> {
        let table = self.table.read().await;
        table
            .values()
            .filter(|e| e.is_participant(participant))
            .cloned()
            .collect()
    }

    /// Clones the full table, for snapshot persistence.
    pub async fn export(&self) -> HashMap<EngagementId, Engagement> {
        self.table.read().await.clone()
    }

    /// Replaces the table with a previously-exported snapshot.
    pub async fn hydrate(&self, engagements: HashMap<EngagementId, Engagement>) {
        let mut table = self.table.write().await;
        *table = engagements;
    }

    /// Reads the injected clock (the classifier's `now` argument on the read
    /// paths comes from here).
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }
}
