//! Guarded transitions for the engagement lifecycle.
//!
//! Pure functions for computing the next engagement state from the current
//! state and a participant action. All legality checks live here: which edges
//! exist, which participant may take which action, and what each phase of the
//! verification protocol does.
//!
//! The store (`store::EngagementStore`) is the only caller; it supplies the
//! clock reading and the code generator, commits the returned record
//! atomically, and hands the returned effects to the dispatcher.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use super::effects::{NotificationKind, SideEffect};
use crate::codes::CodeGenerator;
use crate::types::{Engagement, EngagementStatus, Handshake, ParticipantId, Schedule, VerificationCode};

/// A participant action, with its action-specific payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Action {
    /// Recipient accepts the request.
    Accept,

    /// Recipient declines the request.
    Decline,

    /// Initiator takes the request back before any response.
    Withdraw,

    /// Attach schedule details; mints the confirmation code.
    Schedule { details: Schedule },

    /// Call the whole thing off after acceptance. Either participant.
    Cancel,

    /// Begin the in-person handshake; mints a fresh handshake code.
    StartVerification,

    /// Echo the handshake code back. Only the non-initiating participant.
    SubmitHandshakeCode { code: String },

    /// Submit the confirmation code minted at scheduling time.
    SubmitConfirmationCode { code: String },

    /// Explicit completion without a code, for flows where handshake success
    /// is treated as sufficient proof.
    Complete,
}

impl Action {
    pub fn kind(&self) -> ActionKind {
        match self {
            Action::Accept => ActionKind::Accept,
            Action::Decline => ActionKind::Decline,
            Action::Withdraw => ActionKind::Withdraw,
            Action::Schedule { .. } => ActionKind::Schedule,
            Action::Cancel => ActionKind::Cancel,
            Action::StartVerification => ActionKind::StartVerification,
            Action::SubmitHandshakeCode { .. } => ActionKind::SubmitHandshakeCode,
            Action::SubmitConfirmationCode { .. } => ActionKind::SubmitConfirmationCode,
            Action::Complete => ActionKind::Complete,
        }
    }
}

/// Payload-free action discriminant, for error messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Accept,
    Decline,
    Withdraw,
    Schedule,
    Cancel,
    StartVerification,
    SubmitHandshakeCode,
    SubmitConfirmationCode,
    Complete,
}

impl ActionKind {
    pub fn name(&self) -> &'static str {
        match self {
            ActionKind::Accept => "accept",
            ActionKind::Decline => "decline",
            ActionKind::Withdraw => "withdraw",
            ActionKind::Schedule => "schedule",
            ActionKind::Cancel => "cancel",
            ActionKind::StartVerification => "start_verification",
            ActionKind::SubmitHandshakeCode => "submit_handshake_code",
            ActionKind::SubmitConfirmationCode => "submit_confirmation_code",
            ActionKind::Complete => "complete",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Error returned when a transition request is rejected.
///
/// All variants are recoverable from the caller's side: refetch, present only
/// legal actions, or (for code mismatches) let the human try again.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    /// The action is not legal from the current status.
    #[error("action {action} is not legal from status {status}")]
    InvalidTransition {
        status: EngagementStatus,
        action: ActionKind,
    },

    /// The acting participant is not a party to this engagement.
    #[error("{participant} is not a participant in this engagement")]
    NotParticipant { participant: ParticipantId },

    /// Only the recipient may take this action.
    #[error("only the recipient may {action}")]
    RecipientOnly { action: ActionKind },

    /// Only the initiator may take this action.
    #[error("only the initiator may {action}")]
    InitiatorOnly { action: ActionKind },

    /// The participant who started verification cannot echo their own code.
    #[error("the participant who started verification cannot submit the handshake code")]
    HandshakeOwnCode,

    /// Wrong confirmation code. State is unchanged; the human may retry.
    #[error("confirmation code does not match")]
    ConfirmationMismatch,

    /// Wrong handshake code. The engagement has been reverted to scheduled
    /// and the code voided; verification must be restarted for a fresh code.
    #[error("handshake code does not match; verification was reset")]
    HandshakeMismatch,

    /// A field the transition relies on is absent (corrupt record).
    #[error("missing required field: {field}")]
    MissingData { field: &'static str },
}

/// Whether the transition advanced the lifecycle or committed the
/// handshake-mismatch revert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionOutcome {
    Advanced,
    /// Wrong handshake code: the returned engagement is back in `Scheduled`
    /// with the handshake cleared. The revert must still be committed.
    HandshakeRejected,
}

/// Result of a successful `apply`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transitioned {
    /// The next engagement state. `version` is untouched here; the store
    /// bumps it at commit time.
    pub engagement: Engagement,

    /// A code owed to the acting participant alone: the confirmation code for
    /// `Schedule`, the handshake code for `StartVerification`. Never stored
    /// in a read view.
    pub disclosed_code: Option<VerificationCode>,

    /// Notifications to fire after the commit.
    pub effects: Vec<SideEffect>,

    pub outcome: TransitionOutcome,
}

impl Transitioned {
    fn advanced(engagement: Engagement) -> Self {
        Transitioned {
            engagement,
            disclosed_code: None,
            effects: Vec::new(),
            outcome: TransitionOutcome::Advanced,
        }
    }

    fn with_code(mut self, code: VerificationCode) -> Self {
        self.disclosed_code = Some(code);
        self
    }

    fn with_effects(mut self, effects: Vec<SideEffect>) -> Self {
        self.effects = effects;
        self
    }
}

/// Computes the next engagement state for a participant action.
///
/// This is the core state machine. It ensures:
/// - status changes follow the lifecycle graph, never skipping an edge
/// - actor permissions hold (recipient responds, initiator withdraws, the
///   handshake is echoed by the participant who did not start it)
/// - the confirmation code is minted exactly once, at scheduling time
/// - the handshake sub-record exists exactly while verification is pending
/// - each lifecycle timestamp is set at most once
///
/// Returns the new state plus effects, or an error. The caller commits the
/// returned record; nothing is mutated in place.
pub fn apply(
    current: &Engagement,
    actor: &ParticipantId,
    action: Action,
    now: DateTime<Utc>,
    codes: &dyn CodeGenerator,
) -> Result<Transitioned, TransitionError> {
    if !current.is_participant(actor) {
        return Err(TransitionError::NotParticipant {
            participant: actor.clone(),
        });
    }

    let kind = action.kind();
    let other = current.other_participant(actor).clone();

    match (current.status, action) {
        // === Responding to a request ===
        (EngagementStatus::Requested, Action::Accept) => {
            if actor != &current.recipient {
                return Err(TransitionError::RecipientOnly { action: kind });
            }
            let mut next = current.clone();
            next.status = EngagementStatus::Accepted;
            next.timestamps.responded_at = Some(now);
            // Accepted carries no mandatory effect; chat provisioning is the
            // presentation layer's call.
            Ok(Transitioned::advanced(next))
        }

        (EngagementStatus::Requested, Action::Decline) => {
            if actor != &current.recipient {
                return Err(TransitionError::RecipientOnly { action: kind });
            }
            let mut next = current.clone();
            next.status = EngagementStatus::Declined;
            next.timestamps.responded_at = Some(now);
            next.timestamps.declined_at = Some(now);
            Ok(Transitioned::advanced(next)
                .with_effects(vec![SideEffect::notify(&other, NotificationKind::Declined)]))
        }

        (EngagementStatus::Requested, Action::Withdraw) => {
            if actor != &current.initiator {
                return Err(TransitionError::InitiatorOnly { action: kind });
            }
            let mut next = current.clone();
            next.status = EngagementStatus::Withdrawn;
            next.timestamps.withdrawn_at = Some(now);
            Ok(Transitioned::advanced(next)
                .with_effects(vec![SideEffect::notify(&other, NotificationKind::Withdrawn)]))
        }

        // === Scheduling ===
        (EngagementStatus::Accepted, Action::Schedule { details }) => {
            // First (and only) schedule attachment mints the confirmation code.
            debug_assert!(current.confirmation_code.is_none());
            let confirmation = codes.mint();
            let summary = details.summary();

            let mut next = current.clone();
            next.status = EngagementStatus::Scheduled;
            next.schedule = Some(details);
            next.confirmation_code = Some(confirmation.clone());
            next.timestamps.scheduled_at = Some(now);
            Ok(Transitioned::advanced(next)
                .with_code(confirmation)
                .with_effects(vec![SideEffect::notify_with_summary(
                    &other,
                    NotificationKind::ScheduleSet,
                    summary,
                )]))
        }

        // === Cancellation (any state past acceptance) ===
        (
            EngagementStatus::Accepted
            | EngagementStatus::Scheduled
            | EngagementStatus::VerificationPending
            | EngagementStatus::InProgress,
            Action::Cancel,
        ) => {
            let mut next = current.clone();
            next.status = EngagementStatus::Cancelled;
            next.handshake = None;
            next.cancelled_by = Some(actor.clone());
            next.timestamps.cancelled_at = Some(now);
            Ok(Transitioned::advanced(next)
                .with_effects(vec![SideEffect::notify(&other, NotificationKind::Cancelled)]))
        }

        // === Phase A: handshake ===
        (EngagementStatus::Scheduled, Action::StartVerification) => {
            let code = codes.mint();
            let mut next = current.clone();
            next.status = EngagementStatus::VerificationPending;
            next.handshake = Some(Handshake {
                code: code.clone(),
                initiated_by: actor.clone(),
            });
            // Set once; a restart after a failed attempt keeps the original.
            if next.timestamps.verification_started_at.is_none() {
                next.timestamps.verification_started_at = Some(now);
            }
            Ok(Transitioned::advanced(next).with_code(code))
        }

        (EngagementStatus::VerificationPending, Action::SubmitHandshakeCode { code }) => {
            let handshake = current
                .handshake
                .as_ref()
                .ok_or(TransitionError::MissingData { field: "handshake" })?;
            if actor == &handshake.initiated_by {
                return Err(TransitionError::HandshakeOwnCode);
            }

            let mut next = current.clone();
            next.handshake = None;
            if handshake.code.matches(&code) {
                next.status = EngagementStatus::InProgress;
                next.timestamps.verified_at = Some(now);
                Ok(Transitioned::advanced(next))
            } else {
                // One guess per minted code: revert to Scheduled and void the
                // code, so the next round needs a fresh StartVerification.
                next.status = EngagementStatus::Scheduled;
                Ok(Transitioned {
                    engagement: next,
                    disclosed_code: None,
                    effects: Vec::new(),
                    outcome: TransitionOutcome::HandshakeRejected,
                })
            }
        }

        // === Phase B: confirmation ===
        (
            EngagementStatus::Scheduled | EngagementStatus::InProgress,
            Action::SubmitConfirmationCode { code },
        ) => {
            let confirmation =
                current
                    .confirmation_code
                    .as_ref()
                    .ok_or(TransitionError::MissingData {
                        field: "confirmation_code",
                    })?;
            if !confirmation.matches(&code) {
                return Err(TransitionError::ConfirmationMismatch);
            }
            let mut next = current.clone();
            next.status = EngagementStatus::Completed;
            next.timestamps.completed_at = Some(now);
            Ok(Transitioned::advanced(next).with_effects(completion_effects(current)))
        }

        (EngagementStatus::InProgress, Action::Complete) => {
            let mut next = current.clone();
            next.status = EngagementStatus::Completed;
            next.timestamps.completed_at = Some(now);
            Ok(Transitioned::advanced(next).with_effects(completion_effects(current)))
        }

        // === Everything else is off the graph ===
        (status, _) => Err(TransitionError::InvalidTransition {
            status,
            action: kind,
        }),
    }
}

/// Both participants hear about completion; an external "ready for next
/// match" gate consumes this signal.
fn completion_effects(engagement: &Engagement) -> Vec<SideEffect> {
    vec![
        SideEffect::notify(&engagement.initiator, NotificationKind::Completed),
        SideEffect::notify(&engagement.recipient, NotificationKind::Completed),
    ]
}

/// Whether `from -> to` is an edge of the lifecycle graph.
///
/// Used by tests to check that every sequence of committed statuses is a path
/// through the graph.
pub fn is_legal_edge(from: EngagementStatus, to: EngagementStatus) -> bool {
    use EngagementStatus::*;
    matches!(
        (from, to),
        (Requested, Declined)
            | (Requested, Withdrawn)
            | (Requested, Accepted)
            | (Accepted, Scheduled)
            | (Accepted, Cancelled)
            | (Scheduled, VerificationPending)
            | (Scheduled, Completed)
            | (Scheduled, Cancelled)
            | (VerificationPending, InProgress)
            | (VerificationPending, Scheduled)
            | (VerificationPending, Cancelled)
            | (InProgress, Completed)
            | (InProgress, Cancelled)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codes::FixedCodeGenerator;
    use crate::types::EngagementId;
    use chrono::TimeZone;

    fn alice() -> ParticipantId {
        ParticipantId::new("alice")
    }

    fn bob() -> ParticipantId {
        ParticipantId::new("bob")
    }

    fn carol() -> ParticipantId {
        ParticipantId::new("carol")
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 10, 12, 0, 0).unwrap()
    }

    fn requested() -> Engagement {
        Engagement::new(EngagementId::new("e1"), alice(), bob(), t0())
    }

    fn schedule_details() -> Schedule {
        Schedule {
            day: "Friday".to_string(),
            time: "7:00 PM".to_string(),
            activity: None,
            venue: Some("Cafe X".to_string()),
            location_ref: None,
            starts_at: None,
        }
    }

    fn codes() -> FixedCodeGenerator {
        FixedCodeGenerator::new(vec![4821, 9053, 7710])
    }

    /// Drives an engagement along the happy path up to `target`.
    fn engagement_at(target: EngagementStatus, codes: &dyn CodeGenerator) -> Engagement {
        let mut e = requested();
        if target == EngagementStatus::Requested {
            return e;
        }
        e = apply(&e, &bob(), Action::Accept, t0(), codes).unwrap().engagement;
        if target == EngagementStatus::Accepted {
            return e;
        }
        e = apply(
            &e,
            &alice(),
            Action::Schedule {
                details: schedule_details(),
            },
            t0(),
            codes,
        )
        .unwrap()
        .engagement;
        if target == EngagementStatus::Scheduled {
            return e;
        }
        e = apply(&e, &alice(), Action::StartVerification, t0(), codes)
            .unwrap()
            .engagement;
        if target == EngagementStatus::VerificationPending {
            return e;
        }
        let code = e.handshake.as_ref().unwrap().code.as_str().to_string();
        e = apply(&e, &bob(), Action::SubmitHandshakeCode { code }, t0(), codes)
            .unwrap()
            .engagement;
        assert_eq!(e.status, EngagementStatus::InProgress);
        e
    }

    mod responding {
        use super::*;

        #[test]
        fn recipient_accepts() {
            let generator = codes();
            let result = apply(&requested(), &bob(), Action::Accept, t0(), &generator).unwrap();
            assert_eq!(result.engagement.status, EngagementStatus::Accepted);
            assert_eq!(result.engagement.timestamps.responded_at, Some(t0()));
            assert!(result.effects.is_empty());
            assert!(result.disclosed_code.is_none());
        }

        #[test]
        fn initiator_cannot_accept_own_request() {
            let generator = codes();
            let result = apply(&requested(), &alice(), Action::Accept, t0(), &generator);
            assert_eq!(
                result,
                Err(TransitionError::RecipientOnly {
                    action: ActionKind::Accept
                })
            );
        }

        #[test]
        fn decline_notifies_initiator() {
            let generator = codes();
            let result = apply(&requested(), &bob(), Action::Decline, t0(), &generator).unwrap();
            assert_eq!(result.engagement.status, EngagementStatus::Declined);
            assert_eq!(result.engagement.timestamps.declined_at, Some(t0()));
            assert_eq!(
                result.effects,
                vec![SideEffect::notify(&alice(), NotificationKind::Declined)]
            );
        }

        #[test]
        fn withdraw_is_initiator_only() {
            let generator = codes();
            let result = apply(&requested(), &bob(), Action::Withdraw, t0(), &generator);
            assert_eq!(
                result,
                Err(TransitionError::InitiatorOnly {
                    action: ActionKind::Withdraw
                })
            );

            let result = apply(&requested(), &alice(), Action::Withdraw, t0(), &generator).unwrap();
            assert_eq!(result.engagement.status, EngagementStatus::Withdrawn);
            assert_eq!(
                result.effects,
                vec![SideEffect::notify(&bob(), NotificationKind::Withdrawn)]
            );
        }

        #[test]
        fn stranger_is_rejected_before_any_guard() {
            let generator = codes();
            let result = apply(&requested(), &carol(), Action::Accept, t0(), &generator);
            assert_eq!(
                result,
                Err(TransitionError::NotParticipant {
                    participant: carol()
                })
            );
        }

        /// Scenario: declined engagements accept nothing further.
        #[test]
        fn declined_is_frozen() {
            let generator = codes();
            let declined = apply(&requested(), &bob(), Action::Decline, t0(), &generator)
                .unwrap()
                .engagement;

            for action in [
                Action::Accept,
                Action::Decline,
                Action::Withdraw,
                Action::Schedule {
                    details: schedule_details(),
                },
                Action::Cancel,
                Action::StartVerification,
                Action::SubmitHandshakeCode {
                    code: "1234".to_string(),
                },
                Action::SubmitConfirmationCode {
                    code: "1234".to_string(),
                },
                Action::Complete,
            ] {
                let kind = action.kind();
                let result = apply(&declined, &bob(), action, t0(), &generator);
                assert_eq!(
                    result,
                    Err(TransitionError::InvalidTransition {
                        status: EngagementStatus::Declined,
                        action: kind
                    })
                );
            }
        }
    }

    mod scheduling {
        use super::*;

        #[test]
        fn schedule_mints_and_discloses_confirmation_code() {
            let generator = codes();
            let accepted = engagement_at(EngagementStatus::Accepted, &generator);

            let result = apply(
                &accepted,
                &alice(),
                Action::Schedule {
                    details: schedule_details(),
                },
                t0(),
                &generator,
            )
            .unwrap();

            assert_eq!(result.engagement.status, EngagementStatus::Scheduled);
            assert_eq!(
                result.engagement.confirmation_code,
                Some(VerificationCode::from_number(4821))
            );
            assert_eq!(result.disclosed_code, Some(VerificationCode::from_number(4821)));
            assert_eq!(result.engagement.timestamps.scheduled_at, Some(t0()));
            assert_eq!(
                result.effects,
                vec![SideEffect::notify_with_summary(
                    &bob(),
                    NotificationKind::ScheduleSet,
                    "Friday 7:00 PM at Cafe X".to_string()
                )]
            );
        }

        #[test]
        fn schedule_requires_accepted() {
            let generator = codes();
            let result = apply(
                &requested(),
                &alice(),
                Action::Schedule {
                    details: schedule_details(),
                },
                t0(),
                &generator,
            );
            assert_eq!(
                result,
                Err(TransitionError::InvalidTransition {
                    status: EngagementStatus::Requested,
                    action: ActionKind::Schedule
                })
            );
        }
    }

    mod cancellation {
        use super::*;

        #[test]
        fn cancel_is_legal_from_every_post_acceptance_state() {
            for target in [
                EngagementStatus::Accepted,
                EngagementStatus::Scheduled,
                EngagementStatus::VerificationPending,
                EngagementStatus::InProgress,
            ] {
                let generator = codes();
                let e = engagement_at(target, &generator);
                let result = apply(&e, &bob(), Action::Cancel, t0(), &generator).unwrap();
                assert_eq!(result.engagement.status, EngagementStatus::Cancelled);
                assert_eq!(result.engagement.cancelled_by, Some(bob()));
                assert!(result.engagement.handshake.is_none());
                assert_eq!(
                    result.effects,
                    vec![SideEffect::notify(&alice(), NotificationKind::Cancelled)],
                    "cancel from {target} should notify the other participant"
                );
            }
        }

        #[test]
        fn cancel_records_whichever_participant_called_it() {
            let generator = codes();
            let e = engagement_at(EngagementStatus::Accepted, &generator);
            let result = apply(&e, &alice(), Action::Cancel, t0(), &generator).unwrap();
            assert_eq!(result.engagement.cancelled_by, Some(alice()));
            assert_eq!(
                result.effects,
                vec![SideEffect::notify(&bob(), NotificationKind::Cancelled)]
            );
        }

        #[test]
        fn cancel_from_requested_is_not_an_edge() {
            // Before acceptance the request is taken back with Withdraw (or
            // turned down with Decline), never Cancel.
            let generator = codes();
            let result = apply(&requested(), &alice(), Action::Cancel, t0(), &generator);
            assert_eq!(
                result,
                Err(TransitionError::InvalidTransition {
                    status: EngagementStatus::Requested,
                    action: ActionKind::Cancel
                })
            );
        }
    }

    mod handshake {
        use super::*;

        #[test]
        fn start_verification_discloses_code_to_caller_only() {
            let generator = codes();
            let scheduled = engagement_at(EngagementStatus::Scheduled, &generator);

            let result =
                apply(&scheduled, &alice(), Action::StartVerification, t0(), &generator).unwrap();
            assert_eq!(result.engagement.status, EngagementStatus::VerificationPending);
            assert_eq!(result.disclosed_code, Some(VerificationCode::from_number(9053)));

            let handshake = result.engagement.handshake.as_ref().unwrap();
            assert_eq!(handshake.initiated_by, alice());
            assert_eq!(handshake.code, VerificationCode::from_number(9053));
            assert!(result.effects.is_empty());
        }

        #[test]
        fn either_participant_may_start_verification() {
            let generator = codes();
            let scheduled = engagement_at(EngagementStatus::Scheduled, &generator);
            let result =
                apply(&scheduled, &bob(), Action::StartVerification, t0(), &generator).unwrap();
            assert_eq!(
                result.engagement.handshake.as_ref().unwrap().initiated_by,
                bob()
            );
        }

        #[test]
        fn matching_echo_moves_to_in_progress() {
            let generator = codes();
            let pending = engagement_at(EngagementStatus::VerificationPending, &generator);

            let result = apply(
                &pending,
                &bob(),
                Action::SubmitHandshakeCode {
                    code: "9053".to_string(),
                },
                t0(),
                &generator,
            )
            .unwrap();

            assert_eq!(result.engagement.status, EngagementStatus::InProgress);
            assert!(result.engagement.handshake.is_none());
            assert_eq!(result.engagement.timestamps.verified_at, Some(t0()));
            assert_eq!(result.outcome, TransitionOutcome::Advanced);
        }

        /// Scenario: a wrong code reverts to Scheduled, clears the handshake,
        /// and forces a fresh StartVerification.
        #[test]
        fn wrong_echo_reverts_and_voids_the_code() {
            let generator = codes();
            let pending = engagement_at(EngagementStatus::VerificationPending, &generator);

            let result = apply(
                &pending,
                &bob(),
                Action::SubmitHandshakeCode {
                    code: "0000".to_string(),
                },
                t0(),
                &generator,
            )
            .unwrap();

            assert_eq!(result.outcome, TransitionOutcome::HandshakeRejected);
            assert_eq!(result.engagement.status, EngagementStatus::Scheduled);
            assert!(result.engagement.handshake.is_none());
            assert!(result.engagement.timestamps.verified_at.is_none());

            // Restarting mints a different code; the old one is dead.
            let restarted = apply(
                &result.engagement,
                &alice(),
                Action::StartVerification,
                t0(),
                &generator,
            )
            .unwrap();
            assert_eq!(
                restarted.engagement.handshake.as_ref().unwrap().code,
                VerificationCode::from_number(7710)
            );
        }

        #[test]
        fn initiator_cannot_echo_own_code() {
            let generator = codes();
            let pending = engagement_at(EngagementStatus::VerificationPending, &generator);

            let result = apply(
                &pending,
                &alice(),
                Action::SubmitHandshakeCode {
                    code: "9053".to_string(),
                },
                t0(),
                &generator,
            );
            assert_eq!(result, Err(TransitionError::HandshakeOwnCode));
        }

        #[test]
        fn verification_started_at_survives_a_failed_round() {
            let generator = codes();
            let first_start = Utc.with_ymd_and_hms(2024, 5, 10, 19, 0, 0).unwrap();
            let later = Utc.with_ymd_and_hms(2024, 5, 10, 19, 5, 0).unwrap();

            let scheduled = engagement_at(EngagementStatus::Scheduled, &generator);
            let pending = apply(
                &scheduled,
                &alice(),
                Action::StartVerification,
                first_start,
                &generator,
            )
            .unwrap()
            .engagement;
            let reverted = apply(
                &pending,
                &bob(),
                Action::SubmitHandshakeCode {
                    code: "0000".to_string(),
                },
                later,
                &generator,
            )
            .unwrap()
            .engagement;
            let restarted = apply(
                &reverted,
                &alice(),
                Action::StartVerification,
                later,
                &generator,
            )
            .unwrap()
            .engagement;

            assert_eq!(
                restarted.timestamps.verification_started_at,
                Some(first_start)
            );
        }

        #[test]
        fn confirmation_code_is_unchanged_by_verification_rounds() {
            let generator = codes();
            let pending = engagement_at(EngagementStatus::VerificationPending, &generator);
            let reverted = apply(
                &pending,
                &bob(),
                Action::SubmitHandshakeCode {
                    code: "0000".to_string(),
                },
                t0(),
                &generator,
            )
            .unwrap()
            .engagement;

            assert_eq!(
                reverted.confirmation_code,
                Some(VerificationCode::from_number(4821))
            );
        }
    }

    mod confirmation {
        use super::*;

        /// Scenario: confirming from InProgress completes and notifies both.
        #[test]
        fn correct_code_completes_from_in_progress() {
            let generator = codes();
            let in_progress = engagement_at(EngagementStatus::InProgress, &generator);

            let result = apply(
                &in_progress,
                &bob(),
                Action::SubmitConfirmationCode {
                    code: "4821".to_string(),
                },
                t0(),
                &generator,
            )
            .unwrap();

            assert_eq!(result.engagement.status, EngagementStatus::Completed);
            assert_eq!(result.engagement.timestamps.completed_at, Some(t0()));
            assert_eq!(
                result.effects,
                vec![
                    SideEffect::notify(&alice(), NotificationKind::Completed),
                    SideEffect::notify(&bob(), NotificationKind::Completed),
                ]
            );
        }

        #[test]
        fn correct_code_also_completes_straight_from_scheduled() {
            let generator = codes();
            let scheduled = engagement_at(EngagementStatus::Scheduled, &generator);

            let result = apply(
                &scheduled,
                &alice(),
                Action::SubmitConfirmationCode {
                    code: "4821".to_string(),
                },
                t0(),
                &generator,
            )
            .unwrap();
            assert_eq!(result.engagement.status, EngagementStatus::Completed);
        }

        #[test]
        fn wrong_code_is_an_error_with_no_transition() {
            let generator = codes();
            let in_progress = engagement_at(EngagementStatus::InProgress, &generator);

            let result = apply(
                &in_progress,
                &bob(),
                Action::SubmitConfirmationCode {
                    code: "0000".to_string(),
                },
                t0(),
                &generator,
            );
            assert_eq!(result, Err(TransitionError::ConfirmationMismatch));
        }

        #[test]
        fn explicit_complete_works_from_in_progress_only() {
            let generator = codes();
            let in_progress = engagement_at(EngagementStatus::InProgress, &generator);
            let result = apply(&in_progress, &alice(), Action::Complete, t0(), &generator).unwrap();
            assert_eq!(result.engagement.status, EngagementStatus::Completed);

            let generator = codes();
            let scheduled = engagement_at(EngagementStatus::Scheduled, &generator);
            let result = apply(&scheduled, &alice(), Action::Complete, t0(), &generator);
            assert_eq!(
                result,
                Err(TransitionError::InvalidTransition {
                    status: EngagementStatus::Scheduled,
                    action: ActionKind::Complete
                })
            );
        }
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        fn arb_actor() -> impl Strategy<Value = ParticipantId> {
            prop_oneof![Just(alice()), Just(bob())]
        }

        fn arb_action() -> impl Strategy<Value = Action> {
            prop_oneof![
                Just(Action::Accept),
                Just(Action::Decline),
                Just(Action::Withdraw),
                Just(Action::Schedule {
                    details: Schedule {
                        day: "Friday".to_string(),
                        time: "7:00 PM".to_string(),
                        activity: None,
                        venue: None,
                        location_ref: None,
                        starts_at: None,
                    }
                }),
                Just(Action::Cancel),
                Just(Action::StartVerification),
                (1000u16..=9999).prop_map(|n| Action::SubmitHandshakeCode {
                    code: n.to_string()
                }),
                (1000u16..=9999).prop_map(|n| Action::SubmitConfirmationCode {
                    code: n.to_string()
                }),
                Just(Action::Complete),
            ]
        }

        proptest! {
            /// Any sequence of accepted transitions is a path through the
            /// lifecycle graph, and the structural invariants hold at every
            /// step.
            #[test]
            fn applied_transitions_walk_the_graph(
                steps in prop::collection::vec((arb_actor(), arb_action()), 1..40)
            ) {
                let generator = crate::codes::RandomCodeGenerator;
                let mut current = requested();

                for (actor, action) in steps {
                    match apply(&current, &actor, action, t0(), &generator) {
                        Ok(result) => {
                            let next = result.engagement;
                            if next.status != current.status {
                                prop_assert!(
                                    is_legal_edge(current.status, next.status),
                                    "illegal edge {} -> {}",
                                    current.status,
                                    next.status
                                );
                            }

                            // handshake present iff verification pending
                            prop_assert_eq!(
                                next.handshake.is_some(),
                                next.status == EngagementStatus::VerificationPending
                            );

                            // confirmation code present iff the engagement has
                            // passed through Scheduled
                            prop_assert_eq!(
                                next.confirmation_code.is_some(),
                                next.timestamps.scheduled_at.is_some()
                            );

                            // exactly one terminal timestamp once terminal
                            if next.status.is_terminal() {
                                prop_assert_eq!(next.timestamps.terminal_count(), 1);
                            } else {
                                prop_assert_eq!(next.timestamps.terminal_count(), 0);
                            }

                            // the pure layer never touches the version
                            prop_assert_eq!(next.version, current.version);

                            current = next;
                        }
                        Err(_) => {
                            // Rejected transitions leave no trace; `current`
                            // is untouched by construction.
                        }
                    }
                }
            }

            /// Terminal states accept no action whatsoever.
            #[test]
            fn terminal_states_are_sinks(
                (actor, action) in (arb_actor(), arb_action())
            ) {
                let generator = codes();
                let declined = apply(&requested(), &bob(), Action::Decline, t0(), &generator)
                    .unwrap()
                    .engagement;
                prop_assert!(apply(&declined, &actor, action, t0(), &generator).is_err());
            }
        }
    }
}
