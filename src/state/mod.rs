//! The engagement state machine.
//!
//! Split the way a pure state machine wants to be split:
//! - **Actions**: what a participant asked for (`transitions::Action`)
//! - **Transition**: pure function `(Engagement, actor, Action) -> (Engagement, Vec<SideEffect>)`
//! - **Effects**: what to tell the outside world (`effects::SideEffect`)
//!
//! The store applies transitions atomically; the dispatcher executes effects
//! after the commit, never before.

pub mod effects;
pub mod transitions;

pub use effects::{NotificationKind, SideEffect};
pub use transitions::{
    Action, ActionKind, Transitioned, TransitionError, TransitionOutcome, apply, is_legal_edge,
};
