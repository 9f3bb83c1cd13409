//! Coordinator-level models
//!
//! Wait policies, acquisition results, and the per-attempt state machine.

use std::fmt::{Display, Formatter};
use std::time::Duration;

use leasehold_consistency::{Denial, Lease};
use tokio::time::Instant;

/// How long `acquire` may wait for a held lock
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WaitPolicy {
    /// Try once
    #[default]
    NoWait,
    /// Keep retrying until the budget is spent
    WaitUpTo(Duration),
    /// Keep retrying until cancelled
    WaitForever,
}

impl WaitPolicy {
    /// Instant after which no further attempt is made. `None` means no deadline.
    pub fn deadline(&self, start: Instant) -> Option<Instant> {
        match self {
            WaitPolicy::NoWait => Some(start),
            WaitPolicy::WaitUpTo(budget) => Some(start + *budget),
            WaitPolicy::WaitForever => None,
        }
    }

    pub fn allows_waiting(&self) -> bool {
        !matches!(self, WaitPolicy::NoWait)
    }
}

/// Result of `LockCoordinator::acquire`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AcquireResult {
    Held(Lease),
    /// Denied on a `NoWait` attempt
    Denied(Denial),
    /// The wait budget ran out; carries the last denial seen, if any
    TimedOut(Option<Denial>),
    Cancelled,
}

impl AcquireResult {
    pub fn is_held(&self) -> bool {
        matches!(self, AcquireResult::Held(_))
    }

    pub fn lease(&self) -> Option<&Lease> {
        match self {
            AcquireResult::Held(lease) => Some(lease),
            _ => None,
        }
    }

    pub fn into_lease(self) -> Option<Lease> {
        match self {
            AcquireResult::Held(lease) => Some(lease),
            _ => None,
        }
    }

    /// State the attempt ends in
    pub fn state(&self) -> AttemptState {
        match self {
            AcquireResult::Held(_) => AttemptState::Held,
            AcquireResult::Denied(_) => AttemptState::Denied,
            AcquireResult::TimedOut(_) => AttemptState::TimedOut,
            AcquireResult::Cancelled => AttemptState::Cancelled,
        }
    }
}

/// Lifecycle of one acquisition attempt as the coordinator sees it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttemptState {
    Pending,
    Held,
    Renewing,
    Denied,
    TimedOut,
    Cancelled,
    Released,
    Expired,
}

#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("illegal lock attempt transition {from} -> {to}")]
pub struct InvalidTransition {
    pub from: AttemptState,
    pub to: AttemptState,
}

impl AttemptState {
    pub fn can_transition_to(self, next: AttemptState) -> bool {
        use AttemptState::*;
        matches!(
            (self, next),
            (Pending, Held | Denied | TimedOut | Cancelled)
                | (Held, Renewing | Released | Expired)
                | (Renewing, Held | Expired)
        )
    }

    pub fn transition(self, next: AttemptState) -> Result<AttemptState, InvalidTransition> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(InvalidTransition {
                from: self,
                to: next,
            })
        }
    }

    /// No further transitions for this attempt; a new attempt starts at `Pending`
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            AttemptState::Denied
                | AttemptState::TimedOut
                | AttemptState::Cancelled
                | AttemptState::Released
                | AttemptState::Expired
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AttemptState::Pending => "pending",
            AttemptState::Held => "held",
            AttemptState::Renewing => "renewing",
            AttemptState::Denied => "denied",
            AttemptState::TimedOut => "timed_out",
            AttemptState::Cancelled => "cancelled",
            AttemptState::Released => "released",
            AttemptState::Expired => "expired",
        }
    }
}

impl Display for AttemptState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
