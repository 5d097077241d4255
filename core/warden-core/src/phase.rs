//! Maps auth check outcomes to session phases and the side effects they imply.
//!
//! Transport failures only erode an authenticated session; they never create
//! one and never end an already-ended one. An authoritative "not authenticated"
//! always ends the session immediately.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::TransportError;

/// The coordinator's current belief about the user's session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    #[default]
    Unknown,
    Unauthenticated,
    Authenticated,
    /// Checks are failing but the session was authenticated; grace period.
    Degraded,
    /// The service answered and reported no session.
    Expired,
}

impl SessionPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionPhase::Unknown => "unknown",
            SessionPhase::Unauthenticated => "unauthenticated",
            SessionPhase::Authenticated => "authenticated",
            SessionPhase::Degraded => "degraded",
            SessionPhase::Expired => "expired",
        }
    }

    pub fn from_str(value: &str) -> Option<Self> {
        match value {
            "unknown" => Some(SessionPhase::Unknown),
            "unauthenticated" => Some(SessionPhase::Unauthenticated),
            "authenticated" => Some(SessionPhase::Authenticated),
            "degraded" => Some(SessionPhase::Degraded),
            "expired" => Some(SessionPhase::Expired),
            _ => None,
        }
    }

    /// Authenticated, or still inside the grace period.
    pub fn is_signed_in(&self) -> bool {
        matches!(self, SessionPhase::Authenticated | SessionPhase::Degraded)
    }
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a single status check produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckOutcome {
    Authenticated,
    NotAuthenticated,
    TransportFailure,
}

impl CheckOutcome {
    pub fn from_result(result: &Result<bool, TransportError>) -> Self {
        match result {
            Ok(true) => CheckOutcome::Authenticated,
            Ok(false) => CheckOutcome::NotAuthenticated,
            Err(_) => CheckOutcome::TransportFailure,
        }
    }

    /// The remote call returned, whatever it said.
    pub fn is_success(&self) -> bool {
        !matches!(self, CheckOutcome::TransportFailure)
    }
}

/// Computes the phase after a check.
///
/// `consecutive_failures` is the counter *after* this check was recorded, so
/// with `grace_failures = 3` the fourth failure in a row is the first one
/// that ends the session.
pub fn next_phase(
    current: SessionPhase,
    outcome: CheckOutcome,
    consecutive_failures: u32,
    grace_failures: u32,
) -> SessionPhase {
    match outcome {
        CheckOutcome::Authenticated => SessionPhase::Authenticated,
        CheckOutcome::NotAuthenticated => SessionPhase::Expired,
        CheckOutcome::TransportFailure => match current {
            SessionPhase::Authenticated | SessionPhase::Degraded => {
                if consecutive_failures <= grace_failures {
                    SessionPhase::Degraded
                } else {
                    SessionPhase::Unauthenticated
                }
            }
            SessionPhase::Unknown | SessionPhase::Unauthenticated | SessionPhase::Expired => {
                current
            }
        },
    }
}

/// A phase change, as broadcast to subscribers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseTransition {
    pub previous: SessionPhase,
    pub current: SessionPhase,
    pub at: DateTime<Utc>,
}

/// The two surfaces the session phase drives. Names come from config.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SurfaceRole {
    Authenticated,
    Login,
}

/// Side effects owed for one check result.
///
/// Deactivations are listed separately so the activator can apply them first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransitionPlan {
    pub invalidate_caches: bool,
    pub deactivate: Vec<SurfaceRole>,
    pub activate: Vec<SurfaceRole>,
}

impl TransitionPlan {
    pub fn is_empty(&self) -> bool {
        !self.invalidate_caches && self.deactivate.is_empty() && self.activate.is_empty()
    }

    fn session_ended() -> Self {
        TransitionPlan {
            invalidate_caches: true,
            deactivate: vec![SurfaceRole::Authenticated],
            activate: vec![SurfaceRole::Login],
        }
    }
}

/// Decides side effects from the phase before and after a check.
///
/// An authenticated result restates the desired surfaces on every check; the
/// activator turns repeats into no-ops, and a process restarted with a
/// persisted `Authenticated` phase still gets its surface back. Caches are
/// never cleared on the way into `Authenticated`, which is what keeps the
/// grace period honest when `Degraded` recovers.
pub fn plan_transition(previous: SessionPhase, current: SessionPhase) -> TransitionPlan {
    match current {
        SessionPhase::Authenticated => TransitionPlan {
            invalidate_caches: false,
            deactivate: vec![SurfaceRole::Login],
            activate: vec![SurfaceRole::Authenticated],
        },
        SessionPhase::Expired => TransitionPlan::session_ended(),
        SessionPhase::Unauthenticated if previous != SessionPhase::Unauthenticated => {
            TransitionPlan::session_ended()
        }
        SessionPhase::Unauthenticated | SessionPhase::Degraded | SessionPhase::Unknown => {
            TransitionPlan::default()
        }
    }
}
