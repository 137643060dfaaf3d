//! Resize state machine.
//!
//! A resize moves the instance to a new plan and, when requested, grows its
//! largest disk into the freed allowance. Only one asynchronous action is in
//! flight at a time.
//!
//! # State Machine
//!
//! ```text
//!     ┌──────────┐
//!     │   Idle   │◄──────────────────────────────┐
//!     └────┬─────┘                               │
//!          │ (resize issued)                     │
//!          ▼                                     │
//!     ┌─────────────────────┐                    │
//!     │ TypeResizeRequested │                    │
//!     └────┬────────────────┘                    │
//!          │ (accepted)                          │
//!          ▼                                     │
//!     ┌───────────────────┐  (no expansion)      │
//!     │ TypeResizeWaiting │──────────────────────┤
//!     └────┬──────────────┘                      │
//!          │ (finished, expansion needed)        │
//!          ▼                                     │
//!     ┌────────────────────────┐                 │
//!     │ DiskExpansionRequested │                 │
//!     └────┬───────────────────┘                 │
//!          │ (accepted)                          │
//!          ▼                                     │
//!     ┌──────────────────────┐   (finished)      │
//!     │ DiskExpansionWaiting │───────────────────┘
//!     └──────────────────────┘
//! ```
//!
//! A failure or timeout in any phase ends the resize; the next
//! reconciliation starts again from `Idle` against fresh provider state.

use std::fmt;

use serde::{Deserialize, Serialize};
use shape_core::InstanceId;

use crate::error::{ReconcileError, Result};

/// Phase of an in-progress resize.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ResizePhase {
    /// No resize in progress.
    #[default]
    Idle,
    /// The plan change is being requested.
    TypeResizeRequested,
    /// Waiting for the plan change to finish.
    TypeResizeWaiting,
    /// The disk resize is being requested.
    DiskExpansionRequested,
    /// Waiting for the disk resize to finish.
    DiskExpansionWaiting,
}

impl ResizePhase {
    /// Snake-case name of the phase.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::TypeResizeRequested => "type_resize_requested",
            Self::TypeResizeWaiting => "type_resize_waiting",
            Self::DiskExpansionRequested => "disk_expansion_requested",
            Self::DiskExpansionWaiting => "disk_expansion_waiting",
        }
    }

    /// Returns true while an asynchronous action is outstanding.
    #[must_use]
    pub const fn is_waiting(self) -> bool {
        matches!(self, Self::TypeResizeWaiting | Self::DiskExpansionWaiting)
    }
}

impl fmt::Display for ResizePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Check if a phase transition is allowed.
#[must_use]
pub const fn is_valid_transition(from: ResizePhase, to: ResizePhase) -> bool {
    use ResizePhase::{
        DiskExpansionRequested, DiskExpansionWaiting, Idle, TypeResizeRequested,
        TypeResizeWaiting,
    };

    matches!(
        (from, to),
        (Idle, TypeResizeRequested)
            | (TypeResizeRequested, TypeResizeWaiting)
            // Without auto-expand, or with no free space, the resize ends here
            | (TypeResizeWaiting, DiskExpansionRequested | Idle)
            | (DiskExpansionRequested, DiskExpansionWaiting)
            | (DiskExpansionWaiting, Idle)
    )
}

/// Tracks the phase of one instance's resize and rejects out-of-order steps.
#[derive(Debug, Clone, Copy)]
pub struct PhaseTracker {
    instance_id: InstanceId,
    phase: ResizePhase,
}

impl PhaseTracker {
    /// Start tracking in `Idle`.
    #[must_use]
    pub const fn new(instance_id: InstanceId) -> Self {
        Self {
            instance_id,
            phase: ResizePhase::Idle,
        }
    }

    /// Current phase.
    #[must_use]
    pub const fn phase(&self) -> ResizePhase {
        self.phase
    }

    /// Move to `to`.
    ///
    /// # Errors
    ///
    /// Returns `ReconcileError::InvalidPhase` if the transition is not allowed.
    pub fn advance(&mut self, to: ResizePhase) -> Result<()> {
        if !is_valid_transition(self.phase, to) {
            return Err(ReconcileError::InvalidPhase {
                instance_id: self.instance_id,
                from: self.phase,
                to,
            });
        }
        tracing::debug!(
            instance_id = %self.instance_id,
            from = %self.phase,
            to = %to,
            "Resize phase transition"
        );
        self.phase = to;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_transitions() {
        use ResizePhase::*;

        assert!(is_valid_transition(Idle, TypeResizeRequested));
        assert!(is_valid_transition(TypeResizeRequested, TypeResizeWaiting));
        assert!(is_valid_transition(TypeResizeWaiting, Idle));
        assert!(is_valid_transition(TypeResizeWaiting, DiskExpansionRequested));
        assert!(is_valid_transition(DiskExpansionRequested, DiskExpansionWaiting));
        assert!(is_valid_transition(DiskExpansionWaiting, Idle));
    }

    #[test]
    fn invalid_transitions() {
        use ResizePhase::*;

        // Disk expansion never starts before the plan change finishes
        assert!(!is_valid_transition(Idle, DiskExpansionRequested));
        assert!(!is_valid_transition(TypeResizeRequested, DiskExpansionRequested));
        // No pipelining: a new request cannot start while waiting
        assert!(!is_valid_transition(TypeResizeWaiting, TypeResizeRequested));
        assert!(!is_valid_transition(DiskExpansionWaiting, TypeResizeRequested));
        assert!(!is_valid_transition(Idle, Idle));
    }

    #[test]
    fn tracker_rejects_out_of_order() {
        let mut tracker = PhaseTracker::new(InstanceId::new(7));
        tracker.advance(ResizePhase::TypeResizeRequested).unwrap();

        let err = tracker
            .advance(ResizePhase::DiskExpansionWaiting)
            .unwrap_err();
        assert!(matches!(
            err,
            ReconcileError::InvalidPhase {
                from: ResizePhase::TypeResizeRequested,
                to: ResizePhase::DiskExpansionWaiting,
                ..
            }
        ));
        assert_eq!(tracker.phase(), ResizePhase::TypeResizeRequested);
    }

    #[test]
    fn waiting_phases() {
        assert!(ResizePhase::TypeResizeWaiting.is_waiting());
        assert!(ResizePhase::DiskExpansionWaiting.is_waiting());
        assert!(!ResizePhase::Idle.is_waiting());
    }
}
