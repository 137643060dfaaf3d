//! Waiting on asynchronous provider actions.
//!
//! The provider acknowledges resizes and disk operations immediately and
//! reports completion through account events. [`Waiter`] polls for the event
//! matching a [`PendingAction`] until it reaches a terminal status or the
//! action's timeout elapses. Waiting only reads; it is safe to repeat.

use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use shape_core::{EntityRef, Event, EventAction, EventStatus};
use shape_provider::{ComputeProvider, EventFilter};
use tokio::time::{sleep, Instant};

use crate::error::{ReconcileError, Result};

/// Deadline offset used when a timeout is too large to represent.
const UNBOUNDED_WAIT: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

/// How far the provider clock may run behind the local one.
const CLOCK_SKEW_SECS: i64 = 30;

/// Lower bound on the event time of an action about to be issued.
///
/// Read from the local clock and backdated by the tolerated skew. Events of
/// earlier actions inside that window are shadowed, since the newest
/// matching event decides a wait.
#[must_use]
pub fn issue_floor() -> DateTime<Utc> {
    Utc::now() - TimeDelta::seconds(CLOCK_SKEW_SECS)
}

/// An asynchronous action the caller has issued and now waits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingAction {
    /// Entity the action was performed on.
    pub entity: EntityRef,
    /// Action kind.
    pub action: EventAction,
    /// Secondary entity, for disk actions.
    pub secondary: Option<EntityRef>,
    /// Events created before this instant belong to earlier actions.
    pub since: DateTime<Utc>,
    /// How long to wait before giving up.
    pub timeout: Duration,
}

impl PendingAction {
    /// An action on `entity` issued at `since`.
    #[must_use]
    pub const fn new(
        entity: EntityRef,
        action: EventAction,
        since: DateTime<Utc>,
        timeout: Duration,
    ) -> Self {
        Self {
            entity,
            action,
            secondary: None,
            since,
            timeout,
        }
    }

    /// Also match on a secondary entity.
    #[must_use]
    pub const fn with_secondary(mut self, secondary: EntityRef) -> Self {
        self.secondary = Some(secondary);
        self
    }

    /// The event query for this action.
    #[must_use]
    pub fn filter(&self) -> EventFilter {
        let filter = EventFilter::new(self.entity, self.action, self.since);
        match self.secondary {
            Some(secondary) => filter.with_secondary(secondary),
            None => filter,
        }
    }
}

/// How a wait ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WaitOutcome {
    /// The action finished.
    Completed(Event),
    /// The provider reported the action as failed.
    Failed(Event),
    /// No terminal event arrived before the timeout.
    TimedOut,
}

/// Polls provider events for completion of pending actions.
pub struct Waiter<'a, P: ?Sized> {
    provider: &'a P,
    poll_interval: Duration,
}

impl<'a, P: ComputeProvider + ?Sized> Waiter<'a, P> {
    /// Create a waiter polling every `poll_interval`.
    pub const fn new(provider: &'a P, poll_interval: Duration) -> Self {
        Self {
            provider,
            poll_interval,
        }
    }

    /// Wait for `pending` to reach a terminal state.
    ///
    /// The newest matching event decides the outcome. The provider is polled
    /// at least once, even with a zero timeout.
    ///
    /// # Errors
    ///
    /// Returns an error only if an event query fails.
    pub async fn wait(&self, pending: &PendingAction) -> Result<WaitOutcome> {
        let filter = pending.filter();
        let started = Instant::now();
        let deadline = started
            .checked_add(pending.timeout)
            .unwrap_or_else(|| started + UNBOUNDED_WAIT);
        let mut polls = 0u32;

        loop {
            polls += 1;
            let events = self.provider.list_events(&filter).await?;
            let newest = events.into_iter().max_by_key(|e| (e.created, e.id));
            if let Some(event) = newest {
                tracing::trace!(
                    entity = %pending.entity,
                    action = %pending.action,
                    event_id = %event.id,
                    status = ?event.status,
                    percent_complete = ?event.percent_complete,
                    "Polled event"
                );
                match event.status {
                    EventStatus::Finished | EventStatus::Notification => {
                        tracing::debug!(
                            entity = %pending.entity,
                            action = %pending.action,
                            polls,
                            "Action completed"
                        );
                        return Ok(WaitOutcome::Completed(event));
                    }
                    EventStatus::Failed => {
                        tracing::warn!(
                            entity = %pending.entity,
                            action = %pending.action,
                            event_id = %event.id,
                            reason = event.message.as_deref().unwrap_or(""),
                            "Action failed"
                        );
                        return Ok(WaitOutcome::Failed(event));
                    }
                    EventStatus::Scheduled | EventStatus::Started | EventStatus::Unknown => {}
                }
            }

            let now = Instant::now();
            if now >= deadline {
                tracing::warn!(
                    entity = %pending.entity,
                    action = %pending.action,
                    timeout = ?pending.timeout,
                    polls,
                    "Timed out waiting for action"
                );
                return Ok(WaitOutcome::TimedOut);
            }
            sleep(self.poll_interval.min(deadline - now)).await;
        }
    }

    /// Wait for `pending` and turn failure and timeout into errors.
    ///
    /// # Errors
    ///
    /// Returns `ProviderOperationFailed` if the action failed, `AsyncTimeout`
    /// if it did not finish in time, or the provider error of a failed query.
    pub async fn wait_for(&self, pending: &PendingAction) -> Result<Event> {
        match self.wait(pending).await? {
            WaitOutcome::Completed(event) => Ok(event),
            WaitOutcome::Failed(event) => Err(ReconcileError::ProviderOperationFailed {
                entity: pending.entity,
                action: pending.action,
                event_id: event.id,
                message: event.message.unwrap_or_default(),
            }),
            WaitOutcome::TimedOut => Err(ReconcileError::AsyncTimeout {
                entity: pending.entity,
                action: pending.action,
                timeout: pending.timeout,
            }),
        }
    }
}
