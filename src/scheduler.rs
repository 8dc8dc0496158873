//! The scheduling interface time-windowed and context-hopping operators depend on.
//!
//! Concrete run loops and thread pools live outside this crate; anything that can run
//! an action now or after a delay can implement [`Scheduler`].

use std::{sync::Arc, time::Duration};

use crate::{Cancellable, CancellationToken, SchedulerError};

mod immediate;
pub use immediate::*;

pub type Action = Box<dyn FnOnce() + Send + 'static>;

/// An execution context that can run actions, optionally after a delay.
pub trait Scheduler: Send + Sync + 'static {
    /// Time elapsed since the scheduler's own epoch.
    fn now(&self) -> Duration;

    /// Runs `action` on this scheduler's context.
    fn schedule(&self, action: Action) -> Result<(), SchedulerError>;

    /// Runs `action` on this scheduler's context once `delay` has elapsed.
    fn schedule_after(&self, delay: Duration, action: Action) -> Result<TimerHandle, SchedulerError>;
}

pub type SchedulerRef = Arc<dyn Scheduler>;

impl<S> Scheduler for Arc<S>
where
    S: Scheduler + ?Sized,
{
    fn now(&self) -> Duration {
        (**self).now()
    }

    fn schedule(&self, action: Action) -> Result<(), SchedulerError> {
        (**self).schedule(action)
    }

    fn schedule_after(&self, delay: Duration, action: Action) -> Result<TimerHandle, SchedulerError> {
        (**self).schedule_after(delay, action)
    }
}

/// Cancels a scheduled action that has not run yet.
#[derive(Debug, Clone)]
pub struct TimerHandle {
    token: CancellationToken,
}

impl TimerHandle {
    /// Wraps the token the scheduler checks before running the action.
    pub fn new(token: CancellationToken) -> Self {
        Self { token }
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

impl Cancellable for TimerHandle {
    fn cancel(&self) {
        self.token.cancel();
    }
}
