use std::time::{Duration, Instant};

use super::{Action, Scheduler, TimerHandle};
use crate::{CancellationToken, SchedulerError};

/// Runs every action inline on the calling thread. Delays are ignored.
#[derive(Debug, Clone, Copy)]
pub struct ImmediateScheduler {
    epoch: Instant,
}

impl ImmediateScheduler {
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
        }
    }
}

impl Default for ImmediateScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler for ImmediateScheduler {
    fn now(&self) -> Duration {
        self.epoch.elapsed()
    }

    fn schedule(&self, action: Action) -> Result<(), SchedulerError> {
        action();
        Ok(())
    }

    fn schedule_after(&self, _delay: Duration, action: Action) -> Result<TimerHandle, SchedulerError> {
        action();
        Ok(TimerHandle::new(CancellationToken::new()))
    }
}
