//! Time-windowed operators.
//!
//! They read the clock and set timers through a [`Scheduler`]. Upstream is expected to
//! deliver on the same context the timers fire on; put a `receive_on` in front when it
//! does not. Cancelling one of these operators cancels every timer it has set.

use std::{
    sync::{Arc, Weak},
    time::Duration,
};

use crate::{
    scheduler::{Scheduler, TimerHandle},
    Cancellable, SchedulerError,
};

mod debounce;
mod delay;
mod measure_interval;
mod throttle;
mod timeout;

pub use debounce::*;
pub use delay::*;
pub use measure_interval::*;
pub use throttle::*;
pub use timeout::*;

/// A single re-armable timer. Each arming gets a new generation, so a timer that fires
/// after it was replaced or cleared is recognised and ignored.
#[derive(Debug, Default)]
pub(crate) struct TimerSlot {
    generation: u64,
    handle: Option<TimerHandle>,
}

impl TimerSlot {
    /// Invalidates the current timer. Returns the generation for the next one.
    pub(crate) fn rearm(&mut self) -> (u64, Option<TimerHandle>) {
        self.generation += 1;
        (self.generation, self.handle.take())
    }

    /// Stores the handle of the timer armed for `generation`; hands it back if that
    /// generation is already stale.
    pub(crate) fn set(&mut self, generation: u64, handle: TimerHandle) -> Option<TimerHandle> {
        if generation == self.generation {
            self.handle = Some(handle);
            None
        } else {
            Some(handle)
        }
    }

    /// `true` if the timer of `generation` is still the current one.
    pub(crate) fn fire(&mut self, generation: u64) -> bool {
        if generation == self.generation {
            self.handle = None;
            true
        } else {
            false
        }
    }

    pub(crate) fn clear(&mut self) -> Option<TimerHandle> {
        self.rearm().1
    }
}

/// Schedules `fire(node, generation)` after `delay`. The timer holds the node weakly.
pub(crate) fn arm<N, C>(
    scheduler: &C,
    delay: Duration,
    node: &Arc<N>,
    generation: u64,
    fire: fn(&Arc<N>, u64),
) -> Result<TimerHandle, SchedulerError>
where
    N: Send + Sync + 'static,
    C: Scheduler + ?Sized,
{
    let node: Weak<N> = Arc::downgrade(node);
    scheduler.schedule_after(
        delay,
        Box::new(move || {
            if let Some(node) = node.upgrade() {
                fire(&node, generation);
            }
        }),
    )
}

pub(crate) fn cancel_timer(handle: Option<TimerHandle>) {
    if let Some(handle) = handle {
        handle.cancel();
    }
}
