use std::{sync::Arc, time::Duration};

use parking_lot::Mutex;

use super::{arm, cancel_timer, TimerSlot};
use crate::{
    node::{Outbox, UpstreamLink},
    scheduler::Scheduler,
    Cancellable, Completion, Demand, Publisher, SchedulerError, StreamError, Subscriber,
    Subscription, SubscriptionRef,
};

/// Emits at most one item per `interval`.
///
/// The first item after a quiet period opens a window of `interval`; with `emit_first`
/// it goes out at once, otherwise it is held. Items arriving inside the window replace
/// the held one, and at the window boundary the held item is emitted and a new window
/// opens. A boundary with nothing held closes the window. When upstream finishes, the
/// held item is emitted before the completion.
pub struct Throttle<U, C> {
    upstream: U,
    interval: Duration,
    emit_first: bool,
    scheduler: Arc<C>,
}

impl<U, C> Throttle<U, C> {
    pub(crate) fn new(upstream: U, interval: Duration, scheduler: C, emit_first: bool) -> Self {
        Self {
            upstream,
            interval,
            emit_first,
            scheduler: Arc::new(scheduler),
        }
    }
}

impl<U, C> Publisher for Throttle<U, C>
where
    U: Publisher,
    U::Failure: From<StreamError>,
    C: Scheduler,
{
    type Output = U::Output;
    type Failure = U::Failure;

    fn receive<S>(&self, subscriber: S)
    where
        S: Subscriber<Input = U::Output, Failure = U::Failure>,
    {
        let node = Arc::new(ThrottleNode {
            interval: self.interval,
            emit_first: self.emit_first,
            scheduler: self.scheduler.clone(),
            upstream: UpstreamLink::new(),
            outbox: Outbox::new(subscriber),
            state: Mutex::new(ThrottleState {
                held: None,
                window_open: false,
                timer: TimerSlot::default(),
            }),
        });
        self.upstream.receive(ThrottleSubscriber { node });
    }
}

struct ThrottleState<O> {
    held: Option<O>,
    window_open: bool,
    timer: TimerSlot,
}

struct ThrottleNode<C, O, E> {
    interval: Duration,
    emit_first: bool,
    scheduler: Arc<C>,
    upstream: UpstreamLink,
    outbox: Outbox<O, E>,
    state: Mutex<ThrottleState<O>>,
}

impl<C, O, E> ThrottleNode<C, O, E>
where
    C: Scheduler,
    O: Send + 'static,
    E: From<StreamError> + Send + 'static,
{
    /// Returns `false` if the scheduler refused the timer and the stream failed.
    fn open_window(self: &Arc<Self>, generation: u64) -> bool {
        match arm(
            &*self.scheduler,
            self.interval,
            self,
            generation,
            Self::boundary,
        ) {
            Ok(handle) => {
                cancel_timer(self.state.lock().timer.set(generation, handle));
                true
            }
            Err(err) => {
                self.refused(err);
                false
            }
        }
    }

    fn boundary(self: &Arc<Self>, generation: u64) {
        let (held, next) = {
            let mut state = self.state.lock();
            if !state.timer.fire(generation) {
                return;
            }
            match state.held.take() {
                Some(item) => (item, state.timer.rearm().0),
                None => {
                    state.window_open = false;
                    return;
                }
            }
        };
        if self.open_window(next) {
            self.outbox.push_latest(held);
        }
    }

    fn refused(&self, err: SchedulerError) {
        log::debug!("throttle timer refused: {}", err);
        self.stop();
        self.outbox
            .terminate(Completion::Failed(StreamError::from(err).into()));
    }

    fn stop(&self) {
        self.upstream.cancel();
        let timer = {
            let mut state = self.state.lock();
            state.held = None;
            state.timer.clear()
        };
        cancel_timer(timer);
    }
}

impl<C, O, E> Cancellable for ThrottleNode<C, O, E>
where
    C: Scheduler,
    O: Send + 'static,
    E: From<StreamError> + Send + 'static,
{
    fn cancel(&self) {
        self.stop();
        self.outbox.cancel();
    }
}

impl<C, O, E> Subscription for ThrottleNode<C, O, E>
where
    C: Scheduler,
    O: Send + 'static,
    E: From<StreamError> + Send + 'static,
{
    fn request(&self, demand: Demand) {
        self.outbox.request(demand);
    }
}

struct ThrottleSubscriber<C, O, E> {
    node: Arc<ThrottleNode<C, O, E>>,
}

impl<C, O, E> Subscriber for ThrottleSubscriber<C, O, E>
where
    C: Scheduler,
    O: Send + 'static,
    E: From<StreamError> + Send + 'static,
{
    type Input = O;
    type Failure = E;

    fn receive_subscription(&mut self, subscription: SubscriptionRef) {
        if self.node.upstream.attach(subscription) {
            self.node.outbox.subscribe(self.node.clone());
            self.node.upstream.request(Demand::Unbounded);
        }
    }

    fn receive(&mut self, input: O) -> Demand {
        let (emit, generation) = {
            let mut state = self.node.state.lock();
            if state.window_open {
                state.held = Some(input);
                return Demand::none();
            }
            state.window_open = true;
            let emit = if self.node.emit_first {
                Some(input)
            } else {
                state.held = Some(input);
                None
            };
            (emit, state.timer.rearm().0)
        };
        if !self.node.open_window(generation) {
            return Demand::none();
        }
        if let Some(item) = emit {
            self.node.outbox.push_latest(item);
        }
        Demand::none()
    }

    fn receive_completion(&mut self, completion: Completion<E>) {
        if !self.node.upstream.finish() {
            return;
        }
        let (held, timer) = {
            let mut state = self.node.state.lock();
            (state.held.take(), state.timer.clear())
        };
        cancel_timer(timer);
        match completion {
            Completion::Finished => {
                if let Some(item) = held {
                    self.node.outbox.push_latest(item);
                }
                self.node.outbox.finish(Completion::Finished);
            }
            Completion::Failed(failure) => {
                self.node.outbox.terminate(Completion::Failed(failure));
            }
        }
    }
}
