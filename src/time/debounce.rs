use std::{sync::Arc, time::Duration};

use parking_lot::Mutex;

use super::{arm, cancel_timer, TimerSlot};
use crate::{
    node::{Outbox, UpstreamLink},
    scheduler::Scheduler,
    Cancellable, Completion, Demand, Publisher, SchedulerError, StreamError, Subscriber,
    Subscription, SubscriptionRef,
};

/// Emits an item only after `window` has passed without a newer one.
///
/// When upstream finishes, the item still waiting is emitted before the completion; a
/// failure drops it.
pub struct Debounce<U, C> {
    upstream: U,
    window: Duration,
    scheduler: Arc<C>,
}

impl<U, C> Debounce<U, C> {
    pub(crate) fn new(upstream: U, window: Duration, scheduler: C) -> Self {
        Self {
            upstream,
            window,
            scheduler: Arc::new(scheduler),
        }
    }
}

impl<U, C> Publisher for Debounce<U, C>
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
        let node = Arc::new(DebounceNode {
            window: self.window,
            scheduler: self.scheduler.clone(),
            upstream: UpstreamLink::new(),
            outbox: Outbox::new(subscriber),
            state: Mutex::new(DebounceState {
                pending: None,
                timer: TimerSlot::default(),
            }),
        });
        self.upstream.receive(DebounceSubscriber { node });
    }
}

struct DebounceState<O> {
    pending: Option<O>,
    timer: TimerSlot,
}

struct DebounceNode<C, O, E> {
    window: Duration,
    scheduler: Arc<C>,
    upstream: UpstreamLink,
    outbox: Outbox<O, E>,
    state: Mutex<DebounceState<O>>,
}

impl<C, O, E> DebounceNode<C, O, E>
where
    C: Scheduler,
    O: Send + 'static,
    E: From<StreamError> + Send + 'static,
{
    fn fire(self: &Arc<Self>, generation: u64) {
        let pending = {
            let mut state = self.state.lock();
            if !state.timer.fire(generation) {
                return;
            }
            state.pending.take()
        };
        if let Some(item) = pending {
            log::trace!("debounce window elapsed; emitting");
            self.outbox.push_latest(item);
        }
    }

    fn refused(&self, err: SchedulerError) {
        log::debug!("debounce timer refused: {}", err);
        self.stop();
        self.outbox
            .terminate(Completion::Failed(StreamError::from(err).into()));
    }

    fn stop(&self) {
        self.upstream.cancel();
        let timer = {
            let mut state = self.state.lock();
            state.pending = None;
            state.timer.clear()
        };
        cancel_timer(timer);
    }
}

impl<C, O, E> Cancellable for DebounceNode<C, O, E>
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

impl<C, O, E> Subscription for DebounceNode<C, O, E>
where
    C: Scheduler,
    O: Send + 'static,
    E: From<StreamError> + Send + 'static,
{
    fn request(&self, demand: Demand) {
        self.outbox.request(demand);
    }
}

struct DebounceSubscriber<C, O, E> {
    node: Arc<DebounceNode<C, O, E>>,
}

impl<C, O, E> Subscriber for DebounceSubscriber<C, O, E>
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
            // Every item has to be seen to know which one ends a quiet window.
            self.node.upstream.request(Demand::Unbounded);
        }
    }

    fn receive(&mut self, input: O) -> Demand {
        let (generation, previous) = {
            let mut state = self.node.state.lock();
            state.pending = Some(input);
            state.timer.rearm()
        };
        cancel_timer(previous);
        match arm(
            &*self.node.scheduler,
            self.node.window,
            &self.node,
            generation,
            DebounceNode::fire,
        ) {
            Ok(handle) => cancel_timer(self.node.state.lock().timer.set(generation, handle)),
            Err(err) => self.node.refused(err),
        }
        Demand::none()
    }

    fn receive_completion(&mut self, completion: Completion<E>) {
        if !self.node.upstream.finish() {
            return;
        }
        let (pending, timer) = {
            let mut state = self.node.state.lock();
            (state.pending.take(), state.timer.clear())
        };
        cancel_timer(timer);
        match completion {
            Completion::Finished => {
                if let Some(item) = pending {
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
