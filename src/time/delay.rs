use std::{
    collections::{BTreeMap, VecDeque},
    mem,
    sync::Arc,
    time::Duration,
};

use parking_lot::Mutex;

use super::{arm, cancel_timer};
use crate::{
    node::{Outbox, UpstreamLink},
    scheduler::{Scheduler, TimerHandle},
    Cancellable, Completion, Demand, Publisher, SchedulerError, StreamError, Subscriber,
    Subscription, SubscriptionRef,
};

/// Shifts every item, and the completion, later by `interval`.
///
/// Relative order is kept: each timer releases the oldest signal still waiting. Timers
/// are tracked by the sequence number of the signal they were armed for, so a scheduler
/// that fires them inline or from another thread cannot leave stale handles behind.
pub struct Delay<U, C> {
    upstream: U,
    interval: Duration,
    scheduler: Arc<C>,
}

impl<U, C> Delay<U, C> {
    pub(crate) fn new(upstream: U, interval: Duration, scheduler: C) -> Self {
        Self {
            upstream,
            interval,
            scheduler: Arc::new(scheduler),
        }
    }
}

impl<U, C> Publisher for Delay<U, C>
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
        let node = Arc::new(DelayNode {
            interval: self.interval,
            scheduler: self.scheduler.clone(),
            upstream: UpstreamLink::new(),
            outbox: Outbox::new(subscriber),
            state: Mutex::new(DelayState {
                waiting: VecDeque::new(),
                timers: BTreeMap::new(),
                next_seq: 0,
                stopped: false,
            }),
        });
        self.upstream.receive(DelaySubscriber { node });
    }
}

enum Delayed<O, E> {
    Item(O),
    Completion(Completion<E>),
}

struct DelayState<O, E> {
    waiting: VecDeque<Delayed<O, E>>,
    /// Timers not yet fired, by signal sequence number. `None` until the scheduler
    /// hands the handle back.
    timers: BTreeMap<u64, Option<TimerHandle>>,
    next_seq: u64,
    stopped: bool,
}

struct DelayNode<C, O, E> {
    interval: Duration,
    scheduler: Arc<C>,
    upstream: UpstreamLink,
    outbox: Outbox<O, E>,
    state: Mutex<DelayState<O, E>>,
}

impl<C, O, E> DelayNode<C, O, E>
where
    C: Scheduler,
    O: Send + 'static,
    E: From<StreamError> + Send + 'static,
{
    fn hold(self: &Arc<Self>, signal: Delayed<O, E>) {
        let seq = {
            let mut state = self.state.lock();
            if state.stopped {
                return;
            }
            let seq = state.next_seq;
            state.next_seq += 1;
            state.waiting.push_back(signal);
            state.timers.insert(seq, None);
            seq
        };
        match arm(&*self.scheduler, self.interval, self, seq, Self::release) {
            Ok(handle) => {
                let mut state = self.state.lock();
                match state.timers.get_mut(&seq) {
                    Some(slot) => *slot = Some(handle),
                    // Already fired, or the node stopped.
                    None => {
                        drop(state);
                        handle.cancel();
                    }
                }
            }
            Err(err) => self.refused(err),
        }
    }

    fn release(self: &Arc<Self>, seq: u64) {
        let signal = {
            let mut state = self.state.lock();
            if state.timers.remove(&seq).is_none() {
                return;
            }
            state.waiting.pop_front()
        };
        match signal {
            Some(Delayed::Item(item)) => {
                let granted = self.outbox.push(item);
                self.upstream.request(granted);
            }
            Some(Delayed::Completion(completion)) => self.outbox.finish(completion),
            None => {}
        }
    }

    fn refused(&self, err: SchedulerError) {
        log::debug!("delay timer refused: {}", err);
        self.stop();
        self.outbox
            .terminate(Completion::Failed(StreamError::from(err).into()));
    }

    fn stop(&self) {
        self.upstream.cancel();
        let (waiting, timers) = {
            let mut state = self.state.lock();
            state.stopped = true;
            (mem::take(&mut state.waiting), mem::take(&mut state.timers))
        };
        drop(waiting);
        for timer in timers.into_values() {
            cancel_timer(timer);
        }
    }
}

impl<C, O, E> Cancellable for DelayNode<C, O, E>
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

impl<C, O, E> Subscription for DelayNode<C, O, E>
where
    C: Scheduler,
    O: Send + 'static,
    E: From<StreamError> + Send + 'static,
{
    fn request(&self, demand: Demand) {
        let granted = self.outbox.request(demand);
        self.upstream.request(demand + granted);
    }
}

struct DelaySubscriber<C, O, E> {
    node: Arc<DelayNode<C, O, E>>,
}

impl<C, O, E> Subscriber for DelaySubscriber<C, O, E>
where
    C: Scheduler,
    O: Send + 'static,
    E: From<StreamError> + Send + 'static,
{
    type Input = O;
    type Failure = E;

    fn receive_subscription(&mut self, subscription: SubscriptionRef) {
        if self.node.upstream.attach(subscription) {
            let granted = self.node.outbox.subscribe(self.node.clone());
            self.node.upstream.request(granted);
        }
    }

    fn receive(&mut self, input: O) -> Demand {
        self.node.hold(Delayed::Item(input));
        Demand::none()
    }

    fn receive_completion(&mut self, completion: Completion<E>) {
        if self.node.upstream.finish() {
            self.node.hold(Delayed::Completion(completion));
        }
    }
}
