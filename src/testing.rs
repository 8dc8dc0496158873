//! Test utilities for stream verification.
//!
//! [`TestSubscriber`] records every signal it receives and drives demand by hand through
//! its [`Monitor`]; it also checks the subscriber side of the contract, so a publisher that
//! delivers more than was requested fails the test on the spot. [`VirtualTimeScheduler`]
//! runs scheduled actions only when the test advances its clock.

use std::{collections::BTreeMap, sync::Arc, time::Duration};

use parking_lot::Mutex;

use crate::{
    error::{fatal, ContractViolation},
    scheduler::{Action, Scheduler, TimerHandle},
    CancellationToken, Completion, Demand, SchedulerError, Subscriber, SubscriptionRef,
};

/// A signal observed by a [`TestSubscriber`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event<T, F> {
    Subscribed,
    Item(T),
    Completed(Completion<F>),
}

struct MonitorState<T, F> {
    events: Vec<Event<T, F>>,
    outstanding: Demand,
    subscription: Option<SubscriptionRef>,
    completed: bool,
}

/// Subscriber that records what it receives.
pub struct TestSubscriber<T, F> {
    state: Arc<Mutex<MonitorState<T, F>>>,
    initial: Demand,
    per_item: Demand,
}

/// Test-side handle of a [`TestSubscriber`].
pub struct Monitor<T, F> {
    state: Arc<Mutex<MonitorState<T, F>>>,
}

impl<T, F> Clone for Monitor<T, F> {
    fn clone(&self) -> Self {
        Self {
            state: self.state.clone(),
        }
    }
}

impl<T, F> TestSubscriber<T, F>
where
    T: Send + 'static,
    F: Send + 'static,
{
    /// Requests `initial` on subscription and nothing more on its own.
    pub fn new(initial: Demand) -> (Self, Monitor<T, F>) {
        Self::with_demand(initial, Demand::none())
    }

    /// Requests unbounded demand on subscription.
    pub fn unbounded() -> (Self, Monitor<T, F>) {
        Self::new(Demand::Unbounded)
    }

    /// Requests `initial` on subscription and grants `per_item` in response to each item.
    pub fn with_demand(initial: Demand, per_item: Demand) -> (Self, Monitor<T, F>) {
        let state = Arc::new(Mutex::new(MonitorState {
            events: Vec::new(),
            outstanding: Demand::none(),
            subscription: None,
            completed: false,
        }));
        let subscriber = TestSubscriber {
            state: state.clone(),
            initial,
            per_item,
        };
        (subscriber, Monitor { state })
    }
}

impl<T, F> Subscriber for TestSubscriber<T, F>
where
    T: Send + 'static,
    F: Send + 'static,
{
    type Input = T;
    type Failure = F;

    fn receive_subscription(&mut self, subscription: SubscriptionRef) {
        {
            let mut state = self.state.lock();
            state.events.push(Event::Subscribed);
            state.subscription = Some(subscription.clone());
            state.outstanding += self.initial;
        }
        if self.initial.has_demand() {
            subscription.request(self.initial);
        }
    }

    fn receive(&mut self, input: T) -> Demand {
        let mut state = self.state.lock();
        if state.completed {
            drop(state);
            fatal(ContractViolation::ItemAfterTermination)
        }
        if !state.outstanding.consume_one() {
            drop(state);
            fatal(ContractViolation::DemandViolation)
        }
        state.events.push(Event::Item(input));
        state.outstanding += self.per_item;
        self.per_item
    }

    fn receive_completion(&mut self, completion: Completion<F>) {
        let mut state = self.state.lock();
        if state.completed {
            drop(state);
            fatal(ContractViolation::DoubleTermination)
        }
        state.completed = true;
        state.subscription = None;
        state.events.push(Event::Completed(completion));
    }
}

impl<T, F> Monitor<T, F> {
    /// Requests more items through the recorded subscription.
    pub fn request(&self, demand: Demand) {
        let subscription = {
            let mut state = self.state.lock();
            state.outstanding += demand;
            state.subscription.clone()
        };
        if let Some(subscription) = subscription {
            subscription.request(demand);
        }
    }

    /// Cancels the recorded subscription; further requests go nowhere.
    pub fn cancel(&self) {
        let subscription = self.state.lock().subscription.take();
        if let Some(subscription) = subscription {
            subscription.cancel();
        }
    }

    /// Demand requested but not yet used up by items.
    pub fn outstanding(&self) -> Demand {
        self.state.lock().outstanding
    }

    pub fn is_subscribed(&self) -> bool {
        self.state
            .lock()
            .events
            .iter()
            .any(|event| matches!(event, Event::Subscribed))
    }
}

impl<T, F> Monitor<T, F>
where
    T: Clone,
    F: Clone,
{
    pub fn events(&self) -> Vec<Event<T, F>> {
        self.state.lock().events.clone()
    }

    pub fn items(&self) -> Vec<T> {
        self.state
            .lock()
            .events
            .iter()
            .filter_map(|event| match event {
                Event::Item(item) => Some(item.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn completion(&self) -> Option<Completion<F>> {
        self.state
            .lock()
            .events
            .iter()
            .find_map(|event| match event {
                Event::Completed(completion) => Some(completion.clone()),
                _ => None,
            })
    }
}

struct Job {
    token: CancellationToken,
    action: Action,
}

#[derive(Default)]
struct Clock {
    now: Duration,
    next_seq: u64,
    queue: BTreeMap<(Duration, u64), Job>,
    unavailable: bool,
}

/// Deterministic scheduler driven by a virtual clock.
///
/// Nothing runs until the test calls [`advance`](Self::advance), [`advance_to`](Self::advance_to)
/// or [`run`](Self::run). Due actions run in order of due time, ties in the order they
/// were scheduled; actions scheduled while advancing run in the same call if they fall
/// due before the target time.
#[derive(Clone, Default)]
pub struct VirtualTimeScheduler {
    clock: Arc<Mutex<Clock>>,
}

impl VirtualTimeScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, by: Duration) {
        let target = self.clock.lock().now + by;
        self.advance_to(target);
    }

    pub fn advance_to(&self, target: Duration) {
        loop {
            let job = {
                let mut clock = self.clock.lock();
                let next = clock.queue.keys().next().copied();
                match next {
                    Some(key) if key.0 <= target => {
                        clock.now = clock.now.max(key.0);
                        clock.queue.remove(&key)
                    }
                    _ => {
                        clock.now = clock.now.max(target);
                        None
                    }
                }
            };
            match job {
                Some(job) => {
                    if !job.token.is_cancelled() {
                        (job.action)();
                    }
                }
                None => break,
            }
        }
    }

    /// Advances until nothing is scheduled any more.
    pub fn run(&self) {
        loop {
            let next = self.clock.lock().queue.keys().next().map(|key| key.0);
            match next {
                Some(due) => self.advance_to(due),
                None => break,
            }
        }
    }

    /// Makes every subsequent scheduling attempt fail with `SchedulerError::Unavailable`.
    pub fn set_available(&self, available: bool) {
        self.clock.lock().unavailable = !available;
    }

    /// Number of scheduled actions that have neither run nor been cancelled.
    pub fn pending(&self) -> usize {
        self.clock
            .lock()
            .queue
            .values()
            .filter(|job| !job.token.is_cancelled())
            .count()
    }

    fn enqueue(&self, delay: Duration, action: Action) -> Result<TimerHandle, SchedulerError> {
        let mut clock = self.clock.lock();
        if clock.unavailable {
            return Err(SchedulerError::Unavailable);
        }
        let token = CancellationToken::new();
        let key = (clock.now + delay, clock.next_seq);
        clock.next_seq += 1;
        clock.queue.insert(
            key,
            Job {
                token: token.clone(),
                action,
            },
        );
        Ok(TimerHandle::new(token))
    }
}

impl Scheduler for VirtualTimeScheduler {
    fn now(&self) -> Duration {
        self.clock.lock().now
    }

    fn schedule(&self, action: Action) -> Result<(), SchedulerError> {
        self.enqueue(Duration::ZERO, action).map(|_| ())
    }

    fn schedule_after(&self, delay: Duration, action: Action) -> Result<TimerHandle, SchedulerError> {
        self.enqueue(delay, action)
    }
}
