//! Plumbing shared by every operator node.
//!
//! A node is a subscriber to its upstream and a subscription for its downstream. The
//! pieces here keep the two sides honest: [`Downstream`] owns the downstream subscriber
//! and enforces the demand contract, [`UpstreamLink`] owns the upstream subscription,
//! and [`Outbox`] buffers items that must wait for demand.

use std::{collections::VecDeque, mem};

use parking_lot::{Mutex, MutexGuard};

use crate::{
    error::{fatal, ContractViolation},
    AnySubscriber, Cancellable, Completion, Demand, Subscriber, Subscription, SubscriptionRef,
};

enum Signal<T, F> {
    Subscription(SubscriptionRef),
    Item(T),
    Completion(Completion<F>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Live,
    Terminated,
    Cancelled,
}

struct Slot<T, F> {
    subscriber: Option<AnySubscriber<T, F>>,
    queue: VecDeque<Signal<T, F>>,
    delivering: bool,
    demand: Demand,
    phase: Phase,
}

/// The downstream side of a node.
///
/// Signals are delivered through a work queue: a signal raised while another one is
/// being delivered (for example an item produced synchronously by a `request` issued
/// from inside `receive`) is queued and handed over by the loop already running, so the
/// subscriber is never re-entered and the stack stays flat.
///
/// Demand is charged when an item is accepted, not when it is delivered, so
/// [`Downstream::has_demand`] already accounts for queued items.
pub(crate) struct Downstream<T, F> {
    slot: Mutex<Slot<T, F>>,
}

impl<T, F> Downstream<T, F>
where
    T: Send + 'static,
    F: Send + 'static,
{
    pub(crate) fn new<S>(subscriber: S) -> Self
    where
        S: Subscriber<Input = T, Failure = F>,
    {
        Self {
            slot: Mutex::new(Slot {
                subscriber: Some(Box::new(subscriber)),
                queue: VecDeque::new(),
                delivering: false,
                demand: Demand::none(),
                phase: Phase::Live,
            }),
        }
    }

    /// Hands `subscription` to the subscriber. Returns demand the subscriber granted
    /// through item callbacks while this call was delivering.
    pub(crate) fn subscribe(&self, subscription: SubscriptionRef) -> Demand {
        let slot = self.slot.lock();
        if slot.phase == Phase::Cancelled {
            return Demand::none();
        }
        self.dispatch(slot, Signal::Subscription(subscription))
    }

    /// Delivers one item, consuming one unit of demand.
    ///
    /// Returns the additional demand the subscriber granted in response. Delivering with
    /// no outstanding demand, or after a completion, is fatal.
    pub(crate) fn send(&self, item: T) -> Demand {
        let mut slot = self.slot.lock();
        match slot.phase {
            Phase::Cancelled => return Demand::none(),
            Phase::Terminated => {
                drop(slot);
                fatal(ContractViolation::ItemAfterTermination)
            }
            Phase::Live => {}
        }
        if !slot.demand.consume_one() {
            drop(slot);
            fatal(ContractViolation::DemandViolation)
        }
        self.dispatch(slot, Signal::Item(item))
    }

    /// Delivers the completion. A second completion is fatal.
    pub(crate) fn complete(&self, completion: Completion<F>) {
        let mut slot = self.slot.lock();
        match slot.phase {
            Phase::Cancelled => return,
            Phase::Terminated => {
                drop(slot);
                fatal(ContractViolation::DoubleTermination)
            }
            Phase::Live => {}
        }
        slot.phase = Phase::Terminated;
        self.dispatch(slot, Signal::Completion(completion));
    }

    /// First-wins completion for paths that legitimately race (a timer against the
    /// upstream, several upstreams failing). Returns `false` if the stream had already
    /// ended.
    pub(crate) fn terminate(&self, completion: Completion<F>) -> bool {
        let mut slot = self.slot.lock();
        if slot.phase != Phase::Live {
            return false;
        }
        slot.phase = Phase::Terminated;
        self.dispatch(slot, Signal::Completion(completion));
        true
    }

    /// Adds demand requested by the subscriber.
    pub(crate) fn request(&self, demand: Demand) {
        let mut slot = self.slot.lock();
        if slot.phase == Phase::Live {
            slot.demand += demand;
        }
    }

    pub(crate) fn has_demand(&self) -> bool {
        let slot = self.slot.lock();
        slot.phase == Phase::Live && slot.demand.has_demand()
    }

    pub(crate) fn is_live(&self) -> bool {
        self.slot.lock().phase == Phase::Live
    }

    /// Stops all further delivery and releases the subscriber.
    pub(crate) fn cancel(&self) {
        let (queued, subscriber) = {
            let mut slot = self.slot.lock();
            if slot.phase == Phase::Cancelled {
                return;
            }
            slot.phase = Phase::Cancelled;
            slot.demand = Demand::none();
            let queued = mem::take(&mut slot.queue);
            // A delivering loop owns the subscriber and drops it when it exits.
            let subscriber = if slot.delivering {
                None
            } else {
                slot.subscriber.take()
            };
            (queued, subscriber)
        };
        drop(queued);
        drop(subscriber);
    }

    fn dispatch(&self, mut slot: MutexGuard<'_, Slot<T, F>>, signal: Signal<T, F>) -> Demand {
        slot.queue.push_back(signal);
        if slot.delivering {
            return Demand::none();
        }
        let Some(mut subscriber) = slot.subscriber.take() else {
            slot.queue.clear();
            return Demand::none();
        };
        slot.delivering = true;
        drop(slot);

        let mut granted = Demand::none();
        loop {
            let signal = {
                let mut slot = self.slot.lock();
                match slot.queue.pop_front() {
                    Some(signal) => signal,
                    None => {
                        slot.delivering = false;
                        if slot.phase == Phase::Live {
                            slot.subscriber = Some(subscriber);
                        } else {
                            drop(slot);
                            drop(subscriber);
                        }
                        return granted;
                    }
                }
            };
            match signal {
                Signal::Subscription(subscription) => subscriber.receive_subscription(subscription),
                Signal::Item(item) => {
                    let more = subscriber.receive(item);
                    if more.has_demand() {
                        let mut slot = self.slot.lock();
                        if slot.phase == Phase::Live {
                            slot.demand += more;
                        }
                        granted += more;
                    }
                }
                Signal::Completion(completion) => subscriber.receive_completion(completion),
            }
        }
    }
}

enum LinkState {
    Pending(Demand),
    Active(SubscriptionRef),
    Closed,
}

/// The upstream side of a node.
pub(crate) struct UpstreamLink {
    state: Mutex<LinkState>,
}

impl UpstreamLink {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(LinkState::Pending(Demand::none())),
        }
    }

    /// Accepts the upstream subscription, forwarding any demand requested before it
    /// arrived. A duplicate, or a subscription arriving after `cancel`, is cancelled.
    pub(crate) fn attach(&self, subscription: SubscriptionRef) -> bool {
        let mut state = self.state.lock();
        match &*state {
            LinkState::Pending(pending) => {
                let pending = *pending;
                *state = LinkState::Active(subscription.clone());
                drop(state);
                if pending.has_demand() {
                    subscription.request(pending);
                }
                true
            }
            LinkState::Active(_) => {
                drop(state);
                log::warn!("duplicate upstream subscription; cancelling it");
                subscription.cancel();
                false
            }
            LinkState::Closed => {
                drop(state);
                subscription.cancel();
                false
            }
        }
    }

    pub(crate) fn request(&self, demand: Demand) {
        if !demand.has_demand() {
            return;
        }
        let mut state = self.state.lock();
        match &mut *state {
            LinkState::Pending(pending) => *pending += demand,
            LinkState::Active(subscription) => {
                let subscription = subscription.clone();
                drop(state);
                subscription.request(demand);
            }
            LinkState::Closed => {}
        }
    }

    pub(crate) fn cancel(&self) {
        let previous = mem::replace(&mut *self.state.lock(), LinkState::Closed);
        if let LinkState::Active(subscription) = previous {
            subscription.cancel();
        }
    }

    /// Marks the upstream as terminated. Returns `false` if it was already closed, in
    /// which case the completion must be ignored.
    pub(crate) fn finish(&self) -> bool {
        let previous = mem::replace(&mut *self.state.lock(), LinkState::Closed);
        !matches!(previous, LinkState::Closed)
    }
}

/// Drain guard: one loop drains at a time, re-entrant callers only mark it dirty.
#[derive(Debug, Default)]
pub(crate) struct WorkLoop {
    active: bool,
    missed: bool,
}

impl WorkLoop {
    /// Returns `true` if the caller must run the loop.
    pub(crate) fn enter(&mut self) -> bool {
        if self.active {
            self.missed = true;
            false
        } else {
            self.active = true;
            true
        }
    }

    /// Returns `true` if work was signalled while draining and another pass is due.
    pub(crate) fn again(&mut self) -> bool {
        if self.missed {
            self.missed = false;
            true
        } else {
            self.active = false;
            false
        }
    }

    pub(crate) fn leave(&mut self) {
        self.active = false;
        self.missed = false;
    }
}

struct OutboxState<T, F> {
    queue: VecDeque<T>,
    completion: Option<Completion<F>>,
    work: WorkLoop,
    closed: bool,
}

enum Release<T, F> {
    Item(T),
    Completion(Completion<F>),
}

/// Demand-gated buffer in front of a [`Downstream`].
///
/// Items wait in FIFO order until the subscriber has demand; a completion passed to
/// [`Outbox::finish`] is delivered once the queue is empty.
pub(crate) struct Outbox<T, F> {
    downstream: Downstream<T, F>,
    state: Mutex<OutboxState<T, F>>,
}

impl<T, F> Outbox<T, F>
where
    T: Send + 'static,
    F: Send + 'static,
{
    pub(crate) fn new<S>(subscriber: S) -> Self
    where
        S: Subscriber<Input = T, Failure = F>,
    {
        Self {
            downstream: Downstream::new(subscriber),
            state: Mutex::new(OutboxState {
                queue: VecDeque::new(),
                completion: None,
                work: WorkLoop::default(),
                closed: false,
            }),
        }
    }

    pub(crate) fn subscribe(&self, subscription: SubscriptionRef) -> Demand {
        self.downstream.subscribe(subscription)
    }

    pub(crate) fn request(&self, demand: Demand) -> Demand {
        self.downstream.request(demand);
        self.drain()
    }

    pub(crate) fn has_demand(&self) -> bool {
        self.downstream.has_demand()
    }

    /// `true` once the outbox delivered its completion or was cancelled.
    pub(crate) fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    pub(crate) fn push(&self, item: T) -> Demand {
        {
            let mut state = self.state.lock();
            if state.closed || state.completion.is_some() {
                return Demand::none();
            }
            state.queue.push_back(item);
        }
        self.drain()
    }

    /// Replaces anything still waiting for demand with `item`.
    pub(crate) fn push_latest(&self, item: T) -> Demand {
        let stale = {
            let mut state = self.state.lock();
            if state.closed || state.completion.is_some() {
                return Demand::none();
            }
            let stale = mem::take(&mut state.queue);
            state.queue.push_back(item);
            stale
        };
        drop(stale);
        self.drain()
    }

    /// Delivers `item` only if it can go out right away; otherwise drops it.
    pub(crate) fn offer(&self, item: T) -> Demand {
        {
            let mut state = self.state.lock();
            if state.closed || state.completion.is_some() {
                return Demand::none();
            }
            if !state.queue.is_empty() || !self.downstream.has_demand() {
                return Demand::none();
            }
            state.queue.push_back(item);
        }
        self.drain()
    }

    /// Delivers `completion` after everything already queued.
    pub(crate) fn finish(&self, completion: Completion<F>) {
        {
            let mut state = self.state.lock();
            if state.closed || state.completion.is_some() {
                return;
            }
            state.completion = Some(completion);
        }
        self.drain();
    }

    /// Discards the queue and delivers `completion` immediately.
    pub(crate) fn terminate(&self, completion: Completion<F>) -> bool {
        let stale = {
            let mut state = self.state.lock();
            if state.closed {
                return false;
            }
            state.closed = true;
            state.completion = None;
            mem::take(&mut state.queue)
        };
        drop(stale);
        self.downstream.terminate(completion)
    }

    pub(crate) fn cancel(&self) {
        let stale = {
            let mut state = self.state.lock();
            state.closed = true;
            state.completion = None;
            mem::take(&mut state.queue)
        };
        drop(stale);
        self.downstream.cancel();
    }

    pub(crate) fn drain(&self) -> Demand {
        let mut granted = Demand::none();
        if !self.state.lock().work.enter() {
            return granted;
        }
        loop {
            let release = {
                let mut state = self.state.lock();
                if state.closed {
                    state.work.leave();
                    return granted;
                }
                if !state.queue.is_empty() {
                    if self.downstream.has_demand() {
                        match state.queue.pop_front() {
                            Some(item) => Release::Item(item),
                            None => continue,
                        }
                    } else if state.work.again() {
                        continue;
                    } else {
                        return granted;
                    }
                } else if let Some(completion) = state.completion.take() {
                    state.closed = true;
                    state.work.leave();
                    Release::Completion(completion)
                } else if state.work.again() {
                    continue;
                } else {
                    return granted;
                }
            };
            match release {
                Release::Item(item) => granted += self.downstream.send(item),
                Release::Completion(completion) => {
                    self.downstream.terminate(completion);
                    return granted;
                }
            }
        }
    }
}

impl<T, F> Cancellable for Outbox<T, F>
where
    T: Send + 'static,
    F: Send + 'static,
{
    fn cancel(&self) {
        Outbox::cancel(self)
    }
}

impl<T, F> Subscription for Outbox<T, F>
where
    T: Send + 'static,
    F: Send + 'static,
{
    fn request(&self, demand: Demand) {
        Outbox::request(self, demand);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        subscription,
        testing::{Event, TestSubscriber},
        Never,
    };

    #[test]
    fn downstream_charges_demand_and_returns_granted_demand() {
        let (subscriber, monitor) = TestSubscriber::<u32, Never>::with_demand(
            Demand::none(),
            Demand::max(1),
        );
        let downstream = Downstream::new(subscriber);
        downstream.subscribe(subscription::empty());
        monitor.request(Demand::max(1));
        downstream.request(Demand::max(1));

        assert_eq!(downstream.send(7), Demand::max(1));
        assert!(downstream.has_demand());
        downstream.complete(Completion::Finished);

        assert_eq!(
            monitor.events(),
            vec![
                Event::Subscribed,
                Event::Item(7),
                Event::Completed(Completion::Finished)
            ]
        );
    }

    #[test]
    #[should_panic(expected = "without outstanding demand")]
    fn downstream_send_without_demand_is_fatal() {
        let (subscriber, _monitor) = TestSubscriber::<u32, Never>::new(Demand::none());
        let downstream = Downstream::new(subscriber);
        downstream.subscribe(subscription::empty());
        downstream.send(1);
    }

    #[test]
    #[should_panic(expected = "termination delivered twice")]
    fn downstream_double_completion_is_fatal() {
        let (subscriber, _monitor) = TestSubscriber::<u32, Never>::unbounded();
        let downstream = Downstream::new(subscriber);
        downstream.subscribe(subscription::empty());
        downstream.complete(Completion::Finished);
        downstream.complete(Completion::Finished);
    }

    #[test]
    fn downstream_drops_everything_after_cancel() {
        let (subscriber, monitor) = TestSubscriber::<u32, Never>::unbounded();
        let downstream = Downstream::new(subscriber);
        downstream.subscribe(subscription::empty());
        downstream.request(Demand::Unbounded);
        downstream.cancel();
        downstream.cancel();

        assert_eq!(downstream.send(1), Demand::none());
        assert!(!downstream.terminate(Completion::Finished));
        assert_eq!(monitor.events(), vec![Event::Subscribed]);
    }

    #[test]
    fn outbox_holds_items_until_demand_and_completes_after_them() {
        let (subscriber, monitor) = TestSubscriber::<u32, Never>::new(Demand::none());
        let outbox = Arc::new(Outbox::new(subscriber));
        outbox.subscribe(outbox.clone());

        outbox.push(1);
        outbox.push(2);
        outbox.finish(Completion::Finished);
        assert_eq!(monitor.items(), Vec::<u32>::new());

        monitor.request(Demand::max(1));
        assert_eq!(monitor.items(), vec![1]);
        assert_eq!(monitor.completion(), None);

        monitor.request(Demand::max(1));
        assert_eq!(monitor.items(), vec![1, 2]);
        assert_eq!(monitor.completion(), Some(Completion::Finished));
    }

    #[test]
    fn outbox_push_latest_keeps_only_the_newest_waiting_item() {
        let (subscriber, monitor) = TestSubscriber::<u32, Never>::new(Demand::none());
        let outbox = Arc::new(Outbox::new(subscriber));
        outbox.subscribe(outbox.clone());

        outbox.push_latest(1);
        outbox.push_latest(2);
        outbox.push_latest(3);
        monitor.request(Demand::max(5));

        assert_eq!(monitor.items(), vec![3]);
    }

    #[derive(Default)]
    struct Recording {
        requested: Mutex<Vec<Demand>>,
        cancelled: Mutex<u32>,
    }

    impl Cancellable for Recording {
        fn cancel(&self) {
            *self.cancelled.lock() += 1;
        }
    }

    impl Subscription for Recording {
        fn request(&self, demand: Demand) {
            self.requested.lock().push(demand);
        }
    }

    #[test]
    fn upstream_link_forwards_demand_requested_before_attach() {
        let upstream = Arc::new(Recording::default());
        let link = UpstreamLink::new();
        link.request(Demand::max(2));
        link.request(Demand::max(1));
        assert!(link.attach(upstream.clone()));
        link.request(Demand::max(4));

        assert_eq!(*upstream.requested.lock(), vec![Demand::max(3), Demand::max(4)]);

        assert!(link.finish());
        assert!(!link.finish());
        link.cancel();
        assert_eq!(*upstream.cancelled.lock(), 0);
    }

    #[test]
    fn upstream_link_cancels_duplicate_and_late_subscriptions() {
        let first = Arc::new(Recording::default());
        let second = Arc::new(Recording::default());
        let link = UpstreamLink::new();
        assert!(link.attach(first.clone()));
        assert!(!link.attach(second.clone()));
        assert_eq!(*second.cancelled.lock(), 1);

        link.cancel();
        link.cancel();
        assert_eq!(*first.cancelled.lock(), 1);

        let late = Arc::new(Recording::default());
        assert!(!link.attach(late.clone()));
        assert_eq!(*late.cancelled.lock(), 1);
    }

    #[test]
    fn work_loop_reports_missed_work() {
        let mut work = WorkLoop::default();
        assert!(work.enter());
        assert!(!work.enter());
        assert!(work.again());
        assert!(!work.again());
        assert!(work.enter());
    }
}
