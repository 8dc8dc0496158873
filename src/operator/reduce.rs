use std::{
    marker::PhantomData,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use parking_lot::Mutex;

use crate::{
    node::{Outbox, UpstreamLink},
    Cancellable, Completion, Demand, Publisher, Subscriber, Subscription, SubscriptionRef,
};

/// Folds every item into an accumulator and emits the final value when upstream
/// finishes. A failed upstream fails the stream without emitting anything.
pub struct Reduce<U, A, F> {
    upstream: U,
    initial: A,
    accumulate: Arc<F>,
}

impl<U, A, F> Reduce<U, A, F> {
    pub(crate) fn new(upstream: U, initial: A, accumulate: F) -> Self {
        Self {
            upstream,
            initial,
            accumulate: Arc::new(accumulate),
        }
    }
}

impl<U, A, F> Publisher for Reduce<U, A, F>
where
    U: Publisher,
    A: Clone + Send + Sync + 'static,
    F: Fn(A, U::Output) -> A + Send + Sync + 'static,
{
    type Output = A;
    type Failure = U::Failure;

    fn receive<S>(&self, subscriber: S)
    where
        S: Subscriber<Input = A, Failure = U::Failure>,
    {
        fold(
            &self.upstream,
            self.initial.clone(),
            self.accumulate.clone(),
            subscriber,
        )
    }
}

/// Gathers every item into a `Vec` emitted when upstream finishes.
pub struct Collect<U> {
    upstream: U,
}

impl<U> Collect<U> {
    pub(crate) fn new(upstream: U) -> Self {
        Self { upstream }
    }
}

impl<U: Publisher> Publisher for Collect<U> {
    type Output = Vec<U::Output>;
    type Failure = U::Failure;

    fn receive<S>(&self, subscriber: S)
    where
        S: Subscriber<Input = Vec<U::Output>, Failure = U::Failure>,
    {
        let push = |mut items: Vec<U::Output>, item: U::Output| {
            items.push(item);
            items
        };
        fold(&self.upstream, Vec::new(), Arc::new(push), subscriber)
    }
}

fn fold<U, A, F, S>(upstream: &U, initial: A, accumulate: Arc<F>, subscriber: S)
where
    U: Publisher,
    A: Send + 'static,
    F: Fn(A, U::Output) -> A + Send + Sync + 'static,
    S: Subscriber<Input = A, Failure = U::Failure>,
{
    let node = Arc::new(FoldNode {
        accumulator: Mutex::new(Some(initial)),
        accumulate,
        requested: AtomicBool::new(false),
        upstream: UpstreamLink::new(),
        outbox: Outbox::new(subscriber),
        _input: PhantomData,
    });
    upstream.receive(FoldSubscriber { node });
}

struct FoldNode<I, A, F, E> {
    accumulator: Mutex<Option<A>>,
    accumulate: Arc<F>,
    requested: AtomicBool,
    upstream: UpstreamLink,
    outbox: Outbox<A, E>,
    _input: PhantomData<fn(I)>,
}

impl<I, A, F, E> Cancellable for FoldNode<I, A, F, E>
where
    I: 'static,
    A: Send + 'static,
    F: Send + Sync + 'static,
    E: Send + 'static,
{
    fn cancel(&self) {
        self.upstream.cancel();
        self.outbox.cancel();
        self.accumulator.lock().take();
    }
}

impl<I, A, F, E> Subscription for FoldNode<I, A, F, E>
where
    I: 'static,
    A: Send + 'static,
    F: Send + Sync + 'static,
    E: Send + 'static,
{
    fn request(&self, demand: Demand) {
        self.outbox.request(demand);
        // The whole upstream is needed for one item, so ask once for all of it.
        if demand.has_demand() && !self.requested.swap(true, Ordering::SeqCst) {
            self.upstream.request(Demand::Unbounded);
        }
    }
}

struct FoldSubscriber<I, A, F, E> {
    node: Arc<FoldNode<I, A, F, E>>,
}

impl<I, A, F, E> Subscriber for FoldSubscriber<I, A, F, E>
where
    A: Send + 'static,
    F: Fn(A, I) -> A + Send + Sync + 'static,
    I: Send + 'static,
    E: Send + 'static,
{
    type Input = I;
    type Failure = E;

    fn receive_subscription(&mut self, subscription: SubscriptionRef) {
        if self.node.upstream.attach(subscription) {
            self.node.outbox.subscribe(self.node.clone());
        }
    }

    fn receive(&mut self, input: I) -> Demand {
        let mut accumulator = self.node.accumulator.lock();
        if let Some(current) = accumulator.take() {
            *accumulator = Some((self.node.accumulate)(current, input));
        }
        Demand::none()
    }

    fn receive_completion(&mut self, completion: Completion<E>) {
        if !self.node.upstream.finish() {
            return;
        }
        let accumulator = self.node.accumulator.lock().take();
        match completion {
            Completion::Finished => {
                if let Some(value) = accumulator {
                    self.node.outbox.push(value);
                }
                self.node.outbox.finish(Completion::Finished);
            }
            Completion::Failed(failure) => {
                self.node.outbox.terminate(Completion::Failed(failure));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        publisher::{Record, Sequence},
        testing::{Event, TestSubscriber},
        Completion, Demand, Never, Publisher, PublisherExt,
    };

    #[test]
    fn reduce_emits_once_after_finish() {
        let (subscriber, monitor) = TestSubscriber::<u32, Never>::new(Demand::max(1));
        Sequence::new(1u32..=10)
            .reduce(0, |sum, n| sum + n)
            .receive(subscriber);
        assert_eq!(
            monitor.events(),
            vec![
                Event::Subscribed,
                Event::Item(55),
                Event::Completed(Completion::Finished)
            ]
        );
    }

    #[test]
    fn reduce_does_not_emit_on_failure() {
        let (subscriber, monitor) = TestSubscriber::<u32, &str>::unbounded();
        Record::new(vec![1u32, 2], Completion::Failed("lost"))
            .reduce(0, |sum, n| sum + n)
            .receive(subscriber);
        assert_eq!(
            monitor.events(),
            vec![Event::Subscribed, Event::Completed(Completion::Failed("lost"))]
        );
    }

    #[test]
    fn collect_waits_for_demand_before_pulling() {
        let (subscriber, monitor) = TestSubscriber::<Vec<char>, Never>::new(Demand::none());
        Sequence::new(vec!['a', 'b', 'c']).collect().receive(subscriber);
        assert_eq!(monitor.events(), vec![Event::Subscribed]);

        monitor.request(Demand::max(1));
        assert_eq!(monitor.items(), vec![vec!['a', 'b', 'c']]);
        assert_eq!(monitor.completion(), Some(Completion::Finished));
    }
}
