use std::sync::Arc;

use crate::{
    node::{Downstream, UpstreamLink},
    scheduler::Scheduler,
    Cancellable, Completion, Demand, Publisher, SchedulerError, StreamError, Subscriber,
    Subscription, SubscriptionRef,
};

/// Delivers items and the completion on `scheduler`.
///
/// Everything downstream of this operator runs on the scheduler's context. Signals keep
/// their order as long as the scheduler runs actions in the order they were scheduled.
/// A scheduler that refuses work cancels upstream and fails the stream with
/// [`StreamError::SchedulerUnavailable`].
pub struct ReceiveOn<U, C> {
    upstream: U,
    scheduler: Arc<C>,
}

impl<U, C> ReceiveOn<U, C> {
    pub(crate) fn new(upstream: U, scheduler: C) -> Self {
        Self {
            upstream,
            scheduler: Arc::new(scheduler),
        }
    }
}

impl<U, C> Publisher for ReceiveOn<U, C>
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
        let node = Arc::new(HopNode {
            scheduler: self.scheduler.clone(),
            upstream: Arc::new(UpstreamLink::new()),
            downstream: Downstream::new(subscriber),
        });
        self.upstream.receive(ReceiveOnSubscriber { node });
    }
}

/// Runs upstream attachment, demand and cancellation on `scheduler`.
///
/// The subscriber receives its subscription on the scheduler's context once upstream
/// has attached there.
pub struct SubscribeOn<U, C> {
    upstream: Arc<U>,
    scheduler: Arc<C>,
}

impl<U, C> SubscribeOn<U, C> {
    pub(crate) fn new(upstream: U, scheduler: C) -> Self {
        Self {
            upstream: Arc::new(upstream),
            scheduler: Arc::new(scheduler),
        }
    }
}

impl<U, C> Publisher for SubscribeOn<U, C>
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
        let node = Arc::new(HopNode {
            scheduler: self.scheduler.clone(),
            upstream: Arc::new(UpstreamLink::new()),
            downstream: Downstream::new(subscriber),
        });
        let upstream = self.upstream.clone();
        let attached = node.clone();
        let attach = move || upstream.receive(SubscribeOnSubscriber { node: attached });
        if let Err(err) = self.scheduler.schedule(Box::new(attach)) {
            node.downstream.subscribe(node.clone());
            node.refused(err);
        }
    }
}

/// Shared by both hops: one node, scheduled in different places.
struct HopNode<C, O, E> {
    scheduler: Arc<C>,
    upstream: Arc<UpstreamLink>,
    downstream: Downstream<O, E>,
}

impl<C, O, E> HopNode<C, O, E>
where
    C: Scheduler,
    O: Send + 'static,
    E: From<StreamError> + Send + 'static,
{
    fn deliver<A>(self: &Arc<Self>, action: A)
    where
        A: FnOnce(&Self) + Send + 'static,
    {
        let node = self.clone();
        if let Err(err) = self.scheduler.schedule(Box::new(move || action(&*node))) {
            self.refused(err);
        }
    }

    fn refused(&self, err: SchedulerError) {
        log::debug!("scheduler refused work: {}", err);
        self.upstream.cancel();
        self.downstream
            .terminate(Completion::Failed(StreamError::from(err).into()));
    }
}

impl<C, O, E> Cancellable for HopNode<C, O, E>
where
    C: Scheduler,
    O: Send + 'static,
    E: From<StreamError> + Send + 'static,
{
    fn cancel(&self) {
        self.downstream.cancel();
        let upstream = self.upstream.clone();
        if self.scheduler.schedule(Box::new(move || upstream.cancel())).is_err() {
            self.upstream.cancel();
        }
    }
}

impl<C, O, E> Subscription for HopNode<C, O, E>
where
    C: Scheduler,
    O: Send + 'static,
    E: From<StreamError> + Send + 'static,
{
    fn request(&self, demand: Demand) {
        self.downstream.request(demand);
        let upstream = self.upstream.clone();
        if let Err(err) = self.scheduler.schedule(Box::new(move || upstream.request(demand))) {
            self.refused(err);
        }
    }
}

struct ReceiveOnSubscriber<C, O, E> {
    node: Arc<HopNode<C, O, E>>,
}

impl<C, O, E> Subscriber for ReceiveOnSubscriber<C, O, E>
where
    C: Scheduler,
    O: Send + 'static,
    E: From<StreamError> + Send + 'static,
{
    type Input = O;
    type Failure = E;

    fn receive_subscription(&mut self, subscription: SubscriptionRef) {
        if self.node.upstream.attach(subscription) {
            let granted = self.node.downstream.subscribe(self.node.clone());
            self.node.upstream.request(granted);
        }
    }

    fn receive(&mut self, input: O) -> Demand {
        self.node.deliver(move |node| {
            let granted = node.downstream.send(input);
            node.upstream.request(granted);
        });
        Demand::none()
    }

    fn receive_completion(&mut self, completion: Completion<E>) {
        if self.node.upstream.finish() {
            self.node.deliver(move |node| {
                node.downstream.terminate(completion);
            });
        }
    }
}

struct SubscribeOnSubscriber<C, O, E> {
    node: Arc<HopNode<C, O, E>>,
}

impl<C, O, E> Subscriber for SubscribeOnSubscriber<C, O, E>
where
    C: Scheduler,
    O: Send + 'static,
    E: From<StreamError> + Send + 'static,
{
    type Input = O;
    type Failure = E;

    fn receive_subscription(&mut self, subscription: SubscriptionRef) {
        if self.node.upstream.attach(subscription) {
            let granted = self.node.downstream.subscribe(self.node.clone());
            self.node.upstream.request(granted);
        }
    }

    fn receive(&mut self, input: O) -> Demand {
        self.node.downstream.send(input)
    }

    fn receive_completion(&mut self, completion: Completion<E>) {
        if self.node.upstream.finish() {
            self.node.downstream.complete(completion);
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        publisher::Sequence,
        testing::{Event, TestSubscriber, VirtualTimeScheduler},
        Completion, Demand, Publisher, PublisherExt, SchedulerError, StreamError,
    };

    #[test]
    fn receive_on_defers_delivery_to_the_scheduler() {
        let scheduler = VirtualTimeScheduler::new();
        let (subscriber, monitor) = TestSubscriber::<u32, StreamError>::unbounded();
        Sequence::new(1u32..=3)
            .set_failure_type::<StreamError>()
            .receive_on(scheduler.clone())
            .receive(subscriber);

        assert_eq!(monitor.events(), vec![Event::Subscribed]);
        scheduler.run();
        assert_eq!(monitor.items(), vec![1, 2, 3]);
        assert_eq!(monitor.completion(), Some(Completion::Finished));
    }

    #[test]
    fn refused_delivery_fails_the_stream() {
        let scheduler = VirtualTimeScheduler::new();
        let (subscriber, monitor) = TestSubscriber::<u32, StreamError>::new(Demand::none());
        Sequence::new(1u32..)
            .set_failure_type::<StreamError>()
            .receive_on(scheduler.clone())
            .receive(subscriber);

        scheduler.set_available(false);
        monitor.request(Demand::max(2));
        assert_eq!(
            monitor.events(),
            vec![
                Event::Subscribed,
                Event::Completed(Completion::Failed(StreamError::SchedulerUnavailable(
                    SchedulerError::Unavailable
                ))),
            ]
        );
    }

    #[test]
    fn subscribe_on_attaches_on_the_scheduler() {
        let scheduler = VirtualTimeScheduler::new();
        let (subscriber, monitor) = TestSubscriber::<u32, StreamError>::new(Demand::max(2));
        Sequence::new(1u32..=5)
            .set_failure_type::<StreamError>()
            .subscribe_on(scheduler.clone())
            .receive(subscriber);

        assert!(!monitor.is_subscribed());
        scheduler.run();
        assert_eq!(monitor.items(), vec![1, 2]);

        monitor.cancel();
        scheduler.run();
        monitor.request(Demand::max(2));
        scheduler.run();
        assert_eq!(monitor.items(), vec![1, 2]);
        assert_eq!(monitor.completion(), None);
    }
}
