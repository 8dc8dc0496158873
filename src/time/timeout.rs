use std::{sync::Arc, time::Duration};

use parking_lot::Mutex;

use super::{arm, cancel_timer, TimerSlot};
use crate::{
    node::{Downstream, UpstreamLink},
    scheduler::Scheduler,
    Cancellable, Completion, Demand, Publisher, StreamError, Subscriber, Subscription,
    SubscriptionRef,
};

/// Fails with [`StreamError::TimeoutExceeded`] when upstream stays silent for longer than
/// `interval`, counted from subscription and again from every item.
pub struct Timeout<U, C> {
    upstream: U,
    interval: Duration,
    scheduler: Arc<C>,
}

impl<U, C> Timeout<U, C> {
    pub(crate) fn new(upstream: U, interval: Duration, scheduler: C) -> Self {
        Self {
            upstream,
            interval,
            scheduler: Arc::new(scheduler),
        }
    }
}

impl<U, C> Publisher for Timeout<U, C>
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
        let node = Arc::new(TimeoutNode {
            interval: self.interval,
            scheduler: self.scheduler.clone(),
            upstream: UpstreamLink::new(),
            downstream: Downstream::new(subscriber),
            timer: Mutex::new(TimerSlot::default()),
        });
        self.upstream.receive(TimeoutSubscriber { node });
    }
}

struct TimeoutNode<C, O, E> {
    interval: Duration,
    scheduler: Arc<C>,
    upstream: UpstreamLink,
    downstream: Downstream<O, E>,
    timer: Mutex<TimerSlot>,
}

impl<C, O, E> TimeoutNode<C, O, E>
where
    C: Scheduler,
    O: Send + 'static,
    E: From<StreamError> + Send + 'static,
{
    /// Restarts the countdown. Returns `false` if the stream is over, including when the
    /// scheduler refused the timer and the stream failed because of it.
    fn reset(self: &Arc<Self>) -> bool {
        if !self.downstream.is_live() {
            return false;
        }
        let (generation, previous) = self.timer.lock().rearm();
        cancel_timer(previous);
        match arm(
            &*self.scheduler,
            self.interval,
            self,
            generation,
            Self::expire,
        ) {
            Ok(handle) => {
                cancel_timer(self.timer.lock().set(generation, handle));
                true
            }
            Err(err) => {
                log::debug!("timeout timer refused: {}", err);
                self.end(StreamError::from(err));
                false
            }
        }
    }

    fn expire(self: &Arc<Self>, generation: u64) {
        if self.timer.lock().fire(generation) {
            log::debug!("no signal within {:?}; timing out", self.interval);
            self.end(StreamError::TimeoutExceeded);
        }
    }

    fn end(&self, error: StreamError) {
        self.upstream.cancel();
        cancel_timer(self.timer.lock().clear());
        self.downstream.terminate(Completion::Failed(error.into()));
    }
}

impl<C, O, E> Cancellable for TimeoutNode<C, O, E>
where
    C: Scheduler,
    O: Send + 'static,
    E: From<StreamError> + Send + 'static,
{
    fn cancel(&self) {
        self.upstream.cancel();
        cancel_timer(self.timer.lock().clear());
        self.downstream.cancel();
    }
}

impl<C, O, E> Subscription for TimeoutNode<C, O, E>
where
    C: Scheduler,
    O: Send + 'static,
    E: From<StreamError> + Send + 'static,
{
    fn request(&self, demand: Demand) {
        self.downstream.request(demand);
        self.upstream.request(demand);
    }
}

struct TimeoutSubscriber<C, O, E> {
    node: Arc<TimeoutNode<C, O, E>>,
}

impl<C, O, E> Subscriber for TimeoutSubscriber<C, O, E>
where
    C: Scheduler,
    O: Send + 'static,
    E: From<StreamError> + Send + 'static,
{
    type Input = O;
    type Failure = E;

    fn receive_subscription(&mut self, subscription: SubscriptionRef) {
        if !self.node.upstream.attach(subscription) {
            return;
        }
        let granted = self.node.downstream.subscribe(self.node.clone());
        if self.node.reset() {
            self.node.upstream.request(granted);
        }
    }

    fn receive(&mut self, input: O) -> Demand {
        if !self.node.reset() {
            return Demand::none();
        }
        self.node.downstream.send(input)
    }

    fn receive_completion(&mut self, completion: Completion<E>) {
        if self.node.upstream.finish() {
            cancel_timer(self.node.timer.lock().clear());
            self.node.downstream.terminate(completion);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use crate::{
        testing::{Event, TestSubscriber, VirtualTimeScheduler},
        Completion, PassthroughSubject, Publisher, PublisherExt, SchedulerError, StreamError,
        Subject,
    };

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn silence_longer_than_the_interval_fails_and_cancels_upstream() {
        let scheduler = VirtualTimeScheduler::new();
        let input = PassthroughSubject::<u32, StreamError>::new();
        let (subscriber, monitor) = TestSubscriber::<u32, StreamError>::unbounded();
        input
            .clone()
            .timeout(ms(50), scheduler.clone())
            .receive(subscriber);

        scheduler.advance_to(ms(40));
        input.send(1);
        scheduler.advance_to(ms(80));
        input.send(2);
        scheduler.advance_to(ms(131));

        assert_eq!(
            monitor.events(),
            vec![
                Event::Subscribed,
                Event::Item(1),
                Event::Item(2),
                Event::Completed(Completion::Failed(StreamError::TimeoutExceeded)),
            ]
        );
        assert_eq!(input.subscriber_count(), 0);
    }

    #[test]
    fn completion_in_time_disarms_the_timer() {
        let scheduler = VirtualTimeScheduler::new();
        let input = PassthroughSubject::<u32, StreamError>::new();
        let (subscriber, monitor) = TestSubscriber::<u32, StreamError>::unbounded();
        input
            .clone()
            .timeout(ms(50), scheduler.clone())
            .receive(subscriber);

        input.send_completion(Completion::Finished);
        assert_eq!(scheduler.pending(), 0);
        scheduler.run();
        assert_eq!(monitor.completion(), Some(Completion::Finished));
    }

    #[test]
    fn refused_timer_at_subscription_fails_after_subscribing() {
        let scheduler = VirtualTimeScheduler::new();
        scheduler.set_available(false);
        let input = PassthroughSubject::<u32, StreamError>::new();
        let (subscriber, monitor) = TestSubscriber::<u32, StreamError>::unbounded();
        input
            .clone()
            .timeout(ms(50), scheduler.clone())
            .receive(subscriber);

        input.send(1);
        assert_eq!(
            monitor.events(),
            vec![
                Event::Subscribed,
                Event::Completed(Completion::Failed(StreamError::SchedulerUnavailable(
                    SchedulerError::Unavailable
                ))),
            ]
        );
        assert_eq!(input.subscriber_count(), 0);
    }

    #[test]
    fn refused_timer_on_an_item_fails_without_delivering_it() {
        let scheduler = VirtualTimeScheduler::new();
        let input = PassthroughSubject::<u32, StreamError>::new();
        let (subscriber, monitor) = TestSubscriber::<u32, StreamError>::unbounded();
        input
            .clone()
            .timeout(ms(50), scheduler.clone())
            .receive(subscriber);

        input.send(1);
        scheduler.set_available(false);
        input.send(2);
        input.send(3);
        assert_eq!(
            monitor.events(),
            vec![
                Event::Subscribed,
                Event::Item(1),
                Event::Completed(Completion::Failed(StreamError::SchedulerUnavailable(
                    SchedulerError::Unavailable
                ))),
            ]
        );
        assert_eq!(input.subscriber_count(), 0);
        scheduler.set_available(true);
        scheduler.run();
        assert_eq!(monitor.events().len(), 3);
    }
}
