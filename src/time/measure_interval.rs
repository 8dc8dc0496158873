use std::{marker::PhantomData, sync::Arc, time::Duration};

use crate::{
    operator::transform::{self, Step, Transform},
    scheduler::Scheduler,
    Completion, Publisher, Subscriber,
};

/// Replaces every item with the time elapsed since the previous one, or since
/// subscription for the first item, as measured by the scheduler's clock.
pub struct MeasureInterval<U, C> {
    upstream: U,
    scheduler: Arc<C>,
}

impl<U, C> MeasureInterval<U, C> {
    pub(crate) fn new(upstream: U, scheduler: C) -> Self {
        Self {
            upstream,
            scheduler: Arc::new(scheduler),
        }
    }
}

impl<U, C> Publisher for MeasureInterval<U, C>
where
    U: Publisher,
    C: Scheduler,
{
    type Output = Duration;
    type Failure = U::Failure;

    fn receive<S>(&self, subscriber: S)
    where
        S: Subscriber<Input = Duration, Failure = U::Failure>,
    {
        let step = MeasureStep {
            scheduler: self.scheduler.clone(),
            last: self.scheduler.now(),
            _types: PhantomData,
        };
        transform::attach(&self.upstream, step, subscriber)
    }
}

struct MeasureStep<C, I, E> {
    scheduler: Arc<C>,
    last: Duration,
    _types: PhantomData<fn(I) -> E>,
}

impl<C, I, E> Transform for MeasureStep<C, I, E>
where
    C: Scheduler,
    I: Send + 'static,
    E: Send + 'static,
{
    type Input = I;
    type Output = Duration;
    type UpstreamFailure = E;
    type Failure = E;

    fn start(&mut self) -> Option<Completion<E>> {
        self.last = self.scheduler.now();
        None
    }

    fn transform(&mut self, _input: I) -> Step<Duration, E> {
        let now = self.scheduler.now();
        let elapsed = now.saturating_sub(self.last);
        self.last = now;
        Step::Emit(elapsed)
    }

    fn complete(&mut self, completion: Completion<E>) -> Completion<E> {
        completion
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use crate::{
        testing::{TestSubscriber, VirtualTimeScheduler},
        Never, PassthroughSubject, Publisher, PublisherExt, Subject,
    };

    #[test]
    fn reports_the_gaps_between_items() {
        let scheduler = VirtualTimeScheduler::new();
        let input = PassthroughSubject::<&str>::new();
        let (subscriber, monitor) = TestSubscriber::<Duration, Never>::unbounded();
        scheduler.advance_to(Duration::from_millis(5));
        input
            .clone()
            .measure_interval(scheduler.clone())
            .receive(subscriber);

        for at in [25, 30, 100] {
            scheduler.advance_to(Duration::from_millis(at));
            input.send("tick");
        }
        assert_eq!(
            monitor.items(),
            [20, 5, 70].map(Duration::from_millis).to_vec()
        );
    }
}
