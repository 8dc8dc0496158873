use std::{marker::PhantomData, sync::Arc};

use super::transform::{self, Step, Transform};
use crate::{Completion, Never, Publisher, Subscriber};

/// Transforms the failure of a failed stream; items and `Finished` pass unchanged.
pub struct MapError<U, F> {
    upstream: U,
    transform: Arc<F>,
}

impl<U, F> MapError<U, F> {
    pub(crate) fn new(upstream: U, transform: F) -> Self {
        Self {
            upstream,
            transform: Arc::new(transform),
        }
    }
}

impl<U, F, E> Publisher for MapError<U, F>
where
    U: Publisher,
    F: Fn(U::Failure) -> E + Send + Sync + 'static,
    E: Send + 'static,
{
    type Output = U::Output;
    type Failure = E;

    fn receive<S>(&self, subscriber: S)
    where
        S: Subscriber<Input = U::Output, Failure = E>,
    {
        let step = MapErrorStep {
            transform: self.transform.clone(),
            _types: PhantomData,
        };
        transform::attach(&self.upstream, step, subscriber)
    }
}

struct MapErrorStep<I, E, F> {
    transform: Arc<F>,
    _types: PhantomData<fn(I) -> E>,
}

impl<I, E, F, G> Transform for MapErrorStep<I, E, F>
where
    I: Send + 'static,
    E: Send + 'static,
    F: Fn(E) -> G + Send + Sync + 'static,
    G: Send + 'static,
{
    type Input = I;
    type Output = I;
    type UpstreamFailure = E;
    type Failure = G;

    fn transform(&mut self, input: I) -> Step<I, G> {
        Step::Emit(input)
    }

    fn complete(&mut self, completion: Completion<E>) -> Completion<G> {
        completion.map_failure(|failure| (self.transform)(failure))
    }
}

/// Gives a stream that cannot fail any failure type, so it composes with failing ones.
pub struct SetFailureType<U, E> {
    upstream: U,
    _failure: PhantomData<fn() -> E>,
}

impl<U, E> SetFailureType<U, E> {
    pub(crate) fn new(upstream: U) -> Self {
        Self {
            upstream,
            _failure: PhantomData,
        }
    }
}

impl<U, E> Publisher for SetFailureType<U, E>
where
    U: Publisher<Failure = Never>,
    E: Send + 'static,
{
    type Output = U::Output;
    type Failure = E;

    fn receive<S>(&self, subscriber: S)
    where
        S: Subscriber<Input = U::Output, Failure = E>,
    {
        let step = MapErrorStep {
            transform: Arc::new(|never: Never| -> E { match never {} }),
            _types: PhantomData,
        };
        transform::attach(&self.upstream, step, subscriber)
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        publisher::{Fail, Just},
        testing::{Event, TestSubscriber},
        Completion, Publisher, PublisherExt, StreamError,
    };

    #[derive(Debug, Clone, PartialEq)]
    struct Wrapped(String);

    #[test]
    fn map_error_only_touches_the_failure() {
        let (subscriber, monitor) = TestSubscriber::<u8, Wrapped>::unbounded();
        Fail::<u8, _>::new("io".to_string())
            .map_error(Wrapped)
            .receive(subscriber);
        assert_eq!(
            monitor.events(),
            vec![
                Event::Subscribed,
                Event::Completed(Completion::Failed(Wrapped("io".into())))
            ]
        );
    }

    #[test]
    fn set_failure_type_passes_items_and_finish() {
        let (subscriber, monitor) = TestSubscriber::<u8, StreamError>::unbounded();
        Just::new(9u8)
            .set_failure_type::<StreamError>()
            .receive(subscriber);
        assert_eq!(monitor.items(), vec![9]);
        assert_eq!(monitor.completion(), Some(Completion::Finished));
    }
}
