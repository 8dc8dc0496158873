use std::{marker::PhantomData, sync::Arc};

use super::transform::{self, Step, Transform};
use crate::{Completion, Publisher, Subscriber};

/// Passes on the items that satisfy a predicate.
///
/// Each rejected item is replaced by a request for one more upstream item, so the
/// subscriber still receives as many items as it asked for while upstream has them.
pub struct Filter<U, P> {
    upstream: U,
    predicate: Arc<P>,
}

impl<U, P> Filter<U, P> {
    pub(crate) fn new(upstream: U, predicate: P) -> Self {
        Self {
            upstream,
            predicate: Arc::new(predicate),
        }
    }
}

impl<U, P> Publisher for Filter<U, P>
where
    U: Publisher,
    P: Fn(&U::Output) -> bool + Send + Sync + 'static,
{
    type Output = U::Output;
    type Failure = U::Failure;

    fn receive<S>(&self, subscriber: S)
    where
        S: Subscriber<Input = U::Output, Failure = U::Failure>,
    {
        let step = FilterStep {
            predicate: self.predicate.clone(),
            _types: PhantomData,
        };
        transform::attach(&self.upstream, step, subscriber)
    }
}

struct FilterStep<I, E, P> {
    predicate: Arc<P>,
    _types: PhantomData<fn(I) -> E>,
}

impl<I, E, P> Transform for FilterStep<I, E, P>
where
    I: Send + 'static,
    E: Send + 'static,
    P: Fn(&I) -> bool + Send + Sync + 'static,
{
    type Input = I;
    type Output = I;
    type UpstreamFailure = E;
    type Failure = E;

    fn transform(&mut self, input: I) -> Step<I, E> {
        if (self.predicate)(&input) {
            Step::Emit(input)
        } else {
            Step::Skip
        }
    }

    fn complete(&mut self, completion: Completion<E>) -> Completion<E> {
        completion
    }
}

/// Transforms items with a closure and drops those mapped to `None`.
pub struct FilterMap<U, F> {
    upstream: U,
    transform: Arc<F>,
}

impl<U, F> FilterMap<U, F> {
    pub(crate) fn new(upstream: U, transform: F) -> Self {
        Self {
            upstream,
            transform: Arc::new(transform),
        }
    }
}

impl<U, F, T> Publisher for FilterMap<U, F>
where
    U: Publisher,
    F: Fn(U::Output) -> Option<T> + Send + Sync + 'static,
    T: Send + 'static,
{
    type Output = T;
    type Failure = U::Failure;

    fn receive<S>(&self, subscriber: S)
    where
        S: Subscriber<Input = T, Failure = U::Failure>,
    {
        let step = FilterMapStep {
            transform: self.transform.clone(),
            _types: PhantomData,
        };
        transform::attach(&self.upstream, step, subscriber)
    }
}

struct FilterMapStep<I, E, F> {
    transform: Arc<F>,
    _types: PhantomData<fn(I) -> E>,
}

impl<I, E, F, T> Transform for FilterMapStep<I, E, F>
where
    I: Send + 'static,
    E: Send + 'static,
    F: Fn(I) -> Option<T> + Send + Sync + 'static,
    T: Send + 'static,
{
    type Input = I;
    type Output = T;
    type UpstreamFailure = E;
    type Failure = E;

    fn transform(&mut self, input: I) -> Step<T, E> {
        match (self.transform)(input) {
            Some(output) => Step::Emit(output),
            None => Step::Skip,
        }
    }

    fn complete(&mut self, completion: Completion<E>) -> Completion<E> {
        completion
    }
}
