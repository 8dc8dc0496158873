use std::{marker::PhantomData, sync::Arc};

use super::transform::{self, Step, Transform};
use crate::{Completion, Publisher, Subscriber};

/// Transforms every item with a closure.
pub struct Map<U, F> {
    upstream: U,
    transform: Arc<F>,
}

impl<U, F> Map<U, F> {
    pub(crate) fn new(upstream: U, transform: F) -> Self {
        Self {
            upstream,
            transform: Arc::new(transform),
        }
    }
}

impl<U, F, T> Publisher for Map<U, F>
where
    U: Publisher,
    F: Fn(U::Output) -> T + Send + Sync + 'static,
    T: Send + 'static,
{
    type Output = T;
    type Failure = U::Failure;

    fn receive<S>(&self, subscriber: S)
    where
        S: Subscriber<Input = T, Failure = U::Failure>,
    {
        let step = MapStep {
            transform: self.transform.clone(),
            _types: PhantomData,
        };
        transform::attach(&self.upstream, step, subscriber)
    }
}

struct MapStep<I, E, F> {
    transform: Arc<F>,
    _types: PhantomData<fn(I) -> E>,
}

impl<I, E, F, T> Transform for MapStep<I, E, F>
where
    I: Send + 'static,
    E: Send + 'static,
    F: Fn(I) -> T + Send + Sync + 'static,
    T: Send + 'static,
{
    type Input = I;
    type Output = T;
    type UpstreamFailure = E;
    type Failure = E;

    fn transform(&mut self, input: I) -> Step<T, E> {
        Step::Emit((self.transform)(input))
    }

    fn complete(&mut self, completion: Completion<E>) -> Completion<E> {
        completion
    }
}

/// Transforms every item with a fallible closure; an `Err` cancels upstream and fails
/// the stream.
pub struct TryMap<U, F> {
    upstream: U,
    transform: Arc<F>,
}

impl<U, F> TryMap<U, F> {
    pub(crate) fn new(upstream: U, transform: F) -> Self {
        Self {
            upstream,
            transform: Arc::new(transform),
        }
    }
}

impl<U, F, T> Publisher for TryMap<U, F>
where
    U: Publisher,
    F: Fn(U::Output) -> Result<T, U::Failure> + Send + Sync + 'static,
    T: Send + 'static,
{
    type Output = T;
    type Failure = U::Failure;

    fn receive<S>(&self, subscriber: S)
    where
        S: Subscriber<Input = T, Failure = U::Failure>,
    {
        let step = TryMapStep {
            transform: self.transform.clone(),
            _types: PhantomData,
        };
        transform::attach(&self.upstream, step, subscriber)
    }
}

struct TryMapStep<I, E, F> {
    transform: Arc<F>,
    _types: PhantomData<fn(I) -> E>,
}

impl<I, E, F, T> Transform for TryMapStep<I, E, F>
where
    I: Send + 'static,
    E: Send + 'static,
    F: Fn(I) -> Result<T, E> + Send + Sync + 'static,
    T: Send + 'static,
{
    type Input = I;
    type Output = T;
    type UpstreamFailure = E;
    type Failure = E;

    fn transform(&mut self, input: I) -> Step<T, E> {
        match (self.transform)(input) {
            Ok(output) => Step::Emit(output),
            Err(failure) => Step::Fail(failure),
        }
    }

    fn complete(&mut self, completion: Completion<E>) -> Completion<E> {
        completion
    }
}
