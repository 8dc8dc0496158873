use std::marker::PhantomData;

use super::transform::{self, Step, Transform};
use crate::{Completion, Publisher, Subscriber};

/// Emits the first `count` items, then cancels upstream and finishes.
pub struct Take<U> {
    upstream: U,
    count: u64,
}

impl<U> Take<U> {
    pub(crate) fn new(upstream: U, count: u64) -> Self {
        Self { upstream, count }
    }
}

impl<U: Publisher> Publisher for Take<U> {
    type Output = U::Output;
    type Failure = U::Failure;

    fn receive<S>(&self, subscriber: S)
    where
        S: Subscriber<Input = U::Output, Failure = U::Failure>,
    {
        let step = TakeStep {
            remaining: self.count,
            _types: PhantomData,
        };
        transform::attach(&self.upstream, step, subscriber)
    }
}

struct TakeStep<I, E> {
    remaining: u64,
    _types: PhantomData<fn(I) -> E>,
}

impl<I, E> Transform for TakeStep<I, E>
where
    I: Send + 'static,
    E: Send + 'static,
{
    type Input = I;
    type Output = I;
    type UpstreamFailure = E;
    type Failure = E;

    fn start(&mut self) -> Option<Completion<E>> {
        (self.remaining == 0).then_some(Completion::Finished)
    }

    fn transform(&mut self, input: I) -> Step<I, E> {
        self.remaining = self.remaining.saturating_sub(1);
        if self.remaining == 0 {
            Step::Last(input)
        } else {
            Step::Emit(input)
        }
    }

    fn complete(&mut self, completion: Completion<E>) -> Completion<E> {
        completion
    }
}

/// Drops the first `count` items and passes on the rest.
pub struct Skip<U> {
    upstream: U,
    count: u64,
}

impl<U> Skip<U> {
    pub(crate) fn new(upstream: U, count: u64) -> Self {
        Self { upstream, count }
    }
}

impl<U: Publisher> Publisher for Skip<U> {
    type Output = U::Output;
    type Failure = U::Failure;

    fn receive<S>(&self, subscriber: S)
    where
        S: Subscriber<Input = U::Output, Failure = U::Failure>,
    {
        let step = SkipStep {
            remaining: self.count,
            _types: PhantomData,
        };
        transform::attach(&self.upstream, step, subscriber)
    }
}

struct SkipStep<I, E> {
    remaining: u64,
    _types: PhantomData<fn(I) -> E>,
}

impl<I, E> Transform for SkipStep<I, E>
where
    I: Send + 'static,
    E: Send + 'static,
{
    type Input = I;
    type Output = I;
    type UpstreamFailure = E;
    type Failure = E;

    fn transform(&mut self, input: I) -> Step<I, E> {
        if self.remaining > 0 {
            self.remaining -= 1;
            Step::Skip
        } else {
            Step::Emit(input)
        }
    }

    fn complete(&mut self, completion: Completion<E>) -> Completion<E> {
        completion
    }
}
