use std::{marker::PhantomData, sync::Arc};

use super::transform::{self, Step, Transform};
use crate::{Completion, Publisher, Subscriber};

/// Emits every intermediate value of a running accumulation.
pub struct Scan<U, A, F> {
    upstream: U,
    initial: A,
    accumulate: Arc<F>,
}

impl<U, A, F> Scan<U, A, F> {
    pub(crate) fn new(upstream: U, initial: A, accumulate: F) -> Self {
        Self {
            upstream,
            initial,
            accumulate: Arc::new(accumulate),
        }
    }
}

impl<U, A, F> Publisher for Scan<U, A, F>
where
    U: Publisher,
    A: Clone + Send + Sync + 'static,
    F: Fn(&A, U::Output) -> A + Send + Sync + 'static,
{
    type Output = A;
    type Failure = U::Failure;

    fn receive<S>(&self, subscriber: S)
    where
        S: Subscriber<Input = A, Failure = U::Failure>,
    {
        let step = ScanStep {
            state: self.initial.clone(),
            accumulate: self.accumulate.clone(),
            _types: PhantomData,
        };
        transform::attach(&self.upstream, step, subscriber)
    }
}

struct ScanStep<I, E, A, F> {
    state: A,
    accumulate: Arc<F>,
    _types: PhantomData<fn(I) -> E>,
}

impl<I, E, A, F> Transform for ScanStep<I, E, A, F>
where
    I: Send + 'static,
    E: Send + 'static,
    A: Clone + Send + 'static,
    F: Fn(&A, I) -> A + Send + Sync + 'static,
{
    type Input = I;
    type Output = A;
    type UpstreamFailure = E;
    type Failure = E;

    fn transform(&mut self, input: I) -> Step<A, E> {
        self.state = (self.accumulate)(&self.state, input);
        Step::Emit(self.state.clone())
    }

    fn complete(&mut self, completion: Completion<E>) -> Completion<E> {
        completion
    }
}
