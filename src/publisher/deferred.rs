use crate::{Publisher, Subscriber};

/// Builds a new publisher for every subscriber.
pub struct Deferred<C> {
    factory: C,
}

impl<C> Deferred<C> {
    pub fn new(factory: C) -> Self {
        Self { factory }
    }
}

impl<C, P> Publisher for Deferred<C>
where
    C: Fn() -> P + Send + Sync + 'static,
    P: Publisher,
{
    type Output = P::Output;
    type Failure = P::Failure;

    fn receive<S>(&self, subscriber: S)
    where
        S: Subscriber<Input = P::Output, Failure = P::Failure>,
    {
        (self.factory)().receive(subscriber)
    }
}
