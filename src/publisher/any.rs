use std::sync::Arc;

use crate::{AnySubscriber, Publisher, Subscriber};

trait ErasedPublisher<O, F>: Send + Sync {
    fn receive_erased(&self, subscriber: AnySubscriber<O, F>);
}

impl<P> ErasedPublisher<P::Output, P::Failure> for P
where
    P: Publisher,
{
    fn receive_erased(&self, subscriber: AnySubscriber<P::Output, P::Failure>) {
        self.receive(subscriber)
    }
}

/// Type-erased publisher, cheap to clone.
pub struct AnyPublisher<O, F> {
    inner: Arc<dyn ErasedPublisher<O, F>>,
}

impl<O, F> AnyPublisher<O, F>
where
    O: Send + 'static,
    F: Send + 'static,
{
    pub fn new<P>(publisher: P) -> Self
    where
        P: Publisher<Output = O, Failure = F>,
    {
        Self {
            inner: Arc::new(publisher),
        }
    }
}

impl<O, F> Clone for AnyPublisher<O, F> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<O, F> Publisher for AnyPublisher<O, F>
where
    O: Send + 'static,
    F: Send + 'static,
{
    type Output = O;
    type Failure = F;

    fn receive<S>(&self, subscriber: S)
    where
        S: Subscriber<Input = O, Failure = F>,
    {
        self.inner.receive_erased(Box::new(subscriber))
    }
}
