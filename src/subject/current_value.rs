use std::{
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
};

use super::{
    hub::{Hub, Latest},
    Subject,
};
use crate::{Completion, Never, Publisher, SubjectError, Subscriber};

/// A subject that always holds a current value.
///
/// New subscribers receive the current value first, as soon as they have demand. A
/// subscriber that is not ready when values arrive gets only the latest one once it
/// asks for more.
pub struct CurrentValueSubject<T, F = Never> {
    hub: Arc<Hub<T, F, Latest<T>>>,
}

impl<T, F> CurrentValueSubject<T, F>
where
    T: Clone + Send + 'static,
    F: Clone + Send + 'static,
{
    pub fn new(value: T) -> Self {
        Self {
            hub: Hub::new(Latest(value)),
        }
    }

    /// The latest value sent, or the initial one.
    pub fn value(&self) -> T {
        self.hub.retained(|latest| latest.0.clone())
    }

    /// Replaces the current value and broadcasts it.
    pub fn set(&self, value: T) -> Result<(), SubjectError> {
        if self.hub.send(value) {
            Ok(())
        } else {
            Err(SubjectError::Closed)
        }
    }

    /// Number of subscribers currently attached.
    pub fn subscriber_count(&self) -> usize {
        self.hub.subscriber_count()
    }
}

impl<T, F> Clone for CurrentValueSubject<T, F> {
    fn clone(&self) -> Self {
        Self {
            hub: self.hub.clone(),
        }
    }
}

impl<T, F> Publisher for CurrentValueSubject<T, F>
where
    T: Clone + Send + 'static,
    F: Clone + Send + 'static,
{
    type Output = T;
    type Failure = F;

    fn receive<S>(&self, subscriber: S)
    where
        S: Subscriber<Input = T, Failure = F>,
    {
        self.hub.attach(subscriber)
    }
}

impl<T, F> Subject for CurrentValueSubject<T, F>
where
    T: Clone + Send + 'static,
    F: Clone + Send + 'static,
{
    fn send(&self, value: T) {
        self.hub.send(value);
    }

    fn send_completion(&self, completion: Completion<F>) {
        self.hub.complete(completion);
    }
}

impl<T, F> futures::Sink<T> for CurrentValueSubject<T, F>
where
    T: Clone + Send + 'static,
    F: Clone + Send + 'static,
{
    type Error = SubjectError;

    fn poll_ready(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn start_send(self: Pin<&mut Self>, item: T) -> Result<(), Self::Error> {
        CurrentValueSubject::set(&self, item)
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn poll_close(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.hub.complete(Completion::Finished);
        Poll::Ready(Ok(()))
    }
}
