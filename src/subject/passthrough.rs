use std::{
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
};

use super::{
    hub::{Hub, Nothing},
    Subject,
};
use crate::{Completion, Never, Publisher, SubjectError, Subscriber};

/// Broadcasts values to the subscribers that have demand for them when they are sent.
///
/// Nothing is buffered: a subscriber without outstanding demand misses the value.
pub struct PassthroughSubject<T, F = Never> {
    hub: Arc<Hub<T, F, Nothing>>,
}

impl<T, F> PassthroughSubject<T, F>
where
    T: Clone + Send + 'static,
    F: Clone + Send + 'static,
{
    pub fn new() -> Self {
        Self {
            hub: Hub::new(Nothing),
        }
    }

    /// Number of subscribers currently attached.
    pub fn subscriber_count(&self) -> usize {
        self.hub.subscriber_count()
    }
}

impl<T, F> Default for PassthroughSubject<T, F>
where
    T: Clone + Send + 'static,
    F: Clone + Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T, F> Clone for PassthroughSubject<T, F> {
    fn clone(&self) -> Self {
        Self {
            hub: self.hub.clone(),
        }
    }
}

impl<T, F> Publisher for PassthroughSubject<T, F>
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

impl<T, F> Subject for PassthroughSubject<T, F>
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

impl<T, F> futures::Sink<T> for PassthroughSubject<T, F>
where
    T: Clone + Send + 'static,
    F: Clone + Send + 'static,
{
    type Error = SubjectError;

    fn poll_ready(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn start_send(self: Pin<&mut Self>, item: T) -> Result<(), Self::Error> {
        if self.hub.send(item) {
            Ok(())
        } else {
            Err(SubjectError::Closed)
        }
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn poll_close(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.hub.complete(Completion::Finished);
        Poll::Ready(Ok(()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        testing::{Event, TestSubscriber},
        Demand,
    };

    #[test]
    fn subscribers_without_demand_miss_values() {
        let subject = PassthroughSubject::<u32>::new();
        let (eager, eager_monitor) = TestSubscriber::<u32, Never>::unbounded();
        let (idle, idle_monitor) = TestSubscriber::<u32, Never>::new(Demand::none());
        subject.receive(eager);
        subject.receive(idle);

        subject.send(1);
        idle_monitor.request(Demand::max(1));
        subject.send(2);
        subject.send(3);

        assert_eq!(eager_monitor.items(), vec![1, 2, 3]);
        assert_eq!(idle_monitor.items(), vec![2]);
    }

    #[test]
    fn completion_reaches_current_and_late_subscribers() {
        let subject = PassthroughSubject::<u32, String>::new();
        let (early, early_monitor) = TestSubscriber::<u32, String>::unbounded();
        subject.receive(early);
        subject.send_completion(Completion::Failed("closed".into()));
        subject.send(5);

        let (late, late_monitor) = TestSubscriber::<u32, String>::new(Demand::none());
        subject.receive(late);

        let expected = vec![
            Event::Subscribed,
            Event::Completed(Completion::Failed("closed".to_string())),
        ];
        assert_eq!(early_monitor.events(), expected);
        assert_eq!(late_monitor.events(), expected);
        assert_eq!(subject.subscriber_count(), 0);
    }

    #[test]
    fn cancelling_detaches_only_that_subscriber() {
        let subject = PassthroughSubject::<u32>::new();
        let (first, first_monitor) = TestSubscriber::<u32, Never>::unbounded();
        let (second, second_monitor) = TestSubscriber::<u32, Never>::unbounded();
        subject.receive(first);
        subject.receive(second);
        assert_eq!(subject.subscriber_count(), 2);

        first_monitor.cancel();
        first_monitor.cancel();
        subject.send(8);

        assert_eq!(subject.subscriber_count(), 1);
        assert_eq!(first_monitor.items(), Vec::<u32>::new());
        assert_eq!(second_monitor.items(), vec![8]);
    }

    #[async_std::test]
    async fn feeds_from_a_futures_sink() -> anyhow::Result<()> {
        use futures::SinkExt;

        crate::test_support::init_logging();
        let mut subject = PassthroughSubject::<u32>::new();
        let (subscriber, monitor) = TestSubscriber::<u32, Never>::unbounded();
        subject.receive(subscriber);

        for n in 1..=3 {
            log::debug!("send {}", n);
            SinkExt::send(&mut subject, n).await?;
        }
        subject.close().await?;

        assert_eq!(monitor.items(), vec![1, 2, 3]);
        assert_eq!(monitor.completion(), Some(Completion::Finished));
        assert!(matches!(
            SinkExt::send(&mut subject, 4).await,
            Err(SubjectError::Closed)
        ));
        Ok(())
    }
}
