use std::{
    collections::VecDeque,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll, Waker},
};

use futures::Stream;
use parking_lot::Mutex;

use crate::{Completion, Demand, Publisher, Subscriber, SubscriptionRef};

struct Shared<O, F> {
    queue: VecDeque<O>,
    completion: Option<Completion<F>>,
    done: bool,
    requested: bool,
    waker: Option<Waker>,
    subscription: Option<SubscriptionRef>,
}

/// A publisher consumed as a `futures::Stream`.
///
/// Demand follows polling: one item is requested when the stream is polled and nothing
/// is buffered. A failure is yielded as the last `Err` item. Dropping the stream cancels
/// the subscription.
pub struct Values<O, F> {
    shared: Arc<Mutex<Shared<O, F>>>,
}

impl<O, F> Values<O, F>
where
    O: Send + 'static,
    F: Send + 'static,
{
    pub(crate) fn new<P>(publisher: &P) -> Self
    where
        P: Publisher<Output = O, Failure = F>,
    {
        let shared = Arc::new(Mutex::new(Shared {
            queue: VecDeque::new(),
            completion: None,
            done: false,
            requested: false,
            waker: None,
            subscription: None,
        }));
        publisher.receive(ValuesSubscriber {
            shared: shared.clone(),
        });
        Self { shared }
    }
}

impl<O, F> Stream for Values<O, F> {
    type Item = Result<O, F>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        loop {
            let subscription = {
                let mut shared = self.shared.lock();
                if let Some(item) = shared.queue.pop_front() {
                    return Poll::Ready(Some(Ok(item)));
                }
                if let Some(completion) = shared.completion.take() {
                    shared.done = true;
                    return Poll::Ready(match completion {
                        Completion::Finished => None,
                        Completion::Failed(failure) => Some(Err(failure)),
                    });
                }
                if shared.done {
                    return Poll::Ready(None);
                }
                shared.waker = Some(cx.waker().clone());
                match (&shared.subscription, shared.requested) {
                    (Some(subscription), false) => {
                        let subscription = subscription.clone();
                        shared.requested = true;
                        subscription
                    }
                    _ => return Poll::Pending,
                }
            };
            subscription.request(Demand::max(1));
        }
    }
}

impl<O, F> Drop for Values<O, F> {
    fn drop(&mut self) {
        let subscription = {
            let mut shared = self.shared.lock();
            shared.done = true;
            shared.queue.clear();
            shared.subscription.take()
        };
        if let Some(subscription) = subscription {
            subscription.cancel();
        }
    }
}

struct ValuesSubscriber<O, F> {
    shared: Arc<Mutex<Shared<O, F>>>,
}

impl<O, F> ValuesSubscriber<O, F> {
    fn wake(&self) {
        let waker = self.shared.lock().waker.take();
        if let Some(waker) = waker {
            waker.wake();
        }
    }
}

impl<O, F> Subscriber for ValuesSubscriber<O, F>
where
    O: Send + 'static,
    F: Send + 'static,
{
    type Input = O;
    type Failure = F;

    fn receive_subscription(&mut self, subscription: SubscriptionRef) {
        {
            let mut shared = self.shared.lock();
            if shared.done || shared.subscription.is_some() {
                drop(shared);
                subscription.cancel();
                return;
            }
            shared.subscription = Some(subscription);
        }
        self.wake();
    }

    fn receive(&mut self, input: O) -> Demand {
        {
            let mut shared = self.shared.lock();
            if shared.done {
                return Demand::none();
            }
            shared.queue.push_back(input);
            shared.requested = false;
        }
        self.wake();
        Demand::none()
    }

    fn receive_completion(&mut self, completion: Completion<F>) {
        {
            let mut shared = self.shared.lock();
            shared.subscription = None;
            if shared.done {
                return;
            }
            shared.completion = Some(completion);
        }
        self.wake();
    }
}

#[cfg(test)]
mod tests {
    use futures::StreamExt;

    use crate::{
        publisher::{Record, Sequence},
        Completion, PublisherExt,
    };

    #[async_std::test]
    async fn yields_items_then_ends() -> anyhow::Result<()> {
        crate::test_support::init_logging();
        let values: Vec<_> = Sequence::new(1..=3).map(|n| n * 2).into_stream().collect().await;
        assert_eq!(values, vec![Ok(2), Ok(4), Ok(6)]);
        Ok(())
    }

    #[async_std::test]
    async fn failure_is_the_last_item() -> anyhow::Result<()> {
        let mut values = Record::new(vec!["a"], Completion::Failed(3u8)).into_stream();
        assert_eq!(values.next().await, Some(Ok("a")));
        assert_eq!(values.next().await, Some(Err(3)));
        assert_eq!(values.next().await, None);
        Ok(())
    }

    #[async_std::test]
    async fn pulls_lazily_from_an_endless_source() -> anyhow::Result<()> {
        let firsts: Vec<u64> = Sequence::new(0u64..)
            .into_stream()
            .take(4)
            .map(|value| value.unwrap_or_else(|never| match never {}))
            .collect()
            .await;
        assert_eq!(firsts, vec![0, 1, 2, 3]);
        Ok(())
    }
}
