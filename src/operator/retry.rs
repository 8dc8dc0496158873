use std::sync::Arc;

use parking_lot::Mutex;

use crate::{
    node::{Downstream, WorkLoop},
    Cancellable, Completion, Demand, Publisher, Subscriber, Subscription, SubscriptionRef,
};

/// Resubscribes to the upstream description after a failure, up to `attempts` times.
///
/// Each attempt is a fresh subscription; items already delivered from a failed attempt
/// stay delivered. Demand the subscriber has not used up carries over to the next
/// attempt.
pub struct Retry<U> {
    upstream: Arc<U>,
    attempts: u64,
}

impl<U> Retry<U> {
    pub(crate) fn new(upstream: U, attempts: u64) -> Self {
        Self {
            upstream: Arc::new(upstream),
            attempts,
        }
    }
}

impl<U: Publisher> Publisher for Retry<U> {
    type Output = U::Output;
    type Failure = U::Failure;

    fn receive<S>(&self, subscriber: S)
    where
        S: Subscriber<Input = U::Output, Failure = U::Failure>,
    {
        let node = Arc::new(RetryNode {
            upstream: self.upstream.clone(),
            downstream: Downstream::new(subscriber),
            state: Mutex::new(RetryState {
                current: None,
                generation: 0,
                outstanding: Demand::none(),
                remaining: self.attempts,
                done: false,
                work: WorkLoop::default(),
            }),
        });
        node.downstream.subscribe(node.clone());
        node.subscribe_upstream();
    }
}

struct RetryState {
    current: Option<SubscriptionRef>,
    /// Signals tagged with an older generation come from an abandoned attempt.
    generation: u64,
    outstanding: Demand,
    remaining: u64,
    done: bool,
    work: WorkLoop,
}

struct RetryNode<U: Publisher> {
    upstream: Arc<U>,
    downstream: Downstream<U::Output, U::Failure>,
    state: Mutex<RetryState>,
}

impl<U: Publisher> RetryNode<U> {
    /// Subscribes to the next attempt. Attempts started from inside a failing attempt
    /// are run by the loop already in progress.
    fn subscribe_upstream(self: &Arc<Self>) {
        if !self.state.lock().work.enter() {
            return;
        }
        loop {
            let generation = {
                let mut state = self.state.lock();
                if state.done {
                    state.work.leave();
                    return;
                }
                state.generation
            };
            self.upstream.receive(RetrySubscriber {
                node: self.clone(),
                generation,
            });
            if !self.state.lock().work.again() {
                return;
            }
        }
    }
}

impl<U: Publisher> Cancellable for RetryNode<U> {
    fn cancel(&self) {
        let current = {
            let mut state = self.state.lock();
            state.done = true;
            state.generation += 1;
            state.current.take()
        };
        if let Some(subscription) = current {
            subscription.cancel();
        }
        self.downstream.cancel();
    }
}

impl<U: Publisher> Subscription for RetryNode<U> {
    fn request(&self, demand: Demand) {
        self.downstream.request(demand);
        let current = {
            let mut state = self.state.lock();
            if state.done {
                return;
            }
            state.outstanding += demand;
            state.current.clone()
        };
        if let Some(subscription) = current {
            subscription.request(demand);
        }
    }
}

struct RetrySubscriber<U: Publisher> {
    node: Arc<RetryNode<U>>,
    generation: u64,
}

impl<U: Publisher> Subscriber for RetrySubscriber<U> {
    type Input = U::Output;
    type Failure = U::Failure;

    fn receive_subscription(&mut self, subscription: SubscriptionRef) {
        let outstanding = {
            let mut state = self.node.state.lock();
            if state.done || state.generation != self.generation || state.current.is_some() {
                None
            } else {
                state.current = Some(subscription.clone());
                Some(state.outstanding)
            }
        };
        match outstanding {
            Some(demand) if demand.has_demand() => subscription.request(demand),
            Some(_) => {}
            None => subscription.cancel(),
        }
    }

    fn receive(&mut self, input: U::Output) -> Demand {
        {
            let mut state = self.node.state.lock();
            if state.done || state.generation != self.generation {
                return Demand::none();
            }
            state.outstanding.consume_one();
        }
        let granted = self.node.downstream.send(input);
        if granted.has_demand() {
            self.node.state.lock().outstanding += granted;
        }
        granted
    }

    fn receive_completion(&mut self, completion: Completion<U::Failure>) {
        let retry = {
            let mut state = self.node.state.lock();
            if state.done || state.generation != self.generation {
                return;
            }
            state.current = None;
            match &completion {
                Completion::Failed(_) if state.remaining > 0 => {
                    state.remaining -= 1;
                    state.generation += 1;
                    true
                }
                _ => {
                    state.done = true;
                    false
                }
            }
        };
        if retry {
            log::debug!("upstream failed; resubscribing");
            drop(completion);
            self.node.subscribe_upstream();
        } else {
            self.node.downstream.complete(completion);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };

    use crate::{
        publisher::{Deferred, Fail, Record},
        testing::{Event, TestSubscriber},
        AnyPublisher, Completion, Demand, Publisher, PublisherExt,
    };

    fn flaky(failures: usize) -> (impl Publisher<Output = u32, Failure = String>, Arc<AtomicUsize>) {
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = attempts.clone();
        let publisher = Deferred::new(move || {
            let attempt = counter.fetch_add(1, Ordering::SeqCst);
            if attempt < failures {
                AnyPublisher::new(Record::new(
                    vec![attempt as u32 * 10],
                    Completion::Failed(format!("attempt {attempt}")),
                ))
            } else {
                AnyPublisher::new(Record::new(vec![7, 8], Completion::Finished))
            }
        });
        (publisher, attempts)
    }

    #[test]
    fn retry_succeeds_within_budget() {
        crate::test_support::init_logging();
        let (publisher, attempts) = flaky(2);
        let (subscriber, monitor) = TestSubscriber::<u32, String>::unbounded();
        publisher.retry(2).receive(subscriber);

        assert_eq!(attempts.load(Ordering::SeqCst), 3);
        assert_eq!(monitor.items(), vec![0, 10, 7, 8]);
        assert_eq!(monitor.completion(), Some(Completion::Finished));
    }

    #[test]
    fn retry_forwards_the_last_failure_when_exhausted() {
        let (publisher, attempts) = flaky(5);
        let (subscriber, monitor) = TestSubscriber::<u32, String>::unbounded();
        publisher.retry(1).receive(subscriber);

        assert_eq!(attempts.load(Ordering::SeqCst), 2);
        assert_eq!(
            monitor.completion(),
            Some(Completion::Failed("attempt 1".to_string()))
        );
    }

    #[test]
    fn unused_demand_carries_over_to_the_next_attempt() {
        let (publisher, _attempts) = flaky(1);
        let (subscriber, monitor) = TestSubscriber::<u32, String>::new(Demand::max(2));
        publisher.retry(3).receive(subscriber);

        assert_eq!(monitor.items(), vec![0, 7]);
        assert_eq!(monitor.completion(), None);
        monitor.request(Demand::max(1));
        assert_eq!(monitor.items(), vec![0, 7, 8]);
        assert_eq!(monitor.completion(), Some(Completion::Finished));
    }

    #[test]
    fn deep_retry_budget_does_not_recurse() {
        let (subscriber, monitor) = TestSubscriber::<u32, &str>::unbounded();
        Fail::<u32, _>::new("always").retry(50_000).receive(subscriber);
        assert_eq!(
            monitor.events(),
            vec![Event::Subscribed, Event::Completed(Completion::Failed("always"))]
        );
    }
}
