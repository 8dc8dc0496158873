use std::{iter::Peekable, marker::PhantomData, sync::Arc};

use parking_lot::Mutex;

use crate::{
    node::{Downstream, WorkLoop},
    Cancellable, Completion, Demand, Never, Publisher, Subscriber, Subscription,
};

/// Publishes the elements of a collection or range, then finishes.
///
/// Elements are pulled from the iterator lazily, one per unit of demand, so unbounded
/// ranges are fine as long as something downstream limits them.
#[derive(Debug, Clone)]
pub struct Sequence<I, F = Never> {
    elements: I,
    _failure: PhantomData<fn() -> F>,
}

impl<I> Sequence<I> {
    pub fn new(elements: I) -> Self {
        Self::with_failure_type(elements)
    }
}

impl<I, F> Sequence<I, F> {
    /// A sequence whose failure type is `F` instead of [`Never`].
    pub fn with_failure_type(elements: I) -> Self {
        Self {
            elements,
            _failure: PhantomData,
        }
    }
}

impl<I, F> Publisher for Sequence<I, F>
where
    I: IntoIterator + Clone + Send + Sync + 'static,
    I::IntoIter: Send + 'static,
    I::Item: Send + 'static,
    F: Send + 'static,
{
    type Output = I::Item;
    type Failure = F;

    fn receive<S>(&self, subscriber: S)
    where
        S: Subscriber<Input = I::Item, Failure = F>,
    {
        Emitter::start(self.elements.clone().into_iter(), Completion::Finished, subscriber)
    }
}

struct EmitterState<I: Iterator, F> {
    elements: Option<Peekable<I>>,
    completion: Option<Completion<F>>,
    work: WorkLoop,
}

enum Emission<T, F> {
    Item(T),
    Completion(Completion<F>),
}

/// Subscription of the value sources: emits from an iterator on demand and delivers the
/// completion as soon as the iterator runs dry, whatever the outstanding demand.
pub(crate) struct Emitter<I: Iterator, F> {
    state: Mutex<EmitterState<I, F>>,
    downstream: Downstream<I::Item, F>,
}

impl<I, F> Emitter<I, F>
where
    I: Iterator + Send + 'static,
    I::Item: Send + 'static,
    F: Send + 'static,
{
    pub(crate) fn start<S>(elements: I, completion: Completion<F>, subscriber: S)
    where
        S: Subscriber<Input = I::Item, Failure = F>,
    {
        let emitter = Arc::new(Emitter {
            state: Mutex::new(EmitterState {
                elements: Some(elements.peekable()),
                completion: Some(completion),
                work: WorkLoop::default(),
            }),
            downstream: Downstream::new(subscriber),
        });
        // Demand granted while the subscription is being delivered only marks the loop;
        // emitting then would queue every item behind the subscription signal.
        emitter.state.lock().work.enter();
        emitter.downstream.subscribe(emitter.clone());
        emitter.state.lock().work.leave();
        emitter.drain();
    }

    fn drain(&self) {
        if !self.state.lock().work.enter() {
            return;
        }
        loop {
            let emission = {
                let mut state = self.state.lock();
                if !self.downstream.is_live() {
                    state.elements = None;
                    state.completion = None;
                    state.work.leave();
                    return;
                }
                let exhausted = match state.elements.as_mut() {
                    Some(elements) => elements.peek().is_none(),
                    None => true,
                };
                if exhausted {
                    state.elements = None;
                    state.work.leave();
                    match state.completion.take() {
                        Some(completion) => Emission::Completion(completion),
                        None => return,
                    }
                } else if self.downstream.has_demand() {
                    match state.elements.as_mut().and_then(Iterator::next) {
                        Some(item) => Emission::Item(item),
                        None => continue,
                    }
                } else if state.work.again() {
                    continue;
                } else {
                    return;
                }
            };
            match emission {
                Emission::Item(item) => {
                    self.downstream.send(item);
                }
                Emission::Completion(completion) => {
                    self.downstream.complete(completion);
                    return;
                }
            }
        }
    }
}

impl<I, F> Cancellable for Emitter<I, F>
where
    I: Iterator + Send + 'static,
    I::Item: Send + 'static,
    F: Send + 'static,
{
    fn cancel(&self) {
        self.downstream.cancel();
        let mut state = self.state.lock();
        state.elements = None;
        state.completion = None;
    }
}

impl<I, F> Subscription for Emitter<I, F>
where
    I: Iterator + Send + 'static,
    I::Item: Send + 'static,
    F: Send + 'static,
{
    fn request(&self, demand: Demand) {
        self.downstream.request(demand);
        self.drain();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::{testing::TestSubscriber, PublisherExt};

    #[test]
    fn sequence_emits_only_what_was_requested() {
        let (subscriber, monitor) = TestSubscriber::<u32, Never>::new(Demand::max(2));
        Sequence::new(vec![1, 2, 3]).receive(subscriber);
        assert_eq!(monitor.items(), vec![1, 2]);
        assert_eq!(monitor.completion(), None);

        monitor.request(Demand::max(1));
        assert_eq!(monitor.items(), vec![1, 2, 3]);
        assert_eq!(monitor.completion(), Some(Completion::Finished));
    }

    #[test]
    fn sequence_handles_one_for_one_reentrant_demand_without_recursing() {
        let (subscriber, monitor) = TestSubscriber::<u64, Never>::with_demand(
            Demand::max(1),
            Demand::max(1),
        );
        Sequence::new(0..100_000u64).receive(subscriber);
        assert_eq!(monitor.items().len(), 100_000);
        assert_eq!(monitor.completion(), Some(Completion::Finished));
    }

    #[test]
    fn unbounded_range_stops_on_cancel() {
        let (subscriber, monitor) = TestSubscriber::<u64, Never>::new(Demand::max(3));
        Sequence::new(0u64..).receive(subscriber);
        monitor.cancel();
        monitor.request(Demand::max(3));
        assert_eq!(monitor.items(), vec![0, 1, 2]);
        assert_eq!(monitor.completion(), None);
    }

    #[test]
    fn demand_granted_during_subscription_pulls_lazily() {
        let pulled = Arc::new(AtomicUsize::new(0));
        let counter = pulled.clone();
        let source = Sequence::new((0..2_000_000u64).map(move |n| {
            counter.fetch_add(1, Ordering::SeqCst);
            n
        }));
        let (subscriber, monitor) = TestSubscriber::<u64, Never>::unbounded();
        source.take(3).receive(subscriber);
        assert_eq!(monitor.items(), vec![0, 1, 2]);
        assert_eq!(monitor.completion(), Some(Completion::Finished));
        assert_eq!(pulled.load(Ordering::SeqCst), 3);
    }
}
