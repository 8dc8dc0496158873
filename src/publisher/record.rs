use std::{iter, marker::PhantomData};

use super::sequence::Emitter;
use crate::{Completion, Never, Publisher, Subscriber};

/// Replays a fixed list of items followed by a fixed completion to every subscriber.
#[derive(Debug, Clone)]
pub struct Record<O, F> {
    items: Vec<O>,
    completion: Completion<F>,
}

impl<O, F> Record<O, F> {
    pub fn new(items: impl IntoIterator<Item = O>, completion: Completion<F>) -> Self {
        Self {
            items: items.into_iter().collect(),
            completion,
        }
    }
}

impl<O, F> Publisher for Record<O, F>
where
    O: Clone + Send + Sync + 'static,
    F: Clone + Send + Sync + 'static,
{
    type Output = O;
    type Failure = F;

    fn receive<S>(&self, subscriber: S)
    where
        S: Subscriber<Input = O, Failure = F>,
    {
        Emitter::start(
            self.items.clone().into_iter(),
            self.completion.clone(),
            subscriber,
        )
    }
}

/// Publishes a single value, then finishes.
#[derive(Debug, Clone)]
pub struct Just<T> {
    value: T,
}

impl<T> Just<T> {
    pub fn new(value: T) -> Self {
        Self { value }
    }
}

impl<T> Publisher for Just<T>
where
    T: Clone + Send + Sync + 'static,
{
    type Output = T;
    type Failure = Never;

    fn receive<S>(&self, subscriber: S)
    where
        S: Subscriber<Input = T, Failure = Never>,
    {
        Emitter::start(iter::once(self.value.clone()), Completion::Finished, subscriber)
    }
}

/// Finishes immediately without publishing anything.
#[derive(Debug)]
pub struct Empty<O, F = Never> {
    _types: PhantomData<fn() -> (O, F)>,
}

impl<O, F> Empty<O, F> {
    pub fn new() -> Self {
        Self {
            _types: PhantomData,
        }
    }
}

impl<O, F> Default for Empty<O, F> {
    fn default() -> Self {
        Self::new()
    }
}

impl<O, F> Clone for Empty<O, F> {
    fn clone(&self) -> Self {
        Self::new()
    }
}

impl<O, F> Publisher for Empty<O, F>
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
        Emitter::start(iter::empty(), Completion::Finished, subscriber)
    }
}

/// Fails immediately with a fixed failure.
#[derive(Debug, Clone)]
pub struct Fail<O, F> {
    failure: F,
    _output: PhantomData<fn() -> O>,
}

impl<O, F> Fail<O, F> {
    pub fn new(failure: F) -> Self {
        Self {
            failure,
            _output: PhantomData,
        }
    }
}

impl<O, F> Publisher for Fail<O, F>
where
    O: Send + 'static,
    F: Clone + Send + Sync + 'static,
{
    type Output = O;
    type Failure = F;

    fn receive<S>(&self, subscriber: S)
    where
        S: Subscriber<Input = O, Failure = F>,
    {
        Emitter::start(
            iter::empty(),
            Completion::Failed(self.failure.clone()),
            subscriber,
        )
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
    fn record_completes_after_its_items_even_without_further_demand() {
        let (subscriber, monitor) = TestSubscriber::<&str, String>::new(Demand::max(2));
        Record::new(["a", "b"], Completion::Failed("boom".to_string())).receive(subscriber);
        assert_eq!(
            monitor.events(),
            vec![
                Event::Subscribed,
                Event::Item("a"),
                Event::Item("b"),
                Event::Completed(Completion::Failed("boom".to_string())),
            ]
        );
    }

    #[test]
    fn empty_and_fail_terminate_without_demand() {
        let (subscriber, monitor) = TestSubscriber::<u8, Never>::new(Demand::none());
        Empty::new().receive(subscriber);
        assert_eq!(monitor.completion(), Some(Completion::Finished));

        let (subscriber, monitor) = TestSubscriber::<u8, u8>::new(Demand::none());
        Fail::new(9).receive(subscriber);
        assert_eq!(monitor.completion(), Some(Completion::Failed(9)));
    }

    #[test]
    fn just_waits_for_demand() {
        let (subscriber, monitor) = TestSubscriber::<u8, Never>::new(Demand::none());
        Just::new(4).receive(subscriber);
        assert_eq!(monitor.events(), vec![Event::Subscribed]);
        monitor.request(Demand::max(1));
        assert_eq!(monitor.items(), vec![4]);
        assert_eq!(monitor.completion(), Some(Completion::Finished));
    }
}
