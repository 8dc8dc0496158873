use std::sync::Arc;

use parking_lot::Mutex;

use super::{Coordinator, Feed};
use crate::{
    node::{Downstream, UpstreamLink, WorkLoop},
    AnyPublisher, Cancellable, Completion, Demand, Prefetch, Publisher, Subscriber,
    Subscription,
};

/// Emits the latest item of each upstream whenever either of them produces one, once
/// both have produced at least one.
///
/// Latest wins: items arriving while downstream has no demand collapse into a single
/// pending emission of the values current when demand arrives. Finishes when both
/// upstreams finished, or as soon as one finishes without ever producing an item.
pub struct CombineLatest<A, B> {
    left: A,
    right: B,
    prefetch: Prefetch,
}

impl<A, B> CombineLatest<A, B> {
    pub fn new(left: A, right: B) -> Self {
        Self {
            left,
            right,
            prefetch: Prefetch::default(),
        }
    }

    pub fn with_prefetch(mut self, prefetch: Prefetch) -> Self {
        self.prefetch = prefetch;
        self
    }
}

impl<A, B> Publisher for CombineLatest<A, B>
where
    A: Publisher,
    B: Publisher<Failure = A::Failure>,
    A::Output: Clone,
    B::Output: Clone,
{
    type Output = (A::Output, B::Output);
    type Failure = A::Failure;

    fn receive<S>(&self, subscriber: S)
    where
        S: Subscriber<Input = Self::Output, Failure = A::Failure>,
    {
        let node = Arc::new(LatestNode {
            prefetch: self.prefetch,
            links: [UpstreamLink::new(), UpstreamLink::new()],
            downstream: Downstream::new(subscriber),
            state: Mutex::new(LatestState {
                left: None,
                right: None,
                dirty: false,
                finished: [false; 2],
                done: false,
                work: WorkLoop::default(),
            }),
        });
        node.downstream.subscribe(node.clone());
        self.left.receive(Feed::new(node.clone(), LEFT, LatestNode::accept_left));
        self.right.receive(Feed::new(node, RIGHT, LatestNode::accept_right));
    }
}

const LEFT: usize = 0;
const RIGHT: usize = 1;

struct LatestState<L, R> {
    left: Option<L>,
    right: Option<R>,
    /// A combination newer than the last one emitted is waiting.
    dirty: bool,
    finished: [bool; 2],
    done: bool,
    work: WorkLoop,
}

impl<L, R> LatestState<L, R> {
    fn exhausted(&self) -> bool {
        let starved = (self.finished[LEFT] && self.left.is_none())
            || (self.finished[RIGHT] && self.right.is_none());
        starved || (self.finished[LEFT] && self.finished[RIGHT] && !self.dirty)
    }
}

enum Release<T> {
    Pair(T),
    Finish,
}

struct LatestNode<L, R, F> {
    prefetch: Prefetch,
    links: [UpstreamLink; 2],
    downstream: Downstream<(L, R), F>,
    state: Mutex<LatestState<L, R>>,
}

impl<L, R, F> LatestNode<L, R, F>
where
    L: Clone + Send + 'static,
    R: Clone + Send + 'static,
    F: Send + 'static,
{
    fn drain(&self) {
        if !self.state.lock().work.enter() {
            return;
        }
        loop {
            let release = {
                let mut state = self.state.lock();
                if state.done {
                    state.work.leave();
                    return;
                }
                if state.dirty && self.downstream.has_demand() {
                    state.dirty = false;
                    match (state.left.clone(), state.right.clone()) {
                        (Some(left), Some(right)) => Release::Pair((left, right)),
                        _ => continue,
                    }
                } else if state.exhausted() {
                    state.done = true;
                    state.work.leave();
                    Release::Finish
                } else if state.work.again() {
                    continue;
                } else {
                    return;
                }
            };
            match release {
                Release::Pair(pair) => {
                    self.downstream.send(pair);
                }
                Release::Finish => {
                    for link in &self.links {
                        link.cancel();
                    }
                    self.downstream.complete(Completion::Finished);
                    return;
                }
            }
        }
    }

    fn accept_left(&self, side: usize, item: L) {
        {
            let mut state = self.state.lock();
            if state.done {
                return;
            }
            state.left = Some(item);
            state.dirty = state.right.is_some();
        }
        self.consumed(side);
    }

    fn accept_right(&self, side: usize, item: R) {
        {
            let mut state = self.state.lock();
            if state.done {
                return;
            }
            state.right = Some(item);
            state.dirty = state.left.is_some();
        }
        self.consumed(side);
    }

    /// Items are absorbed on arrival, so the prefetch window refills right away.
    fn consumed(&self, side: usize) {
        self.drain();
        self.links[side].request(self.prefetch.replenish());
    }

    fn shut_down(&self) -> bool {
        let (left, right) = {
            let mut state = self.state.lock();
            if state.done {
                return false;
            }
            state.done = true;
            (state.left.take(), state.right.take())
        };
        drop((left, right));
        for link in &self.links {
            link.cancel();
        }
        true
    }
}

impl<L, R, F> Coordinator for LatestNode<L, R, F>
where
    L: Clone + Send + 'static,
    R: Clone + Send + 'static,
    F: Send + 'static,
{
    type Failure = F;

    fn link(&self, side: usize) -> &UpstreamLink {
        &self.links[side]
    }

    fn prefetch(&self) -> Prefetch {
        self.prefetch
    }

    fn finished(&self, side: usize) {
        self.state.lock().finished[side] = true;
        self.drain();
    }

    fn fail(&self, failure: F) {
        if self.shut_down() {
            self.downstream.terminate(Completion::Failed(failure));
        }
    }
}

impl<L, R, F> Cancellable for LatestNode<L, R, F>
where
    L: Clone + Send + 'static,
    R: Clone + Send + 'static,
    F: Send + 'static,
{
    fn cancel(&self) {
        self.shut_down();
        self.downstream.cancel();
    }
}

impl<L, R, F> Subscription for LatestNode<L, R, F>
where
    L: Clone + Send + 'static,
    R: Clone + Send + 'static,
    F: Send + 'static,
{
    fn request(&self, demand: Demand) {
        self.downstream.request(demand);
        self.drain();
    }
}

/// Combines the latest items of any number of upstreams of the same type, emitting one
/// vector in upstream order whenever any of them produces, once all have produced.
///
/// Same latest-wins and completion rules as [`CombineLatest`]. Without upstreams it
/// finishes right away.
pub struct CombineLatestAll<O, F> {
    upstreams: Vec<AnyPublisher<O, F>>,
    prefetch: Prefetch,
}

impl<O, F> CombineLatestAll<O, F>
where
    O: Clone + Send + 'static,
    F: Send + 'static,
{
    pub fn new(upstreams: impl IntoIterator<Item = AnyPublisher<O, F>>) -> Self {
        Self {
            upstreams: upstreams.into_iter().collect(),
            prefetch: Prefetch::default(),
        }
    }

    pub fn with_prefetch(mut self, prefetch: Prefetch) -> Self {
        self.prefetch = prefetch;
        self
    }
}

impl<O, F> Publisher for CombineLatestAll<O, F>
where
    O: Clone + Send + 'static,
    F: Send + 'static,
{
    type Output = Vec<O>;
    type Failure = F;

    fn receive<S>(&self, subscriber: S)
    where
        S: Subscriber<Input = Vec<O>, Failure = F>,
    {
        let width = self.upstreams.len();
        let node = Arc::new(LatestAllNode {
            prefetch: self.prefetch,
            links: self.upstreams.iter().map(|_| UpstreamLink::new()).collect(),
            downstream: Downstream::new(subscriber),
            state: Mutex::new(LatestAllState {
                latest: vec![None; width],
                dirty: false,
                finished: vec![false; width],
                done: false,
                work: WorkLoop::default(),
            }),
        });
        node.downstream.subscribe(node.clone());
        for (side, upstream) in self.upstreams.iter().enumerate() {
            upstream.receive(Feed::new(node.clone(), side, LatestAllNode::accept));
        }
        node.drain();
    }
}

struct LatestAllState<O> {
    latest: Vec<Option<O>>,
    dirty: bool,
    finished: Vec<bool>,
    done: bool,
    work: WorkLoop,
}

impl<O> LatestAllState<O> {
    fn exhausted(&self) -> bool {
        let starved = self
            .latest
            .iter()
            .zip(&self.finished)
            .any(|(latest, finished)| *finished && latest.is_none());
        self.latest.is_empty()
            || starved
            || (self.finished.iter().all(|finished| *finished) && !self.dirty)
    }
}

struct LatestAllNode<O, F> {
    prefetch: Prefetch,
    links: Vec<UpstreamLink>,
    downstream: Downstream<Vec<O>, F>,
    state: Mutex<LatestAllState<O>>,
}

impl<O, F> LatestAllNode<O, F>
where
    O: Clone + Send + 'static,
    F: Send + 'static,
{
    fn drain(&self) {
        if !self.state.lock().work.enter() {
            return;
        }
        loop {
            let release = {
                let mut state = self.state.lock();
                if state.done {
                    state.work.leave();
                    return;
                }
                if state.dirty && self.downstream.has_demand() {
                    state.dirty = false;
                    match state.latest.iter().cloned().collect::<Option<Vec<O>>>() {
                        Some(values) => Release::Pair(values),
                        None => continue,
                    }
                } else if state.exhausted() {
                    state.done = true;
                    state.work.leave();
                    Release::Finish
                } else if state.work.again() {
                    continue;
                } else {
                    return;
                }
            };
            match release {
                Release::Pair(values) => {
                    self.downstream.send(values);
                }
                Release::Finish => {
                    for link in &self.links {
                        link.cancel();
                    }
                    self.downstream.complete(Completion::Finished);
                    return;
                }
            }
        }
    }

    fn accept(&self, side: usize, item: O) {
        {
            let mut state = self.state.lock();
            if state.done {
                return;
            }
            state.latest[side] = Some(item);
            state.dirty = state.latest.iter().all(Option::is_some);
        }
        self.drain();
        self.links[side].request(self.prefetch.replenish());
    }

    fn shut_down(&self) -> bool {
        let stale = {
            let mut state = self.state.lock();
            if state.done {
                return false;
            }
            state.done = true;
            std::mem::take(&mut state.latest)
        };
        drop(stale);
        for link in &self.links {
            link.cancel();
        }
        true
    }
}

impl<O, F> Coordinator for LatestAllNode<O, F>
where
    O: Clone + Send + 'static,
    F: Send + 'static,
{
    type Failure = F;

    fn link(&self, side: usize) -> &UpstreamLink {
        &self.links[side]
    }

    fn prefetch(&self) -> Prefetch {
        self.prefetch
    }

    fn finished(&self, side: usize) {
        {
            let mut state = self.state.lock();
            if let Some(finished) = state.finished.get_mut(side) {
                *finished = true;
            }
        }
        self.drain();
    }

    fn fail(&self, failure: F) {
        if self.shut_down() {
            self.downstream.terminate(Completion::Failed(failure));
        }
    }
}

impl<O, F> Cancellable for LatestAllNode<O, F>
where
    O: Clone + Send + 'static,
    F: Send + 'static,
{
    fn cancel(&self) {
        self.shut_down();
        self.downstream.cancel();
    }
}

impl<O, F> Subscription for LatestAllNode<O, F>
where
    O: Clone + Send + 'static,
    F: Send + 'static,
{
    fn request(&self, demand: Demand) {
        self.downstream.request(demand);
        self.drain();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        publisher::{Empty, Sequence},
        testing::{Event, TestSubscriber},
        Never, PassthroughSubject, PublisherExt, Subject,
    };

    #[test]
    fn emits_once_both_sides_have_a_value() {
        let (subscriber, monitor) = TestSubscriber::<(u32, &str), Never>::unbounded();
        Sequence::new(vec![1u32, 2])
            .combine_latest(Sequence::new(vec!["x"]))
            .receive(subscriber);
        assert_eq!(
            monitor.events(),
            vec![
                Event::Subscribed,
                Event::Item((2, "x")),
                Event::Completed(Completion::Finished),
            ]
        );
    }

    #[test]
    fn every_new_item_emits_with_the_other_sides_latest() {
        let numbers = PassthroughSubject::<u32>::new();
        let letters = PassthroughSubject::<char>::new();
        let (subscriber, monitor) = TestSubscriber::<(u32, char), Never>::unbounded();
        numbers.clone().combine_latest(letters.clone()).receive(subscriber);

        numbers.send(1);
        letters.send('a');
        letters.send('b');
        numbers.send(2);
        assert_eq!(monitor.items(), vec![(1, 'a'), (1, 'b'), (2, 'b')]);

        numbers.send_completion(Completion::Finished);
        letters.send('c');
        assert_eq!(monitor.completion(), None);
        letters.send_completion(Completion::Finished);
        assert_eq!(monitor.items().last(), Some(&(2, 'c')));
        assert_eq!(monitor.completion(), Some(Completion::Finished));
    }

    #[test]
    fn arrivals_without_demand_collapse_to_the_latest() {
        let numbers = PassthroughSubject::<u32>::new();
        let letters = PassthroughSubject::<char>::new();
        let (subscriber, monitor) = TestSubscriber::<(u32, char), Never>::new(Demand::none());
        numbers.clone().combine_latest(letters.clone()).receive(subscriber);

        numbers.send(1);
        letters.send('a');
        numbers.send(2);
        numbers.send(3);
        monitor.request(Demand::max(5));
        assert_eq!(monitor.items(), vec![(3, 'a')]);
    }

    #[test]
    fn a_side_finishing_empty_ends_the_stream() {
        let numbers = PassthroughSubject::<u32>::new();
        let (subscriber, monitor) = TestSubscriber::<(u32, u8), Never>::unbounded();
        numbers
            .clone()
            .combine_latest(Empty::<u8>::new())
            .receive(subscriber);
        assert_eq!(monitor.completion(), Some(Completion::Finished));
        assert_eq!(numbers.subscriber_count(), 0);
    }

    #[test]
    fn failure_on_one_side_cancels_the_other() {
        let numbers = PassthroughSubject::<u32, &str>::new();
        let letters = PassthroughSubject::<char, &str>::new();
        let (subscriber, monitor) = TestSubscriber::<(u32, char), &str>::unbounded();
        numbers.clone().combine_latest(letters.clone()).receive(subscriber);

        numbers.send(1);
        letters.send('a');
        letters.send_completion(Completion::Failed("letters"));
        assert_eq!(
            monitor.events(),
            vec![
                Event::Subscribed,
                Event::Item((1, 'a')),
                Event::Completed(Completion::Failed("letters")),
            ]
        );
        assert_eq!(numbers.subscriber_count(), 0);
    }

    #[test]
    fn combine_latest_all_tracks_every_upstream() {
        let inputs: Vec<_> = (0..3).map(|_| PassthroughSubject::<u32>::new()).collect();
        let (subscriber, monitor) = TestSubscriber::<Vec<u32>, Never>::unbounded();
        CombineLatestAll::new(inputs.iter().map(|input| input.clone().any()))
            .receive(subscriber);

        inputs[0].send(1);
        inputs[1].send(10);
        assert_eq!(monitor.items(), Vec::<Vec<u32>>::new());
        inputs[2].send(100);
        inputs[1].send(20);
        assert_eq!(monitor.items(), vec![vec![1, 10, 100], vec![1, 20, 100]]);

        for input in &inputs {
            input.send_completion(Completion::Finished);
        }
        assert_eq!(monitor.completion(), Some(Completion::Finished));
    }

    #[test]
    fn combine_latest_all_ends_when_an_upstream_finishes_empty() {
        let first = PassthroughSubject::<u32>::new();
        let (subscriber, monitor) = TestSubscriber::<Vec<u32>, Never>::unbounded();
        CombineLatestAll::new([first.clone().any(), Empty::<u32>::new().any()])
            .receive(subscriber);
        assert_eq!(monitor.completion(), Some(Completion::Finished));
        assert_eq!(first.subscriber_count(), 0);

        let (subscriber, monitor) = TestSubscriber::<Vec<u32>, Never>::unbounded();
        CombineLatestAll::<u32, Never>::new([]).receive(subscriber);
        assert_eq!(monitor.completion(), Some(Completion::Finished));
    }

    #[test]
    fn combine_latest_all_fails_fast_and_cancels_every_survivor() {
        let inputs: Vec<_> = (0..3)
            .map(|_| PassthroughSubject::<u32, &str>::new())
            .collect();
        let (subscriber, monitor) = TestSubscriber::<Vec<u32>, &str>::unbounded();
        CombineLatestAll::new(inputs.iter().map(|input| input.clone().any()))
            .receive(subscriber);

        inputs[2].send_completion(Completion::Failed("last"));
        assert_eq!(monitor.completion(), Some(Completion::Failed("last")));
        assert!(inputs.iter().all(|input| input.subscriber_count() == 0));
    }
}
