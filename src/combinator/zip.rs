use std::{collections::VecDeque, sync::Arc};

use parking_lot::Mutex;

use super::{Coordinator, Feed};
use crate::{
    node::{Downstream, UpstreamLink, WorkLoop},
    AnyPublisher, Cancellable, Completion, Demand, Prefetch, Publisher, Subscriber,
    Subscription,
};

/// Pairs the items of two upstreams in lock-step.
///
/// A pair is released once both sides have an unpaired item. The stream finishes as
/// soon as one side has finished and has nothing left to pair.
pub struct Zip<A, B> {
    left: A,
    right: B,
    prefetch: Prefetch,
}

impl<A, B> Zip<A, B> {
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

impl<A, B> Publisher for Zip<A, B>
where
    A: Publisher,
    B: Publisher<Failure = A::Failure>,
{
    type Output = (A::Output, B::Output);
    type Failure = A::Failure;

    fn receive<S>(&self, subscriber: S)
    where
        S: Subscriber<Input = Self::Output, Failure = A::Failure>,
    {
        let node = Arc::new(ZipNode {
            prefetch: self.prefetch,
            links: [UpstreamLink::new(), UpstreamLink::new()],
            downstream: Downstream::new(subscriber),
            state: Mutex::new(ZipState {
                left: VecDeque::new(),
                right: VecDeque::new(),
                finished: [false; 2],
                done: false,
                work: WorkLoop::default(),
            }),
        });
        node.downstream.subscribe(node.clone());
        self.left.receive(Feed::new(node.clone(), LEFT, ZipNode::accept_left));
        self.right.receive(Feed::new(node, RIGHT, ZipNode::accept_right));
    }
}

const LEFT: usize = 0;
const RIGHT: usize = 1;

struct ZipState<L, R> {
    left: VecDeque<L>,
    right: VecDeque<R>,
    finished: [bool; 2],
    done: bool,
    work: WorkLoop,
}

impl<L, R> ZipState<L, R> {
    fn exhausted(&self) -> bool {
        (self.finished[LEFT] && self.left.is_empty())
            || (self.finished[RIGHT] && self.right.is_empty())
    }
}

enum Release<T> {
    Pair(T),
    Finish,
}

struct ZipNode<L, R, F> {
    prefetch: Prefetch,
    links: [UpstreamLink; 2],
    downstream: Downstream<(L, R), F>,
    state: Mutex<ZipState<L, R>>,
}

impl<L, R, F> ZipNode<L, R, F>
where
    L: Send + 'static,
    R: Send + 'static,
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
                let paired = !state.left.is_empty() && !state.right.is_empty();
                if paired && self.downstream.has_demand() {
                    match (state.left.pop_front(), state.right.pop_front()) {
                        (Some(left), Some(right)) => Release::Pair((left, right)),
                        _ => continue,
                    }
                } else if !paired && state.exhausted() {
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
                    for link in &self.links {
                        link.request(self.prefetch.replenish());
                    }
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

    fn accept_left(&self, _side: usize, item: L) {
        {
            let mut state = self.state.lock();
            if state.done {
                return;
            }
            state.left.push_back(item);
        }
        self.drain();
    }

    fn accept_right(&self, _side: usize, item: R) {
        {
            let mut state = self.state.lock();
            if state.done {
                return;
            }
            state.right.push_back(item);
        }
        self.drain();
    }

    fn shut_down(&self) -> bool {
        let (left, right) = {
            let mut state = self.state.lock();
            if state.done {
                return false;
            }
            state.done = true;
            (
                std::mem::take(&mut state.left),
                std::mem::take(&mut state.right),
            )
        };
        drop((left, right));
        for link in &self.links {
            link.cancel();
        }
        true
    }
}

impl<L, R, F> Coordinator for ZipNode<L, R, F>
where
    L: Send + 'static,
    R: Send + 'static,
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

impl<L, R, F> Cancellable for ZipNode<L, R, F>
where
    L: Send + 'static,
    R: Send + 'static,
    F: Send + 'static,
{
    fn cancel(&self) {
        self.shut_down();
        self.downstream.cancel();
    }
}

impl<L, R, F> Subscription for ZipNode<L, R, F>
where
    L: Send + 'static,
    R: Send + 'static,
    F: Send + 'static,
{
    fn request(&self, demand: Demand) {
        self.downstream.request(demand);
        self.drain();
    }
}

/// Zips any number of upstreams of the same type in lock-step, emitting one vector per
/// round in upstream order.
///
/// Finishes as soon as one upstream has finished with nothing left to pair. Without
/// upstreams it finishes right away.
pub struct ZipAll<O, F> {
    upstreams: Vec<AnyPublisher<O, F>>,
    prefetch: Prefetch,
}

impl<O, F> ZipAll<O, F>
where
    O: Send + 'static,
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

impl<O, F> Publisher for ZipAll<O, F>
where
    O: Send + 'static,
    F: Send + 'static,
{
    type Output = Vec<O>;
    type Failure = F;

    fn receive<S>(&self, subscriber: S)
    where
        S: Subscriber<Input = Vec<O>, Failure = F>,
    {
        let width = self.upstreams.len();
        let node = Arc::new(ZipAllNode {
            prefetch: self.prefetch,
            links: self.upstreams.iter().map(|_| UpstreamLink::new()).collect(),
            downstream: Downstream::new(subscriber),
            state: Mutex::new(ZipAllState {
                queues: (0..width).map(|_| VecDeque::new()).collect(),
                finished: vec![false; width],
                done: false,
                work: WorkLoop::default(),
            }),
        });
        node.downstream.subscribe(node.clone());
        for (side, upstream) in self.upstreams.iter().enumerate() {
            upstream.receive(Feed::new(node.clone(), side, ZipAllNode::accept));
        }
        node.drain();
    }
}

struct ZipAllState<O> {
    queues: Vec<VecDeque<O>>,
    finished: Vec<bool>,
    done: bool,
    work: WorkLoop,
}

impl<O> ZipAllState<O> {
    fn paired(&self) -> bool {
        !self.queues.is_empty() && self.queues.iter().all(|queue| !queue.is_empty())
    }

    fn exhausted(&self) -> bool {
        self.queues.is_empty()
            || self
                .queues
                .iter()
                .zip(&self.finished)
                .any(|(queue, finished)| *finished && queue.is_empty())
    }
}

struct ZipAllNode<O, F> {
    prefetch: Prefetch,
    links: Vec<UpstreamLink>,
    downstream: Downstream<Vec<O>, F>,
    state: Mutex<ZipAllState<O>>,
}

impl<O, F> ZipAllNode<O, F>
where
    O: Send + 'static,
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
                let paired = state.paired();
                if paired && self.downstream.has_demand() {
                    let round: Option<Vec<O>> =
                        state.queues.iter_mut().map(VecDeque::pop_front).collect();
                    match round {
                        Some(round) => Release::Pair(round),
                        None => continue,
                    }
                } else if !paired && state.exhausted() {
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
                Release::Pair(round) => {
                    self.downstream.send(round);
                    for link in &self.links {
                        link.request(self.prefetch.replenish());
                    }
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
            state.queues[side].push_back(item);
        }
        self.drain();
    }

    fn shut_down(&self) -> bool {
        let stale = {
            let mut state = self.state.lock();
            if state.done {
                return false;
            }
            state.done = true;
            std::mem::take(&mut state.queues)
        };
        drop(stale);
        for link in &self.links {
            link.cancel();
        }
        true
    }
}

impl<O, F> Coordinator for ZipAllNode<O, F>
where
    O: Send + 'static,
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

impl<O, F> Cancellable for ZipAllNode<O, F>
where
    O: Send + 'static,
    F: Send + 'static,
{
    fn cancel(&self) {
        self.shut_down();
        self.downstream.cancel();
    }
}

impl<O, F> Subscription for ZipAllNode<O, F>
where
    O: Send + 'static,
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
        publisher::{Record, Sequence},
        testing::{Event, TestSubscriber},
        Never, PassthroughSubject, PublisherExt, Subject,
    };

    #[test]
    fn zip_stops_when_the_shorter_side_runs_out() {
        let (subscriber, monitor) = TestSubscriber::<(u32, &str), Never>::unbounded();
        Sequence::new(vec![1u32, 2, 3])
            .zip(Sequence::new(vec!["a", "b"]))
            .receive(subscriber);
        assert_eq!(
            monitor.events(),
            vec![
                Event::Subscribed,
                Event::Item((1, "a")),
                Event::Item((2, "b")),
                Event::Completed(Completion::Finished),
            ]
        );
    }

    #[test]
    fn zip_waits_for_both_sides_and_for_demand() {
        let left = PassthroughSubject::<u32>::new();
        let right = PassthroughSubject::<u32>::new();
        let (subscriber, monitor) = TestSubscriber::<(u32, u32), Never>::new(Demand::none());
        left.clone().zip(right.clone()).receive(subscriber);

        left.send(1);
        left.send(2);
        right.send(10);
        assert_eq!(monitor.items(), vec![]);

        monitor.request(Demand::max(1));
        assert_eq!(monitor.items(), vec![(1, 10)]);

        left.send_completion(Completion::Finished);
        right.send(20);
        assert_eq!(monitor.completion(), None);
        monitor.request(Demand::max(1));
        assert_eq!(monitor.items(), vec![(1, 10), (2, 20)]);
        assert_eq!(monitor.completion(), Some(Completion::Finished));
        assert_eq!(right.subscriber_count(), 0);
    }

    #[test]
    fn zip_fails_fast() {
        let (subscriber, monitor) = TestSubscriber::<(u32, u32), &str>::unbounded();
        Record::new(vec![1u32, 2], Completion::Failed("left"))
            .zip(Sequence::with_failure_type(0u32..))
            .receive(subscriber);
        assert_eq!(monitor.completion(), Some(Completion::Failed("left")));
        assert_eq!(monitor.items(), vec![]);
    }

    #[test]
    fn failure_on_one_side_cancels_the_other() {
        let left = PassthroughSubject::<u32, &str>::new();
        let right = PassthroughSubject::<u32, &str>::new();
        let (subscriber, monitor) = TestSubscriber::<(u32, u32), &str>::unbounded();
        left.clone().zip(right.clone()).receive(subscriber);
        assert_eq!(right.subscriber_count(), 1);

        left.send(1);
        left.send_completion(Completion::Failed("left"));
        assert_eq!(monitor.completion(), Some(Completion::Failed("left")));
        assert_eq!(right.subscriber_count(), 0);
        right.send(10);
        assert_eq!(monitor.items(), vec![]);
    }

    #[test]
    fn zip_all_emits_rounds_in_upstream_order() {
        let (subscriber, monitor) = TestSubscriber::<Vec<u32>, Never>::unbounded();
        ZipAll::new([
            Sequence::new(vec![1u32, 2, 3]).any(),
            Sequence::new(vec![10u32, 20]).any(),
            Sequence::new(vec![100u32, 200, 300]).any(),
        ])
        .receive(subscriber);
        assert_eq!(monitor.items(), vec![vec![1, 10, 100], vec![2, 20, 200]]);
        assert_eq!(monitor.completion(), Some(Completion::Finished));
    }

    #[test]
    fn zip_all_honours_demand_and_finishes_without_upstreams() {
        let inputs: Vec<_> = (0..3).map(|_| PassthroughSubject::<u32>::new()).collect();
        let (subscriber, monitor) = TestSubscriber::<Vec<u32>, Never>::new(Demand::none());
        ZipAll::new(inputs.iter().map(|input| input.clone().any())).receive(subscriber);
        for (n, input) in inputs.iter().enumerate() {
            input.send(n as u32);
        }
        assert_eq!(monitor.items(), Vec::<Vec<u32>>::new());
        monitor.request(Demand::max(1));
        assert_eq!(monitor.items(), vec![vec![0, 1, 2]]);

        let (subscriber, monitor) = TestSubscriber::<Vec<u32>, Never>::unbounded();
        ZipAll::<u32, Never>::new([]).receive(subscriber);
        assert_eq!(
            monitor.events(),
            vec![Event::Subscribed, Event::Completed(Completion::Finished)]
        );
    }

    #[test]
    fn zip_all_fails_fast_and_cancels_every_survivor() {
        let inputs: Vec<_> = (0..3)
            .map(|_| PassthroughSubject::<u32, &str>::new())
            .collect();
        let (subscriber, monitor) = TestSubscriber::<Vec<u32>, &str>::unbounded();
        ZipAll::new(inputs.iter().map(|input| input.clone().any())).receive(subscriber);

        inputs[0].send(1);
        inputs[1].send_completion(Completion::Failed("middle"));
        assert_eq!(monitor.completion(), Some(Completion::Failed("middle")));
        assert!(inputs.iter().all(|input| input.subscriber_count() == 0));
    }
}
