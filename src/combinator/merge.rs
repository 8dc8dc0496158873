use std::{collections::VecDeque, mem, sync::Arc};

use parking_lot::Mutex;

use super::{Coordinator, Feed};
use crate::{
    node::{Downstream, UpstreamLink, WorkLoop},
    AnyPublisher, Cancellable, Completion, Demand, Prefetch, Publisher, Subscriber, Subscription,
};

/// Interleaves the items of several upstreams in arrival order.
///
/// Finishes once every upstream finished and the buffered items are delivered. Without
/// upstreams it finishes right away.
pub struct Merge<O, F> {
    upstreams: Vec<AnyPublisher<O, F>>,
    prefetch: Prefetch,
}

impl<O, F> Merge<O, F>
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

impl<O, F> Publisher for Merge<O, F>
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
        let node = Arc::new(MergeNode {
            prefetch: self.prefetch,
            links: self.upstreams.iter().map(|_| UpstreamLink::new()).collect(),
            downstream: Downstream::new(subscriber),
            state: Mutex::new(MergeState {
                buffer: VecDeque::new(),
                live: self.upstreams.len(),
                done: false,
                work: WorkLoop::default(),
            }),
        });
        node.downstream.subscribe(node.clone());
        for (side, upstream) in self.upstreams.iter().enumerate() {
            upstream.receive(Feed::new(node.clone(), side, MergeNode::accept));
        }
        node.drain();
    }
}

struct MergeState<O> {
    buffer: VecDeque<(usize, O)>,
    live: usize,
    done: bool,
    work: WorkLoop,
}

enum Release<O> {
    Item(usize, O),
    Finish,
}

struct MergeNode<O, F> {
    prefetch: Prefetch,
    links: Vec<UpstreamLink>,
    downstream: Downstream<O, F>,
    state: Mutex<MergeState<O>>,
}

impl<O, F> MergeNode<O, F>
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
                if !state.buffer.is_empty() && self.downstream.has_demand() {
                    match state.buffer.pop_front() {
                        Some((side, item)) => Release::Item(side, item),
                        None => continue,
                    }
                } else if state.buffer.is_empty() && state.live == 0 {
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
                Release::Item(side, item) => {
                    self.downstream.send(item);
                    self.links[side].request(self.prefetch.replenish());
                }
                Release::Finish => {
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
            state.buffer.push_back((side, item));
        }
        self.drain();
    }

    /// Stops everything; returns `false` if the node had already stopped.
    fn shut_down(&self) -> bool {
        let stale = {
            let mut state = self.state.lock();
            if state.done {
                return false;
            }
            state.done = true;
            mem::take(&mut state.buffer)
        };
        drop(stale);
        for link in &self.links {
            link.cancel();
        }
        true
    }
}

impl<O, F> Coordinator for MergeNode<O, F>
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

    fn finished(&self, _side: usize) {
        {
            let mut state = self.state.lock();
            state.live = state.live.saturating_sub(1);
        }
        self.drain();
    }

    fn fail(&self, failure: F) {
        if self.shut_down() {
            self.downstream.terminate(Completion::Failed(failure));
        }
    }
}


impl<O, F> Cancellable for MergeNode<O, F>
where
    O: Send + 'static,
    F: Send + 'static,
{
    fn cancel(&self) {
        self.shut_down();
        self.downstream.cancel();
    }
}

impl<O, F> Subscription for MergeNode<O, F>
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
        publisher::{Empty, Record, Sequence},
        testing::{Event, TestSubscriber},
        Never, PassthroughSubject, PublisherExt, Subject,
    };

    #[test]
    fn merge_finishes_after_every_upstream() {
        let first = PassthroughSubject::<u32>::new();
        let second = PassthroughSubject::<u32>::new();
        let (subscriber, monitor) = TestSubscriber::<u32, Never>::unbounded();
        first.clone().merge(second.clone()).receive(subscriber);

        first.send(1);
        second.send(2);
        first.send(3);
        first.send_completion(Completion::Finished);
        assert_eq!(monitor.completion(), None);

        second.send(4);
        second.send_completion(Completion::Finished);
        assert_eq!(monitor.items(), vec![1, 2, 3, 4]);
        assert_eq!(monitor.completion(), Some(Completion::Finished));
    }

    #[test]
    fn merge_buffers_until_downstream_asks() {
        let (subscriber, monitor) = TestSubscriber::<u32, Never>::new(Demand::max(1));
        Merge::new([
            Sequence::new(vec![1u32, 2]).any(),
            Sequence::new(vec![3u32]).any(),
        ])
        .receive(subscriber);
        assert_eq!(monitor.items(), vec![1]);

        monitor.request(Demand::max(5));
        assert_eq!(monitor.items(), vec![1, 2, 3]);
        assert_eq!(monitor.completion(), Some(Completion::Finished));
    }

    #[test]
    fn windowed_prefetch_limits_upstream_demand() {
        let (subscriber, monitor) = TestSubscriber::<u64, Never>::new(Demand::max(3));
        Merge::new([Sequence::new(0u64..).any(), Sequence::new(100u64..).any()])
            .with_prefetch(Prefetch::Window(2))
            .receive(subscriber);
        assert_eq!(monitor.items(), vec![0, 1, 2]);

        // Each upstream only runs two items ahead of what was released from it.
        monitor.request(Demand::max(4));
        assert_eq!(monitor.items(), vec![0, 1, 2, 3, 4, 100, 101]);
        monitor.cancel();
    }

    #[test]
    fn merge_fails_fast_and_cancels_the_rest() {
        let healthy = PassthroughSubject::<u32, String>::new();
        let (subscriber, monitor) = TestSubscriber::<u32, String>::unbounded();
        Merge::new([
            healthy.clone().any(),
            Record::new(vec![9u32], Completion::Failed("broken".to_string())).any(),
        ])
        .receive(subscriber);

        assert_eq!(healthy.subscriber_count(), 0);
        healthy.send(1);
        assert_eq!(
            monitor.events(),
            vec![
                Event::Subscribed,
                Event::Item(9),
                Event::Completed(Completion::Failed("broken".to_string())),
            ]
        );
    }

    #[test]
    fn merging_nothing_finishes_immediately() {
        let (subscriber, monitor) = TestSubscriber::<u32, Never>::new(Demand::none());
        Merge::new(Vec::<AnyPublisher<u32, Never>>::new()).receive(subscriber);
        assert_eq!(monitor.completion(), Some(Completion::Finished));

        let (subscriber, monitor) = TestSubscriber::<u32, Never>::unbounded();
        Merge::new([Empty::new().any(), Empty::new().any()]).receive(subscriber);
        assert_eq!(monitor.completion(), Some(Completion::Finished));
    }
}
