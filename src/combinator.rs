//! Operators that combine several upstreams into one stream.
//!
//! The coordinators request from each upstream according to their [`Prefetch`] policy,
//! independently of downstream demand, and buffer what arrives; downstream demand only
//! governs how many combined items are released. Any upstream failure cancels the other
//! upstreams and fails the stream at once.

use std::sync::Arc;

use crate::{node::UpstreamLink, Completion, Demand, Prefetch, Subscriber, SubscriptionRef};

mod combine_latest;
mod merge;
mod zip;

pub use combine_latest::*;
pub use merge::*;
pub use zip::*;

/// The shared side of a multi-upstream node.
pub(crate) trait Coordinator: Send + Sync + 'static {
    type Failure: Send + 'static;

    fn link(&self, side: usize) -> &UpstreamLink;

    fn prefetch(&self) -> Prefetch;

    /// Upstream `side` finished.
    fn finished(&self, side: usize);

    /// Some upstream failed.
    fn fail(&self, failure: Self::Failure);
}

/// Subscriber feeding one upstream into a coordinator; `accept` takes its items.
pub(crate) struct Feed<N, T> {
    node: Arc<N>,
    side: usize,
    accept: fn(&N, usize, T),
}

impl<N, T> Feed<N, T> {
    pub(crate) fn new(node: Arc<N>, side: usize, accept: fn(&N, usize, T)) -> Self {
        Self { node, side, accept }
    }
}

impl<N, T> Subscriber for Feed<N, T>
where
    N: Coordinator,
    T: Send + 'static,
{
    type Input = T;
    type Failure = N::Failure;

    fn receive_subscription(&mut self, subscription: SubscriptionRef) {
        let link = self.node.link(self.side);
        if link.attach(subscription) {
            link.request(self.node.prefetch().initial());
        }
    }

    fn receive(&mut self, input: T) -> Demand {
        (self.accept)(&self.node, self.side, input);
        Demand::none()
    }

    fn receive_completion(&mut self, completion: Completion<N::Failure>) {
        if !self.node.link(self.side).finish() {
            return;
        }
        match completion {
            Completion::Finished => self.node.finished(self.side),
            Completion::Failed(failure) => {
                log::debug!("upstream {} failed; cancelling the others", self.side);
                self.node.fail(failure)
            }
        }
    }
}
