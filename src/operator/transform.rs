//! Generic 1:1 operator node.
//!
//! Downstream demand is forwarded upstream unit for unit. An item the step drops is
//! replaced by asking upstream for one more, so filtering never lowers the throughput
//! the downstream asked for.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::{
    node::{Downstream, UpstreamLink},
    Cancellable, Completion, Demand, Publisher, Subscriber, Subscription, SubscriptionRef,
};

/// What a step does with one upstream item.
pub(crate) enum Step<O, E> {
    Emit(O),
    /// Drop the item and ask upstream for a replacement.
    Skip,
    /// Cancel upstream and fail downstream.
    Fail(E),
    /// Emit the item, then cancel upstream and finish.
    Last(O),
}

/// Per-subscription state of a 1:1 operator.
pub(crate) trait Transform: Send + 'static {
    type Input: Send + 'static;
    type Output: Send + 'static;
    type UpstreamFailure: Send + 'static;
    type Failure: Send + 'static;

    /// Called once the upstream subscription is in place. Returning a completion ends
    /// the stream before anything is requested.
    fn start(&mut self) -> Option<Completion<Self::Failure>> {
        None
    }

    fn transform(&mut self, input: Self::Input) -> Step<Self::Output, Self::Failure>;

    fn complete(
        &mut self,
        completion: Completion<Self::UpstreamFailure>,
    ) -> Completion<Self::Failure>;
}

/// Subscribes `subscriber` to `upstream` through a node running `transform`.
pub(crate) fn attach<U, X, S>(upstream: &U, transform: X, subscriber: S)
where
    U: Publisher<Output = X::Input, Failure = X::UpstreamFailure>,
    X: Transform,
    S: Subscriber<Input = X::Output, Failure = X::Failure>,
{
    let node = Arc::new(TransformNode {
        transform: Mutex::new(Some(transform)),
        upstream: UpstreamLink::new(),
        downstream: Downstream::new(subscriber),
    });
    upstream.receive(TransformSubscriber { node });
}

struct TransformNode<X: Transform> {
    /// `None` once the stream ended on this node's side.
    transform: Mutex<Option<X>>,
    upstream: UpstreamLink,
    downstream: Downstream<X::Output, X::Failure>,
}

impl<X: Transform> TransformNode<X> {
    fn end(&self, completion: Completion<X::Failure>) {
        self.transform.lock().take();
        self.upstream.cancel();
        self.downstream.terminate(completion);
    }
}

impl<X: Transform> Cancellable for TransformNode<X> {
    fn cancel(&self) {
        self.upstream.cancel();
        self.downstream.cancel();
        self.transform.lock().take();
    }
}

impl<X: Transform> Subscription for TransformNode<X> {
    fn request(&self, demand: Demand) {
        self.downstream.request(demand);
        self.upstream.request(demand);
    }
}

struct TransformSubscriber<X: Transform> {
    node: Arc<TransformNode<X>>,
}

impl<X: Transform> Subscriber for TransformSubscriber<X> {
    type Input = X::Input;
    type Failure = X::UpstreamFailure;

    fn receive_subscription(&mut self, subscription: SubscriptionRef) {
        if !self.node.upstream.attach(subscription) {
            return;
        }
        let early = self
            .node
            .transform
            .lock()
            .as_mut()
            .and_then(|transform| transform.start());
        let granted = self.node.downstream.subscribe(self.node.clone());
        match early {
            Some(completion) => self.node.end(completion),
            None => self.node.upstream.request(granted),
        }
    }

    fn receive(&mut self, input: X::Input) -> Demand {
        let step = match self.node.transform.lock().as_mut() {
            Some(transform) => transform.transform(input),
            None => return Demand::none(),
        };
        match step {
            Step::Emit(output) => self.node.downstream.send(output),
            Step::Skip => Demand::max(1),
            Step::Fail(failure) => {
                self.node.end(Completion::Failed(failure));
                Demand::none()
            }
            Step::Last(output) => {
                self.node.transform.lock().take();
                self.node.upstream.cancel();
                self.node.downstream.send(output);
                self.node.downstream.terminate(Completion::Finished);
                Demand::none()
            }
        }
    }

    fn receive_completion(&mut self, completion: Completion<X::UpstreamFailure>) {
        if !self.node.upstream.finish() {
            return;
        }
        let transform = self.node.transform.lock().take();
        if let Some(mut transform) = transform {
            let completion = transform.complete(completion);
            self.node.downstream.complete(completion);
        }
    }
}
