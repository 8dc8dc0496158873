use std::{marker::PhantomData, sync::Arc};

use parking_lot::Mutex;

use crate::{
    node::Downstream, Cancellable, Completion, Demand, Publisher, Subscriber, Subscription,
    SubscriptionRef,
};

/// Replaces a failed upstream with the publisher the handler builds from the failure.
///
/// The replacement continues the stream: its items follow the items already delivered,
/// and demand the subscriber has not used up is requested from it.
pub struct Catch<U, H> {
    upstream: U,
    handler: Arc<H>,
}

impl<U, H> Catch<U, H> {
    pub(crate) fn new(upstream: U, handler: H) -> Self {
        Self {
            upstream,
            handler: Arc::new(handler),
        }
    }
}

impl<U, H, P> Publisher for Catch<U, H>
where
    U: Publisher,
    H: Fn(U::Failure) -> P + Send + Sync + 'static,
    P: Publisher<Output = U::Output>,
{
    type Output = U::Output;
    type Failure = P::Failure;

    fn receive<S>(&self, subscriber: S)
    where
        S: Subscriber<Input = U::Output, Failure = P::Failure>,
    {
        let node = Arc::new(CatchNode {
            handler: self.handler.clone(),
            downstream: Downstream::new(subscriber),
            state: Mutex::new(CatchState {
                stage: Stage::Primary,
                current: None,
                outstanding: Demand::none(),
            }),
        });
        node.downstream.subscribe(node.clone());
        self.upstream.receive(PrimarySubscriber {
            node,
            _failure: PhantomData,
        });
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Primary,
    Fallback,
    Done,
}

struct CatchState {
    stage: Stage,
    current: Option<SubscriptionRef>,
    outstanding: Demand,
}

struct CatchNode<H, O, E> {
    handler: Arc<H>,
    downstream: Downstream<O, E>,
    state: Mutex<CatchState>,
}

impl<H, O, E> CatchNode<H, O, E>
where
    H: Send + Sync + 'static,
    O: Send + 'static,
    E: Send + 'static,
{
    fn attach(&self, stage: Stage, subscription: SubscriptionRef) {
        let outstanding = {
            let mut state = self.state.lock();
            if state.stage != stage || state.current.is_some() {
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

    fn forward(&self, stage: Stage, item: O) -> Demand {
        {
            let mut state = self.state.lock();
            if state.stage != stage {
                return Demand::none();
            }
            state.outstanding.consume_one();
        }
        let granted = self.downstream.send(item);
        if granted.has_demand() {
            self.state.lock().outstanding += granted;
        }
        granted
    }

    /// Moves from `from` to `to`; `false` if the node was no longer in `from`.
    fn advance(&self, from: Stage, to: Stage) -> bool {
        let mut state = self.state.lock();
        if state.stage != from {
            return false;
        }
        state.stage = to;
        state.current = None;
        true
    }
}

impl<H, O, E> Cancellable for CatchNode<H, O, E>
where
    H: Send + Sync + 'static,
    O: Send + 'static,
    E: Send + 'static,
{
    fn cancel(&self) {
        let current = {
            let mut state = self.state.lock();
            state.stage = Stage::Done;
            state.current.take()
        };
        if let Some(subscription) = current {
            subscription.cancel();
        }
        self.downstream.cancel();
    }
}

impl<H, O, E> Subscription for CatchNode<H, O, E>
where
    H: Send + Sync + 'static,
    O: Send + 'static,
    E: Send + 'static,
{
    fn request(&self, demand: Demand) {
        self.downstream.request(demand);
        let current = {
            let mut state = self.state.lock();
            if state.stage == Stage::Done {
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

struct PrimarySubscriber<H, P: Publisher, E> {
    node: Arc<CatchNode<H, P::Output, P::Failure>>,
    _failure: PhantomData<fn(E)>,
}

impl<H, P, E> Subscriber for PrimarySubscriber<H, P, E>
where
    H: Fn(E) -> P + Send + Sync + 'static,
    P: Publisher,
    E: Send + 'static,
{
    type Input = P::Output;
    type Failure = E;

    fn receive_subscription(&mut self, subscription: SubscriptionRef) {
        self.node.attach(Stage::Primary, subscription);
    }

    fn receive(&mut self, input: P::Output) -> Demand {
        self.node.forward(Stage::Primary, input)
    }

    fn receive_completion(&mut self, completion: Completion<E>) {
        match completion {
            Completion::Finished => {
                if self.node.advance(Stage::Primary, Stage::Done) {
                    self.node.downstream.complete(Completion::Finished);
                }
            }
            Completion::Failed(failure) => {
                if self.node.advance(Stage::Primary, Stage::Fallback) {
                    log::debug!("upstream failed; switching to the replacement publisher");
                    let replacement = (self.node.handler)(failure);
                    replacement.receive(FallbackSubscriber {
                        node: self.node.clone(),
                    });
                }
            }
        }
    }
}

struct FallbackSubscriber<H, O, E> {
    node: Arc<CatchNode<H, O, E>>,
}

impl<H, O, E> Subscriber for FallbackSubscriber<H, O, E>
where
    H: Send + Sync + 'static,
    O: Send + 'static,
    E: Send + 'static,
{
    type Input = O;
    type Failure = E;

    fn receive_subscription(&mut self, subscription: SubscriptionRef) {
        self.node.attach(Stage::Fallback, subscription);
    }

    fn receive(&mut self, input: O) -> Demand {
        self.node.forward(Stage::Fallback, input)
    }

    fn receive_completion(&mut self, completion: Completion<E>) {
        if self.node.advance(Stage::Fallback, Stage::Done) {
            self.node.downstream.complete(completion);
        }
    }
}
