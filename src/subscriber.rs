use crate::{Completion, Demand, SubscriptionRef};

mod sink;
pub use sink::*;

/// Receives a subscription, then items, then at most one completion.
///
/// A subscriber drives the stream: nothing is delivered until it requests demand
/// through the subscription, and `receive` returns any additional demand granted in
/// response to the item (commonly `Demand::none()` or `Demand::max(1)`).
pub trait Subscriber: Send + 'static {
    type Input: Send + 'static;
    type Failure: Send + 'static;

    fn receive_subscription(&mut self, subscription: SubscriptionRef);

    fn receive(&mut self, input: Self::Input) -> Demand;

    fn receive_completion(&mut self, completion: Completion<Self::Failure>);
}

pub type AnySubscriber<I, F> = Box<dyn Subscriber<Input = I, Failure = F>>;

impl<I, F> Subscriber for Box<dyn Subscriber<Input = I, Failure = F>>
where
    I: Send + 'static,
    F: Send + 'static,
{
    type Input = I;
    type Failure = F;

    fn receive_subscription(&mut self, subscription: SubscriptionRef) {
        (**self).receive_subscription(subscription)
    }

    fn receive(&mut self, input: I) -> Demand {
        (**self).receive(input)
    }

    fn receive_completion(&mut self, completion: Completion<F>) {
        (**self).receive_completion(completion)
    }
}
