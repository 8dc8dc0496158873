use std::sync::Arc;

use crate::{
    subscription::SubscriptionSlot, AnyCancellable, Completion, Demand, Subscriber,
    SubscriptionRef,
};

type ValueHandler<I> = Box<dyn FnMut(I) + Send>;
type CompletionHandler<F> = Box<dyn FnOnce(Completion<F>) + Send>;

/// Terminal subscriber that requests unbounded demand and hands every signal to a
/// closure.
pub struct Sink<I, F> {
    on_value: ValueHandler<I>,
    on_completion: Option<CompletionHandler<F>>,
    slot: Arc<SubscriptionSlot>,
}

impl<I, F> Sink<I, F>
where
    I: Send + 'static,
    F: Send + 'static,
{
    /// Creates the sink together with the handle that cancels it.
    pub fn new<C, V>(on_completion: C, on_value: V) -> (Self, AnyCancellable)
    where
        C: FnOnce(Completion<F>) + Send + 'static,
        V: FnMut(I) + Send + 'static,
    {
        let slot = Arc::new(SubscriptionSlot::new());
        let sink = Sink {
            on_value: Box::new(on_value),
            on_completion: Some(Box::new(on_completion)),
            slot: slot.clone(),
        };
        (sink, AnyCancellable::new(slot))
    }
}

impl<I, F> Subscriber for Sink<I, F>
where
    I: Send + 'static,
    F: Send + 'static,
{
    type Input = I;
    type Failure = F;

    fn receive_subscription(&mut self, subscription: SubscriptionRef) {
        if self.slot.set(subscription) {
            self.slot.request(Demand::Unbounded);
        }
    }

    fn receive(&mut self, input: I) -> Demand {
        if !self.slot.is_cancelled() {
            (self.on_value)(input);
        }
        Demand::none()
    }

    fn receive_completion(&mut self, completion: Completion<F>) {
        self.slot.clear();
        if let Some(on_completion) = self.on_completion.take() {
            on_completion(completion);
        }
    }
}
