use std::sync::Arc;

use super::Subject;
use crate::{
    subscription::SubscriptionSlot, AnyCancellable, Completion, Demand, Subscriber,
    SubscriptionRef,
};

/// Feeds everything a publisher produces into a subject.
///
/// Requests unbounded demand: the subject decides per subscriber what is delivered,
/// missed or held.
pub struct SubjectSubscriber<S> {
    subject: S,
    slot: Arc<SubscriptionSlot>,
}

impl<S: Subject> SubjectSubscriber<S> {
    /// Creates the subscriber together with the handle that disconnects it.
    pub fn new(subject: S) -> (Self, AnyCancellable) {
        let slot = Arc::new(SubscriptionSlot::new());
        let subscriber = SubjectSubscriber {
            subject,
            slot: slot.clone(),
        };
        (subscriber, AnyCancellable::new(slot))
    }
}

impl<S: Subject> Subscriber for SubjectSubscriber<S> {
    type Input = S::Output;
    type Failure = S::Failure;

    fn receive_subscription(&mut self, subscription: SubscriptionRef) {
        if self.slot.set(subscription) {
            self.slot.request(Demand::Unbounded);
        }
    }

    fn receive(&mut self, input: S::Output) -> Demand {
        if !self.slot.is_cancelled() {
            self.subject.send(input);
        }
        Demand::none()
    }

    fn receive_completion(&mut self, completion: Completion<S::Failure>) {
        self.slot.clear();
        if !self.slot.is_cancelled() {
            self.subject.send_completion(completion);
        }
    }
}
