use std::sync::Arc;

use parking_lot::Mutex;

use crate::{Cancellable, CancellationToken, Demand};

/// The live link between a publisher and one subscriber.
///
/// The subscriber uses it to ask for more items and to cancel. Both calls may happen at
/// any time, including from inside an item callback.
pub trait Subscription: Cancellable {
    /// Adds `demand` to what the subscriber already asked for.
    fn request(&self, demand: Demand);
}

pub type SubscriptionRef = Arc<dyn Subscription>;

/// A subscription that does nothing, for publishers that complete right away.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmptySubscription;

impl Cancellable for EmptySubscription {
    fn cancel(&self) {}
}

impl Subscription for EmptySubscription {
    fn request(&self, _demand: Demand) {}
}

pub fn empty() -> SubscriptionRef {
    Arc::new(EmptySubscription)
}

/// Holds the subscription of a terminal subscriber and the token that cancels it.
///
/// The token is shared with whatever cancellation handle the subscriber hands out, so a
/// subscription arriving after `cancel` is cancelled on arrival.
#[derive(Default)]
pub(crate) struct SubscriptionSlot {
    token: CancellationToken,
    current: Mutex<Option<SubscriptionRef>>,
}

impl SubscriptionSlot {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Stores `subscription`. Returns `false`, cancelling it, if the slot was cancelled
    /// or already holds one.
    pub(crate) fn set(&self, subscription: SubscriptionRef) -> bool {
        if self.token.is_cancelled() {
            subscription.cancel();
            return false;
        }
        {
            let mut current = self.current.lock();
            if current.is_some() {
                drop(current);
                log::warn!("duplicate subscription received; cancelling it");
                subscription.cancel();
                return false;
            }
            *current = Some(subscription);
        }
        if self.token.is_cancelled() {
            self.release();
        }
        true
    }

    /// Forwards `demand`; returns `false` when there is no subscription to forward to.
    pub(crate) fn request(&self, demand: Demand) -> bool {
        let current = self.current.lock().clone();
        match current {
            Some(subscription) => {
                subscription.request(demand);
                true
            }
            None => false,
        }
    }

    /// Forgets the subscription after the publisher terminated.
    pub(crate) fn clear(&self) {
        self.current.lock().take();
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    fn release(&self) {
        let current = self.current.lock().take();
        if let Some(subscription) = current {
            subscription.cancel();
        }
    }
}

impl Cancellable for SubscriptionSlot {
    fn cancel(&self) {
        if self.token.cancel() {
            self.release();
        }
    }
}
