use std::{
    mem,
    sync::{Arc, Weak},
};

use parking_lot::Mutex;

use crate::{node::Outbox, Cancellable, Completion, Demand, Subscriber, Subscription};

/// What a hub keeps of the values sent through it.
pub(crate) trait Retain<T>: Send + 'static {
    /// `true` if a subscriber without demand holds the latest value until it asks.
    const HOLDS_LATEST: bool;

    /// The value handed to a subscriber when it attaches.
    fn replay(&self) -> Option<T>;

    fn record(&mut self, value: &T);
}

/// Keeps nothing; subscribers without demand miss the value.
pub(crate) struct Nothing;

impl<T> Retain<T> for Nothing {
    const HOLDS_LATEST: bool = false;

    fn replay(&self) -> Option<T> {
        None
    }

    fn record(&mut self, _value: &T) {}
}

/// Keeps the latest value, replays it on attach.
pub(crate) struct Latest<T>(pub(crate) T);

impl<T> Retain<T> for Latest<T>
where
    T: Clone + Send + 'static,
{
    const HOLDS_LATEST: bool = true;

    fn replay(&self) -> Option<T> {
        Some(self.0.clone())
    }

    fn record(&mut self, value: &T) {
        self.0 = value.clone();
    }
}

struct HubState<T, F, R> {
    conduits: Vec<Arc<Conduit<T, F, R>>>,
    completion: Option<Completion<F>>,
    retained: R,
    version: u64,
    next_id: u64,
}

/// The broadcast core shared by the subjects.
pub(crate) struct Hub<T, F, R> {
    state: Mutex<HubState<T, F, R>>,
}

impl<T, F, R> Hub<T, F, R>
where
    T: Clone + Send + 'static,
    F: Clone + Send + 'static,
    R: Retain<T>,
{
    pub(crate) fn new(retained: R) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(HubState {
                conduits: Vec::new(),
                completion: None,
                retained,
                version: 0,
                next_id: 0,
            }),
        })
    }

    pub(crate) fn attach<S>(self: &Arc<Self>, subscriber: S)
    where
        S: Subscriber<Input = T, Failure = F>,
    {
        let (conduit, completion) = {
            let mut state = self.state.lock();
            let conduit = Arc::new(Conduit {
                id: state.next_id,
                outbox: Outbox::new(subscriber),
                hub: Arc::downgrade(self),
            });
            state.next_id += 1;
            (conduit, state.completion.clone())
        };
        conduit.outbox.subscribe(conduit.clone());
        if let Some(completion) = completion {
            conduit.outbox.finish(completion);
            return;
        }
        loop {
            let (version, replay) = {
                let state = self.state.lock();
                (state.version, state.retained.replay())
            };
            if let Some(value) = replay {
                conduit.outbox.push_latest(value);
            }
            // A value sent while replaying must not be overtaken by the older one.
            if self.join(conduit.clone(), version) {
                break;
            }
        }
    }

    /// Adds `conduit` to the broadcast set, unless a value newer than `seen` arrived or
    /// the hub completed meanwhile.
    fn join(&self, conduit: Arc<Conduit<T, F, R>>, seen: u64) -> bool {
        let completion = {
            let mut state = self.state.lock();
            if conduit.outbox.is_closed() {
                return true;
            }
            if let Some(completion) = state.completion.clone() {
                completion
            } else if R::HOLDS_LATEST && seen != state.version {
                return false;
            } else {
                state.conduits.push(conduit);
                return true;
            }
        };
        conduit.outbox.terminate(completion);
        true
    }

    /// Returns `false` if the hub already completed.
    pub(crate) fn send(&self, value: T) -> bool {
        let targets = {
            let mut state = self.state.lock();
            if state.completion.is_some() {
                return false;
            }
            state.retained.record(&value);
            state.version += 1;
            state.conduits.clone()
        };
        log::trace!("broadcasting to {} subscribers", targets.len());
        for conduit in targets {
            if R::HOLDS_LATEST {
                conduit.outbox.push_latest(value.clone());
            } else {
                conduit.outbox.offer(value.clone());
            }
        }
        true
    }

    pub(crate) fn complete(&self, completion: Completion<F>) -> bool {
        let targets = {
            let mut state = self.state.lock();
            if state.completion.is_some() {
                return false;
            }
            state.completion = Some(completion.clone());
            mem::take(&mut state.conduits)
        };
        log::debug!("subject completed with {} subscribers attached", targets.len());
        for conduit in targets {
            conduit.outbox.terminate(completion.clone());
        }
        true
    }

    pub(crate) fn retained<V>(&self, read: impl FnOnce(&R) -> V) -> V {
        read(&self.state.lock().retained)
    }

    pub(crate) fn subscriber_count(&self) -> usize {
        self.state.lock().conduits.len()
    }
}

impl<T, F, R> Hub<T, F, R> {
    fn detach(&self, id: u64) {
        let removed = {
            let mut state = self.state.lock();
            let index = state.conduits.iter().position(|conduit| conduit.id == id);
            index.map(|index| state.conduits.remove(index))
        };
        drop(removed);
    }
}

/// One subscriber's view of the hub, with its own demand and buffer.
struct Conduit<T, F, R> {
    id: u64,
    outbox: Outbox<T, F>,
    hub: Weak<Hub<T, F, R>>,
}

impl<T, F, R> Cancellable for Conduit<T, F, R>
where
    T: Send + 'static,
    F: Send + 'static,
    R: Send + 'static,
{
    fn cancel(&self) {
        self.outbox.cancel();
        if let Some(hub) = self.hub.upgrade() {
            hub.detach(self.id);
        }
    }
}

impl<T, F, R> Subscription for Conduit<T, F, R>
where
    T: Send + 'static,
    F: Send + 'static,
    R: Send + 'static,
{
    fn request(&self, demand: Demand) {
        self.outbox.request(demand);
    }
}
