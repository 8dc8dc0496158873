use std::{mem, num::NonZeroUsize, sync::Arc};

use parking_lot::Mutex;

use crate::{
    node::{Outbox, UpstreamLink},
    Cancellable, Completion, Demand, Publisher, Subscriber, Subscription, SubscriptionRef,
};

/// Groups items into `Vec`s of `size` items.
///
/// Every unit of downstream demand asks upstream for `size` items. When upstream
/// finishes a partial chunk is emitted before the completion; when it fails the partial
/// chunk is dropped.
pub struct Chunks<U> {
    upstream: U,
    size: usize,
}

impl<U> Chunks<U> {
    pub(crate) fn new(upstream: U, size: NonZeroUsize) -> Self {
        Self {
            upstream,
            size: size.get(),
        }
    }
}

impl<U: Publisher> Publisher for Chunks<U> {
    type Output = Vec<U::Output>;
    type Failure = U::Failure;

    fn receive<S>(&self, subscriber: S)
    where
        S: Subscriber<Input = Vec<U::Output>, Failure = U::Failure>,
    {
        let node = Arc::new(ChunksNode {
            size: self.size,
            buffer: Mutex::new(Vec::with_capacity(self.size)),
            upstream: UpstreamLink::new(),
            outbox: Outbox::new(subscriber),
        });
        self.upstream.receive(ChunksSubscriber { node });
    }
}

struct ChunksNode<T, E> {
    size: usize,
    buffer: Mutex<Vec<T>>,
    upstream: UpstreamLink,
    outbox: Outbox<Vec<T>, E>,
}

impl<T: Send + 'static, E: Send + 'static> ChunksNode<T, E> {
    fn upstream_demand(&self, chunks: Demand) -> Demand {
        chunks.scaled(self.size as u64)
    }
}

impl<T: Send + 'static, E: Send + 'static> Cancellable for ChunksNode<T, E> {
    fn cancel(&self) {
        self.upstream.cancel();
        self.outbox.cancel();
        mem::take(&mut *self.buffer.lock());
    }
}

impl<T: Send + 'static, E: Send + 'static> Subscription for ChunksNode<T, E> {
    fn request(&self, demand: Demand) {
        let granted = self.outbox.request(demand);
        self.upstream.request(self.upstream_demand(demand + granted));
    }
}

struct ChunksSubscriber<T, E> {
    node: Arc<ChunksNode<T, E>>,
}

impl<T: Send + 'static, E: Send + 'static> Subscriber for ChunksSubscriber<T, E> {
    type Input = T;
    type Failure = E;

    fn receive_subscription(&mut self, subscription: SubscriptionRef) {
        if !self.node.upstream.attach(subscription) {
            return;
        }
        let granted = self.node.outbox.subscribe(self.node.clone());
        self.node.upstream.request(self.node.upstream_demand(granted));
    }

    fn receive(&mut self, input: T) -> Demand {
        let full = {
            let mut buffer = self.node.buffer.lock();
            buffer.push(input);
            if buffer.len() < self.node.size {
                return Demand::none();
            }
            mem::replace(&mut *buffer, Vec::with_capacity(self.node.size))
        };
        let granted = self.node.outbox.push(full);
        self.node.upstream_demand(granted)
    }

    fn receive_completion(&mut self, completion: Completion<E>) {
        if !self.node.upstream.finish() {
            return;
        }
        let partial = mem::take(&mut *self.node.buffer.lock());
        match completion {
            Completion::Finished => {
                if !partial.is_empty() {
                    self.node.outbox.push(partial);
                }
                self.node.outbox.finish(Completion::Finished);
            }
            Completion::Failed(failure) => {
                self.node.outbox.terminate(Completion::Failed(failure));
            }
        }
    }
}
