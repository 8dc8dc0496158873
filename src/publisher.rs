use crate::Subscriber;

mod any;
mod deferred;
mod ext;
mod record;
mod sequence;

pub use any::*;
pub use deferred::*;
pub use ext::*;
pub use record::*;
pub use sequence::*;

/// A publisher delivers elements to one or more Subscriber instances.
///
/// A publisher is a description of a stream, not a running stream: every call to
/// `receive` attaches a new, independent subscription, so the same publisher can be
/// subscribed again from scratch (this is what `retry` relies on).
///
/// After `receive`, the subscriber is handed exactly one subscription, then items only
/// as far as it has requested them, then at most one completion.
pub trait Publisher: Send + Sync + 'static {
    type Output: Send + 'static;
    type Failure: Send + 'static;

    /// Attaches `subscriber` to a fresh subscription of this publisher.
    fn receive<S>(&self, subscriber: S)
    where
        S: Subscriber<Input = Self::Output, Failure = Self::Failure>;
}
