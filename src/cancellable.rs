use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

/// Anything whose activity can be stopped.
///
/// Cancelling must be idempotent: a second call, or a call after the activity already
/// ended, has no observable effect.
pub trait Cancellable: Send + Sync {
    fn cancel(&self);
}

impl<C> Cancellable for Arc<C>
where
    C: Cancellable + ?Sized,
{
    fn cancel(&self) {
        (**self).cancel()
    }
}

/// Single-fire shared cancellation flag.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fires the token. Returns `true` only for the call that actually fired it.
    pub fn cancel(&self) -> bool {
        !self.cancelled.swap(true, Ordering::AcqRel)
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

/// Type-erased cancellable that cancels when dropped.
#[must_use = "dropping an AnyCancellable cancels the subscription"]
pub struct AnyCancellable {
    inner: Option<Box<dyn Cancellable>>,
}

impl AnyCancellable {
    pub fn new<C>(cancellable: C) -> Self
    where
        C: Cancellable + 'static,
    {
        Self {
            inner: Some(Box::new(cancellable)),
        }
    }

    /// Keeps the cancellable alive for as long as `bag` is.
    pub fn store(self, bag: &mut Vec<AnyCancellable>) {
        bag.push(self);
    }

    /// Gives up ownership without cancelling.
    pub fn detach(mut self) {
        self.inner = None;
    }
}

impl Cancellable for AnyCancellable {
    fn cancel(&self) {
        if let Some(inner) = &self.inner {
            inner.cancel();
        }
    }
}

impl Drop for AnyCancellable {
    fn drop(&mut self) {
        if let Some(inner) = self.inner.take() {
            inner.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_fires_once() {
        let token = CancellationToken::new();
        let shared = token.clone();
        assert!(!shared.is_cancelled());
        assert!(token.cancel());
        assert!(!shared.cancel());
        assert!(shared.is_cancelled());
    }

    #[test]
    fn any_cancellable_cancels_on_drop_unless_detached() {
        let token = CancellationToken::new();
        struct Flag(CancellationToken);
        impl Cancellable for Flag {
            fn cancel(&self) {
                self.0.cancel();
            }
        }

        drop(AnyCancellable::new(Flag(token.clone())));
        assert!(token.is_cancelled());

        let other = CancellationToken::new();
        AnyCancellable::new(Flag(other.clone())).detach();
        assert!(!other.is_cancelled());
    }
}
