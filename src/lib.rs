//! Demand-driven reactive streams.
//!
//! A [`Publisher`] produces items for a [`Subscriber`] only as fast as the subscriber
//! asks for them through its [`Subscription`]. Operators are publishers that subscribe
//! to another publisher, so a chain is built by composing descriptions and is only
//! brought to life when a subscriber attaches at the end:
//!
//! ```
//! use futures_reactive::{publisher::Sequence, PublisherExt};
//! use std::sync::{Arc, Mutex};
//!
//! let seen = Arc::new(Mutex::new(Vec::new()));
//! let sink = seen.clone();
//! let _cancellable = Sequence::new(1..=6)
//!     .filter(|n| n % 2 == 0)
//!     .map(|n| n * 10)
//!     .sink(|_| {}, move |n| sink.lock().unwrap().push(n));
//!
//! assert_eq!(*seen.lock().unwrap(), vec![20, 40, 60]);
//! ```

mod cancellable;
pub mod codec;
pub mod combinator;
mod completion;
mod config;
mod demand;
mod error;
mod node;
pub mod operator;
pub mod publisher;
pub mod scheduler;
mod stream;
pub mod subject;
mod subscriber;
mod subscription;
pub mod testing;
pub mod time;

pub use cancellable::{AnyCancellable, Cancellable, CancellationToken};
pub use completion::Completion;
pub use config::Prefetch;
pub use demand::Demand;
pub use error::{ContractViolation, SchedulerError, StreamError, SubjectError};
pub use publisher::{AnyPublisher, Publisher, PublisherExt};
pub use stream::Values;
pub use subject::{CurrentValueSubject, PassthroughSubject, Subject};
pub use subscriber::{AnySubscriber, Sink, Subscriber};
pub use subscription::{empty as empty_subscription, EmptySubscription, Subscription, SubscriptionRef};

/// Failure type of streams that cannot fail.
pub type Never = std::convert::Infallible;

#[cfg(test)]
pub(crate) mod test_support {
    /// Routes `log` output to the test harness; `RUST_LOG` may come from a `.env` file.
    pub(crate) fn init_logging() {
        let _ = dotenv::dotenv();
        let _ = pretty_env_logger::try_init();
    }
}
