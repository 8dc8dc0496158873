//! Multicast hubs: publishers that values are pushed into from outside.
//!
//! Every attached subscriber has its own demand. A [`PassthroughSubject`] hands a value
//! only to the subscribers that have demand for it at that moment; a
//! [`CurrentValueSubject`] keeps the latest value, replays it to new subscribers and
//! holds it for subscribers that are not ready yet.
//!
//! Sends from several threads must be serialized by the caller; attaching and
//! cancelling may happen from anywhere, including from inside a delivery.

mod current_value;
mod hub;
mod passthrough;
mod subscriber;

pub use current_value::*;
pub use passthrough::*;
pub use subscriber::*;

use crate::{Completion, Publisher};

/// A publisher that values and a completion can be sent into.
pub trait Subject: Publisher {
    /// Broadcasts `value` to the attached subscribers. Ignored once completed.
    fn send(&self, value: Self::Output);

    /// Ends every current subscription; later subscribers receive the same completion.
    fn send_completion(&self, completion: Completion<Self::Failure>);
}
