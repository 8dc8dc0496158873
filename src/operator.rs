//! Single-upstream operators.
//!
//! Most of them are 1:1 transforms built on the generic node in `transform`; the
//! accumulating ones (`reduce`, `chunks`) and the recovery ones (`retry`, `catch`) run
//! their own nodes because their demand does not map unit for unit.

mod assert_no_failure;
mod catch;
mod chunks;
mod filter;
mod map;
mod map_error;
mod multicast;
mod reduce;
mod receive_on;
mod retry;
mod scan;
mod take;
pub(crate) mod transform;

pub use assert_no_failure::*;
pub use catch::*;
pub use chunks::*;
pub use filter::*;
pub use map::*;
pub use map_error::*;
pub use multicast::*;
pub use reduce::*;
pub use receive_on::*;
pub use retry::*;
pub use scan::*;
pub use take::*;
