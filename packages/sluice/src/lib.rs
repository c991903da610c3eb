//! Go-style CSP primitives for async Rust: capacity-bounded channels with blocking put/take and
//! graceful or forced close, a fair multi-way [`Select`] with synchronous and asynchronous
//! paths, and a family of special channels ([`SignalChan`], [`TimeoutChan`], [`DelayChan`],
//! [`FutureChan`]) satisfying the same take/select contract.
//!
//! All blocking is cooperative: operations that cannot complete return futures, cancellation is
//! dropping the future (always side-effect-free before resolution), and timers reach the special
//! channels only through the injectable [`scheduler::Scheduler`] boundary.

#[macro_use]
extern crate tracing;

pub mod scheduler;

mod channel;
mod select;
mod source;
mod special;

#[cfg(test)]
mod test_util;

pub use crate::channel::api::{Chan, SendOp, TakeOp};
pub use crate::select::{Select, Selected};
pub use crate::source::{Claim, Probe, Source, SourceReg};
pub use crate::special::{DelayChan, FutureChan, SignalChan, Settler, TimeoutChan};

/// Error types
pub mod error {
    pub use crate::channel::error::*;
}

/// Future types
pub mod future {
    pub use crate::channel::api::future::*;
}
