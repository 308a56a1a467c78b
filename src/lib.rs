//! # FRP Signals
//!
//! A minimal, single-threaded signals-and-events core for keeping derived
//! display state in sync with source-of-truth state.
//!
//! ## Features
//!
//! - **Signals** always hold a value and only notify when it changes
//!   (`PartialEq`). **Events** carry momentary payloads and notify on every
//!   delivery.
//! - **Capability split**: [`make`] and [`make_event`] return a read handle
//!   and a separate [`Updater`] / [`Trigger`].
//! - **Eager, synchronous propagation**: `update` and `trigger` return only
//!   after every dependent node and sink has reacted, depth-first, in
//!   registration order.
//! - **Copy-able handles** backed by a generational arena, with opt-in
//!   disposal through [`Subscription`], `dispose()` and [`Scope`].
//!
//! Multi-input derivations are not glitch-free: in a diamond a sink may see
//! one intermediate value per leg before the update settles.
//!
//! ## Example
//!
//! ```rust,no_run
//! use frp_signals::prelude::*;
//!
//! let (a, set_a) = make(0);
//! let x = a.map(|v| v + 1);
//! let y = a.map(|v| v * 2);
//! let z = lift2(x, y, |p, q| p + q);
//!
//! z.for_each(|value| println!("z = {value}")); // z = 1
//! set_a.update(1); // z = 2, then z = 4
//! ```

mod combinators;
mod error;
mod event;
mod signal;
mod storage;
mod subscription;

pub use combinators::{hold, lift, lift2, lift3, lift_ev};
pub use error::{Error, Result};
pub use event::{make_event, Event, Trigger};
pub use signal::{constant, make, Signal, Updater};
pub use storage::{stats, NodeId, ObserverId, Stats};
pub use subscription::{iter, iter_ev, Handle, Scope, Subscription, Updates};

pub mod prelude {
    pub use crate::{
        constant, hold, iter, iter_ev, lift, lift2, lift3, lift_ev, make, make_event, Event,
        Scope, Signal, Subscription, Trigger, Updater,
    };
}
