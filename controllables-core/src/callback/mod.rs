//! Callbacks
//!
//! Ordered, cancellable event dispatch with cross-thread acknowledgement.
//!
//! # Overview
//!
//! A [`Callback`] is a set of [`Listener`]s executed in registration order
//! by a [`CallablePipeline`]. Each listener answers with a [`Flow`]:
//!
//! ```text
//! emit(args) ──► listener a ──► Value(x)   recorded as {a: x}
//!            ──► listener b ──► Continue   skipped
//!            ──► listener c ──► Stop       iteration ends here
//!            ──► listener d                never runs
//! ```
//!
//! Callbacks can be forked into children that re-emit on every parent
//! emission ([`Callback::fork`], [`Callback::filter`],
//! [`Callback::sample`]), and waited on from another thread
//! ([`Callback::wait`]) or task (`callback.await`). Waits go through a
//! one-shot handler that leaves the callback after its first firing and
//! passes an [`ExecutionContext`] to the waiter.
//!
//! # Backpressure
//!
//! A deferred wait keeps the firing thread parked inside `emit` until the
//! consumer acknowledges the context:
//!
//! ```rust
//! use std::thread;
//! use controllables_core::callback::Callback;
//!
//! let timestep: Callback<u32, u32> = Callback::new();
//! let waiter = timestep.future(true);
//!
//! let kernel = {
//!     let timestep = timestep.clone();
//!     thread::spawn(move || timestep.emit(&1).unwrap())
//! };
//!
//! let ctx = waiter.result(None).unwrap();
//! ctx.ret(ctx.args() + 41);
//!
//! let results = kernel.join().unwrap();
//! assert_eq!(results.values().copied().collect::<Vec<_>>(), vec![42]);
//! ```

mod channel;
mod context;
mod handler;
mod listener;
mod manager;
mod pipeline;

pub use channel::{Callback, FrequencyPredicate, Queue, Sampler};
pub use context::{Ack, AckMode, ArgKey, Arguments, ExecutionContext};
pub use handler::{CallbackFuture, Waiter};
pub use listener::{Flow, Invoke, Listener, ListenerId, ListenerResult};
pub use manager::CallbackManager;
pub use pipeline::{piped, CallablePipeline, Dispatch};
