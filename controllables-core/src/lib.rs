//! Controllables Core
//!
//! This crate provides the runtime shared by the Controllables adapters:
//! the pieces a control loop uses to talk to a simulation kernel that
//! drives it through callbacks.
//!
//! - Callbacks with ordered dispatch, forking, sampling, and waits with
//!   deferred acknowledgement for backpressure
//! - Variables: stored, computed, composite and conditional
//! - Structural mapping over nested maps, lists and tuples
//! - Reference resolution against keyed managers
//! - Workflow hooks around the stages of a run
//!
//! The crate is designed to be used both as a native Rust library and,
//! with the `python` feature, as a Python extension module via PyO3.
//!
//! # Architecture
//!
//! - `callback`: listeners, pipelines, callbacks and their managers
//! - `variable`: the variable model on top of callbacks
//! - `mapper`: structural mapping used by composite variables
//! - `component`: single-parent attachment shared by attachable objects
//! - `refs`: `deref` and `bounded_deref`
//! - `config`: wait options and runtime configuration
//! - `workflow`: stage callbacks and observable functions
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use std::thread;
//! use controllables_core::callback::Callback;
//! use controllables_core::variable::{MutableVariable, Variable, WritableVariable};
//!
//! let begin_timestep: Callback<u64, ()> = Callback::new();
//! let setpoint = Arc::new(MutableVariable::new(20.0_f64));
//!
//! // A controller waits for the kernel's next timestep, then acts on it.
//! let waiter = begin_timestep.future(true);
//! let kernel = {
//!     let timestep = begin_timestep.clone();
//!     thread::spawn(move || timestep.emit(&1).unwrap())
//! };
//!
//! let ctx = waiter.result(None).unwrap();
//! ctx.scope(|step| {
//!     setpoint.set_value(21.0 + *step as f64)?;
//!     Ok(None)
//! })
//! .unwrap();
//!
//! kernel.join().unwrap();
//! assert_eq!(setpoint.value().unwrap(), 22.0);
//! ```

pub mod callback;
pub mod component;
pub mod config;
pub mod error;
pub mod mapper;
pub mod refs;
pub mod variable;
pub mod workflow;

#[cfg(feature = "python")]
mod python;

pub use error::{Error, Result};

#[cfg(feature = "python")]
use pyo3::prelude::*;

/// Python module definition.
///
/// This function is called by Python when importing the module.
/// It registers all Python-exposed types and functions.
#[cfg(feature = "python")]
#[pymodule]
fn _core(m: &Bound<'_, PyModule>) -> PyResult<()> {
    python::register(m)?;

    // Add version info
    m.add("__version__", env!("CARGO_PKG_VERSION"))?;

    Ok(())
}
