//! Python bindings.
//!
//! Python objects are held as `Arc<Py<PyAny>>` so they can flow through
//! the generic callback and variable types, which need `Clone`. Listeners
//! written in Python reacquire the GIL when invoked; blocking calls release
//! it first.

use std::sync::Arc;
use std::time::Duration;

use pyo3::create_exception;
use pyo3::exceptions::{PyException, PyRuntimeError, PyTimeoutError, PyTypeError};
use pyo3::prelude::*;

use crate::callback::{Callback, Flow, Listener, ListenerId};
use crate::error::{CallbackError, Error, VariableError};
use crate::variable::{MutableVariable, Variable, WritableVariable};

create_exception!(_core, TemporaryUnavailableError, PyException);

type Object = Arc<Py<PyAny>>;

fn to_py_err(err: Error) -> PyErr {
    match err {
        Error::Listener(inner) => match inner.downcast::<PyErr>() {
            Ok(py_err) => *py_err,
            Err(other) => PyRuntimeError::new_err(other.to_string()),
        },
        Error::Variable(VariableError::TemporarilyUnavailable(what)) => {
            TemporaryUnavailableError::new_err(what)
        }
        err @ Error::Variable(VariableError::NotWritable) => PyTypeError::new_err(err.to_string()),
        err @ Error::Callback(CallbackError::Timeout) => PyTimeoutError::new_err(err.to_string()),
        other => PyRuntimeError::new_err(other.to_string()),
    }
}

fn seconds(timeout: Option<f64>) -> Option<Duration> {
    timeout.map(|secs| Duration::from_secs_f64(secs.max(0.0)))
}

/// Handle returned by `on`, accepted by `off`.
#[pyclass(name = "ListenerId", frozen)]
#[derive(Clone, Copy)]
pub struct PyListenerId(ListenerId);

#[pymethods]
impl PyListenerId {
    fn __repr__(&self) -> String {
        self.0.to_string()
    }

    fn __hash__(&self) -> u64 {
        self.0.raw()
    }

    fn __eq__(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

/// Python-facing callback carrying one positional argument.
#[pyclass(name = "Callback")]
pub struct PyCallback {
    inner: Callback<Object, Object>,
}

#[pymethods]
impl PyCallback {
    #[new]
    fn new() -> Self {
        Self {
            inner: Callback::new(),
        }
    }

    /// Register `listener`; its return value is collected by `__call__`.
    fn on(&self, listener: PyObject) -> PyResult<PyListenerId> {
        let listener = Listener::new(move |args: &Object| {
            Python::with_gil(|py| {
                let out = listener
                    .call1(py, (args.clone_ref(py),))
                    .map_err(Error::listener)?;
                Ok(Flow::Value(Arc::new(out)))
            })
        });
        self.inner.on(listener).map(PyListenerId).map_err(to_py_err)
    }

    fn off(&self, id: PyListenerId) -> bool {
        self.inner.off(id.0)
    }

    /// Fire the callback, returning the listeners' results in order.
    fn __call__(&self, py: Python<'_>, args: PyObject) -> PyResult<Vec<PyObject>> {
        let args: Object = Arc::new(args);
        let callback = self.inner.clone();
        let results = py
            .allow_threads(move || callback.emit(&args))
            .map_err(to_py_err)?;
        Ok(results.values().map(|out| out.clone_ref(py)).collect())
    }

    /// Block until the next firing and return its argument.
    #[pyo3(signature = (timeout=None))]
    fn wait(&self, py: Python<'_>, timeout: Option<f64>) -> PyResult<PyObject> {
        let callback = self.inner.clone();
        let ctx = py
            .allow_threads(move || callback.wait(false, seconds(timeout)))
            .map_err(to_py_err)?;
        Ok(ctx.args().clone_ref(py))
    }

    fn cancel(&self, reason: &str) {
        self.inner.cancel(reason);
    }

    fn __len__(&self) -> usize {
        self.inner.len()
    }

    fn __repr__(&self) -> String {
        format!("Callback(listeners={})", self.inner.len())
    }
}

/// Python-facing stored variable.
#[pyclass(name = "MutableVariable")]
pub struct PyMutableVariable {
    inner: Arc<MutableVariable<Object>>,
}

#[pymethods]
impl PyMutableVariable {
    #[new]
    #[pyo3(signature = (value=None))]
    fn new(value: Option<PyObject>) -> Self {
        let inner = match value {
            Some(value) => MutableVariable::new(Arc::new(value)),
            None => MutableVariable::empty(),
        };
        Self {
            inner: Arc::new(inner),
        }
    }

    /// The current value; raises `TemporaryUnavailableError` while unset.
    #[getter]
    fn value(&self, py: Python<'_>) -> PyResult<PyObject> {
        self.inner
            .value()
            .map(|value| value.clone_ref(py))
            .map_err(to_py_err)
    }

    #[setter]
    fn set_value(&self, py: Python<'_>, value: PyObject) -> PyResult<()> {
        let inner = Arc::clone(&self.inner);
        let value: Object = Arc::new(value);
        py.allow_threads(move || inner.set_value(value))
            .map_err(to_py_err)
    }

    fn is_set(&self) -> bool {
        self.inner.is_set()
    }

    fn unset(&self) -> PyResult<()> {
        self.inner.unset().map_err(to_py_err)
    }

    /// Call `listener()` after every write.
    fn on_change(&self, listener: PyObject) -> PyResult<PyListenerId> {
        let change = self
            .inner
            .on_change()
            .ok_or_else(|| PyRuntimeError::new_err("variable has no events"))?;
        let listener = Listener::new(move |_: &()| {
            Python::with_gil(|py| {
                listener.call0(py).map_err(Error::listener)?;
                Ok(Flow::Continue)
            })
        });
        change.on(listener).map(PyListenerId).map_err(to_py_err)
    }

    fn off_change(&self, id: PyListenerId) -> bool {
        self.inner
            .on_change()
            .map(|change| change.off(id.0))
            .unwrap_or(false)
    }

    fn __repr__(&self, py: Python<'_>) -> String {
        let repr = match self.inner.value() {
            Ok(value) => value
                .bind(py)
                .repr()
                .map(|r| r.to_string())
                .unwrap_or_else(|_| "?".to_string()),
            Err(_) => "<unset>".to_string(),
        };
        format!("MutableVariable(value={repr})")
    }
}

pub(crate) fn register(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<PyCallback>()?;
    m.add_class::<PyMutableVariable>()?;
    m.add_class::<PyListenerId>()?;
    m.add(
        "TemporaryUnavailableError",
        m.py().get_type_bound::<TemporaryUnavailableError>(),
    )?;
    Ok(())
}
