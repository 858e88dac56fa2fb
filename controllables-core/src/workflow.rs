//! Workflows
//!
//! Hook points around the stages of a long-running operation, such as a
//! simulation run.
//!
//! A [`WorkflowManager`] is owned by the object running the operation. Each
//! stage is a key (`"run:pre"`, `"stop:post"`, ...); emitting a stage fires
//! its callback with a [`Workflow`] naming the stage and the owner.
//!
//! [`CallableObserver`] does the same for a single function: listeners on
//! [`CALL_PRE`] and [`CALL_POST`] see the arguments of every call.

use std::fmt;
use std::hash::Hash;

use crate::callback::{Callback, CallbackManager, Dispatch, Listener, ListenerId};
use crate::component::{Attachment, Component, ParentHandle};
use crate::error::Result;

/// A stage being entered, as seen by workflow listeners.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workflow<K, T> {
    pub reference: K,
    /// The owner of the manager, if it is attached.
    pub target: Option<T>,
}

/// Keyed workflow callbacks attached to an owner.
///
/// ```rust
/// use std::sync::Arc;
/// use controllables_core::component::Component;
/// use controllables_core::workflow::WorkflowManager;
///
/// struct World;
///
/// let world = Arc::new(World);
/// let workflows: WorkflowManager<&str, Arc<World>> = WorkflowManager::new();
/// workflows.attach(world.clone()).unwrap();
///
/// workflows
///     .get(&"run:pre")
///     .on_fn(|flow| assert!(flow.target.is_some()))
///     .unwrap();
/// workflows.emit(&"run:pre").unwrap();
/// ```
pub struct WorkflowManager<K, T>
where
    K: Eq + Hash,
{
    callbacks: CallbackManager<K, Workflow<K, T>, ()>,
    attachment: Attachment<T>,
}

impl<K, T> WorkflowManager<K, T>
where
    K: Eq + Hash + Clone,
    T: ParentHandle,
{
    pub fn new() -> Self {
        Self {
            callbacks: CallbackManager::new(),
            attachment: Attachment::new(),
        }
    }

    /// The callback of stage `reference`.
    pub fn get(&self, reference: &K) -> Callback<Workflow<K, T>, ()> {
        self.callbacks.get(reference)
    }

    pub fn on(&self, reference: &K, listener: Listener<Workflow<K, T>, ()>) -> Result<ListenerId> {
        self.callbacks.on(reference, listener)
    }

    pub fn off(&self, reference: &K, id: ListenerId) -> bool {
        self.callbacks.off(reference, id)
    }

    /// Enter stage `reference`.
    pub fn emit(&self, reference: &K) -> Result<Dispatch<()>> {
        let workflow = Workflow {
            reference: reference.clone(),
            target: self.attachment.parent().ok(),
        };
        self.callbacks.emit(reference, &workflow)
    }

    pub fn callbacks(&self) -> &CallbackManager<K, Workflow<K, T>, ()> {
        &self.callbacks
    }
}

impl<K, T> Default for WorkflowManager<K, T>
where
    K: Eq + Hash + Clone,
    T: ParentHandle,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, T> Component for WorkflowManager<K, T>
where
    K: Eq + Hash,
    T: ParentHandle,
{
    type Parent = T;

    fn attachment(&self) -> &Attachment<T> {
        &self.attachment
    }
}

impl<K, T> fmt::Debug for WorkflowManager<K, T>
where
    K: Eq + Hash + Clone,
    T: ParentHandle,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkflowManager")
            .field("stages", &self.callbacks.len())
            .field("attached", &self.attachment.is_attached())
            .finish()
    }
}

/// Fired with the arguments before the wrapped function runs.
pub const CALL_PRE: &str = "call:pre";
/// Fired with the arguments after the wrapped function returned.
pub const CALL_POST: &str = "call:post";

type Wrapped<A, R> = Box<dyn Fn(&A) -> R + Send + Sync>;

/// A function whose calls can be observed.
pub struct CallableObserver<A, R> {
    func: Wrapped<A, R>,
    events: CallbackManager<&'static str, A, ()>,
}

impl<A, R> CallableObserver<A, R> {
    pub fn new<F>(func: F) -> Self
    where
        F: Fn(&A) -> R + Send + Sync + 'static,
    {
        Self {
            func: Box::new(func),
            events: CallbackManager::with_slots([CALL_PRE, CALL_POST]),
        }
    }

    pub fn events(&self) -> &CallbackManager<&'static str, A, ()> {
        &self.events
    }

    /// Run the function between its two events.
    ///
    /// A failing `"call:pre"` listener prevents the call.
    pub fn call(&self, args: &A) -> Result<R> {
        self.events.emit(&CALL_PRE, args)?;
        let out = (self.func)(args);
        self.events.emit(&CALL_POST, args)?;
        Ok(out)
    }
}

impl<A, R> fmt::Debug for CallableObserver<A, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallableObserver")
            .field("events", &self.events)
            .finish_non_exhaustive()
    }
}

/// Wrap `func` so that its calls fire [`CALL_PRE`] and [`CALL_POST`].
pub fn observable<A, R, F>(func: F) -> CallableObserver<A, R>
where
    F: Fn(&A) -> R + Send + Sync + 'static,
{
    CallableObserver::new(func)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use parking_lot::Mutex;
    use std::sync::Arc;

    struct World {
        name: &'static str,
    }

    #[test]
    fn stages_carry_reference_and_owner() {
        let world = Arc::new(World { name: "office" });
        let workflows: WorkflowManager<&str, Arc<World>> = WorkflowManager::new();
        workflows.attach(world.clone()).unwrap();

        let seen = Arc::new(Mutex::new(Vec::new()));
        for stage in ["run:pre", "run:post"] {
            let seen = seen.clone();
            workflows
                .get(&stage)
                .on_fn(move |flow: &Workflow<&str, Arc<World>>| {
                    let owner = flow.target.as_ref().map(|world| world.name);
                    seen.lock().push((flow.reference, owner));
                })
                .unwrap();
        }

        workflows.emit(&"run:pre").unwrap();
        workflows.emit(&"stop:pre").unwrap();
        workflows.emit(&"run:post").unwrap();

        assert_eq!(
            *seen.lock(),
            vec![("run:pre", Some("office")), ("run:post", Some("office"))]
        );
    }

    #[test]
    fn detached_manager_has_no_target() {
        let workflows: WorkflowManager<&str, Arc<World>> = WorkflowManager::new();
        let targets = Arc::new(Mutex::new(Vec::new()));
        let t = targets.clone();
        workflows
            .on(
                &"run:pre",
                Listener::from_fn(move |flow: &Workflow<&str, Arc<World>>| {
                    t.lock().push(flow.target.is_some());
                }),
            )
            .unwrap();

        workflows.emit(&"run:pre").unwrap();
        let world = Arc::new(World { name: "lab" });
        workflows.attach(world.clone()).unwrap();
        workflows.emit(&"run:pre").unwrap();
        workflows.detach(Some(&world)).unwrap();
        workflows.emit(&"run:pre").unwrap();

        assert_eq!(*targets.lock(), vec![false, true, false]);
    }

    #[test]
    fn observer_brackets_each_call() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let inner = log.clone();
        let step = observable(move |dt: &u32| {
            inner.lock().push(format!("step {dt}"));
            dt * 2
        });

        for (event, label) in [(CALL_PRE, "pre"), (CALL_POST, "post")] {
            let log = log.clone();
            step.events()
                .get(&event)
                .on_fn(move |dt: &u32| log.lock().push(format!("{label} {dt}")))
                .unwrap();
        }

        assert_eq!(step.call(&5).unwrap(), 10);
        assert_eq!(*log.lock(), vec!["pre 5", "step 5", "post 5"]);
    }

    #[test]
    fn failing_pre_listener_skips_the_call() {
        let calls = Arc::new(Mutex::new(0));
        let c = calls.clone();
        let step = observable(move |_: &()| *c.lock() += 1);
        step.events()
            .on(&CALL_PRE, Listener::new(|_| Err(Error::listener("not ready"))))
            .unwrap();

        assert!(matches!(step.call(&()), Err(Error::Listener(_))));
        assert_eq!(*calls.lock(), 0);
    }
}
