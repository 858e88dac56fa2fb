//! Forkable event channels.

use std::fmt;
use std::future::IntoFuture;
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tracing::debug;

use super::context::{AckMode, ExecutionContext};
use super::handler::{CallbackFuture, Waiter};
use super::{CallablePipeline, Dispatch, Flow, Invoke, Listener, ListenerId, ListenerResult};
use crate::config::WaitOptions;
use crate::error::{AttachError, CallbackError, Result};

pub(crate) struct CallbackInner<A, R> {
    id: ListenerId,
    pipeline: CallablePipeline<A, R>,
}

/// Weak handle to a callback, held by its one-shot handlers.
pub(crate) type WeakCallback<A, R> = Weak<CallbackInner<A, R>>;

/// A named, orderable, forkable multicast listener set.
///
/// Cloning yields another handle to the same channel.
///
/// ```rust
/// use controllables_core::callback::Callback;
///
/// let cb: Callback<String, String> = Callback::new();
/// cb.on_fn(|x: &String| format!("i am {x}")).unwrap();
///
/// let results = cb.emit(&"a string".to_string()).unwrap();
/// assert_eq!(results.values().collect::<Vec<_>>(), vec!["i am a string"]);
/// ```
pub struct Callback<A, R> {
    inner: Arc<CallbackInner<A, R>>,
}

impl<A, R> Callback<A, R> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(CallbackInner {
                id: ListenerId::new(),
                pipeline: CallablePipeline::new(),
            }),
        }
    }

    /// Identity of this channel, also used when it relays for a parent.
    pub fn id(&self) -> ListenerId {
        self.inner.id
    }

    pub(crate) fn downgrade(&self) -> WeakCallback<A, R> {
        Arc::downgrade(&self.inner)
    }

    pub(crate) fn upgrade(weak: &WeakCallback<A, R>) -> Option<Self> {
        weak.upgrade().map(|inner| Self { inner })
    }

    /// Whether both handles designate the same channel.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Add a listener. Adding a listener that is already present is a no-op.
    ///
    /// A callback's own relay is refused with [`AttachError::SelfRelay`].
    pub fn on(&self, listener: Listener<A, R>) -> Result<ListenerId> {
        let id = listener.id();
        if id == self.id() {
            return Err(AttachError::SelfRelay.into());
        }
        if self.inner.pipeline.add(listener.clone()) {
            if let Err(err) = listener.attached(self) {
                self.inner.pipeline.discard(id);
                return Err(err);
            }
        }
        Ok(id)
    }

    pub(crate) fn insert(&self, listener: Listener<A, R>) -> bool {
        listener.id() != self.id() && self.inner.pipeline.add(listener)
    }

    /// Remove a listener. Returns whether it was present.
    pub fn off(&self, id: ListenerId) -> bool {
        match self.inner.pipeline.discard(id) {
            Some(listener) => {
                listener.detached(self);
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, id: ListenerId) -> bool {
        self.inner.pipeline.contains(id)
    }

    pub fn len(&self) -> usize {
        self.inner.pipeline.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.pipeline.is_empty()
    }

    /// Fire every listener in registration order.
    pub fn emit(&self, args: &A) -> Result<Dispatch<R>> {
        self.inner.pipeline.call(args)
    }

    /// Cancel every pending one-shot handler. Plain listeners stay.
    pub fn cancel(&self, reason: &str) {
        debug!(callback = %self.id(), reason, "cancelling handlers");
        for listener in self.inner.pipeline.snapshot() {
            listener.cancel(reason);
        }
    }

    /// Remove every listener.
    pub fn clear(&self) {
        for listener in self.inner.pipeline.drain() {
            listener.detached(self);
        }
    }
}

impl<A: 'static, R: 'static> Callback<A, R> {
    /// Add a closure whose result is always recorded.
    pub fn on_fn<F>(&self, f: F) -> Result<ListenerId>
    where
        F: Fn(&A) -> R + Send + Sync + 'static,
    {
        self.on(Listener::from_fn(f))
    }

    /// This callback as a listener of another: emitting the other re-emits
    /// this one. The listener's id is this callback's id, so registering it
    /// twice is a no-op.
    pub fn as_listener(&self) -> Listener<A, R> {
        Listener::from_parts(self.id(), Arc::new(Relay::new(self.clone(), None)))
    }

    /// Create a child channel that emits whenever this one does.
    pub fn fork(&self) -> Callback<A, R> {
        self.fork_with(|child| child.as_listener())
    }

    /// Create a child channel whose relay listener is built by `wrap`.
    pub fn fork_with<F>(&self, wrap: F) -> Callback<A, R>
    where
        F: FnOnce(&Callback<A, R>) -> Listener<A, R>,
    {
        let child = Callback::new();
        self.insert(wrap(&child));
        child
    }

    /// A child channel that only emits when `predicate` accepts the arguments.
    pub fn filter<P>(&self, predicate: P) -> Callback<A, R>
    where
        P: Fn(&A) -> bool + Send + Sync + 'static,
    {
        self.fork_with(|child| {
            Listener::from_parts(child.id(), Arc::new(Relay::new(child.clone(), Some(Box::new(predicate)))))
        })
    }

    pub fn sample(&self) -> Sampler<'_, A, R> {
        Sampler { parent: self }
    }
}

impl<A, R> Callback<A, R>
where
    A: Clone + Send + 'static,
    R: Clone + Send + 'static,
{
    /// Register a one-shot handler and return the pending wait.
    pub fn future(&self, deferred: bool) -> Waiter<A, R> {
        Waiter::register(self, AckMode::from_deferred(deferred), None)
    }

    pub fn future_with(&self, options: &WaitOptions) -> Waiter<A, R> {
        Waiter::register(self, AckMode::from_deferred(options.deferred), options.ack_timeout())
    }

    /// Block until the next emission.
    ///
    /// With `deferred`, the firing thread stays parked until the returned
    /// context is acknowledged.
    pub fn wait(&self, deferred: bool, timeout: Option<Duration>) -> Result<ExecutionContext<A, R>> {
        Ok(self.future(deferred).result(timeout)?)
    }

    pub fn wait_with(&self, options: &WaitOptions) -> Result<ExecutionContext<A, R>> {
        Ok(self.future_with(options).result(options.timeout())?)
    }

    /// Register a one-shot handler resolved on the next emission.
    ///
    /// The firing thread only hands the context over a channel, so it never
    /// touches the awaiting runtime.
    pub fn future_async(&self, deferred: bool) -> CallbackFuture<A, R> {
        CallbackFuture::register(self, AckMode::from_deferred(deferred), None)
    }

    pub fn future_async_with(&self, options: &WaitOptions) -> CallbackFuture<A, R> {
        CallbackFuture::register(self, AckMode::from_deferred(options.deferred), options.ack_timeout())
    }

    /// A deferred awaitable; shorthand for `future_async(true)`.
    pub fn awaitable(&self) -> CallbackFuture<A, R> {
        self.future_async(true)
    }

    /// One context per emission, until a wait fails.
    pub fn queue(&self, deferred: bool, timeout: Option<Duration>) -> Queue<A, R> {
        Queue {
            source: self.clone(),
            end: None,
            mode: AckMode::from_deferred(deferred),
            timeout,
            done: false,
        }
    }

    /// Like [`Callback::queue`], bounded by other channels.
    ///
    /// Waits for `begin` (if any) before returning; an emission of `end`
    /// terminates the iteration.
    pub fn queue_between(
        &self,
        begin: Option<&Callback<A, R>>,
        end: Option<&Callback<A, R>>,
        deferred: bool,
        timeout: Option<Duration>,
    ) -> Result<Queue<A, R>> {
        if let Some(begin) = begin {
            begin.wait(false, timeout)?;
        }
        let mut queue = self.queue(deferred, timeout);
        queue.end = end.cloned();
        Ok(queue)
    }
}

impl<A, R> Clone for Callback<A, R> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<A, R> Default for Callback<A, R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A, R> fmt::Debug for Callback<A, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Callback")
            .field("id", &self.id())
            .field("listeners", &self.len())
            .finish()
    }
}

impl<A, R> IntoFuture for Callback<A, R>
where
    A: Clone + Send + 'static,
    R: Clone + Send + 'static,
{
    type Output = Result<ExecutionContext<A, R>, CallbackError>;
    type IntoFuture = CallbackFuture<A, R>;

    fn into_future(self) -> Self::IntoFuture {
        self.future_async(false)
    }
}

impl<A, R> IntoFuture for &Callback<A, R>
where
    A: Clone + Send + 'static,
    R: Clone + Send + 'static,
{
    type Output = Result<ExecutionContext<A, R>, CallbackError>;
    type IntoFuture = CallbackFuture<A, R>;

    fn into_future(self) -> Self::IntoFuture {
        self.future_async(false)
    }
}

type Gate<A> = Box<dyn Fn(&A) -> bool + Send + Sync>;

/// Re-emits into a child channel, optionally gated.
struct Relay<A, R> {
    target: Callback<A, R>,
    gate: Option<Gate<A>>,
}

impl<A, R> Relay<A, R> {
    fn new(target: Callback<A, R>, gate: Option<Gate<A>>) -> Self {
        Self { target, gate }
    }
}

impl<A, R> Invoke<A, R> for Relay<A, R> {
    fn invoke(&self, args: &A) -> ListenerResult<R> {
        if self.gate.as_ref().map_or(true, |gate| gate(args)) {
            self.target.emit(args)?;
        }
        // The child's own results stay with the child.
        Ok(Flow::Continue)
    }
}

/// Counting predicate that accepts every `interval`-th call.
#[derive(Debug)]
pub struct FrequencyPredicate {
    interval: usize,
    counter: Mutex<usize>,
}

impl FrequencyPredicate {
    /// An interval of 0 or 1 accepts every call.
    pub fn new(interval: usize) -> Self {
        Self {
            interval,
            counter: Mutex::new(0),
        }
    }

    pub fn check(&self) -> bool {
        let mut counter = self.counter.lock();
        *counter += 1;
        if self.interval <= 1 || *counter % self.interval == 0 {
            *counter = 0;
            return true;
        }
        false
    }
}

/// Sampling constructors for a callback.
pub struct Sampler<'a, A, R> {
    parent: &'a Callback<A, R>,
}

impl<A: 'static, R: 'static> Sampler<'_, A, R> {
    /// A child channel emitting on every `interval`-th parent emission.
    pub fn uniform(&self, interval: usize) -> Callback<A, R> {
        let predicate = FrequencyPredicate::new(interval);
        self.parent.filter(move |_| predicate.check())
    }
}

/// Iterator over successive emissions of a callback.
///
/// Yields `Err(CallbackError::Timeout)` once if a wait times out, then ends.
/// Cancellation (including an emission of the `end` channel) ends the
/// iteration silently.
pub struct Queue<A, R> {
    source: Callback<A, R>,
    end: Option<Callback<A, R>>,
    mode: AckMode,
    timeout: Option<Duration>,
    done: bool,
}

impl<A, R> Iterator for Queue<A, R>
where
    A: Clone + Send + 'static,
    R: Clone + Send + 'static,
{
    type Item = Result<ExecutionContext<A, R>, CallbackError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let waiter = Waiter::register(&self.source, self.mode, None);
        let stopper = self.end.as_ref().map(|end| {
            let cancel = waiter.canceller();
            let listener = Listener::new(move |_| {
                cancel("queue ended");
                Ok(Flow::Continue)
            });
            (end.clone(), end.insert(listener.clone()).then(|| listener.id()))
        });

        let outcome = waiter.result(self.timeout);
        if let Some((end, Some(id))) = stopper {
            end.off(id);
        }

        match outcome {
            Ok(ctx) => Some(Ok(ctx)),
            Err(CallbackError::Cancelled(_)) => {
                self.done = true;
                None
            }
            Err(err) => {
                self.done = true;
                Some(Err(err))
            }
        }
    }
}
