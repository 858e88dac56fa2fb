//! One-shot handlers bridging a firing thread to a waiting consumer.
//!
//! A [`FutureHandler`] is registered on a callback like any other listener.
//! On its first invocation it removes itself from the callback, packs the
//! arguments into an [`ExecutionContext`] and hands the context to the
//! consumer: a blocked thread ([`Waiter`]) or an async task
//! ([`CallbackFuture`]). The firing thread then waits on the context's ack,
//! which returns immediately unless the handler is deferred.
//!
//! Cancelling a handler before delivery unblocks the consumer with
//! [`CallbackError::Cancelled`]. Once the consumer owns the context, the ack
//! is theirs to settle.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tokio::sync::oneshot;
use tracing::{debug, warn};

use super::channel::WeakCallback;
use super::{Callback, Flow, Invoke, Listener, ListenerId, ListenerResult};
use super::context::{Ack, AckMode, ExecutionContext};
use crate::component::{Attachment, Component};
use crate::error::{AckError, CallbackError, Result};

enum Slot<T> {
    Empty,
    Ready(T),
    Taken,
    Cancelled(String),
}

/// Single-item rendezvous between one producer and one blocked consumer.
pub(crate) struct Handoff<T> {
    slot: Mutex<Slot<T>>,
    ready: Condvar,
}

impl<T> Handoff<T> {
    pub(crate) fn new() -> Self {
        Self {
            slot: Mutex::new(Slot::Empty),
            ready: Condvar::new(),
        }
    }

    /// Offer `item`. Fails if an item was already offered or the consumer left.
    pub(crate) fn put(&self, item: T) -> bool {
        let mut slot = self.slot.lock();
        if !matches!(*slot, Slot::Empty) {
            return false;
        }
        *slot = Slot::Ready(item);
        self.ready.notify_all();
        true
    }

    /// Close the handoff. Returns whether the consumer had not taken an item.
    pub(crate) fn cancel(&self, reason: &str) -> bool {
        let mut slot = self.slot.lock();
        match *slot {
            Slot::Empty | Slot::Ready(_) => {
                *slot = Slot::Cancelled(reason.to_string());
                self.ready.notify_all();
                true
            }
            Slot::Taken | Slot::Cancelled(_) => false,
        }
    }

    pub(crate) fn take(&self, timeout: Option<Duration>) -> Result<T, CallbackError> {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut slot = self.slot.lock();
        loop {
            match std::mem::replace(&mut *slot, Slot::Taken) {
                Slot::Ready(item) => return Ok(item),
                Slot::Cancelled(reason) => {
                    *slot = Slot::Cancelled(reason.clone());
                    return Err(CallbackError::Cancelled(reason));
                }
                Slot::Taken => return Err(CallbackError::Cancelled("already taken".into())),
                Slot::Empty => *slot = Slot::Empty,
            }
            match deadline {
                Some(deadline) => {
                    if self.ready.wait_until(&mut slot, deadline).timed_out()
                        && matches!(*slot, Slot::Empty)
                    {
                        return Err(CallbackError::Timeout);
                    }
                }
                None => self.ready.wait(&mut slot),
            }
        }
    }
}

type AsyncSender<A, R> = oneshot::Sender<Result<ExecutionContext<A, R>, CallbackError>>;
type AsyncReceiver<A, R> = oneshot::Receiver<Result<ExecutionContext<A, R>, CallbackError>>;

enum Delivery<A, R> {
    Blocking(Arc<Handoff<ExecutionContext<A, R>>>),
    Async(Mutex<Option<AsyncSender<A, R>>>),
}

impl<A, R> Delivery<A, R> {
    fn deliver(&self, ctx: ExecutionContext<A, R>) -> bool {
        match self {
            Delivery::Blocking(handoff) => handoff.put(ctx),
            Delivery::Async(sender) => match sender.lock().take() {
                Some(sender) => sender.send(Ok(ctx)).is_ok(),
                None => false,
            },
        }
    }

    fn cancel(&self, reason: &str) -> bool {
        match self {
            Delivery::Blocking(handoff) => handoff.cancel(reason),
            Delivery::Async(sender) => match sender.lock().take() {
                Some(sender) => {
                    let _ = sender.send(Err(CallbackError::Cancelled(reason.to_string())));
                    true
                }
                None => false,
            },
        }
    }
}

/// Self-removing listener that resolves a pending wait.
pub(crate) struct FutureHandler<A, R> {
    id: ListenerId,
    mode: AckMode,
    ack_timeout: Option<Duration>,
    attachment: Attachment<WeakCallback<A, R>>,
    cancelled: Mutex<Option<String>>,
    pending: Mutex<Option<Ack<R>>>,
    delivery: Delivery<A, R>,
}

impl<A, R> FutureHandler<A, R> {
    fn new(
        parent: &Callback<A, R>,
        mode: AckMode,
        ack_timeout: Option<Duration>,
        delivery: Delivery<A, R>,
    ) -> Self {
        Self {
            id: ListenerId::new(),
            mode,
            ack_timeout,
            attachment: Attachment::bound(parent.downgrade()),
            cancelled: Mutex::new(None),
            pending: Mutex::new(None),
            delivery,
        }
    }

    fn leave_parent(&self) {
        if let Some(parent) = self.attachment.parent().ok().and_then(|weak| Callback::upgrade(&weak)) {
            parent.off(self.id);
        }
    }

    fn shutdown(&self, reason: &str) {
        {
            let mut cancelled = self.cancelled.lock();
            if cancelled.is_some() {
                return;
            }
            *cancelled = Some(reason.to_string());
        }
        debug!(listener = %self.id, reason, "handler cancelled");
        if self.delivery.cancel(reason) {
            if let Some(ack) = self.pending.lock().take() {
                ack.cancel();
            }
        }
        self.leave_parent();
    }
}

impl<A, R> Component for FutureHandler<A, R> {
    type Parent = WeakCallback<A, R>;

    fn attachment(&self) -> &Attachment<WeakCallback<A, R>> {
        &self.attachment
    }
}

impl<A, R> Invoke<A, R> for FutureHandler<A, R>
where
    A: Clone + Send + 'static,
    R: Clone + Send + 'static,
{
    fn invoke(&self, args: &A) -> ListenerResult<R> {
        self.leave_parent();
        if self.cancelled.lock().is_some() {
            return Ok(Flow::Continue);
        }

        let ack = Ack::new(self.mode);
        *self.pending.lock() = Some(ack.clone());
        if !self.delivery.deliver(ExecutionContext::new(args.clone(), ack.clone())) {
            return Ok(Flow::Continue);
        }

        match ack.get(self.ack_timeout) {
            Ok(Some(value)) => Ok(Flow::Value(value)),
            Ok(None) | Err(AckError::Cancelled) => Ok(Flow::Continue),
            Err(AckError::Timeout) => {
                warn!(listener = %self.id, "acknowledgement timed out");
                Err(AckError::Timeout.into())
            }
        }
    }

    fn cancel(&self, reason: &str) {
        self.shutdown(reason);
    }

    fn attached(&self, parent: &Callback<A, R>) -> Result<()> {
        Component::attach(self, parent.downgrade()).map(|_| ())
    }

    fn detached(&self, parent: &Callback<A, R>) {
        let _ = Component::detach(self, Some(&parent.downgrade()));
    }
}

fn register<A, R>(parent: &Callback<A, R>, handler: &Arc<FutureHandler<A, R>>)
where
    A: Clone + Send + 'static,
    R: Clone + Send + 'static,
{
    // Bound at construction, so the attach hook has nothing to do.
    parent.insert(Listener::from_parts(handler.id, handler.clone()));
}

/// Pending synchronous wait on a callback.
pub struct Waiter<A, R> {
    handler: Arc<FutureHandler<A, R>>,
    handoff: Arc<Handoff<ExecutionContext<A, R>>>,
}

impl<A, R> Waiter<A, R>
where
    A: Clone + Send + 'static,
    R: Clone + Send + 'static,
{
    pub(crate) fn register(parent: &Callback<A, R>, mode: AckMode, ack_timeout: Option<Duration>) -> Self {
        let handoff = Arc::new(Handoff::new());
        let handler = Arc::new(FutureHandler::new(
            parent,
            mode,
            ack_timeout,
            Delivery::Blocking(handoff.clone()),
        ));
        register(parent, &handler);
        Self { handler, handoff }
    }

    /// Id of the underlying one-shot listener.
    pub fn id(&self) -> ListenerId {
        self.handler.id
    }

    /// Block until the callback fires.
    ///
    /// On timeout the handler is withdrawn, so a later emission does not
    /// park the firing thread on a context nobody will acknowledge.
    pub fn result(self, timeout: Option<Duration>) -> Result<ExecutionContext<A, R>, CallbackError> {
        self.handoff.take(timeout)
    }

    /// Withdraw the wait; a blocked [`Waiter::result`] fails with `Cancelled`.
    pub fn cancel(&self, reason: &str) {
        self.handler.shutdown(reason);
    }

    pub(crate) fn canceller(&self) -> Arc<dyn Fn(&str) + Send + Sync> {
        let handler = Arc::downgrade(&self.handler);
        Arc::new(move |reason: &str| {
            if let Some(handler) = handler.upgrade() {
                handler.shutdown(reason);
            }
        })
    }
}

impl<A, R> Drop for Waiter<A, R> {
    fn drop(&mut self) {
        self.handler.shutdown("waiter dropped");
    }
}

/// Pending asynchronous wait on a callback.
///
/// Resolves to the [`ExecutionContext`] of the next emission. Dropping an
/// unresolved future withdraws its listener.
pub struct CallbackFuture<A, R> {
    receiver: AsyncReceiver<A, R>,
    handler: Arc<FutureHandler<A, R>>,
    done: bool,
}

impl<A, R> CallbackFuture<A, R>
where
    A: Clone + Send + 'static,
    R: Clone + Send + 'static,
{
    pub(crate) fn register(parent: &Callback<A, R>, mode: AckMode, ack_timeout: Option<Duration>) -> Self {
        let (sender, receiver) = oneshot::channel();
        let handler = Arc::new(FutureHandler::new(
            parent,
            mode,
            ack_timeout,
            Delivery::Async(Mutex::new(Some(sender))),
        ));
        register(parent, &handler);
        Self {
            receiver,
            handler,
            done: false,
        }
    }

    pub fn id(&self) -> ListenerId {
        self.handler.id
    }

    pub fn cancel(&self, reason: &str) {
        self.handler.shutdown(reason);
    }
}

impl<A, R> Future for CallbackFuture<A, R> {
    type Output = Result<ExecutionContext<A, R>, CallbackError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        match Pin::new(&mut this.receiver).poll(cx) {
            Poll::Ready(Ok(outcome)) => {
                this.done = true;
                Poll::Ready(outcome)
            }
            Poll::Ready(Err(_)) => {
                this.done = true;
                Poll::Ready(Err(CallbackError::Cancelled("handler dropped".into())))
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl<A, R> Drop for CallbackFuture<A, R> {
    fn drop(&mut self) {
        if self.done {
            return;
        }
        self.handler.shutdown("future dropped");
        // A context already in flight would otherwise leave a deferred
        // firing thread parked forever.
        self.receiver.close();
        if let Ok(Ok(ctx)) = self.receiver.try_recv() {
            ctx.ack().cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn handoff_delivers_once() {
        let handoff = Handoff::new();
        assert!(handoff.put(1));
        assert!(!handoff.put(2));
        assert_eq!(handoff.take(None), Ok(1));
        assert!(!handoff.cancel("late"));
    }

    #[test]
    fn handoff_times_out_then_refuses() {
        let handoff: Handoff<i32> = Handoff::new();
        assert_eq!(handoff.take(Some(Duration::from_millis(10))), Err(CallbackError::Timeout));
        assert!(handoff.cancel("gone"));
        assert!(!handoff.put(1));
        assert_eq!(
            handoff.take(None),
            Err(CallbackError::Cancelled("gone".into()))
        );
    }

    #[test]
    fn waiter_detaches_after_first_emission() {
        let callback: Callback<i32, i32> = Callback::new();
        let waiter = callback.future(false);
        assert!(callback.contains(waiter.id()));

        callback.emit(&3).unwrap();
        assert!(callback.is_empty());

        let ctx = waiter.result(Some(Duration::from_millis(10))).unwrap();
        assert_eq!(*ctx.args(), 3);
    }

    #[test]
    fn deferred_waiter_returns_value_to_firing_thread() {
        let callback: Callback<i32, i32> = Callback::new();
        let waiter = callback.future(true);

        let firing = {
            let callback = callback.clone();
            thread::spawn(move || callback.emit(&4).unwrap())
        };

        let ctx = waiter.result(Some(Duration::from_secs(1))).unwrap();
        ctx.ret(ctx.args() * 2);

        let results = firing.join().unwrap();
        assert_eq!(results.values().copied().collect::<Vec<_>>(), vec![8]);
    }

    #[test]
    fn dropped_waiter_leaves_callback() {
        let callback: Callback<(), ()> = Callback::new();
        let waiter = callback.future(true);
        drop(waiter);

        assert!(callback.is_empty());
        assert!(callback.emit(&()).unwrap().is_empty());
    }

    #[test]
    fn cancel_unblocks_waiter() {
        let callback: Callback<(), ()> = Callback::new();
        let waiter = callback.future(false);

        let canceller = {
            let callback = callback.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(20));
                callback.cancel("shutdown");
            })
        };

        assert_eq!(
            waiter.result(None).err(),
            Some(CallbackError::Cancelled("shutdown".into()))
        );
        canceller.join().unwrap();
        assert!(callback.is_empty());
    }
}
