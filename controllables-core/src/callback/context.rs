//! Execution Context
//!
//! An [`ExecutionContext`] is produced per invocation of a waiting listener:
//! the arguments of the emission travel to the consumer, and an [`Ack`]
//! travels back.
//!
//! # Acknowledgement Modes
//!
//! - **Immediate**: [`Ack::get`] never blocks and returns whatever was set
//!   so far (`None` until someone sets a value).
//! - **Deferred**: [`Ack::get`] blocks until [`Ack::set`] or
//!   [`Ack::release`] is called from any thread, the ack is cancelled, or
//!   the timeout elapses. Each wake-up consumes the signal, so a later `get`
//!   blocks again until the next `set`.
//!
//! Deferred acks are how a consumer applies backpressure: the firing thread
//! stays parked in `get` until the consumer has finished with the value.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use indexmap::IndexMap;
use parking_lot::{Condvar, Mutex};
use smallvec::SmallVec;

use crate::error::{AckError, Result};

/// Key into an [`Arguments`] bag.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ArgKey {
    Index(usize),
    Name(String),
}

impl From<usize> for ArgKey {
    fn from(index: usize) -> Self {
        ArgKey::Index(index)
    }
}

impl From<&str> for ArgKey {
    fn from(name: &str) -> Self {
        ArgKey::Name(name.to_string())
    }
}

/// Ordered positional and named arguments.
#[derive(Clone, PartialEq)]
pub struct Arguments<T> {
    positional: SmallVec<[T; 4]>,
    named: IndexMap<String, T>,
}

impl<T> Arguments<T> {
    pub fn new() -> Self {
        Self {
            positional: SmallVec::new(),
            named: IndexMap::new(),
        }
    }

    pub fn positional<I: IntoIterator<Item = T>>(values: I) -> Self {
        Self {
            positional: values.into_iter().collect(),
            named: IndexMap::new(),
        }
    }

    pub fn push(mut self, value: T) -> Self {
        self.positional.push(value);
        self
    }

    pub fn with(mut self, name: impl Into<String>, value: T) -> Self {
        self.named.insert(name.into(), value);
        self
    }

    pub fn get(&self, key: impl Into<ArgKey>) -> Option<&T> {
        match key.into() {
            ArgKey::Index(index) => self.positional.get(index),
            ArgKey::Name(name) => self.named.get(&name),
        }
    }

    /// Positional indices first, then names in insertion order.
    pub fn keys(&self) -> impl Iterator<Item = ArgKey> + '_ {
        (0..self.positional.len())
            .map(ArgKey::Index)
            .chain(self.named.keys().cloned().map(ArgKey::Name))
    }

    pub fn values(&self) -> impl Iterator<Item = &T> {
        self.positional.iter().chain(self.named.values())
    }

    pub fn len(&self) -> usize {
        self.positional.len() + self.named.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T> Default for Arguments<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: fmt::Debug> fmt::Debug for Arguments<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Arguments(")?;
        let mut first = true;
        for value in &self.positional {
            if !first {
                write!(f, ", ")?;
            }
            write!(f, "{value:?}")?;
            first = false;
        }
        for (name, value) in &self.named {
            if !first {
                write!(f, ", ")?;
            }
            write!(f, "{name}={value:?}")?;
            first = false;
        }
        write!(f, ")")
    }
}

/// Whether [`Ack::get`] blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AckMode {
    #[default]
    Immediate,
    Deferred,
}

impl AckMode {
    pub fn from_deferred(deferred: bool) -> Self {
        if deferred {
            AckMode::Deferred
        } else {
            AckMode::Immediate
        }
    }
}

struct AckState<R> {
    value: Option<R>,
    signalled: bool,
    cancelled: bool,
}

struct AckInner<R> {
    mode: AckMode,
    state: Mutex<AckState<R>>,
    signal: Condvar,
}

/// Single-slot, optionally blocking handoff cell.
///
/// Clones share the same cell: the producer keeps one to wait on, the
/// consumer receives another inside the [`ExecutionContext`].
pub struct Ack<R> {
    inner: Arc<AckInner<R>>,
}

impl<R> Ack<R> {
    pub fn new(mode: AckMode) -> Self {
        Self {
            inner: Arc::new(AckInner {
                mode,
                state: Mutex::new(AckState {
                    value: None,
                    signalled: false,
                    cancelled: false,
                }),
                signal: Condvar::new(),
            }),
        }
    }

    pub fn immediate() -> Self {
        Self::new(AckMode::Immediate)
    }

    pub fn deferred() -> Self {
        Self::new(AckMode::Deferred)
    }

    pub fn mode(&self) -> AckMode {
        self.inner.mode
    }

    pub fn is_deferred(&self) -> bool {
        self.inner.mode == AckMode::Deferred
    }

    /// Store `value` (last write wins) and wake a blocked `get`.
    pub fn set(&self, value: R) {
        let mut state = self.inner.state.lock();
        state.value = Some(value);
        state.signalled = true;
        self.inner.signal.notify_all();
    }

    /// Wake a blocked `get` without storing a value.
    pub fn release(&self) {
        let mut state = self.inner.state.lock();
        state.signalled = true;
        self.inner.signal.notify_all();
    }

    /// Cancel the cell: every current and future `get` fails with
    /// [`AckError::Cancelled`].
    pub fn cancel(&self) {
        let mut state = self.inner.state.lock();
        state.cancelled = true;
        self.inner.signal.notify_all();
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.state.lock().cancelled
    }

    /// Cancel a deferred cell that nobody signalled, so a parked `get`
    /// cannot outlive the last consumer.
    fn abandon(&self) {
        if self.inner.mode != AckMode::Deferred {
            return;
        }
        let mut state = self.inner.state.lock();
        if !state.signalled {
            state.cancelled = true;
            self.inner.signal.notify_all();
        }
    }

    /// Read the acknowledged value.
    ///
    /// `Ok(None)` means released without a value; a missed deadline is
    /// [`AckError::Timeout`]. `None` for `timeout` waits forever.
    pub fn get(&self, timeout: Option<Duration>) -> Result<Option<R>, AckError>
    where
        R: Clone,
    {
        let mut state = self.inner.state.lock();
        if self.inner.mode == AckMode::Deferred {
            let deadline = timeout.map(|t| Instant::now() + t);
            while !state.signalled && !state.cancelled {
                match deadline {
                    Some(deadline) => {
                        if self.inner.signal.wait_until(&mut state, deadline).timed_out()
                            && !state.signalled
                            && !state.cancelled
                        {
                            return Err(AckError::Timeout);
                        }
                    }
                    None => self.inner.signal.wait(&mut state),
                }
            }
            state.signalled = false;
        }
        if state.cancelled {
            return Err(AckError::Cancelled);
        }
        Ok(state.value.clone())
    }
}

impl<R> Clone for Ack<R> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<R> Default for Ack<R> {
    fn default() -> Self {
        Self::immediate()
    }
}

impl<R> fmt::Debug for Ack<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("Ack")
            .field("mode", &self.inner.mode)
            .field("has_value", &state.value.is_some())
            .field("cancelled", &state.cancelled)
            .finish()
    }
}

/// Consumer-side handle on an [`Ack`]; abandons the ack on drop unless
/// disarmed.
struct Pending<R> {
    ack: Ack<R>,
    armed: bool,
}

impl<R> Drop for Pending<R> {
    fn drop(&mut self) {
        if self.armed {
            self.ack.abandon();
        }
    }
}

/// Arguments of one emission plus the acknowledgement flowing back.
///
/// Dropping a context that was never acknowledged cancels a deferred ack,
/// so the firing thread resumes instead of staying parked.
pub struct ExecutionContext<A, R> {
    args: A,
    pending: Pending<R>,
}

impl<A, R> ExecutionContext<A, R> {
    pub fn new(args: A, ack: Ack<R>) -> Self {
        Self {
            args,
            pending: Pending { ack, armed: true },
        }
    }

    /// Produced by the caller; consumed by the callee.
    pub fn args(&self) -> &A {
        &self.args
    }

    /// Produced by the callee; consumed by the caller.
    pub fn ack(&self) -> &Ack<R> {
        &self.pending.ack
    }

    /// Acknowledge with `value`.
    pub fn ret(&self, value: R) {
        self.pending.ack.set(value);
    }

    /// Acknowledge without a value.
    pub fn release(&self) {
        self.pending.ack.release();
    }

    /// Run `f` over the arguments and acknowledge with its outcome.
    ///
    /// `Ok(Some(v))` sets `v`, `Ok(None)` releases, and an error cancels the
    /// ack (so a parked firing thread resumes) before being returned.
    pub fn scope<F>(self, f: F) -> Result<()>
    where
        F: FnOnce(&A) -> Result<Option<R>>,
    {
        let ack = &self.pending.ack;
        match f(&self.args) {
            Ok(Some(value)) => {
                ack.set(value);
                Ok(())
            }
            Ok(None) => {
                ack.release();
                Ok(())
            }
            Err(err) => {
                ack.cancel();
                Err(err)
            }
        }
    }

    /// Split the context; the caller takes over acknowledging.
    pub fn into_parts(self) -> (A, Ack<R>) {
        let ExecutionContext { args, mut pending } = self;
        pending.armed = false;
        (args, pending.ack.clone())
    }
}

impl<A: fmt::Debug, R> fmt::Debug for ExecutionContext<A, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("args", &self.args)
            .field("ack", &self.pending.ack)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use std::thread;

    #[test]
    fn arguments_keys_and_lookup() {
        let args = Arguments::positional([1, 2]).with("step", 3);

        assert_eq!(args.get(1), Some(&2));
        assert_eq!(args.get("step"), Some(&3));
        assert_eq!(args.get("missing"), None);
        assert_eq!(
            args.keys().collect::<Vec<_>>(),
            vec![ArgKey::Index(0), ArgKey::Index(1), ArgKey::Name("step".into())]
        );
        assert_eq!(args.values().copied().collect::<Vec<_>>(), vec![1, 2, 3]);
        assert_eq!(format!("{args:?}"), "Arguments(1, 2, step=3)");
    }

    #[test]
    fn immediate_ack_never_blocks() {
        let ack: Ack<i32> = Ack::immediate();
        assert_eq!(ack.get(None).unwrap(), None);

        ack.set(1);
        ack.set(2);
        assert_eq!(ack.get(None).unwrap(), Some(2));
    }

    #[test]
    fn deferred_ack_hands_off_across_threads() {
        let ack: Ack<&'static str> = Ack::deferred();
        let remote = ack.clone();

        let setter = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            remote.set("done");
        });

        assert_eq!(ack.get(Some(Duration::from_secs(1))).unwrap(), Some("done"));
        setter.join().unwrap();
    }

    #[test]
    fn deferred_ack_times_out() {
        let ack: Ack<i32> = Ack::deferred();
        let started = Instant::now();

        assert_eq!(ack.get(Some(Duration::from_millis(30))), Err(AckError::Timeout));
        assert!(started.elapsed() >= Duration::from_millis(30));
    }

    #[test]
    fn release_is_distinct_from_timeout() {
        let ack: Ack<i32> = Ack::deferred();
        ack.release();
        assert_eq!(ack.get(Some(Duration::from_millis(10))), Ok(None));
    }

    #[test]
    fn signal_is_consumed_by_get() {
        let ack: Ack<i32> = Ack::deferred();
        ack.set(5);
        assert_eq!(ack.get(Some(Duration::from_millis(10))), Ok(Some(5)));
        assert_eq!(ack.get(Some(Duration::from_millis(10))), Err(AckError::Timeout));
    }

    #[test]
    fn cancel_unblocks_waiter() {
        let ack: Ack<i32> = Ack::deferred();
        let remote = ack.clone();

        let canceller = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            remote.cancel();
        });

        assert_eq!(ack.get(None), Err(AckError::Cancelled));
        canceller.join().unwrap();
    }

    #[test]
    fn scope_acknowledges_outcome() {
        let ctx = ExecutionContext::new(Arguments::positional([2]), Ack::<i32>::deferred());
        let ack = ctx.ack().clone();
        ctx.scope(|args| Ok(args.get(0).map(|v| v * 10))).unwrap();
        assert_eq!(ack.get(None).unwrap(), Some(20));

        let ctx = ExecutionContext::new((), Ack::<i32>::deferred());
        let ack = ctx.ack().clone();
        let err = ctx.scope(|_| Err(Error::listener("nope"))).unwrap_err();
        assert!(matches!(err, Error::Listener(_)));
        assert_eq!(ack.get(None), Err(AckError::Cancelled));
    }

    #[test]
    fn dropped_context_cancels_deferred_ack() {
        let ack: Ack<i32> = Ack::deferred();
        let ctx = ExecutionContext::new((), ack.clone());
        drop(ctx);
        assert_eq!(ack.get(None), Err(AckError::Cancelled));

        // An acknowledged context leaves its value behind.
        let ack: Ack<i32> = Ack::deferred();
        let ctx = ExecutionContext::new((), ack.clone());
        ctx.ret(3);
        drop(ctx);
        assert_eq!(ack.get(None), Ok(Some(3)));

        let ack: Ack<i32> = Ack::deferred();
        let (_, taken) = ExecutionContext::new((), ack.clone()).into_parts();
        assert_eq!(ack.get(Some(Duration::from_millis(10))), Err(AckError::Timeout));
        taken.release();
        assert_eq!(ack.get(None), Ok(None));
    }
}
