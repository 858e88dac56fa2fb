//! Attachment Model
//!
//! A component is a leaf object bound to exactly one owning parent (a
//! callback, a variable, a manager). The binding is an explicit two-state
//! machine:
//!
//! ```text
//!              attach(p)                    attach(p)  -> no-op
//! Unattached ------------> Attached(p) <---------------+
//!      ^                       |   attach(q), q != p  -> AlreadyAttached
//!      +------- detach --------+
//! ```
//!
//! Parents are compared by identity (pointer equality), never by value.
//!
//! # Thread Safety
//!
//! The state lives behind a `parking_lot::RwLock`, so concurrent attach calls
//! from different threads cannot both succeed with different parents.

use std::sync::{Arc, Weak};

use parking_lot::RwLock;
use tracing::debug;

use crate::error::{AttachError, Result};

/// Identity comparison for parent handles.
pub trait ParentHandle: Clone + Send + Sync {
    /// Whether both handles designate the same parent object.
    fn same_parent(&self, other: &Self) -> bool;
}

impl<T: ?Sized + Send + Sync> ParentHandle for Arc<T> {
    fn same_parent(&self, other: &Self) -> bool {
        Arc::as_ptr(self) as *const () == Arc::as_ptr(other) as *const ()
    }
}

impl<T: ?Sized + Send + Sync> ParentHandle for Weak<T> {
    fn same_parent(&self, other: &Self) -> bool {
        Weak::as_ptr(self) as *const () == Weak::as_ptr(other) as *const ()
    }
}

/// The two states of an attachment.
#[derive(Debug, Clone)]
pub enum AttachState<P> {
    Unattached,
    Attached(P),
}

/// Outcome of a successful [`Attachment::attach`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// The component moved from unattached to attached.
    Attached,
    /// The component was already attached to the same parent.
    Unchanged,
}

/// Single-owner parent slot.
#[derive(Debug)]
pub struct Attachment<P> {
    state: RwLock<AttachState<P>>,
}

impl<P: ParentHandle> Attachment<P> {
    /// Create an unattached slot.
    pub fn new() -> Self {
        Self {
            state: RwLock::new(AttachState::Unattached),
        }
    }

    /// Create a slot already bound to `parent`.
    pub fn bound(parent: P) -> Self {
        Self {
            state: RwLock::new(AttachState::Attached(parent)),
        }
    }

    /// Bind to `parent`.
    ///
    /// Re-attaching to the identical parent is a no-op; attaching to any other
    /// parent while bound fails with [`AttachError::AlreadyAttached`].
    pub fn attach(&self, parent: P) -> Result<Transition, AttachError> {
        let mut state = self.state.write();
        match &*state {
            AttachState::Attached(current) if current.same_parent(&parent) => {
                Ok(Transition::Unchanged)
            }
            AttachState::Attached(_) => Err(AttachError::AlreadyAttached),
            AttachState::Unattached => {
                *state = AttachState::Attached(parent);
                Ok(Transition::Attached)
            }
        }
    }

    /// Unbind, returning the former parent.
    ///
    /// When `parent` is given it must be the one currently bound.
    pub fn detach(&self, parent: Option<&P>) -> Result<P, AttachError> {
        let mut state = self.state.write();
        match &*state {
            AttachState::Unattached => Err(AttachError::NotAttached),
            AttachState::Attached(current) => {
                if let Some(expected) = parent {
                    if !current.same_parent(expected) {
                        return Err(AttachError::ParentMismatch);
                    }
                }
                match std::mem::replace(&mut *state, AttachState::Unattached) {
                    AttachState::Attached(previous) => Ok(previous),
                    AttachState::Unattached => Err(AttachError::NotAttached),
                }
            }
        }
    }

    /// The bound parent.
    pub fn parent(&self) -> Result<P, AttachError> {
        match &*self.state.read() {
            AttachState::Attached(parent) => Ok(parent.clone()),
            AttachState::Unattached => Err(AttachError::NoParent),
        }
    }

    pub fn is_attached(&self) -> bool {
        matches!(&*self.state.read(), AttachState::Attached(_))
    }
}

impl<P: ParentHandle> Default for Attachment<P> {
    fn default() -> Self {
        Self::new()
    }
}

/// A leaf object owned by exactly one parent.
///
/// Implementors expose their [`Attachment`] slot and may hook the
/// transitions; the provided methods drive the state machine.
pub trait Component {
    type Parent: ParentHandle;

    /// The slot holding this component's parent.
    fn attachment(&self) -> &Attachment<Self::Parent>;

    /// Called once after a fresh attach. Failing rolls the attach back.
    fn on_attach(&self, _parent: &Self::Parent) -> Result<()> {
        Ok(())
    }

    /// Called once after a detach.
    fn on_detach(&self, _parent: &Self::Parent) -> Result<()> {
        Ok(())
    }

    /// Attach to `parent`, returning `self` for chaining.
    fn attach(&self, parent: Self::Parent) -> Result<&Self> {
        let hook_parent = parent.clone();
        match self.attachment().attach(parent)? {
            Transition::Unchanged => Ok(self),
            Transition::Attached => {
                debug!(component = std::any::type_name::<Self>(), "attached");
                if let Err(err) = self.on_attach(&hook_parent) {
                    let _ = self.attachment().detach(Some(&hook_parent));
                    return Err(err);
                }
                Ok(self)
            }
        }
    }

    /// Detach from the current parent, returning `self` for chaining.
    fn detach(&self, parent: Option<&Self::Parent>) -> Result<&Self> {
        let previous = self.attachment().detach(parent)?;
        debug!(component = std::any::type_name::<Self>(), "detached");
        self.on_detach(&previous)?;
        Ok(self)
    }

    /// The current parent, or [`AttachError::NoParent`].
    fn parent(&self) -> Result<Self::Parent> {
        Ok(self.attachment().parent()?)
    }
}
