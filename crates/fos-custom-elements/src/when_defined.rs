//! Deferred completion for `whenDefined`
//!
//! One [`Deferred`] exists per queried tag name. Its completion is a
//! `futures` oneshot receiver made [`Shared`], so every [`WhenDefined`] handed
//! out for that name observes the same resolution.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll};

use futures::channel::oneshot;
use futures::future::{FutureExt, Shared};

use crate::error::DefinitionError;

type Completion = Shared<oneshot::Receiver<()>>;

struct DeferredState {
    resolved: Cell<bool>,
    sender: RefCell<Option<oneshot::Sender<()>>>,
    completion: Completion,
}

/// Completion record for one tag name
#[derive(Clone)]
pub(crate) struct Deferred {
    state: Rc<DeferredState>,
}

impl Deferred {
    pub(crate) fn new() -> Self {
        let (sender, receiver) = oneshot::channel();
        Self {
            state: Rc::new(DeferredState {
                resolved: Cell::new(false),
                sender: RefCell::new(Some(sender)),
                completion: receiver.shared(),
            }),
        }
    }

    /// Resolve and wake waiters. Returns `false` if already resolved.
    pub(crate) fn resolve(&self) -> bool {
        if self.state.resolved.replace(true) {
            return false;
        }
        let sender = self.state.sender.borrow_mut().take();
        if let Some(sender) = sender {
            let _ = sender.send(());
        }
        true
    }

    pub(crate) fn is_resolved(&self) -> bool {
        self.state.resolved.get()
    }

    pub(crate) fn future(&self) -> WhenDefined {
        WhenDefined {
            inner: Inner::Pending {
                deferred: self.clone(),
                completion: self.state.completion.clone(),
            },
        }
    }
}

impl fmt::Debug for Deferred {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Deferred")
            .field("resolved", &self.is_resolved())
            .finish()
    }
}

#[derive(Clone)]
enum Inner {
    Pending {
        deferred: Deferred,
        completion: Completion,
    },
    Rejected(DefinitionError),
}

/// Future returned by `whenDefined`
///
/// Resolves once the tag's catch-up upgrade pass has completed.
#[derive(Clone)]
#[must_use = "futures do nothing unless polled"]
pub struct WhenDefined {
    inner: Inner,
}

impl WhenDefined {
    pub(crate) fn rejected(error: DefinitionError) -> Self {
        Self {
            inner: Inner::Rejected(error),
        }
    }

    /// Check completion without polling
    pub fn is_resolved(&self) -> bool {
        match &self.inner {
            Inner::Pending { deferred, .. } => deferred.is_resolved(),
            Inner::Rejected(_) => false,
        }
    }

    pub fn is_rejected(&self) -> bool {
        matches!(self.inner, Inner::Rejected(_))
    }

    /// Whether both handles share one completion record
    pub fn same_as(&self, other: &WhenDefined) -> bool {
        match (&self.inner, &other.inner) {
            (Inner::Pending { deferred: a, .. }, Inner::Pending { deferred: b, .. }) => {
                Rc::ptr_eq(&a.state, &b.state)
            }
            _ => false,
        }
    }
}

impl fmt::Debug for WhenDefined {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.inner {
            Inner::Pending { deferred, .. } => f
                .debug_struct("WhenDefined")
                .field("resolved", &deferred.is_resolved())
                .finish(),
            Inner::Rejected(error) => f.debug_tuple("WhenDefined").field(error).finish(),
        }
    }
}

impl Future for WhenDefined {
    type Output = Result<(), DefinitionError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match &mut self.get_mut().inner {
            Inner::Rejected(error) => Poll::Ready(Err(error.clone())),
            Inner::Pending { completion, .. } => match completion.poll_unpin(cx) {
                Poll::Ready(Ok(())) => Poll::Ready(Ok(())),
                // Cancellation needs the sender dropped unsent, which every
                // handle prevents
                Poll::Ready(Err(_)) | Poll::Pending => Poll::Pending,
            },
        }
    }
}
