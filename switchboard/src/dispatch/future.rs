//! Single-shot completion future for issued calls.
//!
//! [`Stub::call`](crate::Stub::call) hands back a [`CallFuture`]; the
//! connection's continuation fills the paired [`CallSlot`] when the response
//! arrives (or the timer gives up). Plain `Rc<RefCell<..>>` plus a stored
//! waker is all the synchronization a single-threaded node needs.
//!
//! If the slot is dropped without being filled, which is what connection
//! teardown does to every pending call, the future never resolves. Callers
//! that need liveness across dead connections configure a call timeout.

use std::cell::RefCell;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll, Waker};

use crate::error::CallError;

struct Slot<Res> {
    value: Option<Result<Res, CallError>>,
    waker: Option<Waker>,
}

/// Producer half: fills the slot exactly once.
pub(crate) struct CallSlot<Res> {
    slot: Rc<RefCell<Slot<Res>>>,
}

/// Caller half: resolves with the call outcome.
pub struct CallFuture<Res> {
    slot: Rc<RefCell<Slot<Res>>>,
}

/// Create a connected slot/future pair.
pub(crate) fn call_slot<Res>() -> (CallSlot<Res>, CallFuture<Res>) {
    let slot = Rc::new(RefCell::new(Slot {
        value: None,
        waker: None,
    }));
    (CallSlot { slot: slot.clone() }, CallFuture { slot })
}

impl<Res> CallSlot<Res> {
    /// Deliver the outcome and wake the waiting caller, if any.
    ///
    /// Consumes the slot; the type system enforces at-most-once delivery.
    pub(crate) fn fill(self, value: Result<Res, CallError>) {
        let waker = {
            let mut slot = self.slot.borrow_mut();
            slot.value = Some(value);
            slot.waker.take()
        };
        if let Some(waker) = waker {
            waker.wake();
        }
    }
}

impl<Res> Future for CallFuture<Res> {
    type Output = Result<Res, CallError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut slot = self.slot.borrow_mut();
        if let Some(value) = slot.value.take() {
            return Poll::Ready(value);
        }
        slot.waker = Some(cx.waker().clone());
        Poll::Pending
    }
}
