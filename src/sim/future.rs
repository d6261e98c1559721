//! sim/future — a hand-rolled completion primitive: no executor, no
//! waking, just a shared cell a `Promise` writes once and a `SimFuture`
//! polls for.
//!
//! `Rc<RefCell<_>>` rather than `Arc<Mutex<_>>`: this only ever runs on
//! the simulator's single cooperative thread.

use std::cell::RefCell;
use std::rc::Rc;

use crate::error::{DeltaliteError, Result};

struct Shared<T> {
    value: Option<Result<T>>,
}

/// The write side of a `SimFuture`. Consumed by `complete`, so a promise
/// can be fulfilled at most once.
pub struct Promise<T> {
    shared: Rc<RefCell<Shared<T>>>,
}

impl<T> Promise<T> {
    pub fn new() -> (Promise<T>, SimFuture<T>) {
        let shared = Rc::new(RefCell::new(Shared { value: None }));
        (
            Promise {
                shared: shared.clone(),
            },
            SimFuture { shared },
        )
    }

    pub fn complete(self, value: Result<T>) {
        self.shared.borrow_mut().value = Some(value);
    }
}

/// The read side. Polled by `bridge::block_on` / `testutil::run_until`
/// between ticks; never polled by the network itself.
pub struct SimFuture<T> {
    shared: Rc<RefCell<Shared<T>>>,
}

impl<T> Clone for SimFuture<T> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<T> SimFuture<T> {
    pub fn is_done(&self) -> bool {
        self.shared.borrow().value.is_some()
    }

    /// Take the completed value, leaving the future in a state where a
    /// second `try_take` returns `None`. Polling helpers call this exactly
    /// once, right after observing `is_done()`.
    pub fn try_take(&self) -> Option<Result<T>> {
        self.shared.borrow_mut().value.take()
    }

    /// Cancel an in-flight future by completing it with `Interrupted`,
    /// the mechanism the sync bridge uses to expose cancellation. A
    /// no-op if already completed.
    pub fn cancel(&self) {
        let mut shared = self.shared.borrow_mut();
        if shared.value.is_none() {
            shared.value = Some(Err(DeltaliteError::Interrupted));
        }
    }
}
