//! One-shot settable future
//!
//! The cell transitions once from *pending* to *ready* or *poisoned*.
//! Callbacks registered before the transition fire on the setter's
//! thread; callbacks registered after it fire inline on the caller's
//! thread. Either way a callback fires at most once.

use crate::error::{Error, Result};
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;

type Callback = Box<dyn FnOnce() + Send>;

enum State<T> {
    Pending,
    Ready(T),
    Poisoned(Error),
}

struct Cell<T> {
    state: State<T>,
    callbacks: Vec<Callback>,
}

struct Inner<T> {
    cell: Mutex<Cell<T>>,
    settled: Condvar,
}

/// Shared handle to a one-shot value
///
/// Handles are cheap to clone; every clone observes the same cell.
pub struct Future<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for Future<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Send + 'static> Default for Future<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Send + 'static> Future<T> {
    /// Create a pending future.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                cell: Mutex::new(Cell {
                    state: State::Pending,
                    callbacks: Vec::new(),
                }),
                settled: Condvar::new(),
            }),
        }
    }

    /// Create a future that is already set.
    pub fn ready(value: T) -> Self {
        Self {
            inner: Arc::new(Inner {
                cell: Mutex::new(Cell {
                    state: State::Ready(value),
                    callbacks: Vec::new(),
                }),
                settled: Condvar::new(),
            }),
        }
    }

    /// Whether this future has settled (ready or poisoned).
    pub fn probe(&self) -> bool {
        !matches!(self.inner.cell.lock().state, State::Pending)
    }

    /// Set the value, waking waiters and firing registered callbacks.
    ///
    /// A second settle attempt is ignored: the cell is one-shot.
    pub fn set(&self, value: T) {
        self.settle(State::Ready(value));
    }

    /// Poison the future with an error instead of a value.
    pub fn fail(&self, error: Error) {
        self.settle(State::Poisoned(error));
    }

    fn settle(&self, state: State<T>) {
        let callbacks = {
            let mut cell = self.inner.cell.lock();
            if !matches!(cell.state, State::Pending) {
                return;
            }
            cell.state = state;
            std::mem::take(&mut cell.callbacks)
        };
        self.inner.settled.notify_all();
        for cb in callbacks {
            cb();
        }
    }

    /// Register a callback for the settle transition.
    ///
    /// Fires inline if the future has already settled.
    pub fn on_ready(&self, callback: impl FnOnce() + Send + 'static) {
        {
            let mut cell = self.inner.cell.lock();
            if matches!(cell.state, State::Pending) {
                cell.callbacks.push(Box::new(callback));
                return;
            }
        }
        callback();
    }
}

impl<T: Clone + Send + 'static> Future<T> {
    /// Value of a settled future.
    ///
    /// Returns [`Error::PendingFuture`] when the future has not settled
    /// yet; use [`probe`](Self::probe) or a callback to synchronize.
    pub fn get(&self) -> Result<T> {
        match &self.inner.cell.lock().state {
            State::Pending => Err(Error::PendingFuture),
            State::Ready(value) => Ok(value.clone()),
            State::Poisoned(error) => Err(error.clone()),
        }
    }

    /// Block until the future settles, then return its value.
    pub fn wait(&self) -> Result<T> {
        let mut cell = self.inner.cell.lock();
        while matches!(cell.state, State::Pending) {
            self.inner.settled.wait(&mut cell);
        }
        match &cell.state {
            State::Pending => Err(Error::PendingFuture),
            State::Ready(value) => Ok(value.clone()),
            State::Poisoned(error) => Err(error.clone()),
        }
    }
}
