//! Single-resolution async result.
//!
//! A [`PoolFuture`] is resolved at most once, either with a value
//! ([`complete`](PoolFuture::complete)) or with an error
//! ([`fail`](PoolFuture::fail)). The first resolution wins: any later call is
//! a no-op and returns `false`, so a request timeout and a late response can
//! race without either overwriting what listeners have already observed.
//!
//! Outcomes are delivered two ways:
//!
//! - **Listeners** registered with [`add_listener`](PoolFuture::add_listener)
//!   run on whichever thread resolves the future, or immediately on the
//!   registering thread when the future is already resolved. They must not
//!   block.
//! - **Awaiting**: `PoolFuture<T>` implements [`std::future::Future`] for
//!   `T: Clone`, yielding `Result<T, PoolError>`.
//!
//! # Example
//!
//! ```
//! use hcpool_common::{PoolError, PoolFuture};
//! use std::sync::{Arc, Mutex};
//!
//! let future: PoolFuture<u32> = PoolFuture::new();
//! let seen = Arc::new(Mutex::new(Vec::new()));
//!
//! let sink = seen.clone();
//! future.add_listener(move |v| sink.lock().unwrap().push(*v), |_| {});
//!
//! assert!(future.complete(7));
//! assert!(!future.fail(PoolError::Cancelled));
//! assert_eq!(*seen.lock().unwrap(), vec![7]);
//! ```

use std::fmt;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll, Waker};

use crate::protocol::error::PoolError;

type Outcome<T> = Arc<Result<T, PoolError>>;
type Listener<T> = Box<dyn FnOnce(&Result<T, PoolError>) + Send>;

struct State<T> {
    outcome: Option<Outcome<T>>,
    listeners: Vec<Listener<T>>,
    wakers: Vec<Waker>,
}

/// Single-resolution async result with listener notification.
///
/// Cloning yields another handle to the same result.
pub struct PoolFuture<T> {
    state: Arc<Mutex<State<T>>>,
}

impl<T> PoolFuture<T> {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(State {
                outcome: None,
                listeners: Vec::new(),
                wakers: Vec::new(),
            })),
        }
    }

    /// Resolves the future with a value.
    ///
    /// Returns `true` if this call resolved the future, `false` if it was
    /// already resolved (the call is then a no-op).
    pub fn complete(&self, value: T) -> bool {
        self.resolve(Ok(value))
    }

    /// Resolves the future with an error.
    ///
    /// Returns `true` if this call resolved the future, `false` if it was
    /// already resolved (the call is then a no-op).
    pub fn fail(&self, error: PoolError) -> bool {
        self.resolve(Err(error))
    }

    fn resolve(&self, outcome: Result<T, PoolError>) -> bool {
        let outcome = Arc::new(outcome);
        let (listeners, wakers) = {
            let mut state = self.lock();
            if state.outcome.is_some() {
                return false;
            }
            state.outcome = Some(outcome.clone());
            (
                std::mem::take(&mut state.listeners),
                std::mem::take(&mut state.wakers),
            )
        };

        // Outside the lock: a listener may register further listeners or
        // re-enter whatever owns this future.
        for listener in listeners {
            listener(&outcome);
        }
        for waker in wakers {
            waker.wake();
        }
        true
    }

    /// Registers a pair of callbacks, exactly one of which will run.
    ///
    /// If the future is already resolved the matching callback runs
    /// immediately on the calling thread. Otherwise it runs, in registration
    /// order, on the thread that resolves the future.
    pub fn add_listener<C, E>(&self, on_complete: C, on_error: E)
    where
        C: FnOnce(&T) + Send + 'static,
        E: FnOnce(&PoolError) + Send + 'static,
    {
        let listener: Listener<T> = Box::new(move |outcome| match outcome {
            Ok(value) => on_complete(value),
            Err(error) => on_error(error),
        });

        let resolved = {
            let mut state = self.lock();
            match &state.outcome {
                Some(outcome) => outcome.clone(),
                None => {
                    state.listeners.push(listener);
                    return;
                }
            }
        };
        listener(&resolved);
    }

    pub fn is_resolved(&self) -> bool {
        self.lock().outcome.is_some()
    }

    /// Returns `true` if both handles refer to the same result.
    pub fn ptr_eq(&self, other: &PoolFuture<T>) -> bool {
        Arc::ptr_eq(&self.state, &other.state)
    }

    fn lock(&self) -> MutexGuard<'_, State<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T: Clone> PoolFuture<T> {
    /// The stored outcome, if resolved.
    pub fn outcome(&self) -> Option<Result<T, PoolError>> {
        self.lock().outcome.as_ref().map(|o| o.as_ref().clone())
    }
}

impl<T> Default for PoolFuture<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for PoolFuture<T> {
    fn clone(&self) -> Self {
        Self {
            state: self.state.clone(),
        }
    }
}

impl<T> fmt::Debug for PoolFuture<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        f.debug_struct("PoolFuture")
            .field("resolved", &state.outcome.is_some())
            .field("listeners", &state.listeners.len())
            .finish()
    }
}

impl<T: Clone> std::future::Future for PoolFuture<T> {
    type Output = Result<T, PoolError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut state = self.lock();
        match &state.outcome {
            Some(outcome) => Poll::Ready(outcome.as_ref().clone()),
            None => {
                if !state.wakers.iter().any(|w| w.will_wake(cx.waker())) {
                    state.wakers.push(cx.waker().clone());
                }
                Poll::Pending
            }
        }
    }
}
