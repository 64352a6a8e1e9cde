//! Admission gate bounding how many downloads run at once.
//!
//! Unlike [`tokio::sync::Semaphore`] the capacity can be changed while permits
//! are outstanding, and a non-positive capacity means unlimited.

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::oneshot;

/// Resizable counting gate, shared by cloning.
///
/// Waiters are admitted in arrival order. A freed slot is handed directly to
/// the oldest waiter, so a fresh `acquire` never overtakes a queued one.
///
/// # Examples
///
/// ```
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// use hubcache_fetch::Gate;
///
/// let gate = Gate::new(2);
/// let a = gate.acquire().await;
/// let _b = gate.acquire().await;
/// assert_eq!(gate.in_use(), 2);
/// a.release();
/// assert_eq!(gate.in_use(), 1);
/// # }
/// ```
#[derive(Clone)]
pub struct Gate {
    state: Arc<Mutex<State>>,
}

struct State {
    capacity: i64,
    in_use: i64,
    next_id: u64,
    waiters: VecDeque<Waiter>,
}

struct Waiter {
    id: u64,
    admit: oneshot::Sender<()>,
}

impl State {
    fn has_room(&self) -> bool {
        self.capacity <= 0 || self.in_use < self.capacity
    }

    /// Hand free slots to queued waiters, oldest first.
    fn admit_waiters(&mut self) {
        while self.has_room() {
            let Some(waiter) = self.waiters.pop_front() else {
                break;
            };
            self.in_use += 1;
            if waiter.admit.send(()).is_err() {
                self.in_use -= 1;
            }
        }
    }
}

impl Gate {
    pub fn new(capacity: i64) -> Self {
        Self {
            state: Arc::new(Mutex::new(State {
                capacity,
                in_use: 0,
                next_id: 0,
                waiters: VecDeque::new(),
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Wait for a slot. The returned permit holds it until dropped.
    ///
    /// Cancel-safe: dropping the future before it completes gives back any
    /// slot that was already handed to it.
    pub async fn acquire(&self) -> GatePermit {
        loop {
            let mut pending = {
                let mut state = self.lock();
                if state.waiters.is_empty() && state.has_room() {
                    state.in_use += 1;
                    return GatePermit { gate: self.clone() };
                }

                let id = state.next_id;
                state.next_id += 1;
                let (admit, admitted) = oneshot::channel();
                state.waiters.push_back(Waiter { id, admit });
                Pending {
                    gate: self,
                    id,
                    admitted,
                    settled: false,
                }
            };

            let outcome = (&mut pending.admitted).await;
            pending.settled = true;
            if outcome.is_ok() {
                return GatePermit { gate: self.clone() };
            }
        }
    }

    /// Change the capacity. Holders beyond a smaller capacity keep their
    /// slots; room created by growing is handed to waiters immediately.
    pub fn resize(&self, capacity: i64) {
        let mut state = self.lock();
        state.capacity = capacity;
        state.admit_waiters();
    }

    pub fn capacity(&self) -> i64 {
        self.lock().capacity
    }

    /// Number of outstanding permits.
    pub fn in_use(&self) -> i64 {
        self.lock().in_use
    }

    fn release_slot(&self) {
        let mut state = self.lock();
        state.in_use -= 1;
        state.admit_waiters();
    }
}

impl fmt::Debug for Gate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        f.debug_struct("Gate")
            .field("capacity", &state.capacity)
            .field("in_use", &state.in_use)
            .field("waiting", &state.waiters.len())
            .finish()
    }
}

/// A queued `acquire`. Dropping it unsettled withdraws from the queue, or
/// returns the slot if one was handed over in the meantime.
struct Pending<'a> {
    gate: &'a Gate,
    id: u64,
    admitted: oneshot::Receiver<()>,
    settled: bool,
}

impl Drop for Pending<'_> {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        let mut state = self.gate.lock();
        if let Some(pos) = state.waiters.iter().position(|w| w.id == self.id) {
            state.waiters.remove(pos);
        } else if self.admitted.try_recv().is_ok() {
            state.in_use -= 1;
            state.admit_waiters();
        }
    }
}

/// One slot of a [`Gate`], released when dropped.
#[must_use = "the slot is released as soon as the permit is dropped"]
pub struct GatePermit {
    gate: Gate,
}

impl GatePermit {
    pub fn release(self) {
        drop(self);
    }
}

impl Drop for GatePermit {
    fn drop(&mut self) {
        self.gate.release_slot();
    }
}

impl fmt::Debug for GatePermit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GatePermit").finish_non_exhaustive()
    }
}
