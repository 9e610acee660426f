//! Worker pool for deferred value destruction.
//!
//! Freeing a large sorted set walks and deallocates every node, which
//! is too much work to do inline on the db task. Removed values are
//! handed to a small pool of OS threads instead; the workers exist
//! only to receive them and let their destructors run.
//!
//! Plain `std::thread` workers, not tokio tasks: destructor work is
//! CPU-bound and would stall the async executor. The shared state is a
//! mutex-guarded FIFO plus a condvar; `enqueue` wakes one worker,
//! shutdown raises a stop flag, wakes everyone, and joins.

use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;

use tracing::warn;

use crate::types::Value;

/// Sorted sets below this member count are dropped inline — the
/// deallocation is cheaper than the queue round-trip.
const LARGE_SET_LEN: usize = 64;

struct Shared {
    state: Mutex<State>,
    available: Condvar,
}

struct State {
    queue: VecDeque<Value>,
    stop: bool,
}

/// The pool itself. Owns the worker threads; [`DropPool::shutdown`]
/// drains the queue and joins them.
pub struct DropPool {
    shared: Arc<Shared>,
    workers: Vec<JoinHandle<()>>,
}

/// Cheap cloneable handle for submitting values to the pool.
#[derive(Clone)]
pub struct DropHandle {
    shared: Arc<Shared>,
}

impl DropPool {
    /// Spawns `workers` threads. A worker that fails to spawn is
    /// logged and skipped; with zero live workers values are simply
    /// dropped by the enqueue path once the channel state reflects it.
    pub fn new(workers: usize) -> Self {
        let shared = Arc::new(Shared {
            state: Mutex::new(State {
                queue: VecDeque::new(),
                stop: false,
            }),
            available: Condvar::new(),
        });

        let mut handles = Vec::with_capacity(workers);
        for i in 0..workers {
            let shared = Arc::clone(&shared);
            let spawned = std::thread::Builder::new()
                .name(format!("cinder-drop-{i}"))
                .spawn(move || worker(shared));
            match spawned {
                Ok(handle) => handles.push(handle),
                Err(e) => warn!("failed to spawn drop worker {i}: {e}"),
            }
        }

        DropPool {
            shared,
            workers: handles,
        }
    }

    pub fn handle(&self) -> DropHandle {
        DropHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Stops the pool: remaining queued values are still destroyed by
    /// the workers before they exit. Dropping the pool does the same.
    pub fn shutdown(self) {
        drop(self);
    }
}

impl Drop for DropPool {
    fn drop(&mut self) {
        {
            let mut state = match self.shared.state.lock() {
                Ok(state) => state,
                Err(poisoned) => poisoned.into_inner(),
            };
            state.stop = true;
        }
        self.shared.available.notify_all();
        for handle in self.workers.drain(..) {
            let _ = handle.join();
        }
    }
}

impl DropHandle {
    /// Submits a value for destruction. Values too small to be worth
    /// the hand-off are dropped right here.
    pub fn defer_value(&self, value: Value) {
        if !is_costly(&value) {
            return;
        }
        let mut state = match self.shared.state.lock() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        };
        if state.stop {
            // pool is gone; destroy inline
            drop(state);
            drop(value);
            return;
        }
        state.queue.push_back(value);
        drop(state);
        self.shared.available.notify_one();
    }
}

fn worker(shared: Arc<Shared>) {
    loop {
        let task = {
            let mut state = match shared.state.lock() {
                Ok(state) => state,
                Err(poisoned) => poisoned.into_inner(),
            };
            loop {
                if let Some(task) = state.queue.pop_front() {
                    break task;
                }
                if state.stop {
                    return;
                }
                state = match shared.available.wait(state) {
                    Ok(state) => state,
                    Err(poisoned) => poisoned.into_inner(),
                };
            }
        };
        // dropping the value is the entire job
        drop(task);
    }
}

fn is_costly(value: &Value) -> bool {
    match value {
        Value::String(_) => false,
        Value::SortedSet(zset) => zset.len() >= LARGE_SET_LEN,
    }
}
