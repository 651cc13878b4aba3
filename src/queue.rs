//! A blocking multi-producer/multi-consumer queue of [`Value`] with an
//! absorbing closed state, grounded on `traeger::actor::Queue`.

use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex};

use crate::value::{List, Value};

struct Inner {
    items: VecDeque<Value>,
    closed: bool,
}

#[derive(Clone)]
pub struct Queue {
    state: Arc<Mutex<Inner>>,
    cond: Arc<Condvar>,
}

impl Queue {
    pub fn new() -> Self {
        Queue {
            state: Arc::new(Mutex::new(Inner { items: VecDeque::new(), closed: false })),
            cond: Arc::new(Condvar::new()),
        }
    }

    /// Appends `v`. Returns `false` without enqueuing if the queue is closed.
    pub fn push(&self, v: Value) -> bool {
        let mut state = self.state.lock().unwrap();
        if state.closed {
            return false;
        }
        state.items.push_back(v);
        self.cond.notify_one();
        true
    }

    /// Blocks until an item is available or the queue closes and drains.
    /// Returns `None` only once closed with nothing left to pop.
    pub fn pop(&self) -> Option<Value> {
        let mut state = self.state.lock().unwrap();
        loop {
            if let Some(v) = state.items.pop_front() {
                return Some(v);
            }
            if state.closed {
                return None;
            }
            state = self.cond.wait(state).unwrap();
        }
    }

    /// Non-blocking bulk drain. Returns `false` if the queue was empty.
    pub fn pop_all(&self, out: &mut List) -> bool {
        let mut state = self.state.lock().unwrap();
        if state.items.is_empty() {
            return false;
        }
        for v in state.items.drain(..) {
            out.push_back(v);
        }
        true
    }

    pub fn count(&self) -> usize {
        self.state.lock().unwrap().items.len()
    }

    pub fn closed(&self) -> bool {
        self.state.lock().unwrap().closed
    }

    /// Idempotent. Wakes every blocked `pop`.
    pub fn close(&self) {
        let mut state = self.state.lock().unwrap();
        state.closed = true;
        self.cond.notify_all();
    }
}

impl Default for Queue {
    fn default() -> Self {
        Queue::new()
    }
}
