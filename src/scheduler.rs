//! A fixed thread-pool scheduler with an immediate FIFO queue and a
//! delayed min-heap, grounded on `traeger::actor::Scheduler`.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering as AtomicOrdering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::debug;

/// Boxed unit of work executed by a worker thread.
pub type Work = Box<dyn FnOnce() + Send + 'static>;

struct DelayedWork {
    when: Instant,
    work: Work,
    seq: u64,
}

impl PartialEq for DelayedWork {
    fn eq(&self, other: &Self) -> bool {
        self.when == other.when && self.seq == other.seq
    }
}
impl Eq for DelayedWork {}

// BinaryHeap is a max-heap; reverse the ordering so the earliest `when`
// sorts to the top, mirroring the original's reversed `operator<`.
impl Ord for DelayedWork {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .when
            .cmp(&self.when)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}
impl PartialOrd for DelayedWork {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

struct Inner {
    immediate: VecDeque<Work>,
    delayed: BinaryHeap<DelayedWork>,
    next_seq: u64,
    active_tasks: u64,
    shutting_down: bool,
    live_workers: usize,
}

struct Shared {
    state: Mutex<Inner>,
    cond: Condvar,
    handle_refs: AtomicU64,
}

/// A handle to a running worker pool. Clones share the same pool; the pool
/// is joined when the last handle is dropped.
pub struct Scheduler {
    shared: Arc<Shared>,
    workers: Arc<Mutex<Vec<JoinHandle<()>>>>,
    joined: Arc<AtomicBool>,
}

impl Clone for Scheduler {
    fn clone(&self) -> Self {
        self.shared.handle_refs.fetch_add(1, AtomicOrdering::SeqCst);
        Scheduler {
            shared: self.shared.clone(),
            workers: self.workers.clone(),
            joined: self.joined.clone(),
        }
    }
}

impl Scheduler {
    /// Spawns a fixed pool of `n_threads` workers (minimum 1).
    pub fn new(n_threads: usize) -> Self {
        let n_threads = n_threads.max(1);
        let shared = Arc::new(Shared {
            state: Mutex::new(Inner {
                immediate: VecDeque::new(),
                delayed: BinaryHeap::new(),
                next_seq: 0,
                active_tasks: 0,
                shutting_down: false,
                live_workers: n_threads,
            }),
            cond: Condvar::new(),
            handle_refs: AtomicU64::new(1),
        });

        debug!(n_threads, "starting scheduler worker pool");
        let mut workers = Vec::with_capacity(n_threads);
        for _ in 0..n_threads {
            let shared = shared.clone();
            workers.push(thread::spawn(move || worker_loop(shared)));
        }

        Scheduler {
            shared,
            workers: Arc::new(Mutex::new(workers)),
            joined: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Appends `work` to the immediate FIFO queue.
    pub fn schedule<F>(&self, work: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let mut state = self.shared.state.lock().unwrap();
        state.immediate.push_back(Box::new(work));
        self.shared.cond.notify_one();
    }

    /// Inserts `work` into the delayed heap, eligible after `delay` elapses.
    pub fn schedule_delayed<F>(&self, delay: Duration, work: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let mut state = self.shared.state.lock().unwrap();
        let seq = state.next_seq;
        state.next_seq += 1;
        state.delayed.push(DelayedWork {
            when: Instant::now() + delay,
            work: Box::new(work),
            seq,
        });
        self.shared.cond.notify_one();
    }

    /// Outstanding work: queued immediate + queued delayed + in-flight
    /// tasks + any extra handle references beyond this one.
    pub fn count(&self) -> u64 {
        let state = self.shared.state.lock().unwrap();
        let queued = (state.immediate.len() + state.delayed.len()) as u64;
        let extra_handles = self.shared.handle_refs.load(AtomicOrdering::SeqCst).saturating_sub(1);
        queued + state.active_tasks + extra_handles
    }

    /// Signals shutdown and blocks until every worker has exited.
    /// Idempotent; safe to call from `Drop`.
    pub fn shutdown(&self) {
        if self.joined.swap(true, AtomicOrdering::SeqCst) {
            return;
        }
        debug!("shutting down scheduler worker pool");
        {
            let mut state = self.shared.state.lock().unwrap();
            state.shutting_down = true;
        }
        self.shared.cond.notify_all();
        let mut workers = self.workers.lock().unwrap();
        for handle in workers.drain(..) {
            let _ = handle.join();
        }
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        if self.shared.handle_refs.fetch_sub(1, AtomicOrdering::SeqCst) == 1 {
            self.shutdown();
        }
    }
}

fn worker_loop(shared: Arc<Shared>) {
    loop {
        let work = {
            let mut state = shared.state.lock().unwrap();
            loop {
                let due_delayed = state
                    .delayed
                    .peek()
                    .map(|d| d.when <= Instant::now())
                    .unwrap_or(false);

                if due_delayed {
                    break Some(state.delayed.pop().unwrap().work);
                } else if let Some(work) = state.immediate.pop_front() {
                    break Some(work);
                } else if state.shutting_down {
                    state.live_workers = state.live_workers.saturating_sub(1);
                    shared.cond.notify_all();
                    break None;
                } else if let Some(next) = state.delayed.peek() {
                    let wait_for = next.when.saturating_duration_since(Instant::now());
                    let (guard, _timeout) = shared.cond.wait_timeout(state, wait_for).unwrap();
                    state = guard;
                } else {
                    state = shared.cond.wait(state).unwrap();
                }
            }
        };

        match work {
            Some(work) => {
                {
                    let mut state = shared.state.lock().unwrap();
                    state.active_tasks += 1;
                }
                work();
                {
                    let mut state = shared.state.lock().unwrap();
                    state.active_tasks -= 1;
                }
            }
            None => return,
        }
    }
}
