//! `StatelessActor`: a persistent method registry plus a per-actor FIFO
//! task queue whose dispatch discipline is the heart of the actor model —
//! grounded on `traeger::actor::StatelessActor`.
//!
//! A worker chosen to run the actor's next task peeks the queue head and
//! *tries* (non-blocking) to acquire the execution lock in the task's
//! mode. On success it pops and runs the task; on failure it leaves the
//! task in place for another worker to retry once a holder releases the
//! lock. This lets any number of `Shared` tasks at the head run
//! concurrently on distinct workers, while an `Exclusive` task blocks
//! until all in-flight `Shared` tasks drain and blocks everything behind
//! it in turn.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::error;

use super::{Mailbox, MailboxInterface};
use crate::promise::{Promise, PromiseResult};
use crate::scheduler::Scheduler;
use crate::value::List;

/// Per-method concurrency classification: `Shared` (reader) methods may
/// run concurrently with one another; `Exclusive` (writer) methods run
/// alone against the actor.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Concurrency {
    Shared,
    Exclusive,
}

/// A registered method body: takes the call's arguments, returns a settled
/// `PromiseResult`. Shared across every `Mailbox` snapshot of the actor.
pub type Function = Arc<dyn Fn(List) -> PromiseResult + Send + Sync>;

struct ActorTask {
    concurrency: Concurrency,
    work: Box<dyn FnOnce() + Send>,
}

enum ExecutionGuard<'a> {
    Read(RwLockReadGuard<'a, ()>),
    Write(RwLockWriteGuard<'a, ()>),
}

struct ActorQueue {
    execution: RwLock<()>,
    tasks: Mutex<VecDeque<ActorTask>>,
}

impl ActorQueue {
    fn new() -> Self {
        ActorQueue {
            execution: RwLock::new(()),
            tasks: Mutex::new(VecDeque::new()),
        }
    }

    fn push(&self, task: ActorTask) {
        self.tasks.lock().unwrap().push_back(task);
    }

    /// If the queue is non-empty, schedules one run of "try to execute the
    /// head, then schedule again" on `scheduler`. Called both right after
    /// a task is pushed and after each attempted execution, so as many
    /// runner tasks are in flight as the queue has concurrent room for.
    fn schedule_next(self: Arc<Self>, scheduler: &Scheduler) {
        let pending = !self.tasks.lock().unwrap().is_empty();
        if pending {
            let queue = self.clone();
            let scheduler_next = scheduler.clone();
            scheduler.schedule(move || {
                queue.try_execute_next();
                queue.schedule_next(&scheduler_next);
            });
        }
    }

    fn try_execute_next(&self) {
        let mut tasks = self.tasks.lock().unwrap();
        let concurrency = match tasks.front() {
            Some(task) => task.concurrency,
            None => return,
        };
        let guard = match concurrency {
            Concurrency::Exclusive => self.execution.try_write().ok().map(ExecutionGuard::Write),
            Concurrency::Shared => self.execution.try_read().ok().map(ExecutionGuard::Read),
        };
        if let Some(guard) = guard {
            let task = tasks.pop_front().expect("front checked above");
            drop(tasks);
            (task.work)();
            drop(guard);
        }
    }
}

fn invoke(function: &Function, args: List) -> PromiseResult {
    match std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| function(args))) {
        Ok(result) => result,
        Err(payload) => {
            let message = panic_message(&payload);
            error!(%message, "actor method panicked");
            PromiseResult::Error(message)
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "actor method panicked".to_string()
    }
}

/// Owns the persistent method registry and the per-actor task queue.
/// Cloning the registry for a `Mailbox` is O(1) thanks to `im::HashMap`;
/// later redefinitions on this actor never affect a mailbox handed out
/// earlier.
pub struct StatelessActor {
    queue: Arc<ActorQueue>,
    functions: im::HashMap<String, (Concurrency, Function)>,
}

impl StatelessActor {
    pub fn new() -> Self {
        StatelessActor {
            queue: Arc::new(ActorQueue::new()),
            functions: im::HashMap::new(),
        }
    }

    /// Registers `function` as a read-only method. Redefinition replaces.
    pub fn define_reader(&mut self, name: impl Into<String>, function: Function) {
        self.functions.insert(name.into(), (Concurrency::Shared, function));
    }

    /// Registers `function` as a mutating method. Redefinition replaces.
    pub fn define_writer(&mut self, name: impl Into<String>, function: Function) {
        self.functions.insert(name.into(), (Concurrency::Exclusive, function));
    }

    pub fn mailbox(&self) -> Mailbox {
        Mailbox::new(Arc::new(StatelessMailbox {
            queue: self.queue.clone(),
            functions: self.functions.clone(),
        }))
    }
}

impl Default for StatelessActor {
    fn default() -> Self {
        Self::new()
    }
}

struct StatelessMailbox {
    queue: Arc<ActorQueue>,
    functions: im::HashMap<String, (Concurrency, Function)>,
}

impl MailboxInterface for StatelessMailbox {
    fn send(&self, scheduler: &Scheduler, name: &str, args: List) -> Promise {
        let promise = Promise::new(scheduler.clone());
        match self.functions.get(name) {
            Some((concurrency, function)) => {
                let promise_for_task = promise.clone();
                let function = function.clone();
                self.queue.push(ActorTask {
                    concurrency: *concurrency,
                    work: Box::new(move || {
                        let result = invoke(&function, args);
                        promise_for_task.set_result(result);
                    }),
                });
                self.queue.clone().schedule_next(scheduler);
            }
            None => {
                promise.set_error(format!("no such actor method {}", name));
            }
        }
        promise
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::{Duration, Instant};

    #[test]
    fn unknown_method_settles_error_immediately() {
        let sched = Scheduler::new(1);
        let actor = StatelessActor::new();
        let mailbox = actor.mailbox();
        let promise = mailbox.send(&sched, "nope", List::new());
        assert_eq!(
            promise.result(),
            PromiseResult::Error("no such actor method nope".to_string())
        );
    }

    #[test]
    fn redefinition_replaces_and_does_not_affect_earlier_mailbox_snapshot() {
        let sched = Scheduler::new(1);
        let mut actor = StatelessActor::new();
        actor.define_reader("greet", Arc::new(|_| PromiseResult::Value(Value::from("v1"))));
        let old_mailbox = actor.mailbox();
        actor.define_reader("greet", Arc::new(|_| PromiseResult::Value(Value::from("v2"))));
        let new_mailbox = actor.mailbox();

        let p_old = old_mailbox.send(&sched, "greet", List::new());
        let p_new = new_mailbox.send(&sched, "greet", List::new());
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(p_old.result(), PromiseResult::Value(Value::from("v1")));
        assert_eq!(p_new.result(), PromiseResult::Value(Value::from("v2")));
    }

    #[test]
    fn concurrent_readers_overlap_in_wall_time() {
        let sched = Scheduler::new(4);
        let mut actor = StatelessActor::new();
        actor.define_reader(
            "sum",
            Arc::new(|args| {
                std::thread::sleep(Duration::from_millis(10));
                let mut total = 0i64;
                for v in args.iter() {
                    total += v.get_int().unwrap_or(0);
                }
                PromiseResult::Value(Value::Int(total))
            }),
        );
        let mailbox = actor.mailbox();

        let start = Instant::now();
        let promises: Vec<_> = (0..4)
            .map(|i| {
                let mut l = List::new();
                l.push_back(Value::Int(i));
                mailbox.send(&sched, "sum", l)
            })
            .collect();
        for p in &promises {
            while !p.has_result() {
                std::thread::sleep(Duration::from_millis(1));
            }
        }
        assert!(start.elapsed() < Duration::from_millis(40));
    }

    #[test]
    fn writer_excludes_concurrent_readers() {
        let sched = Scheduler::new(4);
        let mut actor = StatelessActor::new();
        let overlap_detected = Arc::new(AtomicUsize::new(0));
        let in_flight = Arc::new(AtomicUsize::new(0));
        let writer_in_flight = Arc::new(AtomicUsize::new(0));

        {
            let overlap_detected = overlap_detected.clone();
            let in_flight = in_flight.clone();
            let writer_in_flight = writer_in_flight.clone();
            actor.define_reader(
                "read",
                Arc::new(move |_| {
                    in_flight.fetch_add(1, Ordering::SeqCst);
                    if writer_in_flight.load(Ordering::SeqCst) > 0 {
                        overlap_detected.fetch_add(1, Ordering::SeqCst);
                    }
                    std::thread::sleep(Duration::from_millis(10));
                    in_flight.fetch_sub(1, Ordering::SeqCst);
                    PromiseResult::Value(Value::Null)
                }),
            );
        }
        {
            let overlap_detected = overlap_detected.clone();
            let in_flight = in_flight.clone();
            let writer_in_flight = writer_in_flight.clone();
            actor.define_writer(
                "write",
                Arc::new(move |_| {
                    writer_in_flight.fetch_add(1, Ordering::SeqCst);
                    if in_flight.load(Ordering::SeqCst) > 0 {
                        overlap_detected.fetch_add(1, Ordering::SeqCst);
                    }
                    std::thread::sleep(Duration::from_millis(10));
                    writer_in_flight.fetch_sub(1, Ordering::SeqCst);
                    PromiseResult::Value(Value::Null)
                }),
            );
        }

        let mailbox = actor.mailbox();
        let mut promises = Vec::new();
        for _ in 0..3 {
            promises.push(mailbox.send(&sched, "read", List::new()));
        }
        promises.push(mailbox.send(&sched, "write", List::new()));
        for _ in 0..3 {
            promises.push(mailbox.send(&sched, "read", List::new()));
        }
        for p in &promises {
            while !p.has_result() {
                std::thread::sleep(Duration::from_millis(1));
            }
        }
        assert_eq!(overlap_detected.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn panicking_method_settles_to_error_not_a_poisoned_actor() {
        let sched = Scheduler::new(1);
        let mut actor = StatelessActor::new();
        actor.define_reader(
            "boom",
            Arc::new(|_| panic!("kaboom")),
        );
        actor.define_reader("ok", Arc::new(|_| PromiseResult::Value(Value::Int(1))));
        let mailbox = actor.mailbox();
        let p1 = mailbox.send(&sched, "boom", List::new());
        let p2 = mailbox.send(&sched, "ok", List::new());
        std::thread::sleep(Duration::from_millis(20));
        assert!(matches!(p1.result(), PromiseResult::Error(_)));
        assert_eq!(p2.result(), PromiseResult::Value(Value::Int(1)));
    }
}
