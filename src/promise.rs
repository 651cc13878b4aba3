//! A single-assignment result cell bound to a [`Scheduler`], with chained
//! continuations — grounded on `traeger::actor::Promise`.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use tracing::{debug, error};

use crate::scheduler::Scheduler;
use crate::value::Value;

/// The tri-state outcome of a [`Promise`].
#[derive(Clone, Debug, PartialEq)]
pub enum PromiseResult {
    Undefined,
    Value(Value),
    Error(String),
}

impl PromiseResult {
    pub fn is_undefined(&self) -> bool {
        matches!(self, PromiseResult::Undefined)
    }
}

type ValueListener = Box<dyn FnOnce(Value) + Send + 'static>;
type ErrorListener = Box<dyn FnOnce(String) + Send + 'static>;

struct Inner {
    scheduler: Scheduler,
    result: PromiseResult,
    value_listeners: VecDeque<ValueListener>,
    error_listeners: VecDeque<ErrorListener>,
}

/// A cheap, cloneable handle to a shared result cell.
#[derive(Clone)]
pub struct Promise {
    inner: Arc<Mutex<Inner>>,
}

impl Promise {
    pub fn new(scheduler: Scheduler) -> Self {
        Promise {
            inner: Arc::new(Mutex::new(Inner {
                scheduler,
                result: PromiseResult::Undefined,
                value_listeners: VecDeque::new(),
                error_listeners: VecDeque::new(),
            })),
        }
    }

    pub fn result(&self) -> PromiseResult {
        self.inner.lock().unwrap().result.clone()
    }

    pub fn has_result(&self) -> bool {
        !self.inner.lock().unwrap().result.is_undefined()
    }

    pub fn scheduler(&self) -> Scheduler {
        self.inner.lock().unwrap().scheduler.clone()
    }

    /// Sets the result iff currently `Undefined`. Returns whether the
    /// assignment took effect. Pending listeners of the settled kind are
    /// scheduled on the bound `Scheduler`; listeners of the opposite kind
    /// are dropped without running (kind-exclusion).
    pub fn set_result(&self, result: PromiseResult) -> bool {
        if result.is_undefined() {
            return false;
        }
        let (value_listeners, error_listeners, scheduler) = {
            let mut inner = self.inner.lock().unwrap();
            if !inner.result.is_undefined() {
                return false;
            }
            inner.result = result.clone();
            let scheduler = inner.scheduler.clone();
            let vls = std::mem::take(&mut inner.value_listeners);
            let els = std::mem::take(&mut inner.error_listeners);
            (vls, els, scheduler)
        };

        match result {
            PromiseResult::Value(v) => {
                drop(error_listeners);
                for cb in value_listeners {
                    let v = v.clone();
                    scheduler.schedule(move || cb(v));
                }
            }
            PromiseResult::Error(e) => {
                drop(value_listeners);
                if error_listeners.is_empty() {
                    debug!(error = %e, "promise settled to error with no registered listener");
                }
                for cb in error_listeners {
                    let e = e.clone();
                    scheduler.schedule(move || cb(e));
                }
            }
            PromiseResult::Undefined => unreachable!(),
        }
        true
    }

    pub fn set_value(&self, v: Value) -> bool {
        self.set_result(PromiseResult::Value(v))
    }

    pub fn set_error(&self, e: impl Into<String>) -> bool {
        self.set_result(PromiseResult::Error(e.into()))
    }

    /// Registers a value-settlement listener. Runs immediately (scheduled)
    /// if already settled to `Value`; dropped if settled to `Error`.
    fn on_value<F>(&self, cb: F)
    where
        F: FnOnce(Value) + Send + 'static,
    {
        let existing = {
            let mut inner = self.inner.lock().unwrap();
            match &inner.result {
                PromiseResult::Undefined => {
                    inner.value_listeners.push_back(Box::new(cb));
                    None
                }
                PromiseResult::Value(v) => Some(v.clone()),
                PromiseResult::Error(_) => return,
            }
        };
        if let Some(v) = existing {
            let scheduler = self.scheduler();
            scheduler.schedule(move || cb(v));
        }
    }

    /// Registers a terminal error consumer; does not return a child.
    /// Runs immediately (scheduled) if already settled to `Error`; dropped
    /// if settled to `Value`.
    pub fn on_error<F>(&self, cb: F)
    where
        F: FnOnce(String) + Send + 'static,
    {
        let existing = {
            let mut inner = self.inner.lock().unwrap();
            match &inner.result {
                PromiseResult::Undefined => {
                    inner.error_listeners.push_back(Box::new(cb));
                    None
                }
                PromiseResult::Error(e) => Some(e.clone()),
                PromiseResult::Value(_) => return,
            }
        };
        if let Some(e) = existing {
            let scheduler = self.scheduler();
            scheduler.schedule(move || cb(e));
        }
    }

    /// Alias matching the distilled spec's vocabulary for `on_error`.
    pub fn fail<F>(&self, cb: F)
    where
        F: FnOnce(String) + Send + 'static,
    {
        self.on_error(cb)
    }

    /// Registers `cb`, returning a child `Promise` fulfilled with `cb`'s
    /// return value once this Promise settles to `Value`. If this Promise
    /// settles to `Error`, the error propagates to the child unchanged. A
    /// panic inside `cb` is caught and settles the child to `Error` rather
    /// than taking down the scheduler worker running it.
    pub fn then<F>(&self, cb: F) -> Promise
    where
        F: FnOnce(Value) -> PromiseResult + Send + 'static,
    {
        let child = Promise::new(self.scheduler());
        let child_value = child.clone();
        self.on_value(move |v| {
            let result = match std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| cb(v))) {
                Ok(result) => result,
                Err(payload) => {
                    let message = panic_message(&payload);
                    error!(%message, "promise continuation panicked");
                    PromiseResult::Error(message)
                }
            };
            child_value.set_result(result);
        });
        let child_error = child.clone();
        self.on_error(move |e| {
            child_error.set_error(e);
        });
        child
    }

    /// Like [`Promise::then`] but `cb` itself returns a `Promise`; the
    /// child's result is linked to that inner promise (chain-flattening).
    /// A panic inside `cb` is caught the same way as in [`Promise::then`].
    pub fn then_promise<F>(&self, cb: F) -> Promise
    where
        F: FnOnce(Value) -> Promise + Send + 'static,
    {
        let child = Promise::new(self.scheduler());
        let child_value = child.clone();
        self.on_value(move |v| {
            match std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| cb(v))) {
                Ok(linked) => {
                    let forward_ok = child_value.clone();
                    linked.on_value(move |v2| {
                        forward_ok.set_value(v2);
                    });
                    let forward_err = child_value.clone();
                    linked.on_error(move |e| {
                        forward_err.set_error(e);
                    });
                }
                Err(payload) => {
                    let message = panic_message(&payload);
                    error!(%message, "promise continuation panicked");
                    child_value.set_error(message);
                }
            }
        });
        let child_error = child.clone();
        self.on_error(move |e| {
            child_error.set_error(e);
        });
        child
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "promise continuation panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::time::Duration;

    #[test]
    fn value_then_chain_runs_in_order() {
        let sched = Scheduler::new(2);
        let p = Promise::new(sched.clone());
        let (tx, rx) = mpsc::channel();
        let tx2 = tx.clone();
        p.then(move |v| {
            tx.send(v.get_int().unwrap() + 1).unwrap();
            PromiseResult::Value(Value::Int(v.get_int().unwrap() + 1))
        })
        .then(move |v| {
            tx2.send(v.get_int().unwrap() + 1).unwrap();
            PromiseResult::Value(v)
        });
        p.set_value(Value::Int(1));
        assert_eq!(rx.recv_timeout(Duration::from_secs(1)).unwrap(), 2);
        assert_eq!(rx.recv_timeout(Duration::from_secs(1)).unwrap(), 3);
    }

    #[test]
    fn promise_then_flattens_delayed_chain() {
        let sched = Scheduler::new(2);
        let p = Promise::new(sched.clone());
        let (tx, rx) = mpsc::channel();
        let sched2 = sched.clone();
        p.then_promise(move |v| {
            let inner = Promise::new(sched2.clone());
            let inner2 = inner.clone();
            sched2.schedule_delayed(Duration::from_millis(10), move || {
                inner2.set_value(Value::Int(v.get_int().unwrap() * 2));
            });
            inner
        })
        .then(move |v| {
            tx.send(v.get_int().unwrap()).unwrap();
            PromiseResult::Value(v)
        });
        p.set_value(Value::Int(21));
        assert_eq!(rx.recv_timeout(Duration::from_secs(1)).unwrap(), 42);
    }

    #[test]
    fn single_assignment_ignores_second_set() {
        let sched = Scheduler::new(1);
        let p = Promise::new(sched);
        assert!(p.set_value(Value::Int(1)));
        assert!(!p.set_value(Value::Int(2)));
        assert_eq!(p.result(), PromiseResult::Value(Value::Int(1)));
    }

    #[test]
    fn error_clears_pending_value_callbacks() {
        let sched = Scheduler::new(1);
        let p = Promise::new(sched);
        let (tx, rx) = mpsc::channel::<()>();
        p.then(move |_| {
            tx.send(()).unwrap();
            PromiseResult::Undefined
        });
        p.set_error("boom");
        assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());
    }

    #[test]
    fn fail_runs_on_error() {
        let sched = Scheduler::new(1);
        let p = Promise::new(sched);
        let (tx, rx) = mpsc::channel();
        p.fail(move |e| tx.send(e).unwrap());
        p.set_error("nope");
        assert_eq!(rx.recv_timeout(Duration::from_secs(1)).unwrap(), "nope");
    }

    #[test]
    fn then_panic_settles_child_to_error_without_wedging_the_scheduler() {
        let sched = Scheduler::new(2);
        let p = Promise::new(sched.clone());
        let child = p.then(|_| panic!("then callback kaboom"));
        p.set_value(Value::Int(1));
        while !child.has_result() {
            std::thread::sleep(Duration::from_millis(1));
        }
        assert!(matches!(child.result(), PromiseResult::Error(_)));

        // the scheduler worker that ran the panicking callback must still
        // be able to run further work afterwards.
        let next = Promise::new(sched);
        next.set_value(Value::Int(2));
        assert_eq!(next.result(), PromiseResult::Value(Value::Int(2)));
    }

    #[test]
    fn then_promise_panic_settles_child_to_error() {
        let sched = Scheduler::new(2);
        let p = Promise::new(sched);
        let child = p.then_promise(|_| panic!("then_promise callback kaboom"));
        p.set_value(Value::Int(1));
        while !child.has_result() {
            std::thread::sleep(Duration::from_millis(1));
        }
        assert!(matches!(child.result(), PromiseResult::Error(_)));
    }
}
