//! `StatefulActor<S>`: a [`StatelessActor`] whose registered methods close
//! over a shared state object `S` behind a single `RwLock`, so the actor's
//! own try-lock dispatch discipline is exactly what serializes access to
//! `S` — no separate locking scheme is needed inside the method bodies.

use std::sync::{Arc, RwLock};

use super::{Mailbox, StatelessActor};
use crate::promise::PromiseResult;
use crate::value::List;

/// Wraps a `StatelessActor` plus `Arc<RwLock<S>>`. `define_reader`/
/// `define_writer` hand the closure a borrowed `&S`/`&mut S` already taken
/// under the matching lock mode, rather than the raw lock handle, so a
/// method body cannot accidentally take the wrong mode or forget to drop
/// the guard before returning.
pub struct StatefulActor<S> {
    state: Arc<RwLock<S>>,
    actor: StatelessActor,
}

impl<S> StatefulActor<S>
where
    S: Send + Sync + 'static,
{
    pub fn new(state: S) -> Self {
        StatefulActor {
            state: Arc::new(RwLock::new(state)),
            actor: StatelessActor::new(),
        }
    }

    /// Registers a read-only method. `function` receives `(&S, List)` and
    /// must not mutate through interior mutability if it wants to honor
    /// the `Shared` concurrency contract.
    pub fn define_reader<F>(&mut self, name: impl Into<String>, function: F)
    where
        F: Fn(&S, List) -> PromiseResult + Send + Sync + 'static,
    {
        let state = self.state.clone();
        self.actor.define_reader(
            name,
            Arc::new(move |args| match state.read() {
                Ok(guard) => function(&guard, args),
                Err(_) => PromiseResult::Error("actor state lock poisoned".to_string()),
            }),
        );
    }

    /// Registers a mutating method. `function` receives `(&mut S, List)`.
    pub fn define_writer<F>(&mut self, name: impl Into<String>, function: F)
    where
        F: Fn(&mut S, List) -> PromiseResult + Send + Sync + 'static,
    {
        let state = self.state.clone();
        self.actor.define_writer(
            name,
            Arc::new(move |args| match state.write() {
                Ok(mut guard) => function(&mut guard, args),
                Err(_) => PromiseResult::Error("actor state lock poisoned".to_string()),
            }),
        );
    }

    pub fn mailbox(&self) -> Mailbox {
        self.actor.mailbox()
    }

    /// Direct, out-of-band access to the state for host code that holds
    /// the `StatefulActor` itself rather than only a `Mailbox` to it (for
    /// example, test assertions on final state). Bypasses the actor's
    /// queue discipline entirely.
    pub fn with_state<R>(&self, f: impl FnOnce(&S) -> R) -> R {
        let guard = self.state.read().expect("actor state lock poisoned");
        f(&guard)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::Scheduler;
    use crate::value::Value;

    struct Account {
        balance: f64,
    }

    fn build_account() -> StatefulActor<Account> {
        let mut actor = StatefulActor::new(Account { balance: 0.0 });
        actor.define_reader("balance", |state, _args| {
            PromiseResult::Value(Value::Float(state.balance))
        });
        actor.define_writer("deposit", |state, args| {
            let mut amount = 0.0;
            let (ok, err) = args.unpack(&mut [crate::value::list::UnpackSlot::float(&mut amount)]);
            if !ok {
                return PromiseResult::Error(err);
            }
            if amount <= 0.0 {
                return PromiseResult::Error("invalid amount".to_string());
            }
            state.balance += amount;
            PromiseResult::Value(Value::Float(state.balance))
        });
        actor.define_writer("debit", |state, args| {
            let mut amount = 0.0;
            let (ok, err) = args.unpack(&mut [crate::value::list::UnpackSlot::float(&mut amount)]);
            if !ok {
                return PromiseResult::Error(err);
            }
            if amount <= 0.0 {
                return PromiseResult::Error("invalid amount".to_string());
            }
            if amount > state.balance {
                return PromiseResult::Error("not enough funds".to_string());
            }
            state.balance -= amount;
            PromiseResult::Value(Value::Float(state.balance))
        });
        actor
    }

    fn call(mailbox: &Mailbox, sched: &Scheduler, method: &str, amount: f64) -> PromiseResult {
        let mut args = List::new();
        args.push_back(Value::Float(amount));
        let promise = mailbox.send(sched, method, args);
        while !promise.has_result() {
            std::thread::sleep(std::time::Duration::from_millis(1));
        }
        promise.result()
    }

    #[test]
    fn account_scenario_accumulates_two_errors_and_settles_at_500() {
        let sched = Scheduler::new(2);
        let account = build_account();
        let mailbox = account.mailbox();

        let mut errors = 0;
        let ops: [(&str, f64); 7] = [
            ("deposit", 1000.0),
            ("deposit", 500.0),
            ("deposit", 0.0),
            ("debit", -2000.0),
            ("debit", 750.0),
            ("deposit", 250.0),
            ("debit", 500.0),
        ];
        for (method, amount) in ops {
            if let PromiseResult::Error(_) = call(&mailbox, &sched, method, amount) {
                errors += 1;
            }
        }

        assert_eq!(errors, 2);
        account.with_state(|state| assert_eq!(state.balance, 500.0));
    }

    #[test]
    fn writer_and_reader_interleave_without_losing_updates() {
        let sched = Scheduler::new(4);
        let account = build_account();
        let mailbox = account.mailbox();
        call(&mailbox, &sched, "deposit", 100.0);
        let promise = mailbox.send(&sched, "balance", List::new());
        while !promise.has_result() {
            std::thread::sleep(std::time::Duration::from_millis(1));
        }
        assert_eq!(promise.result(), PromiseResult::Value(Value::Float(100.0)));
    }
}
