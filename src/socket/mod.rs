//! Wire-level binding of Mailboxes and topics to a remote endpoint, so the
//! same `send`/`Promise` programming model works in-process and over
//! transport — grounded on `traeger::socket::{Socket,Context}`.
//!
//! No wire library appears anywhere in the retrieval pack (this crate's
//! `Non-goals` explicitly leave "the concrete wire library" out of scope),
//! so [`Endpoint`] abstracts it: an in-process [`network`] implementation
//! exercises the request/reply and publish/subscribe envelopes end to end,
//! and a real transport would implement the same trait.

mod context;
mod network;

pub use context::{Context, Publisher, Replier, Requester, Subscriber};

use std::sync::Arc;
use std::time::Duration;

use crate::actor::{Mailbox, StatelessActor};
use crate::promise::{Promise, PromiseResult};
use crate::scheduler::Scheduler;
use crate::value::{List, Value};

/// The default hot-poll cadence for [`Socket::recv`]/[`Socket::send`],
/// matching the original's fixed 10 ms `schedule_delayed` interval
/// (`SPEC_FULL.md` §9, Open Question (a)).
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// A non-blocking, multi-frame transport endpoint owned by exactly one
/// micro-actor; concurrent access is serialised by that actor's RW lock
/// (`SPEC_FULL.md` §5).
pub trait Endpoint: Send + Sync {
    /// Attempts a non-blocking receive-all. `None` means nothing is
    /// available yet; `Some(frames)` is every frame of one message.
    fn recv(&self) -> Option<Vec<String>>;

    /// Attempts a non-blocking send of every frame. `None` means
    /// would-block; `Some(n)` is the number of frames sent.
    fn send(&self, messages: Vec<String>) -> Option<usize>;
}

/// Wraps an [`Endpoint`] as a two-method micro-actor Mailbox: `recv()`
/// returns `Null` on would-block or a `List<String>` on success; `send`
/// takes a `List<String>` and returns `Null` on would-block or the frame
/// count. Both methods are `Exclusive` — the endpoint itself serialises
/// recv and send, so the actor must too.
fn endpoint_mailbox(endpoint: Arc<dyn Endpoint>) -> Mailbox {
    let mut actor = StatelessActor::new();

    let recv_endpoint = endpoint.clone();
    actor.define_writer(
        "recv",
        Arc::new(move |_args: List| match recv_endpoint.recv() {
            Some(frames) => {
                let mut list = List::new();
                for frame in frames {
                    list.push_back(Value::from(frame));
                }
                PromiseResult::Value(Value::List(list))
            }
            None => PromiseResult::Value(Value::Null),
        }),
    );

    let send_endpoint = endpoint;
    actor.define_writer(
        "send",
        Arc::new(move |args: List| {
            let mut frames = Vec::with_capacity(args.len());
            for value in args.iter() {
                match value.get_string() {
                    Some(s) => frames.push(s.to_string()),
                    None => {
                        return PromiseResult::Error(
                            "send expects a list of string frames".to_string(),
                        )
                    }
                }
            }
            match send_endpoint.send(frames) {
                Some(n) => PromiseResult::Value(Value::Int(n as i64)),
                None => PromiseResult::Value(Value::Null),
            }
        }),
    );

    actor.mailbox()
}

/// The polling facade over a socket-backed [`Mailbox`]: `recv`/`send`
/// reschedule themselves with a delay whenever the inner call yields
/// `Null`, producing a hot-polling loop that cooperates with the rest of
/// the scheduler's work — grounded on `traeger::socket::Socket`.
#[derive(Clone)]
pub struct Socket {
    mailbox: Mailbox,
    poll_interval: Duration,
}

impl Socket {
    pub(crate) fn wrap(endpoint: Arc<dyn Endpoint>, poll_interval: Duration) -> Self {
        Socket { mailbox: endpoint_mailbox(endpoint), poll_interval }
    }

    pub fn recv(&self, scheduler: &Scheduler) -> Promise {
        let promise = Promise::new(scheduler.clone());
        schedule_recv(scheduler.clone(), self.mailbox.clone(), self.poll_interval, promise.clone());
        promise
    }

    pub fn send(&self, scheduler: &Scheduler, messages: Vec<String>) -> Promise {
        let promise = Promise::new(scheduler.clone());
        let mut args = List::new();
        for message in messages {
            args.push_back(Value::from(message));
        }
        schedule_send(scheduler.clone(), self.mailbox.clone(), self.poll_interval, args, promise.clone());
        promise
    }
}

fn schedule_recv(scheduler: Scheduler, mailbox: Mailbox, poll_interval: Duration, promise: Promise) {
    if promise.has_result() {
        return;
    }
    let inner = mailbox.send(&scheduler, "recv", List::new());

    let scheduler_ok = scheduler.clone();
    let mailbox_ok = mailbox.clone();
    let promise_ok = promise.clone();
    inner.then(move |value| {
        if value.is_null() {
            let scheduler_retry = scheduler_ok.clone();
            let mailbox_retry = mailbox_ok.clone();
            let promise_retry = promise_ok.clone();
            scheduler_ok.schedule_delayed(poll_interval, move || {
                schedule_recv(scheduler_retry, mailbox_retry, poll_interval, promise_retry);
            });
        } else {
            promise_ok.set_value(value);
        }
        PromiseResult::Undefined
    });

    let promise_err = promise;
    inner.fail(move |e| {
        promise_err.set_error(e);
    });
}

fn schedule_send(
    scheduler: Scheduler,
    mailbox: Mailbox,
    poll_interval: Duration,
    args: List,
    promise: Promise,
) {
    if promise.has_result() {
        return;
    }
    let inner = mailbox.send(&scheduler, "send", args.clone());

    let scheduler_ok = scheduler.clone();
    let mailbox_ok = mailbox.clone();
    let promise_ok = promise.clone();
    inner.then(move |value| {
        if value.is_null() {
            let scheduler_retry = scheduler_ok.clone();
            let mailbox_retry = mailbox_ok.clone();
            let args_retry = args.clone();
            let promise_retry = promise_ok.clone();
            scheduler_ok.schedule_delayed(poll_interval, move || {
                schedule_send(scheduler_retry, mailbox_retry, poll_interval, args_retry, promise_retry);
            });
        } else {
            promise_ok.set_value(value);
        }
        PromiseResult::Undefined
    });

    let promise_err = promise;
    inner.fail(move |e| {
        promise_err.set_error(e);
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration as StdDuration;

    struct FlakyEndpoint {
        calls: AtomicUsize,
        ready_after: usize,
    }

    impl Endpoint for FlakyEndpoint {
        fn recv(&self) -> Option<Vec<String>> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n + 1 >= self.ready_after {
                Some(vec!["hello".to_string()])
            } else {
                None
            }
        }

        fn send(&self, _messages: Vec<String>) -> Option<usize> {
            None
        }
    }

    #[test]
    fn recv_hot_polls_until_endpoint_has_data() {
        let sched = Scheduler::new(2);
        let endpoint: Arc<dyn Endpoint> =
            Arc::new(FlakyEndpoint { calls: AtomicUsize::new(0), ready_after: 3 });
        let socket = Socket::wrap(endpoint, StdDuration::from_millis(1));
        let promise = socket.recv(&sched);
        while !promise.has_result() {
            std::thread::sleep(StdDuration::from_millis(1));
        }
        let frames = promise.result();
        match frames {
            PromiseResult::Value(Value::List(list)) => {
                assert_eq!(list.get(0), Some(&Value::from("hello")));
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
