//! `Context`, `Replier`, `Requester`, `Publisher`, `Subscriber`: the wire
//! envelope described in `SPEC_FULL.md` §4.7, built on the in-process
//! [`super::network`] stand-in for the wire library — grounded on
//! `traeger::socket::{Context,Replier,Requester,Publisher,Subscriber}`.

use std::sync::Arc;
use std::time::Duration;

use super::network::{DealerEndpoint, Networks, PublisherEndpoint, RouterEndpoint, SubscriberEndpoint};
use super::{Endpoint, Socket, DEFAULT_POLL_INTERVAL};
use crate::actor::{Mailbox, MailboxInterface};
use crate::format::Format;
use crate::promise::{Promise, PromiseResult};
use crate::scheduler::Scheduler;
use crate::value::{List, Value};
use crate::{format, unpack};

/// Owns an isolated address space and spawns socket-backed micro-actors
/// bound or connected within it.
#[derive(Clone)]
pub struct Context {
    networks: Arc<Networks>,
    poll_interval: Duration,
}

impl Context {
    pub fn new() -> Self {
        Context { networks: Arc::new(Networks::new()), poll_interval: DEFAULT_POLL_INTERVAL }
    }

    /// As [`Context::new`] but with a shorter poll cadence, for tests that
    /// would otherwise wait out the default 10 ms between retries.
    pub fn with_poll_interval(poll_interval: Duration) -> Self {
        Context { networks: Arc::new(Networks::new()), poll_interval }
    }

    pub fn replier(&self, address: &str) -> Result<Replier, String> {
        let state = self.networks.router(address);
        let endpoint: Arc<dyn Endpoint> = Arc::new(RouterEndpoint::new(state));
        Ok(Replier { router: Socket::wrap(endpoint, self.poll_interval) })
    }

    pub fn requester(&self, address: &str, format: Arc<dyn Format>) -> Result<Requester, String> {
        let state = self.networks.router(address);
        let (id, rx) = state.register_dealer();
        let endpoint: Arc<dyn Endpoint> = Arc::new(DealerEndpoint::new(id, state, rx));
        let dealer = Socket::wrap(endpoint, self.poll_interval);
        let mailbox = Mailbox::new(Arc::new(RequesterMailbox { dealer, format }));
        Ok(Requester { mailbox })
    }

    pub fn publisher(&self, address: &str, format: Arc<dyn Format>) -> Result<Publisher, String> {
        let state = self.networks.pubsub(address);
        let endpoint: Arc<dyn Endpoint> = Arc::new(PublisherEndpoint::new(state));
        Ok(Publisher { publisher: Socket::wrap(endpoint, self.poll_interval), format })
    }

    pub fn subscriber(&self, address: &str, topics: &[String]) -> Result<Subscriber, String> {
        let state = self.networks.pubsub(address);
        let endpoint: Arc<dyn Endpoint> = Arc::new(SubscriberEndpoint::new(&state, topics.to_vec()));
        Ok(Subscriber { subscriber: Socket::wrap(endpoint, self.poll_interval) })
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

/// The requester (dealer) mailbox: encodes `args` via the configured
/// `Format`, emits `[method, format-name, encoded-args]`, and awaits the
/// two-frame `[encoded-response, error]` reply.
struct RequesterMailbox {
    dealer: Socket,
    format: Arc<dyn Format>,
}

impl MailboxInterface for RequesterMailbox {
    fn send(&self, scheduler: &Scheduler, name: &str, args: List) -> Promise {
        let scheduler = scheduler.clone();
        let encoded = match format::encode_text(self.format.as_ref(), &Value::List(args)) {
            Ok(s) => s,
            Err(e) => {
                let promise = Promise::new(scheduler);
                promise.set_error(e);
                return promise;
            }
        };

        let dealer_for_recv = self.dealer.clone();
        let scheduler_for_recv = scheduler.clone();
        let format_for_decode = self.format.clone();

        self.dealer
            .send(&scheduler, vec![name.to_string(), self.format.name().to_string(), encoded])
            .then_promise(move |_| dealer_for_recv.recv(&scheduler_for_recv))
            .then(move |value| {
                let frames = match value.get_list() {
                    Some(l) => l,
                    None => return PromiseResult::Error("expected a two-frame reply".to_string()),
                };
                let (mut response, mut response_error) = (String::new(), String::new());
                let (ok, err) = unpack!(frames => string(&mut response), string(&mut response_error));
                if !ok {
                    return PromiseResult::Error(err);
                }
                if response.is_empty() {
                    return PromiseResult::Error(response_error);
                }
                match format::decode_text(format_for_decode.as_ref(), &response) {
                    Ok(value) => PromiseResult::Value(value),
                    Err(e) => PromiseResult::Error(e),
                }
            })
    }
}

/// A resolved client mailbox bound to one dealer socket.
pub struct Requester {
    mailbox: Mailbox,
}

impl Requester {
    pub fn mailbox(&self) -> Mailbox {
        self.mailbox.clone()
    }
}

/// Loops `recv` on the router socket, dispatches each decoded request to
/// `mailbox`, and writes the reply back. Completes when externally
/// signalled (by settling the returned `Promise`).
pub struct Replier {
    router: Socket,
}

impl Replier {
    pub fn reply(&self, scheduler: &Scheduler, mailbox: &Mailbox) -> Promise {
        let promise = Promise::new(scheduler.clone());
        schedule_reply(scheduler.clone(), self.router.clone(), mailbox.clone(), promise.clone());
        promise
    }
}

fn schedule_reply(scheduler: Scheduler, router: Socket, mailbox: Mailbox, promise: Promise) {
    if promise.has_result() {
        return;
    }
    let recv_promise = router.recv(&scheduler);

    let scheduler_next = scheduler.clone();
    let router_next = router.clone();
    let mailbox_next = mailbox.clone();
    let promise_next = promise.clone();
    let scheduler_handle = scheduler.clone();
    let router_handle = router.clone();
    let mailbox_handle = mailbox.clone();

    recv_promise.clone().then(move |value| {
        if let Some(frames) = value.get_list().cloned() {
            let scheduler_for_next = scheduler_next.clone();
            let router_for_next = router_next.clone();
            let mailbox_for_next = mailbox_next.clone();
            let promise_for_next = promise_next.clone();
            scheduler_next.schedule(move || {
                schedule_reply(scheduler_for_next, router_for_next, mailbox_for_next, promise_for_next);
            });
            handle_request(frames, &scheduler_handle, &router_handle, &mailbox_handle);
        }
        PromiseResult::Undefined
    });

    let promise_err = promise;
    recv_promise.fail(move |e| {
        promise_err.set_error(e);
    });
}

fn handle_request(frames: List, scheduler: &Scheduler, router: &Socket, mailbox: &Mailbox) {
    let (mut id, mut method, mut format_name, mut request) =
        (String::new(), String::new(), String::new(), String::new());
    let (ok, _err) = unpack!(
        frames => string(&mut id), string(&mut method), string(&mut format_name), string(&mut request)
    );
    if !ok {
        return;
    }

    let format = match format::by_name(&format_name) {
        Some(f) => f,
        None => {
            router.send(scheduler, vec![id, String::new(), format!("no such format {}", format_name)]);
            return;
        }
    };
    let decoded = match format::decode_text(format.as_ref(), &request) {
        Ok(v) => v,
        Err(e) => {
            router.send(scheduler, vec![id, String::new(), e]);
            return;
        }
    };
    let arguments = match decoded.get_list() {
        Some(l) => l.clone(),
        None => {
            router.send(scheduler, vec![id, String::new(), "expected a list with arguments".to_string()]);
            return;
        }
    };

    let router_ok = router.clone();
    let scheduler_ok = scheduler.clone();
    let id_ok = id.clone();
    let router_err = router.clone();
    let scheduler_err = scheduler.clone();
    let id_err = id;

    let inner = mailbox.send(scheduler, &method, arguments);
    inner.then(move |value| {
        match format::encode_text(format.as_ref(), &value) {
            Ok(encoded) => {
                router_ok.send(&scheduler_ok, vec![id_ok, encoded, String::new()]);
            }
            Err(e) => {
                router_ok.send(&scheduler_ok, vec![id_ok, String::new(), e]);
            }
        }
        PromiseResult::Undefined
    });
    inner.fail(move |e| {
        router_err.send(&scheduler_err, vec![id_err, String::new(), e]);
    });
}

/// `publish(scheduler, topic, value)` encodes `value` and emits
/// `[topic, format-name, encoded-value]`.
pub struct Publisher {
    publisher: Socket,
    format: Arc<dyn Format>,
}

impl Publisher {
    pub fn publish(&self, scheduler: &Scheduler, topic: &str, value: &Value) -> Promise {
        match format::encode_text(self.format.as_ref(), value) {
            Ok(encoded) => {
                self.publisher
                    .send(scheduler, vec![topic.to_string(), self.format.name().to_string(), encoded])
            }
            Err(e) => {
                let promise = Promise::new(scheduler.clone());
                promise.set_error(e);
                promise
            }
        }
    }
}

/// `listen(scheduler, callback)` keeps reading three-frame messages,
/// decodes them via the named `Format`, and invokes `callback(topic,
/// value)` until externally signalled.
pub struct Subscriber {
    subscriber: Socket,
}

impl Subscriber {
    pub fn listen<F>(&self, scheduler: &Scheduler, callback: F) -> Promise
    where
        F: Fn(String, Value) + Send + Sync + 'static,
    {
        let promise = Promise::new(scheduler.clone());
        schedule_listen(scheduler.clone(), self.subscriber.clone(), Arc::new(callback), promise.clone());
        promise
    }
}

type ListenCallback = dyn Fn(String, Value) + Send + Sync;

fn schedule_listen(scheduler: Scheduler, subscriber: Socket, callback: Arc<ListenCallback>, promise: Promise) {
    if promise.has_result() {
        return;
    }
    let recv_promise = subscriber.recv(&scheduler);

    let scheduler_next = scheduler.clone();
    let subscriber_next = subscriber.clone();
    let callback_next = callback.clone();
    let promise_next = promise.clone();

    recv_promise.clone().then(move |value| {
        if let Some(frames) = value.get_list().cloned() {
            let scheduler_retry = scheduler_next.clone();
            let subscriber_retry = subscriber_next.clone();
            let callback_retry = callback_next.clone();
            let promise_retry = promise_next.clone();
            scheduler_next.schedule(move || {
                schedule_listen(scheduler_retry, subscriber_retry, callback_retry, promise_retry);
            });
            deliver(frames, &callback_next);
        }
        PromiseResult::Undefined
    });

    let promise_err = promise;
    recv_promise.fail(move |e| {
        promise_err.set_error(e);
    });
}

fn deliver(frames: List, callback: &Arc<ListenCallback>) {
    let (mut topic, mut format_name, mut encoded) = (String::new(), String::new(), String::new());
    let (ok, _err) = unpack!(frames => string(&mut topic), string(&mut format_name), string(&mut encoded));
    if !ok {
        return;
    }
    if let Some(format) = format::by_name(&format_name) {
        if let Ok(value) = format::decode_text(format.as_ref(), &encoded) {
            callback(topic, value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actor::StatelessActor;
    use crate::format;
    use crate::promise::PromiseResult;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    fn wait(promise: &Promise) -> PromiseResult {
        let start = std::time::Instant::now();
        while !promise.has_result() {
            assert!(start.elapsed() < Duration::from_secs(5), "timed out waiting for promise");
            std::thread::sleep(Duration::from_millis(1));
        }
        promise.result()
    }

    #[test]
    fn requester_replier_round_trip_over_json() {
        let sched = Scheduler::new(4);
        let ctx = Context::with_poll_interval(Duration::from_millis(1));

        let mut actor = StatelessActor::new();
        actor.define_reader(
            "echo",
            Arc::new(|args: List| PromiseResult::Value(Value::List(args))),
        );
        let mailbox = actor.mailbox();

        let json = format::require("json").unwrap();
        let replier = ctx.replier("ipc://test-reqrep").unwrap();
        let requester = ctx.requester("ipc://test-reqrep", json).unwrap();

        let reply_loop = replier.reply(&sched, &mailbox);

        let mut args = List::new();
        args.push_back(Value::from("hi"));
        let response = requester.mailbox().send(&sched, "echo", args);
        let result = wait(&response);
        assert_eq!(
            result,
            PromiseResult::Value(Value::List({
                let mut l = List::new();
                l.push_back(Value::from("hi"));
                l
            }))
        );

        reply_loop.set_value(Value::Null);
    }

    #[test]
    fn requester_surfaces_actor_errors() {
        let sched = Scheduler::new(4);
        let ctx = Context::with_poll_interval(Duration::from_millis(1));

        let actor = StatelessActor::new();
        let mailbox = actor.mailbox();

        let json = format::require("json").unwrap();
        let replier = ctx.replier("ipc://test-reqrep-err").unwrap();
        let requester = ctx.requester("ipc://test-reqrep-err", json).unwrap();
        let reply_loop = replier.reply(&sched, &mailbox);

        let response = requester.mailbox().send(&sched, "missing", List::new());
        assert_eq!(
            wait(&response),
            PromiseResult::Error("no such actor method missing".to_string())
        );

        reply_loop.set_value(Value::Null);
    }

    #[test]
    fn publisher_subscriber_round_trip_delivers_in_order() {
        let sched = Scheduler::new(4);
        let ctx = Context::with_poll_interval(Duration::from_millis(1));

        let json = format::require("json").unwrap();
        let publisher = ctx.publisher("ipc://test-pubsub", json).unwrap();
        let subscriber = ctx.subscriber("ipc://test-pubsub", &["my_topic".to_string()]).unwrap();

        let received = Arc::new(Mutex::new(Vec::new()));
        let received_cb = received.clone();
        let listen_promise = subscriber.listen(&sched, move |topic, value| {
            assert_eq!(topic, "my_topic");
            received_cb.lock().unwrap().push(value.get_int().unwrap());
        });

        for n in [10, 20, 30, 40, 50] {
            wait(&publisher.publish(&sched, "my_topic", &Value::Int(n)));
        }

        let start = std::time::Instant::now();
        while received.lock().unwrap().len() < 5 {
            assert!(start.elapsed() < Duration::from_secs(5), "timed out waiting for deliveries");
            std::thread::sleep(Duration::from_millis(1));
        }
        assert_eq!(*received.lock().unwrap(), vec![10, 20, 30, 40, 50]);

        listen_promise.set_value(Value::Null);
    }
}
