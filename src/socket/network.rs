//! An in-process stand-in for the wire library `SPEC_FULL.md` §1 scopes
//! out: router/dealer hand-off for request/reply, and a topic-filtered
//! fan-out for publish/subscribe. Each [`Networks`] instance is an
//! isolated address space, mirroring one `zmq::context_t` per `Context`.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};

use super::Endpoint;

#[derive(Default)]
pub(crate) struct Networks {
    routers: Mutex<HashMap<String, Arc<RouterState>>>,
    pubsubs: Mutex<HashMap<String, Arc<PubSubState>>>,
}

impl Networks {
    pub(crate) fn new() -> Self {
        Networks::default()
    }

    pub(crate) fn router(&self, address: &str) -> Arc<RouterState> {
        self.routers
            .lock()
            .unwrap()
            .entry(address.to_string())
            .or_insert_with(|| Arc::new(RouterState::new()))
            .clone()
    }

    pub(crate) fn pubsub(&self, address: &str) -> Arc<PubSubState> {
        self.pubsubs
            .lock()
            .unwrap()
            .entry(address.to_string())
            .or_insert_with(|| Arc::new(PubSubState::new()))
            .clone()
    }
}

/// Shared state behind one bound request/reply address: a FIFO of
/// `(dealer_id, frames)` requests and a reply channel per connected
/// dealer, keyed by the id the router stamps onto the first frame of
/// whatever it hands back to `recv` (mirroring a real ROUTER socket's
/// identity-frame convention).
pub(crate) struct RouterState {
    inbound: Mutex<VecDeque<(u64, Vec<String>)>>,
    dealers: Mutex<HashMap<u64, mpsc::Sender<Vec<String>>>>,
    next_id: AtomicU64,
}

impl RouterState {
    fn new() -> Self {
        RouterState {
            inbound: Mutex::new(VecDeque::new()),
            dealers: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    pub(crate) fn register_dealer(self: &Arc<Self>) -> (u64, mpsc::Receiver<Vec<String>>) {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = mpsc::channel();
        self.dealers.lock().unwrap().insert(id, tx);
        (id, rx)
    }
}

pub(crate) struct RouterEndpoint {
    state: Arc<RouterState>,
}

impl RouterEndpoint {
    pub(crate) fn new(state: Arc<RouterState>) -> Self {
        RouterEndpoint { state }
    }
}

impl Endpoint for RouterEndpoint {
    fn recv(&self) -> Option<Vec<String>> {
        let mut inbound = self.state.inbound.lock().unwrap();
        inbound.pop_front().map(|(id, frames)| {
            let mut out = Vec::with_capacity(frames.len() + 1);
            out.push(id.to_string());
            out.extend(frames);
            out
        })
    }

    fn send(&self, messages: Vec<String>) -> Option<usize> {
        if messages.is_empty() {
            return Some(0);
        }
        let id: u64 = messages[0].parse().ok()?;
        let rest = messages[1..].to_vec();
        let dealers = self.state.dealers.lock().unwrap();
        if let Some(tx) = dealers.get(&id) {
            let _ = tx.send(rest);
        }
        Some(messages.len())
    }
}

pub(crate) struct DealerEndpoint {
    id: u64,
    state: Arc<RouterState>,
    inbox: Mutex<mpsc::Receiver<Vec<String>>>,
}

impl DealerEndpoint {
    pub(crate) fn new(id: u64, state: Arc<RouterState>, inbox: mpsc::Receiver<Vec<String>>) -> Self {
        DealerEndpoint { id, state, inbox: Mutex::new(inbox) }
    }
}

impl Endpoint for DealerEndpoint {
    fn recv(&self) -> Option<Vec<String>> {
        self.inbox.lock().unwrap().try_recv().ok()
    }

    fn send(&self, messages: Vec<String>) -> Option<usize> {
        let n = messages.len();
        self.state.inbound.lock().unwrap().push_back((self.id, messages));
        Some(n)
    }
}

/// Shared state behind one bound publish/subscribe address: every
/// subscriber's topic filter plus its delivery channel. A subscriber with
/// an empty filter receives everything, matching a bare `SUB` connect
/// with no `subscribe` option set.
pub(crate) struct PubSubState {
    subscribers: Mutex<Vec<(Vec<String>, mpsc::Sender<Vec<String>>)>>,
}

impl PubSubState {
    fn new() -> Self {
        PubSubState { subscribers: Mutex::new(Vec::new()) }
    }

    fn subscribe(&self, topics: Vec<String>) -> mpsc::Receiver<Vec<String>> {
        let (tx, rx) = mpsc::channel();
        self.subscribers.lock().unwrap().push((topics, tx));
        rx
    }

    fn publish(&self, messages: &[String]) {
        let topic = messages.first().cloned().unwrap_or_default();
        let subscribers = self.subscribers.lock().unwrap();
        for (topics, tx) in subscribers.iter() {
            if topics.is_empty() || topics.iter().any(|t| topic.starts_with(t.as_str())) {
                let _ = tx.send(messages.to_vec());
            }
        }
    }
}

pub(crate) struct PublisherEndpoint {
    state: Arc<PubSubState>,
}

impl PublisherEndpoint {
    pub(crate) fn new(state: Arc<PubSubState>) -> Self {
        PublisherEndpoint { state }
    }
}

impl Endpoint for PublisherEndpoint {
    fn recv(&self) -> Option<Vec<String>> {
        None
    }

    fn send(&self, messages: Vec<String>) -> Option<usize> {
        let n = messages.len();
        self.state.publish(&messages);
        Some(n)
    }
}

pub(crate) struct SubscriberEndpoint {
    inbox: Mutex<mpsc::Receiver<Vec<String>>>,
}

impl SubscriberEndpoint {
    pub(crate) fn new(state: &Arc<PubSubState>, topics: Vec<String>) -> Self {
        SubscriberEndpoint { inbox: Mutex::new(state.subscribe(topics)) }
    }
}

impl Endpoint for SubscriberEndpoint {
    fn recv(&self) -> Option<Vec<String>> {
        self.inbox.lock().unwrap().try_recv().ok()
    }

    fn send(&self, _messages: Vec<String>) -> Option<usize> {
        None
    }
}
