//! A compact actor-and-messaging runtime: an immutable structurally-shared
//! `Value` model, a fixed-thread-pool `Scheduler`, a `Promise` continuation
//! primitive bound to it, and reader/writer actors reachable only through
//! a `Mailbox`. `Group`, `Queue`, the socket transport and the `Format`
//! codec registry are collaborators built on top of these four.

pub mod actor;
pub mod config;
pub mod error;
pub mod format;
pub mod module;
pub mod promise;
pub mod queue;
pub mod scheduler;
pub mod socket;
pub mod value;

pub use actor::{Concurrency, Group, Mailbox, MailboxInterface, StatefulActor, StatelessActor};
pub use config::{init_logging, load_config, Config};
pub use error::RuntimeError;
pub use module::Module;
pub use promise::{Promise, PromiseResult};
pub use queue::Queue;
pub use scheduler::Scheduler;
pub use socket::{Context, Publisher, Replier, Requester, Socket, Subscriber};
pub use value::{List, Map, Value};
