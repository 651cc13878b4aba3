//! Actors are reachable only through a [`Mailbox`]: a capability handle
//! accepting `send(scheduler, name, args) -> Promise`. Concrete mailboxes
//! include [`StatelessActor`]/[`StatefulActor`], [`Group`], the module
//! loader and the socket requester — all built against this one trait.

mod group;
mod stateful;
mod stateless;

pub use group::Group;
pub use stateful::StatefulActor;
pub use stateless::{Concurrency, Function, StatelessActor};

use std::sync::Arc;

use crate::promise::Promise;
use crate::scheduler::Scheduler;
use crate::value::List;

/// Implemented by every concrete mailbox; wrapped behind the cloneable
/// [`Mailbox`] handle so callers never see the concrete type.
pub trait MailboxInterface: Send + Sync {
    fn send(&self, scheduler: &Scheduler, name: &str, args: List) -> Promise;
}

/// A cheap, cloneable capability handle over a [`MailboxInterface`].
#[derive(Clone)]
pub struct Mailbox {
    interface: Arc<dyn MailboxInterface>,
}

impl Mailbox {
    pub fn new(interface: Arc<dyn MailboxInterface>) -> Self {
        Mailbox { interface }
    }

    pub fn send(&self, scheduler: &Scheduler, name: &str, args: List) -> Promise {
        self.interface.send(scheduler, name, args)
    }
}
