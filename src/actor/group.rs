//! `Group`: a persistent name → [`Mailbox`] map with a façade mailbox that
//! splits an incoming path at the first `/`, forwards the remainder to the
//! named member, and wraps the reply in a `source` breadcrumb —
//! grounded on `traeger::actor::Group`.

use std::sync::Arc;

use super::{Mailbox, MailboxInterface};
use crate::promise::{Promise, PromiseResult};
use crate::scheduler::Scheduler;
use crate::value::{List, Map, Value};

/// A persistent member-name → `Mailbox` registry. Adding a member never
/// affects a `mailbox()` handed out earlier, thanks to `im::HashMap`'s
/// structural sharing.
#[derive(Clone)]
pub struct Group {
    members: im::HashMap<String, Mailbox>,
}

impl Group {
    pub fn new() -> Self {
        Group { members: im::HashMap::new() }
    }

    /// Registers or replaces `name` as a routable member.
    pub fn add(&mut self, name: impl Into<String>, mailbox: Mailbox) {
        self.members.insert(name.into(), mailbox);
    }

    pub fn find(&self, member: &str) -> Option<Mailbox> {
        self.members.get(member).cloned()
    }

    pub fn mailbox(&self) -> Mailbox {
        Mailbox::new(Arc::new(GroupMailbox { members: self.members.clone() }))
    }
}

impl Default for Group {
    fn default() -> Self {
        Self::new()
    }
}

struct GroupMailbox {
    members: im::HashMap<String, Mailbox>,
}

/// Wraps `value` as `{"source": "<member>/<method>", "value": value,
/// "error": null}`, or — if `value` is already a breadcrumb Map carrying a
/// `source` string — prepends `"<member>/"` to that source instead of
/// nesting a fresh envelope.
fn wrap_value(member: &str, method: &str, value: Value) -> Value {
    if let Value::Map(map) = &value {
        if let Some(source) = map.find("source").and_then(|v| v.get_string()) {
            let mut rewrapped = map.clone();
            rewrapped.set("source", Value::from(format!("{}/{}", member, source)));
            return Value::Map(rewrapped);
        }
    }
    let mut envelope = Map::new();
    envelope.set("source", Value::from(format!("{}/{}", member, method)));
    envelope.set("value", value);
    envelope.set("error", Value::Null);
    Value::Map(envelope)
}

fn wrap_error(member: &str, method: &str, error: String) -> Value {
    let mut envelope = Map::new();
    envelope.set("source", Value::from(format!("{}/{}", member, method)));
    envelope.set("value", Value::Null);
    envelope.set("error", Value::from(error));
    Value::Map(envelope)
}

impl MailboxInterface for GroupMailbox {
    fn send(&self, scheduler: &Scheduler, path: &str, args: List) -> Promise {
        let promise = Promise::new(scheduler.clone());

        let pos = match path.find('/') {
            Some(pos) => pos,
            None => {
                promise.set_error(format!("invalid path {}", path));
                return promise;
            }
        };
        let member = &path[..pos];
        let method = &path[pos + 1..];

        let mailbox = match self.members.get(member) {
            Some(mailbox) => mailbox.clone(),
            None => {
                promise.set_error(format!("no such group member {}", member));
                return promise;
            }
        };

        let member_owned = member.to_string();
        let method_owned = method.to_string();
        let outer = promise.clone();
        let member_for_error = member_owned.clone();
        let method_for_error = method_owned.clone();

        let inner = mailbox.send(scheduler, method, args);
        inner.then(move |value| {
            outer.set_value(wrap_value(&member_owned, &method_owned, value));
            PromiseResult::Undefined
        });
        let outer_err = promise.clone();
        inner.fail(move |error| {
            outer_err.set_value(wrap_error(&member_for_error, &method_for_error, error));
        });

        promise
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actor::StatelessActor;
    use crate::scheduler::Scheduler;

    fn divider_mailbox() -> Mailbox {
        let mut actor = StatelessActor::new();
        actor.define_reader(
            "divide",
            std::sync::Arc::new(|args: List| {
                let mut a = 0.0;
                let mut b = 0.0;
                let (ok, err) = args.unpack(&mut [
                    crate::value::list::UnpackSlot::float(&mut a),
                    crate::value::list::UnpackSlot::float(&mut b),
                ]);
                if !ok {
                    return PromiseResult::Error(err);
                }
                if b == 0.0 {
                    return PromiseResult::Error("division by zero".to_string());
                }
                PromiseResult::Value(Value::Float(a / b))
            }),
        );
        actor.mailbox()
    }

    fn wait(promise: &Promise) -> PromiseResult {
        while !promise.has_result() {
            std::thread::sleep(std::time::Duration::from_millis(1));
        }
        promise.result()
    }

    #[test]
    fn routes_to_member_and_wraps_value() {
        let sched = Scheduler::new(2);
        let mut group = Group::new();
        group.add("math", divider_mailbox());
        let mailbox = group.mailbox();

        let mut args = List::new();
        args.push_back(Value::Float(10.0));
        args.push_back(Value::Float(2.0));
        let promise = mailbox.send(&sched, "math/divide", args);
        let result = wait(&promise);
        match result {
            PromiseResult::Value(Value::Map(map)) => {
                assert_eq!(map.find("source"), Some(&Value::from("math/divide")));
                assert_eq!(map.find("value"), Some(&Value::Float(5.0)));
                assert_eq!(map.find("error"), Some(&Value::Null));
            }
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[test]
    fn division_by_zero_wraps_error() {
        let sched = Scheduler::new(2);
        let mut group = Group::new();
        group.add("math", divider_mailbox());
        let mailbox = group.mailbox();

        let mut args = List::new();
        args.push_back(Value::Float(10.0));
        args.push_back(Value::Float(0.0));
        let promise = mailbox.send(&sched, "math/divide", args);
        match wait(&promise) {
            PromiseResult::Value(Value::Map(map)) => {
                assert_eq!(map.find("source"), Some(&Value::from("math/divide")));
                assert_eq!(map.find("value"), Some(&Value::Null));
                assert_eq!(map.find("error"), Some(&Value::from("division by zero")));
            }
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[test]
    fn nested_group_accumulates_breadcrumb() {
        let sched = Scheduler::new(2);
        let mut inner = Group::new();
        inner.add("math", divider_mailbox());

        let mut outer = Group::new();
        outer.add("inner", inner.mailbox());
        let mailbox = outer.mailbox();

        let mut args = List::new();
        args.push_back(Value::Float(9.0));
        args.push_back(Value::Float(0.0));
        let promise = mailbox.send(&sched, "inner/math/divide", args);
        match wait(&promise) {
            PromiseResult::Value(Value::Map(map)) => {
                assert_eq!(map.find("source"), Some(&Value::from("inner/math/divide")));
                assert_eq!(map.find("error"), Some(&Value::from("division by zero")));
            }
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[test]
    fn missing_separator_and_unknown_member_are_distinct_errors() {
        let sched = Scheduler::new(1);
        let mut group = Group::new();
        group.add("math", divider_mailbox());
        let mailbox = group.mailbox();

        let no_slash = wait(&mailbox.send(&sched, "noslash", List::new()));
        assert_eq!(no_slash, PromiseResult::Error("invalid path noslash".to_string()));

        let unknown = wait(&mailbox.send(&sched, "bogus/divide", List::new()));
        assert_eq!(
            unknown,
            PromiseResult::Error("no such group member bogus".to_string())
        );
    }
}
