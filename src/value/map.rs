use std::fmt;

use im::HashMap as ImHashMap;

use super::Value;

/// A persistently-shared string-keyed mapping to [`Value`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Map {
    entries: ImHashMap<String, Value>,
}

impl Map {
    pub fn new() -> Self {
        Map { entries: ImHashMap::new() }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        self.entries.insert(key.into(), value);
    }

    pub fn erase(&mut self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn find(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    pub fn iter(&self) -> im::hashmap::Iter<'_, String, Value> {
        self.entries.iter()
    }

    /// Attempts a keyed lookup-and-coerce for each `(key, slot)` pair.
    /// On success, returns `(true, String::new())`; on failure returns
    /// `(false, message)` naming the offending key.
    pub fn get(&self, slots: &mut [(&str, super::list::UnpackSlot<'_>)]) -> (bool, String) {
        for (key, slot) in slots.iter_mut() {
            match self.entries.get(*key) {
                None => return (false, format!("invalid key {}", key)),
                Some(value) => {
                    if !(slot.assign)(value) {
                        return (
                            false,
                            format!(
                                "invalid cast from type {} to {}",
                                value.type_name(),
                                slot.target_type
                            ),
                        );
                    }
                }
            }
        }
        (true, String::new())
    }
}

impl From<ImHashMap<String, Value>> for Map {
    fn from(entries: ImHashMap<String, Value>) -> Self {
        Map { entries }
    }
}

impl FromIterator<(String, Value)> for Map {
    fn from_iter<T: IntoIterator<Item = (String, Value)>>(iter: T) -> Self {
        Map { entries: iter.into_iter().collect() }
    }
}

impl fmt::Display for Map {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, (k, v)) in self.entries.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{:?}:{}", k, v)?;
        }
        write!(f, "}}")
    }
}
