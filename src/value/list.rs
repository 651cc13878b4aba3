use std::fmt;

use im::Vector;

use super::Value;

/// An ordered, persistently-shared sequence of [`Value`].
///
/// Clones are O(1) and share structure with the original; mutating
/// operations return a new version without disturbing existing clones.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct List {
    items: Vector<Value>,
}

impl List {
    pub fn new() -> Self {
        List { items: Vector::new() }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn push_back(&mut self, v: Value) {
        self.items.push_back(v);
    }

    pub fn iter(&self) -> im::vector::Iter<'_, Value> {
        self.items.iter()
    }

    /// Resolves a possibly-negative index against the current length.
    /// Negative indices count from the end (`-1` is the last element).
    fn resolve(&self, index: i64) -> Option<usize> {
        let len = self.items.len() as i64;
        let position = if index < 0 { index + len } else { index };
        if position < 0 || position >= len {
            None
        } else {
            Some(position as usize)
        }
    }

    pub fn get(&self, index: i64) -> Option<&Value> {
        self.resolve(index).map(|i| &self.items[i])
    }

    /// Replaces the element at `index`, returning `false` when out of range.
    pub fn set(&mut self, index: i64, value: Value) -> bool {
        match self.resolve(index) {
            Some(i) => {
                self.items.set(i, value);
                true
            }
            None => false,
        }
    }

    /// Truncates or pads with [`Value::Null`] so that `len() == n`.
    pub fn resize(&mut self, n: usize) {
        let len = self.items.len();
        if n < len {
            self.items = self.items.clone().take(n);
        } else {
            for _ in len..n {
                self.items.push_back(Value::Null);
            }
        }
    }

    /// Attempts to coerce every element against the corresponding accessor
    /// in `extractors`. On success, returns `(true, String::new())`; on
    /// failure, `(false, message)` naming the offending index and types.
    pub fn unpack(&self, extractors: &mut [UnpackSlot<'_>]) -> (bool, String) {
        if extractors.len() != self.items.len() {
            return (
                false,
                format!(
                    "expected {} arguments but {} were given",
                    extractors.len(),
                    self.items.len()
                ),
            );
        }
        for (i, (value, slot)) in self.items.iter().zip(extractors.iter_mut()).enumerate() {
            if !(slot.assign)(value) {
                return (
                    false,
                    format!(
                        "invalid cast in argument {} from type {} to {}",
                        i,
                        value.type_name(),
                        slot.target_type
                    ),
                );
            }
        }
        (true, String::new())
    }
}

impl From<Vector<Value>> for List {
    fn from(items: Vector<Value>) -> Self {
        List { items }
    }
}

impl FromIterator<Value> for List {
    fn from_iter<T: IntoIterator<Item = Value>>(iter: T) -> Self {
        List { items: iter.into_iter().collect() }
    }
}

impl IntoIterator for List {
    type Item = Value;
    type IntoIter = im::vector::ConsumingIter<Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

impl fmt::Display for List {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, v) in self.items.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", v)?;
        }
        write!(f, "]")
    }
}

/// A single slot in an [`List::unpack`] call: a target-type name for error
/// messages and a closure that attempts the coercion, writing into an
/// outer local on success.
pub struct UnpackSlot<'a> {
    pub target_type: &'static str,
    pub assign: Box<dyn FnMut(&Value) -> bool + 'a>,
}

impl<'a> UnpackSlot<'a> {
    pub fn bool(out: &'a mut bool) -> Self {
        UnpackSlot {
            target_type: "Bool",
            assign: Box::new(move |v| match v.get_bool() {
                Some(b) => {
                    *out = b;
                    true
                }
                None => false,
            }),
        }
    }

    pub fn int(out: &'a mut i64) -> Self {
        UnpackSlot {
            target_type: "Int",
            assign: Box::new(move |v| match v.get_int() {
                Some(i) => {
                    *out = i;
                    true
                }
                None => false,
            }),
        }
    }

    pub fn uint(out: &'a mut u64) -> Self {
        UnpackSlot {
            target_type: "UInt",
            assign: Box::new(move |v| match v.get_uint() {
                Some(u) => {
                    *out = u;
                    true
                }
                None => false,
            }),
        }
    }

    pub fn float(out: &'a mut f64) -> Self {
        UnpackSlot {
            target_type: "Float",
            assign: Box::new(move |v| match v.get_float() {
                Some(f) => {
                    *out = f;
                    true
                }
                None => false,
            }),
        }
    }

    pub fn string(out: &'a mut String) -> Self {
        UnpackSlot {
            target_type: "String",
            assign: Box::new(move |v| match v.get_string() {
                Some(s) => {
                    *out = s.to_string();
                    true
                }
                None => false,
            }),
        }
    }

    pub fn list(out: &'a mut List) -> Self {
        UnpackSlot {
            target_type: "List",
            assign: Box::new(move |v| match v.get_list() {
                Some(l) => {
                    *out = l.clone();
                    true
                }
                None => false,
            }),
        }
    }

    pub fn map(out: &'a mut super::Map) -> Self {
        UnpackSlot {
            target_type: "Map",
            assign: Box::new(move |v| match v.get_map() {
                Some(m) => {
                    *out = m.clone();
                    true
                }
                None => false,
            }),
        }
    }
}

/// Builds the `unpack` argument list from typed targets.
///
/// ```ignore
/// let (mut b, mut i, mut f) = (false, 0i64, 0.0f64);
/// let (ok, err) = unpack!(list => bool(&mut b), int(&mut i), float(&mut f));
/// ```
#[macro_export]
macro_rules! unpack {
    ($list:expr => $( $kind:ident ( $target:expr ) ),+ $(,)? ) => {{
        let mut slots: Vec<$crate::value::list::UnpackSlot> =
            vec![ $( $crate::value::list::UnpackSlot::$kind($target) ),+ ];
        $list.unpack(&mut slots)
    }};
}
