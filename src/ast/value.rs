use std::collections::BTreeMap;
use std::ops::RangeInclusive;
use std::{fmt, vec};

/// The runtime values a template works with.
///
/// A host hands values to the renderer through its
/// [`Context`](crate::Context); expressions and filters produce them; and an
/// `Output` node turns the final value into text via
/// [`write_output`](Value::write_output) (or whatever coercion function the
/// [`RenderOptions`](crate::RenderOptions) carry).
///
/// Conversion from common Rust types is provided via `From` impls:
///
/// ```rust
/// use liquid_lang::Value;
///
/// let s: Value = "hello".into();
/// let n: Value = 42i64.into();
/// let b: Value = true.into();
/// let a: Value = vec!["a", "b"].into();
/// ```
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    /// The absence of a value. Falsy, renders as an empty string.
    #[default]
    Nil,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Array(Vec<Value>),
    Object(BTreeMap<String, Value>),
    /// Inclusive integer range produced by `(a..b)`.
    Range(i64, i64),
}

impl Value {
    /// Append the default text form of this value to `out`.
    ///
    /// - `Nil`: nothing
    /// - `Float`: whole numbers keep a trailing `.0`
    /// - `Array`: elements concatenated with no separator
    /// - `Object`: `{"key"=>value}` pairs
    /// - `Range`: `start..end`
    pub fn write_output(&self, out: &mut String) {
        use std::fmt::Write;

        match self {
            Value::Nil => {}
            Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
            Value::Int(n) => {
                let _ = write!(out, "{n}");
            }
            Value::Float(n) => {
                if n.is_finite() && n.fract() == 0.0 {
                    let _ = write!(out, "{n:.1}");
                } else {
                    let _ = write!(out, "{n}");
                }
            }
            Value::String(s) => out.push_str(s),
            Value::Array(items) => {
                for item in items {
                    item.write_output(out);
                }
            }
            Value::Object(map) => {
                out.push('{');
                for (i, (key, value)) in map.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    let _ = write!(out, "{key:?}=>");
                    value.write_inspect(out);
                }
                out.push('}');
            }
            Value::Range(start, end) => {
                let _ = write!(out, "{start}..{end}");
            }
        }
    }

    fn write_inspect(&self, out: &mut String) {
        match self {
            Value::Nil => out.push_str("nil"),
            Value::String(s) => {
                use std::fmt::Write;
                let _ = write!(out, "{s:?}");
            }
            other => other.write_output(out),
        }
    }

    pub fn to_output_string(&self) -> String {
        let mut out = String::new();
        self.write_output(&mut out);
        out
    }

    /// Type name for diagnostic messages
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Nil => "nil",
            Value::Bool(_) => "bool",
            Value::Int(_) => "integer",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
            Value::Range(..) => "range",
        }
    }

    /// Only `nil` and `false` are falsy.
    pub fn is_truthy(&self) -> bool {
        !matches!(self, Value::Nil | Value::Bool(false))
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            // i64::MAX as f64 rounds up to 2^63, which is out of range.
            Value::Float(n) if n.fract() == 0.0 && *n >= i64::MIN as f64 && *n < i64::MAX as f64 => {
                Some(*n as i64)
            }
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Int(n) => Some(*n as f64),
            Value::Float(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Object(map) => Some(map),
            _ => None,
        }
    }

    /// Number of elements for collections and characters for strings.
    ///
    /// Ranges wider than `usize` saturate at `usize::MAX`.
    pub fn size(&self) -> Option<usize> {
        match self {
            Value::String(s) => Some(s.chars().count()),
            Value::Array(a) => Some(a.len()),
            Value::Object(map) => Some(map.len()),
            Value::Range(start, end) => {
                let len = (i128::from(*end) - i128::from(*start) + 1).max(0);
                Some(usize::try_from(len).unwrap_or(usize::MAX))
            }
            _ => None,
        }
    }

    /// Expand a value into the items a looping tag walks over.
    ///
    /// Arrays yield their elements, ranges their integers, objects
    /// `[key, value]` pairs, nil nothing, and any other value itself.
    /// Range integers are produced lazily.
    pub fn into_items(self) -> Items {
        let inner = match self {
            Value::Nil => ItemsInner::Values(Vec::new().into_iter()),
            Value::Array(items) => ItemsInner::Values(items.into_iter()),
            Value::Range(start, end) => ItemsInner::Range(start..=end),
            Value::Object(map) => ItemsInner::Values(
                map.into_iter()
                    .map(|(k, v)| Value::Array(vec![Value::String(k), v]))
                    .collect::<Vec<_>>()
                    .into_iter(),
            ),
            other => ItemsInner::Values(vec![other].into_iter()),
        };
        Items { inner }
    }

    /// Look up a key on this value.
    ///
    /// Objects are indexed by key, arrays by (possibly negative) integer.
    /// When no such key exists, `size`, `first` and `last` act as
    /// commands on collections.
    pub fn lookup(&self, key: &Value) -> Option<Value> {
        match (self, key) {
            (Value::Object(map), Value::String(k)) => {
                if let Some(v) = map.get(k) {
                    return Some(v.clone());
                }
            }
            (Value::Array(items), Value::Int(i)) => return index(items, *i).cloned(),
            (Value::Array(items), Value::Float(_)) => {
                return key.as_int().and_then(|i| index(items, i)).cloned();
            }
            _ => {}
        }

        match key.as_str()? {
            "size" => self
                .size()
                .map(|n| Value::Int(i64::try_from(n).unwrap_or(i64::MAX))),
            "first" => match self {
                Value::Array(items) => items.first().cloned(),
                Value::Range(start, end) if start <= end => Some(Value::Int(*start)),
                _ => None,
            },
            "last" => match self {
                Value::Array(items) => items.last().cloned(),
                Value::Range(start, end) if start <= end => Some(Value::Int(*end)),
                _ => None,
            },
            _ => None,
        }
    }
}

/// Iterator returned by [`Value::into_items`].
#[derive(Debug, Clone)]
pub struct Items {
    inner: ItemsInner,
}

#[derive(Debug, Clone)]
enum ItemsInner {
    Values(vec::IntoIter<Value>),
    Range(RangeInclusive<i64>),
}

impl Items {
    /// True when no items remain.
    pub fn is_empty(&self) -> bool {
        match &self.inner {
            ItemsInner::Values(values) => values.as_slice().is_empty(),
            ItemsInner::Range(range) => range.is_empty(),
        }
    }
}

impl Iterator for Items {
    type Item = Value;

    fn next(&mut self) -> Option<Value> {
        match &mut self.inner {
            ItemsInner::Values(values) => values.next(),
            ItemsInner::Range(range) => range.next().map(Value::Int),
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        match &self.inner {
            ItemsInner::Values(values) => values.size_hint(),
            ItemsInner::Range(range) => range.size_hint(),
        }
    }
}

fn index(items: &[Value], i: i64) -> Option<&Value> {
    let idx = if i < 0 {
        items.len().checked_sub(i.unsigned_abs() as usize)?
    } else {
        i as usize
    };
    items.get(idx)
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_output_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Float(n)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Int(n as i64)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Value::Array(v.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Nil)
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Value {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Value::Object(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}
