//! Caller-supplied parameter sets.

use crate::value::Value;

/// Key of one parameter as the caller supplied it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ParamKey {
    /// Positional key. Only the insertion order matters when binding.
    Position(usize),
    /// Named key, with or without a leading colon.
    Name(String),
}

impl ParamKey {
    pub fn is_named(&self) -> bool {
        matches!(self, ParamKey::Name(_))
    }
}

impl From<usize> for ParamKey {
    fn from(v: usize) -> Self {
        ParamKey::Position(v)
    }
}

impl From<i32> for ParamKey {
    fn from(v: i32) -> Self {
        ParamKey::Position(usize::try_from(v).unwrap_or_default())
    }
}

impl From<&str> for ParamKey {
    fn from(v: &str) -> Self {
        ParamKey::Name(v.to_string())
    }
}

impl From<String> for ParamKey {
    fn from(v: String) -> Self {
        ParamKey::Name(v)
    }
}

/// Placeholder style of a statement: `?` or `:name`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaceholderStyle {
    Positional,
    Named,
}

/// An ordered parameter set.
///
/// Entries keep insertion order. Mixing positional and named keys is allowed while
/// building, and rejected when the set is bound.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Params {
    entries: Vec<(ParamKey, Value)>,
}

impl Params {
    /// Create a new empty parameter set.
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Positional parameters in the given order.
    pub fn positional<V: Into<Value>>(values: impl IntoIterator<Item = V>) -> Self {
        let mut params = Self::new();
        for v in values {
            params.push(v);
        }
        params
    }

    /// Named parameters in the given order.
    pub fn named<K: Into<String>, V: Into<Value>>(pairs: impl IntoIterator<Item = (K, V)>) -> Self {
        let mut params = Self::new();
        for (k, v) in pairs {
            params.insert(ParamKey::Name(k.into()), v);
        }
        params
    }

    /// Append a positional parameter and return its 1-based position.
    pub fn push(&mut self, value: impl Into<Value>) -> usize {
        let index = self.entries.len();
        self.entries.push((ParamKey::Position(index), value.into()));
        self.entries.len()
    }

    /// Append a parameter under an explicit key.
    pub fn insert(&mut self, key: impl Into<ParamKey>, value: impl Into<Value>) {
        self.entries.push((key.into(), value.into()));
    }

    /// Builder form of [`Params::insert`].
    pub fn bind(mut self, key: impl Into<ParamKey>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    /// Get the current parameter count.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the set is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &(ParamKey, Value)> {
        self.entries.iter()
    }

    /// Append another set's entries.
    pub fn extend(&mut self, other: &Params) {
        self.entries.extend(other.entries.iter().cloned());
    }

    /// Named keys present in the set, as supplied.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().filter_map(|(k, _)| match k {
            ParamKey::Name(n) => Some(n.as_str()),
            ParamKey::Position(_) => None,
        })
    }

    /// Uniform style of the set, or `None` when it is empty or mixed.
    pub fn style(&self) -> Option<PlaceholderStyle> {
        let mut iter = self.entries.iter();
        let (first, _) = iter.next()?;
        let named = first.is_named();
        if iter.all(|(k, _)| k.is_named() == named) {
            Some(if named {
                PlaceholderStyle::Named
            } else {
                PlaceholderStyle::Positional
            })
        } else {
            None
        }
    }
}

impl<V: Into<Value>> From<Vec<V>> for Params {
    fn from(values: Vec<V>) -> Self {
        Params::positional(values)
    }
}

impl<K: Into<String>, V: Into<Value>, const N: usize> From<[(K, V); N]> for Params {
    fn from(pairs: [(K, V); N]) -> Self {
        Params::named(pairs)
    }
}

impl FromIterator<(ParamKey, Value)> for Params {
    fn from_iter<I: IntoIterator<Item = (ParamKey, Value)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}
