//! Nested container shapes.
//!
//! [`Structure`] is the value model walked by the structural mapper: a tree of
//! string-keyed maps, tuples and lists whose leaves carry `T`.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// A nested dict/tuple/list tree with leaves of type `T`.
///
/// Serialized untagged: maps as objects, lists and tuples as arrays, leaves
/// as themselves. Arrays deserialize as [`Structure::List`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Structure<T> {
    Map(IndexMap<String, Structure<T>>),
    List(Vec<Structure<T>>),
    Tuple(Vec<Structure<T>>),
    Leaf(T),
}

impl<T> Structure<T> {
    pub fn leaf(value: T) -> Self {
        Structure::Leaf(value)
    }

    /// Build a map from `(key, child)` pairs, keeping their order.
    pub fn map<K, I>(entries: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Structure<T>)>,
    {
        Structure::Map(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    pub fn list<I: IntoIterator<Item = Structure<T>>>(items: I) -> Self {
        Structure::List(items.into_iter().collect())
    }

    pub fn tuple<I: IntoIterator<Item = Structure<T>>>(items: I) -> Self {
        Structure::Tuple(items.into_iter().collect())
    }

    /// Short name of the outermost shape, used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Structure::Map(_) => "map",
            Structure::List(_) => "list",
            Structure::Tuple(_) => "tuple",
            Structure::Leaf(_) => "leaf",
        }
    }

    pub fn as_leaf(&self) -> Option<&T> {
        match self {
            Structure::Leaf(value) => Some(value),
            _ => None,
        }
    }

    pub fn into_leaf(self) -> Option<T> {
        match self {
            Structure::Leaf(value) => Some(value),
            _ => None,
        }
    }

    /// Child of a map by key.
    pub fn get(&self, key: &str) -> Option<&Structure<T>> {
        match self {
            Structure::Map(entries) => entries.get(key),
            _ => None,
        }
    }

    /// Child of a list or tuple by position.
    pub fn at(&self, index: usize) -> Option<&Structure<T>> {
        match self {
            Structure::List(items) | Structure::Tuple(items) => items.get(index),
            _ => None,
        }
    }

    /// Same shape, every leaf transformed by `f`.
    pub fn map_leaves<U, F>(self, mut f: F) -> Structure<U>
    where
        F: FnMut(T) -> U,
    {
        self.map_leaves_inner(&mut f)
    }

    fn map_leaves_inner<U, F>(self, f: &mut F) -> Structure<U>
    where
        F: FnMut(T) -> U,
    {
        match self {
            Structure::Map(entries) => Structure::Map(
                entries
                    .into_iter()
                    .map(|(k, v)| (k, v.map_leaves_inner(f)))
                    .collect(),
            ),
            Structure::List(items) => {
                Structure::List(items.into_iter().map(|v| v.map_leaves_inner(f)).collect())
            }
            Structure::Tuple(items) => {
                Structure::Tuple(items.into_iter().map(|v| v.map_leaves_inner(f)).collect())
            }
            Structure::Leaf(value) => Structure::Leaf(f(value)),
        }
    }

    /// Leaves in depth-first order.
    pub fn leaves(&self) -> Vec<&T> {
        let mut out = Vec::new();
        self.collect_leaves(&mut out);
        out
    }

    fn collect_leaves<'a>(&'a self, out: &mut Vec<&'a T>) {
        match self {
            Structure::Map(entries) => entries.values().for_each(|v| v.collect_leaves(out)),
            Structure::List(items) | Structure::Tuple(items) => {
                items.iter().for_each(|v| v.collect_leaves(out))
            }
            Structure::Leaf(value) => out.push(value),
        }
    }
}

impl<T> From<T> for Structure<T> {
    fn from(value: T) -> Self {
        Structure::Leaf(value)
    }
}
