//! Structural Mapper
//!
//! Applies an element-wise operation over N "parallel" [`Structure`]s and
//! rebuilds a result of the same shape.
//!
//! # Algorithm
//!
//! A [`CompositeMapper`] holds a chain of [`SubMapper`]s tried in order. The
//! first one whose [`SubMapper::maps`] accepts all objects handles the call,
//! recursing into children through the composite itself. When nothing
//! matches, the objects are handed to the terminal leaf operation as-is.
//!
//! - **Maps** are zipped by the *intersection* of their keys. Keys missing
//!   from any object are dropped silently; the result keeps the key order of
//!   the first object.
//! - **Lists** and **tuples** are zipped positionally, truncated to the
//!   shortest input. A list never matches a tuple.
//! - Anything else, including mixed shapes, goes to the leaf operation.
//!
//! # Example
//!
//! ```rust
//! use controllables_core::mapper::{zip_with, Structure};
//!
//! let a = Structure::map([("a", Structure::leaf(1)), ("b", Structure::leaf(2))]);
//! let b = Structure::map([("a", Structure::leaf(10))]);
//!
//! let sum = zip_with(&[&a, &b], |xs: &[&i32]| Ok(xs.iter().copied().sum::<i32>())).unwrap();
//! assert_eq!(sum, Structure::map([("a", Structure::leaf(11))]));
//! ```

mod mappers;
mod structure;

pub use mappers::{
    zip_with, CollectionMapper, CompositeMapper, MappingMapper, SequenceKind, SequenceMapper,
    SubMapper,
};
pub use structure::Structure;
