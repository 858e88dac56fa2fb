//! Type-specific sub-mappers and their composition.

use indexmap::IndexMap;

use super::Structure;
use crate::error::{MapError, Result};

/// Recursion entry point handed to sub-mappers for mapping children.
pub type Recurse<'a, T, U> = &'a dyn Fn(&[&Structure<T>]) -> Result<Structure<U>>;

/// One container kind the mapper knows how to open.
pub trait SubMapper<T, U>: Send + Sync {
    /// Whether every object is a container this mapper handles.
    fn maps(&self, objs: &[&Structure<T>]) -> bool;

    /// Zip the children of `objs` and map each group through `next`.
    fn apply(&self, objs: &[&Structure<T>], next: Recurse<'_, T, U>) -> Result<Structure<U>>;
}

/// Zips maps by key intersection.
#[derive(Debug, Clone, Copy, Default)]
pub struct MappingMapper;

impl<T, U> SubMapper<T, U> for MappingMapper {
    fn maps(&self, objs: &[&Structure<T>]) -> bool {
        !objs.is_empty() && objs.iter().all(|o| matches!(o, Structure::Map(_)))
    }

    fn apply(&self, objs: &[&Structure<T>], next: Recurse<'_, T, U>) -> Result<Structure<U>> {
        let maps: Vec<&IndexMap<String, Structure<T>>> = objs
            .iter()
            .filter_map(|o| match o {
                Structure::Map(entries) => Some(entries),
                _ => None,
            })
            .collect();
        let (first, rest) = maps.split_first().ok_or(MapError::Empty)?;

        let mut out = IndexMap::new();
        for (key, head) in first.iter() {
            let mut group = Vec::with_capacity(maps.len());
            group.push(head);
            for other in rest {
                match other.get(key) {
                    Some(child) => group.push(child),
                    None => break,
                }
            }
            if group.len() == maps.len() {
                out.insert(key.clone(), next(&group)?);
            }
        }
        Ok(Structure::Map(out))
    }
}

/// Which ordered sequence a [`SequenceMapper`] handles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequenceKind {
    List,
    Tuple,
}

/// Zips lists (or tuples) positionally, truncating to the shortest.
#[derive(Debug, Clone, Copy)]
pub struct SequenceMapper {
    kind: SequenceKind,
}

impl SequenceMapper {
    pub fn new(kind: SequenceKind) -> Self {
        Self { kind }
    }

    fn items<'a, T>(&self, obj: &'a Structure<T>) -> Option<&'a [Structure<T>]> {
        match (self.kind, obj) {
            (SequenceKind::List, Structure::List(items)) => Some(items.as_slice()),
            (SequenceKind::Tuple, Structure::Tuple(items)) => Some(items.as_slice()),
            _ => None,
        }
    }
}

impl<T, U> SubMapper<T, U> for SequenceMapper {
    fn maps(&self, objs: &[&Structure<T>]) -> bool {
        !objs.is_empty() && objs.iter().all(|o| self.items(o).is_some())
    }

    fn apply(&self, objs: &[&Structure<T>], next: Recurse<'_, T, U>) -> Result<Structure<U>> {
        let seqs: Vec<&[Structure<T>]> = objs.iter().filter_map(|o| self.items(o)).collect();
        let len = seqs.iter().map(|s| s.len()).min().ok_or(MapError::Empty)?;

        let mut out = Vec::with_capacity(len);
        for index in 0..len {
            let group: Vec<&Structure<T>> = seqs.iter().map(|s| &s[index]).collect();
            out.push(next(&group)?);
        }
        Ok(match self.kind {
            SequenceKind::List => Structure::List(out),
            SequenceKind::Tuple => Structure::Tuple(out),
        })
    }
}

/// A chain of sub-mappers terminated by a leaf operation.
pub struct CompositeMapper<T, U, F> {
    mappers: Vec<Box<dyn SubMapper<T, U>>>,
    leaf: F,
}

impl<T, U, F> CompositeMapper<T, U, F>
where
    F: Fn(&[&Structure<T>]) -> Result<Structure<U>>,
{
    /// A mapper with no sub-mappers: every call goes straight to `leaf`.
    pub fn new(leaf: F) -> Self {
        Self {
            mappers: Vec::new(),
            leaf,
        }
    }

    /// Append a sub-mapper; earlier ones take precedence.
    pub fn with<M>(mut self, mapper: M) -> Self
    where
        M: SubMapper<T, U> + 'static,
    {
        self.mappers.push(Box::new(mapper));
        self
    }

    pub fn maps(&self, objs: &[&Structure<T>]) -> bool {
        self.mappers.iter().any(|m| m.maps(objs))
    }

    /// Map `objs` recursively.
    pub fn call(&self, objs: &[&Structure<T>]) -> Result<Structure<U>> {
        if objs.is_empty() {
            return Err(MapError::Empty.into());
        }
        for mapper in &self.mappers {
            if mapper.maps(objs) {
                return mapper.apply(objs, &|children: &[&Structure<T>]| self.call(children));
            }
        }
        (self.leaf)(objs)
    }
}

/// Composite mapper for the builtin shapes: maps, lists and tuples.
pub struct CollectionMapper;

impl CollectionMapper {
    /// Build the standard chain around a raw leaf operation.
    ///
    /// `leaf` receives whatever the containers could not open, which includes
    /// groups of mismatched shapes.
    pub fn new<T, U, F>(leaf: F) -> CompositeMapper<T, U, F>
    where
        F: Fn(&[&Structure<T>]) -> Result<Structure<U>>,
    {
        CompositeMapper::new(leaf)
            .with(MappingMapper)
            .with(SequenceMapper::new(SequenceKind::List))
            .with(SequenceMapper::new(SequenceKind::Tuple))
    }
}

/// Map a group of parallel structures whose leaves line up.
///
/// `f` is called with one leaf per input; a group that mixes a leaf with a
/// container fails with [`MapError::ShapeMismatch`].
pub fn zip_with<T, U, F>(objs: &[&Structure<T>], f: F) -> Result<Structure<U>>
where
    F: Fn(&[&T]) -> Result<U>,
{
    let mapper = CollectionMapper::new(|group: &[&Structure<T>]| -> Result<Structure<U>> {
        let leaves: Option<Vec<&T>> = group.iter().map(|o| o.as_leaf()).collect();
        match leaves {
            Some(leaves) => Ok(Structure::Leaf(f(&leaves)?)),
            None => Err(MapError::ShapeMismatch(group.iter().map(|o| o.kind()).collect()).into()),
        }
    });
    mapper.call(objs)
}
