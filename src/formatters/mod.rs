//! Synthetic children providers for ordered associative containers
//!
//! A provider turns an opaque container value into a size, an ordered list
//! of children, and a summary string. The pieces, leaves first:
//!
//! - [`layout`]: recognizes which red-black tree layout a map type uses
//! - [`walker`]: in-order traversal over the nodes of a recognized tree
//! - [`map`]: the map provider; lazy, index-cached access to the pairs
//! - [`iterator`]: shows the pair a map iterator points at
//!
//! Providers never write to the debuggee. All of their state is a cache that
//! the owning session clears through [`SyntheticChildrenProvider::on_process_resume`]
//! and [`SyntheticChildrenProvider::on_frame_change`].

pub mod iterator;
pub mod layout;
pub mod map;
pub mod walker;

pub use iterator::{IteratorLayout, MapIteratorProvider};
pub use layout::{recognize, ElementLayout, HeaderLocation, LayoutDescriptor, NodeLinks, TreeVariant};
pub use map::{MapChild, MapSyntheticProvider};
pub use walker::{NodeRef, TreeWalker};

use crate::config::FormatterConfig;
use crate::memory::{Address, MemoryAccessor, MemoryError};
use crate::types::{TypeRef, TypeRegistry};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Errors surfaced by providers
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FormatterError {
    #[error("no such child: index {index} (size {size})")]
    OutOfRange { index: usize, size: usize },

    #[error(transparent)]
    Memory(#[from] MemoryError),

    #[error("corrupt tree at 0x{address:x}: {reason}")]
    Corrupted { address: Address, reason: String },

    #[error("traversal interrupted")]
    Interrupted,
}

/// Cancellation flag for long traversals.
///
/// Clones share the flag, so a UI or signal handler can hold one while the
/// provider holds another.
#[derive(Debug, Clone, Default)]
pub struct Interrupt(Arc<AtomicBool>);

impl Interrupt {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn clear(&self) {
        self.0.store(false, Ordering::SeqCst);
    }

    pub fn is_requested(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// A typed location in the debuggee
#[derive(Debug, Clone, PartialEq)]
pub struct ValueRef {
    pub address: Address,
    pub ty: TypeRef,
}

impl ValueRef {
    pub fn new(address: Address, ty: &TypeRef) -> Self {
        ValueRef {
            address,
            ty: ty.clone(),
        }
    }
}

/// A variable as handed to a provider: name, static type, base address
#[derive(Debug, Clone, PartialEq)]
pub struct ContainerHandle {
    pub name: String,
    pub address: Address,
    pub ty: TypeRef,
}

impl ContainerHandle {
    pub fn new(name: impl Into<String>, address: Address, ty: &TypeRef) -> Self {
        ContainerHandle {
            name: name.into(),
            address,
            ty: ty.clone(),
        }
    }
}

/// One computed child of a synthetic value
#[derive(Debug, Clone, PartialEq)]
pub struct SyntheticChild {
    pub name: String,
    pub value: ValueRef,
}

/// The interface the session and renderer use for every formatter
pub trait SyntheticChildrenProvider {
    /// Number of children, as best known for the current stop
    fn num_children(&mut self, mem: &dyn MemoryAccessor) -> usize;

    fn child_at(
        &mut self,
        mem: &dyn MemoryAccessor,
        index: usize,
    ) -> Result<SyntheticChild, FormatterError>;

    /// Cheap check used to decide whether to offer an expand affordance
    fn might_have_children(&mut self, mem: &dyn MemoryAccessor) -> bool;

    fn summary(&mut self, mem: &dyn MemoryAccessor) -> Option<String>;

    /// Whether the value is shown as a container (`size=0 {}` when empty)
    fn is_container(&self) -> bool {
        false
    }

    /// The failure latched during this stop, if any
    fn last_error(&self) -> Option<&FormatterError> {
        None
    }

    /// Drop everything derived from debuggee memory
    fn invalidate(&mut self);

    fn on_process_resume(&mut self) {
        self.invalidate();
    }

    fn on_frame_change(&mut self) {
        self.invalidate();
    }
}

/// Formatters bound by type name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatterKind {
    OrderedMap,
    MapIterator,
}

const MAP_ITERATOR_NAMES: &[&str] = &[
    "__map_iterator",
    "__map_const_iterator",
    "_Rb_tree_iterator",
    "_Rb_tree_const_iterator",
    "_Tree_iterator",
    "_Tree_const_iterator",
];

/// Pick the formatter for a type name.
///
/// Binding is by name only; whether the layout is actually supported is
/// decided structurally by the provider, so a map type of unknown shape
/// still gets the map formatter and reports zero children.
pub fn classify(type_name: &str) -> Option<FormatterKind> {
    let base = type_name
        .trim_start_matches("const ")
        .split('<')
        .next()
        .unwrap_or_default()
        .trim();

    if !base.starts_with("std::") {
        return None;
    }
    if base.ends_with("::map") || base.ends_with("::multimap") {
        return Some(FormatterKind::OrderedMap);
    }
    let last = base.rsplit("::").next().unwrap_or_default();
    if MAP_ITERATOR_NAMES.contains(&last) {
        return Some(FormatterKind::MapIterator);
    }
    None
}

/// Create the provider bound to `handle`'s type, if any
pub fn provider_for(
    registry: &TypeRegistry,
    handle: ContainerHandle,
    config: FormatterConfig,
    interrupt: &Interrupt,
) -> Option<Box<dyn SyntheticChildrenProvider>> {
    match classify(&handle.ty.name)? {
        FormatterKind::OrderedMap => Some(Box::new(MapSyntheticProvider::new(
            registry,
            handle,
            config,
            interrupt.clone(),
        ))),
        FormatterKind::MapIterator => Some(Box::new(MapIteratorProvider::new(registry, handle))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_maps_across_libraries() {
        for name in [
            "std::map<int, int, std::less<int>, std::allocator<std::pair<const int, int> > >",
            "std::__1::map<int, int, std::__1::less<int>, std::__1::allocator<std::__1::pair<const int, int> > >",
            "std::map<int,int,std::less<int>,std::allocator<std::pair<int const ,int> > >",
            "std::__debug::map<int, int, std::less<int>, std::allocator<std::pair<const int, int> > >",
            "const std::multimap<int, int>",
        ] {
            assert_eq!(classify(name), Some(FormatterKind::OrderedMap), "{}", name);
        }
    }

    #[test]
    fn test_classify_iterators() {
        assert_eq!(
            classify("std::_Rb_tree_iterator<std::pair<const int, int> >"),
            Some(FormatterKind::MapIterator)
        );
        assert_eq!(
            classify("std::__1::__map_const_iterator<std::__1::__tree_const_iterator<int> >"),
            Some(FormatterKind::MapIterator)
        );
        assert_eq!(
            classify("std::_Tree_iterator<std::_Tree_val<int> >"),
            Some(FormatterKind::MapIterator)
        );
        assert_eq!(
            classify("__gnu_debug::_Safe_iterator<std::_Rb_tree_iterator<int> >"),
            None
        );
    }

    #[test]
    fn test_classify_rejects_other_types() {
        assert_eq!(classify("int"), None);
        assert_eq!(classify("std::vector<int>"), None);
        assert_eq!(classify("std::unordered_map<int, int>"), None);
        assert_eq!(classify("mylib::map<int, int>"), None);
    }

    #[test]
    fn test_interrupt_is_shared_between_clones() {
        let interrupt = Interrupt::new();
        let handle = interrupt.clone();
        assert!(!interrupt.is_requested());
        handle.request();
        assert!(interrupt.is_requested());
        interrupt.clear();
        assert!(!handle.is_requested());
    }
}
