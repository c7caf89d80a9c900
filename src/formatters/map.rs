//! Synthetic children for `std::map`
//!
//! [`MapSyntheticProvider`] exposes a map as `size=N` plus children `[0]`,
//! `[1]`, ... in key order. Nodes are found lazily: asking for child `i`
//! extends a prefix-complete cache of node references from its last entry,
//! so walking the children in order costs one successor step each.
//!
//! # Failures
//!
//! A read failure or a corrupt link stops the traversal and is latched for
//! the rest of the stop. It is returned to the caller once and logged once;
//! afterwards the known prefix is the whole map and queries past it get
//! [`FormatterError::OutOfRange`] without touching memory again. An
//! interrupted traversal is not latched.

use super::layout::{recognize, LayoutDescriptor};
use super::walker::{NodeRef, TreeWalker};
use super::{
    ContainerHandle, FormatterError, Interrupt, SyntheticChild, SyntheticChildrenProvider,
    ValueRef,
};
use crate::config::FormatterConfig;
use crate::memory::{Address, MemoryAccessor};
use crate::types::TypeRegistry;
use rustc_hash::FxHashSet;
use tracing::{debug, warn};

/// One element of the map, in key order
#[derive(Debug, Clone, PartialEq)]
pub struct MapChild {
    pub index: usize,
    pub node: NodeRef,
    pub pair: ValueRef,
    pub key: ValueRef,
    pub value: ValueRef,
}

pub struct MapSyntheticProvider {
    handle: ContainerHandle,
    layout: Option<LayoutDescriptor>,
    config: FormatterConfig,
    interrupt: Interrupt,
    cache: Vec<NodeRef>,
    visited: FxHashSet<Address>,
    end_reached: bool,
    cached_size: Option<usize>,
    failure: Option<FormatterError>,
}

impl MapSyntheticProvider {
    pub fn new(
        registry: &TypeRegistry,
        handle: ContainerHandle,
        config: FormatterConfig,
        interrupt: Interrupt,
    ) -> Self {
        let layout = recognize(registry, &handle.ty);
        Self::with_layout(handle, layout, config, interrupt)
    }

    /// Bind to an already recognized (or deliberately absent) layout
    pub fn with_layout(
        handle: ContainerHandle,
        layout: Option<LayoutDescriptor>,
        config: FormatterConfig,
        interrupt: Interrupt,
    ) -> Self {
        MapSyntheticProvider {
            handle,
            layout,
            config,
            interrupt,
            cache: Vec::new(),
            visited: FxHashSet::default(),
            end_reached: false,
            cached_size: None,
            failure: None,
        }
    }

    pub fn handle(&self) -> &ContainerHandle {
        &self.handle
    }

    pub fn layout(&self) -> Option<&LayoutDescriptor> {
        self.layout.as_ref()
    }

    pub fn is_recognized(&self) -> bool {
        self.layout.is_some()
    }

    /// Number of nodes currently in the index cache
    pub fn cached_len(&self) -> usize {
        self.cache.len()
    }

    /// Element count: the map's count field, or a full traversal when the
    /// layout has none. Once a failure is latched, the known prefix length.
    pub fn size(&mut self, mem: &dyn MemoryAccessor) -> usize {
        let Some(count_offset) = self.layout.as_ref().map(|layout| layout.count_offset) else {
            return 0;
        };
        if self.failure.is_some() {
            return self.cache.len();
        }
        if let Some(size) = self.cached_size {
            return size;
        }

        let result = match count_offset {
            Some(offset) => mem
                .read_u64(self.handle.address + offset)
                .map(|count| count as usize)
                .map_err(FormatterError::from),
            None => self.extend_to(mem, usize::MAX).map(|()| self.cache.len()),
        };

        match result {
            Ok(size) => {
                self.cached_size = Some(size);
                size
            }
            Err(FormatterError::Interrupted) => self.cache.len(),
            Err(err) => {
                self.latch(err);
                self.cache.len()
            }
        }
    }

    pub fn child_at(
        &mut self,
        mem: &dyn MemoryAccessor,
        index: usize,
    ) -> Result<MapChild, FormatterError> {
        let size = self.size(mem);
        if index >= size {
            return Err(FormatterError::OutOfRange { index, size });
        }

        if index >= self.cache.len() {
            match self.extend_to(mem, index) {
                Ok(()) => {}
                Err(FormatterError::Interrupted) => return Err(FormatterError::Interrupted),
                Err(err) => {
                    self.latch(err.clone());
                    return Err(err);
                }
            }
            if index >= self.cache.len() {
                let err = FormatterError::Corrupted {
                    address: self.handle.address,
                    reason: format!(
                        "node count is {} but traversal ended after {} nodes",
                        size,
                        self.cache.len()
                    ),
                };
                self.latch(err.clone());
                return Err(err);
            }
        }

        self.make_child(index)
    }

    /// Cheap emptiness check: the count field, else a peek at the root
    pub fn might_have_children(&mut self, mem: &dyn MemoryAccessor) -> bool {
        let Some(layout) = &self.layout else {
            return false;
        };
        if !self.cache.is_empty() {
            return true;
        }
        if self.failure.is_some() {
            return false;
        }
        if let Some(size) = self.cached_size {
            return size > 0;
        }
        if let Some(offset) = layout.count_offset {
            if let Ok(count) = mem.read_u64(self.handle.address + offset) {
                return count > 0;
            }
        }
        TreeWalker::new(mem, layout, self.handle.address, self.config.max_tree_height)
            .and_then(|walker| walker.root())
            .map(|root| root.is_some())
            .unwrap_or(false)
    }

    pub fn last_error(&self) -> Option<&FormatterError> {
        self.failure.as_ref()
    }

    pub fn invalidate(&mut self) {
        if !self.cache.is_empty() || self.cached_size.is_some() || self.failure.is_some() {
            debug!(
                container = %self.handle.name,
                cached = self.cache.len(),
                "invalidating map children"
            );
        }
        self.cache.clear();
        self.visited.clear();
        self.end_reached = false;
        self.cached_size = None;
        self.failure = None;
    }

    /// Grow the cache until it holds `index` or the traversal ends
    fn extend_to(&mut self, mem: &dyn MemoryAccessor, index: usize) -> Result<(), FormatterError> {
        let MapSyntheticProvider {
            handle,
            layout,
            config,
            interrupt,
            cache,
            visited,
            end_reached,
            ..
        } = self;
        let Some(layout) = layout.as_ref() else {
            return Ok(());
        };

        let walker = TreeWalker::new(mem, layout, handle.address, config.max_tree_height)?;
        let start = cache.len();
        while cache.len() <= index && !*end_reached {
            if interrupt.is_requested() {
                debug!(container = %handle.name, cached = cache.len(), "traversal interrupted");
                return Err(FormatterError::Interrupted);
            }
            let next = match cache.last() {
                Some(&last) => walker.next_in_order(last)?,
                None => walker.first_in_order()?,
            };
            match next {
                Some(node) => {
                    if !visited.insert(node.address) {
                        return Err(FormatterError::Corrupted {
                            address: node.address,
                            reason: format!("node revisited after {} nodes", cache.len()),
                        });
                    }
                    cache.push(node);
                }
                None => *end_reached = true,
            }
        }

        if cache.len() > start {
            debug!(container = %handle.name, from = start, to = cache.len(), "extended index cache");
        }
        Ok(())
    }

    fn latch(&mut self, err: FormatterError) {
        warn!(
            container = %self.handle.name,
            error = %err,
            known = self.cache.len(),
            "map traversal stopped"
        );
        self.failure = Some(err);
    }

    fn make_child(&self, index: usize) -> Result<MapChild, FormatterError> {
        let (Some(layout), Some(&node)) = (&self.layout, self.cache.get(index)) else {
            return Err(FormatterError::OutOfRange {
                index,
                size: self.cache.len(),
            });
        };
        let element = &layout.element;
        let pair = node.address + element.value_offset;
        Ok(MapChild {
            index,
            node,
            pair: ValueRef::new(pair, &element.pair),
            key: ValueRef::new(pair + element.key_offset, &element.key),
            value: ValueRef::new(pair + element.mapped_offset, &element.mapped),
        })
    }
}

impl SyntheticChildrenProvider for MapSyntheticProvider {
    fn num_children(&mut self, mem: &dyn MemoryAccessor) -> usize {
        self.size(mem)
    }

    fn child_at(
        &mut self,
        mem: &dyn MemoryAccessor,
        index: usize,
    ) -> Result<SyntheticChild, FormatterError> {
        let child = MapSyntheticProvider::child_at(self, mem, index)?;
        Ok(SyntheticChild {
            name: format!("[{}]", index),
            value: child.pair,
        })
    }

    fn might_have_children(&mut self, mem: &dyn MemoryAccessor) -> bool {
        MapSyntheticProvider::might_have_children(self, mem)
    }

    fn summary(&mut self, mem: &dyn MemoryAccessor) -> Option<String> {
        Some(format!("size={}", self.size(mem)))
    }

    fn is_container(&self) -> bool {
        true
    }

    fn last_error(&self) -> Option<&FormatterError> {
        MapSyntheticProvider::last_error(self)
    }

    fn invalidate(&mut self) {
        MapSyntheticProvider::invalidate(self);
    }
}
