//! In-order traversal of a red-black tree in debuggee memory
//!
//! The walker is a cursor over raw memory: it holds no cache and re-reads
//! every link it follows. Links are classified explicitly, so the sentinel is
//! never yielded as data: a link is "nil" if it is null, if it equals the
//! sentinel address, or if the node it names has its nil flag set.

use super::layout::LayoutDescriptor;
use super::FormatterError;
use crate::memory::{Address, MemoryAccessor};

/// A data node of the tree, by address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeRef {
    pub address: Address,
}

pub struct TreeWalker<'a> {
    mem: &'a dyn MemoryAccessor,
    layout: &'a LayoutDescriptor,
    header: Address,
    max_height: usize,
}

impl<'a> TreeWalker<'a> {
    /// Bind to the container at `container`, resolving its sentinel
    pub fn new(
        mem: &'a dyn MemoryAccessor,
        layout: &'a LayoutDescriptor,
        container: Address,
        max_height: usize,
    ) -> Result<Self, FormatterError> {
        let header = layout.header_address(mem, container)?;
        Ok(TreeWalker {
            mem,
            layout,
            header,
            max_height,
        })
    }

    pub fn header(&self) -> Address {
        self.header
    }

    pub fn root(&self) -> Result<Option<NodeRef>, FormatterError> {
        let root = self.link(self.header, self.layout.root_link)?;
        self.data_node(root)
    }

    /// Smallest node, or `None` for an empty tree
    pub fn first_in_order(&self) -> Result<Option<NodeRef>, FormatterError> {
        match self.root()? {
            Some(root) => self.leftmost(root).map(Some),
            None => Ok(None),
        }
    }

    /// In-order successor of `node`, or `None` past the largest node
    pub fn next_in_order(&self, node: NodeRef) -> Result<Option<NodeRef>, FormatterError> {
        let links = &self.layout.links;

        let right = self.link(node.address, links.right)?;
        if let Some(right) = self.data_node(right)? {
            return self.leftmost(right).map(Some);
        }

        // Climb until we arrive from a left subtree
        let mut child = node.address;
        for _ in 0..self.max_height {
            let parent = self.link(child, links.parent)?;
            let Some(parent) = self.data_node(parent)? else {
                return Ok(None);
            };
            if self.link(parent.address, links.right)? != child {
                return Ok(Some(parent));
            }
            child = parent.address;
        }
        Err(self.too_deep(node.address, "parent chain"))
    }

    fn leftmost(&self, node: NodeRef) -> Result<NodeRef, FormatterError> {
        let mut current = node;
        for _ in 0..self.max_height {
            let left = self.link(current.address, self.layout.links.left)?;
            match self.data_node(left)? {
                Some(next) => current = next,
                None => return Ok(current),
            }
        }
        Err(self.too_deep(node.address, "left spine"))
    }

    fn link(&self, node: Address, offset: u64) -> Result<Address, FormatterError> {
        Ok(self.mem.read_pointer(node + offset)?)
    }

    /// Classify a link target: `None` for null, the sentinel, or a nil node
    fn data_node(&self, link: Address) -> Result<Option<NodeRef>, FormatterError> {
        if link == 0 || link == self.header {
            return Ok(None);
        }
        if let Some(flag) = self.layout.links.nil_flag {
            if self.mem.read_u8(link + flag)? != 0 {
                return Ok(None);
            }
        }
        Ok(Some(NodeRef { address: link }))
    }

    fn too_deep(&self, address: Address, what: &str) -> FormatterError {
        FormatterError::Corrupted {
            address,
            reason: format!("{} exceeds {} links", what, self.max_height),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::debuggee::stdlib::{TargetMap, ValueKind};
    use crate::debuggee::{StdLib, TargetValue};
    use crate::formatters::layout::recognize;
    use crate::memory::ProcessImage;
    use crate::types::TypeRegistry;

    fn build(library: StdLib, keys: &[i32]) -> (ProcessImage, TypeRegistry, TargetMap) {
        let mut image = ProcessImage::default();
        let mut registry = TypeRegistry::new();
        let mut map =
            TargetMap::create(&mut image, &mut registry, library, ValueKind::Int, ValueKind::Int)
                .unwrap();
        for &k in keys {
            map.insert(&mut image, TargetValue::Int(k), TargetValue::Int(k * 10))
                .unwrap();
        }
        (image, registry, map)
    }

    fn keys_in_order(image: &ProcessImage, registry: &TypeRegistry, map: &TargetMap) -> Vec<i32> {
        let layout = recognize(registry, &map.types.map).unwrap();
        let walker = TreeWalker::new(image, &layout, map.address, 128).unwrap();
        let mut keys = Vec::new();
        let mut next = walker.first_in_order().unwrap();
        while let Some(node) = next {
            let key = node.address + layout.element.value_offset + layout.element.key_offset;
            keys.push(image.read_i32(key).unwrap());
            next = walker.next_in_order(node).unwrap();
        }
        keys
    }

    #[test]
    fn test_walk_is_sorted_for_every_library() {
        let input = [5, 3, 9, 1, 4, 7, 12, 0, 2, 8];
        for library in [StdLib::LibCxx, StdLib::LibCxxLegacy, StdLib::LibStdCxx, StdLib::MsvcStl] {
            let (image, registry, map) = build(library, &input);
            let mut expected = input.to_vec();
            expected.sort();
            assert_eq!(keys_in_order(&image, &registry, &map), expected, "{:?}", library);
        }
    }

    #[test]
    fn test_empty_tree_has_no_first_node() {
        for library in [StdLib::LibCxx, StdLib::LibStdCxx, StdLib::MsvcStl] {
            let (image, registry, map) = build(library, &[]);
            let layout = recognize(&registry, &map.types.map).unwrap();
            let walker = TreeWalker::new(&image, &layout, map.address, 128).unwrap();
            assert_eq!(walker.root().unwrap(), None);
            assert_eq!(walker.first_in_order().unwrap(), None);
        }
    }

    #[test]
    fn test_cyclic_left_spine_is_reported_as_corrupt() {
        let (mut image, registry, map) = build(StdLib::LibStdCxx, &[2, 1, 3]);
        let layout = recognize(&registry, &map.types.map).unwrap();
        let root = {
            let walker = TreeWalker::new(&image, &layout, map.address, 16).unwrap();
            walker.root().unwrap().unwrap()
        };
        // Point the root's left link back at itself
        image
            .write_pointer(root.address + layout.links.left, root.address)
            .unwrap();

        let walker = TreeWalker::new(&image, &layout, map.address, 16).unwrap();
        assert!(matches!(
            walker.first_in_order(),
            Err(FormatterError::Corrupted { .. })
        ));
    }

    #[test]
    fn test_freed_node_fails_the_read() {
        let (mut image, registry, map) = build(StdLib::MsvcStl, &[1, 2, 3]);
        let layout = recognize(&registry, &map.types.map).unwrap();
        let first = {
            let walker = TreeWalker::new(&image, &layout, map.address, 128).unwrap();
            walker.first_in_order().unwrap().unwrap()
        };
        image.free(first.address).unwrap();

        let walker = TreeWalker::new(&image, &layout, map.address, 128).unwrap();
        assert!(matches!(
            walker.first_in_order(),
            Err(FormatterError::Memory(_))
        ));
    }
}
