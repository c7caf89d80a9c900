//! Standard library emitters
//!
//! Each submodule defines the debug-info types one library uses for
//! `std::map<K, V>` and writes tree state (sentinel, links, colors, count)
//! into a [`ProcessImage`] in that library's layout. [`TargetMap`] keeps the
//! host-side model of a map and re-emits it after every mutation.

pub mod libcxx;
pub mod libstdcxx;
pub mod msvc;

use super::rbtree::RbTree;
use super::{StdLib, TargetValue};
use crate::memory::{Address, MemoryError, ProcessImage, Region};
use crate::types::{TypeDescriptor, TypeRef, TypeRegistry};
use tracing::trace;

/// Key or mapped type of a sample map
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Int,
    String,
}

/// Where to point a freshly written iterator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IterPosition {
    Begin,
    End,
}

/// Types and node geometry of one map instantiation
#[derive(Debug, Clone)]
pub struct MapTypes {
    pub map: TypeRef,
    pub iterator: TypeRef,
    pub const_iterator: TypeRef,
    pub key: TypeRef,
    pub mapped: TypeRef,
    pub node_size: u64,
    pub node_align: u64,
    /// Offsets of the key and mapped value from the start of a node
    pub key_offset: u64,
    pub mapped_offset: u64,
    /// Offset of the library's map object inside the declared type
    pub body_offset: u64,
}

/// A node of the host tree, resolved to target addresses
#[derive(Debug, Clone, Copy)]
pub struct LinkedNode {
    pub address: Address,
    pub left: Option<Address>,
    pub right: Option<Address>,
    pub parent: Option<Address>,
    pub red: bool,
}

#[derive(Debug, Clone, Default)]
pub struct LinkedTree {
    pub root: Option<Address>,
    pub leftmost: Option<Address>,
    pub rightmost: Option<Address>,
    pub nodes: Vec<LinkedNode>,
}

impl LinkedTree {
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// The type a sample key or value has under `library`
pub fn value_type(registry: &mut TypeRegistry, library: StdLib, kind: ValueKind) -> TypeRef {
    let name = match (kind, library) {
        (ValueKind::Int, _) => "int",
        (ValueKind::String, StdLib::LibCxx | StdLib::LibCxxLegacy) => "std::__1::string",
        (ValueKind::String, _) => "std::string",
    };
    if let Some(ty) = registry.lookup(name) {
        return ty.clone();
    }
    let ty = match (kind, library) {
        (ValueKind::Int, _) => TypeDescriptor::int(name, 4, true),
        (ValueKind::String, StdLib::LibCxx | StdLib::LibCxxLegacy) => TypeDescriptor::string(name, 24),
        (ValueKind::String, _) => TypeDescriptor::string(name, 32),
    };
    registry.insert(ty)
}

/// Register every type `std::map<key, mapped>` needs under `library`
pub fn define_map(
    registry: &mut TypeRegistry,
    library: StdLib,
    key: ValueKind,
    mapped: ValueKind,
) -> MapTypes {
    let key = value_type(registry, library, key);
    let mapped = value_type(registry, library, mapped);
    match library {
        StdLib::LibCxx => libcxx::define(registry, &key, &mapped, libcxx::Shape::Current),
        StdLib::LibCxxLegacy => libcxx::define(registry, &key, &mapped, libcxx::Shape::Legacy),
        StdLib::LibStdCxx => libstdcxx::define(registry, &key, &mapped, false),
        StdLib::LibStdCxxDebug => libstdcxx::define(registry, &key, &mapped, true),
        StdLib::MsvcStl => msvc::define(registry, &key, &mapped),
    }
}

/// Store a key or value; strings get a separate heap buffer, returned so it
/// can be freed with the node
pub fn write_value(
    image: &mut ProcessImage,
    address: Address,
    value: &TargetValue,
) -> Result<Option<Address>, MemoryError> {
    match value {
        TargetValue::Int(v) => {
            image.write_i32(address, *v)?;
            Ok(None)
        }
        TargetValue::Str(s) => {
            let buffer = image.allocate(Region::Heap, s.len() + 1, 1)?;
            image.write_bytes(buffer, s.as_bytes())?;
            image.write_pointer(address, buffer)?;
            image.write_u64(address + 8, s.len() as u64)?;
            Ok(Some(buffer))
        }
    }
}

#[derive(Debug, Clone)]
struct Entry {
    key: TargetValue,
    node: Address,
    key_buffer: Option<Address>,
    value_buffer: Option<Address>,
}

/// A `std::map` living in the debuggee's memory
#[derive(Debug, Clone)]
pub struct TargetMap {
    pub library: StdLib,
    pub address: Address,
    pub types: MapTypes,
    sentinel: Address,
    // Insertion order; entry i owns host tree node i
    entries: Vec<Entry>,
    tree: RbTree<TargetValue>,
}

impl TargetMap {
    /// Allocate an empty map on the stack
    pub fn create(
        image: &mut ProcessImage,
        registry: &mut TypeRegistry,
        library: StdLib,
        key: ValueKind,
        mapped: ValueKind,
    ) -> Result<Self, MemoryError> {
        let types = define_map(registry, library, key, mapped);
        let address = image.allocate(Region::Stack, types.map.size as usize, types.map.align)?;
        let sentinel = match library {
            StdLib::LibCxx | StdLib::LibCxxLegacy => libcxx::end_node(address),
            StdLib::LibStdCxx | StdLib::LibStdCxxDebug => libstdcxx::header(address, &types),
            StdLib::MsvcStl => msvc::allocate_head(image, &types, address)?,
        };

        let map = TargetMap {
            library,
            address,
            types,
            sentinel,
            entries: Vec::new(),
            tree: RbTree::new(),
        };
        map.sync(image)?;
        Ok(map)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Address of the sentinel node (the end iterator's target)
    pub fn sentinel(&self) -> Address {
        self.sentinel
    }

    /// Keys in map order
    pub fn keys(&self) -> Vec<TargetValue> {
        self.tree
            .in_order()
            .into_iter()
            .map(|i| self.entries[i].key.clone())
            .collect()
    }

    /// `map[key] = value`
    pub fn insert(
        &mut self,
        image: &mut ProcessImage,
        key: TargetValue,
        value: TargetValue,
    ) -> Result<(), MemoryError> {
        match self.tree.insert(key.clone()) {
            Err(index) => {
                let entry = &mut self.entries[index];
                if let Some(buffer) = entry.value_buffer.take() {
                    image.free(buffer)?;
                }
                entry.value_buffer = write_value(image, entry.node + self.types.mapped_offset, &value)?;
            }
            Ok(_) => {
                let node = image.allocate(
                    Region::Heap,
                    self.types.node_size as usize,
                    self.types.node_align,
                )?;
                let key_buffer = write_value(image, node + self.types.key_offset, &key)?;
                let value_buffer = write_value(image, node + self.types.mapped_offset, &value)?;
                trace!(node, ?key, "allocated map node");
                self.entries.push(Entry {
                    key,
                    node,
                    key_buffer,
                    value_buffer,
                });
            }
        }
        self.sync(image)
    }

    /// Remove `key`; the tree is re-shaped from the remaining keys in
    /// insertion order
    pub fn erase(&mut self, image: &mut ProcessImage, key: &TargetValue) -> Result<bool, MemoryError> {
        let Some(position) = self.entries.iter().position(|e| &e.key == key) else {
            return Ok(false);
        };
        let entry = self.entries.remove(position);
        Self::release(image, &entry)?;

        let mut tree = RbTree::new();
        for entry in &self.entries {
            // Keys are unique, so every insert yields the next index
            let _ = tree.insert(entry.key.clone());
        }
        self.tree = tree;
        self.sync(image)?;
        Ok(true)
    }

    pub fn clear(&mut self, image: &mut ProcessImage) -> Result<(), MemoryError> {
        for entry in self.entries.drain(..) {
            Self::release(image, &entry)?;
        }
        self.tree = RbTree::new();
        self.sync(image)
    }

    /// Point the iterator object at `at` to the first node or the sentinel
    pub fn write_iterator(
        &self,
        image: &mut ProcessImage,
        at: Address,
        position: IterPosition,
    ) -> Result<(), MemoryError> {
        let target = match position {
            IterPosition::Begin => self
                .tree
                .leftmost()
                .map(|i| self.entries[i].node)
                .unwrap_or(self.sentinel),
            IterPosition::End => self.sentinel,
        };
        image.write_pointer(at, target)
    }

    fn release(image: &mut ProcessImage, entry: &Entry) -> Result<(), MemoryError> {
        for buffer in [entry.key_buffer, entry.value_buffer].into_iter().flatten() {
            image.free(buffer)?;
        }
        image.free(entry.node)
    }

    fn linked(&self) -> LinkedTree {
        let address = |index: Option<usize>| index.map(|i| self.entries[i].node);
        LinkedTree {
            root: address(self.tree.root()),
            leftmost: address(self.tree.leftmost()),
            rightmost: address(self.tree.rightmost()),
            nodes: self
                .tree
                .nodes()
                .iter()
                .enumerate()
                .map(|(i, node)| LinkedNode {
                    address: self.entries[i].node,
                    left: address(node.left),
                    right: address(node.right),
                    parent: address(node.parent),
                    red: node.red,
                })
                .collect(),
        }
    }

    fn sync(&self, image: &mut ProcessImage) -> Result<(), MemoryError> {
        let tree = self.linked();
        match self.library {
            StdLib::LibCxx | StdLib::LibCxxLegacy => {
                libcxx::write_tree(image, self.address, self.sentinel, &tree)
            }
            StdLib::LibStdCxx | StdLib::LibStdCxxDebug => {
                libstdcxx::write_tree(image, self.address, &self.types, self.sentinel, &tree)
            }
            StdLib::MsvcStl => msvc::write_tree(image, self.address, self.sentinel, &tree),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryAccessor;

    #[test]
    fn test_string_values_are_stored_out_of_line() {
        let mut image = ProcessImage::default();
        let slot = image.allocate(Region::Stack, 32, 8).unwrap();
        let buffer = write_value(&mut image, slot, &TargetValue::from("goofy"))
            .unwrap()
            .unwrap();

        assert_eq!(image.read_pointer(slot).unwrap(), buffer);
        assert_eq!(image.read_u64(slot + 8).unwrap(), 5);
        assert_eq!(image.read_bytes(buffer, 5).unwrap(), b"goofy");
    }

    #[test]
    fn test_reassigning_a_key_keeps_its_node() {
        let mut image = ProcessImage::default();
        let mut registry = TypeRegistry::new();
        let mut map = TargetMap::create(
            &mut image,
            &mut registry,
            StdLib::LibStdCxx,
            ValueKind::Int,
            ValueKind::String,
        )
        .unwrap();
        map.insert(&mut image, 1.into(), "is".into()).unwrap();
        let node = map.entries[0].node;
        map.insert(&mut image, 1.into(), "was".into()).unwrap();

        assert_eq!(map.len(), 1);
        assert_eq!(map.entries[0].node, node);
        let text = image.read_pointer(node + map.types.mapped_offset).unwrap();
        assert_eq!(image.read_bytes(text, 3).unwrap(), b"was");
    }

    #[test]
    fn test_erase_frees_the_node() {
        let mut image = ProcessImage::default();
        let mut registry = TypeRegistry::new();
        let mut map = TargetMap::create(
            &mut image,
            &mut registry,
            StdLib::MsvcStl,
            ValueKind::Int,
            ValueKind::Int,
        )
        .unwrap();
        for k in [2, 1, 3] {
            map.insert(&mut image, k.into(), k.into()).unwrap();
        }
        let node = map.entries[1].node;

        assert!(map.erase(&mut image, &1.into()).unwrap());
        assert!(!map.erase(&mut image, &1.into()).unwrap());
        assert!(matches!(image.read_u8(node), Err(MemoryError::Freed { .. })));
        assert_eq!(map.keys(), vec![2.into(), 3.into()]);
    }

    #[test]
    fn test_types_are_shared_between_maps() {
        let mut registry = TypeRegistry::new();
        let a = define_map(&mut registry, StdLib::LibCxx, ValueKind::String, ValueKind::Int);
        let b = define_map(&mut registry, StdLib::LibCxx, ValueKind::Int, ValueKind::String);
        assert!(std::rc::Rc::ptr_eq(&a.key, &b.mapped));
        assert_eq!(a.key.name, "std::__1::string");
    }
}
