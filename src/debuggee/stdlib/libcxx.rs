//! libc++ `std::map` (`std::__1::__tree`)
//!
//! The end node lives inside the tree object and holds only `__left_`, the
//! root link. `__begin_node_` caches the leftmost node, or the end node when
//! the tree is empty. Missing children are null.

use super::{LinkedTree, MapTypes};
use crate::formatters::layout::libcxx_node_name;
use crate::memory::{align_up, Address, MemoryError, ProcessImage};
use crate::types::{StructBuilder, TypeDescriptor, TypeRef, TypeRegistry};

// __tree_node_base<void *>
const LEFT: u64 = 0;
const RIGHT: u64 = 8;
const PARENT: u64 = 16;
const IS_BLACK: u64 = 24;

// __tree
const BEGIN_NODE: u64 = 0;
const END_NODE: u64 = 8;
const SIZE: u64 = 16;

const NODE_BASE: &str = "std::__1::__tree_node_base<void *>";
const END_NODE_TYPE: &str = "std::__1::__tree_end_node<std::__1::__tree_node_base<void *> *>";

/// Which member set `__tree` uses for its end node and size
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    /// `__end_node_` and `__size_`
    Current,
    /// `__pair1_` and `__pair3_` compressed pairs
    Legacy,
}

pub(super) fn define(
    registry: &mut TypeRegistry,
    key: &TypeRef,
    mapped: &TypeRef,
    shape: Shape,
) -> MapTypes {
    let (k, v) = (&key.name, &mapped.name);
    let less = format!("std::__1::less<{}>", k);

    let pair = registry.insert(
        StructBuilder::new(format!("std::__1::pair<const {}, {}>", k, v))
            .field("first", key)
            .field("second", mapped)
            .template_arg(key)
            .template_arg(mapped)
            .build(),
    );
    let value_type = registry.insert(
        StructBuilder::new(format!("std::__1::__value_type<{}, {}>", k, v))
            .field("__cc_", &pair)
            .template_arg(key)
            .template_arg(mapped)
            .build(),
    );

    let end_node = registry.insert(
        StructBuilder::new(END_NODE_TYPE)
            .field_at("__left_", LEFT, &TypeDescriptor::pointer(NODE_BASE))
            .build(),
    );
    let base = registry.insert(
        StructBuilder::new(NODE_BASE)
            .field_at("__left_", LEFT, &TypeDescriptor::pointer(NODE_BASE))
            .field_at("__right_", RIGHT, &TypeDescriptor::pointer(NODE_BASE))
            .field_at("__parent_", PARENT, &TypeDescriptor::pointer(END_NODE_TYPE))
            .field_at("__is_black_", IS_BLACK, &TypeDescriptor::bool())
            .build(),
    );

    // The value may sit in the base's tail padding
    let value_offset = align_up(IS_BLACK + 1, value_type.align);
    let node_name = libcxx_node_name(&value_type);
    let node = registry.insert(
        StructBuilder::new(node_name.clone())
            .field_at(NODE_BASE, 0, &base)
            .field_at("__value_", value_offset, &value_type)
            .template_arg(&value_type)
            .build(),
    );

    let compare = format!(
        "std::__1::__map_value_compare<{}, {}, {}, true>",
        k, value_type.name, less
    );
    let size_type = TypeDescriptor::int("unsigned long", 8, false);
    let end_link = TypeDescriptor::pointer(END_NODE_TYPE);
    let tree = StructBuilder::new(format!(
        "std::__1::__tree<{vt}, {c}, std::__1::allocator<{vt} > >",
        vt = value_type.name,
        c = compare
    ))
    .field_at("__begin_node_", BEGIN_NODE, &end_link);
    let tree = match shape {
        Shape::Current => tree
            .field_at("__end_node_", END_NODE, &end_node)
            .field_at("__size_", SIZE, &size_type),
        Shape::Legacy => {
            let pair1 = StructBuilder::new(format!(
                "std::__1::__compressed_pair<{}, std::__1::allocator<{} > >",
                END_NODE_TYPE, node_name
            ))
            .field("__value_", &end_node)
            .build();
            let pair3 = StructBuilder::new(format!(
                "std::__1::__compressed_pair<unsigned long, {} >",
                compare
            ))
            .field("__value_", &size_type)
            .build();
            tree.field_at("__pair1_", END_NODE, &pair1)
                .field_at("__pair3_", SIZE, &pair3)
        }
    }
    .template_arg(&value_type)
    .build();

    let map = registry.insert(
        StructBuilder::new(format!(
            "std::__1::map<{}, {}, {}, std::__1::allocator<{} > >",
            k, v, less, pair.name
        ))
        .field("__tree_", &tree)
        .template_arg(key)
        .template_arg(mapped)
        .build(),
    );

    let iterator_named = |outer: &str, inner: &str| {
        let tree_iterator = StructBuilder::new(format!(
            "std::__1::{}<{}, {} *, long>",
            inner, value_type.name, node_name
        ))
        .field("__ptr_", &end_link)
        .template_arg(&value_type)
        .build();
        StructBuilder::new(format!("std::__1::{}<{} >", outer, tree_iterator.name))
            .field("__i_", &tree_iterator)
            .template_arg(&tree_iterator)
            .build()
    };
    let iterator = registry.insert(iterator_named("__map_iterator", "__tree_iterator"));
    let const_iterator =
        registry.insert(iterator_named("__map_const_iterator", "__tree_const_iterator"));

    let first = pair.offset_of("first").unwrap_or(0);
    let second = pair.offset_of("second").unwrap_or(0);
    MapTypes {
        map,
        iterator,
        const_iterator,
        key: key.clone(),
        mapped: mapped.clone(),
        node_size: node.size,
        node_align: node.align,
        key_offset: value_offset + first,
        mapped_offset: value_offset + second,
        body_offset: 0,
    }
}

/// Address of the end node of the map at `map`
pub(super) fn end_node(map: Address) -> Address {
    map + END_NODE
}

pub(super) fn write_tree(
    image: &mut ProcessImage,
    map: Address,
    end_node: Address,
    tree: &LinkedTree,
) -> Result<(), MemoryError> {
    image.write_pointer(map + BEGIN_NODE, tree.leftmost.unwrap_or(end_node))?;
    image.write_pointer(end_node + LEFT, tree.root.unwrap_or(0))?;
    image.write_u64(map + SIZE, tree.len() as u64)?;

    for node in &tree.nodes {
        image.write_pointer(node.address + LEFT, node.left.unwrap_or(0))?;
        image.write_pointer(node.address + RIGHT, node.right.unwrap_or(0))?;
        image.write_pointer(node.address + PARENT, node.parent.unwrap_or(end_node))?;
        image.write_u8(node.address + IS_BLACK, u8::from(!node.red))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::debuggee::stdlib::{define_map, TargetMap, ValueKind};
    use crate::debuggee::{StdLib, TargetValue};
    use crate::memory::{MemoryAccessor, ProcessImage};
    use crate::types::TypeRegistry;

    #[test]
    fn test_begin_node_tracks_leftmost() {
        let mut image = ProcessImage::default();
        let mut registry = TypeRegistry::new();
        let mut map = TargetMap::create(
            &mut image,
            &mut registry,
            StdLib::LibCxx,
            ValueKind::Int,
            ValueKind::Int,
        )
        .unwrap();
        assert_eq!(image.read_pointer(map.address).unwrap(), map.sentinel());

        for k in [5, 2, 8] {
            map.insert(&mut image, TargetValue::Int(k), TargetValue::Int(k))
                .unwrap();
        }
        let begin = image.read_pointer(map.address).unwrap();
        assert_eq!(image.read_i32(begin + map.types.key_offset).unwrap(), 2);
        assert_eq!(image.read_u64(map.address + 16).unwrap(), 3);
    }

    #[test]
    fn test_string_pairs_are_pointer_aligned() {
        let mut registry = TypeRegistry::new();
        let types = define_map(&mut registry, StdLib::LibCxx, ValueKind::String, ValueKind::Int);
        assert_eq!(types.key_offset, 32);
        assert_eq!(types.mapped_offset, 56);

        let ints = define_map(&mut registry, StdLib::LibCxxLegacy, ValueKind::Int, ValueKind::Int);
        assert_eq!(ints.key_offset, 28);
        assert_eq!(ints.node_size, 40);
    }
}
