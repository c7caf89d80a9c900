//! libstdc++ `std::map` (`_Rb_tree`)
//!
//! The header node is embedded in `_M_impl`. An empty tree has a null
//! `_M_parent` and `_M_left`/`_M_right` pointing back at the header; the
//! root's parent is the header.

use super::{LinkedTree, MapTypes};
use crate::formatters::layout::libstdcxx_node_name;
use crate::memory::{align_up, Address, MemoryError, ProcessImage};
use crate::types::{StructBuilder, TypeDescriptor, TypeRef, TypeRegistry};

// _Rb_tree_node_base
const COLOR: u64 = 0;
const PARENT: u64 = 8;
const LEFT: u64 = 16;
const RIGHT: u64 = 24;
const NODE_BASE_SIZE: u64 = 32;

// _Rb_tree_impl
const KEY_COMPARE: u64 = 0;
const HEADER: u64 = 8;
const NODE_COUNT: u64 = 40;
const IMPL_SIZE: u64 = 48;

const RED: u32 = 0;
const BLACK: u32 = 1;

/// `_Safe_sequence_base` ahead of the release-mode map in debug mode
const SAFE_CONTAINER_SIZE: u64 = 24;

const NODE_BASE: &str = "std::_Rb_tree_node_base";

pub(super) fn define(
    registry: &mut TypeRegistry,
    key: &TypeRef,
    mapped: &TypeRef,
    debug: bool,
) -> MapTypes {
    let (k, v) = (&key.name, &mapped.name);

    let pair = registry.insert(
        StructBuilder::new(format!("std::pair<const {}, {}>", k, v))
            .field("first", key)
            .field("second", mapped)
            .template_arg(key)
            .template_arg(mapped)
            .build(),
    );
    let color = TypeDescriptor::int("std::_Rb_tree_color", 4, false);
    let link = TypeDescriptor::pointer(NODE_BASE);
    let base = registry.insert(
        StructBuilder::new(NODE_BASE)
            .field_at("_M_color", COLOR, &color)
            .field_at("_M_parent", PARENT, &link)
            .field_at("_M_left", LEFT, &link)
            .field_at("_M_right", RIGHT, &link)
            .size(NODE_BASE_SIZE)
            .build(),
    );

    let value_offset = align_up(NODE_BASE_SIZE, pair.align);
    let node = registry.insert(
        StructBuilder::new(libstdcxx_node_name(&pair))
            .field_at(NODE_BASE, 0, &base)
            .field_at("_M_storage", value_offset, &pair)
            .template_arg(&pair)
            .build(),
    );

    let less = StructBuilder::new(format!("std::less<{}>", k)).size(1).build();
    let allocator = format!("std::allocator<{} >", pair.name);
    let tree_name = format!(
        "std::_Rb_tree<{k}, {p}, std::_Select1st<{p} >, std::less<{k}>, {a} >",
        k = k,
        p = pair.name,
        a = allocator
    );
    let tree_impl = StructBuilder::new(format!("{}::_Rb_tree_impl<std::less<{}>, true>", tree_name, k))
        .field_at("_M_key_compare", KEY_COMPARE, &less)
        .field_at("_M_header", HEADER, &base)
        .field_at("_M_node_count", NODE_COUNT, &TypeDescriptor::int("size_t", 8, false))
        .size(IMPL_SIZE)
        .build();
    let tree = StructBuilder::new(tree_name)
        .field("_M_impl", &tree_impl)
        .template_arg(key)
        .template_arg(&pair)
        .build();

    let map_name =
        |ns: &str| format!("{}::map<{}, {}, std::less<{}>, {} >", ns, k, v, k, allocator);
    let release_map = registry.insert(
        StructBuilder::new(map_name(if debug { "std::__cxx1998" } else { "std" }))
            .field("_M_t", &tree)
            .template_arg(key)
            .template_arg(mapped)
            .build(),
    );

    let iterator_named = |name: &str| {
        StructBuilder::new(format!("std::{}<{} >", name, pair.name))
            .field("_M_node", &link)
            .template_arg(&pair)
            .build()
    };
    let iterator = registry.insert(iterator_named("_Rb_tree_iterator"));
    let const_iterator = registry.insert(iterator_named("_Rb_tree_const_iterator"));

    let first = pair.offset_of("first").unwrap_or(0);
    let second = pair.offset_of("second").unwrap_or(0);
    let types = MapTypes {
        map: release_map.clone(),
        iterator,
        const_iterator,
        key: key.clone(),
        mapped: mapped.clone(),
        node_size: node.size,
        node_align: node.align,
        key_offset: value_offset + first,
        mapped_offset: value_offset + second,
        body_offset: 0,
    };
    if !debug {
        return types;
    }

    let debug_name = map_name("std::__debug");
    let safe_base = TypeDescriptor::pointer("__gnu_debug::_Safe_iterator_base");
    let safe_sequence = StructBuilder::new("__gnu_debug::_Safe_sequence_base")
        .field("_M_iterators", &safe_base)
        .field("_M_const_iterators", &safe_base)
        .field("_M_version", &TypeDescriptor::int("unsigned int", 4, false))
        .size(SAFE_CONTAINER_SIZE)
        .build();
    let map = registry.insert(
        StructBuilder::new(debug_name.clone())
            .field_at("__gnu_debug::_Safe_sequence_base", 0, &safe_sequence)
            .field_at(&release_map.name, SAFE_CONTAINER_SIZE, &release_map)
            .template_arg(key)
            .template_arg(mapped)
            .build(),
    );

    let iterator_base = registry.insert(
        StructBuilder::new("__gnu_debug::_Safe_iterator_base")
            .field("_M_sequence", &TypeDescriptor::pointer("__gnu_debug::_Safe_sequence_base"))
            .field("_M_version", &TypeDescriptor::int("unsigned int", 4, false))
            .field("_M_prior", &safe_base)
            .field("_M_next", &safe_base)
            .build(),
    );
    let safe_iterator = |inner: &TypeRef| {
        StructBuilder::new(format!(
            "__gnu_debug::_Safe_iterator<{}, {}, std::bidirectional_iterator_tag>",
            inner.name, debug_name
        ))
        .field(&inner.name, inner)
        .field("__gnu_debug::_Safe_iterator_base", &iterator_base)
        .template_arg(inner)
        .build()
    };
    let iterator = registry.insert(safe_iterator(&types.iterator));
    let const_iterator = registry.insert(safe_iterator(&types.const_iterator));

    MapTypes {
        map,
        iterator,
        const_iterator,
        body_offset: SAFE_CONTAINER_SIZE,
        ..types
    }
}

/// Address of the header node of the map at `map`
pub(super) fn header(map: Address, types: &MapTypes) -> Address {
    map + types.body_offset + HEADER
}

pub(super) fn write_tree(
    image: &mut ProcessImage,
    map: Address,
    types: &MapTypes,
    header: Address,
    tree: &LinkedTree,
) -> Result<(), MemoryError> {
    image.write_u32(header + COLOR, RED)?;
    image.write_pointer(header + PARENT, tree.root.unwrap_or(0))?;
    image.write_pointer(header + LEFT, tree.leftmost.unwrap_or(header))?;
    image.write_pointer(header + RIGHT, tree.rightmost.unwrap_or(header))?;
    image.write_u64(map + types.body_offset + NODE_COUNT, tree.len() as u64)?;

    for node in &tree.nodes {
        image.write_u32(node.address + COLOR, if node.red { RED } else { BLACK })?;
        image.write_pointer(node.address + PARENT, node.parent.unwrap_or(header))?;
        image.write_pointer(node.address + LEFT, node.left.unwrap_or(0))?;
        image.write_pointer(node.address + RIGHT, node.right.unwrap_or(0))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::debuggee::stdlib::{TargetMap, ValueKind};
    use crate::debuggee::StdLib;
    use crate::memory::{MemoryAccessor, ProcessImage};
    use crate::types::TypeRegistry;

    #[test]
    fn test_empty_header_points_at_itself() {
        let mut image = ProcessImage::default();
        let mut registry = TypeRegistry::new();
        let map = TargetMap::create(
            &mut image,
            &mut registry,
            StdLib::LibStdCxx,
            ValueKind::Int,
            ValueKind::Int,
        )
        .unwrap();
        let header = map.sentinel();

        assert_eq!(header, map.address + 8);
        assert_eq!(image.read_pointer(header + 8).unwrap(), 0);
        assert_eq!(image.read_pointer(header + 16).unwrap(), header);
        assert_eq!(image.read_pointer(header + 24).unwrap(), header);
        assert_eq!(image.read_u64(map.address + 40).unwrap(), 0);
    }

    #[test]
    fn test_debug_map_wraps_release_map() {
        let mut registry = TypeRegistry::new();
        let types = super::super::define_map(
            &mut registry,
            StdLib::LibStdCxxDebug,
            ValueKind::Int,
            ValueKind::Int,
        );
        assert!(types.map.name.starts_with("std::__debug::map<int, int"));
        assert!(types.map.field("_M_t").is_none());
        assert_eq!(types.body_offset, 24);
        assert_eq!(types.map.size, 72);
        assert!(types.iterator.name.starts_with("__gnu_debug::_Safe_iterator<"));
    }
}
