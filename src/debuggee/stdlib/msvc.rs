//! MSVC STL `std::map` (`std::_Tree`)
//!
//! The head node is allocated on the heap when the map is constructed and is
//! flagged with `_Isnil`. It doubles as every missing link: leaves point at
//! it, the root's parent is it, and an empty map's head points at itself.

use super::{LinkedTree, MapTypes};
use crate::memory::{align_up, Address, MemoryError, ProcessImage, Region};
use crate::types::{StructBuilder, TypeDescriptor, TypeRef, TypeRegistry};

// _Tree_node
const LEFT: u64 = 0;
const PARENT: u64 = 8;
const RIGHT: u64 = 16;
const COLOR: u64 = 24;
const ISNIL: u64 = 25;

// _Tree_val
const MYHEAD: u64 = 0;
const MYSIZE: u64 = 8;

const RED: u8 = 0;
const BLACK: u8 = 1;

pub(super) fn define(registry: &mut TypeRegistry, key: &TypeRef, mapped: &TypeRef) -> MapTypes {
    let (k, v) = (&key.name, &mapped.name);

    let pair = registry.insert(
        StructBuilder::new(format!("std::pair<{} const ,{}>", k, v))
            .field("first", key)
            .field("second", mapped)
            .template_arg(key)
            .template_arg(mapped)
            .build(),
    );

    let node_name = format!("std::_Tree_node<{},void *>", pair.name);
    let link = TypeDescriptor::pointer(&node_name);
    let value_offset = align_up(ISNIL + 1, pair.align);
    let node = registry.insert(
        StructBuilder::new(node_name.clone())
            .field_at("_Left", LEFT, &link)
            .field_at("_Parent", PARENT, &link)
            .field_at("_Right", RIGHT, &link)
            .field_at("_Color", COLOR, &TypeDescriptor::char())
            .field_at("_Isnil", ISNIL, &TypeDescriptor::char())
            .field_at("_Myval", value_offset, &pair)
            .template_arg(&pair)
            .build(),
    );

    let tree_val = StructBuilder::new(format!(
        "std::_Tree_val<std::_Tree_simple_types<{} > >",
        pair.name
    ))
    .field_at("_Myhead", MYHEAD, &link)
    .field_at("_Mysize", MYSIZE, &TypeDescriptor::int("unsigned __int64", 8, false))
    .build();
    let inner = StructBuilder::new(format!(
        "std::_Compressed_pair<std::allocator<{} >,{},1>",
        node_name, tree_val.name
    ))
    .field("_Myval2", &tree_val)
    .build();
    let outer = StructBuilder::new(format!(
        "std::_Compressed_pair<std::less<{}>,{},1>",
        k, inner.name
    ))
    .field("_Myval2", &inner)
    .build();
    let map = registry.insert(
        StructBuilder::new(format!(
            "std::map<{},{},std::less<{}>,std::allocator<{} > >",
            k, v, k, pair.name
        ))
        .field("_Mypair", &outer)
        .template_arg(key)
        .template_arg(mapped)
        .build(),
    );

    let iterator_named = |name: &str| {
        StructBuilder::new(format!("std::{}<{} >", name, tree_val.name))
            .field("_Ptr", &link)
            .template_arg(&tree_val)
            .build()
    };
    let iterator = registry.insert(iterator_named("_Tree_iterator"));
    let const_iterator = registry.insert(iterator_named("_Tree_const_iterator"));

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

/// Allocate the head node and store it in the map at `map`
pub(super) fn allocate_head(
    image: &mut ProcessImage,
    types: &MapTypes,
    map: Address,
) -> Result<Address, MemoryError> {
    let head = image.allocate(Region::Heap, types.node_size as usize, types.node_align)?;
    image.write_pointer(map + MYHEAD, head)?;
    Ok(head)
}

pub(super) fn write_tree(
    image: &mut ProcessImage,
    map: Address,
    head: Address,
    tree: &LinkedTree,
) -> Result<(), MemoryError> {
    image.write_pointer(head + LEFT, tree.leftmost.unwrap_or(head))?;
    image.write_pointer(head + PARENT, tree.root.unwrap_or(head))?;
    image.write_pointer(head + RIGHT, tree.rightmost.unwrap_or(head))?;
    image.write_u8(head + COLOR, BLACK)?;
    image.write_u8(head + ISNIL, 1)?;
    image.write_u64(map + MYSIZE, tree.len() as u64)?;

    for node in &tree.nodes {
        image.write_pointer(node.address + LEFT, node.left.unwrap_or(head))?;
        image.write_pointer(node.address + PARENT, node.parent.unwrap_or(head))?;
        image.write_pointer(node.address + RIGHT, node.right.unwrap_or(head))?;
        image.write_u8(node.address + COLOR, if node.red { RED } else { BLACK })?;
        image.write_u8(node.address + ISNIL, 0)?;
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
    fn test_empty_head_is_self_linked() {
        let mut image = ProcessImage::default();
        let mut registry = TypeRegistry::new();
        let map = TargetMap::create(
            &mut image,
            &mut registry,
            StdLib::MsvcStl,
            ValueKind::Int,
            ValueKind::Int,
        )
        .unwrap();
        let head = map.sentinel();

        assert_eq!(image.read_pointer(map.address).unwrap(), head);
        for offset in [0, 8, 16] {
            assert_eq!(image.read_pointer(head + offset).unwrap(), head);
        }
        assert_eq!(image.read_u8(head + 25).unwrap(), 1);
        assert_eq!(image.read_u64(map.address + 8).unwrap(), 0);
    }
}
