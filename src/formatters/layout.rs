//! Layout recognition for red-black tree maps
//!
//! Each supported standard library stores `std::map` differently. The
//! recognizer inspects the container type's member names and nesting (never
//! the full template signature, so allocator and comparator arguments do not
//! matter) and yields a [`LayoutDescriptor`]: the byte offsets and sentinel
//! rules that the [`walker`](super::walker) needs.

use crate::memory::{align_up, Address, MemoryAccessor, MemoryError};
use crate::types::{TypeDescriptor, TypeRef, TypeRegistry};
use tracing::debug;

/// The recognized implementation family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TreeVariant {
    LibCxx,
    LibStdCxx,
    MsvcStl,
}

impl TreeVariant {
    pub fn name(&self) -> &'static str {
        match self {
            TreeVariant::LibCxx => "libc++",
            TreeVariant::LibStdCxx => "libstdc++",
            TreeVariant::MsvcStl => "msvc",
        }
    }
}

/// Where the sentinel node lives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderLocation {
    /// Inside the container object, at this offset
    Embedded { offset: u64 },
    /// On the heap; the container holds a pointer to it at this offset
    Allocated { pointer_offset: u64 },
}

/// Offsets of the link and color members within a node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeLinks {
    pub left: u64,
    pub right: u64,
    pub parent: u64,
    pub color: u64,
    /// Byte flag marking the sentinel node, where the library keeps one
    pub nil_flag: Option<u64>,
}

/// Where the stored pair and its halves sit inside a node
#[derive(Debug, Clone, PartialEq)]
pub struct ElementLayout {
    /// Offset of the pair from the node's start
    pub value_offset: u64,
    pub pair: TypeRef,
    pub key_offset: u64,
    pub key: TypeRef,
    pub mapped_offset: u64,
    pub mapped: TypeRef,
}

impl ElementLayout {
    /// Describe `pair` stored `value_offset` bytes into each node
    pub fn for_pair(value_offset: u64, pair: &TypeRef) -> Option<Self> {
        let first = pair.field("first")?;
        let second = pair.field("second")?;
        Some(ElementLayout {
            value_offset,
            pair: pair.clone(),
            key_offset: first.offset,
            key: first.ty.clone(),
            mapped_offset: second.offset,
            mapped: second.ty.clone(),
        })
    }
}

/// Everything needed to walk one map type's tree
#[derive(Debug, Clone, PartialEq)]
pub struct LayoutDescriptor {
    pub variant: TreeVariant,
    pub header: HeaderLocation,
    /// Offset within the sentinel of the link to the root
    pub root_link: u64,
    /// Offset within the container of the element count, when it has one
    pub count_offset: Option<u64>,
    pub links: NodeLinks,
    pub element: ElementLayout,
}

impl LayoutDescriptor {
    /// Address of the sentinel for the container at `container`
    pub fn header_address(
        &self,
        mem: &dyn MemoryAccessor,
        container: Address,
    ) -> Result<Address, MemoryError> {
        match self.header {
            HeaderLocation::Embedded { offset } => Ok(container + offset),
            HeaderLocation::Allocated { pointer_offset } => {
                mem.read_pointer(container + pointer_offset)
            }
        }
    }
}

/// Match `ty` against the known map layouts
pub fn recognize(registry: &TypeRegistry, ty: &TypeDescriptor) -> Option<LayoutDescriptor> {
    let layout = recognize_libcxx(registry, ty)
        .or_else(|| recognize_libstdcxx(registry, ty))
        .or_else(|| recognize_msvc(registry, ty));

    match &layout {
        Some(layout) => debug!(type_name = %ty.name, variant = layout.variant.name(), "recognized map layout"),
        None => debug!(type_name = %ty.name, "unrecognized map layout"),
    }
    layout
}

/// Registry name of the libc++ node holding `value_type`
pub(crate) fn libcxx_node_name(value_type: &TypeDescriptor) -> String {
    format!("std::__1::__tree_node<{}, void *>", value_type.name)
}

/// Registry name of the libstdc++ node holding `pair`
pub(crate) fn libstdcxx_node_name(pair: &TypeDescriptor) -> String {
    format!("std::_Rb_tree_node<{}>", pair.name)
}

/// Element layout of a libc++ node. The node is looked up by name; without
/// it, `__value_` follows the base, which may reuse the base's tail padding.
pub(crate) fn libcxx_element(
    registry: &TypeRegistry,
    value_type: &TypeRef,
    base: &TypeDescriptor,
) -> Option<ElementLayout> {
    let value_offset = match registry
        .lookup(&libcxx_node_name(value_type))
        .and_then(|node| node.offset_of("__value_"))
    {
        Some(offset) => offset,
        None => {
            let color = base.field("__is_black_")?;
            align_up(color.offset + color.ty.size, value_type.align)
        }
    };

    match value_type.field("__cc_") {
        Some(cc) => ElementLayout::for_pair(value_offset + cc.offset, &cc.ty),
        None => ElementLayout::for_pair(value_offset, value_type),
    }
}

/// Element layout of a libstdc++ node (`_M_storage` follows the base)
pub(crate) fn libstdcxx_element(
    registry: &TypeRegistry,
    pair: &TypeRef,
    base: &TypeDescriptor,
) -> Option<ElementLayout> {
    let value_offset = registry
        .lookup(&libstdcxx_node_name(pair))
        .and_then(|node| node.offset_of("_M_storage"))
        .unwrap_or_else(|| align_up(base.size, pair.align));
    ElementLayout::for_pair(value_offset, pair)
}

fn recognize_libcxx(registry: &TypeRegistry, ty: &TypeDescriptor) -> Option<LayoutDescriptor> {
    let tree_field = ty.field("__tree_")?;
    let tree = &tree_field.ty;
    tree.field("__begin_node_")?;

    let (end_offset, end_node, size_offset) =
        match (tree.field("__end_node_"), tree.field("__size_")) {
            (Some(end), Some(size)) => (end.offset, end.ty.clone(), size.offset),
            _ => {
                let (end_offset, end_node) = tree.field_path(&["__pair1_", "__value_"])?;
                let (size_offset, _) = tree.field_path(&["__pair3_", "__value_"])?;
                (end_offset, end_node, size_offset)
            }
        };

    let root = end_node.field("__left_")?;
    let base = registry.pointee_of(&root.ty)?;
    let links = NodeLinks {
        left: base.offset_of("__left_")?,
        right: base.offset_of("__right_")?,
        parent: base.offset_of("__parent_")?,
        color: base.offset_of("__is_black_")?,
        nil_flag: None,
    };
    let value_type = tree.template_arg(0)?;

    Some(LayoutDescriptor {
        variant: TreeVariant::LibCxx,
        header: HeaderLocation::Embedded {
            offset: tree_field.offset + end_offset,
        },
        root_link: root.offset,
        count_offset: Some(tree_field.offset + size_offset),
        links,
        element: libcxx_element(registry, value_type, base)?,
    })
}

fn recognize_libstdcxx(registry: &TypeRegistry, ty: &TypeDescriptor) -> Option<LayoutDescriptor> {
    let tree = ty.field("_M_t")?;
    let tree_impl = tree.ty.field("_M_impl")?;
    let header = tree_impl.ty.field("_M_header")?;
    let count = tree_impl.ty.field("_M_node_count")?;

    let base = &header.ty;
    let links = NodeLinks {
        left: base.offset_of("_M_left")?,
        right: base.offset_of("_M_right")?,
        parent: base.offset_of("_M_parent")?,
        color: base.offset_of("_M_color")?,
        nil_flag: None,
    };
    let pair = tree.ty.template_arg(1)?;
    let impl_offset = tree.offset + tree_impl.offset;

    Some(LayoutDescriptor {
        variant: TreeVariant::LibStdCxx,
        header: HeaderLocation::Embedded {
            offset: impl_offset + header.offset,
        },
        root_link: links.parent,
        count_offset: Some(impl_offset + count.offset),
        links,
        element: libstdcxx_element(registry, pair, base)?,
    })
}

fn recognize_msvc(registry: &TypeRegistry, ty: &TypeDescriptor) -> Option<LayoutDescriptor> {
    let (val_offset, tree_val) = ty.field_path(&["_Mypair", "_Myval2", "_Myval2"])?;
    let head = tree_val.field("_Myhead")?;
    let size = tree_val.field("_Mysize")?;
    let node = registry.pointee_of(&head.ty)?;

    let links = NodeLinks {
        left: node.offset_of("_Left")?,
        right: node.offset_of("_Right")?,
        parent: node.offset_of("_Parent")?,
        color: node.offset_of("_Color")?,
        nil_flag: Some(node.offset_of("_Isnil")?),
    };
    let value = node.field("_Myval")?;

    Some(LayoutDescriptor {
        variant: TreeVariant::MsvcStl,
        header: HeaderLocation::Allocated {
            pointer_offset: val_offset + head.offset,
        },
        root_link: links.parent,
        count_offset: Some(val_offset + size.offset),
        links,
        element: ElementLayout::for_pair(value.offset, &value.ty)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::debuggee::stdlib::{define_map, ValueKind};
    use crate::debuggee::StdLib;
    use crate::types::StructBuilder;

    fn recognize_defined(library: StdLib) -> Option<LayoutDescriptor> {
        let mut registry = TypeRegistry::new();
        let types = define_map(&mut registry, library, ValueKind::Int, ValueKind::Int);
        recognize(&registry, &types.map)
    }

    #[test]
    fn test_recognize_libstdcxx() {
        let layout = recognize_defined(StdLib::LibStdCxx).unwrap();
        assert_eq!(layout.variant, TreeVariant::LibStdCxx);
        assert_eq!(layout.header, HeaderLocation::Embedded { offset: 8 });
        assert_eq!(layout.count_offset, Some(40));
        assert_eq!(layout.root_link, 8);
        assert_eq!(layout.links.left, 16);
        assert_eq!(layout.links.right, 24);
        assert_eq!(layout.links.nil_flag, None);
        assert_eq!(layout.element.value_offset, 32);
        assert_eq!(layout.element.mapped_offset, 4);
    }

    #[test]
    fn test_recognize_both_libcxx_shapes() {
        for library in [StdLib::LibCxx, StdLib::LibCxxLegacy] {
            let layout = recognize_defined(library).unwrap();
            assert_eq!(layout.variant, TreeVariant::LibCxx);
            assert_eq!(layout.header, HeaderLocation::Embedded { offset: 8 });
            assert_eq!(layout.count_offset, Some(16));
            assert_eq!(layout.root_link, 0);
            assert_eq!(layout.links.parent, 16);
            assert_eq!(layout.links.color, 24);
            assert_eq!(layout.element.pair.name, "std::__1::pair<const int, int>");
        }
    }

    #[test]
    fn test_recognize_msvc() {
        let layout = recognize_defined(StdLib::MsvcStl).unwrap();
        assert_eq!(layout.variant, TreeVariant::MsvcStl);
        assert_eq!(layout.header, HeaderLocation::Allocated { pointer_offset: 0 });
        assert_eq!(layout.count_offset, Some(8));
        assert_eq!(layout.links.nil_flag, Some(25));
        assert_eq!(layout.element.value_offset, 28);
    }

    #[test]
    fn test_debug_wrapper_is_unrecognized() {
        assert!(recognize_defined(StdLib::LibStdCxxDebug).is_none());
    }

    #[test]
    fn test_libcxx_value_offset_without_node_type() {
        let mut registry = TypeRegistry::new();
        let types = define_map(&mut registry, StdLib::LibCxx, ValueKind::Int, ValueKind::Int);
        let with_node = recognize(&registry, &types.map).unwrap();

        // Same registry minus the node type: the offset is derived from the base
        let mut stripped = TypeRegistry::new();
        for name in [
            "std::__1::__tree_node_base<void *>",
            "std::__1::__tree_end_node<std::__1::__tree_node_base<void *> *>",
        ] {
            stripped.insert(registry.lookup(name).unwrap().clone());
        }
        let derived = recognize(&stripped, &types.map).unwrap();
        assert_eq!(derived.element, with_node.element);
    }

    #[test]
    fn test_unrelated_struct_is_unrecognized() {
        let registry = TypeRegistry::new();
        let ty = StructBuilder::new("std::map<int, int>")
            .field("_M_t", &TypeDescriptor::int("long", 8, true))
            .build();
        assert!(recognize(&registry, &ty).is_none());
    }
}
