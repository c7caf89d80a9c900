//! Synthetic children for map iterators
//!
//! An iterator is shown as the pair it points at, with children `first` and
//! `second`. Where the library marks its sentinel (MSVC's `_Isnil`), an
//! iterator at the sentinel is shown as `end`; a null iterator likewise. An
//! iterator of unrecognized shape has no summary and no children.

use super::layout::{libcxx_element, libstdcxx_element, ElementLayout, TreeVariant};
use super::{ContainerHandle, FormatterError, SyntheticChild, SyntheticChildrenProvider, ValueRef};
use crate::memory::{Address, MemoryAccessor};
use crate::types::{TypeDescriptor, TypeRegistry};

/// How to get from an iterator object to its node's pair
#[derive(Debug, Clone, PartialEq)]
pub struct IteratorLayout {
    pub variant: TreeVariant,
    /// Offset of the node pointer within the iterator
    pub node_pointer: u64,
    pub element: ElementLayout,
    pub nil_flag: Option<u64>,
}

pub fn recognize_iterator(registry: &TypeRegistry, ty: &TypeDescriptor) -> Option<IteratorLayout> {
    // libc++: __map_iterator wraps a __tree_iterator holding __ptr_
    if let Some(inner) = ty.field("__i_") {
        let ptr = inner.ty.field("__ptr_")?;
        let value_type = inner.ty.template_arg(0)?;
        let end_node = registry.pointee_of(&ptr.ty)?;
        let base = registry.pointee_of(&end_node.field("__left_")?.ty)?;
        return Some(IteratorLayout {
            variant: TreeVariant::LibCxx,
            node_pointer: inner.offset + ptr.offset,
            element: libcxx_element(registry, value_type, base)?,
            nil_flag: None,
        });
    }

    if let Some(node) = ty.field("_M_node") {
        let base = registry.pointee_of(&node.ty)?;
        let pair = ty.template_arg(0)?;
        return Some(IteratorLayout {
            variant: TreeVariant::LibStdCxx,
            node_pointer: node.offset,
            element: libstdcxx_element(registry, pair, base)?,
            nil_flag: None,
        });
    }

    let ptr = ty.field("_Ptr")?;
    let node = registry.pointee_of(&ptr.ty)?;
    let value = node.field("_Myval")?;
    Some(IteratorLayout {
        variant: TreeVariant::MsvcStl,
        node_pointer: ptr.offset,
        element: ElementLayout::for_pair(value.offset, &value.ty)?,
        nil_flag: Some(node.offset_of("_Isnil")?),
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Target {
    Unrecognized,
    End,
    Node(Address),
}

pub struct MapIteratorProvider {
    handle: ContainerHandle,
    layout: Option<IteratorLayout>,
    target: Option<Result<Target, FormatterError>>,
}

impl MapIteratorProvider {
    pub fn new(registry: &TypeRegistry, handle: ContainerHandle) -> Self {
        let layout = recognize_iterator(registry, &handle.ty);
        MapIteratorProvider {
            handle,
            layout,
            target: None,
        }
    }

    pub fn is_recognized(&self) -> bool {
        self.layout.is_some()
    }

    /// Whether the iterator is known to be past the end
    pub fn is_end(&mut self, mem: &dyn MemoryAccessor) -> bool {
        matches!(self.resolve(mem), Ok(Target::End))
    }

    fn resolve(&mut self, mem: &dyn MemoryAccessor) -> Result<Target, FormatterError> {
        if let Some(target) = &self.target {
            return target.clone();
        }
        let target = match &self.layout {
            Some(layout) => Self::read_target(mem, layout, self.handle.address),
            None => Ok(Target::Unrecognized),
        };
        self.target = Some(target.clone());
        target
    }

    fn read_target(
        mem: &dyn MemoryAccessor,
        layout: &IteratorLayout,
        iterator: Address,
    ) -> Result<Target, FormatterError> {
        let node = mem.read_pointer(iterator + layout.node_pointer)?;
        if node == 0 {
            return Ok(Target::End);
        }
        if let Some(flag) = layout.nil_flag {
            if mem.read_u8(node + flag)? != 0 {
                return Ok(Target::End);
            }
        }
        Ok(Target::Node(node))
    }
}

impl SyntheticChildrenProvider for MapIteratorProvider {
    fn num_children(&mut self, mem: &dyn MemoryAccessor) -> usize {
        match self.resolve(mem) {
            Ok(Target::Node(_)) => 2,
            _ => 0,
        }
    }

    fn child_at(
        &mut self,
        mem: &dyn MemoryAccessor,
        index: usize,
    ) -> Result<SyntheticChild, FormatterError> {
        let node = match self.resolve(mem)? {
            Target::Node(node) => node,
            Target::End | Target::Unrecognized => {
                return Err(FormatterError::OutOfRange { index, size: 0 })
            }
        };
        let Some(layout) = &self.layout else {
            return Err(FormatterError::OutOfRange { index, size: 0 });
        };
        let element = &layout.element;
        let pair = node + element.value_offset;
        match index {
            0 => Ok(SyntheticChild {
                name: "first".to_string(),
                value: ValueRef::new(pair + element.key_offset, &element.key),
            }),
            1 => Ok(SyntheticChild {
                name: "second".to_string(),
                value: ValueRef::new(pair + element.mapped_offset, &element.mapped),
            }),
            _ => Err(FormatterError::OutOfRange { index, size: 2 }),
        }
    }

    fn might_have_children(&mut self, _mem: &dyn MemoryAccessor) -> bool {
        self.layout.is_some()
    }

    fn summary(&mut self, mem: &dyn MemoryAccessor) -> Option<String> {
        self.is_end(mem).then(|| "end".to_string())
    }

    fn last_error(&self) -> Option<&FormatterError> {
        match &self.target {
            Some(Err(err)) => Some(err),
            _ => None,
        }
    }

    fn invalidate(&mut self) {
        self.target = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::debuggee::stdlib::{IterPosition, TargetMap, ValueKind};
    use crate::debuggee::{StdLib, TargetValue};
    use crate::memory::{ProcessImage, Region};
    use crate::types::StructBuilder;

    fn setup(library: StdLib) -> (ProcessImage, TypeRegistry, TargetMap) {
        let mut image = ProcessImage::default();
        let mut registry = TypeRegistry::new();
        let mut map =
            TargetMap::create(&mut image, &mut registry, library, ValueKind::Int, ValueKind::Int)
                .unwrap();
        for k in [3, 1, 2] {
            map.insert(&mut image, TargetValue::Int(k), TargetValue::Int(k + 100))
                .unwrap();
        }
        (image, registry, map)
    }

    fn iterator_at(
        image: &mut ProcessImage,
        registry: &TypeRegistry,
        map: &TargetMap,
        position: IterPosition,
    ) -> MapIteratorProvider {
        let ty = map.types.iterator.clone();
        let addr = image.allocate(Region::Stack, ty.size as usize, ty.align).unwrap();
        map.write_iterator(image, addr, position).unwrap();
        MapIteratorProvider::new(registry, ContainerHandle::new("it", addr, &ty))
    }

    #[test]
    fn test_begin_iterator_shows_first_pair() {
        for library in [StdLib::LibCxx, StdLib::LibCxxLegacy, StdLib::LibStdCxx, StdLib::MsvcStl] {
            let (mut image, registry, map) = setup(library);
            let mut it = iterator_at(&mut image, &registry, &map, IterPosition::Begin);

            assert!(it.is_recognized(), "{:?}", library);
            assert_eq!(it.num_children(&image), 2);
            assert_eq!(it.summary(&image), None);
            let first = it.child_at(&image, 0).unwrap();
            let second = it.child_at(&image, 1).unwrap();
            assert_eq!(first.name, "first");
            assert_eq!(image.read_i32(first.value.address).unwrap(), 1);
            assert_eq!(image.read_i32(second.value.address).unwrap(), 101);
            assert!(it.child_at(&image, 2).is_err());
        }
    }

    #[test]
    fn test_msvc_end_iterator() {
        let (mut image, registry, map) = setup(StdLib::MsvcStl);
        let mut it = iterator_at(&mut image, &registry, &map, IterPosition::End);

        assert_eq!(it.summary(&image), Some("end".to_string()));
        assert_eq!(it.num_children(&image), 0);
        assert!(matches!(
            it.child_at(&image, 0),
            Err(FormatterError::OutOfRange { .. })
        ));
    }

    #[test]
    fn test_null_iterator_is_end() {
        let (mut image, registry, map) = setup(StdLib::LibStdCxx);
        let ty = map.types.iterator.clone();
        let addr = image.allocate(Region::Stack, ty.size as usize, ty.align).unwrap();
        let mut it = MapIteratorProvider::new(&registry, ContainerHandle::new("it", addr, &ty));
        assert!(it.is_end(&image));
    }

    #[test]
    fn test_unrecognized_iterator_is_not_end() {
        let (mut image, registry, _) = setup(StdLib::LibStdCxx);
        let int = TypeDescriptor::int("int", 4, true);
        let ty = StructBuilder::new("std::_Rb_tree_iterator<std::pair<const int, int> >")
            .field("_M_cur", &int)
            .build();
        let addr = image.allocate(Region::Stack, ty.size as usize, ty.align).unwrap();
        let mut it = MapIteratorProvider::new(&registry, ContainerHandle::new("it", addr, &ty));

        assert!(!it.is_recognized());
        assert!(!it.is_end(&image));
        assert_eq!(it.summary(&image), None);
        assert_eq!(it.num_children(&image), 0);
        assert!(!it.might_have_children(&image));
        assert!(it.last_error().is_none());
    }

    #[test]
    fn test_invalidate_follows_a_moved_iterator() {
        let (mut image, registry, map) = setup(StdLib::MsvcStl);
        let ty = map.types.iterator.clone();
        let addr = image.allocate(Region::Stack, ty.size as usize, ty.align).unwrap();
        map.write_iterator(&mut image, addr, IterPosition::End).unwrap();
        let mut it = MapIteratorProvider::new(&registry, ContainerHandle::new("it", addr, &ty));
        assert!(it.is_end(&image));

        map.write_iterator(&mut image, addr, IterPosition::Begin).unwrap();
        assert!(it.is_end(&image));
        it.on_process_resume();
        assert!(!it.is_end(&image));
    }
}
