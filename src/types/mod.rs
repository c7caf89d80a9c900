//! Type descriptors for the debuggee
//!
//! This module stands in for the debugger's debug-info layer: it describes
//! how values of each target type are laid out in memory.
//!
//! - [`TypeDescriptor`]: name, size, alignment, [`TypeKind`], template arguments
//! - [`StructBuilder`]: lays out fields with natural alignment, or at explicit
//!   offsets when a library packs members differently
//! - [`TypeRegistry`]: lookup by name, the way a debugger resolves a node type
//!   that is only named by a pointer
//!
//! Pointers refer to their pointee by name rather than by [`TypeRef`], which
//! keeps self-referential node types (a node holding pointers to nodes) free
//! of reference cycles.

use crate::memory::{align_up, POINTER_SIZE};
use rustc_hash::FxHashMap;
use std::rc::Rc;

/// Shared handle to a type descriptor
pub type TypeRef = Rc<TypeDescriptor>;

/// The shape of a type
#[derive(Debug, Clone, PartialEq)]
pub enum TypeKind {
    Int { signed: bool },
    Bool,
    Char,
    Pointer { pointee: String },
    Struct { fields: Vec<Field> },
    /// A standard string: data pointer at offset 0, length at offset 8
    String,
}

/// A data member of a struct
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub name: String,
    pub offset: u64,
    pub ty: TypeRef,
}

/// Static description of one target type
#[derive(Debug, Clone, PartialEq)]
pub struct TypeDescriptor {
    pub name: String,
    pub size: u64,
    pub align: u64,
    pub kind: TypeKind,
    pub template_args: Vec<TypeRef>,
}

impl TypeDescriptor {
    /// A signed or unsigned integer of `size` bytes
    pub fn int(name: &str, size: u64, signed: bool) -> TypeRef {
        Rc::new(TypeDescriptor {
            name: name.to_string(),
            size,
            align: size,
            kind: TypeKind::Int { signed },
            template_args: Vec::new(),
        })
    }

    pub fn bool() -> TypeRef {
        Rc::new(TypeDescriptor {
            name: "bool".to_string(),
            size: 1,
            align: 1,
            kind: TypeKind::Bool,
            template_args: Vec::new(),
        })
    }

    pub fn char() -> TypeRef {
        Rc::new(TypeDescriptor {
            name: "char".to_string(),
            size: 1,
            align: 1,
            kind: TypeKind::Char,
            template_args: Vec::new(),
        })
    }

    /// A pointer to the type registered under `pointee`
    pub fn pointer(pointee: &str) -> TypeRef {
        Rc::new(TypeDescriptor {
            name: format!("{} *", pointee),
            size: POINTER_SIZE,
            align: POINTER_SIZE,
            kind: TypeKind::Pointer {
                pointee: pointee.to_string(),
            },
            template_args: Vec::new(),
        })
    }

    /// A string type of `size` bytes (data pointer + length at the front)
    pub fn string(name: &str, size: u64) -> TypeRef {
        Rc::new(TypeDescriptor {
            name: name.to_string(),
            size,
            align: POINTER_SIZE,
            kind: TypeKind::String,
            template_args: Vec::new(),
        })
    }

    /// Look up a direct member by name
    pub fn field(&self, name: &str) -> Option<&Field> {
        match &self.kind {
            TypeKind::Struct { fields } => fields.iter().find(|f| f.name == name),
            _ => None,
        }
    }

    /// Whether every name in `names` is a direct member
    pub fn has_fields(&self, names: &[&str]) -> bool {
        names.iter().all(|name| self.field(name).is_some())
    }

    /// Follow a chain of nested members, accumulating their offsets
    pub fn field_path(&self, path: &[&str]) -> Option<(u64, TypeRef)> {
        let (first, rest) = path.split_first()?;
        let field = self.field(first)?;
        let mut offset = field.offset;
        let mut ty = field.ty.clone();
        for name in rest {
            let next = ty.field(name)?;
            offset += next.offset;
            let next_ty = next.ty.clone();
            ty = next_ty;
        }
        Some((offset, ty))
    }

    /// Offset of a direct member
    pub fn offset_of(&self, name: &str) -> Option<u64> {
        self.field(name).map(|f| f.offset)
    }

    pub fn fields(&self) -> &[Field] {
        match &self.kind {
            TypeKind::Struct { fields } => fields,
            _ => &[],
        }
    }

    pub fn is_pointer(&self) -> bool {
        matches!(self.kind, TypeKind::Pointer { .. })
    }

    /// Name of the pointed-to type, for pointer types
    pub fn pointee(&self) -> Option<&str> {
        match &self.kind {
            TypeKind::Pointer { pointee } => Some(pointee),
            _ => None,
        }
    }

    pub fn template_arg(&self, index: usize) -> Option<&TypeRef> {
        self.template_args.get(index)
    }

    /// True for types rendered as a single value rather than as members
    pub fn is_leaf(&self) -> bool {
        !matches!(self.kind, TypeKind::Struct { .. })
    }
}

/// Builds struct descriptors, placing each field at its natural alignment
/// unless an explicit offset is given
pub struct StructBuilder {
    name: String,
    fields: Vec<Field>,
    next_offset: u64,
    align: u64,
    template_args: Vec<TypeRef>,
    size: Option<u64>,
}

impl StructBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        StructBuilder {
            name: name.into(),
            fields: Vec::new(),
            next_offset: 0,
            align: 1,
            template_args: Vec::new(),
            size: None,
        }
    }

    /// Append a field after the previous one
    pub fn field(mut self, name: &str, ty: &TypeRef) -> Self {
        let offset = align_up(self.next_offset, ty.align);
        self.push(name, offset, ty);
        self
    }

    /// Place a field at an explicit offset
    pub fn field_at(mut self, name: &str, offset: u64, ty: &TypeRef) -> Self {
        self.push(name, offset, ty);
        self
    }

    pub fn template_arg(mut self, ty: &TypeRef) -> Self {
        self.template_args.push(ty.clone());
        self
    }

    /// Force the total size (for types with trailing members we do not model)
    pub fn size(mut self, size: u64) -> Self {
        self.size = Some(size);
        self
    }

    pub fn build(self) -> TypeRef {
        let natural = align_up(self.next_offset, self.align);
        Rc::new(TypeDescriptor {
            name: self.name,
            size: self.size.unwrap_or(natural.max(1)),
            align: self.align,
            kind: TypeKind::Struct {
                fields: self.fields,
            },
            template_args: self.template_args,
        })
    }

    fn push(&mut self, name: &str, offset: u64, ty: &TypeRef) {
        self.align = self.align.max(ty.align);
        self.next_offset = self.next_offset.max(offset + ty.size);
        self.fields.push(Field {
            name: name.to_string(),
            offset,
            ty: ty.clone(),
        });
    }
}

/// Name-indexed collection of the target's types
#[derive(Debug, Clone, Default)]
pub struct TypeRegistry {
    types: FxHashMap<String, TypeRef>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a type under its own name, returning the shared handle
    pub fn insert(&mut self, ty: TypeRef) -> TypeRef {
        self.types.insert(ty.name.clone(), ty.clone());
        ty
    }

    pub fn lookup(&self, name: &str) -> Option<&TypeRef> {
        self.types.get(name)
    }

    /// Resolve the pointee of a pointer type
    pub fn pointee_of(&self, pointer: &TypeDescriptor) -> Option<&TypeRef> {
        pointer.pointee().and_then(|name| self.lookup(name))
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

/// Name shown to the user: drops the libc++ inline namespace
pub fn display_type_name(name: &str) -> String {
    name.replace("std::__1::", "std::")
}
