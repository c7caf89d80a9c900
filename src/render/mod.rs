//! Value rendering
//!
//! [`ValueRenderer`] turns a typed location into a [`ValueNode`] tree:
//! synthetic children come from the bound formatter, everything else from
//! the type's own members. [`text`] prints a tree the way `frame variable`
//! does.

pub mod text;

pub use text::{format_inline, format_variable};

use crate::config::FormatterConfig;
use crate::formatters::{
    provider_for, ContainerHandle, FormatterError, Interrupt, SyntheticChildrenProvider, ValueRef,
};
use crate::memory::{MemoryAccessor, MemoryError};
use crate::types::{display_type_name, TypeKind, TypeRegistry};

/// Nested values deeper than this are left collapsed
const MAX_NESTING: usize = 8;

/// Longest string payload read from the target
const MAX_STRING_LENGTH: u64 = 1024;

/// A rendered value and (when expanded) its children
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ValueNode {
    pub name: String,
    pub type_name: String,
    pub value: Option<String>,
    pub summary: Option<String>,
    pub children: Vec<ValueNode>,
    /// Children that exist but were not rendered
    pub elided: usize,
    /// Shown with braces even when empty, like `size=0 {}`
    pub container: bool,
    pub might_have_children: bool,
    pub error: Option<String>,
}

impl ValueNode {
    fn new(name: &str, type_name: &str) -> Self {
        ValueNode {
            name: name.to_string(),
            type_name: display_type_name(type_name),
            ..Default::default()
        }
    }

    /// Text shown next to the name: the scalar value, else the summary
    pub fn headline(&self) -> Option<&str> {
        self.value.as_deref().or(self.summary.as_deref())
    }
}

pub struct ValueRenderer<'a> {
    mem: &'a dyn MemoryAccessor,
    registry: &'a TypeRegistry,
    config: FormatterConfig,
    interrupt: &'a Interrupt,
}

impl<'a> ValueRenderer<'a> {
    pub fn new(
        mem: &'a dyn MemoryAccessor,
        registry: &'a TypeRegistry,
        config: FormatterConfig,
        interrupt: &'a Interrupt,
    ) -> Self {
        ValueRenderer {
            mem,
            registry,
            config,
            interrupt,
        }
    }

    /// Render any value, binding a throwaway formatter if its type has one
    pub fn render(&self, name: &str, value: &ValueRef, expand: bool) -> ValueNode {
        self.render_at(name, value, expand, 0)
    }

    /// Render a value through a provider the caller keeps between queries
    pub fn render_synthetic(
        &self,
        name: &str,
        value: &ValueRef,
        provider: &mut dyn SyntheticChildrenProvider,
        expand: bool,
    ) -> ValueNode {
        self.synthetic_at(name, value, provider, expand, 0)
    }

    fn render_at(&self, name: &str, value: &ValueRef, expand: bool, depth: usize) -> ValueNode {
        let handle = ContainerHandle::new(name, value.address, &value.ty);
        match provider_for(self.registry, handle, self.config, self.interrupt) {
            Some(mut provider) => self.synthetic_at(name, value, provider.as_mut(), expand, depth),
            None => self.generic_at(name, value, expand, depth),
        }
    }

    fn synthetic_at(
        &self,
        name: &str,
        value: &ValueRef,
        provider: &mut dyn SyntheticChildrenProvider,
        expand: bool,
        depth: usize,
    ) -> ValueNode {
        let mut node = ValueNode::new(name, &value.ty.name);
        node.container = provider.is_container();
        node.summary = provider.summary(self.mem);
        node.might_have_children = provider.might_have_children(self.mem);

        if expand && depth < MAX_NESTING {
            let count = provider.num_children(self.mem);
            let shown = count.min(self.config.max_children);
            for index in 0..shown {
                match provider.child_at(self.mem, index) {
                    Ok(child) => {
                        node.children
                            .push(self.render_at(&child.name, &child.value, true, depth + 1));
                    }
                    Err(FormatterError::OutOfRange { .. }) => break,
                    Err(err) => {
                        node.error = Some(err.to_string());
                        break;
                    }
                }
            }
            if node.error.is_none() {
                let known = provider.num_children(self.mem);
                node.elided = known.saturating_sub(node.children.len());
            }
        }

        if node.error.is_none() {
            node.error = provider.last_error().map(|err| err.to_string());
        }
        node
    }

    fn generic_at(&self, name: &str, value: &ValueRef, expand: bool, depth: usize) -> ValueNode {
        let mut node = ValueNode::new(name, &value.ty.name);
        match &value.ty.kind {
            TypeKind::Struct { fields } => {
                node.might_have_children = !fields.is_empty();
                if expand && depth < MAX_NESTING {
                    node.children = fields
                        .iter()
                        .map(|field| {
                            let member = ValueRef::new(value.address + field.offset, &field.ty);
                            self.render_at(&field.name, &member, true, depth + 1)
                        })
                        .collect();
                }
            }
            _ => match self.scalar(value) {
                Ok(text) => node.value = Some(text),
                Err(err) => node.error = Some(err.to_string()),
            },
        }
        node
    }

    fn scalar(&self, value: &ValueRef) -> Result<String, MemoryError> {
        let address = value.address;
        let text = match &value.ty.kind {
            TypeKind::Int { signed } => {
                let size = value.ty.size.clamp(1, 8);
                let raw = self.mem.read_unsigned(address, size)?;
                if *signed {
                    sign_extend(raw, size).to_string()
                } else {
                    raw.to_string()
                }
            }
            TypeKind::Bool => {
                if self.mem.read_u8(address)? != 0 {
                    "true".to_string()
                } else {
                    "false".to_string()
                }
            }
            TypeKind::Char => format_char(self.mem.read_u8(address)?),
            TypeKind::Pointer { .. } => match self.mem.read_pointer(address)? {
                0 => "nullptr".to_string(),
                ptr => format!("0x{:016x}", ptr),
            },
            TypeKind::String => {
                let data = self.mem.read_pointer(address)?;
                let len = self.mem.read_u64(address + 8)?;
                let shown = len.min(MAX_STRING_LENGTH);
                let bytes = if shown == 0 {
                    Vec::new()
                } else {
                    self.mem.read_bytes(data, shown as usize)?
                };
                let mut text = quote(&String::from_utf8_lossy(&bytes));
                if shown < len {
                    text.push_str("...");
                }
                text
            }
            TypeKind::Struct { .. } => String::new(),
        };
        Ok(text)
    }
}

fn sign_extend(raw: u64, size: u64) -> i64 {
    let shift = 64 - size * 8;
    ((raw << shift) as i64) >> shift
}

fn format_char(byte: u8) -> String {
    if byte.is_ascii_graphic() || byte == b' ' {
        format!("'{}'", byte as char)
    } else {
        format!("'\\x{:02x}'", byte)
    }
}

fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{ProcessImage, Region};
    use crate::types::{StructBuilder, TypeDescriptor};

    #[test]
    fn test_sign_extension() {
        assert_eq!(sign_extend(0xffff_ffff, 4), -1);
        assert_eq!(sign_extend(0x7f, 1), 127);
        assert_eq!(sign_extend(0x80, 1), -128);
        assert_eq!(sign_extend(u64::MAX, 8), -1);
    }

    #[test]
    fn test_char_and_string_quoting() {
        assert_eq!(format_char(b'a'), "'a'");
        assert_eq!(format_char(1), "'\\x01'");
        assert_eq!(quote("say \"hi\""), "\"say \\\"hi\\\"\"");
    }

    #[test]
    fn test_struct_members_render_generically() {
        let mut image = ProcessImage::default();
        let registry = TypeRegistry::new();
        let ty = StructBuilder::new("point")
            .field("x", &TypeDescriptor::int("int", 4, true))
            .field("ok", &TypeDescriptor::bool())
            .field("next", &TypeDescriptor::pointer("point"))
            .build();
        let addr = image.allocate(Region::Stack, ty.size as usize, ty.align).unwrap();
        image.write_i32(addr, -7).unwrap();
        image.write_u8(addr + 4, 1).unwrap();

        let interrupt = Interrupt::new();
        let renderer = ValueRenderer::new(&image, &registry, FormatterConfig::default(), &interrupt);
        let node = renderer.render("p", &ValueRef::new(addr, &ty), true);

        let values: Vec<_> = node.children.iter().map(|c| c.headline()).collect();
        assert_eq!(values, vec![Some("-7"), Some("true"), Some("nullptr")]);
        assert!(node.might_have_children);

        let collapsed = renderer.render("p", &ValueRef::new(addr, &ty), false);
        assert!(collapsed.children.is_empty());
    }

    #[test]
    fn test_unreadable_scalar_sets_error() {
        let image = ProcessImage::default();
        let registry = TypeRegistry::new();
        let interrupt = Interrupt::new();
        let renderer = ValueRenderer::new(&image, &registry, FormatterConfig::default(), &interrupt);
        let int = TypeDescriptor::int("int", 4, true);

        let node = renderer.render("x", &ValueRef::new(0x10, &int), true);
        assert!(node.value.is_none());
        assert!(node.error.unwrap().contains("not mapped"));
    }
}
