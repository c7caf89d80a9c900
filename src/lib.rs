//! # Introduction
//!
//! mapscope shows `std::map` values the way a debugger's data formatters
//! do: as a size summary and an ordered list of `(key, value)` children,
//! reconstructed by walking the red-black tree in the debuggee's memory.
//! libc++, libstdc++ and the MSVC STL are recognized structurally from
//! their type layouts.
//!
//! ## Pipeline
//!
//! ```text
//! Sample program → Snapshots → Session → Formatters → Renderer → TUI / text
//! ```
//!
//! 1. [`debuggee`]: records a sample C++ program against a chosen library
//!    layout, one [`snapshot::Snapshot`] per breakpoint.
//! 2. [`memory`] and [`types`]: the process image and type descriptors the
//!    formatters read through.
//! 3. [`formatters`]: layout recognition, tree traversal and the synthetic
//!    children providers for maps and map iterators.
//! 4. [`session`]: variable lookup, provider ownership and lifecycle
//!    events on continue, reverse-continue and frame selection.
//! 5. [`render`]: value trees and `frame variable` text.
//! 6. [`ui`]: ratatui-based TUI; not part of the stable library API.

pub mod config;
pub mod debuggee;
pub mod formatters;
pub mod memory;
pub mod render;
pub mod session;
pub mod snapshot;
pub mod types;
pub mod ui;
