//! Runtime configuration
//!
//! [`FormatterConfig`] bounds what the formatters will do on behalf of the
//! UI; [`SessionConfig`] selects the target library and the snapshot budget.
//! Both are filled from command-line flags in `main.rs`.

use crate::debuggee::StdLib;

/// Default number of synthetic children rendered per container
pub const DEFAULT_MAX_CHILDREN: usize = 256;

/// Default bound on the number of links followed in one descent or climb
pub const DEFAULT_MAX_TREE_HEIGHT: usize = 128;

/// Default snapshot history budget (64 MB)
pub const DEFAULT_SNAPSHOT_MEMORY_LIMIT: usize = 64 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatterConfig {
    /// Children beyond this index are elided from rendered output
    pub max_children: usize,
    /// A red-black tree of n nodes is at most 2*log2(n+1) high; walking
    /// further than this means the links are corrupt
    pub max_tree_height: usize,
}

impl Default for FormatterConfig {
    fn default() -> Self {
        FormatterConfig {
            max_children: DEFAULT_MAX_CHILDREN,
            max_tree_height: DEFAULT_MAX_TREE_HEIGHT,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    pub library: StdLib,
    pub formatter: FormatterConfig,
    pub snapshot_memory_limit: usize,
}

impl SessionConfig {
    pub fn new(library: StdLib) -> Self {
        SessionConfig {
            library,
            formatter: FormatterConfig::default(),
            snapshot_memory_limit: DEFAULT_SNAPSHOT_MEMORY_LIMIT,
        }
    }

    pub fn with_formatter(mut self, formatter: FormatterConfig) -> Self {
        self.formatter = formatter;
        self
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::new(StdLib::LibStdCxx)
    }
}
