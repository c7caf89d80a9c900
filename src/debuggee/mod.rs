//! Simulated debuggee
//!
//! The debuggee is a recorded run of a small C++ program that fills and
//! clears `std::map`s. Its memory is laid out the way a chosen standard
//! library would lay it out:
//!
//! - [`stdlib`]: per-library type definitions and tree emitters
//! - [`rbtree`]: host-side red-black insertion that shapes every tree
//! - [`program`]: the sample program and its recorded stops
//!
//! Nothing in here is visible to the formatters except through
//! [`MemoryAccessor`](crate::memory::MemoryAccessor) reads and the
//! [`TypeRegistry`](crate::types::TypeRegistry).

pub mod program;
pub mod rbtree;
pub mod stdlib;

pub use program::{record, Recording, SAMPLE_SOURCE};

use crate::memory::{Address, MemoryError};
use crate::snapshot::SnapshotError;
use crate::types::TypeRef;
use std::fmt;
use std::str::FromStr;

/// Which standard library the debuggee was built against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StdLib {
    /// libc++ with `__end_node_` / `__size_` members
    LibCxx,
    /// libc++ with the older compressed-pair members
    LibCxxLegacy,
    LibStdCxx,
    /// libstdc++ debug mode (`std::__debug::map`)
    LibStdCxxDebug,
    MsvcStl,
}

impl StdLib {
    pub const ALL: [StdLib; 5] = [
        StdLib::LibCxx,
        StdLib::LibCxxLegacy,
        StdLib::LibStdCxx,
        StdLib::LibStdCxxDebug,
        StdLib::MsvcStl,
    ];

    /// Name accepted on the command line
    pub fn name(&self) -> &'static str {
        match self {
            StdLib::LibCxx => "libcxx",
            StdLib::LibCxxLegacy => "libcxx-legacy",
            StdLib::LibStdCxx => "libstdcxx",
            StdLib::LibStdCxxDebug => "libstdcxx-debug",
            StdLib::MsvcStl => "msvc",
        }
    }
}

impl fmt::Display for StdLib {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown library '{0}' (expected one of libcxx, libcxx-legacy, libstdcxx, libstdcxx-debug, msvc)")]
pub struct UnknownLibrary(pub String);

impl FromStr for StdLib {
    type Err = UnknownLibrary;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        StdLib::ALL
            .into_iter()
            .find(|lib| lib.name() == s)
            .ok_or_else(|| UnknownLibrary(s.to_string()))
    }
}

/// A key or mapped value as the program stores it
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum TargetValue {
    Int(i32),
    Str(String),
}

impl From<i32> for TargetValue {
    fn from(value: i32) -> Self {
        TargetValue::Int(value)
    }
}

impl From<&str> for TargetValue {
    fn from(value: &str) -> Self {
        TargetValue::Str(value.to_string())
    }
}

/// A local variable of a frame
#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    pub name: String,
    pub address: Address,
    pub ty: TypeRef,
}

/// A stack frame at a stop
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub function: String,
    pub line: usize,
    pub variables: Vec<Variable>,
}

impl Frame {
    pub fn variable(&self, name: &str) -> Option<&Variable> {
        self.variables.iter().find(|v| v.name == name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DebuggeeError {
    #[error(transparent)]
    Memory(#[from] MemoryError),

    #[error(transparent)]
    Snapshot(#[from] SnapshotError),

    #[error("sample program has no breakpoint marker #{0}")]
    MissingBreakpoint(usize),
}
