//! The module/runtime collaborator interface: everything this crate needs answered about the
//! enclosing module without owning that data itself (module/function metadata storage is out of
//! scope, SPEC_FULL.md §1).
//!
//! Grounded on the teacher's `environ/mod.rs` re-export list (`FuncEnvironment`,
//! `GlobalVariable`, `ReturnMode`) — the teacher's own trait bodies (`environ/dummy.rs`,
//! `environ/spec.rs`) were not present in the retrieved pack, so the trait below is authored
//! narrowly around exactly what SPEC_FULL.md's external interfaces (§6) require the runtime/module
//! to answer, rather than the teacher's full (Cranelift-IR-oriented) surface.

use crate::error::{ValType, WasmError, WasmResult};
use crate::translation_utils::{FuncIndex, GlobalIndex, MemoryIndex, TableIndex, TypeIndex};
use cranelift_entity::EntityRef;

/// How a global's current value and mutability are reported back to the compiler.
#[derive(Debug, Clone, Copy)]
pub struct GlobalVariable {
    /// The global's value type.
    pub ty: ValType,
    /// Whether `global.set` is permitted.
    pub mutable: bool,
}

/// Everything the per-opcode compilers and function driver need from the enclosing module,
/// without owning module storage themselves.
pub trait FuncEnvironment {
    /// Look up a global's type and mutability, or fail `GlobalIndexOutOfBounds`.
    fn global(&self, index: GlobalIndex) -> WasmResult<GlobalVariable>;

    /// Look up a function's signature by function index (for `call`), or fail
    /// `FunctionLookupFailed` / `FunctionImportMissing`.
    fn func_type_of(&self, index: FuncIndex) -> WasmResult<crate::translation_utils::FuncType>;

    /// Look up a function signature by type index (for `call_indirect`), or fail
    /// `FuncTypeIndexOOB`.
    fn type_at(&self, index: TypeIndex) -> WasmResult<crate::translation_utils::FuncType>;

    /// Whether the module declares at least one table at `index` (for `call_indirect`).
    fn has_table(&self, index: TableIndex) -> bool;

    /// Whether the module declares at least one linear memory at `index` (for `memory.size` /
    /// `memory.grow`).
    fn has_memory(&self, index: MemoryIndex) -> bool;
}

/// A minimal `FuncEnvironment` for unit tests: a fixed set of globals and function types, one
/// table, one memory.
pub struct DummyEnvironment {
    /// Globals declared, indexed by `GlobalIndex`.
    pub globals: crate::alloc::Vec<GlobalVariable>,
    /// Function types declared, indexed by `FuncIndex`.
    pub func_types: crate::alloc::Vec<crate::translation_utils::FuncType>,
    /// Signatures declared, indexed by `TypeIndex`.
    pub types: crate::alloc::Vec<crate::translation_utils::FuncType>,
    /// Whether a table is present.
    pub has_table: bool,
    /// Whether a memory is present.
    pub has_memory: bool,
}

impl DummyEnvironment {
    /// An environment with nothing declared but one table and one memory, suitable as a
    /// starting point for tests that only need a couple of globals or call targets.
    pub fn new() -> Self {
        DummyEnvironment {
            globals: crate::alloc::Vec::new(),
            func_types: crate::alloc::Vec::new(),
            types: crate::alloc::Vec::new(),
            has_table: true,
            has_memory: true,
        }
    }
}

impl Default for DummyEnvironment {
    fn default() -> Self {
        Self::new()
    }
}

impl FuncEnvironment for DummyEnvironment {
    fn global(&self, index: GlobalIndex) -> WasmResult<GlobalVariable> {
        let i = index.index();
        self.globals
            .get(i)
            .copied()
            .ok_or(WasmError::GlobalIndexOutOfBounds {
                index: i as u32,
                num_globals: self.globals.len() as u32,
            })
    }

    fn func_type_of(&self, index: FuncIndex) -> WasmResult<crate::translation_utils::FuncType> {
        let i = index.index();
        self.func_types
            .get(i)
            .cloned()
            .ok_or(WasmError::FunctionLookupFailed { index: i as u32 })
    }

    fn type_at(&self, index: TypeIndex) -> WasmResult<crate::translation_utils::FuncType> {
        let i = index.index();
        self.types
            .get(i)
            .cloned()
            .ok_or(WasmError::FuncTypeIndexOOB {
                index: i as u32,
                num_types: self.types.len() as u32,
            })
    }

    fn has_table(&self, _index: TableIndex) -> bool {
        self.has_table
    }

    fn has_memory(&self, _index: MemoryIndex) -> bool {
        self.has_memory
    }
}
