//! The error currency threaded through every fallible operation in this crate.
//!
//! Every component (code-page emitter, slot table, register model, value stack, constant pool,
//! block/scope manager, opcode dispatch, per-opcode compilers, function driver) reports failure
//! through a single `WasmError` variant rather than a component-local error type, so callers never
//! need to match on more than one enum.

use core::fmt;

/// Everything that can go wrong compiling a single Wasm function body.
#[derive(Debug, Fail)]
pub enum WasmError {
    /// An opcode byte has no entry in the dispatch table, or names a feature this build does not
    /// compile (for example a floating-point opcode when `CompilerConfig::has_float` is false).
    #[fail(display = "unknown or disabled opcode: {:#x}", opcode)]
    UnknownOpcode {
        /// The raw opcode byte (or, for the `0xFC` prefix family, the prefixed sub-opcode).
        opcode: u32,
    },

    /// An operand popped off the value stack did not have the type the opcode requires.
    #[fail(
        display = "type mismatch: expected {:?}, found {:?}",
        expected, found
    )]
    TypeMismatch {
        /// The type the opcode's signature requires.
        expected: ValType,
        /// The type actually found on the value stack.
        found: ValType,
    },

    /// A block's producing stack depth at `end` differs from its declared result arity.
    #[fail(
        display = "block produced {} results, expected {}",
        produced, expected
    )]
    TypeCountMismatch {
        /// Values actually present on the value stack at block exit.
        produced: usize,
        /// Values the block's type declares.
        expected: usize,
    },

    /// A pop was attempted below the current scope's entry stack depth in a non-polymorphic
    /// scope.
    #[fail(display = "stack underrun: attempted to pop below scope entry depth")]
    StackUnderrun,

    /// Slot or value-stack-height allocation exceeded `CompilerConfig::max_function_slots` /
    /// `max_function_stack_height`.
    #[fail(display = "function stack overflow: {}", detail)]
    FunctionStackOverflow {
        /// Human-readable detail naming which budget was exceeded.
        detail: &'static str,
    },

    /// A slot's reference count would exceed the representable maximum (255).
    #[fail(display = "slot usage overflow on slot {}", slot)]
    SlotUsageOverflow {
        /// The slot whose refcount would overflow.
        slot: u32,
    },

    /// `global.get`/`global.set` named an index beyond the module's declared global count.
    #[fail(
        display = "global index {} out of bounds (module declares {} globals)",
        index, num_globals
    )]
    GlobalIndexOutOfBounds {
        /// The requested index.
        index: u32,
        /// The module's declared global count.
        num_globals: u32,
    },

    /// `global.set` targeted a global declared immutable.
    #[fail(display = "attempted to set immutable global {}", index)]
    SettingImmutableGlobal {
        /// The global's index.
        index: u32,
    },

    /// `local.get`/`local.set`/`local.tee` named an index beyond the function's arg+local count.
    #[fail(
        display = "local index {} out of bounds (function has {} locals)",
        index, num_locals
    )]
    LocalIndexOutOfBounds {
        /// The requested index.
        index: u32,
        /// The function's declared arg+local count.
        num_locals: u32,
    },

    /// An opcode other than `{i32,i64,f32,f64}.const`, `global.get`, or `end` was encountered
    /// while compiling a constant expression (global initializer, element/data offset).
    #[fail(display = "opcode {:#x} not permitted in a constant expression", opcode)]
    RestrictedOpcode {
        /// The disallowed opcode byte.
        opcode: u32,
    },

    /// `br`/`br_if`/`br_table` named a depth deeper than the current scope chain.
    #[fail(
        display = "branch depth {} exceeds scope chain depth {}",
        depth, max_depth
    )]
    InvalidBlockDepth {
        /// The requested branch depth.
        depth: u32,
        /// The number of enclosing scopes actually available.
        max_depth: u32,
    },

    /// `call` named a function index the module has no definition or import for.
    #[fail(display = "function lookup failed for index {}", index)]
    FunctionLookupFailed {
        /// The requested function index.
        index: u32,
    },

    /// `call` named an imported function whose import record is missing.
    #[fail(display = "function import missing for index {}", index)]
    FunctionImportMissing {
        /// The requested function index.
        index: u32,
    },

    /// `call_indirect` named a type index beyond the module's declared function-type count.
    #[fail(
        display = "function type index {} out of bounds ({} types declared)",
        index, num_types
    )]
    FuncTypeIndexOOB {
        /// The requested type index.
        index: u32,
        /// The module's declared function-type count.
        num_types: u32,
    },

    /// The code-page allocator refused to supply a fresh page.
    #[fail(display = "code page allocation failed")]
    MallocFailedCodePage,

    /// The function body is structurally malformed: missing terminal `end`, an `else` without a
    /// matching `if`, or a LEB128 decode failure.
    #[fail(display = "malformed wasm: {}", detail)]
    WasmMalformed {
        /// Human-readable detail of what was malformed.
        detail: &'static str,
    },
}

/// The value types this crate's slot/register model tracks. A strict subset of
/// `wasmparser::Type` restricted to what can occupy a slot or register (no reference types,
/// no `v128`, matching `CompilerConfig::has_float`/extended-opcode gating).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValType {
    /// 32-bit integer.
    I32,
    /// 64-bit integer (spans two slots when `Use32BitSlots`).
    I64,
    /// 32-bit float.
    F32,
    /// 64-bit float (spans two slots when `Use32BitSlots`).
    F64,
}

impl ValType {
    /// Number of slots this type occupies on the current build's slot width.
    pub fn num_slots(self, use_32_bit_slots: bool) -> u32 {
        match (self, use_32_bit_slots) {
            (ValType::I32, _) | (ValType::F32, _) => 1,
            (ValType::I64, true) | (ValType::F64, true) => 2,
            (ValType::I64, false) | (ValType::F64, false) => 1,
        }
    }

    /// Whether this type is tracked in the floating-point pseudo-register rather than the
    /// integer one.
    pub fn is_float(self) -> bool {
        matches!(self, ValType::F32 | ValType::F64)
    }
}

impl fmt::Display for ValType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ValType::I32 => "i32",
            ValType::I64 => "i64",
            ValType::F32 => "f32",
            ValType::F64 => "f64",
        };
        f.write_str(s)
    }
}

/// Shorthand used throughout the crate.
pub type WasmResult<T> = Result<T, WasmError>;
