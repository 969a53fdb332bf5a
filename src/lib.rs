//! Single-pass compiler from WebAssembly bytecode to a threaded-code program executed by a
//! register+slot virtual machine.
//!
//! A Wasm function body is translated, one opcode at a time, directly into a stream of
//! machine-word-sized operation pointers and operands — no intermediate AST or IR is built. The
//! translation simultaneously validates the function, folds constants into a per-function
//! constant pool, allocates the two fixed pseudo-registers, and spills everything else into
//! addressable stack slots.
//!
//! Wasm binary parsing above the function-body level (module sections, imports, tables, memory),
//! execution of the emitted code, and the concrete machine-level operation handlers are all
//! external collaborators this crate does not implement — see [`environ::FuncEnvironment`] for the
//! interface this crate expects from them.

#![cfg_attr(not(feature = "std"), no_std)]

#[cfg(not(feature = "std"))]
extern crate alloc as alloc_impl;
#[cfg(feature = "std")]
extern crate std as alloc_impl;

#[macro_use]
extern crate failure_derive;
extern crate failure;

/// Allocation-abstraction shim so the rest of the crate can write `crate::alloc::Vec` etc.
/// regardless of whether the `std` or `core` feature is active, mirroring the teacher's own
/// `hash_map`/`HashMap` re-export shim referenced from `code_translator.rs`.
pub(crate) mod alloc {
    #[cfg(feature = "std")]
    pub use std::string::String;
    #[cfg(feature = "std")]
    pub use std::vec;
    #[cfg(feature = "std")]
    pub use std::vec::Vec;

    #[cfg(not(feature = "std"))]
    pub use alloc_impl::string::String;
    #[cfg(not(feature = "std"))]
    pub use alloc_impl::vec;
    #[cfg(not(feature = "std"))]
    pub use alloc_impl::vec::Vec;

    #[cfg(feature = "std")]
    pub use std::collections::HashMap;
    #[cfg(not(feature = "std"))]
    pub use hashmap_core::HashMap;

    /// Format into an owned `String` without requiring every call site to import the `format!`
    /// macro under a feature-gated path.
    pub fn format(args: core::fmt::Arguments) -> String {
        #[cfg(feature = "std")]
        {
            std::format!("{}", args)
        }
        #[cfg(not(feature = "std"))]
        {
            alloc_impl::format!("{}", args)
        }
    }
}

pub mod codepage;
pub mod compiler;
pub mod config;
pub mod constants;
pub mod dispatch;
pub mod environ;
pub mod error;
pub mod ops;
pub mod registers;
pub mod scopes;
pub mod slots;
pub mod translation_utils;
pub mod value_stack;

pub use compiler::{compile_function, FunctionCompiler};
pub use config::CompilerConfig;
pub use error::{WasmError, WasmResult};
