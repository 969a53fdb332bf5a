//! Dense index newtypes shared across the crate, in the `cranelift-entity` idiom.

use cranelift_entity::entity_impl;

/// Index of a function within its module (imported or defined).
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FuncIndex(u32);
entity_impl!(FuncIndex);

/// Index of a function type (signature) within its module.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TypeIndex(u32);
entity_impl!(TypeIndex);

/// Index of a global within its module.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GlobalIndex(u32);
entity_impl!(GlobalIndex);

/// Index of a linear memory within its module.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MemoryIndex(u32);
entity_impl!(MemoryIndex);

/// Index of a table within its module.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TableIndex(u32);
entity_impl!(TableIndex);

/// Index of a local (argument or declared local) within the function currently compiling.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LocalIndex(u32);
entity_impl!(LocalIndex);

/// A function signature: argument and result types, in the crate's own `ValType` currency.
///
/// `wasmparser` reports `wasmparser::Type`; this is the restricted form this crate's slot/register
/// model actually understands (no reference types, no `v128`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FuncType {
    /// Declared parameter types, in order.
    pub params: crate::alloc::Vec<crate::error::ValType>,
    /// Declared result types, in order. Wasm 1.0 permits at most one; this crate does not assume
    /// that cap (see DESIGN.md Open Question 1).
    pub results: crate::alloc::Vec<crate::error::ValType>,
}

impl FuncType {
    /// Number of io slots (argument + return) this signature occupies at the given slot width,
    /// 64-bit aligned as the reference implementation requires for the call-frame / return area.
    pub fn num_io_slots(&self, use_32_bit_slots: bool) -> u32 {
        let mut total = 0;
        for t in self.params.iter().chain(self.results.iter()) {
            total += t.num_slots(use_32_bit_slots);
        }
        total
    }
}

/// Converts a `wasmparser::Type` into this crate's `ValType`, rejecting anything the slot/register
/// model does not represent (reference types, `v128`, etc.) as `UnknownOpcode` at the call site.
pub fn type_to_val_type(ty: wasmparser::Type) -> Option<crate::error::ValType> {
    use crate::error::ValType;
    match ty {
        wasmparser::Type::I32 => Some(ValType::I32),
        wasmparser::Type::I64 => Some(ValType::I64),
        wasmparser::Type::F32 => Some(ValType::F32),
        wasmparser::Type::F64 => Some(ValType::F64),
        _ => None,
    }
}
