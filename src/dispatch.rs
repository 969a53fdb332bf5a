//! C7 — the opcode dispatch table: per-opcode descriptors naming how many operands an opcode
//! consumes, what it produces, and which of up to four specialized operation variants to emit
//! based on where its operands currently live.
//!
//! Grounded on `original_source/source/m3_compile.c`'s static `c_operations[]` table (the
//! `M3OP`/`M3OP_F`/`M3OP_RESERVED` macros and the `d_unaryOpList`/`d_binOpList`/
//! `d_commutativeBinOpList`/`d_convertOpList` families). This crate keys lookups off
//! `wasmparser::Operator`'s already-decoded discriminant via a `match` in `src/compiler.rs`,
//! rather than re-encoding back to a raw byte to index a C-style array — `wasmparser` has already
//! done that decoding, so re-deriving it would just be wasted work.

use crate::error::ValType;

/// Which specialized operation variant a two-operand op should emit, chosen by where its two
/// operands currently live.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpVariant {
    /// Register-source, slot-source (stack-top-minus-1 in a register, top in a slot).
    RegSlot,
    /// Slot-source, register-source (top-minus-1 in a slot, top in a register).
    SlotReg,
    /// Both operands in slots.
    SlotSlot,
    /// Both operands in registers — reachable for fp-compare-to-int forms, and for a float store
    /// whose value sits in the fp register while its address sits in the (separate) int register.
    RegReg,
}

/// Static descriptor for one arithmetic/compare/convert opcode.
#[derive(Debug, Clone, Copy)]
pub struct OpDescriptor {
    /// Net change in stack depth this opcode causes (operands consumed minus results produced).
    pub stack_offset: i32,
    /// The type of opcode's result, if it produces one.
    pub result_type: Option<ValType>,
    /// Whether swapping the two operands is valid (lets `SlotReg` collapse into `RegSlot` by
    /// reordering, since `a + b == b + a` but `a - b != b - a`).
    pub commutative: bool,
    /// Name used to build the emitted `ThreadedOp::Named` tag per variant, e.g. `"add"` becomes
    /// `"add_i32_rs"`, `"add_i32_sr"`, `"add_i32_ss"`.
    pub base_name: &'static str,
}

impl OpDescriptor {
    /// Build the concrete operation name for a given operand type and variant, following the
    /// reference table's `_rs`/`_sr`/`_ss`/`_rr` naming.
    pub fn op_name(&self, ty: ValType, variant: OpVariant) -> crate::alloc::String {
        let suffix = match variant {
            OpVariant::RegSlot => "rs",
            OpVariant::SlotReg => "sr",
            OpVariant::SlotSlot => "ss",
            OpVariant::RegReg => "rr",
        };
        crate::alloc::format(format_args!("{}_{}_{}", self.base_name, ty, suffix))
    }
}

/// Decide which [`OpVariant`] a two-operand op should use given where its two top stack entries
/// currently live, per SPEC_FULL.md §4.7.1's selection matrix.
pub fn select_variant(top_minus1_in_register: bool, top_in_register: bool, commutative: bool) -> OpVariant {
    match (top_minus1_in_register, top_in_register) {
        (true, true) => OpVariant::RegReg,
        (false, true) => OpVariant::RegSlot,
        (true, false) => {
            if commutative {
                OpVariant::RegSlot
            } else {
                OpVariant::SlotReg
            }
        }
        (false, false) => OpVariant::SlotSlot,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commutative_collapses_slot_reg_into_reg_slot() {
        assert_eq!(select_variant(true, false, true), OpVariant::RegSlot);
        assert_eq!(select_variant(true, false, false), OpVariant::SlotReg);
    }

    #[test]
    fn both_slots_is_slot_slot() {
        assert_eq!(select_variant(false, false, true), OpVariant::SlotSlot);
    }

    #[test]
    fn op_name_formats_as_expected() {
        let desc = OpDescriptor {
            stack_offset: -1,
            result_type: Some(ValType::I32),
            commutative: true,
            base_name: "add",
        };
        let name = desc.op_name(ValType::I32, OpVariant::RegSlot);
        assert_eq!(name, "add_i32_rs");
    }
}
