//! C5 — the constant pool: interns numeric constants into a dedicated low-slot range, falling
//! back to inline immediates once that range is exhausted.
//!
//! Grounded on `original_source/source/m3_compile.c`'s `PushConst` (linear dedup scan, constant
//! slot allocation, inline-immediate overflow path) and the raw-byte constant-count pre-scan
//! discussed in SPEC_FULL.md §4.5 / §10.

use crate::codepage::CodeEmitter;
use crate::error::{ValType, WasmResult};
use crate::ops::{CodeCell, ThreadedOp};
use crate::slots::SlotTable;
use crate::value_stack::ValueStack;

/// One interned constant: its bit pattern (sign/bit-extended into a `u64`), its type, and the
/// slot it lives in.
struct Interned {
    bits: u64,
    ty: ValType,
    slot: u32,
}

/// Per-function constant pool.
pub struct ConstantPool {
    interned: crate::alloc::Vec<Interned>,
}

impl ConstantPool {
    /// An empty pool.
    pub fn new() -> Self {
        ConstantPool {
            interned: crate::alloc::Vec::new(),
        }
    }

    fn find(&self, bits: u64, ty: ValType) -> Option<u32> {
        self.interned
            .iter()
            .find(|c| c.ty == ty && c.bits == bits)
            .map(|c| c.slot)
    }

    /// Push a constant onto the value stack, interning it into the pool if there's room, or
    /// falling back to an inline immediate emission if the pool has overflowed.
    ///
    /// `expr_mode`: true when compiling a constant expression (global initializer) with no code
    /// page to emit into — in that case this is a pure value-stack push with no slot at all.
    pub fn push_const(
        &mut self,
        bits: u64,
        ty: ValType,
        stack: &mut ValueStack,
        slots: &mut SlotTable,
        emitter: Option<&mut CodeEmitter>,
    ) -> WasmResult<()> {
        if let Some(existing) = self.find(bits, ty) {
            log::trace!("constant pool hit for {:?} bits={:#x} -> slot {}", ty, bits, existing);
            return stack.push_slot(ty, existing);
        }

        match slots.allocate_constant(ty) {
            Ok(slot) => {
                self.interned.push(Interned { bits, ty, slot });
                log::debug!("interned constant {:?} bits={:#x} into slot {}", ty, bits, slot);
                stack.push_slot(ty, slot)
            }
            Err(_) => {
                log::warn!(
                    "constant pool overflow ({} slots) for {:?}, falling back to inline immediate",
                    self.interned.len(),
                    ty
                );
                self.push_inline(bits, ty, stack, slots, emitter)
            }
        }
    }

    fn push_inline(
        &mut self,
        bits: u64,
        ty: ValType,
        stack: &mut ValueStack,
        slots: &mut SlotTable,
        emitter: Option<&mut CodeEmitter>,
    ) -> WasmResult<()> {
        let dest = stack.push_allocated(ty, slots, None)?;
        if let Some(emitter) = emitter {
            let n = ty.num_slots(false);
            if n == 1 {
                emitter.emit_op(ThreadedOp::Named(crate::alloc::format(format_args!("const_32"))))?;
                emitter.emit_imm32(bits as i32)?;
            } else {
                emitter.emit_op(ThreadedOp::Named(crate::alloc::format(format_args!("const_64"))))?;
                emitter.emit_imm64(bits as i64)?;
            }
            emitter.emit_slot(dest as u16)?;
        }
        Ok(())
    }

    /// Number of constants currently interned (for the overflow-boundary test and logging).
    pub fn len(&self) -> usize {
        self.interned.len()
    }

    /// Whether the pool has no interned constants.
    pub fn is_empty(&self) -> bool {
        self.interned.is_empty()
    }

    /// Copy the pool's backing bytes out for the compiled function to own, at the given slot
    /// width. Slot `i` (relative to `slot_first_const_index`) occupies bytes `[i*width, (i+1)*width)`.
    pub fn to_bytes(&self, slot_first_const_index: u32, width: usize) -> crate::alloc::Vec<u8> {
        let max_slot = self
            .interned
            .iter()
            .map(|c| c.slot + c.ty.num_slots(width == 4))
            .max()
            .unwrap_or(slot_first_const_index);
        let num_slots = max_slot.saturating_sub(slot_first_const_index);
        let mut bytes = crate::alloc::vec![0u8; num_slots as usize * width];
        for c in &self.interned {
            let rel = (c.slot - slot_first_const_index) as usize * width;
            let b = c.bits.to_le_bytes();
            bytes[rel..rel + width].copy_from_slice(&b[..width]);
        }
        bytes
    }
}

impl Default for ConstantPool {
    fn default() -> Self {
        Self::new()
    }
}

/// Pre-scan a function body for constant opcodes and return an upper bound on the number of
/// distinct constant slots to pre-reserve, capped at `max_constant_table_size`.
///
/// Deliberately a raw byte scan rather than a real decode (SPEC_FULL.md §4.5/§10): it can over- or
/// under-count when a constant opcode byte happens to appear inside a preceding instruction's
/// LEB128-encoded immediate. An overestimate only wastes slot space; an undercount degrades
/// gracefully to the inline-immediate fallback above, never to incorrect codegen.
pub fn estimate_constant_slots(body: &[u8], max_constant_table_size: u32) -> u32 {
    let mut count = 0u32;
    for &byte in body {
        match byte {
            0x41 | 0x42 | 0x43 | 0x44 => count += 1, // i32.const / i64.const / f32.const / f64.const
            _ => {}
        }
        if count >= max_constant_table_size {
            return max_constant_table_size;
        }
    }
    count
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_constants_share_a_slot() {
        let mut pool = ConstantPool::new();
        let mut slots = SlotTable::new(16, false);
        slots.slot_first_const_index = 0;
        slots.slot_max_const_index = 8;
        slots.slot_first_dynamic_index = 8;
        let mut stack = ValueStack::new(16);
        pool.push_const(7, ValType::I32, &mut stack, &mut slots, None)
            .unwrap();
        pool.push_const(7, ValType::I32, &mut stack, &mut slots, None)
            .unwrap();
        assert_eq!(pool.len(), 1);
        assert_eq!(stack.storage_at(0).unwrap(), stack.storage_at(1).unwrap());
    }

    #[test]
    fn pre_scan_caps_at_max_table_size() {
        let body = crate::alloc::vec![0x41u8; 100];
        assert_eq!(estimate_constant_slots(&body, 10), 10);
    }
}
