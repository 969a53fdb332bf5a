//! C4 — the value stack: the compiler's typed model of the Wasm operand stack during
//! translation, distinct from the runtime stack the emitted code will execute against.
//!
//! Grounded on the teacher's `code_translator.rs` use of a `state` object for `push1`/`pop1`/
//! `peekn`-style operand tracking (the overall shape of "a stack the translator consults on every
//! opcode"), combined with `original_source/source/m3_compile.c`'s `Push`/`PushRegister`/`Pop`/
//! `PopType`/`_PushAllocatedSlotAndEmit` for the exact slot/register bookkeeping this crate's
//! two-parallel-array model needs, which Cranelift's SSA value stack has no counterpart for.

use crate::codepage::CodeEmitter;
use crate::error::{ValType, WasmError, WasmResult};
use crate::registers::{RegisterFile, RegisterKind};
use crate::slots::SlotTable;

/// Where a value-stack entry's storage actually lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Storage {
    /// A real, addressable slot.
    Slot(u32),
    /// The integer or floating-point pseudo-register.
    Register(RegisterKind),
}

/// One entry of the value stack.
#[derive(Debug, Clone, Copy)]
struct Entry {
    ty: ValType,
    storage: Storage,
    /// True for the arguments and declared locals: their slot is never deallocated on pop,
    /// since the local itself keeps living after the value on top of it is consumed.
    is_local: bool,
}

/// The typed operand stack driving every per-opcode compiler.
pub struct ValueStack {
    entries: crate::alloc::Vec<Entry>,
    regs: RegisterFile,
    max_stack_height: u32,
}

impl ValueStack {
    /// An empty value stack, overflowing once it would hold more than `max_stack_height` entries.
    pub fn new(max_stack_height: u32) -> Self {
        ValueStack {
            entries: crate::alloc::Vec::new(),
            regs: RegisterFile::new(),
            max_stack_height,
        }
    }

    /// Current operand-stack depth.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the stack is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn check_height(&self) -> WasmResult<()> {
        if self.entries.len() as u32 >= self.max_stack_height {
            return Err(WasmError::FunctionStackOverflow {
                detail: "value stack depth exceeded max_function_stack_height",
            });
        }
        Ok(())
    }

    /// Push a value already resident in a real slot.
    pub fn push_slot(&mut self, ty: ValType, slot: u32) -> WasmResult<()> {
        self.check_height()?;
        self.entries.push(Entry {
            ty,
            storage: Storage::Slot(slot),
            is_local: false,
        });
        Ok(())
    }

    /// Push a value resident in a local's slot — the slot is not freed when this entry is popped,
    /// since the local continues to exist.
    pub fn push_local_slot(&mut self, ty: ValType, slot: u32) -> WasmResult<()> {
        self.check_height()?;
        self.entries.push(Entry {
            ty,
            storage: Storage::Slot(slot),
            is_local: true,
        });
        Ok(())
    }

    /// Push a value held in the register matching `ty`'s kind, claiming that register for this
    /// stack entry.
    pub fn push_register(&mut self, ty: ValType) -> WasmResult<()> {
        self.check_height()?;
        let kind = register_kind_for(ty);
        let idx = self.entries.len() as u32;
        self.regs.allocate(kind, idx);
        self.entries.push(Entry {
            ty,
            storage: Storage::Register(kind),
            is_local: false,
        });
        Ok(())
    }

    /// Allocate a fresh slot of `ty` and push it, optionally emitting its offset into the code
    /// stream immediately (used by compilers that need the destination slot number emitted right
    /// after the opcode).
    pub fn push_allocated(
        &mut self,
        ty: ValType,
        slots: &mut SlotTable,
        emit: Option<&mut CodeEmitter>,
    ) -> WasmResult<u32> {
        self.check_height()?;
        let slot = slots.allocate(ty)?;
        self.push_slot(ty, slot)?;
        if let Some(emitter) = emit {
            emitter.emit_slot(slot as u16)?;
        }
        Ok(slot)
    }

    /// Type of the entry `offset` positions from the top (0 = top).
    pub fn type_at(&self, offset: usize) -> WasmResult<ValType> {
        let idx = self
            .entries
            .len()
            .checked_sub(1 + offset)
            .ok_or(WasmError::StackUnderrun)?;
        Ok(self.entries[idx].ty)
    }

    /// Storage of the entry `offset` positions from the top (0 = top).
    pub fn storage_at(&self, offset: usize) -> WasmResult<Storage> {
        let idx = self
            .entries
            .len()
            .checked_sub(1 + offset)
            .ok_or(WasmError::StackUnderrun)?;
        Ok(self.entries[idx].storage)
    }

    /// Whether the entry at `offset` from the top is currently held in a register.
    pub fn is_in_register(&self, offset: usize) -> WasmResult<bool> {
        Ok(matches!(self.storage_at(offset)?, Storage::Register(_)))
    }

    /// Change the entry `offset` positions from the top to point at `new_slot` instead of
    /// wherever it currently lives, without emitting anything or touching the slot table — the
    /// caller has already emitted the copy and is just updating the stack's bookkeeping.
    pub fn reroute_at(&mut self, offset: usize, new_slot: u32) {
        let idx = self.entries.len() - 1 - offset;
        if let Storage::Register(kind) = self.entries[idx].storage {
            self.regs.deallocate_if_holds(kind, idx as u32);
        }
        self.entries[idx].storage = Storage::Slot(new_slot);
        self.entries[idx].is_local = false;
    }

    /// Change the entry `offset` positions from the top to be held in its type's register
    /// instead of a slot.
    pub fn reroute_to_register(&mut self, offset: usize) {
        let idx = self.entries.len() - 1 - offset;
        let ty = self.entries[idx].ty;
        let kind = register_kind_for(ty);
        self.regs.allocate(kind, idx as u32);
        self.entries[idx].storage = Storage::Register(kind);
        self.entries[idx].is_local = false;
    }

    /// Pop the top entry, freeing its register or slot (locals are never freed). Fails with
    /// `StackUnderrun` unless `polymorphic` is set, in which case it is a harmless no-op once the
    /// stack has already been unwound to the scope's entry depth.
    pub fn pop(&mut self, slots: &mut SlotTable, polymorphic: bool) -> WasmResult<ValType> {
        match self.entries.pop() {
            Some(entry) => {
                match entry.storage {
                    Storage::Register(kind) => {
                        self.regs
                            .deallocate_if_holds(kind, self.entries.len() as u32);
                    }
                    Storage::Slot(slot) if !entry.is_local => {
                        slots.deallocate(slot, entry.ty);
                    }
                    Storage::Slot(_) => {}
                }
                Ok(entry.ty)
            }
            None if polymorphic => Ok(ValType::I32),
            None => Err(WasmError::StackUnderrun),
        }
    }

    /// Pop the top entry and assert its type matches `expected`, unless polymorphic.
    pub fn pop_type(
        &mut self,
        expected: ValType,
        slots: &mut SlotTable,
        polymorphic: bool,
    ) -> WasmResult<()> {
        if self.entries.is_empty() && polymorphic {
            return Ok(());
        }
        let found = self.pop(slots, polymorphic)?;
        if !self.entries.is_empty() || !polymorphic {
            if found != expected {
                return Err(WasmError::TypeMismatch { expected, found });
            }
        }
        Ok(())
    }

    /// Truncate the stack back to `depth`, freeing registers/slots along the way (used when a
    /// scope becomes polymorphic and its remaining operands must be discarded).
    pub fn truncate_freeing(&mut self, depth: usize, slots: &mut SlotTable) {
        while self.entries.len() > depth {
            let _ = self.pop(slots, true);
        }
    }

    /// Current depth, for snapshotting a scope's entry stack index.
    pub fn depth(&self) -> usize {
        self.entries.len()
    }
}

fn register_kind_for(ty: ValType) -> RegisterKind {
    if ty.is_float() {
        RegisterKind::Fp
    } else {
        RegisterKind::Int
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_pop_round_trip() {
        let mut stack = ValueStack::new(16);
        let mut slots = SlotTable::new(16, false);
        slots.slot_first_dynamic_index = 0;
        stack.push_allocated(ValType::I32, &mut slots, None).unwrap();
        assert_eq!(stack.len(), 1);
        let ty = stack.pop(&mut slots, false).unwrap();
        assert_eq!(ty, ValType::I32);
        assert_eq!(stack.len(), 0);
    }

    #[test]
    fn underrun_without_polymorphic() {
        let mut stack = ValueStack::new(16);
        let mut slots = SlotTable::new(16, false);
        assert!(stack.pop(&mut slots, false).is_err());
    }

    #[test]
    fn underrun_is_absorbed_when_polymorphic() {
        let mut stack = ValueStack::new(16);
        let mut slots = SlotTable::new(16, false);
        assert!(stack.pop(&mut slots, true).is_ok());
    }

    #[test]
    fn register_push_claims_the_matching_register() {
        let mut stack = ValueStack::new(16);
        stack.push_register(ValType::I32).unwrap();
        assert!(stack.is_in_register(0).unwrap());
        let mut slots = SlotTable::new(16, false);
        stack.pop(&mut slots, false).unwrap();
    }

    #[test]
    fn push_beyond_max_height_overflows() {
        let mut stack = ValueStack::new(1);
        let mut slots = SlotTable::new(16, false);
        slots.slot_first_dynamic_index = 0;
        stack.push_allocated(ValType::I32, &mut slots, None).unwrap();
        assert!(matches!(
            stack.push_allocated(ValType::I32, &mut slots, None),
            Err(WasmError::FunctionStackOverflow { .. })
        ));
    }
}
