//! C8 (per-opcode compilers) and C9 (function driver): the heart of the crate.
//!
//! The overall match-and-dispatch shape is grounded on the teacher's
//! `cranelift-wasm/src/code_translator.rs::translate_operator` — one `match` arm per
//! `wasmparser::Operator` variant, threading a mutable translation state through each arm. Where
//! the teacher's arm builds Cranelift IR instructions, this crate's arm instead mutates the value
//! stack / slot table / register model and emits threaded-code cells, following
//! `original_source/source/m3_compile.c`'s `Compile_*` functions for the exact algorithm (see
//! DESIGN.md for the per-arm grounding).

use crate::codepage::{CodeAddr, CodeEmitter, CodePageAllocator};
use crate::config::CompilerConfig;
use crate::constants::{estimate_constant_slots, ConstantPool};
use crate::dispatch::{select_variant, OpVariant};
use crate::environ::FuncEnvironment;
use crate::error::{ValType, WasmError, WasmResult};
use crate::ops::ThreadedOp;
use crate::registers::RegisterKind;
use crate::scopes::{ScopeKind, ScopeStack};
use crate::slots::SlotTable;
use crate::translation_utils::{FuncIndex, FuncType, GlobalIndex, TableIndex, TypeIndex};
use crate::value_stack::{Storage, ValueStack};
use wasmparser::Operator;

/// Everything `compile_function` hands back to the caller: the external interface named in
/// SPEC_FULL.md §6.
pub struct CompiledFunction {
    /// Entry point of the compiled code, to be recorded as `function.compiled`.
    pub entry: CodeAddr,
    /// Owned constant-pool bytes (`function.constants`).
    pub constants: crate::alloc::Vec<u8>,
    /// `function.num_constant_bytes`.
    pub num_constant_bytes: u32,
    /// `function.num_local_bytes`.
    pub num_local_bytes: u32,
    /// `function.num_ret_slots`.
    pub num_ret_slots: u32,
    /// `function.num_ret_and_arg_slots`.
    pub num_ret_and_arg_slots: u32,
    /// `function.max_stack_slots`.
    pub max_stack_slots: u32,
}

/// One local declared by the function's locals section, or implicitly by its argument list.
#[derive(Debug, Clone, Copy)]
struct LocalSlot {
    ty: ValType,
    slot: u32,
}

/// Owns all per-function compilation state and drives the opcode loop. `!Sync` by construction
/// (it borrows the allocator and environment for its whole lifetime); concurrent compilation of
/// independent functions means independent `FunctionCompiler`s over independent allocators
/// (SPEC_FULL.md §5).
pub struct FunctionCompiler<'a> {
    config: CompilerConfig,
    emitter: CodeEmitter<'a>,
    stack: ValueStack,
    slots: SlotTable,
    scopes: ScopeStack,
    constants: ConstantPool,
    locals: crate::alloc::Vec<LocalSlot>,
    func_type: FuncType,
    environ: &'a mut dyn FuncEnvironment,
}

const REG0_ALIAS_NOTE: &str = "register aliasing is modeled by Storage::Register, not a sentinel slot number, in this port";

impl<'a> FunctionCompiler<'a> {
    fn new(
        allocator: &'a mut dyn CodePageAllocator,
        config: CompilerConfig,
        func_type: FuncType,
        environ: &'a mut dyn FuncEnvironment,
    ) -> WasmResult<Self> {
        let _ = REG0_ALIAS_NOTE;
        let emitter = CodeEmitter::new(allocator, 64, config.enable_code_page_ref_counting)?;
        Ok(FunctionCompiler {
            slots: SlotTable::new(config.max_function_slots, config.use_32_bit_slots),
            config,
            emitter,
            stack: ValueStack::new(config.max_function_stack_height),
            scopes: ScopeStack::new(),
            constants: ConstantPool::new(),
            locals: crate::alloc::Vec::new(),
            func_type,
            environ,
        })
    }

    fn polymorphic(&self) -> bool {
        self.scopes.is_polymorphic()
    }

    // ---- C9: function driver -------------------------------------------------------------

    /// Drive the full 10-step compilation sequence from SPEC_FULL.md §4.8.
    fn compile(
        &mut self,
        locals_decl: &[(u32, ValType)],
        body_bytes: &[u8],
        body: &mut wasmparser::OperatorsReader,
    ) -> WasmResult<CompiledFunction> {
        // Step 2: reserve return slots.
        let mut next_slot = 0u32;
        for _ in 0..self
            .func_type
            .results
            .iter()
            .map(|t| t.num_slots(self.config.use_32_bit_slots))
            .sum::<u32>()
        {
            self.slots.mark_allocated(next_slot, ValType::I32);
            next_slot += 1;
        }
        let num_ret_slots = next_slot;

        // Step 3: argument slots.
        for &ty in self.func_type.params.clone().iter() {
            let n = ty.num_slots(self.config.use_32_bit_slots);
            let slot = next_slot;
            self.slots.mark_allocated(slot, ty);
            self.locals.push(LocalSlot { ty, slot });
            self.stack.push_local_slot(ty, slot)?;
            self.stack.pop(&mut self.slots, false)?; // args are not live on entry to the body
            next_slot += n;
        }
        self.slots.slot_first_dynamic_index = next_slot;
        let num_ret_and_arg_slots = next_slot;

        // Step 4: freeze locals start.
        self.slots.slot_first_local_index = next_slot;

        // Step 5: CompileLocals.
        for &(count, ty) in locals_decl {
            for _ in 0..count {
                let slot = self
                    .slots
                    .allocate_within_range(ty, self.slots.slot_first_local_index, self.config.max_function_slots)?;
                self.locals.push(LocalSlot { ty, slot });
            }
        }
        self.slots.slot_first_dynamic_index = self.slots.high_water();

        // Step 6/7: constant pool reservation pre-scan.
        let estimated = estimate_constant_slots(body_bytes, self.config.max_constant_table_size);
        self.slots.slot_first_const_index = self.slots.slot_first_dynamic_index;
        self.slots.slot_max_const_index = self.slots.slot_first_const_index + estimated;
        self.slots.slot_first_dynamic_index = self.slots.slot_max_const_index;
        log::debug!("reserved constant slots: {}", estimated);

        // Step 8: entry emission.
        let entry = self.emitter.here();
        self.emitter.emit_op(ThreadedOp::Entry)?;
        self.scopes.enter(
            ScopeKind::Function,
            self.func_type.results.clone(),
            self.stack.depth(),
            0,
            entry,
        );

        // Step 9: drive the statement loop.
        self.compile_block_statements(body, false)?;

        // Step 10: finalize.
        self.slots.compact_high_water();
        let num_local_bytes =
            (self.slots.slot_first_dynamic_index - self.slots.slot_first_local_index) * self.config.slot_width_bytes() as u32;
        let const_bytes = self.constants.to_bytes(self.slots.slot_first_const_index, self.config.slot_width_bytes());
        let num_constant_bytes = const_bytes.len() as u32;

        Ok(CompiledFunction {
            entry,
            constants: const_bytes,
            num_constant_bytes,
            num_local_bytes,
            num_ret_slots,
            num_ret_and_arg_slots,
            max_stack_slots: self.slots.slot_max_allocated_index_plus_one,
        })
    }

    /// CompileBlockStatements: drives opcodes until the scope's matching `end` (or `else`, for an
    /// `if` scope). `restricted` selects constant-expression mode (global initializers), which
    /// only admits `*.const`, `global.get`, and `end`.
    fn compile_block_statements(
        &mut self,
        body: &mut wasmparser::OperatorsReader,
        restricted: bool,
    ) -> WasmResult<()> {
        loop {
            let op = body
                .read()
                .map_err(|_| WasmError::WasmMalformed { detail: "failed to decode operator" })?;
            log::trace!("opcode {:?} stack_depth={}", op, self.stack.depth());

            if restricted {
                match op {
                    Operator::I32Const { .. }
                    | Operator::I64Const { .. }
                    | Operator::F32Const { .. }
                    | Operator::F64Const { .. }
                    | Operator::GetGlobal { .. }
                    | Operator::End => {}
                    _ => return Err(WasmError::RestrictedOpcode { opcode: 0 }),
                }
            }

            let is_end = matches!(op, Operator::End);
            let is_else = matches!(op, Operator::Else);
            self.compile_operator(op, body)?;
            if is_end || is_else {
                return Ok(());
            }
        }
    }

    // ---- C8: per-opcode compilers ----------------------------------------------------------

    fn compile_operator(&mut self, op: Operator, body: &mut wasmparser::OperatorsReader) -> WasmResult<()> {
        match op {
            Operator::Nop => Ok(()),
            Operator::Unreachable => {
                self.emitter.emit_op(ThreadedOp::Unreachable)?;
                self.scopes.set_polymorphic();
                Ok(())
            }
            Operator::Drop => {
                let __poly = self.polymorphic();
                self.stack.pop(&mut self.slots, __poly)?;
                Ok(())
            }

            Operator::GetLocal { local_index } => self.compile_local_get(local_index),
            Operator::SetLocal { local_index } => self.compile_local_set(local_index, false),
            Operator::TeeLocal { local_index } => self.compile_local_set(local_index, true),

            Operator::GetGlobal { global_index } => self.compile_global_get(global_index),
            Operator::SetGlobal { global_index } => self.compile_global_set(global_index),

            Operator::I32Const { value } => self.compile_const(value as i64 as u64, ValType::I32),
            Operator::I64Const { value } => self.compile_const(value as u64, ValType::I64),
            Operator::F32Const { value } => self.compile_const(u64::from(value.bits()), ValType::F32),
            Operator::F64Const { value } => self.compile_const(value.bits(), ValType::F64),

            Operator::Block { ty } => self.compile_block(ty, ScopeKind::Block, body),
            Operator::Loop { ty } => self.compile_block(ty, ScopeKind::Loop, body),
            Operator::If { ty } => self.compile_if(ty, body),
            Operator::Else => self.compile_else(),
            Operator::End => self.compile_end(),

            Operator::Br { relative_depth } => self.compile_br(relative_depth),
            Operator::BrIf { relative_depth } => self.compile_br_if(relative_depth),
            Operator::BrTable { table } => self.compile_br_table(table),
            Operator::Return => self.compile_return(),

            Operator::Call { function_index } => self.compile_call(function_index),
            Operator::CallIndirect { index, table_index } => self.compile_call_indirect(index, table_index),

            Operator::Select => self.compile_select(),
            Operator::MemorySize { .. } => self.compile_memory_size(),
            Operator::MemoryGrow { .. } => self.compile_memory_grow(),

            // Generic arithmetic / compare / conversion surface: §4.7.1 / §4.7.9.
            _ => self.compile_generic(op),
        }
    }

    fn local(&self, index: u32) -> WasmResult<LocalSlot> {
        self.locals
            .get(index as usize)
            .copied()
            .ok_or(WasmError::LocalIndexOutOfBounds {
                index,
                num_locals: self.locals.len() as u32,
            })
    }

    fn compile_local_get(&mut self, index: u32) -> WasmResult<()> {
        let local = self.local(index)?;
        self.stack.push_local_slot(local.ty, local.slot)?;
        Ok(())
    }

    /// `local.set` / `local.tee`: preserve any still-live value-stack copies of the target local
    /// before overwriting it (SPEC_FULL.md §4.7.2).
    fn compile_local_set(&mut self, index: u32, is_tee: bool) -> WasmResult<()> {
        let local = self.local(index)?;
        self.preserve_aliases_of(local.slot, local.ty)?;

        let ty = self.stack.type_at(0)?;
        if ty != local.ty {
            return Err(WasmError::TypeMismatch {
                expected: local.ty,
                found: ty,
            });
        }
        let source_in_register = self.stack.is_in_register(0)?;
        let suffix = if source_in_register { "r" } else { "s" };
        self.emitter
            .emit_op(ThreadedOp::Named(crate::alloc::format(format_args!("copy_{}_{}", local.ty, suffix))))?;
        self.emitter.emit_slot(local.slot as u16)?;
        let __poly = self.polymorphic();
        self.stack.pop(&mut self.slots, __poly)?;

        if is_tee {
            // value remains on the stack, now aliased to the local's slot
            self.stack.push_local_slot(local.ty, local.slot)?;
        }
        Ok(())
    }

    /// Walk the live portion of the value stack and reroute any entry still pointing at `slot`
    /// to a freshly allocated preservation slot, emitting the copy. Mirrors `m3_compile.c`'s
    /// `FindReferencedLocalWithinCurrentBlock` + preserve-on-write.
    fn preserve_aliases_of(&mut self, slot: u32, ty: ValType) -> WasmResult<()> {
        let depth = self.stack.depth();
        for i in 0..depth {
            if let Ok(Storage::Slot(s)) = self.stack.storage_at(depth - 1 - i) {
                if s == slot {
                    let fresh = self.slots.allocate(ty)?;
                    log::trace!("preserving local slot {} into {}", slot, fresh);
                    self.emitter.emit_op(ThreadedOp::Named(crate::alloc::format(format_args!(
                        "preserve_copy_{}",
                        ty
                    ))))?;
                    self.emitter.emit_slot(slot as u16)?;
                    self.emitter.emit_slot(fresh as u16)?;
                    self.stack.reroute_at(depth - 1 - i, fresh);
                }
            }
        }
        Ok(())
    }

    fn compile_global_get(&mut self, index: u32) -> WasmResult<()> {
        let g = self.environ.global(GlobalIndex::from_u32(index))?;
        self.stack.push_allocated(g.ty, &mut self.slots, Some(&mut self.emitter))?;
        self.emitter.emit_op(ThreadedOp::Named(crate::alloc::format(format_args!("get_global_{}", g.ty))))?;
        Ok(())
    }

    fn compile_global_set(&mut self, index: u32) -> WasmResult<()> {
        let g = self.environ.global(GlobalIndex::from_u32(index))?;
        if !g.mutable {
            return Err(WasmError::SettingImmutableGlobal { index });
        }
        let __poly = self.polymorphic();
        self.stack.pop_type(g.ty, &mut self.slots, __poly)?;
        self.emitter.emit_op(ThreadedOp::Named(crate::alloc::format(format_args!("set_global_{}", g.ty))))?;
        Ok(())
    }

    fn compile_const(&mut self, bits: u64, ty: ValType) -> WasmResult<()> {
        self.constants.push_const(bits, ty, &mut self.stack, &mut self.slots, Some(&mut self.emitter))
    }

    // ---- control flow --------------------------------------------------------------------

    fn block_result_types(&self, ty: wasmparser::TypeOrFuncType) -> crate::alloc::Vec<ValType> {
        match ty {
            wasmparser::TypeOrFuncType::Type(wasmparser::Type::EmptyBlockType) => crate::alloc::Vec::new(),
            wasmparser::TypeOrFuncType::Type(t) => {
                crate::translation_utils::type_to_val_type(t).into_iter().collect()
            }
            wasmparser::TypeOrFuncType::FuncType(idx) => self
                .environ
                .type_at(TypeIndex::from_u32(idx))
                .map(|ft| ft.results)
                .unwrap_or_default(),
        }
    }

    /// Reroute every live stack entry currently held in `kind`'s register into a fresh slot.
    /// Mirrors `m3_compile.c`'s `PreserveRegisterIfOccupied`.
    fn preserve_register_of_kind(&mut self, kind: RegisterKind) -> WasmResult<()> {
        let depth = self.stack.depth();
        for i in 0..depth {
            if matches!(self.stack.storage_at(i), Ok(Storage::Register(k)) if k == kind) {
                let ty = self.stack.type_at(i)?;
                let fresh = self.slots.allocate(ty)?;
                self.emitter.emit_op(ThreadedOp::Named(crate::alloc::format(format_args!(
                    "set_slot_{}",
                    ty
                ))))?;
                self.emitter.emit_slot(fresh as u16)?;
                self.stack.reroute_at(i, fresh);
            }
        }
        Ok(())
    }

    fn preserve_registers(&mut self) -> WasmResult<()> {
        self.preserve_register_of_kind(RegisterKind::Int)?;
        self.preserve_register_of_kind(RegisterKind::Fp)?;
        Ok(())
    }

    /// Preserve every arg/local whose slot is still aliased somewhere on the live value stack,
    /// so identity holds across the block/loop boundary being entered. Mirrors `m3_compile.c`'s
    /// `PreserveArgsAndLocals`, called from `Compile_LoopOrBlock`/`Compile_If` right after
    /// `PreserveRegisters`.
    fn preserve_args_and_locals(&mut self) -> WasmResult<()> {
        let locals = self.locals.clone();
        for local in locals {
            self.preserve_aliases_of(local.slot, local.ty)?;
        }
        Ok(())
    }

    fn compile_block(&mut self, ty: wasmparser::TypeOrFuncType, kind: ScopeKind, body: &mut wasmparser::OperatorsReader) -> WasmResult<()> {
        self.preserve_registers()?;
        self.preserve_args_and_locals()?;
        let results = self.block_result_types(ty);
        let top_slot = self.slots.high_water();
        let entry_pc = self.emitter.here();
        if matches!(kind, ScopeKind::Loop) {
            self.emitter.emit_op(ThreadedOp::Loop)?;
        }
        self.scopes.enter(kind, results, self.stack.depth(), top_slot, entry_pc);
        self.compile_block_statements(body, false)
    }

    fn compile_if(&mut self, ty: wasmparser::TypeOrFuncType, body: &mut wasmparser::OperatorsReader) -> WasmResult<()> {
        self.preserve_registers()?;
        self.preserve_args_and_locals()?;
        let __poly = self.polymorphic();
        self.stack.pop_type(ValType::I32, &mut self.slots, __poly)?;
        self.emitter.emit_op(ThreadedOp::IfS)?;
        let patch = self.emitter.reserve_ptr()?;

        let results = self.block_result_types(ty);
        let top_slot = self.slots.high_water();
        let entry_pc = self.emitter.here();
        self.scopes.enter(ScopeKind::If, results, self.stack.depth(), top_slot, entry_pc);
        // reuse the scope's first patch slot as the else/end redirect
        self.scopes.current_mut().unwrap().add_patch(patch);
        self.compile_block_statements(body, false)
    }

    fn compile_else(&mut self) -> WasmResult<()> {
        // resolve the `then` arm's results without committing (the `else` arm recomputes its own)
        let scope = self.scopes.leave().expect("else without matching if");
        self.resolve_block_results(&scope.result_types, scope.top_slot, false)?;
        self.stack.truncate_freeing(scope.init_stack_index, &mut self.slots);

        let post_then_pc = self.emitter.here();
        for patch in &scope.patches {
            self.emitter.patch(patch.at, post_then_pc);
        }
        self.scopes.enter(ScopeKind::Else, scope.result_types, scope.init_stack_index, scope.top_slot, post_then_pc);
        Ok(())
    }

    fn compile_end(&mut self) -> WasmResult<()> {
        let scope = self.scopes.leave().expect("end without matching scope");
        self.validate_block_end(&scope)?;
        self.resolve_block_results(&scope.result_types, scope.top_slot, true)?;

        let here = self.emitter.here();
        for patch in &scope.patches {
            self.emitter.patch(patch.at, here);
        }
        Ok(())
    }

    /// SPEC_FULL.md §4.7.4's `end`-time validation: the stack present at block exit must match
    /// the scope's declared result count and types (absorbing slack when the scope is
    /// polymorphic). Open Question 2 (DESIGN.md): implemented for real, not left commented out.
    fn validate_block_end(&self, scope: &crate::scopes::Scope) -> WasmResult<()> {
        let produced = self.stack.depth().saturating_sub(scope.init_stack_index);
        if scope.is_polymorphic {
            return Ok(());
        }
        if produced != scope.result_types.len() {
            return Err(WasmError::TypeCountMismatch {
                produced,
                expected: scope.result_types.len(),
            });
        }
        for (i, expected) in scope.result_types.iter().rev().enumerate() {
            let found = self.stack.type_at(i)?;
            if found != *expected {
                return Err(WasmError::TypeMismatch {
                    expected: *expected,
                    found,
                });
            }
        }
        Ok(())
    }

    /// SPEC_FULL.md §4.7.6: resolve the top `result_types.len()` stack entries into contiguous
    /// slots starting at `top_slot`, keeping a trailing float result in the fp register. When
    /// `commit` is false, the source stack entries are left as they were (used by branch paths
    /// that must preserve fallthrough).
    fn resolve_block_results(&mut self, result_types: &[ValType], top_slot: u32, commit: bool) -> WasmResult<()> {
        let k = result_types.len();
        if k == 0 {
            return Ok(());
        }
        if self.stack.depth() < k {
            // polymorphic scope with fewer real values than declared results: nothing to move.
            return Ok(());
        }

        let keep_in_fp = result_types[k - 1].is_float();
        let move_count = if keep_in_fp { k - 1 } else { k };

        if keep_in_fp && !matches!(self.stack.storage_at(0), Ok(Storage::Register(RegisterKind::Fp))) {
            let ty = self.stack.type_at(0)?;
            self.emitter.emit_op(ThreadedOp::Named(crate::alloc::format(format_args!("set_reg_{}", ty))))?;
            self.stack.reroute_to_register(0);
        }

        // Build (offset-from-top, dest slot) pairs for the entries that must move into slots.
        let mut dest_slot = top_slot;
        let mut plan: crate::alloc::Vec<(usize, u32, ValType)> = crate::alloc::Vec::new();
        for i in (0..move_count).rev() {
            let offset = k - 1 - i;
            let ty = self.stack.type_at(offset)?;
            plan.push((offset, dest_slot, ty));
            dest_slot += ty.num_slots(self.config.use_32_bit_slots);
        }

        // Snapshot occupancy so we can detect and break destination/source collisions, mirroring
        // `MoveStackSlotsR`'s recursive permutation. Collisions are resolved by staging the
        // occupant into a temporary slot above the current high-water mark first.
        let mut placed = crate::alloc::Vec::new();
        for (offset, dest, ty) in plan.iter().copied() {
            let src = self.stack.storage_at(offset)?;
            if src == Storage::Slot(dest) {
                placed.push((offset, dest, ty));
                continue;
            }
            // if dest is currently occupied by a not-yet-moved source later in this same plan,
            // stage that occupant into a temp slot first.
            if let Some(conflict) = plan.iter().find(|(o, _, _)| {
                *o != offset && matches!(self.stack.storage_at(*o), Ok(Storage::Slot(s)) if s == dest)
            }) {
                let (conflict_offset, _, conflict_ty) = *conflict;
                let temp = self.slots.allocate(conflict_ty)?;
                log::trace!("staging colliding result at slot {} to temp {}", dest, temp);
                self.emitter.emit_op(ThreadedOp::Named(crate::alloc::format(format_args!("copy_{}_s", conflict_ty))))?;
                self.emitter.emit_slot(temp as u16)?;
                self.stack.reroute_at(conflict_offset, temp);
            }
            let variant_suffix = if matches!(src, Storage::Register(_)) { "r" } else { "s" };
            self.emitter.emit_op(ThreadedOp::Named(crate::alloc::format(format_args!("copy_{}_{}", ty, variant_suffix))))?;
            self.emitter.emit_slot(dest as u16)?;
            placed.push((offset, dest, ty));
        }

        if commit {
            for (offset, dest, ty) in placed {
                self.stack.reroute_at(offset, dest);
                let _ = ty;
            }
        }
        Ok(())
    }

    fn compile_br(&mut self, depth: u32) -> WasmResult<()> {
        let scope = self
            .scopes
            .at_depth(depth)
            .ok_or(WasmError::InvalidBlockDepth { depth, max_depth: self.scopes.depth() })?;
        if matches!(scope.kind, ScopeKind::Loop) {
            let target = scope.entry_pc;
            self.emitter.emit_op(ThreadedOp::ContinueLoop)?;
            self.emitter.emit_ptr(target)?;
        } else {
            let results = scope.result_types.clone();
            let top_slot = scope.top_slot;
            self.resolve_block_results(&results, top_slot, false)?;
            self.emitter.emit_op(ThreadedOp::Branch)?;
            let patch = self.emitter.reserve_ptr()?;
            self.scopes.at_depth_mut(depth).unwrap().add_patch(patch);
        }
        self.scopes.set_polymorphic();
        Ok(())
    }

    fn compile_br_if(&mut self, depth: u32) -> WasmResult<()> {
        let __poly = self.polymorphic();
        self.stack.pop_type(ValType::I32, &mut self.slots, __poly)?;
        self.emitter.emit_op(ThreadedOp::BranchIfPrologueS)?;
        let skip_patch = self.emitter.reserve_ptr()?;
        self.compile_br(depth)?;
        // br_if's branch does not make the enclosing scope polymorphic: it is conditional.
        if let Some(s) = self.scopes.current_mut() {
            s.is_polymorphic = false;
        }
        let here = self.emitter.here();
        self.emitter.patch(skip_patch, here);
        Ok(())
    }

    fn compile_br_table(&mut self, table: wasmparser::BrTable) -> WasmResult<()> {
        // the index shares the int register with ordinary i32 operands; preserve whatever
        // currently occupies it before consuming the index, per Compile_BranchTable's
        // `PreserveRegisterIfOccupied(o, c_m3Type_i64)`.
        self.preserve_register_of_kind(RegisterKind::Int)?;
        let __poly = self.polymorphic();
        self.stack.pop_type(ValType::I32, &mut self.slots, __poly)?;

        let (raw_depths, default) = table
            .read_table()
            .map_err(|_| WasmError::WasmMalformed { detail: "malformed br_table" })?;
        let mut depths: crate::alloc::Vec<u32> = raw_depths.iter().copied().collect();
        depths.push(default);

        self.emitter.emit_op(ThreadedOp::Named(crate::alloc::format(format_args!("br_table"))))?;
        self.emitter.emit_imm32(depths.len() as i32)?;

        // Reserve the whole pointer table up front (its cells must be contiguous right after the
        // target count), then patch each slot once its target — direct for a loop, or a small
        // trampoline resolving block results first — is known.
        let mut table_slots = crate::alloc::Vec::new();
        for _ in &depths {
            table_slots.push(self.emitter.reserve_ptr()?);
        }

        for (table_slot, depth) in table_slots.into_iter().zip(depths) {
            let scope = self
                .scopes
                .at_depth(depth)
                .ok_or(WasmError::InvalidBlockDepth { depth, max_depth: self.scopes.depth() })?;
            if matches!(scope.kind, ScopeKind::Loop) {
                let target = scope.entry_pc;
                self.emitter.patch(table_slot, target);
            } else {
                // a forward branch to a result-bearing block must copy its operands into the
                // target's slots before patching the branch, just like `compile_br` — emitted here
                // as a small trampoline mirroring the reference's per-target continuation page.
                let results = scope.result_types.clone();
                let top_slot = scope.top_slot;
                let trampoline_pc = self.emitter.here();
                self.resolve_block_results(&results, top_slot, false)?;
                self.emitter.emit_op(ThreadedOp::Branch)?;
                let placeholder = self.emitter.reserve_ptr()?;
                self.scopes.at_depth_mut(depth).unwrap().add_patch(placeholder);
                self.emitter.patch(table_slot, trampoline_pc);
            }
        }
        self.scopes.set_polymorphic();
        Ok(())
    }

    fn compile_return(&mut self) -> WasmResult<()> {
        let results = self.func_type.results.clone();
        self.resolve_block_results(&results, 0, false)?;
        self.emitter.emit_op(ThreadedOp::Return)?;
        self.scopes.set_polymorphic();
        Ok(())
    }

    // ---- calls -----------------------------------------------------------------------------

    /// Compute the call-frame base: 64-bit-aligned, and at least slot 1 so a Wasm-level
    /// `FunctionStackOverflow` is detected before any native-stack overflow could occur
    /// (SPEC_FULL.md §10).
    fn call_frame_base(&self) -> u32 {
        let hw = self.slots.high_water();
        if hw < 1 {
            1
        } else {
            hw
        }
    }

    fn compile_call_args(&mut self, params: &[ValType]) -> WasmResult<u32> {
        let base = self.call_frame_base();
        let mut offset = 0u32;
        let mut dests = crate::alloc::Vec::new();
        for ty in params {
            dests.push((offset, *ty));
            offset += ty.num_slots(self.config.use_32_bit_slots);
        }
        for (slot_offset, ty) in dests.into_iter().rev() {
            let __poly = self.polymorphic();
            self.stack.pop_type(ty, &mut self.slots, __poly)?;
            let dest = base + slot_offset;
            self.emitter.emit_op(ThreadedOp::Named(crate::alloc::format(format_args!("copy_{}_arg", ty))))?;
            self.emitter.emit_slot(dest as u16)?;
        }
        Ok(base)
    }

    fn compile_call(&mut self, func_index: u32) -> WasmResult<()> {
        let func_type = self.environ.func_type_of(FuncIndex::from_u32(func_index))?;
        let base = self.compile_call_args(&func_type.params)?;
        self.emitter.emit_op(ThreadedOp::Call)?;
        self.emitter.emit_ptr(CodeAddr { page: 0, offset: func_index })?;
        self.emitter.emit_slot(base as u16)?;
        for ty in &func_type.results {
            self.stack.push_allocated(*ty, &mut self.slots, Some(&mut self.emitter))?;
        }
        Ok(())
    }

    fn compile_call_indirect(&mut self, type_index: u32, table_index: u32) -> WasmResult<()> {
        if !self.environ.has_table(TableIndex::from_u32(table_index)) {
            return Err(WasmError::FunctionLookupFailed { index: table_index });
        }
        let func_type = self.environ.type_at(TypeIndex::from_u32(type_index))?;
        let __poly = self.polymorphic();
        self.stack.pop_type(ValType::I32, &mut self.slots, __poly)?;
        let table_slot = self.slots.allocate(ValType::I32)?;
        self.emitter.emit_op(ThreadedOp::Named(crate::alloc::format(format_args!("copy_i32_s"))))?;
        self.emitter.emit_slot(table_slot as u16)?;

        let base = self.compile_call_args(&func_type.params)?;
        self.emitter.emit_op(ThreadedOp::CallIndirect)?;
        self.emitter.emit_slot(table_slot as u16)?;
        self.emitter.emit_imm32(type_index as i32)?;
        self.emitter.emit_slot(base as u16)?;
        for ty in &func_type.results {
            self.stack.push_allocated(*ty, &mut self.slots, Some(&mut self.emitter))?;
        }
        Ok(())
    }

    // ---- select / memory ---------------------------------------------------------------------

    /// `select`: a 3-operand (condition, val2, val1, top to bottom) opcode whose emitted variant
    /// depends on which of the three currently occupies a register. Mirrors `Compile_Select`'s
    /// `c_intSelectOps`/`c_fpSelectOps` dispatch — generalized here to a 3-letter `r`/`s` suffix
    /// per operand position rather than a static 4-/6-entry table, matching how this port already
    /// encodes the 2-operand `rs`/`sr`/`ss` arithmetic variants as names rather than tables.
    fn compile_select(&mut self) -> WasmResult<()> {
        let cond_ty = self.stack.type_at(0)?;
        if cond_ty != ValType::I32 {
            return Err(WasmError::TypeMismatch { expected: ValType::I32, found: cond_ty });
        }
        let ty_b = self.stack.type_at(1)?; // val2
        let ty_a = self.stack.type_at(2)?; // val1
        if ty_a != ty_b {
            return Err(WasmError::TypeMismatch { expected: ty_a, found: ty_b });
        }
        let ty = ty_a;
        if ty.is_float() && !self.config.has_float {
            return Err(WasmError::UnknownOpcode { opcode: 0 });
        }

        let cond_in_reg = self.stack.is_in_register(0)?;
        let val2_in_reg = self.stack.is_in_register(1)?;
        let val1_in_reg = self.stack.is_in_register(2)?;

        if ty.is_float() {
            // the condition's register is the separate int one; only the two float operands can
            // occupy the fp register, so only their occupancy gates the preserve.
            if !val2_in_reg && !val1_in_reg {
                self.preserve_register_of_kind(RegisterKind::Fp)?;
            }
        } else {
            // condition and both int-typed operands all share the single int register.
            if !cond_in_reg && !val2_in_reg && !val1_in_reg {
                self.preserve_register_of_kind(RegisterKind::Int)?;
            }
        }

        let suffix = crate::alloc::format(format_args!(
            "{}{}{}",
            if cond_in_reg { "r" } else { "s" },
            if val2_in_reg { "r" } else { "s" },
            if val1_in_reg { "r" } else { "s" },
        ));
        self.emitter
            .emit_op(ThreadedOp::Named(crate::alloc::format(format_args!("select_{}_{}", ty, suffix))))?;

        let __poly = self.polymorphic();
        self.stack.pop(&mut self.slots, __poly)?; // cond
        let __poly = self.polymorphic();
        self.stack.pop(&mut self.slots, __poly)?; // val2
        let __poly = self.polymorphic();
        self.stack.pop(&mut self.slots, __poly)?; // val1
        self.stack.push_register(ty)?;
        Ok(())
    }

    fn compile_memory_size(&mut self) -> WasmResult<()> {
        self.emitter.emit_op(ThreadedOp::MemSize)?;
        self.stack.push_register(ValType::I32)?;
        Ok(())
    }

    fn compile_memory_grow(&mut self) -> WasmResult<()> {
        let __poly = self.polymorphic();
        self.stack.pop_type(ValType::I32, &mut self.slots, __poly)?;
        self.emitter.emit_op(ThreadedOp::MemGrow)?;
        self.stack.push_register(ValType::I32)?;
        Ok(())
    }

    // ---- memory load/store (§4.7.1) -----------------------------------------------------------

    /// `*.load*`: a unary op whose popped operand is always the `i32` address and whose pushed
    /// result is the loaded type — exactly `compile_unary`'s shape, since `Compile_Load_Store`
    /// delegates to the same generic single-operand dispatcher the ordinary unary ops use before
    /// appending the memory offset. Mirrors `Compile_Load_Store`'s fp-register preserve (keyed
    /// generically off `c_m3Type_f64`, not the load's exact width) plus its trailing
    /// `EmitConstant32(memoryOffset)`.
    fn compile_load(&mut self, name: &str, result_ty: ValType, offset: u32) -> WasmResult<()> {
        if result_ty.is_float() && !self.config.has_float {
            return Err(WasmError::UnknownOpcode { opcode: 0 });
        }
        if result_ty.is_float() {
            self.preserve_register_of_kind(RegisterKind::Fp)?;
        }
        self.compile_unary(name, ValType::I32, result_ty)?;
        self.emitter.emit_imm32(offset as i32)?;
        Ok(())
    }

    /// `*.store*`: pops the value then the `i32` address, pushes nothing. `d_binOpList`'s three
    /// variants cover integer stores; `d_storeFpOpList` additionally allows `rr` since a float
    /// store's value (fp register) and address (int register) can be simultaneously register-
    /// resident without conflict.
    fn compile_store(&mut self, name: &str, operand_ty: ValType, offset: u32) -> WasmResult<()> {
        if operand_ty.is_float() && !self.config.has_float {
            return Err(WasmError::UnknownOpcode { opcode: 0 });
        }
        if operand_ty.is_float() {
            self.preserve_register_of_kind(RegisterKind::Fp)?;
        }
        let value_in_reg = self.stack.is_in_register(0)?;
        let addr_in_reg = self.stack.is_in_register(1)?;
        let variant = select_variant(addr_in_reg, value_in_reg, false);
        let suffix = match variant {
            OpVariant::RegSlot => "rs",
            OpVariant::SlotReg => "sr",
            OpVariant::SlotSlot => "ss",
            OpVariant::RegReg => "rr",
        };
        self.emitter
            .emit_op(ThreadedOp::Named(crate::alloc::format(format_args!("{}_{}_{}", name, operand_ty, suffix))))?;
        let __poly = self.polymorphic();
        self.stack.pop_type(operand_ty, &mut self.slots, __poly)?;
        let __poly = self.polymorphic();
        self.stack.pop_type(ValType::I32, &mut self.slots, __poly)?;
        self.emitter.emit_imm32(offset as i32)?;
        Ok(())
    }

    // ---- generic arithmetic / compare / conversion (§4.7.1 / §4.7.9) -------------------------

    fn compile_generic(&mut self, op: Operator) -> WasmResult<()> {
        if let Some((name, result_ty, offset)) = classify_load(&op) {
            return self.compile_load(name, result_ty, offset);
        }
        if let Some((name, operand_ty, offset)) = classify_store(&op) {
            return self.compile_store(name, operand_ty, offset);
        }
        if let Some((name, operand_ty, result_ty, commutative)) = classify_binary(&op) {
            if operand_ty.is_float() && !self.config.has_float {
                return Err(WasmError::UnknownOpcode { opcode: 0 });
            }
            return self.compile_binary(name, operand_ty, result_ty, commutative);
        }
        if let Some((name, operand_ty, result_ty, is_extended)) = classify_unary(&op) {
            if operand_ty.is_float() && !self.config.has_float {
                return Err(WasmError::UnknownOpcode { opcode: 0 });
            }
            if is_extended && !self.config.compile_extended_opcode {
                return Err(WasmError::UnknownOpcode { opcode: 0 });
            }
            return self.compile_unary(name, operand_ty, result_ty);
        }
        Err(WasmError::UnknownOpcode { opcode: 0 })
    }

    fn compile_binary(&mut self, name: &str, operand_ty: ValType, result_ty: ValType, commutative: bool) -> WasmResult<()> {
        let top_in_reg = self.stack.is_in_register(0)?;
        let top1_in_reg = self.stack.is_in_register(1)?;
        let variant = select_variant(top1_in_reg, top_in_reg, commutative);
        let suffix = match variant {
            OpVariant::RegSlot => "rs",
            OpVariant::SlotReg => "sr",
            OpVariant::SlotSlot => "ss",
            OpVariant::RegReg => "rr",
        };
        self.emitter
            .emit_op(ThreadedOp::Named(crate::alloc::format(format_args!("{}_{}_{}", name, operand_ty, suffix))))?;
        let __poly = self.polymorphic();
        self.stack.pop_type(operand_ty, &mut self.slots, __poly)?;
        let __poly = self.polymorphic();
        self.stack.pop_type(operand_ty, &mut self.slots, __poly)?;
        self.stack.push_register(result_ty)?;
        Ok(())
    }

    fn compile_unary(&mut self, name: &str, operand_ty: ValType, result_ty: ValType) -> WasmResult<()> {
        let in_reg = self.stack.is_in_register(0)?;
        let suffix = if in_reg { "r" } else { "s" };
        self.emitter
            .emit_op(ThreadedOp::Named(crate::alloc::format(format_args!("{}_{}_{}", name, operand_ty, suffix))))?;
        let __poly = self.polymorphic();
        self.stack.pop_type(operand_ty, &mut self.slots, __poly)?;
        self.stack.push_register(result_ty)?;
        Ok(())
    }
}

/// Classify an arithmetic/compare opcode into `(name, operand type, result type, commutative)`.
/// Covers the common core-opcode surface; every entry shares the single generic compiler above
/// rather than a bespoke match arm per opcode, mirroring the reference table's
/// `d_binOpList`/`d_commutativeBinOpList` macro families.
fn classify_binary(op: &Operator) -> Option<(&'static str, ValType, ValType, bool)> {
    use ValType::*;
    Some(match op {
        Operator::I32Add => ("add", I32, I32, true),
        Operator::I32Sub => ("sub", I32, I32, false),
        Operator::I32Mul => ("mul", I32, I32, true),
        Operator::I32And => ("and", I32, I32, true),
        Operator::I32Or => ("or", I32, I32, true),
        Operator::I32Xor => ("xor", I32, I32, true),
        Operator::I32Shl => ("shl", I32, I32, false),
        Operator::I32ShrS => ("shr_s", I32, I32, false),
        Operator::I32ShrU => ("shr_u", I32, I32, false),
        Operator::I32Rotl => ("rotl", I32, I32, false),
        Operator::I32Rotr => ("rotr", I32, I32, false),
        Operator::I32DivS => ("div_s", I32, I32, false),
        Operator::I32DivU => ("div_u", I32, I32, false),
        Operator::I32RemS => ("rem_s", I32, I32, false),
        Operator::I32RemU => ("rem_u", I32, I32, false),
        Operator::I32Eq => ("eq", I32, I32, true),
        Operator::I32Ne => ("ne", I32, I32, true),
        Operator::I32LtS => ("lt_s", I32, I32, false),
        Operator::I32LtU => ("lt_u", I32, I32, false),
        Operator::I32GtS => ("gt_s", I32, I32, false),
        Operator::I32GtU => ("gt_u", I32, I32, false),
        Operator::I32LeS => ("le_s", I32, I32, false),
        Operator::I32LeU => ("le_u", I32, I32, false),
        Operator::I32GeS => ("ge_s", I32, I32, false),
        Operator::I32GeU => ("ge_u", I32, I32, false),

        Operator::I64Add => ("add", I64, I64, true),
        Operator::I64Sub => ("sub", I64, I64, false),
        Operator::I64Mul => ("mul", I64, I64, true),
        Operator::I64And => ("and", I64, I64, true),
        Operator::I64Or => ("or", I64, I64, true),
        Operator::I64Xor => ("xor", I64, I64, true),
        Operator::I64Shl => ("shl", I64, I64, false),
        Operator::I64ShrS => ("shr_s", I64, I64, false),
        Operator::I64ShrU => ("shr_u", I64, I64, false),
        Operator::I64Rotl => ("rotl", I64, I64, false),
        Operator::I64Rotr => ("rotr", I64, I64, false),
        Operator::I64DivS => ("div_s", I64, I64, false),
        Operator::I64DivU => ("div_u", I64, I64, false),
        Operator::I64RemS => ("rem_s", I64, I64, false),
        Operator::I64RemU => ("rem_u", I64, I64, false),
        Operator::I64Eq => ("eq", I64, I32, true),
        Operator::I64Ne => ("ne", I64, I32, true),
        Operator::I64LtS => ("lt_s", I64, I32, false),
        Operator::I64LtU => ("lt_u", I64, I32, false),
        Operator::I64GtS => ("gt_s", I64, I32, false),
        Operator::I64GtU => ("gt_u", I64, I32, false),
        Operator::I64LeS => ("le_s", I64, I32, false),
        Operator::I64LeU => ("le_u", I64, I32, false),
        Operator::I64GeS => ("ge_s", I64, I32, false),
        Operator::I64GeU => ("ge_u", I64, I32, false),

        Operator::F32Add => ("add", F32, F32, true),
        Operator::F32Sub => ("sub", F32, F32, false),
        Operator::F32Mul => ("mul", F32, F32, true),
        Operator::F32Div => ("div", F32, F32, false),
        Operator::F32Eq => ("eq", F32, I32, true),
        Operator::F32Ne => ("ne", F32, I32, true),
        Operator::F32Lt => ("lt", F32, I32, false),
        Operator::F32Gt => ("gt", F32, I32, false),
        Operator::F32Le => ("le", F32, I32, false),
        Operator::F32Ge => ("ge", F32, I32, false),

        Operator::F64Add => ("add", F64, F64, true),
        Operator::F64Sub => ("sub", F64, F64, false),
        Operator::F64Mul => ("mul", F64, F64, true),
        Operator::F64Div => ("div", F64, F64, false),
        Operator::F64Eq => ("eq", F64, I32, true),
        Operator::F64Ne => ("ne", F64, I32, true),
        Operator::F64Lt => ("lt", F64, I32, false),
        Operator::F64Gt => ("gt", F64, I32, false),
        Operator::F64Le => ("le", F64, I32, false),
        Operator::F64Ge => ("ge", F64, I32, false),

        _ => return None,
    })
}

/// Classify a unary/conversion opcode into `(name, operand type, result type, is_extended)`.
/// `is_extended` marks the eight saturating-truncation conversions, gated separately on
/// `CompilerConfig::compile_extended_opcode` the way the reference table's `c_operationsFC[]`
/// is only reachable through the `0xFC` prefix dispatch.
fn classify_unary(op: &Operator) -> Option<(&'static str, ValType, ValType, bool)> {
    use ValType::*;
    Some(match op {
        Operator::I32Eqz => ("eqz", I32, I32, false),
        Operator::I64Eqz => ("eqz", I64, I32, false),
        Operator::I32Clz => ("clz", I32, I32, false),
        Operator::I32Ctz => ("ctz", I32, I32, false),
        Operator::I32Popcnt => ("popcnt", I32, I32, false),
        Operator::I64Clz => ("clz", I64, I64, false),
        Operator::I64Ctz => ("ctz", I64, I64, false),
        Operator::I64Popcnt => ("popcnt", I64, I64, false),
        Operator::F32Neg => ("neg", F32, F32, false),
        Operator::F32Abs => ("abs", F32, F32, false),
        Operator::F32Sqrt => ("sqrt", F32, F32, false),
        Operator::F32Ceil => ("ceil", F32, F32, false),
        Operator::F32Floor => ("floor", F32, F32, false),
        Operator::F32Trunc => ("trunc", F32, F32, false),
        Operator::F32Nearest => ("nearest", F32, F32, false),
        Operator::F64Neg => ("neg", F64, F64, false),
        Operator::F64Abs => ("abs", F64, F64, false),
        Operator::F64Sqrt => ("sqrt", F64, F64, false),
        Operator::F64Ceil => ("ceil", F64, F64, false),
        Operator::F64Floor => ("floor", F64, F64, false),
        Operator::F64Trunc => ("trunc", F64, F64, false),
        Operator::F64Nearest => ("nearest", F64, F64, false),

        // conversions (§4.7.9)
        Operator::I32WrapI64 => ("wrap", I64, I32, false),
        Operator::I64ExtendSI32 => ("extend_s", I32, I64, false),
        Operator::I64ExtendUI32 => ("extend_u", I32, I64, false),
        Operator::F32ConvertSI32 => ("convert_s", I32, F32, false),
        Operator::F32ConvertUI32 => ("convert_u", I32, F32, false),
        Operator::F32ConvertSI64 => ("convert_s", I64, F32, false),
        Operator::F32ConvertUI64 => ("convert_u", I64, F32, false),
        Operator::F64ConvertSI32 => ("convert_s", I32, F64, false),
        Operator::F64ConvertUI32 => ("convert_u", I32, F64, false),
        Operator::F64ConvertSI64 => ("convert_s", I64, F64, false),
        Operator::F64ConvertUI64 => ("convert_u", I64, F64, false),
        Operator::F64PromoteF32 => ("promote", F32, F64, false),
        Operator::F32DemoteF64 => ("demote", F64, F32, false),
        Operator::I32TruncSF32 => ("trunc_s", F32, I32, false),
        Operator::I32TruncUF32 => ("trunc_u", F32, I32, false),
        Operator::I32TruncSF64 => ("trunc_s", F64, I32, false),
        Operator::I32TruncUF64 => ("trunc_u", F64, I32, false),
        Operator::I64TruncSF32 => ("trunc_s", F32, I64, false),
        Operator::I64TruncUF32 => ("trunc_u", F32, I64, false),
        Operator::I64TruncSF64 => ("trunc_s", F64, I64, false),
        Operator::I64TruncUF64 => ("trunc_u", F64, I64, false),
        Operator::I32ReinterpretF32 => ("reinterpret", F32, I32, false),
        Operator::F32ReinterpretI32 => ("reinterpret", I32, F32, false),
        Operator::I64ReinterpretF64 => ("reinterpret", F64, I64, false),
        Operator::F64ReinterpretI64 => ("reinterpret", I64, F64, false),

        // saturating truncation (0xFC prefix family)
        Operator::I32TruncSSatF32 => ("trunc_s_sat", F32, I32, true),
        Operator::I32TruncUSatF32 => ("trunc_u_sat", F32, I32, true),
        Operator::I32TruncSSatF64 => ("trunc_s_sat", F64, I32, true),
        Operator::I32TruncUSatF64 => ("trunc_u_sat", F64, I32, true),
        Operator::I64TruncSSatF32 => ("trunc_s_sat", F32, I64, true),
        Operator::I64TruncUSatF32 => ("trunc_u_sat", F32, I64, true),
        Operator::I64TruncSSatF64 => ("trunc_s_sat", F64, I64, true),
        Operator::I64TruncUSatF64 => ("trunc_u_sat", F64, I64, true),

        _ => return None,
    })
}

/// Classify a `*.load*` opcode into `(name, result type, memory offset)`. The popped operand is
/// always the `i32` address; the reference table's `d_unaryOpList` entries for these opcodes are
/// what `compile_load` reuses `compile_unary` against.
fn classify_load(op: &Operator) -> Option<(&'static str, ValType, u32)> {
    use ValType::*;
    Some(match op {
        Operator::I32Load { memarg } => ("load", I32, memarg.offset as u32),
        Operator::I64Load { memarg } => ("load", I64, memarg.offset as u32),
        Operator::F32Load { memarg } => ("load", F32, memarg.offset as u32),
        Operator::F64Load { memarg } => ("load", F64, memarg.offset as u32),
        Operator::I32Load8S { memarg } => ("load8_s", I32, memarg.offset as u32),
        Operator::I32Load8U { memarg } => ("load8_u", I32, memarg.offset as u32),
        Operator::I32Load16S { memarg } => ("load16_s", I32, memarg.offset as u32),
        Operator::I32Load16U { memarg } => ("load16_u", I32, memarg.offset as u32),
        Operator::I64Load8S { memarg } => ("load8_s", I64, memarg.offset as u32),
        Operator::I64Load8U { memarg } => ("load8_u", I64, memarg.offset as u32),
        Operator::I64Load16S { memarg } => ("load16_s", I64, memarg.offset as u32),
        Operator::I64Load16U { memarg } => ("load16_u", I64, memarg.offset as u32),
        Operator::I64Load32S { memarg } => ("load32_s", I64, memarg.offset as u32),
        Operator::I64Load32U { memarg } => ("load32_u", I64, memarg.offset as u32),

        _ => return None,
    })
}

/// Classify a `*.store*` opcode into `(name, value type, memory offset)`. The second popped
/// operand is always the `i32` address; the reference table's `d_binOpList`/`d_storeFpOpList`
/// entries for these opcodes are what `compile_store` mirrors.
fn classify_store(op: &Operator) -> Option<(&'static str, ValType, u32)> {
    use ValType::*;
    Some(match op {
        Operator::I32Store { memarg } => ("store", I32, memarg.offset as u32),
        Operator::I64Store { memarg } => ("store", I64, memarg.offset as u32),
        Operator::F32Store { memarg } => ("store", F32, memarg.offset as u32),
        Operator::F64Store { memarg } => ("store", F64, memarg.offset as u32),
        Operator::I32Store8 { memarg } => ("store8", I32, memarg.offset as u32),
        Operator::I32Store16 { memarg } => ("store16", I32, memarg.offset as u32),
        Operator::I64Store8 { memarg } => ("store8", I64, memarg.offset as u32),
        Operator::I64Store16 { memarg } => ("store16", I64, memarg.offset as u32),
        Operator::I64Store32 { memarg } => ("store32", I64, memarg.offset as u32),

        _ => return None,
    })
}

/// The external entry point named in SPEC_FULL.md §6: `compile_function(function)`.
///
/// Consumes the function's declared locals and operator stream, and a `FuncEnvironment` standing
/// in for the module/runtime this function belongs to; produces a [`CompiledFunction`] with
/// everything the runtime needs to record against its own function descriptor (`function.compiled`,
/// `function.constants`, etc. — this crate does not own that storage, per SPEC_FULL.md §1).
pub fn compile_function(
    allocator: &mut dyn CodePageAllocator,
    config: CompilerConfig,
    func_type: FuncType,
    locals_decl: &[(u32, ValType)],
    body_bytes: &[u8],
    mut body: wasmparser::OperatorsReader,
    environ: &mut dyn FuncEnvironment,
) -> WasmResult<CompiledFunction> {
    let mut compiler = FunctionCompiler::new(allocator, config, func_type, environ)?;
    compiler.compile(locals_decl, body_bytes, &mut body)
}

