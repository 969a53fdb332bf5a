//! C1 — the code-page emitter.
//!
//! Grounded on `original_source/source/m3_compile.c`'s `AcquireCompilationCodePage` /
//! `ReleaseCompilationCodePage` / `EmitWord` / `EmitPointer` / `ReservePointer`: a code page is a
//! fixed-size run of [`CodeCell`]s supplied by an external allocator. The emitter never owns page
//! memory — it only ever asks the allocator for the next one and stitches pages together with a
//! trailing `op_Branch` when the page fills up. Page boundaries are invisible to every caller above
//! this module.

use crate::error::{WasmError, WasmResult};
use crate::ops::{CodeCell, ThreadedOp};

/// An absolute address of a single [`CodeCell`]: which page, and the cell offset within it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodeAddr {
    /// Index of the page, as handed out by the allocator (opaque beyond ordering for debugging).
    pub page: u32,
    /// Offset of the cell within that page.
    pub offset: u32,
}

/// Supplies fresh code pages on demand. The runtime owns page memory; this crate only asks for
/// pages and writes into them through the `CodeEmitter` below.
pub trait CodePageAllocator {
    /// Allocate a new page with at least `min_cells` capacity, returning its index.
    fn acquire_page(&mut self, min_cells: usize) -> WasmResult<u32>;

    /// Append one cell to the page at `page`. Fails only if the page index is unknown to the
    /// allocator (a logic error in this crate, never in well-formed input).
    fn write_cell(&mut self, page: u32, offset: u32, cell: CodeCell);

    /// Number of cells already written to `page`.
    fn page_len(&self, page: u32) -> u32;

    /// Capacity of `page` in cells.
    fn page_capacity(&self, page: u32) -> u32;
}

/// Drives emission into the current code page, requesting new pages and stitching them together
/// with `op_Branch` as needed.
pub struct CodeEmitter<'a> {
    allocator: &'a mut dyn CodePageAllocator,
    current_page: u32,
    ref_counted_pages: bool,
    pages_used: u32,
}

impl<'a> CodeEmitter<'a> {
    /// Start emitting into a freshly acquired page of at least `min_cells` capacity.
    pub fn new(
        allocator: &'a mut dyn CodePageAllocator,
        min_cells: usize,
        ref_counted_pages: bool,
    ) -> WasmResult<Self> {
        let page = allocator
            .acquire_page(min_cells)
            .map_err(|_| WasmError::MallocFailedCodePage)?;
        Ok(CodeEmitter {
            allocator,
            current_page: page,
            ref_counted_pages,
            pages_used: 1,
        })
    }

    /// Address of the next cell that will be written.
    pub fn here(&self) -> CodeAddr {
        CodeAddr {
            page: self.current_page,
            offset: self.allocator.page_len(self.current_page),
        }
    }

    fn ensure_room(&mut self, cells_needed: u32) -> WasmResult<()> {
        let len = self.allocator.page_len(self.current_page);
        let cap = self.allocator.page_capacity(self.current_page);
        if len + cells_needed <= cap {
            return Ok(());
        }
        // Stitch the old page to a fresh one with a trailing branch.
        let next_page = self
            .allocator
            .acquire_page(cells_needed as usize)
            .map_err(|_| WasmError::MallocFailedCodePage)?;
        let branch_target = CodeAddr {
            page: next_page,
            offset: 0,
        };
        self.raw_emit(CodeCell::Op(ThreadedOp::Branch));
        self.raw_emit(CodeCell::Ptr(encode_addr(branch_target)));
        self.current_page = next_page;
        if self.ref_counted_pages {
            self.pages_used += 1;
        }
        Ok(())
    }

    fn raw_emit(&mut self, cell: CodeCell) {
        let offset = self.allocator.page_len(self.current_page);
        self.allocator.write_cell(self.current_page, offset, cell);
    }

    /// Emit an operation pointer cell.
    pub fn emit_op(&mut self, op: ThreadedOp) -> WasmResult<()> {
        self.ensure_room(1)?;
        self.raw_emit(CodeCell::Op(op));
        Ok(())
    }

    /// Emit a slot-offset operand.
    pub fn emit_slot(&mut self, slot: u16) -> WasmResult<()> {
        self.ensure_room(1)?;
        self.raw_emit(CodeCell::Slot(slot));
        Ok(())
    }

    /// Emit a 32-bit immediate operand.
    pub fn emit_imm32(&mut self, value: i32) -> WasmResult<()> {
        self.ensure_room(1)?;
        self.raw_emit(CodeCell::Imm32(value));
        Ok(())
    }

    /// Emit a 64-bit immediate operand.
    pub fn emit_imm64(&mut self, value: i64) -> WasmResult<()> {
        self.ensure_room(1)?;
        self.raw_emit(CodeCell::Imm64(value));
        Ok(())
    }

    /// Emit an already-resolved absolute pointer.
    pub fn emit_ptr(&mut self, addr: CodeAddr) -> WasmResult<()> {
        self.ensure_room(1)?;
        self.raw_emit(CodeCell::Ptr(encode_addr(addr)));
        Ok(())
    }

    /// Reserve a pointer-sized cell, to be overwritten later via [`CodeEmitter::patch`]. Returns
    /// the address of the reserved cell.
    pub fn reserve_ptr(&mut self) -> WasmResult<CodeAddr> {
        self.ensure_room(1)?;
        let addr = self.here();
        self.raw_emit(CodeCell::Ptr(0));
        Ok(addr)
    }

    /// Overwrite a previously reserved cell (from [`CodeEmitter::reserve_ptr`]) with its final
    /// target address.
    pub fn patch(&mut self, at: CodeAddr, target: CodeAddr) {
        self.allocator
            .write_cell(at.page, at.offset, CodeCell::Ptr(encode_addr(target)));
    }

    /// Number of distinct pages this emitter has used so far (only meaningful when
    /// `CompilerConfig::enable_code_page_ref_counting` is set).
    pub fn pages_used(&self) -> u32 {
        self.pages_used
    }
}

fn encode_addr(addr: CodeAddr) -> u64 {
    (u64::from(addr.page) << 32) | u64::from(addr.offset)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alloc::Vec;

    struct TestAllocator {
        pages: Vec<Vec<CodeCell>>,
        page_cap: usize,
    }

    impl TestAllocator {
        fn new(page_cap: usize) -> Self {
            TestAllocator {
                pages: Vec::new(),
                page_cap,
            }
        }
    }

    impl CodePageAllocator for TestAllocator {
        fn acquire_page(&mut self, min_cells: usize) -> WasmResult<u32> {
            let cap = self.page_cap.max(min_cells);
            self.pages.push(Vec::with_capacity(cap));
            Ok((self.pages.len() - 1) as u32)
        }

        fn write_cell(&mut self, page: u32, offset: u32, cell: CodeCell) {
            let page = &mut self.pages[page as usize];
            let offset = offset as usize;
            if offset == page.len() {
                page.push(cell);
            } else {
                page[offset] = cell;
            }
        }

        fn page_len(&self, page: u32) -> u32 {
            self.pages[page as usize].len() as u32
        }

        fn page_capacity(&self, _page: u32) -> u32 {
            self.page_cap as u32
        }
    }

    #[test]
    fn stitches_across_page_boundary() {
        let mut alloc = TestAllocator::new(2);
        let mut emitter = CodeEmitter::new(&mut alloc, 2, true).unwrap();
        emitter.emit_op(ThreadedOp::Entry).unwrap();
        emitter.emit_op(ThreadedOp::Unreachable).unwrap();
        // third emission must trigger a branch-stitch to a new page
        emitter.emit_op(ThreadedOp::Return).unwrap();
        assert_eq!(emitter.pages_used(), 2);
    }

    #[test]
    fn patch_overwrites_reserved_cell() {
        let mut alloc = TestAllocator::new(8);
        let mut emitter = CodeEmitter::new(&mut alloc, 8, false).unwrap();
        let reserved = emitter.reserve_ptr().unwrap();
        let target = emitter.here();
        emitter.patch(reserved, target);
        assert_eq!(alloc.pages[0][0], CodeCell::Ptr(encode_addr(target)));
    }
}
