//! Compile-time tunables reified as runtime struct fields (see SPEC_FULL.md §4.11 / §6).
//!
//! The reference implementation fixes these as C preprocessor `#define`s; this crate keeps the
//! same defaults but makes them ordinary fields so embedders can shrink them in tests to exercise
//! overflow paths deterministically without recompiling.

/// Tunable limits and feature switches for one compilation session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompilerConfig {
    /// Slots are 32 bits wide when true, 64 bits wide when false. 64-bit-typed values always
    /// span two slots when this is true.
    pub use_32_bit_slots: bool,
    /// Whether floating-point opcodes compile at all; when false they fail `UnknownOpcode`.
    pub has_float: bool,
    /// Upper bound on slot indices a single function may allocate.
    pub max_function_slots: u32,
    /// Upper bound on value-stack depth during compilation.
    pub max_function_stack_height: u32,
    /// Cap on the number of slots pre-reserved for the interned constant pool.
    pub max_constant_table_size: u32,
    /// Whether code pages track per-function usage counts for later reclaim.
    pub enable_code_page_ref_counting: bool,
    /// Whether the `0xFC` saturating-conversion opcode prefix is recognized.
    pub compile_extended_opcode: bool,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        CompilerConfig {
            use_32_bit_slots: false,
            has_float: true,
            max_function_slots: 4096,
            max_function_stack_height: 4096,
            max_constant_table_size: 64,
            enable_code_page_ref_counting: true,
            compile_extended_opcode: true,
        }
    }
}

impl CompilerConfig {
    /// Number of bytes backing one slot on this configuration.
    pub fn slot_width_bytes(&self) -> usize {
        if self.use_32_bit_slots {
            4
        } else {
            8
        }
    }
}
