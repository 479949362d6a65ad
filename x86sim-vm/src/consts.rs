//! Simulator-wide layout and flag-bit constants.

/// Start address of the text (code) segment.
pub const TEXT_SEGMENT_START: u64 = 0x0000_0000;

/// Start address of the data segment.
pub const DATA_SEGMENT_START: u64 = 0x0020_0000;

/// Start address of the bss segment.
pub const BSS_SEGMENT_START: u64 = 0x0040_0000;

/// Default text segment size when not otherwise configured.
pub const DEFAULT_TEXT_SIZE: u64 = DATA_SEGMENT_START - TEXT_SEGMENT_START;

/// Default data segment size when not otherwise configured.
pub const DEFAULT_DATA_SIZE: u64 = BSS_SEGMENT_START - DATA_SEGMENT_START;

/// Default bss segment size when not otherwise configured.
pub const DEFAULT_BSS_SIZE: u64 = 0x0020_0000;

/// Gap kept between bss and the heap.
pub const HEAP_GAP: u64 = 0x0010_0000;

/// Heap size.
pub const HEAP_SIZE: u64 = 16 * 1024 * 1024;

/// Stack size.
pub const STACK_SIZE: u64 = 1024 * 1024;

/// RFLAGS bit position of the carry flag.
pub const RFLAGS_CF_BIT: u32 = 0;
/// RFLAGS bit position of the parity flag.
pub const RFLAGS_PF_BIT: u32 = 2;
/// RFLAGS bit position of the auxiliary carry flag.
pub const RFLAGS_AF_BIT: u32 = 4;
/// RFLAGS bit position of the zero flag.
pub const RFLAGS_ZF_BIT: u32 = 6;
/// RFLAGS bit position of the sign flag.
pub const RFLAGS_SF_BIT: u32 = 7;
/// RFLAGS bit position of the direction flag.
pub const RFLAGS_DF_BIT: u32 = 10;
/// RFLAGS bit position of the overflow flag.
pub const RFLAGS_OF_BIT: u32 = 11;
/// RFLAGS bit 1 is hardwired to 1 on real silicon; preserved here for
/// interoperability with tools that inspect the raw value.
pub const RFLAGS_RESERVED_ONE_BIT: u32 = 1;

/// Number of 64-bit general purpose register slots (rax..r15).
pub const GPR_COUNT: usize = 16;

/// Number of 256-bit vector register slots (ymm0..ymm15).
pub const YMM_COUNT: usize = 16;

/// x86 syscall interrupt vector emulated by this simulator (`int 0x80`).
pub const SYSCALL_INTERRUPT_VECTOR: u8 = 0x80;

/// `sys_exit` syscall number, read from `eax`.
pub const SYS_EXIT: u64 = 1;
