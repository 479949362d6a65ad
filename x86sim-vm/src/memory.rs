//! Flat, segmented byte memory with typed little-endian accessors.

use tracing::info;

use x86sim_asm::fault::SimFault;

use crate::consts::*;
use crate::error::RuntimeError;

/// Layout of the four fixed-address segments plus the derived heap/stack
/// bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Layout {
    pub text_start: u64,
    pub text_size: u64,
    pub data_start: u64,
    pub data_size: u64,
    pub bss_start: u64,
    pub bss_size: u64,
    pub heap_start: u64,
    pub heap_size: u64,
    pub stack_start: u64,
    pub stack_size: u64,
}

impl Layout {
    fn new(text_size: u64, data_size: u64, bss_size: u64) -> Self {
        let text_start = TEXT_SEGMENT_START;
        let data_start = DATA_SEGMENT_START;
        let bss_start = BSS_SEGMENT_START;
        let bss_end = bss_start + bss_size;
        let heap_start = bss_end + HEAP_GAP;
        let heap_size = HEAP_SIZE;
        let stack_size = STACK_SIZE;
        let stack_start = heap_start + heap_size;
        Self {
            text_start,
            text_size,
            data_start,
            data_size,
            bss_start,
            bss_size,
            heap_start,
            heap_size,
            stack_start,
            stack_size,
        }
    }

    /// Address one past the end of the stack segment; `rsp` starts here and
    /// decrements on every push.
    pub const fn stack_bottom(&self) -> u64 {
        self.stack_start + self.stack_size
    }

    pub const fn total_size(&self) -> u64 {
        self.stack_bottom()
    }

    const fn text_end(&self) -> u64 {
        self.text_start + self.text_size
    }

    const fn stack_end(&self) -> u64 {
        self.stack_bottom()
    }
}

/// Flat byte array partitioned into named segments.
///
/// `text` is writable only through [`Memory::write_text`] /
/// [`Memory::write_text_dword`] (the assembler's own path); general
/// `read_*`/`write_*` accessors touch any address within total memory but
/// still bounds-check against the overall size.
#[derive(Debug, Clone)]
pub struct Memory {
    layout: Layout,
    bytes: Vec<u8>,
}

impl Memory {
    /// Construct memory with configurable text/data/bss sizes; heap and
    /// stack are sized and placed automatically.
    pub fn new(text_size: u64, data_size: u64, bss_size: u64) -> Self {
        let layout = Layout::new(text_size, data_size, bss_size);
        let bytes = vec![0u8; layout.total_size() as usize];
        info!(
            text_start = layout.text_start,
            data_start = layout.data_start,
            bss_start = layout.bss_start,
            heap_start = layout.heap_start,
            stack_start = layout.stack_start,
            total = layout.total_size(),
            "memory layout constructed"
        );
        Self { layout, bytes }
    }

    pub fn with_default_sizes() -> Self {
        Self::new(DEFAULT_TEXT_SIZE, DEFAULT_DATA_SIZE, DEFAULT_BSS_SIZE)
    }

    pub const fn layout(&self) -> &Layout {
        &self.layout
    }

    pub fn get_total_memory_size(&self) -> u64 {
        self.bytes.len() as u64
    }

    /// Zero every byte and rebuild segment bookkeeping from scratch.
    pub fn reset(&mut self) {
        self.bytes.iter_mut().for_each(|b| *b = 0);
        info!("memory reset");
    }

    fn check_range(&self, address: u64, len: u64, segment: &'static str) -> Result<(), RuntimeError> {
        let total = self.get_total_memory_size();
        if address.checked_add(len).map(|end| end > total).unwrap_or(true) {
            return Err(RuntimeError::Fatal(SimFault::MemoryOutOfRange { address, segment }));
        }
        Ok(())
    }

    fn check_segment(&self, address: u64, len: u64, start: u64, size: u64, segment: &'static str) -> Result<(), RuntimeError> {
        let end = start + size;
        if address < start || address.checked_add(len).map(|e| e > end).unwrap_or(true) {
            return Err(RuntimeError::Fatal(SimFault::MemoryOutOfRange { address, segment }));
        }
        Ok(())
    }

    // --- generic little-endian accessors, checked against total memory ---

    pub fn read_byte(&self, address: u64) -> Result<u8, RuntimeError> {
        self.check_range(address, 1, "total")?;
        Ok(self.bytes[address as usize])
    }

    pub fn write_byte(&mut self, address: u64, value: u8) -> Result<(), RuntimeError> {
        self.check_range(address, 1, "total")?;
        self.bytes[address as usize] = value;
        Ok(())
    }

    pub fn read_word(&self, address: u64) -> Result<u16, RuntimeError> {
        self.check_range(address, 2, "total")?;
        let a = address as usize;
        Ok(u16::from_le_bytes([self.bytes[a], self.bytes[a + 1]]))
    }

    pub fn write_word(&mut self, address: u64, value: u16) -> Result<(), RuntimeError> {
        self.check_range(address, 2, "total")?;
        let a = address as usize;
        self.bytes[a..a + 2].copy_from_slice(&value.to_le_bytes());
        Ok(())
    }

    pub fn read_dword(&self, address: u64) -> Result<u32, RuntimeError> {
        self.check_range(address, 4, "total")?;
        let a = address as usize;
        Ok(u32::from_le_bytes(self.bytes[a..a + 4].try_into().unwrap()))
    }

    pub fn write_dword(&mut self, address: u64, value: u32) -> Result<(), RuntimeError> {
        self.check_range(address, 4, "total")?;
        let a = address as usize;
        self.bytes[a..a + 4].copy_from_slice(&value.to_le_bytes());
        Ok(())
    }

    pub fn read_qword(&self, address: u64) -> Result<u64, RuntimeError> {
        self.check_range(address, 8, "total")?;
        let a = address as usize;
        Ok(u64::from_le_bytes(self.bytes[a..a + 8].try_into().unwrap()))
    }

    pub fn write_qword(&mut self, address: u64, value: u64) -> Result<(), RuntimeError> {
        self.check_range(address, 8, "total")?;
        let a = address as usize;
        self.bytes[a..a + 8].copy_from_slice(&value.to_le_bytes());
        Ok(())
    }

    /// Read a 256-bit value as 4 little-endian u64 lanes, low to high.
    pub fn read_ymm(&self, address: u64) -> Result<[u64; 4], RuntimeError> {
        self.check_range(address, 32, "total")?;
        let mut lanes = [0u64; 4];
        for (i, lane) in lanes.iter_mut().enumerate() {
            *lane = self.read_qword(address + i as u64 * 8)?;
        }
        Ok(lanes)
    }

    pub fn write_ymm(&mut self, address: u64, lanes: [u64; 4]) -> Result<(), RuntimeError> {
        self.check_range(address, 32, "total")?;
        for (i, lane) in lanes.iter().enumerate() {
            self.write_qword(address + i as u64 * 8, *lane)?;
        }
        Ok(())
    }

    // --- text segment: read freely, write only via the assembler's path ---

    pub fn read_text(&self, address: u64) -> Result<u8, RuntimeError> {
        self.check_segment(address, 1, self.layout.text_start, self.layout.text_size, "text")?;
        Ok(self.bytes[address as usize])
    }

    pub fn write_text(&mut self, address: u64, byte: u8) -> Result<(), RuntimeError> {
        self.check_segment(address, 1, self.layout.text_start, self.layout.text_size, "text")?;
        self.bytes[address as usize] = byte;
        Ok(())
    }

    pub fn read_text_dword(&self, address: u64) -> Result<u32, RuntimeError> {
        self.check_segment(address, 4, self.layout.text_start, self.layout.text_size, "text")?;
        self.read_dword(address)
    }

    pub fn write_text_dword(&mut self, address: u64, value: u32) -> Result<(), RuntimeError> {
        self.check_segment(address, 4, self.layout.text_start, self.layout.text_size, "text")?;
        self.write_dword(address, value)
    }

    /// Grow the logical text segment size (used by the assembler once pass 1
    /// has learned the final size).
    pub fn set_text_size(&mut self, size: u64) {
        self.layout.text_size = size;
    }

    pub const fn text_range(&self) -> (u64, u64) {
        (self.layout.text_start, self.layout.text_size)
    }

    // --- stack segment: range-checked against [stack_start, stack_bottom) ---

    pub fn read_stack(&self, address: u64) -> Result<u64, RuntimeError> {
        self.check_segment(address, 8, self.layout.stack_start, self.layout.stack_size, "stack")?;
        self.read_qword(address)
    }

    pub fn write_stack(&mut self, address: u64, value: u64) -> Result<(), RuntimeError> {
        self.check_segment(address, 8, self.layout.stack_start, self.layout.stack_size, "stack")?;
        self.write_qword(address, value)
    }

    pub const fn stack_bottom(&self) -> u64 {
        self.layout.stack_bottom()
    }

    pub const fn stack_start(&self) -> u64 {
        self.layout.stack_start
    }

    pub const fn data_start(&self) -> u64 {
        self.layout.data_start
    }

    pub const fn bss_start(&self) -> u64 {
        self.layout.bss_start
    }
}
