//! Memory device abstraction.
//!
//! The engine talks to the chip through [`MemoryDevice`]: byte-addressed
//! random-access reads and writes over a 16-bit address space. The physical
//! bus driver lives behind this trait; [`SimMemory`] is a RAM-backed
//! implementation used for host-side testing and development.

use crate::error::{PrefsError, Result};

/// Byte-addressable non-volatile memory.
///
/// Writes are assumed durable once the call returns. Implementations for
/// real chips must honour [`crate::MemoryType::settle_delay`] between write
/// transactions; reads that fall short on the bus are reported as 0xFF
/// fill, not as errors.
pub trait MemoryDevice {
    /// Verify the device acknowledges on the bus.
    fn probe(&mut self) -> Result<()> {
        Ok(())
    }

    /// Read `buf.len()` bytes starting at `addr`. Bytes the transport could
    /// not deliver are filled with 0xFF.
    fn read(&mut self, addr: u16, buf: &mut [u8]) -> Result<()>;

    /// Write `data` starting at `addr`. Durable upon return.
    fn write(&mut self, addr: u16, data: &[u8]) -> Result<()>;
}

/// In-RAM simulation of a FRAM/EEPROM chip.
///
/// Fresh cells read 0xFF like an erased part. Reads past the end of the
/// array return 0xFF fill, mirroring a short bus transfer. Every byte
/// write bumps a per-cell cycle counter so tests can observe wear.
pub struct SimMemory {
    cells: Vec<u8>,
    write_cycles: Vec<u32>,
}

impl SimMemory {
    /// A fresh device of `capacity` bytes, all cells erased to 0xFF.
    pub fn new(capacity: usize) -> Self {
        SimMemory {
            cells: vec![0xFF; capacity],
            write_cycles: vec![0; capacity],
        }
    }

    /// Rebuild a device around an existing memory image.
    pub fn from_image(image: Vec<u8>) -> Self {
        let len = image.len();
        SimMemory {
            cells: image,
            write_cycles: vec![0; len],
        }
    }

    pub fn capacity(&self) -> usize {
        self.cells.len()
    }

    /// Raw view of the memory array.
    pub fn as_bytes(&self) -> &[u8] {
        &self.cells
    }

    /// How many times each cell has been written since construction.
    pub fn write_cycles(&self) -> &[u32] {
        &self.write_cycles
    }
}

impl MemoryDevice for SimMemory {
    fn read(&mut self, addr: u16, buf: &mut [u8]) -> Result<()> {
        let start = addr as usize;
        for (i, out) in buf.iter_mut().enumerate() {
            *out = self.cells.get(start + i).copied().unwrap_or(0xFF);
        }
        Ok(())
    }

    fn write(&mut self, addr: u16, data: &[u8]) -> Result<()> {
        let start = addr as usize;
        let end = start + data.len();
        if end > self.cells.len() {
            return Err(PrefsError::DeviceFault(format!(
                "write of {} bytes at 0x{addr:04X} exceeds capacity {}",
                data.len(),
                self.cells.len()
            )));
        }
        self.cells[start..end].copy_from_slice(data);
        for counter in &mut self.write_cycles[start..end] {
            *counter += 1;
        }
        Ok(())
    }
}
