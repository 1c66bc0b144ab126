//! Store configuration.
//!
//! All options are fixed at construction time; `begin()` derives the block
//! layout from them. Defaults match a 32 Kibit EEPROM at bus address 0x50
//! with 256-byte blocks.

use crate::error::{PrefsError, Result};
use crate::header::{BLOCK_HEADER_SIZE, ENTRY_HEADER_SIZE, GLOBAL_HEADER_SIZE};
use std::time::Duration;

/// Kind of I2C memory behind the bus.
///
/// Selects the bus clock and the per-transaction settle delay a bus driver
/// must honour. FRAM writes are immediate; EEPROM cells need a write cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryType {
    Eeprom,
    Fram,
}

impl MemoryType {
    /// Recommended bus clock for this memory type.
    pub fn bus_clock_hz(&self) -> u32 {
        match self {
            MemoryType::Fram => 1_000_000,
            MemoryType::Eeprom => 100_000,
        }
    }

    /// Delay a bus driver must insert after each write transaction.
    pub fn settle_delay(&self) -> Option<Duration> {
        match self {
            MemoryType::Fram => None,
            MemoryType::Eeprom => Some(Duration::from_millis(5)),
        }
    }
}

/// Construction-time configuration for a [`crate::MiniPrefs`] store.
#[derive(Debug, Clone)]
pub struct PrefsConfig {
    /// Memory chip kind; selects bus speed and settle delays.
    pub memory_type: MemoryType,
    /// On-bus device address (typically 0x50).
    pub device_address: u8,
    /// Device capacity in bits.
    pub total_memory_bits: u32,
    /// Block size in bytes. The unit of wear leveling and GC.
    pub block_size: u16,
    /// Maximum key length in bytes.
    pub max_key_len: u8,
    /// Maximum value length in bytes.
    pub max_value_len: u16,
}

impl Default for PrefsConfig {
    fn default() -> Self {
        PrefsConfig {
            memory_type: MemoryType::Eeprom,
            device_address: 0x50,
            total_memory_bits: 32 * 1024,
            block_size: 256,
            max_key_len: 16,
            max_value_len: 240,
        }
    }
}

impl PrefsConfig {
    /// Device capacity in bytes.
    pub fn total_memory_bytes(&self) -> u32 {
        self.total_memory_bits / 8
    }

    /// Number of blocks the device holds after the global header.
    pub fn total_blocks(&self) -> u16 {
        if self.block_size == 0 {
            return 0;
        }
        let usable = self
            .total_memory_bytes()
            .saturating_sub(GLOBAL_HEADER_SIZE as u32);
        (usable / self.block_size as u32).min(u16::MAX as u32) as u16
    }

    /// Validate structural constraints.
    ///
    /// Maxima that merely cannot share one block (the stock 256/16/240
    /// geometry is such a case) are allowed and only warned about; an entry
    /// at both maxima then fails with `StoreFull` at runtime.
    pub fn validate(&self) -> Result<()> {
        if self.total_memory_bytes() > 65_536 {
            return Err(PrefsError::InvalidConfig(format!(
                "device capacity {} bytes exceeds the 16-bit address space",
                self.total_memory_bytes()
            )));
        }
        if self.block_size as u32 <= BLOCK_HEADER_SIZE as u32 {
            return Err(PrefsError::InvalidConfig(format!(
                "block size {} leaves no room for entries",
                self.block_size
            )));
        }
        if self.max_key_len == 0 {
            return Err(PrefsError::InvalidConfig(
                "max_key_len must be at least 1".into(),
            ));
        }
        if self.total_blocks() == 0 {
            return Err(PrefsError::InvalidConfig(format!(
                "{} bytes of memory holds no {}-byte blocks",
                self.total_memory_bytes(),
                self.block_size
            )));
        }
        let worst = BLOCK_HEADER_SIZE as u32
            + ENTRY_HEADER_SIZE as u32
            + self.max_key_len as u32
            + self.max_value_len as u32;
        if worst > self.block_size as u32 {
            tracing::warn!(
                block_size = self.block_size,
                max_key_len = self.max_key_len,
                max_value_len = self.max_value_len,
                "an entry at both maxima will not fit in one block"
            );
        }
        Ok(())
    }
}
