//! Wear-leveling key-value storage for I2C FRAM/EEPROM.
//!
//! A preferences-style store (put/get by string key, per-type accessors,
//! existence check, delete, clear) that persists to a small byte-addressable
//! non-volatile memory while bounding per-cell write counts. The device is
//! partitioned once into a global header and N equal blocks; exactly one
//! block receives appends, deletes are one-byte tombstones, and a copying
//! garbage collector both reclaims tombstoned space and rotates the active
//! block across the device.
//!
//! ## On-device layout
//!
//! ```text
//! ┌────────────────────────────────────────────────────┐
//! │ Global header: magic 0xA5 · version · total_blocks │
//! │                · active_block_index · CRC-8        │
//! ├────────────────────────────────────────────────────┤
//! │ Block 0: header (status · offset · CRC-8)          │
//! │          entry log: [hdr|key|value] [hdr|key|value]│
//! ├────────────────────────────────────────────────────┤
//! │ Block 1 ... Block N-1                              │
//! └────────────────────────────────────────────────────┘
//! ```
//!
//! Lookups scan blocks without any in-RAM index: a 16-bit DJB2 hash in
//! each entry header filters candidates, then key bytes are compared.
//! All headers are checksummed with CRC-8; a block whose header fails
//! validation is skipped by readers and recycled by the next GC pass.
//!
//! ## Example
//!
//! ```
//! use miniprefs::{MiniPrefs, PrefsConfig, SimMemory};
//!
//! let config = PrefsConfig::default();
//! let device = SimMemory::new(config.total_memory_bytes() as usize);
//! let mut prefs = MiniPrefs::new(config, device)?;
//! prefs.begin()?;
//!
//! prefs.put_u32("boot_count", 17)?;
//! assert_eq!(prefs.get_u32("boot_count", 0), 17);
//! assert!(prefs.has_key("boot_count"));
//! prefs.remove("boot_count")?;
//! assert_eq!(prefs.get_u32("boot_count", 0), 0);
//! # Ok::<(), miniprefs::PrefsError>(())
//! ```
//!
//! The engine is single-threaded and cooperative: every operation runs to
//! completion on the caller's thread and issues device I/O synchronously.
//! Physical bus drivers implement [`MemoryDevice`]; [`SimMemory`] is the
//! RAM-backed implementation used for host-side testing.

pub mod block;
pub mod checksum;
pub mod config;
pub mod device;
pub mod error;
pub mod gc;
pub mod header;
pub mod store;
pub mod typed;

pub use config::{MemoryType, PrefsConfig};
pub use device::{MemoryDevice, SimMemory};
pub use error::{PrefsError, Result};
pub use header::{
    BlockHeader, BlockStatus, DataType, EntryHeader, GlobalHeader, BLOCK_HEADER_SIZE,
    ENTRY_HEADER_SIZE, GLOBAL_HEADER_SIZE, PREFS_MAGIC, PREFS_VERSION,
};
pub use store::{EntryInfo, MiniPrefs, StoreStats};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
