//! The storage engine.
//!
//! [`MiniPrefs`] owns the device and the two pieces of runtime state the
//! format keeps in RAM: the block count (fixed after `begin`) and the
//! active block index (moved only by garbage collection). Everything else
//! lives on the device. Operations are synchronous and run to completion
//! on the caller's thread; the device sits behind a mutex so lookups can
//! take `&self` while bus transactions need exclusive access.

use crate::checksum::hash_key;
use crate::config::PrefsConfig;
use crate::device::MemoryDevice;
use crate::error::{PrefsError, Result};
use crate::header::{
    block_address, BlockHeader, BlockStatus, DataType, EntryHeader, GlobalHeader,
    BLOCK_HEADER_SIZE, ENTRY_HEADER_SIZE, ENTRY_LIVE, GLOBAL_HEADER_SIZE,
};
use parking_lot::Mutex;

/// Runtime state guarded together with the device.
pub(crate) struct Inner<D> {
    pub(crate) dev: D,
    pub(crate) total_blocks: u16,
    pub(crate) active_block_index: u16,
    pub(crate) initialized: bool,
}

/// Location of a live entry found by [`MiniPrefs::find_entry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryInfo {
    /// Device address of the entry header.
    pub header_addr: u16,
    /// Device address of the first value byte.
    pub value_addr: u16,
    /// Value length in bytes.
    pub value_len: u16,
    /// Decoded type tag (unknown tags read as [`DataType::None`]).
    pub data_type: DataType,
}

/// Point-in-time snapshot of store occupancy, gathered by a full scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreStats {
    pub total_blocks: u16,
    pub active_block_index: u16,
    /// Append offset within the active block.
    pub active_offset: u16,
    /// Bytes still appendable in the active block.
    pub active_free_bytes: u16,
    pub live_entries: u32,
    pub tombstones: u32,
    pub empty_blocks: u16,
}

/// Wear-leveling key-value store over an I2C FRAM/EEPROM device.
pub struct MiniPrefs<D: MemoryDevice> {
    config: PrefsConfig,
    inner: Mutex<Inner<D>>,
}

impl<D: MemoryDevice> MiniPrefs<D> {
    /// Wrap `device` with the given configuration.
    ///
    /// The store is unusable until [`begin`](Self::begin) succeeds.
    pub fn new(config: PrefsConfig, device: D) -> Result<Self> {
        config.validate()?;
        Ok(MiniPrefs {
            config,
            inner: Mutex::new(Inner {
                dev: device,
                total_blocks: 0,
                active_block_index: 0,
                initialized: false,
            }),
        })
    }

    pub(crate) fn config(&self) -> &PrefsConfig {
        &self.config
    }

    /// Initialize the store: probe the device, then format, recover, or
    /// resume depending on what the global header says.
    pub fn begin(&mut self) -> Result<()> {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        inner.initialized = false;
        inner.dev.probe()?;
        inner.total_blocks = self.config.total_blocks();
        tracing::debug!(
            address = self.config.device_address,
            blocks = inner.total_blocks,
            block_size = self.config.block_size,
            "device probed"
        );

        match Self::read_global_header(&mut inner.dev) {
            Ok(global) => {
                let geometry_ok = global.total_blocks == inner.total_blocks
                    && global.active_block_index < inner.total_blocks;
                let active_ok = geometry_ok
                    && matches!(
                        self.read_block_header(&mut inner.dev, global.active_block_index)
                            .map(|h| h.status),
                        Ok(BlockStatus::Active)
                    );
                if active_ok {
                    inner.active_block_index = global.active_block_index;
                } else {
                    tracing::warn!(
                        active = global.active_block_index,
                        "recorded active block invalid, running recovery GC"
                    );
                    self.run_gc(inner)?;
                }
            }
            Err(_) => {
                tracing::debug!("no valid global header, formatting");
                self.run_gc(inner)?;
            }
        }

        inner.initialized = true;
        Ok(())
    }

    /// Relinquish the bus. The on-device state needs no teardown.
    pub fn end(&mut self) {}

    /// Locate the live entry for `key` across all readable blocks.
    pub fn find_entry(&self, key: &str) -> Result<EntryInfo> {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        if !inner.initialized {
            return Err(PrefsError::NotInitialized);
        }
        self.check_key(key)?;
        self.find_entry_inner(inner, key)?.ok_or(PrefsError::NotFound)
    }

    /// Whether a live entry for `key` exists. Any failure reads as absent.
    pub fn has_key(&self, key: &str) -> bool {
        self.find_entry(key).is_ok()
    }

    /// Read raw bytes from the device, e.g. a value located via
    /// [`find_entry`](Self::find_entry).
    pub fn read_bytes(&self, addr: u16, buf: &mut [u8]) -> Result<()> {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        if !inner.initialized {
            return Err(PrefsError::NotInitialized);
        }
        inner.dev.read(addr, buf)
    }

    /// Write (or overwrite) the entry for `key`.
    ///
    /// Any previous entry is tombstoned first, then the new entry is
    /// appended to the active block, running GC if the block is full. A
    /// power loss between the tombstone and the append loses the old value
    /// without ever exposing two live copies.
    pub fn write_entry(&mut self, key: &str, data_type: DataType, value: &[u8]) -> Result<()> {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        if !inner.initialized {
            return Err(PrefsError::NotInitialized);
        }
        self.check_key(key)?;
        if value.len() > self.config.max_value_len as usize {
            return Err(PrefsError::ValueTooLarge {
                len: value.len(),
                max: self.config.max_value_len,
            });
        }

        if let Some(old) = self.find_entry_inner(inner, key)? {
            self.mark_deleted_at(&mut inner.dev, old.header_addr)?;
        }

        let mut header = self
            .read_block_header(&mut inner.dev, inner.active_block_index)
            .map_err(|_| PrefsError::Corrupt("active block header unreadable".into()))?;
        if header.status != BlockStatus::Active {
            return Err(PrefsError::Corrupt(
                "recorded active block is not ACTIVE".into(),
            ));
        }

        let span = ENTRY_HEADER_SIZE as u32 + key.len() as u32 + value.len() as u32;
        if header.current_offset as u32 + span > self.config.block_size as u32 {
            self.run_gc(inner)?;
            header = self
                .read_block_header(&mut inner.dev, inner.active_block_index)
                .map_err(|_| PrefsError::Corrupt("active block header unreadable".into()))?;
            if header.status != BlockStatus::Active {
                return Err(PrefsError::Corrupt(
                    "post-GC active block is not ACTIVE".into(),
                ));
            }
            if header.current_offset as u32 + span > self.config.block_size as u32 {
                return Err(PrefsError::StoreFull);
            }
        }

        let entry = EntryHeader {
            status: ENTRY_LIVE,
            type_tag: data_type as u8,
            key_hash: hash_key(key.as_bytes()),
            key_length: key.len() as u8,
            value_length: value.len() as u16,
        };
        self.append_entry(
            &mut inner.dev,
            inner.active_block_index,
            &mut header,
            &entry,
            key.as_bytes(),
            value,
        )
    }

    /// Tombstone the entry for `key`. Returns whether a live entry was
    /// found and marked.
    pub fn remove(&mut self, key: &str) -> Result<bool> {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        if !inner.initialized {
            return Err(PrefsError::NotInitialized);
        }
        self.check_key(key)?;
        match self.find_entry_inner(inner, key)? {
            Some(entry) => self.mark_deleted_at(&mut inner.dev, entry.header_addr),
            None => Ok(false),
        }
    }

    /// Erase every block and reformat through the first-run path.
    pub fn clear(&mut self) -> Result<()> {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        if !inner.initialized {
            return Err(PrefsError::NotInitialized);
        }
        let erased = BlockHeader {
            status: BlockStatus::Empty,
            current_offset: BLOCK_HEADER_SIZE,
        };
        for index in 0..inner.total_blocks {
            self.write_block_header(&mut inner.dev, index, &erased)?;
        }
        inner.initialized = false;
        self.run_gc(inner)?;
        inner.initialized = true;
        Ok(())
    }

    /// Scan the device and summarize occupancy.
    pub fn stats(&self) -> Result<StoreStats> {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        if !inner.initialized {
            return Err(PrefsError::NotInitialized);
        }
        let mut stats = StoreStats {
            total_blocks: inner.total_blocks,
            active_block_index: inner.active_block_index,
            active_offset: BLOCK_HEADER_SIZE,
            active_free_bytes: 0,
            live_entries: 0,
            tombstones: 0,
            empty_blocks: 0,
        };
        for index in 0..inner.total_blocks {
            let header = match self.read_block_header(&mut inner.dev, index) {
                Ok(h) => h,
                Err(_) => continue,
            };
            match header.status {
                BlockStatus::Empty => stats.empty_blocks += 1,
                BlockStatus::Active | BlockStatus::Valid => {
                    if header.status == BlockStatus::Active {
                        stats.active_offset = header.current_offset;
                        stats.active_free_bytes =
                            self.config.block_size - header.current_offset;
                    }
                    let mut walk =
                        crate::block::EntryWalk::new(index, &header, self.config.block_size);
                    while let Some((_, entry)) = self.walk_step(&mut inner.dev, &mut walk)? {
                        if entry.is_live() {
                            stats.live_entries += 1;
                        } else {
                            stats.tombstones += 1;
                        }
                    }
                }
                BlockStatus::Invalid => {}
            }
        }
        Ok(stats)
    }

    /// Tear down and hand the device back (host-side testing).
    pub fn into_device(self) -> D {
        self.inner.into_inner().dev
    }

    // Directory scan ---------------------------------------------------

    pub(crate) fn find_entry_inner(
        &self,
        inner: &mut Inner<D>,
        key: &str,
    ) -> Result<Option<EntryInfo>> {
        let target_hash = hash_key(key.as_bytes());
        for index in 0..inner.total_blocks {
            let header = match self.read_block_header(&mut inner.dev, index) {
                Ok(h) => h,
                Err(_) => continue,
            };
            if !matches!(header.status, BlockStatus::Active | BlockStatus::Valid) {
                continue;
            }
            let mut walk = crate::block::EntryWalk::new(index, &header, self.config.block_size);
            while let Some((addr, entry)) = self.walk_step(&mut inner.dev, &mut walk)? {
                if !entry.is_live() {
                    continue;
                }
                if entry.key_hash != target_hash || entry.key_length as usize != key.len() {
                    continue;
                }
                let mut stored = vec![0u8; entry.key_length as usize];
                inner.dev.read(addr + ENTRY_HEADER_SIZE, &mut stored)?;
                if stored == key.as_bytes() {
                    return Ok(Some(EntryInfo {
                        header_addr: addr,
                        value_addr: addr + ENTRY_HEADER_SIZE + entry.key_length as u16,
                        value_len: entry.value_length,
                        data_type: DataType::from_u8(entry.type_tag),
                    }));
                }
            }
        }
        Ok(None)
    }

    // Header I/O -------------------------------------------------------

    pub(crate) fn read_global_header(dev: &mut D) -> Result<GlobalHeader> {
        let mut bytes = [0u8; GLOBAL_HEADER_SIZE as usize];
        dev.read(0, &mut bytes)?;
        GlobalHeader::from_bytes(&bytes)
    }

    pub(crate) fn write_global_header(&self, dev: &mut D, header: &GlobalHeader) -> Result<()> {
        dev.write(0, &header.to_bytes())
    }

    /// Read and validate a block header. Checksum failures and impossible
    /// offsets both surface as errors; callers skip such blocks on the
    /// read path and recycle them during GC.
    pub(crate) fn read_block_header(&self, dev: &mut D, index: u16) -> Result<BlockHeader> {
        let mut bytes = [0u8; BLOCK_HEADER_SIZE as usize];
        dev.read(block_address(index, self.config.block_size), &mut bytes)?;
        let header = BlockHeader::from_bytes(&bytes)?;
        if header.current_offset < BLOCK_HEADER_SIZE
            || header.current_offset > self.config.block_size
        {
            return Err(PrefsError::Corrupt(format!(
                "block {index} offset {} out of range",
                header.current_offset
            )));
        }
        Ok(header)
    }

    pub(crate) fn write_block_header(
        &self,
        dev: &mut D,
        index: u16,
        header: &BlockHeader,
    ) -> Result<()> {
        dev.write(
            block_address(index, self.config.block_size),
            &header.to_bytes(),
        )
    }

    fn check_key(&self, key: &str) -> Result<()> {
        if key.is_empty() {
            return Err(PrefsError::InvalidKey("key is empty".into()));
        }
        if key.len() > self.config.max_key_len as usize {
            return Err(PrefsError::InvalidKey(format!(
                "key length {} exceeds maximum {}",
                key.len(),
                self.config.max_key_len
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::SimMemory;

    fn test_store() -> MiniPrefs<SimMemory> {
        let config = PrefsConfig::default();
        let mem = SimMemory::new(config.total_memory_bytes() as usize);
        let mut store = MiniPrefs::new(config, mem).unwrap();
        store.begin().unwrap();
        store
    }

    #[test]
    fn begin_formats_fresh_device() {
        let store = test_store();
        let stats = store.stats().unwrap();
        assert_eq!(stats.total_blocks, 15);
        assert_eq!(stats.active_block_index, 0);
        assert_eq!(stats.active_offset, BLOCK_HEADER_SIZE);
        assert_eq!(stats.live_entries, 0);
        assert_eq!(stats.empty_blocks, 14);
    }

    #[test]
    fn begin_emits_valid_global_header() {
        let store = test_store();
        let mem = store.into_device();
        let bytes = mem.as_bytes();
        assert_eq!(bytes[0], crate::header::PREFS_MAGIC);
        assert_eq!(bytes[1], crate::header::PREFS_VERSION);
        let global =
            GlobalHeader::from_bytes(bytes[..7].try_into().unwrap()).unwrap();
        assert_eq!(global.total_blocks, 15);
        assert_eq!(global.active_block_index, 0);
    }

    #[test]
    fn operations_require_begin() {
        let config = PrefsConfig::default();
        let mem = SimMemory::new(config.total_memory_bytes() as usize);
        let mut store = MiniPrefs::new(config, mem).unwrap();
        assert!(matches!(
            store.write_entry("k", DataType::Bytes, b"v"),
            Err(PrefsError::NotInitialized)
        ));
        assert!(matches!(
            store.find_entry("k"),
            Err(PrefsError::NotInitialized)
        ));
        assert!(!store.has_key("k"));
        assert!(matches!(store.clear(), Err(PrefsError::NotInitialized)));
    }

    #[test]
    fn write_then_find_round_trips() {
        let mut store = test_store();
        store.write_entry("answer", DataType::Bytes, &[42]).unwrap();
        let info = store.find_entry("answer").unwrap();
        assert_eq!(info.value_len, 1);
        assert_eq!(info.data_type, DataType::Bytes);
        let mut value = [0u8; 1];
        store.read_bytes(info.value_addr, &mut value).unwrap();
        assert_eq!(value, [42]);
    }

    #[test]
    fn overwrite_tombstones_old_entry() {
        let mut store = test_store();
        store.write_entry("k", DataType::Bytes, b"one").unwrap();
        store.write_entry("k", DataType::Bytes, b"two").unwrap();

        let info = store.find_entry("k").unwrap();
        let mut value = vec![0u8; info.value_len as usize];
        store.read_bytes(info.value_addr, &mut value).unwrap();
        assert_eq!(value, b"two");

        let stats = store.stats().unwrap();
        assert_eq!(stats.live_entries, 1);
        assert_eq!(stats.tombstones, 1);
    }

    #[test]
    fn remove_is_idempotent() {
        let mut store = test_store();
        store.write_entry("k", DataType::Bytes, b"v").unwrap();
        assert!(store.remove("k").unwrap());
        assert!(!store.remove("k").unwrap());
        assert!(!store.has_key("k"));
        assert!(matches!(store.find_entry("k"), Err(PrefsError::NotFound)));
    }

    #[test]
    fn key_bounds_are_enforced() {
        let mut store = test_store();
        assert!(matches!(
            store.write_entry("", DataType::Bytes, b"v"),
            Err(PrefsError::InvalidKey(_))
        ));
        let long_key = "k".repeat(17);
        assert!(matches!(
            store.write_entry(&long_key, DataType::Bytes, b"v"),
            Err(PrefsError::InvalidKey(_))
        ));
        // 1 and max_key_len both land
        store.write_entry("k", DataType::Bytes, b"v").unwrap();
        store
            .write_entry(&"k".repeat(16), DataType::Bytes, b"v")
            .unwrap();
    }

    #[test]
    fn value_bound_is_enforced() {
        let mut store = test_store();
        let big = vec![0u8; 241];
        assert!(matches!(
            store.write_entry("k", DataType::Bytes, &big),
            Err(PrefsError::ValueTooLarge { len: 241, max: 240 })
        ));
        store.write_entry("k", DataType::Bytes, &big[..240]).unwrap();
        let info = store.find_entry("k").unwrap();
        assert_eq!(info.value_len, 240);
    }

    #[test]
    fn hash_collision_resolved_by_key_compare() {
        // Same length, different bytes: the hash filter may or may not
        // collide, the byte-for-byte compare must disambiguate either way.
        let mut store = test_store();
        store.write_entry("ab", DataType::Bytes, b"1").unwrap();
        store.write_entry("ba", DataType::Bytes, b"2").unwrap();
        let a = store.find_entry("ab").unwrap();
        let b = store.find_entry("ba").unwrap();
        let mut va = [0u8; 1];
        let mut vb = [0u8; 1];
        store.read_bytes(a.value_addr, &mut va).unwrap();
        store.read_bytes(b.value_addr, &mut vb).unwrap();
        assert_eq!(va, *b"1");
        assert_eq!(vb, *b"2");
    }

    #[test]
    fn clear_empties_the_store() {
        let mut store = test_store();
        store.write_entry("a", DataType::Bytes, b"1").unwrap();
        store.write_entry("b", DataType::Bytes, b"2").unwrap();
        store.clear().unwrap();
        assert!(!store.has_key("a"));
        assert!(!store.has_key("b"));
        let stats = store.stats().unwrap();
        assert_eq!(stats.live_entries, 0);
        assert_eq!(stats.tombstones, 0);
        // Store remains writable after clear
        store.write_entry("c", DataType::Bytes, b"3").unwrap();
        assert!(store.has_key("c"));
    }
}
