//! Per-block entry log.
//!
//! Every non-empty block is an append-only sequence of entries after the
//! block header. Appends land at `current_offset`; once written, an entry
//! is never touched again except for the one-byte tombstone flip and the
//! GC copy that migrates it. A tombstoned entry still advertises its span
//! so the walker can step over it.

use crate::device::MemoryDevice;
use crate::error::{PrefsError, Result};
use crate::header::{
    block_address, BlockHeader, EntryHeader, BLOCK_HEADER_SIZE, ENTRY_DELETED, ENTRY_HEADER_SIZE,
    ENTRY_LIVE,
};
use crate::store::MiniPrefs;

/// Walk state over one block's entry log.
pub(crate) struct EntryWalk {
    block_start: u16,
    offset: u16,
    end: u16,
}

impl EntryWalk {
    /// Walk the entries of `block_index` as described by its header.
    pub(crate) fn new(block_index: u16, header: &BlockHeader, block_size: u16) -> Self {
        EntryWalk {
            block_start: block_address(block_index, block_size),
            offset: BLOCK_HEADER_SIZE,
            end: header.current_offset,
        }
    }
}

impl<D: MemoryDevice> MiniPrefs<D> {
    /// Advance the walk by one entry.
    ///
    /// Returns the entry's device address and decoded header, or `None`
    /// once `current_offset` is reached. A header whose lengths exceed the
    /// configured maxima (or whose span crosses `current_offset`) ends the
    /// walk: the block is corrupt past that point and nothing beyond it is
    /// trusted.
    pub(crate) fn walk_step(
        &self,
        dev: &mut D,
        walk: &mut EntryWalk,
    ) -> Result<Option<(u16, EntryHeader)>> {
        if walk.offset >= walk.end {
            return Ok(None);
        }
        if walk.offset as u32 + ENTRY_HEADER_SIZE as u32 > walk.end as u32 {
            return Ok(None);
        }
        let addr = walk.block_start + walk.offset;
        let mut bytes = [0u8; ENTRY_HEADER_SIZE as usize];
        dev.read(addr, &mut bytes)?;
        let header = EntryHeader::from_bytes(&bytes);
        if !self.entry_lengths_ok(&header) {
            tracing::warn!(addr, "corrupt entry header, abandoning block walk");
            return Ok(None);
        }
        if walk.offset as u32 + header.span() > walk.end as u32 {
            return Ok(None);
        }
        walk.offset += header.span() as u16;
        Ok(Some((addr, header)))
    }

    /// Length sanity for a decoded entry header.
    pub(crate) fn entry_lengths_ok(&self, header: &EntryHeader) -> bool {
        header.key_length >= 1
            && header.key_length <= self.config().max_key_len
            && header.value_length <= self.config().max_value_len
    }

    /// Append an entry to the block described by `header`.
    ///
    /// The entry bytes (header, key, value) go out in a single device
    /// transaction before the block header is bumped, so a crash between
    /// the two leaks the entry's span but never corrupts the log: the old
    /// `current_offset` still fences the walker off the orphaned tail.
    pub(crate) fn append_entry(
        &self,
        dev: &mut D,
        block_index: u16,
        header: &mut BlockHeader,
        entry: &EntryHeader,
        key: &[u8],
        value: &[u8],
    ) -> Result<()> {
        let span = entry.span();
        if header.current_offset as u32 + span > self.config().block_size as u32 {
            return Err(PrefsError::StoreFull);
        }

        let mut bytes = Vec::with_capacity(span as usize);
        bytes.extend_from_slice(&entry.to_bytes());
        bytes.extend_from_slice(key);
        bytes.extend_from_slice(value);

        let addr = block_address(block_index, self.config().block_size) + header.current_offset;
        dev.write(addr, &bytes)?;

        header.current_offset += span as u16;
        self.write_block_header(dev, block_index, header)
    }

    /// Flip an entry's status byte from live to tombstone.
    ///
    /// Idempotent: returns `Ok(false)` if the entry was already deleted.
    pub(crate) fn mark_deleted_at(&self, dev: &mut D, entry_addr: u16) -> Result<bool> {
        let mut bytes = [0u8; ENTRY_HEADER_SIZE as usize];
        dev.read(entry_addr, &mut bytes)?;
        let header = EntryHeader::from_bytes(&bytes);
        if header.status != ENTRY_LIVE {
            return Ok(false);
        }
        dev.write(entry_addr, &[ENTRY_DELETED])?;
        Ok(true)
    }
}
