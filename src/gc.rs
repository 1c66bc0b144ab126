//! Garbage collection and wear leveling.
//!
//! One pass migrates every live entry into a freshly chosen empty block,
//! erases the drained sources, and commits the new active pointer. Picking
//! the target by ascending scan over empty-or-unreadable blocks, combined
//! with sources being erased behind the copy, rotates appends across the
//! whole block space; that rotation is the wear leveling.
//!
//! Every step leaves the device recoverable: the new active header goes
//! out before any source is touched, sources are only erased after their
//! live entries have landed in the target, and the global header commit
//! comes last. A crash at any point is repaired by the `begin()` paths.

use crate::block::EntryWalk;
use crate::device::MemoryDevice;
use crate::error::{PrefsError, Result};
use crate::header::{
    block_address, BlockHeader, BlockStatus, GlobalHeader, BLOCK_HEADER_SIZE,
};
use crate::store::{Inner, MiniPrefs};

impl<D: MemoryDevice> MiniPrefs<D> {
    /// Run one garbage-collection pass and rotate the active block.
    ///
    /// Also serves as the formatter: on an uninitialized device every
    /// block header is unreadable, so block 0 becomes the target, the copy
    /// pass finds nothing, and the commit writes the first global header.
    pub(crate) fn run_gc(&self, inner: &mut Inner<D>) -> Result<()> {
        let target = self.pick_gc_target(inner)?;
        tracing::debug!(block = target, "gc pass starting");

        // Demote the old active block so the copy pass drains it too.
        if inner.initialized {
            if let Ok(mut old) = self.read_block_header(&mut inner.dev, inner.active_block_index)
            {
                old.status = BlockStatus::Valid;
                self.write_block_header(&mut inner.dev, inner.active_block_index, &old)?;
            }
        }

        // Prime the target. From here on it is the sole ACTIVE block as
        // far as recovery is concerned.
        let mut target_header = BlockHeader {
            status: BlockStatus::Active,
            current_offset: BLOCK_HEADER_SIZE,
        };
        self.write_block_header(&mut inner.dev, target, &target_header)?;

        let target_start = block_address(target, self.config().block_size);
        let mut write_offset = BLOCK_HEADER_SIZE;
        let mut copied: u32 = 0;
        let mut buf = Vec::new();

        for index in 0..inner.total_blocks {
            if index == target {
                continue;
            }
            let source = match self.read_block_header(&mut inner.dev, index) {
                Ok(h) => h,
                Err(_) => continue,
            };
            if !matches!(source.status, BlockStatus::Active | BlockStatus::Valid) {
                continue;
            }

            let mut walk = EntryWalk::new(index, &source, self.config().block_size);
            while let Some((addr, entry)) = self.walk_step(&mut inner.dev, &mut walk)? {
                if !entry.is_live() {
                    continue;
                }
                let span = entry.span();
                if write_offset as u32 + span > self.config().block_size as u32 {
                    // Live data genuinely exceeds one block.
                    return Err(PrefsError::StoreFull);
                }
                buf.clear();
                buf.resize(span as usize, 0);
                inner.dev.read(addr, &mut buf)?;
                inner.dev.write(target_start + write_offset, &buf)?;
                write_offset += span as u16;
                copied += 1;
            }

            let erased = BlockHeader {
                status: BlockStatus::Empty,
                current_offset: BLOCK_HEADER_SIZE,
            };
            self.write_block_header(&mut inner.dev, index, &erased)?;
        }

        // Finalize the target, then commit the new active pointer.
        target_header.current_offset = write_offset;
        self.write_block_header(&mut inner.dev, target, &target_header)?;
        self.write_global_header(
            &mut inner.dev,
            &GlobalHeader {
                total_blocks: inner.total_blocks,
                active_block_index: target,
            },
        )?;
        inner.active_block_index = target;

        tracing::debug!(block = target, copied, offset = write_offset, "gc pass complete");
        Ok(())
    }

    /// Ascending scan for the next GC target: the first block that is
    /// EMPTY or whose header does not validate.
    fn pick_gc_target(&self, inner: &mut Inner<D>) -> Result<u16> {
        for index in 0..inner.total_blocks {
            match self.read_block_header(&mut inner.dev, index) {
                Ok(header) if header.status == BlockStatus::Empty => return Ok(index),
                Ok(_) => {}
                Err(_) => return Ok(index),
            }
        }
        Err(PrefsError::StoreFull)
    }
}
