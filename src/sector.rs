//! Owned sector staging region.
//!
//! The teacher's `block_cache.rs`/`cache.rs` keep a 64-entry LRU of
//! sectors behind a global `lazy_static!` lock so any call site can reach
//! in without threading a handle through. This crate's concurrency model
//! needs at most one resident sector at a time, so the cache collapses to
//! a single owned buffer carried as a field on [`crate::Fat32Volume`]
//! instead of global state (REDESIGN FLAG "Shared mutable buffer → owned
//! staging region").

use log::{debug, trace};

use crate::device::{read_sector_retrying, BlockDevice};
use crate::{Fat32Error, SECTOR_SIZE};

/// The single 512-byte staging region a volume reads and writes through.
///
/// Loading a different sector invalidates whatever was resident before;
/// there is never more than one sector live at a time.
pub struct SectorBuffer {
    data: [u8; SECTOR_SIZE],
    resident: Option<u32>,
    dirty: bool,
}

impl SectorBuffer {
    pub fn new() -> Self {
        SectorBuffer {
            data: [0u8; SECTOR_SIZE],
            resident: None,
            dirty: false,
        }
    }

    /// Which LBA is currently staged, if any.
    pub fn resident_lba(&self) -> Option<u32> {
        self.resident
    }

    /// Load `lba` into the staging region, flushing any dirty resident
    /// sector first. A no-op if `lba` is already resident.
    pub fn load(&mut self, device: &dyn BlockDevice, lba: u32) -> Result<(), Fat32Error> {
        if self.resident == Some(lba) {
            return Ok(());
        }
        self.flush(device)?;
        trace!("loading sector {}", lba);
        read_sector_retrying(device, lba, &mut self.data)?;
        self.resident = Some(lba);
        self.dirty = false;
        Ok(())
    }

    /// Borrow the staged sector's bytes. Panics if nothing is loaded —
    /// callers always `load` before reading.
    pub fn bytes(&self) -> &[u8; SECTOR_SIZE] {
        debug_assert!(self.resident.is_some(), "sector buffer read before load");
        &self.data
    }

    /// Mutably borrow the staged sector's bytes, marking it dirty.
    pub fn bytes_mut(&mut self) -> &mut [u8; SECTOR_SIZE] {
        debug_assert!(self.resident.is_some(), "sector buffer written before load");
        self.dirty = true;
        &mut self.data
    }

    /// Write the staged sector back to the device if it has been
    /// modified since load.
    pub fn flush(&mut self, device: &dyn BlockDevice) -> Result<(), Fat32Error> {
        if let (true, Some(lba)) = (self.dirty, self.resident) {
            debug!("flushing sector {}", lba);
            device.write_sector(lba, &self.data);
            self.dirty = false;
        }
        Ok(())
    }
}

impl Default for SectorBuffer {
    fn default() -> Self {
        Self::new()
    }
}
