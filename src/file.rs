//! In-memory file handle and cursor-based read/write.
//!
//! Cluster lookup during read/write always walks the chain via
//! [`fat::next_cluster`], `linear_sector / sectors_per_cluster` times
//! from `starting_cluster`. The original C computes the target sector
//! as `starting_cluster + linear_sector / sectors_per_cluster`, which is
//! only correct for a contiguously-allocated file; this crate does not
//! reproduce that bug (spec.md §9).

use crate::bpb::Volume;
use crate::device::BlockDevice;
use crate::fat;
use crate::name::{self, ShortName};
use crate::sector::SectorBuffer;
use crate::{Fat32Error, SECTOR_SIZE};

/// A caller-owned handle to one root-directory file. Carries enough
/// state to read, write, rename or delete without re-walking the
/// directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileHandle {
    exists: bool,
    name: [u8; 13],
    attributes: u8,
    starting_cluster: u32,
    file_size: u32,
    cursor: u32,
    entry_sector: u32,
    entry_offset: u8,
}

impl FileHandle {
    /// `short_name` is the raw on-disk 8.3 form; it is decoded into the
    /// NUL-terminated `"NAME.EXT"` form before being stored.
    pub(crate) fn new(
        short_name: ShortName,
        attributes: u8,
        starting_cluster: u32,
        file_size: u32,
        entry_sector: u32,
        entry_offset: u8,
    ) -> Self {
        let mut name = [0u8; 13];
        name::decode(&short_name, &mut name);
        FileHandle {
            exists: true,
            name,
            attributes,
            starting_cluster,
            file_size,
            cursor: 0,
            entry_sector,
            entry_offset,
        }
    }

    /// An invalid, unopened handle. `is_open` returns `false`; every
    /// operation taking this handle returns `Fat32Error::InvalidFile`.
    pub fn closed() -> Self {
        FileHandle {
            exists: false,
            name: [0u8; 13],
            attributes: 0,
            starting_cluster: 0,
            file_size: 0,
            cursor: 0,
            entry_sector: 0,
            entry_offset: 0,
        }
    }

    /// Update the in-memory name after an on-disk rename. `short_name`
    /// is the freshly encoded raw 8.3 form.
    pub(crate) fn set_name(&mut self, short_name: &ShortName) {
        name::decode(short_name, &mut self.name);
    }

    pub fn is_open(&self) -> bool {
        self.exists
    }

    pub fn name(&self) -> &[u8; 13] {
        &self.name
    }

    pub fn file_size(&self) -> u32 {
        self.file_size
    }

    pub fn starting_cluster(&self) -> u32 {
        self.starting_cluster
    }

    pub fn cursor(&self) -> u32 {
        self.cursor
    }

    pub(crate) fn entry_location(&self) -> crate::dir::EntryLocation {
        crate::dir::EntryLocation {
            sector: self.entry_sector,
            offset: self.entry_offset as usize * crate::DIRENT_SIZE,
        }
    }
}

/// Walk `starting_cluster`'s chain to the cluster holding `linear_sector`
/// (0-indexed from the start of the file), via repeated `next_cluster`
/// calls — never the contiguous-allocation shortcut.
fn cluster_for_sector(
    device: &dyn BlockDevice,
    volume: &Volume,
    fat_buf: &mut SectorBuffer,
    starting_cluster: u32,
    linear_sector: u32,
) -> Result<u32, Fat32Error> {
    let mut cluster = starting_cluster;
    let mut hops = linear_sector / volume.sectors_per_cluster as u32;
    while hops > 0 {
        cluster = fat::next_cluster(device, volume, fat_buf, cluster)?
            .ok_or(Fat32Error::InvalidFile)?;
        hops -= 1;
    }
    Ok(cluster)
}

/// Read up to `out.len()` bytes starting at `handle.cursor()`, advancing
/// the cursor. Returns the number of bytes read (less than `out.len()`
/// at end of file).
pub fn read(
    device: &dyn BlockDevice,
    volume: &Volume,
    buf: &mut SectorBuffer,
    fat_buf: &mut SectorBuffer,
    handle: &mut FileHandle,
    out: &mut [u8],
) -> Result<usize, Fat32Error> {
    if !handle.exists {
        return Err(Fat32Error::InvalidFile);
    }
    let mut written = 0usize;
    while written < out.len() && handle.cursor < handle.file_size {
        let linear_sector = handle.cursor / SECTOR_SIZE as u32;
        let in_sector_offset = (handle.cursor % SECTOR_SIZE as u32) as usize;
        let cluster =
            cluster_for_sector(device, volume, fat_buf, handle.starting_cluster, linear_sector)?;
        let sector = volume.sector_of(cluster, linear_sector % volume.sectors_per_cluster as u32);
        buf.load(device, sector)?;

        let remaining_in_file = (handle.file_size - handle.cursor) as usize;
        let remaining_in_sector = SECTOR_SIZE - in_sector_offset;
        let chunk = (out.len() - written)
            .min(remaining_in_file)
            .min(remaining_in_sector);

        out[written..written + chunk]
            .copy_from_slice(&buf.bytes()[in_sector_offset..in_sector_offset + chunk]);
        written += chunk;
        handle.cursor += chunk as u32;
    }
    Ok(written)
}

/// Write `data` starting at `handle.cursor()`, extending the file's
/// cluster chain as needed and advancing the cursor. Updates the
/// directory entry's size and (for a first write to an empty file)
/// starting cluster on disk.
pub fn write(
    device: &dyn BlockDevice,
    volume: &Volume,
    buf: &mut SectorBuffer,
    fat_buf: &mut SectorBuffer,
    handle: &mut FileHandle,
    data: &[u8],
) -> Result<usize, Fat32Error> {
    if !handle.exists {
        return Err(Fat32Error::InvalidFile);
    }

    let mut written = 0usize;
    while written < data.len() {
        let linear_sector = handle.cursor / SECTOR_SIZE as u32;
        let in_sector_offset = (handle.cursor % SECTOR_SIZE as u32) as usize;

        let total_clusters_needed = linear_sector / volume.sectors_per_cluster as u32 + 1;
        let mut cluster = handle.starting_cluster;
        let mut hops = total_clusters_needed - 1;
        while hops > 0 {
            cluster = match fat::next_cluster(device, volume, fat_buf, cluster)? {
                Some(next) => next,
                None => {
                    let new_cluster = fat::allocate_free(device, volume, fat_buf)?;
                    fat::link(device, volume, fat_buf, cluster, new_cluster)?;
                    new_cluster
                }
            };
            hops -= 1;
        }

        let sector = volume.sector_of(cluster, linear_sector % volume.sectors_per_cluster as u32);
        buf.load(device, sector)?;
        let remaining_in_sector = SECTOR_SIZE - in_sector_offset;
        let chunk = (data.len() - written).min(remaining_in_sector);
        buf.bytes_mut()[in_sector_offset..in_sector_offset + chunk]
            .copy_from_slice(&data[written..written + chunk]);
        buf.flush(device)?;

        written += chunk;
        handle.cursor += chunk as u32;
        if handle.cursor > handle.file_size {
            handle.file_size = handle.cursor;
        }
    }

    crate::dir::update_entry_metadata(
        device,
        buf,
        handle.entry_location(),
        handle.starting_cluster,
        handle.file_size,
    )?;
    Ok(written)
}
