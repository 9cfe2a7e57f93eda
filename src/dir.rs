//! Root directory manager: the shared entry walker behind
//! `get_nth_file`, `find_file`, and the insert path of `create_file`.
//!
//! Only the root directory's cluster chain is ever walked — there are
//! no subdirectories (Non-goal). VFAT long-filename entries are
//! recognized by their attribute byte and skipped, never returned.

use log::trace;

use crate::bpb::Volume;
use crate::device::BlockDevice;
use crate::entry::{DirEntry, DirEntryMut};
use crate::fat;
use crate::name::ShortName;
use crate::sector::SectorBuffer;
use crate::{
    Fat32Error, DIRENTS_PER_SECTOR, DIRENT_SIZE, DIR_ENTRY_DELETED, DIR_ENTRY_END, SECTOR_SIZE,
};

/// The location of one directory entry slot on disk, kept around so
/// callers can later delete or rename the slot without re-walking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryLocation {
    pub sector: u32,
    pub offset: usize,
}

/// A short-name entry found while walking the directory.
pub struct FoundEntry {
    pub location: EntryLocation,
    pub short_name: ShortName,
    pub attributes: u8,
    pub starting_cluster: u32,
    pub file_size: u32,
}

/// Visit every live (non-deleted, non-LFN) entry in the root directory
/// chain, in on-disk order, until `visit` returns `Some`, or the chain
/// is exhausted (`Ok(None)`).
pub fn walk<T>(
    device: &dyn BlockDevice,
    volume: &Volume,
    buf: &mut SectorBuffer,
    mut visit: impl FnMut(FoundEntry) -> Option<T>,
) -> Result<Option<T>, Fat32Error> {
    let mut cluster = volume.root_cluster;
    loop {
        for s in 0..volume.sectors_per_cluster as u32 {
            let sector = volume.sector_of(cluster, s);
            buf.load(device, sector)?;
            for slot in 0..DIRENTS_PER_SECTOR {
                let offset = slot * DIRENT_SIZE;
                let raw = &buf.bytes()[offset..offset + DIRENT_SIZE];
                let first = raw[0];
                if first == DIR_ENTRY_END {
                    return Ok(None);
                }
                if first == DIR_ENTRY_DELETED {
                    continue;
                }
                let view = DirEntry::new(raw);
                if view.is_long_name_entry() {
                    continue;
                }
                let found = FoundEntry {
                    location: EntryLocation { sector, offset },
                    short_name: view.short_name(),
                    attributes: view.attributes(),
                    starting_cluster: view.starting_cluster(),
                    file_size: view.file_size(),
                };
                if let Some(result) = visit(found) {
                    return Ok(Some(result));
                }
            }
        }
        match fat::next_cluster(device, volume, buf, cluster)? {
            Some(next) => cluster = next,
            None => return Ok(None),
        }
    }
}

/// Return the `n`th live entry (0-indexed) in on-disk order.
pub fn get_nth(
    device: &dyn BlockDevice,
    volume: &Volume,
    buf: &mut SectorBuffer,
    n: usize,
) -> Result<FoundEntry, Fat32Error> {
    let mut seen = 0usize;
    walk(device, volume, buf, |entry| {
        if seen == n {
            Some(entry)
        } else {
            seen += 1;
            None
        }
    })?
    .ok_or(Fat32Error::InvalidFile)
}

/// Return the entry whose short name matches `name` exactly (the
/// on-disk bytes, compared byte-for-byte — no case folding).
pub fn find(
    device: &dyn BlockDevice,
    volume: &Volume,
    buf: &mut SectorBuffer,
    name: &ShortName,
) -> Result<FoundEntry, Fat32Error> {
    walk(device, volume, buf, |entry| {
        if &entry.short_name == name {
            Some(entry)
        } else {
            None
        }
    })?
    .ok_or(Fat32Error::InvalidFile)
}

/// Find the first deleted-or-unused slot in the existing chain, or
/// extend the chain by one cluster and use its first slot if the chain
/// has no free slot.
pub fn allocate_slot(
    device: &dyn BlockDevice,
    volume: &Volume,
    buf: &mut SectorBuffer,
    fat_buf: &mut SectorBuffer,
) -> Result<EntryLocation, Fat32Error> {
    let mut cluster = volume.root_cluster;
    loop {
        for s in 0..volume.sectors_per_cluster as u32 {
            let sector = volume.sector_of(cluster, s);
            buf.load(device, sector)?;
            for slot in 0..DIRENTS_PER_SECTOR {
                let offset = slot * DIRENT_SIZE;
                let first = buf.bytes()[offset];
                if first == DIR_ENTRY_END || first == DIR_ENTRY_DELETED {
                    return Ok(EntryLocation { sector, offset });
                }
            }
        }
        match fat::next_cluster(device, volume, fat_buf, cluster)? {
            Some(next) => cluster = next,
            None => {
                let new_cluster = fat::allocate_free(device, volume, fat_buf)?;
                fat::link(device, volume, fat_buf, cluster, new_cluster)?;
                zero_cluster(device, volume, buf, new_cluster)?;
                trace!("extended root directory with cluster {}", new_cluster);
                cluster = new_cluster;
            }
        }
    }
}

fn zero_cluster(
    device: &dyn BlockDevice,
    volume: &Volume,
    buf: &mut SectorBuffer,
    cluster: u32,
) -> Result<(), Fat32Error> {
    let zeros = [0u8; SECTOR_SIZE];
    for s in 0..volume.sectors_per_cluster as u32 {
        let sector = volume.sector_of(cluster, s);
        buf.load(device, sector)?;
        buf.bytes_mut().copy_from_slice(&zeros);
        buf.flush(device)?;
    }
    Ok(())
}

/// Write a fresh short-name entry into `location`.
pub fn write_new_entry(
    device: &dyn BlockDevice,
    buf: &mut SectorBuffer,
    location: EntryLocation,
    name: &ShortName,
    attributes: u8,
    starting_cluster: u32,
) -> Result<(), Fat32Error> {
    buf.load(device, location.sector)?;
    let mut entry = DirEntryMut::new(&mut buf.bytes_mut()[location.offset..location.offset + DIRENT_SIZE]);
    entry.clear();
    entry.set_short_name(name);
    entry.set_attributes(attributes);
    entry.set_starting_cluster(starting_cluster);
    entry.clear_timestamps();
    buf.flush(device)
}

/// Mark `location`'s slot deleted.
pub fn mark_deleted(
    device: &dyn BlockDevice,
    buf: &mut SectorBuffer,
    location: EntryLocation,
) -> Result<(), Fat32Error> {
    buf.load(device, location.sector)?;
    let mut entry = DirEntryMut::new(&mut buf.bytes_mut()[location.offset..location.offset + DIRENT_SIZE]);
    entry.set_first_name_byte(DIR_ENTRY_DELETED);
    buf.flush(device)
}

/// Update `location`'s short name in place (rename protocol).
pub fn rename_entry(
    device: &dyn BlockDevice,
    buf: &mut SectorBuffer,
    location: EntryLocation,
    new_name: &ShortName,
) -> Result<(), Fat32Error> {
    buf.load(device, location.sector)?;
    let mut entry = DirEntryMut::new(&mut buf.bytes_mut()[location.offset..location.offset + DIRENT_SIZE]);
    entry.set_short_name(new_name);
    buf.flush(device)
}

/// Update `location`'s stored file size and starting cluster (used
/// after extending a file's chain on write).
pub fn update_entry_metadata(
    device: &dyn BlockDevice,
    buf: &mut SectorBuffer,
    location: EntryLocation,
    starting_cluster: u32,
    file_size: u32,
) -> Result<(), Fat32Error> {
    buf.load(device, location.sector)?;
    let mut entry = DirEntryMut::new(&mut buf.bytes_mut()[location.offset..location.offset + DIRENT_SIZE]);
    entry.set_starting_cluster(starting_cluster);
    entry.set_file_size(file_size);
    buf.flush(device)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::MemoryCard;

    #[test]
    fn walker_skips_deleted_and_lfn_and_stops_at_end_marker() {
        let card = MemoryCard::formatted();
        let volume = crate::bpb::mount(&card).unwrap();
        let mut buf = SectorBuffer::new();
        let mut fat_buf = SectorBuffer::new();

        let loc = allocate_slot(&card, &volume, &mut buf, &mut fat_buf).unwrap();
        write_new_entry(&card, &mut buf, loc, &crate::name::encode("A.TXT").unwrap(), crate::ATTR_ARCHIVE, 5).unwrap();

        let found = get_nth(&card, &volume, &mut buf, 0).unwrap();
        assert_eq!(found.short_name, crate::name::encode("A.TXT").unwrap());

        assert_eq!(
            get_nth(&card, &volume, &mut buf, 1).unwrap_err(),
            Fat32Error::InvalidFile
        );
    }

    #[test]
    fn walker_skips_a_long_name_entry_and_returns_the_live_entry_after_it() {
        let card = MemoryCard::formatted();
        let volume = crate::bpb::mount(&card).unwrap();
        let mut buf = SectorBuffer::new();
        let mut fat_buf = SectorBuffer::new();

        let lfn_loc = allocate_slot(&card, &volume, &mut buf, &mut fat_buf).unwrap();
        write_new_entry(&card, &mut buf, lfn_loc, &[0x41u8; 11], crate::ATTR_LONG_NAME, 0).unwrap();

        let loc = allocate_slot(&card, &volume, &mut buf, &mut fat_buf).unwrap();
        assert_ne!(loc, lfn_loc);
        let name = crate::name::encode("README.TXT").unwrap();
        write_new_entry(&card, &mut buf, loc, &name, crate::ATTR_ARCHIVE, 7).unwrap();

        let found = get_nth(&card, &volume, &mut buf, 0).unwrap();
        assert_eq!(found.short_name, name);
        assert_eq!(found.starting_cluster, 7);
    }

    #[test]
    fn find_locates_by_exact_short_name() {
        let card = MemoryCard::formatted();
        let volume = crate::bpb::mount(&card).unwrap();
        let mut buf = SectorBuffer::new();
        let mut fat_buf = SectorBuffer::new();

        let loc = allocate_slot(&card, &volume, &mut buf, &mut fat_buf).unwrap();
        let name = crate::name::encode("HELLO.TXT").unwrap();
        write_new_entry(&card, &mut buf, loc, &name, crate::ATTR_ARCHIVE, 9).unwrap();

        let found = find(&card, &volume, &mut buf, &name).unwrap();
        assert_eq!(found.starting_cluster, 9);
    }

    #[test]
    fn delete_frees_the_slot_for_reuse() {
        let card = MemoryCard::formatted();
        let volume = crate::bpb::mount(&card).unwrap();
        let mut buf = SectorBuffer::new();
        let mut fat_buf = SectorBuffer::new();

        let name = crate::name::encode("GONE.TXT").unwrap();
        let loc = allocate_slot(&card, &volume, &mut buf, &mut fat_buf).unwrap();
        write_new_entry(&card, &mut buf, loc, &name, crate::ATTR_ARCHIVE, 3).unwrap();
        mark_deleted(&card, &mut buf, loc).unwrap();

        assert_eq!(find(&card, &volume, &mut buf, &name).unwrap_err(), Fat32Error::InvalidFile);

        let reused = allocate_slot(&card, &volume, &mut buf, &mut fat_buf).unwrap();
        assert_eq!(reused, loc);
    }
}
