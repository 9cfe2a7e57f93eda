//! The mounted volume handle: owns the sector buffers and BPB-derived
//! constants, and exposes the eight public operations.

use alloc::sync::Arc;

use crate::bpb::{self, Volume};
use crate::device::BlockDevice;
use crate::dir;
use crate::fat;
use crate::file::{self, FileHandle};
use crate::name;
use crate::sector::SectorBuffer;
use crate::Fat32Error;

/// A mounted FAT32 volume.
///
/// Owns two sector buffers — one for directory/file data, one for FAT
/// traversal — so chain walks during a directory scan never evict the
/// directory sector currently in view. Both are single-sector staging
/// regions (§3), not a cache.
pub struct Fat32Volume {
    device: Arc<dyn BlockDevice>,
    volume: Volume,
    data_buf: SectorBuffer,
    fat_buf: SectorBuffer,
}

impl Fat32Volume {
    /// Mount the first `0x0B` partition found on `device`.
    pub fn mount(device: Arc<dyn BlockDevice>) -> Result<Self, Fat32Error> {
        let volume = bpb::mount(device.as_ref())?;
        Ok(Fat32Volume {
            device,
            volume,
            data_buf: SectorBuffer::new(),
            fat_buf: SectorBuffer::new(),
        })
    }

    /// Open the `n`th file in the root directory (0-indexed, on-disk
    /// order, skipping deleted and long-name entries).
    pub fn get_nth_file(&mut self, n: usize) -> Result<FileHandle, Fat32Error> {
        let found = dir::get_nth(self.device.as_ref(), &self.volume, &mut self.data_buf, n)?;
        Ok(self.handle_from(found))
    }

    /// Open the file named `"NAME.EXT"`.
    pub fn find_file(&mut self, short_name: &str) -> Result<FileHandle, Fat32Error> {
        let encoded = name::encode(short_name)?;
        let found = dir::find(self.device.as_ref(), &self.volume, &mut self.data_buf, &encoded)?;
        Ok(self.handle_from(found))
    }

    fn handle_from(&self, found: dir::FoundEntry) -> FileHandle {
        let offset_index = (found.location.offset / crate::DIRENT_SIZE) as u8;
        FileHandle::new(
            found.short_name,
            found.attributes,
            found.starting_cluster,
            found.file_size,
            found.location.sector,
            offset_index,
        )
    }

    /// Read up to `out.len()` bytes from `handle`'s cursor, advancing it.
    pub fn read_file(&mut self, handle: &mut FileHandle, out: &mut [u8]) -> Result<usize, Fat32Error> {
        file::read(
            self.device.as_ref(),
            &self.volume,
            &mut self.data_buf,
            &mut self.fat_buf,
            handle,
            out,
        )
    }

    /// Write `data` at `handle`'s cursor, extending the chain as needed.
    pub fn write_file(&mut self, handle: &mut FileHandle, data: &[u8]) -> Result<usize, Fat32Error> {
        file::write(
            self.device.as_ref(),
            &self.volume,
            &mut self.data_buf,
            &mut self.fat_buf,
            handle,
            data,
        )
    }

    /// Create an empty file named `"NAME.EXT"` in the root directory and
    /// return its handle.
    pub fn create_file(&mut self, short_name: &str) -> Result<FileHandle, Fat32Error> {
        let encoded = name::encode(short_name)?;
        let location = dir::allocate_slot(
            self.device.as_ref(),
            &self.volume,
            &mut self.data_buf,
            &mut self.fat_buf,
        )?;
        let cluster = fat::allocate_free(self.device.as_ref(), &self.volume, &mut self.fat_buf)?;
        dir::write_new_entry(
            self.device.as_ref(),
            &mut self.data_buf,
            location,
            &encoded,
            0,
            cluster,
        )?;
        let offset_index = (location.offset / crate::DIRENT_SIZE) as u8;
        Ok(FileHandle::new(encoded, 0, cluster, 0, location.sector, offset_index))
    }

    /// Delete `handle`'s file: free its entire cluster chain, then mark
    /// its directory slot deleted.
    pub fn delete_file(&mut self, handle: &FileHandle) -> Result<(), Fat32Error> {
        if !handle.is_open() {
            return Err(Fat32Error::InvalidFile);
        }
        if handle.starting_cluster() != 0 {
            fat::free_chain(
                self.device.as_ref(),
                &self.volume,
                &mut self.fat_buf,
                handle.starting_cluster(),
            )?;
        }
        dir::mark_deleted(self.device.as_ref(), &mut self.data_buf, handle.entry_location())?;
        Ok(())
    }

    /// Rename `handle`'s file to `"NAME.EXT"` in place.
    pub fn rename_file(&mut self, handle: &mut FileHandle, new_short_name: &str) -> Result<(), Fat32Error> {
        if !handle.is_open() {
            return Err(Fat32Error::InvalidFile);
        }
        let encoded = name::encode(new_short_name)?;
        dir::rename_entry(self.device.as_ref(), &mut self.data_buf, handle.entry_location(), &encoded)?;
        handle.set_name(&encoded);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::MemoryCard;

    fn mounted() -> Fat32Volume {
        let card: Arc<dyn BlockDevice> = Arc::new(MemoryCard::formatted());
        Fat32Volume::mount(card).unwrap()
    }

    #[test]
    fn create_find_write_read_round_trip() {
        let mut volume = mounted();
        let mut handle = volume.create_file("HI.TXT").unwrap();
        volume.write_file(&mut handle, b"hello").unwrap();

        let mut found = volume.find_file("HI.TXT").unwrap();
        let mut out = [0u8; 5];
        let n = volume.read_file(&mut found, &mut out).unwrap();
        assert_eq!(n, 5);
        assert_eq!(&out, b"hello");
    }

    #[test]
    fn create_file_allocates_a_cluster_and_zero_attributes_up_front() {
        let mut volume = mounted();
        let handle = volume.create_file("ALLOC.BIN").unwrap();
        assert_ne!(handle.starting_cluster(), 0);
    }

    #[test]
    fn delete_removes_file_from_directory() {
        let mut volume = mounted();
        let handle = volume.create_file("BYE.TXT").unwrap();
        volume.delete_file(&handle).unwrap();
        assert_eq!(volume.find_file("BYE.TXT").unwrap_err(), Fat32Error::InvalidFile);
    }

    #[test]
    fn rename_then_find_under_new_name() {
        let mut volume = mounted();
        let mut handle = volume.create_file("OLD.TXT").unwrap();
        volume.rename_file(&mut handle, "NEW.TXT").unwrap();
        assert!(volume.find_file("NEW.TXT").is_ok());
        assert_eq!(volume.find_file("OLD.TXT").unwrap_err(), Fat32Error::InvalidFile);
    }

    #[test]
    fn rename_updates_the_handles_in_memory_name() {
        let mut volume = mounted();
        let mut handle = volume.create_file("OLD.TXT").unwrap();
        volume.rename_file(&mut handle, "NEW.TXT").unwrap();
        assert_eq!(&handle.name()[..7], b"NEW.TXT");
    }

    #[test]
    fn get_nth_file_enumerates_in_creation_order() {
        let mut volume = mounted();
        volume.create_file("A.TXT").unwrap();
        volume.create_file("B.TXT").unwrap();

        let first = volume.get_nth_file(0).unwrap();
        let second = volume.get_nth_file(1).unwrap();
        assert_ne!(first.name(), second.name());
    }
}
