//! MBR partition discovery and BIOS Parameter Block parsing.
//!
//! Every field here is read at an explicit little-endian byte offset
//! (REDESIGN FLAG "Pointer overlays on raw sector bytes → explicit
//! parsing"). The teacher's `bpb.rs` lays a `#[repr(packed)]` struct
//! directly over the sector buffer via an unsafe pointer cast; this
//! crate never does that.

use log::{debug, warn};

use crate::device::BlockDevice;
use crate::{
    read_le_u16, read_le_u32, Fat32Error, MBR_BOOT_SIGNATURE, MBR_FAT32_PARTITION_TYPE,
    MBR_PARTITION_TABLE_OFFSET, SECTOR_SIZE,
};

const PARTITION_ENTRY_SIZE: usize = 16;
const PARTITION_ENTRY_COUNT: usize = 4;
const PARTITION_TYPE_OFFSET: usize = 4;
const PARTITION_LBA_START_OFFSET: usize = 8;

/// Mount-time constants derived from the MBR and BPB, read-only for the
/// life of the volume (spec.md §3 `Volume`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Volume {
    pub sectors_per_cluster: u8,
    pub fat_start_lba: u32,
    pub data_start_lba: u32,
    pub root_cluster: u32,
    /// FAT region size in sectors, used to bound cluster allocation
    /// scans (spec.md §9 "Out-of-space").
    pub fat_size_sectors: u32,
}

impl Volume {
    /// Sector holding `s` within `cluster`'s data, for `cluster >= 2`
    /// and `0 <= s < sectors_per_cluster`.
    pub fn sector_of(&self, cluster: u32, s: u32) -> u32 {
        self.data_start_lba + self.sectors_per_cluster as u32 * (cluster - 2) + s
    }

    /// Total number of 32-bit cluster slots addressable by the FAT
    /// region, used as the hard bound on [`crate::fat::allocate_free`].
    pub fn max_cluster_slots(&self) -> u32 {
        self.fat_size_sectors * (SECTOR_SIZE as u32 / 4)
    }
}

/// Locate the first `0x0B` (FAT32) partition entry in the MBR at LBA 0
/// and parse the BPB at its start sector.
pub fn mount(device: &dyn BlockDevice) -> Result<Volume, Fat32Error> {
    if !device.is_ready() {
        return Err(Fat32Error::NoBlockDevice);
    }

    let mut mbr = [0u8; SECTOR_SIZE];
    crate::device::read_sector_retrying(device, 0, &mut mbr)?;

    if read_le_u16(&mbr[510..512]) != MBR_BOOT_SIGNATURE {
        warn!("MBR missing boot signature");
        return Err(Fat32Error::NotFat32);
    }

    let partition_start = (0..PARTITION_ENTRY_COUNT).find_map(|i| {
        let entry = MBR_PARTITION_TABLE_OFFSET + i * PARTITION_ENTRY_SIZE;
        let kind = mbr[entry + PARTITION_TYPE_OFFSET];
        if kind == MBR_FAT32_PARTITION_TYPE {
            Some(read_le_u32(
                &mbr[entry + PARTITION_LBA_START_OFFSET..entry + PARTITION_LBA_START_OFFSET + 4],
            ))
        } else {
            warn!("MBR partition {} type {:#04x}, skipping", i, kind);
            None
        }
    });

    let partition_start = partition_start.ok_or(Fat32Error::NotFat32)?;
    debug!("FAT32 partition starts at LBA {}", partition_start);

    let mut boot = [0u8; SECTOR_SIZE];
    crate::device::read_sector_retrying(device, partition_start, &mut boot)?;

    if read_le_u16(&boot[510..512]) != MBR_BOOT_SIGNATURE {
        warn!("boot sector missing boot signature");
        return Err(Fat32Error::NotFat32);
    }

    let bytes_per_sector = read_le_u16(&boot[11..13]);
    if bytes_per_sector as usize != SECTOR_SIZE {
        warn!("unsupported bytes_per_sector {}", bytes_per_sector);
        return Err(Fat32Error::NotFat32);
    }

    let sectors_per_cluster = boot[13];
    let reserved_sector_count = read_le_u16(&boot[14..16]);
    let num_fats = boot[16] as u32;
    let fat_size_32 = read_le_u32(&boot[36..40]);
    let root_cluster = read_le_u32(&boot[44..48]);

    if fat_size_32 == 0 || root_cluster < 2 {
        warn!("BPB fields inconsistent with FAT32");
        return Err(Fat32Error::NotFat32);
    }

    let fat_start_lba = partition_start + reserved_sector_count as u32;
    let data_start_lba = fat_start_lba + num_fats * fat_size_32;

    debug!(
        "sectors_per_cluster={} fat_start_lba={} data_start_lba={} root_cluster={}",
        sectors_per_cluster, fat_start_lba, data_start_lba, root_cluster
    );

    Ok(Volume {
        sectors_per_cluster,
        fat_start_lba,
        data_start_lba,
        root_cluster,
        fat_size_sectors: fat_size_32,
    })
}
