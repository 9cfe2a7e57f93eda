//! `std`-gated in-memory `BlockDevice` used by unit and scenario tests.
//!
//! Grounded on `rrbutani-fatfs/tests/file_backed.rs`'s file-backed
//! storage fixture, adapted to a `Vec<u8>` since this crate is `no_std`
//! and a test binary is the only place `std` is available anyway.

use std::sync::Mutex;
use std::vec;
use std::vec::Vec;

use crate::device::BlockDevice;
use crate::{read_le_u16, read_le_u32, write_le_u16, write_le_u32, SECTOR_SIZE};

/// A `Vec<u8>`-backed block device, formatted at construction time with
/// a minimal but valid MBR + BPB + FAT + empty root directory.
pub struct MemoryCard {
    sectors: Mutex<Vec<u8>>,
    ready: bool,
}

const RESERVED_SECTORS: u32 = 1;
const NUM_FATS: u32 = 1;

impl MemoryCard {
    fn blank_image(total_sectors: u32) -> Vec<u8> {
        vec![0u8; total_sectors as usize * SECTOR_SIZE]
    }

    /// A device with no recognizable MBR at all — used to exercise the
    /// mount-failure path.
    pub fn blank(total_sectors: u32) -> Self {
        MemoryCard {
            sectors: Mutex::new(Self::blank_image(total_sectors)),
            ready: true,
        }
    }

    fn build(total_sectors: u32, sectors_per_cluster: u8, fat_size_sectors: u32) -> Self {
        let mut image = Self::blank_image(total_sectors);
        let partition_start = 1u32;

        write_le_u16(&mut image[510..512], crate::MBR_BOOT_SIGNATURE);
        let entry = crate::MBR_PARTITION_TABLE_OFFSET;
        image[entry + 4] = crate::MBR_FAT32_PARTITION_TYPE;
        write_le_u32(&mut image[entry + 8..entry + 12], partition_start);
        write_le_u32(
            &mut image[entry + 12..entry + 16],
            total_sectors - partition_start,
        );

        let boot = partition_start as usize * SECTOR_SIZE;
        write_le_u16(&mut image[boot + 11..boot + 13], SECTOR_SIZE as u16);
        image[boot + 13] = sectors_per_cluster;
        write_le_u16(&mut image[boot + 14..boot + 16], RESERVED_SECTORS as u16);
        image[boot + 16] = NUM_FATS as u8;
        write_le_u32(&mut image[boot + 36..boot + 40], fat_size_sectors);
        write_le_u32(&mut image[boot + 44..boot + 48], 2);
        write_le_u16(&mut image[boot + 510..boot + 512], crate::MBR_BOOT_SIGNATURE);

        let fat_start = partition_start + RESERVED_SECTORS;
        let data_start = fat_start + NUM_FATS * fat_size_sectors;

        let fat0 = fat_start as usize * SECTOR_SIZE;
        write_le_u32(&mut image[fat0..fat0 + 4], 0x0FFF_FFF8);
        write_le_u32(&mut image[fat0 + 4..fat0 + 8], 0x0FFF_FFFF);
        write_le_u32(&mut image[fat0 + 8..fat0 + 12], 0x0FFF_FFFF);

        let _ = data_start;
        MemoryCard {
            sectors: Mutex::new(image),
            ready: true,
        }
    }

    /// A generously sized, generously allocated FAT32 image: 4096
    /// sectors, 1 sector per cluster, 16-sector FAT.
    pub fn formatted() -> Self {
        Self::build(4096, 1, 16)
    }

    /// Multiple sectors per cluster, for exercising chain extension
    /// across sector boundaries within one cluster and across clusters.
    pub fn single_sector_clusters() -> Self {
        Self::build(4096, 1, 16)
    }

    /// A FAT region small enough that `allocate_free` exhausts quickly.
    pub fn tiny_fat() -> Self {
        Self::build(256, 1, 1)
    }

    fn total_sectors(&self) -> usize {
        self.sectors.lock().unwrap().len() / SECTOR_SIZE
    }
}

impl BlockDevice for MemoryCard {
    fn is_ready(&self) -> bool {
        self.ready
    }

    fn read_sector(&self, lba: u32, out: &mut [u8; SECTOR_SIZE]) -> bool {
        if lba as usize >= self.total_sectors() {
            return false;
        }
        let sectors = self.sectors.lock().unwrap();
        let start = lba as usize * SECTOR_SIZE;
        out.copy_from_slice(&sectors[start..start + SECTOR_SIZE]);
        true
    }

    fn write_sector(&self, lba: u32, data: &[u8; SECTOR_SIZE]) {
        let mut sectors = self.sectors.lock().unwrap();
        let start = lba as usize * SECTOR_SIZE;
        sectors[start..start + SECTOR_SIZE].copy_from_slice(data);
    }
}

#[allow(dead_code)]
pub(crate) fn peek_u16(card: &MemoryCard, lba: u32, offset: usize) -> u16 {
    let sectors = card.sectors.lock().unwrap();
    let start = lba as usize * SECTOR_SIZE + offset;
    read_le_u16(&sectors[start..start + 2])
}

#[allow(dead_code)]
pub(crate) fn peek_u32(card: &MemoryCard, lba: u32, offset: usize) -> u32 {
    let sectors = card.sectors.lock().unwrap();
    let start = lba as usize * SECTOR_SIZE + offset;
    read_le_u32(&sectors[start..start + 4])
}
