//! FAT cluster allocator: chain traversal, linking, freeing and
//! allocation, all through the volume's single [`SectorBuffer`].

use log::{debug, trace};

use crate::bpb::Volume;
use crate::device::BlockDevice;
use crate::sector::SectorBuffer;
use crate::{classify_cluster, ClusterState, Fat32Error, CLUSTER_EOC, CLUSTER_VALUE_MASK};

fn fat_location(volume: &Volume, cluster: u32) -> (u32, usize) {
    let fat_byte_offset = cluster as usize * 4;
    let sector = volume.fat_start_lba + (fat_byte_offset / crate::SECTOR_SIZE) as u32;
    let offset_in_sector = fat_byte_offset % crate::SECTOR_SIZE;
    (sector, offset_in_sector)
}

fn read_entry(
    device: &dyn BlockDevice,
    volume: &Volume,
    buf: &mut SectorBuffer,
    cluster: u32,
) -> Result<u32, Fat32Error> {
    let (sector, offset) = fat_location(volume, cluster);
    buf.load(device, sector)?;
    Ok(crate::read_le_u32(&buf.bytes()[offset..offset + 4]))
}

fn write_entry(
    device: &dyn BlockDevice,
    volume: &Volume,
    buf: &mut SectorBuffer,
    cluster: u32,
    value: u32,
) -> Result<(), Fat32Error> {
    let (sector, offset) = fat_location(volume, cluster);
    buf.load(device, sector)?;
    let raw = crate::read_le_u32(&buf.bytes()[offset..offset + 4]);
    let preserved_high_bits = raw & !CLUSTER_VALUE_MASK;
    let merged = preserved_high_bits | (value & CLUSTER_VALUE_MASK);
    crate::write_le_u32(&mut buf.bytes_mut()[offset..offset + 4], merged);
    buf.flush(device)
}

/// Follow one link in `cluster`'s chain. `Ok(None)` means end-of-chain.
pub fn next_cluster(
    device: &dyn BlockDevice,
    volume: &Volume,
    buf: &mut SectorBuffer,
    cluster: u32,
) -> Result<Option<u32>, Fat32Error> {
    let raw = read_entry(device, volume, buf, cluster)?;
    match classify_cluster(raw) {
        ClusterState::Valid(next) => Ok(Some(next)),
        ClusterState::EndOfChain => Ok(None),
        ClusterState::Free | ClusterState::Bad => Err(Fat32Error::FsError),
    }
}

/// Point `from`'s FAT entry at `to`, preserving `from`'s reserved high
/// bits.
pub fn link(
    device: &dyn BlockDevice,
    volume: &Volume,
    buf: &mut SectorBuffer,
    from: u32,
    to: u32,
) -> Result<(), Fat32Error> {
    write_entry(device, volume, buf, from, to)
}

/// Terminate `cluster`'s chain with the end-of-chain marker.
pub fn terminate_chain(
    device: &dyn BlockDevice,
    volume: &Volume,
    buf: &mut SectorBuffer,
    cluster: u32,
) -> Result<(), Fat32Error> {
    write_entry(device, volume, buf, cluster, CLUSTER_EOC)
}

/// Free every cluster in the chain starting at `start`, inclusive.
pub fn free_chain(
    device: &dyn BlockDevice,
    volume: &Volume,
    buf: &mut SectorBuffer,
    start: u32,
) -> Result<(), Fat32Error> {
    let mut current = start;
    loop {
        let raw = read_entry(device, volume, buf, current)?;
        let next = classify_cluster(raw);
        write_entry(device, volume, buf, current, 0)?;
        trace!("freed cluster {}", current);
        match next {
            ClusterState::Valid(n) => current = n,
            ClusterState::EndOfChain => break,
            ClusterState::Free | ClusterState::Bad => return Err(Fat32Error::FsError),
        }
    }
    Ok(())
}

/// Find one free cluster and mark it end-of-chain, scanning at most
/// [`crate::bpb::Volume::max_cluster_slots`] entries before giving up
/// with [`Fat32Error::FsError`] (spec.md §9 "Out-of-space").
pub fn allocate_free(
    device: &dyn BlockDevice,
    volume: &Volume,
    buf: &mut SectorBuffer,
) -> Result<u32, Fat32Error> {
    let limit = volume.max_cluster_slots();
    for candidate in (volume.root_cluster + 1)..limit {
        let raw = read_entry(device, volume, buf, candidate)?;
        if classify_cluster(raw) == ClusterState::Free {
            terminate_chain(device, volume, buf, candidate)?;
            debug!("allocated cluster {}", candidate);
            return Ok(candidate);
        }
    }
    Err(Fat32Error::FsError)
}
