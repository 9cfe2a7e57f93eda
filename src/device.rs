//! Block device interface.
//!
//! The SD/SPI card handshake, CRC, CMD/ACMD framing and CSD/OCR parsing
//! live below this trait and are out of scope for this crate. A volume
//! only ever asks for one 512-byte sector at a time.

use log::{error, warn};

use crate::{Fat32Error, READ_SECTOR_RETRIES, SECTOR_SIZE};

/// A single-sector-addressable block device.
///
/// Implementations back this with whatever is attached: an SPI SD card,
/// a RAM disk, or (in tests) a `Vec<u8>`.
pub trait BlockDevice: Send + Sync {
    /// Whether the device is initialized and able to service reads/writes.
    fn is_ready(&self) -> bool;

    /// Read the 512-byte sector at `lba` into `out`. Returns `false` on
    /// I/O failure; the caller retries.
    fn read_sector(&self, lba: u32, out: &mut [u8; SECTOR_SIZE]) -> bool;

    /// Write `data` as the 512-byte sector at `lba`.
    fn write_sector(&self, lba: u32, data: &[u8; SECTOR_SIZE]);
}

/// Read a sector, retrying up to [`READ_SECTOR_RETRIES`] times before
/// surfacing [`Fat32Error::BlockIoError`].
pub(crate) fn read_sector_retrying(
    device: &dyn BlockDevice,
    lba: u32,
    out: &mut [u8; SECTOR_SIZE],
) -> Result<(), Fat32Error> {
    for attempt in 0..READ_SECTOR_RETRIES {
        if device.read_sector(lba, out) {
            return Ok(());
        }
        warn!("sector {} read failed, attempt {}", lba, attempt + 1);
    }
    error!("sector {} read failed after {} attempts", lba, READ_SECTOR_RETRIES);
    Err(Fat32Error::BlockIoError)
}
