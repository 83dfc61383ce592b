//! Fixed VHD: the raw disk followed by a 512-byte big-endian footer.

use chrono::{DateTime, Utc};
use log::info;
use std::fs::{self, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use uuid::Uuid;

use crate::disk::constants::{MIB, SECTOR_SIZE};
use crate::disk::error::{ImageError, Result};
use crate::disk::types::{random_uuid, VhdInfo};
use crate::disk::utils::append_extension;

pub const VHD_COOKIE: &[u8; 8] = b"conectix";
pub const FOOTER_SIZE: usize = 512;

const FEATURES: u32 = 0x0000_0002;
const FORMAT_VERSION: u32 = 0x0001_0000;
const FIXED_DATA_OFFSET: u64 = u64::MAX;
const CREATOR_APPLICATION: &[u8; 4] = b"elem";
const CREATOR_HOST_OS: &[u8; 4] = b"suse";
const DISK_TYPE_FIXED: u32 = 2;
/// 2000-01-01T00:00:00Z as a unix timestamp.
const VHD_EPOCH_UNIX: i64 = 946_684_800;
const CHECKSUM_FIELD: std::ops::Range<usize> = 64..68;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chs {
    pub cylinders: u16,
    pub heads: u8,
    pub sectors_per_track: u8,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VhdFooter {
    pub cookie: [u8; 8],
    pub features: u32,
    pub format_version: u32,
    pub data_offset: u64,
    pub timestamp: u32,
    pub creator_application: [u8; 4],
    pub creator_version: u32,
    pub creator_host_os: [u8; 4],
    pub original_size: u64,
    pub current_size: u64,
    pub geometry: Chs,
    pub disk_type: u32,
    pub checksum: u32,
    pub unique_id: Uuid,
    pub saved_state: u8,
}

impl VhdFooter {
    /// Footer for a fixed disk of `size` bytes, stamped now with a random id.
    pub fn new(size: u64) -> Self {
        Self::fixed(size, vhd_timestamp(Utc::now()), random_uuid())
    }

    /// Deterministic variant of [`VhdFooter::new`]; the checksum is filled in.
    pub fn fixed(size: u64, timestamp: u32, unique_id: Uuid) -> Self {
        let mut footer = Self {
            cookie: *VHD_COOKIE,
            features: FEATURES,
            format_version: FORMAT_VERSION,
            data_offset: FIXED_DATA_OFFSET,
            timestamp,
            creator_application: *CREATOR_APPLICATION,
            creator_version: 0,
            creator_host_os: *CREATOR_HOST_OS,
            original_size: size,
            current_size: size,
            geometry: chs_calculation(size / SECTOR_SIZE),
            disk_type: DISK_TYPE_FIXED,
            checksum: 0,
            unique_id,
            saved_state: 0,
        };
        footer.checksum = generate_checksum(&footer.to_bytes());
        footer
    }

    pub fn to_bytes(&self) -> [u8; FOOTER_SIZE] {
        let mut buf = [0u8; FOOTER_SIZE];
        buf[0..8].copy_from_slice(&self.cookie);
        buf[8..12].copy_from_slice(&self.features.to_be_bytes());
        buf[12..16].copy_from_slice(&self.format_version.to_be_bytes());
        buf[16..24].copy_from_slice(&self.data_offset.to_be_bytes());
        buf[24..28].copy_from_slice(&self.timestamp.to_be_bytes());
        buf[28..32].copy_from_slice(&self.creator_application);
        buf[32..36].copy_from_slice(&self.creator_version.to_be_bytes());
        buf[36..40].copy_from_slice(&self.creator_host_os);
        buf[40..48].copy_from_slice(&self.original_size.to_be_bytes());
        buf[48..56].copy_from_slice(&self.current_size.to_be_bytes());
        buf[56..58].copy_from_slice(&self.geometry.cylinders.to_be_bytes());
        buf[58] = self.geometry.heads;
        buf[59] = self.geometry.sectors_per_track;
        buf[60..64].copy_from_slice(&self.disk_type.to_be_bytes());
        buf[CHECKSUM_FIELD].copy_from_slice(&self.checksum.to_be_bytes());
        buf[68..84].copy_from_slice(self.unique_id.as_bytes());
        buf[84] = self.saved_state;
        buf
    }

    /// `None` unless the buffer starts with the `conectix` cookie.
    pub fn from_bytes(buf: &[u8; FOOTER_SIZE]) -> Option<Self> {
        if &buf[0..8] != VHD_COOKIE {
            return None;
        }
        let u32_at = |at: usize| u32::from_be_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]]);
        let u64_at = |at: usize| (u64::from(u32_at(at)) << 32) | u64::from(u32_at(at + 4));
        let four = |at: usize| {
            let mut out = [0u8; 4];
            out.copy_from_slice(&buf[at..at + 4]);
            out
        };
        let creator_application = four(28);
        let creator_host_os = four(36);
        let mut id = [0u8; 16];
        id.copy_from_slice(&buf[68..84]);
        Some(Self {
            cookie: *VHD_COOKIE,
            features: u32_at(8),
            format_version: u32_at(12),
            data_offset: u64_at(16),
            timestamp: u32_at(24),
            creator_application,
            creator_version: u32_at(32),
            creator_host_os,
            original_size: u64_at(40),
            current_size: u64_at(48),
            geometry: Chs {
                cylinders: u16::from_be_bytes([buf[56], buf[57]]),
                heads: buf[58],
                sectors_per_track: buf[59],
            },
            disk_type: u32_at(60),
            checksum: u32_at(64),
            unique_id: Uuid::from_bytes(id),
            saved_state: buf[84],
        })
    }

    pub fn checksum_valid(&self) -> bool {
        generate_checksum(&self.to_bytes()) == self.checksum
    }

    pub fn info(&self) -> VhdInfo {
        VhdInfo {
            current_size: self.current_size,
            cylinders: self.geometry.cylinders,
            heads: self.geometry.heads,
            sectors_per_track: self.geometry.sectors_per_track,
            disk_type: self.disk_type,
            unique_id: self.unique_id.to_string(),
            checksum_valid: self.checksum_valid(),
        }
    }
}

/// One's complement of the byte sum, the checksum field counted as zero.
pub fn generate_checksum(footer: &[u8; FOOTER_SIZE]) -> u32 {
    let sum = footer
        .iter()
        .enumerate()
        .filter(|(i, _)| !CHECKSUM_FIELD.contains(i))
        .fold(0u32, |acc, (_, b)| acc.wrapping_add(u32::from(*b)));
    !sum
}

/// Seconds since 2000-01-01 UTC, clamped to the field width.
pub fn vhd_timestamp(now: DateTime<Utc>) -> u32 {
    u32::try_from(now.timestamp() - VHD_EPOCH_UNIX).unwrap_or(0)
}

/// CHS geometry approximation from the VHD format appendix.
pub fn chs_calculation(sectors: u64) -> Chs {
    let total = sectors.min(65535 * 16 * 255);
    let (spt, heads, cth) = if total >= 65535 * 16 * 63 {
        (255, 16, total / 255)
    } else {
        let mut spt = 17;
        let mut cth = total / spt;
        let mut heads = (cth + 1023) / 1024;
        if heads < 4 {
            heads = 4;
        }
        if cth >= heads * 1024 || heads > 16 {
            spt = 31;
            heads = 16;
            cth = total / spt;
        }
        if cth >= heads * 1024 {
            spt = 63;
            heads = 16;
            cth = total / spt;
        }
        (spt, heads, cth)
    };
    Chs {
        cylinders: (cth / heads) as u16,
        heads: heads as u8,
        sectors_per_track: spt as u8,
    }
}

/// Pre-footer size: `ceil(size / MiB) * MiB - 512`.
pub fn vhd_data_size(actual: u64) -> u64 {
    actual.div_ceil(MIB) * MIB - FOOTER_SIZE as u64
}

/// Renames `source` to `<source>.vhd`, resizes it and appends the footer.
pub fn raw_to_vhd(source: &Path) -> Result<PathBuf> {
    info!("transforming {} into a fixed VHD", source.display());
    let conv = |step, path: &Path, e: io::Error| ImageError::conversion("vhd", step, path, e);

    let vhd = append_extension(source, "vhd");
    fs::rename(source, &vhd).map_err(|e| conv("rename", source, e))?;

    let mut file = OpenOptions::new()
        .read(true)
        .write(true)
        .open(&vhd)
        .map_err(|e| conv("open", &vhd, e))?;
    let actual = file.metadata().map_err(|e| conv("stat", &vhd, e))?.len();
    if actual == 0 {
        return Err(ImageError::conversion(
            "vhd",
            "resize",
            &vhd,
            anyhow::anyhow!("image is empty"),
        ));
    }
    let final_size = vhd_data_size(actual);
    if actual != final_size {
        file.set_len(final_size).map_err(|e| conv("resize", &vhd, e))?;
    }

    let size = file.metadata().map_err(|e| conv("stat", &vhd, e))?.len();
    let footer = VhdFooter::new(size);
    file.seek(SeekFrom::End(0)).map_err(|e| conv("seek", &vhd, e))?;
    file.write_all(&footer.to_bytes())
        .map_err(|e| conv("write footer", &vhd, e))?;
    file.sync_all().map_err(|e| conv("sync", &vhd, e))?;
    drop(file);

    let len = fs::metadata(&vhd).map_err(|e| conv("stat", &vhd, e))?.len();
    if len % MIB != 0 {
        return Err(ImageError::InvalidVhdAlignment {
            path: vhd,
            size: len,
        });
    }
    info!("wrote {} ({len} bytes)", vhd.display());
    Ok(vhd)
}

/// Footer in the last 512 bytes of `path`, if any.
pub fn read_footer(path: &Path) -> io::Result<Option<VhdFooter>> {
    let mut file = fs::File::open(path)?;
    let len = file.metadata()?.len();
    if len < FOOTER_SIZE as u64 {
        return Ok(None);
    }
    file.seek(SeekFrom::End(-(FOOTER_SIZE as i64)))?;
    let mut buf = [0u8; FOOTER_SIZE];
    file.read_exact(&mut buf)?;
    Ok(VhdFooter::from_bytes(&buf))
}
