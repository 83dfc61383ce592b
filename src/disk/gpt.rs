use anyhow::{anyhow, bail, Context, Result};
use gpt::{disk::LogicalBlockSize, mbr::ProtectiveMBR, partition::Partition, GptConfig};
use log::debug;
use std::collections::BTreeMap;
use std::{fs::File, path::Path};

use super::constants::{DISK_GUID, SECTOR_SIZE};
use super::layout::DiskLayout;
use super::types::PartitionInfo;

pub fn open_gpt(disk: &Path, writable: bool) -> Result<gpt::GptDisk<File>> {
    GptConfig::new()
        .writable(writable)
        .logical_block_size(LogicalBlockSize::Lb512)
        .open(disk)
        .map_err(|e| anyhow!("failed to open GPT: {e}"))
}

pub fn map_partitions(gdisk: &gpt::GptDisk<File>) -> Result<Vec<PartitionInfo>> {
    let mut out = Vec::new();
    for (idx, part) in gdisk.partitions().iter() {
        if !part.is_used() {
            continue;
        }
        let start = part
            .bytes_start(LogicalBlockSize::Lb512)
            .map_err(|e| anyhow!("invalid partition start: {e}"))?;
        let size = part
            .bytes_len(LogicalBlockSize::Lb512)
            .map_err(|e| anyhow!("invalid partition size: {e}"))?;
        out.push(PartitionInfo {
            index: *idx,
            name: part.name.clone(),
            type_guid: part.part_type_guid.guid.to_string(),
            guid: part.part_guid.to_string(),
            first_lba: part.first_lba,
            last_lba: part.last_lba,
            start_bytes: start,
            size_bytes: size,
        });
    }
    out.sort_by_key(|p| p.index);
    Ok(out)
}

/// Writes a protective MBR and a GPT holding exactly the partitions of
/// `layout`, numbered from 1 in layout order. GUIDs are name-derived.
pub fn write_partition_table(disk: &Path, layout: &DiskLayout) -> Result<()> {
    if layout.sector_size != SECTOR_SIZE {
        bail!("unsupported logical sector size {}", layout.sector_size);
    }
    let mut file = std::fs::OpenOptions::new()
        .read(true)
        .write(true)
        .open(disk)
        .with_context(|| format!("failed to open disk {}", disk.display()))?;
    let len = file.metadata()?.len();
    let needed = (layout.end_sector() + 34) * SECTOR_SIZE;
    if len < needed {
        bail!("disk is {len} bytes, layout needs at least {needed}");
    }

    let mbr =
        ProtectiveMBR::with_lb_size(u32::try_from(len / SECTOR_SIZE - 1).unwrap_or(0xFFFF_FFFF));
    mbr.overwrite_lba0(&mut file)
        .map_err(|e| anyhow!("failed to write protective MBR: {e}"))?;

    let mut gdisk = GptConfig::new()
        .writable(true)
        .logical_block_size(LogicalBlockSize::Lb512)
        .create_from_device(file, Some(DISK_GUID))
        .map_err(|e| anyhow!("failed to create GPT: {e}"))?;

    let mut parts = BTreeMap::new();
    for (i, planned) in layout.partitions.iter().enumerate() {
        let id = u32::try_from(i + 1)?;
        debug!(
            "partition {id} {} sectors {}..={}",
            planned.name, planned.range.start, planned.range.end
        );
        parts.insert(
            id,
            Partition {
                part_type_guid: planned.role.type_guid(),
                part_guid: planned.role.partition_guid(),
                first_lba: planned.range.start,
                last_lba: planned.range.end,
                flags: planned.role.attributes(),
                name: planned.name.clone(),
            },
        );
    }
    gdisk
        .update_partitions(parts)
        .map_err(|e| anyhow!("failed to set partitions: {e}"))?;

    let _ = gdisk
        .write()
        .map_err(|e| anyhow!("failed to write GPT: {e}"))?;
    Ok(())
}
