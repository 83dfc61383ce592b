use anyhow::Result;
use log::debug;
use std::path::Path;

use crate::disk::convert::read_footer;
use crate::disk::gpt::{map_partitions, open_gpt};
use crate::disk::types::DiskInfo;
use crate::disk::utils::format_mib;

/// Size, GPT partitions and VHD footer of `disk`. An unreadable GPT yields no partitions.
pub fn inspect(disk: &Path) -> Result<DiskInfo> {
    let disk_size = std::fs::metadata(disk)?.len();

    let partitions = match open_gpt(disk, false) {
        Ok(gdisk) => map_partitions(&gdisk)?,
        Err(e) => {
            debug!("no readable GPT on {}: {e}", disk.display());
            Vec::new()
        }
    };
    let vhd = read_footer(disk)?.map(|footer| footer.info());

    Ok(DiskInfo {
        disk: disk.display().to_string(),
        size_bytes: disk_size,
        partitions,
        vhd,
    })
}

pub fn info(disk: &Path, json: bool) -> Result<()> {
    let info = inspect(disk)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&info)?);
        return Ok(());
    }

    println!(
        "Disk: {} ({} M, {} bytes)",
        info.disk,
        format_mib(info.size_bytes),
        info.size_bytes
    );
    if info.partitions.is_empty() {
        println!("No readable GPT partition table.");
    }
    for p in &info.partitions {
        println!(
            "{:>3} {:<16} lba={}..{} start={} M size={} M",
            p.index,
            p.name,
            p.first_lba,
            p.last_lba,
            format_mib(p.start_bytes),
            format_mib(p.size_bytes)
        );
    }
    if let Some(vhd) = &info.vhd {
        println!(
            "VHD footer: size={} chs={}/{}/{} type={} id={} checksum={}",
            vhd.current_size,
            vhd.cylinders,
            vhd.heads,
            vhd.sectors_per_track,
            vhd.disk_type,
            vhd.unique_id,
            if vhd.checksum_valid { "ok" } else { "bad" }
        );
    }
    Ok(())
}
