use anyhow::{bail, Context};
use log::{debug, info};
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use super::constants::{END_PADDING_BYTES, INIT_PADDING_BYTES, SECTOR_SIZE};
use super::error::{ImageError, Result};
use super::gpt::write_partition_table;
use super::layout::DiskLayout;
use super::staging::{ScratchFile, StagingContext};
use super::types::PartitionRole;
use super::utils::round_to_nearest_sector;

/// Partition images produced by staging, in disk order after BIOS-boot.
#[derive(Debug, Clone)]
pub struct PartitionImages {
    pub efi: PathBuf,
    pub oem: PathBuf,
    pub recovery: PathBuf,
}

pub fn create_blank_image(path: &Path, size_bytes: u64) -> anyhow::Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).with_context(|| {
            format!("failed to create parent directory: {}", parent.display())
        })?;
    }
    let file = OpenOptions::new()
        .create(true)
        .truncate(true)
        .write(true)
        .open(path)
        .with_context(|| format!("failed to create image {}", path.display()))?;
    file.set_len(size_bytes)
        .with_context(|| "failed to set image size".to_string())?;
    Ok(())
}

/// Length of a partition image. Empty images have no sector range.
fn image_len(path: &Path) -> Result<u64> {
    let len = fs::metadata(path)
        .map(|m| m.len())
        .map_err(|e| ImageError::sizing(path, e))?;
    if len == 0 {
        let empty = io::Error::new(io::ErrorKind::InvalidData, "partition image is empty");
        return Err(ImageError::sizing(path, empty));
    }
    Ok(len)
}

/// Concatenates padding and partition images into `output`, then writes the
/// GPT. `output` is removed again if any step fails.
pub fn assemble_disk(
    ctx: &StagingContext,
    images: &PartitionImages,
    output: &Path,
) -> Result<DiskLayout> {
    let layout = DiskLayout::for_images(
        image_len(&images.efi)?,
        image_len(&images.oem)?,
        image_len(&images.recovery)?,
    );

    let init = ctx.image("init.img");
    create_blank_image(init.path(), INIT_PADDING_BYTES)
        .map_err(|e| ImageError::assembly("create init padding", init.path(), e))?;
    let end = ctx.image("end.img");
    create_blank_image(end.path(), END_PADDING_BYTES)
        .map_err(|e| ImageError::assembly("create end padding", end.path(), e))?;

    let out_guard = ScratchFile::at(output);
    let parts = [
        (PartitionRole::Efi, images.efi.as_path()),
        (PartitionRole::Oem, images.oem.as_path()),
        (PartitionRole::Recovery, images.recovery.as_path()),
    ];
    concatenate(init.path(), &parts, end.path(), &layout, output)
        .map_err(|e| ImageError::assembly("concatenate", output, e))?;
    drop(init);
    drop(end);

    let len = truncate_to_sector(output).map_err(|e| ImageError::assembly("truncate", output, e))?;
    debug!("assembled {} bytes into {}", len, output.display());

    write_partition_table(output, &layout)
        .map_err(|e| ImageError::assembly("write partition table", output, e))?;
    info!(
        "wrote GPT with {} partitions to {}",
        layout.partitions.len(),
        output.display()
    );
    out_guard.persist();
    Ok(layout)
}

fn concatenate(
    init: &Path,
    parts: &[(PartitionRole, &Path)],
    end: &Path,
    layout: &DiskLayout,
    output: &Path,
) -> anyhow::Result<()> {
    let out = File::create(output).with_context(|| format!("create {}", output.display()))?;
    let mut writer = BufWriter::new(out);

    append(&mut writer, init, None)?;
    for (role, path) in parts {
        let Some(planned) = layout.get(*role) else {
            bail!("no layout entry for {role:?}");
        };
        append(&mut writer, path, Some(planned.size_bytes))?;
    }
    append(&mut writer, end, None)?;

    writer.flush()?;
    writer
        .into_inner()
        .map_err(|e| e.into_error())?
        .sync_all()?;
    Ok(())
}

/// Copies `src` and zero-fills up to `padded_len` so each image ends on its
/// planned sector boundary.
fn append(writer: &mut impl Write, src: &Path, padded_len: Option<u64>) -> anyhow::Result<()> {
    let mut input = File::open(src).with_context(|| format!("open {}", src.display()))?;
    let copied = io::copy(&mut input, writer).with_context(|| format!("copy {}", src.display()))?;
    if let Some(padded) = padded_len
        && padded > copied
    {
        io::copy(&mut io::repeat(0).take(padded - copied), writer)?;
    }
    Ok(())
}

fn truncate_to_sector(path: &Path) -> anyhow::Result<u64> {
    let file = OpenOptions::new().write(true).open(path)?;
    let len = file.metadata()?.len();
    let rounded = round_to_nearest_sector(len, SECTOR_SIZE);
    if rounded != len {
        file.set_len(rounded)?;
    }
    Ok(rounded)
}

/// Sparse-extends `path` to at least `final_size` bytes. Never shrinks.
///
/// The target is rounded up to a whole sector so the disk length stays a
/// sector multiple: asking for `512 MiB + 1` yields `512 MiB + 512`, not the
/// exact byte count. Returns the resulting length.
pub fn extend_to_final_size(path: &Path, final_size: u64) -> Result<u64> {
    let file = OpenOptions::new()
        .write(true)
        .open(path)
        .map_err(|e| ImageError::assembly("open for final size", path, e))?;
    let len = file
        .metadata()
        .map_err(|e| ImageError::assembly("stat for final size", path, e))?
        .len();
    let target = round_to_nearest_sector(final_size, SECTOR_SIZE);
    if final_size == 0 || target <= len {
        return Ok(len);
    }
    file.set_len(target)
        .map_err(|e| ImageError::assembly("extend to final size", path, e))?;
    info!("extended {} to {target} bytes", path.display());
    Ok(target)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::disk::constants::MIB;

    #[test]
    fn final_size_never_shrinks() {
        let temp = tempfile::TempDir::new().expect("temp dir");
        let disk = temp.path().join("disk.raw");
        create_blank_image(&disk, 8 * MIB).expect("create");

        assert_eq!(extend_to_final_size(&disk, 0).unwrap(), 8 * MIB);
        assert_eq!(extend_to_final_size(&disk, 4 * MIB).unwrap(), 8 * MIB);
        assert_eq!(extend_to_final_size(&disk, 16 * MIB + 1).unwrap(), 16 * MIB + 512);
        assert_eq!(fs::metadata(&disk).unwrap().len(), 16 * MIB + 512);
    }

    #[test]
    fn odd_sized_images_are_padded_to_their_ranges() {
        let ctx = StagingContext::new().expect("context");
        let efi = ctx.root().join("efi.img");
        let oem = ctx.root().join("oem.img");
        let recovery = ctx.root().join("recovery.img");
        fs::write(&efi, vec![0xAAu8; 1000]).expect("efi");
        create_blank_image(&oem, MIB).expect("oem");
        create_blank_image(&recovery, 2 * MIB).expect("recovery");

        let output = ctx.root().join("out/disk.raw");
        fs::create_dir_all(output.parent().unwrap()).expect("mkdir");
        let layout = assemble_disk(
            &ctx,
            &PartitionImages {
                efi,
                oem,
                recovery,
            },
            &output,
        )
        .expect("assemble");

        let len = fs::metadata(&output).unwrap().len();
        assert_eq!(len % SECTOR_SIZE, 0);
        assert_eq!(
            len,
            INIT_PADDING_BYTES + 1024 + MIB + 2 * MIB + END_PADDING_BYTES
        );
        let efi_range = layout.get(PartitionRole::Efi).unwrap().range;
        assert_eq!(efi_range.sectors(), 2);

        let disk = fs::read(&output).unwrap();
        let off = (efi_range.start * SECTOR_SIZE) as usize;
        assert!(disk[off..off + 1000].iter().all(|b| *b == 0xAA));
        assert!(disk[off + 1000..off + 1024].iter().all(|b| *b == 0));
        assert!(!ctx.root().join("init.img").exists());
        assert!(!ctx.root().join("end.img").exists());
    }

    #[test]
    fn empty_image_is_a_sizing_error() {
        let ctx = StagingContext::new().expect("context");
        let efi = ctx.root().join("efi.img");
        let oem = ctx.root().join("oem.img");
        let recovery = ctx.root().join("recovery.img");
        fs::write(&efi, b"").expect("efi");
        create_blank_image(&oem, MIB).expect("oem");
        create_blank_image(&recovery, MIB).expect("recovery");

        let output = ctx.root().join("disk.raw");
        let images = PartitionImages {
            efi: efi.clone(),
            oem,
            recovery,
        };
        let err = assemble_disk(&ctx, &images, &output).unwrap_err();
        assert!(matches!(err, ImageError::SizeCalculation { ref path, .. } if *path == efi));
        assert_eq!(err.phase(), crate::disk::Phase::Sizing);
        assert!(!output.exists());
    }

    #[test]
    fn missing_image_is_a_sizing_error_and_leaves_no_output() {
        let ctx = StagingContext::new().expect("context");
        let output = ctx.root().join("disk.raw");
        let err = assemble_disk(
            &ctx,
            &PartitionImages {
                efi: ctx.root().join("efi.img"),
                oem: ctx.root().join("oem.img"),
                recovery: ctx.root().join("recovery.img"),
            },
            &output,
        )
        .unwrap_err();
        assert!(matches!(err, ImageError::SizeCalculation { .. }));
        assert!(!output.exists());
    }
}
