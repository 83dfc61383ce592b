use flate2::write::GzEncoder;
use flate2::Compression;
use log::info;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use crate::disk::constants::GIB;
use crate::disk::error::{ImageError, Result};
use crate::disk::utils::append_extension;

pub const GCE_ENTRY_NAME: &str = "disk.raw";

/// `(size / align + 1) * align`. Aligned inputs still grow by one unit.
pub fn gce_target_size(actual: u64, align: u64) -> u64 {
    (actual / align + 1) * align
}

/// Grows `source` to the next whole GiB, packs it as `disk.raw` into
/// `<source>.gce.tar.gz` and removes `source`.
pub fn raw_to_gce(source: &Path) -> Result<PathBuf> {
    raw_to_gce_aligned(source, GIB)
}

/// [`raw_to_gce`] with a custom size unit.
pub fn raw_to_gce_aligned(source: &Path, align: u64) -> Result<PathBuf> {
    let conv = |step, path: &Path, e: io::Error| ImageError::conversion("gce", step, path, e);
    let archive = append_extension(source, "gce.tar.gz");

    {
        let file = OpenOptions::new()
            .write(true)
            .open(source)
            .map_err(|e| conv("open", source, e))?;
        let actual = file.metadata().map_err(|e| conv("stat", source, e))?.len();
        let target = gce_target_size(actual, align);
        info!("resizing {} from {actual} to {target} bytes", source.display());
        file.set_len(target).map_err(|e| conv("resize", source, e))?;
    }

    info!("compressing {} into {}", source.display(), archive.display());
    let mut input = File::open(source).map_err(|e| conv("open", source, e))?;
    let meta = input.metadata().map_err(|e| conv("stat", source, e))?;

    let dest = File::create(&archive).map_err(|e| conv("create archive", &archive, e))?;
    let gz = GzEncoder::new(BufWriter::new(dest), Compression::fast());
    let mut tar = tar::Builder::new(gz);

    let mut header = tar::Header::new_gnu();
    header
        .set_path(GCE_ENTRY_NAME)
        .map_err(|e| conv("tar header", &archive, e))?;
    header.set_size(meta.len());
    header.set_mode(meta.permissions().mode() & 0o7777);
    header.set_cksum();
    tar.append(&header, &mut input)
        .map_err(|e| conv("tar append", &archive, e))?;

    // tar, then gzip, then the file.
    let gz = tar.into_inner().map_err(|e| conv("close tar", &archive, e))?;
    let writer = gz.finish().map_err(|e| conv("close gzip", &archive, e))?;
    let dest = writer
        .into_inner()
        .map_err(|e| conv("flush archive", &archive, e.into_error()))?;
    dest.sync_all().map_err(|e| conv("sync archive", &archive, e))?;
    drop(input);

    fs::remove_file(source).map_err(|e| conv("remove raw", source, e))?;
    info!("wrote {}", archive.display());
    Ok(archive)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aligned_sizes_still_grow_one_unit() {
        assert_eq!(gce_target_size(0, GIB), GIB);
        assert_eq!(gce_target_size(1, GIB), GIB);
        assert_eq!(gce_target_size(GIB - 1, GIB), GIB);
        assert_eq!(gce_target_size(2 * GIB, GIB), 3 * GIB);
        assert_eq!(gce_target_size(10 * GIB, GIB), 11 * GIB);
    }
}
