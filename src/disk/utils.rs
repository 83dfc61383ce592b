use anyhow::{anyhow, bail, Result};
use log::warn;
use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use super::constants::MIB;

pub fn parse_size(input: &str) -> Result<u64> {
    let s = input.trim();
    if s.is_empty() {
        bail!("size is empty");
    }

    let (num_str, unit) = s.split_at(s.len().saturating_sub(1));
    let (value, multiplier) = match unit.to_ascii_lowercase().as_str() {
        "k" => (num_str, 1024u64),
        "m" => (num_str, 1024u64 * 1024),
        "g" => (num_str, 1024u64 * 1024 * 1024),
        _ => (s, 1u64),
    };

    let num: u64 = value
        .parse()
        .map_err(|_| anyhow!("invalid size: {input}"))?;
    Ok(num.saturating_mul(multiplier))
}

/// Rounds `size` up to a multiple of `sector`, leaving aligned sizes untouched.
pub fn round_to_nearest_sector(size: u64, sector: u64) -> u64 {
    if size % sector == 0 {
        return size;
    }
    size + sector - (size % sector)
}

/// `disk.raw` + `vhd` -> `disk.raw.vhd`
pub fn append_extension(path: &Path, ext: &str) -> PathBuf {
    let mut name: OsString = path.as_os_str().to_owned();
    name.push(".");
    name.push(ext);
    PathBuf::from(name)
}

/// Total bytes of regular files below `root`, symlinks not followed.
pub fn dir_size(root: &Path) -> io::Result<u64> {
    let mut total = 0u64;
    for entry in WalkDir::new(root) {
        let entry = entry.map_err(io::Error::from)?;
        if entry.file_type().is_file() {
            total += entry.metadata().map_err(io::Error::from)?.len();
        }
    }
    Ok(total)
}

pub fn bytes_to_mb_ceil(bytes: u64) -> u64 {
    bytes.div_ceil(MIB)
}

/// Best effort; cleanup failures are logged, never returned.
pub fn remove_host_path(path: &Path) {
    let result = if path.is_dir() {
        std::fs::remove_dir_all(path)
    } else {
        std::fs::remove_file(path)
    };
    match result {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => warn!("failed to remove {}: {e}", path.display()),
    }
}

pub fn format_mib(bytes: u64) -> String {
    if bytes.is_multiple_of(MIB) {
        format!("{}", bytes / MIB)
    } else {
        format!("{:.1}", bytes as f64 / MIB as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_size_suffixes() {
        assert_eq!(parse_size("512").unwrap(), 512);
        assert_eq!(parse_size("4K").unwrap(), 4096);
        assert_eq!(parse_size("16m").unwrap(), 16 * MIB);
        assert_eq!(parse_size("2G").unwrap(), 2 * 1024 * MIB);
        assert!(parse_size("").is_err());
        assert!(parse_size("12X").is_err());
    }

    #[test]
    fn sector_rounding_is_aligned_and_minimal() {
        for sector in [512u64, 4096] {
            for size in [0u64, 1, 511, 512, 513, 4095, 4096, 4097, 10 * MIB + 3] {
                let rounded = round_to_nearest_sector(size, sector);
                assert_eq!(rounded % sector, 0);
                if size % sector == 0 {
                    assert_eq!(rounded, size);
                } else {
                    assert_eq!(rounded, size + sector - (size % sector));
                }
                assert!(rounded >= size && rounded - size < sector);
            }
        }
    }

    #[test]
    fn extension_is_appended_not_replaced() {
        assert_eq!(
            append_extension(Path::new("/out/kairos-x.raw"), "vhd"),
            PathBuf::from("/out/kairos-x.raw.vhd")
        );
        assert_eq!(
            append_extension(Path::new("disk.raw"), "gce.tar.gz"),
            PathBuf::from("disk.raw.gce.tar.gz")
        );
    }

    #[test]
    fn dir_size_sums_nested_files() {
        let temp = tempfile::TempDir::new().expect("temp dir");
        std::fs::create_dir_all(temp.path().join("a/b")).expect("mkdir");
        std::fs::write(temp.path().join("top"), vec![0u8; 100]).expect("write");
        std::fs::write(temp.path().join("a/b/deep"), vec![0u8; 28]).expect("write");
        assert_eq!(dir_size(temp.path()).expect("size"), 128);
        assert_eq!(bytes_to_mb_ceil(128), 1);
        assert_eq!(bytes_to_mb_ceil(0), 0);
        assert_eq!(bytes_to_mb_ceil(3 * MIB), 3);
    }
}
