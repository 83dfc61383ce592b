use anyhow::Context;
use log::info;
use std::fs;
use std::path::{Path, PathBuf};

use crate::disk::constants::{
    GRUB_CONF, RECOVERY_EXTRA_MB, RECOVERY_IMG_DIR, RECOVERY_IMG_FILE, SYSTEM_IMAGE_EXTRA_MB,
    SYSTEM_LABEL,
};
use crate::disk::deploy::{DeployRequest, ImageDeployer};
use crate::disk::error::{ImageError, Result};
use crate::disk::types::FsType;
use crate::disk::utils::{bytes_to_mb_ceil, dir_size};

/// Sizes derived from the rootfs, in MiB.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecoverySizes {
    pub rootfs_mb: u64,
    pub system_image_mb: u64,
    pub partition_mb: u64,
}

impl RecoverySizes {
    pub fn for_rootfs(rootfs: &Path) -> Result<Self> {
        let bytes = dir_size(rootfs).map_err(|e| ImageError::sizing(rootfs, e))?;
        Ok(Self::from_mb(bytes_to_mb_ceil(bytes)))
    }

    pub fn from_mb(rootfs_mb: u64) -> Self {
        Self {
            rootfs_mb,
            system_image_mb: rootfs_mb + SYSTEM_IMAGE_EXTRA_MB,
            partition_mb: rootfs_mb * 2 + RECOVERY_EXTRA_MB,
        }
    }
}

/// Fails early when the rootfs has no boot-loader config to relocate.
pub fn require_grub_config(rootfs: &Path) -> Result<PathBuf> {
    let path = rootfs.join(GRUB_CONF);
    if !path.is_file() {
        return Err(ImageError::MissingGrubConfig { path });
    }
    Ok(path)
}

/// Fills `tree` with `cOS/recovery.img` (the rootfs as an ext2 image) and
/// the rootfs grub config at its original relative path.
pub fn stage_recovery_tree(
    rootfs: &Path,
    tree: &Path,
    sizes: &RecoverySizes,
    deployer: &dyn ImageDeployer,
) -> Result<()> {
    let grub_cfg = require_grub_config(rootfs)?;

    let img_dir = tree.join(RECOVERY_IMG_DIR);
    fs::create_dir_all(&img_dir).map_err(|e| ImageError::staging("create image dir", &img_dir, e))?;

    info!(
        "building system image from {} ({} MiB)",
        rootfs.display(),
        sizes.system_image_mb
    );
    let target = img_dir.join(RECOVERY_IMG_FILE);
    let written = deployer.deploy(&DeployRequest {
        source_dir: rootfs.to_path_buf(),
        fs_type: FsType::Ext2,
        label: SYSTEM_LABEL.to_string(),
        size_mb: sizes.system_image_mb,
        image: target.clone(),
        mount_point: "/".to_string(),
    })?;
    if written != target {
        fs::rename(&written, &target)
            .with_context(|| format!("move {}", written.display()))
            .map_err(|e| ImageError::staging("place system image", &target, e))?;
    }

    let dst = tree.join(GRUB_CONF);
    if let Some(parent) = dst.parent() {
        fs::create_dir_all(parent).map_err(|e| ImageError::staging("create grub dir", parent, e))?;
    }
    fs::copy(&grub_cfg, &dst)
        .with_context(|| format!("copy {}", grub_cfg.display()))
        .map_err(|e| ImageError::staging("copy grub config", &dst, e))?;
    Ok(())
}
