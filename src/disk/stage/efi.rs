use anyhow::Context;
use log::{debug, info, warn};
use std::fs;
use std::path::{Path, PathBuf};

use crate::disk::constants::{
    efi_fallback_name, efi_grub_candidates, efi_shim_candidates, GRUB_EFI_RECOVERY,
    SIGNING_SUFFIXES,
};
use crate::disk::error::{ImageError, Result};

/// Per-build choices for the EFI tree.
#[derive(Debug, Clone, Default)]
pub struct EfiOptions {
    pub arch: String,
    pub flavor: Option<String>,
    pub model: Option<String>,
}

impl EfiOptions {
    fn is_ubuntu(&self) -> bool {
        self.flavor.as_deref().is_some_and(|f| f.contains("ubuntu"))
    }

    fn skips_boot_binaries(&self) -> bool {
        let alpine = self
            .flavor
            .as_deref()
            .is_some_and(|f| f.to_lowercase().contains("alpine"));
        let rpi = self
            .model
            .as_deref()
            .is_some_and(|m| m.to_lowercase().contains("rpi"));
        alpine && rpi
    }
}

/// Lays out `EFI/` under `tree`: the chainloading grub.cfg plus shim and grub
/// taken from `rootfs`.
pub fn stage_efi_tree(rootfs: &Path, tree: &Path, opts: &EfiOptions) -> Result<()> {
    let boot_dir = tree.join("EFI").join("BOOT");
    mkdir(&boot_dir)?;

    let cfg_dir = if opts.is_ubuntu() {
        let dir = tree.join("EFI").join("ubuntu");
        mkdir(&dir)?;
        dir
    } else {
        boot_dir.clone()
    };
    let cfg = cfg_dir.join("grub.cfg");
    fs::write(&cfg, GRUB_EFI_RECOVERY).map_err(|e| ImageError::staging("write grub.cfg", &cfg, e))?;

    if opts.skips_boot_binaries() {
        warn!("alpine on Raspberry Pi, not copying shim or grub");
        return Ok(());
    }

    let shim = find_boot_asset(rootfs, "shim", efi_shim_candidates(&opts.arch))?;
    let grub = find_boot_asset(rootfs, "grub", efi_grub_candidates(&opts.arch))?;

    copy_boot_asset(&shim, &boot_dir.join(stripped_name(&shim)))?;
    copy_boot_asset(&shim, &boot_dir.join(efi_fallback_name(&opts.arch)))?;
    copy_boot_asset(&grub, &boot_dir.join(stripped_name(&grub)))?;
    info!("staged EFI tree for {}", opts.arch);
    Ok(())
}

/// First candidate, in order, that exists as a file under `rootfs`.
pub fn find_boot_asset(rootfs: &Path, asset: &'static str, candidates: &[&str]) -> Result<PathBuf> {
    for rel in candidates {
        let path = rootfs.join(rel);
        if path.is_file() {
            debug!("found {asset} at {}", path.display());
            return Ok(path);
        }
    }
    Err(ImageError::MissingBootAsset {
        asset,
        root: rootfs.to_path_buf(),
        searched: candidates.iter().map(|c| c.to_string()).collect(),
    })
}

/// `shimx64.efi.signed` -> `shimx64.efi`
pub fn stripped_name(path: &Path) -> String {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    SIGNING_SUFFIXES
        .iter()
        .find_map(|suffix| name.strip_suffix(suffix))
        .map(str::to_string)
        .unwrap_or(name)
}

fn copy_boot_asset(src: &Path, dst: &Path) -> Result<()> {
    fs::copy(src, dst)
        .with_context(|| format!("copy {} -> {}", src.display(), dst.display()))
        .map_err(|e| ImageError::staging("copy boot asset", dst, e))?;
    Ok(())
}

fn mkdir(path: &Path) -> Result<()> {
    fs::create_dir_all(path).map_err(|e| ImageError::staging("create EFI dir", path, e))
}
