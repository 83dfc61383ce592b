use anyhow::{anyhow, bail, Context};
use log::{debug, info};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use super::constants::MIB;
use super::error::{ImageError, Result};
use super::types::{FsType, PartitionSpec};
use super::utils::remove_host_path;

/// A directory to be turned into a single-filesystem image file.
#[derive(Debug, Clone)]
pub struct DeployRequest {
    pub source_dir: PathBuf,
    pub fs_type: FsType,
    pub label: String,
    pub size_mb: u64,
    pub image: PathBuf,
    /// Where the filesystem is mounted on the booted system.
    pub mount_point: String,
}

impl DeployRequest {
    /// Request for a staged partition, mounted at `/<partition name>`.
    /// BIOS-boot and specs without a staged tree have nothing to deploy.
    pub fn for_partition(spec: &PartitionSpec) -> Result<Self> {
        let (Some(fs_type), Some(source_dir), Some(image)) =
            (spec.fs_type, spec.source_dir.as_ref(), spec.image.as_ref())
        else {
            return Err(ImageError::staging(
                "prepare deploy",
                spec.source_dir.as_deref().unwrap_or(Path::new(&spec.name)),
                anyhow!("partition {} has no staged filesystem", spec.name),
            ));
        };
        Ok(Self {
            source_dir: source_dir.clone(),
            fs_type,
            label: spec.label.clone(),
            size_mb: spec.size_mb(),
            image: image.clone(),
            mount_point: format!("/{}", spec.name),
        })
    }
}

pub trait ImageDeployer {
    /// Returns the path of the written image, which is `req.image`.
    fn deploy(&self, req: &DeployRequest) -> Result<PathBuf>;
}

/// Populates images offline with host `mkfs.vfat`/`mcopy` and `mke2fs -d`.
#[derive(Debug, Default, Clone, Copy)]
pub struct MkfsDeployer;

impl ImageDeployer for MkfsDeployer {
    fn deploy(&self, req: &DeployRequest) -> Result<PathBuf> {
        info!(
            "creating {} image {} ({} MiB) from {}",
            req.fs_type,
            req.label,
            req.size_mb,
            req.source_dir.display()
        );
        let result = create_sparse(&req.image, req.size_mb).and_then(|()| match req.fs_type {
            FsType::Vfat => populate_vfat(req),
            FsType::Ext2 | FsType::Ext4 => populate_ext(req),
        });
        match result {
            Ok(()) => Ok(req.image.clone()),
            Err(source) => {
                remove_host_path(&req.image);
                Err(ImageError::ImageDeploy {
                    label: req.label.clone(),
                    image: req.image.clone(),
                    source,
                })
            }
        }
    }
}

fn create_sparse(image: &Path, size_mb: u64) -> anyhow::Result<()> {
    let file = fs::File::create(image)
        .with_context(|| format!("failed to create image {}", image.display()))?;
    file.set_len(size_mb * MIB)
        .with_context(|| "failed to set image size".to_string())?;
    Ok(())
}

fn populate_vfat(req: &DeployRequest) -> anyhow::Result<()> {
    let mut mkfs = Command::new("mkfs.vfat");
    mkfs.arg("-n").arg(&req.label).arg(&req.image);
    run(mkfs)?;

    let entries = fs::read_dir(&req.source_dir)
        .with_context(|| format!("read {}", req.source_dir.display()))?;
    for entry in entries {
        let entry = entry?;
        let mut mcopy = Command::new("mcopy");
        mcopy
            .arg("-s")
            .arg("-i")
            .arg(&req.image)
            .arg(entry.path())
            .arg("::/");
        run(mcopy)?;
    }
    Ok(())
}

fn populate_ext(req: &DeployRequest) -> anyhow::Result<()> {
    let mut mke2fs = Command::new("mke2fs");
    mke2fs
        .args(["-t", req.fs_type.as_str(), "-q", "-F"])
        .arg("-L")
        .arg(&req.label)
        .arg("-M")
        .arg(&req.mount_point)
        .arg("-d")
        .arg(&req.source_dir)
        .arg(&req.image);
    run(mke2fs)
}

fn run(mut cmd: Command) -> anyhow::Result<()> {
    debug!("running {cmd:?}");
    let program = cmd.get_program().to_string_lossy().into_owned();
    let output = cmd
        .output()
        .map_err(|e| anyhow!("failed to spawn {program}: {e}"))?;
    if !output.status.success() {
        bail!(
            "{program} exited with {}: {}",
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::disk::types::PartitionRole;

    #[test]
    fn staged_spec_becomes_request() {
        let spec = PartitionSpec::new(PartitionRole::Efi, 64 * MIB)
            .staged("/stage/efi", "/stage/efi.img");
        let req = DeployRequest::for_partition(&spec).expect("request");
        assert_eq!(req.fs_type, FsType::Vfat);
        assert_eq!(req.label, "COS_GRUB");
        assert_eq!(req.size_mb, 64);
        assert_eq!(req.source_dir, PathBuf::from("/stage/efi"));
        assert_eq!(req.image, PathBuf::from("/stage/efi.img"));
        assert_eq!(req.mount_point, "/efi");
    }

    #[test]
    fn unstaged_or_bios_spec_is_rejected() {
        let oem = PartitionSpec::new(PartitionRole::Oem, 64 * MIB);
        assert!(matches!(
            DeployRequest::for_partition(&oem),
            Err(ImageError::Staging { .. })
        ));
        let bios = PartitionSpec::new(PartitionRole::BiosBoot, 2 * MIB)
            .staged("/stage/bios", "/stage/bios.img");
        assert!(DeployRequest::for_partition(&bios).is_err());
    }

    #[test]
    fn missing_tool_surfaces_as_deploy_error() {
        let temp = tempfile::TempDir::new().expect("temp dir");
        let mut cmd = Command::new("rawimg-definitely-missing-tool");
        cmd.arg(temp.path());
        let err = run(cmd).unwrap_err();
        assert!(err.to_string().contains("rawimg-definitely-missing-tool"));
    }

    #[test]
    fn failing_tool_reports_stderr() {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", "echo boom >&2; exit 3"]);
        let err = run(cmd).unwrap_err().to_string();
        assert!(err.contains("boom"));
        assert!(err.contains("sh"));
    }
}
