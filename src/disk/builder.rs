use log::{debug, info};
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use super::assemble::{assemble_disk, extend_to_final_size, PartitionImages};
use super::constants::{EFI_SIZE_MB, MIB, OEM_SIZE_MB};
use super::convert::{raw_to_gce, raw_to_vhd};
use super::deploy::{DeployRequest, ImageDeployer};
use super::error::{ImageError, Result};
use super::layout::DiskLayout;
use super::release::ReleaseInfo;
use super::rootfs::RootfsProvider;
use super::stage::{
    require_grub_config, stage_efi_tree, stage_oem_tree, stage_recovery_tree, EfiOptions,
    RecoverySizes,
};
use super::staging::{ScratchFile, StagingContext};
use super::types::{BootMode, BuildRequest, PartitionRole, PartitionSpec};
use super::utils::{append_extension, remove_host_path};

/// Artifacts of a finished build.
#[derive(Debug, Clone)]
pub struct BuildOutput {
    /// Present unless a GCE conversion consumed it.
    pub raw: Option<PathBuf>,
    pub vhd: Option<PathBuf>,
    pub gce: Option<PathBuf>,
    pub layout: DiskLayout,
}

/// Runs the staging, sizing and assembly phases for one [`BuildRequest`].
pub struct RawImageBuilder<'a> {
    request: BuildRequest,
    rootfs: &'a dyn RootfsProvider,
    deployer: &'a dyn ImageDeployer,
}

impl<'a> RawImageBuilder<'a> {
    pub fn new(
        request: BuildRequest,
        rootfs: &'a dyn RootfsProvider,
        deployer: &'a dyn ImageDeployer,
    ) -> Self {
        Self {
            request,
            rootfs,
            deployer,
        }
    }

    /// Builds the raw image, then any requested cloud conversions.
    pub fn build(&self) -> Result<BuildOutput> {
        if self.request.boot_mode == BootMode::Bios {
            return Err(ImageError::BiosUnsupported);
        }
        let rootfs = self.rootfs.resolve(&self.request.source)?;
        let release = ReleaseInfo::load(&rootfs)?;
        let name = release.output_name(&self.request.artifact_name)?;
        let output = self.request.output_dir.join(name);

        fs::create_dir_all(&self.request.output_dir)
            .map_err(|e| ImageError::staging("create output dir", &self.request.output_dir, e))?;

        let ctx = StagingContext::new()?;
        let layout = self.build_raw(&ctx, &rootfs, &release, &output)?;
        drop(ctx);

        self.convert(output, layout)
    }

    /// Recovery, then EFI, then OEM (sized from Recovery), then assembly.
    pub fn build_raw(
        &self,
        ctx: &StagingContext,
        rootfs: &Path,
        release: &ReleaseInfo,
        output: &Path,
    ) -> Result<DiskLayout> {
        info!("building raw image {} from {}", output.display(), rootfs.display());
        require_grub_config(rootfs)?;

        let recovery = ctx.image("recovery.img");
        let recovery_img = {
            let sizes = RecoverySizes::for_rootfs(rootfs)?;
            let tree = ctx.tree("recovery")?;
            stage_recovery_tree(rootfs, tree.path(), &sizes, self.deployer)?;
            let spec = PartitionSpec::new(PartitionRole::Recovery, sizes.partition_mb * MIB)
                .staged(tree.path(), recovery.path());
            self.deploy(&spec, &recovery)?
        };

        let efi = ctx.image("efi.img");
        let efi_img = {
            let opts = efi_options(release);
            let tree = ctx.tree("efi")?;
            stage_efi_tree(rootfs, tree.path(), &opts)?;
            let spec = PartitionSpec::new(PartitionRole::Efi, EFI_SIZE_MB * MIB)
                .staged(tree.path(), efi.path());
            self.deploy(&spec, &efi)?
        };

        let oem = ctx.image("oem.img");
        let oem_img = {
            let tree = ctx.tree("oem")?;
            stage_oem_tree(tree.path(), self.request.cloud_config.as_deref(), recovery_img.path())?;
            let spec = PartitionSpec::new(PartitionRole::Oem, OEM_SIZE_MB * MIB)
                .staged(tree.path(), oem.path());
            self.deploy(&spec, &oem)?
        };

        let images = PartitionImages {
            efi: efi_img.path().to_path_buf(),
            oem: oem_img.path().to_path_buf(),
            recovery: recovery_img.path().to_path_buf(),
        };
        let layout = assemble_disk(ctx, &images, output)?;

        if self.request.final_size > 0 {
            extend_to_final_size(output, self.request.final_size)
                .inspect_err(|_| remove_host_path(output))?;
        }
        fs::set_permissions(output, fs::Permissions::from_mode(0o644))
            .map_err(|e| ImageError::assembly("chmod", output, e))?;
        info!("raw image ready at {}", output.display());
        Ok(layout)
    }

    /// Deploys `spec` and guards whatever image the deployer wrote, which
    /// may differ from the planned path held by `planned`.
    fn deploy(&self, spec: &PartitionSpec, planned: &ScratchFile) -> Result<ScratchFile> {
        let written = self.deployer.deploy(&DeployRequest::for_partition(spec)?)?;
        if written != planned.path() {
            debug!("{} image written to {}", spec.name, written.display());
        }
        Ok(ScratchFile::at(written))
    }

    fn convert(&self, raw: PathBuf, layout: DiskLayout) -> Result<BuildOutput> {
        let wanted = self.request.conversions;
        let mut out = BuildOutput {
            raw: Some(raw.clone()),
            vhd: None,
            gce: None,
            layout,
        };
        match (wanted.vhd, wanted.gce) {
            (false, false) => {}
            (true, false) => {
                out.vhd = Some(raw_to_vhd(&raw)?);
                out.raw = None;
            }
            (false, true) => {
                out.gce = Some(raw_to_gce(&raw)?);
                out.raw = None;
            }
            (true, true) => {
                // VHD renames its input, so convert a copy and put it back for GCE.
                let aside = append_extension(&raw, "orig");
                fs::copy(&raw, &aside)
                    .map_err(|e| ImageError::conversion("vhd", "copy raw aside", &raw, e))?;
                let vhd = raw_to_vhd(&raw).inspect_err(|_| remove_host_path(&aside))?;
                fs::rename(&aside, &raw)
                    .map_err(|e| ImageError::conversion("gce", "restore raw", &aside, e))?;
                out.vhd = Some(vhd);
                out.gce = Some(raw_to_gce(&raw)?);
                out.raw = None;
            }
        }
        Ok(out)
    }
}

fn efi_options(release: &ReleaseInfo) -> EfiOptions {
    let arch = release.target_arch();
    match release.model_and_flavor() {
        Some((model, flavor)) => {
            info!("model {model} flavor {flavor}");
            EfiOptions {
                arch,
                flavor: Some(flavor),
                model: Some(model),
            }
        }
        None => EfiOptions {
            arch,
            ..EfiOptions::default()
        },
    }
}
