use anyhow::{Context, Result};
use log::info;
use std::path::{Path, PathBuf};

use crate::config::BuildConfig;
use crate::disk::builder::RawImageBuilder;
use crate::disk::deploy::MkfsDeployer;
use crate::disk::rootfs::DirectoryRootfs;
use crate::disk::types::{BootMode, BuildRequest, Conversions, SourceLocator};
use crate::disk::utils::parse_size;

/// Flags given to `rawimg build`.
#[derive(Debug, Default)]
pub struct BuildArgs {
    pub source: String,
    pub output: Option<PathBuf>,
    pub cloud_config: Option<PathBuf>,
    pub size: Option<String>,
    pub bios: bool,
    pub vhd: bool,
    pub gce: bool,
    pub artifact_name: Option<String>,
}

/// Merges `args` over the config file defaults.
pub fn build_request(args: BuildArgs, cfg: Option<&BuildConfig>) -> Result<BuildRequest> {
    let cfg = cfg.cloned().unwrap_or_default();

    let output = args
        .output
        .or(cfg.output)
        .unwrap_or_else(|| PathBuf::from("."));
    let cloud_config = match args.cloud_config.or(cfg.cloud_config) {
        Some(path) => Some(read_cloud_config(&path)?),
        None => None,
    };
    let final_size = match args.size.or(cfg.size) {
        Some(size) => parse_size(&size)?,
        None => 0,
    };
    let conversions = Conversions {
        vhd: args.vhd || cfg.vhd.unwrap_or(false),
        gce: args.gce || cfg.gce.unwrap_or(false),
    };
    let boot_mode = if args.bios {
        BootMode::Bios
    } else {
        BootMode::Efi
    };

    let mut request = BuildRequest::efi(SourceLocator::parse(&args.source), output)
        .with_cloud_config(cloud_config)
        .with_final_size(final_size)
        .with_boot_mode(boot_mode)
        .with_conversions(conversions);
    if let Some(name) = args.artifact_name.or(cfg.artifact_name) {
        request = request.with_artifact_name(name);
    }
    Ok(request)
}

fn read_cloud_config(path: &Path) -> Result<String> {
    std::fs::read_to_string(path)
        .with_context(|| format!("failed to read cloud config {}", path.display()))
}

pub fn build(args: BuildArgs, cfg: Option<&BuildConfig>) -> Result<()> {
    let request = build_request(args, cfg)?;
    let rootfs = DirectoryRootfs;
    let deployer = MkfsDeployer;
    let output = RawImageBuilder::new(request, &rootfs, &deployer).build()?;

    for path in [&output.raw, &output.vhd, &output.gce].into_iter().flatten() {
        info!("artifact: {}", path.display());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_config() {
        let cfg = BuildConfig {
            output: Some(PathBuf::from("/cfg/out")),
            size: Some("4G".to_string()),
            artifact_name: Some("custom".to_string()),
            gce: Some(true),
            ..BuildConfig::default()
        };
        let args = BuildArgs {
            source: "dir:/rootfs".to_string(),
            output: Some(PathBuf::from("/cli/out")),
            vhd: true,
            ..BuildArgs::default()
        };
        let request = build_request(args, Some(&cfg)).expect("request");
        assert_eq!(request.output_dir, PathBuf::from("/cli/out"));
        assert_eq!(request.final_size, 4 * 1024 * 1024 * 1024);
        assert_eq!(request.artifact_name, "custom");
        assert_eq!(request.conversions, Conversions { vhd: true, gce: true });
        assert_eq!(request.boot_mode, BootMode::Efi);
        assert_eq!(request.source, SourceLocator::Dir(PathBuf::from("/rootfs")));
    }

    #[test]
    fn defaults_without_config() {
        let args = BuildArgs {
            source: "/rootfs".to_string(),
            bios: true,
            ..BuildArgs::default()
        };
        let request = build_request(args, None).expect("request");
        assert_eq!(request.output_dir, PathBuf::from("."));
        assert_eq!(request.final_size, 0);
        assert_eq!(request.artifact_name, "kairos");
        assert_eq!(request.boot_mode, BootMode::Bios);
        assert!(request.cloud_config.is_none());
    }
}
