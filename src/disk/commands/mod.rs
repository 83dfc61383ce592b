use anyhow::Result;
use log::info;

use super::cli::DiskAction;
use super::convert::{raw_to_gce, raw_to_vhd};
use crate::config::BuildConfig;

pub mod build;
pub mod info;

pub use build::{build_request, BuildArgs};
pub use info::inspect;

pub fn run(action: DiskAction, cfg: Option<&BuildConfig>) -> Result<()> {
    match action {
        DiskAction::Build {
            source,
            output,
            cloud_config,
            size,
            bios,
            vhd,
            gce,
            artifact_name,
        } => build::build(
            BuildArgs {
                source,
                output,
                cloud_config,
                size,
                bios,
                vhd,
                gce,
                artifact_name,
            },
            cfg,
        ),
        DiskAction::Vhd { raw } => {
            let out = raw_to_vhd(&raw)?;
            info!("artifact: {}", out.display());
            Ok(())
        }
        DiskAction::Gce { raw } => {
            let out = raw_to_gce(&raw)?;
            info!("artifact: {}", out.display());
            Ok(())
        }
        DiskAction::Info { disk, json } => info::info(&disk, json),
    }
}
