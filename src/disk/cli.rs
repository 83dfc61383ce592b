use clap::Subcommand;
use std::path::PathBuf;

#[derive(Subcommand, Debug)]
pub enum DiskAction {
    /// Build a raw GPT disk image from a rootfs
    Build {
        /// Rootfs source: a directory, dir:PATH, or a container reference
        #[arg(value_name = "SOURCE")]
        source: String,

        /// Output directory
        #[arg(short, long, value_name = "DIR")]
        output: Option<PathBuf>,

        /// Cloud config copied into the OEM partition
        #[arg(long, value_name = "FILE")]
        cloud_config: Option<PathBuf>,

        /// Minimum final image size (bytes or with K/M/G suffix)
        #[arg(long, value_name = "SIZE")]
        size: Option<String>,

        /// Build a legacy BIOS image (not supported)
        #[arg(long)]
        bios: bool,

        /// Also produce a fixed VHD
        #[arg(long)]
        vhd: bool,

        /// Also produce a GCE tar.gz
        #[arg(long)]
        gce: bool,

        /// Prefix of the output file name
        #[arg(long, value_name = "NAME")]
        artifact_name: Option<String>,
    },

    /// Convert a raw image into a fixed VHD (renames the input)
    Vhd {
        #[arg(value_name = "RAW")]
        raw: PathBuf,
    },

    /// Convert a raw image into a GCE tar.gz (removes the input)
    Gce {
        #[arg(value_name = "RAW")]
        raw: PathBuf,
    },

    /// Show disk size, GPT partitions and VHD footer
    Info {
        #[arg(value_name = "DISK")]
        disk: PathBuf,

        /// Output JSON
        #[arg(long)]
        json: bool,
    },
}
