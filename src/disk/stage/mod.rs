//! Partition content staging: build each partition's tree, then hand it to an
//! [`ImageDeployer`](crate::disk::deploy::ImageDeployer).

pub mod efi;
pub mod manifest;
pub mod oem;
pub mod recovery;

pub use efi::{stage_efi_tree, EfiOptions};
pub use manifest::state_size_mb;
pub use oem::stage_oem_tree;
pub use recovery::{require_grub_config, stage_recovery_tree, RecoverySizes};
