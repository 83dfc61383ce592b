//! Cloud formats derived from a finished raw image.

pub mod gce;
pub mod vhd;

pub use gce::{gce_target_size, raw_to_gce, raw_to_gce_aligned, GCE_ENTRY_NAME};
pub use vhd::{chs_calculation, generate_checksum, raw_to_vhd, read_footer, Chs, VhdFooter};
