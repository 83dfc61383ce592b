use uuid::Uuid;

pub const SECTOR_SIZE: u64 = 512;
pub const MIB: u64 = 1024 * 1024;
pub const GIB: u64 = 1024 * MIB;

/// First usable sector for partitions; leaves room for the protective MBR and GPT header.
pub const FIRST_PARTITION_SECTOR: u64 = 2048;

/// Leading padding image: 1 MiB of GPT headroom plus the reserved BIOS-boot region.
pub const INIT_PADDING_BYTES: u64 = 3 * MIB;
/// Trailing padding image, room for the backup GPT.
pub const END_PADDING_BYTES: u64 = MIB;

pub const BIOS_SIZE_BYTES: u64 = 2 * MIB;
pub const EFI_SIZE_MB: u64 = 64;
pub const OEM_SIZE_MB: u64 = 64;

/// Headroom added to the rootfs size for the system image inside Recovery.
pub const SYSTEM_IMAGE_EXTRA_MB: u64 = 100;
/// Recovery holds the system image plus a transition image during upgrades.
pub const RECOVERY_EXTRA_MB: u64 = 150;
/// Fixed margin added to the state partition declared in the OEM manifest.
pub const STATE_EXTRA_BYTES: u64 = 100 * MIB;

pub const BIOS_LABEL: &str = "COS_BIOS";
pub const EFI_LABEL: &str = "COS_GRUB";
pub const OEM_LABEL: &str = "COS_OEM";
pub const RECOVERY_LABEL: &str = "COS_RECOVERY";
pub const SYSTEM_LABEL: &str = "COS_SYSTEM";
pub const STATE_LABEL: &str = "COS_STATE";
pub const PERSISTENT_LABEL: &str = "COS_PERSISTENT";

pub const BIOS_PART_NAME: &str = "bios";
pub const EFI_PART_NAME: &str = "efi";
pub const OEM_PART_NAME: &str = "oem";
pub const RECOVERY_PART_NAME: &str = "recovery";
pub const STATE_PART_NAME: &str = "state";
pub const PERSISTENT_PART_NAME: &str = "persistent";

/// Fixed disk GUID so identical inputs produce identical partition tables.
pub const DISK_GUID: Uuid = Uuid::from_u128(0x0c4f_5e2a_7d1b_4a86_9e3c_2b5d_8f61_a9e4);

pub const GRUB_CONF: &str = "etc/cos/grub.cfg";
pub const RECOVERY_IMG_DIR: &str = "cOS";
pub const RECOVERY_IMG_FILE: &str = "recovery.img";

pub const CUSTOM_CLOUD_CONFIG: &str = "90_custom.yaml";
pub const RESET_CLOUD_CONFIG: &str = "01_reset.yaml";
pub const GRUBENV_FILE: &str = "grubenv";
pub const GRUBENV_SIZE: usize = 1024;

pub const DEFAULT_ARTIFACT_NAME: &str = "kairos";

/// Chainloads the grub config shipped inside the Recovery partition.
pub const GRUB_EFI_RECOVERY: &str = "search --no-floppy --label --set=root COS_RECOVERY\n\
set root=($root)\n\
set prefix=($root)/grub2\n\
configfile ($root)/etc/cos/grub.cfg";

pub const DEFAULT_CLOUD_CONFIG: &str = r#"#cloud-config
stages:
  initramfs:
    - name: "Set user and password"
      users:
        kairos:
          passwd: "kairos"
          groups:
            - "admin"
"#;

pub fn efi_shim_candidates(arch: &str) -> &'static [&'static str] {
    match arch {
        "arm64" => &[
            "usr/share/efi/aarch64/shim.efi",
            "usr/lib/shim/shimaa64.efi.signed",
            "usr/lib/shim/shimaa64.efi.dualsigned",
            "boot/efi/EFI/fedora/shimaa64.efi",
            "boot/efi/EFI/rocky/shimaa64.efi",
            "boot/efi/EFI/redhat/shimaa64.efi",
        ],
        _ => &[
            "usr/share/efi/x86_64/shim.efi",
            "usr/lib/shim/shimx64.efi.signed",
            "usr/lib/shim/shimx64.efi.dualsigned",
            "boot/efi/EFI/fedora/shimx64.efi",
            "boot/efi/EFI/rocky/shimx64.efi",
            "boot/efi/EFI/redhat/shimx64.efi",
        ],
    }
}

pub fn efi_grub_candidates(arch: &str) -> &'static [&'static str] {
    match arch {
        "arm64" => &[
            "usr/share/efi/aarch64/grub.efi",
            "usr/lib/grub/arm64-efi-signed/grubaa64.efi.signed",
            "boot/efi/EFI/fedora/grubaa64.efi",
            "boot/efi/EFI/rocky/grubaa64.efi",
            "boot/efi/EFI/redhat/grubaa64.efi",
        ],
        _ => &[
            "usr/share/efi/x86_64/grub.efi",
            "usr/lib/grub/x86_64-efi-signed/grubx64.efi.signed",
            "boot/efi/EFI/fedora/grubx64.efi",
            "boot/efi/EFI/rocky/grubx64.efi",
            "boot/efi/EFI/redhat/grubx64.efi",
        ],
    }
}

/// Name firmware loads when no boot entries are configured.
pub fn efi_fallback_name(arch: &str) -> &'static str {
    match arch {
        "arm64" => "BOOTAA64.EFI",
        _ => "BOOTX64.EFI",
    }
}

pub const SIGNING_SUFFIXES: &[&str] = &[".signed", ".dualsigned"];
