use serde::Serialize;

use super::constants::{BIOS_SIZE_BYTES, FIRST_PARTITION_SECTOR, SECTOR_SIZE};
use super::types::{PartitionRole, PartitionSpec, SectorRange};
use super::utils::round_to_nearest_sector;

#[derive(Debug, Clone, Serialize)]
pub struct PlannedPartition {
    pub role: PartitionRole,
    pub name: String,
    pub size_bytes: u64,
    pub range: SectorRange,
}

/// Sector ranges for the fixed BIOS, EFI, OEM, Recovery ordering.
#[derive(Debug, Clone, Serialize)]
pub struct DiskLayout {
    pub sector_size: u64,
    pub partitions: Vec<PlannedPartition>,
}

impl DiskLayout {
    /// `end = start + size / sector - 1`, `start[i+1] = end[i] + 1`.
    ///
    /// Every size must be non-zero; an empty partition has no inclusive
    /// range and would overlap its successor.
    pub fn plan(specs: &[PartitionSpec], sector_size: u64) -> Self {
        let mut start = FIRST_PARTITION_SECTOR;
        let partitions = specs
            .iter()
            .map(|spec| {
                assert!(spec.size_bytes > 0, "empty partition {}", spec.name);
                let size_bytes = round_to_nearest_sector(spec.size_bytes, sector_size);
                let end = start + size_bytes / sector_size - 1;
                let planned = PlannedPartition {
                    role: spec.role,
                    name: spec.name.clone(),
                    size_bytes,
                    range: SectorRange { start, end },
                };
                start = end + 1;
                planned
            })
            .collect();
        Self {
            sector_size,
            partitions,
        }
    }

    /// Layout for the three partition image sizes, BIOS-boot prepended.
    pub fn for_images(efi: u64, oem: u64, recovery: u64) -> Self {
        let specs = [
            PartitionSpec::new(PartitionRole::BiosBoot, BIOS_SIZE_BYTES),
            PartitionSpec::new(PartitionRole::Efi, efi),
            PartitionSpec::new(PartitionRole::Oem, oem),
            PartitionSpec::new(PartitionRole::Recovery, recovery),
        ];
        Self::plan(&specs, SECTOR_SIZE)
    }

    pub fn get(&self, role: PartitionRole) -> Option<&PlannedPartition> {
        self.partitions.iter().find(|p| p.role == role)
    }

    /// Sector after the last partition.
    pub fn end_sector(&self) -> u64 {
        self.partitions
            .last()
            .map(|p| p.range.end + 1)
            .unwrap_or(FIRST_PARTITION_SECTOR)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::disk::constants::MIB;

    #[test]
    fn ranges_are_contiguous_in_fixed_order() {
        let layout = DiskLayout::for_images(64 * MIB, 64 * MIB + 1, 250 * MIB);
        let roles: Vec<_> = layout.partitions.iter().map(|p| p.role).collect();
        assert_eq!(roles, PartitionRole::ORDER);

        let bios = layout.get(PartitionRole::BiosBoot).unwrap();
        assert_eq!(bios.range, SectorRange { start: 2048, end: 6143 });
        assert_eq!(layout.get(PartitionRole::Efi).unwrap().range.start, 6144);

        for pair in layout.partitions.windows(2) {
            assert_eq!(pair[1].range.start, pair[0].range.end + 1);
            assert!(pair[0].range.start <= pair[0].range.end);
        }
        for p in &layout.partitions {
            assert_eq!(p.size_bytes % SECTOR_SIZE, 0);
            assert_eq!(p.range.sectors() * SECTOR_SIZE, p.size_bytes);
        }
        // OEM rounded up by one sector.
        assert_eq!(layout.get(PartitionRole::Oem).unwrap().size_bytes, 64 * MIB + 512);
    }

    #[test]
    #[should_panic(expected = "empty partition efi")]
    fn zero_sized_partition_has_no_range() {
        DiskLayout::for_images(0, MIB, MIB);
    }

    #[test]
    fn inverted_range_counts_no_sectors() {
        assert_eq!(SectorRange { start: 6144, end: 6143 }.sectors(), 0);
        assert_eq!(SectorRange { start: 6144, end: 6144 }.sectors(), 1);
    }

    #[test]
    fn other_sector_sizes() {
        let specs = [
            PartitionSpec::new(PartitionRole::BiosBoot, 2 * MIB),
            PartitionSpec::new(PartitionRole::Efi, 5000),
        ];
        let layout = DiskLayout::plan(&specs, 4096);
        assert_eq!(layout.partitions[0].range, SectorRange { start: 2048, end: 2559 });
        assert_eq!(layout.partitions[1].range, SectorRange { start: 2560, end: 2561 });
        assert_eq!(layout.end_sector(), 2562);
    }
}
