//! Region-based memory protection unit.
//!
//! Up to 16 regions are checked in index order; the first valid region that
//! contains the address decides the permissions. Addresses outside every
//! region fall back to the default permissions held in MPU_EN. The MPU never
//! relocates: physical address == virtual address.

use bitflags::bitflags;

use crate::{
    AccessType, ExceptionVector, Fault, FaultOrigin, FlushScope, PagePerms, Privilege,
    TranslationCache, PAGE_MASK, PAGE_SIZE, PROTV_PARAM_MPU,
};

pub const MAX_REGIONS: usize = 16;
pub const MPU_VERSION: u32 = 3;

const MPU_EN_ENABLE: u32 = 1 << 30;
const MPU_BASE_ADDR_MASK: u32 = 0xffff_ffe0;
const MPU_BASE_VALID: u32 = 1;
/// Region number reported in MPU_ECR when the default region denied access.
const DEFAULT_REGION_NR: u8 = 0xff;
const MPU_ECR_VECTOR: u32 = ExceptionVector::ProtectionViolation as u32;

bitflags! {
    /// Permission bits shared by MPU_EN (default region) and MPU_RDPn.
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
    pub struct RegionPerms: u32 {
        const KR = 1 << 8;
        const KW = 1 << 7;
        const KE = 1 << 6;
        const UR = 1 << 5;
        const UW = 1 << 4;
        const UE = 1 << 3;
    }
}

impl RegionPerms {
    /// User mode sees only the user bits; kernel mode gets the union of both.
    pub fn effective(self, privilege: Privilege) -> PagePerms {
        let granted = |k: RegionPerms, u: RegionPerms| match privilege {
            Privilege::User => self.contains(u),
            Privilege::Kernel => self.intersects(k | u),
        };
        let mut perms = PagePerms::empty();
        perms.set(PagePerms::READ, granted(RegionPerms::KR, RegionPerms::UR));
        perms.set(PagePerms::WRITE, granted(RegionPerms::KW, RegionPerms::UW));
        perms.set(PagePerms::EXEC, granted(RegionPerms::KE, RegionPerms::UE));
        perms
    }
}

/// A region index, or the default region used when nothing matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MpuRegionId {
    Region(u8),
    Default,
}

impl MpuRegionId {
    /// Region field of MPU_ECR.
    #[inline]
    pub fn ecr_number(self) -> u8 {
        match self {
            MpuRegionId::Region(region) => region,
            MpuRegionId::Default => DEFAULT_REGION_NR,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MpuRegion {
    valid: bool,
    base: u32,
    size_bits: u8,
    mask: u32,
    perms: RegionPerms,
}

impl MpuRegion {
    const RESET: Self = Self {
        valid: false,
        base: 0,
        size_bits: 0,
        mask: 0xffff_ffff,
        perms: RegionPerms::empty(),
    };

    #[inline]
    pub fn valid(&self) -> bool {
        self.valid
    }

    #[inline]
    pub fn base(&self) -> u32 {
        self.base
    }

    #[inline]
    pub fn perms(&self) -> RegionPerms {
        self.perms
    }

    /// Region size in bytes. Encodings below 4 are undefined and treated as
    /// the 32 byte minimum.
    #[inline]
    pub fn size(&self) -> u64 {
        if self.size_bits < 4 {
            32
        } else {
            2u64 << self.size_bits
        }
    }

    /// First byte covered by the region.
    #[inline]
    pub fn start(&self) -> u32 {
        self.base & self.mask
    }

    #[inline]
    pub fn contains(&self, addr: u32) -> bool {
        self.valid && (addr & self.mask) == (self.base & self.mask)
    }

    /// Whether the region's footprint intersects `[start, start + len)`.
    fn intersects(&self, start: u32, len: u64) -> bool {
        let region_start = self.start() as u64;
        let region_end = region_start + self.size();
        let start = start as u64;
        region_start < start + len && start < region_end
    }

    fn base_reg(&self) -> u32 {
        self.base | self.valid as u32
    }

    fn set_base_reg(&mut self, value: u32) {
        self.base = value & MPU_BASE_ADDR_MASK;
        self.valid = value & MPU_BASE_VALID != 0;
    }

    /// Size is split in RDP: bits 1:0 hold the low part, bits 11:9 the high
    /// part.
    fn perm_reg(&self) -> u32 {
        let lower = (self.size_bits & 0x3) as u32;
        let higher = ((self.size_bits >> 2) & 0x7) as u32;
        (higher << 9) | lower | self.perms.bits()
    }

    fn set_perm_reg(&mut self, value: u32) {
        let lower = (value & 0x3) as u8;
        let higher = ((value >> 9) & 0x7) as u8;
        self.size_bits = (higher << 2) | lower;
        self.perms = RegionPerms::from_bits_truncate(value);
        self.mask = match self.size_bits {
            0..=3 => !0x1f,
            31 => 0,
            bits => !((2u32 << bits) - 1),
        };
    }
}

#[derive(Debug, Clone)]
pub struct Mpu {
    present: bool,
    region_count: u8,
    /// Run-time state. Usually mirrors MPU_EN.EN, but a double fault clears it
    /// while MPU_EN keeps its value.
    active: bool,
    enable_reg: bool,
    default_perms: RegionPerms,
    regions: [MpuRegion; MAX_REGIONS],
    ecr_region: u8,
    ecr_violation: u8,
}

impl Mpu {
    /// `region_count` must be one of 0, 1, 2, 4, 8, 16; the CPU
    /// configuration enforces this.
    pub fn new(present: bool, region_count: u8) -> Self {
        debug_assert!(matches!(region_count, 0 | 1 | 2 | 4 | 8 | 16));
        Self {
            present,
            region_count: if present {
                region_count.min(MAX_REGIONS as u8)
            } else {
                0
            },
            active: false,
            enable_reg: false,
            default_perms: RegionPerms::empty(),
            regions: [MpuRegion::RESET; MAX_REGIONS],
            ecr_region: 0,
            ecr_violation: 0,
        }
    }

    /// Reset: disabled, all regions invalid, no default permissions.
    pub fn reset(&mut self) {
        *self = Self::new(self.present, self.region_count);
    }

    #[inline]
    pub fn present(&self) -> bool {
        self.present
    }

    #[inline]
    pub fn region_count(&self) -> u8 {
        self.region_count
    }

    /// Whether accesses are currently routed through the MPU.
    #[inline]
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Stop protecting without changing MPU_EN (double fault).
    pub fn deactivate(&mut self) {
        self.active = false;
    }

    pub fn region(&self, index: u8) -> Option<&MpuRegion> {
        self.regions[..self.region_count as usize].get(index as usize)
    }

    pub fn build(&self) -> u32 {
        if self.present {
            ((self.region_count as u32) << 8) | MPU_VERSION
        } else {
            0
        }
    }

    pub fn enable_reg(&self) -> u32 {
        let enable = if self.enable_reg { MPU_EN_ENABLE } else { 0 };
        enable | self.default_perms.bits()
    }

    pub fn write_enable_reg(&mut self, value: u32, cache: &mut impl TranslationCache) {
        self.enable_reg = value & MPU_EN_ENABLE != 0;
        self.active = self.enable_reg;
        self.default_perms = RegionPerms::from_bits_truncate(value);
        cache.flush(FlushScope::All);
    }

    /// MPU_ECR: vector, violation type and region of the last MPU fault.
    pub fn ecr(&self) -> u32 {
        (MPU_ECR_VECTOR << 16) | (((self.ecr_violation & 3) as u32) << 8) | self.ecr_region as u32
    }

    fn checked_index(&self, index: u8) -> Result<usize, Fault> {
        if index < self.region_count {
            Ok(index as usize)
        } else {
            Err(Fault::instruction_error())
        }
    }

    pub fn region_base_reg(&self, index: u8) -> Result<u32, Fault> {
        let index = self.checked_index(index)?;
        Ok(self.regions[index].base_reg())
    }

    pub fn region_perm_reg(&self, index: u8) -> Result<u32, Fault> {
        let index = self.checked_index(index)?;
        Ok(self.regions[index].perm_reg())
    }

    /// MPU_RDBn write. Any region change may alter which region answers an
    /// address anywhere, so the whole cache is dropped.
    pub fn write_region_base_reg(
        &mut self,
        index: u8,
        value: u32,
        cache: &mut impl TranslationCache,
    ) -> Result<(), Fault> {
        let index = self.checked_index(index)?;
        self.regions[index].set_base_reg(value);
        cache.flush(FlushScope::All);
        Ok(())
    }

    /// MPU_RDPn write.
    pub fn write_region_perm_reg(
        &mut self,
        index: u8,
        value: u32,
        cache: &mut impl TranslationCache,
    ) -> Result<(), Fault> {
        let index = self.checked_index(index)?;
        self.regions[index].set_perm_reg(value);
        cache.flush(FlushScope::All);
        Ok(())
    }

    /// First valid region containing `addr`, lowest index first.
    pub fn find_region(&self, addr: u32) -> MpuRegionId {
        self.regions[..self.region_count as usize]
            .iter()
            .position(|region| region.contains(addr))
            .map_or(MpuRegionId::Default, |index| {
                MpuRegionId::Region(index as u8)
            })
    }

    pub fn permission_for(&self, region: MpuRegionId) -> RegionPerms {
        match region {
            MpuRegionId::Region(index) => self.regions[index as usize].perms,
            MpuRegionId::Default => self.default_perms,
        }
    }

    /// Size of the region, the default region spanning the whole space.
    pub fn region_size(&self, region: MpuRegionId) -> u64 {
        match region {
            MpuRegionId::Region(index) => self.regions[index as usize].size(),
            MpuRegionId::Default => 1 << 32,
        }
    }

    /// Check `access` to `addr`. A denial is latched into MPU_ECR and
    /// returned as a protection violation.
    pub fn check_access(
        &mut self,
        addr: u32,
        access: AccessType,
        privilege: Privilege,
    ) -> Result<(MpuRegionId, PagePerms), Fault> {
        let region = self.find_region(addr);
        let perms = self.permission_for(region).effective(privilege);
        if perms.allows(access) {
            return Ok((region, perms));
        }

        self.ecr_violation = access.cause_code();
        self.ecr_region = region.ecr_number();
        Err(Fault::new(
            ExceptionVector::ProtectionViolation,
            access.cause_code(),
            PROTV_PARAM_MPU,
            addr,
            FaultOrigin::Mpu { region },
        ))
    }

    /// True iff no valid region with higher priority than `region` touches
    /// the page containing `addr`. Only then may a whole-page permission be
    /// cached for `addr`.
    pub fn overlap_free(&self, addr: u32, region: MpuRegionId) -> bool {
        let limit = match region {
            MpuRegionId::Region(0) => return true,
            MpuRegionId::Region(index) => (index as usize).min(self.region_count as usize),
            MpuRegionId::Default => self.region_count as usize,
        };
        let page = addr & PAGE_MASK;
        !self.regions[..limit]
            .iter()
            .any(|r| r.valid && r.intersects(page, PAGE_SIZE as u64))
    }
}
