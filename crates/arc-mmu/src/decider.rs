use crate::{Privilege, MMU_VA_END};

/// Which engine handles an access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TranslationMode {
    /// Identity mapping with full permissions.
    Direct,
    Mpu,
    Mmu,
    /// User access outside the MMU range with only the MMU enabled.
    Fault,
}

use TranslationMode::{Direct, Fault, Mmu, Mpu};

/// Indexed as `[mmu enabled][mpu enabled][address in MMU range][user]`.
static MODE_TABLE: [[[[TranslationMode; 2]; 2]; 2]; 2] = [
    // MMU off
    [
        // MPU off
        [[Direct, Direct], [Direct, Direct]],
        // MPU on
        [[Mpu, Mpu], [Mpu, Mpu]],
    ],
    // MMU on
    [
        // MPU off: outside the range kernel goes direct, user faults.
        [[Direct, Fault], [Mmu, Mmu]],
        // MPU on: the MPU covers whatever the MMU doesn't.
        [[Mpu, Mpu], [Mmu, Mmu]],
    ],
];

#[inline]
pub fn decide(
    vaddr: u32,
    privilege: Privilege,
    mmu_enabled: bool,
    mpu_enabled: bool,
) -> TranslationMode {
    let in_range = vaddr < MMU_VA_END;
    MODE_TABLE[mmu_enabled as usize][mpu_enabled as usize][in_range as usize]
        [privilege.is_user() as usize]
}
