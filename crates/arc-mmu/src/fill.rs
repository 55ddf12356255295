//! Per-access fill: run the decider, consult the chosen engine and describe
//! the result in a form a downstream page cache can store.

use tracing::{debug, trace};

use crate::{
    decide, AccessType, ExceptionVector, Fault, FaultOrigin, Mmu, Mpu, MpuRegionId, PagePerms,
    Privilege, TranslationMode, PAGE_MASK, PAGE_SIZE, PROTV_PARAM_MMU,
};

/// How much of the address space a [`Mapping`] may be cached for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MappingSpan {
    /// The whole page starting at `Mapping::vaddr`.
    Page,
    /// Only `Mapping::vaddr` itself; re-check on every other address.
    Byte,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mapping {
    pub vaddr: u32,
    pub paddr: u32,
    pub perms: PagePerms,
    pub span: MappingSpan,
}

/// Translate one access through whichever engine the mode table selects.
pub fn fill(
    mmu: &mut Mmu,
    mpu: &mut Mpu,
    vaddr: u32,
    access: AccessType,
    privilege: Privilege,
) -> Result<Mapping, Fault> {
    let mode = decide(vaddr, privilege, mmu.enabled(), mpu.is_active());
    let result = match mode {
        TranslationMode::Direct => Ok(Mapping {
            vaddr: vaddr & PAGE_MASK,
            paddr: vaddr & PAGE_MASK,
            perms: PagePerms::all(),
            span: MappingSpan::Page,
        }),
        TranslationMode::Mmu => mmu.translate(vaddr, access, privilege).map(|t| Mapping {
            vaddr: vaddr & PAGE_MASK,
            paddr: t.paddr & PAGE_MASK,
            perms: t.perms,
            span: MappingSpan::Page,
        }),
        TranslationMode::Mpu => mpu
            .check_access(vaddr, access, privilege)
            .map(|(region, perms)| mpu_mapping(mpu, vaddr, region, perms)),
        TranslationMode::Fault => Err(Fault::new(
            ExceptionVector::ProtectionViolation,
            access.cause_code(),
            PROTV_PARAM_MMU,
            vaddr,
            FaultOrigin::Decider,
        )),
    };

    match &result {
        Ok(mapping) => trace!(vaddr, ?mode, ?mapping, "translation fill"),
        Err(fault) => debug!(vaddr, ?mode, ?access, %fault, "translation fault"),
    }
    result
}

fn mpu_mapping(mpu: &Mpu, vaddr: u32, region: MpuRegionId, perms: PagePerms) -> Mapping {
    let covers_page = mpu.region_size(region) >= PAGE_SIZE as u64;
    if covers_page && mpu.overlap_free(vaddr, region) {
        Mapping {
            vaddr: vaddr & PAGE_MASK,
            paddr: vaddr & PAGE_MASK,
            perms,
            span: MappingSpan::Page,
        }
    } else {
        Mapping {
            vaddr,
            paddr: vaddr,
            perms,
            span: MappingSpan::Byte,
        }
    }
}
