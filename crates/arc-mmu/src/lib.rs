//! ARCv2 memory translation: a software-managed TLB, a region-based MPU and
//! the mode decider that routes every access to exactly one of them.
//!
//! The engines here do not touch guest memory. They answer "which physical
//! address, with which permissions" for a single access, or hand back a
//! [`Fault`] that the CPU core turns into a vectored exception.
//!
//! Mutations that change what a virtual address maps to report the affected
//! range through [`TranslationCache`] so a downstream cache of translated
//! pages can be kept coherent.

#![forbid(unsafe_code)]

mod decider;
mod fill;
mod mmu;
mod mpu;
mod tlb;

use bitflags::bitflags;

pub use decider::{decide, TranslationMode};
pub use fill::{fill, Mapping, MappingSpan};
pub use mmu::{Mmu, MmuStats, TlbCommand, Translation, MMU_BUILD};
pub use mpu::{Mpu, MpuRegion, MpuRegionId, RegionPerms, MAX_REGIONS, MPU_VERSION};
pub use tlb::{Tlb, TlbEntry, TlbLookup, TlbPerms, TLB_ENTRIES, TLB_SETS, TLB_WAYS};

#[cfg(test)]
mod tests;

pub const PAGE_SHIFT: u32 = 13;
pub const PAGE_SIZE: u32 = 1 << PAGE_SHIFT;
pub const PAGE_MASK: u32 = !(PAGE_SIZE - 1);

/// First address outside the MMU-governed range (exclusive upper bound).
pub const MMU_VA_END: u32 = 0x8000_0000;

/// Exception parameter for protection violations raised by the MMU path
/// (including user accesses to the untranslated upper half).
pub const PROTV_PARAM_MMU: u8 = 0x08;
/// Exception parameter for protection violations raised by the MPU.
pub const PROTV_PARAM_MPU: u8 = 0x04;

/// Type of memory access being translated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessType {
    Execute,
    Read,
    Write,
    /// Atomic exchange style access: needs both read and write permission.
    ReadWrite,
}

impl AccessType {
    /// Cause code reported in ECR for faults on this access.
    #[inline]
    pub const fn cause_code(self) -> u8 {
        match self {
            AccessType::Execute => 0,
            AccessType::Read => 1,
            AccessType::Write => 2,
            AccessType::ReadWrite => 3,
        }
    }

    #[inline]
    pub fn is_execute(self) -> bool {
        matches!(self, AccessType::Execute)
    }
}

/// Privilege level of the access (STATUS32.U).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Privilege {
    Kernel,
    User,
}

impl Privilege {
    #[inline]
    pub const fn from_user_bit(user: bool) -> Self {
        if user {
            Privilege::User
        } else {
            Privilege::Kernel
        }
    }

    #[inline]
    pub const fn is_user(self) -> bool {
        matches!(self, Privilege::User)
    }
}

bitflags! {
    /// Effective permissions of a mapping, after privilege has been applied.
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
    pub struct PagePerms: u8 {
        const READ = 1 << 0;
        const WRITE = 1 << 1;
        const EXEC = 1 << 2;
    }
}

impl PagePerms {
    #[inline]
    pub fn allows(self, access: AccessType) -> bool {
        match access {
            AccessType::Execute => self.contains(PagePerms::EXEC),
            AccessType::Read => self.contains(PagePerms::READ),
            AccessType::Write => self.contains(PagePerms::WRITE),
            AccessType::ReadWrite => self.contains(PagePerms::READ | PagePerms::WRITE),
        }
    }
}

/// Architectural exception vectors (vector number = discriminant).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ExceptionVector {
    Reset = 0,
    MemoryError = 1,
    InstructionError = 2,
    MachineCheck = 3,
    TlbMissInstruction = 4,
    TlbMissData = 5,
    ProtectionViolation = 6,
    PrivilegeViolation = 7,
    SoftwareInterrupt = 8,
    Trap = 9,
    Extension = 10,
    DivideByZero = 11,
    DataCacheError = 12,
    Misaligned = 13,
}

/// First vector number used by interrupts.
pub const IRQ_VECTOR_BASE: u8 = 16;

impl ExceptionVector {
    #[inline]
    pub const fn number(self) -> u8 {
        self as u8
    }

    /// Whether entry latches the faulting PC (rather than the faulting data
    /// address) into EFA.
    pub const fn latches_pc(self) -> bool {
        matches!(
            self,
            ExceptionVector::Reset
                | ExceptionVector::MemoryError
                | ExceptionVector::InstructionError
                | ExceptionVector::MachineCheck
                | ExceptionVector::PrivilegeViolation
                | ExceptionVector::Trap
                | ExceptionVector::SoftwareInterrupt
        )
    }
}

/// Which unit produced a fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultOrigin {
    /// TLB path; `index` is the TLB slot involved, when one was.
    Mmu { index: Option<u16> },
    /// MPU path; the region that denied the access.
    Mpu { region: MpuRegionId },
    /// Out-of-range user access rejected by the mode decider.
    Decider,
    /// Auxiliary register access or another CPU-internal check.
    Cpu,
}

/// A fault descriptor handed to the exception dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("{vector:?} at {addr:#010x} (cause {cause:#04x}, param {param:#04x}, {origin:?})")]
pub struct Fault {
    pub vector: ExceptionVector,
    pub cause: u8,
    pub param: u8,
    /// Faulting address; becomes EFA for vectors that don't latch the PC.
    pub addr: u32,
    pub origin: FaultOrigin,
}

impl Fault {
    #[inline]
    pub const fn new(
        vector: ExceptionVector,
        cause: u8,
        param: u8,
        addr: u32,
        origin: FaultOrigin,
    ) -> Self {
        Self {
            vector,
            cause,
            param,
            addr,
            origin,
        }
    }

    pub const fn instruction_error() -> Self {
        Self::new(ExceptionVector::InstructionError, 0, 0, 0, FaultOrigin::Cpu)
    }

    pub const fn privilege_violation() -> Self {
        Self::new(ExceptionVector::PrivilegeViolation, 0, 0, 0, FaultOrigin::Cpu)
    }

    /// The value ECR takes when this fault is taken.
    #[inline]
    pub const fn ecr(&self) -> u32 {
        ((self.vector as u32) << 16) | ((self.cause as u32) << 8) | self.param as u32
    }
}

/// Range of a downstream translation cache that must be dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushScope {
    All,
    /// The page containing `vaddr`.
    Page { vaddr: u32 },
}

/// A cache of translated pages kept by the consumer (e.g. a JIT's soft TLB).
pub trait TranslationCache {
    fn flush(&mut self, scope: FlushScope);
}

impl<T: TranslationCache + ?Sized> TranslationCache for &mut T {
    #[inline]
    fn flush(&mut self, scope: FlushScope) {
        <T as TranslationCache>::flush(&mut **self, scope)
    }
}

/// A consumer without a translation cache.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoTranslationCache;

impl TranslationCache for NoTranslationCache {
    #[inline]
    fn flush(&mut self, _scope: FlushScope) {}
}
