//! Auxiliary register map: address decoding and the access policy (which
//! registers exist on a given core, which ones user mode may touch).
//!
//! The read/write side effects live on [`crate::ArcCpu`].

use arc_mmu::{Fault, Privilege};

use crate::config::CpuConfig;
use crate::interrupts::IrqReg;

/// Auxiliary register addresses.
pub mod addr {
    pub const LP_START: u32 = 0x02;
    pub const LP_END: u32 = 0x03;
    pub const PC: u32 = 0x06;
    pub const STATUS32: u32 = 0x0a;
    pub const AUX_USER_SP: u32 = 0x0d;
    pub const AUX_IRQ_CTRL: u32 = 0x0e;
    pub const INT_VECTOR_BASE: u32 = 0x25;
    pub const AUX_IRQ_ACT: u32 = 0x43;
    pub const VECBASE_AC_BUILD: u32 = 0x68;
    pub const MPU_BUILD: u32 = 0x6d;
    pub const MMU_BUILD: u32 = 0x6f;
    pub const IRQ_BUILD: u32 = 0xf3;
    pub const AUX_IRQ_HINT: u32 = 0x201;
    pub const IRQ_PRIORITY: u32 = 0x206;
    pub const JLI_BASE: u32 = 0x290;
    pub const LDI_BASE: u32 = 0x291;
    pub const EI_BASE: u32 = 0x292;
    pub const ERET: u32 = 0x400;
    pub const ERBTA: u32 = 0x401;
    pub const ERSTATUS: u32 = 0x402;
    pub const ECR: u32 = 0x403;
    pub const EFA: u32 = 0x404;
    pub const TLBPD0: u32 = 0x405;
    pub const TLBPD1: u32 = 0x406;
    pub const TLBINDEX: u32 = 0x407;
    pub const TLBCOMMAND: u32 = 0x408;
    /// PID on MMU cores, MPU_EN on MPU cores.
    pub const PID: u32 = 0x409;
    pub const MPU_EN: u32 = 0x409;
    pub const ICAUSE: u32 = 0x40a;
    pub const IRQ_SELECT: u32 = 0x40b;
    pub const IRQ_ENABLE: u32 = 0x40c;
    pub const IRQ_TRIGGER: u32 = 0x40d;
    pub const IRQ_STATUS: u32 = 0x40f;
    pub const BTA: u32 = 0x412;
    pub const IRQ_PULSE_CANCEL: u32 = 0x415;
    pub const IRQ_PENDING: u32 = 0x416;
    pub const SCRATCH_DATA0: u32 = 0x418;
    pub const MPU_ECR: u32 = 0x420;
    /// MPU_RDBn at `MPU_RDB0 + 2n`, MPU_RDPn right after it.
    pub const MPU_RDB0: u32 = 0x422;
    pub const MPU_RDP0: u32 = 0x423;
    pub const SASID0: u32 = 0x45e;
    pub const SASID1: u32 = 0x45f;
    pub const TLBPD1_HI: u32 = 0x463;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MmuReg {
    Build,
    Pid,
    Sasid0,
    Sasid1,
    Pd0,
    Pd1,
    Pd1Hi,
    Index,
    Command,
    ScratchData0,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MpuReg {
    Build,
    Enable,
    Ecr,
    Base(u8),
    Perm(u8),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuxReg {
    Status32,
    Pc,
    Bta,
    LpStart,
    LpEnd,
    JliBase,
    LdiBase,
    EiBase,
    AuxUserSp,
    IntVectorBase,
    Eret,
    Erbta,
    Erstatus,
    Ecr,
    Efa,
    Mmu(MmuReg),
    Mpu(MpuReg),
    Irq(IrqReg),
}

/// Optional unit a register belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Feature {
    Mmu,
    Mpu,
    Interrupts,
}

impl Feature {
    fn configured(self, config: &CpuConfig) -> bool {
        match self {
            Feature::Mmu => config.has_mmu,
            Feature::Mpu => config.has_mpu,
            Feature::Interrupts => config.has_interrupts,
        }
    }
}

/// Registers sharing an address, tried in order; the first one whose unit
/// is configured wins.
const PID_ALIASES: [(Feature, AuxReg); 2] = [
    (Feature::Mmu, AuxReg::Mmu(MmuReg::Pid)),
    (Feature::Mpu, AuxReg::Mpu(MpuReg::Enable)),
];

const MPU_REGION_REGS: u32 = 2 * arc_mmu::MAX_REGIONS as u32;

impl AuxReg {
    /// Map an aux address to a register. `None` for addresses this core
    /// never implements.
    pub fn decode(address: u32, config: &CpuConfig) -> Option<Self> {
        let reg = match address {
            addr::LP_START => AuxReg::LpStart,
            addr::LP_END => AuxReg::LpEnd,
            addr::PC => AuxReg::Pc,
            addr::STATUS32 => AuxReg::Status32,
            addr::AUX_USER_SP => AuxReg::AuxUserSp,
            addr::AUX_IRQ_CTRL => AuxReg::Irq(IrqReg::Ctrl),
            addr::INT_VECTOR_BASE => AuxReg::IntVectorBase,
            addr::AUX_IRQ_ACT => AuxReg::Irq(IrqReg::Act),
            addr::VECBASE_AC_BUILD => AuxReg::Irq(IrqReg::VecbaseBuild),
            addr::MPU_BUILD => AuxReg::Mpu(MpuReg::Build),
            addr::MMU_BUILD => AuxReg::Mmu(MmuReg::Build),
            addr::IRQ_BUILD => AuxReg::Irq(IrqReg::Build),
            addr::AUX_IRQ_HINT => AuxReg::Irq(IrqReg::Hint),
            addr::IRQ_PRIORITY => AuxReg::Irq(IrqReg::Priority),
            addr::JLI_BASE => AuxReg::JliBase,
            addr::LDI_BASE => AuxReg::LdiBase,
            addr::EI_BASE => AuxReg::EiBase,
            addr::ERET => AuxReg::Eret,
            addr::ERBTA => AuxReg::Erbta,
            addr::ERSTATUS => AuxReg::Erstatus,
            addr::ECR => AuxReg::Ecr,
            addr::EFA => AuxReg::Efa,
            addr::TLBPD0 => AuxReg::Mmu(MmuReg::Pd0),
            addr::TLBPD1 => AuxReg::Mmu(MmuReg::Pd1),
            addr::TLBINDEX => AuxReg::Mmu(MmuReg::Index),
            addr::TLBCOMMAND => AuxReg::Mmu(MmuReg::Command),
            addr::PID => PID_ALIASES
                .iter()
                .find(|(feature, _)| feature.configured(config))
                .map_or(PID_ALIASES[0].1, |&(_, reg)| reg),
            addr::ICAUSE => AuxReg::Irq(IrqReg::Cause),
            addr::IRQ_SELECT => AuxReg::Irq(IrqReg::Select),
            addr::IRQ_ENABLE => AuxReg::Irq(IrqReg::Enable),
            addr::IRQ_TRIGGER => AuxReg::Irq(IrqReg::Trigger),
            addr::IRQ_STATUS => AuxReg::Irq(IrqReg::Status),
            addr::BTA => AuxReg::Bta,
            addr::IRQ_PULSE_CANCEL => AuxReg::Irq(IrqReg::PulseCancel),
            addr::IRQ_PENDING => AuxReg::Irq(IrqReg::Pending),
            addr::SCRATCH_DATA0 => AuxReg::Mmu(MmuReg::ScratchData0),
            addr::MPU_ECR => AuxReg::Mpu(MpuReg::Ecr),
            a if (addr::MPU_RDB0..addr::MPU_RDB0 + MPU_REGION_REGS).contains(&a) => {
                let offset = a - addr::MPU_RDB0;
                let index = (offset / 2) as u8;
                if offset % 2 == 0 {
                    AuxReg::Mpu(MpuReg::Base(index))
                } else {
                    AuxReg::Mpu(MpuReg::Perm(index))
                }
            }
            addr::SASID0 => AuxReg::Mmu(MmuReg::Sasid0),
            addr::SASID1 => AuxReg::Mmu(MmuReg::Sasid1),
            addr::TLBPD1_HI => AuxReg::Mmu(MmuReg::Pd1Hi),
            _ => return None,
        };
        Some(reg)
    }

    fn feature(self) -> Option<Feature> {
        match self {
            AuxReg::Mmu(_) => Some(Feature::Mmu),
            AuxReg::Mpu(_) => Some(Feature::Mpu),
            AuxReg::Irq(_) => Some(Feature::Interrupts),
            _ => None,
        }
    }

    /// Build configuration registers read as 0 on cores without the unit.
    fn is_build(self) -> bool {
        matches!(
            self,
            AuxReg::Mmu(MmuReg::Build)
                | AuxReg::Mpu(MpuReg::Build)
                | AuxReg::Irq(IrqReg::Build)
                | AuxReg::Irq(IrqReg::VecbaseBuild)
        )
    }

    /// Registers user mode may read.
    fn user_readable(self) -> bool {
        matches!(
            self,
            AuxReg::Status32
                | AuxReg::Pc
                | AuxReg::LpStart
                | AuxReg::LpEnd
                | AuxReg::JliBase
                | AuxReg::LdiBase
                | AuxReg::EiBase
        )
    }

    /// Registers user mode may write.
    fn user_writable(self) -> bool {
        matches!(
            self,
            AuxReg::LpStart | AuxReg::LpEnd | AuxReg::JliBase | AuxReg::LdiBase | AuxReg::EiBase
        )
    }

    /// Decode `address` and apply the access policy for a read or write at
    /// `privilege`.
    ///
    /// Unknown addresses and registers of units the core lacks raise
    /// InstructionError (build registers excepted on reads); kernel-only
    /// registers raise PrivilegeViolation from user mode.
    pub fn resolve(
        address: u32,
        config: &CpuConfig,
        privilege: Privilege,
        write: bool,
    ) -> Result<Self, Fault> {
        let reg = Self::decode(address, config).ok_or(Fault::instruction_error())?;

        let missing = reg.feature().is_some_and(|feature| !feature.configured(config));
        if missing && !(reg.is_build() && !write) {
            return Err(Fault::instruction_error());
        }

        if privilege.is_user() {
            let allowed = if write {
                reg.user_writable()
            } else {
                reg.user_readable()
            };
            if !allowed {
                return Err(Fault::privilege_violation());
            }
        }
        Ok(reg)
    }
}
