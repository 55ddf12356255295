use arc_mmu::{
    fill, AccessType, ExceptionVector, Fault, FlushScope, Mapping, Mmu, Mpu, TranslationCache,
};
use tracing::{debug, warn};

use crate::aux::{AuxReg, MmuReg, MpuReg};
use crate::config::{ConfigError, CpuConfig};
use crate::exceptions::{self, vector_slot, CpuExit};
use crate::interrupts::InterruptController;
use crate::mem::CpuBus;
use crate::state::CpuState;
use crate::status::Status32;

/// INT_VECTOR_BASE is 1K aligned.
const INT_VECTOR_BASE_MASK: u32 = !0x3ff;

/// One ARCv2 core's privileged machinery.
#[derive(Debug, Clone)]
pub struct ArcCpu {
    config: CpuConfig,
    pub state: CpuState,
    pub mmu: Mmu,
    pub mpu: Mpu,
    pub irq: InterruptController,
}

impl ArcCpu {
    pub fn new(config: CpuConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let mut cpu = Self {
            state: CpuState::new(config.has_second_bank()),
            mmu: Mmu::new(),
            mpu: Mpu::new(config.has_mpu, config.mpu_regions),
            irq: InterruptController::new(&config),
            config,
        };
        cpu.reset_registers();
        Ok(cpu)
    }

    #[inline]
    pub fn config(&self) -> &CpuConfig {
        &self.config
    }

    fn reset_registers(&mut self) {
        self.state.reset();
        self.mmu.reset();
        self.mpu.reset();
        self.irq.reset();
        self.state.intvec = self.config.reset_vector_base();
        if self.irq.present() {
            self.state.status.e = self.irq.number_of_levels() - 1;
        }
    }

    /// Reset every unit and load PC from the reset vector.
    pub fn reset<B: CpuBus>(
        &mut self,
        bus: &mut B,
        cache: &mut impl TranslationCache,
    ) -> Result<(), CpuExit> {
        self.reset_registers();
        cache.flush(FlushScope::All);
        let slot = vector_slot(self.state.intvec, ExceptionVector::Reset.number());
        self.state.pc = bus.read_u32(slot)?;
        debug!(intvec = self.state.intvec, pc = self.state.pc, "core reset");
        Ok(())
    }

    /// Translate one access at the current privilege level.
    pub fn translate(&mut self, vaddr: u32, access: AccessType) -> Result<Mapping, Fault> {
        let privilege = self.state.status.privilege();
        fill(&mut self.mmu, &mut self.mpu, vaddr, access, privilege)
    }

    /// Translate, taking the exception on failure. `Ok(None)` means the core
    /// is now at the fault handler.
    pub fn translate_or_raise<B: CpuBus>(
        &mut self,
        bus: &mut B,
        vaddr: u32,
        access: AccessType,
        cache: &mut impl TranslationCache,
    ) -> Result<Option<Mapping>, CpuExit> {
        match self.translate(vaddr, access) {
            Ok(mapping) => Ok(Some(mapping)),
            Err(fault) => {
                self.raise(bus, fault, cache)?;
                Ok(None)
            }
        }
    }

    /// Take `fault`. A double fault turns translation off and flushes `cache`.
    pub fn raise<B: CpuBus>(
        &mut self,
        bus: &mut B,
        fault: Fault,
        cache: &mut impl TranslationCache,
    ) -> Result<(), CpuExit> {
        let state = &mut self.state;
        exceptions::raise(bus, cache, state, &mut self.mmu, &mut self.mpu, fault)
    }

    pub fn set_irq_line(&mut self, vector: u8, level: bool) {
        self.irq.set_line(vector, level);
    }

    /// Instruction-boundary interrupt check. Returns the vector taken.
    pub fn poll_interrupts<B: CpuBus>(&mut self, bus: &mut B) -> Result<Option<u8>, CpuExit> {
        self.irq.poll(bus, &mut self.state)
    }

    /// RTIE.
    pub fn rtie<B: CpuBus>(
        &mut self,
        bus: &mut B,
        cache: &mut impl TranslationCache,
    ) -> Result<(), CpuExit> {
        if self.state.status.u {
            return self.raise(bus, Fault::privilege_violation(), cache);
        }
        if !self.irq.rtie(bus, &mut self.state)? {
            exceptions::exception_return(&mut self.state);
        }
        Ok(())
    }

    /// LR: read an auxiliary register at the current privilege level.
    pub fn aux_read(&self, address: u32) -> Result<u32, Fault> {
        let privilege = self.state.status.privilege();
        let reg = AuxReg::resolve(address, &self.config, privilege, false).map_err(|fault| {
            debug!(address, ?fault, "aux read rejected");
            fault
        })?;

        let state = &self.state;
        let value = match reg {
            AuxReg::Status32 => state.status.pack(),
            AuxReg::Pc => state.pc,
            AuxReg::Bta => state.bta,
            AuxReg::LpStart => state.lps,
            AuxReg::LpEnd => state.lpe,
            AuxReg::JliBase => state.jli_base,
            AuxReg::LdiBase => state.ldi_base,
            AuxReg::EiBase => state.ei_base,
            AuxReg::AuxUserSp => state.aux_user_sp,
            AuxReg::IntVectorBase => state.intvec,
            AuxReg::Eret => state.eret,
            AuxReg::Erbta => state.erbta,
            AuxReg::Erstatus => state.stat_er.pack(),
            AuxReg::Ecr => state.ecr,
            AuxReg::Efa => state.efa,
            AuxReg::Mmu(reg) => self.read_mmu(reg),
            AuxReg::Mpu(reg) => self.read_mpu(reg)?,
            AuxReg::Irq(reg) => self.irq.read(reg),
        };
        Ok(value)
    }

    fn read_mmu(&self, reg: MmuReg) -> u32 {
        if !self.config.has_mmu {
            return 0;
        }
        match reg {
            MmuReg::Build => arc_mmu::MMU_BUILD,
            MmuReg::Pid => self.mmu.pid(),
            MmuReg::Sasid0 => self.mmu.sasid0(),
            MmuReg::Sasid1 => self.mmu.sasid1(),
            MmuReg::Pd0 => self.mmu.tlbpd0(),
            MmuReg::Pd1 => self.mmu.tlbpd1(),
            MmuReg::Pd1Hi => self.mmu.tlbpd1_hi(),
            MmuReg::Index => self.mmu.tlbindex(),
            MmuReg::Command => self.mmu.tlbcommand(),
            MmuReg::ScratchData0 => self.mmu.scratch_data0(),
        }
    }

    fn read_mpu(&self, reg: MpuReg) -> Result<u32, Fault> {
        Ok(match reg {
            MpuReg::Build => self.mpu.build(),
            MpuReg::Enable => self.mpu.enable_reg(),
            MpuReg::Ecr => self.mpu.ecr(),
            MpuReg::Base(index) => self.mpu.region_base_reg(index)?,
            MpuReg::Perm(index) => self.mpu.region_perm_reg(index)?,
        })
    }

    /// SR: write an auxiliary register at the current privilege level.
    /// Changes that alter translations are reported to `cache`.
    pub fn aux_write(
        &mut self,
        address: u32,
        value: u32,
        cache: &mut impl TranslationCache,
    ) -> Result<(), Fault> {
        let privilege = self.state.status.privilege();
        let reg = AuxReg::resolve(address, &self.config, privilege, true).map_err(|fault| {
            debug!(address, value, ?fault, "aux write rejected");
            fault
        })?;

        let state = &mut self.state;
        match reg {
            AuxReg::Status32 => state.set_status(Status32::unpack(value)),
            AuxReg::Bta => state.bta = value,
            AuxReg::LpStart => state.lps = value,
            AuxReg::LpEnd => state.lpe = value,
            AuxReg::JliBase => state.jli_base = value,
            AuxReg::LdiBase => state.ldi_base = value,
            AuxReg::EiBase => state.ei_base = value,
            AuxReg::AuxUserSp => state.aux_user_sp = value,
            AuxReg::IntVectorBase => state.intvec = value & INT_VECTOR_BASE_MASK,
            AuxReg::Eret => state.eret = value,
            AuxReg::Erbta => state.erbta = value,
            AuxReg::Erstatus => state.stat_er = Status32::unpack(value),
            AuxReg::Ecr => state.ecr = value,
            AuxReg::Efa => state.efa = value,
            AuxReg::Pc => warn!(address, value, "write to read-only PC ignored"),
            AuxReg::Mmu(reg) => self.write_mmu(reg, value, cache),
            AuxReg::Mpu(reg) => self.write_mpu(reg, value, cache)?,
            AuxReg::Irq(reg) => self.irq.write(reg, value)?,
        }
        Ok(())
    }

    fn write_mmu(&mut self, reg: MmuReg, value: u32, cache: &mut impl TranslationCache) {
        let mmu = &mut self.mmu;
        match reg {
            MmuReg::Pid => mmu.write_pid(value, cache),
            MmuReg::Sasid0 => mmu.set_sasid0(value),
            MmuReg::Sasid1 => mmu.set_sasid1(value),
            MmuReg::Pd0 => mmu.set_tlbpd0(value),
            MmuReg::Pd1 => mmu.set_tlbpd1(value),
            MmuReg::Pd1Hi => mmu.set_tlbpd1_hi(value),
            MmuReg::Index => mmu.set_tlbindex(value),
            MmuReg::Command => mmu.command(value, cache),
            MmuReg::ScratchData0 => mmu.set_scratch_data0(value),
            MmuReg::Build => warn!(value, "write to MMU_BUILD ignored"),
        }
    }

    fn write_mpu(
        &mut self,
        reg: MpuReg,
        value: u32,
        cache: &mut impl TranslationCache,
    ) -> Result<(), Fault> {
        let mpu = &mut self.mpu;
        match reg {
            MpuReg::Enable => mpu.write_enable_reg(value, cache),
            MpuReg::Base(index) => mpu.write_region_base_reg(index, value, cache)?,
            MpuReg::Perm(index) => mpu.write_region_perm_reg(index, value, cache)?,
            MpuReg::Build | MpuReg::Ecr => {
                warn!(?reg, value, "write to read-only MPU register ignored");
            }
        }
        Ok(())
    }
}
