//! Interrupt controller: per-vector state, priority selection, and the
//! fast (bank switch) and regular (stack frame) entry/return protocols.
//!
//! Vectors 16..16+N are interrupt sources; priority 0 is the highest. The
//! low 16 bits of AUX_IRQ_ACT record the priorities currently in service and
//! bit 31 whether the code interrupted first was running in user mode.

use arc_mmu::{Fault, IRQ_VECTOR_BASE};
use tracing::{debug, trace, warn};

use crate::config::{CpuConfig, MAX_LEVELS};
use crate::exceptions::{vector_slot, CpuExit};
use crate::mem::CpuBus;
use crate::state::{gpr, CpuState};
use crate::status::Status32;

/// One slot per vector number, including the 16 exception vectors.
pub const IRQ_BANKS: usize = 256;

const IRQ_CTRL_MASK: u32 = 0x2e1f;
const IRQ_CTRL_NR: u32 = 0x1f;
const IRQ_CTRL_BLINK: u32 = 1 << 9;
const IRQ_CTRL_LOOP: u32 = 1 << 10;
/// Switch to the kernel stack after building the frame instead of before.
const IRQ_CTRL_LATE_SP: u32 = 1 << 11;
const IRQ_CTRL_CODE_DENSITY: u32 = 1 << 13;
/// With all 16 pairs saved BLINK is already part of the r30/r31 pair.
const IRQ_CTRL_NR_ALL: u32 = 16;

const IRQ_ACT_MASK: u32 = 0x8000_ffff;
const IRQ_ACT_PRIORITIES: u32 = 0xffff;
const IRQ_ACT_USER: u32 = 1 << 31;

const VECBASE_ALIGN_MASK: u32 = !0x3ffff;
const VECBASE_AC_VERSION: u32 = 0x04 << 2;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Trigger {
    #[default]
    Level,
    Pulse,
}

#[derive(Debug, Clone, Copy, Default)]
struct IrqBank {
    priority: u8,
    trigger: Trigger,
    enabled: bool,
    pending: bool,
}

/// Interrupt registers addressed through IRQ_SELECT or global to the
/// controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IrqReg {
    Build,
    VecbaseBuild,
    Ctrl,
    Act,
    Cause,
    Select,
    Priority,
    Enable,
    Trigger,
    Status,
    Pending,
    PulseCancel,
    Hint,
}

/// One word of a regular interrupt frame, listed in push order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FrameSlot {
    Status,
    Pc,
    JliBase,
    LdiBase,
    EiBase,
    LpCount,
    LpStart,
    LpEnd,
    Blink,
    Reg(usize),
}

impl FrameSlot {
    fn load(self, state: &CpuState) -> u32 {
        match self {
            FrameSlot::Status => state.status.pack(),
            FrameSlot::Pc => state.pc,
            FrameSlot::JliBase => state.jli_base,
            FrameSlot::LdiBase => state.ldi_base,
            FrameSlot::EiBase => state.ei_base,
            FrameSlot::LpCount => state.r[gpr::LP_COUNT],
            FrameSlot::LpStart => state.lps,
            FrameSlot::LpEnd => state.lpe,
            FrameSlot::Blink => state.r[gpr::BLINK],
            FrameSlot::Reg(reg) => state.r[reg],
        }
    }

    fn store(self, state: &mut CpuState, value: u32) {
        match self {
            FrameSlot::Status => state.set_status(Status32::unpack(value)),
            FrameSlot::Pc => {
                state.r[gpr::ILINK] = value;
                state.pc = value;
            }
            FrameSlot::JliBase => state.jli_base = value,
            FrameSlot::LdiBase => state.ldi_base = value,
            FrameSlot::EiBase => state.ei_base = value,
            FrameSlot::LpCount => state.r[gpr::LP_COUNT] = value,
            FrameSlot::LpStart => state.lps = value,
            FrameSlot::LpEnd => state.lpe = value,
            FrameSlot::Blink => state.r[gpr::BLINK] = value,
            FrameSlot::Reg(reg) => state.r[reg] = value,
        }
    }
}

fn push<B: CpuBus>(bus: &mut B, state: &mut CpuState, value: u32) -> Result<(), CpuExit> {
    let sp = state.sp().wrapping_sub(4);
    state.set_sp(sp);
    trace!(sp, value, "irq push");
    bus.write_u32(sp, value)
}

fn pop<B: CpuBus>(bus: &mut B, state: &mut CpuState) -> Result<u32, CpuExit> {
    let sp = state.sp();
    let value = bus.read_u32(sp)?;
    state.set_sp(sp.wrapping_add(4));
    trace!(sp, value, "irq pop");
    Ok(value)
}

#[derive(Debug, Clone)]
pub struct InterruptController {
    present: bool,
    number_of_interrupts: u8,
    external_interrupts: u8,
    number_of_levels: u8,
    firq: bool,
    code_density: bool,
    second_bank: bool,
    has_timer_0: bool,
    has_timer_1: bool,
    intvbase_preset: u32,
    save_pairs: &'static [usize],

    banks: [IrqBank; IRQ_BANKS],
    select: u32,
    hint: u32,
    ctrl: u32,
    act: u32,
    icause: [u32; MAX_LEVELS as usize],
}

impl InterruptController {
    pub fn new(config: &CpuConfig) -> Self {
        let mut irq = Self {
            present: config.has_interrupts,
            number_of_interrupts: config.number_of_interrupts,
            external_interrupts: config.external_interrupts,
            number_of_levels: config.number_of_levels,
            firq: config.firq,
            code_density: config.code_density,
            second_bank: config.has_second_bank(),
            has_timer_0: config.has_timer_0,
            has_timer_1: config.has_timer_1,
            intvbase_preset: config.intvbase_preset,
            save_pairs: config.save_pairs(),
            banks: [IrqBank::default(); IRQ_BANKS],
            select: 0,
            hint: 0,
            ctrl: 0,
            act: 0,
            icause: [0; MAX_LEVELS as usize],
        };
        irq.reset();
        irq
    }

    /// Clear all bookkeeping and re-enable every configured source.
    pub fn reset(&mut self) {
        self.banks = [IrqBank::default(); IRQ_BANKS];
        self.select = 0;
        self.hint = 0;
        self.ctrl = 0;
        self.act = 0;
        self.icause = [0; MAX_LEVELS as usize];
        if !self.present {
            return;
        }

        for vector in self.sources() {
            self.banks[vector].enabled = true;
        }
        // Timers take the first two lines at the highest priority.
        if self.has_timer_0 {
            self.banks[IRQ_VECTOR_BASE as usize].priority = 0;
        }
        if self.has_timer_1 {
            self.banks[IRQ_VECTOR_BASE as usize + 1].priority = 0;
        }
        debug!(sources = self.number_of_interrupts, "interrupt controller reset");
    }

    #[inline]
    fn sources(&self) -> std::ops::Range<usize> {
        let base = IRQ_VECTOR_BASE as usize;
        base..base + self.number_of_interrupts as usize
    }

    pub fn present(&self) -> bool {
        self.present
    }

    pub fn number_of_levels(&self) -> u8 {
        self.number_of_levels
    }

    /// IRQ_BUILD.
    pub fn build(&self) -> u32 {
        if !self.present {
            return 0;
        }
        0x01 | ((self.number_of_interrupts as u32) << 8)
            | ((self.external_interrupts as u32) << 16)
            | ((self.number_of_levels as u32 & 0x0f) << 24)
            | ((self.firq as u32) << 28)
    }

    /// VECBASE_AC_BUILD.
    pub fn vecbase_build(&self) -> u32 {
        if !self.present {
            return 0;
        }
        (self.intvbase_preset & VECBASE_ALIGN_MASK) | VECBASE_AC_VERSION
    }

    /// AUX_IRQ_ACT.
    #[inline]
    pub fn active(&self) -> u32 {
        self.act
    }

    /// AUX_IRQ_CTRL.
    #[inline]
    pub fn ctrl(&self) -> u32 {
        self.ctrl
    }

    /// ICAUSE: vector being serviced at the current (lowest active) priority.
    pub fn icause(&self) -> u32 {
        let active = self.act & IRQ_ACT_PRIORITIES;
        if active == 0 {
            0
        } else {
            self.icause[active.trailing_zeros() as usize]
        }
    }

    pub fn is_pending(&self, vector: u8) -> bool {
        self.banks[vector as usize].pending
    }

    pub fn priority(&self, vector: u8) -> u8 {
        self.banks[vector as usize].priority
    }

    /// Device-facing request line. Level-triggered sources follow the line;
    /// pulse-triggered sources latch a rising request until it is taken or
    /// cancelled.
    pub fn set_line(&mut self, vector: u8, level: bool) {
        if vector < IRQ_VECTOR_BASE {
            warn!(vector, "interrupt line below the first interrupt vector");
            return;
        }
        let bank = &mut self.banks[vector as usize];
        match (bank.trigger, level) {
            (_, true) => bank.pending = true,
            (Trigger::Level, false) => bank.pending = false,
            (Trigger::Pulse, false) => {}
        }
        trace!(vector, level, pending = bank.pending, "interrupt line");
    }

    /// Whether any source is requesting service.
    pub fn hard_request(&self) -> bool {
        self.banks[IRQ_VECTOR_BASE as usize..]
            .iter()
            .any(|bank| bank.pending)
    }

    /// Bitmap of priorities with at least one enabled, pending source.
    pub fn pending_priorities(&self) -> u32 {
        self.banks[self.sources()]
            .iter()
            .filter(|bank| bank.enabled && bank.pending)
            .fold(0, |bits, bank| bits | 1 << bank.priority)
    }

    /// The vector that would be taken at this instruction boundary, with its
    /// priority.
    pub fn select(&self, state: &CpuState) -> Option<(u8, u8)> {
        let status = &state.status;
        if !self.present
            || status.h
            || !status.ie
            || status.ae
            || state.in_delay_slot
            || status.de
            || !self.hard_request()
        {
            return None;
        }

        let pending = self.pending_priorities();
        let active = self.act & IRQ_ACT_PRIORITIES;
        if pending == 0 || pending.trailing_zeros() >= active.trailing_zeros() {
            return None;
        }

        (0..=status.e).find_map(|priority| {
            self.sources()
                .find(|&vector| {
                    let bank = &self.banks[vector];
                    bank.enabled && bank.pending && bank.priority == priority
                })
                .map(|vector| (vector as u8, priority))
        })
    }

    /// Take the highest-priority eligible interrupt, if any. Returns the
    /// vector taken.
    pub fn poll<B: CpuBus>(
        &mut self,
        bus: &mut B,
        state: &mut CpuState,
    ) -> Result<Option<u8>, CpuExit> {
        let Some((vector, priority)) = self.select(state) else {
            return Ok(None);
        };
        self.enter(bus, state, vector, priority)?;
        Ok(Some(vector))
    }

    fn enter<B: CpuBus>(
        &mut self,
        bus: &mut B,
        state: &mut CpuState,
        vector: u8,
        priority: u8,
    ) -> Result<(), CpuExit> {
        let interrupted_pc = state.pc;
        if self.act & IRQ_ACT_PRIORITIES == 0 {
            self.act |= (state.status.u as u32) << 31;
        }
        self.act |= 1 << priority;
        self.icause[priority as usize] = vector as u32;

        let bank = &mut self.banks[vector as usize];
        if bank.trigger == Trigger::Pulse {
            bank.pending = false;
        }

        let fast = self.firq && priority == 0;
        if fast {
            self.enter_firq(state);
        } else {
            self.enter_irq(bus, state)?;
        }

        state.pc = bus.read_u32(vector_slot(state.intvec, vector))?;
        debug!(
            vector,
            priority,
            fast,
            pc = interrupted_pc,
            handler = state.pc,
            act = self.act,
            "interrupt entry"
        );
        Ok(())
    }

    fn enter_firq(&self, state: &mut CpuState) {
        if state.status.u {
            state.switch_sp();
        }
        state.r[gpr::ILINK] = state.pc & !1;
        state.stat_l1 = state.status;

        let mut status = state.status;
        status.enter_kernel();
        if self.second_bank {
            status.rb = 1;
        }
        state.set_status(status);
        state.in_delay_slot = false;
    }

    fn enter_irq<B: CpuBus>(&self, bus: &mut B, state: &mut CpuState) -> Result<(), CpuExit> {
        let from_user = state.status.u;
        let late_sp = self.ctrl & IRQ_CTRL_LATE_SP != 0;
        if from_user && !late_sp {
            state.switch_sp();
        }

        state.r[gpr::ILINK] = state.pc & !1;
        for slot in self.frame() {
            let value = slot.load(state);
            push(bus, state, value)?;
        }

        if from_user && late_sp {
            state.switch_sp();
        }
        state.status.enter_kernel();
        state.in_delay_slot = false;
        Ok(())
    }

    fn saved_pairs(&self) -> &'static [usize] {
        let nr = (self.ctrl & IRQ_CTRL_NR) as usize;
        &self.save_pairs[..nr.min(self.save_pairs.len())]
    }

    /// Layout of a regular interrupt frame under the current AUX_IRQ_CTRL,
    /// in push order. Returns pop it in reverse.
    fn frame(&self) -> impl DoubleEndedIterator<Item = FrameSlot> {
        let code_density = self.code_density && self.ctrl & IRQ_CTRL_CODE_DENSITY != 0;
        let loops = self.ctrl & IRQ_CTRL_LOOP != 0;
        let blink =
            self.ctrl & IRQ_CTRL_BLINK != 0 && self.ctrl & IRQ_CTRL_NR != IRQ_CTRL_NR_ALL;

        [FrameSlot::Status, FrameSlot::Pc]
            .into_iter()
            .chain(
                [FrameSlot::JliBase, FrameSlot::LdiBase, FrameSlot::EiBase]
                    .into_iter()
                    .filter(move |_| code_density),
            )
            .chain(
                [FrameSlot::LpCount, FrameSlot::LpStart, FrameSlot::LpEnd]
                    .into_iter()
                    .filter(move |_| loops),
            )
            .chain(blink.then_some(FrameSlot::Blink))
            .chain(
                self.saved_pairs()
                    .iter()
                    .rev()
                    .flat_map(|&reg| [FrameSlot::Reg(reg + 1), FrameSlot::Reg(reg)]),
            )
    }

    /// Interrupt half of RTIE. Returns `false` when an exception return is
    /// due instead (exception active, or no interrupt in service).
    pub fn rtie<B: CpuBus>(&mut self, bus: &mut B, state: &mut CpuState) -> Result<bool, CpuExit> {
        let active = self.act & IRQ_ACT_PRIORITIES;
        if state.status.ae || active == 0 {
            return Ok(false);
        }

        if active == 1 && self.firq {
            self.rtie_firq(state);
        } else {
            self.rtie_irq(bus, state)?;
        }
        Ok(true)
    }

    fn rtie_firq(&mut self, state: &mut CpuState) {
        self.act &= !1;
        if self.act & IRQ_ACT_PRIORITIES == 0 && self.act & IRQ_ACT_USER != 0 {
            state.switch_sp();
        }
        state.set_status(state.stat_l1);
        self.act &= !((state.status.u as u32) << 31);
        state.pc = state.r[gpr::ILINK];
        debug!(pc = state.pc, act = self.act, "fast interrupt return");
    }

    fn rtie_irq<B: CpuBus>(&mut self, bus: &mut B, state: &mut CpuState) -> Result<(), CpuExit> {
        let priority = (self.act & IRQ_ACT_PRIORITIES).trailing_zeros();
        let vector = self.icause[priority as usize];
        self.act &= !(1 << priority);

        let none_active = self.act & IRQ_ACT_PRIORITIES == 0;
        let late_sp = self.ctrl & IRQ_CTRL_LATE_SP != 0;
        if none_active && self.act & IRQ_ACT_USER != 0 && late_sp {
            state.switch_sp();
        }

        for slot in self.frame().rev() {
            let value = pop(bus, state)?;
            slot.store(state, value);
        }

        if none_active && state.status.u && !late_sp {
            state.switch_sp();
        }
        self.act &= !((state.status.u as u32) << 31);
        debug!(vector, priority, pc = state.pc, act = self.act, "interrupt return");
        Ok(())
    }

    fn selected(&self) -> &IrqBank {
        &self.banks[self.select as usize]
    }

    fn selected_mut(&mut self) -> &mut IrqBank {
        &mut self.banks[self.select as usize]
    }

    fn hinted(&self) -> bool {
        self.select >= IRQ_VECTOR_BASE as u32 && self.hint == self.select
    }

    pub fn read(&self, reg: IrqReg) -> u32 {
        match reg {
            IrqReg::Build => self.build(),
            IrqReg::VecbaseBuild => self.vecbase_build(),
            IrqReg::Ctrl => self.ctrl,
            IrqReg::Act => self.act,
            IrqReg::Cause => self.icause(),
            IrqReg::Select => self.select,
            IrqReg::Priority => self.selected().priority as u32,
            IrqReg::Enable => self.selected().enabled as u32,
            IrqReg::Trigger => (self.selected().trigger == Trigger::Pulse) as u32,
            IrqReg::Status => {
                let bank = self.selected();
                let pending = bank.pending || self.hinted();
                bank.priority as u32
                    | (bank.enabled as u32) << 4
                    | ((bank.trigger == Trigger::Pulse) as u32) << 5
                    | (pending as u32) << 31
            }
            IrqReg::Pending => (self.selected().pending || self.hinted()) as u32,
            IrqReg::PulseCancel => 0,
            IrqReg::Hint => self.hint,
        }
    }

    /// Register write. Out-of-range values for IRQ_SELECT/IRQ_PRIORITY are
    /// ignored; an AUX_IRQ_CTRL.NR the register file cannot satisfy is an
    /// instruction error.
    pub fn write(&mut self, reg: IrqReg, value: u32) -> Result<(), Fault> {
        match reg {
            IrqReg::Select => {
                let limit = IRQ_VECTOR_BASE as u32 + self.number_of_interrupts as u32;
                if value <= limit && (value as usize) < IRQ_BANKS {
                    self.select = value;
                } else {
                    warn!(value, limit, "invalid IRQ_SELECT write");
                }
            }
            IrqReg::Priority => {
                if value <= self.number_of_levels as u32 {
                    self.selected_mut().priority = (value & 0x0f) as u8;
                } else {
                    warn!(value, irq = self.select, "invalid IRQ_PRIORITY write");
                }
            }
            IrqReg::Enable => self.selected_mut().enabled = value & 1 != 0,
            IrqReg::Trigger => {
                self.selected_mut().trigger = if value & 1 != 0 {
                    Trigger::Pulse
                } else {
                    Trigger::Level
                };
            }
            IrqReg::PulseCancel => {
                let bank = self.selected_mut();
                if bank.trigger == Trigger::Pulse && value & 1 != 0 {
                    bank.pending = false;
                }
            }
            IrqReg::Hint => {
                if value == 0 {
                    if self.hint >= IRQ_VECTOR_BASE as u32 {
                        self.set_line(self.hint as u8, false);
                    }
                    self.hint = 0;
                } else if value >= IRQ_VECTOR_BASE as u32 && (value as usize) < IRQ_BANKS {
                    self.set_line(value as u8, true);
                    self.hint = value;
                } else {
                    warn!(value, "invalid AUX_IRQ_HINT write");
                }
            }
            IrqReg::Ctrl => {
                let nr = (value & IRQ_CTRL_NR) as usize;
                if nr > self.save_pairs.len() {
                    warn!(nr, pairs = self.save_pairs.len(), "AUX_IRQ_CTRL.NR too large");
                    return Err(Fault::instruction_error());
                }
                self.ctrl = value & IRQ_CTRL_MASK;
            }
            IrqReg::Act => self.act = value & IRQ_ACT_MASK,
            IrqReg::Build
            | IrqReg::VecbaseBuild
            | IrqReg::Cause
            | IrqReg::Status
            | IrqReg::Pending => {
                warn!(?reg, value, "write to read-only interrupt register ignored");
            }
        }
        Ok(())
    }
}
