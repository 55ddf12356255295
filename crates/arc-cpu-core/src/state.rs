use tracing::trace;

use crate::status::Status32;

/// Core register numbers with a fixed role.
pub mod gpr {
    pub const GP: usize = 26;
    pub const FP: usize = 27;
    pub const SP: usize = 28;
    pub const ILINK: usize = 29;
    pub const BLINK: usize = 31;
    pub const LP_COUNT: usize = 60;
}

pub const NUM_CORE_REGS: usize = 64;
/// Registers 0..32 may have a second bank.
const BANKABLE_REGS: usize = 32;

/// SP and ILINK are shared between banks so that a fast interrupt can switch
/// stacks and record its return address regardless of the bank in use.
#[inline]
fn is_banked(reg: usize) -> bool {
    reg != gpr::SP && reg != gpr::ILINK
}

/// Architectural register state touched by exception and interrupt handling.
#[derive(Debug, Clone)]
pub struct CpuState {
    pub r: [u32; NUM_CORE_REGS],
    pub pc: u32,
    pub bta: u32,
    /// LP_START / LP_END.
    pub lps: u32,
    pub lpe: u32,
    pub status: Status32,
    /// STATUS32_P0: saved by a fast interrupt.
    pub stat_l1: Status32,
    /// ERSTATUS.
    pub stat_er: Status32,
    pub eret: u32,
    pub erbta: u32,
    pub ecr: u32,
    pub efa: u32,
    pub aux_user_sp: u32,
    /// INT_VECTOR_BASE.
    pub intvec: u32,
    pub jli_base: u32,
    pub ldi_base: u32,
    pub ei_base: u32,
    /// A delay-slot instruction is executing.
    pub in_delay_slot: bool,
    /// The inactive bank, when the core has two.
    other_bank: Option<[u32; BANKABLE_REGS]>,
    active_bank: u8,
}

impl Default for CpuState {
    fn default() -> Self {
        Self::new(false)
    }
}

impl CpuState {
    pub fn new(second_bank: bool) -> Self {
        Self {
            r: [0; NUM_CORE_REGS],
            pc: 0,
            bta: 0,
            lps: 0,
            lpe: 0,
            status: Status32::default(),
            stat_l1: Status32::default(),
            stat_er: Status32::default(),
            eret: 0,
            erbta: 0,
            ecr: 0,
            efa: 0,
            aux_user_sp: 0,
            intvec: 0,
            jli_base: 0,
            ldi_base: 0,
            ei_base: 0,
            in_delay_slot: false,
            other_bank: second_bank.then_some([0; BANKABLE_REGS]),
            active_bank: 0,
        }
    }

    pub fn reset(&mut self) {
        *self = Self::new(self.other_bank.is_some());
    }

    #[inline]
    pub fn sp(&self) -> u32 {
        self.r[gpr::SP]
    }

    #[inline]
    pub fn set_sp(&mut self, value: u32) {
        self.r[gpr::SP] = value;
    }

    /// Exchange SP with AUX_USER_SP.
    pub fn switch_sp(&mut self) {
        trace!(sp = self.r[gpr::SP], user_sp = self.aux_user_sp, "switch SP");
        std::mem::swap(&mut self.r[gpr::SP], &mut self.aux_user_sp);
    }

    #[inline]
    pub fn active_bank(&self) -> u8 {
        self.active_bank
    }

    /// Replace STATUS32, following a change of STATUS32.RB with the register
    /// file.
    pub fn set_status(&mut self, status: Status32) {
        self.status = status;
        self.select_bank(status.rb);
    }

    /// Make bank `rb` current. Cores with one bank ignore RB.
    pub fn select_bank(&mut self, rb: u8) {
        let wanted = rb.min(1);
        let Some(other) = self.other_bank.as_mut() else {
            return;
        };
        if wanted == self.active_bank {
            return;
        }
        for (reg, saved) in other.iter_mut().enumerate() {
            if is_banked(reg) {
                std::mem::swap(&mut self.r[reg], saved);
            }
        }
        self.active_bank = wanted;
        trace!(bank = wanted, "register bank switch");
    }
}
