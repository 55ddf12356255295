//! Build-time configuration of a core (what the BCRs advertise).

use thiserror::Error;

/// Maximum number of interrupt sources; vectors 16..256.
pub const MAX_INTERRUPTS: u8 = 240;
/// AUX_IRQ_ACT tracks priorities in its low 16 bits.
pub const MAX_LEVELS: u8 = 16;

/// First register of each pair saved by a regular interrupt entry.
static SAVE_PAIRS_32: [usize; 16] = [0, 2, 4, 6, 8, 10, 12, 14, 16, 18, 20, 22, 24, 26, 28, 30];
/// Reduced (16 entry) register file.
static SAVE_PAIRS_16: [usize; 8] = [0, 2, 10, 12, 14, 26, 28, 30];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CpuConfig {
    pub has_mmu: bool,
    pub has_mpu: bool,
    /// One of 0, 1, 2, 4, 8, 16.
    pub mpu_regions: u8,
    pub has_interrupts: bool,
    pub number_of_interrupts: u8,
    pub external_interrupts: u8,
    /// Priority levels, 1..=16.
    pub number_of_levels: u8,
    pub firq: bool,
    /// 16 (reduced) or 32.
    pub rgf_num_regs: u8,
    /// Total register banks, the base bank included: 1 (or 0) for a single
    /// bank, 2 when a second bank backs fast interrupts.
    pub rgf_num_banks: u8,
    pub code_density: bool,
    pub intvbase_preset: u32,
    pub has_timer_0: bool,
    pub has_timer_1: bool,
}

impl Default for CpuConfig {
    fn default() -> Self {
        Self {
            has_mmu: true,
            has_mpu: false,
            mpu_regions: 0,
            has_interrupts: true,
            number_of_interrupts: 32,
            external_interrupts: 30,
            number_of_levels: 15,
            firq: true,
            rgf_num_regs: 32,
            rgf_num_banks: 1,
            code_density: true,
            intvbase_preset: 0,
            has_timer_0: true,
            has_timer_1: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("MPU region count {0} is not one of 0, 1, 2, 4, 8, 16")]
    InvalidMpuRegions(u8),

    #[error("MPU regions configured on a core without an MPU")]
    MpuRegionsWithoutMpu,

    #[error("{0} interrupts exceeds the maximum of 240")]
    TooManyInterrupts(u8),

    #[error("{external} external interrupts exceeds the {total} configured interrupts")]
    TooManyExternalInterrupts { external: u8, total: u8 },

    #[error("{0} priority levels is outside 1..=16")]
    InvalidLevels(u8),

    #[error("register file size {0} is neither 16 nor 32")]
    InvalidRegisterFile(u8),

    #[error("{0} register banks (at most 2 supported)")]
    TooManyBanks(u8),
}

impl CpuConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !matches!(self.mpu_regions, 0 | 1 | 2 | 4 | 8 | 16) {
            return Err(ConfigError::InvalidMpuRegions(self.mpu_regions));
        }
        if !self.has_mpu && self.mpu_regions != 0 {
            return Err(ConfigError::MpuRegionsWithoutMpu);
        }
        if self.number_of_interrupts > MAX_INTERRUPTS {
            return Err(ConfigError::TooManyInterrupts(self.number_of_interrupts));
        }
        if self.external_interrupts > self.number_of_interrupts {
            return Err(ConfigError::TooManyExternalInterrupts {
                external: self.external_interrupts,
                total: self.number_of_interrupts,
            });
        }
        if !(1..=MAX_LEVELS).contains(&self.number_of_levels) {
            return Err(ConfigError::InvalidLevels(self.number_of_levels));
        }
        if !matches!(self.rgf_num_regs, 16 | 32) {
            return Err(ConfigError::InvalidRegisterFile(self.rgf_num_regs));
        }
        if self.rgf_num_banks > 2 {
            return Err(ConfigError::TooManyBanks(self.rgf_num_banks));
        }
        Ok(())
    }

    /// Register pairs a regular interrupt may save, in AUX_IRQ_CTRL.NR order.
    pub fn save_pairs(&self) -> &'static [usize] {
        if self.rgf_num_regs == 16 {
            &SAVE_PAIRS_16
        } else {
            &SAVE_PAIRS_32
        }
    }

    /// INT_VECTOR_BASE after reset.
    pub fn reset_vector_base(&self) -> u32 {
        self.intvbase_preset & !0x3ffff
    }

    /// STATUS32.RB is implemented and FIRQ entry switches to bank 1.
    pub fn has_second_bank(&self) -> bool {
        self.rgf_num_banks > 1
    }
}
