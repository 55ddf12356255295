//! STATUS32 with its flags kept as named fields; packing only happens at the
//! register boundary (aux access, interrupt stack frames).

use arc_mmu::Privilege;
use bitflags::bitflags;

bitflags! {
    /// Single-bit fields of the packed STATUS32 word.
    #[derive(Debug, Copy, Clone, PartialEq, Eq)]
    struct Status32Bits: u32 {
        const H = 1 << 0;
        const AE = 1 << 5;
        const DE = 1 << 6;
        const U = 1 << 7;
        const V = 1 << 8;
        const C = 1 << 9;
        const N = 1 << 10;
        const Z = 1 << 11;
        const L = 1 << 12;
        const DZ = 1 << 13;
        const SC = 1 << 14;
        const ES = 1 << 15;
        const AD = 1 << 19;
        const US = 1 << 20;
        const IE = 1 << 31;
    }
}

const E_SHIFT: u32 = 1;
const E_MASK: u32 = 0xf;
const RB_SHIFT: u32 = 16;
const RB_MASK: u32 = 0x7;

/// Bits of STATUS32 that carry state.
pub const STATUS32_MASK: u32 = 0x801f_ffff;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Status32 {
    /// Interrupts enabled.
    pub ie: bool,
    /// User-mode access to SLEEP etc.
    pub us: bool,
    /// Alignment checks disabled.
    pub ad: bool,
    /// Register bank select.
    pub rb: u8,
    pub es: bool,
    pub sc: bool,
    pub dz: bool,
    /// Loops disabled.
    pub l: bool,
    pub z: bool,
    pub n: bool,
    pub c: bool,
    pub v: bool,
    /// User mode.
    pub u: bool,
    /// Delayed branch pending.
    pub de: bool,
    /// Exception active.
    pub ae: bool,
    /// Highest interrupt priority currently accepted.
    pub e: u8,
    /// Halted.
    pub h: bool,
}

impl Status32 {
    pub fn pack(&self) -> u32 {
        let mut bits = Status32Bits::empty();
        bits.set(Status32Bits::IE, self.ie);
        bits.set(Status32Bits::US, self.us);
        bits.set(Status32Bits::AD, self.ad);
        bits.set(Status32Bits::ES, self.es);
        bits.set(Status32Bits::SC, self.sc);
        bits.set(Status32Bits::DZ, self.dz);
        bits.set(Status32Bits::L, self.l);
        bits.set(Status32Bits::Z, self.z);
        bits.set(Status32Bits::N, self.n);
        bits.set(Status32Bits::C, self.c);
        bits.set(Status32Bits::V, self.v);
        bits.set(Status32Bits::U, self.u);
        bits.set(Status32Bits::DE, self.de);
        bits.set(Status32Bits::AE, self.ae);
        bits.set(Status32Bits::H, self.h);
        bits.bits()
            | ((self.rb as u32 & RB_MASK) << RB_SHIFT)
            | ((self.e as u32 & E_MASK) << E_SHIFT)
    }

    pub fn unpack(value: u32) -> Self {
        let bits = Status32Bits::from_bits_truncate(value);
        Self {
            ie: bits.contains(Status32Bits::IE),
            us: bits.contains(Status32Bits::US),
            ad: bits.contains(Status32Bits::AD),
            rb: ((value >> RB_SHIFT) & RB_MASK) as u8,
            es: bits.contains(Status32Bits::ES),
            sc: bits.contains(Status32Bits::SC),
            dz: bits.contains(Status32Bits::DZ),
            l: bits.contains(Status32Bits::L),
            z: bits.contains(Status32Bits::Z),
            n: bits.contains(Status32Bits::N),
            c: bits.contains(Status32Bits::C),
            v: bits.contains(Status32Bits::V),
            u: bits.contains(Status32Bits::U),
            de: bits.contains(Status32Bits::DE),
            ae: bits.contains(Status32Bits::AE),
            e: ((value >> E_SHIFT) & E_MASK) as u8,
            h: bits.contains(Status32Bits::H),
        }
    }

    #[inline]
    pub fn privilege(&self) -> Privilege {
        Privilege::from_user_bit(self.u)
    }

    /// Flag updates shared by exception and interrupt entry: drop to kernel,
    /// remember the old mode in Z, disable loops.
    pub(crate) fn enter_kernel(&mut self) {
        self.z = self.u;
        self.l = true;
        self.u = false;
        self.es = false;
        self.dz = false;
        self.de = false;
    }
}
