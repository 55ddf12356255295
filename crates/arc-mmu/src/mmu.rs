//! MMUv4 register file (TLBPD0/PD1/INDEX/COMMAND, PID, SASID) and the
//! software-managed TLB behind it.

use tracing::{debug, trace, warn};

use crate::tlb::{vpn, PD0_ASID, PD0_V};
use crate::{
    AccessType, ExceptionVector, Fault, FaultOrigin, FlushScope, PagePerms, Privilege, Tlb,
    TlbEntry, TranslationCache, MMU_VA_END, PAGE_MASK, PROTV_PARAM_MMU,
};

/// MMU_BUILD: MMUv4, 8K pages, 2M super pages, 256x4 joint TLB, 4 uITLB,
/// 8 uDTLB.
pub const MMU_BUILD: u32 = 0x04e2_1a4a;

const PID_ENABLE: u32 = 1 << 31;

pub(crate) const TLBINDEX_E: u32 = 0x8000_0000;
pub(crate) const TLBINDEX_RC: u32 = 0x7000_0000;
pub(crate) const TLBINDEX_INDEX: u32 = 0x1fff;
/// RC value reported by probes that hit more than one entry.
const TLBINDEX_RC_MULTIPLE: u32 = 0x1000_0000;

/// Commands accepted by TLBCOMMAND.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum TlbCommand {
    Write = 1,
    Read = 2,
    GetIndex = 3,
    Probe = 4,
    WriteNoInvalidate = 5,
    InvalidateMicroTlbs = 6,
    Insert = 7,
    Delete = 8,
}

impl TlbCommand {
    pub fn from_raw(raw: u32) -> Option<Self> {
        Some(match raw {
            1 => TlbCommand::Write,
            2 => TlbCommand::Read,
            3 => TlbCommand::GetIndex,
            4 => TlbCommand::Probe,
            5 => TlbCommand::WriteNoInvalidate,
            6 => TlbCommand::InvalidateMicroTlbs,
            7 => TlbCommand::Insert,
            8 => TlbCommand::Delete,
            _ => return None,
        })
    }
}

/// A successful MMU translation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Translation {
    pub paddr: u32,
    /// Permissions the current privilege level has on the page.
    pub perms: PagePerms,
    /// TLB slot used, `None` for untranslated accesses.
    pub index: Option<u16>,
}

impl Translation {
    #[inline]
    fn identity(vaddr: u32) -> Self {
        Self {
            paddr: vaddr,
            perms: PagePerms::all(),
            index: None,
        }
    }
}

/// Optional MMU/TLB statistics.
///
/// When the `stats` feature is disabled, this type contains no fields and
/// [`Mmu::stats`] will always return `None`.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MmuStats {
    /// Translations that reached the TLB.
    #[cfg(feature = "stats")]
    pub tlb_lookups: u64,
    #[cfg(feature = "stats")]
    pub tlb_hits: u64,
    #[cfg(feature = "stats")]
    pub tlb_misses: u64,
    /// Whole-table flushes of the downstream cache (PID writes).
    #[cfg(feature = "stats")]
    pub flush_all: u64,
    #[cfg(feature = "stats")]
    pub inserts: u64,
    #[cfg(feature = "stats")]
    pub deletes: u64,
}

#[derive(Debug, Clone)]
pub struct Mmu {
    enabled: bool,
    asid: u8,
    sasid0: u32,
    sasid1: u32,
    tlbpd0: u32,
    tlbpd1: u32,
    tlbpd1_hi: u32,
    tlbindex: u32,
    tlbcmd: u32,
    scratch_data0: u32,
    tlb: Tlb,
    #[cfg(feature = "stats")]
    stats: MmuStats,
}

impl Default for Mmu {
    fn default() -> Self {
        Self::new()
    }
}

impl Mmu {
    pub fn new() -> Self {
        Self {
            enabled: false,
            asid: 0,
            sasid0: 0,
            sasid1: 0,
            tlbpd0: 0,
            tlbpd1: 0,
            tlbpd1_hi: 0,
            tlbindex: 0,
            tlbcmd: 0,
            scratch_data0: 0,
            tlb: Tlb::new(),
            #[cfg(feature = "stats")]
            stats: MmuStats::default(),
        }
    }

    /// Reset state: disabled, ASID 0, all entries invalid.
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    #[inline]
    pub fn stats(&self) -> Option<MmuStats> {
        #[cfg(feature = "stats")]
        {
            Some(self.stats)
        }

        #[cfg(not(feature = "stats"))]
        {
            None
        }
    }

    #[inline]
    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// Turn translation off without touching the TLB (double fault).
    pub fn disable(&mut self) {
        self.enabled = false;
    }

    #[inline]
    pub fn asid(&self) -> u8 {
        self.asid
    }

    #[inline]
    pub fn sasid(&self) -> u64 {
        ((self.sasid1 as u64) << 32) | self.sasid0 as u64
    }

    #[inline]
    pub fn tlb(&self) -> &Tlb {
        &self.tlb
    }

    #[inline]
    pub fn pid(&self) -> u32 {
        if self.enabled {
            PID_ENABLE | self.asid as u32
        } else {
            self.asid as u32
        }
    }

    /// PID write: enable bit and current ASID. Cached translations from the
    /// old context are dropped wholesale.
    pub fn write_pid(&mut self, value: u32, cache: &mut impl TranslationCache) {
        self.enabled = value & PID_ENABLE != 0;
        self.asid = (value & PD0_ASID) as u8;
        #[cfg(feature = "stats")]
        {
            self.stats.flush_all = self.stats.flush_all.wrapping_add(1);
        }
        cache.flush(FlushScope::All);
    }

    pub fn sasid0(&self) -> u32 {
        self.sasid0
    }

    pub fn set_sasid0(&mut self, value: u32) {
        self.sasid0 = value;
    }

    pub fn sasid1(&self) -> u32 {
        self.sasid1
    }

    pub fn set_sasid1(&mut self, value: u32) {
        self.sasid1 = value;
    }

    pub fn tlbpd0(&self) -> u32 {
        self.tlbpd0
    }

    pub fn set_tlbpd0(&mut self, value: u32) {
        self.tlbpd0 = value;
    }

    pub fn tlbpd1(&self) -> u32 {
        self.tlbpd1
    }

    pub fn set_tlbpd1(&mut self, value: u32) {
        self.tlbpd1 = value;
    }

    pub fn tlbpd1_hi(&self) -> u32 {
        self.tlbpd1_hi
    }

    pub fn set_tlbpd1_hi(&mut self, value: u32) {
        self.tlbpd1_hi = value;
    }

    pub fn tlbindex(&self) -> u32 {
        self.tlbindex
    }

    pub fn set_tlbindex(&mut self, value: u32) {
        self.tlbindex = value;
    }

    /// Last value written to TLBCOMMAND.
    pub fn tlbcommand(&self) -> u32 {
        self.tlbcmd
    }

    pub fn scratch_data0(&self) -> u32 {
        self.scratch_data0
    }

    pub fn set_scratch_data0(&mut self, value: u32) {
        self.scratch_data0 = value;
    }

    #[inline]
    fn indexed_slot(&self) -> u16 {
        (self.tlbindex & TLBINDEX_INDEX) as u16
    }

    /// Execute a TLBCOMMAND write against the staged PD0/PD1/INDEX registers.
    pub fn command(&mut self, raw: u32, cache: &mut impl TranslationCache) {
        self.tlbcmd = raw;
        let Some(cmd) = TlbCommand::from_raw(raw) else {
            warn!(command = raw, "ignoring unknown TLB command");
            return;
        };

        let pd0 = self.tlbpd0;
        let pd1 = self.tlbpd1;
        match cmd {
            // No micro-TLBs are modelled, so both write flavours are the same.
            TlbCommand::Write | TlbCommand::WriteNoInvalidate => {
                let index = self.indexed_slot();
                let old = *self.tlb.entry(index);
                if old.valid() {
                    cache.flush(FlushScope::Page { vaddr: old.vpn() });
                }
                cache.flush(FlushScope::Page { vaddr: vpn(pd0) });
                self.tlb.write(index, TlbEntry::new(pd0, pd1));
                debug!(index, pd0, pd1, "TLB write");
            }
            TlbCommand::Read => {
                let entry = *self.tlb.entry(self.indexed_slot());
                self.tlbpd0 = entry.pd0;
                self.tlbpd1 = entry.pd1;
                self.tlbindex &= !(TLBINDEX_E | TLBINDEX_RC);
            }
            TlbCommand::GetIndex | TlbCommand::Probe => {
                let found = self.tlb.lookup_tag(pd0);
                // A GETIX miss names the slot a following WRITE should fill.
                self.tlbindex = match found.matches {
                    0 if cmd == TlbCommand::GetIndex => found.index() as u32,
                    0 => TLBINDEX_E,
                    1 => found.index() as u32,
                    _ => TLBINDEX_E | TLBINDEX_RC_MULTIPLE,
                };
            }
            TlbCommand::InvalidateMicroTlbs => {}
            TlbCommand::Delete => {
                self.remove_matching(pd0, cache);
            }
            TlbCommand::Insert => {
                let matched = self.remove_matching(pd0, cache);
                if pd0 & PD0_V == 0 {
                    self.tlbindex = TLBINDEX_E;
                    debug!(pd0, "TLB insert without valid bit");
                    return;
                }
                let set = Tlb::set_index(pd0);
                let way = matched.unwrap_or_else(|| self.tlb.next_way(set));
                let index = self.tlb.insert(set, way, TlbEntry::new(pd0, pd1));
                self.tlbindex = index as u32;
                #[cfg(feature = "stats")]
                {
                    self.stats.inserts = self.stats.inserts.wrapping_add(1);
                }
                debug!(
                    index,
                    asid = pd0 & PD0_ASID,
                    vpn = vpn(pd0),
                    pfn = pd1 & PAGE_MASK,
                    "TLB insert"
                );
            }
        }
    }

    /// Shared DELETE/INSERT prologue: drop the page from the downstream cache,
    /// then invalidate every entry tagged like `pd0`. Returns the way of a
    /// single match.
    fn remove_matching(&mut self, pd0: u32, cache: &mut impl TranslationCache) -> Option<usize> {
        cache.flush(FlushScope::Page { vaddr: vpn(pd0) });

        let found = self.tlb.lookup_tag(pd0);
        let removed = self.tlb.invalidate_tag(pd0);
        debug_assert_eq!(found.matches, removed);
        #[cfg(feature = "stats")]
        {
            self.stats.deletes = self.stats.deletes.wrapping_add(removed as u64);
        }
        match removed {
            0 => {
                self.tlbindex = TLBINDEX_E;
                None
            }
            1 => {
                self.tlbindex = found.index() as u32;
                debug!(index = found.index(), pd0, "TLB delete");
                Some(found.way)
            }
            n => {
                debug!(count = n, pd0, "TLB delete of duplicate entries");
                None
            }
        }
    }

    /// Translate `vaddr` for `access` at `privilege`.
    ///
    /// On a miss, TLBPD0 is staged with the faulting VPN and current ASID so
    /// the refill handler only has to supply PD1.
    pub fn translate(
        &mut self,
        vaddr: u32,
        access: AccessType,
        privilege: Privilege,
    ) -> Result<Translation, Fault> {
        if privilege.is_user() && vaddr >= MMU_VA_END {
            return Err(Fault::new(
                ExceptionVector::ProtectionViolation,
                access.cause_code(),
                PROTV_PARAM_MMU,
                vaddr,
                FaultOrigin::Mmu { index: None },
            ));
        }
        if vaddr >= MMU_VA_END || !self.enabled {
            return Ok(Translation::identity(vaddr));
        }

        #[cfg(feature = "stats")]
        {
            self.stats.tlb_lookups = self.stats.tlb_lookups.wrapping_add(1);
        }

        let found = self.tlb.lookup(vaddr, self.asid, self.sasid());
        if found.matches > 1 {
            return Err(Fault::new(
                ExceptionVector::MachineCheck,
                0x01,
                0x00,
                vaddr,
                FaultOrigin::Mmu {
                    index: Some(found.index()),
                },
            ));
        }
        if found.matches == 0 {
            #[cfg(feature = "stats")]
            {
                self.stats.tlb_misses = self.stats.tlb_misses.wrapping_add(1);
            }
            self.tlbpd0 = vpn(vaddr) | PD0_V | self.asid as u32;
            trace!(vaddr, asid = self.asid, "TLB miss");
            let (vector, cause) = if access.is_execute() {
                (ExceptionVector::TlbMissInstruction, 0)
            } else {
                (ExceptionVector::TlbMissData, access.cause_code())
            };
            return Err(Fault::new(
                vector,
                cause,
                0x00,
                vaddr,
                FaultOrigin::Mmu { index: None },
            ));
        }

        #[cfg(feature = "stats")]
        {
            self.stats.tlb_hits = self.stats.tlb_hits.wrapping_add(1);
        }

        let index = found.index();
        let entry = self.tlb.entry(index);
        let perms = entry.perms().effective(privilege);
        if !perms.allows(access) {
            return Err(Fault::new(
                ExceptionVector::ProtectionViolation,
                access.cause_code(),
                PROTV_PARAM_MMU,
                vaddr,
                FaultOrigin::Mmu { index: Some(index) },
            ));
        }

        Ok(Translation {
            paddr: entry.pfn() | (vaddr & !PAGE_MASK),
            perms,
            index: Some(index),
        })
    }

    /// Side-effect free lookup (debugger reads): no PD0 staging, no stats,
    /// no permission check.
    pub fn probe(&self, vaddr: u32, privilege: Privilege) -> Option<Translation> {
        if vaddr >= MMU_VA_END || !self.enabled {
            return Some(Translation::identity(vaddr));
        }
        let found = self.tlb.lookup(vaddr, self.asid, self.sasid());
        if !found.is_hit() {
            return None;
        }
        let index = found.index();
        let entry = self.tlb.entry(index);
        Some(Translation {
            paddr: entry.pfn() | (vaddr & !PAGE_MASK),
            perms: entry.perms().effective(privilege),
            index: Some(index),
        })
    }
}
