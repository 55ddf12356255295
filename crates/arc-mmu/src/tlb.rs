use bitflags::bitflags;

use crate::{PagePerms, Privilege, PAGE_MASK, PAGE_SHIFT};

pub const TLB_WAYS: usize = 4;
pub const TLB_SETS: usize = 256;
pub const TLB_ENTRIES: usize = TLB_WAYS * TLB_SETS;

pub(crate) const PD0_ASID: u32 = 0xff;
pub(crate) const PD0_G: u32 = 0x100;
pub(crate) const PD0_V: u32 = 0x200;
pub(crate) const PD0_SZ: u32 = 0x400;
pub(crate) const PD0_L: u32 = 0x800;
pub(crate) const PD0_S: u32 = 0x8000_0000;
/// Shared-library entries keep their SASID slot in the low ASID bits.
pub(crate) const PD0_SASID_SLOT: u32 = 0x3f;

/// VPN as compared by lookups: page aligned, top bit dropped.
#[inline]
pub(crate) const fn vpn(addr: u32) -> u32 {
    addr & PAGE_MASK & !0x8000_0000
}

bitflags! {
    /// Permission and attribute bits of TLBPD1.
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
    pub struct TlbPerms: u32 {
        const FC = 1 << 0;
        const XU = 1 << 1;
        const WU = 1 << 2;
        const RU = 1 << 3;
        const XK = 1 << 4;
        const WK = 1 << 5;
        const RK = 1 << 6;
    }
}

impl TlbPerms {
    /// Kernel accesses use only the kernel bits, user accesses only the user
    /// bits.
    pub fn effective(self, privilege: Privilege) -> PagePerms {
        let (r, w, x) = match privilege {
            Privilege::Kernel => (TlbPerms::RK, TlbPerms::WK, TlbPerms::XK),
            Privilege::User => (TlbPerms::RU, TlbPerms::WU, TlbPerms::XU),
        };
        let mut perms = PagePerms::empty();
        perms.set(PagePerms::READ, self.contains(r));
        perms.set(PagePerms::WRITE, self.contains(w));
        perms.set(PagePerms::EXEC, self.contains(x));
        perms
    }
}

/// One TLB slot, stored in TLBPD0/TLBPD1 register format.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TlbEntry {
    pub pd0: u32,
    pub pd1: u32,
}

impl TlbEntry {
    #[inline]
    pub const fn new(pd0: u32, pd1: u32) -> Self {
        Self { pd0, pd1 }
    }

    #[inline]
    pub fn vpn(&self) -> u32 {
        vpn(self.pd0)
    }

    #[inline]
    pub fn asid(&self) -> u8 {
        (self.pd0 & PD0_ASID) as u8
    }

    #[inline]
    pub fn valid(&self) -> bool {
        self.pd0 & PD0_V != 0
    }

    #[inline]
    pub fn global(&self) -> bool {
        self.pd0 & PD0_G != 0
    }

    #[inline]
    pub fn shared(&self) -> bool {
        self.pd0 & PD0_S != 0
    }

    #[inline]
    pub fn super_page(&self) -> bool {
        self.pd0 & PD0_SZ != 0
    }

    #[inline]
    pub fn locked(&self) -> bool {
        self.pd0 & PD0_L != 0
    }

    #[inline]
    pub fn perms(&self) -> TlbPerms {
        TlbPerms::from_bits_truncate(self.pd1)
    }

    /// Physical page base.
    #[inline]
    pub fn pfn(&self) -> u32 {
        self.pd1 & PAGE_MASK
    }

    #[inline]
    fn invalidate(&mut self) {
        self.pd0 &= !PD0_V;
    }

    /// Lookup match against the running context.
    #[inline]
    fn matches_context(&self, vpn: u32, asid: u8, sasid: u64) -> bool {
        if !self.valid() || self.vpn() != vpn {
            return false;
        }
        if self.global() {
            true
        } else if self.shared() {
            sasid & (1u64 << (self.pd0 & PD0_SASID_SLOT)) != 0
        } else {
            self.asid() == asid
        }
    }

    /// Command match: same VPN, size and tag as the staged TLBPD0. Global
    /// descriptors ignore the ASID/shared tag.
    #[inline]
    fn matches_tag(&self, pd0: u32) -> bool {
        let mut mask = PD0_SZ | PD0_G;
        if pd0 & PD0_G == 0 {
            mask |= PD0_S | PD0_ASID;
        }
        self.valid() && self.vpn() == vpn(pd0) && (self.pd0 & mask) == (pd0 & mask)
    }
}

/// Result of scanning one set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TlbLookup {
    pub set: usize,
    /// Last matching way, or the round-robin victim when nothing matched.
    pub way: usize,
    pub matches: usize,
}

impl TlbLookup {
    #[inline]
    pub fn index(&self) -> u16 {
        (self.set * TLB_WAYS + self.way) as u16
    }

    #[inline]
    pub fn is_hit(&self) -> bool {
        self.matches == 1
    }
}

/// The 256x4 set-associative joint TLB.
#[derive(Debug, Clone)]
pub struct Tlb {
    entries: [[TlbEntry; TLB_WAYS]; TLB_SETS],
    next_way: [u8; TLB_SETS],
}

impl Default for Tlb {
    fn default() -> Self {
        Self::new()
    }
}

impl Tlb {
    pub fn new() -> Self {
        Self {
            entries: [[TlbEntry::default(); TLB_WAYS]; TLB_SETS],
            next_way: [0; TLB_SETS],
        }
    }

    #[inline]
    pub fn set_index(vaddr: u32) -> usize {
        ((vaddr >> PAGE_SHIFT) as usize) & (TLB_SETS - 1)
    }

    #[inline]
    fn slot(index: u16) -> (usize, usize) {
        let index = index as usize % TLB_ENTRIES;
        (index / TLB_WAYS, index % TLB_WAYS)
    }

    /// Scan the set for `vaddr` against the running (`asid`, `sasid`) context.
    ///
    /// Never mutates: on a miss the reported way is only an insertion hint.
    #[inline]
    pub fn lookup(&self, vaddr: u32, asid: u8, sasid: u64) -> TlbLookup {
        let set = Self::set_index(vaddr);
        let vpn = vpn(vaddr);
        self.scan(set, |entry| entry.matches_context(vpn, asid, sasid))
    }

    /// Scan the set for entries carrying the same tag as `pd0`.
    pub fn lookup_tag(&self, pd0: u32) -> TlbLookup {
        let set = Self::set_index(pd0);
        self.scan(set, |entry| entry.matches_tag(pd0))
    }

    #[inline]
    fn scan(&self, set: usize, mut matches: impl FnMut(&TlbEntry) -> bool) -> TlbLookup {
        let mut found = None;
        let mut count = 0;
        for (way, entry) in self.entries[set].iter().enumerate() {
            if matches(entry) {
                found = Some(way);
                count += 1;
            }
        }
        TlbLookup {
            set,
            way: found.unwrap_or(self.next_way[set] as usize),
            matches: count,
        }
    }

    #[inline]
    pub fn entry(&self, index: u16) -> &TlbEntry {
        let (set, way) = Self::slot(index);
        &self.entries[set][way]
    }

    #[inline]
    pub fn next_way(&self, set: usize) -> usize {
        self.next_way[set] as usize
    }

    /// Direct slot write (TLBWrite/TLBWriteNI). Does not touch replacement
    /// state.
    pub fn write(&mut self, index: u16, entry: TlbEntry) {
        let (set, way) = Self::slot(index);
        self.entries[set][way] = entry;
    }

    /// Insert into `way` of `set` and advance the set's round-robin pointer.
    pub fn insert(&mut self, set: usize, way: usize, entry: TlbEntry) -> u16 {
        self.entries[set][way] = entry;
        self.next_way[set] = (self.next_way[set] + 1) & (TLB_WAYS as u8 - 1);
        (set * TLB_WAYS + way) as u16
    }

    /// Clear V on every entry of `set` matching `pd0`'s tag; returns how many
    /// were invalidated.
    pub fn invalidate_tag(&mut self, pd0: u32) -> usize {
        let set = Self::set_index(pd0);
        let mut count = 0;
        for entry in self.entries[set].iter_mut() {
            if entry.matches_tag(pd0) {
                entry.invalidate();
                count += 1;
            }
        }
        count
    }

    pub fn flush_all(&mut self) {
        self.entries = [[TlbEntry::default(); TLB_WAYS]; TLB_SETS];
        self.next_way = [0; TLB_SETS];
    }

    /// Valid entries with their TLB index, for debug dumps.
    pub fn valid_entries(&self) -> impl Iterator<Item = (u16, &TlbEntry)> + '_ {
        self.entries
            .iter()
            .flatten()
            .enumerate()
            .filter(|(_, entry)| entry.valid())
            .map(|(index, entry)| (index as u16, entry))
    }
}
