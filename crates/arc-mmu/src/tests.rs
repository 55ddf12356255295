use super::*;

use crate::mmu::{TLBINDEX_E, TLBINDEX_RC};
use crate::tlb::{PD0_G, PD0_S, PD0_V};

#[derive(Debug, Default)]
struct RecordingCache {
    flushes: Vec<FlushScope>,
}

impl TranslationCache for RecordingCache {
    fn flush(&mut self, scope: FlushScope) {
        self.flushes.push(scope);
    }
}

const RK: u32 = 0x40;
const WK: u32 = 0x20;
const XK: u32 = 0x10;
const RU: u32 = 0x08;
const WU: u32 = 0x04;
const XU: u32 = 0x02;

/// Distance between two VPNs that index the same set.
const SET_STRIDE: u32 = (TLB_SETS as u32) << PAGE_SHIFT;

fn tlb_insert(mmu: &mut Mmu, pd0: u32, pd1: u32) -> u32 {
    let mut cache = RecordingCache::default();
    mmu.set_tlbpd0(pd0);
    mmu.set_tlbpd1(pd1);
    mmu.command(TlbCommand::Insert as u32, &mut cache);
    mmu.tlbindex()
}

fn enabled_mmu(asid: u8) -> Mmu {
    let mut mmu = Mmu::new();
    mmu.write_pid(0x8000_0000 | asid as u32, &mut NoTranslationCache);
    mmu
}

#[test]
fn translation_cache_is_implemented_for_mut_refs() {
    fn flush_through<C: TranslationCache>(mut cache: C) {
        cache.flush(FlushScope::All);
    }

    let mut cache = RecordingCache::default();
    flush_through(&mut cache);
    assert_eq!(cache.flushes, vec![FlushScope::All]);
}

#[test]
fn disabled_mmu_is_identity() {
    let mut mmu = Mmu::new();
    let t = mmu
        .translate(0x1234_5678, AccessType::Write, Privilege::User)
        .unwrap();
    assert_eq!(t.paddr, 0x1234_5678);
    assert_eq!(t.perms, PagePerms::all());
    assert_eq!(t.index, None);
}

#[test]
fn pid_write_enables_and_flushes_everything() {
    let mut mmu = Mmu::new();
    let mut cache = RecordingCache::default();
    mmu.write_pid(0x8000_0042, &mut cache);

    assert!(mmu.enabled());
    assert_eq!(mmu.asid(), 0x42);
    assert_eq!(mmu.pid(), 0x8000_0042);
    assert_eq!(cache.flushes, vec![FlushScope::All]);

    mmu.write_pid(0x7, &mut cache);
    assert!(!mmu.enabled());
    assert_eq!(mmu.pid(), 0x7);
}

#[test]
fn insert_then_translate_hits() {
    let mut mmu = enabled_mmu(5);
    let index = tlb_insert(&mut mmu, 0x0040_2000 | PD0_V | 5, 0x1230_0000 | RK | WK);
    assert_eq!(index & TLBINDEX_E, 0);

    let t = mmu
        .translate(0x0040_2abc, AccessType::Read, Privilege::Kernel)
        .unwrap();
    assert_eq!(t.paddr, 0x1230_0abc);
    assert_eq!(t.perms, PagePerms::READ | PagePerms::WRITE);
    assert_eq!(t.index, Some(index as u16));
    assert_eq!(Tlb::set_index(0x0040_2abc) * TLB_WAYS, index as usize & !3);
}

#[test]
fn miss_stages_pd0_and_reports_cause() {
    let mut mmu = enabled_mmu(9);

    let fault = mmu
        .translate(0x0001_3456, AccessType::Write, Privilege::User)
        .unwrap_err();
    assert_eq!(fault.vector, ExceptionVector::TlbMissData);
    assert_eq!(fault.cause, 2);
    assert_eq!(fault.param, 0);
    assert_eq!(fault.addr, 0x0001_3456);
    assert_eq!(mmu.tlbpd0(), 0x0001_2000 | PD0_V | 9);

    let fault = mmu
        .translate(0x0000_4000, AccessType::Execute, Privilege::User)
        .unwrap_err();
    assert_eq!(fault.vector, ExceptionVector::TlbMissInstruction);
    assert_eq!(fault.cause, 0);
    assert_eq!(fault.ecr(), 0x0004_0000);
}

#[test]
fn asid_mismatch_misses_but_global_hits() {
    let mut mmu = enabled_mmu(1);
    tlb_insert(&mut mmu, 0x0010_0000 | PD0_V | 2, 0x0050_0000 | RK);
    tlb_insert(&mut mmu, 0x0020_0000 | PD0_V | PD0_G | 7, 0x0060_0000 | RK);

    assert_eq!(
        mmu.translate(0x0010_0000, AccessType::Read, Privilege::Kernel).unwrap_err()
            .vector,
        ExceptionVector::TlbMissData
    );
    assert_eq!(
        mmu.translate(0x0020_0010, AccessType::Read, Privilege::Kernel).unwrap()
            .paddr,
        0x0060_0010
    );
}

#[test]
fn shared_entries_match_through_sasid() {
    let mut mmu = enabled_mmu(1);
    // Shared-library slot 35 lives in SASID1 bit 3.
    tlb_insert(&mut mmu, 0x0030_0000 | PD0_V | PD0_S | 35, 0x0070_0000 | RU);

    assert!(mmu
        .translate(0x0030_0000, AccessType::Read, Privilege::User)
        .is_err());

    mmu.set_sasid1(1 << 3);
    assert_eq!(mmu.sasid(), 1 << 35);
    let t = mmu
        .translate(0x0030_0004, AccessType::Read, Privilege::User)
        .unwrap();
    assert_eq!(t.paddr, 0x0070_0004);
}

#[test]
fn kernel_mode_does_not_borrow_user_bits() {
    let mut mmu = enabled_mmu(0);
    tlb_insert(&mut mmu, 0x0000_6000 | PD0_V, 0x0000_6000 | RU | WU | XU);

    let fault = mmu
        .translate(0x0000_6000, AccessType::Read, Privilege::Kernel)
        .unwrap_err();
    assert_eq!(fault.vector, ExceptionVector::ProtectionViolation);
    assert_eq!(fault.cause, 1);
    assert_eq!(fault.param, PROTV_PARAM_MMU);
    assert!(matches!(fault.origin, FaultOrigin::Mmu { index: Some(_) }));

    assert!(mmu
        .translate(0x0000_6000, AccessType::Read, Privilege::User)
        .is_ok());
}

#[test]
fn read_write_access_needs_both_bits() {
    let mut mmu = enabled_mmu(0);
    tlb_insert(&mut mmu, 0x0000_8000 | PD0_V, 0x0000_8000 | RK | XK);
    let fault = mmu
        .translate(0x0000_8000, AccessType::ReadWrite, Privilege::Kernel)
        .unwrap_err();
    assert_eq!(fault.cause, 3);

    tlb_insert(&mut mmu, 0x0000_8000 | PD0_V, 0x0000_8000 | RK | WK);
    assert!(mmu
        .translate(0x0000_8000, AccessType::ReadWrite, Privilege::Kernel)
        .is_ok());
}

#[test]
fn user_access_to_upper_half_is_a_protection_violation() {
    let mut mmu = Mmu::new();
    let fault = mmu
        .translate(0x8000_1000, AccessType::Read, Privilege::User)
        .unwrap_err();
    assert_eq!(fault.vector, ExceptionVector::ProtectionViolation);
    assert_eq!(fault.param, 0x08);

    let t = enabled_mmu(0)
        .translate(0x9000_0000, AccessType::Write, Privilege::Kernel)
        .unwrap();
    assert_eq!(t.paddr, 0x9000_0000);
}

#[test]
fn duplicate_match_is_a_machine_check() {
    let mut mmu = enabled_mmu(0);
    let mut cache = RecordingCache::default();
    let set = Tlb::set_index(0x0000_2000) as u32;
    for way in 0..2 {
        mmu.set_tlbindex(set * 4 + way);
        mmu.set_tlbpd0(0x0000_2000 | PD0_V | PD0_G);
        mmu.set_tlbpd1(0x0000_4000 | RK);
        mmu.command(TlbCommand::Write as u32, &mut cache);
    }

    let fault = mmu
        .translate(0x0000_2004, AccessType::Read, Privilege::Kernel)
        .unwrap_err();
    assert_eq!(fault.vector, ExceptionVector::MachineCheck);
    assert_eq!(fault.cause, 0x01);
    assert_eq!(fault.param, 0x00);
}

#[test]
fn round_robin_victims_cycle_through_ways() {
    let mut mmu = enabled_mmu(3);
    let base = 0x0000_a000;
    let set = Tlb::set_index(base);
    let mut ways = Vec::new();
    for i in 0..6 {
        let index = tlb_insert(&mut mmu, (base + i * SET_STRIDE) | PD0_V | 3, RK);
        assert_eq!(index as usize / TLB_WAYS, set);
        ways.push(index as usize % TLB_WAYS);
    }
    assert_eq!(ways, vec![0, 1, 2, 3, 0, 1]);
}

#[test]
fn reinsert_reuses_matching_slot_and_still_advances() {
    let mut mmu = enabled_mmu(3);
    let set = Tlb::set_index(0x0000_c000);

    let first = tlb_insert(&mut mmu, 0x0000_c000 | PD0_V | 3, 0x0001_0000 | RK);
    assert_eq!(mmu.tlb().next_way(set), 1);

    tlb_insert(&mut mmu, (0x0000_c000 + SET_STRIDE) | PD0_V | 3, RK);
    assert_eq!(mmu.tlb().next_way(set), 2);

    let again = tlb_insert(&mut mmu, 0x0000_c000 | PD0_V | 3, 0x0002_0000 | RK);
    assert_eq!(again, first);
    assert_eq!(mmu.tlb().next_way(set), 3);
    assert_eq!(
        mmu.translate(0x0000_c000, AccessType::Read, Privilege::Kernel).unwrap()
            .paddr,
        0x0002_0000
    );
}

#[test]
fn lookup_miss_does_not_consume_victim() {
    let mmu = enabled_mmu(0);
    let before = mmu.tlb().next_way(5);
    let found = mmu.tlb().lookup(5 << PAGE_SHIFT, 0, 0);
    assert_eq!(found.matches, 0);
    assert_eq!(found.way, before);
    assert_eq!(mmu.tlb().next_way(5), before);
}

#[test]
fn insert_without_valid_bit_reports_no_entry() {
    let mut mmu = enabled_mmu(0);
    let index = tlb_insert(&mut mmu, 0x0000_e000, 0x1000_0000 | RK);
    assert_eq!(index, TLBINDEX_E);
    assert_eq!(mmu.tlb().valid_entries().count(), 0);
}

#[test]
fn delete_reports_index_or_error() {
    let mut mmu = enabled_mmu(4);
    let mut cache = RecordingCache::default();
    let index = tlb_insert(&mut mmu, 0x0010_e000 | PD0_V | 4, RK);

    mmu.set_tlbpd0(0x0010_e000 | 4);
    mmu.command(TlbCommand::Delete as u32, &mut cache);
    assert_eq!(mmu.tlbindex(), index);
    assert_eq!(
        cache.flushes,
        vec![FlushScope::Page {
            vaddr: 0x0010_e000
        }]
    );
    assert!(mmu
        .translate(0x0010_e000, AccessType::Read, Privilege::Kernel)
        .is_err());

    mmu.command(TlbCommand::Delete as u32, &mut cache);
    assert_eq!(mmu.tlbindex(), TLBINDEX_E);
}

#[test]
fn delete_removes_every_duplicate() {
    let mut mmu = enabled_mmu(0);
    let mut cache = RecordingCache::default();
    let set = Tlb::set_index(0x0000_2000) as u32;
    for way in 0..3 {
        mmu.set_tlbindex(set * 4 + way);
        mmu.set_tlbpd0(0x0000_2000 | PD0_V);
        mmu.set_tlbpd1(RK);
        mmu.command(TlbCommand::Write as u32, &mut cache);
    }
    mmu.set_tlbindex(0x55);
    mmu.set_tlbpd0(0x0000_2000);
    mmu.command(TlbCommand::Delete as u32, &mut cache);

    assert_eq!(mmu.tlb().valid_entries().count(), 0);
    assert_eq!(mmu.tlbindex(), 0x55);
}

#[test]
fn read_copies_entry_and_clears_status_bits() {
    let mut mmu = enabled_mmu(2);
    let index = tlb_insert(&mut mmu, 0x0004_0000 | PD0_V | 2, 0x0008_0000 | RK | RU);

    mmu.set_tlbpd0(0);
    mmu.set_tlbpd1(0);
    mmu.set_tlbindex(index | TLBINDEX_E | TLBINDEX_RC);
    mmu.command(TlbCommand::Read as u32, &mut NoTranslationCache);

    assert_eq!(mmu.tlbpd0(), 0x0004_0000 | PD0_V | 2);
    assert_eq!(mmu.tlbpd1(), 0x0008_0000 | RK | RU);
    assert_eq!(mmu.tlbindex(), index);
    assert_eq!(mmu.tlbcommand(), TlbCommand::Read as u32);
}

#[test]
fn write_flushes_old_and_new_pages() {
    let mut mmu = enabled_mmu(0);
    let mut cache = RecordingCache::default();
    let index = tlb_insert(&mut mmu, 0x0000_2000 | PD0_V, RK);

    mmu.set_tlbindex(index);
    mmu.set_tlbpd0((0x0000_2000 + SET_STRIDE) | PD0_V);
    mmu.command(TlbCommand::WriteNoInvalidate as u32, &mut cache);
    assert_eq!(
        cache.flushes,
        vec![
            FlushScope::Page {
                vaddr: 0x0000_2000
            },
            FlushScope::Page {
                vaddr: 0x0000_2000 + SET_STRIDE
            },
        ]
    );
}

#[test]
fn probe_and_get_index() {
    let mut mmu = enabled_mmu(1);
    let index = tlb_insert(&mut mmu, 0x0006_0000 | PD0_V | 1, RK);

    mmu.set_tlbpd0(0x0006_0000 | 1);
    mmu.command(TlbCommand::Probe as u32, &mut NoTranslationCache);
    assert_eq!(mmu.tlbindex(), index);
    mmu.command(TlbCommand::GetIndex as u32, &mut NoTranslationCache);
    assert_eq!(mmu.tlbindex(), index);

    mmu.set_tlbpd0(0x0006_0000 | 2);
    mmu.command(TlbCommand::Probe as u32, &mut NoTranslationCache);
    assert_eq!(mmu.tlbindex(), TLBINDEX_E);
}

#[test]
fn get_index_miss_reports_victim_slot() {
    let mut mmu = enabled_mmu(1);
    tlb_insert(&mut mmu, 0x0006_0000 | PD0_V | 1, RK);
    let set = Tlb::set_index(0x0006_0000);
    let victim = mmu.tlb().next_way(set);

    mmu.set_tlbpd0(0x0006_0000 | 2);
    mmu.command(TlbCommand::GetIndex as u32, &mut NoTranslationCache);
    let tlbindex = mmu.tlbindex();
    assert_eq!(tlbindex & TLBINDEX_E, 0);
    assert_eq!(tlbindex as usize, set * TLB_WAYS + victim);

    // Asking again neither moves the pointer nor touches the table.
    mmu.command(TlbCommand::GetIndex as u32, &mut NoTranslationCache);
    assert_eq!(mmu.tlbindex(), tlbindex);
    assert_eq!(mmu.tlb().next_way(set), victim);
    assert_eq!(mmu.tlb().valid_entries().count(), 1);
}

#[test]
fn unknown_command_is_ignored() {
    let mut mmu = enabled_mmu(1);
    mmu.set_tlbpd0(0x0006_0000 | PD0_V | 1);
    mmu.command(0x42, &mut NoTranslationCache);
    assert_eq!(mmu.tlbcommand(), 0x42);
    assert_eq!(mmu.tlb().valid_entries().count(), 0);
}

#[test]
fn probe_has_no_side_effects() {
    let mut mmu = enabled_mmu(1);
    mmu.set_tlbpd0(0x1111);
    assert_eq!(mmu.probe(0x0000_2000, Privilege::Kernel), None);
    assert_eq!(mmu.tlbpd0(), 0x1111);

    tlb_insert(&mut mmu, 0x0000_2000 | PD0_V | 1, 0x0009_0000 | RU);
    let t = mmu.probe(0x0000_2010, Privilege::Kernel).unwrap();
    assert_eq!(t.paddr, 0x0009_0010);
    assert_eq!(t.perms, PagePerms::empty());
}

#[test]
fn reset_clears_everything() {
    let mut mmu = enabled_mmu(1);
    tlb_insert(&mut mmu, 0x0000_2000 | PD0_V | 1, RK);
    mmu.set_sasid0(0xffff_ffff);
    mmu.reset();

    assert!(!mmu.enabled());
    assert_eq!(mmu.pid(), 0);
    assert_eq!(mmu.sasid(), 0);
    assert_eq!(mmu.tlb().valid_entries().count(), 0);
}

// MPU

const KR: u32 = 1 << 8;
const KW: u32 = 1 << 7;
const KE: u32 = 1 << 6;
const UR: u32 = 1 << 5;
const UW: u32 = 1 << 4;
const UE: u32 = 1 << 3;
const MPU_ENABLE: u32 = 1 << 30;

/// RDP value for a region of `2 << size_bits` bytes.
fn rdp(size_bits: u32, perms: u32) -> u32 {
    ((size_bits >> 2) << 9) | (size_bits & 3) | perms
}

fn mpu_with(regions: &[(u32, u32, u32)]) -> Mpu {
    let mut mpu = Mpu::new(true, 16);
    let mut cache = NoTranslationCache;
    for (i, &(base, size_bits, perms)) in regions.iter().enumerate() {
        mpu.write_region_base_reg(i as u8, base | 1, &mut cache).unwrap();
        mpu.write_region_perm_reg(i as u8, rdp(size_bits, perms), &mut cache).unwrap();
    }
    mpu.write_enable_reg(MPU_ENABLE, &mut cache);
    mpu
}

#[test]
fn region_registers_round_trip() {
    let mut mpu = Mpu::new(true, 4);
    let mut cache = RecordingCache::default();
    mpu.write_region_base_reg(2, 0x1234_567f, &mut cache).unwrap();
    mpu.write_region_perm_reg(2, rdp(17, KR | UE), &mut cache).unwrap();

    assert_eq!(mpu.region_base_reg(2).unwrap(), 0x1234_5661);
    assert_eq!(mpu.region_perm_reg(2).unwrap(), rdp(17, KR | UE));
    let region = mpu.region(2).unwrap();
    assert!(region.valid());
    assert_eq!(region.size(), 256 * 1024);
    assert_eq!(region.start(), 0x1234_0000);
    assert_eq!(cache.flushes, vec![FlushScope::All, FlushScope::All]);
}

#[test]
fn region_index_beyond_count_is_instruction_error() {
    let mut mpu = Mpu::new(true, 2);
    let fault = mpu
        .write_region_base_reg(2, 0x1000, &mut NoTranslationCache)
        .unwrap_err();
    assert_eq!(fault.vector, ExceptionVector::InstructionError);
    assert!(mpu.region_perm_reg(15).is_err());
    assert!(mpu.region_perm_reg(1).is_ok());
}

#[test]
fn build_register_reports_geometry() {
    assert_eq!(Mpu::new(true, 8).build(), (8 << 8) | MPU_VERSION);
    assert_eq!(Mpu::new(false, 0).build(), 0);
}

#[test]
fn lower_index_wins_on_overlap() {
    // R0 covers [0, 4K), R1 covers [0, 8K).
    let mut mpu = mpu_with(&[(0, 11, KR), (0, 12, KW)]);
    assert_eq!(mpu.find_region(0x500), MpuRegionId::Region(0));
    assert_eq!(mpu.find_region(0x1500), MpuRegionId::Region(1));
    assert_eq!(mpu.find_region(0x2000), MpuRegionId::Default);

    mpu.write_region_base_reg(0, 0, &mut NoTranslationCache).unwrap();
    assert_eq!(mpu.find_region(0x500), MpuRegionId::Region(1));
}

#[test]
fn kernel_inherits_user_permissions() {
    let mut mpu = mpu_with(&[(0x4000, 11, UW)]);
    assert!(mpu
        .check_access(0x4100, AccessType::Write, Privilege::Kernel)
        .is_ok());
    let fault = mpu
        .check_access(0x4100, AccessType::Read, Privilege::Kernel)
        .unwrap_err();
    assert_eq!(fault.vector, ExceptionVector::ProtectionViolation);
    assert_eq!(fault.cause, 1);
    assert_eq!(fault.param, PROTV_PARAM_MPU);
    assert_eq!(
        fault.origin,
        FaultOrigin::Mpu {
            region: MpuRegionId::Region(0)
        }
    );
}

#[test]
fn user_mode_ignores_kernel_bits() {
    let mut mpu = mpu_with(&[(0x4000, 11, KR | KW | KE | UR)]);
    let (region, perms) = mpu
        .check_access(0x4000, AccessType::Read, Privilege::User)
        .unwrap();
    assert_eq!(region, MpuRegionId::Region(0));
    assert_eq!(perms, PagePerms::READ);
    assert!(mpu
        .check_access(0x4000, AccessType::Execute, Privilege::User)
        .is_err());
}

#[test]
fn default_region_denial_latches_ecr() {
    let mut mpu = mpu_with(&[]);
    mpu.write_enable_reg(MPU_ENABLE | UR, &mut NoTranslationCache);
    assert_eq!(mpu.enable_reg(), MPU_ENABLE | UR);

    mpu.check_access(0x10, AccessType::Write, Privilege::User).unwrap_err();
    assert_eq!(mpu.ecr(), (0x06 << 16) | (2 << 8) | 0xff);
}

#[test]
fn deactivate_keeps_enable_register() {
    let mut mpu = mpu_with(&[]);
    assert!(mpu.is_active());
    mpu.deactivate();
    assert!(!mpu.is_active());
    assert_eq!(mpu.enable_reg() & MPU_ENABLE, MPU_ENABLE);
}

#[test]
fn overlap_free_checks_higher_priority_footprints() {
    // R0: 64 bytes in the second half of page 0; R1: 16K from 0.
    let mpu = mpu_with(&[(0x1000, 5, KR), (0, 13, KR | KW)]);
    assert!(mpu.overlap_free(0x10, MpuRegionId::Region(0)));
    assert!(!mpu.overlap_free(0x10, MpuRegionId::Region(1)));
    assert!(mpu.overlap_free(0x2010, MpuRegionId::Region(1)));
    assert!(!mpu.overlap_free(0x3000, MpuRegionId::Default));
    assert!(mpu.overlap_free(0x8000, MpuRegionId::Default));
}

#[test]
fn tiny_size_encodings_use_minimum_region() {
    let mpu = mpu_with(&[(0x100, 1, KR)]);
    let region = mpu.region(0).unwrap();
    assert_eq!(region.size(), 32);
    assert!(region.contains(0x11f));
    assert!(!region.contains(0x120));
}

#[test]
fn whole_space_region() {
    let mpu = mpu_with(&[(0x1234_0000, 31, UR)]);
    assert_eq!(mpu.find_region(0xffff_fff0), MpuRegionId::Region(0));
    assert_eq!(mpu.region(0).unwrap().size(), 1 << 32);
}

#[test]
fn mpu_reset_invalidates_regions() {
    let mut mpu = mpu_with(&[(0, 12, KR)]);
    mpu.reset();
    assert!(!mpu.is_active());
    assert_eq!(mpu.enable_reg(), 0);
    assert_eq!(mpu.region_count(), 16);
    assert!(!mpu.region(0).unwrap().valid());
    assert_eq!(mpu.find_region(0), MpuRegionId::Default);
}

// Decider and fill

#[test]
fn decide_matches_mode_table() {
    use TranslationMode::*;

    let expected = |mmu: bool, mpu: bool, in_range: bool, user: bool| match (mmu, mpu) {
        (false, false) => Direct,
        (false, true) => Mpu,
        (true, _) if in_range => Mmu,
        (true, true) => Mpu,
        (true, false) if user => Fault,
        (true, false) => Direct,
    };

    for mmu in [false, true] {
        for mpu in [false, true] {
            for (addr, in_range) in [(0x1000, true), (0x8000_1000, false)] {
                for user in [false, true] {
                    let privilege = Privilege::from_user_bit(user);
                    assert_eq!(
                        decide(addr, privilege, mmu, mpu),
                        expected(mmu, mpu, in_range, user),
                        "mmu={mmu} mpu={mpu} in_range={in_range} user={user}"
                    );
                }
            }
        }
    }
}

#[test]
fn fill_direct_grants_everything_at_page_span() {
    let mut mmu = Mmu::new();
    let mut mpu = Mpu::new(false, 0);
    let mapping = fill(
        &mut mmu,
        &mut mpu,
        0x0012_3456,
        AccessType::Write,
        Privilege::User,
    )
    .unwrap();
    assert_eq!(
        mapping,
        Mapping {
            vaddr: 0x0012_2000,
            paddr: 0x0012_2000,
            perms: PagePerms::all(),
            span: MappingSpan::Page,
        }
    );
}

#[test]
fn fill_out_of_range_user_access_with_only_mmu_faults() {
    let mut mmu = enabled_mmu(0);
    let mut mpu = Mpu::new(false, 0);
    let fault = fill(
        &mut mmu,
        &mut mpu,
        0xc000_0000,
        AccessType::Read,
        Privilege::User,
    )
    .unwrap_err();
    assert_eq!(fault.vector, ExceptionVector::ProtectionViolation);
    assert_eq!(fault.origin, FaultOrigin::Decider);
    assert_eq!(fault.param, 0x08);
}

#[test]
fn fill_mpu_uses_byte_span_for_small_or_overlapped_regions() {
    let mut mmu = Mmu::new();
    let mut mpu = mpu_with(&[(0x1000, 5, KR), (0, 13, KR | KW)]);

    let small = fill(&mut mmu, &mut mpu, 0x1004, AccessType::Read, Privilege::Kernel).unwrap();
    assert_eq!(small.span, MappingSpan::Byte);
    assert_eq!(small.vaddr, 0x1004);

    let shadowed = fill(&mut mmu, &mut mpu, 0x0008, AccessType::Read, Privilege::Kernel).unwrap();
    assert_eq!(shadowed.span, MappingSpan::Byte);

    let clear = fill(&mut mmu, &mut mpu, 0x2008, AccessType::Write, Privilege::Kernel).unwrap();
    assert_eq!(clear.span, MappingSpan::Page);
    assert_eq!(clear.vaddr, 0x2000);
    assert_eq!(clear.perms, PagePerms::READ | PagePerms::WRITE);
}

#[test]
fn fill_prefers_mmu_inside_range_when_both_enabled() {
    let mut mmu = enabled_mmu(0);
    tlb_insert(&mut mmu, 0x0000_2000 | PD0_V, 0x0040_0000 | RK | XK);
    let mut mpu = mpu_with(&[]);

    let mapping = fill(
        &mut mmu,
        &mut mpu,
        0x0000_2100,
        AccessType::Execute,
        Privilege::Kernel,
    )
    .unwrap();
    assert_eq!(mapping.paddr, 0x0040_0000);
    assert_eq!(mapping.perms, PagePerms::READ | PagePerms::EXEC);

    // Above the MMU range the (empty) default region applies.
    let fault = fill(
        &mut mmu,
        &mut mpu,
        0x9000_0000,
        AccessType::Read,
        Privilege::Kernel,
    )
    .unwrap_err();
    assert_eq!(
        fault.origin,
        FaultOrigin::Mpu {
            region: MpuRegionId::Default
        }
    );
}
