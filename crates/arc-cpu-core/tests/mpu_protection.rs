use arc_cpu_core::aux::addr;
use arc_cpu_core::{
    AccessType, ArcCpu, CpuBus, CpuConfig, ExceptionVector, FaultOrigin, FlatTestBus,
};
use arc_mmu::{
    FlushScope, MappingSpan, MpuRegionId, NoTranslationCache, PagePerms, TranslationCache,
};

const VECTORS: u32 = 0x400;

const KR: u32 = 1 << 8;
const KW: u32 = 1 << 7;
const KE: u32 = 1 << 6;
const UR: u32 = 1 << 5;
const MPU_EN: u32 = 1 << 30;

#[derive(Default)]
struct RecordingCache {
    flushes: Vec<FlushScope>,
}

impl TranslationCache for RecordingCache {
    fn flush(&mut self, scope: FlushScope) {
        self.flushes.push(scope);
    }
}

/// 4K region: size bits 11, split over RDP bits 1:0 and 11:9.
const SIZE_4K: u32 = 0x3 | 0x2 << 9;

fn mpu_core() -> (ArcCpu, FlatTestBus) {
    let config = CpuConfig {
        has_mmu: false,
        has_mpu: true,
        mpu_regions: 4,
        ..CpuConfig::default()
    };
    let mut cpu = ArcCpu::new(config).unwrap();
    let mut bus = FlatTestBus::new(0x1000);
    for vector in 0..16 {
        bus.write_u32(VECTORS + vector * 4, 0x8000 + vector * 0x10).unwrap();
    }
    let cache = &mut NoTranslationCache;
    cpu.aux_write(addr::INT_VECTOR_BASE, VECTORS, cache).unwrap();
    cpu.aux_write(addr::MPU_RDB0, 0x1000 | 1, cache).unwrap();
    cpu.aux_write(addr::MPU_RDP0, SIZE_4K | UR, cache).unwrap();
    cpu.aux_write(addr::MPU_EN, MPU_EN | KR | KW | KE, cache).unwrap();
    (cpu, bus)
}

#[test]
fn build_and_region_registers_read_back() {
    let (cpu, _bus) = mpu_core();
    assert_eq!(cpu.aux_read(addr::MPU_BUILD), Ok(0x403));
    assert_eq!(cpu.aux_read(addr::MPU_RDB0), Ok(0x1001));
    assert_eq!(cpu.aux_read(addr::MPU_RDP0), Ok(SIZE_4K | UR));
    assert_eq!(cpu.aux_read(addr::MPU_EN), Ok(MPU_EN | KR | KW | KE));
    assert_eq!(cpu.aux_read(addr::MMU_BUILD), Ok(0));

    // Region 4 does not exist on a four-region core.
    let err = cpu.aux_read(addr::MPU_RDB0 + 8).unwrap_err();
    assert_eq!(err.vector, ExceptionVector::InstructionError);
    // Neither do the TLB registers.
    let err = cpu.aux_read(addr::TLBPD0).unwrap_err();
    assert_eq!(err.vector, ExceptionVector::InstructionError);
}

#[test]
fn user_write_to_read_only_region_faults() {
    let (mut cpu, mut bus) = mpu_core();
    cpu.state.status.u = true;
    cpu.state.pc = 0x200;

    let read = cpu.translate(0x1500, AccessType::Read).unwrap();
    assert_eq!(read.perms, PagePerms::READ);
    // A 4K region is smaller than a page.
    assert_eq!(read.span, MappingSpan::Byte);
    assert_eq!(read.paddr, 0x1500);

    let fault = cpu.translate(0x1500, AccessType::Write).unwrap_err();
    assert_eq!(fault.vector, ExceptionVector::ProtectionViolation);
    assert_eq!(fault.cause, 2);
    assert_eq!(fault.param, 0x04);
    assert_eq!(
        fault.origin,
        FaultOrigin::Mpu {
            region: MpuRegionId::Region(0)
        }
    );

    cpu.raise(&mut bus, fault, &mut NoTranslationCache).unwrap();
    assert_eq!(cpu.state.ecr, 0x0006_0204);
    assert_eq!(cpu.state.efa, 0x1500);
    assert_eq!(cpu.state.pc, 0x8060);
    assert_eq!(cpu.aux_read(addr::MPU_ECR), Ok(0x0006_0200));
}

#[test]
fn default_region_applies_outside_regions() {
    let (mut cpu, _bus) = mpu_core();
    let kernel = cpu.translate(0x4_0000, AccessType::Write).unwrap();
    assert_eq!(kernel.perms, PagePerms::all());
    assert_eq!(kernel.span, MappingSpan::Page);

    cpu.state.status.u = true;
    let fault = cpu.translate(0x4_0000, AccessType::Execute).unwrap_err();
    assert_eq!(fault.cause, 0);
    let err = cpu.aux_read(addr::MPU_ECR).unwrap_err();
    assert_eq!(err.vector, ExceptionVector::PrivilegeViolation);
    cpu.state.status.u = false;
    assert_eq!(cpu.aux_read(addr::MPU_ECR), Ok(0x0006_00ff));
}

#[test]
fn double_fault_turns_protection_off() {
    let (mut cpu, mut bus) = mpu_core();
    cpu.state.status.u = true;
    let fault = cpu.translate(0x1500, AccessType::Write).unwrap_err();
    cpu.raise(&mut bus, fault, &mut NoTranslationCache).unwrap();

    // Still in the handler (AE set) when the second fault arrives.
    cpu.state.status.u = true;
    let mut cache = RecordingCache::default();
    let taken = cpu.translate_or_raise(&mut bus, 0x1600, AccessType::Write, &mut cache);
    assert_eq!(taken, Ok(None));
    assert_eq!(cache.flushes, vec![FlushScope::All]);
    assert_eq!(cpu.state.ecr >> 16, ExceptionVector::MachineCheck as u32);
    assert_eq!(cpu.state.pc, 0x8030);

    assert!(!cpu.mpu.is_active());
    cpu.state.status.u = true;
    assert!(cpu.translate(0x1600, AccessType::Write).is_ok());
    cpu.state.status.u = false;
    assert_eq!(cpu.aux_read(addr::MPU_EN), Ok(MPU_EN | KR | KW | KE));
}
