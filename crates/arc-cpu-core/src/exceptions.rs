//! Exception entry (vectoring through INT_VECTOR_BASE) and the exception
//! flavour of RTIE.

use arc_mmu::{ExceptionVector, Fault, FlushScope, Mmu, Mpu, TranslationCache};
use thiserror::Error;
use tracing::{debug, warn};

use crate::mem::CpuBus;
use crate::state::CpuState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CpuExit {
    /// Non-architectural bus fault (vector table or interrupt stack frame
    /// outside guest memory).
    #[error("physical memory fault at {addr:#010x}")]
    MemoryFault { addr: u32 },
}

/// Address of the vector-table slot for `vector`.
#[inline]
pub fn vector_slot(intvec: u32, vector: u8) -> u32 {
    intvec.wrapping_add((vector as u32) << 2)
}

/// Take `fault`: save the interrupted context into the ER* registers, switch
/// to kernel mode and jump through the vector table.
///
/// A fault raised while STATUS32.AE is already set becomes a machine check,
/// and address translation is switched off for its handler. Every mapping in
/// `cache` is stale at that point, so it is flushed.
pub fn raise<B: CpuBus>(
    bus: &mut B,
    cache: &mut impl TranslationCache,
    state: &mut CpuState,
    mmu: &mut Mmu,
    mpu: &mut Mpu,
    fault: Fault,
) -> Result<(), CpuExit> {
    let fault = if state.status.ae {
        warn!(
            vector = ?fault.vector,
            addr = fault.addr,
            pc = state.pc,
            "double fault, escalating to machine check"
        );
        mmu.disable();
        mpu.deactivate();
        cache.flush(FlushScope::All);
        Fault::new(ExceptionVector::MachineCheck, 0, 0, fault.addr, fault.origin)
    } else {
        fault
    };

    state.stat_er = state.status;
    state.erbta = state.bta;
    state.eret = state.pc;
    state.ecr = fault.ecr();

    if state.stat_er.u {
        state.switch_sp();
    }

    let status = &mut state.status;
    status.enter_kernel();
    status.ie = false;
    status.ae = true;
    status.h = false;
    state.in_delay_slot = false;

    state.efa = if fault.vector.latches_pc() {
        state.pc
    } else {
        fault.addr
    };

    let slot = vector_slot(state.intvec, fault.vector.number());
    state.pc = bus.read_u32(slot)?;

    debug!(
        vector = ?fault.vector,
        ecr = state.ecr,
        efa = state.efa,
        eret = state.eret,
        handler = state.pc,
        "exception entry"
    );
    Ok(())
}

/// RTIE when no interrupt is being returned from: restore PC, STATUS32 and
/// BTA from the ER* registers.
pub fn exception_return(state: &mut CpuState) {
    state.pc = state.eret;
    state.bta = state.erbta;
    state.set_status(state.stat_er);
    if state.status.u {
        state.switch_sp();
    }
    debug!(pc = state.pc, ecr = state.ecr, "exception return");
}
