#![forbid(unsafe_code)]

//! Privileged state of an ARCv2 core: STATUS32, the exception dispatcher,
//! the interrupt controller and the auxiliary-register file that exposes
//! them (together with the MMU/MPU from `arc-mmu`) to guest code.
//!
//! [`ArcCpu`] owns everything. Guest memory is reached only through
//! [`CpuBus`], for vector-table reads and interrupt stack frames.

pub mod aux;
pub mod config;
pub mod cpu;
pub mod exceptions;
pub mod interrupts;
pub mod mem;
pub mod state;
pub mod status;


pub use arc_mmu::{AccessType, ExceptionVector, Fault, FaultOrigin, Privilege};
pub use aux::AuxReg;
pub use config::{ConfigError, CpuConfig};
pub use cpu::ArcCpu;
pub use exceptions::CpuExit;
pub use interrupts::{InterruptController, Trigger};
pub use mem::{CpuBus, FlatTestBus};
pub use state::CpuState;
pub use status::Status32;
