use crate::exceptions::CpuExit;

/// Guest-physical memory as seen by the core. Used for vector-table reads
/// and interrupt stack frames; these never go through translation.
///
/// Multi-byte accesses are little-endian.
pub trait CpuBus {
    fn read_u8(&mut self, paddr: u32) -> Result<u8, CpuExit>;
    fn write_u8(&mut self, paddr: u32, val: u8) -> Result<(), CpuExit>;

    fn read_u16(&mut self, paddr: u32) -> Result<u16, CpuExit> {
        let lo = self.read_u8(paddr)? as u16;
        let hi = self.read_u8(paddr.wrapping_add(1))? as u16;
        Ok(lo | (hi << 8))
    }

    fn read_u32(&mut self, paddr: u32) -> Result<u32, CpuExit> {
        let lo = self.read_u16(paddr)? as u32;
        let hi = self.read_u16(paddr.wrapping_add(2))? as u32;
        Ok(lo | (hi << 16))
    }

    fn write_u16(&mut self, paddr: u32, val: u16) -> Result<(), CpuExit> {
        self.write_u8(paddr, val as u8)?;
        self.write_u8(paddr.wrapping_add(1), (val >> 8) as u8)
    }

    fn write_u32(&mut self, paddr: u32, val: u32) -> Result<(), CpuExit> {
        self.write_u16(paddr, val as u16)?;
        self.write_u16(paddr.wrapping_add(2), (val >> 16) as u16)
    }

    fn read_bytes(&mut self, paddr: u32, buf: &mut [u8]) -> Result<(), CpuExit> {
        for (i, slot) in buf.iter_mut().enumerate() {
            *slot = self.read_u8(paddr.wrapping_add(i as u32))?;
        }
        Ok(())
    }

    fn write_bytes(&mut self, paddr: u32, buf: &[u8]) -> Result<(), CpuExit> {
        for (i, byte) in buf.iter().enumerate() {
            self.write_u8(paddr.wrapping_add(i as u32), *byte)?;
        }
        Ok(())
    }
}

impl<T: CpuBus + ?Sized> CpuBus for &mut T {
    #[inline]
    fn read_u8(&mut self, paddr: u32) -> Result<u8, CpuExit> {
        <T as CpuBus>::read_u8(&mut **self, paddr)
    }

    #[inline]
    fn write_u8(&mut self, paddr: u32, val: u8) -> Result<(), CpuExit> {
        <T as CpuBus>::write_u8(&mut **self, paddr, val)
    }

    #[inline]
    fn read_u16(&mut self, paddr: u32) -> Result<u16, CpuExit> {
        <T as CpuBus>::read_u16(&mut **self, paddr)
    }

    #[inline]
    fn read_u32(&mut self, paddr: u32) -> Result<u32, CpuExit> {
        <T as CpuBus>::read_u32(&mut **self, paddr)
    }

    #[inline]
    fn write_u16(&mut self, paddr: u32, val: u16) -> Result<(), CpuExit> {
        <T as CpuBus>::write_u16(&mut **self, paddr, val)
    }

    #[inline]
    fn write_u32(&mut self, paddr: u32, val: u32) -> Result<(), CpuExit> {
        <T as CpuBus>::write_u32(&mut **self, paddr, val)
    }
}

/// Flat memory starting at physical address 0, used by tests.
#[derive(Debug, Clone)]
pub struct FlatTestBus {
    mem: Vec<u8>,
}

impl FlatTestBus {
    pub fn new(size: usize) -> Self {
        Self { mem: vec![0; size] }
    }

    pub fn load(&mut self, addr: u32, data: &[u8]) {
        let start = addr as usize;
        let end = start + data.len();
        self.mem[start..end].copy_from_slice(data);
    }

    pub fn slice(&self, addr: u32, len: usize) -> &[u8] {
        let start = addr as usize;
        let end = start + len;
        &self.mem[start..end]
    }
}

impl CpuBus for FlatTestBus {
    fn read_u8(&mut self, paddr: u32) -> Result<u8, CpuExit> {
        self.mem
            .get(paddr as usize)
            .copied()
            .ok_or(CpuExit::MemoryFault { addr: paddr })
    }

    fn write_u8(&mut self, paddr: u32, val: u8) -> Result<(), CpuExit> {
        let slot = self
            .mem
            .get_mut(paddr as usize)
            .ok_or(CpuExit::MemoryFault { addr: paddr })?;
        *slot = val;
        Ok(())
    }
}
