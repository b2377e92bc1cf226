// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! RAM-backed device used by `simulate`.

use std::ops::Range;

use crispy_ota::storage::{NOR_PAGE_SIZE, NOR_SECTOR_SIZE};
use crispy_ota::{OtaError, PagedFlash, SpiNor};
use embedded_hal::delay::DelayNs;
use embedded_hal::spi::{ErrorKind, ErrorType, Operation, SpiDevice};

const CMD_READ_STATUS: u8 = 0x05;
const CMD_WRITE_ENABLE: u8 = 0x06;
const CMD_PAGE_PROGRAM: u8 = 0x02;
const CMD_FAST_READ: u8 = 0x0B;
const CMD_SECTOR_ERASE: u8 = 0x20;
const CMD_CHIP_ERASE: u8 = 0xC7;

/// On-chip flash with the CC2530 geometry: 2 KiB pages, 4-byte words.
pub type DeviceFlash = RamFlash<2048, 4>;

/// Program flash in RAM. Programming clears bits only, as on silicon.
pub struct RamFlash<const PAGE: u32, const WORD: u32> {
    mem: Vec<u8>,
    pub page_erases: u32,
}

impl<const PAGE: u32, const WORD: u32> RamFlash<PAGE, WORD> {
    /// Erased flash of at least `size` bytes, rounded up to whole pages.
    pub fn new(size: u32) -> Self {
        let size = size.next_multiple_of(PAGE) as usize;
        Self {
            mem: vec![0xFF; size],
            page_erases: 0,
        }
    }

    /// An access past the end is a simulator fault, not an image property.
    fn range(&self, start: usize, len: usize) -> Result<Range<usize>, OtaError> {
        let end = start + len;
        if end > self.mem.len() {
            log::error!("flash access 0x{:06x}..0x{:06x} past end of device", start, end);
            return Err(OtaError::Bus);
        }
        Ok(start..end)
    }
}

impl<const PAGE: u32, const WORD: u32> PagedFlash for RamFlash<PAGE, WORD> {
    const PAGE_SIZE: u32 = PAGE;
    const WORD_SIZE: u32 = WORD;

    fn read(&mut self, page: u32, offset: u32, buf: &mut [u8]) -> Result<(), OtaError> {
        let range = self.range((page * PAGE + offset) as usize, buf.len())?;
        buf.copy_from_slice(&self.mem[range]);
        Ok(())
    }

    fn write(&mut self, word: u32, data: &[u8]) -> Result<(), OtaError> {
        let range = self.range((word * WORD) as usize, data.len())?;
        for (cell, byte) in self.mem[range].iter_mut().zip(data) {
            *cell &= byte;
        }
        Ok(())
    }

    fn erase(&mut self, page: u32) -> Result<(), OtaError> {
        let range = self.range((page * PAGE) as usize, PAGE as usize)?;
        self.mem[range].fill(0xFF);
        self.page_erases += 1;
        Ok(())
    }
}

/// Serial NOR chip in RAM, answering the command set `SpiNor` speaks.
///
/// Program and erase complete instantly, so the status register never
/// reports busy. Commands the chip would ignore are bus errors here.
pub struct RamSpiNor {
    mem: Vec<u8>,
    write_enabled: bool,
    pub sector_erases: u32,
    pub page_programs: u32,
}

impl RamSpiNor {
    pub fn new(size: u32) -> Self {
        Self {
            mem: vec![0xFF; size.next_multiple_of(NOR_SECTOR_SIZE) as usize],
            write_enabled: false,
            sector_erases: 0,
            page_programs: 0,
        }
    }

    fn take_write_enable(&mut self) -> Result<(), ErrorKind> {
        if !std::mem::take(&mut self.write_enabled) {
            log::error!("NOR command without write enable");
            return Err(ErrorKind::Other);
        }
        Ok(())
    }

    fn range(&self, addr: u32, len: usize) -> Result<Range<usize>, ErrorKind> {
        let start = addr as usize;
        if start + len > self.mem.len() {
            log::error!("NOR access 0x{:06x}+{} past end of device", addr, len);
            return Err(ErrorKind::Other);
        }
        Ok(start..start + len)
    }
}

fn command_address(command: &[u8]) -> Result<u32, ErrorKind> {
    match command {
        [_, a2, a1, a0, ..] => Ok(u32::from_be_bytes([0, *a2, *a1, *a0])),
        _ => Err(ErrorKind::Other),
    }
}

impl ErrorType for RamSpiNor {
    type Error = ErrorKind;
}

impl SpiDevice for RamSpiNor {
    fn transaction(&mut self, operations: &mut [Operation<'_, u8>]) -> Result<(), ErrorKind> {
        let Some((Operation::Write(command), rest)) = operations.split_first_mut() else {
            return Err(ErrorKind::Other);
        };
        let command: &[u8] = command;

        match command.first().copied() {
            Some(CMD_READ_STATUS) => {
                if let Some(Operation::Read(buf)) = rest.first_mut() {
                    buf.fill(0);
                }
            }
            Some(CMD_WRITE_ENABLE) => self.write_enabled = true,
            Some(CMD_PAGE_PROGRAM) => {
                self.take_write_enable()?;
                let addr = command_address(command)?;
                let Some(Operation::Write(data)) = rest.first() else {
                    return Err(ErrorKind::Other);
                };
                let page = self.range(addr & !(NOR_PAGE_SIZE - 1), NOR_PAGE_SIZE as usize)?;
                // Data past the page end wraps to its start, as on the chip.
                for (i, byte) in data.iter().enumerate() {
                    let at = (addr as usize + i) % NOR_PAGE_SIZE as usize;
                    self.mem[page.start + at] &= byte;
                }
                self.page_programs += 1;
            }
            Some(CMD_FAST_READ) => {
                let addr = command_address(command)?;
                if let Some(Operation::Read(buf)) = rest.first_mut() {
                    let range = self.range(addr, buf.len())?;
                    buf.copy_from_slice(&self.mem[range]);
                }
            }
            Some(CMD_SECTOR_ERASE) => {
                self.take_write_enable()?;
                let addr = command_address(command)? & !(NOR_SECTOR_SIZE - 1);
                let range = self.range(addr, NOR_SECTOR_SIZE as usize)?;
                self.mem[range].fill(0xFF);
                self.sector_erases += 1;
            }
            Some(CMD_CHIP_ERASE) => {
                self.take_write_enable()?;
                self.mem.fill(0xFF);
            }
            other => {
                log::error!("unsupported NOR command {:02x?}", other);
                return Err(ErrorKind::Other);
            }
        }
        Ok(())
    }
}

/// Delay for a device whose operations never take time.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoDelay;

impl DelayNs for NoDelay {
    fn delay_ns(&mut self, _ns: u32) {}
}

/// External NOR as the engine drives it on hardware.
pub type DeviceNor = SpiNor<RamSpiNor, NoDelay>;

/// `size` bytes of erased NOR behind the real driver.
pub fn device_nor(size: u32) -> DeviceNor {
    SpiNor::new(RamSpiNor::new(size), NoDelay)
}
