// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! External serial NOR over an `embedded-hal` SPI device.
//!
//! Every command is preceded by polling the status register until the
//! write-in-progress bit clears, since program and erase run asynchronously
//! inside the chip. Program commands need a write-enable first and may not
//! cross a 256-byte page, so longer writes are split per page.

use embedded_hal::delay::DelayNs;
use embedded_hal::spi::{Operation, SpiDevice};

use super::StorageBackend;
use crate::OtaError;

/// Program page size in bytes.
pub const NOR_PAGE_SIZE: u32 = 256;
/// Sector erase granularity in bytes.
pub const NOR_SECTOR_SIZE: u32 = 0x1000;

const CMD_READ_STATUS: u8 = 0x05;
const CMD_WRITE_ENABLE: u8 = 0x06;
const CMD_PAGE_PROGRAM: u8 = 0x02;
const CMD_FAST_READ: u8 = 0x0B;
const CMD_SECTOR_ERASE: u8 = 0x20;
const CMD_CHIP_ERASE: u8 = 0xC7;

const STATUS_WIP: u8 = 0x01;

const POLL_INTERVAL_US: u32 = 10;
const READY_TIMEOUT_US: u32 = 500_000;
const SECTOR_ERASE_TIMEOUT_US: u32 = 2_000_000;
const CHIP_ERASE_TIMEOUT_US: u32 = 200_000_000;

const SECTOR_ERASE_SETTLE_MS: u32 = 100;
const CHIP_ERASE_SETTLE_MS: u32 = 5000;

/// Exclusive use of a bus shared with other peripherals.
///
/// `acquire` runs before and `release` after every read, write or erase
/// call. A transaction must never be interrupted between the two.
pub trait BusArbiter {
    fn acquire(&mut self);
    fn release(&mut self);
}

/// Arbiter for a bus nobody else uses, e.g. in the bootloader.
#[derive(Debug, Default, Clone, Copy)]
pub struct Exclusive;

impl BusArbiter for Exclusive {
    fn acquire(&mut self) {}
    fn release(&mut self) {}
}

/// Serial NOR flash driver.
pub struct SpiNor<SPI, D, A = Exclusive> {
    spi: SPI,
    delay: D,
    arbiter: A,
    /// Sector most recently erased by `prepare_write`.
    last_erased: Option<u32>,
}

impl<SPI, D> SpiNor<SPI, D, Exclusive>
where
    SPI: SpiDevice,
    D: DelayNs,
{
    pub fn new(spi: SPI, delay: D) -> Self {
        Self::with_arbiter(spi, delay, Exclusive)
    }
}

impl<SPI, D, A> SpiNor<SPI, D, A>
where
    SPI: SpiDevice,
    D: DelayNs,
    A: BusArbiter,
{
    pub fn with_arbiter(spi: SPI, delay: D, arbiter: A) -> Self {
        Self {
            spi,
            delay,
            arbiter,
            last_erased: None,
        }
    }

    pub fn release(self) -> (SPI, D, A) {
        (self.spi, self.delay, self.arbiter)
    }

    pub fn spi(&self) -> &SPI {
        &self.spi
    }

    pub fn arbiter(&self) -> &A {
        &self.arbiter
    }

    pub fn last_erased(&self) -> Option<u32> {
        self.last_erased
    }

    /// Erase the whole device. Maintenance only: blocks for seconds.
    pub fn erase_chip(&mut self) -> Result<(), OtaError> {
        self.with_bus(|nor| {
            nor.write_enable()?;
            nor.spi.write(&[CMD_CHIP_ERASE]).map_err(bus_fault)?;
            nor.wait_ready(CHIP_ERASE_TIMEOUT_US)?;
            nor.delay.delay_ms(CHIP_ERASE_SETTLE_MS);
            Ok(())
        })?;
        self.last_erased = None;
        Ok(())
    }

    /// Erase the 4 KiB sector containing `addr`.
    pub fn erase_sector(&mut self, addr: u32) -> Result<(), OtaError> {
        self.with_bus(|nor| nor.sector_erase(addr & !(NOR_SECTOR_SIZE - 1)))
    }

    fn with_bus<R>(
        &mut self,
        op: impl FnOnce(&mut Self) -> Result<R, OtaError>,
    ) -> Result<R, OtaError> {
        self.arbiter.acquire();
        let result = op(self);
        self.arbiter.release();
        result
    }

    fn read_status(&mut self) -> Result<u8, OtaError> {
        let mut status = [0u8];
        self.spi
            .transaction(&mut [
                Operation::Write(&[CMD_READ_STATUS]),
                Operation::Read(&mut status),
            ])
            .map_err(bus_fault)?;
        Ok(status[0])
    }

    fn wait_ready(&mut self, timeout_us: u32) -> Result<(), OtaError> {
        let mut waited_us = 0u32;
        loop {
            if self.read_status()? & STATUS_WIP == 0 {
                return Ok(());
            }
            if waited_us >= timeout_us {
                error!("NOR still busy after {} us", waited_us);
                return Err(OtaError::StorageTimeout);
            }
            self.delay.delay_us(POLL_INTERVAL_US);
            waited_us += POLL_INTERVAL_US;
        }
    }

    fn write_enable(&mut self) -> Result<(), OtaError> {
        self.wait_ready(READY_TIMEOUT_US)?;
        self.spi.write(&[CMD_WRITE_ENABLE]).map_err(bus_fault)
    }

    fn page_program(&mut self, addr: u32, chunk: &[u8]) -> Result<(), OtaError> {
        self.write_enable()?;
        self.spi
            .transaction(&mut [
                Operation::Write(&address_command(CMD_PAGE_PROGRAM, addr)),
                Operation::Write(chunk),
            ])
            .map_err(bus_fault)
    }

    fn sector_erase(&mut self, sector_addr: u32) -> Result<(), OtaError> {
        debug!("NOR erase sector 0x{:08x}", sector_addr);
        self.write_enable()?;
        self.spi
            .write(&address_command(CMD_SECTOR_ERASE, sector_addr))
            .map_err(bus_fault)?;
        self.wait_ready(SECTOR_ERASE_TIMEOUT_US)?;
        self.delay.delay_ms(SECTOR_ERASE_SETTLE_MS);
        Ok(())
    }
}

impl<SPI, D, A> StorageBackend for SpiNor<SPI, D, A>
where
    SPI: SpiDevice,
    D: DelayNs,
    A: BusArbiter,
{
    const ERASE_UNIT: u32 = NOR_SECTOR_SIZE;

    fn read(&mut self, addr: u32, buf: &mut [u8]) -> Result<(), OtaError> {
        self.with_bus(|nor| {
            nor.wait_ready(READY_TIMEOUT_US)?;
            let [cmd, a2, a1, a0] = address_command(CMD_FAST_READ, addr);
            // Fast read clocks one dummy byte before data.
            nor.spi
                .transaction(&mut [
                    Operation::Write(&[cmd, a2, a1, a0, 0]),
                    Operation::Read(buf),
                ])
                .map_err(bus_fault)
        })
    }

    fn write(&mut self, addr: u32, data: &[u8]) -> Result<(), OtaError> {
        self.with_bus(|nor| {
            let mut addr = addr;
            let mut rest = data;
            while !rest.is_empty() {
                let room = (NOR_PAGE_SIZE - addr % NOR_PAGE_SIZE) as usize;
                let (chunk, tail) = rest.split_at(room.min(rest.len()));
                nor.page_program(addr, chunk)?;
                addr += chunk.len() as u32;
                rest = tail;
            }
            Ok(())
        })
    }

    fn erase_unit(&mut self, index: u32) -> Result<(), OtaError> {
        self.with_bus(|nor| nor.sector_erase(index * NOR_SECTOR_SIZE))
    }

    /// Erases each sector the write touches unless it was the one erased
    /// last, so consecutive chunks inside a sector cost one erase.
    fn prepare_write(&mut self, addr: u32, len: u32) -> Result<(), OtaError> {
        if len == 0 {
            return Ok(());
        }
        let first = addr & !(NOR_SECTOR_SIZE - 1);
        let last = (addr + len - 1) & !(NOR_SECTOR_SIZE - 1);
        let mut sector = first;
        loop {
            if self.last_erased != Some(sector) {
                self.erase_unit(sector / NOR_SECTOR_SIZE)?;
                self.last_erased = Some(sector);
            }
            if sector == last {
                return Ok(());
            }
            sector += NOR_SECTOR_SIZE;
        }
    }
}

fn address_command(cmd: u8, addr: u32) -> [u8; 4] {
    let [_, a2, a1, a0] = addr.to_be_bytes();
    [cmd, a2, a1, a0]
}

fn bus_fault<E: embedded_hal::spi::Error>(_err: E) -> OtaError {
    warn!("NOR bus error");
    OtaError::Bus
}
