// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Simulated storage devices and image builders shared by the tests.
#![allow(dead_code)]

use core::convert::Infallible;

use crispy_ota::checksum::checksum_excluding;
use crispy_ota::image::{
    crc_field_bytes, ImageHeader, SubElementHeader, ERASED_CRC, IMAGE_HEADER_LEN,
    TAG_UPGRADE_IMAGE,
};
use crispy_ota::storage::BusArbiter;
use crispy_ota::{ImageRole, Layout, OtaStorage, PagedFlash, SpiNor, StorageBackend, OTA_MAGIC};
use embedded_hal::delay::DelayNs;
use embedded_hal::spi::{ErrorType, Operation, SpiDevice};

pub const FLASH_SIZE: usize = 0x1_0000;
pub const NOR_SIZE: usize = 0x1_0000;
pub const CRC_OFFSET: u32 = 0x88;

pub const LAYOUT: Layout = Layout {
    rc_base: 0x0800,
    dl_offset: 0x4000,
    dl_max_capacity: 0x8000,
    crc_offset: CRC_OFFSET,
};

/// Internal flash with 512-byte pages and 4-byte words.
pub type TestFlash = SimFlash<512, 4>;

/// RAM model of on-chip flash. Programming only clears bits.
pub struct SimFlash<const PAGE: u32, const WORD: u32> {
    pub mem: Vec<u8>,
    pub erased_pages: Vec<u32>,
}

impl<const PAGE: u32, const WORD: u32> SimFlash<PAGE, WORD> {
    pub fn new(size: usize) -> Self {
        Self {
            mem: vec![0xFF; size],
            erased_pages: Vec::new(),
        }
    }

    pub fn bytes(&self, addr: u32, len: usize) -> &[u8] {
        &self.mem[addr as usize..addr as usize + len]
    }
}

impl<const PAGE: u32, const WORD: u32> PagedFlash for SimFlash<PAGE, WORD> {
    const PAGE_SIZE: u32 = PAGE;
    const WORD_SIZE: u32 = WORD;

    fn read(&mut self, page: u32, offset: u32, buf: &mut [u8]) -> Result<(), crispy_ota::OtaError> {
        let start = (page * PAGE + offset) as usize;
        buf.copy_from_slice(&self.mem[start..start + buf.len()]);
        Ok(())
    }

    fn write(&mut self, word: u32, data: &[u8]) -> Result<(), crispy_ota::OtaError> {
        assert_eq!(data.len() % WORD as usize, 0, "partial word programmed");
        let start = (word * WORD) as usize;
        for (cell, byte) in self.mem[start..start + data.len()].iter_mut().zip(data) {
            *cell &= byte;
        }
        Ok(())
    }

    fn erase(&mut self, page: u32) -> Result<(), crispy_ota::OtaError> {
        let start = (page * PAGE) as usize;
        self.mem[start..start + PAGE as usize].fill(0xFF);
        self.erased_pages.push(page);
        Ok(())
    }
}

/// Bus-level operations seen by the simulated NOR chip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NorOp {
    ReadStatus,
    WriteEnable,
    PageProgram { addr: u32, len: usize },
    Read { addr: u32, len: usize },
    SectorErase(u32),
    ChipErase,
}

/// Serial NOR chip decoding commands from SPI transactions.
pub struct SimNor {
    pub mem: Vec<u8>,
    pub log: Vec<NorOp>,
    /// Status polls that report busy after each program or erase.
    pub busy_after_op: u32,
    /// Never clear the WIP bit.
    pub stuck_busy: bool,
    write_enabled: bool,
    busy: u32,
}

impl SimNor {
    pub fn new(size: usize) -> Self {
        Self {
            mem: vec![0xFF; size],
            log: Vec::new(),
            busy_after_op: 0,
            stuck_busy: false,
            write_enabled: false,
            busy: 0,
        }
    }

    pub fn programs(&self) -> Vec<(u32, usize)> {
        self.log
            .iter()
            .filter_map(|op| match op {
                NorOp::PageProgram { addr, len } => Some((*addr, *len)),
                _ => None,
            })
            .collect()
    }

    pub fn sector_erases(&self) -> Vec<u32> {
        self.log
            .iter()
            .filter_map(|op| match op {
                NorOp::SectorErase(addr) => Some(*addr),
                _ => None,
            })
            .collect()
    }

    fn start_operation(&mut self) {
        self.write_enabled = false;
        self.busy = self.busy_after_op;
    }
}

fn command_address(command: &[u8]) -> u32 {
    u32::from_be_bytes([0, command[1], command[2], command[3]])
}

impl ErrorType for SimNor {
    type Error = Infallible;
}

impl SpiDevice for SimNor {
    fn transaction(&mut self, operations: &mut [Operation<'_, u8>]) -> Result<(), Infallible> {
        let (head, rest) = operations.split_first_mut().expect("empty transaction");
        let command = match head {
            Operation::Write(bytes) => bytes.to_vec(),
            _ => panic!("transaction must start with a command"),
        };

        match command[0] {
            0x05 => {
                let busy = self.stuck_busy || self.busy > 0;
                self.busy = self.busy.saturating_sub(1);
                self.log.push(NorOp::ReadStatus);
                if let Some(Operation::Read(buf)) = rest.first_mut() {
                    buf[0] = u8::from(busy);
                }
            }
            0x06 => {
                self.write_enabled = true;
                self.log.push(NorOp::WriteEnable);
            }
            0x02 => {
                assert!(self.write_enabled, "page program without write enable");
                let addr = command_address(&command);
                let data = match rest.first() {
                    Some(Operation::Write(data)) => data.to_vec(),
                    _ => Vec::new(),
                };
                // The chip wraps within the 256-byte page.
                for (i, byte) in data.iter().enumerate() {
                    let target = (addr & !0xFF) | (addr.wrapping_add(i as u32) & 0xFF);
                    self.mem[target as usize] &= byte;
                }
                self.log.push(NorOp::PageProgram {
                    addr,
                    len: data.len(),
                });
                self.start_operation();
            }
            0x0B => {
                assert_eq!(command.len(), 5, "fast read needs a dummy byte");
                let addr = command_address(&command) as usize;
                if let Some(Operation::Read(buf)) = rest.first_mut() {
                    let len = buf.len();
                    buf.copy_from_slice(&self.mem[addr..addr + len]);
                    self.log.push(NorOp::Read {
                        addr: addr as u32,
                        len,
                    });
                }
            }
            0x20 => {
                assert!(self.write_enabled, "sector erase without write enable");
                let addr = command_address(&command) & !0xFFF;
                self.mem[addr as usize..addr as usize + 0x1000].fill(0xFF);
                self.log.push(NorOp::SectorErase(addr));
                self.start_operation();
            }
            0xC7 => {
                assert!(self.write_enabled, "chip erase without write enable");
                self.mem.fill(0xFF);
                self.log.push(NorOp::ChipErase);
                self.start_operation();
            }
            other => panic!("unexpected NOR command 0x{other:02x}"),
        }
        Ok(())
    }
}

/// Delay that returns immediately but remembers how long it was asked to wait.
#[derive(Debug, Default)]
pub struct NoDelay {
    pub total_ns: u64,
}

impl DelayNs for NoDelay {
    fn delay_ns(&mut self, ns: u32) {
        self.total_ns += u64::from(ns);
    }
}

/// Arbiter that checks acquire/release pairing.
#[derive(Debug, Default)]
pub struct CountingArbiter {
    pub held: bool,
    pub acquisitions: u32,
    pub nested: bool,
}

impl BusArbiter for CountingArbiter {
    fn acquire(&mut self) {
        self.nested |= self.held;
        self.held = true;
        self.acquisitions += 1;
    }

    fn release(&mut self) {
        assert!(self.held, "release without acquire");
        self.held = false;
    }
}

pub type TestNor = SpiNor<SimNor, NoDelay>;

pub fn internal_storage() -> OtaStorage<TestFlash> {
    OtaStorage::internal(TestFlash::new(FLASH_SIZE), LAYOUT)
}

pub fn external_storage() -> OtaStorage<TestFlash, TestNor> {
    let nor = SpiNor::new(SimNor::new(NOR_SIZE), NoDelay::default());
    OtaStorage::external(TestFlash::new(FLASH_SIZE), nor, LAYOUT)
}

/// Deterministic pseudo-random bytes.
pub fn pattern(len: usize, seed: u32) -> Vec<u8> {
    let mut state = seed.wrapping_mul(2_654_435_761).wrapping_add(1);
    (0..len)
        .map(|_| {
            state = state.wrapping_mul(1_103_515_245).wrapping_add(12_345);
            (state >> 16) as u8
        })
        .collect()
}

/// Program payload with a CRC control block: `crc = {crc, shadow}`.
pub fn program_with_shadow(len: usize, seed: u32, shadow: Option<u16>) -> Vec<u8> {
    let mut program = pattern(len, seed);
    let at = CRC_OFFSET as usize;
    program[at + 4..at + 8].copy_from_slice(&(len as u32).to_le_bytes());
    let crc = checksum_excluding(&program, CRC_OFFSET);
    let field = crc_field_bytes([crc, shadow.unwrap_or(crc)]);
    program[at..at + 4].copy_from_slice(&field);
    program
}

/// Program as produced by the packaging tool: shadow left erased.
pub fn program(len: usize, seed: u32) -> Vec<u8> {
    program_with_shadow(len, seed, Some(ERASED_CRC))
}

pub fn stored_crc(program: &[u8]) -> u16 {
    let at = CRC_OFFSET as usize;
    u16::from_le_bytes([program[at], program[at + 1]])
}

/// Wrap a program into an OTA file.
pub fn ota_file(program: &[u8]) -> Vec<u8> {
    let header = ImageHeader {
        magic: OTA_MAGIC,
        header_version: 0x0100,
        header_length: IMAGE_HEADER_LEN as u16,
        field_control: 0,
        manufacturer_code: 0x5678,
        image_type: 0x1234,
        file_version: 2,
        stack_version: 2,
        header_string: [b' '; 32],
        total_image_size: (IMAGE_HEADER_LEN + 6 + program.len()) as u32,
    };
    let sub_element = SubElementHeader {
        tag: TAG_UPGRADE_IMAGE,
        length: program.len() as u32,
    };

    let mut file = header.to_bytes().to_vec();
    file.extend_from_slice(&sub_element.to_bytes());
    file.extend_from_slice(program);
    file
}

/// Stream a file into the DOWNLOADED image in ascending chunks.
pub fn download<F, N>(storage: &mut OtaStorage<F, N>, file: &[u8], chunk: usize)
where
    F: PagedFlash,
    N: StorageBackend,
{
    for (i, block) in file.chunks(chunk).enumerate() {
        storage
            .write(ImageRole::Downloaded, (i * chunk) as u32, block)
            .expect("download write");
    }
}

/// Put a program into the ACTIVE area.
pub fn install_active<F, N>(storage: &mut OtaStorage<F, N>, program: &[u8])
where
    F: PagedFlash,
    N: StorageBackend,
{
    storage
        .write(ImageRole::Active, 0, program)
        .expect("active write");
}

pub fn read_back<F, N>(storage: &mut OtaStorage<F, N>, role: ImageRole, offset: u32, len: usize) -> Vec<u8>
where
    F: PagedFlash,
    N: StorageBackend,
{
    let mut buf = vec![0u8; len];
    storage.read(role, offset, &mut buf).expect("read");
    buf
}
