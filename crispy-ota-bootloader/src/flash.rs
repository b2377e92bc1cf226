// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! On-chip QSPI flash through the RP2040 ROM routines.
//!
//! On RP2040, flash operations (erase/program) require disabling XIP first.
//! The full sequence is:
//!   1. connect_internal_flash()
//!   2. flash_exit_xip()
//!   3. flash_range_erase() or flash_range_program()
//!   4. flash_flush_cache()
//!   5. flash_enter_cmd_xip()
//!
//! All code executing during steps 1-5 must run from RAM, not flash. Data
//! handed to the program routine must live in RAM too.

use core::sync::atomic::{AtomicUsize, Ordering};

use crispy_ota::{OtaError, PagedFlash};

/// XIP base of the flash in the address map.
pub const FLASH_BASE: u32 = 0x1000_0000;
/// Erase granularity.
pub const FLASH_SECTOR_SIZE: u32 = 4096;
/// Program granularity.
pub const FLASH_PAGE_SIZE: u32 = 256;

const SECTOR_ERASE_CMD: u8 = 0x20;

// RP2040 datasheet section 2.8.3
const ROM_FUNC_TABLE_PTR: *const u16 = 0x0000_0014 as *const u16;
const ROM_TABLE_LOOKUP_PTR: *const u16 = 0x0000_0018 as *const u16;

type RomFnVoid = unsafe extern "C" fn();
type RomFnErase = unsafe extern "C" fn(u32, usize, u32, u8);
type RomFnProgram = unsafe extern "C" fn(u32, *const u8, usize);

static ROM_CONNECT_INTERNAL_FLASH: AtomicUsize = AtomicUsize::new(0);
static ROM_FLASH_EXIT_XIP: AtomicUsize = AtomicUsize::new(0);
static ROM_FLASH_RANGE_ERASE: AtomicUsize = AtomicUsize::new(0);
static ROM_FLASH_RANGE_PROGRAM: AtomicUsize = AtomicUsize::new(0);
static ROM_FLASH_FLUSH_CACHE: AtomicUsize = AtomicUsize::new(0);
static ROM_FLASH_ENTER_CMD_XIP: AtomicUsize = AtomicUsize::new(0);

unsafe fn rom_func_lookup(tag: &[u8; 2]) -> usize {
    let fn_table = *ROM_FUNC_TABLE_PTR as *const u16;
    let lookup: unsafe extern "C" fn(*const u16, u32) -> usize =
        core::mem::transmute::<usize, unsafe extern "C" fn(*const u16, u32) -> usize>(
            *ROM_TABLE_LOOKUP_PTR as usize,
        );
    lookup(fn_table, u16::from_le_bytes(*tag) as u32)
}

enum FlashOp<'a> {
    Erase { offset: u32 },
    Program { offset: u32, data: &'a [u8] },
}

/// Run one erase or program with XIP torn down. Lives in RAM.
///
/// # Safety
/// ROM pointers must have been resolved by [`Rp2040Flash::new`], and
/// `data` must not point into flash.
#[link_section = ".data"]
#[inline(never)]
unsafe fn run_with_xip_off(op: FlashOp<'_>) {
    let connect: RomFnVoid = core::mem::transmute(ROM_CONNECT_INTERNAL_FLASH.load(Ordering::Acquire));
    let exit_xip: RomFnVoid = core::mem::transmute(ROM_FLASH_EXIT_XIP.load(Ordering::Acquire));
    let flush: RomFnVoid = core::mem::transmute(ROM_FLASH_FLUSH_CACHE.load(Ordering::Acquire));
    let enter_xip: RomFnVoid = core::mem::transmute(ROM_FLASH_ENTER_CMD_XIP.load(Ordering::Acquire));

    cortex_m::interrupt::disable();
    connect();
    exit_xip();
    match op {
        FlashOp::Erase { offset } => {
            let erase: RomFnErase =
                core::mem::transmute(ROM_FLASH_RANGE_ERASE.load(Ordering::Acquire));
            erase(offset, FLASH_SECTOR_SIZE as usize, FLASH_SECTOR_SIZE, SECTOR_ERASE_CMD);
        }
        FlashOp::Program { offset, data } => {
            let program: RomFnProgram =
                core::mem::transmute(ROM_FLASH_RANGE_PROGRAM.load(Ordering::Acquire));
            program(offset, data.as_ptr(), data.len());
        }
    }
    flush();
    enter_xip();
    cortex_m::interrupt::enable();
}

/// Internal flash as seen by the OTA engine: 4 KiB erase pages, 256-byte
/// program words, addressed from the start of flash.
pub struct Rp2040Flash {
    _resolved: (),
}

impl Rp2040Flash {
    /// Resolve the ROM flash routines. Must run while XIP is active.
    pub fn new() -> Self {
        unsafe {
            ROM_CONNECT_INTERNAL_FLASH.store(rom_func_lookup(b"IF"), Ordering::Release);
            ROM_FLASH_EXIT_XIP.store(rom_func_lookup(b"EX"), Ordering::Release);
            ROM_FLASH_RANGE_ERASE.store(rom_func_lookup(b"RE"), Ordering::Release);
            ROM_FLASH_RANGE_PROGRAM.store(rom_func_lookup(b"RP"), Ordering::Release);
            ROM_FLASH_FLUSH_CACHE.store(rom_func_lookup(b"FC"), Ordering::Release);
            ROM_FLASH_ENTER_CMD_XIP.store(rom_func_lookup(b"CX"), Ordering::Release);
        }
        Self { _resolved: () }
    }
}

impl PagedFlash for Rp2040Flash {
    const PAGE_SIZE: u32 = FLASH_SECTOR_SIZE;
    const WORD_SIZE: u32 = FLASH_PAGE_SIZE;

    fn read(&mut self, page: u32, offset: u32, buf: &mut [u8]) -> Result<(), OtaError> {
        let base = FLASH_BASE + page * FLASH_SECTOR_SIZE + offset;
        for (i, byte) in buf.iter_mut().enumerate() {
            *byte = unsafe { ((base + i as u32) as *const u8).read_volatile() };
        }
        Ok(())
    }

    fn write(&mut self, word: u32, data: &[u8]) -> Result<(), OtaError> {
        let offset = word * FLASH_PAGE_SIZE;
        if data.len() % FLASH_PAGE_SIZE as usize != 0 {
            return Err(OtaError::Misaligned {
                addr: offset + data.len() as u32,
            });
        }
        unsafe { run_with_xip_off(FlashOp::Program { offset, data }) };
        Ok(())
    }

    fn erase(&mut self, page: u32) -> Result<(), OtaError> {
        unsafe {
            run_with_xip_off(FlashOp::Erase {
                offset: page * FLASH_SECTOR_SIZE,
            })
        };
        Ok(())
    }
}
