// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Physical storage backends.
//!
//! Two interchangeable devices implement [`StorageBackend`]:
//! - [`InternalFlash`]: on-chip program flash, erased by page, written by word.
//! - [`SpiNor`]: external serial NOR, erased by 4 KiB sector, written by
//!   256-byte page program.
//!
//! Addresses passed to a backend are physical; the address translator has
//! already applied the image base offsets.

mod internal;
mod spi_nor;

pub use internal::{InternalFlash, PagedFlash, MAX_WORD_SIZE};
pub use spi_nor::{BusArbiter, Exclusive, SpiNor, NOR_PAGE_SIZE, NOR_SECTOR_SIZE};

use crate::OtaError;

/// Read/write/erase capability shared by both backends.
pub trait StorageBackend {
    /// Erase granularity in bytes.
    const ERASE_UNIT: u32;

    fn read(&mut self, addr: u32, buf: &mut [u8]) -> Result<(), OtaError>;

    /// Program `data` at `addr`. The target bytes must already be erased.
    fn write(&mut self, addr: u32, data: &[u8]) -> Result<(), OtaError>;

    /// Erase unit `index` (page or sector number).
    fn erase_unit(&mut self, index: u32) -> Result<(), OtaError>;

    /// Erase whatever a sequential write of `len` bytes at `addr` needs
    /// erased first.
    fn prepare_write(&mut self, addr: u32, len: u32) -> Result<(), OtaError>;
}

/// Placeholder for builds that keep the DOWNLOADED image on internal flash.
#[derive(Debug)]
pub enum NoExternal {}

impl StorageBackend for NoExternal {
    const ERASE_UNIT: u32 = 1;

    fn read(&mut self, _addr: u32, _buf: &mut [u8]) -> Result<(), OtaError> {
        match *self {}
    }

    fn write(&mut self, _addr: u32, _data: &[u8]) -> Result<(), OtaError> {
        match *self {}
    }

    fn erase_unit(&mut self, _index: u32) -> Result<(), OtaError> {
        match *self {}
    }

    fn prepare_write(&mut self, _addr: u32, _len: u32) -> Result<(), OtaError> {
        match *self {}
    }
}
