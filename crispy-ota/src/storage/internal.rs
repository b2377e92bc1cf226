// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

use super::StorageBackend;
use crate::OtaError;

/// Largest flash word any supported chip programs in one operation.
pub const MAX_WORD_SIZE: usize = 256;

/// Chip-level access to on-chip program flash.
///
/// Reads are addressed as (page, offset) and may run past the end of the
/// page into the following ones, as with memory-mapped flash. Writes take a
/// word index and a whole number of words. Programming only clears bits, so
/// a word must be erased before it is written with new contents.
pub trait PagedFlash {
    /// Erase page size in bytes.
    const PAGE_SIZE: u32;
    /// Smallest programmable unit in bytes.
    const WORD_SIZE: u32;

    fn read(&mut self, page: u32, offset: u32, buf: &mut [u8]) -> Result<(), OtaError>;
    fn write(&mut self, word: u32, data: &[u8]) -> Result<(), OtaError>;
    fn erase(&mut self, page: u32) -> Result<(), OtaError>;
}

/// Byte-addressed view over a [`PagedFlash`].
pub struct InternalFlash<F> {
    flash: F,
}

impl<F: PagedFlash> InternalFlash<F> {
    pub fn new(flash: F) -> Self {
        debug_assert!(F::WORD_SIZE as usize <= MAX_WORD_SIZE);
        debug_assert!(F::PAGE_SIZE % F::WORD_SIZE == 0);
        Self { flash }
    }

    pub fn inner(&self) -> &F {
        &self.flash
    }

    pub fn inner_mut(&mut self) -> &mut F {
        &mut self.flash
    }

    pub fn into_inner(self) -> F {
        self.flash
    }

    /// Program `bytes` at `addr` inside a single flash word. The rest of the
    /// word is written with the erased value, which leaves those cells as
    /// they are.
    pub fn program_in_word(&mut self, addr: u32, bytes: &[u8]) -> Result<(), OtaError> {
        let word_size = F::WORD_SIZE as usize;
        let lead = (addr % F::WORD_SIZE) as usize;
        if lead + bytes.len() > word_size {
            return Err(OtaError::Misaligned { addr });
        }
        let mut word = [0xFFu8; MAX_WORD_SIZE];
        word[lead..lead + bytes.len()].copy_from_slice(bytes);
        self.flash.write(addr / F::WORD_SIZE, &word[..word_size])
    }
}

impl<F: PagedFlash> StorageBackend for InternalFlash<F> {
    const ERASE_UNIT: u32 = F::PAGE_SIZE;

    fn read(&mut self, addr: u32, buf: &mut [u8]) -> Result<(), OtaError> {
        self.flash.read(addr / F::PAGE_SIZE, addr % F::PAGE_SIZE, buf)
    }

    fn write(&mut self, addr: u32, data: &[u8]) -> Result<(), OtaError> {
        if addr % F::WORD_SIZE != 0 {
            return Err(OtaError::Misaligned { addr });
        }

        let word_size = F::WORD_SIZE as usize;
        let whole = data.len() - data.len() % word_size;
        if whole > 0 {
            self.flash.write(addr / F::WORD_SIZE, &data[..whole])?;
        }

        // Trailing partial word is padded with 0xFF.
        if whole < data.len() {
            self.program_in_word(addr + whole as u32, &data[whole..])?;
        }
        Ok(())
    }

    fn erase_unit(&mut self, index: u32) -> Result<(), OtaError> {
        self.flash.erase(index)
    }

    /// Writing into the first byte of a page erases that page, discarding
    /// anything on it the caller does not rewrite.
    fn prepare_write(&mut self, addr: u32, len: u32) -> Result<(), OtaError> {
        let end = addr.saturating_add(len);
        let mut page_addr = addr.next_multiple_of(F::PAGE_SIZE);
        while page_addr < end {
            trace!("erase page {}", page_addr / F::PAGE_SIZE);
            self.flash.erase(page_addr / F::PAGE_SIZE)?;
            page_addr += F::PAGE_SIZE;
        }
        Ok(())
    }
}
