// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Promotion of the DOWNLOADED payload into the ACTIVE area.

use crate::engine::OtaStorage;
use crate::layout::ImageRole;
use crate::storage::{PagedFlash, StorageBackend, MAX_WORD_SIZE};
use crate::OtaError;

impl<F: PagedFlash, N: StorageBackend> OtaStorage<F, N> {
    /// Copy the DOWNLOADED payload to the ACTIVE base, one flash word at a
    /// time, erasing each destination page as the copy enters it.
    ///
    /// There is no rollback: power loss mid-copy leaves ACTIVE partially
    /// overwritten, and the next boot runs the copy again from the start.
    /// The DOWNLOADED image is only read, so repeating the copy is safe.
    /// A payload longer than [`OtaStorage::active_capacity`] is refused
    /// before anything is erased. `rc_base` must be page aligned.
    pub fn relocate_download_to_active(&mut self) -> Result<(), OtaError> {
        let (header, sub_element) = self.download_headers()?;
        if !header.has_valid_magic() || sub_element.length == 0 {
            error!("relocate: no usable download (length {})", sub_element.length);
            return Err(OtaError::IntegrityMismatch);
        }
        self.check_program_size(sub_element.length)?;

        let program_start = header.program_start();
        let rc_base = self.layout.rc_base;
        let mut word = [0u8; MAX_WORD_SIZE];
        let word = &mut word[..F::WORD_SIZE as usize];

        info!(
            "relocate: {} bytes from download offset {} to 0x{:08x}",
            sub_element.length,
            program_start,
            rc_base
        );

        let mut offset = 0u32;
        while offset < sub_element.length {
            self.read(ImageRole::Downloaded, program_start + offset, word)?;

            let dest = rc_base + offset;
            if dest % F::PAGE_SIZE == 0 {
                self.flash.erase_unit(dest / F::PAGE_SIZE)?;
            }
            self.flash.write(dest, word)?;
            offset += F::WORD_SIZE;
        }

        Ok(())
    }
}
