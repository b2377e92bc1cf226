// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! CRC verification of the DOWNLOADED and ACTIVE images.

use crate::checksum::{update_excluding, Crc16};
use crate::engine::OtaStorage;
use crate::image::{
    ImageHeader, SubElementHeader, IMAGE_HEADER_LEN, SUB_ELEMENT_HDR_LEN,
};
use crate::layout::ImageRole;
use crate::storage::{PagedFlash, StorageBackend};
use crate::OtaError;

/// Bytes pulled from storage per checksum read.
const VERIFY_CHUNK: usize = 64;

impl<F: PagedFlash, N: StorageBackend> OtaStorage<F, N> {
    /// Image and sub-element headers of the DOWNLOADED image.
    pub fn download_headers(&mut self) -> Result<(ImageHeader, SubElementHeader), OtaError> {
        let mut raw = [0u8; IMAGE_HEADER_LEN];
        self.read(ImageRole::Downloaded, 0, &mut raw)?;
        let header = ImageHeader::parse(&raw);

        let mut raw = [0u8; SUB_ELEMENT_HDR_LEN];
        self.read(ImageRole::Downloaded, u32::from(header.header_length), &mut raw)?;
        Ok((header, SubElementHeader::parse(&raw)))
    }

    /// Check the DOWNLOADED image against the CRC stored in its control block.
    ///
    /// Must succeed before the ACTIVE image is invalidated. A failure leaves
    /// both images untouched.
    pub fn verify_downloaded(&mut self) -> Result<(), OtaError> {
        let (header, sub_element) = self.download_headers()?;
        if !header.has_valid_magic() {
            warn!("download: bad magic 0x{:08x}", header.magic);
            return Err(OtaError::IntegrityMismatch);
        }

        let program_start = header.program_start();
        let control =
            self.read_crc_control(ImageRole::Downloaded, program_start + self.layout.crc_offset)?;
        self.check_program_size(control.program_size)?;
        self.check_program_size(sub_element.length)?;

        // Relocation copies whole flash words.
        if sub_element.length % F::WORD_SIZE != 0 {
            warn!(
                "download: payload length {} not a multiple of {}",
                sub_element.length,
                F::WORD_SIZE
            );
            return Err(OtaError::IntegrityMismatch);
        }

        let crc = self.program_checksum(ImageRole::Downloaded, program_start, control.program_size)?;
        if crc != control.crc[0] {
            warn!(
                "download: CRC mismatch (stored 0x{:04x}, computed 0x{:04x})",
                control.crc[0],
                crc
            );
            return Err(OtaError::IntegrityMismatch);
        }

        info!("download verified: {} bytes, CRC 0x{:04x}", control.program_size, crc);
        Ok(())
    }

    /// Recompute the CRC of the ACTIVE image. Boot-time cross-check only.
    pub fn verify_active(&mut self) -> Result<u16, OtaError> {
        let control = self.active_crc_control()?;
        self.check_program_size(control.program_size)?;
        self.program_checksum(ImageRole::Active, 0, control.program_size)
    }

    /// Verify the download, then invalidate the ACTIVE image so the next
    /// boot promotes it. The caller restarts the device afterwards.
    pub fn commit_download(&mut self) -> Result<(), OtaError> {
        self.verify_downloaded()?;
        self.invalidate_active()
    }

    pub(crate) fn check_program_size(&self, size: u32) -> Result<(), OtaError> {
        let capacity = self.active_capacity();
        if size == 0 || size > capacity {
            warn!("program size {} outside 1..={}", size, capacity);
            return Err(OtaError::CapacityExceeded { size, capacity });
        }
        Ok(())
    }

    /// CRC over `[0, size)` of the program at `start`, leaving out the CRC field.
    fn program_checksum(&mut self, role: ImageRole, start: u32, size: u32) -> Result<u16, OtaError> {
        let crc_offset = self.layout.crc_offset;
        let mut digest = Crc16::new();
        let mut chunk = [0u8; VERIFY_CHUNK];
        let mut offset = 0u32;

        while offset < size {
            let n = (size - offset).min(VERIFY_CHUNK as u32) as usize;
            self.read(role, start + offset, &mut chunk[..n])?;
            update_excluding(&mut digest, offset, &chunk[..n], crc_offset);
            offset += n as u32;
        }

        Ok(digest.finish())
    }
}
