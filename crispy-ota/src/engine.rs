// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Image-level read/write over the configured storage backends.

use embedded_hal::delay::DelayNs;
use embedded_hal::spi::SpiDevice;

use crate::image::{CrcControl, CRC_CONTROL_LEN};
use crate::layout::{ImageRole, Layout};
use crate::storage::{
    BusArbiter, InternalFlash, NoExternal, PagedFlash, SpiNor, StorageBackend,
};
use crate::translate::{translate, Backend, Location};
use crate::OtaError;

/// Where the DOWNLOADED image is kept. Fixed at construction.
pub enum DownloadStore<N> {
    /// Internal flash, `dl_offset` past the ACTIVE image.
    Internal,
    /// A dedicated external device.
    External(N),
}

impl<N> DownloadStore<N> {
    pub fn backend(&self) -> Backend {
        match self {
            Self::Internal => Backend::Internal,
            Self::External(_) => Backend::External,
        }
    }
}

/// OTA storage engine owning the internal flash and, optionally, an external
/// device for the DOWNLOADED image.
pub struct OtaStorage<F, N = NoExternal> {
    pub(crate) flash: InternalFlash<F>,
    pub(crate) download: DownloadStore<N>,
    pub(crate) layout: Layout,
}

impl<F: PagedFlash> OtaStorage<F, NoExternal> {
    /// Both images on internal flash.
    pub fn internal(flash: F, layout: Layout) -> Self {
        Self {
            flash: InternalFlash::new(flash),
            download: DownloadStore::Internal,
            layout,
        }
    }
}

impl<F: PagedFlash, N: StorageBackend> OtaStorage<F, N> {
    /// ACTIVE on internal flash, DOWNLOADED on `external`.
    pub fn external(flash: F, external: N, layout: Layout) -> Self {
        Self {
            flash: InternalFlash::new(flash),
            download: DownloadStore::External(external),
            layout,
        }
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    pub fn backend(&self) -> Backend {
        self.download.backend()
    }

    pub fn flash(&self) -> &F {
        self.flash.inner()
    }

    pub fn flash_mut(&mut self) -> &mut F {
        self.flash.inner_mut()
    }

    pub fn external_device(&self) -> Option<&N> {
        match &self.download {
            DownloadStore::External(dev) => Some(dev),
            DownloadStore::Internal => None,
        }
    }

    pub fn external_device_mut(&mut self) -> Option<&mut N> {
        match &mut self.download {
            DownloadStore::External(dev) => Some(dev),
            DownloadStore::Internal => None,
        }
    }

    pub fn into_parts(self) -> (F, DownloadStore<N>) {
        (self.flash.into_inner(), self.download)
    }

    /// Physical location of `offset` within the `role` image.
    pub fn locate(&self, role: ImageRole, offset: u32) -> Location {
        translate(&self.layout, self.download.backend(), role, offset)
    }

    /// Read `buf.len()` bytes at `offset` of the `role` image.
    ///
    /// No bounds checking against the image size happens here.
    pub fn read(&mut self, role: ImageRole, offset: u32, buf: &mut [u8]) -> Result<(), OtaError> {
        match (self.locate(role, offset), &mut self.download) {
            (Location::External(addr), DownloadStore::External(dev)) => dev.read(addr, buf),
            (loc, _) => self.flash.read(loc.address(), buf),
        }
    }

    /// Write `data` at `offset` of the `role` image.
    ///
    /// Destructive: an erase unit is erased when the write first reaches it.
    /// Callers must write in ascending order and never revisit a unit. A
    /// length that is not a multiple of the flash word leaves the rest of
    /// the last word padded with `0xFF`.
    pub fn write(&mut self, role: ImageRole, offset: u32, data: &[u8]) -> Result<(), OtaError> {
        let len = data.len() as u32;
        match (self.locate(role, offset), &mut self.download) {
            (Location::External(addr), DownloadStore::External(dev)) => {
                dev.prepare_write(addr, len)?;
                dev.write(addr, data)
            }
            (loc, _) => {
                self.flash.prepare_write(loc.address(), len)?;
                self.flash.write(loc.address(), data)
            }
        }
    }

    /// Bytes available for a downloaded OTA file.
    pub fn space_available(&self) -> u32 {
        self.layout.space_available()
    }

    /// Largest program that can be promoted into the ACTIVE area.
    pub fn active_capacity(&self) -> u32 {
        match self.download {
            DownloadStore::Internal => self.layout.shared_active_capacity(),
            DownloadStore::External(_) => self.layout.dl_max_capacity,
        }
    }

    /// CRC control block at `offset` of the `role` image.
    pub fn read_crc_control(&mut self, role: ImageRole, offset: u32) -> Result<CrcControl, OtaError> {
        let mut raw = [0u8; CRC_CONTROL_LEN];
        self.read(role, offset, &mut raw)?;
        Ok(CrcControl::parse(&raw))
    }

    /// CRC control block of the ACTIVE image.
    pub fn active_crc_control(&mut self) -> Result<CrcControl, OtaError> {
        let crc_offset = self.layout.crc_offset;
        self.read_crc_control(ImageRole::Active, crc_offset)
    }

    /// Program the `crc` field of the ACTIVE control block as one flash word.
    pub(crate) fn program_active_crc(&mut self, field: &[u8; 4]) -> Result<(), OtaError> {
        let addr = self.layout.rc_base + self.layout.crc_offset;
        self.flash.program_in_word(addr, field)
    }
}

impl<F, SPI, D, A> OtaStorage<F, SpiNor<SPI, D, A>>
where
    F: PagedFlash,
    SPI: SpiDevice,
    D: DelayNs,
    A: BusArbiter,
{
    /// Erase the whole external device. Maintenance only.
    pub fn erase_chip(&mut self) -> Result<(), OtaError> {
        match &mut self.download {
            DownloadStore::External(nor) => nor.erase_chip(),
            DownloadStore::Internal => Ok(()),
        }
    }
}
