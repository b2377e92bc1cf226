// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Build-time storage layout.

use serde::{Deserialize, Serialize};

/// Which of the two logical images an operation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ImageRole {
    /// The image that runs on boot.
    Active,
    /// The staged candidate image.
    Downloaded,
}

/// Fixed offsets and limits of the two image areas.
///
/// All values are chosen when the firmware is built; nothing here is derived
/// from storage contents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Layout {
    /// Physical internal-flash address of the ACTIVE image.
    pub rc_base: u32,
    /// Offset of the DOWNLOADED image, relative to `rc_base` on internal
    /// flash or to address 0 on external NOR.
    pub dl_offset: u32,
    /// End of the download area, measured from the same origin as
    /// `dl_offset`. Also bounds `programSize` when the download lives on
    /// an external device.
    pub dl_max_capacity: u32,
    /// Offset of the CRC control block within a program image.
    pub crc_offset: u32,
}

impl Layout {
    /// Reference board: 2 KiB boot area, two 116 KiB image areas, CRC block at 0x88.
    pub const DEFAULT: Self = Self {
        rc_base: 0x0800,
        dl_offset: 0x1D000,
        dl_max_capacity: 0x3A000,
        crc_offset: 0x88,
    };

    /// Bytes available for storing a downloaded OTA file.
    pub const fn space_available(&self) -> u32 {
        self.dl_max_capacity.saturating_sub(self.dl_offset)
    }

    /// Largest program the ACTIVE area holds when the download shares
    /// internal flash with it: the download area starts `dl_offset` past
    /// `rc_base`, so anything longer would overwrite its own source.
    pub const fn shared_active_capacity(&self) -> u32 {
        if self.dl_offset < self.dl_max_capacity {
            self.dl_offset
        } else {
            self.dl_max_capacity
        }
    }
}

impl Default for Layout {
    fn default() -> Self {
        Self::DEFAULT
    }
}
