// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Logical image offset to physical storage address.

use crate::layout::{ImageRole, Layout};

/// Storage device that holds the DOWNLOADED image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Backend {
    /// Internal flash, after the ACTIVE image.
    Internal,
    /// External serial NOR.
    External,
}

/// Physical address on a specific device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Location {
    Internal(u32),
    External(u32),
}

impl Location {
    pub fn address(self) -> u32 {
        match self {
            Self::Internal(addr) | Self::External(addr) => addr,
        }
    }
}

/// Map `(role, offset)` to a physical location.
///
/// Branches only on the configured download backend and the role, never on
/// storage contents. ACTIVE always lives on internal flash.
pub fn translate(layout: &Layout, download: Backend, role: ImageRole, offset: u32) -> Location {
    match (role, download) {
        (ImageRole::Active, _) => Location::Internal(layout.rc_base + offset),
        (ImageRole::Downloaded, Backend::Internal) => {
            Location::Internal(layout.rc_base + layout.dl_offset + offset)
        }
        (ImageRole::Downloaded, Backend::External) => Location::External(layout.dl_offset + offset),
    }
}
