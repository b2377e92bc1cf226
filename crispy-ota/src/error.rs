// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Error type shared by the storage backends, the verifier and the boot path.

use thiserror::Error;

/// Everything that can go wrong while reading, writing or promoting an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum OtaError {
    /// Checksum mismatch or a header that fails sanity checks.
    #[error("image integrity check failed")]
    IntegrityMismatch,
    /// `programSize` is zero or larger than the download area.
    #[error("program size {size} outside 1..={capacity}")]
    CapacityExceeded { size: u32, capacity: u32 },
    /// The NOR status register kept reporting write-in-progress.
    #[error("storage did not become ready")]
    StorageTimeout,
    /// The boot recovery loop did not settle within its step limit.
    #[error("boot recovery exceeded {steps} steps")]
    BootLoopExceeded { steps: u8 },
    /// A word write did not start on a flash word boundary.
    #[error("address 0x{addr:08x} is not word aligned")]
    Misaligned { addr: u32 },
    /// The SPI bus reported a transfer error.
    #[error("storage bus fault")]
    Bus,
}

impl OtaError {
    /// Hardware or storage faults that must halt rather than be retried.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::StorageTimeout | Self::BootLoopExceeded { .. } | Self::Bus
        )
    }
}
