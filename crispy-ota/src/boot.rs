// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Power-on recovery of the ACTIVE image.
//!
//! Each pass reads the ACTIVE CRC control block and picks one step:
//!
//! | `crc[0]` vs `crc[1]` | `crc[0]` vs recomputed CRC | Step               |
//! |----------------------|----------------------------|--------------------|
//! | equal                | -                          | `Boot`             |
//! | differ, `crc[0] != 0`| equal                      | `RepairShadow`     |
//! | otherwise            |                            | `RelocateDownload` |
//!
//! Repair and relocation both make progress, so a healthy device settles
//! within three passes. The loop is capped at [`BOOT_STEP_LIMIT`].

use heapless::Vec;

use crate::engine::OtaStorage;
use crate::image::{crc_field_bytes, CrcControl};
use crate::storage::{PagedFlash, StorageBackend};
use crate::OtaError;

/// Maximum number of recovery decisions in one power-on.
pub const BOOT_STEP_LIMIT: usize = 4;

/// Outcome of one recovery pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BootStep {
    /// Shadow is consistent: start the application.
    Boot,
    /// Primary CRC is correct but its duplicate was never written.
    RepairShadow,
    /// ACTIVE is invalid or invalidated: copy the download over it.
    RelocateDownload,
}

/// Steps taken by [`OtaStorage::run_boot_recovery`], ending with `Boot`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BootReport {
    steps: Vec<BootStep, BOOT_STEP_LIMIT>,
}

impl BootReport {
    pub fn steps(&self) -> &[BootStep] {
        &self.steps
    }

    pub fn repaired(&self) -> bool {
        self.steps.contains(&BootStep::RepairShadow)
    }

    pub fn relocated(&self) -> bool {
        self.steps.contains(&BootStep::RelocateDownload)
    }
}

impl<F: PagedFlash, N: StorageBackend> OtaStorage<F, N> {
    /// Decide the next recovery step from the current ACTIVE shadow.
    pub fn next_step(&mut self) -> Result<BootStep, OtaError> {
        let control = self.active_crc_control()?;
        if control.is_consistent() {
            return Ok(BootStep::Boot);
        }

        if control.crc[0] != 0 {
            match self.verify_active() {
                Ok(crc) if crc == control.crc[0] => return Ok(BootStep::RepairShadow),
                Ok(_) | Err(OtaError::CapacityExceeded { .. }) => {}
                Err(err) => return Err(err),
            }
        }

        Ok(BootStep::RelocateDownload)
    }

    /// Run recovery until the ACTIVE image is bootable.
    ///
    /// Returns the steps taken; the caller then jumps to the application.
    /// Storage faults and an exhausted step budget are returned as errors
    /// and must halt the device.
    pub fn run_boot_recovery(&mut self) -> Result<BootReport, OtaError> {
        let mut report = BootReport::default();

        for _ in 0..BOOT_STEP_LIMIT {
            let step = self.next_step()?;
            debug!("boot step: {}", step_name(step));
            // Capacity equals the loop bound.
            let _ = report.steps.push(step);

            match step {
                BootStep::Boot => return Ok(report),
                BootStep::RepairShadow => self.repair_shadow()?,
                BootStep::RelocateDownload => self.relocate_download_to_active()?,
            }
        }

        error!("boot recovery did not settle after {} steps", BOOT_STEP_LIMIT);
        Err(OtaError::BootLoopExceeded {
            steps: BOOT_STEP_LIMIT as u8,
        })
    }

    /// Mark the ACTIVE image invalid so the next boot relocates the download.
    ///
    /// Writes `crc = {0, 0xFFFF}` as a single flash word.
    pub fn invalidate_active(&mut self) -> Result<(), OtaError> {
        info!("invalidating active image");
        self.program_active_crc(&crc_field_bytes(CrcControl::INVALIDATED))
    }

    /// Complete the shadow: `crc[1] := crc[0]`, one flash word.
    ///
    /// The word is programmed without an erase, so the stored shadow ends up
    /// as `crc[1] & crc[0]`. A shadow that has a bit clear where `crc[0]` has
    /// it set can never match again; recovery then repairs until the step
    /// limit and fails with `BootLoopExceeded`.
    fn repair_shadow(&mut self) -> Result<(), OtaError> {
        let control = self.active_crc_control()?;
        info!("repairing CRC shadow 0x{:04x}", control.crc[0]);
        self.program_active_crc(&crc_field_bytes([control.crc[0], control.crc[0]]))
    }
}

fn step_name(step: BootStep) -> &'static str {
    match step {
        BootStep::Boot => "boot",
        BootStep::RepairShadow => "repair shadow",
        BootStep::RelocateDownload => "relocate download",
    }
}
