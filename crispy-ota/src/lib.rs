// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! OTA image storage engine.
//!
//! Manages an ACTIVE (running) and a DOWNLOADED (staged) firmware image on
//! internal program flash and/or external SPI NOR, verifies them with a
//! CRC16, and promotes a verified download into the boot location.
//!
//! This crate supports both `no_std` (embedded) and `std` (host) environments:
//! - Default: `no_std` mode for embedded targets
//! - `std` feature: Enables `std` support for host tools
//! - `defmt` / `log` features: Route diagnostics to the matching logger
//!
//! Typical application flow: stream the file in with
//! [`OtaStorage::write`], call [`OtaStorage::commit_download`], reset.
//! The bootloader then calls [`OtaStorage::run_boot_recovery`] before
//! jumping to the application.

#![cfg_attr(not(feature = "std"), no_std)]

#[macro_use]
mod fmt;

pub mod boot;
pub mod checksum;
pub mod engine;
pub mod error;
pub mod image;
pub mod layout;
mod relocate;
pub mod storage;
pub mod translate;
mod verify;

// Re-export commonly used types
pub use boot::{BootReport, BootStep, BOOT_STEP_LIMIT};
pub use engine::{DownloadStore, OtaStorage};
pub use error::OtaError;
pub use image::{CrcControl, ImageHeader, SubElementHeader, OTA_MAGIC};
pub use layout::{ImageRole, Layout};
pub use storage::{InternalFlash, NoExternal, PagedFlash, SpiNor, StorageBackend};
pub use translate::{Backend, Location};
