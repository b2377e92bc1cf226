// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Command implementations.

use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use crc::{Crc, CRC_32_ISO_HDLC};
use indicatif::{ProgressBar, ProgressStyle};

use crispy_ota::{BootReport, ImageRole, Layout, OtaStorage, PagedFlash, StorageBackend};

use crate::package::{self, PackOptions};
use crate::sim::{device_nor, DeviceFlash};

const CRC32: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

/// Build an OTA file from a raw program binary.
pub fn pack(input: &Path, output: &Path, opts: &PackOptions) -> Result<()> {
    let program = fs::read(input).with_context(|| format!("Failed to read {}", input.display()))?;
    let packed = package::pack(&program, opts)?;

    fs::write(output, &packed.file)
        .with_context(|| format!("Failed to write {}", output.display()))?;

    println!("Program:  {} ({} bytes)", input.display(), program.len());
    println!(
        "Payload:  {} bytes (padded to {}-byte words)",
        packed.program_size, opts.word_size
    );
    println!("CRC16:    0x{:04x} (shadow left erased)", packed.crc);
    println!("OTA file: {} ({} bytes)", output.display(), packed.file.len());

    Ok(())
}

/// Print headers and check the embedded CRC of an OTA file.
pub fn inspect(file: &Path, layout: &Layout) -> Result<()> {
    let data = fs::read(file).with_context(|| format!("Failed to read {}", file.display()))?;
    let info = package::inspect(&data, layout.crc_offset)
        .with_context(|| format!("{} is not a valid OTA file", file.display()))?;
    let header = &info.header;

    println!("OTA file: {} ({} bytes, CRC32: 0x{:08x})", file.display(), data.len(), CRC32.checksum(&data));
    println!("  Header version:   0x{:04x}", header.header_version);
    println!("  Header length:    {}", header.header_length);
    println!("  Manufacturer:     0x{:04x}", header.manufacturer_code);
    println!("  Image type:       0x{:04x}", header.image_type);
    println!("  File version:     0x{:08x}", header.file_version);
    println!("  Stack version:    {}", header.stack_version);
    println!("  Name:             {:?}", info.name());
    println!("  Total size:       {}", header.total_image_size);
    println!("  Sub-element:      tag {} length {}", info.sub_element.tag, info.sub_element.length);
    println!("  Program size:     {}", info.control.program_size);
    println!(
        "  CRC:              0x{:04x} / shadow 0x{:04x}",
        info.control.crc[0], info.control.crc[1]
    );
    println!("  Computed CRC:     0x{:04x}", info.computed_crc);

    if header.total_image_size as usize != data.len() {
        println!(
            "Warning: header declares {} bytes, file has {}",
            header.total_image_size,
            data.len()
        );
    }
    if data.len() as u32 > layout.space_available() {
        println!(
            "Warning: file does not fit the {}-byte download area",
            layout.space_available()
        );
    }

    if info.control.program_size > layout.shared_active_capacity() {
        println!(
            "Warning: program does not fit the {}-byte active area next to an internal download",
            layout.shared_active_capacity()
        );
    }

    if !info.crc_ok() {
        bail!("CRC mismatch!");
    }
    println!();
    println!("CRC OK");

    Ok(())
}

/// Run download, commit and boot recovery against an in-memory device.
pub fn simulate(file: &Path, layout: &Layout, external: bool, chunk: usize) -> Result<()> {
    let data = fs::read(file).with_context(|| format!("Failed to read {}", file.display()))?;
    let word = DeviceFlash::WORD_SIZE as usize;
    if chunk == 0 || chunk % word != 0 || chunk > usize::from(u16::MAX) {
        bail!("chunk size must be a non-zero multiple of {word} up to {}", u16::MAX);
    }

    let flash = DeviceFlash::new(layout.rc_base + layout.dl_max_capacity);
    let report = if external {
        let nor = device_nor(layout.dl_max_capacity);
        let mut storage = OtaStorage::external(flash, nor, *layout);
        let report = run_update(&mut storage, &data, chunk)?;
        if let Some(nor) = storage.external_device() {
            let chip = nor.spi();
            println!(
                "NOR sector erases: {}, page programs: {}",
                chip.sector_erases, chip.page_programs
            );
        }
        report
    } else {
        let mut storage = OtaStorage::internal(flash, *layout);
        let report = run_update(&mut storage, &data, chunk)?;
        println!("Flash page erases: {}", storage.flash().page_erases);
        report
    };

    println!();
    println!("Boot steps: {:?}", report.steps());
    println!("Simulation complete: the device boots the new image.");

    Ok(())
}

/// Stream, commit and reboot one update.
fn run_update<N: StorageBackend>(
    storage: &mut OtaStorage<DeviceFlash, N>,
    data: &[u8],
    chunk: usize,
) -> Result<BootReport> {
    let space = storage.space_available();
    if data.len() as u32 > space {
        bail!("OTA file is {} bytes, download area holds {}", data.len(), space);
    }
    println!("Backend:  {:?}", storage.backend());
    println!("Download: {} bytes in {}-byte chunks", data.len(), chunk);

    let pb = ProgressBar::new(data.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template(
                "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta})",
            )?
            .progress_chars("#>-"),
    );

    for (i, block) in data.chunks(chunk).enumerate() {
        let offset = (i * chunk) as u32;
        if let Err(err) = storage.write(ImageRole::Downloaded, offset, block) {
            pb.abandon();
            bail!("write failed at offset {}: {}", offset, err);
        }
        pb.set_position(u64::from(offset) + block.len() as u64);
    }
    pb.finish_with_message("Download complete");

    storage
        .commit_download()
        .context("Download rejected, active image kept")?;
    println!("Download verified, active image invalidated. Rebooting...");

    let report = storage
        .run_boot_recovery()
        .context("Boot recovery failed")?;
    let crc = storage.verify_active().context("Active image unreadable")?;
    println!("Active CRC: 0x{:04x}", crc);

    Ok(report)
}
