// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Building and parsing OTA upgrade files.

use anyhow::{bail, Result};

use crispy_ota::checksum::checksum_excluding;
use crispy_ota::image::{
    crc_field_bytes, CrcControl, CRC_CONTROL_LEN, ERASED_CRC, IMAGE_HEADER_LEN,
    SUB_ELEMENT_HDR_LEN, TAG_UPGRADE_IMAGE,
};
use crispy_ota::{ImageHeader, SubElementHeader, OTA_MAGIC};

/// Zigbee OTA header version written by `pack`.
pub const HEADER_VERSION: u16 = 0x0100;

/// Fields of the image header chosen by the user.
#[derive(Debug, Clone)]
pub struct PackOptions {
    pub manufacturer_code: u16,
    pub image_type: u16,
    pub file_version: u32,
    pub stack_version: u16,
    pub name: String,
    pub word_size: u32,
    pub crc_offset: u32,
}

/// A packed upgrade file and the values embedded in it.
#[derive(Debug)]
pub struct Packed {
    pub file: Vec<u8>,
    pub crc: u16,
    pub program_size: u32,
}

/// Embed the CRC control block into `program` and wrap it in OTA headers.
///
/// The program is padded with `0xFF` to a whole number of flash words. The
/// shadow CRC is left erased; the device completes it on first boot.
pub fn pack(program: &[u8], opts: &PackOptions) -> Result<Packed> {
    let control_end = opts.crc_offset as usize + CRC_CONTROL_LEN;
    if program.len() < control_end {
        bail!(
            "program is {} bytes, too short for a CRC control block at 0x{:x}",
            program.len(),
            opts.crc_offset
        );
    }
    if opts.word_size == 0 {
        bail!("word size must be non-zero");
    }

    let mut program = program.to_vec();
    let padded = program.len().next_multiple_of(opts.word_size as usize);
    program.resize(padded, 0xFF);
    let program_size = program.len() as u32;

    let at = opts.crc_offset as usize;
    program[at + 4..control_end].copy_from_slice(&program_size.to_le_bytes());
    let crc = checksum_excluding(&program, opts.crc_offset);
    program[at..at + 4].copy_from_slice(&crc_field_bytes([crc, ERASED_CRC]));

    let header = ImageHeader {
        magic: OTA_MAGIC,
        header_version: HEADER_VERSION,
        header_length: IMAGE_HEADER_LEN as u16,
        field_control: 0,
        manufacturer_code: opts.manufacturer_code,
        image_type: opts.image_type,
        file_version: opts.file_version,
        stack_version: opts.stack_version,
        header_string: header_string(&opts.name),
        total_image_size: (IMAGE_HEADER_LEN + SUB_ELEMENT_HDR_LEN) as u32 + program_size,
    };
    let sub_element = SubElementHeader {
        tag: TAG_UPGRADE_IMAGE,
        length: program_size,
    };

    let mut file = Vec::with_capacity(header.total_image_size as usize);
    file.extend_from_slice(&header.to_bytes());
    file.extend_from_slice(&sub_element.to_bytes());
    file.extend_from_slice(&program);

    Ok(Packed {
        file,
        crc,
        program_size,
    })
}

/// Header string padded with NULs, truncated to 32 bytes.
fn header_string(name: &str) -> [u8; 32] {
    let mut out = [0u8; 32];
    let n = name.len().min(out.len());
    out[..n].copy_from_slice(&name.as_bytes()[..n]);
    out
}

/// Parsed view of an upgrade file.
#[derive(Debug)]
pub struct Inspection {
    pub header: ImageHeader,
    pub sub_element: SubElementHeader,
    pub control: CrcControl,
    pub computed_crc: u16,
}

impl Inspection {
    pub fn crc_ok(&self) -> bool {
        self.computed_crc == self.control.crc[0]
    }

    pub fn name(&self) -> String {
        let end = self
            .header
            .header_string
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(self.header.header_string.len());
        String::from_utf8_lossy(&self.header.header_string[..end]).into_owned()
    }
}

/// Parse headers and recompute the program CRC of an upgrade file.
pub fn inspect(file: &[u8], crc_offset: u32) -> Result<Inspection> {
    let Some(raw) = file.first_chunk::<IMAGE_HEADER_LEN>() else {
        bail!("file is {} bytes, shorter than the OTA header", file.len());
    };
    let header = ImageHeader::parse(raw);
    if !header.has_valid_magic() {
        bail!("bad magic 0x{:08x} (expected 0x{:08x})", header.magic, OTA_MAGIC);
    }

    let sub_start = usize::from(header.header_length);
    let Some(raw) = file
        .get(sub_start..)
        .and_then(|rest| rest.first_chunk::<SUB_ELEMENT_HDR_LEN>())
    else {
        bail!("file truncated before the sub-element header");
    };
    let sub_element = SubElementHeader::parse(raw);

    let program_start = header.program_start() as usize;
    let Some(program) = file.get(program_start..program_start + sub_element.length as usize) else {
        bail!(
            "sub-element declares {} bytes but only {} follow the headers",
            sub_element.length,
            file.len().saturating_sub(program_start)
        );
    };

    let at = crc_offset as usize;
    let Some(raw) = program
        .get(at..)
        .and_then(|rest| rest.first_chunk::<CRC_CONTROL_LEN>())
    else {
        bail!("program too short for a CRC control block at 0x{:x}", crc_offset);
    };
    let control = CrcControl::parse(raw);

    let Some(covered) = program.get(..control.program_size as usize) else {
        bail!(
            "program_size {} exceeds the {}-byte payload",
            control.program_size,
            program.len()
        );
    };

    Ok(Inspection {
        header,
        sub_element,
        control,
        computed_crc: checksum_excluding(covered, crc_offset),
    })
}
