// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! On-storage image layout.
//!
//! An OTA file is laid out as:
//!
//! ```text
//! +----------------------+ 0
//! | ImageHeader (56 B)   |
//! +----------------------+ header_length
//! | SubElementHeader (6) |
//! +----------------------+ program_start = header_length + 6
//! | program payload      |
//! |   ... CrcControl at program_start + crc_offset
//! +----------------------+
//! ```
//!
//! All multi-byte fields are little-endian. Only the payload is copied into
//! the ACTIVE area, so the same `crc_offset` locates the control block in
//! both images.

/// Zigbee OTA upgrade file identifier.
pub const OTA_MAGIC: u32 = 0x0BEE_F11E;
/// Size of [`ImageHeader`] on storage.
pub const IMAGE_HEADER_LEN: usize = 56;
/// Size of [`SubElementHeader`] on storage.
pub const SUB_ELEMENT_HDR_LEN: usize = 6;
/// Size of [`CrcControl`] on storage.
pub const CRC_CONTROL_LEN: usize = 8;
/// Sub-element tag for an upgrade image payload.
pub const TAG_UPGRADE_IMAGE: u16 = 0x0000;
/// Value of an erased 16-bit flash cell.
pub const ERASED_CRC: u16 = 0xFFFF;

fn le_u16(bytes: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([bytes[at], bytes[at + 1]])
}

fn le_u32(bytes: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
}

/// Fixed prefix of an OTA file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ImageHeader {
    pub magic: u32,
    pub header_version: u16,
    /// Offset of the sub-element header from the start of the file.
    pub header_length: u16,
    pub field_control: u16,
    pub manufacturer_code: u16,
    pub image_type: u16,
    pub file_version: u32,
    pub stack_version: u16,
    pub header_string: [u8; 32],
    pub total_image_size: u32,
}

impl ImageHeader {
    pub fn parse(bytes: &[u8; IMAGE_HEADER_LEN]) -> Self {
        let mut header_string = [0u8; 32];
        header_string.copy_from_slice(&bytes[20..52]);
        Self {
            magic: le_u32(bytes, 0),
            header_version: le_u16(bytes, 4),
            header_length: le_u16(bytes, 6),
            field_control: le_u16(bytes, 8),
            manufacturer_code: le_u16(bytes, 10),
            image_type: le_u16(bytes, 12),
            file_version: le_u32(bytes, 14),
            stack_version: le_u16(bytes, 18),
            header_string,
            total_image_size: le_u32(bytes, 52),
        }
    }

    pub fn to_bytes(&self) -> [u8; IMAGE_HEADER_LEN] {
        let mut out = [0u8; IMAGE_HEADER_LEN];
        out[0..4].copy_from_slice(&self.magic.to_le_bytes());
        out[4..6].copy_from_slice(&self.header_version.to_le_bytes());
        out[6..8].copy_from_slice(&self.header_length.to_le_bytes());
        out[8..10].copy_from_slice(&self.field_control.to_le_bytes());
        out[10..12].copy_from_slice(&self.manufacturer_code.to_le_bytes());
        out[12..14].copy_from_slice(&self.image_type.to_le_bytes());
        out[14..18].copy_from_slice(&self.file_version.to_le_bytes());
        out[18..20].copy_from_slice(&self.stack_version.to_le_bytes());
        out[20..52].copy_from_slice(&self.header_string);
        out[52..56].copy_from_slice(&self.total_image_size.to_le_bytes());
        out
    }

    pub fn has_valid_magic(&self) -> bool {
        self.magic == OTA_MAGIC
    }

    /// Offset of the program payload from the start of the file.
    pub fn program_start(&self) -> u32 {
        u32::from(self.header_length) + SUB_ELEMENT_HDR_LEN as u32
    }
}

/// Tag/length pair in front of the program payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SubElementHeader {
    pub tag: u16,
    /// Payload length in bytes.
    pub length: u32,
}

impl SubElementHeader {
    pub fn parse(bytes: &[u8; SUB_ELEMENT_HDR_LEN]) -> Self {
        Self {
            tag: le_u16(bytes, 0),
            length: le_u32(bytes, 2),
        }
    }

    pub fn to_bytes(&self) -> [u8; SUB_ELEMENT_HDR_LEN] {
        let mut out = [0u8; SUB_ELEMENT_HDR_LEN];
        out[0..2].copy_from_slice(&self.tag.to_le_bytes());
        out[2..6].copy_from_slice(&self.length.to_le_bytes());
        out
    }
}

/// Duplicated CRC record embedded in every program image.
///
/// `crc[0] == crc[1]` marks a known-good ACTIVE image. Each half is written
/// by its own flash operation, so a mismatch after power loss is detectable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CrcControl {
    pub crc: [u16; 2],
    pub program_size: u32,
}

impl CrcControl {
    /// Marker written by `invalidate_active` to force a reload on next boot.
    pub const INVALIDATED: [u16; 2] = [0, ERASED_CRC];

    pub fn parse(bytes: &[u8; CRC_CONTROL_LEN]) -> Self {
        Self {
            crc: [le_u16(bytes, 0), le_u16(bytes, 2)],
            program_size: le_u32(bytes, 4),
        }
    }

    pub fn to_bytes(&self) -> [u8; CRC_CONTROL_LEN] {
        let mut out = [0u8; CRC_CONTROL_LEN];
        out[0..4].copy_from_slice(&crc_field_bytes(self.crc));
        out[4..8].copy_from_slice(&self.program_size.to_le_bytes());
        out
    }

    /// Both shadow halves agree.
    pub fn is_consistent(&self) -> bool {
        self.crc[0] == self.crc[1]
    }
}

/// Storage encoding of the `crc: [u16; 2]` field alone.
pub fn crc_field_bytes(crc: [u16; 2]) -> [u8; 4] {
    let [a, b] = crc[0].to_le_bytes();
    let [c, d] = crc[1].to_le_bytes();
    [a, b, c, d]
}
