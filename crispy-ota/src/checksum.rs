// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! CRC16 over image bytes.
//!
//! This is the bit-serial CCITT register (poly `0x1021`, MSB first, seed 0)
//! without output augmentation: each data bit is shifted *into* the register.
//! Feeding two trailing zero bytes yields the CRC-16/XMODEM value of the data.

/// CCITT generator polynomial.
pub const POLY: u16 = 0x1021;

/// Width of the `crc: [u16; 2]` field that is left out of the checksum.
pub const CRC_FIELD_LEN: u32 = 4;

/// Run one byte through the CRC register.
pub const fn update(mut crc: u16, mut byte: u8) -> u16 {
    let mut bit = 0;
    while bit < 8 {
        let msb = crc & 0x8000 != 0;
        crc <<= 1;
        if byte & 0x80 != 0 {
            crc |= 0x0001;
        }
        if msb {
            crc ^= POLY;
        }
        byte <<= 1;
        bit += 1;
    }
    crc
}

/// Streaming checksum accumulator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Crc16 {
    crc: u16,
}

impl Crc16 {
    pub const fn new() -> Self {
        Self { crc: 0 }
    }

    pub fn update(&mut self, bytes: &[u8]) {
        self.crc = bytes.iter().fold(self.crc, |crc, &b| update(crc, b));
    }

    pub const fn finish(&self) -> u16 {
        self.crc
    }
}

/// Checksum of a whole buffer.
pub fn checksum(bytes: &[u8]) -> u16 {
    let mut digest = Crc16::new();
    digest.update(bytes);
    digest.finish()
}

/// Feed `bytes`, which sit at program offset `base`, into `digest` while
/// skipping the CRC field at `[crc_offset, crc_offset + CRC_FIELD_LEN)`.
pub fn update_excluding(digest: &mut Crc16, base: u32, bytes: &[u8], crc_offset: u32) {
    let end = base + bytes.len() as u32;
    let skip_start = crc_offset.clamp(base, end);
    let skip_end = (crc_offset + CRC_FIELD_LEN).clamp(base, end);

    digest.update(&bytes[..(skip_start - base) as usize]);
    digest.update(&bytes[(skip_end - base) as usize..]);
}

/// Checksum of a program image with its own CRC field left out.
pub fn checksum_excluding(program: &[u8], crc_offset: u32) -> u16 {
    let mut digest = Crc16::new();
    update_excluding(&mut digest, 0, program, crc_offset);
    digest.finish()
}
