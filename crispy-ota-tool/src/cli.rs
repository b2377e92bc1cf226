// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Command-line interface definitions.

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use crispy_ota::Layout;

use crate::commands;
use crate::package::PackOptions;

/// Command-line arguments.
#[derive(Parser)]
#[command(name = "crispy-ota")]
#[command(about = "Build, inspect and dry-run crispy-ota firmware images")]
pub struct Cli {
    /// Flash layout as JSON (rc_base, dl_offset, dl_max_capacity, crc_offset)
    #[arg(short, long, value_name = "FILE", global = true)]
    pub layout: Option<PathBuf>,

    /// Print engine diagnostics
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands.
#[derive(Subcommand)]
pub enum Commands {
    /// Embed the CRC control block into a program and wrap it in OTA headers
    Pack {
        /// Raw program binary
        #[arg(value_name = "INPUT")]
        input: PathBuf,

        /// Output OTA file
        #[arg(value_name = "OUTPUT")]
        output: PathBuf,

        /// Manufacturer code in hex
        #[arg(short, long, default_value = "0x0000", value_parser = parse_hex_u16)]
        manufacturer: u16,

        /// Image type in hex
        #[arg(short = 't', long, default_value = "0x0000", value_parser = parse_hex_u16)]
        image_type: u16,

        /// File version in hex
        #[arg(short = 'f', long, default_value = "0x00000001", value_parser = parse_hex_u32)]
        file_version: u32,

        /// Zigbee stack version
        #[arg(long, default_value = "2")]
        stack_version: u16,

        /// Header string (at most 32 bytes)
        #[arg(short, long, default_value = "")]
        name: String,

        /// Flash word size the payload is padded to
        #[arg(short, long, default_value = "4")]
        word_size: u32,
    },

    /// Print the headers of an OTA file and check its CRC
    Inspect {
        /// OTA file
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },

    /// Download, commit and boot an OTA file on an in-memory device
    Simulate {
        /// OTA file
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Keep the download on external NOR instead of internal flash
        #[arg(short, long)]
        external: bool,

        /// Bytes per write call
        #[arg(short, long, default_value = "64")]
        chunk: usize,
    },
}

/// Parse a hex string (with or without 0x prefix) into a u32.
fn parse_hex_u32(s: &str) -> Result<u32, String> {
    let s = s
        .strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s);
    u32::from_str_radix(s, 16).map_err(|e| format!("invalid hex value: {e}"))
}

fn parse_hex_u16(s: &str) -> Result<u16, String> {
    let value = parse_hex_u32(s)?;
    u16::try_from(value).map_err(|_| format!("0x{value:x} does not fit in 16 bits"))
}

/// Layout from `--layout`, or the built-in default.
fn load_layout(path: Option<&PathBuf>) -> Result<Layout> {
    let Some(path) = path else {
        return Ok(Layout::DEFAULT);
    };
    let json = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&json).with_context(|| format!("Invalid layout in {}", path.display()))
}

/// Execute the parsed CLI command.
pub fn run(cli: Cli) -> Result<()> {
    let layout = load_layout(cli.layout.as_ref())?;
    log::debug!("layout: {:?}", layout);

    match cli.command {
        Commands::Pack {
            input,
            output,
            manufacturer,
            image_type,
            file_version,
            stack_version,
            name,
            word_size,
        } => {
            let opts = PackOptions {
                manufacturer_code: manufacturer,
                image_type,
                file_version,
                stack_version,
                name,
                word_size,
                crc_offset: layout.crc_offset,
            };
            commands::pack(&input, &output, &opts)
        }
        Commands::Inspect { file } => commands::inspect(&file, &layout),
        Commands::Simulate {
            file,
            external,
            chunk,
        } => commands::simulate(&file, &layout, external, chunk),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_hex() {
        assert_eq!(parse_hex_u32("0x1D000"), Ok(0x1D000));
        assert_eq!(parse_hex_u32("ff"), Ok(0xFF));
        assert!(parse_hex_u32("0xZZ").is_err());
        assert_eq!(parse_hex_u16("0X1234"), Ok(0x1234));
        assert!(parse_hex_u16("0x10000").is_err());
    }

    #[test]
    fn test_layout_json() {
        let layout: Layout = serde_json::from_str(
            r#"{"rc_base":2048,"dl_offset":118784,"dl_max_capacity":237568,"crc_offset":136}"#,
        )
        .unwrap();
        assert_eq!(layout, Layout::DEFAULT);
    }

    #[test]
    fn test_cli_parses_simulate() {
        let cli = Cli::try_parse_from(["crispy-ota", "simulate", "fw.ota", "--external", "-v"])
            .unwrap();
        assert!(cli.verbose);
        assert!(matches!(
            cli.command,
            Commands::Simulate {
                external: true,
                chunk: 64,
                ..
            }
        ));
    }
}
