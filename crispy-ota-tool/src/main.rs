// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Host tool for crispy-ota firmware images.

mod cli;
mod commands;
mod package;
mod sim;

use anyhow::Result;
use clap::Parser;
use simple_logger::SimpleLogger;

fn main() -> Result<()> {
    let cli = cli::Cli::parse();

    let level = if cli.verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Warn
    };
    let _ = SimpleLogger::new().with_level(level).init();

    cli::run(cli)
}
