// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! State inspection tool
//!
//! Loads `assoc_gpu.toml`, builds and initializes a state for the configured
//! device, moves it to the device and prints the check report plus a state dump.
//!
//! Usage:
//!   state_inspect [--config <path>] [--backend <name>] [--device <n>] [--arrays] [--json]
//!                 [--debug-<crate>] [--debug-all]

use std::collections::HashMap;
use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use assoc_gpu::config::load_config;
use assoc_gpu::observability::{debug_flags_help, init_logging, parse_debug_flags};
use assoc_gpu::{logging_from_config, state_from_config};

struct Args {
    config: Option<PathBuf>,
    overrides: HashMap<String, String>,
    print_arrays: bool,
    json: bool,
}

fn parse_args() -> Result<Option<Args>> {
    let mut args = Args {
        config: None,
        overrides: HashMap::new(),
        print_arrays: false,
        json: false,
    };

    let mut iter = std::env::args().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--config" => {
                let path = iter.next().context("--config needs a path")?;
                args.config = Some(PathBuf::from(path));
            }
            "--backend" | "--device" | "--log-level" => {
                let value = iter.next().with_context(|| format!("{} needs a value", arg))?;
                let key = arg.trim_start_matches("--").replace('-', "_");
                args.overrides.insert(key, value);
            }
            "--arrays" => args.print_arrays = true,
            "--json" => args.json = true,
            "--help" | "-h" => {
                println!("state_inspect [--config <path>] [--backend <name>] [--device <n>] [--log-level <level>] [--arrays] [--json]\n");
                println!("{}", debug_flags_help());
                return Ok(None);
            }
            // Debug flags are read by parse_debug_flags
            _ if arg.starts_with("--debug-") => {}
            other => anyhow::bail!("Unknown argument '{}'", other),
        }
    }

    Ok(Some(args))
}

fn main() -> Result<()> {
    let Some(args) = parse_args()? else {
        return Ok(());
    };

    let mut config = load_config(args.config.as_deref(), Some(&args.overrides))
        .context("Failed to load configuration")?;
    config.diagnostics.print_arrays |= args.print_arrays;

    let _guard = init_logging(&parse_debug_flags(), &logging_from_config(&config.logging))?;

    let mut state = state_from_config(&config)?;
    state.initialize()?;
    state.move_to_device()?;
    let report = state.check()?;

    let stdout = io::stdout();
    let mut out = stdout.lock();
    if args.json {
        serde_json::to_writer_pretty(&mut out, &report)?;
        writeln!(out)?;
    } else {
        writeln!(
            out,
            "check: {} arrays on the {}, {} bytes, handle bound: {}",
            report.arrays, report.location, report.total_bytes, report.handle_bound
        )?;
        state.print(&mut out, config.diagnostics.print_arrays)?;
    }

    state.free();
    Ok(())
}
