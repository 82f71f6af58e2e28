// Copyright 2026 Respire project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

//! The `respire` binary's command line, parsed with a clap derive parser.

use std::path::PathBuf;

use clap::Parser;

/// An incremental, parallel build engine driven by a JSON-like registry file.
#[derive(Parser, Debug)]
#[command(name = "respire", version, about)]
pub struct Cli {
    /// Number of worker threads to run the build graph on. Default 1.
    #[arg(short = 'j', long = "jobs", value_name = "N")]
    pub jobs: Option<usize>,

    /// Write an activity log to stdout: `-o` logs process executions and their completion only,
    /// `-oo` logs every node creation, dependency scan, parse and command execution.
    #[arg(short = 'o', action = clap::ArgAction::Count)]
    pub activity_log_verbosity: u8,

    /// The root registry file to build.
    pub registry: PathBuf,
}
