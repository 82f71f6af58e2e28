// Copyright 2026 Respire project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

//! The `respire` command line binary: wires the CLI to the engine's `build_targets` entry point
//! using the default filesystem mtime primitive and platform-shell subprocess executor, with
//! `env_logger` carrying diagnostics logging the same way the rest of this workspace's binaries
//! do.

mod cli;

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use engine::fs::{run_via_platform_shell, system_last_modified_time};
use engine::{ActivityLog, ActivityLogLevel, Environment, MtimeFn, PathView, RunCommandFn};

use cli::Cli;

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();
    let worker_threads = cli.jobs.unwrap_or(1);

    let activity_log = build_activity_log(&cli);

    let executor = match task_executor::Executor::new_owned(worker_threads, worker_threads * 4) {
        Ok(executor) => executor,
        Err(e) => {
            eprintln!("respire: {e}");
            return ExitCode::FAILURE;
        }
    };
    let mtime: MtimeFn = Arc::new(system_last_modified_time);
    let executor_for_commands = executor.clone();
    let run_command: RunCommandFn =
        Arc::new(move |params| run_via_platform_shell(&executor_for_commands, params));
    let activity_log_for_errors = activity_log.clone();
    let env = Environment::new(executor.clone(), mtime, run_command, activity_log);

    let registry_path = match cli.registry.to_str() {
        Some(path) => PathView::from_literal(path),
        None => {
            eprintln!("respire: registry path is not valid UTF-8");
            return ExitCode::FAILURE;
        }
    };

    let result = executor.block_on(engine::build_targets(registry_path, env));
    executor.shutdown(std::time::Duration::from_secs(10));

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            activity_log_for_errors.signal_respire_error(&e);
            eprintln!("respire: {e}");
            ExitCode::FAILURE
        }
    }
}

fn build_activity_log(cli: &Cli) -> Arc<ActivityLog> {
    let level = match cli.activity_log_verbosity {
        0 => ActivityLogLevel::None,
        1 => ActivityLogLevel::ProcessExecutionOnly,
        _ => ActivityLogLevel::All,
    };
    if level == ActivityLogLevel::None {
        ActivityLog::disabled()
    } else {
        ActivityLog::new(level, Box::new(std::io::stdout()))
    }
}
