// Copyright 2026 Respire project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

//! The default realizations of the two externally-injected collaborators: a filesystem mtime
//! primitive and a subprocess executor that shells a command string out to the platform shell
//! with optional stdio redirection. Kept in the core crate (rather than only in the `respire`
//! binary) so the core's own tests can exercise real files and real subprocesses exactly the way
//! a real build would, without needing a second copy of this wiring.

use std::fs::File;
use std::path::Path;
use std::process::Stdio;
use std::time::SystemTime;

use futures::future::BoxFuture;
use futures::FutureExt;

use crate::error::{Error, OptionalError};
use crate::system_command::SystemCommandParams;

/// `last_modification_time(path) -> Option<SystemTime>`. Any metadata error (including "not
/// found") is folded into `None`: the up-to-date algorithm only ever asks "missing or not," and
/// `file_exists_node.cc`'s equivalent call makes the same simplification.
pub fn system_last_modified_time(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).ok().and_then(|m| m.modified().ok())
}

/// Runs `params.command` through the platform shell, on the executor's blocking-thread pool so a
/// long subprocess cannot starve the async worker threads. `stdout`/`stderr`/`stdin` are
/// redirected to the declared paths when present; when absent, the child inherits this process's
/// own stdio.
pub fn run_via_platform_shell(
    executor: &task_executor::Executor,
    params: &SystemCommandParams,
) -> BoxFuture<'static, OptionalError> {
    let command = params.command.as_string();
    let stdout_path = params.stdout_file.as_ref().map(|p| p.as_path());
    let stderr_path = params.stderr_file.as_ref().map(|p| p.as_path());
    let stdin_path = params.stdin_file.as_ref().map(|p| p.as_path());

    let join = executor.native_spawn_blocking(move || -> OptionalError {
        let stdin = match &stdin_path {
            Some(path) => match File::open(path) {
                Ok(f) => Stdio::from(f),
                Err(e) => {
                    return Some(Error::new(format!(
                        "Error executing command: failed to open stdin file {}: {e}",
                        path.display()
                    )))
                }
            },
            None => Stdio::inherit(),
        };
        let stdout = match &stdout_path {
            Some(path) => match File::create(path) {
                Ok(f) => Stdio::from(f),
                Err(e) => {
                    return Some(Error::new(format!(
                        "Error executing command: failed to open stdout file {}: {e}",
                        path.display()
                    )))
                }
            },
            None => Stdio::inherit(),
        };
        let stderr = match &stderr_path {
            Some(path) => match File::create(path) {
                Ok(f) => Stdio::from(f),
                Err(e) => {
                    return Some(Error::new(format!(
                        "Error executing command: failed to open stderr file {}: {e}",
                        path.display()
                    )))
                }
            },
            None => Stdio::inherit(),
        };

        let shell_command = shell_invocation(&command);
        let status = match shell_command.stdin(stdin).stdout(stdout).stderr(stderr).status() {
            Ok(status) => status,
            Err(e) => return Some(Error::new(format!("Error executing command: {e}"))),
        };

        exit_status_to_error(status)
    });

    async move {
        match join.await {
            Ok(result) => result,
            Err(e) => Some(Error::new(format!(
                "Error executing command: worker task panicked: {e}"
            ))),
        }
    }
    .boxed()
}

#[cfg(unix)]
fn shell_invocation(command: &str) -> std::process::Command {
    let mut c = std::process::Command::new("sh");
    c.arg("-c").arg(command);
    c
}

#[cfg(windows)]
fn shell_invocation(command: &str) -> std::process::Command {
    let mut c = std::process::Command::new("cmd");
    c.arg("/C").arg(command);
    c
}

#[cfg(unix)]
fn exit_status_to_error(status: std::process::ExitStatus) -> OptionalError {
    use std::os::unix::process::ExitStatusExt;
    if status.success() {
        None
    } else if let Some(signal) = status.signal() {
        Some(Error::new(format!(
            "Error executing command: Process terminated by signal {signal}."
        )))
    } else {
        Some(Error::new(format!(
            "Error executing command: Exit code {}.",
            status.code().unwrap_or(-1)
        )))
    }
}

#[cfg(windows)]
fn exit_status_to_error(status: std::process::ExitStatus) -> OptionalError {
    if status.success() {
        None
    } else {
        Some(Error::new(format!(
            "Error executing command: Exit code {}.",
            status.code().unwrap_or(-1)
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_path_has_no_mtime() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(system_last_modified_time(&dir.path().join("nope")), None);
    }

    #[test]
    fn existing_path_has_an_mtime() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f");
        std::fs::write(&path, b"hi").unwrap();
        assert!(system_last_modified_time(&path).is_some());
    }

    #[tokio::test]
    async fn runs_a_shell_command_and_reports_success() {
        let executor = task_executor::Executor::new();
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out.txt");
        let params = SystemCommandParams {
            command: crate::path::PathView::from_literal(&format!(
                "echo hi > {}",
                out.display()
            )),
            inputs: vec![],
            outputs: vec![],
            soft_outputs: vec![],
            deps_file: None,
            stdout_file: None,
            stderr_file: None,
            stdin_file: None,
        };
        let result = run_via_platform_shell(&executor, &params).await;
        assert_eq!(result, None);
        assert!(out.exists());
    }

    #[tokio::test]
    async fn nonzero_exit_is_reported_as_an_error() {
        let executor = task_executor::Executor::new();
        let params = SystemCommandParams {
            command: crate::path::PathView::from_literal("exit 3"),
            inputs: vec![],
            outputs: vec![],
            soft_outputs: vec![],
            deps_file: None,
            stdout_file: None,
            stderr_file: None,
            stdin_file: None,
        };
        let result = run_via_platform_shell(&executor, &params).await;
        assert_eq!(
            result,
            Some(Error::new("Error executing command: Exit code 3."))
        );
    }
}
