// Copyright 2026 Respire project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

//! Bundles the scheduler with the two externally-injected collaborators that stay outside the
//! build graph's own concerns (the subprocess callable and the filesystem mtime primitive), plus
//! the business-level activity log. Every node in this crate is constructed with a `&Environment`
//! rather than reaching for ambient/global state.

use std::path::Path;
use std::sync::Arc;
use std::time::SystemTime;

use futures::future::BoxFuture;

use crate::activity_log::ActivityLog;
use crate::error::OptionalError;
use crate::system_command::SystemCommandParams;

/// The abstract "last-modification time of a path, or absent if the path does not exist"
/// primitive. Injected rather than hardcoded so tests can swap in a fake clock if ever needed;
/// the default (`fs::system_last_modified_time`) is what every real build uses.
pub type MtimeFn = Arc<dyn Fn(&Path) -> Option<SystemTime> + Send + Sync>;

/// The abstract subprocess callable: given a fully-resolved set of command parameters, run it and
/// report success/failure. Returning a boxed future (rather than a plain synchronous function)
/// lets the default implementation hand the actual blocking work off to the executor's
/// blocking-thread pool without forcing every caller to know about that detail.
pub type RunCommandFn =
    Arc<dyn Fn(&SystemCommandParams) -> BoxFuture<'static, OptionalError> + Send + Sync>;

#[derive(Clone)]
pub struct Environment {
    pub executor: task_executor::Executor,
    pub mtime: MtimeFn,
    pub run_command: RunCommandFn,
    pub activity_log: Arc<ActivityLog>,
}

impl Environment {
    pub fn new(
        executor: task_executor::Executor,
        mtime: MtimeFn,
        run_command: RunCommandFn,
        activity_log: Arc<ActivityLog>,
    ) -> Self {
        Environment {
            executor,
            mtime,
            run_command,
            activity_log,
        }
    }
}
