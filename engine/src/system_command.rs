// Copyright 2026 Respire project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

//! The `sc` registry directive's runtime counterpart: a thin, activity-logged wrapper around a
//! generic `FileProcessNode` that knows how to turn a declared shell command, its declared
//! inputs/outputs, and an optional deps file into the closures `FileProcessNode` needs.

use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;

use crate::activity_log::FileProcessNodeLog;
use crate::deps::parse_deps;
use crate::environment::Environment;
use crate::file_info::{FileInfoNode, FileInfoNodeOutput, FileOutput};
use crate::file_process::FileProcessNode;
use crate::node_store::NodeStore;
use crate::path::PathView;

/// Everything a single `sc` directive declares about one command. `outputs` holds
/// only the hard outputs named by `out`; `stdout_file`/`stderr_file` are additional hard outputs
/// the registry processor folds in separately, since they're written by the shell redirection
/// rather than appearing in `out`.
#[derive(Clone, Debug)]
pub struct SystemCommandParams {
    pub command: PathView,
    pub inputs: Vec<PathView>,
    pub outputs: Vec<PathView>,
    pub soft_outputs: Vec<PathView>,
    pub deps_file: Option<PathView>,
    pub stdout_file: Option<PathView>,
    pub stderr_file: Option<PathView>,
    pub stdin_file: Option<PathView>,
}

pub struct SystemCommandNode {
    inner: Arc<FileProcessNode>,
}

impl SystemCommandNode {
    pub fn new(
        env: &Environment,
        store: &Arc<NodeStore>,
        params: SystemCommandParams,
        inputs: Vec<FileInfoNodeOutput>,
        output_files: Vec<PathView>,
        soft_output_files: Vec<PathView>,
        activity_log_entry: Option<FileProcessNodeLog>,
    ) -> Arc<SystemCommandNode> {
        let run_command = env.run_command.clone();
        let run_params = params.clone();
        let run: crate::file_process::RunFn = Arc::new(move || -> BoxFuture<'static, crate::error::OptionalError> {
            let run_command = run_command.clone();
            let params = run_params.clone();
            async move { run_command(&params).await }.boxed()
        });

        let get_deps: Option<crate::file_process::GetDepsFn> = params.deps_file.clone().map(|deps_path| {
            let executor = env.executor.clone();
            let env = env.clone();
            let store = store.clone();
            let closure: crate::file_process::GetDepsFn = Arc::new(move || {
                let executor = executor.clone();
                let env = env.clone();
                let store = store.clone();
                let deps_path = deps_path.clone();
                async move { read_deps(&executor, &env, &store, &deps_path).await }.boxed()
            });
            closure
        });

        let inner = FileProcessNode::new(
            env,
            inputs,
            output_files,
            soft_output_files,
            run,
            get_deps,
            activity_log_entry,
        );

        Arc::new(SystemCommandNode { inner })
    }
}

/// Resolves a deps file's listed paths the same way the registry processor resolves an `in`
/// entry: through `NodeStore::get_or_create_file_exists_node`, so a path that also appears as a
/// declared input (or another command's deps) shares one cached node instead of re-stating it
/// under a second, un-deduplicated `FileExistsNode`.
async fn read_deps(
    executor: &task_executor::Executor,
    env: &Environment,
    store: &Arc<NodeStore>,
    deps_path: &PathView,
) -> Option<Vec<FileInfoNodeOutput>> {
    let path = deps_path.as_path();
    let join = executor.native_spawn_blocking(move || std::fs::read(&path));
    let contents = match join.await {
        Ok(Ok(bytes)) => bytes,
        _ => return None,
    };
    let paths = match parse_deps(&contents) {
        Ok(paths) => paths,
        Err(_) => return None,
    };
    Some(
        paths
            .into_iter()
            .map(|path| store.resolve_input(env, &path))
            .collect(),
    )
}

impl FileInfoNode for SystemCommandNode {
    fn get_file_info(self: Arc<Self>, dry_run: bool) -> BoxFuture<'static, FileOutput> {
        self.inner.clone().get_file_info(dry_run)
    }

    fn get_ordered_output_paths(&self) -> Vec<PathView> {
        self.inner.get_ordered_output_paths()
    }
}
