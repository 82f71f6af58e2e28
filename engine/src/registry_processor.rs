// Copyright 2026 Respire project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

//! Turns one registry file's bytes into its effect on the shared `NodeStore`: `inc` directives
//! recurse into (and dedupe against) other `RegistryNode`s, `sc` directives construct a
//! `SystemCommandNode` and publish its outputs, and `build` directives kick off the graph
//! evaluation that actually runs commands.
//!
//! `inc` directives are not awaited as soon as they're seen — every `inc` in a registry file is
//! started immediately and collected, then all of them are awaited together the first time a
//! subsequent `sc` or `build` directive needs the node store to already reflect their effects.
//! This lets sibling includes in the same file load and parse concurrently instead of strictly in
//! declaration order.

use std::sync::Arc;

use futures::future::{join_all, BoxFuture};
use futures::FutureExt;

use crate::environment::Environment;
use crate::error::Error;
use crate::file_info::{FileInfoNode, FileInfoNodeOutput};
use crate::json::tokenize_all;
use crate::node_store::NodeStore;
use crate::path::PathView;
use crate::registry_node::{process_registry, RegistryNode};
use crate::registry_parser::{parse_registry, Directive};
use crate::system_command::{SystemCommandNode, SystemCommandParams};

pub async fn process_registry_file(
    path: &PathView,
    env: &Environment,
    store: &Arc<NodeStore>,
    parent_chain: Vec<PathView>,
) -> Result<(), Error> {
    let bytes = read_file(env, path).await?;
    let tokens = tokenize_all(&bytes).map_err(|_| Error::new("Parser error."))?;
    let directives = parse_registry(&tokens).map_err(|_| Error::new("Parser error."))?;

    let mut pending_includes: Vec<BoxFuture<'static, Result<(), Error>>> = Vec::new();
    let mut build_outputs: Vec<FileInfoNodeOutput> = Vec::new();

    for directive in directives {
        match directive {
            Directive::Include(include_path) => {
                let log = env.activity_log.new_registry_node_log(&include_path);
                let (node, _was_created) = store
                    .get_or_create_registry_node(&include_path, || RegistryNode::new(include_path.clone(), log));
                pending_includes.push(process_registry(
                    node,
                    env.clone(),
                    store.clone(),
                    parent_chain.clone(),
                ));
            }
            Directive::SystemCommand(params) => {
                await_pending_includes(&mut pending_includes).await?;
                register_system_command(env, store, params)?;
            }
            Directive::Build(build_path) => {
                await_pending_includes(&mut pending_includes).await?;
                let output = store.lookup_output(&build_path).ok_or_else(|| {
                    Error::new(format!(
                        "Target not specified as an output in registry files:\n{}",
                        build_path.as_string()
                    ))
                })?;
                let dry_run_seed = output.node.clone().get_file_info(true);
                let _ = env.executor.native_spawn(async move {
                    dry_run_seed.await;
                });
                build_outputs.push(output);
            }
        }
    }

    await_pending_includes(&mut pending_includes).await?;

    let real_build_futures: Vec<_> = build_outputs
        .iter()
        .map(|output| output.node.clone().get_file_info(false))
        .collect();
    for result in join_all(real_build_futures).await {
        if let Some(error) = result.error() {
            return Err(error.clone());
        }
    }

    Ok(())
}

async fn await_pending_includes(pending: &mut Vec<BoxFuture<'static, Result<(), Error>>>) -> Result<(), Error> {
    for result in join_all(pending.drain(..)).await {
        result?;
    }
    Ok(())
}

fn register_system_command(
    env: &Environment,
    store: &Arc<NodeStore>,
    params: SystemCommandParams,
) -> Result<(), Error> {
    let mut inputs = Vec::new();
    for input in &params.inputs {
        inputs.push(store.resolve_input(env, input));
    }
    if let Some(stdin) = &params.stdin_file {
        inputs.push(store.resolve_input(env, stdin));
    }
    if let Some(deps_file) = &params.deps_file {
        inputs.push(store.resolve_input(env, deps_file));
    }

    let mut output_files = params.outputs.clone();
    if let Some(stdout) = &params.stdout_file {
        output_files.push(stdout.clone());
    }
    if let Some(stderr) = &params.stderr_file {
        output_files.push(stderr.clone());
    }
    let soft_output_files = params.soft_outputs.clone();

    let log = env.activity_log.new_file_process_node_log(params.clone());

    let node = SystemCommandNode::new(
        env,
        store,
        params,
        inputs,
        output_files.clone(),
        soft_output_files.clone(),
        log,
    );
    let node: Arc<dyn FileInfoNode> = node;

    let mut index = 0usize;
    for path in output_files.iter().chain(soft_output_files.iter()) {
        store.register_output(path.clone(), node.clone(), index)?;
        index += 1;
    }

    Ok(())
}

async fn read_file(env: &Environment, path: &PathView) -> Result<Vec<u8>, Error> {
    let fs_path = path.as_path();
    let join = env.executor.native_spawn_blocking(move || std::fs::read(&fs_path));
    match join.await {
        Ok(Ok(bytes)) => Ok(bytes),
        Ok(Err(e)) => Err(Error::new(format!("failed to read {}: {e}", path.as_string()))),
        Err(e) => Err(Error::new(format!("failed to read {}: worker task panicked: {e}", path.as_string()))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activity_log::ActivityLog;
    use crate::environment::{MtimeFn, RunCommandFn};
    use crate::error::OptionalError;

    fn test_environment() -> Environment {
        let mtime: MtimeFn = Arc::new(crate::fs::system_last_modified_time);
        let run_command: RunCommandFn = Arc::new(|_params: &SystemCommandParams| -> BoxFuture<'static, OptionalError> {
            async { None }.boxed()
        });
        Environment::new(
            task_executor::Executor::new(),
            mtime,
            run_command,
            ActivityLog::disabled(),
        )
    }

    #[tokio::test]
    async fn a_build_directive_for_a_missing_input_fails() {
        let dir = tempfile::tempdir().unwrap();
        let registry_path = dir.path().join("r.registry");
        std::fs::write(
            &registry_path,
            r#"[{"build":["missing.txt"]}]"#,
        )
        .unwrap();

        let env = test_environment();
        let store = NodeStore::new();
        let path = PathView::from_literal(registry_path.to_str().unwrap());
        let result = process_registry_file(&path, &env, &store, Vec::new()).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn an_sc_directive_registers_its_outputs() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("a.txt");
        let output = dir.path().join("a.out");
        std::fs::write(&input, b"hi").unwrap();

        let registry_path = dir.path().join("r.registry");
        std::fs::write(
            &registry_path,
            format!(
                r#"[{{"sc":[{{"cmd":"true","in":["{}"],"out":["{}"],}}]}}]"#,
                input.to_str().unwrap().replace('\\', "\\\\"),
                output.to_str().unwrap().replace('\\', "\\\\"),
            ),
        )
        .unwrap();

        let env = test_environment();
        let store = NodeStore::new();
        let path = PathView::from_literal(registry_path.to_str().unwrap());
        let result = process_registry_file(&path, &env, &store, Vec::new()).await;
        assert!(result.is_ok());
        assert!(store
            .lookup_output(&PathView::from_literal(output.to_str().unwrap()))
            .is_some());
    }
}
