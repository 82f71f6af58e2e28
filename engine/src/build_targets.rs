// Copyright 2026 Respire project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

//! The top-level entry point a driver (the `respire` binary, or a test) calls to run a build:
//! load one root registry file, process it and everything it transitively includes, run every
//! `build` directive's command graph, then release every node this build created before
//! returning.
//!
//! Takes an already-constructed `Environment` rather than building one itself: the executor's
//! worker-thread count is a property of the runtime the caller is already inside (configured via
//! `-j`, see the `respire` binary's CLI), and only the caller is in a position to own that
//! runtime's shutdown.

use crate::environment::Environment;
use crate::error::Error;
use crate::node_store::NodeStore;
use crate::path::PathView;
use crate::registry_node::{process_registry, RegistryNode};

/// Builds `registry_path` using `env`'s injected mtime/subprocess collaborators and activity log.
/// Returns once every `build` directive reachable from the root registry has either completed or
/// the first one has failed.
pub async fn build_targets(registry_path: PathView, env: Environment) -> Result<(), Error> {
    let store = NodeStore::new();

    let root_log = env.activity_log.new_registry_node_log(&registry_path);
    let root_node = RegistryNode::new(registry_path, root_log);
    let result = process_registry(root_node, env.clone(), store.clone(), Vec::new()).await;

    store.drain(&env).await;

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activity_log::ActivityLog;
    use crate::environment::{MtimeFn, RunCommandFn};
    use crate::fs::{run_via_platform_shell, system_last_modified_time};
    use futures::FutureExt;
    use std::collections::HashMap;
    use std::sync::Arc;

    fn test_environment(executor: task_executor::Executor) -> Environment {
        let mtime: MtimeFn = Arc::new(system_last_modified_time);
        let executor_for_commands = executor.clone();
        let run_command: RunCommandFn =
            Arc::new(move |params| run_via_platform_shell(&executor_for_commands, params));
        Environment::new(executor, mtime, run_command, ActivityLog::disabled())
    }

    fn shell_escape(path: &std::path::Path) -> String {
        path.to_str().unwrap().replace('\\', "\\\\")
    }

    #[tokio::test]
    async fn builds_a_simple_command_from_a_temp_registry() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.txt");
        let output = dir.path().join("out.txt");
        std::fs::write(&input, b"hello").unwrap();

        let registry_path = dir.path().join("root.registry");
        std::fs::write(
            &registry_path,
            format!(
                r#"[{{"sc":[{{"cmd":"cp {} {}","in":["{}"],"out":["{}"],}}]}},{{"build":["{}"]}}]"#,
                shell_escape(&input),
                shell_escape(&output),
                shell_escape(&input),
                shell_escape(&output),
                shell_escape(&output),
            ),
        )
        .unwrap();

        let env = test_environment(task_executor::Executor::new());
        let result = build_targets(
            PathView::from_literal(registry_path.to_str().unwrap()),
            env,
        )
        .await;

        assert!(result.is_ok(), "build failed: {result:?}");
        assert!(output.exists());
        assert_eq!(std::fs::read(&output).unwrap(), b"hello");
    }

    /// Uses a fully virtual clock and a counting fake command runner instead of real files and
    /// real timestamps, so the up-to-date decision can be exercised deterministically: real
    /// filesystem mtimes can tie at coarse resolution, which would make a real-clock version of
    /// this test flaky.
    #[tokio::test]
    async fn a_second_build_against_unchanged_inputs_does_not_rerun_the_command() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::time::{Duration, SystemTime};

        let epoch = SystemTime::UNIX_EPOCH;
        let times = Arc::new(parking_lot::Mutex::new(HashMap::<String, SystemTime>::from([(
            "in.txt".to_string(),
            epoch + Duration::from_secs(1),
        )])));
        let run_count = Arc::new(AtomicUsize::new(0));

        let mtime: MtimeFn = {
            let times = times.clone();
            Arc::new(move |path: &std::path::Path| {
                times
                    .lock()
                    .get(path.to_str().unwrap())
                    .copied()
                    .or_else(|| system_last_modified_time(path))
            })
        };
        let run_command: RunCommandFn = {
            let times = times.clone();
            let run_count = run_count.clone();
            Arc::new(move |params| {
                let times = times.clone();
                let run_count = run_count.clone();
                let output = params.outputs[0].as_string();
                async move {
                    run_count.fetch_add(1, Ordering::SeqCst);
                    times.lock().insert(output, epoch + Duration::from_secs(2));
                    None
                }
                .boxed()
            })
        };

        let registry = r#"[{"sc":[{"cmd":"x","in":["in.txt"],"out":["out.txt"],}]},{"build":["out.txt"]}]"#;
        let dir = tempfile::tempdir().unwrap();
        let registry_path = dir.path().join("root.registry");
        std::fs::write(&registry_path, registry).unwrap();
        let path = PathView::from_literal(registry_path.to_str().unwrap());

        let env = Environment::new(
            task_executor::Executor::new(),
            mtime,
            run_command,
            ActivityLog::disabled(),
        );
        let first = build_targets(path.clone(), env.clone()).await;
        assert!(first.is_ok(), "first build failed: {first:?}");
        assert_eq!(run_count.load(Ordering::SeqCst), 1);

        let second = build_targets(path, env).await;
        assert!(second.is_ok(), "second build failed: {second:?}");
        assert_eq!(run_count.load(Ordering::SeqCst), 1);
    }

    /// Counts real invocations of each distinct command (keyed by its first declared output) while
    /// still running it for real, so these end-to-end scenarios see genuine file contents and
    /// mtimes rather than a faked clock.
    fn counting_environment(
        executor: task_executor::Executor,
    ) -> (Environment, Arc<parking_lot::Mutex<HashMap<String, usize>>>) {
        let counts = Arc::new(parking_lot::Mutex::new(HashMap::<String, usize>::new()));
        let counts_for_run = counts.clone();
        let executor_for_commands = executor.clone();
        let run_command: RunCommandFn = Arc::new(move |params| {
            let counts = counts_for_run.clone();
            let key = params.outputs[0].as_string();
            let fut = run_via_platform_shell(&executor_for_commands, params);
            async move {
                *counts.lock().entry(key).or_insert(0) += 1;
                fut.await
            }
            .boxed()
        });
        let mtime: MtimeFn = Arc::new(system_last_modified_time);
        (Environment::new(executor, mtime, run_command, ActivityLog::disabled()), counts)
    }

    /// Scenario: a two-command chain (c1 produces OUT1, c2 combines OUT1 with itself into OUT2).
    /// Deleting only the root input's output reruns the whole chain; deleting only the leaf output
    /// reruns just the command that produces it.
    #[tokio::test]
    async fn chain_with_root_deletion_reruns_only_the_affected_commands() {
        let dir = tempfile::tempdir().unwrap();
        let out1 = dir.path().join("OUT1");
        let out2 = dir.path().join("OUT2");
        let registry_path = dir.path().join("root.registry");
        std::fs::write(
            &registry_path,
            format!(
                r#"[{{"sc":[
                    {{"cmd":"printf a > {out1}","in":[],"out":["{out1}"]}},
                    {{"cmd":"cat {out1} {out1} > {out2}","in":["{out1}"],"out":["{out2}"]}}
                ]}},{{"build":["{out2}"]}}]"#,
                out1 = shell_escape(&out1),
                out2 = shell_escape(&out2),
            ),
        )
        .unwrap();
        let path = PathView::from_literal(registry_path.to_str().unwrap());

        let (env, counts) = counting_environment(task_executor::Executor::new());

        let first = build_targets(path.clone(), env.clone()).await;
        assert!(first.is_ok(), "first build failed: {first:?}");
        assert_eq!(std::fs::read(&out1).unwrap(), b"a");
        assert_eq!(std::fs::read(&out2).unwrap(), b"aa");
        let counts_after_first: HashMap<_, _> = counts.lock().clone();
        assert_eq!(counts_after_first.values().sum::<usize>(), 2);

        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        std::fs::remove_file(&out1).unwrap();
        let second = build_targets(path.clone(), env.clone()).await;
        assert!(second.is_ok(), "second build failed: {second:?}");
        let delta: HashMap<_, _> = counts
            .lock()
            .iter()
            .map(|(k, v)| (k.clone(), v - counts_after_first.get(k).copied().unwrap_or(0)))
            .collect();
        assert_eq!(delta.values().sum::<usize>(), 2, "deleting OUT1 should rerun both commands");
        let counts_after_second: HashMap<_, _> = counts.lock().clone();

        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        std::fs::remove_file(&out2).unwrap();
        let third = build_targets(path, env).await;
        assert!(third.is_ok(), "third build failed: {third:?}");
        let delta: HashMap<_, _> = counts
            .lock()
            .iter()
            .map(|(k, v)| (k.clone(), v - counts_after_second.get(k).copied().unwrap_or(0)))
            .collect();
        assert_eq!(
            delta.values().sum::<usize>(),
            1,
            "deleting only OUT2 should rerun only its own command"
        );
        assert_eq!(*delta.get(&out2.to_str().unwrap().to_string()).unwrap(), 1);
    }

    /// Scenario: a "copy if different" command's soft output's mtime is left untouched when its
    /// content doesn't change, so a downstream command reading only the soft output is not
    /// rebuilt, even though the upstream command itself reran (its hard output always updates).
    #[tokio::test]
    async fn soft_output_invariance_skips_downstream_when_content_is_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let static_file = dir.path().join("STATIC");
        let ts = dir.path().join("TS");
        let soft_out = dir.path().join("SOFT_OUT");
        let out2 = dir.path().join("OUT2");
        std::fs::write(&static_file, b"same content").unwrap();

        let registry_path = dir.path().join("root.registry");
        std::fs::write(
            &registry_path,
            format!(
                r#"[{{"sc":[
                    {{"cmd":"cmp -s {static} {soft} || cp {static} {soft}; touch {ts}",
                      "in":["{static}"],"out":["{ts}"],"soft_out":["{soft}"]}},
                    {{"cmd":"cat {soft} > {out2}","in":["{soft}"],"out":["{out2}"]}}
                ]}},{{"build":["{out2}"]}}]"#,
                static = shell_escape(&static_file),
                soft = shell_escape(&soft_out),
                ts = shell_escape(&ts),
                out2 = shell_escape(&out2),
            ),
        )
        .unwrap();
        let path = PathView::from_literal(registry_path.to_str().unwrap());

        let (env, counts) = counting_environment(task_executor::Executor::new());

        let first = build_targets(path.clone(), env.clone()).await;
        assert!(first.is_ok(), "first build failed: {first:?}");
        assert_eq!(*counts.lock().get(&ts.to_str().unwrap().to_string()).unwrap(), 1);
        assert_eq!(*counts.lock().get(&out2.to_str().unwrap().to_string()).unwrap(), 1);

        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        std::fs::write(&static_file, b"same content").unwrap();
        let second = build_targets(path, env).await;
        assert!(second.is_ok(), "second build failed: {second:?}");
        assert_eq!(
            *counts.lock().get(&ts.to_str().unwrap().to_string()).unwrap(),
            2,
            "the upstream command's hard output always reruns when its input's mtime changes"
        );
        assert_eq!(
            *counts.lock().get(&out2.to_str().unwrap().to_string()).unwrap(),
            1,
            "downstream command must not rerun: the soft output's content (and mtime) are unchanged"
        );
    }

    /// Scenario: a command with no statically-declared inputs rebuilds when a path named only in
    /// its deps file changes.
    #[tokio::test]
    async fn deps_file_changes_force_exactly_one_rebuild() {
        let dir = tempfile::tempdir().unwrap();
        let static1 = dir.path().join("STATIC1");
        let static2 = dir.path().join("STATIC2");
        let deps = dir.path().join("deps.txt");
        let out = dir.path().join("OUT");
        std::fs::write(&static1, b"one").unwrap();
        std::fs::write(&static2, b"two").unwrap();
        std::fs::write(
            &deps,
            format!("{}\n{}\n", static1.to_str().unwrap(), static2.to_str().unwrap()),
        )
        .unwrap();

        let registry_path = dir.path().join("root.registry");
        std::fs::write(
            &registry_path,
            format!(
                r#"[{{"sc":[{{"cmd":"touch {out}","in":[],"out":["{out}"],"deps":"{deps}"}}]}},{{"build":["{out}"]}}]"#,
                out = shell_escape(&out),
                deps = shell_escape(&deps),
            ),
        )
        .unwrap();
        let path = PathView::from_literal(registry_path.to_str().unwrap());

        let (env, counts) = counting_environment(task_executor::Executor::new());

        let first = build_targets(path.clone(), env.clone()).await;
        assert!(first.is_ok(), "first build failed: {first:?}");
        assert_eq!(*counts.lock().get(&out.to_str().unwrap().to_string()).unwrap(), 1);

        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        std::fs::write(&static1, b"one-changed").unwrap();
        let second = build_targets(path.clone(), env.clone()).await;
        assert!(second.is_ok(), "second build failed: {second:?}");
        assert_eq!(
            *counts.lock().get(&out.to_str().unwrap().to_string()).unwrap(),
            2,
            "modifying a path named only in the deps file must trigger exactly one rebuild"
        );

        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        let third = build_targets(path, env).await;
        assert!(third.is_ok(), "third build failed: {third:?}");
        assert_eq!(
            *counts.lock().get(&out.to_str().unwrap().to_string()).unwrap(),
            2,
            "an unchanged deps file must not force another rebuild"
        );
    }

    /// Scenario: a registry's `sc` directive produces an included registry file; building a target
    /// declared only inside that included file runs the generator first, then the included
    /// command. Deleting the generated registry and rebuilding regenerates it and reruns only the
    /// command the regenerated file declares.
    #[tokio::test]
    async fn including_a_generated_registry_runs_the_generator_then_the_included_command() {
        let dir = tempfile::tempdir().unwrap();
        let included_registry = dir.path().join("INC.respire");
        let out = dir.path().join("OUT");

        let included_contents = format!(
            r#"[{{"sc":[{{"cmd":"touch {out}","in":[],"out":["{out}"]}}]}}]"#,
            out = shell_escape(&out),
        );
        // Embedded as the value of the outer registry's "cmd" field, so its own quotes must be
        // JSON-escaped; the engine's JSON decoding restores them before the shell ever sees them.
        let included_json_escaped = included_contents.replace('\\', "\\\\").replace('"', "\\\"");
        let root_registry = dir.path().join("root.registry");
        std::fs::write(
            &root_registry,
            format!(
                r#"[{{"sc":[{{"cmd":"printf '%s' '{included}' > {inc}","in":[],"out":["{inc}"]}}]}},
                    {{"inc":["{inc}"]}},
                    {{"build":["{out}"]}}]"#,
                included = included_json_escaped,
                inc = shell_escape(&included_registry),
                out = shell_escape(&out),
            ),
        )
        .unwrap();
        let path = PathView::from_literal(root_registry.to_str().unwrap());

        let (env, counts) = counting_environment(task_executor::Executor::new());

        assert!(!included_registry.exists());
        let first = build_targets(path.clone(), env.clone()).await;
        assert!(first.is_ok(), "first build failed: {first:?}");
        assert!(included_registry.exists());
        assert!(out.exists());
        assert_eq!(*counts.lock().get(&out.to_str().unwrap().to_string()).unwrap(), 1);
        let inc_count_key = included_registry.to_str().unwrap().to_string();
        assert_eq!(*counts.lock().get(&inc_count_key).unwrap(), 1);

        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        std::fs::remove_file(&included_registry).unwrap();
        let second = build_targets(path, env).await;
        assert!(second.is_ok(), "second build failed: {second:?}");
        assert_eq!(
            *counts.lock().get(&inc_count_key).unwrap(),
            2,
            "deleting the generated registry must regenerate it"
        );
        assert_eq!(
            *counts.lock().get(&out.to_str().unwrap().to_string()).unwrap(),
            1,
            "the included command's own output was untouched, so it must not rerun"
        );
    }

    /// Scenario: a registry that (transitively) includes itself is reported as a cyclic-dependency
    /// error, without hanging, and without running any command.
    #[tokio::test]
    async fn cyclic_includes_surface_an_error_without_running_any_command() {
        let dir = tempfile::tempdir().unwrap();
        let r1 = dir.path().join("r1.registry");
        let r2 = dir.path().join("r2.registry");
        std::fs::write(&r1, format!(r#"[{{"inc":["{}"]}}]"#, shell_escape(&r2))).unwrap();
        std::fs::write(&r2, format!(r#"[{{"inc":["{}"]}}]"#, shell_escape(&r1))).unwrap();

        let (env, counts) = counting_environment(task_executor::Executor::new());
        let result = build_targets(PathView::from_literal(r1.to_str().unwrap()), env).await;
        assert!(result.is_err());
        assert!(result.unwrap_err().message().to_lowercase().contains("cycl"));
        assert!(counts.lock().is_empty());
    }
}
