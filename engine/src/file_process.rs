// Copyright 2026 Respire project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

//! The up-to-date decision algorithm. This is the generic worker every command in a registry file
//! ultimately becomes (`system_command::SystemCommandNode` is a thin, activity-logged wrapper
//! around one of these).

use std::sync::{Arc, Weak};
use std::time::SystemTime;

use futures::future::{join_all, BoxFuture};
use futures::FutureExt;
use parking_lot::Mutex;

use crate::activity_log::FileProcessNodeLog;
use crate::environment::Environment;
use crate::error::{Error, OptionalError};
use crate::file_info::{FileInfo, FileInfoNode, FileInfoNodeOutput, FileOutput};
use crate::future::RequestReplyConsumer;
use crate::path::PathView;

/// Returns additional dependencies beyond the statically-declared `in` list (read from an
/// externally-generated deps file), or `None` if they could not be determined (which the caller
/// treats as "rebuild", never as a propagated error).
pub type GetDepsFn =
    Arc<dyn Fn() -> BoxFuture<'static, Option<Vec<FileInfoNodeOutput>>> + Send + Sync>;

/// Runs the command this node exists to run. Returns `Some(error)` on failure.
pub type RunFn = Arc<dyn Fn() -> BoxFuture<'static, OptionalError> + Send + Sync>;

struct CachedResult {
    output: FileOutput,
    is_fake_dry_run: bool,
}

pub struct FileProcessNode {
    inputs: Vec<FileInfoNodeOutput>,
    output_files: Vec<PathView>,
    soft_output_files: Vec<PathView>,
    run: RunFn,
    get_deps: Option<GetDepsFn>,
    activity_log_entry: Option<FileProcessNodeLog>,
    mtime: crate::environment::MtimeFn,
    cache: Mutex<Option<CachedResult>>,
    consumer: RequestReplyConsumer<bool, FileOutput>,
}

impl FileProcessNode {
    /// Constructed via `Arc::new_cyclic` because the node's own request/reply consumer must be
    /// able to call back into `compute_file_output` on `self`, done safely by upgrading a `Weak`
    /// rather than dereferencing a raw pointer whose lifetime isn't otherwise provable to the
    /// borrow checker.
    pub fn new(
        env: &Environment,
        inputs: Vec<FileInfoNodeOutput>,
        output_files: Vec<PathView>,
        soft_output_files: Vec<PathView>,
        run: RunFn,
        get_deps: Option<GetDepsFn>,
        activity_log_entry: Option<FileProcessNodeLog>,
    ) -> Arc<FileProcessNode> {
        let executor = env.executor.clone();
        let mtime = env.mtime.clone();
        Arc::new_cyclic(|weak: &Weak<FileProcessNode>| {
            let weak_for_consumer = weak.clone();
            let consumer = RequestReplyConsumer::new(&executor, move |dry_run: bool| {
                let weak = weak_for_consumer.clone();
                async move {
                    let node = weak.upgrade().expect("node outlives its own consumer task");
                    node.handle_request(dry_run).await
                }
            });
            FileProcessNode {
                inputs,
                output_files,
                soft_output_files,
                run,
                get_deps,
                activity_log_entry,
                mtime,
                cache: Mutex::new(None),
                consumer,
            }
        })
    }

    async fn handle_request(&self, dry_run: bool) -> FileOutput {
        let needs_recompute = {
            let cache = self.cache.lock();
            match &*cache {
                Some(cached) => !dry_run && cached.is_fake_dry_run,
                None => true,
            }
        };

        if needs_recompute {
            let result = self.compute_file_output(dry_run).await;
            let mut cache = self.cache.lock();
            let output = result.output.clone();
            *cache = Some(result);
            output
        } else {
            self.cache.lock().as_ref().unwrap().output.clone()
        }
    }

    async fn compute_file_output(&self, dry_run: bool) -> CachedResult {
        if let Some(log) = &self.activity_log_entry {
            log.signal_start_dependency_scan(dry_run);
        }

        let input_futures: Vec<_> = self
            .inputs
            .iter()
            .map(|input| input.node.clone().get_file_info(dry_run))
            .collect();

        let mut output_times = self.stat_all(&self.output_files);

        let input_results = join_all(input_futures).await;
        for result in &input_results {
            if let Some(error) = result.error() {
                self.log_processing_complete(Some(error.clone()), dry_run);
                return CachedResult {
                    output: FileOutput::Error(error.clone()),
                    is_fake_dry_run: false,
                };
            }
        }

        let mut should_rebuild =
            any_input_newer_than_outputs(&self.inputs, &input_results, &output_times, true);

        if !should_rebuild {
            if let Some(get_deps) = &self.get_deps {
                match get_deps().await {
                    None => should_rebuild = true,
                    Some(extra_deps) => {
                        let dep_futures: Vec<_> = extra_deps
                            .iter()
                            .map(|dep| dep.node.clone().get_file_info(false))
                            .collect();
                        let dep_results = join_all(dep_futures).await;
                        if dep_results.iter().any(|r| r.error().is_some()) {
                            // A dep file referencing a file that no longer exists is not a
                            // propagated error: it just forces a rebuild.
                            should_rebuild = true;
                        } else {
                            should_rebuild = any_input_newer_than_outputs(
                                &extra_deps,
                                &dep_results,
                                &output_times,
                                true,
                            );
                        }
                    }
                }
            }
        }

        let mut is_fake_dry_run = false;
        if should_rebuild {
            if let Some(log) = &self.activity_log_entry {
                log.signal_start_running_command(dry_run);
            }

            if !dry_run {
                if let Some(error) = (self.run)().await {
                    let error = Error::new(format!("Error executing command: {error}"));
                    self.log_processing_complete(Some(error.clone()), dry_run);
                    return CachedResult {
                        output: FileOutput::Error(error),
                        is_fake_dry_run: false,
                    };
                }

                output_times = self.stat_all(&self.output_files);

                if any_input_newer_than_outputs(&self.inputs, &input_results, &output_times, false)
                {
                    let error = Error::new(
                        "Not all output files were modified by a FileProcessNode(). If this is \
                         what you want, specify 'soft output's instead.",
                    );
                    self.log_processing_complete(Some(error.clone()), dry_run);
                    return CachedResult {
                        output: FileOutput::Error(error),
                        is_fake_dry_run: false,
                    };
                }
            } else {
                is_fake_dry_run = true;
                let now = SystemTime::now();
                output_times = output_times.iter().map(|_| Some(now)).collect();
            }
        }

        let mut values = Vec::with_capacity(self.output_files.len() + self.soft_output_files.len());
        for (path, time) in self.output_files.iter().zip(output_times.iter()) {
            values.push(FileInfo::new(path.clone(), *time, false));
        }

        if !dry_run || !should_rebuild {
            for path in &self.soft_output_files {
                values.push(FileInfo::new(path.clone(), (self.mtime)(&path.as_path()), true));
            }
        } else {
            is_fake_dry_run = true;
            let now = SystemTime::now();
            for path in &self.soft_output_files {
                values.push(FileInfo::new(path.clone(), Some(now), true));
            }
        }

        self.log_processing_complete(None, dry_run);
        CachedResult {
            output: FileOutput::Value(values),
            is_fake_dry_run,
        }
    }

    fn stat_all(&self, paths: &[PathView]) -> Vec<Option<SystemTime>> {
        paths.iter().map(|p| (self.mtime)(&p.as_path())).collect()
    }

    fn log_processing_complete(&self, error: OptionalError, dry_run: bool) {
        if let Some(log) = &self.activity_log_entry {
            log.signal_processing_complete(error, dry_run);
        }
    }
}

/// Implements both the pre-run rebuild check (`newer_or_equal` = `true`) and the post-run sanity
/// check (`newer_or_equal` = `false`). The asymmetry is deliberate: equal mtimes force a rebuild
/// on the way in, but are tolerated as "the command touched it" on the way out.
fn any_input_newer_than_outputs(
    inputs: &[FileInfoNodeOutput],
    input_results: &[FileOutput],
    output_times: &[Option<SystemTime>],
    newer_or_equal: bool,
) -> bool {
    let mut oldest_output_time: Option<SystemTime> = None;
    for output_time in output_times {
        match output_time {
            None => return true,
            Some(t) => {
                oldest_output_time = Some(match oldest_output_time {
                    Some(oldest) if oldest <= *t => oldest,
                    _ => *t,
                });
            }
        }
    }
    let oldest_output_time = match oldest_output_time {
        Some(t) => t,
        None => return true,
    };

    for (input, result) in inputs.iter().zip(input_results.iter()) {
        let info = &result.value().expect("errors already handled")[input.index];
        match info.last_modified_time {
            None => return true,
            Some(t) => {
                if newer_or_equal {
                    if t >= oldest_output_time {
                        return true;
                    }
                } else if t > oldest_output_time {
                    return true;
                }
            }
        }
    }

    false
}

impl FileInfoNode for FileProcessNode {
    fn get_file_info(self: Arc<Self>, dry_run: bool) -> BoxFuture<'static, FileOutput> {
        async move {
            let receiver = self.consumer.request(dry_run).await;
            receiver.recv().await.expect("request/reply consumer never aborts")
        }
        .boxed()
    }

    fn get_ordered_output_paths(&self) -> Vec<PathView> {
        self.output_files
            .iter()
            .chain(self.soft_output_files.iter())
            .cloned()
            .collect()
    }
}
