// Copyright 2026 Respire project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

//! The simplest `FileInfoNode`: a leaf that reports a single path's modification time and nothing
//! else. Every input a registry file names without also naming it as an output becomes one of
//! these, and `NodeStore` deduplicates them by path so two inputs naming the same file share one
//! node.
//!
//! The first call to `get_file_info` stats the path and caches the result forever: a
//! `FileExistsNode` represents a file no command in this build graph produces, so its mtime
//! cannot change as a result of anything this build does, and re-stating it on every call would
//! only add filesystem round-trips for no new information. The `once` cell makes the computation
//! idempotent under concurrent first callers without a separate lock.
//!
//! Unlike `FileProcessNode`/`RegistryNode`, a `FileExistsNode` has no activity log entry of its
//! own: nothing about a pre-existing file's discovery is worth narrating.

use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::sync::OnceCell;

use crate::environment::MtimeFn;
use crate::error::Error;
use crate::file_info::{FileInfo, FileInfoNode, FileOutput};
use crate::path::PathView;

pub struct FileExistsNode {
    path: PathView,
    mtime: MtimeFn,
    cached: OnceCell<FileOutput>,
}

impl FileExistsNode {
    pub fn new(path: PathView, mtime: MtimeFn) -> Arc<FileExistsNode> {
        Arc::new(FileExistsNode {
            path,
            mtime,
            cached: OnceCell::new(),
        })
    }

    pub fn path(&self) -> &PathView {
        &self.path
    }
}

impl FileInfoNode for FileExistsNode {
    fn get_file_info(self: Arc<Self>, _dry_run: bool) -> BoxFuture<'static, FileOutput> {
        async move {
            self.cached
                .get_or_init(|| async {
                    match (self.mtime)(&self.path.as_path()) {
                        Some(time) => FileOutput::Value(vec![FileInfo::new(
                            self.path.clone(),
                            Some(time),
                            false,
                        )]),
                        None => FileOutput::Error(Error::new(format!(
                            "Error: File not found: {}",
                            self.path.as_string()
                        ))),
                    }
                })
                .await
                .clone()
        }
        .boxed()
    }

    fn get_ordered_output_paths(&self) -> Vec<PathView> {
        vec![self.path.clone()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc as StdArc;

    fn always_now(_path: &std::path::Path) -> Option<std::time::SystemTime> {
        Some(std::time::SystemTime::now())
    }

    fn always_missing(_path: &std::path::Path) -> Option<std::time::SystemTime> {
        None
    }

    #[tokio::test]
    async fn reports_a_present_file() {
        let mtime: MtimeFn = StdArc::new(always_now);
        let node = FileExistsNode::new(PathView::from_literal("a.txt"), mtime);
        let output = node.get_file_info(false).await;
        let value = output.value().unwrap();
        assert_eq!(value.len(), 1);
        assert!(value[0].last_modified_time.is_some());
        assert!(!value[0].is_soft);
    }

    #[tokio::test]
    async fn reports_a_missing_file_as_an_error() {
        let mtime: MtimeFn = StdArc::new(always_missing);
        let node = FileExistsNode::new(PathView::from_literal("missing.txt"), mtime);
        let output = node.get_file_info(false).await;
        let error = output.error().unwrap();
        assert!(error.message().contains("missing.txt"));
    }

    #[tokio::test]
    async fn reports_the_same_path_it_was_constructed_with() {
        let mtime: MtimeFn = StdArc::new(always_now);
        let node = FileExistsNode::new(PathView::from_literal("src/main.rs"), mtime);
        assert_eq!(node.get_ordered_output_paths(), vec![PathView::from_literal("src/main.rs")]);
    }
}
