// Copyright 2026 Respire project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

//! The data model shared by every node kind: the `FileInfoNode` interface, plus the `FileInfo`/
//! `FileOutput` value types every implementation reports through it.

use std::sync::Arc;
use std::time::SystemTime;

use futures::future::BoxFuture;

use crate::error::Error;
use crate::path::PathView;

/// One declared output's identity and freshness: present iff the path exists.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileInfo {
    pub filename: PathView,
    pub last_modified_time: Option<SystemTime>,
    pub is_soft: bool,
}

impl FileInfo {
    pub fn new(filename: PathView, last_modified_time: Option<SystemTime>, is_soft: bool) -> Self {
        FileInfo {
            filename,
            last_modified_time,
            is_soft,
        }
    }
}

/// The result of asking a node for its current file info: either one entry per declared output
/// (hard outputs first, in declared order, then soft outputs), or the error that prevented the
/// node from producing them.
#[derive(Clone, Debug)]
pub enum FileOutput {
    Value(Vec<FileInfo>),
    Error(Error),
}

impl FileOutput {
    pub fn error(&self) -> Option<&Error> {
        match self {
            FileOutput::Error(e) => Some(e),
            FileOutput::Value(_) => None,
        }
    }

    pub fn value(&self) -> Option<&[FileInfo]> {
        match self {
            FileOutput::Value(v) => Some(v),
            FileOutput::Error(_) => None,
        }
    }
}

impl From<Error> for FileOutput {
    fn from(error: Error) -> Self {
        FileOutput::Error(error)
    }
}

impl From<Vec<FileInfo>> for FileOutput {
    fn from(value: Vec<FileInfo>) -> Self {
        FileOutput::Value(value)
    }
}

/// The polymorphic node interface. Implemented by `FileExistsNode` and by `FileProcessNode`
/// (wrapped, for the registry's purposes, as `SystemCommandNode`).
///
/// `get_file_info` takes `self: Arc<Self>` rather than `&self` because every implementation drives
/// its work through a `RequestReplyConsumer` whose closure must hold a strong or weak reference to
/// the node to call back into it; see `file_process::FileProcessNode::new` for why
/// `Arc::new_cyclic` is the construction idiom that makes that possible without a raw pointer.
pub trait FileInfoNode: Send + Sync {
    fn get_file_info(self: Arc<Self>, dry_run: bool) -> BoxFuture<'static, FileOutput>;

    /// The paths this node will report in `FileOutput`, in the exact order `get_file_info` will
    /// report their `FileInfo` entries.
    fn get_ordered_output_paths(&self) -> Vec<PathView>;
}

/// Addresses one specific output (by index) of one specific node.
#[derive(Clone)]
pub struct FileInfoNodeOutput {
    pub node: Arc<dyn FileInfoNode>,
    pub index: usize,
}

impl FileInfoNodeOutput {
    pub fn new(node: Arc<dyn FileInfoNode>, index: usize) -> Self {
        FileInfoNodeOutput { node, index }
    }
}
