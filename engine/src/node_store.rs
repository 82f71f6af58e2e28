// Copyright 2026 Respire project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

//! The shared, mutex-guarded table of every node constructed over the life of a build:
//! deduplicated `FileExistsNode`s, the path-to-output map every `FileProcessNode`/
//! `SystemCommandNode` registers its outputs into, and the registry-path-to-node map
//! `RegistryNode` uses for include-cycle detection.
//!
//! Nodes are kept alive in the order they were first created so they can be released in reverse
//! order: a later node may hold a reference that a dependency of an earlier node's consumer task
//! still needs during shutdown.

use std::sync::Arc;

use fnv::FnvHashMap;
use parking_lot::Mutex;

use crate::environment::Environment;
use crate::error::Error;
use crate::file_exists::FileExistsNode;
use crate::file_info::{FileInfoNode, FileInfoNodeOutput};
use crate::path::PathView;
use crate::registry_node::RegistryNode;

#[derive(Default)]
struct Inner {
    file_exists_nodes: FnvHashMap<PathView, Arc<FileExistsNode>>,
    outputs: FnvHashMap<PathView, FileInfoNodeOutput>,
    registries: FnvHashMap<PathView, Arc<RegistryNode>>,
    /// Every node ever created, in creation order, purely to control release order at `drain`.
    creation_order: Vec<Arc<dyn FileInfoNode>>,
    registry_creation_order: Vec<Arc<RegistryNode>>,
}

pub struct NodeStore {
    inner: Mutex<Inner>,
    drained: std::sync::atomic::AtomicBool,
}

impl NodeStore {
    pub fn new() -> Arc<NodeStore> {
        Arc::new(NodeStore {
            inner: Mutex::new(Inner::default()),
            drained: std::sync::atomic::AtomicBool::new(false),
        })
    }

    /// Returns the existing `FileExistsNode` for `path` if one was already created, or creates
    /// and registers a new one. Multiple directives naming the same bare input path must share a
    /// single node.
    pub fn get_or_create_file_exists_node(
        &self,
        env: &Environment,
        path: &PathView,
    ) -> Arc<dyn FileInfoNode> {
        let mut inner = self.inner.lock();
        if let Some(existing) = inner.file_exists_nodes.get(path) {
            return existing.clone() as Arc<dyn FileInfoNode>;
        }
        let node = FileExistsNode::new(path.clone(), env.mtime.clone());
        inner.file_exists_nodes.insert(path.clone(), node.clone());
        inner.creation_order.push(node.clone() as Arc<dyn FileInfoNode>);
        node as Arc<dyn FileInfoNode>
    }

    /// Looks up a previously-registered output, whether it is a real output or the placeholder
    /// `FileExistsNode` synthesized because the path was referenced as an input before any
    /// directive declared it as an output.
    pub fn lookup_output(&self, path: &PathView) -> Option<FileInfoNodeOutput> {
        self.inner.lock().outputs.get(path).cloned()
    }

    /// Registers `path` as produced by `output` (index `index` of `node`'s ordered outputs).
    /// Always an error if `path` is already in the output map, distinguishing the two ways that
    /// can happen: the existing entry is the placeholder `FileExistsNode` synthesized because
    /// some earlier directive referenced `path` as an input before any directive declared it as
    /// an output (the declaration came too late to matter — every `FileInfoNodeOutput` resolved
    /// against the placeholder already points at it, not at this node), or the existing entry is
    /// a real output of a different directive naming the same path twice.
    pub fn register_output(
        &self,
        path: PathView,
        node: Arc<dyn FileInfoNode>,
        index: usize,
    ) -> Result<(), Error> {
        let mut inner = self.inner.lock();
        if let Some(existing) = inner.outputs.get(&path) {
            let is_placeholder = inner.file_exists_nodes.contains_key(&path)
                && Arc::ptr_eq(
                    &(existing.node.clone() as Arc<dyn FileInfoNode>),
                    &(inner.file_exists_nodes[&path].clone() as Arc<dyn FileInfoNode>),
                );
            return Err(if is_placeholder {
                Error::new(format!(
                    "path referenced as input before being declared as output: {}",
                    path.as_string()
                ))
            } else {
                Error::new(format!(
                    "output path specified more than once: {}",
                    path.as_string()
                ))
            });
        }
        inner.creation_order.push(node.clone());
        inner
            .outputs
            .insert(path, FileInfoNodeOutput::new(node, index));
        Ok(())
    }

    /// Resolves `path` to a `FileInfoNodeOutput`, creating a `FileExistsNode` placeholder if
    /// nothing has declared it as an output yet. Referencing a path as an input before it is
    /// declared as an output is legal as long as a later directive in the same registry, or a
    /// registry it includes, eventually declares it.
    pub fn resolve_input(&self, env: &Environment, path: &PathView) -> FileInfoNodeOutput {
        if let Some(output) = self.lookup_output(path) {
            return output;
        }
        let node = self.get_or_create_file_exists_node(env, path);
        FileInfoNodeOutput::new(node, 0)
    }

    pub fn get_or_create_registry_node(
        &self,
        canonical_path: &PathView,
        create: impl FnOnce() -> Arc<RegistryNode>,
    ) -> (Arc<RegistryNode>, bool) {
        let mut inner = self.inner.lock();
        if let Some(existing) = inner.registries.get(canonical_path) {
            return (existing.clone(), false);
        }
        let node = create();
        inner.registries.insert(canonical_path.clone(), node.clone());
        inner.registry_creation_order.push(node.clone());
        (node, true)
    }

    /// Releases every node this store is keeping alive, in reverse creation order. Before
    /// releasing anything, populates every registry node that was created (as an `inc` target, or
    /// the build root) but never actually awaited — e.g. an included registry whose outputs were
    /// never needed by a `build`/`sc` directive that ran. Loops because populating one registry
    /// can itself create more (an `inc` directive discovered only by processing a registry nobody
    /// had populated yet), re-snapshotting until a round adds no new registries.
    ///
    /// Explicit and async (rather than left to `Drop`) because awaiting those populate calls, and
    /// dropping a node's background consumer task cleanly, both need to `.await`, which `Drop`
    /// cannot do.
    pub async fn drain(self: &Arc<Self>, env: &Environment) {
        loop {
            let snapshot: Vec<Arc<RegistryNode>> =
                self.inner.lock().registry_creation_order.clone();
            let previous_size = snapshot.len();
            for node in snapshot {
                let _ = crate::registry_node::process_registry(node, env.clone(), self.clone(), Vec::new()).await;
            }
            if self.inner.lock().registry_creation_order.len() == previous_size {
                break;
            }
        }

        let (registries, nodes) = {
            let mut inner = self.inner.lock();
            (
                std::mem::take(&mut inner.registry_creation_order),
                std::mem::take(&mut inner.creation_order),
            )
        };
        for node in registries.into_iter().rev() {
            drop(node);
            tokio::task::yield_now().await;
        }
        for node in nodes.into_iter().rev() {
            drop(node);
            tokio::task::yield_now().await;
        }
        self.drained.store(true, std::sync::atomic::Ordering::Relaxed);
    }
}

impl Drop for NodeStore {
    fn drop(&mut self) {
        if !self.drained.load(std::sync::atomic::Ordering::Relaxed) {
            log::debug!("NodeStore dropped without calling drain(); releasing synchronously");
            let mut inner = self.inner.lock();
            while inner.registry_creation_order.pop().is_some() {}
            while inner.creation_order.pop().is_some() {}
        }
    }
}
