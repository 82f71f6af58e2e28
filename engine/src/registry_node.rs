// Copyright 2026 Respire project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

//! One registry file's identity and one-time processing. A registry is read, tokenized, parsed
//! and acted on exactly once no matter how many `inc` directives reference it;
//! `tokio::sync::OnceCell` gives that single-flight-initialization guarantee directly.
//!
//! Cycle detection walks the chain of registries currently being processed — threaded through as
//! a plain `Vec<PathView>` parameter rather than a persistent `parent` field on the node itself,
//! since the same registry can legitimately be reached through two different, non-cyclic include
//! chains (a diamond), and a stored parent pointer would only ever remember one of them.

use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::sync::OnceCell;

use crate::activity_log::RegistryNodeLog;
use crate::environment::Environment;
use crate::error::Error;
use crate::node_store::NodeStore;
use crate::path::PathView;
use crate::registry_processor::process_registry_file;

pub struct RegistryNode {
    path: PathView,
    log: Option<RegistryNodeLog>,
    once: OnceCell<Result<(), Error>>,
}

impl RegistryNode {
    pub fn new(path: PathView, log: Option<RegistryNodeLog>) -> Arc<RegistryNode> {
        Arc::new(RegistryNode {
            path,
            log,
            once: OnceCell::new(),
        })
    }

    pub fn path(&self) -> &PathView {
        &self.path
    }
}

/// Processes `node` (its file contents, parsed directives and their side effects on `store`)
/// exactly once, returning a cycle error immediately — without touching the node's `OnceCell` —
/// if `node`'s own path already appears in `parent_chain`.
pub fn process_registry(
    node: Arc<RegistryNode>,
    env: Environment,
    store: Arc<NodeStore>,
    parent_chain: Vec<PathView>,
) -> BoxFuture<'static, Result<(), Error>> {
    if let Some(start) = parent_chain.iter().position(|p| *p == node.path) {
        return futures::future::ready(Err(Error::new(cyclic_dependency_message(
            &node.path,
            &parent_chain[start..],
        ))))
        .boxed();
    }

    let mut child_chain = parent_chain;
    child_chain.push(node.path.clone());

    async move {
        node.once
            .get_or_init(|| async {
                if let Some(log) = &node.log {
                    log.signal_start_dependency_scan();
                }

                // The registry file is itself an input: confirm it exists (sharing the same
                // `FileExistsNode` dedup map every other input path goes through) before spending
                // any effort parsing it.
                let input = store.get_or_create_file_exists_node(&env, &node.path);
                let input_output = input.get_file_info(false).await;
                if let Some(error) = input_output.error() {
                    if let Some(log) = &node.log {
                        log.signal_processing_complete(Some(error.clone()));
                    }
                    return Err(error.clone());
                }

                if let Some(log) = &node.log {
                    log.signal_parsing_starting();
                }
                let result = process_registry_file(&node.path, &env, &store, child_chain).await;
                if let Some(log) = &node.log {
                    log.signal_processing_complete(result.as_ref().err().cloned());
                }
                result
            })
            .await
            .clone()
    }
    .boxed()
}

/// Builds the same cyclic-dependency trace the original's `GenerateCyclicDependencyErrorMessage`
/// does: the chain of registries from the one that already includes `node_path` (inclusive) back
/// down to `node_path` itself, joined by `->`, closing the loop by repeating `node_path` at the
/// end.
fn cyclic_dependency_message(node_path: &PathView, chain_from_cycle_start: &[PathView]) -> String {
    let mut message = String::from("Cyclic dependency detected:\n");
    for path in chain_from_cycle_start {
        message.push_str(&path.as_string());
        message.push_str("\n->\n");
    }
    message.push_str(&node_path.as_string());
    message.push('\n');
    message
}
