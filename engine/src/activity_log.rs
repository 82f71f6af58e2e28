// Copyright 2026 Respire project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

//! The business-level activity log: a running narration of what the build graph is doing,
//! distinct from the diagnostics logging the `log` crate carries elsewhere in this crate.
//! Consumed by external tooling rather than by humans reading a terminal, so its wire format is a
//! contract: one JSON object per line, newline-terminated. Fields are always written in the same
//! order ending in a trailing `"d":"0"` sentinel, so every real field can unconditionally be
//! preceded by a comma without needing to track whether it's the last one.

use std::io::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;

use crate::error::{Error, OptionalError};
use crate::path::PathView;
use crate::system_command::SystemCommandParams;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum ActivityLogLevel {
    /// No activity log output at all.
    None,
    /// Only command executions and their completion are recorded.
    ProcessExecutionOnly,
    /// Every node creation, dependency scan, parse, command execution and completion is recorded.
    All,
}

pub struct ActivityLog {
    level: ActivityLogLevel,
    start: Instant,
    next_id: AtomicU64,
    writer: Mutex<Box<dyn Write + Send>>,
}

impl ActivityLog {
    pub fn new(level: ActivityLogLevel, writer: Box<dyn Write + Send>) -> Arc<ActivityLog> {
        Arc::new(ActivityLog {
            level,
            start: Instant::now(),
            next_id: AtomicU64::new(0),
            writer: Mutex::new(writer),
        })
    }

    pub fn disabled() -> Arc<ActivityLog> {
        ActivityLog::new(ActivityLogLevel::None, Box::new(std::io::sink()))
    }

    pub fn level(&self) -> ActivityLogLevel {
        self.level
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    fn elapsed_us(&self) -> u64 {
        self.start.elapsed().as_micros() as u64
    }

    fn write_record(&self, id: i64, event_type: &str, extra_fields: &str) {
        if self.level == ActivityLogLevel::None {
            return;
        }
        let mut writer = self.writer.lock();
        let _ = writeln!(
            writer,
            "{{\"id\":{},\"type\":\"{}\",\"time_us\":{}{},\"d\":\"0\"}}",
            id,
            event_type,
            self.elapsed_us(),
            extra_fields,
        );
    }

    pub fn new_file_process_node_log(
        self: &Arc<Self>,
        params: SystemCommandParams,
    ) -> Option<FileProcessNodeLog> {
        if self.level == ActivityLogLevel::None {
            return None;
        }
        Some(FileProcessNodeLog::new(self.clone(), params))
    }

    pub fn new_registry_node_log(self: &Arc<Self>, path: &PathView) -> Option<RegistryNodeLog> {
        if self.level == ActivityLogLevel::None {
            return None;
        }
        Some(RegistryNodeLog::new(self.clone(), path.clone()))
    }

    /// Appends a single top-level, non-node-scoped `SignalRespireError` record (id = -1). Called
    /// by the `respire` driver when the core build returns an error, not by anything inside this
    /// crate: the core only ever returns a `Result`, it never logs its own failure.
    pub fn signal_respire_error(&self, error: &Error) {
        let fields = format!(",\"error\":\"{}\"", json_escape(error.message()));
        self.write_record(-1, "SignalRespireError", &fields);
    }
}

fn json_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            _ => out.push(c),
        }
    }
    out
}

/// A path's already-escaped form (the tokenizer's restricted escape set is exactly the JSON
/// string escapes this log needs) dropped straight into a JSON string literal without re-escaping.
fn path_json(path: &PathView) -> String {
    String::from_utf8_lossy(path.escaped_bytes()).into_owned()
}

fn path_list_json(paths: &[PathView]) -> String {
    let mut out = String::from("[");
    for (i, path) in paths.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        out.push('"');
        out.push_str(&path_json(path));
        out.push('"');
    }
    out.push(']');
    out
}

/// Emits the `CreateSystemCommandNode` event the first time anything else needs this node's id
/// (or eagerly, at construction, when the log level is `All`): node ids are lazily assigned.
pub struct FileProcessNodeLog {
    log: Arc<ActivityLog>,
    params: SystemCommandParams,
    id: Mutex<Option<u64>>,
    running_command: Mutex<bool>,
}

impl FileProcessNodeLog {
    fn new(log: Arc<ActivityLog>, params: SystemCommandParams) -> FileProcessNodeLog {
        let node = FileProcessNodeLog {
            log,
            params,
            id: Mutex::new(None),
            running_command: Mutex::new(false),
        };
        if node.log.level() == ActivityLogLevel::All {
            node.ensure_created();
        }
        node
    }

    fn ensure_created(&self) -> u64 {
        let mut id_slot = self.id.lock();
        if let Some(id) = *id_slot {
            return id;
        }
        let id = self.log.next_id();
        *id_slot = Some(id);

        let mut fields = format!(",\"command\":\"{}\"", path_json(&self.params.command));
        fields.push_str(&format!(",\"inputs\":{}", path_list_json(&self.params.inputs)));
        fields.push_str(&format!(",\"outputs\":{}", path_list_json(&self.params.outputs)));
        fields.push_str(&format!(",\"soft_outs\":{}", path_list_json(&self.params.soft_outputs)));
        if let Some(deps) = &self.params.deps_file {
            fields.push_str(&format!(",\"deps\":\"{}\"", path_json(deps)));
        }
        if let Some(stdout) = &self.params.stdout_file {
            fields.push_str(&format!(",\"stdout\":\"{}\"", path_json(stdout)));
        }
        if let Some(stderr) = &self.params.stderr_file {
            fields.push_str(&format!(",\"stderr\":\"{}\"", path_json(stderr)));
        }
        if let Some(stdin) = &self.params.stdin_file {
            fields.push_str(&format!(",\"stdin\":\"{}\"", path_json(stdin)));
        }

        self.log.write_record(id as i64, "CreateSystemCommandNode", &fields);
        id
    }

    pub fn signal_start_dependency_scan(&self, dry_run: bool) {
        if self.log.level() != ActivityLogLevel::All {
            return;
        }
        let id = self.ensure_created();
        let fields = if dry_run { ",\"dry_run\":\"true\"".to_string() } else { String::new() };
        self.log.write_record(id as i64, "ScanningDependencies", &fields);
    }

    pub fn signal_start_running_command(&self, dry_run: bool) {
        if self.log.level() == ActivityLogLevel::None {
            return;
        }
        let id = self.ensure_created();
        *self.running_command.lock() = true;
        let fields = if dry_run { ",\"dry_run\":\"true\"".to_string() } else { String::new() };
        self.log.write_record(id as i64, "ExecutingCommand", &fields);
    }

    pub fn signal_processing_complete(&self, error: OptionalError, dry_run: bool) {
        let ran = *self.running_command.lock();
        if !ran && error.is_none() && self.log.level() != ActivityLogLevel::All {
            return;
        }
        let id = self.ensure_created();
        let mut fields = if dry_run { ",\"dry_run\":\"true\"".to_string() } else { String::new() };
        if let Some(e) = &error {
            fields.push_str(&format!(",\"error\":\"{}\"", json_escape(e.message())));
        }
        self.log.write_record(id as i64, "ProcessingComplete", &fields);
    }
}

/// Emits the `CreateRegistryNode` event on the same lazy/eager schedule as
/// `FileProcessNodeLog::ensure_created`.
pub struct RegistryNodeLog {
    log: Arc<ActivityLog>,
    path: PathView,
    id: Mutex<Option<u64>>,
}

impl RegistryNodeLog {
    fn new(log: Arc<ActivityLog>, path: PathView) -> RegistryNodeLog {
        let node = RegistryNodeLog { log, path, id: Mutex::new(None) };
        if node.log.level() == ActivityLogLevel::All {
            node.ensure_created();
        }
        node
    }

    fn ensure_created(&self) -> u64 {
        let mut id_slot = self.id.lock();
        if let Some(id) = *id_slot {
            return id;
        }
        let id = self.log.next_id();
        *id_slot = Some(id);
        let fields = format!(",\"path\":\"{}\"", path_json(&self.path));
        self.log.write_record(id as i64, "CreateRegistryNode", &fields);
        id
    }

    pub fn signal_start_dependency_scan(&self) {
        if self.log.level() != ActivityLogLevel::All {
            return;
        }
        let id = self.ensure_created();
        self.log.write_record(id as i64, "ScanningDependencies", "");
    }

    pub fn signal_parsing_starting(&self) {
        if self.log.level() != ActivityLogLevel::All {
            return;
        }
        let id = self.ensure_created();
        self.log.write_record(id as i64, "ParsingStarting", "");
    }

    pub fn signal_processing_complete(&self, error: OptionalError) {
        if error.is_none() && self.log.level() != ActivityLogLevel::All {
            return;
        }
        let id = self.ensure_created();
        let fields = match &error {
            Some(e) => format!(",\"error\":\"{}\"", json_escape(e.message())),
            None => String::new(),
        };
        self.log.write_record(id as i64, "ProcessingComplete", &fields);
    }
}
