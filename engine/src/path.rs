// Copyright 2026 Respire project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

//! An immutable view into UTF-8 path bytes, stored exactly as they appeared between the
//! quotes of a JSON string token: escape sequences (`\\`, `\"`) are not decoded on construction.
//! Equality and hashing therefore operate on the raw, still-escaped byte view, matching how the
//! registry file's own bytes are compared by the node store's maps.
//!
//! Backing storage is an `Arc<[u8]>` rather than a borrowed slice into an arena. A borrowed view
//! tied to a registry node's resident file buffer would have to be threaded through
//! `Send + 'static` async tasks with a lifetime the borrow checker cannot express without unsafe
//! lifetime extension. `Arc<[u8]>` gets the "lives exactly as long as something references it"
//! property from the ownership model directly, at the cost of one refcounted allocation per
//! distinct path string instead of zero.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Clone, Eq)]
pub struct PathView(Arc<[u8]>);

impl PathView {
    /// Wraps a byte slice exactly as it appeared in the registry file's JSON, escape sequences
    /// included.
    pub fn from_escaped_bytes(bytes: &[u8]) -> PathView {
        PathView(Arc::from(bytes))
    }

    /// Wraps an already-decoded string (e.g. one line from a deps file) by re-escaping only the
    /// two characters the tokenizer itself would have required escaped, so that every `PathView`
    /// in the store is comparable on the same "escaped form" basis regardless of its origin.
    pub fn from_literal(literal: &str) -> PathView {
        let mut escaped = Vec::with_capacity(literal.len());
        for &b in literal.as_bytes() {
            if b == b'\\' || b == b'"' {
                escaped.push(b'\\');
            }
            escaped.push(b);
        }
        PathView(Arc::from(escaped.as_slice()))
    }

    pub fn escaped_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Decodes the `\\` and `\"` escapes back into their literal bytes. Any other backslash
    /// escape cannot occur here: the tokenizer that produced this view would already have
    /// signalled `InvalidToken` for it.
    pub fn as_string(&self) -> String {
        let mut out = Vec::with_capacity(self.0.len());
        let mut bytes = self.0.iter().copied();
        while let Some(b) = bytes.next() {
            if b == b'\\' {
                if let Some(escaped) = bytes.next() {
                    out.push(escaped);
                }
            } else {
                out.push(b);
            }
        }
        // Escaping only ever removes a leading `\` (itself ASCII), which cannot turn valid UTF-8
        // into invalid UTF-8: every multi-byte sequence is left untouched.
        String::from_utf8(out).expect("path bytes are valid UTF-8")
    }

    pub fn as_path(&self) -> PathBuf {
        PathBuf::from(self.as_string())
    }
}

impl PartialEq for PathView {
    fn eq(&self, other: &Self) -> bool {
        *self.0 == *other.0
    }
}

impl Hash for PathView {
    fn hash<H: Hasher>(&self, state: &mut H) {
        (*self.0).hash(state);
    }
}

impl fmt::Debug for PathView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PathView({:?})", self.as_string())
    }
}

impl fmt::Display for PathView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_string())
    }
}
