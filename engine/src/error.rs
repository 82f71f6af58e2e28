// Copyright 2026 Respire project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

//! A single string-carrying error type, used everywhere the component design talks about an
//! `Error` or an `OptionalError`. None of the grounding crates (`async_value`, `task_executor`)
//! reach for `thiserror`/`anyhow`, and the system this crate implements never had a taxonomy of
//! distinct error *types* to begin with — every layer already formats a message and hands it
//! upward unchanged or wrapped in more text.

use std::fmt;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Error(String);

impl Error {
    pub fn new(message: impl Into<String>) -> Error {
        Error(message.into())
    }

    pub fn message(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for Error {}

impl From<String> for Error {
    fn from(message: String) -> Error {
        Error(message)
    }
}

impl From<&str> for Error {
    fn from(message: &str) -> Error {
        Error(message.to_string())
    }
}

pub type OptionalError = Option<Error>;
