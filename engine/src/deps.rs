// Copyright 2026 Respire project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

//! Parses a deps file: plain text, one path per line, LF- or CRLF-terminated, each
//! line naming one additional dependency of the command that declared `deps`. Deliberately not a
//! Makefile-style `.d` file with a target and `\`-continued rules — the registry format invented
//! here has no notion of a rule target, just a flat list of extra input paths, so there is
//! nothing to strip before the first colon and no line-continuation syntax to honor.
//!
//! A trailing, unterminated final line (no trailing newline) still counts as one more path, same
//! as every other line.

use crate::error::Error;
use crate::path::PathView;

pub fn parse_deps(contents: &[u8]) -> Result<Vec<PathView>, Error> {
    let text = std::str::from_utf8(contents).map_err(|_| Error::new("deps file is not valid UTF-8"))?;

    Ok(text
        .split('\n')
        .map(|line| line.strip_suffix('\r').unwrap_or(line))
        .filter(|line| !line.is_empty())
        .map(PathView::from_literal)
        .collect())
}
