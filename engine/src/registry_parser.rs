// Copyright 2026 Respire project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

//! The registry file grammar: a top-level list of single-key objects, each naming one `inc`, `sc`
//! or `build` directive. Built directly on top of the already-tokenized stream `json::tokenize_all`
//! produces, since registry files are read fully into memory before parsing begins.
//!
//! `ParseError` is a closed enum, not the crate's general string `Error`: the grammar itself never
//! surfaces any of these variants to a build's output, it only ever reports the fixed `"Parser
//! error."` string once a parse fails (folded in by `registry_processor`, matching the detail the
//! original registry parser actually exposed across its process boundary). Keeping the variants
//! distinct here is only useful for whoever is debugging the parser itself.

use crate::json::Token;
use crate::path::PathView;
use crate::system_command::SystemCommandParams;

#[derive(Clone, Debug)]
pub enum Directive {
    Include(PathView),
    SystemCommand(SystemCommandParams),
    Build(PathView),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParseError {
    /// A token appeared where the grammar didn't allow it (including running out of tokens).
    UnexpectedToken,
    /// A directive object's key, or a system-command object's field name, isn't one the grammar
    /// recognises.
    InvalidDirectiveName,
    /// The same field name appeared twice in one system-command object.
    MultiplyDefinedKey,
    /// A system-command object closed without every required field (`cmd`, `in`, `out`) present.
    DidNotFindAllExpectedKeys,
}

pub fn parse_registry(tokens: &[Token]) -> Result<Vec<Directive>, ParseError> {
    let mut cursor = Cursor { tokens, pos: 0 };
    cursor.expect(Token::StartList)?;
    let mut directives = Vec::new();
    loop {
        match cursor.peek() {
            Some(Token::EndList) => {
                cursor.pos += 1;
                break;
            }
            Some(Token::StartObject) => parse_directive(&mut cursor, &mut directives)?,
            _ => return Err(ParseError::UnexpectedToken),
        }
    }
    if cursor.pos != cursor.tokens.len() {
        return Err(ParseError::UnexpectedToken);
    }
    Ok(directives)
}

struct Cursor<'a> {
    tokens: &'a [Token],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn peek(&self) -> Option<&'a Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<&'a Token> {
        let token = self.tokens.get(self.pos);
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn expect(&mut self, expected: Token) -> Result<(), ParseError> {
        match self.next() {
            Some(token) if std::mem::discriminant(token) == std::mem::discriminant(&expected) => Ok(()),
            _ => Err(ParseError::UnexpectedToken),
        }
    }

    fn expect_str(&mut self) -> Result<PathView, ParseError> {
        match self.next() {
            Some(Token::Str(path)) => Ok(path.clone()),
            _ => Err(ParseError::UnexpectedToken),
        }
    }
}

/// A directive object has exactly one key (`inc`, `build`, or `sc`) whose value is always a
/// list: `inc` and `build` are lists of path strings, each contributing one
/// directive per path; `sc` is a list of system-command objects, each contributing one
/// `SystemCommand` directive. Pushes every directive the object yields onto `out`.
fn parse_directive(cursor: &mut Cursor, out: &mut Vec<Directive>) -> Result<(), ParseError> {
    cursor.expect(Token::StartObject)?;
    let key = cursor.expect_str()?;
    let key_str = key.as_string();
    match key_str.as_str() {
        "inc" => {
            for path in parse_path_list(cursor)? {
                out.push(Directive::Include(path));
            }
        }
        "build" => {
            for path in parse_path_list(cursor)? {
                out.push(Directive::Build(path));
            }
        }
        "sc" => {
            cursor.expect(Token::StartList)?;
            loop {
                match cursor.peek() {
                    Some(Token::EndList) => {
                        cursor.pos += 1;
                        break;
                    }
                    Some(Token::StartObject) => {
                        out.push(Directive::SystemCommand(parse_system_command(cursor)?));
                    }
                    _ => return Err(ParseError::UnexpectedToken),
                }
            }
        }
        _ => return Err(ParseError::InvalidDirectiveName),
    };
    cursor.expect(Token::EndObject)?;
    Ok(())
}

fn parse_path_list(cursor: &mut Cursor) -> Result<Vec<PathView>, ParseError> {
    cursor.expect(Token::StartList)?;
    let mut paths = Vec::new();
    loop {
        match cursor.peek() {
            Some(Token::EndList) => {
                cursor.pos += 1;
                break;
            }
            Some(Token::Str(_)) => paths.push(cursor.expect_str()?),
            _ => return Err(ParseError::UnexpectedToken),
        }
    }
    Ok(paths)
}

fn parse_system_command(cursor: &mut Cursor) -> Result<SystemCommandParams, ParseError> {
    cursor.expect(Token::StartObject)?;

    let mut command: Option<PathView> = None;
    let mut inputs: Option<Vec<PathView>> = None;
    let mut outputs: Option<Vec<PathView>> = None;
    let mut soft_outputs: Option<Vec<PathView>> = None;
    let mut deps_file: Option<PathView> = None;
    let mut stdout_file: Option<PathView> = None;
    let mut stderr_file: Option<PathView> = None;
    let mut stdin_file: Option<PathView> = None;

    loop {
        match cursor.peek() {
            Some(Token::EndObject) => {
                cursor.pos += 1;
                break;
            }
            Some(Token::Str(_)) => {
                let key = cursor.expect_str()?;
                let key_str = key.as_string();
                match key_str.as_str() {
                    "cmd" => set_once(&mut command, cursor.expect_str()?)?,
                    "in" => set_once(&mut inputs, parse_path_list(cursor)?)?,
                    "out" => set_once(&mut outputs, parse_path_list(cursor)?)?,
                    "soft_out" => set_once(&mut soft_outputs, parse_path_list(cursor)?)?,
                    "deps" => set_once(&mut deps_file, cursor.expect_str()?)?,
                    "stdout" => set_once(&mut stdout_file, cursor.expect_str()?)?,
                    "stderr" => set_once(&mut stderr_file, cursor.expect_str()?)?,
                    "stdin" => set_once(&mut stdin_file, cursor.expect_str()?)?,
                    _ => return Err(ParseError::InvalidDirectiveName),
                }
            }
            _ => return Err(ParseError::UnexpectedToken),
        }
    }

    Ok(SystemCommandParams {
        command: command.ok_or(ParseError::DidNotFindAllExpectedKeys)?,
        inputs: inputs.ok_or(ParseError::DidNotFindAllExpectedKeys)?,
        outputs: outputs.ok_or(ParseError::DidNotFindAllExpectedKeys)?,
        soft_outputs: soft_outputs.unwrap_or_default(),
        deps_file,
        stdout_file,
        stderr_file,
        stdin_file,
    })
}

fn set_once<T>(slot: &mut Option<T>, value: T) -> Result<(), ParseError> {
    if slot.is_some() {
        return Err(ParseError::MultiplyDefinedKey);
    }
    *slot = Some(value);
    Ok(())
}
