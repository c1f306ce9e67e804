// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     https://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Objective-C type encodings, as found in block signatures.

use std::iter::Peekable;
use std::str::CharIndices;

use snafu::Snafu;

use crate::errors::{DebugTrace, trace_error};
use crate::types::Type;

#[trace_error]
#[derive(Snafu, DebugTrace)]
#[snafu(module, visibility(pub), context(suffix(false)))]
pub enum Error {
    #[snafu(display("Encoding is empty"))]
    Empty,
    #[snafu(display("Encoding ends inside {what}"))]
    Truncated { what: &'static str },
    #[snafu(display("Unknown type code {code:?} at position {position}"))]
    UnknownCode { code: char, position: usize },
    #[snafu(display("{what} by value is not implemented"))]
    NotImplemented { what: &'static str },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Turns a signature string into the return type followed by the
/// parameter types.
pub trait TypeEncoding {
    fn translate(&self, encoding: &str) -> Result<Vec<Type>>;
}

/// The encoding emitted by clang for `@encode` and block signatures.
#[derive(Debug, Default, Clone, Copy)]
pub struct ObjcTypeEncoding;

type Chars<'a> = Peekable<CharIndices<'a>>;

fn expect_char(chars: &mut Chars, what: &'static str) -> Result<(usize, char)> {
    match chars.next() {
        Some(next) => Ok(next),
        None => error::Truncated { what }.fail(),
    }
}

/// Skips a bracketed aggregate whose opening bracket was consumed.
fn skip_aggregate(chars: &mut Chars, what: &'static str) -> Result<()> {
    let mut depth = 1;
    let mut quoted = false;
    while depth > 0 {
        let (_, c) = expect_char(chars, what)?;
        match c {
            '"' => quoted = !quoted,
            _ if quoted => {}
            '{' | '(' | '[' => depth += 1,
            '}' | ')' | ']' => depth -= 1,
            _ => {}
        }
    }
    Ok(())
}

fn skip_digits(chars: &mut Chars) {
    while chars.next_if(|(_, c)| c.is_ascii_digit()).is_some() {}
}

fn apply_const(ty: Type) -> Type {
    match ty {
        Type::Pointer(pointee) => Type::pointer(Type::konst(*pointee)),
        ty => Type::konst(ty),
    }
}

fn parse_pointee(chars: &mut Chars) -> Result<Type> {
    let Some(&(_, code)) = chars.peek() else {
        return error::Truncated { what: "pointer" }.fail();
    };
    match code {
        '{' | '(' | '[' => {}
        '?' => {
            chars.next();
            return Ok(Type::Void);
        }
        _ => {
            return match parse_type(chars) {
                Ok(ty) => Ok(ty),
                Err(Error::NotImplemented { .. }) => Ok(Type::Void),
                Err(e) => Err(e),
            };
        }
    }
    chars.next();
    skip_aggregate(chars, "pointee")?;
    Ok(Type::Void)
}

fn parse_type(chars: &mut Chars) -> Result<Type> {
    let (position, code) = expect_char(chars, "type")?;
    let ty = match code {
        'r' => apply_const(parse_type(chars)?),
        'n' | 'N' | 'o' | 'O' | 'R' | 'V' | 'A' | 'j' => parse_type(chars)?,
        'c' => Type::Char,
        'i' | 'l' => Type::int(4),
        's' => Type::int(2),
        'q' => Type::int(8),
        'C' => Type::uint(1),
        'I' | 'L' => Type::uint(4),
        'S' => Type::uint(2),
        'Q' => Type::uint(8),
        'f' => Type::Float,
        'd' => Type::Double,
        'B' => Type::Bool,
        'v' => Type::Void,
        '*' => Type::pointer(Type::Char),
        '#' => Type::class(),
        ':' => Type::sel(),
        '@' => {
            match chars.peek() {
                Some((_, '?')) => {
                    chars.next();
                }
                Some((_, '"')) => {
                    chars.next();
                    loop {
                        let (_, c) = expect_char(chars, "class name")?;
                        if c == '"' {
                            break;
                        }
                    }
                }
                _ => {}
            }
            Type::id()
        }
        '^' => Type::pointer(parse_pointee(chars)?),
        '{' => return error::NotImplemented { what: "Struct" }.fail(),
        '(' => return error::NotImplemented { what: "Union" }.fail(),
        '[' => return error::NotImplemented { what: "Array" }.fail(),
        'b' => return error::NotImplemented { what: "Bitfield" }.fail(),
        'D' => return error::NotImplemented { what: "Long double" }.fail(),
        code => return error::UnknownCode { code, position }.fail(),
    };
    Ok(ty)
}

impl TypeEncoding for ObjcTypeEncoding {
    fn translate(&self, encoding: &str) -> Result<Vec<Type>> {
        let mut chars = encoding.char_indices().peekable();
        let mut types = Vec::new();
        while chars.peek().is_some() {
            types.push(parse_type(&mut chars)?);
            skip_digits(&mut chars);
        }
        if types.is_empty() {
            return error::Empty.fail();
        }
        Ok(types)
    }
}

#[cfg(test)]
#[path = "encoding_test.rs"]
mod tests;
