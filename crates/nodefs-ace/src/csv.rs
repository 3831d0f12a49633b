//! Single-record CSV with a configurable separator.
//!
//! Quoting follows RFC 4180: a field is quoted when it contains the
//! separator, a double quote, CR or LF, or starts with whitespace. Embedded
//! quotes are doubled. Records end with `\n`.

use std::iter::Peekable;
use std::str::Chars;

use crate::{AceError, Result};

fn needs_quotes(field: &str, sep: char) -> bool {
    if field.is_empty() {
        return false;
    }
    if field == r"\." {
        return true;
    }
    if field.chars().any(|c| c == sep || c == '"' || c == '\r' || c == '\n') {
        return true;
    }
    field.chars().next().is_some_and(char::is_whitespace)
}

/// Render one newline-terminated record
pub(crate) fn write_record<S: AsRef<str>>(fields: &[S], sep: char) -> String {
    let mut out = String::new();
    for (i, field) in fields.iter().enumerate() {
        if i > 0 {
            out.push(sep);
        }
        let field = field.as_ref();
        if needs_quotes(field, sep) {
            out.push('"');
            out.push_str(&field.replace('"', "\"\""));
            out.push('"');
        } else {
            out.push_str(field);
        }
    }
    out.push('\n');
    out
}

/// How a field was terminated
enum End {
    Separator,
    Record,
}

/// Parse exactly one record. Blank lines around it are ignored.
pub(crate) fn read_record(input: &str, sep: char) -> Result<Vec<String>> {
    let trimmed = input.trim_start_matches(|c: char| c == '\r' || c == '\n');
    if trimmed.is_empty() {
        return Err(AceError::Malformed("empty ace record".to_string()));
    }

    let mut chars = trimmed.chars().peekable();
    let mut fields = Vec::new();
    loop {
        let (field, end) = if chars.peek() == Some(&'"') {
            chars.next();
            read_quoted(&mut chars, sep)?
        } else {
            read_bare(&mut chars, sep)?
        };
        fields.push(field);
        if let End::Record = end {
            break;
        }
    }

    if chars.any(|c| c != '\r' && c != '\n') {
        return Err(AceError::Malformed(
            "more than one row of ace kvs".to_string(),
        ));
    }
    Ok(fields)
}

fn read_bare(chars: &mut Peekable<Chars<'_>>, sep: char) -> Result<(String, End)> {
    let mut field = String::new();
    loop {
        match chars.next() {
            Some(c) if c == sep => return Ok((field, End::Separator)),
            None | Some('\n') => return Ok((field, End::Record)),
            Some('\r') if chars.peek() == Some(&'\n') => {
                chars.next();
                return Ok((field, End::Record));
            }
            Some('"') => {
                return Err(AceError::Malformed(
                    "bare \" in non-quoted field".to_string(),
                ))
            }
            Some(c) => field.push(c),
        }
    }
}

fn read_quoted(chars: &mut Peekable<Chars<'_>>, sep: char) -> Result<(String, End)> {
    let mut field = String::new();
    loop {
        match chars.next() {
            Some('"') if chars.peek() == Some(&'"') => {
                chars.next();
                field.push('"');
            }
            Some('"') => break,
            Some(c) => field.push(c),
            None => {
                return Err(AceError::Malformed(
                    "extraneous or missing \" in quoted field".to_string(),
                ))
            }
        }
    }

    match chars.next() {
        Some(c) if c == sep => Ok((field, End::Separator)),
        None | Some('\n') => Ok((field, End::Record)),
        Some('\r') if chars.peek() == Some(&'\n') => {
            chars.next();
            Ok((field, End::Record))
        }
        Some(c) => Err(AceError::Malformed(format!(
            "unexpected {c:?} after quoted field"
        ))),
    }
}
