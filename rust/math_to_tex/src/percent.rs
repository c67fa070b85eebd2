use crate::error::{MathError, Result};
use lazy_static::lazy_static;
use std::collections::HashMap;

const HEX_DIGITS: &[u8] = b"0123456789ABCDEFabcdef";

lazy_static! {
    // Every two-character hex pair (either case) to its byte value.
    static ref HEX_TO_BYTE: HashMap<[u8; 2], u8> = {
        let mut table = HashMap::with_capacity(HEX_DIGITS.len() * HEX_DIGITS.len());
        for &hi in HEX_DIGITS {
            for &lo in HEX_DIGITS {
                table.insert([hi, lo], (hex_value(hi) << 4) | hex_value(lo));
            }
        }
        table
    };
}

fn hex_value(c: u8) -> u8 {
    match c {
        b'0'..=b'9' => c - b'0',
        b'a'..=b'f' => c - b'a' + 10,
        _ => c - b'A' + 10,
    }
}

/// `abc%20def` -> `b"abc def"`. Escapes that are not two hex digits are kept as-is.
pub fn unquote_to_bytes(input: &[u8]) -> Vec<u8> {
    let mut bits = input.split(|&b| b == b'%');
    let Some(first) = bits.next() else {
        return Vec::new();
    };
    let mut out = Vec::with_capacity(input.len());
    out.extend_from_slice(first);
    for item in bits {
        match item.get(..2).and_then(|pair| HEX_TO_BYTE.get(pair)) {
            Some(&byte) => {
                out.push(byte);
                out.extend_from_slice(&item[2..]);
            }
            None => {
                out.push(b'%');
                out.extend_from_slice(item);
            }
        }
    }
    out
}

/// Bytes in, text out. Undecodable UTF-8 becomes U+FFFD.
pub fn unquote_bytes(input: &[u8]) -> String {
    String::from_utf8_lossy(&unquote_to_bytes(input)).into_owned()
}

/// Decodes `%xx` escapes, replacing undecodable UTF-8 with U+FFFD.
pub fn unquote(input: &str) -> String {
    if !input.contains('%') {
        return input.to_string();
    }
    let mut out = String::with_capacity(input.len());
    for (run, ascii) in ascii_runs(input) {
        if ascii {
            out.push_str(&unquote_bytes(run.as_bytes()));
        } else {
            out.push_str(run);
        }
    }
    out
}

/// Like [`unquote`], but fails when the decoded bytes are not valid UTF-8.
pub fn unquote_strict(input: &str) -> Result<String> {
    if !input.contains('%') {
        return Ok(input.to_string());
    }
    let mut out = String::with_capacity(input.len());
    for (run, ascii) in ascii_runs(input) {
        if ascii {
            let bytes = unquote_to_bytes(run.as_bytes());
            let text = String::from_utf8(bytes)
                .map_err(|e| MathError::Decode(format!("invalid utf-8 in {run:?}: {e}")))?;
            out.push_str(&text);
        } else {
            out.push_str(run);
        }
    }
    Ok(out)
}

// Literal non-ASCII characters are passed through untouched; only ASCII runs carry escapes.
fn ascii_runs(s: &str) -> Vec<(&str, bool)> {
    let mut runs = Vec::new();
    let mut start = 0;
    let mut current: Option<bool> = None;
    for (i, ch) in s.char_indices() {
        let ascii = ch.is_ascii();
        match current {
            Some(c) if c == ascii => {}
            Some(c) => {
                runs.push((&s[start..i], c));
                start = i;
                current = Some(ascii);
            }
            None => current = Some(ascii),
        }
    }
    if let Some(c) = current {
        runs.push((&s[start..], c));
    }
    runs
}
