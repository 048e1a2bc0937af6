//! Field tokenization with CSV-style quoting and lenient legacy numerics
//!
//! WMAP record lines use CSV quoting semantics: a `"`-quoted field hides the
//! delimiter, two consecutive quotes inside a quoted field collapse to one
//! literal quote, and a field whose closing quote has not been seen yet
//! spans onto the following physical lines.

use std::io::{self, BufRead};

use crate::line::LineReader;

/// Splits one logical line into fields.
///
/// An empty input yields zero fields; `a,b,` yields three (`a`, `b`, ``).
pub fn split_fields(line: &str, delimiter: char) -> Vec<String> {
    let mut fields = Vec::new();
    let mut chars = line.chars().peekable();

    while chars.peek().is_some() {
        let mut token = String::new();
        let mut in_string = false;
        let mut ended_with_delimiter = false;

        while let Some(c) = chars.next() {
            if !in_string && c == delimiter {
                ended_with_delimiter = true;
                break;
            }
            if c == '"' {
                if !in_string || chars.peek() != Some(&'"') {
                    in_string = !in_string;
                    continue;
                }
                // doubled quotes in a string resolve to one quote
                chars.next();
            }
            token.push(c);
        }

        fields.push(token);

        // A trailing delimiter means a final empty field that the outer
        // loop would otherwise never see.
        if ended_with_delimiter && chars.peek().is_none() {
            fields.push(String::new());
        }
    }

    fields
}

/// Reads one logical line from `reader` and returns it split into fields.
///
/// Returns `Ok(None)` at end of stream, distinguishable from a zero-field
/// (empty) line, which is `Ok(Some(vec![]))`.
///
/// With a tab delimiter and `honour_strings` false the line is split on
/// tabs with no quote semantics at all, a fast path kept for malformed
/// legacy inputs with unbalanced quotes.
///
/// Otherwise, while the number of unescaped quotes seen so far is odd, the
/// field is still open: further physical lines are pulled and joined with a
/// newline before the split.
pub fn read_parse_line<R: BufRead>(
    reader: &mut LineReader<R>,
    delimiter: char,
    honour_strings: bool,
) -> io::Result<Option<Vec<String>>> {
    let Some(line) = reader.read_line()? else {
        return Ok(None);
    };

    if delimiter == '\t' && !honour_strings {
        return Ok(Some(line.split('\t').map(str::to_owned).collect()));
    }

    // No quote anywhere: simple case.
    if memchr::memchr(b'"', line.as_bytes()).is_none() {
        return Ok(Some(split_fields(&line, delimiter)));
    }

    let mut work = line;
    while unescaped_quote_count(&work) % 2 != 0 {
        let Some(next) = reader.read_line()? else {
            break;
        };
        work.push('\n'); // lost by the line reader, part of the field
        work.push_str(&next);
    }

    Ok(Some(split_fields(&work, delimiter)))
}

fn unescaped_quote_count(s: &str) -> usize {
    let bytes = s.as_bytes();
    let mut count = 0;
    for i in 0..bytes.len() {
        if bytes[i] == b'"' && (i == 0 || bytes[i - 1] != b'\\') {
            count += 1;
        }
    }
    count
}

/// `atoi`-style integer parse: leading whitespace skipped, optional sign,
/// then the longest digit run; anything else yields 0.
#[inline]
pub fn parse_int_lenient(s: &str) -> i64 {
    let bytes = s.trim_start().as_bytes();
    let mut i = 0;
    let mut negative = false;
    if let Some(&b) = bytes.first() {
        if b == b'+' || b == b'-' {
            negative = b == b'-';
            i = 1;
        }
    }
    let mut value: i64 = 0;
    while i < bytes.len() && bytes[i].is_ascii_digit() {
        value = value
            .saturating_mul(10)
            .saturating_add(i64::from(bytes[i] - b'0'));
        i += 1;
    }
    if negative {
        -value
    } else {
        value
    }
}

/// `atof`-style float parse: the longest valid prefix, 0.0 on failure.
#[inline]
pub fn parse_float_lenient(s: &str) -> f64 {
    fast_float::parse_partial::<f64, _>(s.trim_start())
        .map(|(value, _)| value)
        .unwrap_or(0.0)
}
