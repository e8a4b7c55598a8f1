//! MBOX message splitting.
//!
//! Works over an in-memory (usually memory-mapped) buffer and returns the
//! byte span of every message. Tolerant of:
//!
//! - Mixed `\n` and `\r\n` line endings
//! - Truncated messages at EOF
//! - NUL bytes and other binary content in the body
//! - UTF-8 BOM at the start of the file

use std::ops::Range;

use tracing::warn;

/// Byte spans of the messages in an MBOX buffer, `From ` line included.
///
/// A `From ` line starts a new message only at the top of the buffer or
/// after a blank line; anywhere else it is body text.
pub fn split_messages(data: &[u8]) -> Vec<Range<usize>> {
    let mut spans = Vec::new();
    let mut start: Option<usize> = None;
    let mut offset = 0;
    let mut prev_line_was_empty = true;

    while offset < data.len() {
        let line_end = memchr_newline(&data[offset..])
            .map(|pos| offset + pos + 1)
            .unwrap_or(data.len());
        let line = &data[offset..line_end];

        if is_mbox_separator(line) {
            if prev_line_was_empty {
                if let Some(s) = start {
                    spans.push(s..offset);
                }
                start = Some(offset);
            } else {
                warn!(
                    offset = offset,
                    "Found 'From ' separator without preceding blank line, keeping it as body text"
                );
            }
        } else if start.is_none() && !is_blank_line(line) {
            warn!(offset = offset, "Content before the first 'From ' separator ignored");
        }

        prev_line_was_empty = is_blank_line(line);
        offset = line_end;
    }

    if let Some(s) = start {
        spans.push(s..data.len());
    }
    spans
}

/// Fast newline search (equivalent to memchr for `\n`).
#[inline]
fn memchr_newline(buf: &[u8]) -> Option<usize> {
    buf.iter().position(|&b| b == b'\n')
}

/// Check whether a line is an MBOX separator (`From ` at the start).
fn is_mbox_separator(line: &[u8]) -> bool {
    let line = line.strip_prefix(&[0xEF, 0xBB, 0xBF]).unwrap_or(line);
    line.starts_with(b"From ")
}

/// Check whether a line is blank (empty or only whitespace / CR / LF).
fn is_blank_line(line: &[u8]) -> bool {
    line.iter()
        .all(|&b| b == b'\n' || b == b'\r' || b == b' ' || b == b'\t')
}
