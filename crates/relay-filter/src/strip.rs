//! Header and footer stripping
//!
//! A header pattern removes matching lines from the leading block of the
//! message; a footer pattern mirrors that at the end. Only whole lines are
//! removed and scanning stops at the first non-matching content line, so a
//! pattern can never reach into the body of a multi-line message. Blank lines
//! do not stop the scan; blanks left orphaned at the stripped edge are
//! removed with the header/footer they belonged to.

use regex::Regex;

use crate::entities::Edit;

/// Which edge of the message a pattern applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Edge {
    Leading,
    Trailing,
}

/// Compute line-removal edits for a header or footer pattern
///
/// Returns an empty list when nothing matches, or when the pattern would eat
/// every content line: a pattern that swallows the whole message leaves it
/// untouched.
pub(crate) fn strip_edge(text: &str, re: &Regex, edge: Edge) -> Vec<Edit> {
    if text.is_empty() {
        return Vec::new();
    }

    let spans = line_spans(text);
    let n = spans.len();
    let mut removed = vec![false; n];

    let indices: Vec<usize> = match edge {
        Edge::Leading => (0..n).collect(),
        Edge::Trailing => (0..n).rev().collect(),
    };

    let mut any = false;
    for &i in &indices {
        let line = &text[spans[i].0..spans[i].1];
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if matches_line(re, trimmed) {
            removed[i] = true;
            any = true;
        } else {
            break;
        }
    }

    if !any {
        return Vec::new();
    }
    if removed.iter().zip(&spans).all(|(r, s)| *r || text[s.0..s.1].trim().is_empty()) {
        return Vec::new();
    }

    // Blanks orphaned at the stripped edge go with the stripped lines.
    for &i in &indices {
        if removed[i] {
            continue;
        }
        if text[spans[i].0..spans[i].1].trim().is_empty() {
            removed[i] = true;
        } else {
            break;
        }
    }

    removal_edits(text, &spans, &removed)
}

/// Anchored match: the pattern must match from the first character
fn matches_line(re: &Regex, line: &str) -> bool {
    re.find(line).is_some_and(|m| m.start() == 0)
}

/// Byte spans of each line, exclusive of the terminating newline
fn line_spans(text: &str) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    let mut start = 0;
    for (i, b) in text.bytes().enumerate() {
        if b == b'\n' {
            spans.push((start, i));
            start = i + 1;
        }
    }
    spans.push((start, text.len()));
    spans
}

/// Turn a removed-line mask into coalesced byte-range edits
///
/// Each removed line takes its trailing newline with it; the final line has
/// none, so it takes the preceding one instead.
fn removal_edits(text: &str, spans: &[(usize, usize)], removed: &[bool]) -> Vec<Edit> {
    let mut ranges: Vec<(usize, usize)> = Vec::new();
    for (i, &(start, end)) in spans.iter().enumerate() {
        if !removed[i] {
            continue;
        }
        let range = if end < text.len() {
            (start, end + 1)
        } else if start > 0 {
            (start - 1, end)
        } else {
            (start, end)
        };
        match ranges.last_mut() {
            Some(last) if range.0 <= last.1 => last.1 = last.1.max(range.1),
            _ => ranges.push(range),
        }
    }

    ranges
        .into_iter()
        .filter(|(s, e)| e > s)
        .map(|(s, e)| Edit::remove(s, e))
        .collect()
}
