//! Mention removal
//!
//! Strips platform `@handle` tokens (handles are 3-32 word characters).
//! Parenthesised forms go with their parentheses, comma-flanked forms take
//! the orphaned connective punctuation with them, and email-like occurrences
//! (an `@` attached to a preceding letter, digit or period) are left alone.
//! The cleanup that follows runs only on lines a mention was removed from and
//! never crosses a line break, so surrounding multi-line formatting survives
//! byte for byte.

use std::collections::BTreeSet;

use once_cell::sync::Lazy;
use regex::Regex;

use relay_protocol::Entity;

use crate::entities::{apply_edits, apply_to_text, Edit};
use crate::words::PatternCache;

/// `(@handle)` including the parentheses
static PAREN_MENTION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\([ \t]*@[A-Za-z0-9_]{3,32}[ \t]*\)").unwrap());

/// Bare `@handle` (boundary checks happen in code; the regex crate has no
/// lookbehind)
static MENTION: Lazy<Regex> = Lazy::new(|| Regex::new(r"@[A-Za-z0-9_]{3,32}").unwrap());

static DOUBLE_COMMA: Lazy<Regex> = Lazy::new(|| Regex::new(r",[ \t]*,").unwrap());
static SPACE_BEFORE_PUNCT: Lazy<Regex> = Lazy::new(|| Regex::new(r"[ \t]+[,.;:!?]").unwrap());
static LEADING_COMMA: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[ \t]*,[ \t]*").unwrap());
static TRAILING_COMMA: Lazy<Regex> = Lazy::new(|| Regex::new(r"[ \t]*,[ \t]*$").unwrap());
static SPACE_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"[ \t]{2,}").unwrap());
static EDGE_SPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[ \t]+|[ \t]+$").unwrap());

/// Remove mentions from `text`, re-indexing `entities` as the text shrinks
///
/// Returns the rewritten text, the surviving entities, and whether anything
/// was removed.
pub(crate) fn remove_mentions(
    text: &str,
    entities: Vec<Entity>,
    placeholder: &str,
    cache: &PatternCache,
) -> (String, Vec<Entity>, bool) {
    let mut state = State {
        text: text.to_string(),
        entities,
    };

    // Line indices stay valid across every pass: nothing below inserts or
    // removes a newline.
    let mut affected: BTreeSet<usize> = BTreeSet::new();

    let paren_edits: Vec<(Edit, String)> = PAREN_MENTION
        .find_iter(&state.text)
        .map(|m| (Edit::remove(m.start(), m.end()), String::new()))
        .collect();
    mark_affected(&state.text, &paren_edits, &mut affected);
    state.apply(paren_edits);

    let mention_edits: Vec<(Edit, String)> = MENTION
        .find_iter(&state.text)
        .filter(|m| is_standalone(&state.text, m.start(), m.end()))
        .map(|m| {
            (
                Edit::replace(m.start(), m.end(), placeholder.len()),
                placeholder.to_string(),
            )
        })
        .collect();
    mark_affected(&state.text, &mention_edits, &mut affected);
    state.apply(mention_edits);

    if affected.is_empty() {
        return (state.text, state.entities, false);
    }

    if !placeholder.is_empty() {
        if let Some(re) = cache.user_pattern(&format!(
            "{p}(?:[ \\t]*{p})+",
            p = regex::escape(placeholder)
        )) {
            state.apply_lines(&affected, |line| replace_matches(line, &re, placeholder));
        }
    }

    // Triple-or-more commas need a second look after each collapse.
    for _ in 0..3 {
        let edits = state.collect_lines(&affected, |line| replace_matches(line, &DOUBLE_COMMA, ", "));
        if edits.is_empty() {
            break;
        }
        state.apply(edits);
    }

    state.apply_lines(&affected, strip_space_before_punct);
    state.apply_lines(&affected, |line| replace_matches(line, &LEADING_COMMA, ""));
    state.apply_lines(&affected, |line| replace_matches(line, &TRAILING_COMMA, ""));
    state.apply_lines(&affected, |line| replace_matches(line, &SPACE_RUN, " "));
    state.apply_lines(&affected, |line| replace_matches(line, &EDGE_SPACE, ""));

    (state.text, state.entities, true)
}

struct State {
    text: String,
    entities: Vec<Entity>,
}

impl State {
    fn apply(&mut self, edits: Vec<(Edit, String)>) {
        if edits.is_empty() {
            return;
        }
        let (edits, replacements): (Vec<Edit>, Vec<String>) = edits.into_iter().unzip();
        let refs: Vec<&str> = replacements.iter().map(String::as_str).collect();
        self.text = apply_to_text(&self.text, &edits, &refs);
        self.entities = apply_edits(&self.entities, &edits);
    }

    /// Run a line-local edit collector over the affected lines and apply
    fn apply_lines<F>(&mut self, affected: &BTreeSet<usize>, collect: F)
    where
        F: Fn(&str) -> Vec<(Edit, String)>,
    {
        let edits = self.collect_lines(affected, collect);
        self.apply(edits);
    }

    fn collect_lines<F>(&self, affected: &BTreeSet<usize>, collect: F) -> Vec<(Edit, String)>
    where
        F: Fn(&str) -> Vec<(Edit, String)>,
    {
        let spans = line_spans(&self.text);
        let mut edits = Vec::new();
        for &li in affected {
            let Some(&(start, end)) = spans.get(li) else {
                continue;
            };
            for (edit, repl) in collect(&self.text[start..end]) {
                edits.push((
                    Edit {
                        start: edit.start + start,
                        end: edit.end + start,
                        replacement_len: edit.replacement_len,
                    },
                    repl,
                ));
            }
        }
        edits
    }
}

/// A mention is standalone when nothing word-like touches either side
///
/// The preceding-character rule preserves email-like text: `user@example` has
/// a letter before the `@`, so it stays.
fn is_standalone(text: &str, start: usize, end: usize) -> bool {
    if text[end..]
        .chars()
        .next()
        .is_some_and(|c| c.is_alphanumeric() || c == '_')
    {
        return false;
    }
    match text[..start].chars().next_back() {
        Some(c) if c.is_alphanumeric() || c == '.' || c == '_' => false,
        _ => true,
    }
}

fn replace_matches(line: &str, re: &Regex, replacement: &str) -> Vec<(Edit, String)> {
    re.find_iter(line)
        .filter(|m| line[m.range()] != *replacement)
        .map(|m| {
            (
                Edit::replace(m.start(), m.end(), replacement.len()),
                replacement.to_string(),
            )
        })
        .collect()
}

/// Remove whitespace runs that ended up directly before punctuation
fn strip_space_before_punct(line: &str) -> Vec<(Edit, String)> {
    SPACE_BEFORE_PUNCT
        .find_iter(line)
        .map(|m| {
            // Keep the punctuation character itself
            let punct_len = line[m.range()]
                .chars()
                .next_back()
                .map(char::len_utf8)
                .unwrap_or(1);
            (Edit::remove(m.start(), m.end() - punct_len), String::new())
        })
        .collect()
}

fn mark_affected(text: &str, edits: &[(Edit, String)], affected: &mut BTreeSet<usize>) {
    if edits.is_empty() {
        return;
    }
    let spans = line_spans(text);
    for (edit, _) in edits {
        for (li, &(start, end)) in spans.iter().enumerate() {
            if edit.start <= end && edit.end >= start {
                affected.insert(li);
            }
        }
    }
}

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
