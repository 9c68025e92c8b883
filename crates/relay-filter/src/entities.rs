//! Entity re-indexing
//!
//! Every text rewrite is expressed as a sorted list of non-overlapping
//! [`Edit`]s against the text it was computed from. Applying the edits to the
//! entity list keeps formatting ranges aligned with the surviving text:
//! an entity fully inside a removed region is dropped, one that straddles a
//! removal is clipped to its surviving portion.

use relay_protocol::Entity;

/// One byte-range rewrite: `[start, end)` replaced by `replacement_len` bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Edit {
    pub start: usize,
    pub end: usize,
    pub replacement_len: usize,
}

impl Edit {
    /// A pure removal
    pub fn remove(start: usize, end: usize) -> Self {
        Self {
            start,
            end,
            replacement_len: 0,
        }
    }

    pub fn replace(start: usize, end: usize, replacement_len: usize) -> Self {
        Self {
            start,
            end,
            replacement_len,
        }
    }
}

/// Map a byte position through a sorted, non-overlapping edit list
///
/// `is_end` selects the clipping direction for positions that fall inside an
/// edited region: end bounds clip backwards to the edit start, start bounds
/// clip forwards past the replacement.
fn map_pos(pos: usize, edits: &[Edit], is_end: bool) -> usize {
    let mut delta: isize = 0;
    for e in edits {
        if pos >= e.end {
            delta += e.replacement_len as isize - (e.end - e.start) as isize;
        } else if pos > e.start || (pos == e.start && !is_end) {
            let new_start = (e.start as isize + delta) as usize;
            return if is_end {
                new_start
            } else {
                new_start + e.replacement_len
            };
        } else {
            break;
        }
    }
    (pos as isize + delta) as usize
}

/// Re-index entities through an edit list
///
/// Entities whose whole range was rewritten come out empty and are dropped.
pub fn apply_edits(entities: &[Entity], edits: &[Edit]) -> Vec<Entity> {
    if edits.is_empty() {
        return entities.to_vec();
    }

    debug_assert!(
        edits.windows(2).all(|w| w[0].end <= w[1].start),
        "edits must be sorted and non-overlapping"
    );

    entities
        .iter()
        .filter_map(|entity| {
            let start = map_pos(entity.start, edits, false);
            let end = map_pos(entity.end, edits, true);
            (start < end).then(|| Entity {
                start,
                end,
                kind: entity.kind,
                attrs: entity.attrs.clone(),
            })
        })
        .collect()
}

/// Rebuild a string by applying an edit list with the given replacements
///
/// `replacements[i]` is spliced in place of `edits[i]`; its length must equal
/// `edits[i].replacement_len`.
pub(crate) fn apply_to_text(text: &str, edits: &[Edit], replacements: &[&str]) -> String {
    debug_assert_eq!(edits.len(), replacements.len());

    let mut out = String::with_capacity(text.len());
    let mut cursor = 0;
    for (edit, replacement) in edits.iter().zip(replacements) {
        debug_assert_eq!(replacement.len(), edit.replacement_len);
        out.push_str(&text[cursor..edit.start]);
        out.push_str(replacement);
        cursor = edit.end;
    }
    out.push_str(&text[cursor..]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_protocol::EntityKind;

    fn bold(start: usize, end: usize) -> Entity {
        Entity::new(start, end, EntityKind::Bold)
    }

    #[test]
    fn test_entity_before_edit_unchanged() {
        // "abc XXX def" with XXX removed
        let edits = [Edit::remove(4, 7)];
        let out = apply_edits(&[bold(0, 3)], &edits);
        assert_eq!(out, vec![bold(0, 3)]);
    }

    #[test]
    fn test_entity_after_edit_shifts() {
        let edits = [Edit::remove(4, 7)];
        let out = apply_edits(&[bold(8, 11)], &edits);
        assert_eq!(out, vec![bold(5, 8)]);
    }

    #[test]
    fn test_entity_inside_removal_dropped() {
        let edits = [Edit::remove(4, 10)];
        assert!(apply_edits(&[bold(5, 9)], &edits).is_empty());
        assert!(apply_edits(&[bold(4, 10)], &edits).is_empty());
    }

    #[test]
    fn test_straddling_entity_clipped() {
        // "aaaaXXXXbbbb", remove 4..8: entity 2..6 keeps "aa", entity 6..10 keeps "bb"
        let edits = [Edit::remove(4, 8)];
        assert_eq!(apply_edits(&[bold(2, 6)], &edits), vec![bold(2, 4)]);
        assert_eq!(apply_edits(&[bold(6, 10)], &edits), vec![bold(4, 6)]);
    }

    #[test]
    fn test_entity_spanning_replacement_keeps_it() {
        // Replace 4..8 with 2 bytes; an entity enclosing it keeps the splice
        let edits = [Edit::replace(4, 8, 2)];
        assert_eq!(apply_edits(&[bold(2, 10)], &edits), vec![bold(2, 8)]);
    }

    #[test]
    fn test_multiple_edits_accumulate() {
        let edits = [Edit::remove(0, 2), Edit::remove(6, 8)];
        // entity 3..5 sits between the removals: shifts left by 2
        assert_eq!(apply_edits(&[bold(3, 5)], &edits), vec![bold(1, 3)]);
        // entity 9..11 sits after both: shifts left by 4
        assert_eq!(apply_edits(&[bold(9, 11)], &edits), vec![bold(5, 7)]);
    }

    #[test]
    fn test_apply_to_text() {
        let text = "one two three";
        let edits = [Edit::remove(4, 8), Edit::replace(8, 13, 3)];
        let out = apply_to_text(text, &edits, &["", "3!!"]);
        assert_eq!(out, "one 3!!");
    }
}
