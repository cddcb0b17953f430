//! Grapheme-aware text editing for `input`/`textarea` widgets (spec §4.8).
//!
//! Cursor and selection positions are counted in grapheme clusters, not
//! bytes or UTF-16 code units, so editing never splits a multi-codepoint
//! emoji or a combining-mark sequence in half. Word-boundary movement
//! classifies each cluster as whitespace, word, or punctuation and walks
//! cluster runs of the same class — the same "skip whitespace, then skip
//! a run" shape readline-style editors use, stated over
//! [`unicode_segmentation`]'s clusters instead of bytes.
//!
//! This module is pure: it takes a value and a cursor/selection state and
//! returns the next value and state. The router owns persisting
//! [`EditorState`] per input id and calling the widget's `on_input`.

use unicode_segmentation::UnicodeSegmentation;

/// Per-input ephemeral editing state the router keeps alongside its
/// committed `value`, since caret position and selection are not part of
/// an `Input` widget's props.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EditorState {
    /// Caret position, in grapheme clusters from the start of the value.
    pub cursor: usize,
    /// Selection anchor, in grapheme clusters. `None` means no selection;
    /// the selected range is `min(anchor, cursor)..max(anchor, cursor)`.
    pub selection_anchor: Option<usize>,
}

impl EditorState {
    /// Clamps `cursor`/`selection_anchor` to `len` graphemes, used after the
    /// committed value changes out from under the editor (e.g. a host
    /// overwrote `value` directly rather than through `on_input`).
    pub fn clamp(&mut self, len: usize) {
        self.cursor = self.cursor.min(len);
        if let Some(a) = self.selection_anchor {
            self.selection_anchor = Some(a.min(len));
        }
    }

    fn selection_range(&self) -> Option<(usize, usize)> {
        self.selection_anchor.map(|a| (a.min(self.cursor), a.max(self.cursor)))
    }
}

/// One editing command. `select` on a movement op extends (or starts) the
/// selection instead of collapsing it, matching Shift+Arrow conventions.
#[derive(Debug, Clone, PartialEq)]
pub enum EditOp {
    InsertText(String),
    Backspace,
    Delete,
    MoveLeft { select: bool },
    MoveRight { select: bool },
    MoveWordLeft { select: bool },
    MoveWordRight { select: bool },
    MoveHome { select: bool },
    MoveEnd { select: bool },
    SelectAll,
    /// Bracketed paste: CR/LF are stripped from single-line inputs (spec
    /// §4.8) before insertion; multiline inputs keep them as-is.
    Paste(String),
    Cut,
    Copy,
}

/// Outcome of applying one [`EditOp`].
#[derive(Debug, Clone, PartialEq)]
pub struct EditResult {
    pub value: String,
    pub state: EditorState,
    /// Whether `value` differs from the input value, i.e. whether
    /// `on_input` should fire.
    pub changed: bool,
    /// Text that a `Cut`/`Copy` op placed on the clipboard, for the router
    /// to forward through the backend's OSC 52 raw-write hook.
    pub clipboard: Option<String>,
}

/// Applies `op` to `value`/`state`. `multiline` controls whether a bare
/// newline survives paste (single-line inputs strip CR/LF per spec §4.8;
/// the caller is responsible for routing a bare Enter key to `on_submit`
/// rather than through this function at all).
pub fn apply(value: &str, state: EditorState, op: EditOp, multiline: bool) -> EditResult {
    let graphemes: Vec<&str> = value.graphemes(true).collect();
    let len = graphemes.len();
    let mut state = state;
    state.clamp(len);

    match op {
        EditOp::InsertText(text) => insert(&graphemes, state, &text),
        EditOp::Paste(text) => {
            let text = if multiline { text } else { strip_newlines(&text) };
            insert(&graphemes, state, &text)
        }
        EditOp::Backspace => {
            if let Some((start, end)) = state.selection_range() {
                delete_range(&graphemes, start, end)
            } else if state.cursor > 0 {
                delete_range(&graphemes, state.cursor - 1, state.cursor)
            } else {
                unchanged(value, state)
            }
        }
        EditOp::Delete => {
            if let Some((start, end)) = state.selection_range() {
                delete_range(&graphemes, start, end)
            } else if state.cursor < len {
                delete_range(&graphemes, state.cursor, state.cursor + 1)
            } else {
                unchanged(value, state)
            }
        }
        EditOp::Cut => {
            if let Some((start, end)) = state.selection_range() {
                let cut = graphemes[start..end].concat();
                let mut result = delete_range(&graphemes, start, end);
                result.clipboard = Some(cut);
                result
            } else {
                unchanged(value, state)
            }
        }
        EditOp::Copy => {
            let mut result = unchanged(value, state);
            if let Some((start, end)) = state.selection_range() {
                result.clipboard = Some(graphemes[start..end].concat());
            }
            result
        }
        EditOp::MoveLeft { select } => {
            let target = state.cursor.saturating_sub(1);
            moved(value, state, target, select)
        }
        EditOp::MoveRight { select } => {
            let target = (state.cursor + 1).min(len);
            moved(value, state, target, select)
        }
        EditOp::MoveWordLeft { select } => {
            let target = prev_word_boundary(&graphemes, state.cursor);
            moved(value, state, target, select)
        }
        EditOp::MoveWordRight { select } => {
            let target = next_word_boundary(&graphemes, state.cursor);
            moved(value, state, target, select)
        }
        EditOp::MoveHome { select } => moved(value, state, 0, select),
        EditOp::MoveEnd { select } => moved(value, state, len, select),
        EditOp::SelectAll => EditResult {
            value: value.to_string(),
            state: EditorState { cursor: len, selection_anchor: Some(0) },
            changed: false,
            clipboard: None,
        },
    }
}

fn unchanged(value: &str, state: EditorState) -> EditResult {
    EditResult { value: value.to_string(), state, changed: false, clipboard: None }
}

fn moved(value: &str, from: EditorState, target: usize, select: bool) -> EditResult {
    let anchor = if select { Some(from.selection_anchor.unwrap_or(from.cursor)) } else { None };
    // An empty range is no selection at all (spec §8 "selection is `null`
    // iff start==end"): Shift+Home at cursor 0, Shift+Left at 0,
    // Shift+Right/End at the end, or any shift-move back onto the anchor
    // would otherwise leave a non-null `Some(cursor)` anchor.
    let anchor = anchor.filter(|&a| a != target);
    EditResult {
        value: value.to_string(),
        state: EditorState { cursor: target, selection_anchor: anchor },
        changed: false,
        clipboard: None,
    }
}

fn insert(graphemes: &[&str], state: EditorState, text: &str) -> EditResult {
    let (start, end) = state.selection_range().unwrap_or((state.cursor, state.cursor));
    let mut value = graphemes[..start].concat();
    value.push_str(text);
    value.push_str(&graphemes[end..].concat());
    let cursor = start + text.graphemes(true).count();
    EditResult {
        value,
        state: EditorState { cursor, selection_anchor: None },
        changed: true,
        clipboard: None,
    }
}

fn delete_range(graphemes: &[&str], start: usize, end: usize) -> EditResult {
    let mut value = graphemes[..start].concat();
    value.push_str(&graphemes[end..].concat());
    EditResult {
        value,
        state: EditorState { cursor: start, selection_anchor: None },
        changed: true,
        clipboard: None,
    }
}

fn strip_newlines(text: &str) -> String {
    text.chars().filter(|&c| c != '\n' && c != '\r').collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CharClass {
    Whitespace,
    Word,
    Punct,
}

fn classify(g: &str) -> CharClass {
    match g.chars().next() {
        Some(c) if c.is_whitespace() => CharClass::Whitespace,
        Some(c) if c.is_alphanumeric() || c == '_' => CharClass::Word,
        _ => CharClass::Punct,
    }
}

/// Finds the start of the previous word, skipping trailing whitespace then
/// the run of clusters sharing the class of the first non-whitespace
/// cluster encountered.
fn prev_word_boundary(graphemes: &[&str], cursor: usize) -> usize {
    let mut i = cursor;
    while i > 0 && classify(graphemes[i - 1]) == CharClass::Whitespace {
        i -= 1;
    }
    if i == 0 {
        return 0;
    }
    let class = classify(graphemes[i - 1]);
    while i > 0 && classify(graphemes[i - 1]) == class {
        i -= 1;
    }
    i
}

/// Finds the start of the next word, skipping the remainder of the current
/// run then any whitespace before it.
fn next_word_boundary(graphemes: &[&str], cursor: usize) -> usize {
    let len = graphemes.len();
    let mut i = cursor;
    if i < len {
        let class = classify(graphemes[i]);
        while i < len && classify(graphemes[i]) == class {
            i += 1;
        }
    }
    while i < len && classify(graphemes[i]) == CharClass::Whitespace {
        i += 1;
    }
    i
}

#[cfg(test)]
mod tests {
    use super::*;

    fn st(cursor: usize) -> EditorState {
        EditorState { cursor, selection_anchor: None }
    }

    #[test]
    fn insert_splits_on_grapheme_boundaries_not_bytes() {
        let result = apply("a👍b", st(1), EditOp::InsertText("X".to_string()), false);
        assert_eq!(result.value, "aX👍b");
        assert_eq!(result.state.cursor, 2);
    }

    #[test]
    fn backspace_removes_whole_emoji_cluster() {
        // A family emoji is multiple codepoints joined by ZWJ but one grapheme.
        let family = "\u{1F468}\u{200D}\u{1F469}\u{200D}\u{1F466}";
        let value = format!("a{family}b");
        let cursor_after_emoji = 2; // graphemes: ['a', family, 'b']
        let result = apply(&value, st(cursor_after_emoji), EditOp::Backspace, false);
        assert_eq!(result.value, "ab");
        assert_eq!(result.state.cursor, 1);
    }

    #[test]
    fn word_left_skips_trailing_whitespace_then_one_word() {
        let value = "foo bar  baz";
        let end = value.graphemes(true).count();
        let after_baz = prev_word_boundary(&value.graphemes(true).collect::<Vec<_>>(), end);
        assert_eq!(&value.graphemes(true).collect::<Vec<_>>()[after_baz..end].concat(), "baz");
    }

    #[test]
    fn paste_into_single_line_input_strips_newlines() {
        let result = apply("ab", st(1), EditOp::Paste("X\r\nY".to_string()), false);
        assert_eq!(result.value, "aXYb");
    }

    #[test]
    fn paste_into_multiline_input_keeps_newlines() {
        let result = apply("ab", st(1), EditOp::Paste("X\nY".to_string()), true);
        assert_eq!(result.value, "aX\nYb");
    }

    #[test]
    fn select_all_anchors_at_start_cursor_at_end() {
        let result = apply("hello", st(2), EditOp::SelectAll, false);
        assert_eq!(result.state.selection_anchor, Some(0));
        assert_eq!(result.state.cursor, 5);
        assert!(!result.changed);
    }

    #[test]
    fn cut_removes_selection_and_returns_clipboard_text() {
        let state = EditorState { cursor: 5, selection_anchor: Some(1) };
        let result = apply("abcdef", state, EditOp::Cut, false);
        assert_eq!(result.value, "af");
        assert_eq!(result.clipboard.as_deref(), Some("bcde"));
        assert_eq!(result.state.cursor, 1);
    }

    #[test]
    fn shift_move_back_onto_anchor_collapses_to_no_selection() {
        let result = apply("hello", st(0), EditOp::MoveRight { select: true }, false);
        assert_eq!(result.state.cursor, 1);
        assert_eq!(result.state.selection_anchor, Some(0));

        let back = apply("hello", result.state, EditOp::MoveLeft { select: true }, false);
        assert_eq!(back.state.cursor, 0);
        assert_eq!(back.state.selection_anchor, None, "cursor back on anchor must not leave a zero-width selection");
    }

    #[test]
    fn shift_home_at_start_of_buffer_has_no_selection() {
        let result = apply("hello", st(0), EditOp::MoveHome { select: true }, false);
        assert_eq!(result.state.selection_anchor, None);
    }

    #[test]
    fn backspace_with_active_selection_deletes_the_selection() {
        let state = EditorState { cursor: 1, selection_anchor: Some(4) };
        let result = apply("abcdef", state, EditOp::Backspace, false);
        assert_eq!(result.value, "aef");
        assert_eq!(result.state.selection_anchor, None);
    }
}
