//! Turns raw model output into a display-safe payload.
//!
//! The model is asked for one short sentence, but output routinely carries
//! extra sentences, digits, emoji and a trailing `END` control line. This
//! module reduces it to at most `max_tokens` words of plain letters, commas
//! and full stops, ending in a full stop, greedily wrapped to the panel width
//! and capped at `max_lines` lines.
//!
//! [`format_response`] is total: it never fails, and input with no letters
//! produces an empty payload.

use crate::config::DEVICE_MAX_WIDTH;
use std::fmt;

/// Control line the prompt asks the model to print after its answer.
pub const CONTROL_LINE: &str = "END";

/// Wrapped, validated payload ready for delivery.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormattedPayload {
    lines: Vec<String>,
}

impl FormattedPayload {
    /// The wrapped lines, top to bottom.
    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// Number of lines.
    pub fn line_count(&self) -> usize {
        self.lines.len()
    }

    /// Returns `true` if the payload carries no text.
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Lines joined with `\n`, without a trailing terminator.
    pub fn text(&self) -> String {
        self.lines.join("\n")
    }

    /// Word tokens across all lines.
    pub fn token_count(&self) -> usize {
        self.lines.iter().map(|line| count_tokens(line)).sum()
    }

    /// Lines joined with spaces plus the `\n` the panel completes a message
    /// on. The panel stops at the first newline and re-wraps to its own
    /// columns, so the wire form is a single line.
    pub fn to_wire(&self) -> String {
        let mut wire = self.lines.join(" ");
        wire.push('\n');
        wire
    }
}

impl fmt::Display for FormattedPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text())
    }
}

/// Sanitizes, truncates and wraps `raw`.
///
/// `width` is clamped to [`DEVICE_MAX_WIDTH`] whatever the caller passes.
pub fn format_response(
    raw: &str,
    max_tokens: usize,
    max_lines: usize,
    width: usize,
) -> FormattedPayload {
    let width = width.clamp(1, DEVICE_MAX_WIDTH);

    let sentence = first_sentence(&flatten(raw));
    let trimmed = copy_tokens(&sentence, max_tokens);

    let mut lines = wrap_to_width(&trimmed, width);
    lines.truncate(max_lines);
    FormattedPayload { lines }
}

/// Greedy word wrap. A word longer than `cols` gets a line of its own.
pub fn wrap_to_width(text: &str, cols: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();

    for word in text.split_whitespace() {
        let word_len = word.chars().count();
        if word_len > cols {
            if !current.is_empty() {
                lines.push(std::mem::take(&mut current));
            }
            lines.push(word.to_owned());
            continue;
        }

        let current_len = current.chars().count();
        if current.is_empty() {
            current.push_str(word);
        } else if current_len + 1 + word_len <= cols {
            current.push(' ');
            current.push_str(word);
        } else {
            lines.push(std::mem::replace(&mut current, word.to_owned()));
        }
    }

    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

/// Drops trailing blank lines and the control line, then joins what is left
/// into one logical line.
fn flatten(raw: &str) -> String {
    let mut lines: Vec<&str> = raw.lines().collect();
    while lines.last().is_some_and(|l| l.trim().is_empty()) {
        lines.pop();
    }
    if lines.last().is_some_and(|l| l.trim() == CONTROL_LINE) {
        lines.pop();
    }

    lines
        .iter()
        .map(|l| l.trim())
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
        .replace(['\u{2018}', '\u{2019}'], "'")
}

/// Keeps everything up to and including the first full stop.
fn first_sentence(text: &str) -> String {
    match text.find('.') {
        Some(idx) => text[..=idx].to_owned(),
        None => text.to_owned(),
    }
}

/// Copies at most `max_tokens` word tokens, keeping commas and full stops
/// attached to the preceding word and dropping every other symbol.
fn copy_tokens(text: &str, max_tokens: usize) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    let mut words = 0usize;
    let mut last_was_space = false;
    let mut i = 0;

    while i < chars.len() {
        if let Some(end) = match_token(&chars, i) {
            if words >= max_tokens {
                break;
            }
            if out.chars().last().is_some_and(|c| !matches!(c, ' ' | ',' | '.')) {
                out.push(' ');
            }
            out.extend(&chars[i..end]);
            words += 1;
            last_was_space = false;
            i = end;
            continue;
        }

        let ch = chars[i];
        if ch.is_whitespace() {
            if !out.is_empty() && !last_was_space {
                out.push(' ');
                last_was_space = true;
            }
        } else if matches!(ch, ',' | '.') && !out.is_empty() {
            if out.ends_with(' ') {
                out.pop();
            }
            out.push(ch);
            out.push(' ');
            last_was_space = true;
        }
        i += 1;
    }

    let mut trimmed = out.trim().to_owned();
    if !trimmed.is_empty() && !trimmed.ends_with('.') {
        trimmed = trimmed.trim_end_matches([',', ' ']).to_owned();
        trimmed.push('.');
    }
    trimmed
}

/// Matches `[A-Za-z]+('[A-Za-z]+)*` at `start`, returning the end index.
fn match_token(chars: &[char], start: usize) -> Option<usize> {
    let run_end = |from: usize| {
        let mut j = from;
        while j < chars.len() && chars[j].is_ascii_alphabetic() {
            j += 1;
        }
        j
    };

    let mut end = run_end(start);
    if end == start {
        return None;
    }
    while end + 1 < chars.len() && chars[end] == '\'' && chars[end + 1].is_ascii_alphabetic() {
        end = run_end(end + 1);
    }
    Some(end)
}

fn count_tokens(text: &str) -> usize {
    let chars: Vec<char> = text.chars().collect();
    let mut count = 0;
    let mut i = 0;
    while i < chars.len() {
        match match_token(&chars, i) {
            Some(end) => {
                count += 1;
                i = end;
            }
            None => i += 1,
        }
    }
    count
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use proptest::prelude::*;

    #[test]
    fn truncates_at_first_full_stop() {
        let payload = format_response("Hello there. Ignore this part", 28, 6, 19);
        assert_eq!(payload.lines(), ["Hello there."]);
    }

    #[test]
    fn strips_control_line_and_blank_tail() {
        let raw = "Rain taps the\nold tin roof\nEND\n\n\n";
        let payload = format_response(raw, 28, 6, 19);
        assert_eq!(payload.text(), "Rain taps the old\ntin roof.");
    }

    #[test]
    fn drops_digits_symbols_and_emoji() {
        let raw = "Stars 42 burn #bright 🌟 over (the) bay";
        let payload = format_response(raw, 28, 6, 19);
        assert_eq!(payload.text(), "Stars burn bright\nover the bay.");
    }

    #[test]
    fn keeps_apostrophes_and_commas() {
        let raw = "Ponyboy’s hands, cold and shaking , held on.";
        let payload = format_response(raw, 28, 6, 19);
        assert_eq!(payload.text(), "Ponyboy's hands,\ncold and shaking,\nheld on.");
    }

    #[test]
    fn token_budget_is_enforced() {
        let raw = "one two three four five six seven";
        let payload = format_response(raw, 4, 6, 19);
        assert_eq!(payload.text(), "one two three four.");
        assert_eq!(payload.token_count(), 4);
    }

    #[test]
    fn trailing_comma_becomes_full_stop() {
        let payload = format_response("Dust settles, softly,", 28, 6, 19);
        assert_eq!(payload.text(), "Dust settles,\nsoftly.");
    }

    #[test]
    fn no_letters_yields_empty_payload() {
        assert!(format_response("1234 !!! ...", 28, 6, 19).is_empty());
        assert!(format_response("", 28, 6, 19).is_empty());
        assert!(format_response("\n\nEND\n", 28, 6, 19).is_empty());
    }

    #[test]
    fn line_cap_drops_extra_lines() {
        let raw = "alpha beta gamma delta epsilon zeta eta theta iota kappa";
        let payload = format_response(raw, 28, 2, 11);
        assert_eq!(payload.line_count(), 2);
        assert_eq!(payload.lines(), ["alpha beta", "gamma delta"]);
    }

    #[test]
    fn width_is_clamped_to_device_maximum() {
        let raw = "the quick brown fox jumps over the lazy dog";
        let payload = format_response(raw, 28, 6, 80);
        for line in payload.lines() {
            assert!(line.len() <= DEVICE_MAX_WIDTH, "line too wide: {line:?}");
        }
    }

    #[test]
    fn overlong_word_gets_its_own_line() {
        let lines = wrap_to_width("a supercalifragilistic day", 10);
        assert_eq!(lines, ["a", "supercalifragilistic", "day"]);
    }

    #[test]
    fn wrap_of_empty_text_is_empty() {
        assert!(wrap_to_width("   ", 10).is_empty());
    }

    #[test]
    fn wire_form_has_terminator() {
        let payload = format_response("Time hums like a fan", 28, 6, 19);
        assert_eq!(payload.to_wire(), "Time hums like a fan.\n");
        assert_eq!(payload.to_string(), "Time hums like a\nfan.");
    }

    proptest! {
        #[test]
        fn output_respects_limits(
            raw in "[ -~\\n’]{0,200}",
            max_tokens in 0usize..40,
            max_lines in 0usize..8,
            width in 1usize..30,
        ) {
            let payload = format_response(&raw, max_tokens, max_lines, width);
            let width = width.min(DEVICE_MAX_WIDTH);

            prop_assert!(payload.line_count() <= max_lines);
            prop_assert!(payload.token_count() <= max_tokens);
            for line in payload.lines() {
                prop_assert!(!line.is_empty());
                prop_assert!(
                    line.chars().count() <= width || !line.contains(' '),
                    "line {:?} exceeds width {}", line, width
                );
                prop_assert!(line
                    .chars()
                    .all(|c| c.is_ascii_alphabetic() || matches!(c, '\'' | ',' | '.' | ' ')));
            }
        }

        #[test]
        fn untruncated_output_ends_with_full_stop(raw in "[a-zA-Z ,.0-9]{0,80}") {
            prop_assume!(raw.trim() != CONTROL_LINE);
            let payload = format_response(&raw, 28, 100, 19);
            if payload.is_empty() {
                prop_assert!(!raw.split('.').next().unwrap_or("").chars().any(|c| c.is_ascii_alphabetic()));
            } else {
                prop_assert!(payload.text().ends_with('.'));
            }
        }
    }
}
