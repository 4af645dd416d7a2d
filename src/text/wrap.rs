//! Greedy word wrapping against an arbitrary width measure.
//!
//! Lines are split on `'\n'` first. Each paragraph is packed word by word,
//! where words are separated by single spaces: a run of spaces survives
//! inside a line, while spaces that would open a line are dropped. A word
//! too wide for an empty line is cut into the longest prefixes that fit. A cut always takes at least one character so wrapping terminates
//! even when a single glyph is wider than the line.

/// Wrap `text` into lines no wider than `max_width` under `measure`.
///
/// Empty paragraphs are kept as empty lines. A paragraph of spaces only
/// produces no line at all.
///
/// ```
/// use t02relay::text::wrap::wrap_lines;
///
/// let lines = wrap_lines("aaa bbb ccc", 7.0, |s| s.chars().count() as f32);
/// assert_eq!(lines, vec!["aaa bbb", "ccc"]);
/// ```
pub fn wrap_lines<F>(text: &str, max_width: f32, measure: F) -> Vec<String>
where
    F: Fn(&str) -> f32,
{
    let mut lines = Vec::new();

    for paragraph in text.split('\n') {
        if paragraph.is_empty() {
            lines.push(String::new());
            continue;
        }

        let mut current = String::new();
        for word in paragraph.split(' ') {
            let candidate = if current.is_empty() {
                word.to_string()
            } else {
                format!("{} {}", current, word)
            };

            if measure(&candidate) <= max_width {
                current = candidate;
                continue;
            }

            if !current.is_empty() {
                lines.push(std::mem::take(&mut current));
            }

            if measure(word) <= max_width {
                current = word.to_string();
            } else {
                let mut pieces = split_long_word(word, max_width, &measure);
                // the tail stays open so following words can join it
                current = pieces.pop().unwrap_or_default();
                lines.extend(pieces);
            }
        }

        if !current.is_empty() {
            lines.push(current);
        }
    }

    lines
}

/// Cut a word into consecutive pieces that each fit `max_width`.
///
/// A piece holds at least one character, so a glyph wider than the line
/// still ends up on a line of its own.
pub fn split_long_word<F>(word: &str, max_width: f32, measure: F) -> Vec<String>
where
    F: Fn(&str) -> f32,
{
    let chars: Vec<char> = word.chars().collect();
    let mut pieces = Vec::new();
    let mut start = 0;

    while start < chars.len() {
        let mut end = start + 1;
        while end < chars.len() {
            let piece: String = chars[start..=end].iter().collect();
            if measure(&piece) > max_width {
                break;
            }
            end += 1;
        }
        pieces.push(chars[start..end].iter().collect());
        start = end;
    }

    pieces
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn count(s: &str) -> f32 {
        s.chars().count() as f32
    }

    #[test]
    fn test_fits_on_one_line() {
        assert_eq!(wrap_lines("Hello world", 20.0, count), vec!["Hello world"]);
    }

    #[test]
    fn test_explicit_breaks_and_blank_lines() {
        assert_eq!(
            wrap_lines("one\n\ntwo", 10.0, count),
            vec!["one".to_string(), String::new(), "two".to_string()]
        );
    }

    #[test]
    fn test_keeps_runs_of_spaces() {
        assert_eq!(wrap_lines("a   b", 10.0, count), vec!["a   b"]);
        assert_eq!(wrap_lines("  a b ", 10.0, count), vec!["a b "]);
    }

    #[test]
    fn test_spaces_only_paragraph_has_no_line() {
        assert_eq!(wrap_lines("one\n   \ntwo", 10.0, count), vec!["one", "two"]);
    }

    #[test]
    fn test_spaces_do_not_open_a_wrapped_line() {
        assert_eq!(wrap_lines("abc   de", 3.0, count), vec!["abc", "de"]);
    }

    #[test]
    fn test_long_word_is_split() {
        assert_eq!(
            wrap_lines("abcdefghij xy", 4.0, count),
            vec!["abcd", "efgh", "ij", "xy"]
        );
    }

    #[test]
    fn test_split_tail_accepts_next_word() {
        assert_eq!(wrap_lines("abcdef g", 4.0, count), vec!["abcd", "ef g"]);
    }

    #[test]
    fn test_glyph_wider_than_line_still_progresses() {
        let pieces = split_long_word("wide", 0.5, count);
        assert_eq!(pieces, vec!["w", "i", "d", "e"]);
    }

    #[test]
    fn test_lines_fit_and_preserve_words() {
        let text = "the quick brown fox jumps over a supercalifragilistic lazy dog";
        for max in [3.0, 5.0, 8.0, 13.0, 40.0] {
            let lines = wrap_lines(text, max, count);
            for line in &lines {
                assert!(count(line) <= max, "{:?} wider than {}", line, max);
            }
            let rejoined: String = lines.concat().chars().filter(|c| *c != ' ').collect();
            let original: String = text.chars().filter(|c| *c != ' ').collect();
            assert_eq!(rejoined, original);
        }
    }
}
