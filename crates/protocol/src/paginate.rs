//! Splitting of oversized text into transport-sized messages.

/// Maximum size of a single outbound chat message, in bytes.
pub const MAX_MESSAGE_SIZE: usize = 4096;

/// Returns true if `text` does not fit into a single message of `limit` bytes.
pub fn needs_pagination(text: &str, limit: usize) -> bool {
    text.len() > limit
}

/// Splits `text` into ordered chunks of at most `limit` bytes.
///
/// Chunk boundaries only fall after a `\n`, so no line is broken across two
/// messages and concatenating the chunks yields `text` again. Lines are packed
/// greedily: a new chunk starts when the next line would push the current one
/// past `limit`. The final chunk is always emitted, so empty input yields a
/// single empty chunk.
///
/// A single line longer than `limit` cannot honour both guarantees; it is cut
/// at UTF-8 character boundaries instead of being dropped.
pub fn paginate(text: &str, limit: usize) -> Vec<String> {
    let mut pages = Vec::new();
    let mut page = String::new();

    for line in text.split_inclusive('\n') {
        if !page.is_empty() && page.len() + line.len() > limit {
            pages.push(std::mem::take(&mut page));
        }

        if line.len() > limit {
            let mut pieces = split_at_char_boundaries(line, limit);
            let last = pieces.pop().unwrap_or_default();
            pages.extend(pieces.into_iter().map(str::to_string));
            page.push_str(last);
        } else {
            page.push_str(line);
        }
    }

    pages.push(page);
    pages
}

/// Cuts `line` into pieces of at most `limit` bytes without splitting a
/// character. Every piece holds at least one character.
fn split_at_char_boundaries(line: &str, limit: usize) -> Vec<&str> {
    let mut pieces = Vec::new();
    let mut rest = line;

    while rest.len() > limit {
        let mut cut = limit;
        while cut > 0 && !rest.is_char_boundary(cut) {
            cut -= 1;
        }
        if cut == 0 {
            cut = rest.chars().next().map_or(rest.len(), char::len_utf8);
        }
        let (head, tail) = rest.split_at(cut);
        pieces.push(head);
        rest = tail;
    }

    pieces.push(rest);
    pieces
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_short_text_is_single_chunk() {
        let pages = paginate("hello\nworld\n", MAX_MESSAGE_SIZE);
        assert_eq!(pages, vec!["hello\nworld\n".to_string()]);
    }

    #[test]
    fn test_empty_text_emits_one_empty_chunk() {
        assert_eq!(paginate("", 10), vec![String::new()]);
    }

    #[test]
    fn test_lines_are_packed_greedily() {
        let pages = paginate("aaaa\nbbbb\ncccc\n", 10);
        assert_eq!(pages, vec!["aaaa\nbbbb\n".to_string(), "cccc\n".to_string()]);
    }

    #[test]
    fn test_line_exactly_filling_a_chunk() {
        let pages = paginate("123456789\nx", 10);
        assert_eq!(pages, vec!["123456789\n".to_string(), "x".to_string()]);
    }

    #[test]
    fn test_trailing_text_without_newline_is_kept() {
        let pages = paginate("aaaa\nbbbb\ncc", 10);
        assert_eq!(pages.concat(), "aaaa\nbbbb\ncc");
        assert_eq!(pages.last().unwrap(), "cc");
    }

    #[test]
    fn test_oversized_line_is_cut() {
        let line = "x".repeat(25);
        let pages = paginate(&line, 10);
        assert_eq!(pages.len(), 3);
        assert!(pages.iter().all(|p| p.len() <= 10));
        assert_eq!(pages.concat(), line);
    }

    #[test]
    fn test_oversized_line_respects_char_boundaries() {
        let line = "é".repeat(10); // 20 bytes
        let pages = paginate(&line, 5);
        assert!(pages.iter().all(|p| p.len() <= 5));
        assert_eq!(pages.concat(), line);
    }

    #[test]
    fn test_needs_pagination() {
        assert!(!needs_pagination(&"a".repeat(MAX_MESSAGE_SIZE), MAX_MESSAGE_SIZE));
        assert!(needs_pagination(&"a".repeat(MAX_MESSAGE_SIZE + 1), MAX_MESSAGE_SIZE));
    }

    #[test]
    fn test_realistic_listing() {
        let listing: String = (0..2000)
            .map(|i| format!("-rw-r--r-- 1 user user {:>6} file_{}.txt\n", i * 17, i))
            .collect();
        let pages = paginate(&listing, MAX_MESSAGE_SIZE);
        assert!(pages.len() > 1);
        assert!(pages.iter().all(|p| p.len() <= MAX_MESSAGE_SIZE));
        assert!(pages.iter().all(|p| p.ends_with('\n')));
        assert_eq!(pages.concat(), listing);
    }

    fn lines_strategy(limit: usize) -> impl Strategy<Value = String> {
        // Each line, newline included, fits into `limit`.
        prop::collection::vec(
            prop::string::string_regex(&format!("[a-zA-Z0-9 äöü]{{0,{}}}", limit / 2 - 1))
                .unwrap(),
            0..60,
        )
        .prop_map(|lines| {
            lines
                .into_iter()
                .map(|mut l| {
                    l.push('\n');
                    l
                })
                .collect()
        })
    }

    proptest! {
        #[test]
        fn prop_chunks_fit_and_concatenate(text in lines_strategy(64)) {
            let pages = paginate(&text, 64);
            prop_assert!(pages.iter().all(|p| p.len() <= 64));
            prop_assert_eq!(pages.concat(), text);
        }

        #[test]
        fn prop_boundaries_fall_after_newlines(text in lines_strategy(64)) {
            let pages = paginate(&text, 64);
            for page in &pages[..pages.len() - 1] {
                prop_assert!(page.ends_with('\n'));
            }
        }

        #[test]
        fn prop_packing_is_greedy(text in lines_strategy(64)) {
            let pages = paginate(&text, 64);
            for pair in pages.windows(2) {
                let next_line = pair[1].split_inclusive('\n').next().unwrap_or("");
                prop_assert!(pair[0].len() + next_line.len() > 64);
            }
        }
    }
}
