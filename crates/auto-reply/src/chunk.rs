//! Split reply text into platform-sized chunks.
//!
//! Prefers paragraph breaks, then line breaks, then a hard character split.
//! Limits are in characters, not bytes; splits never land inside a UTF-8
//! scalar value.

/// Split `text` into chunks of at most `limit` characters.
///
/// Returns an empty vec for blank input. `limit` of zero is treated as 1.
#[must_use]
pub fn chunk_text(text: &str, limit: usize) -> Vec<String> {
    let limit = limit.max(1);
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Vec::new();
    }
    if trimmed.chars().count() <= limit {
        return vec![trimmed.to_string()];
    }

    fn flush(chunks: &mut Vec<String>, current: &mut String, current_len: &mut usize) {
        let piece = current.trim();
        if !piece.is_empty() {
            chunks.push(piece.to_string());
        }
        current.clear();
        *current_len = 0;
    }

    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0usize;

    for paragraph in trimmed.split("\n\n") {
        let para_len = paragraph.chars().count();
        // +2 for the paragraph separator we would re-insert.
        if current_len > 0 && current_len + 2 + para_len > limit {
            flush(&mut chunks, &mut current, &mut current_len);
        }

        if para_len <= limit {
            if current_len > 0 {
                current.push_str("\n\n");
                current_len += 2;
            }
            current.push_str(paragraph);
            current_len += para_len;
            continue;
        }

        // Paragraph alone is too long: fall back to lines, then chars.
        flush(&mut chunks, &mut current, &mut current_len);
        for line in paragraph.split('\n') {
            let line_len = line.chars().count();
            if current_len > 0 && current_len + 1 + line_len > limit {
                flush(&mut chunks, &mut current, &mut current_len);
            }
            if line_len <= limit {
                if current_len > 0 {
                    current.push('\n');
                    current_len += 1;
                }
                current.push_str(line);
                current_len += line_len;
                continue;
            }

            flush(&mut chunks, &mut current, &mut current_len);
            let mut buf = String::new();
            let mut buf_len = 0usize;
            for ch in line.chars() {
                if buf_len == limit {
                    chunks.push(std::mem::take(&mut buf));
                    buf_len = 0;
                }
                buf.push(ch);
                buf_len += 1;
            }
            if !buf.is_empty() {
                current = buf;
                current_len = buf_len;
            }
        }
    }
    flush(&mut chunks, &mut current, &mut current_len);

    chunks
}

#[cfg(test)]
mod tests {
    use {super::*, rstest::rstest};

    #[test]
    fn short_text_is_single_chunk() {
        assert_eq!(chunk_text("hello", 4000), vec!["hello"]);
    }

    #[test]
    fn blank_text_yields_nothing() {
        assert!(chunk_text("   \n  ", 4000).is_empty());
    }

    #[test]
    fn splits_on_paragraphs_first() {
        let text = format!("{}\n\n{}", "a".repeat(30), "b".repeat(30));
        let chunks = chunk_text(&text, 40);
        assert_eq!(chunks, vec!["a".repeat(30), "b".repeat(30)]);
    }

    #[test]
    fn long_line_hard_splits() {
        let chunks = chunk_text(&"x".repeat(25), 10);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].len(), 10);
        assert_eq!(chunks[2].len(), 5);
    }

    #[test]
    fn multibyte_never_split_mid_char() {
        let chunks = chunk_text(&"你好".repeat(10), 3);
        for chunk in &chunks {
            assert!(chunk.chars().count() <= 3);
            assert!(std::str::from_utf8(chunk.as_bytes()).is_ok());
        }
    }

    #[rstest]
    #[case("one\ntwo\nthree", 7)]
    #[case("para one\n\npara two\n\npara three", 12)]
    #[case("word ", 2)]
    fn never_exceeds_limit(#[case] text: &str, #[case] limit: usize) {
        let repeated = text.repeat(20);
        for chunk in chunk_text(&repeated, limit) {
            assert!(chunk.chars().count() <= limit, "chunk over limit: {chunk:?}");
        }
    }
}
