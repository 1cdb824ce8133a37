//! Sentence-boundary text chunker.
//!
//! Splits document text into overlapping segments that respect sentence
//! boundaries. Sentences are detected with a lightweight heuristic
//! (sentence-ending punctuation followed by whitespace); segments are
//! assembled greedily until `chunk_size` characters (Unicode scalar
//! values, not bytes) would be exceeded,
//! then a new segment starts primed with a tail of the previous segment's
//! sentences whose cumulative length fits within `overlap`.
//!
//! A single sentence longer than `chunk_size` becomes one oversized
//! segment rather than being forcibly cut. Sentence units keep their
//! trailing whitespace, so concatenating all segments with the overlap
//! tails removed reproduces the source text byte for byte.

/// Approximate chars-per-token ratio used for token estimates.
const CHARS_PER_TOKEN: usize = 4;

/// Rough token estimate for a piece of text.
pub fn estimate_tokens(text: &str) -> i64 {
    ((text.len() / CHARS_PER_TOKEN).max(1)) as i64
}

/// Split text into sentence-like units.
///
/// A boundary is any of `.`, `!`, `?` followed by whitespace; the
/// whitespace run stays attached to the preceding unit so that the units
/// concatenate back to the input exactly.
pub fn split_sentences(text: &str) -> Vec<&str> {
    let mut units = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        if !matches!(c, '.' | '!' | '?') {
            continue;
        }
        let follows_whitespace = matches!(chars.peek(), Some(&(_, next)) if next.is_whitespace());
        if !follows_whitespace {
            continue;
        }
        let mut end = i + c.len_utf8();
        while let Some(&(j, w)) = chars.peek() {
            if !w.is_whitespace() {
                break;
            }
            end = j + w.len_utf8();
            chars.next();
        }
        units.push(&text[start..end]);
        start = end;
    }

    if start < text.len() {
        units.push(&text[start..]);
    }
    units
}

/// Split text into overlapping, sentence-respecting segments.
///
/// Returns an empty vector for empty input. Text without any sentence
/// boundary yields a single segment equal to the whole input.
pub fn split_text(text: &str, chunk_size: usize, overlap: usize) -> Vec<String> {
    if text.is_empty() {
        return Vec::new();
    }

    let sentences = split_sentences(text);
    let mut chunks: Vec<String> = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    let mut current_len = 0usize;

    for sentence in sentences {
        let sentence_chars = sentence.chars().count();
        if current_len + sentence_chars > chunk_size && !current.is_empty() {
            chunks.push(current.concat());

            // Prime the next segment with a tail of the previous one.
            let mut tail: Vec<&str> = Vec::new();
            let mut tail_len = 0usize;
            for prev in current.iter().rev() {
                let prev_chars = prev.chars().count();
                if tail_len + prev_chars > overlap {
                    break;
                }
                tail.push(prev);
                tail_len += prev_chars;
            }
            tail.reverse();
            current = tail;
            current_len = tail_len;
        }
        current_len += sentence_chars;
        current.push(sentence);
    }

    if !current.is_empty() {
        chunks.push(current.concat());
    }

    if chunks.is_empty() {
        vec![text.to_string()]
    } else {
        chunks
    }
}
