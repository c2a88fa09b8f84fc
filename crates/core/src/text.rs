//! Sentence-boundary text segmentation.
//!
//! Platform messages have a hard length limit, and corpus documents are
//! stored as bounded segments. Both cut text at the most natural boundary
//! that fits, in this order of preference:
//!
//! 1. terminal punctuation (`. ! ? )` or newline) preceded by a non-space
//!    character and followed by whitespace
//! 2. terminal punctuation followed by whitespace
//! 3. an alphanumeric character followed by whitespace
//! 4. any whitespace
//! 5. a hard cut at the limit
//!
//! All positions are in `char`s, never bytes.

const SENTENCE_ENDINGS: [char; 5] = ['.', '!', '?', ')', '\n'];

/// Fraction of the limit a segment must reach before a boundary is accepted.
const MIN_SEGMENT_RATIO: f64 = 0.2;

/// Fraction of a segment that is *not* repeated at the start of the next
/// one when overlapping.
const OVERLAP_RESTART_RATIO: f64 = 0.85;

/// Return the index (in chars) just past the last complete sentence that
/// fits within `limit`, never choosing a boundary before `min_len`.
///
/// Returns `chars.len()` when the whole text already fits.
pub fn find_sentence_end(chars: &[char], min_len: usize, limit: usize) -> usize {
    if chars.len() <= limit {
        return chars.len();
    }
    let is_end = |c: char| SENTENCE_ENDINGS.contains(&c);

    let strict_floor = min_len + 2;
    for i in (strict_floor..=limit).rev() {
        if chars[i].is_whitespace() && is_end(chars[i - 1]) && !chars[i - 2].is_whitespace() {
            return i;
        }
    }
    for i in (strict_floor..=limit).rev() {
        if chars[i].is_whitespace() && is_end(chars[i - 1]) {
            return i;
        }
    }

    let loose_floor = (min_len + 1).max(1);
    for i in (loose_floor..=limit).rev() {
        if chars[i].is_whitespace() && chars[i - 1].is_alphanumeric() {
            return i;
        }
    }
    for i in (loose_floor..=limit).rev() {
        if chars[i].is_whitespace() {
            return i;
        }
    }

    limit
}

/// Split `text` into segments of at most `limit` chars, cutting at sentence
/// boundaries.
///
/// With `overlap`, each following segment restarts at a word boundary found
/// by scanning back from 85% of the previous cut, so neighbouring segments
/// share some trailing context. Always returns at least one segment
/// (possibly empty). A `limit` of zero is treated as one.
pub fn split_into_sentences(text: &str, limit: usize, overlap: bool) -> Vec<String> {
    let limit = limit.max(1);
    let min_len = (limit as f64 * MIN_SEGMENT_RATIO) as usize;
    let mut rest: Vec<char> = text.chars().collect();
    let mut segments = Vec::new();

    while rest.len() > limit {
        let cut = find_sentence_end(&rest, min_len, limit);
        segments.push(rest[..cut].iter().collect());

        let mut next = cut;
        if overlap {
            let start = (cut as f64 * OVERLAP_RESTART_RATIO) as usize;
            if let Some(i) = (2..=start)
                .rev()
                .find(|&i| rest[i].is_alphanumeric() && rest[i - 1].is_whitespace())
            {
                next = i;
            }
        }
        rest.drain(..next);
    }

    segments.push(rest.into_iter().collect());
    segments
}

/// Truncate `text` to at most `limit` chars at a sentence boundary, appending
/// `…` when anything was cut.
pub fn truncate(text: &str, limit: usize) -> String {
    if limit == 0 {
        return String::new();
    }
    if text.chars().count() <= limit {
        return text.to_string();
    }
    let segments = split_into_sentences(text, limit.saturating_sub(1), false);
    let mut first = segments.into_iter().next().unwrap_or_default();
    first.push('…');
    first
}
