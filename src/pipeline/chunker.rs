//! Splits a document into overlapping chunks sized by an estimated
//! token budget rather than a fixed character count, preferring
//! paragraph, then sentence, then word boundaries.

#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    pub index: usize,
    pub pos: usize,
    pub text: String,
}

const JAPANESE_TOKENS_PER_CHAR: f64 = 0.7;
const ASCII_TOKENS_PER_CHAR: f64 = 0.25;

fn is_japanese(c: char) -> bool {
    matches!(c as u32,
        0x3040..=0x309F // hiragana
        | 0x30A0..=0x30FF // katakana
        | 0x4E00..=0x9FFF // cjk unified ideographs
    )
}

/// Rough token-count estimate for a whole document.
pub fn estimate_tokens(text: &str) -> f64 {
    text.chars()
        .map(|c| if is_japanese(c) { JAPANESE_TOKENS_PER_CHAR } else { ASCII_TOKENS_PER_CHAR })
        .sum()
}

fn chars_per_token(text: &str) -> f64 {
    let tokens = estimate_tokens(text);
    if tokens <= 0.0 {
        1.0 / ASCII_TOKENS_PER_CHAR
    } else {
        text.chars().count() as f64 / tokens
    }
}

fn prev_char_boundary(text: &str, mut pos: usize) -> usize {
    while pos > 0 && !text.is_char_boundary(pos) {
        pos -= 1;
    }
    pos
}

/// Splits `text` into overlapping chunks so each chunk stays within
/// roughly `max_tokens` (estimated, per the document's own character
/// mix), with `overlap_tokens` of shared content between neighbors.
/// Documents under the threshold return a single chunk.
pub fn chunk_document(text: &str, max_tokens: usize, overlap_tokens: usize) -> Vec<Chunk> {
    if text.is_empty() {
        return Vec::new();
    }

    if estimate_tokens(text) < max_tokens as f64 * 1.2 {
        return vec![Chunk {
            index: 0,
            pos: 0,
            text: text.to_string(),
        }];
    }

    let ratio = chars_per_token(text);
    let chunk_chars = ((max_tokens as f64) * ratio).max(1.0) as usize;
    let overlap_chars = ((overlap_tokens as f64) * ratio) as usize;

    let mut chunks = Vec::new();
    let mut start = 0;

    while start < text.len() {
        let end_raw = (start + chunk_chars).min(text.len());
        let end = prev_char_boundary(text, end_raw);

        if end == text.len() || end <= start {
            chunks.push(Chunk {
                index: chunks.len(),
                pos: start,
                text: text[start..].to_string(),
            });
            break;
        }

        let split = find_split_point(text, end, start, chunk_chars);
        let split = prev_char_boundary(text, split).max(start);

        chunks.push(Chunk {
            index: chunks.len(),
            pos: start,
            text: text[start..split].to_string(),
        });

        let next_start_raw = if split > overlap_chars { split - overlap_chars } else { split };
        let next_start = prev_char_boundary(text, next_start_raw).max(start);

        start = if next_start <= start { split } else { next_start };
    }

    chunks
}

fn find_split_point(text: &str, target: usize, min_pos: usize, chunk_chars: usize) -> usize {
    let target = prev_char_boundary(text, target).max(min_pos);
    let search_window = (chunk_chars / 5).max(1);
    let search_start = target.saturating_sub(search_window).max(min_pos);
    let search_start = prev_char_boundary(text, search_start).max(min_pos);

    let region = &text[search_start..target];

    if let Some(pos) = region.rfind("\n\n") {
        let split = search_start + pos + 2;
        if split > min_pos {
            return split;
        }
    }
    if let Some(pos) = region.rfind(". ") {
        let split = search_start + pos + 2;
        if split > min_pos {
            return split;
        }
    }
    if let Some(pos) = region.rfind(".\n") {
        let split = search_start + pos + 2;
        if split > min_pos {
            return split;
        }
    }
    if let Some(pos) = region.rfind(' ') {
        let split = search_start + pos + 1;
        if split > min_pos {
            return split;
        }
    }

    target
}

/// `base_id · "_chunk_" · index`.
pub fn chunk_id(base_id: &str, index: usize) -> String {
    format!("{base_id}_chunk_{index}")
}

/// `(Part i/n)` annotation applied to a chunked document's title.
pub fn chunk_title(base_title: &str, index: usize, total: usize) -> String {
    if total <= 1 {
        base_title.to_string()
    } else {
        format!("{base_title} (Part {}/{})", index + 1, total)
    }
}
