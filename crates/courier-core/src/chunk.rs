//! Reply chunking.
//!
//! Transports cap outbound message size (Telegram 4096 chars, Teams ~4000).
//! Long backend replies are split on paragraph boundaries where possible,
//! sentence boundaries as a fallback, and hard-cut only when a single
//! sentence exceeds the budget. Multi-chunk replies are labeled `[i/N]`.

/// Reserved width for the `"[i/N] "` label (fits two-digit counts).
pub const LABEL_RESERVE: usize = 8;

/// Split `text` into chunks of at most `limit` bytes.
///
/// A text that already fits is returned as a single unlabeled chunk. When
/// splitting is needed, each chunk is assembled against `limit -
/// label_reserve` so the label prefix never pushes a chunk over the limit.
pub fn split_reply(text: &str, limit: usize, label_reserve: usize) -> Vec<String> {
    if text.len() <= limit {
        return vec![text.to_string()];
    }

    let budget = limit.saturating_sub(label_reserve);
    let mut chunks: Vec<String> = Vec::new();
    let mut current = String::new();

    for para in text.split("\n\n") {
        let candidate = if current.is_empty() {
            para.to_string()
        } else {
            format!("{current}\n\n{para}").trim().to_string()
        };

        if candidate.len() <= budget {
            current = candidate;
            continue;
        }

        if !current.is_empty() {
            chunks.push(std::mem::take(&mut current));
        }

        if para.len() > budget {
            split_paragraph(para, budget, &mut chunks, &mut current);
        } else {
            current = para.to_string();
        }
    }

    if !current.is_empty() {
        chunks.push(current);
    }

    if chunks.len() > 1 {
        let total = chunks.len();
        chunks = chunks
            .into_iter()
            .enumerate()
            .map(|(i, c)| format!("[{}/{total}] {c}", i + 1))
            .collect();
    }

    chunks
}

/// Split an oversized paragraph into sentence-like units, hard-cutting any
/// unit that alone exceeds the budget. Leftover text stays in `current` so
/// the caller can keep packing subsequent paragraphs into it.
fn split_paragraph(para: &str, budget: usize, chunks: &mut Vec<String>, current: &mut String) {
    let sentences = para.replace(". ", ".\n");
    for sentence in sentences.split('\n') {
        let candidate = if current.is_empty() {
            sentence.to_string()
        } else {
            format!("{current} {sentence}").trim().to_string()
        };

        if candidate.len() <= budget {
            *current = candidate;
            continue;
        }

        if !current.is_empty() {
            chunks.push(std::mem::take(current));
        }

        // No semantic boundary left — cut fixed-size slices.
        let mut rest = sentence;
        while rest.len() > budget {
            let cut = floor_char_boundary(rest, budget);
            chunks.push(rest[..cut].to_string());
            rest = &rest[cut..];
        }
        *current = rest.to_string();
    }
}

/// Largest index ≤ `max` that falls on a char boundary of `s`.
fn floor_char_boundary(s: &str, max: usize) -> usize {
    let mut idx = max.min(s.len());
    while idx > 0 && !s.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}
