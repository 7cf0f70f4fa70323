// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Character-composition token estimation.
//!
//! ASCII text averages ~4 characters per token, CJK text ~1.5.  Counting
//! is done per Unicode code point (not UTF-16 units), so multi-byte
//! scripts are weighted correctly.

/// True for code points in the major CJK blocks (unified ideographs,
/// kana, hangul, compatibility ideographs).
fn is_cjk(c: char) -> bool {
    matches!(c,
        '\u{3040}'..='\u{30FF}'   // hiragana + katakana
        | '\u{3400}'..='\u{4DBF}' // CJK extension A
        | '\u{4E00}'..='\u{9FFF}' // CJK unified ideographs
        | '\u{AC00}'..='\u{D7AF}' // hangul syllables
        | '\u{F900}'..='\u{FAFF}' // compatibility ideographs
        | '\u{FF00}'..='\u{FFEF}' // fullwidth forms
    )
}

/// Estimate the token count of `text`.
pub fn estimate_tokens(text: &str) -> usize {
    let mut cjk = 0usize;
    let mut other = 0usize;
    for c in text.chars() {
        if is_cjk(c) {
            cjk += 1;
        } else {
            other += 1;
        }
    }
    let estimate = other as f64 / 4.0 + cjk as f64 / 1.5;
    estimate.ceil() as usize
}

/// Truncate `text` to roughly `budget` tokens.
///
/// The cut lands at the last newline (or space) past the midpoint of the
/// kept prefix so the result ends on a natural boundary; if the estimate
/// is still over budget the trim repeats.
pub fn truncate_to_tokens(text: &str, budget: usize) -> String {
    if estimate_tokens(text) <= budget {
        return text.to_string();
    }

    let mut result = text.to_string();
    while estimate_tokens(&result) > budget && !result.is_empty() {
        let current = estimate_tokens(&result);
        let chars: Vec<char> = result.chars().collect();
        let keep_chars = (chars.len() * budget / current.max(1)).min(chars.len().saturating_sub(1));
        let prefix: String = chars[..keep_chars].iter().collect();

        let midpoint = prefix.len() / 2;
        let cut = prefix
            .rfind('\n')
            .filter(|&p| p > midpoint)
            .or_else(|| prefix.rfind(' ').filter(|&p| p > midpoint))
            .unwrap_or(prefix.len());
        result = prefix[..cut].trim_end().to_string();
    }
    result
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
