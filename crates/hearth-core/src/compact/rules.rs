// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Rule-based pre-compression applied to each message body before the
//! summarization call.  Every stage is deterministic; the order matters
//! and mirrors the pipeline documentation: punctuation normalization,
//! whitespace cleanup, exact-line dedup, empty-section removal, table
//! compression, optional emoji strip, near-duplicate bullet merging,
//! short-bullet run merging, and a final cleanup sweep.

/// Run all pre-compression stages over one message body.
pub fn precompress(text: &str, strip_emoji: bool) -> String {
    let mut s = normalize_cjk_punctuation(text);
    s = trim_lines_and_collapse_blanks(&s);
    s = dedup_exact_lines(&s);
    s = remove_empty_sections(&s);
    s = compress_tables(&s);
    if strip_emoji {
        s = strip_emoji_chars(&s);
    }
    s = merge_similar_bullets(&s);
    s = merge_short_bullet_runs(&s);
    final_cleanup(&s)
}

/// (a) Normalize fullwidth CJK punctuation to its ASCII counterpart.
fn normalize_cjk_punctuation(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            '，' => ',',
            '。' => '.',
            '：' => ':',
            '；' => ';',
            '！' => '!',
            '？' => '?',
            '（' => '(',
            '）' => ')',
            '［' => '[',
            '］' => ']',
            '｛' => '{',
            '｝' => '}',
            '「' | '」' | '『' | '』' => '"',
            '、' => ',',
            '　' => ' ',
            other => other,
        })
        .collect()
}

/// (b) Trim per-line trailing whitespace and collapse runs of three or
/// more blank lines down to two.
fn trim_lines_and_collapse_blanks(text: &str) -> String {
    let mut out: Vec<&str> = Vec::new();
    let mut blanks = 0usize;
    for line in text.lines() {
        let trimmed = line.trim_end();
        if trimmed.is_empty() {
            blanks += 1;
            if blanks <= 2 {
                out.push("");
            }
        } else {
            blanks = 0;
            out.push(trimmed);
        }
    }
    out.join("\n")
}

/// (c) Deduplicate exact-duplicate non-empty lines, keeping the first
/// occurrence.
fn dedup_exact_lines(text: &str) -> String {
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::new();
    for line in text.lines() {
        if line.trim().is_empty() {
            out.push(line);
            continue;
        }
        if seen.insert(line.to_string()) {
            out.push(line);
        }
    }
    out.join("\n")
}

fn header_level(line: &str) -> Option<usize> {
    let hashes = line.chars().take_while(|&c| c == '#').count();
    if hashes > 0 && line.chars().nth(hashes).map_or(true, |c| c == ' ') {
        Some(hashes)
    } else {
        None
    }
}

/// (d) Remove markdown sections that contain no body text and no
/// deeper-level child header.
fn remove_empty_sections(text: &str) -> String {
    let lines: Vec<&str> = text.lines().collect();
    let mut keep = vec![true; lines.len()];
    for (i, line) in lines.iter().enumerate() {
        let Some(level) = header_level(line) else {
            continue;
        };
        let mut has_content = false;
        for next in &lines[i + 1..] {
            match header_level(next) {
                Some(next_level) if next_level <= level => break,
                Some(_) => {
                    has_content = true;
                    break;
                }
                None => {
                    if !next.trim().is_empty() {
                        has_content = true;
                        break;
                    }
                }
            }
        }
        if !has_content {
            keep[i] = false;
        }
    }
    lines
        .iter()
        .zip(&keep)
        .filter(|(_, k)| **k)
        .map(|(l, _)| *l)
        .collect::<Vec<_>>()
        .join("\n")
}

fn table_cells(line: &str) -> Option<Vec<String>> {
    let trimmed = line.trim();
    if !trimmed.starts_with('|') || !trimmed.ends_with('|') || trimmed.len() < 2 {
        return None;
    }
    let inner = &trimmed[1..trimmed.len() - 1];
    Some(inner.split('|').map(|c| c.trim().to_string()).collect())
}

fn is_separator_row(cells: &[String]) -> bool {
    cells
        .iter()
        .all(|c| !c.is_empty() && c.chars().all(|ch| ch == '-' || ch == ':'))
}

/// (e) Compress markdown tables.  Two-column tables become `- Key: Value`
/// lines, three- and four-column tables become one compact line per row,
/// and wider tables keep their rows pipe-delimited but shed the header and
/// separator.
fn compress_tables(text: &str) -> String {
    let lines: Vec<&str> = text.lines().collect();
    let mut out: Vec<String> = Vec::new();
    let mut i = 0usize;
    while i < lines.len() {
        let Some(header) = table_cells(lines[i]) else {
            out.push(lines[i].to_string());
            i += 1;
            continue;
        };
        // A table needs a separator row right after the header.
        let separator = lines
            .get(i + 1)
            .and_then(|l| table_cells(l))
            .filter(|cells| is_separator_row(cells));
        if separator.is_none() {
            out.push(lines[i].to_string());
            i += 1;
            continue;
        }

        let mut rows: Vec<Vec<String>> = Vec::new();
        let mut j = i + 2;
        while j < lines.len() {
            match table_cells(lines[j]) {
                Some(cells) => {
                    rows.push(cells);
                    j += 1;
                }
                None => break,
            }
        }

        let width = header.len();
        for row in &rows {
            match width {
                0 | 1 => out.push(format!("- {}", row.join(" "))),
                2 => out.push(format!(
                    "- {}: {}",
                    row.first().map(String::as_str).unwrap_or(""),
                    row.get(1).map(String::as_str).unwrap_or("")
                )),
                3 | 4 => {
                    let first = row.first().map(String::as_str).unwrap_or("").to_string();
                    let rest: Vec<String> = header
                        .iter()
                        .zip(row.iter())
                        .skip(1)
                        .map(|(h, v)| format!("{h}={v}"))
                        .collect();
                    out.push(format!("{first}, {}", rest.join(", ")));
                }
                _ => out.push(format!("| {} |", row.join(" | "))),
            }
        }
        i = j;
    }
    out.join("\n")
}

/// (f) Strip emoji and pictographic symbols.
fn strip_emoji_chars(text: &str) -> String {
    text.chars()
        .filter(|&c| {
            !matches!(c,
                '\u{1F300}'..='\u{1FAFF}'  // pictographs, emoticons, symbols
                | '\u{2600}'..='\u{27BF}'  // misc symbols + dingbats
                | '\u{FE0F}'               // variation selector
                | '\u{200D}'               // zero-width joiner
            )
        })
        .collect()
}

fn bullet_content(line: &str) -> Option<&str> {
    let trimmed = line.trim_start();
    trimmed
        .strip_prefix("- ")
        .or_else(|| trimmed.strip_prefix("* "))
        .or_else(|| trimmed.strip_prefix("+ "))
}

/// Dice coefficient over character bigrams, used for bullet-level
/// near-duplicate detection.  Distinct from the word-trigram Jaccard used
/// for whole-message dedup.
pub fn bigram_similarity(a: &str, b: &str) -> f64 {
    let bigrams = |s: &str| -> std::collections::HashSet<(char, char)> {
        let chars: Vec<char> = s.to_lowercase().chars().collect();
        chars.windows(2).map(|w| (w[0], w[1])).collect()
    };
    let a_set = bigrams(a);
    let b_set = bigrams(b);
    if a_set.is_empty() || b_set.is_empty() {
        return if a.to_lowercase() == b.to_lowercase() {
            1.0
        } else {
            0.0
        };
    }
    let intersection = a_set.intersection(&b_set).count();
    2.0 * intersection as f64 / (a_set.len() + b_set.len()) as f64
}

/// (g) Merge consecutive near-duplicate bullet lines (bigram similarity
/// ≥ 0.8), keeping the longer one.
fn merge_similar_bullets(text: &str) -> String {
    let mut out: Vec<String> = Vec::new();
    for line in text.lines() {
        if let Some(current) = bullet_content(line) {
            let verdict = out
                .last()
                .and_then(|prev| bullet_content(prev))
                .map(|prev_content| {
                    (
                        bigram_similarity(prev_content, current) >= 0.8,
                        current.len() > prev_content.len(),
                    )
                });
            if let Some((true, current_is_longer)) = verdict {
                if current_is_longer {
                    *out.last_mut().expect("non-empty") = line.to_string();
                }
                continue;
            }
        }
        out.push(line.to_string());
    }
    out.join("\n")
}

/// (h) Merge runs of more than two consecutive bullets whose content is at
/// most three words into a single comma-joined line.
fn merge_short_bullet_runs(text: &str) -> String {
    let lines: Vec<&str> = text.lines().collect();
    let mut out: Vec<String> = Vec::new();
    let mut run: Vec<&str> = Vec::new();

    let flush = |run: &mut Vec<&str>, out: &mut Vec<String>| {
        if run.len() > 2 {
            out.push(format!("- {}", run.join(", ")));
        } else {
            for item in run.iter() {
                out.push(format!("- {item}"));
            }
        }
        run.clear();
    };

    for line in &lines {
        match bullet_content(line) {
            Some(content) if content.split_whitespace().count() <= 3 => {
                run.push(content);
            }
            _ => {
                flush(&mut run, &mut out);
                out.push(line.to_string());
            }
        }
    }
    flush(&mut run, &mut out);
    out.join("\n")
}

fn is_decorative(line: &str) -> bool {
    let trimmed = line.trim();
    trimmed.len() >= 3
        && trimmed
            .chars()
            .all(|c| matches!(c, '-' | '=' | '*' | '_' | '~' | '─' | '━'))
}

/// (i) Final whitespace collapse and decorative-line removal.
fn final_cleanup(text: &str) -> String {
    let no_decorations: Vec<&str> = text.lines().filter(|l| !is_decorative(l)).collect();
    trim_lines_and_collapse_blanks(&no_decorations.join("\n"))
        .trim()
        .to_string()
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fullwidth_punctuation_becomes_ascii() {
        assert_eq!(
            normalize_cjk_punctuation("はい，そうです。質問？"),
            "はい,そうです.質問?"
        );
    }

    #[test]
    fn trailing_whitespace_is_trimmed() {
        assert_eq!(trim_lines_and_collapse_blanks("a  \nb\t"), "a\nb");
    }

    #[test]
    fn three_or_more_blank_lines_collapse_to_two() {
        assert_eq!(trim_lines_and_collapse_blanks("a\n\n\n\n\nb"), "a\n\n\nb");
        assert_eq!(trim_lines_and_collapse_blanks("a\n\nb"), "a\n\nb");
    }

    #[test]
    fn duplicate_lines_keep_first_occurrence() {
        assert_eq!(
            dedup_exact_lines("alpha\nbeta\nalpha\ngamma"),
            "alpha\nbeta\ngamma"
        );
    }

    #[test]
    fn blank_lines_are_not_deduplicated() {
        assert_eq!(dedup_exact_lines("a\n\nb\n\nc"), "a\n\nb\n\nc");
    }

    #[test]
    fn empty_markdown_section_is_removed() {
        let text = "## Results\n\n## Notes\nsome text";
        let cleaned = remove_empty_sections(text);
        assert!(!cleaned.contains("## Results"));
        assert!(cleaned.contains("## Notes"));
    }

    #[test]
    fn section_with_deeper_child_is_kept() {
        let text = "# Parent\n## Child\ncontent";
        let cleaned = remove_empty_sections(text);
        assert!(cleaned.contains("# Parent"));
    }

    #[test]
    fn two_column_table_becomes_key_value_bullets() {
        let table = "| Key | Value |\n| --- | --- |\n| Name | Ada |\n| Role | Analyst |";
        let out = compress_tables(table);
        assert!(out.contains("- Name: Ada"));
        assert!(out.contains("- Role: Analyst"));
        assert!(!out.contains('|'));
    }

    #[test]
    fn three_column_table_becomes_compact_lines() {
        let table = "| City | Pop | Area |\n| - | - | - |\n| Oslo | 700k | 454 |";
        let out = compress_tables(table);
        assert_eq!(out, "Oslo, Pop=700k, Area=454");
    }

    #[test]
    fn wide_table_keeps_rows_without_header() {
        let table =
            "| a | b | c | d | e |\n| - | - | - | - | - |\n| 1 | 2 | 3 | 4 | 5 |";
        let out = compress_tables(table);
        assert!(out.contains("| 1 | 2 | 3 | 4 | 5 |"));
        assert!(!out.contains("| a | b | c | d | e |"));
    }

    #[test]
    fn pipe_line_without_separator_is_not_a_table() {
        let text = "| just some text |";
        assert_eq!(compress_tables(text), text);
    }

    #[test]
    fn emoji_are_stripped_when_enabled() {
        assert_eq!(strip_emoji_chars("done ✅ 🎉 next"), "done   next");
    }

    #[test]
    fn near_duplicate_bullets_keep_the_longer() {
        let text = "- fetch the quarterly report\n- fetch the quarterly reports today";
        let out = merge_similar_bullets(text);
        assert_eq!(out, "- fetch the quarterly reports today");
    }

    #[test]
    fn dissimilar_bullets_are_untouched() {
        let text = "- buy groceries\n- call the dentist";
        assert_eq!(merge_similar_bullets(text), text);
    }

    #[test]
    fn short_bullet_runs_merge_when_more_than_two() {
        let text = "- apples\n- oranges\n- pears";
        assert_eq!(merge_short_bullet_runs(text), "- apples, oranges, pears");
    }

    #[test]
    fn two_short_bullets_stay_separate() {
        let text = "- apples\n- oranges";
        assert_eq!(merge_short_bullet_runs(text), text);
    }

    #[test]
    fn long_bullets_break_the_run() {
        let text = "- apples\n- oranges\n- a very long bullet about many things\n- pears";
        let out = merge_short_bullet_runs(text);
        assert!(out.contains("- apples"));
        assert!(out.contains("- a very long bullet about many things"));
    }

    #[test]
    fn decorative_lines_are_removed() {
        let out = final_cleanup("title\n-----\nbody\n=====");
        assert_eq!(out, "title\nbody");
    }

    #[test]
    fn bigram_similarity_bounds() {
        assert_eq!(bigram_similarity("same text", "same text"), 1.0);
        assert!(bigram_similarity("alpha", "omega") < 0.5);
        assert_eq!(bigram_similarity("", ""), 1.0);
    }

    #[test]
    fn precompress_pipeline_end_to_end() {
        let text = "## Empty Section\n\n## Facts\n| Key | Value |\n| - | - |\n| Name | Ada |\n\n\n\n- red\n- green\n- blue\nfinal line   ";
        let out = precompress(text, true);
        assert!(!out.contains("Empty Section"));
        assert!(out.contains("- Name: Ada"));
        assert!(out.contains("- red, green, blue"));
        assert!(out.contains("final line"));
    }
}
