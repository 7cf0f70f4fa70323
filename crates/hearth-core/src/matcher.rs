// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use hearth_config::MatcherConfig;

/// Words too common to carry meaning when matching role descriptions.
const STOP_WORDS: &[&str] = &[
    "the", "and", "for", "are", "was", "were", "been", "being", "with", "that", "this", "these",
    "those", "from", "will", "would", "should", "could", "can", "may", "might", "must", "have",
    "has", "had", "not", "but", "you", "your", "our", "their", "its", "all", "any", "some",
    "who", "what", "when", "where", "which", "how", "why", "about", "into", "onto", "over",
    "under", "then", "than", "also", "very", "just", "only", "does", "did", "doing",
];

/// Built-in synonym groups.  Two tokens are synonym peers when they appear
/// in the same group; `add_synonyms` extends the table at runtime.
const SYNONYM_GROUPS: &[&[&str]] = &[
    &["developer", "engineer", "coder", "programmer"],
    &["research", "analyze", "investigate", "study", "examine"],
    &["write", "compose", "draft", "author"],
    &["writer", "copywriter", "editor"],
    &["review", "critique", "evaluate", "assess"],
    &["design", "architect", "blueprint"],
    &["test", "verify", "validate", "check"],
    &["data", "dataset", "information", "stats"],
    &["report", "summary", "digest", "briefing"],
    &["manage", "coordinate", "organize", "oversee"],
    &["build", "create", "make", "construct"],
    &["fix", "repair", "debug", "troubleshoot"],
    &["search", "find", "locate", "lookup"],
    &["translate", "localize", "interpret"],
    &["marketing", "promotion", "advertising", "outreach"],
    &["finance", "budget", "accounting", "bookkeeping"],
    &["legal", "law", "compliance", "regulatory"],
    &["security", "secure", "protect", "harden"],
    &["deploy", "release", "ship", "launch"],
    &["monitor", "watch", "observe", "track"],
    &["teach", "explain", "tutor", "instruct"],
    &["optimize", "improve", "enhance", "tune"],
    &["assistant", "helper", "aide", "specialist"],
    &["analyst", "specialist", "expert", "consultant"],
];

/// The winning candidate from [`HybridMatcher::find_best`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BestMatch {
    /// Index into the candidate slice
    pub index: usize,
    pub score: f64,
}

/// Three-dimensional token scorer used for both sub-agent reuse and
/// template selection: exact keyword overlap, fuzzy edit-distance
/// similarity, and synonym-group expansion, combined as a weighted sum.
pub struct HybridMatcher {
    config: MatcherConfig,
    synonyms: Vec<Vec<String>>,
}

impl HybridMatcher {
    pub fn new(config: MatcherConfig) -> Self {
        let synonyms = SYNONYM_GROUPS
            .iter()
            .map(|group| group.iter().map(|s| s.to_string()).collect())
            .collect();
        Self { config, synonyms }
    }

    /// Register an extra synonym group at runtime.  Words are normalized
    /// like query tokens; a group with fewer than two usable words is a
    /// no-op.
    pub fn add_synonyms(&mut self, group: &[&str]) {
        let usable: Vec<String> = group
            .iter()
            .flat_map(|w| tokenize(w))
            .collect();
        if usable.len() < 2 {
            return;
        }
        self.synonyms.push(usable);
    }

    /// Score how well `query` matches `target` in [0, 1].
    pub fn score(&self, query: &str, target: &str) -> f64 {
        let query_tokens = tokenize(query);
        let target_tokens = tokenize(target);
        if query_tokens.is_empty() || target_tokens.is_empty() {
            return 0.0;
        }

        let keyword = keyword_overlap(&query_tokens, &target_tokens);
        let fuzzy = fuzzy_score(&query_tokens, &target_tokens);
        let synonym = self.synonym_score(&query_tokens, &target_tokens);

        let weighted = keyword * self.config.keyword_weight
            + fuzzy * self.config.fuzzy_weight
            + synonym * self.config.synonym_weight;
        weighted.clamp(0.0, 1.0)
    }

    /// The highest-scoring candidate whose final score meets `min_score`.
    /// Ties break in favour of the earliest candidate.
    pub fn find_best(&self, query: &str, candidates: &[String]) -> Option<BestMatch> {
        self.find_best_with_threshold(query, candidates, self.config.min_score)
    }

    /// Like [`find_best`] with an explicit threshold (sub-agent reuse uses
    /// the stricter `reuse_min_score`).
    pub fn find_best_with_threshold(
        &self,
        query: &str,
        candidates: &[String],
        min_score: f64,
    ) -> Option<BestMatch> {
        let mut best: Option<BestMatch> = None;
        for (index, candidate) in candidates.iter().enumerate() {
            let score = self.score(query, candidate);
            // The epsilon keeps a score assembled from weighted thirds from
            // missing a threshold it equals on paper.
            if score + 1e-9 < min_score {
                continue;
            }
            match best {
                Some(b) if score <= b.score => {}
                _ => best = Some(BestMatch { index, score }),
            }
        }
        best
    }

    /// Fraction of query tokens that are absent from the target but have a
    /// synonym-group peer present in it.
    fn synonym_score(&self, query_tokens: &[String], target_tokens: &[String]) -> f64 {
        let hits = query_tokens
            .iter()
            .filter(|q| !target_tokens.contains(q))
            .filter(|q| self.has_synonym_in(q, target_tokens))
            .count();
        hits as f64 / query_tokens.len() as f64
    }

    fn has_synonym_in(&self, token: &str, target_tokens: &[String]) -> bool {
        self.synonyms
            .iter()
            .filter(|group| group.iter().any(|w| w == token))
            .any(|group| {
                target_tokens
                    .iter()
                    .any(|t| t != token && group.iter().any(|w| w == t))
            })
    }
}

/// Lowercase, strip punctuation to whitespace, split, and drop stop words
/// and tokens of length ≤ 2.
pub fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .filter(|t| t.len() > 2)
        .filter(|t| !STOP_WORDS.contains(t))
        .map(String::from)
        .collect()
}

fn keyword_overlap(query_tokens: &[String], target_tokens: &[String]) -> f64 {
    let matches = query_tokens
        .iter()
        .filter(|q| target_tokens.contains(q))
        .count();
    let denom = query_tokens.len().min(target_tokens.len());
    matches as f64 / denom as f64
}

/// Mean of each query token's best similarity against the target tokens,
/// counting only contributions above 0.5.  Tokens below that bar are left
/// out of the mean entirely so weak accidental resemblance neither
/// accumulates nor dilutes the strong matches.
fn fuzzy_score(query_tokens: &[String], target_tokens: &[String]) -> f64 {
    let contributions: Vec<f64> = query_tokens
        .iter()
        .filter_map(|q| {
            let best = target_tokens
                .iter()
                .map(|t| token_similarity(q, t))
                .fold(0.0_f64, f64::max);
            (best > 0.5).then_some(best)
        })
        .collect();
    if contributions.is_empty() {
        return 0.0;
    }
    contributions.iter().sum::<f64>() / contributions.len() as f64
}

fn token_similarity(a: &str, b: &str) -> f64 {
    if a == b {
        return 1.0;
    }
    if a.len() >= 4 && b.len() >= 4 && (a.contains(b) || b.contains(a)) {
        return 0.8;
    }
    let max_len = a.chars().count().max(b.chars().count());
    if max_len == 0 {
        return 0.0;
    }
    1.0 - levenshtein(a, b) as f64 / max_len as f64
}

fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0usize; b.len() + 1];
    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = if ca == cb { 0 } else { 1 };
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
