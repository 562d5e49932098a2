//! Token-based relevance scoring.
//!
//! Pure functions: a query is split into lowercase tokens, and each text
//! field is scored by how the tokens occur in it. Every occurrence lands in
//! exactly one tier, so nothing is counted twice:
//!
//! | tier            | condition                                   | points |
//! |-----------------|---------------------------------------------|--------|
//! | exact word      | non-word char (or edge) on both sides       | 50     |
//! | word prefix     | non-word char (or edge) before, word after  | 30     |
//! | substring       | anything else                               | 10     |
//!
//! When every query token hits a field at least once, that field's score is
//! multiplied by [`ALL_TOKENS_BONUS`]. Tokens are matched as literal text.

use std::borrow::Cow;

pub const EXACT_WORD_POINTS: f64 = 50.0;
pub const WORD_PREFIX_POINTS: f64 = 30.0;
pub const SUBSTRING_POINTS: f64 = 10.0;
pub const ALL_TOKENS_BONUS: f64 = 1.5;

/// A scored text field of a record type `T`.
pub struct FieldWeight<T> {
    pub name: &'static str,
    pub weight: f64,
    pub text: fn(&T) -> Cow<'_, str>,
}

impl<T> Clone for FieldWeight<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for FieldWeight<T> {}

impl<T> std::fmt::Debug for FieldWeight<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FieldWeight")
            .field("name", &self.name)
            .field("weight", &self.weight)
            .finish()
    }
}

/// Per-occurrence tier counts for one token in one text.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TokenHits {
    pub exact: usize,
    pub prefix: usize,
    pub substring: usize,
}

impl TokenHits {
    pub fn points(&self) -> f64 {
        self.exact as f64 * EXACT_WORD_POINTS
            + self.prefix as f64 * WORD_PREFIX_POINTS
            + self.substring as f64 * SUBSTRING_POINTS
    }
}

/// Split a query into lowercase, non-empty, whitespace-delimited tokens.
pub fn tokenize(query: &str) -> Vec<String> {
    query
        .split_whitespace()
        .map(|t| t.to_lowercase())
        .collect()
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Classify every non-overlapping occurrence of `token` in `text`.
///
/// Both arguments must already be lowercase. The search cursor advances by
/// the token length after each hit, so `"aa"` occurs twice in `"aaaa"`.
pub fn count_hits(token: &str, text: &str) -> TokenHits {
    let mut hits = TokenHits::default();
    if token.is_empty() {
        return hits;
    }

    for (start, matched) in text.match_indices(token) {
        let end = start + matched.len();
        let boundary_before = text[..start].chars().next_back().map_or(true, |c| !is_word_char(c));
        let boundary_after = text[end..].chars().next().map_or(true, |c| !is_word_char(c));

        match (boundary_before, boundary_after) {
            (true, true) => hits.exact += 1,
            (true, false) => hits.prefix += 1,
            _ => hits.substring += 1,
        }
    }

    hits
}

/// Score one text field against pre-tokenized query terms.
pub fn score_field(tokens: &[String], text: &str) -> f64 {
    if tokens.is_empty() || text.is_empty() {
        return 0.0;
    }
    score_lowered(tokens, &text.to_lowercase())
}

/// Like [`score_field`], for text that is already lowercase.
pub fn score_lowered(tokens: &[String], text: &str) -> f64 {
    if tokens.is_empty() || text.is_empty() {
        return 0.0;
    }

    let mut total = 0.0;
    let mut matched = 0;

    for token in tokens {
        let points = count_hits(token, text).points();
        if points > 0.0 {
            matched += 1;
            total += points;
        }
    }

    if matched == tokens.len() {
        total * ALL_TOKENS_BONUS
    } else {
        total
    }
}

/// Weighted sum of field scores for one record. Empty fields are skipped.
pub fn score_record<T>(tokens: &[String], record: &T, fields: &[FieldWeight<T>]) -> f64 {
    fields
        .iter()
        .map(|field| {
            let text = (field.text)(record);
            if text.is_empty() {
                0.0
            } else {
                score_field(tokens, &text) * field.weight
            }
        })
        .sum()
}

/// Weighted sum over pre-lowered field text, aligned index-for-index with `fields`.
pub fn score_lowered_fields<T>(tokens: &[String], texts: &[String], fields: &[FieldWeight<T>]) -> f64 {
    fields
        .iter()
        .zip(texts)
        .map(|(field, text)| score_lowered(tokens, text) * field.weight)
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toks(q: &str) -> Vec<String> {
        tokenize(q)
    }

    #[test]
    fn test_tokenize_lowercases_and_splits() {
        assert_eq!(tokenize("  Presidential\tELECTION\n2028 "), vec!["presidential", "election", "2028"]);
    }

    #[test]
    fn test_tokenize_empty_inputs() {
        assert!(tokenize("").is_empty());
        assert!(tokenize("   \t\n").is_empty());
    }

    #[test]
    fn test_empty_tokens_score_zero() {
        assert_eq!(score_field(&[], "anything at all"), 0.0);
    }

    #[test]
    fn test_exact_word_hit() {
        // One token, one exact hit, all tokens matched: 50 * 1.5.
        assert_eq!(score_field(&toks("election"), "Presidential Election 2028"), 75.0);
    }

    #[test]
    fn test_prefix_hit() {
        let hits = count_hits("elect", "presidential election");
        assert_eq!(hits, TokenHits { exact: 0, prefix: 1, substring: 0 });
        assert_eq!(score_field(&toks("elect"), "Presidential Election"), 45.0);
    }

    #[test]
    fn test_substring_hit() {
        let hits = count_hits("ident", "presidential");
        assert_eq!(hits, TokenHits { exact: 0, prefix: 0, substring: 1 });
        assert_eq!(score_field(&toks("ident"), "Presidential"), 15.0);
    }

    #[test]
    fn test_tiers_are_not_double_counted() {
        // "win" is exact once, a prefix of "winner" once, and inside "twins" once.
        let hits = count_hits("win", "win the winner twins");
        assert_eq!(hits, TokenHits { exact: 1, prefix: 1, substring: 1 });
        assert_eq!(hits.points(), 90.0);
    }

    #[test]
    fn test_non_overlapping_substring_count() {
        // Leading hit is a word prefix, the second one is mid-word.
        assert_eq!(count_hits("aa", "aaaa"), TokenHits { exact: 0, prefix: 1, substring: 1 });
    }

    #[test]
    fn test_bonus_only_when_all_tokens_match() {
        let text = "Super Bowl Winner 2028";
        // "bowl" exact (50) + "2028" exact (50), both matched → 150.
        assert_eq!(score_field(&toks("bowl 2028"), text), 150.0);
        // "presidential" misses → no bonus, 50 from "2028" only.
        assert_eq!(score_field(&toks("presidential 2028"), text), 50.0);
    }

    #[test]
    fn test_metacharacters_are_literal() {
        assert!(score_field(&toks("C++"), "Will C++ be the top language?") > 0.0);
        assert_eq!(count_hits("c++", "will c++ win"), TokenHits { exact: 1, prefix: 0, substring: 0 });
        assert!(score_field(&toks("$100,000"), "Bitcoin above $100,000 by June") > 0.0);
        assert_eq!(score_field(&toks("b.tc"), "bitcoin"), 0.0);
        assert_eq!(score_field(&toks("(a|b)*"), "a b ab"), 0.0);
        assert!(score_field(&toks("(a|b)*"), "pattern (a|b)* here") > 0.0);
    }

    #[test]
    fn test_unicode_text_is_lowercased() {
        assert_eq!(score_field(&toks("zürich"), "ZÜRICH weather"), 75.0);
    }

    struct Doc {
        title: String,
        notes: String,
    }

    const FIELDS: &[FieldWeight<Doc>] = &[
        FieldWeight {
            name: "title",
            weight: 1.0,
            text: |d| Cow::Borrowed(d.title.as_str()),
        },
        FieldWeight {
            name: "notes",
            weight: 0.5,
            text: |d| Cow::Borrowed(d.notes.as_str()),
        },
    ];

    #[test]
    fn test_score_record_weights_fields() {
        let doc = Doc {
            title: "Fed rate cut".into(),
            notes: "rate decision".into(),
        };
        // title: 50 * 1.5 = 75; notes: 75 * 0.5 = 37.5
        assert_eq!(score_record(&toks("rate"), &doc, FIELDS), 112.5);
    }

    #[test]
    fn test_prepared_text_scores_like_raw_record() {
        let doc = Doc {
            title: "Fed Rate Cut".into(),
            notes: "RATE decision".into(),
        };
        let texts: Vec<String> = FIELDS.iter().map(|f| (f.text)(&doc).to_lowercase()).collect();
        let q = toks("rate cut");
        assert_eq!(score_lowered_fields(&q, &texts, FIELDS), score_record(&q, &doc, FIELDS));
    }

    #[test]
    fn test_score_record_full_match_beats_partial() {
        let full = Doc { title: "Presidential Election 2028".into(), notes: String::new() };
        let partial = Doc { title: "Super Bowl Winner 2028".into(), notes: String::new() };
        let substring_only = Doc { title: "Presidentiality 20286".into(), notes: String::new() };
        let q = toks("presidential 2028");
        let full_score = score_record(&q, &full, FIELDS);
        assert!(full_score > score_record(&q, &partial, FIELDS));
        assert!(full_score > score_record(&q, &substring_only, FIELDS));
    }
}
