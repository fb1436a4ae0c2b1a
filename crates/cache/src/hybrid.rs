//! Lexical n-gram overlay for hybrid candidate scoring.

use heim_agent_text_processing::canonicalize;

/// Hybrid scoring configuration: the final candidate score becomes
/// `alpha * semantic + (1 - alpha) * lexical`.
#[derive(Debug, Clone, Copy)]
pub struct HybridConfig {
    pub alpha: f64,
    pub ngram_size: usize,
}

impl HybridConfig {
    pub fn combine(&self, semantic: f64, lexical: f64) -> f64 {
        self.alpha * semantic + (1.0 - self.alpha) * lexical
    }
}

fn ngrams(tokens: &[String], n: usize) -> Vec<String> {
    if n <= 1 {
        return tokens.to_vec();
    }
    if tokens.len() < n {
        // Shorter than one n-gram: fall back to the whole token sequence.
        return vec![tokens.join(" ")];
    }
    tokens.windows(n).map(|w| w.join(" ")).collect()
}

/// Jaccard-style n-gram overlap over canonicalized tokens, in `0..=1`.
pub fn ngram_overlap(a: &str, b: &str, n: usize) -> f64 {
    let tokens_a: Vec<String> = canonicalize(a)
        .split_whitespace()
        .map(str::to_string)
        .collect();
    let tokens_b: Vec<String> = canonicalize(b)
        .split_whitespace()
        .map(str::to_string)
        .collect();
    if tokens_a.is_empty() || tokens_b.is_empty() {
        return 0.0;
    }

    let grams_a = ngrams(&tokens_a, n);
    let grams_b = ngrams(&tokens_b, n);

    let set_a: std::collections::HashSet<&String> = grams_a.iter().collect();
    let set_b: std::collections::HashSet<&String> = grams_b.iter().collect();

    let intersection = set_a.intersection(&set_b).count();
    let union = set_a.union(&set_b).count();
    if union == 0 {
        0.0
    } else {
        intersection as f64 / union as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identical_texts_score_one() {
        assert!((ngram_overlap("Schalte das Licht an", "Schalte das Licht an", 2) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_disjoint_texts_score_zero() {
        assert_eq!(ngram_overlap("Rollo runter", "Heizung wärmer", 2), 0.0);
    }

    #[test]
    fn test_partial_overlap_is_between() {
        let score = ngram_overlap(
            "Schalte das Licht in der Küche an",
            "Schalte das Licht im Büro an",
            2,
        );
        assert!(score > 0.0 && score < 1.0);
    }

    #[test]
    fn test_umlauts_are_folded() {
        // Canonicalization makes "Küche" and "Kueche" the same token.
        assert!(ngram_overlap("Licht Küche", "Licht Kueche", 1) > 0.99);
    }

    #[test]
    fn test_combine() {
        let config = HybridConfig {
            alpha: 0.7,
            ngram_size: 2,
        };
        assert!((config.combine(1.0, 0.0) - 0.7).abs() < 1e-9);
        assert!((config.combine(0.0, 1.0) - 0.3).abs() < 1e-9);
    }
}
