//! Name similarity scoring used by the identity matcher.

use std::collections::BTreeSet;

/// Scores how alike two security names are on a 0.0–1.0 scale.
pub trait NameSimilarity: Send + Sync {
    fn score(&self, a: &str, b: &str) -> f64;
}

/// Token-set ratio: compares the shared tokens of both names against each
/// name's remainder, so word order and extra suffixes ("SE", "PLC") weigh
/// little when the rest of the name agrees.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokenSetRatio;

impl NameSimilarity for TokenSetRatio {
    fn score(&self, a: &str, b: &str) -> f64 {
        let a_tokens = tokens(a);
        let b_tokens = tokens(b);
        if a_tokens.is_empty() || b_tokens.is_empty() {
            return 0.0;
        }

        let shared: Vec<&str> = a_tokens.intersection(&b_tokens).map(String::as_str).collect();
        let only_a: Vec<&str> = a_tokens.difference(&b_tokens).map(String::as_str).collect();
        let only_b: Vec<&str> = b_tokens.difference(&a_tokens).map(String::as_str).collect();

        // One name's tokens are a subset of the other's.
        if !shared.is_empty() && (only_a.is_empty() || only_b.is_empty()) {
            return 1.0;
        }

        let shared = shared.join(" ");
        let combine = |rest: &[&str]| {
            if shared.is_empty() {
                rest.join(" ")
            } else {
                format!("{shared} {}", rest.join(" "))
            }
        };
        let with_a = combine(&only_a);
        let with_b = combine(&only_b);

        let mut best = indel_ratio(&with_a, &with_b);
        if !shared.is_empty() {
            best = best
                .max(indel_ratio(&shared, &with_a))
                .max(indel_ratio(&shared, &with_b));
        }
        best
    }
}

fn tokens(name: &str) -> BTreeSet<String> {
    name.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// `2 * LCS / (len_a + len_b)`, i.e. one minus the normalised
/// insertion/deletion distance.
fn indel_ratio(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let total = a.len() + b.len();
    if total == 0 {
        return 1.0;
    }

    let mut previous = vec![0usize; b.len() + 1];
    let mut current = vec![0usize; b.len() + 1];
    for ca in &a {
        for (j, cb) in b.iter().enumerate() {
            current[j + 1] = if ca == cb {
                previous[j] + 1
            } else {
                previous[j + 1].max(current[j])
            };
        }
        std::mem::swap(&mut previous, &mut current);
    }
    let lcs = previous[b.len()];

    (2 * lcs) as f64 / total as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identical_and_reordered_names_score_one() {
        let scorer = TokenSetRatio;
        assert_eq!(scorer.score("ROYAL DUTCH SHELL", "ROYAL DUTCH SHELL"), 1.0);
        assert_eq!(scorer.score("DUTCH ROYAL SHELL", "royal dutch shell"), 1.0);
    }

    #[test]
    fn test_suffix_only_difference_scores_one() {
        let scorer = TokenSetRatio;
        assert_eq!(scorer.score("LVMH MOET HENNESSY", "LVMH MOET HENNESSY SE"), 1.0);
    }

    #[test]
    fn test_unrelated_names_score_low() {
        let scorer = TokenSetRatio;
        assert!(scorer.score("AIRBUS", "AIR LIQUIDE") < 0.6);
        assert!(scorer.score("SIEMENS", "VODAFONE GROUP") < 0.5);
    }

    #[test]
    fn test_near_spelling_scores_high() {
        let scorer = TokenSetRatio;
        let score = scorer.score("VOLKSWAGEN AG", "VOLKSWAGON AG");
        assert!(score > 0.9, "score was {score}");

        let split_word = scorer.score("TOTALENERGIES SE", "TOTAL ENERGIES SE");
        assert!(split_word < 0.9, "score was {split_word}");
    }

    #[test]
    fn test_empty_names_score_zero() {
        assert_eq!(TokenSetRatio.score("", "AIRBUS"), 0.0);
        assert_eq!(TokenSetRatio.score("...", "AIRBUS"), 0.0);
    }

    #[test]
    fn test_indel_ratio() {
        assert_eq!(indel_ratio("abc", "abc"), 1.0);
        assert_eq!(indel_ratio("abc", "xyz"), 0.0);
        assert!((indel_ratio("abcd", "abce") - 0.75).abs() < 1e-9);
    }
}
