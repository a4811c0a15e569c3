use std::collections::BTreeSet;

const TOKEN_WEIGHT: f64 = 0.6;
const BIGRAM_WEIGHT: f64 = 0.4;

const STOPWORDS: &[&str] = &[
    "a", "an", "the", "of", "for", "and", "or", "in", "on", "to", "with", "by", "at", "from",
    "as", "via", "into", "its", "is", "are", "based", "using", "towards", "toward",
];

/// A title reduced to its comparable form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TitleKey {
    tokens: BTreeSet<String>,
    joined: String,
}

impl TitleKey {
    pub fn new(title: &str) -> Self {
        let tokens: BTreeSet<String> = normalize_title(title)
            .split_whitespace()
            .filter(|t| !STOPWORDS.contains(t))
            .map(stem)
            .collect();
        let joined = tokens.iter().cloned().collect::<Vec<_>>().join(" ");
        Self { tokens, joined }
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// 0.6 × token-set Dice + 0.4 × character-bigram Dice. Symmetric, in [0, 1].
    pub fn similarity(&self, other: &TitleKey) -> f64 {
        if self.is_empty() || other.is_empty() {
            return 0.0;
        }
        let shared = self.tokens.intersection(&other.tokens).count();
        let token_dice = 2.0 * shared as f64 / (self.tokens.len() + other.tokens.len()) as f64;
        let bigram_dice = strsim::sorensen_dice(&self.joined, &other.joined);
        (TOKEN_WEIGHT * token_dice + BIGRAM_WEIGHT * bigram_dice).clamp(0.0, 1.0)
    }
}

pub fn title_similarity(a: &str, b: &str) -> f64 {
    TitleKey::new(a).similarity(&TitleKey::new(b))
}

/// Lower case, every non-alphanumeric character (hyphens included) becomes a
/// space, whitespace collapsed.
pub fn normalize_title(title: &str) -> String {
    let lowercase = title.to_lowercase();
    let cleaned: String = lowercase
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();
    cleaned.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Fold plain English plurals so "methods" meets "method".
fn stem(token: &str) -> String {
    if token.len() > 3
        && token.is_ascii()
        && token.ends_with('s')
        && !token.ends_with("ss")
        && !token.ends_with("us")
        && !token.ends_with("is")
    {
        token[..token.len() - 1].to_string()
    } else {
        token.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_titles_score_one() {
        let t = "Deep Learning Based Image Classification Method";
        assert!((title_similarity(t, t) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn word_order_and_hyphenation_do_not_matter() {
        let s = title_similarity(
            "A Deep-Learning Method for Image Classification",
            "Deep Learning Based Image Classification Method",
        );
        assert!(s > 0.95, "similarity was {s}");
    }

    #[test]
    fn disjoint_titles_score_near_zero() {
        let s = title_similarity(
            "Quantum Error Correction Codes",
            "Medieval Agricultural Economics",
        );
        assert!(s < 0.2, "similarity was {s}");
    }

    #[test]
    fn symmetric_and_bounded() {
        let pairs = [
            ("Graph neural networks for molecules", "Molecular graph networks"),
            ("A survey of transformers", "Transformers: a survey"),
            ("x", "Completely different title here"),
        ];
        for (a, b) in pairs {
            let ab = title_similarity(a, b);
            let ba = title_similarity(b, a);
            assert!((ab - ba).abs() < 1e-12);
            assert!((0.0..=1.0).contains(&ab));
        }
    }

    #[test]
    fn empty_after_normalization_scores_zero() {
        assert_eq!(title_similarity("The of and", "The of and"), 0.0);
        assert_eq!(title_similarity("", "Deep Learning"), 0.0);
    }

    #[test]
    fn normalize_strips_punctuation() {
        assert_eq!(normalize_title("  Deep-Learning: A  Survey! "), "deep learning a survey");
    }
}
