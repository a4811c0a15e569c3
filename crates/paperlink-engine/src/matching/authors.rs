use unicode_normalization::UnicodeNormalization;
use unicode_normalization::char::is_combining_mark;

use paperlink_core::is_han;

use crate::matching::assignment::max_weight_assignment;

const EXACT: f64 = 1.0;
const INITIALS: f64 = 0.8;

/// A personal name split into surname and given-name parts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersonName {
    pub surname: String,
    pub given: Vec<String>,
    /// The surname position was explicit (`Surname, Given`) or Han-script.
    pub fixed_order: bool,
}

impl PersonName {
    pub fn parse(raw: &str) -> Option<Self> {
        let folded = fold(raw);
        if folded.is_empty() {
            return None;
        }

        if folded.chars().any(is_han) {
            let han: Vec<char> = folded.chars().filter(|c| is_han(*c)).collect();
            let surname = han.first()?.to_string();
            let given: String = han[1..].iter().collect();
            return Some(Self {
                surname,
                given: if given.is_empty() { Vec::new() } else { vec![given] },
                fixed_order: true,
            });
        }

        if let Some((surname, given)) = folded.split_once(',') {
            let surname = tokens(surname).concat();
            if surname.is_empty() {
                return None;
            }
            return Some(Self {
                surname,
                given: tokens(given),
                fixed_order: true,
            });
        }

        let mut parts = tokens(&folded);
        let surname = parts.pop()?;
        Some(Self {
            surname,
            given: parts,
            fixed_order: false,
        })
    }

    /// Readings of the name to compare: as parsed, plus first-token-as-surname
    /// for free-order names (romanized Chinese names appear both ways).
    fn readings(&self) -> Vec<(String, Vec<String>)> {
        let mut readings = vec![(self.surname.clone(), self.given.clone())];
        if !self.fixed_order && !self.given.is_empty() {
            let mut all = self.given.clone();
            all.push(self.surname.clone());
            let surname = all.remove(0);
            readings.push((surname, all));
        }
        readings
    }

    fn token_set(&self) -> std::collections::BTreeSet<String> {
        self.given
            .iter()
            .cloned()
            .chain(std::iter::once(self.surname.clone()))
            .collect()
    }
}

/// NFKD, diacritics dropped, lower case, affiliation markers removed.
fn fold(raw: &str) -> String {
    raw.nfkd()
        .filter(|c| !is_combining_mark(*c))
        .filter(|c| !c.is_ascii_digit() && !matches!(c, '*' | '†' | '‡' | '#'))
        .collect::<String>()
        .to_lowercase()
        .trim()
        .to_string()
}

/// Split on spaces and dots; hyphenated and apostrophe parts are joined.
fn tokens(text: &str) -> Vec<String> {
    text.split(|c: char| c.is_whitespace() || c == '.')
        .map(|t| t.chars().filter(|c| c.is_alphanumeric()).collect::<String>())
        .filter(|t| !t.is_empty())
        .collect()
}

/// 1.0 for the same name, 0.8 for the same surname with compatible
/// initials, 0 otherwise. Symmetric.
pub fn name_similarity(a: &PersonName, b: &PersonName) -> f64 {
    if a.token_set() == b.token_set() {
        return EXACT;
    }
    let mut best: f64 = 0.0;
    for (sa, ga) in a.readings() {
        for (sb, gb) in b.readings() {
            if sa != sb || ga.is_empty() || gb.is_empty() {
                continue;
            }
            if ga.concat() == gb.concat() {
                return EXACT;
            }
            if initials_compatible(&ga, &gb) {
                best = best.max(INITIALS);
            }
        }
    }
    best
}

/// `["x", "m"]` vs `["xiaoming"]`: initials "xm" and "x", one a prefix of
/// the other.
fn initials_compatible(a: &[String], b: &[String]) -> bool {
    let ia: String = a.iter().filter_map(|t| t.chars().next()).collect();
    let ib: String = b.iter().filter_map(|t| t.chars().next()).collect();
    ia.starts_with(&ib) || ib.starts_with(&ia)
}

/// Fraction of `zh` authors matched one-to-one in `en`, weighted by name
/// similarity. `None` when either list has no parseable name.
pub fn author_overlap(zh: &[String], en: &[String]) -> Option<f64> {
    let zh: Vec<PersonName> = zh.iter().filter_map(|n| PersonName::parse(n)).collect();
    let en: Vec<PersonName> = en.iter().filter_map(|n| PersonName::parse(n)).collect();
    if zh.is_empty() || en.is_empty() {
        return None;
    }
    let weights: Vec<Vec<f64>> = zh
        .iter()
        .map(|a| en.iter().map(|b| name_similarity(a, b)).collect())
        .collect();
    let total: f64 = max_weight_assignment(&weights)
        .into_iter()
        .map(|(i, j)| weights[i][j])
        .sum();
    Some((total / zh.len() as f64).clamp(0.0, 1.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name(raw: &str) -> PersonName {
        PersonName::parse(raw).unwrap()
    }

    #[test]
    fn parses_common_forms() {
        assert_eq!(name("Smith, John A.").surname, "smith");
        assert_eq!(name("Smith, John A.").given, vec!["john", "a"]);
        assert_eq!(name("Xiao-Ming Li").given, vec!["xiaoming"]);
        assert_eq!(name("José Müller²*").surname, "muller");
        let han = name("张小明");
        assert_eq!(han.surname, "张");
        assert_eq!(han.given, vec!["小明"]);
        assert!(PersonName::parse(" 12* ").is_none());
    }

    #[test]
    fn name_order_variants_match() {
        assert_eq!(name_similarity(&name("Zhang San"), &name("San Zhang")), 1.0);
        assert_eq!(name_similarity(&name("Xiaoming Li"), &name("Li, Xiao-Ming")), 1.0);
        assert_eq!(name_similarity(&name("Xiaoming Li"), &name("X. M. Li")), 0.8);
        assert_eq!(name_similarity(&name("J. Smith"), &name("John Smith")), 0.8);
    }

    #[test]
    fn shared_surname_alone_is_not_a_match() {
        assert_eq!(name_similarity(&name("Wei Zhang"), &name("Li Zhang")), 0.0);
        assert_eq!(name_similarity(&name("Zhang"), &name("Wei Zhang")), 0.0);
    }

    #[test]
    fn similarity_is_symmetric() {
        let names = ["Zhang San", "San Zhang", "X. M. Li", "Xiaoming Li", "Li, Xiaoming", "John Smith"];
        for a in names {
            for b in names {
                assert_eq!(
                    name_similarity(&name(a), &name(b)),
                    name_similarity(&name(b), &name(a)),
                    "{a} / {b}"
                );
            }
        }
    }

    #[test]
    fn overlap_is_one_to_one() {
        let zh = vec!["San Zhang".to_string(), "Si Li".to_string()];
        let en = vec!["Zhang San".to_string(), "Wu Wang".to_string()];
        assert_eq!(author_overlap(&zh, &en), Some(0.5));

        // One en author cannot satisfy two zh authors.
        let zh = vec!["San Zhang".to_string(), "S. Zhang".to_string()];
        let en = vec!["San Zhang".to_string()];
        assert_eq!(author_overlap(&zh, &en), Some(0.5));

        assert_eq!(author_overlap(&[], &en), None);
    }
}
