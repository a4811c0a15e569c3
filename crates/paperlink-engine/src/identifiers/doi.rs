use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};

const PREFIXES: &[&str] = &[
    "https://doi.org/",
    "http://doi.org/",
    "https://dx.doi.org/",
    "http://dx.doi.org/",
    "doi.org/",
];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Doi {
    pub raw: String,
    pub normalized: String,
    pub url: String,
}

impl Doi {
    /// Accepts bare DOIs, resolver URLs and `doi:` labels.
    pub fn parse(input: &str) -> Result<Self> {
        let input = input.trim();

        let mut stripped = PREFIXES
            .iter()
            .find_map(|prefix| strip_prefix_ignore_case(input, prefix))
            .unwrap_or(input);
        if let Some(rest) = strip_prefix_ignore_case(stripped, "doi:") {
            stripped = rest.trim_start();
        }
        // Trailing sentence punctuation is never part of a DOI in running text.
        let stripped = stripped.trim_end_matches(['.', ',', ';', ')']);

        if !stripped.starts_with("10.") {
            return Err(EngineError::InvalidDoi(input.to_string()));
        }
        let slash_pos = stripped
            .find('/')
            .ok_or_else(|| EngineError::InvalidDoi(input.to_string()))?;
        let registrant = &stripped[3..slash_pos];
        if registrant.len() < 4 || !registrant.split('.').all(|p| p.chars().all(|c| c.is_ascii_digit()) && !p.is_empty()) {
            return Err(EngineError::InvalidDoi(input.to_string()));
        }
        let suffix = &stripped[slash_pos + 1..];
        if suffix.is_empty() || suffix.chars().any(char::is_whitespace) {
            return Err(EngineError::InvalidDoi(input.to_string()));
        }

        let normalized = stripped.to_lowercase();
        let url = format!("https://doi.org/{normalized}");

        Ok(Self {
            raw: input.to_string(),
            normalized,
            url,
        })
    }
}

fn strip_prefix_ignore_case<'a>(s: &'a str, prefix: &str) -> Option<&'a str> {
    let head = s.get(..prefix.len())?;
    head.eq_ignore_ascii_case(prefix).then(|| &s[prefix.len()..])
}
