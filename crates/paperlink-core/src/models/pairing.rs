use serde::{Deserialize, Serialize};

/// Which signals contributed to a pairing, and how strongly.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MatchRationale {
    pub title_similarity: f64,

    /// `None` when either side had no comparable author list.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author_overlap: Option<f64>,

    /// `None` when either side had no year.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year_agreement: Option<f64>,

    /// English title the zh record was compared under.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub translated_title: Option<String>,
}

impl MatchRationale {
    /// Short human-readable list of the contributing signals.
    pub fn describe(&self) -> String {
        let mut parts = vec![format!("title {:.2}", self.title_similarity)];
        if let Some(authors) = self.author_overlap {
            parts.push(format!("authors {authors:.2}"));
        }
        if let Some(year) = self.year_agreement {
            parts.push(format!("year {year:.2}"));
        }
        parts.join(", ")
    }
}

/// An asserted correspondence between one zh record and one en record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchPairing {
    pub zh_id: u32,
    pub en_id: u32,
    pub match_confidence: f64,
    pub rationale: MatchRationale,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn describe_lists_only_available_signals() {
        let rationale = MatchRationale {
            title_similarity: 0.912,
            author_overlap: Some(1.0),
            year_agreement: None,
            translated_title: None,
        };
        assert_eq!(rationale.describe(), "title 0.91, authors 1.00");
    }
}
