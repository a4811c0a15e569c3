use once_cell::sync::Lazy;
use regex::Regex;

use crate::identifiers::doi::Doi;

static DOI_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)10\.\d{4,9}/[-._;()/:A-Z0-9]+[A-Z0-9/]").unwrap());

/// First DOI in `text`, in reading order.
pub fn find_doi(text: &str) -> Option<Doi> {
    DOI_REGEX
        .find_iter(text)
        .find_map(|m| Doi::parse(m.as_str()).ok())
}
