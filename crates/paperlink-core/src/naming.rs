use std::path::Path;

use crate::models::LanguageClass;

/// Known document file extensions that the library ingests.
pub const DOCUMENT_EXTENSIONS: &[&str] = &["pdf"];

/// Canonical filename for a record: `<prefix><id:02>.pdf`.
///
/// The prefix is fixed per language class and ids are unique across the
/// library, so two records of the same class can never share a name.
pub fn canonical_filename(language: LanguageClass, sequence_id: u32) -> String {
    format!("{}{:02}.pdf", language.prefix(), sequence_id)
}

/// Parse a canonical filename back into its sequence id.
/// Returns `None` for names that are not canonical for `language`.
pub fn parse_canonical(filename: &str, language: LanguageClass) -> Option<u32> {
    let stem = filename.strip_suffix(".pdf")?;
    let digits = stem.strip_prefix(language.prefix())?;
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// Whether `path` has an extension the library ingests.
pub fn is_document(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .is_some_and(|ext| DOCUMENT_EXTENSIONS.contains(&ext.as_str()))
}

/// Title guess from a filename: strips the extension, replaces separators with spaces.
pub fn title_from_filename(filename: &str) -> String {
    let stem = Path::new(filename)
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    let title = stem
        .replace(['_', '-', '.'], " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    if title.is_empty() {
        "Untitled".to_string()
    } else {
        title
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_names_pad_to_two_digits() {
        assert_eq!(canonical_filename(LanguageClass::Zh, 1), "c01.pdf");
        assert_eq!(canonical_filename(LanguageClass::En, 12), "e12.pdf");
        assert_eq!(canonical_filename(LanguageClass::En, 123), "e123.pdf");
    }

    #[test]
    fn parse_canonical_roundtrips_and_rejects_foreign_names() {
        assert_eq!(parse_canonical("c07.pdf", LanguageClass::Zh), Some(7));
        assert_eq!(parse_canonical("e123.pdf", LanguageClass::En), Some(123));
        assert_eq!(parse_canonical("c07.pdf", LanguageClass::En), None);
        assert_eq!(parse_canonical("c.pdf", LanguageClass::Zh), None);
        assert_eq!(parse_canonical("c0x.pdf", LanguageClass::Zh), None);
        assert_eq!(parse_canonical("paper.pdf", LanguageClass::Zh), None);
    }

    #[test]
    fn document_extension_check_is_case_insensitive() {
        assert!(is_document(Path::new("/tmp/A.PDF")));
        assert!(!is_document(Path::new("/tmp/notes.txt")));
        assert!(!is_document(Path::new("/tmp/noext")));
    }

    #[test]
    fn title_from_filename_replaces_separators() {
        assert_eq!(
            title_from_filename("deep_learning-survey.2020.pdf"),
            "deep learning survey 2020"
        );
        assert_eq!(title_from_filename(".pdf"), "pdf");
        assert_eq!(title_from_filename(""), "Untitled");
    }
}
