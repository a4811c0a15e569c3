//! Prompt templates for the model calls.

/// Bumped whenever a template changes, so cached replies are not reused
/// across incompatible prompts.
pub const PROMPT_VERSION: u32 = 1;

pub const EXTRACTION_SYSTEM: &str = "You extract bibliographic metadata from academic papers. \
Reply with a single JSON object and nothing else.";

const EXTRACTION_TEMPLATE: &str = r#"Below is the text of the first {pages} page(s) of an academic paper.
---
{text}
---

Return a JSON object with these fields:
{
  "title": "full title in the paper's own language",
  "title_en": "English title, if the paper is not in English and prints one",
  "authors": "all author names in printed order, separated by semicolons",
  "journal": "journal or conference name",
  "year": "publication year, four digits",
  "doi": "DOI in 10.xxxx/xxxxx form, if present",
  "keywords": "keywords separated by semicolons",
  "abstract": "first 100 characters of the abstract",
  "confidence": "your confidence in the whole extraction, 0-100"
}

Rules:
1. Use an empty string for anything not present in the text.
2. Keep author names exactly as printed.
3. The year must be four digits.
4. Do not invent a DOI."#;

pub fn extraction_prompt(pages: usize, text: &str) -> String {
    EXTRACTION_TEMPLATE
        .replace("{pages}", &pages.to_string())
        .replace("{text}", text)
}

pub const TRANSLATION_SYSTEM: &str =
    "You translate academic text. Reply with the translation only, no quotes or commentary.";

pub fn title_translation_prompt(title: &str, target: &str) -> String {
    format!(
        "Translate this academic paper title into {target}, using the usual terminology of the field:\n{title}"
    )
}

pub fn name_romanization_prompt(names: &str) -> String {
    format!(
        "Romanize these Chinese personal names into Hanyu Pinyin, given name first then surname \
(for example 张三 -> San Zhang). Keep the order and separate names with semicolons:\n{names}"
    )
}
