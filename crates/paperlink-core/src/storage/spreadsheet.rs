use std::path::Path;

use rust_xlsxwriter::{Format, FormatAlign, Workbook};

use crate::error::Result;
use crate::models::{DocumentRecord, LanguageClass};

pub const COLUMNS: &[&str] = &[
    "Sequence",
    "Filename",
    "Original Filename",
    "Language",
    "Title",
    "Title (EN)",
    "Authors",
    "Journal",
    "Year",
    "DOI",
    "Keywords",
    "Added At",
    "Method",
    "Confidence",
    "Paired With",
    "Pair Confidence",
];

/// Write one row per record to an `.xlsx` workbook.
///
/// Pairing columns are filled for en rows only; zh rows leave them blank.
/// `paired_name` resolves a paired `sequence_id` to the filename shown.
pub fn export_records<F>(records: &[DocumentRecord], path: &Path, paired_name: F) -> Result<()>
where
    F: Fn(u32) -> Option<String>,
{
    let mut workbook = Workbook::new();
    let worksheet = workbook.add_worksheet();

    let header_format = Format::new().set_bold().set_align(FormatAlign::Center);
    for (col, name) in COLUMNS.iter().enumerate() {
        worksheet.write_string_with_format(0, col as u16, *name, &header_format)?;
    }

    let mut sorted: Vec<&DocumentRecord> = records.iter().collect();
    sorted.sort_by_key(|r| r.sequence_id);

    for (i, record) in sorted.iter().enumerate() {
        let row = (i + 1) as u32;
        for (col, cell) in row_cells(record, &paired_name).into_iter().enumerate() {
            match cell {
                Cell::Text(text) => worksheet.write_string(row, col as u16, &text)?,
                Cell::Number(value) => worksheet.write_number(row, col as u16, value)?,
                Cell::Empty => continue,
            };
        }
    }

    worksheet.autofit();
    workbook.save(path)?;
    Ok(())
}

#[derive(Debug, Clone, PartialEq)]
enum Cell {
    Text(String),
    Number(f64),
    Empty,
}

fn text_or_empty(value: Option<&str>) -> Cell {
    value.map_or(Cell::Empty, |v| Cell::Text(v.to_string()))
}

/// One cell per entry of [`COLUMNS`].
fn row_cells<F>(record: &DocumentRecord, paired_name: &F) -> Vec<Cell>
where
    F: Fn(u32) -> Option<String>,
{
    let (paired, pair_confidence) = match (record.language_class, record.paired_with) {
        (LanguageClass::En, Some(zh_id)) => (
            Cell::Text(paired_name(zh_id).unwrap_or_else(|| zh_id.to_string())),
            record.pair_confidence.map_or(Cell::Empty, |c| Cell::Number(round2(c))),
        ),
        _ => (Cell::Empty, Cell::Empty),
    };

    vec![
        Cell::Number(record.sequence_id as f64),
        Cell::Text(record.canonical_filename.clone()),
        Cell::Text(record.original_filename.clone()),
        Cell::Text(record.language_class.as_str().to_string()),
        Cell::Text(record.title.clone()),
        text_or_empty(record.title_en.as_deref()),
        Cell::Text(record.authors.join("; ")),
        text_or_empty(record.journal.as_deref()),
        record.year.map_or(Cell::Empty, |y| Cell::Number(y as f64)),
        text_or_empty(record.doi.as_deref()),
        Cell::Text(record.keywords.join("; ")),
        Cell::Text(record.added_at.format("%Y-%m-%d %H:%M:%S").to_string()),
        Cell::Text(record.extraction_method.to_string()),
        Cell::Number(round2(record.extraction_confidence)),
        paired,
        pair_confidence,
    ]
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_export_writes_workbook() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("records.xlsx");

        let zh = DocumentRecord::new(1, LanguageClass::Zh, "a.pdf", "基于深度学习的图像分类方法");
        let mut en = DocumentRecord::new(2, LanguageClass::En, "b.pdf", "Deep Learning");
        en.paired_with = Some(1);
        en.pair_confidence = Some(0.873);
        en.year = Some(2020);

        export_records(&[en, zh], &path, |id| Some(format!("c{id:02}.pdf"))).unwrap();

        let bytes = std::fs::read(&path).unwrap();
        // xlsx files are zip archives.
        assert_eq!(&bytes[..2], b"PK");
    }

    #[test]
    fn test_row_has_translated_title_and_keywords() {
        let mut zh = DocumentRecord::new(1, LanguageClass::Zh, "a.pdf", "基于深度学习的图像分类方法");
        zh.title_en = Some("Image Classification with Deep Learning".into());
        zh.keywords = vec!["深度学习".into(), "图像分类".into()];
        zh.paired_with = Some(2);

        let cells = row_cells(&zh, &|_| None);
        assert_eq!(cells.len(), COLUMNS.len());
        let col = |name: &str| COLUMNS.iter().position(|c| *c == name).unwrap();
        assert_eq!(
            cells[col("Title (EN)")],
            Cell::Text("Image Classification with Deep Learning".into())
        );
        assert_eq!(cells[col("Keywords")], Cell::Text("深度学习; 图像分类".into()));
        // zh rows never carry the pairing.
        assert_eq!(cells[col("Paired With")], Cell::Empty);
    }

    #[test]
    fn test_en_row_names_its_partner() {
        let mut en = DocumentRecord::new(2, LanguageClass::En, "b.pdf", "Deep Learning");
        en.paired_with = Some(1);
        en.pair_confidence = Some(0.873);

        let cells = row_cells(&en, &|id| Some(format!("c{id:02}.pdf")));
        assert_eq!(cells[cells.len() - 2], Cell::Text("c01.pdf".into()));
        assert_eq!(cells[cells.len() - 1], Cell::Number(0.87));
    }

    #[test]
    fn test_round2() {
        assert_eq!(round2(0.873), 0.87);
        assert_eq!(round2(1.0), 1.0);
    }
}
