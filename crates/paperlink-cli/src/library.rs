use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use tracing::{info, warn};

use paperlink_core::naming::{canonical_filename, is_document, parse_canonical};
use paperlink_core::{AppConfig, LanguageClass, RecordStore};

/// A PDF in a language directory, already under its canonical name.
#[derive(Debug, Clone, PartialEq)]
pub struct LibraryFile {
    pub sequence_id: u32,
    pub path: PathBuf,
    pub original_filename: String,
    /// A record for this id already exists in the store.
    pub known: bool,
}

/// Bring every PDF in the language directory under a canonical name.
///
/// Files that are already canonical keep their id. Others get the next free
/// id, which accounts for records in the store and canonical files on disk
/// in either language directory. With `dry_run` nothing is renamed.
pub fn canonicalize_dir(
    config: &AppConfig,
    store: &RecordStore,
    language: LanguageClass,
    dry_run: bool,
) -> Result<Vec<LibraryFile>> {
    let dir = config.language_dir(language);
    if !dir.is_dir() {
        bail!("{} library directory not found: {}", language, dir.display());
    }

    let mut taken: BTreeSet<u32> = store.records().iter().map(|r| r.sequence_id).collect();
    for other in [LanguageClass::Zh, LanguageClass::En] {
        let other_dir = config.language_dir(other);
        if other_dir.is_dir() {
            taken.extend(
                list_documents(&other_dir)?
                    .iter()
                    .filter_map(|name| parse_canonical(name, other)),
            );
        }
    }
    let mut next_id = taken.last().map_or(1, |max| max + 1);

    let mut files = Vec::new();
    for name in list_documents(&dir)? {
        let path = dir.join(&name);
        if let Some(id) = parse_canonical(&name, language) {
            let record = store.get(id).ok().filter(|r| r.language_class == language);
            files.push(LibraryFile {
                sequence_id: id,
                original_filename: record
                    .map_or_else(|| name.clone(), |r| r.original_filename.clone()),
                path,
                known: record.is_some(),
            });
            continue;
        }

        // A record that lost its file to a manual rename back.
        if let Some(record) = store.find_by_original(language, &name) {
            let target = dir.join(&record.canonical_filename);
            if target.exists() {
                warn!(file = %name, canonical = %record.canonical_filename, "duplicate of an existing document, skipped");
                continue;
            }
            if !dry_run {
                rename(&path, &target)?;
            }
            files.push(LibraryFile {
                sequence_id: record.sequence_id,
                path: target,
                original_filename: name,
                known: true,
            });
            continue;
        }

        let id = next_id;
        next_id += 1;
        let target = dir.join(canonical_filename(language, id));
        if target.exists() {
            bail!("refusing to overwrite {}", target.display());
        }
        if !dry_run {
            rename(&path, &target)?;
            info!(from = %name, to = %target.display(), "renamed");
        }
        files.push(LibraryFile {
            sequence_id: id,
            path: target,
            original_filename: name,
            known: false,
        });
    }

    files.sort_by_key(|f| f.sequence_id);
    Ok(files)
}

/// Document filenames in `dir`, sorted so id assignment is reproducible.
fn list_documents(dir: &Path) -> Result<Vec<String>> {
    let mut names = Vec::new();
    for entry in fs::read_dir(dir).with_context(|| format!("reading {}", dir.display()))? {
        let path = entry?.path();
        if path.is_file() && is_document(&path)
            && let Some(name) = path.file_name()
        {
            names.push(name.to_string_lossy().to_string());
        }
    }
    names.sort();
    Ok(names)
}

fn rename(from: &Path, to: &Path) -> Result<()> {
    fs::rename(from, to)
        .with_context(|| format!("renaming {} to {}", from.display(), to.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use paperlink_core::DocumentRecord;
    use tempfile::TempDir;

    fn setup() -> (TempDir, AppConfig) {
        let dir = TempDir::new().unwrap();
        let mut config = AppConfig::default();
        config.library.root = dir.path().to_string_lossy().to_string();
        fs::create_dir_all(config.language_dir(LanguageClass::Zh)).unwrap();
        fs::create_dir_all(config.language_dir(LanguageClass::En)).unwrap();
        (dir, config)
    }

    fn touch(config: &AppConfig, language: LanguageClass, name: &str) {
        fs::write(config.language_dir(language).join(name), b"%PDF-1.4").unwrap();
    }

    #[test]
    fn assigns_ids_after_existing_ones_in_both_languages() {
        let (_dir, config) = setup();
        touch(&config, LanguageClass::En, "e03.pdf");
        touch(&config, LanguageClass::Zh, "b paper.pdf");
        touch(&config, LanguageClass::Zh, "a paper.pdf");
        touch(&config, LanguageClass::Zh, "notes.txt");
        let store = RecordStore::open(&config.records_path()).unwrap();

        let files = canonicalize_dir(&config, &store, LanguageClass::Zh, false).unwrap();
        let summary: Vec<(u32, &str)> = files
            .iter()
            .map(|f| (f.sequence_id, f.original_filename.as_str()))
            .collect();
        assert_eq!(summary, vec![(4, "a paper.pdf"), (5, "b paper.pdf")]);
        assert!(config.language_dir(LanguageClass::Zh).join("c04.pdf").exists());
        assert!(!config.language_dir(LanguageClass::Zh).join("a paper.pdf").exists());
    }

    #[test]
    fn rerun_is_stable() {
        let (_dir, config) = setup();
        touch(&config, LanguageClass::En, "Deep Nets.pdf");
        let mut store = RecordStore::open(&config.records_path()).unwrap();

        let first = canonicalize_dir(&config, &store, LanguageClass::En, false).unwrap();
        assert_eq!(first[0].sequence_id, 1);
        assert!(!first[0].known);
        store
            .upsert(DocumentRecord::new(1, LanguageClass::En, "Deep Nets.pdf", "Deep Nets"))
            .unwrap();

        let second = canonicalize_dir(&config, &store, LanguageClass::En, false).unwrap();
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].sequence_id, 1);
        assert_eq!(second[0].original_filename, "Deep Nets.pdf");
        assert!(second[0].known);
    }

    #[test]
    fn dry_run_leaves_files_alone() {
        let (_dir, config) = setup();
        touch(&config, LanguageClass::En, "x.pdf");
        let store = RecordStore::open(&config.records_path()).unwrap();
        let files = canonicalize_dir(&config, &store, LanguageClass::En, true).unwrap();
        assert_eq!(files[0].path.file_name().unwrap(), "e01.pdf");
        assert!(config.language_dir(LanguageClass::En).join("x.pdf").exists());
    }

    #[test]
    fn missing_directory_is_an_error() {
        let dir = TempDir::new().unwrap();
        let mut config = AppConfig::default();
        config.library.root = dir.path().join("nowhere").to_string_lossy().to_string();
        let store = RecordStore::open(&config.records_path()).unwrap();
        assert!(canonicalize_dir(&config, &store, LanguageClass::Zh, false).is_err());
    }
}
