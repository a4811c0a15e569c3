mod library;
mod pdf;

use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use futures::stream::{self, StreamExt};
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use paperlink_core::{
    AppConfig, AssignmentStrategy, CoreError, ExitCode, LanguageClass, RecordStore, export_records,
};
use paperlink_engine::{
    BatchExtractor, Engine, EngineError, MatchReport, MatchSettings, SourceDocument,
};

use crate::library::LibraryFile;
use crate::pdf::{PdfText, read_pdf_blocking};

// ─── CLI Definition ─────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(
    name = "paperlink",
    about = "Bilingual paper library organizer: canonical names, metadata, zh/en pairing",
    version,
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output in JSON format (for scripts).
    /// Also enabled by setting PAPERLINK_JSON=1.
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Rename new PDFs of one language class and extract their metadata.
    Ingest {
        /// Language class: zh or en.
        language: String,
        /// Heuristic extraction only; no model calls.
        #[arg(long)]
        no_llm: bool,
        /// Extract again for documents that already have a record.
        #[arg(long)]
        reextract: bool,
        /// Show the renaming plan without touching any file.
        #[arg(long)]
        dry_run: bool,
    },

    /// Pair zh records with their en counterparts.
    Match {
        /// Minimum confidence for a pairing (overrides config).
        #[arg(long)]
        threshold: Option<f64>,
        /// Greedy assignment instead of the optimal one.
        #[arg(long)]
        greedy: bool,
        /// No translation; zh titles without an English title stay unmatched.
        #[arg(long)]
        offline: bool,
    },

    /// Write all records to an .xlsx spreadsheet.
    Export { path: String },

    /// Show library and API usage statistics.
    Stats,

    /// Response cache management.
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },

    /// Config management.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum CacheAction {
    /// Remove every cached model response.
    Clear,
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show the effective configuration (API key masked).
    Show,
    /// Print the config file location.
    Path,
}

// ─── Main ────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let json_output = cli.json || std::env::var("PAPERLINK_JSON").as_deref() == Ok("1");

    let code = match run(cli.command, json_output).await {
        Ok(code) => code,
        Err(err) => {
            let code = exit_code_for(&err);
            if json_output {
                let _ = print_json(&serde_json::json!({
                    "status": "error",
                    "message": format!("{err:#}"),
                }));
            } else {
                eprintln!("error: {err:#}");
            }
            code
        }
    };
    std::process::exit(code as i32);
}

async fn run(command: Commands, json_output: bool) -> Result<ExitCode> {
    let start = Instant::now();

    let config = AppConfig::load()?;
    config.validate()?;
    init_tracing(&config);

    match command {
        Commands::Ingest {
            language,
            no_llm,
            reextract,
            dry_run,
        } => {
            let language: LanguageClass = language.parse()?;
            ingest(&config, language, !no_llm, reextract, dry_run, json_output, start).await
        }

        Commands::Match {
            threshold,
            greedy,
            offline,
        } => {
            let mut settings = MatchSettings::from(&config.matching);
            if let Some(threshold) = threshold {
                if !(0.0..=1.0).contains(&threshold) {
                    bail!(CoreError::ConfigError(format!(
                        "--threshold must be within [0, 1], got {threshold}"
                    )));
                }
                settings.threshold = threshold;
            }
            if greedy {
                settings.assignment = AssignmentStrategy::Greedy;
            }
            run_match(&config, settings, !offline, json_output, start).await
        }

        // ── Export ─────────────────────────────────────────────────────────
        Commands::Export { path } => {
            let store = RecordStore::open(&config.records_path())?;
            let path = std::path::PathBuf::from(path);
            export_records(store.records(), &path, |id| {
                store.get(id).ok().map(|r| r.canonical_filename.clone())
            })?;
            let dur = start.elapsed().as_millis();
            if json_output {
                print_json(&serde_json::json!({
                    "status": "ok",
                    "data": { "path": path, "rows": store.records().len() },
                    "meta": { "duration_ms": dur }
                }))?;
            } else {
                println!("Exported {} records to {}", store.records().len(), path.display());
            }
            Ok(ExitCode::Success)
        }

        // ── Stats ──────────────────────────────────────────────────────────
        Commands::Stats => {
            let store = RecordStore::open(&config.records_path())?;
            let engine = Engine::from_config(&config, false)?;
            let usage = engine.budget().snapshot();
            let zh = store.by_language(LanguageClass::Zh).len();
            let en = store.by_language(LanguageClass::En).len();
            let llm = store
                .records()
                .iter()
                .filter(|r| r.extraction_method == paperlink_core::ExtractionMethod::Llm)
                .count();
            let paired = store.pairings().len();
            let dur = start.elapsed().as_millis();

            if json_output {
                print_json(&serde_json::json!({
                    "status": "ok",
                    "data": {
                        "records": { "zh": zh, "en": en, "llm": llm, "paired": paired },
                        "usage": usage,
                        "limits": {
                            "daily_api_calls": config.limits.daily_api_calls,
                            "monthly_budget": config.limits.monthly_budget,
                        },
                    },
                    "meta": { "duration_ms": dur }
                }))?;
            } else {
                println!("Library statistics:");
                println!("  Chinese records: {zh}");
                println!("  English records: {en}");
                println!("  Model-extracted: {llm}");
                println!("  Pairings:        {paired}");
                println!();
                print!("{}", engine.budget().summary());
            }
            Ok(ExitCode::Success)
        }

        // ── Cache ──────────────────────────────────────────────────────────
        Commands::Cache {
            action: CacheAction::Clear,
        } => {
            let engine = Engine::from_config(&config, false)?;
            let removed = engine.cache().clear().await?;
            let dur = start.elapsed().as_millis();
            if json_output {
                print_json(&serde_json::json!({
                    "status": "ok",
                    "data": { "removed": removed },
                    "meta": { "duration_ms": dur }
                }))?;
            } else {
                println!(
                    "Removed {removed} cached responses from {}",
                    Engine::response_cache_dir(&config).display()
                );
            }
            Ok(ExitCode::Success)
        }

        // ── Config ─────────────────────────────────────────────────────────
        Commands::Config { action } => {
            let dur = start.elapsed().as_millis();
            match action {
                ConfigAction::Show => {
                    let mut shown = config.clone();
                    if shown.llm.api_key.is_some() {
                        shown.llm.api_key = Some("********".to_string());
                    }
                    if json_output {
                        print_json(&serde_json::json!({
                            "status": "ok",
                            "data": shown,
                            "meta": { "duration_ms": dur }
                        }))?;
                    } else {
                        print!("{}", toml::to_string_pretty(&shown)?);
                    }
                }
                ConfigAction::Path => {
                    let path = AppConfig::config_path();
                    if json_output {
                        print_json(&serde_json::json!({
                            "status": "ok",
                            "data": { "path": path, "exists": path.exists() },
                            "meta": { "duration_ms": dur }
                        }))?;
                    } else {
                        println!("{}", path.display());
                    }
                }
            }
            Ok(ExitCode::Success)
        }
    }
}

// ─── Ingest ─────────────────────────────────────────────────────────────────

async fn ingest(
    config: &AppConfig,
    language: LanguageClass,
    use_model: bool,
    reextract: bool,
    dry_run: bool,
    json_output: bool,
    start: Instant,
) -> Result<ExitCode> {
    let mut store = RecordStore::open(&config.records_path())?;
    // Configuration problems surface here, before any file is renamed.
    let engine = Engine::from_config(config, !dry_run && use_model && config.extraction.enabled)?;

    let files = library::canonicalize_dir(config, &store, language, dry_run)?;
    if dry_run {
        let dur = start.elapsed().as_millis();
        if json_output {
            let plan: Vec<serde_json::Value> = files
                .iter()
                .map(|f| {
                    serde_json::json!({
                        "sequence_id": f.sequence_id,
                        "original": f.original_filename,
                        "canonical": f.path.file_name().map(|n| n.to_string_lossy().to_string()),
                        "known": f.known,
                    })
                })
                .collect();
            print_json(&serde_json::json!({
                "status": "ok",
                "data": { "plan": plan },
                "meta": { "duration_ms": dur }
            }))?;
        } else {
            for f in &files {
                let name = f.path.file_name().unwrap_or_default().to_string_lossy();
                println!("{name:<10} ← {}", f.original_filename);
            }
        }
        return Ok(ExitCode::Success);
    }

    let pending: Vec<LibraryFile> = files.into_iter().filter(|f| reextract || !f.known).collect();
    info!(%language, documents = pending.len(), model = engine.has_model(), "ingesting");

    // The heuristic path reads the first two pages even when the model
    // excerpt is limited to one.
    let max_pages = config.extraction.max_pages.max(2);
    let documents: Vec<SourceDocument> = stream::iter(pending)
        .map(|file| async move {
            let text = match read_pdf_blocking(file.path.clone(), max_pages).await {
                Ok(text) => text,
                Err(err) => {
                    warn!(id = file.sequence_id, error = %err, "no text layer, using filename only");
                    PdfText::default()
                }
            };
            SourceDocument {
                sequence_id: file.sequence_id,
                original_filename: file.original_filename,
                language,
                pages: text.pages,
                info: text.info,
            }
        })
        .buffered(config.extraction.concurrency)
        .collect()
        .await;

    let (cancel_tx, cancel_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted, finishing with the documents already extracted");
            let _ = cancel_tx.send(true);
        }
    });

    let batch = BatchExtractor::new(Arc::new(engine.extractor()), config.extraction.concurrency);
    let report = batch.run(documents, cancel_rx).await;

    let mut saved = Vec::with_capacity(report.records.len());
    for mut record in report.records {
        if let Ok(existing) = store.get(record.sequence_id) {
            record.added_at = existing.added_at;
            record.paired_with = existing.paired_with;
            record.pair_confidence = existing.pair_confidence;
        }
        saved.push((record.sequence_id, record.canonical_filename.clone(), record.title.clone()));
        store.upsert(record)?;
    }
    store.save().context("saving records")?;
    engine.save_usage().context("saving API usage")?;

    let dur = start.elapsed().as_millis();
    if json_output {
        let status = if report.cancelled { "interrupted" } else { "ok" };
        let items: Vec<serde_json::Value> = saved
            .iter()
            .map(|(id, name, title)| serde_json::json!({"sequence_id": id, "filename": name, "title": title}))
            .collect();
        print_json(&serde_json::json!({
            "status": status,
            "data": {
                "items": items,
                "llm": report.llm_count,
                "heuristic": report.heuristic_count,
                "records_file": store.path(),
            },
            "meta": { "duration_ms": dur }
        }))?;
    } else if saved.is_empty() {
        println!("Nothing new to ingest in the {language} library.");
    } else {
        for (_, name, title) in &saved {
            println!("  {name:<10} {title}");
        }
        println!(
            "{} records saved to {} ({} model, {} heuristic)",
            saved.len(),
            store.path().display(),
            report.llm_count,
            report.heuristic_count
        );
    }

    Ok(if report.cancelled {
        ExitCode::Interrupted
    } else {
        ExitCode::Success
    })
}

// ─── Match ──────────────────────────────────────────────────────────────────

async fn run_match(
    config: &AppConfig,
    settings: MatchSettings,
    use_model: bool,
    json_output: bool,
    start: Instant,
) -> Result<ExitCode> {
    let mut store = RecordStore::open(&config.records_path())?;
    let engine = Engine::from_config(config, use_model)?;

    let zh = store.by_language(LanguageClass::Zh);
    let en = store.by_language(LanguageClass::En);
    let report = engine.matcher(settings).run(&zh, &en).await;

    store.replace_pairings(report.pairings.clone());
    store.save().context("saving pairings")?;
    engine.save_usage().context("saving API usage")?;

    let dur = start.elapsed().as_millis();
    if json_output {
        print_json(&serde_json::json!({
            "status": "ok",
            "data": report,
            "meta": { "duration_ms": dur }
        }))?;
    } else {
        print_match_report(&store, &report);
    }
    Ok(ExitCode::Success)
}

fn print_match_report(store: &RecordStore, report: &MatchReport) {
    let name = |id: u32| {
        store
            .get(id)
            .map(|r| r.canonical_filename.clone())
            .unwrap_or_else(|_| format!("#{id}"))
    };

    if report.pairings.is_empty() {
        println!("No pairings above the threshold.");
    } else {
        println!("Pairings ({}):", report.pairings.len());
        for pairing in &report.pairings {
            println!(
                "  {} ↔ {}  {:.2}  ({})",
                name(pairing.zh_id),
                name(pairing.en_id),
                pairing.match_confidence,
                pairing.rationale.describe()
            );
            if let Some(title) = &pairing.rationale.translated_title {
                println!("      via \"{title}\"");
            }
        }
    }

    if !report.unmatched_zh.is_empty() {
        let names: Vec<String> = report.unmatched_zh.iter().map(|&id| name(id)).collect();
        println!("Unmatched zh: {}", names.join(", "));
    }
    if !report.unmatched_en.is_empty() {
        let names: Vec<String> = report.unmatched_en.iter().map(|&id| name(id)).collect();
        println!("Unmatched en: {}", names.join(", "));
    }
    for failure in &report.translation_failures {
        println!("Translation failed for {}: {}", name(failure.zh_id), failure.reason);
    }
}

// ─── Helpers ────────────────────────────────────────────────────────────────

/// `RUST_LOG` wins over `logging.level`. Logs go to stderr.
fn init_tracing(config: &AppConfig) {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.logging.level)),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn print_json(val: &serde_json::Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(val)?);
    Ok(())
}

fn exit_code_for(err: &anyhow::Error) -> ExitCode {
    for cause in err.chain() {
        if let Some(core) = cause.downcast_ref::<CoreError>() {
            return match core {
                CoreError::ConfigError(_)
                | CoreError::TomlParse(_)
                | CoreError::ValidationError(_) => ExitCode::ConfigError,
                CoreError::RecordNotFound(_) => ExitCode::NotFound,
                CoreError::Io(_) | CoreError::FilenameCollision { .. } => ExitCode::FileSystemError,
                _ => ExitCode::GeneralError,
            };
        }
        if let Some(engine) = cause.downcast_ref::<EngineError>() {
            return match engine {
                EngineError::Configuration(_) => ExitCode::ConfigError,
                EngineError::Core(CoreError::ConfigError(_)) => ExitCode::ConfigError,
                _ => ExitCode::GeneralError,
            };
        }
        if cause.downcast_ref::<std::io::Error>().is_some() {
            return ExitCode::FileSystemError;
        }
    }
    ExitCode::GeneralError
}
