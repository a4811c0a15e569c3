use thiserror::Error;

/// All errors that can occur in paperlink-core.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Record not found: {0}")]
    RecordNotFound(u32),

    #[error("Filename collision in {language} library: {filename}")]
    FilenameCollision { language: String, filename: String },

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Config error: {0}")]
    ConfigError(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("Spreadsheet error: {0}")]
    Spreadsheet(#[from] rust_xlsxwriter::XlsxError),
}

/// Exit codes used by the CLI.
#[repr(i32)]
pub enum ExitCode {
    Success = 0,
    GeneralError = 1,
    NotFound = 2,
    ConfigError = 3,
    FileSystemError = 4,
    Interrupted = 130,
}

pub type Result<T> = std::result::Result<T, CoreError>;
