use thiserror::Error;

/// All errors that can occur in magicscope-core.
#[derive(Debug, Error)]
pub enum MagicError {
    #[error("no such flag: {0}")]
    UnknownFlag(String),

    #[error("flag not available: {0}")]
    UnsupportedFlag(String),

    #[error("wrong flag type {0} (expected integer or symbol)")]
    InvalidFlagType(String),

    #[error("illegal option: {0}")]
    UnknownOption(String),

    #[error("invalid value for option {key}: {reason}")]
    InvalidOption { key: String, reason: String },

    #[error("no such parameter: {0}")]
    UnknownParam(String),

    #[error("parameter not available: {0}")]
    UnsupportedParam(String),

    #[error("failed to initialize magic cookie ({code}): {message}")]
    Initialization { code: i32, message: String },

    #[error("failed to load database: {0}")]
    DatabaseLoad(String),

    #[error("magic handle is closed")]
    ClosedHandle,

    #[error("analysis failed: {0}")]
    Analysis(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

impl MagicError {
    /// Error text reported by the engine, when the failure came from it.
    pub fn engine_message(&self) -> Option<&str> {
        match self {
            Self::Initialization { message, .. } => Some(message),
            Self::DatabaseLoad(message) | Self::Analysis(message) => Some(message),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, MagicError>;
