use thiserror::Error;

/// CLI-level error categories mapped to exit codes.
#[derive(Debug, Error)]
pub enum CliError {
    #[error("configuration error: {0}")]
    Config(#[from] ruleone_core::ConfigError),

    #[error("no data for {failed} of {requested} identifier(s)")]
    NotFound { failed: usize, requested: usize },

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),

    #[error("http client setup failed: {0}")]
    Http(#[from] ruleone_core::HttpError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CliError {
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::Config(_) => 2,
            Self::NotFound { .. } => 3,
            Self::Serialization(_) => 4,
            Self::Http(_) | Self::Io(_) => 10,
        }
    }
}
